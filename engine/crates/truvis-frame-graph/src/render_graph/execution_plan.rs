//! 执行计划的调试输出

use ash::vk;
use itertools::Itertools;

use super::barrier::RgBarrierMasks;
use super::compiled::RgSyncPlan;
use super::dependency_graph::RgDependencyGraph;
use super::pass::RgPassNode;
use super::resource_handle::RgResourceHandle;
use super::resource_registry::RgResourceRegistry;

/// 打印执行计划
///
/// 包括：
/// - Pass 的执行顺序
/// - 每个 Pass 依赖的 Pass 以及产生依赖的资源
/// - 每个 Pass 的资源访问（名称、子资源范围、layout、stage、access）
/// - 每个 Pass 之前的 barrier（layout 转换、队列族转移）
pub(crate) fn log_execution_plan(
    resources: &RgResourceRegistry,
    passes: &[RgPassNode],
    plan: &RgSyncPlan,
    dependencies: &RgDependencyGraph,
) {
    log::info!("╔══════════════════════════════════════════════════════════════════╗");
    log::info!("║              RenderGraph Execution Plan                          ║");
    log::info!("╠══════════════════════════════════════════════════════════════════╣");
    log::info!(
        "║ Total Passes: {}  |  Execution Order: [{}]",
        plan.order.len(),
        plan.order.iter().map(|&i| passes[i].name.as_str()).join(" → ")
    );
    log::info!("╚══════════════════════════════════════════════════════════════════╝");

    for (position, sync) in plan.passes.iter().enumerate() {
        let pass = &passes[sync.pass_index];

        log::info!("");
        log::info!("┌─────────────────────────────────────────────────────────────────┐");
        log::info!("│ [{}/{}] Pass: \"{}\"", position + 1, plan.passes.len(), pass.name);
        log::info!("├─────────────────────────────────────────────────────────────────┤");

        let depends_on = dependencies
            .edges()
            .iter()
            .filter(|edge| edge.consumer == sync.pass_index)
            .map(|edge| match edge.resource {
                Some(resource) => format!("\"{}\" ({})", passes[edge.producer].name, resources.name(resource)),
                None => format!("\"{}\" (run_after)", passes[edge.producer].name),
            })
            .join(", ");
        if !depends_on.is_empty() {
            log::info!("│ Depends on: {}", depends_on);
        }

        for access in &pass.accesses {
            let name = resources.name(access.resource);
            let icon = match (access.usage.kind.is_read(), access.usage.kind.is_write()) {
                (true, true) => "🔁",
                (false, true) => "✏️ ",
                _ => "📖",
            };
            match access.resource {
                RgResourceHandle::Image(_) => log::info!(
                    "│   {} image \"{}\" {} @ {:?} (stage: {}, access: {})",
                    icon,
                    name,
                    format_range(access.range.base_mip, access.range.mip_count, access.range.base_layer, access.range.layer_count),
                    access.usage.layout,
                    format_pipeline_stage(access.usage.stage),
                    format_access_flags(access.usage.access)
                ),
                RgResourceHandle::Buffer(_) => log::info!(
                    "│   {} buffer \"{}\" (stage: {}, access: {})",
                    icon,
                    name,
                    format_pipeline_stage(access.usage.stage),
                    format_access_flags(access.usage.access)
                ),
            }
        }

        let barriers = &sync.barriers;
        if barriers.has_barriers() {
            log::info!("├─────────────────────────────────────────────────────────────────┤");
            log::info!(
                "│ Barriers: {} image, {} buffer",
                barriers.image_barrier_count(),
                barriers.buffer_barrier_count()
            );

            for barrier in &barriers.image_barriers {
                let range = barrier.range;
                log::info!(
                    "│   🔒 Image \"{}\" {}:",
                    resources.name(barrier.image.into()),
                    format_range(range.base_mip, range.mip_count, range.base_layer, range.layer_count)
                );
                let masks = &barrier.masks;
                if masks.has_layout_transition() {
                    log::info!("│       Layout: {:?} → {:?}", masks.old_layout, masks.new_layout);
                } else {
                    log::info!("│       Layout: {:?} (no layout change)", masks.old_layout);
                }
                log_masks(masks);
                log::info!("│       Aspect: {:?}", barrier.aspect);
            }

            for barrier in &barriers.buffer_barriers {
                log::info!("│   🔒 Buffer \"{}\":", resources.name(barrier.buffer.into()));
                log_masks(&barrier.masks);
            }
        } else {
            log::info!("│ No barriers required");
        }

        log::info!("└─────────────────────────────────────────────────────────────────┘");
    }

    log::info!("");
    log::info!("═══════════════════════ End of Execution Plan ═══════════════════════");
}

fn log_masks(masks: &RgBarrierMasks) {
    log::info!(
        "│       Stage:  {} → {}",
        format_pipeline_stage(masks.src_stage),
        format_pipeline_stage(masks.dst_stage)
    );
    log::info!(
        "│       Access: {} → {}",
        format_access_flags(masks.src_access),
        format_access_flags(masks.dst_access)
    );
    if masks.is_ownership_transfer() {
        log::info!("│       Queue:  {} → {}", masks.src_queue_family, masks.dst_queue_family);
    }
}

fn format_range(base_mip: u32, mip_count: u32, base_layer: u32, layer_count: u32) -> String {
    format!("[mip {}..{}, layer {}..{}]", base_mip, base_mip + mip_count, base_layer, base_layer + layer_count)
}

/// 格式化 PipelineStageFlags2 为可读字符串
pub(crate) fn format_pipeline_stage(stage: vk::PipelineStageFlags2) -> String {
    if stage == vk::PipelineStageFlags2::NONE {
        return "NONE".to_string();
    }

    const NAMES: &[(vk::PipelineStageFlags2, &str)] = &[
        (vk::PipelineStageFlags2::TOP_OF_PIPE, "TOP_OF_PIPE"),
        (vk::PipelineStageFlags2::DRAW_INDIRECT, "DRAW_INDIRECT"),
        (vk::PipelineStageFlags2::VERTEX_INPUT, "VERTEX_INPUT"),
        (vk::PipelineStageFlags2::VERTEX_SHADER, "VERTEX_SHADER"),
        (vk::PipelineStageFlags2::EARLY_FRAGMENT_TESTS, "EARLY_FRAGMENT_TESTS"),
        (vk::PipelineStageFlags2::FRAGMENT_SHADER, "FRAGMENT_SHADER"),
        (vk::PipelineStageFlags2::LATE_FRAGMENT_TESTS, "LATE_FRAGMENT_TESTS"),
        (vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT, "COLOR_ATTACHMENT_OUTPUT"),
        (vk::PipelineStageFlags2::COMPUTE_SHADER, "COMPUTE_SHADER"),
        (vk::PipelineStageFlags2::TRANSFER, "TRANSFER"),
        (vk::PipelineStageFlags2::RAY_TRACING_SHADER_KHR, "RAY_TRACING_SHADER"),
        (vk::PipelineStageFlags2::ACCELERATION_STRUCTURE_BUILD_KHR, "ACCEL_STRUCT_BUILD"),
        (vk::PipelineStageFlags2::BOTTOM_OF_PIPE, "BOTTOM_OF_PIPE"),
        (vk::PipelineStageFlags2::ALL_GRAPHICS, "ALL_GRAPHICS"),
        (vk::PipelineStageFlags2::ALL_COMMANDS, "ALL_COMMANDS"),
    ];

    let names = NAMES.iter().filter(|(flag, _)| stage.contains(*flag)).map(|(_, name)| *name).collect_vec();
    if names.is_empty() { format!("{:?}", stage) } else { names.join(" | ") }
}

/// 格式化 AccessFlags2 为可读字符串
pub(crate) fn format_access_flags(access: vk::AccessFlags2) -> String {
    if access == vk::AccessFlags2::NONE {
        return "NONE".to_string();
    }

    const NAMES: &[(vk::AccessFlags2, &str)] = &[
        (vk::AccessFlags2::INDIRECT_COMMAND_READ, "INDIRECT_CMD_READ"),
        (vk::AccessFlags2::INDEX_READ, "INDEX_READ"),
        (vk::AccessFlags2::VERTEX_ATTRIBUTE_READ, "VERTEX_ATTR_READ"),
        (vk::AccessFlags2::UNIFORM_READ, "UNIFORM_READ"),
        (vk::AccessFlags2::SHADER_SAMPLED_READ, "SHADER_SAMPLED_READ"),
        (vk::AccessFlags2::SHADER_STORAGE_READ, "STORAGE_READ"),
        (vk::AccessFlags2::SHADER_STORAGE_WRITE, "STORAGE_WRITE"),
        (vk::AccessFlags2::COLOR_ATTACHMENT_READ, "COLOR_ATTACH_READ"),
        (vk::AccessFlags2::COLOR_ATTACHMENT_WRITE, "COLOR_ATTACH_WRITE"),
        (vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_READ, "DEPTH_ATTACH_READ"),
        (vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_WRITE, "DEPTH_ATTACH_WRITE"),
        (vk::AccessFlags2::TRANSFER_READ, "TRANSFER_READ"),
        (vk::AccessFlags2::TRANSFER_WRITE, "TRANSFER_WRITE"),
        (vk::AccessFlags2::MEMORY_READ, "MEMORY_READ"),
        (vk::AccessFlags2::MEMORY_WRITE, "MEMORY_WRITE"),
        (vk::AccessFlags2::ACCELERATION_STRUCTURE_READ_KHR, "ACCEL_STRUCT_READ"),
        (vk::AccessFlags2::ACCELERATION_STRUCTURE_WRITE_KHR, "ACCEL_STRUCT_WRITE"),
    ];

    let names = NAMES.iter().filter(|(flag, _)| access.contains(*flag)).map(|(_, name)| *name).collect_vec();
    if names.is_empty() { format!("{:?}", access) } else { names.join(" | ") }
}
