//! Barrier 自动计算
//!
//! [`compile_barrier`] 是一个纯函数：给定资源（或子资源区域）当前的同步状态和下一次访问，
//! 决定是否需要 barrier、barrier 的 stage / access / layout，以及访问之后的新状态。
//!
//! 规则概要：
//! - 读：没有前序写入时，只有 layout 变化（或队列族转移）才需要 barrier；
//!   有前序写入时，如果该读的 stage / access 已经被之前的读覆盖则跳过，
//!   如果已经有读取让写入可用则只需要从写入 stage 出发的执行依赖，否则是完整的内存依赖。
//!   读取只累积到 `read_stages` / `read_access`，写入状态保持不变。
//! - 写：只要有前序写入、前序读取、layout 变化或队列族转移就需要 barrier，
//!   src 覆盖前序写入以及写入之后的全部读取（stage 与 access）。

use ash::vk;

use super::resource_handle::{RgBufferHandle, RgImageHandle};
use super::resource_state::{RgResourceState, RgUsage, write_bits};
use super::subresource::RgSubresourceRange;

/// Barrier 的种类，用于统计
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RgBarrierKind {
    /// 带 src access 的内存依赖（可能同时包含 layout 转换）
    Memory,
    /// 只有执行依赖，没有 layout 转换
    ExecutionOnly,
    /// 没有前序写入的 layout 转换
    LayoutOnly,
}

/// 一个 barrier 的全部掩码
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RgBarrierMasks {
    pub src_stage: vk::PipelineStageFlags2,
    pub src_access: vk::AccessFlags2,
    pub dst_stage: vk::PipelineStageFlags2,
    pub dst_access: vk::AccessFlags2,
    pub old_layout: vk::ImageLayout,
    pub new_layout: vk::ImageLayout,
    pub src_queue_family: u32,
    pub dst_queue_family: u32,
}

impl RgBarrierMasks {
    #[inline]
    pub fn has_layout_transition(&self) -> bool {
        self.old_layout != self.new_layout
    }

    #[inline]
    pub fn is_ownership_transfer(&self) -> bool {
        self.src_queue_family != self.dst_queue_family
    }

    pub fn kind(&self) -> RgBarrierKind {
        if !self.src_access.is_empty() {
            RgBarrierKind::Memory
        } else if self.has_layout_transition() {
            RgBarrierKind::LayoutOnly
        } else {
            RgBarrierKind::ExecutionOnly
        }
    }
}

/// 计算一次访问需要的 barrier 以及访问之后的状态
///
/// # 参数
/// - `prior`: 当前跟踪的状态
/// - `usage`: 下一次访问
/// - `is_image`: buffer 不参与 layout 比较
/// - `queue_family`: graph 录制所在的队列族，`QUEUE_FAMILY_IGNORED` 表示不做所有权检查
pub fn compile_barrier(
    prior: &RgResourceState,
    usage: &RgUsage,
    is_image: bool,
    queue_family: u32,
) -> (Option<RgBarrierMasks>, RgResourceState) {
    let (old_layout, new_layout) = if is_image {
        (prior.layout, usage.layout)
    } else {
        (vk::ImageLayout::UNDEFINED, vk::ImageLayout::UNDEFINED)
    };
    let layout_change = old_layout != new_layout;

    let ownership_transfer = prior.queue_family != vk::QUEUE_FAMILY_IGNORED
        && queue_family != vk::QUEUE_FAMILY_IGNORED
        && prior.queue_family != queue_family;
    let (src_queue_family, dst_queue_family) = if ownership_transfer {
        (prior.queue_family, queue_family)
    } else {
        (vk::QUEUE_FAMILY_IGNORED, vk::QUEUE_FAMILY_IGNORED)
    };

    let mut next = *prior;
    next.layout = new_layout;
    if queue_family != vk::QUEUE_FAMILY_IGNORED {
        next.queue_family = queue_family;
    }

    let masks = |src_stage: vk::PipelineStageFlags2, src_access: vk::AccessFlags2| RgBarrierMasks {
        src_stage: if src_stage.is_empty() { vk::PipelineStageFlags2::TOP_OF_PIPE } else { src_stage },
        src_access,
        dst_stage: usage.stage,
        dst_access: usage.access,
        old_layout,
        new_layout,
        src_queue_family,
        dst_queue_family,
    };

    if usage.kind.is_write() {
        let needed = prior.has_write() || prior.has_reads() || layout_change || ownership_transfer;
        let barrier =
            needed.then(|| masks(prior.write_stage | prior.read_stages, prior.write_access | prior.read_access));

        let writes = write_bits(usage.access);
        next.write_stage = usage.stage;
        next.write_access = if writes.is_empty() { usage.access } else { writes };
        next.read_stages = vk::PipelineStageFlags2::NONE;
        next.read_access = vk::AccessFlags2::NONE;

        return (barrier, next);
    }

    let covered = prior.read_stages.contains(usage.stage) && prior.read_access.contains(usage.access);
    let barrier = if layout_change || ownership_transfer {
        // layout 转换本身是一次写，必须等待之前的读取
        let src_access = if prior.has_write() { prior.write_access } else { vk::AccessFlags2::NONE };
        Some(masks(prior.write_stage | prior.read_stages, src_access))
    } else if !prior.has_write() || covered {
        None
    } else if prior.has_reads() {
        // 之前的读取已经让写入可用，这里只需要等待写入 stage
        Some(masks(prior.write_stage, vk::AccessFlags2::NONE))
    } else {
        Some(masks(prior.write_stage, prior.write_access))
    };

    next.read_stages |= usage.stage;
    next.read_access |= usage.access;

    (barrier, next)
}

/// 图像 Barrier 描述
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RgImageBarrierDesc {
    pub image: RgImageHandle,
    pub range: RgSubresourceRange,
    /// 图像 aspect（COLOR / DEPTH / STENCIL）
    pub aspect: vk::ImageAspectFlags,
    pub masks: RgBarrierMasks,
}

impl RgImageBarrierDesc {
    /// 转换为 `vk::ImageMemoryBarrier2`，需要提供实际的 `vk::Image`
    pub fn to_vk(&self, image: vk::Image) -> vk::ImageMemoryBarrier2<'static> {
        vk::ImageMemoryBarrier2::default()
            .image(image)
            .src_stage_mask(self.masks.src_stage)
            .src_access_mask(self.masks.src_access)
            .dst_stage_mask(self.masks.dst_stage)
            .dst_access_mask(self.masks.dst_access)
            .old_layout(self.masks.old_layout)
            .new_layout(self.masks.new_layout)
            .src_queue_family_index(self.masks.src_queue_family)
            .dst_queue_family_index(self.masks.dst_queue_family)
            .subresource_range(self.range.to_vk(self.aspect))
    }
}

/// 缓冲区 Barrier 描述
///
/// 总是覆盖整个缓冲区。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RgBufferBarrierDesc {
    pub buffer: RgBufferHandle,
    pub masks: RgBarrierMasks,
}

impl RgBufferBarrierDesc {
    pub fn to_vk(&self, buffer: vk::Buffer) -> vk::BufferMemoryBarrier2<'static> {
        vk::BufferMemoryBarrier2::default()
            .buffer(buffer)
            .offset(0)
            .size(vk::WHOLE_SIZE)
            .src_stage_mask(self.masks.src_stage)
            .src_access_mask(self.masks.src_access)
            .dst_stage_mask(self.masks.dst_stage)
            .dst_access_mask(self.masks.dst_access)
            .src_queue_family_index(self.masks.src_queue_family)
            .dst_queue_family_index(self.masks.dst_queue_family)
    }
}

/// Pass 执行前需要的 Barrier 集合
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RgPassBarriers {
    pub image_barriers: Vec<RgImageBarrierDesc>,
    pub buffer_barriers: Vec<RgBufferBarrierDesc>,
}

impl RgPassBarriers {
    #[inline]
    pub fn has_barriers(&self) -> bool {
        !self.image_barriers.is_empty() || !self.buffer_barriers.is_empty()
    }

    #[inline]
    pub fn image_barrier_count(&self) -> usize {
        self.image_barriers.len()
    }

    #[inline]
    pub fn buffer_barrier_count(&self) -> usize {
        self.buffer_barriers.len()
    }

    /// 所有 barrier 的掩码
    pub fn masks(&self) -> impl Iterator<Item = &RgBarrierMasks> {
        self.image_barriers.iter().map(|b| &b.masks).chain(self.buffer_barriers.iter().map(|b| &b.masks))
    }
}

/// 根据 format 推断图像的 aspect flags
pub fn infer_image_aspect(format: vk::Format) -> vk::ImageAspectFlags {
    match format {
        vk::Format::D16_UNORM | vk::Format::D32_SFLOAT | vk::Format::X8_D24_UNORM_PACK32 => {
            vk::ImageAspectFlags::DEPTH
        }

        vk::Format::S8_UINT => vk::ImageAspectFlags::STENCIL,

        vk::Format::D16_UNORM_S8_UINT | vk::Format::D24_UNORM_S8_UINT | vk::Format::D32_SFLOAT_S8_UINT => {
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        }

        _ => vk::ImageAspectFlags::COLOR,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render_graph::resource_state::{RgAccessKind, RgBufferState, RgImageState};

    const QUEUE: u32 = vk::QUEUE_FAMILY_IGNORED;

    fn read(state: RgImageState) -> RgUsage {
        RgUsage::image(RgAccessKind::Read, state)
    }

    fn write(state: RgImageState) -> RgUsage {
        RgUsage::image(RgAccessKind::Write, state)
    }

    fn written_general() -> RgResourceState {
        RgResourceState::from_image_state(RgImageState::STORAGE_WRITE_COMPUTE, QUEUE)
    }

    #[test]
    fn test_read_without_write_same_layout() {
        let prior = RgResourceState {
            layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            ..RgResourceState::UNTOUCHED
        };
        let (barrier, next) = compile_barrier(&prior, &read(RgImageState::SHADER_READ_FRAGMENT), true, QUEUE);

        assert!(barrier.is_none());
        assert_eq!(next.read_stages, vk::PipelineStageFlags2::FRAGMENT_SHADER);
    }

    #[test]
    fn test_read_without_write_layout_change() {
        let (barrier, _) =
            compile_barrier(&RgResourceState::UNTOUCHED, &read(RgImageState::SHADER_READ_FRAGMENT), true, QUEUE);
        let barrier = barrier.unwrap();

        assert_eq!(barrier.kind(), RgBarrierKind::LayoutOnly);
        assert_eq!(barrier.src_stage, vk::PipelineStageFlags2::TOP_OF_PIPE);
        assert_eq!(barrier.src_access, vk::AccessFlags2::NONE);
        assert_eq!(barrier.old_layout, vk::ImageLayout::UNDEFINED);
        assert_eq!(barrier.new_layout, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
    }

    #[test]
    fn test_write_then_read_full_barrier() {
        let (barrier, next) =
            compile_barrier(&written_general(), &read(RgImageState::SHADER_READ_FRAGMENT), true, QUEUE);
        let barrier = barrier.unwrap();

        assert_eq!(barrier.kind(), RgBarrierKind::Memory);
        assert_eq!(barrier.src_stage, vk::PipelineStageFlags2::COMPUTE_SHADER);
        assert_eq!(barrier.src_access, vk::AccessFlags2::SHADER_STORAGE_WRITE);
        assert_eq!(barrier.dst_stage, vk::PipelineStageFlags2::FRAGMENT_SHADER);
        assert_eq!(barrier.dst_access, vk::AccessFlags2::SHADER_SAMPLED_READ);
        assert_eq!(barrier.old_layout, vk::ImageLayout::GENERAL);
        assert_eq!(barrier.new_layout, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
        assert_eq!(next.layout, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
    }

    #[test]
    fn test_no_redundant_read_barrier() {
        let (first, state) =
            compile_barrier(&written_general(), &read(RgImageState::STORAGE_READ_COMPUTE), true, QUEUE);
        assert!(first.is_some());

        let (second, state) = compile_barrier(&state, &read(RgImageState::STORAGE_READ_COMPUTE), true, QUEUE);
        assert!(second.is_none());
        assert_eq!(state.read_stages, vk::PipelineStageFlags2::COMPUTE_SHADER);
    }

    #[test]
    fn test_second_reader_stage_gets_execution_dependency() {
        let fragment_storage_read = RgImageState::new(
            vk::PipelineStageFlags2::FRAGMENT_SHADER,
            vk::AccessFlags2::SHADER_STORAGE_READ,
            vk::ImageLayout::GENERAL,
        );
        let (_, state) = compile_barrier(&written_general(), &read(fragment_storage_read), true, QUEUE);
        let (barrier, _) = compile_barrier(&state, &read(RgImageState::STORAGE_READ_COMPUTE), true, QUEUE);
        let barrier = barrier.unwrap();

        assert_eq!(barrier.kind(), RgBarrierKind::ExecutionOnly);
        // 依赖的是写入者，而不是第一个读取者
        assert_eq!(barrier.src_stage, vk::PipelineStageFlags2::COMPUTE_SHADER);
        assert_eq!(barrier.dst_access, vk::AccessFlags2::SHADER_STORAGE_READ);
    }

    #[test]
    fn test_layout_changing_read_keeps_write_state() {
        let (_, state) = compile_barrier(&written_general(), &read(RgImageState::SHADER_READ_FRAGMENT), true, QUEUE);

        assert_eq!(state.write_stage, vk::PipelineStageFlags2::COMPUTE_SHADER);
        assert_eq!(state.write_access, vk::AccessFlags2::SHADER_STORAGE_WRITE);
        assert_eq!(state.read_stages, vk::PipelineStageFlags2::FRAGMENT_SHADER);
        assert_eq!(state.read_access, vk::AccessFlags2::SHADER_SAMPLED_READ);

        // 同一 layout 下另一个 stage 的读取：只等待 compute 写入
        let (barrier, state) = compile_barrier(&state, &read(RgImageState::SHADER_READ_COMPUTE), true, QUEUE);
        let barrier = barrier.unwrap();
        assert_eq!(barrier.kind(), RgBarrierKind::ExecutionOnly);
        assert_eq!(barrier.src_stage, vk::PipelineStageFlags2::COMPUTE_SHADER);
        assert!(!barrier.src_stage.contains(vk::PipelineStageFlags2::FRAGMENT_SHADER));
        assert!(!barrier.has_layout_transition());

        // 回到 GENERAL 的写入等待写入者与两个读取者
        let (barrier, next) = compile_barrier(&state, &write(RgImageState::STORAGE_WRITE_COMPUTE), true, QUEUE);
        let barrier = barrier.unwrap();
        assert_eq!(
            barrier.src_stage,
            vk::PipelineStageFlags2::COMPUTE_SHADER | vk::PipelineStageFlags2::FRAGMENT_SHADER
        );
        assert_eq!(
            barrier.src_access,
            vk::AccessFlags2::SHADER_STORAGE_WRITE | vk::AccessFlags2::SHADER_SAMPLED_READ
        );
        assert_eq!(barrier.old_layout, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
        assert_eq!(barrier.new_layout, vk::ImageLayout::GENERAL);
        assert!(!next.has_reads());
    }

    #[test]
    fn test_write_after_multiple_reads() {
        let mut state = written_general();
        for stage in [vk::PipelineStageFlags2::FRAGMENT_SHADER, vk::PipelineStageFlags2::VERTEX_SHADER] {
            let usage = read(RgImageState::new(stage, vk::AccessFlags2::SHADER_STORAGE_READ, vk::ImageLayout::GENERAL));
            state = compile_barrier(&state, &usage, true, QUEUE).1;
        }

        let (barrier, next) = compile_barrier(&state, &write(RgImageState::STORAGE_WRITE_COMPUTE), true, QUEUE);
        let barrier = barrier.unwrap();

        assert_eq!(
            barrier.src_stage,
            vk::PipelineStageFlags2::COMPUTE_SHADER
                | vk::PipelineStageFlags2::FRAGMENT_SHADER
                | vk::PipelineStageFlags2::VERTEX_SHADER
        );
        assert_eq!(
            barrier.src_access,
            vk::AccessFlags2::SHADER_STORAGE_WRITE | vk::AccessFlags2::SHADER_STORAGE_READ
        );
        assert!(!next.has_reads());
        assert_eq!(next.write_access, vk::AccessFlags2::SHADER_STORAGE_WRITE);
    }

    #[test]
    fn test_first_write_same_layout_needs_no_barrier() {
        let prior = RgResourceState {
            layout: vk::ImageLayout::GENERAL,
            ..RgResourceState::UNTOUCHED
        };
        let (barrier, next) = compile_barrier(&prior, &write(RgImageState::STORAGE_WRITE_COMPUTE), true, QUEUE);

        assert!(barrier.is_none());
        assert!(next.has_write());
    }

    #[test]
    fn test_buffer_ignores_layout() {
        let prior = RgResourceState::from_buffer_state(RgBufferState::TRANSFER_DST, QUEUE);
        let usage = RgUsage::buffer(RgAccessKind::Read, RgBufferState::VERTEX_BUFFER);
        let (barrier, _) = compile_barrier(&prior, &usage, false, QUEUE);
        let barrier = barrier.unwrap();

        assert!(!barrier.has_layout_transition());
        assert_eq!(barrier.src_access, vk::AccessFlags2::TRANSFER_WRITE);
        assert_eq!(barrier.dst_access, vk::AccessFlags2::VERTEX_ATTRIBUTE_READ);
    }

    #[test]
    fn test_queue_family_acquire() {
        let prior = RgResourceState::from_image_state(RgImageState::SHADER_READ_COMPUTE, 2);
        let (barrier, next) = compile_barrier(&prior, &read(RgImageState::SHADER_READ_COMPUTE), true, 0);
        let barrier = barrier.unwrap();

        assert!(barrier.is_ownership_transfer());
        assert_eq!(barrier.src_queue_family, 2);
        assert_eq!(barrier.dst_queue_family, 0);
        assert_eq!(next.queue_family, 0);
    }

    #[test]
    fn test_infer_image_aspect() {
        assert_eq!(infer_image_aspect(vk::Format::D32_SFLOAT), vk::ImageAspectFlags::DEPTH);
        assert_eq!(
            infer_image_aspect(vk::Format::D24_UNORM_S8_UINT),
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        );
        assert_eq!(infer_image_aspect(vk::Format::R16G16B16A16_SFLOAT), vk::ImageAspectFlags::COLOR);
    }
}
