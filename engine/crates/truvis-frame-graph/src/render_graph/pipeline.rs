//! 管线感知 Pass 使用的管线与反射信息
//!
//! graph 不负责编译 shader 或创建管线，只消费调用方提供的反射结果：
//! 名字 → (set, binding, descriptor type, stage)。
//! Pass 通过 `RgPassBuilder::bind` 按名字绑定资源，compile 时据此推导出访问方式并生成 descriptor 写入。

use std::rc::Rc;

use ash::vk;

use super::resource_handle::RgResourceKind;
use super::resource_state::{RgAccessKind, RgUsage};

/// 反射得到的一个 descriptor 绑定
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct RgReflectedBinding {
    pub name: String,
    pub set: u32,
    pub binding: u32,
    pub descriptor_type: vk::DescriptorType,
    pub stage_flags: vk::ShaderStageFlags,
    /// 存储资源在 shader 中是否只读（`NonWritable` / `readonly`）
    pub read_only: bool,
}

impl RgReflectedBinding {
    pub fn new(
        name: impl Into<String>,
        set: u32,
        binding: u32,
        descriptor_type: vk::DescriptorType,
        stage_flags: vk::ShaderStageFlags,
    ) -> Self {
        Self {
            name: name.into(),
            set,
            binding,
            descriptor_type,
            stage_flags,
            read_only: false,
        }
    }

    #[inline]
    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }
}

/// 一个管线的反射信息
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct RgShaderReflection {
    pub bindings: Vec<RgReflectedBinding>,
    pub push_constant_ranges: Vec<(vk::ShaderStageFlags, u32, u32)>,
}

impl RgShaderReflection {
    #[inline]
    pub fn with_binding(mut self, binding: RgReflectedBinding) -> Self {
        self.bindings.push(binding);
        self
    }

    /// 添加 push constant 范围：(stage, offset, size)
    #[inline]
    pub fn with_push_constants(mut self, stages: vk::ShaderStageFlags, offset: u32, size: u32) -> Self {
        self.push_constant_ranges.push((stages, offset, size));
        self
    }

    pub fn binding(&self, name: &str) -> Option<&RgReflectedBinding> {
        self.bindings.iter().find(|binding| binding.name == name)
    }
}

/// 管线感知 Pass 使用的管线
#[derive(Clone, Debug)]
pub struct RgPipeline {
    pub pipeline: vk::Pipeline,
    pub layout: vk::PipelineLayout,
    pub bind_point: vk::PipelineBindPoint,
    pub reflection: Rc<RgShaderReflection>,
}

impl RgPipeline {
    pub fn new(
        pipeline: vk::Pipeline,
        layout: vk::PipelineLayout,
        bind_point: vk::PipelineBindPoint,
        reflection: Rc<RgShaderReflection>,
    ) -> Self {
        Self {
            pipeline,
            layout,
            bind_point,
            reflection,
        }
    }
}

/// shader stage → pipeline stage
pub fn shader_stages_to_pipeline_stages(stages: vk::ShaderStageFlags) -> vk::PipelineStageFlags2 {
    const MAPPING: [(vk::ShaderStageFlags, vk::PipelineStageFlags2); 8] = [
        (vk::ShaderStageFlags::VERTEX, vk::PipelineStageFlags2::VERTEX_SHADER),
        (vk::ShaderStageFlags::TESSELLATION_CONTROL, vk::PipelineStageFlags2::TESSELLATION_CONTROL_SHADER),
        (vk::ShaderStageFlags::TESSELLATION_EVALUATION, vk::PipelineStageFlags2::TESSELLATION_EVALUATION_SHADER),
        (vk::ShaderStageFlags::GEOMETRY, vk::PipelineStageFlags2::GEOMETRY_SHADER),
        (vk::ShaderStageFlags::FRAGMENT, vk::PipelineStageFlags2::FRAGMENT_SHADER),
        (vk::ShaderStageFlags::COMPUTE, vk::PipelineStageFlags2::COMPUTE_SHADER),
        (vk::ShaderStageFlags::TASK_EXT, vk::PipelineStageFlags2::TASK_SHADER_EXT),
        (vk::ShaderStageFlags::MESH_EXT, vk::PipelineStageFlags2::MESH_SHADER_EXT),
    ];
    let ray_tracing = vk::ShaderStageFlags::RAYGEN_KHR
        | vk::ShaderStageFlags::ANY_HIT_KHR
        | vk::ShaderStageFlags::CLOSEST_HIT_KHR
        | vk::ShaderStageFlags::MISS_KHR
        | vk::ShaderStageFlags::INTERSECTION_KHR
        | vk::ShaderStageFlags::CALLABLE_KHR;

    let mut result = vk::PipelineStageFlags2::NONE;
    for (shader_stage, pipeline_stage) in MAPPING {
        if stages.intersects(shader_stage) {
            result |= pipeline_stage;
        }
    }
    if stages.intersects(ray_tracing) {
        result |= vk::PipelineStageFlags2::RAY_TRACING_SHADER_KHR;
    }
    if result.is_empty() {
        result = vk::PipelineStageFlags2::ALL_COMMANDS;
    }
    result
}

/// 根据 descriptor 类型推导资源种类和访问方式
///
/// sampler、加速结构等不对应 graph 资源的类型返回 `None`。
pub fn binding_usage(binding: &RgReflectedBinding) -> Option<(RgResourceKind, RgUsage)> {
    let stage = shader_stages_to_pipeline_stages(binding.stage_flags);
    let storage = |layout: vk::ImageLayout| {
        if binding.read_only {
            (RgAccessKind::Read, vk::AccessFlags2::SHADER_STORAGE_READ, layout)
        } else {
            (
                RgAccessKind::ReadWrite,
                vk::AccessFlags2::SHADER_STORAGE_READ | vk::AccessFlags2::SHADER_STORAGE_WRITE,
                layout,
            )
        }
    };

    let (kind, (access_kind, access, layout)) = match binding.descriptor_type {
        vk::DescriptorType::SAMPLED_IMAGE | vk::DescriptorType::COMBINED_IMAGE_SAMPLER => (
            RgResourceKind::Image,
            (RgAccessKind::Read, vk::AccessFlags2::SHADER_SAMPLED_READ, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL),
        ),
        vk::DescriptorType::STORAGE_IMAGE => (RgResourceKind::Image, storage(vk::ImageLayout::GENERAL)),
        vk::DescriptorType::INPUT_ATTACHMENT => (
            RgResourceKind::Image,
            (RgAccessKind::Read, vk::AccessFlags2::INPUT_ATTACHMENT_READ, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL),
        ),
        vk::DescriptorType::UNIFORM_BUFFER | vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC => (
            RgResourceKind::Buffer,
            (RgAccessKind::Read, vk::AccessFlags2::UNIFORM_READ, vk::ImageLayout::UNDEFINED),
        ),
        vk::DescriptorType::UNIFORM_TEXEL_BUFFER => (
            RgResourceKind::Buffer,
            (RgAccessKind::Read, vk::AccessFlags2::SHADER_SAMPLED_READ, vk::ImageLayout::UNDEFINED),
        ),
        vk::DescriptorType::STORAGE_BUFFER
        | vk::DescriptorType::STORAGE_BUFFER_DYNAMIC
        | vk::DescriptorType::STORAGE_TEXEL_BUFFER => (RgResourceKind::Buffer, storage(vk::ImageLayout::UNDEFINED)),
        _ => return None,
    };

    Some((
        kind,
        RgUsage {
            kind: access_kind,
            stage,
            access,
            layout,
        },
    ))
}
