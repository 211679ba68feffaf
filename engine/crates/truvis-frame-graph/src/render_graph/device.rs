//! RenderGraph 依赖的外部协作者
//!
//! - [`RgDevice`]：创建 / 销毁临时资源的物理对象
//! - [`RgCommandRecorder`]：把 barrier、动态渲染、管线绑定等命令录制到命令缓冲区
//!
//! `crate::vulkan` 提供基于 ash + vk-mem 的实现；测试中使用 mock 实现。

use ash::vk;

use super::buffer_resource::RgBufferDesc;
use super::compiled::RgDescriptorWrite;
use super::image_resource::RgImageDesc;
use super::render_target::RgRenderingInfo;

/// 物理图像：image + 默认视图
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct RgNativeImage {
    pub image: vk::Image,
    pub view: vk::ImageView,
}

/// 物理缓冲区
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct RgNativeBuffer {
    pub buffer: vk::Buffer,
}

/// 临时资源的分配器
///
/// 分配失败时返回 `vk::Result`，由 `RenderGraph::compile` 转换为 `RgError::AllocationFailed`。
pub trait RgDevice {
    fn create_image(&mut self, name: &str, desc: &RgImageDesc) -> Result<RgNativeImage, vk::Result>;

    fn destroy_image(&mut self, image: RgNativeImage);

    fn create_buffer(&mut self, name: &str, desc: &RgBufferDesc) -> Result<RgNativeBuffer, vk::Result>;

    fn destroy_buffer(&mut self, buffer: RgNativeBuffer);
}

/// 命令录制接口
///
/// 与 `GfxCommandBuffer` 一样，所有方法都只需要 `&self`。
pub trait RgCommandRecorder {
    fn cmd_pipeline_barrier2(
        &self,
        image_barriers: &[vk::ImageMemoryBarrier2<'_>],
        buffer_barriers: &[vk::BufferMemoryBarrier2<'_>],
    );

    fn cmd_begin_rendering(&self, rendering_info: &RgRenderingInfo);

    fn cmd_end_rendering(&self);

    fn cmd_bind_pipeline(&self, bind_point: vk::PipelineBindPoint, pipeline: vk::Pipeline);

    /// 通过 push descriptor 写入一个 set，`writes` 均属于同一个 set
    fn cmd_push_descriptor_set(
        &self,
        bind_point: vk::PipelineBindPoint,
        layout: vk::PipelineLayout,
        set: u32,
        writes: &[RgDescriptorWrite],
    );

    fn cmd_push_constants(&self, layout: vk::PipelineLayout, stages: vk::ShaderStageFlags, offset: u32, data: &[u8]);

    fn begin_label(&self, name: &str, color: [f32; 4]);

    fn end_label(&self);
}
