use std::ffi::CString;

use ash::vk;
use itertools::Itertools;

use crate::render_graph::{RgCommandRecorder, RgDescriptorInfo, RgDescriptorWrite, RgRenderingInfo};

/// 把 graph 的命令录制到一个已经 begin 的 `vk::CommandBuffer`
pub struct RgVulkanCommandBuffer<'a> {
    device: &'a ash::Device,
    push_descriptor: Option<&'a ash::khr::push_descriptor::Device>,
    debug_utils: Option<&'a ash::ext::debug_utils::Device>,
    vk_handle: vk::CommandBuffer,
}

// new & init
impl<'a> RgVulkanCommandBuffer<'a> {
    pub fn new(device: &'a ash::Device, vk_handle: vk::CommandBuffer) -> Self {
        Self {
            device,
            push_descriptor: None,
            debug_utils: None,
            vk_handle,
        }
    }

    /// 管线感知的 Pass 需要 `VK_KHR_push_descriptor`
    pub fn with_push_descriptor(mut self, push_descriptor: &'a ash::khr::push_descriptor::Device) -> Self {
        self.push_descriptor = Some(push_descriptor);
        self
    }

    pub fn with_debug_utils(mut self, debug_utils: &'a ash::ext::debug_utils::Device) -> Self {
        self.debug_utils = Some(debug_utils);
        self
    }

    #[inline]
    pub fn vk_handle(&self) -> vk::CommandBuffer {
        self.vk_handle
    }
}

impl RgCommandRecorder for RgVulkanCommandBuffer<'_> {
    /// - command type: synchronize
    /// - supported queue types: graphics, compute, transfer
    fn cmd_pipeline_barrier2(
        &self,
        image_barriers: &[vk::ImageMemoryBarrier2<'_>],
        buffer_barriers: &[vk::BufferMemoryBarrier2<'_>],
    ) {
        let dependency_info = vk::DependencyInfo::default()
            .image_memory_barriers(image_barriers)
            .buffer_memory_barriers(buffer_barriers);
        unsafe {
            self.device.cmd_pipeline_barrier2(self.vk_handle, &dependency_info);
        }
    }

    /// - command type: action, state
    /// - supported queue types: graphics
    fn cmd_begin_rendering(&self, rendering_info: &RgRenderingInfo) {
        let color_attachments = rendering_info.vk_color_attachments();
        let depth_attachment = rendering_info.vk_depth_attachment();
        let has_stencil = rendering_info.depth_attachment.as_ref().is_some_and(|depth| depth.has_stencil);

        let mut info = vk::RenderingInfo::default()
            .render_area(rendering_info.render_area)
            .layer_count(rendering_info.layer_count)
            .color_attachments(&color_attachments);
        if let Some(depth) = &depth_attachment {
            info = info.depth_attachment(depth);
            if has_stencil {
                info = info.stencil_attachment(depth);
            }
        }

        unsafe {
            self.device.cmd_begin_rendering(self.vk_handle, &info);
        }
    }

    fn cmd_end_rendering(&self) {
        unsafe {
            self.device.cmd_end_rendering(self.vk_handle);
        }
    }

    /// - command type: state
    fn cmd_bind_pipeline(&self, bind_point: vk::PipelineBindPoint, pipeline: vk::Pipeline) {
        unsafe {
            self.device.cmd_bind_pipeline(self.vk_handle, bind_point, pipeline);
        }
    }

    /// - command type: state
    fn cmd_push_descriptor_set(
        &self,
        bind_point: vk::PipelineBindPoint,
        layout: vk::PipelineLayout,
        set: u32,
        writes: &[RgDescriptorWrite],
    ) {
        let Some(push_descriptor) = self.push_descriptor else {
            log::error!("cmd_push_descriptor_set: VK_KHR_push_descriptor is not enabled");
            return;
        };

        let image_infos = writes
            .iter()
            .map(|write| match write.info {
                RgDescriptorInfo::Image { sampler, view, layout } => {
                    vk::DescriptorImageInfo::default().sampler(sampler).image_view(view).image_layout(layout)
                }
                RgDescriptorInfo::Buffer { .. } => vk::DescriptorImageInfo::default(),
            })
            .collect_vec();
        let buffer_infos = writes
            .iter()
            .map(|write| match write.info {
                RgDescriptorInfo::Buffer { buffer, offset, range } => {
                    vk::DescriptorBufferInfo::default().buffer(buffer).offset(offset).range(range)
                }
                RgDescriptorInfo::Image { .. } => vk::DescriptorBufferInfo::default(),
            })
            .collect_vec();

        let vk_writes = writes
            .iter()
            .enumerate()
            .map(|(i, write)| {
                let vk_write =
                    vk::WriteDescriptorSet::default().dst_binding(write.binding).descriptor_type(write.descriptor_type);
                match write.info {
                    RgDescriptorInfo::Image { .. } => vk_write.image_info(std::slice::from_ref(&image_infos[i])),
                    RgDescriptorInfo::Buffer { .. } => vk_write.buffer_info(std::slice::from_ref(&buffer_infos[i])),
                }
            })
            .collect_vec();

        unsafe {
            push_descriptor.cmd_push_descriptor_set(self.vk_handle, bind_point, layout, set, &vk_writes);
        }
    }

    /// - command type: state
    fn cmd_push_constants(&self, layout: vk::PipelineLayout, stages: vk::ShaderStageFlags, offset: u32, data: &[u8]) {
        unsafe {
            self.device.cmd_push_constants(self.vk_handle, layout, stages, offset, data);
        }
    }

    /// - command type: state, action
    /// - supported queue type: graphics, compute
    fn begin_label(&self, name: &str, color: [f32; 4]) {
        let Some(debug_utils) = self.debug_utils else {
            return;
        };
        let Ok(name) = CString::new(name) else {
            return;
        };
        unsafe {
            debug_utils.cmd_begin_debug_utils_label(
                self.vk_handle,
                &vk::DebugUtilsLabelEXT::default().label_name(name.as_c_str()).color(color),
            );
        }
    }

    fn end_label(&self) {
        if let Some(debug_utils) = self.debug_utils {
            unsafe {
                debug_utils.cmd_end_debug_utils_label(self.vk_handle);
            }
        }
    }
}
