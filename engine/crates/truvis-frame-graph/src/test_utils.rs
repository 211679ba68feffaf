//! 单元测试用的 mock 设备与命令录制器

use std::cell::RefCell;

use ash::vk;
use ash::vk::Handle;

use crate::render_graph::{
    RgBufferDesc, RgCommandRecorder, RgDescriptorWrite, RgDevice, RgImageDesc, RgNativeBuffer, RgNativeImage,
    RgRenderingInfo,
};

/// 日志 + tracy client
///
/// `tracy_client::span!` 要求 client 已经启动。
pub fn init() {
    truvis_crate_tools::init_log::init_test_log();
    tracy_client::Client::start();
}

/// 只分配假句柄的设备
pub struct MockDevice {
    next_handle: u64,
    pub created_images: usize,
    pub created_buffers: usize,
    pub destroyed_images: usize,
    pub destroyed_buffers: usize,
    /// 为 true 时所有分配都返回 `ERROR_OUT_OF_DEVICE_MEMORY`
    pub fail_allocations: bool,
}

impl Default for MockDevice {
    fn default() -> Self {
        init();
        Self {
            next_handle: 0x1000,
            created_images: 0,
            created_buffers: 0,
            destroyed_images: 0,
            destroyed_buffers: 0,
            fail_allocations: false,
        }
    }
}

impl MockDevice {
    fn next(&mut self) -> u64 {
        self.next_handle += 1;
        self.next_handle
    }

    /// 用于导入资源的假图像
    pub fn native_image(&mut self) -> RgNativeImage {
        RgNativeImage {
            image: vk::Image::from_raw(self.next()),
            view: vk::ImageView::from_raw(self.next()),
        }
    }

    pub fn native_buffer(&mut self) -> RgNativeBuffer {
        RgNativeBuffer {
            buffer: vk::Buffer::from_raw(self.next()),
        }
    }
}

impl RgDevice for MockDevice {
    fn create_image(&mut self, _name: &str, _desc: &RgImageDesc) -> Result<RgNativeImage, vk::Result> {
        if self.fail_allocations {
            return Err(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY);
        }
        self.created_images += 1;
        Ok(self.native_image())
    }

    fn destroy_image(&mut self, _image: RgNativeImage) {
        self.destroyed_images += 1;
    }

    fn create_buffer(&mut self, _name: &str, _desc: &RgBufferDesc) -> Result<RgNativeBuffer, vk::Result> {
        if self.fail_allocations {
            return Err(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY);
        }
        self.created_buffers += 1;
        Ok(self.native_buffer())
    }

    fn destroy_buffer(&mut self, _buffer: RgNativeBuffer) {
        self.destroyed_buffers += 1;
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MockImageBarrier {
    pub image: vk::Image,
    pub old_layout: vk::ImageLayout,
    pub new_layout: vk::ImageLayout,
    pub src_stage: vk::PipelineStageFlags2,
    pub src_access: vk::AccessFlags2,
    pub dst_stage: vk::PipelineStageFlags2,
    pub dst_access: vk::AccessFlags2,
    pub base_mip: u32,
    pub mip_count: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MockBufferBarrier {
    pub buffer: vk::Buffer,
    pub src_stage: vk::PipelineStageFlags2,
    pub src_access: vk::AccessFlags2,
    pub dst_stage: vk::PipelineStageFlags2,
    pub dst_access: vk::AccessFlags2,
}

#[derive(Clone, Debug)]
pub enum MockCommand {
    Barrier {
        images: Vec<MockImageBarrier>,
        buffers: Vec<MockBufferBarrier>,
    },
    BeginRendering(RgRenderingInfo),
    EndRendering,
    BindPipeline(vk::Pipeline),
    PushDescriptorSet {
        set: u32,
        writes: Vec<RgDescriptorWrite>,
    },
    PushConstants(Vec<u8>),
    BeginLabel(String),
    EndLabel,
}

/// 记录所有命令的录制器
#[derive(Default)]
pub struct MockRecorder {
    pub commands: RefCell<Vec<MockCommand>>,
}

impl MockRecorder {
    /// 所有 barrier 命令中的图像 barrier
    pub fn image_barriers(&self) -> Vec<MockImageBarrier> {
        self.commands
            .borrow()
            .iter()
            .filter_map(|command| match command {
                MockCommand::Barrier { images, .. } => Some(images.clone()),
                _ => None,
            })
            .flatten()
            .collect()
    }

    pub fn buffer_barriers(&self) -> Vec<MockBufferBarrier> {
        self.commands
            .borrow()
            .iter()
            .filter_map(|command| match command {
                MockCommand::Barrier { buffers, .. } => Some(buffers.clone()),
                _ => None,
            })
            .flatten()
            .collect()
    }

    pub fn labels(&self) -> Vec<String> {
        self.commands
            .borrow()
            .iter()
            .filter_map(|command| match command {
                MockCommand::BeginLabel(name) => Some(name.clone()),
                _ => None,
            })
            .collect()
    }
}

impl RgCommandRecorder for MockRecorder {
    fn cmd_pipeline_barrier2(
        &self,
        image_barriers: &[vk::ImageMemoryBarrier2<'_>],
        buffer_barriers: &[vk::BufferMemoryBarrier2<'_>],
    ) {
        let images = image_barriers
            .iter()
            .map(|b| MockImageBarrier {
                image: b.image,
                old_layout: b.old_layout,
                new_layout: b.new_layout,
                src_stage: b.src_stage_mask,
                src_access: b.src_access_mask,
                dst_stage: b.dst_stage_mask,
                dst_access: b.dst_access_mask,
                base_mip: b.subresource_range.base_mip_level,
                mip_count: b.subresource_range.level_count,
            })
            .collect();
        let buffers = buffer_barriers
            .iter()
            .map(|b| MockBufferBarrier {
                buffer: b.buffer,
                src_stage: b.src_stage_mask,
                src_access: b.src_access_mask,
                dst_stage: b.dst_stage_mask,
                dst_access: b.dst_access_mask,
            })
            .collect();
        self.commands.borrow_mut().push(MockCommand::Barrier { images, buffers });
    }

    fn cmd_begin_rendering(&self, rendering_info: &RgRenderingInfo) {
        self.commands.borrow_mut().push(MockCommand::BeginRendering(rendering_info.clone()));
    }

    fn cmd_end_rendering(&self) {
        self.commands.borrow_mut().push(MockCommand::EndRendering);
    }

    fn cmd_bind_pipeline(&self, _bind_point: vk::PipelineBindPoint, pipeline: vk::Pipeline) {
        self.commands.borrow_mut().push(MockCommand::BindPipeline(pipeline));
    }

    fn cmd_push_descriptor_set(
        &self,
        _bind_point: vk::PipelineBindPoint,
        _layout: vk::PipelineLayout,
        set: u32,
        writes: &[RgDescriptorWrite],
    ) {
        self.commands.borrow_mut().push(MockCommand::PushDescriptorSet {
            set,
            writes: writes.to_vec(),
        });
    }

    fn cmd_push_constants(&self, _layout: vk::PipelineLayout, _stages: vk::ShaderStageFlags, _offset: u32, data: &[u8]) {
        self.commands.borrow_mut().push(MockCommand::PushConstants(data.to_vec()));
    }

    fn begin_label(&self, name: &str, _color: [f32; 4]) {
        self.commands.borrow_mut().push(MockCommand::BeginLabel(name.to_string()));
    }

    fn end_label(&self) {
        self.commands.borrow_mut().push(MockCommand::EndLabel);
    }
}
