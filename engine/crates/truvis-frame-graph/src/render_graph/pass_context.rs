//! Pass 执行上下文
//!
//! 在 `RgPass::execute()` 中使用：把虚拟句柄解析为物理资源，
//! 提供 compile 时解析好的渲染目标和 descriptor 写入，并收集 Pass 对资源状态的手动覆盖。

use ash::vk;
use itertools::Itertools;

use super::compiled::{RgPassSync, RgPhysicalResources, RgResolvedPass};
use super::device::RgCommandRecorder;
use super::pipeline::RgPipeline;
use super::render_target::RgRenderingInfo;
use super::resource_handle::{RgBufferHandle, RgImageHandle};
use super::resource_state::{RgBufferState, RgImageState, RgResourceState};
use super::subresource::RgSubresourceRange;

/// Pass 对资源状态的手动覆盖
///
/// 在 Pass 回调返回之后由 graph 应用。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum RgStateOverride {
    Image {
        image: RgImageHandle,
        range: RgSubresourceRange,
        state: RgResourceState,
    },
    Buffer {
        buffer: RgBufferHandle,
        state: RgResourceState,
    },
    Discard(RgImageHandle),
}

/// Pass 执行上下文
pub struct RgPassContext<'a> {
    pub(crate) cmd: &'a dyn RgCommandRecorder,
    pub(crate) pass_name: &'a str,
    pub(crate) sync: &'a RgPassSync,
    pub(crate) resolved: &'a RgResolvedPass,
    pub(crate) physical: &'a RgPhysicalResources,
    pub(crate) pipeline: Option<&'a RgPipeline>,
    pub(crate) queue_family: u32,

    pub(crate) rendering_active: bool,
    pub(crate) overrides: Vec<RgStateOverride>,
}

// getters
impl<'a> RgPassContext<'a> {
    /// 命令录制器
    #[inline]
    pub fn cmd(&self) -> &'a dyn RgCommandRecorder {
        self.cmd
    }

    #[inline]
    pub fn pass_name(&self) -> &str {
        self.pass_name
    }

    /// 获取物理图像
    ///
    /// # Panics
    /// 句柄在本帧没有对应的物理资源（未导入，或者是没有被任何 Pass 使用的临时资源）
    pub fn image(&self, handle: RgImageHandle) -> vk::Image {
        match self.physical.image(handle) {
            Some(native) => native.image,
            None => panic!("pass \"{}\": image {:?} has no physical resource", self.pass_name, handle),
        }
    }

    /// 获取图像的默认视图
    pub fn image_view(&self, handle: RgImageHandle) -> vk::ImageView {
        match self.physical.image(handle) {
            Some(native) => native.view,
            None => panic!("pass \"{}\": image {:?} has no physical resource", self.pass_name, handle),
        }
    }

    /// 获取物理缓冲区
    pub fn buffer(&self, handle: RgBufferHandle) -> vk::Buffer {
        match self.physical.buffer(handle) {
            Some(native) => native.buffer,
            None => panic!("pass \"{}\": buffer {:?} has no physical resource", self.pass_name, handle),
        }
    }

    /// graph 为本 Pass 中这张图像决定的 layout
    ///
    /// # Panics
    /// 本 Pass 没有声明访问这张图像
    pub fn image_layout(&self, handle: RgImageHandle) -> vk::ImageLayout {
        match self.sync.image_layout(handle) {
            Some(layout) => layout,
            None => panic!("pass \"{}\" queries the layout of undeclared image {:?}", self.pass_name, handle),
        }
    }

    /// compile 时解析好的动态渲染信息；没有声明渲染目标时为 `None`
    #[inline]
    pub fn rendering_info(&self) -> Option<&'a RgRenderingInfo> {
        self.resolved.rendering.as_ref()
    }

    #[inline]
    pub fn pipeline(&self) -> Option<&'a RgPipeline> {
        self.pipeline
    }
}

// 命令录制
impl RgPassContext<'_> {
    /// 开始动态渲染
    ///
    /// 管线感知的 Pass 会同时绑定管线并写入 descriptor。
    ///
    /// # Panics
    /// 本 Pass 没有声明渲染目标，或者已经处于渲染中
    pub fn begin_rendering(&mut self) {
        let Some(rendering) = self.resolved.rendering.as_ref() else {
            panic!("pass \"{}\" has no render targets", self.pass_name);
        };
        assert!(!self.rendering_active, "pass \"{}\": begin_rendering called twice", self.pass_name);

        self.cmd.cmd_begin_rendering(rendering);
        self.rendering_active = true;

        if self.pipeline.is_some() {
            self.bind_pipeline();
        }
    }

    pub fn end_rendering(&mut self) {
        if !self.rendering_active {
            log::warn!("pass \"{}\": end_rendering without begin_rendering", self.pass_name);
            return;
        }
        self.cmd.cmd_end_rendering();
        self.rendering_active = false;
    }

    /// 绑定管线，并按 set 分组 push 所有 descriptor
    ///
    /// # Panics
    /// 不是管线感知的 Pass
    pub fn bind_pipeline(&self) {
        let Some(pipeline) = self.pipeline else {
            panic!("pass \"{}\" has no pipeline", self.pass_name);
        };

        self.cmd.cmd_bind_pipeline(pipeline.bind_point, pipeline.pipeline);
        for (set, writes) in &self.resolved.descriptor_writes.iter().group_by(|write| write.set) {
            let writes = writes.copied().collect_vec();
            self.cmd.cmd_push_descriptor_set(pipeline.bind_point, pipeline.layout, set, &writes);
        }
    }

    /// 写入 push constants
    pub fn push_constants(&self, stages: vk::ShaderStageFlags, offset: u32, data: &[u8]) {
        let Some(pipeline) = self.pipeline else {
            panic!("pass \"{}\" has no pipeline", self.pass_name);
        };
        self.cmd.cmd_push_constants(pipeline.layout, stages, offset, data);
    }
}

// 状态覆盖
impl RgPassContext<'_> {
    /// 声明 Pass 执行后图像（的某个区域）处于 `state`
    ///
    /// 用于 Pass 内部自行转换了 layout 的情况，之后的 barrier 以此为起点重新计算。
    pub fn override_image_state(&mut self, handle: RgImageHandle, range: RgSubresourceRange, state: RgImageState) {
        self.overrides.push(RgStateOverride::Image {
            image: handle,
            range,
            state: RgResourceState::from_image_state(state, self.queue_family),
        });
    }

    pub fn override_buffer_state(&mut self, handle: RgBufferHandle, state: RgBufferState) {
        self.overrides.push(RgStateOverride::Buffer {
            buffer: handle,
            state: RgResourceState::from_buffer_state(state, self.queue_family),
        });
    }

    /// 声明图像内容在本 Pass 之后不再需要
    ///
    /// 下一次访问会从 `UNDEFINED` 转换 layout。
    pub fn discard_image(&mut self, handle: RgImageHandle) {
        self.overrides.push(RgStateOverride::Discard(handle));
    }

    /// 拆出收集到的覆盖，以及 Pass 结束时是否还处于渲染中
    pub(crate) fn into_overrides(self) -> (Vec<RgStateOverride>, bool) {
        (self.overrides, self.rendering_active)
    }
}
