//! 渲染目标声明与解析结果
//!
//! Pass 在 setup 时声明颜色 / 深度附件（[`RgColorAttachment`] / [`RgDepthAttachment`]），
//! compile 的最后一步把它们解析为带物理视图和 layout 的 [`RgRenderingInfo`]，
//! execute 时由 `RgPassContext::begin_rendering` 交给命令录制器。

use ash::vk;

use super::resource_handle::RgImageHandle;

/// 清除值
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum RgClearValue {
    Color([f32; 4]),
    DepthStencil { depth: f32, stencil: u32 },
}

impl RgClearValue {
    pub fn to_vk(&self) -> vk::ClearValue {
        match *self {
            RgClearValue::Color(color) => vk::ClearValue {
                color: vk::ClearColorValue { float32: color },
            },
            RgClearValue::DepthStencil { depth, stencil } => vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue { depth, stencil },
            },
        }
    }
}

/// 附件的 load / store 操作
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RgAttachmentOps {
    pub load_op: vk::AttachmentLoadOp,
    pub store_op: vk::AttachmentStoreOp,
    pub clear_value: RgClearValue,
}

impl RgAttachmentOps {
    /// 清除为指定颜色并保存
    pub const fn clear_color(color: [f32; 4]) -> Self {
        Self {
            load_op: vk::AttachmentLoadOp::CLEAR,
            store_op: vk::AttachmentStoreOp::STORE,
            clear_value: RgClearValue::Color(color),
        }
    }

    /// 清除深度（reversed-z 时使用 0.0）并保存
    pub const fn clear_depth(depth: f32) -> Self {
        Self {
            load_op: vk::AttachmentLoadOp::CLEAR,
            store_op: vk::AttachmentStoreOp::STORE,
            clear_value: RgClearValue::DepthStencil { depth, stencil: 0 },
        }
    }

    /// 保留之前的内容
    pub const fn load() -> Self {
        Self {
            load_op: vk::AttachmentLoadOp::LOAD,
            store_op: vk::AttachmentStoreOp::STORE,
            clear_value: RgClearValue::Color([0.0; 4]),
        }
    }

    /// 不关心之前的内容
    pub const fn dont_care() -> Self {
        Self {
            load_op: vk::AttachmentLoadOp::DONT_CARE,
            store_op: vk::AttachmentStoreOp::STORE,
            clear_value: RgClearValue::Color([0.0; 4]),
        }
    }

    #[inline]
    pub fn with_store_op(mut self, store_op: vk::AttachmentStoreOp) -> Self {
        self.store_op = store_op;
        self
    }

    /// 是否需要读取附件之前的内容
    #[inline]
    pub fn reads_previous(&self) -> bool {
        self.load_op == vk::AttachmentLoadOp::LOAD
    }
}

/// 颜色附件声明
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RgColorAttachment {
    pub image: RgImageHandle,
    pub ops: RgAttachmentOps,
}

/// 深度附件声明
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RgDepthAttachment {
    pub image: RgImageHandle,
    pub ops: RgAttachmentOps,
    /// 只做深度测试，不写入
    pub read_only: bool,
}

/// 解析后的附件
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RgResolvedAttachment {
    pub image: vk::Image,
    pub view: vk::ImageView,
    pub layout: vk::ImageLayout,
    pub ops: RgAttachmentOps,
    /// 深度附件的格式带 stencil
    pub has_stencil: bool,
}

impl RgResolvedAttachment {
    pub fn to_vk(&self) -> vk::RenderingAttachmentInfo<'static> {
        vk::RenderingAttachmentInfo::default()
            .image_view(self.view)
            .image_layout(self.layout)
            .load_op(self.ops.load_op)
            .store_op(self.ops.store_op)
            .clear_value(self.ops.clear_value.to_vk())
    }
}

/// 解析后的动态渲染信息
#[derive(Clone, Debug)]
pub struct RgRenderingInfo {
    pub render_area: vk::Rect2D,
    pub layer_count: u32,
    pub color_attachments: Vec<RgResolvedAttachment>,
    pub depth_attachment: Option<RgResolvedAttachment>,
}

impl RgRenderingInfo {
    pub fn vk_color_attachments(&self) -> Vec<vk::RenderingAttachmentInfo<'static>> {
        self.color_attachments.iter().map(RgResolvedAttachment::to_vk).collect()
    }

    pub fn vk_depth_attachment(&self) -> Option<vk::RenderingAttachmentInfo<'static>> {
        self.depth_attachment.as_ref().map(RgResolvedAttachment::to_vk)
    }
}
