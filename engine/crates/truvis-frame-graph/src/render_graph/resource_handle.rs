//! RenderGraph 资源句柄定义
//!
//! 句柄是 graph 内部的虚拟引用，与物理的 `vk::Image` / `vk::Buffer` 分离。
//! 句柄由 `SlotMap` 分配，带有代际版本号：`RenderGraph::reset()` 之后，
//! 上一帧的句柄全部失效，再次使用会在 compile 时得到 `RgError::InvalidHandle`。

use std::fmt;

slotmap::new_key_type! {
    /// Graph 内部的 Image 句柄
    pub struct RgImageHandle;

    /// Graph 内部的 Buffer 句柄
    pub struct RgBufferHandle;
}

/// 资源种类
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RgResourceKind {
    Image,
    Buffer,
}

impl fmt::Display for RgResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RgResourceKind::Image => write!(f, "image"),
            RgResourceKind::Buffer => write!(f, "buffer"),
        }
    }
}

/// 任意资源的句柄
///
/// 在需要统一处理 image 和 buffer 的地方使用（依赖分析、descriptor 绑定、状态覆盖等）。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RgResourceHandle {
    Image(RgImageHandle),
    Buffer(RgBufferHandle),
}

impl RgResourceHandle {
    #[inline]
    pub fn kind(&self) -> RgResourceKind {
        match self {
            RgResourceHandle::Image(_) => RgResourceKind::Image,
            RgResourceHandle::Buffer(_) => RgResourceKind::Buffer,
        }
    }

    #[inline]
    pub fn as_image(&self) -> Option<RgImageHandle> {
        match self {
            RgResourceHandle::Image(handle) => Some(*handle),
            RgResourceHandle::Buffer(_) => None,
        }
    }

    #[inline]
    pub fn as_buffer(&self) -> Option<RgBufferHandle> {
        match self {
            RgResourceHandle::Image(_) => None,
            RgResourceHandle::Buffer(handle) => Some(*handle),
        }
    }
}

impl From<RgImageHandle> for RgResourceHandle {
    #[inline]
    fn from(handle: RgImageHandle) -> Self {
        RgResourceHandle::Image(handle)
    }
}

impl From<RgBufferHandle> for RgResourceHandle {
    #[inline]
    fn from(handle: RgBufferHandle) -> Self {
        RgResourceHandle::Buffer(handle)
    }
}
