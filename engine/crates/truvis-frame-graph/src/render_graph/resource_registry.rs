use slotmap::SlotMap;

use super::buffer_resource::RgBufferResource;
use super::image_resource::RgImageResource;
use super::resource_handle::{RgBufferHandle, RgImageHandle, RgResourceHandle};

/// 资源注册表
///
/// 管理一帧内声明的所有资源，提供虚拟句柄到资源信息的映射。
/// `clear()` 之后旧句柄的版本号失效，`get_*` 返回 `None`。
#[derive(Default)]
pub struct RgResourceRegistry {
    /// 图像资源表
    images: SlotMap<RgImageHandle, RgImageResource>,
    /// 缓冲区资源表
    buffers: SlotMap<RgBufferHandle, RgBufferResource>,
    /// 下一个注册序号（image 与 buffer 共享）
    next_ordinal: u32,
}

// new & init
impl RgResourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 清空所有资源，使本帧的句柄全部失效
    pub fn clear(&mut self) {
        self.images.clear();
        self.buffers.clear();
        self.next_ordinal = 0;
    }
}

// register
impl RgResourceRegistry {
    pub fn register_image(&mut self, mut image: RgImageResource) -> RgImageHandle {
        image.ordinal = self.next_ordinal;
        self.next_ordinal += 1;
        self.images.insert(image)
    }

    pub fn register_buffer(&mut self, mut buffer: RgBufferResource) -> RgBufferHandle {
        buffer.ordinal = self.next_ordinal;
        self.next_ordinal += 1;
        self.buffers.insert(buffer)
    }
}

// getter & iter
impl RgResourceRegistry {
    #[inline]
    pub fn get_image(&self, handle: RgImageHandle) -> Option<&RgImageResource> {
        self.images.get(handle)
    }

    #[inline]
    pub fn get_buffer(&self, handle: RgBufferHandle) -> Option<&RgBufferResource> {
        self.buffers.get(handle)
    }

    #[inline]
    pub fn contains(&self, handle: RgResourceHandle) -> bool {
        match handle {
            RgResourceHandle::Image(image) => self.images.contains_key(image),
            RgResourceHandle::Buffer(buffer) => self.buffers.contains_key(buffer),
        }
    }

    /// 资源的调试名称，无效句柄返回 `"<invalid>"`
    pub fn name(&self, handle: RgResourceHandle) -> &str {
        let name = match handle {
            RgResourceHandle::Image(image) => self.images.get(image).map(|r| r.name.as_str()),
            RgResourceHandle::Buffer(buffer) => self.buffers.get(buffer).map(|r| r.name.as_str()),
        };
        name.unwrap_or("<invalid>")
    }

    /// 注册序号，无效句柄返回 `None`
    pub fn ordinal(&self, handle: RgResourceHandle) -> Option<u32> {
        match handle {
            RgResourceHandle::Image(image) => self.images.get(image).map(|r| r.ordinal),
            RgResourceHandle::Buffer(buffer) => self.buffers.get(buffer).map(|r| r.ordinal),
        }
    }

    #[inline]
    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    #[inline]
    pub fn buffer_count(&self) -> usize {
        self.buffers.len()
    }

    #[inline]
    pub fn iter_images(&self) -> impl Iterator<Item = (RgImageHandle, &RgImageResource)> {
        self.images.iter()
    }

    #[inline]
    pub fn iter_buffers(&self) -> impl Iterator<Item = (RgBufferHandle, &RgBufferResource)> {
        self.buffers.iter()
    }
}
