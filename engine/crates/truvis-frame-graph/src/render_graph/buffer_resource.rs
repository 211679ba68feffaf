use ash::vk;

use super::device::RgNativeBuffer;
use super::resource_state::RgBufferState;

/// 缓冲区资源描述（用于创建临时资源）
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RgBufferDesc {
    /// 缓冲区大小（字节）
    pub size: vk::DeviceSize,
    pub usage: vk::BufferUsageFlags,
}

impl Default for RgBufferDesc {
    fn default() -> Self {
        Self {
            size: 0,
            usage: vk::BufferUsageFlags::STORAGE_BUFFER,
        }
    }
}

impl RgBufferDesc {
    #[inline]
    pub fn new(size: vk::DeviceSize, usage: vk::BufferUsageFlags) -> Self {
        Self { size, usage }
    }

    pub fn create_info(&self) -> vk::BufferCreateInfo<'static> {
        vk::BufferCreateInfo::default().size(self.size).usage(self.usage).sharing_mode(vk::SharingMode::EXCLUSIVE)
    }
}

/// 缓冲区资源的来源
#[derive(Clone, Debug)]
pub enum RgBufferSource {
    /// 从外部导入的缓冲区
    Imported {
        native: RgNativeBuffer,
        initial_state: RgBufferState,
        queue_family: u32,
    },
    /// 由 RenderGraph 创建的临时缓冲区
    Transient,
}

/// 缓冲区资源条目
#[derive(Clone, Debug)]
pub struct RgBufferResource {
    pub name: String,
    pub desc: RgBufferDesc,
    pub source: RgBufferSource,
    pub(crate) ordinal: u32,
}

// new & init
impl RgBufferResource {
    pub fn imported(
        name: impl Into<String>,
        native: RgNativeBuffer,
        desc: RgBufferDesc,
        initial_state: RgBufferState,
        queue_family: u32,
    ) -> Self {
        Self {
            name: name.into(),
            desc,
            source: RgBufferSource::Imported {
                native,
                initial_state,
                queue_family,
            },
            ordinal: 0,
        }
    }

    pub fn transient(name: impl Into<String>, desc: RgBufferDesc) -> Self {
        Self {
            name: name.into(),
            desc,
            source: RgBufferSource::Transient,
            ordinal: 0,
        }
    }
}

// getter
impl RgBufferResource {
    #[inline]
    pub fn is_transient(&self) -> bool {
        matches!(self.source, RgBufferSource::Transient)
    }

    #[inline]
    pub fn imported_native(&self) -> Option<RgNativeBuffer> {
        match &self.source {
            RgBufferSource::Imported { native, .. } => Some(*native),
            RgBufferSource::Transient => None,
        }
    }
}
