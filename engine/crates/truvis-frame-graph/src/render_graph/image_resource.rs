use ash::vk;

use super::barrier::infer_image_aspect;
use super::device::RgNativeImage;
use super::resource_state::RgImageState;

/// 图像资源描述
///
/// 临时资源用它来创建 `vk::Image`，transient pool 用它作为复用的匹配条件；
/// 导入资源用它提供 format、尺寸和子资源数量。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RgImageDesc {
    pub width: u32,
    pub height: u32,
    /// 图像深度（3D 纹理）
    pub depth: u32,
    pub mip_levels: u32,
    pub array_layers: u32,
    pub format: vk::Format,
    pub usage: vk::ImageUsageFlags,
    pub samples: vk::SampleCountFlags,
    pub image_type: vk::ImageType,
}

impl Default for RgImageDesc {
    fn default() -> Self {
        Self {
            width: 1,
            height: 1,
            depth: 1,
            mip_levels: 1,
            array_layers: 1,
            format: vk::Format::R8G8B8A8_UNORM,
            usage: vk::ImageUsageFlags::SAMPLED | vk::ImageUsageFlags::STORAGE,
            samples: vk::SampleCountFlags::TYPE_1,
            image_type: vk::ImageType::TYPE_2D,
        }
    }
}

// new & init & builder
impl RgImageDesc {
    /// 创建 2D 图像描述
    #[inline]
    pub fn new_2d(width: u32, height: u32, format: vk::Format, usage: vk::ImageUsageFlags) -> Self {
        Self {
            width,
            height,
            format,
            usage,
            ..Default::default()
        }
    }

    #[inline]
    pub fn with_usage(mut self, usage: vk::ImageUsageFlags) -> Self {
        self.usage = usage;
        self
    }

    #[inline]
    pub fn with_mip_levels(mut self, mip_levels: u32) -> Self {
        self.mip_levels = mip_levels.max(1);
        self
    }

    #[inline]
    pub fn with_array_layers(mut self, array_layers: u32) -> Self {
        self.array_layers = array_layers.max(1);
        self
    }

    #[inline]
    pub fn with_samples(mut self, samples: vk::SampleCountFlags) -> Self {
        self.samples = samples;
        self
    }
}

// getters
impl RgImageDesc {
    #[inline]
    pub fn extent(&self) -> vk::Extent3D {
        vk::Extent3D {
            width: self.width,
            height: self.height,
            depth: self.depth,
        }
    }

    /// 某个 mip level 的 2D 尺寸
    #[inline]
    pub fn mip_extent(&self, mip: u32) -> vk::Extent2D {
        vk::Extent2D {
            width: (self.width >> mip).max(1),
            height: (self.height >> mip).max(1),
        }
    }

    #[inline]
    pub fn aspect(&self) -> vk::ImageAspectFlags {
        infer_image_aspect(self.format)
    }

    /// 从图像类型推断视图类型
    pub fn infer_view_type(&self) -> vk::ImageViewType {
        match self.image_type {
            vk::ImageType::TYPE_1D => {
                if self.array_layers > 1 {
                    vk::ImageViewType::TYPE_1D_ARRAY
                } else {
                    vk::ImageViewType::TYPE_1D
                }
            }
            vk::ImageType::TYPE_2D => {
                if self.array_layers > 1 {
                    vk::ImageViewType::TYPE_2D_ARRAY
                } else {
                    vk::ImageViewType::TYPE_2D
                }
            }
            vk::ImageType::TYPE_3D => vk::ImageViewType::TYPE_3D,
            _ => vk::ImageViewType::TYPE_2D,
        }
    }

    pub fn create_info(&self) -> vk::ImageCreateInfo<'static> {
        vk::ImageCreateInfo::default()
            .image_type(self.image_type)
            .format(self.format)
            .extent(self.extent())
            .mip_levels(self.mip_levels)
            .array_layers(self.array_layers)
            .samples(self.samples)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(self.usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED)
    }
}

/// 图像资源的来源
#[derive(Clone, Debug)]
pub enum RgImageSource {
    /// 从外部导入的图像，graph 不负责创建和销毁
    Imported {
        native: RgNativeImage,
        initial_state: RgImageState,
        /// 导入时所属的队列族，`QUEUE_FAMILY_IGNORED` 表示不需要所有权转移
        queue_family: u32,
    },
    /// 由 RenderGraph 从 transient pool 分配的临时图像
    Transient,
}

/// 图像资源条目
#[derive(Clone, Debug)]
pub struct RgImageResource {
    pub name: String,
    pub desc: RgImageDesc,
    pub source: RgImageSource,
    /// 注册顺序，用于跨帧比较 graph 结构
    pub(crate) ordinal: u32,
}

// new & init
impl RgImageResource {
    pub fn imported(
        name: impl Into<String>,
        native: RgNativeImage,
        desc: RgImageDesc,
        initial_state: RgImageState,
        queue_family: u32,
    ) -> Self {
        Self {
            name: name.into(),
            desc,
            source: RgImageSource::Imported {
                native,
                initial_state,
                queue_family,
            },
            ordinal: 0,
        }
    }

    pub fn transient(name: impl Into<String>, desc: RgImageDesc) -> Self {
        Self {
            name: name.into(),
            desc,
            source: RgImageSource::Transient,
            ordinal: 0,
        }
    }
}

// getters
impl RgImageResource {
    #[inline]
    pub fn is_transient(&self) -> bool {
        matches!(self.source, RgImageSource::Transient)
    }

    #[inline]
    pub fn aspect(&self) -> vk::ImageAspectFlags {
        self.desc.aspect()
    }

    /// 导入资源的物理句柄；临时资源在 compile 之前没有物理句柄
    #[inline]
    pub fn imported_native(&self) -> Option<RgNativeImage> {
        match &self.source {
            RgImageSource::Imported { native, .. } => Some(*native),
            RgImageSource::Transient => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_view_type_and_aspect() {
        let desc = RgImageDesc::new_2d(
            1920,
            1080,
            vk::Format::D32_SFLOAT,
            vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
        );
        assert_eq!(desc.infer_view_type(), vk::ImageViewType::TYPE_2D);
        assert_eq!(desc.aspect(), vk::ImageAspectFlags::DEPTH);

        let array = desc.with_array_layers(6);
        assert_eq!(array.infer_view_type(), vk::ImageViewType::TYPE_2D_ARRAY);
    }

    #[test]
    fn test_mip_extent() {
        let desc = RgImageDesc::new_2d(
            100,
            30,
            vk::Format::R8G8B8A8_UNORM,
            vk::ImageUsageFlags::SAMPLED,
        )
        .with_mip_levels(7);

        assert_eq!(desc.mip_extent(2), vk::Extent2D { width: 25, height: 7 });
        assert_eq!(desc.mip_extent(6), vk::Extent2D { width: 1, height: 1 });
    }
}
