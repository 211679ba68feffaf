use std::collections::HashMap;
use std::ffi::CString;

use anyhow::Context;
use ash::vk;
use vk_mem::Alloc;

use crate::render_graph::{RgBufferDesc, RgDevice, RgImageDesc, RgNativeBuffer, RgNativeImage, RgSubresourceRange};

/// 使用 vk-mem 分配临时资源的设备
///
/// `ash::Instance` 与 `ash::Device` 必须比它活得更久。
pub struct RgVulkanDevice {
    device: ash::Device,
    allocator: vk_mem::Allocator,
    debug_utils: Option<ash::ext::debug_utils::Device>,

    image_allocations: HashMap<vk::Image, vk_mem::Allocation>,
    buffer_allocations: HashMap<vk::Buffer, vk_mem::Allocation>,
}

// new & init
impl RgVulkanDevice {
    /// # 参数
    /// - `enable_debug_utils`: 为创建的资源设置 debug name（需要 `VK_EXT_debug_utils`）
    pub fn new(
        instance: &ash::Instance,
        pdevice: vk::PhysicalDevice,
        device: &ash::Device,
        enable_debug_utils: bool,
    ) -> anyhow::Result<Self> {
        let _span = tracy_client::span!("RgVulkanDevice::new");

        let mut vma_ci = vk_mem::AllocatorCreateInfo::new(instance, device, pdevice);
        vma_ci.vulkan_api_version = vk::API_VERSION_1_3;
        let allocator = unsafe { vk_mem::Allocator::new(vma_ci) }.context("failed to create vk-mem allocator")?;

        Ok(Self {
            device: device.clone(),
            allocator,
            debug_utils: enable_debug_utils.then(|| ash::ext::debug_utils::Device::new(instance, device)),
            image_allocations: HashMap::new(),
            buffer_allocations: HashMap::new(),
        })
    }
}

impl Drop for RgVulkanDevice {
    fn drop(&mut self) {
        if !self.image_allocations.is_empty() || !self.buffer_allocations.is_empty() {
            log::warn!(
                "RgVulkanDevice dropped with {} images and {} buffers still alive",
                self.image_allocations.len(),
                self.buffer_allocations.len()
            );
        }
        // vk_mem 是 RAII 的
    }
}

// tools
impl RgVulkanDevice {
    fn set_debug_name<T: vk::Handle + Copy>(&self, handle: T, name: &str) {
        let Some(debug_utils) = &self.debug_utils else {
            return;
        };
        let Ok(name) = CString::new(name) else {
            return;
        };
        let result = unsafe {
            debug_utils.set_debug_utils_object_name(
                &vk::DebugUtilsObjectNameInfoEXT::default().object_name(name.as_c_str()).object_handle(handle),
            )
        };
        if let Err(e) = result {
            log::warn!("failed to set debug name {:?}: {:?}", name, e);
        }
    }
}

impl RgDevice for RgVulkanDevice {
    fn create_image(&mut self, name: &str, desc: &RgImageDesc) -> Result<RgNativeImage, vk::Result> {
        let _span = tracy_client::span!("RgVulkanDevice::create_image");

        let alloc_info = vk_mem::AllocationCreateInfo {
            usage: vk_mem::MemoryUsage::AutoPreferDevice,
            ..Default::default()
        };
        let (image, mut allocation) = unsafe { self.allocator.create_image(&desc.create_info(), &alloc_info)? };

        // 深度模板图像的视图只能包含一个 aspect
        let mut aspect = desc.aspect();
        if aspect.contains(vk::ImageAspectFlags::DEPTH) {
            aspect = vk::ImageAspectFlags::DEPTH;
        }
        let view_info = vk::ImageViewCreateInfo::default()
            .image(image)
            .view_type(desc.infer_view_type())
            .format(desc.format)
            .subresource_range(RgSubresourceRange::ALL.resolve(desc.mip_levels, desc.array_layers).to_vk(aspect));
        let view = match unsafe { self.device.create_image_view(&view_info, None) } {
            Ok(view) => view,
            Err(e) => {
                unsafe { self.allocator.destroy_image(image, &mut allocation) };
                return Err(e);
            }
        };

        self.set_debug_name(image, &format!("RgImage::{}", name));
        self.set_debug_name(view, &format!("RgImageView::{}", name));
        self.image_allocations.insert(image, allocation);
        Ok(RgNativeImage { image, view })
    }

    fn destroy_image(&mut self, image: RgNativeImage) {
        unsafe { self.device.destroy_image_view(image.view, None) };
        match self.image_allocations.remove(&image.image) {
            Some(mut allocation) => unsafe { self.allocator.destroy_image(image.image, &mut allocation) },
            None => log::warn!("RgVulkanDevice::destroy_image: {:?} was not created by this device", image.image),
        }
    }

    fn create_buffer(&mut self, name: &str, desc: &RgBufferDesc) -> Result<RgNativeBuffer, vk::Result> {
        let _span = tracy_client::span!("RgVulkanDevice::create_buffer");

        let alloc_info = vk_mem::AllocationCreateInfo {
            usage: vk_mem::MemoryUsage::AutoPreferDevice,
            ..Default::default()
        };
        let (buffer, allocation) = unsafe { self.allocator.create_buffer(&desc.create_info(), &alloc_info)? };

        self.set_debug_name(buffer, &format!("RgBuffer::{}", name));
        self.buffer_allocations.insert(buffer, allocation);
        Ok(RgNativeBuffer { buffer })
    }

    fn destroy_buffer(&mut self, buffer: RgNativeBuffer) {
        match self.buffer_allocations.remove(&buffer.buffer) {
            Some(mut allocation) => unsafe { self.allocator.destroy_buffer(buffer.buffer, &mut allocation) },
            None => log::warn!("RgVulkanDevice::destroy_buffer: {:?} was not created by this device", buffer.buffer),
        }
    }
}
