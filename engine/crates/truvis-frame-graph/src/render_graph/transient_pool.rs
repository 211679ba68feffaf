//! 临时资源池
//!
//! 临时资源按描述（[`RgImageDesc`] / [`RgBufferDesc`]）匹配复用：
//! - 跨帧：`reset()` 把本帧使用的资源归还到池中，下一帧 compile 时优先取回上一帧同一资源使用的条目
//! - 帧内：生命周期不重叠且描述相同的两个临时资源共享一个条目（由 `RenderGraph::compile` 决定）
//!
//! 池中的资源只在空闲超过 `max_idle_frames` 帧或 `destroy()` 时才真正销毁。

use ash::vk;
use slotmap::SlotMap;

use super::buffer_resource::RgBufferDesc;
use super::device::{RgDevice, RgNativeBuffer, RgNativeImage};
use super::image_resource::RgImageDesc;

slotmap::new_key_type! {
    /// 池中图像条目的 key
    pub struct RgPooledImageKey;

    /// 池中缓冲区条目的 key
    pub struct RgPooledBufferKey;
}

struct RgPooledEntry<D, N> {
    desc: D,
    native: N,
    /// 当前帧已被某个临时资源占用
    in_use: bool,
    /// 当前帧被使用过（用于空闲计数）
    used_this_frame: bool,
    /// 连续未被使用的帧数
    idle_frames: u32,
}

impl<D, N> RgPooledEntry<D, N> {
    fn new(desc: D, native: N) -> Self {
        Self {
            desc,
            native,
            in_use: true,
            used_this_frame: true,
            idle_frames: 0,
        }
    }

    fn take(&mut self) {
        self.in_use = true;
        self.used_this_frame = true;
        self.idle_frames = 0;
    }

    fn end_frame(&mut self) {
        if self.used_this_frame {
            self.idle_frames = 0;
        } else {
            self.idle_frames += 1;
        }
        self.in_use = false;
        self.used_this_frame = false;
    }
}

/// acquire 的结果
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct RgAcquired<K, N> {
    pub key: K,
    pub native: N,
    /// 是否复用了池中已有的条目
    pub reused: bool,
}

#[derive(Default)]
pub(crate) struct RgTransientPool {
    images: SlotMap<RgPooledImageKey, RgPooledEntry<RgImageDesc, RgNativeImage>>,
    buffers: SlotMap<RgPooledBufferKey, RgPooledEntry<RgBufferDesc, RgNativeBuffer>>,
}

// 图像
impl RgTransientPool {
    /// 取出一个描述匹配的空闲图像，没有时通过 device 创建
    ///
    /// `hint` 是上一帧同一资源使用的条目，仍然空闲且描述相同时优先使用。
    pub fn acquire_image(
        &mut self,
        device: &mut dyn RgDevice,
        name: &str,
        desc: &RgImageDesc,
        hint: Option<RgPooledImageKey>,
    ) -> Result<RgAcquired<RgPooledImageKey, RgNativeImage>, vk::Result> {
        let hinted = hint.filter(|key| self.images.get(*key).is_some_and(|e| !e.in_use && e.desc == *desc));
        let found = hinted.or_else(|| self.images.iter().find(|(_, e)| !e.in_use && e.desc == *desc).map(|(key, _)| key));

        if let Some((key, entry)) = found.and_then(|key| self.images.get_mut(key).map(|entry| (key, entry))) {
            entry.take();
            return Ok(RgAcquired {
                key,
                native: entry.native,
                reused: true,
            });
        }

        let native = device.create_image(name, desc)?;
        log::debug!("transient pool: created image \"{}\" {}x{} {:?}", name, desc.width, desc.height, desc.format);
        let key = self.images.insert(RgPooledEntry::new(*desc, native));
        Ok(RgAcquired {
            key,
            native,
            reused: false,
        })
    }

    /// 在帧内把条目还给池（compile 失败时回滚用）
    pub fn release_image(&mut self, key: RgPooledImageKey) {
        if let Some(entry) = self.images.get_mut(key) {
            entry.in_use = false;
        }
    }

    #[inline]
    pub fn image_count(&self) -> usize {
        self.images.len()
    }
}

// 缓冲区
impl RgTransientPool {
    pub fn acquire_buffer(
        &mut self,
        device: &mut dyn RgDevice,
        name: &str,
        desc: &RgBufferDesc,
        hint: Option<RgPooledBufferKey>,
    ) -> Result<RgAcquired<RgPooledBufferKey, RgNativeBuffer>, vk::Result> {
        let hinted = hint.filter(|key| self.buffers.get(*key).is_some_and(|e| !e.in_use && e.desc == *desc));
        let found =
            hinted.or_else(|| self.buffers.iter().find(|(_, e)| !e.in_use && e.desc == *desc).map(|(key, _)| key));

        if let Some((key, entry)) = found.and_then(|key| self.buffers.get_mut(key).map(|entry| (key, entry))) {
            entry.take();
            return Ok(RgAcquired {
                key,
                native: entry.native,
                reused: true,
            });
        }

        let native = device.create_buffer(name, desc)?;
        log::debug!("transient pool: created buffer \"{}\" ({} bytes)", name, desc.size);
        let key = self.buffers.insert(RgPooledEntry::new(*desc, native));
        Ok(RgAcquired {
            key,
            native,
            reused: false,
        })
    }

    pub fn release_buffer(&mut self, key: RgPooledBufferKey) {
        if let Some(entry) = self.buffers.get_mut(key) {
            entry.in_use = false;
        }
    }

    #[inline]
    pub fn buffer_count(&self) -> usize {
        self.buffers.len()
    }
}

// 帧生命周期
impl RgTransientPool {
    /// 帧结束：归还所有条目，更新空闲计数。不销毁任何物理资源。
    pub fn end_frame(&mut self) {
        self.images.values_mut().for_each(RgPooledEntry::end_frame);
        self.buffers.values_mut().for_each(RgPooledEntry::end_frame);
    }

    /// 销毁空闲超过 `max_idle_frames` 帧的条目
    pub fn trim(&mut self, device: &mut dyn RgDevice, max_idle_frames: u32) {
        let _span = tracy_client::span!("RgTransientPool::trim");

        self.images.retain(|_, entry| {
            let keep = entry.in_use || entry.idle_frames <= max_idle_frames;
            if !keep {
                device.destroy_image(entry.native);
            }
            keep
        });
        self.buffers.retain(|_, entry| {
            let keep = entry.in_use || entry.idle_frames <= max_idle_frames;
            if !keep {
                device.destroy_buffer(entry.native);
            }
            keep
        });
    }

    /// 销毁池中所有资源
    ///
    /// 调用方需要保证 GPU 已经不再使用这些资源。
    pub fn destroy(&mut self, device: &mut dyn RgDevice) {
        for (_, entry) in self.images.drain() {
            device.destroy_image(entry.native);
        }
        for (_, entry) in self.buffers.drain() {
            device.destroy_buffer(entry.native);
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.images.is_empty() && self.buffers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::MockDevice;

    fn desc() -> RgImageDesc {
        RgImageDesc::new_2d(64, 64, vk::Format::R16G16B16A16_SFLOAT, vk::ImageUsageFlags::STORAGE)
    }

    #[test]
    fn test_reuse_across_frames() {
        let mut device = MockDevice::default();
        let mut pool = RgTransientPool::default();

        let first = pool.acquire_image(&mut device, "hdr", &desc(), None).unwrap();
        assert!(!first.reused);

        // 同一帧内条目被占用，需要新建
        let second = pool.acquire_image(&mut device, "hdr2", &desc(), None).unwrap();
        assert!(!second.reused);
        assert_eq!(device.created_images, 2);

        pool.end_frame();
        let again = pool.acquire_image(&mut device, "hdr", &desc(), Some(second.key)).unwrap();
        assert!(again.reused);
        assert_eq!(again.key, second.key);
        assert_eq!(device.created_images, 2);
    }

    #[test]
    fn test_desc_mismatch_allocates() {
        let mut device = MockDevice::default();
        let mut pool = RgTransientPool::default();

        pool.acquire_image(&mut device, "a", &desc(), None).unwrap();
        pool.end_frame();
        let other = desc().with_mip_levels(2);
        let acquired = pool.acquire_image(&mut device, "b", &other, None).unwrap();
        assert!(!acquired.reused);
        assert_eq!(pool.image_count(), 2);
    }

    #[test]
    fn test_trim_idle_entries() {
        let mut device = MockDevice::default();
        let mut pool = RgTransientPool::default();

        pool.acquire_buffer(&mut device, "b", &RgBufferDesc::new(256, vk::BufferUsageFlags::STORAGE_BUFFER), None)
            .unwrap();
        pool.end_frame();
        for _ in 0..2 {
            pool.end_frame();
            pool.trim(&mut device, 1);
        }
        assert_eq!(pool.buffer_count(), 0);
        assert_eq!(device.destroyed_buffers, 1);
    }

    #[test]
    fn test_allocation_failure() {
        let mut device = MockDevice::default();
        device.fail_allocations = true;
        let mut pool = RgTransientPool::default();

        let result = pool.acquire_image(&mut device, "a", &desc(), None);
        assert_eq!(result.unwrap_err(), vk::Result::ERROR_OUT_OF_DEVICE_MEMORY);
        assert!(pool.is_empty());
    }
}
