//! 资源状态跟踪
//!
//! compile 第 8 步按执行顺序模拟每个 Pass 的访问，
//! 对每个资源（图像按子资源区域）调用 [`compile_barrier`] 并记录产生的 barrier。
//! execute 时处理状态覆盖也复用同一套逻辑。

use ash::vk;
use slotmap::SecondaryMap;

use super::barrier::{RgBufferBarrierDesc, RgImageBarrierDesc, compile_barrier};
use super::resource_handle::{RgBufferHandle, RgImageHandle};
use super::resource_state::{RgResourceState, RgUsage};
use super::subresource::RgSubresourceRange;
use super::subresource_map::RgImageSubresourceMap;

pub(crate) struct RgStateTracker {
    images: SecondaryMap<RgImageHandle, RgImageSubresourceMap>,
    buffers: SecondaryMap<RgBufferHandle, RgResourceState>,
    /// graph 录制命令所在的队列族
    queue_family: u32,
}

// new & init
impl RgStateTracker {
    pub fn new(queue_family: u32) -> Self {
        Self {
            images: SecondaryMap::new(),
            buffers: SecondaryMap::new(),
            queue_family,
        }
    }

    pub fn init_image(&mut self, handle: RgImageHandle, mip_levels: u32, array_layers: u32, state: RgResourceState) {
        self.images.insert(handle, RgImageSubresourceMap::new(mip_levels, array_layers, state));
    }

    /// 直接使用一份已有的子资源状态表
    pub fn init_image_map(&mut self, handle: RgImageHandle, map: RgImageSubresourceMap) {
        self.images.insert(handle, map);
    }

    pub fn init_buffer(&mut self, handle: RgBufferHandle, state: RgResourceState) {
        self.buffers.insert(handle, state);
    }
}

// getters
impl RgStateTracker {
    #[inline]
    pub fn contains_image(&self, handle: RgImageHandle) -> bool {
        self.images.contains_key(handle)
    }

    #[inline]
    pub fn contains_buffer(&self, handle: RgBufferHandle) -> bool {
        self.buffers.contains_key(handle)
    }

    #[inline]
    pub fn image_map(&self, handle: RgImageHandle) -> Option<&RgImageSubresourceMap> {
        self.images.get(handle)
    }

    #[inline]
    pub fn buffer_state(&self, handle: RgBufferHandle) -> Option<RgResourceState> {
        self.buffers.get(handle).copied()
    }

    /// 拆出内部的状态表
    pub fn into_states(
        self,
    ) -> (SecondaryMap<RgImageHandle, RgImageSubresourceMap>, SecondaryMap<RgBufferHandle, RgResourceState>) {
        (self.images, self.buffers)
    }
}

// 访问与覆盖
impl RgStateTracker {
    /// 模拟一次图像访问
    ///
    /// 访问区域与多个状态不同的 slice 相交时，每一块分别计算 barrier。
    /// 未初始化的图像视为 `UNTOUCHED`。
    pub fn access_image(
        &mut self,
        handle: RgImageHandle,
        range: RgSubresourceRange,
        usage: &RgUsage,
        aspect: vk::ImageAspectFlags,
        out: &mut Vec<RgImageBarrierDesc>,
    ) {
        let Some(map) = self.images.get_mut(handle) else {
            log::warn!("image {:?} is accessed before its state is initialized", handle);
            return;
        };

        let parts: Vec<_> = map.overlapping(range).collect();
        for (part, prior) in parts {
            let (masks, next) = compile_barrier(&prior, usage, true, self.queue_family);
            if let Some(masks) = masks {
                out.push(RgImageBarrierDesc {
                    image: handle,
                    range: part,
                    aspect,
                    masks,
                });
            }
            map.set_state(part, next);
        }
    }

    pub fn access_buffer(&mut self, handle: RgBufferHandle, usage: &RgUsage, out: &mut Vec<RgBufferBarrierDesc>) {
        let prior = self.buffers.get(handle).copied().unwrap_or_default();
        let (masks, next) = compile_barrier(&prior, usage, false, self.queue_family);
        if let Some(masks) = masks {
            out.push(RgBufferBarrierDesc { buffer: handle, masks });
        }
        self.buffers.insert(handle, next);
    }

    /// 直接设置一个区域的状态
    pub fn override_image(&mut self, handle: RgImageHandle, range: RgSubresourceRange, state: RgResourceState) {
        if let Some(map) = self.images.get_mut(handle) {
            map.set_state(range, state);
        }
    }

    pub fn override_buffer(&mut self, handle: RgBufferHandle, state: RgResourceState) {
        self.buffers.insert(handle, state);
    }

    /// 丢弃图像内容
    ///
    /// 保留同步历史（之后的访问仍然等待之前的写入和读取），layout 变为 `UNDEFINED`，
    /// 整张图像收拢为一个 slice。
    pub fn discard_image(&mut self, handle: RgImageHandle) {
        if let Some(map) = self.images.get_mut(handle) {
            let mut state = map.query_state(map.full_range());
            state.layout = vk::ImageLayout::UNDEFINED;
            let (mip_levels, array_layers) = (map.mip_levels(), map.array_layers());
            map.reset_state(mip_levels, array_layers, state);
        }
    }
}

#[cfg(test)]
mod tests {
    use slotmap::SlotMap;

    use super::*;
    use crate::render_graph::resource_state::{RgAccessKind, RgBufferState, RgImageState};

    fn image_key() -> RgImageHandle {
        let mut keys: SlotMap<RgImageHandle, ()> = SlotMap::with_key();
        keys.insert(())
    }

    #[test]
    fn test_per_mip_barriers() {
        let image = image_key();
        let mut tracker = RgStateTracker::new(vk::QUEUE_FAMILY_IGNORED);
        tracker.init_image(image, 4, 1, RgResourceState::UNTOUCHED);

        let mut barriers = Vec::new();
        let write = RgUsage::image(RgAccessKind::Write, RgImageState::TRANSFER_DST);
        tracker.access_image(image, RgSubresourceRange::new(0, 1, 0, 1), &write, vk::ImageAspectFlags::COLOR, &mut barriers);
        assert_eq!(barriers.len(), 1);
        assert_eq!(tracker.image_map(image).unwrap().slices().len(), 2);

        // 整张图像读取：mip 0 与 mip 1..4 状态不同，各自一个 barrier
        barriers.clear();
        let read = RgUsage::image(RgAccessKind::Read, RgImageState::SHADER_READ_FRAGMENT);
        tracker.access_image(image, RgSubresourceRange::ALL, &read, vk::ImageAspectFlags::COLOR, &mut barriers);
        assert_eq!(barriers.len(), 2);

        let from_write = barriers.iter().find(|b| b.range.base_mip == 0).unwrap();
        assert_eq!(from_write.masks.src_access, vk::AccessFlags2::TRANSFER_WRITE);
        assert_eq!(from_write.masks.old_layout, vk::ImageLayout::TRANSFER_DST_OPTIMAL);

        let untouched = barriers.iter().find(|b| b.range.base_mip == 1).unwrap();
        assert_eq!(untouched.masks.old_layout, vk::ImageLayout::UNDEFINED);
        assert_eq!(untouched.range.mip_count, 3);
    }

    #[test]
    fn test_discard_keeps_sync_history() {
        let image = image_key();
        let mut tracker = RgStateTracker::new(vk::QUEUE_FAMILY_IGNORED);
        tracker.init_image(
            image,
            1,
            1,
            RgResourceState::from_image_state(RgImageState::COLOR_ATTACHMENT_WRITE, vk::QUEUE_FAMILY_IGNORED),
        );

        tracker.discard_image(image);
        let state = tracker.image_map(image).unwrap().query_state(RgSubresourceRange::ALL);
        assert_eq!(state.layout, vk::ImageLayout::UNDEFINED);
        assert_eq!(state.write_stage, vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT);
    }

    #[test]
    fn test_buffer_tracking() {
        let mut keys: SlotMap<RgBufferHandle, ()> = SlotMap::with_key();
        let buffer = keys.insert(());
        let mut tracker = RgStateTracker::new(vk::QUEUE_FAMILY_IGNORED);

        let mut barriers = Vec::new();
        tracker.access_buffer(buffer, &RgUsage::buffer(RgAccessKind::Write, RgBufferState::TRANSFER_DST), &mut barriers);
        assert!(barriers.is_empty());

        tracker.access_buffer(buffer, &RgUsage::buffer(RgAccessKind::Read, RgBufferState::VERTEX_BUFFER), &mut barriers);
        assert_eq!(barriers.len(), 1);
        assert_eq!(barriers[0].masks.src_stage, vk::PipelineStageFlags2::TRANSFER);
    }
}
