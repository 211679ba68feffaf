//! 编译结果
//!
//! - [`RgSyncPlan`]：执行顺序、每个 Pass 的 barrier、状态快照、最终状态（compile 第 3~8 步）
//! - [`RgResolvedPass`]：渲染目标与 descriptor 写入（compile 第 9 步）
//! - [`RgPhysicalResources`]：虚拟句柄 → 物理对象
//!
//! `RgSyncPlan` 只依赖 graph 结构和临时资源分配，结构不变时可以跨帧复用；
//! 复用时通过 [`RgSyncPlan::remap`] 把上一帧的句柄换成本帧的句柄。

use std::collections::HashMap;

use ash::vk;
use slotmap::SecondaryMap;

use super::barrier::{RgBufferBarrierDesc, RgImageBarrierDesc, RgPassBarriers};
use super::dependency_graph::RgDependencyGraph;
use super::device::{RgNativeBuffer, RgNativeImage};
use super::render_target::RgRenderingInfo;
use super::resource_handle::{RgBufferHandle, RgImageHandle};
use super::resource_state::RgResourceState;
use super::subresource_map::RgImageSubresourceMap;

/// descriptor 写入的资源信息
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RgDescriptorInfo {
    Image {
        sampler: vk::Sampler,
        view: vk::ImageView,
        layout: vk::ImageLayout,
    },
    Buffer {
        buffer: vk::Buffer,
        offset: vk::DeviceSize,
        range: vk::DeviceSize,
    },
}

/// 一次 push descriptor 写入
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RgDescriptorWrite {
    pub set: u32,
    pub binding: u32,
    pub descriptor_type: vk::DescriptorType,
    pub info: RgDescriptorInfo,
}

/// 虚拟句柄到物理资源的映射
#[derive(Default)]
pub(crate) struct RgPhysicalResources {
    pub images: SecondaryMap<RgImageHandle, RgNativeImage>,
    pub buffers: SecondaryMap<RgBufferHandle, RgNativeBuffer>,
}

impl RgPhysicalResources {
    #[inline]
    pub fn image(&self, handle: RgImageHandle) -> Option<RgNativeImage> {
        self.images.get(handle).copied()
    }

    #[inline]
    pub fn buffer(&self, handle: RgBufferHandle) -> Option<RgNativeBuffer> {
        self.buffers.get(handle).copied()
    }
}

/// 单个 Pass 的同步信息
#[derive(Clone, Debug, Default)]
pub(crate) struct RgPassSync {
    /// 在 `RenderGraph::passes` 中的索引（声明顺序）
    pub pass_index: usize,
    /// Pass 执行前需要的 barrier
    pub barriers: RgPassBarriers,
    /// 本 Pass 访问的每张图像所使用的 layout
    pub image_layouts: Vec<(RgImageHandle, vk::ImageLayout)>,
    /// Pass 执行之后被访问资源的状态快照，execute 时处理状态覆盖用
    pub post_images: Vec<(RgImageHandle, RgImageSubresourceMap)>,
    pub post_buffers: Vec<(RgBufferHandle, RgResourceState)>,
}

impl RgPassSync {
    pub fn image_layout(&self, handle: RgImageHandle) -> Option<vk::ImageLayout> {
        self.image_layouts.iter().find(|(h, _)| *h == handle).map(|(_, layout)| *layout)
    }

    pub fn post_image(&self, handle: RgImageHandle) -> Option<&RgImageSubresourceMap> {
        self.post_images.iter().find(|(h, _)| *h == handle).map(|(_, map)| map)
    }

    pub fn post_buffer(&self, handle: RgBufferHandle) -> Option<RgResourceState> {
        self.post_buffers.iter().find(|(h, _)| *h == handle).map(|(_, state)| *state)
    }
}

/// 同步计划
#[derive(Clone, Debug, Default)]
pub(crate) struct RgSyncPlan {
    /// 执行顺序（Pass 索引）
    pub order: Vec<usize>,
    /// 按执行顺序排列
    pub passes: Vec<RgPassSync>,
    /// 所有 Pass 执行之后的资源状态
    pub final_images: SecondaryMap<RgImageHandle, RgImageSubresourceMap>,
    pub final_buffers: SecondaryMap<RgBufferHandle, RgResourceState>,
}

impl RgSyncPlan {
    /// 把计划中的句柄替换为本帧的句柄
    ///
    /// 映射表中不存在的句柄说明结构发生了变化，返回 `None`。
    pub fn remap(
        &self,
        images: &HashMap<RgImageHandle, RgImageHandle>,
        buffers: &HashMap<RgBufferHandle, RgBufferHandle>,
    ) -> Option<Self> {
        let image = |handle: RgImageHandle| images.get(&handle).copied();
        let buffer = |handle: RgBufferHandle| buffers.get(&handle).copied();

        let mut passes = Vec::with_capacity(self.passes.len());
        for sync in &self.passes {
            let image_barriers = sync
                .barriers
                .image_barriers
                .iter()
                .map(|desc| Some(RgImageBarrierDesc { image: image(desc.image)?, ..*desc }))
                .collect::<Option<Vec<_>>>()?;
            let buffer_barriers = sync
                .barriers
                .buffer_barriers
                .iter()
                .map(|desc| Some(RgBufferBarrierDesc { buffer: buffer(desc.buffer)?, ..*desc }))
                .collect::<Option<Vec<_>>>()?;

            passes.push(RgPassSync {
                pass_index: sync.pass_index,
                barriers: RgPassBarriers {
                    image_barriers,
                    buffer_barriers,
                },
                image_layouts: sync
                    .image_layouts
                    .iter()
                    .map(|(h, layout)| Some((image(*h)?, *layout)))
                    .collect::<Option<_>>()?,
                post_images: sync
                    .post_images
                    .iter()
                    .map(|(h, map)| Some((image(*h)?, map.clone())))
                    .collect::<Option<_>>()?,
                post_buffers: sync
                    .post_buffers
                    .iter()
                    .map(|(h, state)| Some((buffer(*h)?, *state)))
                    .collect::<Option<_>>()?,
            });
        }

        let mut final_images = SecondaryMap::new();
        for (h, map) in &self.final_images {
            final_images.insert(image(h)?, map.clone());
        }
        let mut final_buffers = SecondaryMap::new();
        for (h, state) in &self.final_buffers {
            final_buffers.insert(buffer(h)?, *state);
        }

        Some(Self {
            order: self.order.clone(),
            passes,
            final_images,
            final_buffers,
        })
    }
}

/// compile 第 9 步的结果
#[derive(Clone, Debug, Default)]
pub(crate) struct RgResolvedPass {
    pub rendering: Option<RgRenderingInfo>,
    /// 按 (set, binding) 排序
    pub descriptor_writes: Vec<RgDescriptorWrite>,
}

/// 完整的编译结果
#[derive(Default)]
pub(crate) struct RgCompiledGraph {
    pub plan: RgSyncPlan,
    /// 与 `plan.passes` 一一对应
    pub resolved: Vec<RgResolvedPass>,
    pub physical: RgPhysicalResources,
    /// 本帧的依赖图，缓存命中时同样重新计算
    pub dependencies: RgDependencyGraph,
}
