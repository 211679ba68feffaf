//! 图像子资源状态表
//!
//! 把一张图像的 mip × layer 空间划分为互不重叠、并集为整张图像的若干 slice，
//! 每个 slice 携带一份 [`RgResourceState`]。
//!
//! 大多数图像在整个生命周期内只有一个 slice；只有按 mip / layer 分别访问时才会被拆分，
//! 因此用 `Vec` + 线性扫描即可。

use super::resource_state::RgResourceState;
use super::subresource::RgSubresourceRange;

/// 状态一致的一块子资源区域
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RgSubresourceSlice {
    pub range: RgSubresourceRange,
    pub state: RgResourceState,
}

/// 单张图像的子资源状态表
#[derive(Clone, Debug)]
pub struct RgImageSubresourceMap {
    mip_levels: u32,
    array_layers: u32,
    slices: Vec<RgSubresourceSlice>,
}

// new & init
impl RgImageSubresourceMap {
    pub fn new(mip_levels: u32, array_layers: u32, state: RgResourceState) -> Self {
        let mut map = Self {
            mip_levels,
            array_layers,
            slices: Vec::with_capacity(1),
        };
        map.reset_state(mip_levels, array_layers, state);
        map
    }

    /// 重新初始化为单个 slice
    ///
    /// 复用已有的 `Vec`，截断到长度 1。
    pub fn reset_state(&mut self, mip_levels: u32, array_layers: u32, state: RgResourceState) {
        self.mip_levels = mip_levels;
        self.array_layers = array_layers;

        let slice = RgSubresourceSlice {
            range: RgSubresourceRange::new(0, mip_levels, 0, array_layers),
            state,
        };
        if self.slices.is_empty() {
            self.slices.push(slice);
        } else {
            self.slices.truncate(1);
            self.slices[0] = slice;
        }
    }
}

// getters
impl RgImageSubresourceMap {
    #[inline]
    pub fn mip_levels(&self) -> u32 {
        self.mip_levels
    }

    #[inline]
    pub fn array_layers(&self) -> u32 {
        self.array_layers
    }

    #[inline]
    pub fn full_range(&self) -> RgSubresourceRange {
        RgSubresourceRange::new(0, self.mip_levels, 0, self.array_layers)
    }

    #[inline]
    pub fn slices(&self) -> &[RgSubresourceSlice] {
        &self.slices
    }

    #[inline]
    pub fn is_uniform(&self) -> bool {
        self.slices.len() == 1
    }
}

// 查询与更新
impl RgImageSubresourceMap {
    /// 查询一个区域的状态
    ///
    /// 跨多个 slice 时返回合并后的状态（见 [`RgResourceState::merge`]）；
    /// 与任何 slice 都不相交时返回 [`RgResourceState::UNTOUCHED`]。
    pub fn query_state(&self, range: RgSubresourceRange) -> RgResourceState {
        let range = range.resolve(self.mip_levels, self.array_layers);

        let mut merged: Option<RgResourceState> = None;
        for slice in self.slices.iter().filter(|slice| slice.range.overlaps(&range)) {
            merged = Some(match merged {
                None => slice.state,
                Some(state) => state.merge(&slice.state),
            });
        }

        merged.unwrap_or_default()
    }

    /// 与 `range` 相交的每一块区域（已裁剪到 `range` 内）及其状态
    pub fn overlapping(
        &self,
        range: RgSubresourceRange,
    ) -> impl Iterator<Item = (RgSubresourceRange, RgResourceState)> + '_ {
        let range = range.resolve(self.mip_levels, self.array_layers);
        self.slices.iter().filter_map(move |slice| slice.range.intersect(&range).map(|part| (part, slice.state)))
    }

    /// 把 `range` 内的状态设为 `state`
    ///
    /// 与 `range` 部分相交的 slice 最多被拆成 4 块剩余区域，`range` 本身作为一个新 slice。
    pub fn set_state(&mut self, range: RgSubresourceRange, state: RgResourceState) {
        let range = range.resolve(self.mip_levels, self.array_layers);
        if range.is_empty() {
            return;
        }
        if range == self.full_range() {
            self.reset_state(self.mip_levels, self.array_layers, state);
            return;
        }

        let old_slices = std::mem::take(&mut self.slices);
        let mut slices = Vec::with_capacity(old_slices.len() + 4);

        for slice in old_slices {
            if !slice.range.overlaps(&range) {
                slices.push(slice);
                continue;
            }
            slices.extend(slice.range.subtract(&range).into_iter().map(|rest| RgSubresourceSlice {
                range: rest,
                state: slice.state,
            }));
        }

        slices.push(RgSubresourceSlice { range, state });
        self.slices = slices;
        self.collapse_if_uniform();
    }

    /// 所有 slice 状态相同时合并回单个 slice
    fn collapse_if_uniform(&mut self) {
        let Some(first) = self.slices.first().map(|slice| slice.state) else {
            return;
        };
        if self.slices.len() > 1 && self.slices.iter().all(|slice| slice.state == first) {
            self.reset_state(self.mip_levels, self.array_layers, first);
        }
    }
}
