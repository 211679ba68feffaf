//! 图像子资源范围
//!
//! mip level × array layer 两个半开区间构成的矩形区域。

use ash::vk;

/// 图像子资源范围
///
/// `mip_count` / `layer_count` 可以是 [`RgSubresourceRange::REMAINING`]，
/// 在 compile 时通过 [`RgSubresourceRange::resolve`] 展开为具体数值。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RgSubresourceRange {
    pub base_mip: u32,
    pub mip_count: u32,
    pub base_layer: u32,
    pub layer_count: u32,
}

impl Default for RgSubresourceRange {
    fn default() -> Self {
        Self::ALL
    }
}

// new & 常量定义
impl RgSubresourceRange {
    /// 表示"直到最后一个 mip / layer"
    pub const REMAINING: u32 = vk::REMAINING_MIP_LEVELS;

    /// 整个图像
    pub const ALL: Self = Self::new(0, Self::REMAINING, 0, Self::REMAINING);

    #[inline]
    pub const fn new(base_mip: u32, mip_count: u32, base_layer: u32, layer_count: u32) -> Self {
        Self {
            base_mip,
            mip_count,
            base_layer,
            layer_count,
        }
    }

    /// 单个 mip level 的所有 layer
    #[inline]
    pub const fn mip(level: u32) -> Self {
        Self::new(level, 1, 0, Self::REMAINING)
    }

    /// 单个 array layer 的所有 mip
    #[inline]
    pub const fn layer(layer: u32) -> Self {
        Self::new(0, Self::REMAINING, layer, 1)
    }
}

// 区间运算
impl RgSubresourceRange {
    #[inline]
    pub fn mip_end(&self) -> u32 {
        self.base_mip.saturating_add(self.mip_count)
    }

    #[inline]
    pub fn layer_end(&self) -> u32 {
        self.base_layer.saturating_add(self.layer_count)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.mip_count == 0 || self.layer_count == 0
    }

    /// 将 `REMAINING` 展开，并裁剪到图像的实际范围内
    pub fn resolve(&self, mip_levels: u32, array_layers: u32) -> Self {
        let base_mip = self.base_mip.min(mip_levels);
        let base_layer = self.base_layer.min(array_layers);
        let mip_count = if self.mip_count == Self::REMAINING {
            mip_levels - base_mip
        } else {
            self.mip_count.min(mip_levels - base_mip)
        };
        let layer_count = if self.layer_count == Self::REMAINING {
            array_layers - base_layer
        } else {
            self.layer_count.min(array_layers - base_layer)
        };

        Self::new(base_mip, mip_count, base_layer, layer_count)
    }

    /// 两个区间在 mip 和 layer 方向上都相交
    #[inline]
    pub fn overlaps(&self, other: &Self) -> bool {
        self.base_mip < other.mip_end()
            && other.base_mip < self.mip_end()
            && self.base_layer < other.layer_end()
            && other.base_layer < self.layer_end()
    }

    /// `other` 在 mip 和 layer 方向上都嵌套在 `self` 内
    #[inline]
    pub fn contains(&self, other: &Self) -> bool {
        self.base_mip <= other.base_mip
            && other.mip_end() <= self.mip_end()
            && self.base_layer <= other.base_layer
            && other.layer_end() <= self.layer_end()
    }

    pub fn intersect(&self, other: &Self) -> Option<Self> {
        if !self.overlaps(other) {
            return None;
        }

        let base_mip = self.base_mip.max(other.base_mip);
        let base_layer = self.base_layer.max(other.base_layer);
        let mip_end = self.mip_end().min(other.mip_end());
        let layer_end = self.layer_end().min(other.layer_end());

        Some(Self::new(base_mip, mip_end - base_mip, base_layer, layer_end - base_layer))
    }

    /// `self` 去掉与 `other` 相交部分后剩下的区域，最多拆成 4 个互不相交的矩形
    ///
    /// 不相交时返回 `self` 本身。
    pub fn subtract(&self, other: &Self) -> Vec<Self> {
        let Some(inter) = self.intersect(other) else {
            return vec![*self];
        };

        [
            // inter 上方和下方的 mip，覆盖 self 的全部 layer
            Self::new(self.base_mip, inter.base_mip - self.base_mip, self.base_layer, self.layer_count),
            Self::new(inter.mip_end(), self.mip_end() - inter.mip_end(), self.base_layer, self.layer_count),
            // inter 所在 mip 范围内，左右两侧的 layer
            Self::new(inter.base_mip, inter.mip_count, self.base_layer, inter.base_layer - self.base_layer),
            Self::new(inter.base_mip, inter.mip_count, inter.layer_end(), self.layer_end() - inter.layer_end()),
        ]
        .into_iter()
        .filter(|rest| !rest.is_empty())
        .collect()
    }

    /// 两个区间的并集恰好是一个矩形时返回该矩形
    ///
    /// 即一个包含另一个，或者在一个方向上跨度相同、另一个方向上相交或相邻。
    pub fn exact_union(&self, other: &Self) -> Option<Self> {
        if self.contains(other) {
            return Some(*self);
        }
        if other.contains(self) {
            return Some(*other);
        }

        let same_mips = self.base_mip == other.base_mip && self.mip_end() == other.mip_end();
        let same_layers = self.base_layer == other.base_layer && self.layer_end() == other.layer_end();
        let mips_touch = self.base_mip <= other.mip_end() && other.base_mip <= self.mip_end();
        let layers_touch = self.base_layer <= other.layer_end() && other.base_layer <= self.layer_end();

        ((same_mips && layers_touch) || (same_layers && mips_touch)).then(|| self.bounding(other))
    }

    /// 同时包含两个区间的最小区间
    pub fn bounding(&self, other: &Self) -> Self {
        let base_mip = self.base_mip.min(other.base_mip);
        let base_layer = self.base_layer.min(other.base_layer);
        let mip_end = self.mip_end().max(other.mip_end());
        let layer_end = self.layer_end().max(other.layer_end());

        Self::new(base_mip, mip_end - base_mip, base_layer, layer_end - base_layer)
    }

    #[inline]
    pub fn to_vk(&self, aspect: vk::ImageAspectFlags) -> vk::ImageSubresourceRange {
        vk::ImageSubresourceRange::default()
            .aspect_mask(aspect)
            .base_mip_level(self.base_mip)
            .level_count(self.mip_count)
            .base_array_layer(self.base_layer)
            .layer_count(self.layer_count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_remaining() {
        let range = RgSubresourceRange::ALL.resolve(4, 6);
        assert_eq!(range, RgSubresourceRange::new(0, 4, 0, 6));

        let range = RgSubresourceRange::mip(2).resolve(4, 6);
        assert_eq!(range, RgSubresourceRange::new(2, 1, 0, 6));

        // 超出范围的部分被裁剪
        let range = RgSubresourceRange::new(3, 5, 5, 5).resolve(4, 6);
        assert_eq!(range, RgSubresourceRange::new(3, 1, 5, 1));
    }

    #[test]
    fn test_overlap_requires_both_axes() {
        let a = RgSubresourceRange::new(0, 2, 0, 2);
        let b = RgSubresourceRange::new(1, 2, 2, 2);
        let c = RgSubresourceRange::new(1, 2, 1, 2);

        // mip 相交，但 layer 只是相邻
        assert!(!a.overlaps(&b));
        assert!(a.overlaps(&c));
        assert!(c.overlaps(&a));
    }

    #[test]
    fn test_contains_and_intersect() {
        let outer = RgSubresourceRange::new(0, 4, 0, 4);
        let inner = RgSubresourceRange::new(1, 2, 1, 1);
        let crossing = RgSubresourceRange::new(3, 3, 2, 4);

        assert!(outer.contains(&inner));
        assert!(!inner.contains(&outer));
        assert!(!outer.contains(&crossing));

        assert_eq!(outer.intersect(&crossing), Some(RgSubresourceRange::new(3, 1, 2, 2)));
        assert_eq!(inner.intersect(&RgSubresourceRange::new(3, 1, 0, 4)), None);
        assert_eq!(inner.bounding(&crossing), RgSubresourceRange::new(1, 5, 1, 5));
    }

    #[test]
    fn test_subtract() {
        let outer = RgSubresourceRange::new(0, 4, 0, 4);

        // 中心一块：上下两条 mip 带 + 左右两块 layer
        let rest = outer.subtract(&RgSubresourceRange::new(1, 2, 1, 2));
        assert_eq!(
            rest,
            vec![
                RgSubresourceRange::new(0, 1, 0, 4),
                RgSubresourceRange::new(3, 1, 0, 4),
                RgSubresourceRange::new(1, 2, 0, 1),
                RgSubresourceRange::new(1, 2, 3, 1),
            ]
        );
        let remaining: u32 = rest.iter().map(|r| r.mip_count * r.layer_count).sum();
        assert_eq!(remaining, 16 - 4);

        // 完全覆盖时没有剩余；不相交时保持原样
        assert!(outer.subtract(&RgSubresourceRange::new(0, 8, 0, 8)).is_empty());
        let far = RgSubresourceRange::new(5, 1, 0, 1);
        assert_eq!(outer.subtract(&far), vec![outer]);
    }

    #[test]
    fn test_exact_union() {
        let mips_0_1 = RgSubresourceRange::new(0, 2, 0, 4);
        let mip_2 = RgSubresourceRange::new(2, 1, 0, 4);
        assert_eq!(mips_0_1.exact_union(&mip_2), Some(RgSubresourceRange::new(0, 3, 0, 4)));

        // 包含关系的并集就是外层区间
        let inner = RgSubresourceRange::new(1, 1, 1, 1);
        assert_eq!(mips_0_1.exact_union(&inner), Some(mips_0_1));

        // 十字形的并集不是矩形
        let column = RgSubresourceRange::new(0, 3, 0, 1);
        let row = RgSubresourceRange::new(1, 1, 0, 4);
        assert_eq!(column.exact_union(&row), None);

        // 对角的两块也不是
        let corner = RgSubresourceRange::new(2, 1, 3, 1);
        assert_eq!(inner.exact_union(&corner), None);
    }
}
