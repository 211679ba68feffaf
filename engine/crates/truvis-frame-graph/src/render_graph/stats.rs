use std::time::Duration;

use super::barrier::{RgBarrierKind, RgPassBarriers};

/// compile 各阶段耗时
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RgCompileTimings {
    /// 子资源范围展开、声明合并、descriptor 绑定推导
    pub finalize: Duration,
    /// 依赖图构建与拓扑排序
    pub schedule: Duration,
    /// 临时资源生命周期与分配
    pub allocate: Duration,
    /// 状态跟踪与 barrier 计算
    pub barriers: Duration,
    /// 渲染目标与 descriptor 解析
    pub resolve: Duration,
    pub total: Duration,
}

/// 只读统计信息
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RgStats {
    pub pass_count: usize,
    pub image_count: usize,
    pub buffer_count: usize,
    /// 本帧实际使用的临时资源数量
    pub transient_image_count: usize,
    pub transient_buffer_count: usize,
    /// 从 pool 中复用的次数（含帧内复用）
    pub pool_hits: usize,
    /// 新创建物理资源的次数
    pub pool_misses: usize,
    /// pool 中的物理资源总数
    pub pooled_image_count: usize,
    pub pooled_buffer_count: usize,

    pub image_barrier_count: usize,
    pub buffer_barrier_count: usize,
    pub memory_barriers: usize,
    pub execution_barriers: usize,
    pub layout_only_barriers: usize,
    /// 包含 layout 转换的 barrier（与种类统计有重叠）
    pub layout_transitions: usize,
    pub ownership_transfers: usize,

    /// 本次 compile 是否复用了上一次的结果
    pub cache_hit: bool,
    pub timings: RgCompileTimings,
}

impl RgStats {
    pub(crate) fn reset_barrier_counts(&mut self) {
        self.image_barrier_count = 0;
        self.buffer_barrier_count = 0;
        self.memory_barriers = 0;
        self.execution_barriers = 0;
        self.layout_only_barriers = 0;
        self.layout_transitions = 0;
        self.ownership_transfers = 0;
    }

    pub(crate) fn count_barriers(&mut self, barriers: &RgPassBarriers) {
        self.image_barrier_count += barriers.image_barrier_count();
        self.buffer_barrier_count += barriers.buffer_barrier_count();

        for masks in barriers.masks() {
            match masks.kind() {
                RgBarrierKind::Memory => self.memory_barriers += 1,
                RgBarrierKind::ExecutionOnly => self.execution_barriers += 1,
                RgBarrierKind::LayoutOnly => self.layout_only_barriers += 1,
            }
            if masks.has_layout_transition() {
                self.layout_transitions += 1;
            }
            if masks.is_ownership_transfer() {
                self.ownership_transfers += 1;
            }
        }
    }

    /// barrier 总数
    #[inline]
    pub fn barrier_count(&self) -> usize {
        self.image_barrier_count + self.buffer_barrier_count
    }
}
