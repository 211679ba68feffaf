use ash::vk;

/// RenderGraph 配置
#[derive(Clone, Debug)]
pub struct RgGraphConfig {
    /// graph 录制命令所在的队列族
    ///
    /// 导入资源声明了不同的队列族时，首次使用会生成 acquire barrier。
    /// `QUEUE_FAMILY_IGNORED` 表示不做所有权检查。
    pub queue_family_index: u32,
    /// 结构与临时资源分配都没有变化时，复用上一次的编译结果
    pub enable_compile_cache: bool,
    /// 每个 Pass 外包一层 debug label
    pub debug_labels: bool,
    /// pool 中的资源连续多少帧未被使用后销毁
    pub max_idle_frames: u32,
    /// 每次完整编译后打印执行计划
    pub print_execution_plan: bool,
}

impl Default for RgGraphConfig {
    fn default() -> Self {
        Self {
            queue_family_index: vk::QUEUE_FAMILY_IGNORED,
            enable_compile_cache: true,
            debug_labels: true,
            max_idle_frames: 3,
            print_execution_plan: false,
        }
    }
}

// builder
impl RgGraphConfig {
    #[inline]
    pub fn with_queue_family_index(mut self, queue_family_index: u32) -> Self {
        self.queue_family_index = queue_family_index;
        self
    }

    #[inline]
    pub fn with_compile_cache(mut self, enable: bool) -> Self {
        self.enable_compile_cache = enable;
        self
    }

    #[inline]
    pub fn with_debug_labels(mut self, enable: bool) -> Self {
        self.debug_labels = enable;
        self
    }

    #[inline]
    pub fn with_max_idle_frames(mut self, frames: u32) -> Self {
        self.max_idle_frames = frames;
        self
    }

    #[inline]
    pub fn with_print_execution_plan(mut self, enable: bool) -> Self {
        self.print_execution_plan = enable;
        self
    }
}
