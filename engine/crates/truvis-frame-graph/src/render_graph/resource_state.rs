//! 资源状态定义
//!
//! - [`RgImageState`] / [`RgBufferState`]：一次使用的 stage、access、layout 三元组，提供常用预设
//! - [`RgUsage`]：Pass 对资源的一次访问意图（方向 + 三元组）
//! - [`RgResourceState`]：barrier 计算时跟踪的同步状态（最后一次写入、写入之后的读取、当前 layout、所属队列）

use ash::vk;

/// 所有"写"语义的 access bits
pub const RG_WRITE_ACCESS: vk::AccessFlags2 = vk::AccessFlags2::from_raw(
    vk::AccessFlags2::SHADER_WRITE.as_raw()
        | vk::AccessFlags2::SHADER_STORAGE_WRITE.as_raw()
        | vk::AccessFlags2::COLOR_ATTACHMENT_WRITE.as_raw()
        | vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_WRITE.as_raw()
        | vk::AccessFlags2::TRANSFER_WRITE.as_raw()
        | vk::AccessFlags2::HOST_WRITE.as_raw()
        | vk::AccessFlags2::MEMORY_WRITE.as_raw()
        | vk::AccessFlags2::ACCELERATION_STRUCTURE_WRITE_KHR.as_raw(),
);

/// 取出 access 中的写操作部分
#[inline]
pub fn write_bits(access: vk::AccessFlags2) -> vk::AccessFlags2 {
    access & RG_WRITE_ACCESS
}

/// 取出 access 中的读操作部分
#[inline]
pub fn read_bits(access: vk::AccessFlags2) -> vk::AccessFlags2 {
    access & !RG_WRITE_ACCESS
}

/// 访问方向
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RgAccessKind {
    Read,
    Write,
    ReadWrite,
}

impl RgAccessKind {
    #[inline]
    pub fn is_read(self) -> bool {
        matches!(self, RgAccessKind::Read | RgAccessKind::ReadWrite)
    }

    #[inline]
    pub fn is_write(self) -> bool {
        matches!(self, RgAccessKind::Write | RgAccessKind::ReadWrite)
    }

    /// 同一个 Pass 对同一资源的两次声明合并后的方向
    pub fn merge(self, other: Self) -> Self {
        if self == other { self } else { RgAccessKind::ReadWrite }
    }
}

/// 图像资源状态
///
/// 描述图像在某个 Pass 中的使用方式，用于自动计算 barrier。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RgImageState {
    /// Pipeline stage
    pub stage: vk::PipelineStageFlags2,
    /// Access mask
    pub access: vk::AccessFlags2,
    /// Image layout
    pub layout: vk::ImageLayout,
}

impl Default for RgImageState {
    fn default() -> Self {
        Self::UNDEFINED
    }
}

// new & 常量定义
impl RgImageState {
    #[inline]
    pub const fn new(stage: vk::PipelineStageFlags2, access: vk::AccessFlags2, layout: vk::ImageLayout) -> Self {
        Self { stage, access, layout }
    }

    // ============ 预定义状态常量 ============

    /// 未定义状态（初始状态或不关心内容）
    pub const UNDEFINED: Self =
        Self::new(vk::PipelineStageFlags2::TOP_OF_PIPE, vk::AccessFlags2::NONE, vk::ImageLayout::UNDEFINED);

    /// 通用布局（可用于任何操作，但性能可能不是最优）
    pub const GENERAL: Self = Self::new(
        vk::PipelineStageFlags2::ALL_COMMANDS,
        vk::AccessFlags2::from_raw(vk::AccessFlags2::MEMORY_READ.as_raw() | vk::AccessFlags2::MEMORY_WRITE.as_raw()),
        vk::ImageLayout::GENERAL,
    );

    /// 颜色附件输出（图形管线写入）
    pub const COLOR_ATTACHMENT_WRITE: Self = Self::new(
        vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT,
        vk::AccessFlags2::COLOR_ATTACHMENT_WRITE,
        vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
    );

    /// 颜色附件读写（load 之前的内容，或 blend）
    pub const COLOR_ATTACHMENT_READ_WRITE: Self = Self::new(
        vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT,
        vk::AccessFlags2::from_raw(
            vk::AccessFlags2::COLOR_ATTACHMENT_READ.as_raw() | vk::AccessFlags2::COLOR_ATTACHMENT_WRITE.as_raw(),
        ),
        vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
    );

    /// 深度附件写入
    pub const DEPTH_ATTACHMENT_WRITE: Self = Self::new(
        vk::PipelineStageFlags2::from_raw(
            vk::PipelineStageFlags2::EARLY_FRAGMENT_TESTS.as_raw()
                | vk::PipelineStageFlags2::LATE_FRAGMENT_TESTS.as_raw(),
        ),
        vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_WRITE,
        vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
    );

    /// 深度附件读写（深度测试 + 写入）
    pub const DEPTH_ATTACHMENT_READ_WRITE: Self = Self::new(
        vk::PipelineStageFlags2::from_raw(
            vk::PipelineStageFlags2::EARLY_FRAGMENT_TESTS.as_raw()
                | vk::PipelineStageFlags2::LATE_FRAGMENT_TESTS.as_raw(),
        ),
        vk::AccessFlags2::from_raw(
            vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_READ.as_raw()
                | vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_WRITE.as_raw(),
        ),
        vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
    );

    /// 只读深度附件（深度测试但不写入）
    pub const DEPTH_ATTACHMENT_READ_ONLY: Self = Self::new(
        vk::PipelineStageFlags2::from_raw(
            vk::PipelineStageFlags2::EARLY_FRAGMENT_TESTS.as_raw()
                | vk::PipelineStageFlags2::LATE_FRAGMENT_TESTS.as_raw(),
        ),
        vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_READ,
        vk::ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL,
    );

    /// 着色器只读采样（片段着色器）
    pub const SHADER_READ_FRAGMENT: Self = Self::new(
        vk::PipelineStageFlags2::FRAGMENT_SHADER,
        vk::AccessFlags2::SHADER_SAMPLED_READ,
        vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
    );

    /// 着色器只读采样（计算着色器）
    pub const SHADER_READ_COMPUTE: Self = Self::new(
        vk::PipelineStageFlags2::COMPUTE_SHADER,
        vk::AccessFlags2::SHADER_SAMPLED_READ,
        vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
    );

    /// 着色器只读采样（光追着色器）
    pub const SHADER_READ_RAY_TRACING: Self = Self::new(
        vk::PipelineStageFlags2::RAY_TRACING_SHADER_KHR,
        vk::AccessFlags2::SHADER_SAMPLED_READ,
        vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
    );

    /// 存储图像读取（计算着色器）
    pub const STORAGE_READ_COMPUTE: Self = Self::new(
        vk::PipelineStageFlags2::COMPUTE_SHADER,
        vk::AccessFlags2::SHADER_STORAGE_READ,
        vk::ImageLayout::GENERAL,
    );

    /// 存储图像写入（计算着色器）
    pub const STORAGE_WRITE_COMPUTE: Self = Self::new(
        vk::PipelineStageFlags2::COMPUTE_SHADER,
        vk::AccessFlags2::SHADER_STORAGE_WRITE,
        vk::ImageLayout::GENERAL,
    );

    /// 存储图像读写（计算着色器）
    pub const STORAGE_READ_WRITE_COMPUTE: Self = Self::new(
        vk::PipelineStageFlags2::COMPUTE_SHADER,
        vk::AccessFlags2::from_raw(
            vk::AccessFlags2::SHADER_STORAGE_READ.as_raw() | vk::AccessFlags2::SHADER_STORAGE_WRITE.as_raw(),
        ),
        vk::ImageLayout::GENERAL,
    );

    /// 存储图像写入（光追着色器）
    pub const STORAGE_WRITE_RAY_TRACING: Self = Self::new(
        vk::PipelineStageFlags2::RAY_TRACING_SHADER_KHR,
        vk::AccessFlags2::SHADER_STORAGE_WRITE,
        vk::ImageLayout::GENERAL,
    );

    /// 存储图像读写（光追着色器）
    pub const STORAGE_READ_WRITE_RAY_TRACING: Self = Self::new(
        vk::PipelineStageFlags2::RAY_TRACING_SHADER_KHR,
        vk::AccessFlags2::from_raw(
            vk::AccessFlags2::SHADER_STORAGE_READ.as_raw() | vk::AccessFlags2::SHADER_STORAGE_WRITE.as_raw(),
        ),
        vk::ImageLayout::GENERAL,
    );

    /// 传输源
    pub const TRANSFER_SRC: Self = Self::new(
        vk::PipelineStageFlags2::TRANSFER,
        vk::AccessFlags2::TRANSFER_READ,
        vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
    );

    /// 传输目标
    pub const TRANSFER_DST: Self = Self::new(
        vk::PipelineStageFlags2::TRANSFER,
        vk::AccessFlags2::TRANSFER_WRITE,
        vk::ImageLayout::TRANSFER_DST_OPTIMAL,
    );

    /// 呈现（swapchain image）
    pub const PRESENT: Self =
        Self::new(vk::PipelineStageFlags2::BOTTOM_OF_PIPE, vk::AccessFlags2::NONE, vk::ImageLayout::PRESENT_SRC_KHR);
}

/// 缓冲区资源状态
///
/// 描述缓冲区在某个 Pass 中的使用方式。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RgBufferState {
    /// Pipeline stage
    pub stage: vk::PipelineStageFlags2,
    /// Access mask
    pub access: vk::AccessFlags2,
}

impl Default for RgBufferState {
    fn default() -> Self {
        Self::UNDEFINED
    }
}

// new & 常量定义
impl RgBufferState {
    #[inline]
    pub const fn new(stage: vk::PipelineStageFlags2, access: vk::AccessFlags2) -> Self {
        Self { stage, access }
    }

    // ============ 预定义状态常量 ============

    /// 未定义状态
    pub const UNDEFINED: Self = Self::new(vk::PipelineStageFlags2::TOP_OF_PIPE, vk::AccessFlags2::NONE);

    /// 顶点缓冲区读取
    pub const VERTEX_BUFFER: Self =
        Self::new(vk::PipelineStageFlags2::VERTEX_ATTRIBUTE_INPUT, vk::AccessFlags2::VERTEX_ATTRIBUTE_READ);

    /// 索引缓冲区读取
    pub const INDEX_BUFFER: Self = Self::new(vk::PipelineStageFlags2::INDEX_INPUT, vk::AccessFlags2::INDEX_READ);

    /// 间接命令缓冲区
    pub const INDIRECT_BUFFER: Self =
        Self::new(vk::PipelineStageFlags2::DRAW_INDIRECT, vk::AccessFlags2::INDIRECT_COMMAND_READ);

    /// Uniform 缓冲区读取（顶点着色器）
    pub const UNIFORM_VERTEX: Self = Self::new(vk::PipelineStageFlags2::VERTEX_SHADER, vk::AccessFlags2::UNIFORM_READ);

    /// Uniform 缓冲区读取（片段着色器）
    pub const UNIFORM_FRAGMENT: Self =
        Self::new(vk::PipelineStageFlags2::FRAGMENT_SHADER, vk::AccessFlags2::UNIFORM_READ);

    /// Uniform 缓冲区读取（计算着色器）
    pub const UNIFORM_COMPUTE: Self =
        Self::new(vk::PipelineStageFlags2::COMPUTE_SHADER, vk::AccessFlags2::UNIFORM_READ);

    /// 存储缓冲区读取（计算着色器）
    pub const STORAGE_READ_COMPUTE: Self =
        Self::new(vk::PipelineStageFlags2::COMPUTE_SHADER, vk::AccessFlags2::SHADER_STORAGE_READ);

    /// 存储缓冲区写入（计算着色器）
    pub const STORAGE_WRITE_COMPUTE: Self =
        Self::new(vk::PipelineStageFlags2::COMPUTE_SHADER, vk::AccessFlags2::SHADER_STORAGE_WRITE);

    /// 存储缓冲区读写（计算着色器）
    pub const STORAGE_READ_WRITE_COMPUTE: Self = Self::new(
        vk::PipelineStageFlags2::COMPUTE_SHADER,
        vk::AccessFlags2::from_raw(
            vk::AccessFlags2::SHADER_STORAGE_READ.as_raw() | vk::AccessFlags2::SHADER_STORAGE_WRITE.as_raw(),
        ),
    );

    /// 传输源
    pub const TRANSFER_SRC: Self = Self::new(vk::PipelineStageFlags2::TRANSFER, vk::AccessFlags2::TRANSFER_READ);

    /// 传输目标
    pub const TRANSFER_DST: Self = Self::new(vk::PipelineStageFlags2::TRANSFER, vk::AccessFlags2::TRANSFER_WRITE);

    /// 加速结构构建输入
    pub const ACCELERATION_STRUCTURE_BUILD_INPUT: Self = Self::new(
        vk::PipelineStageFlags2::ACCELERATION_STRUCTURE_BUILD_KHR,
        vk::AccessFlags2::ACCELERATION_STRUCTURE_READ_KHR,
    );
}

/// Pass 对资源的一次访问意图
///
/// buffer 的 `layout` 始终为 `UNDEFINED`，barrier 计算时忽略。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RgUsage {
    pub kind: RgAccessKind,
    pub stage: vk::PipelineStageFlags2,
    pub access: vk::AccessFlags2,
    pub layout: vk::ImageLayout,
}

impl RgUsage {
    #[inline]
    pub fn image(kind: RgAccessKind, state: RgImageState) -> Self {
        Self {
            kind,
            stage: state.stage,
            access: state.access,
            layout: state.layout,
        }
    }

    #[inline]
    pub fn buffer(kind: RgAccessKind, state: RgBufferState) -> Self {
        Self {
            kind,
            stage: state.stage,
            access: state.access,
            layout: vk::ImageLayout::UNDEFINED,
        }
    }

    /// 合并同一资源在同一 Pass 中的两次声明，layout 必须一致
    pub(crate) fn merge(&self, other: &Self) -> Self {
        debug_assert_eq!(self.layout, other.layout);
        Self {
            kind: self.kind.merge(other.kind),
            stage: self.stage | other.stage,
            access: self.access | other.access,
            layout: self.layout,
        }
    }
}

/// 资源（或子资源区域）的同步状态
///
/// `read_stages` / `read_access` 记录最后一次写入之后的所有读取，
/// 并且只在安装新的写入状态时被清空。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RgResourceState {
    /// 最后一次写入的 stage
    pub write_stage: vk::PipelineStageFlags2,
    /// 最后一次写入的 access（只包含写 bits）
    pub write_access: vk::AccessFlags2,
    /// 写入之后累积的读取 stage
    pub read_stages: vk::PipelineStageFlags2,
    /// 写入之后累积的读取 access
    pub read_access: vk::AccessFlags2,
    /// 当前 layout（buffer 忽略）
    pub layout: vk::ImageLayout,
    /// 当前所属的队列族
    pub queue_family: u32,
}

impl Default for RgResourceState {
    fn default() -> Self {
        Self::UNTOUCHED
    }
}

impl RgResourceState {
    /// 从未被访问过：没有写入、没有读取、layout 未定义
    pub const UNTOUCHED: Self = Self {
        write_stage: vk::PipelineStageFlags2::NONE,
        write_access: vk::AccessFlags2::NONE,
        read_stages: vk::PipelineStageFlags2::NONE,
        read_access: vk::AccessFlags2::NONE,
        layout: vk::ImageLayout::UNDEFINED,
        queue_family: vk::QUEUE_FAMILY_IGNORED,
    };

    /// 根据调用方描述的"最后一次使用"构造跟踪状态
    ///
    /// 含写 bits 的使用视为一次写入；只读使用视为写入之后的读取；
    /// `TOP_OF_PIPE` + `NONE` 视为没有任何未完成的访问。
    pub fn from_usage(
        stage: vk::PipelineStageFlags2,
        access: vk::AccessFlags2,
        layout: vk::ImageLayout,
        queue_family: u32,
    ) -> Self {
        let mut state = Self {
            layout,
            queue_family,
            ..Self::UNTOUCHED
        };

        let writes = write_bits(access);
        if !writes.is_empty() {
            state.write_stage = stage;
            state.write_access = writes;
        } else if !stage.is_empty() && stage != vk::PipelineStageFlags2::TOP_OF_PIPE {
            state.read_stages = stage;
            state.read_access = read_bits(access);
        }

        state
    }

    #[inline]
    pub fn from_image_state(state: RgImageState, queue_family: u32) -> Self {
        Self::from_usage(state.stage, state.access, state.layout, queue_family)
    }

    #[inline]
    pub fn from_buffer_state(state: RgBufferState, queue_family: u32) -> Self {
        Self::from_usage(state.stage, state.access, vk::ImageLayout::UNDEFINED, queue_family)
    }

    #[inline]
    pub fn has_write(&self) -> bool {
        !self.write_stage.is_empty() || !self.write_access.is_empty()
    }

    #[inline]
    pub fn has_reads(&self) -> bool {
        !self.read_stages.is_empty()
    }

    /// 合并两个区域的状态
    ///
    /// stage / access 取并集；layout、队列族不一致时退化为 `UNDEFINED` / `QUEUE_FAMILY_IGNORED`。
    pub fn merge(&self, other: &Self) -> Self {
        Self {
            write_stage: self.write_stage | other.write_stage,
            write_access: self.write_access | other.write_access,
            read_stages: self.read_stages | other.read_stages,
            read_access: self.read_access | other.read_access,
            layout: if self.layout == other.layout { self.layout } else { vk::ImageLayout::UNDEFINED },
            queue_family: if self.queue_family == other.queue_family {
                self.queue_family
            } else {
                vk::QUEUE_FAMILY_IGNORED
            },
        }
    }

    /// 转换为可以再次导入的图像状态
    pub fn to_image_state(&self) -> RgImageState {
        let mut stage = self.write_stage | self.read_stages;
        if stage.is_empty() {
            stage = vk::PipelineStageFlags2::TOP_OF_PIPE;
        }
        RgImageState::new(stage, self.write_access | self.read_access, self.layout)
    }

    /// 转换为可以再次导入的缓冲区状态
    pub fn to_buffer_state(&self) -> RgBufferState {
        let image_state = self.to_image_state();
        RgBufferState::new(image_state.stage, image_state.access)
    }
}
