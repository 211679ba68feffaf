//! Pass 定义和构建器
//!
//! 提供 `RgPass` trait 用于声明式定义渲染 Pass，
//! 以及 `RgPassBuilder` 用于在 setup 阶段声明资源依赖。

use std::collections::VecDeque;

use ash::vk;

use super::buffer_resource::{RgBufferDesc, RgBufferResource};
use super::image_resource::{RgImageDesc, RgImageResource};
use super::pass_context::RgPassContext;
use super::pipeline::RgPipeline;
use super::render_target::{RgAttachmentOps, RgColorAttachment, RgDepthAttachment};
use super::resource_handle::{RgBufferHandle, RgImageHandle, RgResourceHandle};
use super::resource_registry::RgResourceRegistry;
use super::resource_state::{RgAccessKind, RgBufferState, RgImageState, RgUsage};
use super::subresource::RgSubresourceRange;

/// Pass 对一个资源（或其子资源区域）的一次访问声明
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RgResourceAccess {
    pub resource: RgResourceHandle,
    /// buffer 总是 `RgSubresourceRange::ALL`
    pub range: RgSubresourceRange,
    pub usage: RgUsage,
}

/// 按名字绑定到 descriptor 的资源
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RgBindTarget {
    Image { image: RgImageHandle, sampler: vk::Sampler },
    Buffer(RgBufferHandle),
}

impl RgBindTarget {
    #[inline]
    pub fn resource(&self) -> RgResourceHandle {
        match self {
            RgBindTarget::Image { image, .. } => RgResourceHandle::Image(*image),
            RgBindTarget::Buffer(buffer) => RgResourceHandle::Buffer(*buffer),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct RgBindEntry {
    pub name: String,
    pub target: RgBindTarget,
}

/// Pass 构建器
///
/// 在 `RgPass::setup()` 中使用，声明 Pass 的资源依赖。
/// 所有声明方法都返回传入的句柄，便于链式书写。
pub struct RgPassBuilder<'a> {
    pub(crate) name: String,

    pub(crate) accesses: Vec<RgResourceAccess>,
    pub(crate) color_attachments: Vec<RgColorAttachment>,
    pub(crate) depth_attachment: Option<RgDepthAttachment>,
    pub(crate) binds: Vec<RgBindEntry>,
    pub(crate) run_after: Vec<String>,

    /// 资源注册表引用（用于创建临时资源）
    pub(crate) resources: &'a mut RgResourceRegistry,
}

// new & init
impl<'a> RgPassBuilder<'a> {
    pub(crate) fn new(name: String, resources: &'a mut RgResourceRegistry) -> Self {
        Self {
            name,
            accesses: Vec::new(),
            color_attachments: Vec::new(),
            depth_attachment: None,
            binds: Vec::new(),
            run_after: Vec::new(),
            resources,
        }
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }
}

// 原始声明
impl RgPassBuilder<'_> {
    /// 声明对图像某个子资源区域的访问
    pub fn access_image(
        &mut self,
        handle: RgImageHandle,
        range: RgSubresourceRange,
        kind: RgAccessKind,
        state: RgImageState,
    ) -> RgImageHandle {
        self.accesses.push(RgResourceAccess {
            resource: RgResourceHandle::Image(handle),
            range,
            usage: RgUsage::image(kind, state),
        });
        handle
    }

    pub fn access_buffer(&mut self, handle: RgBufferHandle, kind: RgAccessKind, state: RgBufferState) -> RgBufferHandle {
        self.accesses.push(RgResourceAccess {
            resource: RgResourceHandle::Buffer(handle),
            range: RgSubresourceRange::ALL,
            usage: RgUsage::buffer(kind, state),
        });
        handle
    }

    /// 声明读取图像
    ///
    /// - `state`: 期望的图像状态（用于自动生成 barrier）
    #[inline]
    pub fn read_image(&mut self, handle: RgImageHandle, state: RgImageState) -> RgImageHandle {
        self.access_image(handle, RgSubresourceRange::ALL, RgAccessKind::Read, state)
    }

    /// 声明写入图像
    #[inline]
    pub fn write_image(&mut self, handle: RgImageHandle, state: RgImageState) -> RgImageHandle {
        self.access_image(handle, RgSubresourceRange::ALL, RgAccessKind::Write, state)
    }

    /// 声明读写图像（同时读取和写入）
    ///
    /// 常用于累积操作（如 RT 累积、后处理）
    #[inline]
    pub fn read_write_image(&mut self, handle: RgImageHandle, state: RgImageState) -> RgImageHandle {
        self.access_image(handle, RgSubresourceRange::ALL, RgAccessKind::ReadWrite, state)
    }

    #[inline]
    pub fn read_buffer(&mut self, handle: RgBufferHandle, state: RgBufferState) -> RgBufferHandle {
        self.access_buffer(handle, RgAccessKind::Read, state)
    }

    #[inline]
    pub fn write_buffer(&mut self, handle: RgBufferHandle, state: RgBufferState) -> RgBufferHandle {
        self.access_buffer(handle, RgAccessKind::Write, state)
    }

    #[inline]
    pub fn read_write_buffer(&mut self, handle: RgBufferHandle, state: RgBufferState) -> RgBufferHandle {
        self.access_buffer(handle, RgAccessKind::ReadWrite, state)
    }
}

// 图像便捷声明
impl RgPassBuilder<'_> {
    /// 片段着色器采样
    #[inline]
    pub fn sample_image(&mut self, handle: RgImageHandle) -> RgImageHandle {
        self.read_image(handle, RgImageState::SHADER_READ_FRAGMENT)
    }

    /// 计算着色器采样
    #[inline]
    pub fn sample_image_compute(&mut self, handle: RgImageHandle) -> RgImageHandle {
        self.read_image(handle, RgImageState::SHADER_READ_COMPUTE)
    }

    #[inline]
    pub fn read_storage_image(&mut self, handle: RgImageHandle) -> RgImageHandle {
        self.read_image(handle, RgImageState::STORAGE_READ_COMPUTE)
    }

    #[inline]
    pub fn write_storage_image(&mut self, handle: RgImageHandle) -> RgImageHandle {
        self.write_image(handle, RgImageState::STORAGE_WRITE_COMPUTE)
    }

    #[inline]
    pub fn read_write_storage_image(&mut self, handle: RgImageHandle) -> RgImageHandle {
        self.read_write_image(handle, RgImageState::STORAGE_READ_WRITE_COMPUTE)
    }

    #[inline]
    pub fn transfer_src_image(&mut self, handle: RgImageHandle) -> RgImageHandle {
        self.read_image(handle, RgImageState::TRANSFER_SRC)
    }

    #[inline]
    pub fn transfer_dst_image(&mut self, handle: RgImageHandle) -> RgImageHandle {
        self.write_image(handle, RgImageState::TRANSFER_DST)
    }

    /// 颜色附件
    ///
    /// access 总是颜色附件的读写（混合会读取附件）；`LOAD` 时方向为读写，否则为写入。
    /// 附件顺序即 `location` 顺序。
    pub fn color_attachment(&mut self, handle: RgImageHandle, ops: RgAttachmentOps) -> RgImageHandle {
        self.color_attachments.push(RgColorAttachment { image: handle, ops });
        let kind = if ops.reads_previous() { RgAccessKind::ReadWrite } else { RgAccessKind::Write };
        self.access_image(handle, RgSubresourceRange::ALL, kind, RgImageState::COLOR_ATTACHMENT_READ_WRITE)
    }

    /// 深度附件（深度测试 + 写入）
    pub fn depth_attachment(&mut self, handle: RgImageHandle, ops: RgAttachmentOps) -> RgImageHandle {
        assert!(self.depth_attachment.is_none(), "pass \"{}\" declares more than one depth attachment", self.name);
        self.depth_attachment = Some(RgDepthAttachment {
            image: handle,
            ops,
            read_only: false,
        });
        self.read_write_image(handle, RgImageState::DEPTH_ATTACHMENT_READ_WRITE)
    }

    /// 只读深度附件
    pub fn depth_attachment_read_only(&mut self, handle: RgImageHandle) -> RgImageHandle {
        assert!(self.depth_attachment.is_none(), "pass \"{}\" declares more than one depth attachment", self.name);
        self.depth_attachment = Some(RgDepthAttachment {
            image: handle,
            ops: RgAttachmentOps::load().with_store_op(vk::AttachmentStoreOp::NONE),
            read_only: true,
        });
        self.read_image(handle, RgImageState::DEPTH_ATTACHMENT_READ_ONLY)
    }
}

// 缓冲区便捷声明
impl RgPassBuilder<'_> {
    #[inline]
    pub fn vertex_buffer(&mut self, handle: RgBufferHandle) -> RgBufferHandle {
        self.read_buffer(handle, RgBufferState::VERTEX_BUFFER)
    }

    #[inline]
    pub fn index_buffer(&mut self, handle: RgBufferHandle) -> RgBufferHandle {
        self.read_buffer(handle, RgBufferState::INDEX_BUFFER)
    }

    #[inline]
    pub fn indirect_buffer(&mut self, handle: RgBufferHandle) -> RgBufferHandle {
        self.read_buffer(handle, RgBufferState::INDIRECT_BUFFER)
    }

    #[inline]
    pub fn uniform_buffer(&mut self, handle: RgBufferHandle, stage: vk::PipelineStageFlags2) -> RgBufferHandle {
        self.read_buffer(handle, RgBufferState::new(stage, vk::AccessFlags2::UNIFORM_READ))
    }

    #[inline]
    pub fn read_storage_buffer(&mut self, handle: RgBufferHandle, stage: vk::PipelineStageFlags2) -> RgBufferHandle {
        self.read_buffer(handle, RgBufferState::new(stage, vk::AccessFlags2::SHADER_STORAGE_READ))
    }

    #[inline]
    pub fn write_storage_buffer(&mut self, handle: RgBufferHandle, stage: vk::PipelineStageFlags2) -> RgBufferHandle {
        self.write_buffer(handle, RgBufferState::new(stage, vk::AccessFlags2::SHADER_STORAGE_WRITE))
    }

    #[inline]
    pub fn transfer_src_buffer(&mut self, handle: RgBufferHandle) -> RgBufferHandle {
        self.read_buffer(handle, RgBufferState::TRANSFER_SRC)
    }

    #[inline]
    pub fn transfer_dst_buffer(&mut self, handle: RgBufferHandle) -> RgBufferHandle {
        self.write_buffer(handle, RgBufferState::TRANSFER_DST)
    }
}

// descriptor 绑定、顺序约束、临时资源
impl RgPassBuilder<'_> {
    /// 按 shader 中的名字绑定资源
    ///
    /// 只对管线感知的 Pass 有效：访问方式由反射得到的 descriptor 类型推导。
    pub fn bind(&mut self, name: impl Into<String>, handle: impl Into<RgResourceHandle>) -> &mut Self {
        let target = match handle.into() {
            RgResourceHandle::Image(image) => RgBindTarget::Image {
                image,
                sampler: vk::Sampler::null(),
            },
            RgResourceHandle::Buffer(buffer) => RgBindTarget::Buffer(buffer),
        };
        self.binds.push(RgBindEntry {
            name: name.into(),
            target,
        });
        self
    }

    /// 绑定 combined image sampler
    pub fn bind_with_sampler(
        &mut self,
        name: impl Into<String>,
        image: RgImageHandle,
        sampler: vk::Sampler,
    ) -> &mut Self {
        self.binds.push(RgBindEntry {
            name: name.into(),
            target: RgBindTarget::Image { image, sampler },
        });
        self
    }

    /// 要求本 Pass 在名为 `pass_name` 的 Pass 之后执行
    pub fn run_after(&mut self, pass_name: impl Into<String>) -> &mut Self {
        self.run_after.push(pass_name.into());
        self
    }

    /// 创建临时图像
    ///
    /// 图像在 compile 时从 transient pool 分配，reset 时归还。
    pub fn create_image(&mut self, name: impl Into<String>, desc: RgImageDesc) -> RgImageHandle {
        self.resources.register_image(RgImageResource::transient(name, desc))
    }

    /// 创建临时缓冲区
    pub fn create_buffer(&mut self, name: impl Into<String>, desc: RgBufferDesc) -> RgBufferHandle {
        self.resources.register_buffer(RgBufferResource::transient(name, desc))
    }
}

/// RgPass trait
///
/// 定义渲染图中的一个 Pass。
///
/// # 示例
///
/// ```ignore
/// struct BlurPass {
///     input: RgImageHandle,
///     output: RgImageHandle,
/// }
///
/// impl RgPass for BlurPass {
///     fn setup(&mut self, builder: &mut RgPassBuilder) {
///         builder.sample_image_compute(self.input);
///         builder.write_storage_image(self.output);
///     }
///
///     fn execute(&mut self, ctx: &mut RgPassContext<'_>) {
///         let input_view = ctx.image_view(self.input);
///         let output_view = ctx.image_view(self.output);
///         // 绑定 pipeline, dispatch...
///     }
/// }
/// ```
///
/// # 线程安全
///
/// Pass 不需要是 Send + Sync，RenderGraph 在单线程中使用。
/// graph 跨帧复用，因此 Pass 需要是 `'static`，外部资源通过 `Rc` 或句柄持有。
pub trait RgPass {
    /// 声明 Pass 的资源依赖
    fn setup(&mut self, builder: &mut RgPassBuilder);

    /// 录制 Pass 的命令
    ///
    /// barrier 已经由 graph 插入，命令缓冲区已经开始录制。
    fn execute(&mut self, ctx: &mut RgPassContext<'_>);
}

/// 类型擦除的 Pass 执行器
pub(crate) trait RgPassExecutor {
    fn execute(&mut self, ctx: &mut RgPassContext<'_>);
}

/// 包装用户 Pass 实现的执行器
pub(crate) struct RgPassExecutorWrapper<P: RgPass> {
    pub pass: P,
}

impl<P: RgPass> RgPassExecutor for RgPassExecutorWrapper<P> {
    fn execute(&mut self, ctx: &mut RgPassContext<'_>) {
        self.pass.execute(ctx);
    }
}

/// 闭包形式的执行器
pub(crate) struct RgFnExecutor<F> {
    pub func: F,
}

impl<F: FnMut(&mut RgPassContext<'_>)> RgPassExecutor for RgFnExecutor<F> {
    fn execute(&mut self, ctx: &mut RgPassContext<'_>) {
        (self.func)(ctx);
    }
}

/// Pass 节点数据
pub(crate) struct RgPassNode {
    pub name: String,

    /// setup 时声明的访问
    pub declared: Vec<RgResourceAccess>,
    /// compile 第 1 步得到的访问：范围已展开、重复声明已合并、binding 已推导
    pub accesses: Vec<RgResourceAccess>,

    pub color_attachments: Vec<RgColorAttachment>,
    pub depth_attachment: Option<RgDepthAttachment>,
    pub binds: Vec<RgBindEntry>,
    pub run_after: Vec<String>,
    pub pipeline: Option<RgPipeline>,

    /// 执行回调（类型擦除的 Pass 实现）
    pub executor: Box<dyn RgPassExecutor>,
}

impl RgPassNode {
    pub fn new(builder: RgPassBuilder<'_>, pipeline: Option<RgPipeline>, executor: Box<dyn RgPassExecutor>) -> Self {
        Self {
            name: builder.name,
            declared: builder.accesses,
            accesses: Vec::new(),
            color_attachments: builder.color_attachments,
            depth_attachment: builder.depth_attachment,
            binds: builder.binds,
            run_after: builder.run_after,
            pipeline,
            executor,
        }
    }

    #[inline]
    pub fn has_render_targets(&self) -> bool {
        !self.color_attachments.is_empty() || self.depth_attachment.is_some()
    }
}

/// 合并同一 Pass 中对同一资源的重复声明
///
/// - layout 相同、用途相同且并集是矩形：合并为并集
/// - 其余 layout 相同的重叠：交集取两者合并后的用途（方向合并，stage / access 取并集），
///   两侧剩余部分保持各自的声明，不会覆盖没有声明过的子资源
/// - 合并结束后仍然重叠的声明一定是 layout 不同：返回冲突的两个 layout
pub(crate) fn merge_accesses(accesses: &mut Vec<RgResourceAccess>) -> Result<(), (RgResourceHandle, vk::ImageLayout, vk::ImageLayout)> {
    // merged 中同一资源、同一 layout 的声明两两不相交
    let mut merged: Vec<RgResourceAccess> = Vec::with_capacity(accesses.len());
    let mut pending: VecDeque<RgResourceAccess> = accesses.drain(..).collect();

    while let Some(current) = pending.pop_front() {
        let found = merged.iter().enumerate().find_map(|(position, other)| {
            if other.resource != current.resource || other.usage.layout != current.usage.layout {
                return None;
            }
            other.range.intersect(&current.range).map(|inter| (position, inter))
        });
        let Some((position, inter)) = found else {
            merged.push(current);
            continue;
        };
        let other = merged.remove(position);

        if other.usage == current.usage {
            if let Some(range) = other.range.exact_union(&current.range) {
                // 并集可能与其他声明重叠，重新处理
                pending.push_front(RgResourceAccess { range, ..current });
                continue;
            }
        }

        merged.push(RgResourceAccess {
            range: inter,
            usage: other.usage.merge(&current.usage),
            ..current
        });
        merged.extend(other.range.subtract(&inter).into_iter().map(|range| RgResourceAccess { range, ..other }));
        for range in current.range.subtract(&inter).into_iter().rev() {
            pending.push_front(RgResourceAccess { range, ..current });
        }
    }

    for (i, a) in merged.iter().enumerate() {
        for b in &merged[i + 1..] {
            if a.resource == b.resource && a.range.overlaps(&b.range) {
                return Err((a.resource, a.usage.layout, b.usage.layout));
            }
        }
    }

    *accesses = merged;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image_handle(registry: &mut RgResourceRegistry) -> RgImageHandle {
        registry.register_image(RgImageResource::transient("image", RgImageDesc::default()))
    }

    fn resolved(mut access: RgResourceAccess) -> RgResourceAccess {
        access.range = access.range.resolve(4, 1);
        access
    }

    #[test]
    fn test_color_attachment_direction() {
        let mut registry = RgResourceRegistry::new();
        let image = image_handle(&mut registry);

        let mut builder = RgPassBuilder::new("gbuffer".to_string(), &mut registry);
        builder.color_attachment(image, RgAttachmentOps::clear_color([0.0; 4]));
        assert_eq!(builder.accesses[0].usage.kind, RgAccessKind::Write);

        builder.color_attachment(image, RgAttachmentOps::load());
        assert_eq!(builder.accesses[1].usage.kind, RgAccessKind::ReadWrite);
        assert_eq!(builder.color_attachments.len(), 2);

        // 方向不同，access 相同
        let read_write = vk::AccessFlags2::COLOR_ATTACHMENT_READ | vk::AccessFlags2::COLOR_ATTACHMENT_WRITE;
        for access in &builder.accesses {
            assert_eq!(access.usage.access, read_write);
            assert_eq!(access.usage.stage, vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT);
            assert_eq!(access.usage.layout, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);
        }
    }

    #[test]
    fn test_merge_same_layout() {
        let mut registry = RgResourceRegistry::new();
        let image = image_handle(&mut registry);

        let mut builder = RgPassBuilder::new("merge".to_string(), &mut registry);
        builder.read_storage_image(image);
        builder.write_storage_image(image);

        let mut accesses: Vec<_> = builder.accesses.into_iter().map(resolved).collect();
        merge_accesses(&mut accesses).unwrap();

        assert_eq!(accesses.len(), 1);
        assert_eq!(accesses[0].usage.kind, RgAccessKind::ReadWrite);
        assert_eq!(
            accesses[0].usage.access,
            vk::AccessFlags2::SHADER_STORAGE_READ | vk::AccessFlags2::SHADER_STORAGE_WRITE
        );
    }

    #[test]
    fn test_disjoint_ranges_are_kept() {
        let mut registry = RgResourceRegistry::new();
        let image = image_handle(&mut registry);

        let mut builder = RgPassBuilder::new("downsample".to_string(), &mut registry);
        builder.access_image(image, RgSubresourceRange::mip(0), RgAccessKind::Read, RgImageState::TRANSFER_SRC);
        builder.access_image(image, RgSubresourceRange::mip(1), RgAccessKind::Write, RgImageState::TRANSFER_DST);

        let mut accesses: Vec<_> = builder.accesses.into_iter().map(resolved).collect();
        merge_accesses(&mut accesses).unwrap();
        assert_eq!(accesses.len(), 2);
    }

    #[test]
    fn test_partial_overlap_is_split() {
        let mut registry = RgResourceRegistry::new();
        let image = image_handle(&mut registry);

        let mut builder = RgPassBuilder::new("atlas".to_string(), &mut registry);
        builder.access_image(image, RgSubresourceRange::new(0, 3, 0, 1), RgAccessKind::Read, RgImageState::STORAGE_READ_COMPUTE);
        builder.access_image(image, RgSubresourceRange::new(1, 1, 0, 4), RgAccessKind::Write, RgImageState::STORAGE_WRITE_COMPUTE);
        builder.access_image(image, RgSubresourceRange::new(0, 1, 3, 1), RgAccessKind::Read, RgImageState::SHADER_READ_FRAGMENT);

        let mut accesses: Vec<_> = builder
            .accesses
            .into_iter()
            .map(|mut access| {
                access.range = access.range.resolve(3, 4);
                access
            })
            .collect();
        merge_accesses(&mut accesses).unwrap();

        let kind_at = |range: RgSubresourceRange| {
            accesses.iter().find(|access| access.range == range).map(|access| access.usage.kind)
        };
        assert_eq!(kind_at(RgSubresourceRange::new(1, 1, 0, 1)), Some(RgAccessKind::ReadWrite));
        assert_eq!(kind_at(RgSubresourceRange::new(0, 1, 0, 1)), Some(RgAccessKind::Read));
        assert_eq!(kind_at(RgSubresourceRange::new(2, 1, 0, 1)), Some(RgAccessKind::Read));
        assert_eq!(kind_at(RgSubresourceRange::new(1, 1, 1, 3)), Some(RgAccessKind::Write));
        assert_eq!(kind_at(RgSubresourceRange::new(0, 1, 3, 1)), Some(RgAccessKind::Read));
        assert_eq!(accesses.len(), 5);
    }

    #[test]
    fn test_adjacent_identical_declarations_join() {
        let mut registry = RgResourceRegistry::new();
        let image = image_handle(&mut registry);

        let mut builder = RgPassBuilder::new("mips".to_string(), &mut registry);
        builder.access_image(image, RgSubresourceRange::new(0, 2, 0, 1), RgAccessKind::Read, RgImageState::TRANSFER_SRC);
        builder.access_image(image, RgSubresourceRange::new(1, 3, 0, 1), RgAccessKind::Read, RgImageState::TRANSFER_SRC);

        let mut accesses: Vec<_> = builder.accesses.into_iter().map(resolved).collect();
        merge_accesses(&mut accesses).unwrap();

        assert_eq!(accesses.len(), 1);
        assert_eq!(accesses[0].range, RgSubresourceRange::new(0, 4, 0, 1));
    }

    #[test]
    fn test_conflicting_layouts() {
        let mut registry = RgResourceRegistry::new();
        let image = image_handle(&mut registry);

        let mut builder = RgPassBuilder::new("conflict".to_string(), &mut registry);
        builder.sample_image(image);
        builder.write_storage_image(image);

        let mut accesses: Vec<_> = builder.accesses.into_iter().map(resolved).collect();
        let (resource, first, second) = merge_accesses(&mut accesses).unwrap_err();
        assert_eq!(resource, RgResourceHandle::Image(image));
        assert_eq!(first, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
        assert_eq!(second, vk::ImageLayout::GENERAL);
    }
}
