//! 声明式渲染图
//!
//! 提供自动依赖分析、barrier 生成和临时资源管理的渲染图抽象。
//!
//! # 核心概念
//!
//! - **RgImageHandle / RgBufferHandle**: 虚拟资源句柄，只在当前帧有效
//! - **RgImageState / RgBufferState**: 资源状态描述，包含 stage、access、layout
//! - **RgSubresourceRange**: 图像的 mip / layer 区域，barrier 按区域计算
//! - **RgPass**: 渲染 Pass trait，声明资源依赖和执行逻辑
//! - **RgPipeline**: 带反射信息的管线，按名字绑定资源时自动推导访问方式
//! - **RenderGraph**: 跨帧复用的渲染图对象，持有临时资源池与编译缓存
//!
//! # 使用示例
//!
//! ```ignore
//! use truvis_frame_graph::render_graph::*;
//!
//! struct BlurPass {
//!     input: RgImageHandle,
//!     output: RgImageHandle,
//! }
//!
//! impl RgPass for BlurPass {
//!     fn setup(&mut self, builder: &mut RgPassBuilder) {
//!         builder.sample_image_compute(self.input);
//!         builder.write_storage_image(self.output);
//!     }
//!
//!     fn execute(&mut self, ctx: &mut RgPassContext<'_>) {
//!         let input_view = ctx.image_view(self.input);
//!         let output_view = ctx.image_view(self.output);
//!         // 绑定 descriptor sets, dispatch...
//!     }
//! }
//!
//! let mut graph = RenderGraph::new(RgGraphConfig::default().with_queue_family_index(queue_family));
//!
//! // 每一帧：
//! let swapchain = graph.import_image("swapchain", native, desc, RgImageState::UNDEFINED);
//! let blurred = graph.create_image("blurred", desc);
//! graph.add_pass("blur", BlurPass { input: scene_color, output: blurred });
//!
//! graph.compile(&mut device)?;
//! graph.execute(&cmd)?;
//! // 提交命令并等待 GPU 完成后
//! graph.reset();
//! ```
//!
//! # 模块结构
//!
//! - `resource_handle` / `subresource`: 句柄与子资源区域
//! - `resource_state` / `subresource_map`: 状态描述与按区域的状态表
//! - `barrier` / `state_tracker`: barrier 计算
//! - `pass` / `pass_context` / `pipeline` / `render_target`: Pass 声明与执行
//! - `dependency_graph`: 依赖图和拓扑排序
//! - `transient_pool`: 临时资源池
//! - `graph`: 编译与执行

mod barrier;
mod buffer_resource;
mod compiled;
mod config;
mod dependency_graph;
mod device;
mod error;
mod execution_plan;
mod graph;
mod image_resource;
mod pass;
mod pass_context;
mod pipeline;
mod render_target;
mod resource_handle;
mod resource_registry;
mod resource_state;
mod state_tracker;
mod stats;
mod subresource;
mod subresource_map;
mod transient_pool;

// Re-exports
pub use barrier::{
    RgBarrierKind, RgBarrierMasks, RgBufferBarrierDesc, RgImageBarrierDesc, RgPassBarriers, compile_barrier,
    infer_image_aspect,
};
pub use buffer_resource::{RgBufferDesc, RgBufferResource, RgBufferSource};
pub use compiled::{RgDescriptorInfo, RgDescriptorWrite};
pub use config::RgGraphConfig;
pub use dependency_graph::{RgDependencyEdge, RgDependencyGraph};
pub use device::{RgCommandRecorder, RgDevice, RgNativeBuffer, RgNativeImage};
pub use error::{RgError, RgResult};
pub use graph::{RenderGraph, RgGraphPhase};
pub use image_resource::{RgImageDesc, RgImageResource, RgImageSource};
pub use pass::{RgBindEntry, RgBindTarget, RgPass, RgPassBuilder, RgResourceAccess};
pub use pass_context::RgPassContext;
pub use pipeline::{RgPipeline, RgReflectedBinding, RgShaderReflection, binding_usage, shader_stages_to_pipeline_stages};
pub use render_target::{
    RgAttachmentOps, RgClearValue, RgColorAttachment, RgDepthAttachment, RgRenderingInfo, RgResolvedAttachment,
};
pub use resource_handle::{RgBufferHandle, RgImageHandle, RgResourceHandle, RgResourceKind};
pub use resource_registry::RgResourceRegistry;
pub use resource_state::{RgAccessKind, RgBufferState, RgImageState, RgResourceState, RgUsage};
pub use stats::{RgCompileTimings, RgStats};
pub use subresource::RgSubresourceRange;
pub use subresource_map::{RgImageSubresourceMap, RgSubresourceSlice};
