//! RenderGraph：声明 → 编译 → 执行 → 重置
//!
//! 一个 `RenderGraph` 对象跨帧复用：
//!
//! 1. 导入外部资源 `import_image` / `import_buffer`，创建临时资源 `create_image` / `create_buffer`
//! 2. 添加 Pass `add_pass` / `add_pass_fn` / `add_pipeline_pass`
//! 3. `compile(device)`：依赖分析、拓扑排序、临时资源分配、barrier 计算、渲染目标与 descriptor 解析
//! 4. `execute(cmd)`：按顺序插入 barrier 并执行 Pass 回调
//! 5. `reset()`：临时资源归还到池中，进入下一帧

use std::collections::HashMap;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::time::Instant;

use ash::vk;
use itertools::Itertools;

use super::barrier::RgPassBarriers;
use super::buffer_resource::{RgBufferDesc, RgBufferResource, RgBufferSource};
use super::compiled::{
    RgCompiledGraph, RgDescriptorInfo, RgDescriptorWrite, RgPassSync, RgPhysicalResources, RgResolvedPass, RgSyncPlan,
};
use super::config::RgGraphConfig;
use super::dependency_graph::RgDependencyGraph;
use super::device::{RgCommandRecorder, RgDevice, RgNativeBuffer, RgNativeImage};
use super::error::{RgError, RgResult};
use super::execution_plan::log_execution_plan;
use super::image_resource::{RgImageDesc, RgImageResource, RgImageSource};
use super::pass::{
    RgBindTarget, RgFnExecutor, RgPass, RgPassBuilder, RgPassExecutorWrapper, RgPassNode, RgResourceAccess,
    merge_accesses,
};
use super::pass_context::{RgPassContext, RgStateOverride};
use super::pipeline::{RgPipeline, binding_usage};
use super::render_target::{RgRenderingInfo, RgResolvedAttachment};
use super::resource_handle::{RgBufferHandle, RgImageHandle, RgResourceHandle, RgResourceKind};
use super::resource_registry::RgResourceRegistry;
use super::resource_state::{RgBufferState, RgImageState, RgResourceState};
use super::stats::{RgCompileTimings, RgStats};
use super::state_tracker::RgStateTracker;
use super::subresource::RgSubresourceRange;
use super::subresource_map::RgImageSubresourceMap;
use super::transient_pool::{RgPooledBufferKey, RgPooledImageKey, RgTransientPool};

/// Pass debug label 的颜色
const PASS_LABEL_COLOR: [f32; 4] = [0.35, 0.65, 0.95, 1.0];

/// RenderGraph 的生命周期阶段
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RgGraphPhase {
    /// reset 之后，还没有声明任何东西
    Empty,
    /// 已经声明了资源或 Pass
    Declared,
    /// compile 成功
    Compiled,
    /// execute 完成
    Executed,
}

/// 临时资源使用的 pool 条目
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum RgTransientKey {
    Image(RgPooledImageKey),
    Buffer(RgPooledBufferKey),
}

/// compile 第 6 步的结果
#[derive(Default)]
struct RgAllocation {
    images: Vec<(RgImageHandle, RgNativeImage)>,
    buffers: Vec<(RgBufferHandle, RgNativeBuffer)>,
    /// (ordinal, key)，按 ordinal 排序
    keys: Vec<(u32, RgTransientKey)>,
    /// 帧内复用：后继资源 → 前驱资源
    image_inherit: HashMap<RgImageHandle, RgImageHandle>,
    buffer_inherit: HashMap<RgBufferHandle, RgBufferHandle>,
    hits: usize,
    misses: usize,
}

/// 上一次完整编译的同步计划
struct RgCompileCache {
    structure_hash: u64,
    transient_keys: Vec<(u32, RgTransientKey)>,
    images: Vec<(u32, RgImageHandle)>,
    buffers: Vec<(u32, RgBufferHandle)>,
    plan: RgSyncPlan,
}

/// 渲染图
///
/// 单线程使用，不需要 Send / Sync。
pub struct RenderGraph {
    config: RgGraphConfig,
    phase: RgGraphPhase,

    /// 本帧的资源表
    resources: RgResourceRegistry,
    /// Pass 节点列表（按声明顺序）
    passes: Vec<RgPassNode>,
    compiled: Option<RgCompiledGraph>,

    pool: RgTransientPool,
    /// 本帧临时资源使用的 pool 条目
    frame_keys: Vec<(u32, RgTransientKey)>,
    /// 上一帧同一 ordinal 的临时资源使用的 pool 条目
    previous_keys: HashMap<u32, RgTransientKey>,
    cache: Option<RgCompileCache>,

    stats: RgStats,
}

impl Default for RenderGraph {
    fn default() -> Self {
        Self::new(RgGraphConfig::default())
    }
}

// new & init
impl RenderGraph {
    pub fn new(config: RgGraphConfig) -> Self {
        Self {
            config,
            phase: RgGraphPhase::Empty,
            resources: RgResourceRegistry::new(),
            passes: Vec::new(),
            compiled: None,
            pool: RgTransientPool::default(),
            frame_keys: Vec::new(),
            previous_keys: HashMap::new(),
            cache: None,
            stats: RgStats::default(),
        }
    }

    /// 释放池中所有物理资源，并清空本帧状态
    ///
    /// 调用方需要保证 GPU 已经不再使用这些资源。
    pub fn destroy(&mut self, device: &mut dyn RgDevice) {
        self.reset();
        self.pool.destroy(device);
        self.previous_keys.clear();
        self.cache = None;
    }
}

impl Drop for RenderGraph {
    fn drop(&mut self) {
        if !self.pool.is_empty() {
            log::warn!(
                "RenderGraph dropped with {} pooled images and {} pooled buffers; call destroy() first",
                self.pool.image_count(),
                self.pool.buffer_count()
            );
        }
    }
}

// getters
impl RenderGraph {
    #[inline]
    pub fn config(&self) -> &RgGraphConfig {
        &self.config
    }

    #[inline]
    pub fn phase(&self) -> RgGraphPhase {
        self.phase
    }

    /// 最近一次 compile 的统计信息
    #[inline]
    pub fn stats(&self) -> &RgStats {
        &self.stats
    }

    #[inline]
    pub fn pass_count(&self) -> usize {
        self.passes.len()
    }

    #[inline]
    pub fn resources(&self) -> &RgResourceRegistry {
        &self.resources
    }

    /// 按执行顺序排列的 Pass 名称；未编译时为空
    pub fn execution_order(&self) -> Vec<&str> {
        match &self.compiled {
            Some(compiled) => compiled.plan.order.iter().map(|&i| self.passes[i].name.as_str()).collect(),
            None => Vec::new(),
        }
    }

    /// 名为 `pass_name` 的 Pass 直接依赖的 Pass（资源依赖与 `run_after`），按声明顺序
    pub fn pass_dependencies(&self, pass_name: &str) -> Vec<&str> {
        let Some(compiled) = &self.compiled else {
            return Vec::new();
        };
        let Some(index) = self.passes.iter().position(|node| node.name == pass_name) else {
            return Vec::new();
        };
        compiled.dependencies.predecessors(index).into_iter().map(|i| self.passes[i].name.as_str()).collect()
    }

    /// 名为 `pass_name` 的 Pass 执行前的 barrier
    pub fn pass_barriers(&self, pass_name: &str) -> Option<&RgPassBarriers> {
        let compiled = self.compiled.as_ref()?;
        compiled.plan.passes.iter().find(|sync| self.passes[sync.pass_index].name == pass_name).map(|sync| &sync.barriers)
    }

    /// 所有 Pass 执行之后图像所处的状态
    ///
    /// 子资源状态不一致时返回合并后的状态（layout 为 `UNDEFINED`）。
    /// execute 之后包含 Pass 的手动覆盖。可以直接作为下一帧 `import_image` 的初始状态。
    pub fn final_image_state(&self, handle: RgImageHandle) -> Option<RgImageState> {
        let map = self.compiled.as_ref()?.plan.final_images.get(handle)?;
        Some(map.query_state(map.full_range()).to_image_state())
    }

    /// 所有 Pass 执行之后图像的子资源状态表
    pub fn final_image_subresources(&self, handle: RgImageHandle) -> Option<&RgImageSubresourceMap> {
        self.compiled.as_ref()?.plan.final_images.get(handle)
    }

    pub fn final_buffer_state(&self, handle: RgBufferHandle) -> Option<RgBufferState> {
        let state = self.compiled.as_ref()?.plan.final_buffers.get(handle)?;
        Some(state.to_buffer_state())
    }

    /// 打印执行计划（用于调试）
    pub fn print_execution_plan(&self) {
        match &self.compiled {
            Some(compiled) => {
                log_execution_plan(&self.resources, &self.passes, &compiled.plan, &compiled.dependencies)
            }
            None => log::warn!("RenderGraph::print_execution_plan: graph is not compiled"),
        }
    }
}

// 资源声明
impl RenderGraph {
    /// 导入外部图像资源
    ///
    /// # 参数
    /// - `native`: 物理图像和默认视图
    /// - `desc`: 提供 format（推断 aspect）、尺寸和子资源数量
    /// - `initial_state`: 图像当前的状态
    pub fn import_image(
        &mut self,
        name: impl Into<String>,
        native: RgNativeImage,
        desc: RgImageDesc,
        initial_state: RgImageState,
    ) -> RgImageHandle {
        self.import_image_from_queue(name, native, desc, initial_state, vk::QUEUE_FAMILY_IGNORED)
    }

    /// 导入属于另一个队列族的图像，首次使用时生成 acquire barrier
    pub fn import_image_from_queue(
        &mut self,
        name: impl Into<String>,
        native: RgNativeImage,
        desc: RgImageDesc,
        initial_state: RgImageState,
        queue_family: u32,
    ) -> RgImageHandle {
        self.begin_declare("import_image");
        self.resources.register_image(RgImageResource::imported(name, native, desc, initial_state, queue_family))
    }

    /// 导入外部缓冲区资源
    pub fn import_buffer(
        &mut self,
        name: impl Into<String>,
        native: RgNativeBuffer,
        desc: RgBufferDesc,
        initial_state: RgBufferState,
    ) -> RgBufferHandle {
        self.import_buffer_from_queue(name, native, desc, initial_state, vk::QUEUE_FAMILY_IGNORED)
    }

    pub fn import_buffer_from_queue(
        &mut self,
        name: impl Into<String>,
        native: RgNativeBuffer,
        desc: RgBufferDesc,
        initial_state: RgBufferState,
        queue_family: u32,
    ) -> RgBufferHandle {
        self.begin_declare("import_buffer");
        self.resources.register_buffer(RgBufferResource::imported(name, native, desc, initial_state, queue_family))
    }

    /// 创建临时图像，compile 时从 transient pool 分配
    pub fn create_image(&mut self, name: impl Into<String>, desc: RgImageDesc) -> RgImageHandle {
        self.begin_declare("create_image");
        self.resources.register_image(RgImageResource::transient(name, desc))
    }

    pub fn create_buffer(&mut self, name: impl Into<String>, desc: RgBufferDesc) -> RgBufferHandle {
        self.begin_declare("create_buffer");
        self.resources.register_buffer(RgBufferResource::transient(name, desc))
    }

    /// # Panics
    /// 已经 compile 之后、reset 之前继续声明
    fn begin_declare(&mut self, operation: &'static str) {
        assert!(
            matches!(self.phase, RgGraphPhase::Empty | RgGraphPhase::Declared),
            "RenderGraph::{} called in phase {:?}; call reset() first",
            operation,
            self.phase
        );
        self.phase = RgGraphPhase::Declared;
    }
}

// Pass 声明
impl RenderGraph {
    /// 添加 Pass
    ///
    /// # 返回
    /// 返回 `&mut Self` 以支持链式调用
    pub fn add_pass<P: RgPass + 'static>(&mut self, name: impl Into<String>, mut pass: P) -> &mut Self {
        self.begin_declare("add_pass");
        let mut builder = RgPassBuilder::new(name.into(), &mut self.resources);
        pass.setup(&mut builder);
        let node = RgPassNode::new(builder, None, Box::new(RgPassExecutorWrapper { pass }));
        self.passes.push(node);
        self
    }

    /// 用闭包添加 Pass
    pub fn add_pass_fn<S, E>(&mut self, name: impl Into<String>, setup: S, execute: E) -> &mut Self
    where
        S: FnOnce(&mut RgPassBuilder),
        E: FnMut(&mut RgPassContext<'_>) + 'static,
    {
        self.begin_declare("add_pass_fn");
        let mut builder = RgPassBuilder::new(name.into(), &mut self.resources);
        setup(&mut builder);
        let node = RgPassNode::new(builder, None, Box::new(RgFnExecutor { func: execute }));
        self.passes.push(node);
        self
    }

    /// 添加管线感知的 Pass
    ///
    /// setup 中通过 `bind` 按名字绑定的资源会根据反射信息推导访问方式，
    /// compile 时生成 descriptor 写入，`begin_rendering` / `bind_pipeline` 时自动 push。
    pub fn add_pipeline_pass<P: RgPass + 'static>(
        &mut self,
        name: impl Into<String>,
        pipeline: RgPipeline,
        mut pass: P,
    ) -> &mut Self {
        self.begin_declare("add_pipeline_pass");
        let mut builder = RgPassBuilder::new(name.into(), &mut self.resources);
        pass.setup(&mut builder);
        let node = RgPassNode::new(builder, Some(pipeline), Box::new(RgPassExecutorWrapper { pass }));
        self.passes.push(node);
        self
    }

    pub fn add_pipeline_pass_fn<S, E>(
        &mut self,
        name: impl Into<String>,
        pipeline: RgPipeline,
        setup: S,
        execute: E,
    ) -> &mut Self
    where
        S: FnOnce(&mut RgPassBuilder),
        E: FnMut(&mut RgPassContext<'_>) + 'static,
    {
        self.begin_declare("add_pipeline_pass_fn");
        let mut builder = RgPassBuilder::new(name.into(), &mut self.resources);
        setup(&mut builder);
        let node = RgPassNode::new(builder, Some(pipeline), Box::new(RgFnExecutor { func: execute }));
        self.passes.push(node);
        self
    }
}

// compile
impl RenderGraph {
    /// 编译渲染图
    ///
    /// 出错时 graph 保持在 `Declared` 阶段，本次 compile 从池中取出的资源被归还。
    /// 已经处于 `Compiled` 阶段时直接返回。
    pub fn compile(&mut self, device: &mut dyn RgDevice) -> RgResult<()> {
        let _span = tracy_client::span!("RenderGraph::compile");

        match self.phase {
            RgGraphPhase::Compiled => return Ok(()),
            RgGraphPhase::Executed => {
                return Err(RgError::InvalidPhase {
                    operation: "compile",
                    phase: self.phase,
                });
            }
            RgGraphPhase::Empty | RgGraphPhase::Declared => {}
        }

        let total_start = Instant::now();
        let mut timings = RgCompileTimings::default();

        // 1. 展开子资源范围、合并重复声明、推导 binding 访问
        let start = Instant::now();
        self.finalize_accesses()?;
        let structure_hash = self.structure_hash();
        timings.finalize = start.elapsed();

        // 3~4. 依赖图 + 拓扑排序
        let start = Instant::now();
        let (order, dependencies) = self.schedule()?;
        timings.schedule = start.elapsed();

        // 2, 5~6. 临时资源生命周期与分配
        let start = Instant::now();
        self.pool.trim(device, self.config.max_idle_frames);
        let allocation = self.allocate_transients(device, &order)?;
        timings.allocate = start.elapsed();

        // 7~8. 状态跟踪与 barrier 计算
        let start = Instant::now();
        let cached = if self.config.enable_compile_cache {
            self.cached_plan(structure_hash, &allocation.keys)
        } else {
            None
        };
        let cache_hit = cached.is_some();
        let plan = match cached {
            Some(plan) => {
                log::debug!("RenderGraph: structure unchanged, reusing previous barriers");
                plan
            }
            None => self.build_sync_plan(order, &allocation),
        };
        timings.barriers = start.elapsed();

        // 9. 渲染目标与 descriptor
        let start = Instant::now();
        let physical = self.physical_resources(&allocation);
        let resolved = self.resolve_passes(&plan, &physical);
        timings.resolve = start.elapsed();
        timings.total = total_start.elapsed();

        self.update_stats(&plan, &allocation, cache_hit, timings);
        if self.config.enable_compile_cache && !cache_hit {
            self.cache = Some(RgCompileCache {
                structure_hash,
                transient_keys: allocation.keys.clone(),
                images: self.resources.iter_images().map(|(h, r)| (r.ordinal, h)).collect(),
                buffers: self.resources.iter_buffers().map(|(h, r)| (r.ordinal, h)).collect(),
                plan: plan.clone(),
            });
        }

        self.frame_keys = allocation.keys;
        self.compiled = Some(RgCompiledGraph {
            plan,
            resolved,
            physical,
            dependencies,
        });
        self.phase = RgGraphPhase::Compiled;

        if self.config.print_execution_plan && !cache_hit {
            self.print_execution_plan();
        }
        Ok(())
    }

    /// 第 1 步
    fn finalize_accesses(&mut self) -> RgResult<()> {
        let _span = tracy_client::span!("RenderGraph::compile::finalize");

        let resources = &self.resources;
        for node in &mut self.passes {
            let mut accesses = Vec::with_capacity(node.declared.len() + node.binds.len());

            for access in &node.declared {
                accesses.push(Self::resolve_access(resources, &node.name, access)?);
            }

            for bind in &node.binds {
                let reflected = node
                    .pipeline
                    .as_ref()
                    .and_then(|pipeline| pipeline.reflection.binding(&bind.name))
                    .ok_or_else(|| RgError::UnknownBinding {
                        pass: node.name.clone(),
                        binding: bind.name.clone(),
                    })?;

                let resource = bind.target.resource();
                let usage = match binding_usage(reflected) {
                    Some((kind, usage)) if kind == resource.kind() => usage,
                    _ => {
                        return Err(RgError::BindingTypeMismatch {
                            pass: node.name.clone(),
                            binding: bind.name.clone(),
                            descriptor_type: reflected.descriptor_type,
                            kind: resource.kind(),
                        });
                    }
                };

                let access = RgResourceAccess {
                    resource,
                    range: RgSubresourceRange::ALL,
                    usage,
                };
                accesses.push(Self::resolve_access(resources, &node.name, &access)?);
            }

            merge_accesses(&mut accesses).map_err(|(resource, first, second)| RgError::ConflictingLayouts {
                pass: node.name.clone(),
                resource: resources.name(resource).to_string(),
                first,
                second,
            })?;
            node.accesses = accesses;
        }

        Ok(())
    }

    /// 检查句柄有效性，展开 `REMAINING`
    fn resolve_access(
        resources: &RgResourceRegistry,
        pass_name: &str,
        access: &RgResourceAccess,
    ) -> RgResult<RgResourceAccess> {
        let invalid = || RgError::InvalidHandle {
            pass: pass_name.to_string(),
            kind: access.resource.kind(),
        };

        let range = match access.resource {
            RgResourceHandle::Image(handle) => {
                let image = resources.get_image(handle).ok_or_else(invalid)?;
                access.range.resolve(image.desc.mip_levels, image.desc.array_layers)
            }
            RgResourceHandle::Buffer(handle) => {
                resources.get_buffer(handle).ok_or_else(invalid)?;
                RgSubresourceRange::ALL
            }
        };

        Ok(RgResourceAccess { range, ..*access })
    }

    /// 与执行结果相关的 graph 结构
    ///
    /// 不包含物理句柄、sampler、清除值：它们只影响第 9 步，而第 9 步每次都会重新执行。
    fn structure_hash(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.config.queue_family_index.hash(&mut hasher);

        let images = self.resources.iter_images().map(|(_, image)| image).sorted_by_key(|image| image.ordinal);
        for image in images {
            image.ordinal.hash(&mut hasher);
            image.desc.hash(&mut hasher);
            match &image.source {
                RgImageSource::Imported {
                    initial_state,
                    queue_family,
                    ..
                } => (0u8, initial_state, queue_family).hash(&mut hasher),
                RgImageSource::Transient => 1u8.hash(&mut hasher),
            }
        }

        let buffers = self.resources.iter_buffers().map(|(_, buffer)| buffer).sorted_by_key(|buffer| buffer.ordinal);
        for buffer in buffers {
            buffer.ordinal.hash(&mut hasher);
            buffer.desc.hash(&mut hasher);
            match &buffer.source {
                RgBufferSource::Imported {
                    initial_state,
                    queue_family,
                    ..
                } => (0u8, initial_state, queue_family).hash(&mut hasher),
                RgBufferSource::Transient => 1u8.hash(&mut hasher),
            }
        }

        for node in &self.passes {
            node.name.hash(&mut hasher);
            node.accesses.len().hash(&mut hasher);
            for access in &node.accesses {
                self.resources.ordinal(access.resource).hash(&mut hasher);
                access.range.hash(&mut hasher);
                access.usage.hash(&mut hasher);
            }
            node.run_after.hash(&mut hasher);
        }

        hasher.finish()
    }

    /// 第 3~4 步
    fn schedule(&self) -> RgResult<(Vec<usize>, RgDependencyGraph)> {
        let _span = tracy_client::span!("RenderGraph::compile::schedule");

        let accesses = self.passes.iter().map(|node| node.accesses.clone()).collect_vec();
        let mut graph = RgDependencyGraph::analyze(&accesses);

        for (consumer, node) in self.passes.iter().enumerate() {
            for target in &node.run_after {
                let producer = self.passes.iter().position(|other| other.name == *target).ok_or_else(|| {
                    RgError::UnknownPass {
                        pass: node.name.clone(),
                        target: target.clone(),
                    }
                })?;
                graph.add_edge(producer, consumer, None);
            }
        }

        let order = graph.topological_sort().map_err(|cycle| RgError::CyclicDependency {
            passes: cycle.iter().map(|&i| self.passes[i].name.clone()).collect(),
        })?;
        Ok((order, graph))
    }

    /// 第 2、5、6 步
    ///
    /// 只有被某个 Pass 访问的临时资源才会分配。
    /// 按首次使用的顺序分配：已经结束生命周期、且描述相同的临时资源的条目被直接接管。
    fn allocate_transients(&mut self, device: &mut dyn RgDevice, order: &[usize]) -> RgResult<RgAllocation> {
        let _span = tracy_client::span!("RenderGraph::compile::allocate");

        // (first, last) 执行位置
        let mut lifetimes: HashMap<RgResourceHandle, (usize, usize)> = HashMap::new();
        for (position, &pass_index) in order.iter().enumerate() {
            for access in &self.passes[pass_index].accesses {
                let transient = match access.resource {
                    RgResourceHandle::Image(h) => self.resources.get_image(h).is_some_and(|r| r.is_transient()),
                    RgResourceHandle::Buffer(h) => self.resources.get_buffer(h).is_some_and(|r| r.is_transient()),
                };
                if transient {
                    let lifetime = lifetimes.entry(access.resource).or_insert((position, position));
                    lifetime.1 = position;
                }
            }
        }
        let lifetimes = lifetimes
            .into_iter()
            .sorted_by_key(|(resource, (first, _))| (*first, self.resources.ordinal(*resource)))
            .collect_vec();

        let mut allocation = RgAllocation::default();
        let mut active_images: Vec<(RgImageHandle, usize, RgPooledImageKey, RgNativeImage)> = Vec::new();
        let mut active_buffers: Vec<(RgBufferHandle, usize, RgPooledBufferKey, RgNativeBuffer)> = Vec::new();
        let mut free_images: Vec<(RgImageHandle, RgPooledImageKey, RgNativeImage)> = Vec::new();
        let mut free_buffers: Vec<(RgBufferHandle, RgPooledBufferKey, RgNativeBuffer)> = Vec::new();

        for (resource, (first, last)) in lifetimes {
            active_images.retain(|&(h, end, key, native)| {
                let alive = end >= first;
                if !alive {
                    free_images.push((h, key, native));
                }
                alive
            });
            active_buffers.retain(|&(h, end, key, native)| {
                let alive = end >= first;
                if !alive {
                    free_buffers.push((h, key, native));
                }
                alive
            });

            match resource {
                RgResourceHandle::Image(handle) => {
                    let Some(image) = self.resources.get_image(handle) else {
                        continue;
                    };

                    let inherited = free_images.iter().position(|(prev, _, _)| {
                        self.resources.get_image(*prev).is_some_and(|prev| prev.desc == image.desc)
                    });
                    let (key, native) = match inherited {
                        Some(index) => {
                            let (prev, key, native) = free_images.remove(index);
                            allocation.image_inherit.insert(handle, prev);
                            allocation.hits += 1;
                            (key, native)
                        }
                        None => {
                            let hint = match self.previous_keys.get(&image.ordinal) {
                                Some(RgTransientKey::Image(key)) => Some(*key),
                                _ => None,
                            };
                            match self.pool.acquire_image(device, &image.name, &image.desc, hint) {
                                Ok(acquired) => {
                                    if acquired.reused {
                                        allocation.hits += 1;
                                    } else {
                                        allocation.misses += 1;
                                    }
                                    (acquired.key, acquired.native)
                                }
                                Err(result) => {
                                    let name = image.name.clone();
                                    self.release_allocation(&allocation);
                                    return Err(RgError::AllocationFailed {
                                        name,
                                        kind: RgResourceKind::Image,
                                        result,
                                    });
                                }
                            }
                        }
                    };

                    allocation.keys.push((image.ordinal, RgTransientKey::Image(key)));
                    allocation.images.push((handle, native));
                    active_images.push((handle, last, key, native));
                }
                RgResourceHandle::Buffer(handle) => {
                    let Some(buffer) = self.resources.get_buffer(handle) else {
                        continue;
                    };

                    let inherited = free_buffers.iter().position(|(prev, _, _)| {
                        self.resources.get_buffer(*prev).is_some_and(|prev| prev.desc == buffer.desc)
                    });
                    let (key, native) = match inherited {
                        Some(index) => {
                            let (prev, key, native) = free_buffers.remove(index);
                            allocation.buffer_inherit.insert(handle, prev);
                            allocation.hits += 1;
                            (key, native)
                        }
                        None => {
                            let hint = match self.previous_keys.get(&buffer.ordinal) {
                                Some(RgTransientKey::Buffer(key)) => Some(*key),
                                _ => None,
                            };
                            match self.pool.acquire_buffer(device, &buffer.name, &buffer.desc, hint) {
                                Ok(acquired) => {
                                    if acquired.reused {
                                        allocation.hits += 1;
                                    } else {
                                        allocation.misses += 1;
                                    }
                                    (acquired.key, acquired.native)
                                }
                                Err(result) => {
                                    let name = buffer.name.clone();
                                    self.release_allocation(&allocation);
                                    return Err(RgError::AllocationFailed {
                                        name,
                                        kind: RgResourceKind::Buffer,
                                        result,
                                    });
                                }
                            }
                        }
                    };

                    allocation.keys.push((buffer.ordinal, RgTransientKey::Buffer(key)));
                    allocation.buffers.push((handle, native));
                    active_buffers.push((handle, last, key, native));
                }
            }
        }

        allocation.keys.sort_by_key(|(ordinal, _)| *ordinal);
        log::debug!(
            "RenderGraph: {} transient images, {} transient buffers ({} reused, {} created)",
            allocation.images.len(),
            allocation.buffers.len(),
            allocation.hits,
            allocation.misses
        );
        Ok(allocation)
    }

    /// 把本次 compile 取出的条目还给池
    fn release_allocation(&mut self, allocation: &RgAllocation) {
        for (_, key) in &allocation.keys {
            match key {
                RgTransientKey::Image(key) => self.pool.release_image(*key),
                RgTransientKey::Buffer(key) => self.pool.release_buffer(*key),
            }
        }
    }

    /// 结构与临时资源分配都和上一次完整编译相同时，取回上一次的同步计划
    fn cached_plan(&self, structure_hash: u64, transient_keys: &[(u32, RgTransientKey)]) -> Option<RgSyncPlan> {
        let cache = self.cache.as_ref()?;
        if cache.structure_hash != structure_hash || cache.transient_keys != transient_keys {
            return None;
        }

        let images_by_ordinal: HashMap<u32, RgImageHandle> =
            self.resources.iter_images().map(|(h, r)| (r.ordinal, h)).collect();
        let buffers_by_ordinal: HashMap<u32, RgBufferHandle> =
            self.resources.iter_buffers().map(|(h, r)| (r.ordinal, h)).collect();

        let mut images = HashMap::with_capacity(cache.images.len());
        for (ordinal, old) in &cache.images {
            images.insert(*old, *images_by_ordinal.get(ordinal)?);
        }
        let mut buffers = HashMap::with_capacity(cache.buffers.len());
        for (ordinal, old) in &cache.buffers {
            buffers.insert(*old, *buffers_by_ordinal.get(ordinal)?);
        }

        cache.plan.remap(&images, &buffers)
    }

    /// 第 7~8 步
    fn build_sync_plan(&self, order: Vec<usize>, allocation: &RgAllocation) -> RgSyncPlan {
        let _span = tracy_client::span!("RenderGraph::compile::barriers");

        // 7. 导入资源使用导入状态，临时资源为 UNTOUCHED；帧内接管的临时资源在首次访问时初始化
        let mut tracker = RgStateTracker::new(self.config.queue_family_index);
        for (handle, image) in self.resources.iter_images() {
            let state = match &image.source {
                RgImageSource::Imported {
                    initial_state,
                    queue_family,
                    ..
                } => RgResourceState::from_image_state(*initial_state, *queue_family),
                RgImageSource::Transient if allocation.image_inherit.contains_key(&handle) => continue,
                RgImageSource::Transient => RgResourceState::UNTOUCHED,
            };
            tracker.init_image(handle, image.desc.mip_levels, image.desc.array_layers, state);
        }
        for (handle, buffer) in self.resources.iter_buffers() {
            let state = match &buffer.source {
                RgBufferSource::Imported {
                    initial_state,
                    queue_family,
                    ..
                } => RgResourceState::from_buffer_state(*initial_state, *queue_family),
                RgBufferSource::Transient if allocation.buffer_inherit.contains_key(&handle) => continue,
                RgBufferSource::Transient => RgResourceState::UNTOUCHED,
            };
            tracker.init_buffer(handle, state);
        }

        // 8. 按执行顺序模拟访问
        let mut passes = Vec::with_capacity(order.len());
        for &pass_index in &order {
            let node = &self.passes[pass_index];
            let mut sync = RgPassSync {
                pass_index,
                ..Default::default()
            };

            for access in &node.accesses {
                match access.resource {
                    RgResourceHandle::Image(handle) => {
                        let Some(image) = self.resources.get_image(handle) else {
                            continue;
                        };
                        if !tracker.contains_image(handle) {
                            let state = allocation
                                .image_inherit
                                .get(&handle)
                                .and_then(|prev| tracker.image_map(*prev))
                                .map(|map| RgResourceState {
                                    layout: vk::ImageLayout::UNDEFINED,
                                    ..map.query_state(map.full_range())
                                })
                                .unwrap_or_default();
                            tracker.init_image(handle, image.desc.mip_levels, image.desc.array_layers, state);
                        }

                        tracker.access_image(
                            handle,
                            access.range,
                            &access.usage,
                            image.aspect(),
                            &mut sync.barriers.image_barriers,
                        );
                        if sync.image_layout(handle).is_none() {
                            sync.image_layouts.push((handle, access.usage.layout));
                        }
                    }
                    RgResourceHandle::Buffer(handle) => {
                        if !tracker.contains_buffer(handle) {
                            let state = allocation
                                .buffer_inherit
                                .get(&handle)
                                .and_then(|prev| tracker.buffer_state(*prev))
                                .unwrap_or_default();
                            tracker.init_buffer(handle, state);
                        }
                        tracker.access_buffer(handle, &access.usage, &mut sync.barriers.buffer_barriers);
                    }
                }
            }

            for access in &node.accesses {
                match access.resource {
                    RgResourceHandle::Image(handle) => {
                        if sync.post_image(handle).is_none() {
                            if let Some(map) = tracker.image_map(handle) {
                                sync.post_images.push((handle, map.clone()));
                            }
                        }
                    }
                    RgResourceHandle::Buffer(handle) => {
                        if sync.post_buffer(handle).is_none() {
                            if let Some(state) = tracker.buffer_state(handle) {
                                sync.post_buffers.push((handle, state));
                            }
                        }
                    }
                }
            }

            passes.push(sync);
        }

        let (final_images, final_buffers) = tracker.into_states();
        RgSyncPlan {
            order,
            passes,
            final_images,
            final_buffers,
        }
    }

    fn physical_resources(&self, allocation: &RgAllocation) -> RgPhysicalResources {
        let mut physical = RgPhysicalResources::default();
        for (handle, image) in self.resources.iter_images() {
            if let Some(native) = image.imported_native() {
                physical.images.insert(handle, native);
            }
        }
        for (handle, buffer) in self.resources.iter_buffers() {
            if let Some(native) = buffer.imported_native() {
                physical.buffers.insert(handle, native);
            }
        }
        for &(handle, native) in &allocation.images {
            physical.images.insert(handle, native);
        }
        for &(handle, native) in &allocation.buffers {
            physical.buffers.insert(handle, native);
        }
        physical
    }

    /// 第 9 步
    fn resolve_passes(&self, plan: &RgSyncPlan, physical: &RgPhysicalResources) -> Vec<RgResolvedPass> {
        let _span = tracy_client::span!("RenderGraph::compile::resolve");

        plan.passes
            .iter()
            .map(|sync| {
                let node = &self.passes[sync.pass_index];
                RgResolvedPass {
                    rendering: node.has_render_targets().then(|| self.resolve_rendering(node, sync, physical)),
                    descriptor_writes: self.resolve_descriptors(node, sync, physical),
                }
            })
            .collect()
    }

    fn resolve_rendering(&self, node: &RgPassNode, sync: &RgPassSync, physical: &RgPhysicalResources) -> RgRenderingInfo {
        let resolve = |image: RgImageHandle, ops, default_layout| {
            let native = physical.image(image).unwrap_or_default();
            let has_stencil = self
                .resources
                .get_image(image)
                .is_some_and(|r| r.aspect().contains(vk::ImageAspectFlags::STENCIL));
            RgResolvedAttachment {
                image: native.image,
                view: native.view,
                layout: sync.image_layout(image).unwrap_or(default_layout),
                ops,
                has_stencil,
            }
        };

        let color_attachments = node
            .color_attachments
            .iter()
            .map(|attachment| resolve(attachment.image, attachment.ops, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL))
            .collect_vec();
        let depth_attachment = node.depth_attachment.as_ref().map(|attachment| {
            resolve(attachment.image, attachment.ops, vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL)
        });

        // render area 取所有附件 mip 0 尺寸的最小值
        let descs = node
            .color_attachments
            .iter()
            .map(|attachment| attachment.image)
            .chain(node.depth_attachment.as_ref().map(|attachment| attachment.image))
            .filter_map(|image| self.resources.get_image(image).map(|r| r.desc))
            .collect_vec();
        let width = descs.iter().map(|desc| desc.width).min().unwrap_or(0);
        let height = descs.iter().map(|desc| desc.height).min().unwrap_or(0);
        let layer_count = descs.iter().map(|desc| desc.array_layers).min().unwrap_or(1);

        RgRenderingInfo {
            render_area: vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent: vk::Extent2D { width, height },
            },
            layer_count,
            color_attachments,
            depth_attachment,
        }
    }

    fn resolve_descriptors(
        &self,
        node: &RgPassNode,
        sync: &RgPassSync,
        physical: &RgPhysicalResources,
    ) -> Vec<RgDescriptorWrite> {
        let Some(pipeline) = &node.pipeline else {
            return Vec::new();
        };

        node.binds
            .iter()
            .filter_map(|bind| {
                let reflected = pipeline.reflection.binding(&bind.name)?;
                let info = match bind.target {
                    RgBindTarget::Image { image, sampler } => RgDescriptorInfo::Image {
                        sampler,
                        view: physical.image(image).unwrap_or_default().view,
                        layout: sync.image_layout(image).unwrap_or(vk::ImageLayout::GENERAL),
                    },
                    RgBindTarget::Buffer(buffer) => RgDescriptorInfo::Buffer {
                        buffer: physical.buffer(buffer).unwrap_or_default().buffer,
                        offset: 0,
                        range: vk::WHOLE_SIZE,
                    },
                };
                Some(RgDescriptorWrite {
                    set: reflected.set,
                    binding: reflected.binding,
                    descriptor_type: reflected.descriptor_type,
                    info,
                })
            })
            .sorted_by_key(|write| (write.set, write.binding))
            .collect()
    }

    fn update_stats(&mut self, plan: &RgSyncPlan, allocation: &RgAllocation, cache_hit: bool, timings: RgCompileTimings) {
        let stats = &mut self.stats;
        stats.pass_count = self.passes.len();
        stats.image_count = self.resources.image_count();
        stats.buffer_count = self.resources.buffer_count();
        stats.transient_image_count = allocation.images.len();
        stats.transient_buffer_count = allocation.buffers.len();
        stats.pool_hits = allocation.hits;
        stats.pool_misses = allocation.misses;
        stats.pooled_image_count = self.pool.image_count();
        stats.pooled_buffer_count = self.pool.buffer_count();

        stats.reset_barrier_counts();
        for sync in &plan.passes {
            stats.count_barriers(&sync.barriers);
        }

        stats.cache_hit = cache_hit;
        stats.timings = timings;
    }
}

// execute & reset
impl RenderGraph {
    /// 执行渲染图
    ///
    /// # 参数
    /// - `cmd`: 命令录制器（命令缓冲区已经 begin）
    pub fn execute(&mut self, cmd: &dyn RgCommandRecorder) -> RgResult<()> {
        let _span = tracy_client::span!("RenderGraph::execute");

        match self.phase {
            RgGraphPhase::Compiled => {}
            RgGraphPhase::Executed => {
                return Err(RgError::InvalidPhase {
                    operation: "execute",
                    phase: self.phase,
                });
            }
            RgGraphPhase::Empty | RgGraphPhase::Declared => return Err(RgError::NotCompiled),
        }
        let Some(compiled) = self.compiled.as_mut() else {
            return Err(RgError::NotCompiled);
        };

        // 只包含被手动覆盖过状态的资源；之后对这些资源的 barrier 不再使用预计算的结果
        let mut live = RgStateTracker::new(self.config.queue_family_index);

        for position in 0..compiled.plan.passes.len() {
            let sync = &compiled.plan.passes[position];
            let resolved = &compiled.resolved[position];
            let RgPassNode {
                name,
                accesses,
                pipeline,
                executor,
                ..
            } = &mut self.passes[sync.pass_index];
            let name = name.as_str();

            // barriers
            let mut image_barriers = Vec::new();
            let mut buffer_barriers = Vec::new();
            for desc in &sync.barriers.image_barriers {
                if live.contains_image(desc.image) {
                    continue;
                }
                if let Some(native) = compiled.physical.image(desc.image) {
                    image_barriers.push(desc.to_vk(native.image));
                }
            }
            for desc in &sync.barriers.buffer_barriers {
                if live.contains_buffer(desc.buffer) {
                    continue;
                }
                if let Some(native) = compiled.physical.buffer(desc.buffer) {
                    buffer_barriers.push(desc.to_vk(native.buffer));
                }
            }
            for access in accesses.iter() {
                match access.resource {
                    RgResourceHandle::Image(handle) if live.contains_image(handle) => {
                        let aspect = self.resources.get_image(handle).map(|r| r.aspect()).unwrap_or_default();
                        let mut descs = Vec::new();
                        live.access_image(handle, access.range, &access.usage, aspect, &mut descs);
                        if let Some(native) = compiled.physical.image(handle) {
                            image_barriers.extend(descs.iter().map(|desc| desc.to_vk(native.image)));
                        }
                    }
                    RgResourceHandle::Buffer(handle) if live.contains_buffer(handle) => {
                        let mut descs = Vec::new();
                        live.access_buffer(handle, &access.usage, &mut descs);
                        if let Some(native) = compiled.physical.buffer(handle) {
                            buffer_barriers.extend(descs.iter().map(|desc| desc.to_vk(native.buffer)));
                        }
                    }
                    _ => {}
                }
            }
            if !image_barriers.is_empty() || !buffer_barriers.is_empty() {
                cmd.cmd_pipeline_barrier2(&image_barriers, &buffer_barriers);
            }

            if self.config.debug_labels {
                cmd.begin_label(name, PASS_LABEL_COLOR);
            }

            let mut ctx = RgPassContext {
                cmd,
                pass_name: name,
                sync,
                resolved,
                physical: &compiled.physical,
                pipeline: pipeline.as_ref(),
                queue_family: self.config.queue_family_index,
                rendering_active: false,
                overrides: Vec::new(),
            };
            executor.execute(&mut ctx);
            let (overrides, rendering_active) = ctx.into_overrides();

            if rendering_active {
                log::warn!("pass \"{}\" returned without end_rendering", name);
                cmd.cmd_end_rendering();
            }
            if self.config.debug_labels {
                cmd.end_label();
            }

            for state_override in overrides {
                Self::apply_override(&mut live, &self.resources, &compiled.plan, position, name, state_override);
            }
        }

        let (images, buffers) = live.into_states();
        for (handle, map) in images {
            compiled.plan.final_images.insert(handle, map);
        }
        for (handle, state) in buffers {
            compiled.plan.final_buffers.insert(handle, state);
        }

        self.phase = RgGraphPhase::Executed;
        Ok(())
    }

    /// 把 Pass 的状态覆盖应用到 live tracker
    ///
    /// 资源第一次被覆盖时，从该 Pass 执行之后的预计算状态开始跟踪。
    fn apply_override(
        live: &mut RgStateTracker,
        resources: &RgResourceRegistry,
        plan: &RgSyncPlan,
        position: usize,
        pass_name: &str,
        state_override: RgStateOverride,
    ) {
        let declared = &plan.passes[position];
        match state_override {
            RgStateOverride::Image { image, .. } | RgStateOverride::Discard(image) => {
                if declared.post_image(image).is_none() {
                    log::warn!(
                        "pass \"{}\" overrides the state of undeclared image \"{}\"",
                        pass_name,
                        resources.name(image.into())
                    );
                }
                if !live.contains_image(image) {
                    let Some(map) = Self::image_state_at(resources, plan, position, image) else {
                        log::warn!("pass \"{}\" overrides the state of an invalid image handle", pass_name);
                        return;
                    };
                    live.init_image_map(image, map);
                }
            }
            RgStateOverride::Buffer { buffer, .. } => {
                if declared.post_buffer(buffer).is_none() {
                    log::warn!(
                        "pass \"{}\" overrides the state of undeclared buffer \"{}\"",
                        pass_name,
                        resources.name(buffer.into())
                    );
                }
                if !live.contains_buffer(buffer) {
                    let Some(state) = Self::buffer_state_at(resources, plan, position, buffer) else {
                        log::warn!("pass \"{}\" overrides the state of an invalid buffer handle", pass_name);
                        return;
                    };
                    live.init_buffer(buffer, state);
                }
            }
        }

        match state_override {
            RgStateOverride::Image { image, range, state } => live.override_image(image, range, state),
            RgStateOverride::Buffer { buffer, state } => live.override_buffer(buffer, state),
            RgStateOverride::Discard(image) => live.discard_image(image),
        }
    }

    /// 执行到第 `position` 个 Pass 之后，预计算的图像状态
    fn image_state_at(
        resources: &RgResourceRegistry,
        plan: &RgSyncPlan,
        position: usize,
        handle: RgImageHandle,
    ) -> Option<RgImageSubresourceMap> {
        if let Some(map) = plan.passes[..=position].iter().rev().find_map(|sync| sync.post_image(handle)) {
            return Some(map.clone());
        }

        let image = resources.get_image(handle)?;
        let state = match &image.source {
            RgImageSource::Imported {
                initial_state,
                queue_family,
                ..
            } => RgResourceState::from_image_state(*initial_state, *queue_family),
            RgImageSource::Transient => RgResourceState::UNTOUCHED,
        };
        Some(RgImageSubresourceMap::new(image.desc.mip_levels, image.desc.array_layers, state))
    }

    fn buffer_state_at(
        resources: &RgResourceRegistry,
        plan: &RgSyncPlan,
        position: usize,
        handle: RgBufferHandle,
    ) -> Option<RgResourceState> {
        if let Some(state) = plan.passes[..=position].iter().rev().find_map(|sync| sync.post_buffer(handle)) {
            return Some(state);
        }

        let buffer = resources.get_buffer(handle)?;
        Some(match &buffer.source {
            RgBufferSource::Imported {
                initial_state,
                queue_family,
                ..
            } => RgResourceState::from_buffer_state(*initial_state, *queue_family),
            RgBufferSource::Transient => RgResourceState::UNTOUCHED,
        })
    }

    /// 结束本帧
    ///
    /// 临时资源归还到池中（不销毁），本帧的资源句柄全部失效，Pass 列表清空；
    /// 池与编译缓存保留到下一帧。
    ///
    /// 调用方需要保证 GPU 已经执行完本帧的命令，否则下一帧可能复用仍在使用的临时资源。
    pub fn reset(&mut self) {
        let _span = tracy_client::span!("RenderGraph::reset");

        self.pool.end_frame();
        self.previous_keys = self.frame_keys.drain(..).collect();
        self.resources.clear();
        self.passes.clear();
        self.compiled = None;
        self.phase = RgGraphPhase::Empty;
    }
}
