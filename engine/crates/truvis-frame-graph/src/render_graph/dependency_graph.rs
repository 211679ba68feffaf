//! 依赖图构建和拓扑排序
//!
//! 分析 Pass 之间的资源依赖关系，构建 DAG 并进行拓扑排序。

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use super::pass::RgResourceAccess;
use super::resource_handle::RgResourceHandle;

/// 依赖边：从 producer 到 consumer
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RgDependencyEdge {
    /// 生产者 Pass 索引（先执行）
    pub producer: usize,
    /// 消费者 Pass 索引（后执行）
    pub consumer: usize,
    /// 产生依赖的资源；`run_after` 声明的顺序约束为 `None`
    pub resource: Option<RgResourceHandle>,
}

/// 依赖图
///
/// 表示 Pass 之间的依赖关系，用于拓扑排序和执行顺序计算。
#[derive(Clone, Debug, Default)]
pub struct RgDependencyGraph {
    /// Pass 数量
    pass_count: usize,
    /// 邻接表（出边）
    adjacency: Vec<Vec<usize>>,
    /// 入度表
    in_degrees: Vec<usize>,
    /// 所有边
    edges: Vec<RgDependencyEdge>,
}

impl RgDependencyGraph {
    pub fn new(pass_count: usize) -> Self {
        Self {
            pass_count,
            adjacency: vec![Vec::new(); pass_count],
            in_degrees: vec![0; pass_count],
            edges: Vec::new(),
        }
    }

    /// 根据资源访问构建依赖图
    ///
    /// 对同一资源、区间重叠、且至少一方写入的两次访问，
    /// 声明在前的 Pass 指向声明在后的 Pass：
    /// - 写后读（RAW）：reader 依赖 writer
    /// - 读后写（WAR）：writer 依赖 reader（保证读取完成）
    /// - 写后写（WAW）：后一个 writer 依赖前一个 writer
    pub fn analyze(accesses: &[Vec<RgResourceAccess>]) -> Self {
        let mut graph = Self::new(accesses.len());

        for (consumer, consumer_accesses) in accesses.iter().enumerate() {
            for (producer, producer_accesses) in accesses[..consumer].iter().enumerate() {
                let shared = consumer_accesses.iter().find(|a| {
                    producer_accesses.iter().any(|b| {
                        a.resource == b.resource
                            && a.range.overlaps(&b.range)
                            && (a.usage.kind.is_write() || b.usage.kind.is_write())
                    })
                });
                if let Some(access) = shared {
                    graph.add_edge(producer, consumer, Some(access.resource));
                }
            }
        }

        graph
    }

    /// 添加依赖边
    ///
    /// 重复的边只计一次入度，自环被忽略。
    pub fn add_edge(&mut self, producer: usize, consumer: usize, resource: Option<RgResourceHandle>) {
        if producer == consumer {
            return;
        }

        // 避免重复边
        if !self.adjacency[producer].contains(&consumer) {
            self.adjacency[producer].push(consumer);
            self.in_degrees[consumer] += 1;
        }

        self.edges.push(RgDependencyEdge {
            producer,
            consumer,
            resource,
        });
    }

    /// 执行稳定的拓扑排序
    ///
    /// 多个 Pass 同时就绪时，声明顺序靠前的先执行，因此没有依赖关系的 Pass 保持声明顺序。
    ///
    /// # 返回
    /// - `Ok(order)`: 拓扑排序后的 Pass 索引列表
    /// - `Err(cycle)`: 检测到循环依赖，返回未能排序的 Pass 索引（升序）
    pub fn topological_sort(&self) -> Result<Vec<usize>, Vec<usize>> {
        let mut in_degrees = self.in_degrees.clone();
        let mut ready: BinaryHeap<Reverse<usize>> =
            (0..self.pass_count).filter(|&i| in_degrees[i] == 0).map(Reverse).collect();
        let mut result = Vec::with_capacity(self.pass_count);

        while let Some(Reverse(node)) = ready.pop() {
            result.push(node);

            for &neighbor in &self.adjacency[node] {
                in_degrees[neighbor] -= 1;
                if in_degrees[neighbor] == 0 {
                    ready.push(Reverse(neighbor));
                }
            }
        }

        if result.len() != self.pass_count {
            let remaining: Vec<usize> = (0..self.pass_count).filter(|&i| in_degrees[i] > 0).collect();
            Err(remaining)
        } else {
            Ok(result)
        }
    }

    /// 获取 Pass 的直接依赖（前驱）
    pub fn predecessors(&self, pass_index: usize) -> Vec<usize> {
        self.adjacency
            .iter()
            .enumerate()
            .filter(|(_, adj)| adj.contains(&pass_index))
            .map(|(i, _)| i)
            .collect()
    }

    #[inline]
    pub fn edges(&self) -> &[RgDependencyEdge] {
        &self.edges
    }
}
