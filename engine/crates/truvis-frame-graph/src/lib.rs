//! Truvis 渲染图
//!
//! - [`render_graph`]: 与具体后端无关的渲染图（依赖分析、barrier、临时资源池）
//! - [`vulkan`]: 基于 ash + vk-mem 的设备与命令录制实现

pub mod render_graph;
pub mod vulkan;

#[cfg(test)]
mod test_utils;
