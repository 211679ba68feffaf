//! 基于 ash + vk-mem 的后端实现
//!
//! - [`RgVulkanDevice`]: 通过 vk-mem 分配临时资源
//! - [`RgVulkanCommandBuffer`]: 把 graph 的命令录制到 `vk::CommandBuffer`

mod command_buffer;
mod device;

pub use command_buffer::RgVulkanCommandBuffer;
pub use device::RgVulkanDevice;
