//! Truvis 工具集
//!
//! 在各个 crate 之间共享的日志初始化工具。

pub mod init_log;
