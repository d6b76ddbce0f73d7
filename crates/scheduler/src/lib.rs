// lib.rs
// 调度器模块入口，声明并导出各子模块。
pub mod barrier;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod monitoring;
pub mod pendulum;
pub mod result_merger;
pub mod scheduler;
pub mod status;
pub mod sweep;
pub mod task;
pub mod task_executor;
pub mod task_splitter;
pub mod types;
