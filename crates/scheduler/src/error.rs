// error.rs
// 定义项目通用的错误类型（分发、任务执行、批次、IO、监控等）和Result类型。
use std::io;
use thiserror::Error;

use crate::types::WorkUnit;

/// 项目通用错误类型
#[derive(Debug, Error)]
pub enum Error {
    /// IO错误（状态文件、结果文件）
    #[error("IO错误: {0}")]
    Io(#[from] io::Error),
    /// 配置错误
    #[error("配置错误: {0}")]
    ConfigError(String),
    /// 任务分发失败，submitted < total 表示批次只提交了一部分
    #[error("任务分发失败 (已提交 {submitted}/{total}): {reason}")]
    DispatchError {
        submitted: usize,
        total: usize,
        reason: String,
    },
    /// 执行后端拒绝了单个任务的提交
    #[error("任务提交被拒绝: {0}")]
    SubmissionRejected(String),
    /// 单个工作单元的仿真失败
    #[error("任务 {task_id} 执行失败: {message}")]
    TaskExecutionFailure { task_id: String, message: String },
    /// 批次中任一任务失败，整个批次失败
    #[error(
        "批次 {batch_id} 失败，任务 {task_id} (theta1={}, theta2={}): {message}",
        .unit.theta1_init,
        .unit.theta2_init
    )]
    BatchFailure {
        batch_id: String,
        task_id: String,
        unit: WorkUnit,
        message: String,
    },
    /// 通知通道关闭时仍有任务未完成
    #[error("批次 {batch_id} 未完成: 仍有 {outstanding} 个任务没有终态通知")]
    BatchIncomplete { batch_id: String, outstanding: usize },
    /// 结果聚合错误
    #[error("结果聚合错误: {0}")]
    AggregationError(String),
    /// 队列查询失败
    #[error("队列查询失败: {0}")]
    QueueInspectionError(String),
    /// 监控推送失败
    #[error("监控推送失败: {0}")]
    MonitoringError(String),
    /// 其他类型错误
    #[error("其他错误: {0}")]
    Other(String),
}

/// 通用结果类型
pub type Result<T> = std::result::Result<T, Error>;

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::ConfigError(format!("JSON解析失败: {}", e))
    }
}
