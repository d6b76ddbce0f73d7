// task.rs
// 仿真任务结构体、任务句柄和终态通知。
use crate::types::{WorkResult, WorkUnit};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// 任务状态枚举，描述任务的生命周期
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TaskStatus {
    /// 等待执行
    Pending,
    /// 正在执行
    Running,
    /// 已完成
    Completed,
    /// 执行失败，包含失败原因
    Failed(String),
}

/// 一次扫描（一个批次）的唯一ID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BatchId(pub Uuid);

impl BatchId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for BatchId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for BatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 任务唯一ID，格式为 `{batch_id}_unit_{index}`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskId(pub String);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// 仿真任务，包含任务ID、工作单元、状态和结果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationTask {
    /// 任务唯一ID
    pub task_id: TaskId,
    /// 所属批次
    pub batch_id: BatchId,
    /// 输入的工作单元
    pub unit: WorkUnit,
    /// 当前任务状态
    pub status: TaskStatus,
    /// 仿真结果，仅在Completed时有值
    pub result: Option<WorkResult>,
    /// 最大尝试次数，由执行端按任务应用
    pub max_attempts: u32,
}

/// 已分发任务的句柄，由分发器持有，交给屏障解析
#[derive(Debug, Clone, PartialEq)]
pub struct TaskHandle {
    pub task_id: TaskId,
    pub unit: WorkUnit,
}

/// 任务终态
#[derive(Debug, Clone)]
pub enum TaskOutcome {
    Succeeded(WorkResult),
    Failed(String),
}

/// worker 在任务到达终态后发出的通知。broker 至少投递一次，可能重复。
#[derive(Debug, Clone)]
pub struct TerminalEvent {
    pub task_id: TaskId,
    pub outcome: TaskOutcome,
}

impl TerminalEvent {
    pub fn succeeded(task_id: TaskId, result: WorkResult) -> Self {
        Self {
            task_id,
            outcome: TaskOutcome::Succeeded(result),
        }
    }

    pub fn failed(task_id: TaskId, message: impl Into<String>) -> Self {
        Self {
            task_id,
            outcome: TaskOutcome::Failed(message.into()),
        }
    }
}
