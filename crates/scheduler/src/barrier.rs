// barrier.rs
// 扇入屏障：等待一个批次的全部任务到达终态后，按提交顺序把结果交给回调，回调只执行一次。
// 任一任务失败则整个批次失败，回调不执行；重复的终态通知视为无操作。
use crate::dispatcher::BatchHandle;
use crate::error::{Error, Result};
use crate::task::{BatchId, TaskHandle, TaskId, TaskOutcome, TerminalEvent};
use crate::types::WorkResult;
use std::collections::HashMap;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// 处理一条终态通知后的屏障进度
#[derive(Debug)]
pub enum Progress {
    /// 仍在等待 outstanding 个任务
    Waiting { outstanding: usize },
    /// 已解析过的任务再次通知，或屏障已释放
    Duplicate,
    /// 不属于本批次的任务
    Unknown,
    /// 全部成功，按提交顺序排列的结果
    Complete(Vec<WorkResult>),
    /// 某个任务失败，批次作废
    Failed(Error),
}

/// 屏障的同步状态机：未完成计数 + 按提交位置存放的结果槽
pub struct BarrierState {
    batch_id: BatchId,
    handles: Vec<TaskHandle>,
    index: HashMap<TaskId, usize>,
    slots: Vec<Option<WorkResult>>,
    outstanding: usize,
    released: bool,
}

impl BarrierState {
    pub fn new(batch_id: BatchId, handles: Vec<TaskHandle>) -> Self {
        let index = handles
            .iter()
            .enumerate()
            .map(|(i, h)| (h.task_id.clone(), i))
            .collect();
        let slots = vec![None; handles.len()];
        let outstanding = handles.len();
        Self {
            batch_id,
            handles,
            index,
            slots,
            outstanding,
            released: false,
        }
    }

    pub fn outstanding(&self) -> usize {
        self.outstanding
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    /// 空批次立即完成
    pub fn take_if_complete(&mut self) -> Option<Vec<WorkResult>> {
        if self.released || self.outstanding > 0 {
            return None;
        }
        self.released = true;
        Some(self.slots.iter_mut().filter_map(Option::take).collect())
    }

    pub fn observe(&mut self, event: TerminalEvent) -> Progress {
        if self.released {
            return Progress::Duplicate;
        }
        let Some(&position) = self.index.get(&event.task_id) else {
            return Progress::Unknown;
        };
        if self.slots[position].is_some() {
            return Progress::Duplicate;
        }

        match event.outcome {
            TaskOutcome::Succeeded(result) => {
                self.slots[position] = Some(result);
                self.outstanding -= 1;
                match self.take_if_complete() {
                    Some(results) => Progress::Complete(results),
                    None => Progress::Waiting {
                        outstanding: self.outstanding,
                    },
                }
            }
            TaskOutcome::Failed(message) => {
                self.released = true;
                let handle = &self.handles[position];
                Progress::Failed(Error::BatchFailure {
                    batch_id: self.batch_id.to_string(),
                    task_id: handle.task_id.to_string(),
                    unit: handle.unit,
                    message,
                })
            }
        }
    }
}

/// 已注册屏障的句柄，可等待回调的返回值
pub struct BarrierHandle<T> {
    pub batch_id: BatchId,
    join: JoinHandle<Result<T>>,
}

impl<T> BarrierHandle<T> {
    pub async fn wait(self) -> Result<T> {
        let batch_id = self.batch_id;
        self.join
            .await
            .map_err(|e| Error::Other(format!("批次 {} 的屏障任务异常退出: {}", batch_id, e)))?
    }
}

pub struct FanInBarrier;

impl FanInBarrier {
    /// 注册屏障后立即返回；回调在后台任务中、最后一个任务完成时执行
    pub fn register<T, F>(batch: BatchHandle, on_complete: F) -> BarrierHandle<T>
    where
        T: Send + 'static,
        F: FnOnce(Vec<WorkResult>) -> Result<T> + Send + 'static,
    {
        let batch_id = batch.batch_id;
        let join = tokio::spawn(Self::run(batch, on_complete));
        BarrierHandle { batch_id, join }
    }

    async fn run<T, F>(batch: BatchHandle, on_complete: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(Vec<WorkResult>) -> Result<T> + Send + 'static,
    {
        let BatchHandle {
            batch_id,
            handles,
            mut events,
        } = batch;
        let mut state = BarrierState::new(batch_id, handles);

        if let Some(results) = state.take_if_complete() {
            return Self::fire(batch_id, on_complete, results).await;
        }

        while let Some(event) = events.recv().await {
            let task_id = event.task_id.clone();
            match state.observe(event) {
                Progress::Waiting { outstanding } => {
                    debug!(batch = %batch_id, task = %task_id, outstanding, "任务完成");
                }
                Progress::Duplicate => {
                    debug!(batch = %batch_id, task = %task_id, "忽略重复的终态通知");
                }
                Progress::Unknown => {
                    warn!(batch = %batch_id, task = %task_id, "收到不属于本批次的通知");
                }
                Progress::Complete(results) => {
                    info!(batch = %batch_id, results = results.len(), "批次全部完成，执行聚合回调");
                    return Self::fire(batch_id, on_complete, results).await;
                }
                Progress::Failed(err) => {
                    warn!(batch = %batch_id, error = %err, "批次失败，跳过聚合");
                    return Err(err);
                }
            }
        }

        Err(Error::BatchIncomplete {
            batch_id: batch_id.to_string(),
            outstanding: state.outstanding(),
        })
    }

    /// 回调会做文件IO，放到阻塞线程池执行
    async fn fire<T, F>(batch_id: BatchId, on_complete: F, results: Vec<WorkResult>) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(Vec<WorkResult>) -> Result<T> + Send + 'static,
    {
        tokio::task::spawn_blocking(move || on_complete(results))
            .await
            .map_err(|e| Error::Other(format!("批次 {} 的聚合回调异常退出: {}", batch_id, e)))?
    }
}
