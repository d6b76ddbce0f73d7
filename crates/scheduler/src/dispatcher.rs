// dispatcher.rs
// 任务分发器：把一个批次的所有任务提交到执行后端，收集任务句柄。
// 只有全部提交成功才会返回 BatchHandle，部分提交的批次以 DispatchError 返回。
use crate::error::{Error, Result};
use crate::scheduler::Submittable;
use crate::task::{BatchId, SimulationTask, TaskHandle, TerminalEvent};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info};

/// 一次完整分发的结果：按提交顺序排列的句柄，以及该批次的终态通知接收端
pub struct BatchHandle {
    pub batch_id: BatchId,
    pub handles: Vec<TaskHandle>,
    pub(crate) events: mpsc::UnboundedReceiver<TerminalEvent>,
}

impl BatchHandle {
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}

pub struct WorkDispatcher {
    backend: Arc<dyn Submittable>,
}

impl WorkDispatcher {
    pub fn new(backend: Arc<dyn Submittable>) -> Self {
        Self { backend }
    }

    /// 依次提交批次内的任务。通知通道在提交前建立，先完成的任务不会丢失通知。
    pub async fn dispatch(
        &self,
        batch_id: BatchId,
        tasks: Vec<SimulationTask>,
    ) -> Result<BatchHandle> {
        let total = tasks.len();
        let (notifier, events) = mpsc::unbounded_channel();
        let mut handles = Vec::with_capacity(total);

        for task in tasks {
            match self.backend.submit(task, notifier.clone()).await {
                Ok(handle) => handles.push(handle),
                Err(e) => {
                    let submitted = handles.len();
                    error!(batch = %batch_id, submitted, total, error = %e, "批次提交中断");
                    // events 在这里被丢弃，已入队任务的通知不会再被任何屏障等待
                    return Err(Error::DispatchError {
                        submitted,
                        total,
                        reason: rejection_reason(e),
                    });
                }
            }
        }

        info!(batch = %batch_id, tasks = total, "批次已全部提交");
        Ok(BatchHandle {
            batch_id,
            handles,
            events,
        })
    }
}

/// 后端的拒绝原因；后端若自己返回了 DispatchError，只保留其原因，避免出现两层计数
fn rejection_reason(err: Error) -> String {
    match err {
        Error::SubmissionRejected(reason) | Error::DispatchError { reason, .. } => reason,
        other => other.to_string(),
    }
}
