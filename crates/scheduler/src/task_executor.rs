// task_executor.rs
// 任务执行器，负责单个仿真任务的执行、按任务配置的重试以及超时处理。
use crate::config::SchedulerConfig;
use crate::error::{Error, Result};
use crate::pendulum::Simulator;
use crate::task::{SimulationTask, TaskStatus};
use crate::types::WorkResult;
use rand::Rng;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

pub struct TaskExecutor {
    pub simulator: Arc<dyn Simulator>,
    pub timeout_ms: u64,
    pub retry_backoff_ms: u64,
}

impl TaskExecutor {
    pub fn new(simulator: Arc<dyn Simulator>) -> Self {
        let defaults = SchedulerConfig::default();
        Self {
            simulator,
            timeout_ms: defaults.task_timeout_ms,
            retry_backoff_ms: defaults.retry_backoff_ms,
        }
    }

    pub fn from_config(simulator: Arc<dyn Simulator>, config: &SchedulerConfig) -> Self {
        Self {
            simulator,
            timeout_ms: config.task_timeout_ms,
            retry_backoff_ms: config.retry_backoff_ms,
        }
    }

    pub fn set_timeout(&mut self, timeout_ms: u64) {
        self.timeout_ms = timeout_ms;
    }

    pub fn set_retry_backoff(&mut self, retry_backoff_ms: u64) {
        self.retry_backoff_ms = retry_backoff_ms;
    }

    /// 执行任务，最多尝试 task.max_attempts 次。阻塞调用，应在阻塞线程池中运行。
    /// timeout_ms 在两次尝试之间检查；单次运行的上限由调度器的worker负责。
    pub fn execute_task(&self, task: &mut SimulationTask) -> Result<WorkResult> {
        let start_time = Instant::now();
        task.status = TaskStatus::Running;
        let max_attempts = task.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.execute_single_task(task) {
                Ok(result) => {
                    task.status = TaskStatus::Completed;
                    task.result = Some(result.clone());
                    debug!(task = %task.task_id, attempt, "任务完成");
                    return Ok(result);
                }
                Err(e) => {
                    if attempt >= max_attempts {
                        task.status = TaskStatus::Failed(e.to_string());
                        return Err(e);
                    }
                    if start_time.elapsed().as_millis() > self.timeout_ms as u128 {
                        task.status = TaskStatus::Failed("任务超时".to_string());
                        return Err(Error::TaskExecutionFailure {
                            task_id: task.task_id.to_string(),
                            message: format!("任务执行超时 ({} ms)", self.timeout_ms),
                        });
                    }
                    warn!(
                        task = %task.task_id,
                        attempt,
                        max_attempts,
                        error = %e,
                        "任务失败，准备重试"
                    );
                    std::thread::sleep(self.backoff(attempt));
                }
            }
        }
    }

    fn execute_single_task(&self, task: &SimulationTask) -> Result<WorkResult> {
        let trajectory = self
            .simulator
            .simulate(&task.unit)
            .map_err(|e| Error::TaskExecutionFailure {
                task_id: task.task_id.to_string(),
                message: format!("{:#}", e),
            })?;
        Ok(WorkResult {
            theta1_init: task.unit.theta1_init,
            theta2_init: task.unit.theta2_init,
            trajectory,
        })
    }

    /// 第n次失败后的等待：n * backoff 加上最多一个 backoff 的随机抖动
    fn backoff(&self, attempt: u32) -> Duration {
        if self.retry_backoff_ms == 0 {
            return Duration::ZERO;
        }
        let jitter = rand::thread_rng().gen_range(0..=self.retry_backoff_ms);
        Duration::from_millis(self.retry_backoff_ms * attempt as u64 + jitter)
    }
}
