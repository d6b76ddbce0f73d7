// scheduler.rs
// 任务调度器：进程内broker。提交的任务进入有界队列，由固定数量的worker消费，
// 任务到达终态后通过提交时给出的通道发送通知。
use crate::config::SchedulerConfig;
use crate::error::{Error, Result};
use crate::monitoring::QueueInspector;
use crate::task::{SimulationTask, TaskHandle, TerminalEvent};
use crate::task_executor::TaskExecutor;
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// 终态通知的发送端
pub type TerminalSender = mpsc::UnboundedSender<TerminalEvent>;

/// 可提交任务的执行后端：提交 + 终态通知
#[async_trait]
pub trait Submittable: Send + Sync {
    /// 提交一个任务。任务终态（成功或失败）会发送到 notifier，可能不止一次。
    /// 拒绝提交时返回 `Error::SubmissionRejected`，批次计数由分发器负责。
    async fn submit(&self, task: SimulationTask, notifier: TerminalSender) -> Result<TaskHandle>;
}

/// 队列中的一条消息
struct QueuedTask {
    task: SimulationTask,
    notifier: TerminalSender,
}

/// 简单的任务调度器，支持任务队列的提交与并发消费
pub struct TaskScheduler {
    /// 调度器配置
    pub config: SchedulerConfig,
    /// 队列发送端，关闭后为 None
    sender: Mutex<Option<mpsc::Sender<QueuedTask>>>,
    /// 已入队但尚未被worker取走的任务数
    pending: Arc<AtomicUsize>,
    /// 正在消费队列的worker数
    consumers: Arc<AtomicUsize>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl TaskScheduler {
    /// 创建调度器并启动 max_concurrent_tasks 个worker。必须在tokio运行时内调用。
    pub fn start(config: SchedulerConfig, executor: TaskExecutor) -> Self {
        let (tx, rx) = mpsc::channel::<QueuedTask>(config.queue_capacity.max(1));
        let rx = Arc::new(tokio::sync::Mutex::new(rx));
        let executor = Arc::new(executor);
        let pending = Arc::new(AtomicUsize::new(0));
        let consumers = Arc::new(AtomicUsize::new(0));

        let workers = (0..config.max_concurrent_tasks.max(1))
            .map(|worker_id| {
                tokio::spawn(worker_loop(
                    worker_id,
                    rx.clone(),
                    executor.clone(),
                    pending.clone(),
                    consumers.clone(),
                ))
            })
            .collect();

        info!(
            queue = %config.queue_name,
            workers = config.max_concurrent_tasks,
            capacity = config.queue_capacity,
            "调度器已启动"
        );

        Self {
            config,
            sender: Mutex::new(Some(tx)),
            pending,
            consumers,
            workers: Mutex::new(workers),
        }
    }

    /// 当前排队任务数
    pub fn pending_count(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    /// 当前worker数
    pub fn consumer_count(&self) -> usize {
        self.consumers.load(Ordering::SeqCst)
    }

    /// 停止接收新任务，等待已入队的任务执行完毕后worker退出
    pub async fn shutdown(&self) {
        let sender = self.sender.lock().map(|mut s| s.take()).unwrap_or(None);
        drop(sender);
        let workers: Vec<JoinHandle<()>> = match self.workers.lock() {
            Ok(mut w) => w.drain(..).collect(),
            Err(_) => Vec::new(),
        };
        for worker in workers {
            if let Err(e) = worker.await {
                error!(error = %e, "worker 异常退出");
            }
        }
        info!(queue = %self.config.queue_name, "调度器已关闭");
    }

    fn current_sender(&self) -> Option<mpsc::Sender<QueuedTask>> {
        self.sender.lock().ok().and_then(|s| s.clone())
    }
}

#[async_trait]
impl Submittable for TaskScheduler {
    async fn submit(&self, task: SimulationTask, notifier: TerminalSender) -> Result<TaskHandle> {
        let sender = self.current_sender().ok_or_else(|| {
            Error::SubmissionRejected(format!("队列 {} 已关闭，不再接收任务", self.config.queue_name))
        })?;
        let handle = TaskHandle {
            task_id: task.task_id.clone(),
            unit: task.unit,
        };

        self.pending.fetch_add(1, Ordering::SeqCst);
        if sender.send(QueuedTask { task, notifier }).await.is_err() {
            self.pending.fetch_sub(1, Ordering::SeqCst);
            return Err(Error::SubmissionRejected(format!(
                "队列 {} 没有可用的worker",
                self.config.queue_name
            )));
        }
        debug!(task = %handle.task_id, "任务已入队");
        Ok(handle)
    }
}

#[async_trait]
impl QueueInspector for TaskScheduler {
    /// 与 `rabbitmqctl list_queues name messages consumers` 相同的格式
    async fn list_queues(&self) -> Result<String> {
        Ok(format!(
            "{} {} {}\n",
            self.config.queue_name,
            self.pending_count(),
            self.consumer_count()
        ))
    }
}

async fn worker_loop(
    worker_id: usize,
    rx: Arc<tokio::sync::Mutex<mpsc::Receiver<QueuedTask>>>,
    executor: Arc<TaskExecutor>,
    pending: Arc<AtomicUsize>,
    consumers: Arc<AtomicUsize>,
) {
    consumers.fetch_add(1, Ordering::SeqCst);
    loop {
        let next = { rx.lock().await.recv().await };
        let Some(QueuedTask { mut task, notifier }) = next else {
            break;
        };
        pending.fetch_sub(1, Ordering::SeqCst);
        let task_id = task.task_id.clone();
        debug!(worker_id, task = %task_id, "开始执行任务");

        // 超时后阻塞线程无法被打断，它的结果会被丢弃
        let timeout_ms = executor.timeout_ms;
        let runner = executor.clone();
        let blocking = tokio::task::spawn_blocking(move || runner.execute_task(&mut task));
        let event = match tokio::time::timeout(Duration::from_millis(timeout_ms), blocking).await {
            Ok(Ok(Ok(result))) => TerminalEvent::succeeded(task_id, result),
            Ok(Ok(Err(e))) => {
                warn!(worker_id, task = %task_id, error = %e, "任务失败");
                TerminalEvent::failed(task_id, e.to_string())
            }
            Ok(Err(join_err)) => {
                error!(worker_id, task = %task_id, error = %join_err, "仿真线程崩溃");
                TerminalEvent::failed(task_id, format!("仿真线程崩溃: {}", join_err))
            }
            Err(_) => {
                warn!(worker_id, task = %task_id, timeout_ms, "任务超时");
                let err = Error::TaskExecutionFailure {
                    task_id: task_id.to_string(),
                    message: format!("任务执行超时 ({} ms)", timeout_ms),
                };
                TerminalEvent::failed(task_id, err.to_string())
            }
        };

        // 屏障已经放弃该批次时接收端已关闭，通知直接丢弃
        if notifier.send(event).is_err() {
            debug!(worker_id, "批次已不再等待该任务的通知");
        }
    }
    consumers.fetch_sub(1, Ordering::SeqCst);
    debug!(worker_id, "worker 退出");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pendulum::{DoublePendulum, Simulator};
    use crate::task::{BatchId, TaskOutcome, TaskStatus, TaskId};
    use crate::types::{Trajectory, WorkUnit};

    /// 每次仿真都阻塞很久
    struct StalledSimulator;

    impl Simulator for StalledSimulator {
        fn simulate(&self, unit: &WorkUnit) -> anyhow::Result<Trajectory> {
            std::thread::sleep(Duration::from_millis(500));
            DoublePendulum::default().simulate(unit)
        }
    }

    fn make_task(index: usize) -> SimulationTask {
        SimulationTask {
            task_id: TaskId(format!("t_unit_{}", index)),
            batch_id: BatchId::new(),
            unit: WorkUnit::with_defaults(0.1, 0.01, index as f64, 0.0),
            status: TaskStatus::Pending,
            result: None,
            max_attempts: 1,
        }
    }

    fn small_config(workers: usize) -> SchedulerConfig {
        SchedulerConfig {
            max_concurrent_tasks: workers,
            queue_capacity: 16,
            ..SchedulerConfig::default()
        }
    }

    #[tokio::test]
    async fn test_submitted_tasks_reach_terminal_state() {
        let scheduler = TaskScheduler::start(
            small_config(2),
            TaskExecutor::new(Arc::new(DoublePendulum::default())),
        );
        let (tx, mut rx) = mpsc::unbounded_channel();

        for i in 0..5 {
            let handle = scheduler.submit(make_task(i), tx.clone()).await.unwrap();
            assert_eq!(handle.task_id.0, format!("t_unit_{}", i));
        }
        drop(tx);

        let mut seen = 0;
        while let Some(event) = rx.recv().await {
            assert!(matches!(event.outcome, TaskOutcome::Succeeded(_)));
            seen += 1;
        }
        assert_eq!(seen, 5);
        scheduler.shutdown().await;
    }

    #[tokio::test]
    async fn test_submit_after_shutdown_is_rejected() {
        let scheduler = TaskScheduler::start(
            small_config(1),
            TaskExecutor::new(Arc::new(DoublePendulum::default())),
        );
        scheduler.shutdown().await;

        let (tx, _rx) = mpsc::unbounded_channel();
        let err = scheduler.submit(make_task(0), tx).await.unwrap_err();
        assert!(matches!(err, Error::SubmissionRejected(_)));
        assert_eq!(scheduler.consumer_count(), 0);
    }

    #[tokio::test]
    async fn test_slow_simulation_times_out() {
        let mut executor = TaskExecutor::new(Arc::new(StalledSimulator));
        executor.set_timeout(20);
        let scheduler = TaskScheduler::start(small_config(1), executor);
        let (tx, mut rx) = mpsc::unbounded_channel();

        scheduler.submit(make_task(0), tx).await.unwrap();
        let event = tokio::time::timeout(Duration::from_millis(300), rx.recv())
            .await
            .expect("通知应在仿真结束前到达")
            .unwrap();
        match event.outcome {
            TaskOutcome::Failed(message) => assert!(message.contains("超时"), "{}", message),
            other => panic!("unexpected outcome: {:?}", other),
        }
        scheduler.shutdown().await;
    }

    #[tokio::test]
    async fn test_listing_reports_queue_name() {
        let scheduler = TaskScheduler::start(
            small_config(3),
            TaskExecutor::new(Arc::new(DoublePendulum::default())),
        );
        tokio::task::yield_now().await;
        let listing = scheduler.list_queues().await.unwrap();
        let fields: Vec<&str> = listing.split_whitespace().collect();
        assert_eq!(fields[0], "worker");
        assert_eq!(fields[1], "0");
        scheduler.shutdown().await;
    }
}
