//! 端到端测试：参数空间 -> 分发 -> 扇入屏障 -> 聚合 -> results.csv / 状态标记。

use async_trait::async_trait;
use scheduler::config::{SchedulerConfig, SweepConfig};
use scheduler::error::{Error, Result};
use scheduler::pendulum::{DoublePendulum, Simulator};
use scheduler::scheduler::{Submittable, TaskScheduler, TerminalSender};
use scheduler::sweep::SweepCoordinator;
use scheduler::task::{SimulationTask, TaskHandle, TerminalEvent};
use scheduler::task_executor::TaskExecutor;
use scheduler::types::{Trajectory, WorkResult, WorkUnit};
use std::f64::consts::PI;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

fn test_config(root: &Path, resolution: usize) -> SweepConfig {
    SweepConfig {
        status_dir: root.join("status"),
        results_dir: root.join("results"),
        t_max: 0.2,
        dt: 0.01,
        theta_resolution: resolution,
        scheduler: SchedulerConfig {
            max_concurrent_tasks: 3,
            queue_capacity: 64,
            ..SchedulerConfig::default()
        },
        ..SweepConfig::default()
    }
}

fn start_scheduler(config: &SweepConfig, simulator: Arc<dyn Simulator>) -> Arc<TaskScheduler> {
    let executor = TaskExecutor::from_config(simulator, &config.scheduler);
    Arc::new(TaskScheduler::start(config.scheduler.clone(), executor))
}

/// 对 theta1_init == 2π 且 theta2_init == 0 的单元报错
struct FailingCorner;

impl Simulator for FailingCorner {
    fn simulate(&self, unit: &WorkUnit) -> anyhow::Result<Trajectory> {
        if unit.theta1_init == 2.0 * PI && unit.theta2_init == 0.0 {
            anyhow::bail!("integrator diverged");
        }
        DoublePendulum::default().simulate(unit)
    }
}

/// 把任务留在手里，由测试决定何时、以何种顺序发送终态通知
#[derive(Default)]
struct ManualBackend {
    held: Mutex<Vec<(SimulationTask, TerminalSender)>>,
}

#[async_trait]
impl Submittable for ManualBackend {
    async fn submit(&self, task: SimulationTask, notifier: TerminalSender) -> Result<TaskHandle> {
        let handle = TaskHandle {
            task_id: task.task_id.clone(),
            unit: task.unit,
        };
        self.held.lock().unwrap().push((task, notifier));
        Ok(handle)
    }
}

fn fake_result(unit: &WorkUnit) -> WorkResult {
    WorkResult {
        theta1_init: unit.theta1_init,
        theta2_init: unit.theta2_init,
        trajectory: Trajectory {
            theta1: vec![0.0, unit.theta1_init],
            theta2: vec![0.0, unit.theta2_init],
            x1: vec![0.0, 1.0],
            y1: vec![0.0, 2.0],
            x2: vec![0.0, 3.0],
            y2: vec![0.0, 4.0],
        },
    }
}

/// 接受前 limit 个任务，之后拒绝
struct RejectingBackend {
    limit: usize,
    accepted: AtomicUsize,
}

impl RejectingBackend {
    fn after(limit: usize) -> Self {
        Self {
            limit,
            accepted: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl Submittable for RejectingBackend {
    async fn submit(&self, task: SimulationTask, _notifier: TerminalSender) -> Result<TaskHandle> {
        if self.accepted.fetch_add(1, Ordering::SeqCst) >= self.limit {
            return Err(Error::SubmissionRejected("connection refused".to_string()));
        }
        Ok(TaskHandle {
            task_id: task.task_id,
            unit: task.unit,
        })
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn resolution_two_produces_four_rows() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path(), 2);
    let scheduler = start_scheduler(&config, Arc::new(DoublePendulum::default()));
    let coordinator = SweepCoordinator::new(config.clone(), scheduler.clone());

    let handle = coordinator.seed().await.unwrap();
    assert_eq!(handle.unit_count, 4);
    let outcome = handle.wait().await.unwrap();

    assert_eq!(outcome.records, 4);
    assert_eq!(outcome.output_path, config.results_dir.join("results.csv"));
    let csv = fs::read_to_string(&outcome.output_path).unwrap();
    let lines: Vec<&str> = csv.lines().collect();
    assert_eq!(lines.len(), 5);
    assert_eq!(lines[0], "theta1_init,theta2_init,theta1,theta2,x1,y1,x2,y2");

    let mut inits: Vec<(f64, f64)> = lines[1..]
        .iter()
        .map(|l| {
            let f: Vec<f64> = l.split(',').map(|v| v.parse().unwrap()).collect();
            assert_eq!(f.len(), 8);
            (f[0], f[1])
        })
        .collect();
    inits.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let tau = 2.0 * PI;
    assert_eq!(inits, vec![(0.0, 0.0), (0.0, tau), (tau, 0.0), (tau, tau)]);

    assert!(config.status_dir.join("started").exists());
    assert!(config.status_dir.join("finished").exists());
    assert!(!config.status_dir.join("failed").exists());
    scheduler.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn one_failed_unit_fails_the_whole_batch() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path(), 3);
    let scheduler = start_scheduler(&config, Arc::new(FailingCorner));
    let coordinator = SweepCoordinator::new(config.clone(), scheduler.clone());

    let err = coordinator.seed().await.unwrap().wait().await.unwrap_err();
    match err {
        Error::BatchFailure { unit, message, .. } => {
            assert_eq!(unit.theta1_init, 2.0 * PI);
            assert_eq!(unit.theta2_init, 0.0);
            assert!(message.contains("integrator diverged"));
        }
        other => panic!("unexpected error: {}", other),
    }

    assert!(!config.results_dir.join("results.csv").exists());
    assert!(config.status_dir.join("failed").exists());
    assert!(!config.status_dir.join("finished").exists());
    scheduler.shutdown().await;
}

#[tokio::test]
async fn seed_returns_before_completion_and_tolerates_duplicates() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path(), 2);
    let backend = Arc::new(ManualBackend::default());
    let coordinator = SweepCoordinator::new(config.clone(), backend.clone());

    let handle = coordinator.seed().await.unwrap();
    assert!(!handle.is_finished());
    assert!(!config.results_dir.join("results.csv").exists());

    // 逆序完成，并且每个通知投递两次
    let held: Vec<(SimulationTask, TerminalSender)> =
        backend.held.lock().unwrap().drain(..).collect();
    assert_eq!(held.len(), 4);
    for (task, notifier) in held.iter().rev() {
        let event = TerminalEvent::succeeded(task.task_id.clone(), fake_result(&task.unit));
        notifier.send(event.clone()).unwrap();
        let _ = notifier.send(event);
    }

    let outcome = handle.wait().await.unwrap();
    assert_eq!(outcome.records, 4);
    let csv = fs::read_to_string(outcome.output_path).unwrap();
    assert_eq!(csv.lines().count(), 5);
}

#[tokio::test]
async fn dispatch_failure_is_fatal_to_the_trigger() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path(), 2);
    let coordinator = SweepCoordinator::new(config.clone(), Arc::new(RejectingBackend::after(0)));

    let err = coordinator.seed().await.err().unwrap();
    match err {
        Error::DispatchError { submitted, total, .. } => {
            assert_eq!(submitted, 0);
            assert_eq!(total, 4);
        }
        other => panic!("unexpected error: {}", other),
    }
    assert!(!config.results_dir.join("results.csv").exists());
    assert!(config.status_dir.join("started").exists());
    assert!(config.status_dir.join("failed").exists());
    assert!(!coordinator.is_in_flight().unwrap());
}

#[tokio::test]
async fn partial_dispatch_closes_the_sweep_and_allows_reseed() {
    let dir = tempfile::tempdir().unwrap();
    let config = SweepConfig {
        guard_reseed: true,
        ..test_config(dir.path(), 2)
    };

    let broken = SweepCoordinator::new(config.clone(), Arc::new(RejectingBackend::after(2)));
    let err = broken.seed().await.err().unwrap();
    assert!(matches!(err, Error::DispatchError { submitted: 2, total: 4, .. }));
    assert_eq!(err.to_string().matches("已提交").count(), 1);
    assert!(config.status_dir.join("failed").exists());

    // broker 恢复后可以重新播种，上一次的 failed 标记被清除
    let backend = Arc::new(ManualBackend::default());
    let coordinator = SweepCoordinator::new(config.clone(), backend.clone());
    let handle = coordinator.seed().await.unwrap();
    assert_eq!(handle.unit_count, 4);
    assert!(!config.status_dir.join("failed").exists());
    assert!(coordinator.is_in_flight().unwrap());
}

#[tokio::test]
async fn reseed_guard_refuses_second_seed() {
    let dir = tempfile::tempdir().unwrap();
    let config = SweepConfig {
        guard_reseed: true,
        ..test_config(dir.path(), 1)
    };
    let backend = Arc::new(ManualBackend::default());
    let coordinator = SweepCoordinator::new(config, backend.clone());

    coordinator.seed().await.unwrap();
    assert!(coordinator.seed().await.is_err());
    assert_eq!(backend.held.lock().unwrap().len(), 1);
}
