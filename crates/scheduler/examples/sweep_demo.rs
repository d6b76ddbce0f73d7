//! sweep_demo.rs
//!
//! 在临时目录中跑一次小规模参数扫描：
//! 1. 启动进程内broker和worker。
//! 2. 播种扫描（立即返回），等待扇入屏障完成。
//! 3. 打印 results.csv 和状态标记。

use prettytable::{row, Table};
use scheduler::config::{SchedulerConfig, SweepConfig};
use scheduler::pendulum::DoublePendulum;
use scheduler::scheduler::TaskScheduler;
use scheduler::status::{STATUS_FINISHED, STATUS_STARTED};
use scheduler::sweep::SweepCoordinator;
use scheduler::task_executor::TaskExecutor;
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_target(false).compact().init();
    println!("=== 双摆参数扫描示例 ===");

    let workdir = tempfile::tempdir()?;
    let config = SweepConfig {
        status_dir: workdir.path().join("status"),
        results_dir: workdir.path().join("results"),
        t_max: 5.0,
        dt: 0.01,
        theta_resolution: 4,
        scheduler: SchedulerConfig {
            max_concurrent_tasks: 4,
            ..SchedulerConfig::default()
        },
        ..SweepConfig::default()
    };
    println!("配置:\n{}", serde_json::to_string_pretty(&config)?);

    let simulator = Arc::new(DoublePendulum::default());
    let executor = TaskExecutor::from_config(simulator, &config.scheduler);
    let scheduler = Arc::new(TaskScheduler::start(config.scheduler.clone(), executor));
    let coordinator = SweepCoordinator::new(config.clone(), scheduler.clone());

    let handle = coordinator.seed().await?;
    println!("已播种 {} 个工作单元，批次 {}", handle.unit_count, handle.batch_id);
    let outcome = handle.wait().await?;
    scheduler.shutdown().await;

    let csv = std::fs::read_to_string(&outcome.output_path)?;
    let mut table = Table::new();
    for (i, line) in csv.lines().enumerate() {
        let cells: Vec<&str> = line.split(',').collect();
        if i == 0 {
            table.add_row(row![cells[0], cells[1], cells[2], cells[3], cells[6], cells[7]]);
            continue;
        }
        let short = |s: &str| {
            s.parse::<f64>()
                .map(|v| format!("{:.4}", v))
                .unwrap_or_else(|_| s.to_string())
        };
        table.add_row(row![
            short(cells[0]),
            short(cells[1]),
            short(cells[2]),
            short(cells[3]),
            short(cells[6]),
            short(cells[7])
        ]);
    }
    table.printstd();

    let recorder = coordinator.recorder();
    println!("started:  {:?}", recorder.read_status(STATUS_STARTED)?);
    println!("finished: {:?}", recorder.read_status(STATUS_FINISHED)?);
    Ok(())
}
