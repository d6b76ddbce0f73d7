//! queue_health_demo.rs
//!
//! 用进程内broker作为队列来源，向本地临时监听的端口推送一次队列健康指标，
//! 打印监控端实际收到的内容。

use scheduler::config::{SchedulerConfig, SweepConfig};
use scheduler::monitoring::{MetricsPusher, QueueHealthReporter};
use scheduler::pendulum::DoublePendulum;
use scheduler::scheduler::TaskScheduler;
use scheduler::task_executor::TaskExecutor;
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_target(false).compact().init();

    // 模拟监控端点
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let port = listener.local_addr()?.port();
    let collector = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await?;
        let mut received = String::new();
        socket.read_to_string(&mut received).await?;
        Ok::<String, std::io::Error>(received)
    });

    let config = SweepConfig {
        monitoring_server_name: "127.0.0.1".to_string(),
        monitoring_server_port: port,
        scheduler: SchedulerConfig {
            max_concurrent_tasks: 2,
            ..SchedulerConfig::default()
        },
        ..SweepConfig::default()
    };

    let simulator = Arc::new(DoublePendulum::default());
    let executor = TaskExecutor::from_config(simulator, &config.scheduler);
    let scheduler = Arc::new(TaskScheduler::start(config.scheduler.clone(), executor));
    tokio::task::yield_now().await;

    let reporter = QueueHealthReporter::new(
        scheduler.clone(),
        MetricsPusher::new(config.monitoring_server_name.clone(), config.monitoring_server_port),
        config.monitoring_metric_prefix.clone(),
        config.monitored_queues.clone(),
    );
    let samples = reporter.report_queue_health().await?;
    println!("上报了 {} 个队列", samples.len());

    let received = collector.await??;
    println!("监控端收到:\n{}", received);

    scheduler.shutdown().await;
    Ok(())
}
