// main.rs
// 命令行入口：运行参数扫描、查看参数网格、上报队列健康、记录实验状态。
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use prettytable::{row, Table};
use scheduler::config::SweepConfig;
use scheduler::monitoring::{CommandQueueInspector, QueueHealthReporter};
use scheduler::pendulum::DoublePendulum;
use scheduler::scheduler::TaskScheduler;
use scheduler::status::StatusRecorder;
use scheduler::sweep::SweepCoordinator;
use scheduler::task_executor::TaskExecutor;
use scheduler::task_splitter::ParameterSweep;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// 双摆参数扫描的分布式调度工具
#[derive(Parser)]
#[command(name = "pendulum-sweep")]
#[command(version, about, long_about = None)]
struct Cli {
    /// JSON 配置文件，环境变量会覆盖其中的值
    #[arg(short, long, global = true, env = "SWEEP_CONFIG_PATH", value_name = "FILE")]
    config: Option<PathBuf>,

    /// 日志级别 (trace, debug, info, warn, error)
    #[arg(long, global = true, env = "SWEEP_LOG_LEVEL", default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 启动worker，播种一次扫描并等待结果
    Run,
    /// 打印参数网格，不执行仿真
    Plan,
    /// 查询队列深度并推送到监控端点（供外部定时任务调用）
    ReportQueues,
    /// 记录一个实验状态标记
    RecordStatus {
        /// 状态标签，例如 started / finished
        label: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level)?;

    let config = load_config(cli.config.as_ref())?;

    match cli.command {
        Commands::Run => run_sweep(config).await,
        Commands::Plan => print_plan(&config),
        Commands::ReportQueues => report_queues(&config).await,
        Commands::RecordStatus { label } => {
            let path = StatusRecorder::new(config.status_dir.clone())
                .record_status(&label)
                .with_context(|| format!("记录状态 '{}' 失败", label))?;
            println!("{}", path.display());
            Ok(())
        }
    }
}

/// 默认值 -> 配置文件 -> 环境变量
fn load_config(path: Option<&PathBuf>) -> Result<SweepConfig> {
    let base = match path {
        Some(path) => SweepConfig::from_file(path)
            .with_context(|| format!("加载配置 {} 失败", path.display()))?,
        None => SweepConfig::default(),
    };
    base.with_env_overrides().context("环境变量中的配置无效")
}

async fn run_sweep(config: SweepConfig) -> Result<()> {
    let simulator = Arc::new(DoublePendulum::default());
    let executor = TaskExecutor::from_config(simulator, &config.scheduler);
    let scheduler = Arc::new(TaskScheduler::start(config.scheduler.clone(), executor));
    let coordinator = SweepCoordinator::new(config.clone(), scheduler.clone());

    let handle = coordinator.seed().await.context("播种参数扫描失败")?;
    info!(batch = %handle.batch_id, units = handle.unit_count, "扫描已播种，等待结果");
    let result = handle.wait().await;
    scheduler.shutdown().await;
    let outcome = result.context("参数扫描失败")?;

    let mut table = Table::new();
    table.add_row(row!["批次", "记录数", "输出文件"]);
    table.add_row(row![outcome.batch_id, outcome.records, outcome.output_path.display()]);
    table.printstd();
    Ok(())
}

fn print_plan(config: &SweepConfig) -> Result<()> {
    let sweep = ParameterSweep::from_config(config).context("参数空间无效")?;
    let mut table = Table::new();
    table.add_row(row!["#", "theta1_init", "theta2_init", "t_max", "dt"]);
    for (i, unit) in sweep.enumerate() {
        table.add_row(row![
            i,
            format!("{:.6}", unit.theta1_init),
            format!("{:.6}", unit.theta2_init),
            unit.t_max,
            unit.dt
        ]);
    }
    table.printstd();
    Ok(())
}

async fn report_queues(config: &SweepConfig) -> Result<()> {
    let inspector = Arc::new(CommandQueueInspector::new(config.queue_list_command.clone()));
    let reporter = QueueHealthReporter::from_config(inspector, config);
    let samples = reporter.report_queue_health().await.context("队列健康上报失败")?;

    let mut table = Table::new();
    table.add_row(row!["队列", "待处理", "消费者", "时间戳"]);
    for sample in samples {
        table.add_row(row![
            sample.queue_name,
            sample.pending_count,
            sample.consumer_count,
            sample.timestamp
        ]);
    }
    table.printstd();
    Ok(())
}

/// 初始化 tracing 日志
fn init_logging(level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .context("无法创建日志过滤器")?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();

    Ok(())
}
