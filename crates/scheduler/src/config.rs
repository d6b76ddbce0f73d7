// config.rs
// 参数扫描的配置结构体及默认实现：监控端点、状态/结果目录、积分参数、调度器参数。
// 配置在启动时构造一次，以不可变引用或克隆的方式传给各组件。
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const ENV_MONITORING_SERVER_NAME: &str = "MONITORING_SERVER_NAME";
pub const ENV_MONITORING_SERVER_PORT: &str = "MONITORING_SERVER_PORT";
pub const ENV_MONITORING_METRIC_PREFIX: &str = "MONITORING_METRIC_PREFIX";
pub const ENV_STATUS_DIR: &str = "STATUS_DIR";
pub const ENV_RESULTS_DIR: &str = "RESULTS_DIR";
pub const ENV_T_MAX: &str = "T_MAX";
pub const ENV_DT: &str = "DT";
pub const ENV_THETA_RESOLUTION: &str = "THETA_RESOLUTION";

/// 调度器（进程内broker）配置，控制并发worker数、队列容量和单任务重试
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// 最大并发任务数（worker数量）
    pub max_concurrent_tasks: usize,
    /// 任务队列容量
    pub queue_capacity: usize,
    /// 仿真任务所在队列的名称
    pub queue_name: String,
    /// 单个任务的最大尝试次数，1 表示不重试
    pub task_max_attempts: u32,
    /// 重试间隔基数（毫秒），第n次重试等待 n * retry_backoff_ms 加随机抖动
    pub retry_backoff_ms: u64,
    /// 单个任务所有尝试的总超时（毫秒）
    pub task_timeout_ms: u64,
}

impl Default for SchedulerConfig {
    /// 默认配置：4个worker，队列容量1024，不重试
    fn default() -> Self {
        Self {
            max_concurrent_tasks: 4,
            queue_capacity: 1024,
            queue_name: "worker".to_string(),
            task_max_attempts: 1,
            retry_backoff_ms: 100,
            task_timeout_ms: 300_000,
        }
    }
}

/// 参数扫描全局配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SweepConfig {
    pub monitoring_server_name: String,
    pub monitoring_server_port: u16,
    pub monitoring_metric_prefix: String,
    pub status_dir: PathBuf,
    pub results_dir: PathBuf,
    /// 最大仿真时间 (s)
    pub t_max: f64,
    /// 时间步长 (s)
    pub dt: f64,
    /// 每个角度轴上的采样点数
    pub theta_resolution: usize,
    /// 列出队列深度的命令，输出每行 `name messages consumers`
    pub queue_list_command: String,
    /// 需要上报的队列白名单
    pub monitored_queues: Vec<String>,
    /// 已存在 started 标记时拒绝再次播种
    pub guard_reseed: bool,
    pub scheduler: SchedulerConfig,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            monitoring_server_name: "localhost".to_string(),
            monitoring_server_port: 2003,
            monitoring_metric_prefix: "pendulum".to_string(),
            status_dir: PathBuf::from("status"),
            results_dir: PathBuf::from("results"),
            t_max: 30.0,
            dt: 0.01,
            theta_resolution: 6,
            queue_list_command: "rabbitmqctl -q list_queues name messages consumers".to_string(),
            monitored_queues: vec!["server".to_string(), "worker".to_string()],
            guard_reseed: false,
            scheduler: SchedulerConfig::default(),
        }
    }
}

impl SweepConfig {
    /// 从JSON配置文件读取，缺失的字段使用默认值
    pub fn from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::ConfigError(format!("配置文件 {} 不存在", path.display())));
        }
        let contents = fs::read_to_string(path)
            .map_err(|e| Error::ConfigError(format!("读取 {} 失败: {}", path.display(), e)))?;
        let config: SweepConfig = serde_json::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// 在当前配置上应用环境变量覆盖
    pub fn with_env_overrides(self) -> Result<Self> {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// 用任意键值来源覆盖已识别的配置项，便于测试时不依赖进程环境
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup(ENV_MONITORING_SERVER_NAME) {
            self.monitoring_server_name = v;
        }
        if let Some(v) = lookup(ENV_MONITORING_SERVER_PORT) {
            self.monitoring_server_port = parse_value(ENV_MONITORING_SERVER_PORT, &v)?;
        }
        if let Some(v) = lookup(ENV_MONITORING_METRIC_PREFIX) {
            self.monitoring_metric_prefix = v;
        }
        if let Some(v) = lookup(ENV_STATUS_DIR) {
            self.status_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup(ENV_RESULTS_DIR) {
            self.results_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup(ENV_T_MAX) {
            self.t_max = parse_value(ENV_T_MAX, &v)?;
        }
        if let Some(v) = lookup(ENV_DT) {
            self.dt = parse_value(ENV_DT, &v)?;
        }
        if let Some(v) = lookup(ENV_THETA_RESOLUTION) {
            self.theta_resolution = parse_value(ENV_THETA_RESOLUTION, &v)?;
        }
        self.validate()?;
        Ok(self)
    }

    /// 检查配置是否合法
    pub fn validate(&self) -> Result<()> {
        if self.theta_resolution == 0 {
            return Err(Error::ConfigError("THETA_RESOLUTION 必须 >= 1".to_string()));
        }
        if !(self.t_max.is_finite() && self.t_max > 0.0) {
            return Err(Error::ConfigError(format!("T_MAX 必须为正数，当前为 {}", self.t_max)));
        }
        if !(self.dt.is_finite() && self.dt > 0.0) {
            return Err(Error::ConfigError(format!("DT 必须为正数，当前为 {}", self.dt)));
        }
        if self.scheduler.max_concurrent_tasks == 0 {
            return Err(Error::ConfigError("max_concurrent_tasks 必须 >= 1".to_string()));
        }
        if self.scheduler.queue_capacity == 0 {
            return Err(Error::ConfigError("queue_capacity 必须 >= 1".to_string()));
        }
        if self.scheduler.task_max_attempts == 0 {
            return Err(Error::ConfigError("task_max_attempts 必须 >= 1".to_string()));
        }
        Ok(())
    }
}

fn parse_value<T>(key: &str, raw: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse::<T>()
        .map_err(|e| Error::ConfigError(format!("{} 的值 '{}' 无法解析: {}", key, raw, e)))
}
