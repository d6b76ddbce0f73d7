// monitoring.rs
// 队列健康上报：读取broker的队列深度和消费者数，按 `name value timestamp` 行格式推送到监控端点。
// 由外部定时调用，本身不做调度、重试或缓冲。
use crate::config::SweepConfig;
use crate::error::{Error, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::process::Command;
use tracing::{debug, info};

/// 连接监控端点的超时
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// 队列查询接口，返回每行 `name pendingCount consumerCount` 的文本
#[async_trait]
pub trait QueueInspector: Send + Sync {
    async fn list_queues(&self) -> Result<String>;
}

/// 执行外部命令（默认 rabbitmqctl）获取队列列表
pub struct CommandQueueInspector {
    pub command: String,
}

impl CommandQueueInspector {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }
}

#[async_trait]
impl QueueInspector for CommandQueueInspector {
    async fn list_queues(&self) -> Result<String> {
        let output = Command::new("sh")
            .arg("-c")
            .arg(&self.command)
            .output()
            .await
            .map_err(|e| Error::QueueInspectionError(format!("执行 '{}' 失败: {}", self.command, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::QueueInspectionError(format!(
                "'{}' 退出码 {:?}: {}",
                self.command,
                output.status.code(),
                stderr.trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// 单个队列的一次采样
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueSample {
    pub queue_name: String,
    pub pending_count: u64,
    pub consumer_count: u64,
    pub timestamp: i64,
}

/// 解析队列列表，只保留白名单内的队列，所有样本共用同一时间戳
pub fn parse_queue_listing(
    listing: &str,
    allowlist: &[String],
    timestamp: i64,
) -> Result<Vec<QueueSample>> {
    let mut samples = Vec::new();
    for line in listing.lines() {
        let fields: Vec<&str> = line.split_whitespace().collect();
        let Some(&name) = fields.first() else {
            continue;
        };
        if !allowlist.iter().any(|q| q == name) {
            continue;
        }
        if fields.len() != 3 {
            return Err(Error::QueueInspectionError(format!("无法解析队列行: '{}'", line)));
        }
        let parse = |raw: &str| {
            raw.parse::<u64>().map_err(|e| {
                Error::QueueInspectionError(format!("队列 {} 的计数 '{}' 无效: {}", name, raw, e))
            })
        };
        samples.push(QueueSample {
            queue_name: name.to_string(),
            pending_count: parse(fields[1])?,
            consumer_count: parse(fields[2])?,
            timestamp,
        });
    }
    Ok(samples)
}

/// 每个队列生成 tasks 和 consumers 两行指标
pub fn format_metrics(prefix: &str, samples: &[QueueSample]) -> String {
    let mut payload = String::new();
    for sample in samples {
        let base = format!("{}.queue.{}.", prefix, sample.queue_name);
        payload.push_str(&format!("{}tasks {} {}\n", base, sample.pending_count, sample.timestamp));
        payload.push_str(&format!(
            "{}consumers {} {}\n",
            base, sample.consumer_count, sample.timestamp
        ));
    }
    payload
}

/// 监控端点推送器：每次推送建立一个连接，发送一次后关闭
#[derive(Debug, Clone)]
pub struct MetricsPusher {
    pub host: String,
    pub port: u16,
    pub connect_timeout: Duration,
}

impl MetricsPusher {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            connect_timeout: CONNECT_TIMEOUT,
        }
    }

    pub async fn push(&self, payload: &str) -> Result<()> {
        let endpoint = format!("{}:{}", self.host, self.port);
        let connect = TcpStream::connect((self.host.as_str(), self.port));
        let mut stream = tokio::time::timeout(self.connect_timeout, connect)
            .await
            .map_err(|_| Error::MonitoringError(format!("连接 {} 超时", endpoint)))?
            .map_err(|e| Error::MonitoringError(format!("连接 {} 失败: {}", endpoint, e)))?;

        stream
            .write_all(payload.as_bytes())
            .await
            .map_err(|e| Error::MonitoringError(format!("发送到 {} 失败: {}", endpoint, e)))?;
        stream
            .shutdown()
            .await
            .map_err(|e| Error::MonitoringError(format!("关闭与 {} 的连接失败: {}", endpoint, e)))?;
        debug!(endpoint = %endpoint, bytes = payload.len(), "指标已推送");
        Ok(())
    }
}

/// 队列健康上报器
pub struct QueueHealthReporter {
    inspector: Arc<dyn QueueInspector>,
    pusher: MetricsPusher,
    metric_prefix: String,
    queues: Vec<String>,
}

impl QueueHealthReporter {
    pub fn new(
        inspector: Arc<dyn QueueInspector>,
        pusher: MetricsPusher,
        metric_prefix: impl Into<String>,
        queues: Vec<String>,
    ) -> Self {
        Self {
            inspector,
            pusher,
            metric_prefix: metric_prefix.into(),
            queues,
        }
    }

    pub fn from_config(inspector: Arc<dyn QueueInspector>, config: &SweepConfig) -> Self {
        Self::new(
            inspector,
            MetricsPusher::new(
                config.monitoring_server_name.clone(),
                config.monitoring_server_port,
            ),
            config.monitoring_metric_prefix.clone(),
            config.monitored_queues.clone(),
        )
    }

    /// 采样一次并推送，返回本次上报的样本
    pub async fn report_queue_health(&self) -> Result<Vec<QueueSample>> {
        let listing = self.inspector.list_queues().await?;
        let timestamp = Utc::now().timestamp();
        let samples = parse_queue_listing(&listing, &self.queues, timestamp)?;
        let payload = format_metrics(&self.metric_prefix, &samples);
        self.pusher.push(&payload).await?;
        info!(queues = samples.len(), timestamp, "队列健康指标已上报");
        Ok(samples)
    }
}
