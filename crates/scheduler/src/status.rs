// status.rs
// 实验状态记录：每个标签一个文件，内容为一行本地时间（精确到秒，不带时区），重复调用覆盖。
use crate::error::{Error, Result};
use chrono::Local;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

pub const STATUS_STARTED: &str = "started";
pub const STATUS_FINISHED: &str = "finished";
pub const STATUS_FAILED: &str = "failed";

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// 当前本地时间，ISO 8601 格式，去掉微秒和时区
pub fn status_timestamp() -> String {
    Local::now().format(TIMESTAMP_FORMAT).to_string()
}

#[derive(Debug, Clone)]
pub struct StatusRecorder {
    status_dir: PathBuf,
}

impl StatusRecorder {
    pub fn new(status_dir: impl Into<PathBuf>) -> Self {
        Self {
            status_dir: status_dir.into(),
        }
    }

    pub fn status_dir(&self) -> &Path {
        &self.status_dir
    }

    /// 标签对应的状态文件路径，标签必须是单个非空路径分量
    pub fn status_path(&self, label: &str) -> Result<PathBuf> {
        let valid = !label.is_empty()
            && label != "."
            && label != ".."
            && !label.contains(['/', '\\']);
        if !valid {
            return Err(Error::Other(format!("非法的状态标签: '{}'", label)));
        }
        Ok(self.status_dir.join(label))
    }

    /// 写入当前时间，覆盖该标签之前的内容。
    /// 不加锁，并发写入以最后一次为准。
    pub fn record_status(&self, label: &str) -> Result<PathBuf> {
        let path = self.status_path(label)?;
        fs::create_dir_all(&self.status_dir)?;
        let timestamp = status_timestamp();
        fs::write(&path, format!("{}\n", timestamp))?;
        info!(label, timestamp = %timestamp, "实验状态已记录");
        Ok(path)
    }

    /// 删除标签的记录，未记录时什么也不做
    pub fn clear_status(&self, label: &str) -> Result<()> {
        match fs::remove_file(self.status_path(label)?) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    pub fn is_recorded(&self, label: &str) -> Result<bool> {
        Ok(self.status_path(label)?.exists())
    }

    /// 读取标签记录的时间，未记录时返回 None
    pub fn read_status(&self, label: &str) -> Result<Option<String>> {
        let path = self.status_path(label)?;
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(fs::read_to_string(path)?.trim_end().to_string()))
    }
}
