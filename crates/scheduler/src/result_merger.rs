// result_merger.rs
// 结果合并器：把批次内各单元的轨迹归约为一条扁平记录（初始条件 + 每个字段的最后一个采样），并写出CSV。
use crate::error::{Error, Result};
use crate::types::{WorkResult, CSV_HEADER, RESULTS_FILE_NAME};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;

/// 一个工作单元的最终状态记录，字段顺序与CSV表头一致
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResultRecord {
    pub theta1_init: f64,
    pub theta2_init: f64,
    pub theta1: f64,
    pub theta2: f64,
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
}

impl ResultRecord {
    pub fn fields(&self) -> [f64; 8] {
        [
            self.theta1_init,
            self.theta2_init,
            self.theta1,
            self.theta2,
            self.x1,
            self.y1,
            self.x2,
            self.y2,
        ]
    }
}

/// 合并后的记录集。调用方不应假设记录按扫描网格排序。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConsolidatedRecordSet {
    pub records: Vec<ResultRecord>,
}

impl ConsolidatedRecordSet {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// 表头一行，之后每条记录一行
    pub fn to_csv(&self) -> String {
        let mut out = CSV_HEADER.join(",");
        out.push('\n');
        for record in &self.records {
            let row: Vec<String> = record.fields().iter().map(|v| v.to_string()).collect();
            out.push_str(&row.join(","));
            out.push('\n');
        }
        out
    }

    /// 写入 results_dir/results.csv。先写临时文件再重命名，失败时不会留下半个文件。
    pub fn write_csv(&self, results_dir: &Path) -> Result<PathBuf> {
        fs::create_dir_all(results_dir)?;
        let path = results_dir.join(RESULTS_FILE_NAME);
        let tmp_path = results_dir.join(format!(".{}.tmp", RESULTS_FILE_NAME));
        {
            let mut file = fs::File::create(&tmp_path)?;
            file.write_all(self.to_csv().as_bytes())?;
            file.sync_all()?;
        }
        fs::rename(&tmp_path, &path)?;
        info!(path = %path.display(), rows = self.len(), "结果已写入");
        Ok(path)
    }
}

/// 结果合并器
#[derive(Debug, Clone, Default)]
pub struct ResultMerger;

impl ResultMerger {
    // 创建结果合并器
    pub fn new() -> Self {
        Self
    }

    /// 合并所有单元的结果，中间采样被丢弃
    pub fn aggregate(&self, results: &[WorkResult]) -> Result<ConsolidatedRecordSet> {
        let records = results
            .iter()
            .map(|r| self.final_record(r))
            .collect::<Result<Vec<_>>>()?;
        Ok(ConsolidatedRecordSet { records })
    }

    fn final_record(&self, result: &WorkResult) -> Result<ResultRecord> {
        let t = &result.trajectory;
        let last = |name: &str, samples: &[f64]| {
            samples.last().copied().ok_or_else(|| {
                Error::AggregationError(format!(
                    "单元 (theta1={}, theta2={}) 的 {} 轨迹为空",
                    result.theta1_init, result.theta2_init, name
                ))
            })
        };
        Ok(ResultRecord {
            theta1_init: result.theta1_init,
            theta2_init: result.theta2_init,
            theta1: last("theta1", &t.theta1)?,
            theta2: last("theta2", &t.theta2)?,
            x1: last("x1", &t.x1)?,
            y1: last("y1", &t.y1)?,
            x2: last("x2", &t.x2)?,
            y2: last("y2", &t.y2)?,
        })
    }
}
