// sweep.rs
// 参数扫描协调器：记录 started，展开参数空间，分发任务，注册扇入屏障。
// 屏障回调负责聚合、写出 results.csv 并记录 finished。
// 分发失败或批次失败时记录 failed，不写输出。
use crate::barrier::{BarrierHandle, FanInBarrier};
use crate::config::SweepConfig;
use crate::dispatcher::WorkDispatcher;
use crate::error::{Error, Result};
use crate::result_merger::ResultMerger;
use crate::scheduler::Submittable;
use crate::status::{StatusRecorder, STATUS_FAILED, STATUS_FINISHED, STATUS_STARTED};
use crate::task::BatchId;
use crate::task_splitter::{ParameterSweep, TaskSplitter};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, info};

/// 一次成功扫描的结果
#[derive(Debug, Clone, PartialEq)]
pub struct SweepOutcome {
    pub batch_id: BatchId,
    pub records: usize,
    pub output_path: PathBuf,
}

/// 已播种扫描的句柄，播种调用返回时聚合尚未发生
pub struct SweepHandle {
    pub batch_id: BatchId,
    pub unit_count: usize,
    completion: JoinHandle<Result<SweepOutcome>>,
}

impl SweepHandle {
    /// 等待批次完成（或失败）
    pub async fn wait(self) -> Result<SweepOutcome> {
        let batch_id = self.batch_id;
        self.completion
            .await
            .map_err(|e| Error::Other(format!("扫描 {} 的完成任务异常退出: {}", batch_id, e)))?
    }

    pub fn is_finished(&self) -> bool {
        self.completion.is_finished()
    }
}

pub struct SweepCoordinator {
    config: SweepConfig,
    dispatcher: WorkDispatcher,
    splitter: TaskSplitter,
    merger: ResultMerger,
    recorder: StatusRecorder,
}

impl SweepCoordinator {
    pub fn new(config: SweepConfig, backend: Arc<dyn Submittable>) -> Self {
        let splitter = TaskSplitter::from_config(&config);
        let recorder = StatusRecorder::new(config.status_dir.clone());
        Self {
            config,
            dispatcher: WorkDispatcher::new(backend),
            splitter,
            merger: ResultMerger::new(),
            recorder,
        }
    }

    pub fn recorder(&self) -> &StatusRecorder {
        &self.recorder
    }

    /// 有 started 标记且还没有 finished / failed 标记
    pub fn is_in_flight(&self) -> Result<bool> {
        Ok(self.recorder.is_recorded(STATUS_STARTED)?
            && !self.recorder.is_recorded(STATUS_FINISHED)?
            && !self.recorder.is_recorded(STATUS_FAILED)?)
    }

    /// 播种一次扫描：分发全部任务并注册屏障后立即返回
    pub async fn seed(&self) -> Result<SweepHandle> {
        if self.config.guard_reseed && self.is_in_flight()? {
            return Err(Error::Other(format!(
                "扫描已经播种过（{} 下存在 {} 标记且尚未结束）",
                self.recorder.status_dir().display(),
                STATUS_STARTED
            )));
        }

        let sweep = ParameterSweep::from_config(&self.config)?;
        // 上一次扫描的终态标记不属于本次扫描
        self.recorder.clear_status(STATUS_FINISHED)?;
        self.recorder.clear_status(STATUS_FAILED)?;
        self.recorder.record_status(STATUS_STARTED)?;

        let batch_id = BatchId::new();
        let tasks = self.splitter.split_task(batch_id, sweep);
        let unit_count = tasks.len();
        info!(batch = %batch_id, units = unit_count, "开始分发参数扫描");

        let batch = match self.dispatcher.dispatch(batch_id, tasks).await {
            Ok(batch) => batch,
            Err(e) => {
                error!(batch = %batch_id, error = %e, "参数扫描分发失败");
                record_failure(&self.recorder);
                return Err(e);
            }
        };

        let merger = self.merger.clone();
        let results_dir = self.config.results_dir.clone();
        let barrier: BarrierHandle<SweepOutcome> = FanInBarrier::register(batch, move |results| {
            let records = merger.aggregate(&results)?;
            let output_path = records.write_csv(&results_dir)?;
            Ok(SweepOutcome {
                batch_id,
                records: records.len(),
                output_path,
            })
        });

        let recorder = self.recorder.clone();
        let completion: JoinHandle<Result<SweepOutcome>> = tokio::spawn(async move {
            match barrier.wait().await {
                Ok(outcome) => {
                    recorder.record_status(STATUS_FINISHED)?;
                    info!(batch = %batch_id, records = outcome.records, "参数扫描完成");
                    Ok(outcome)
                }
                Err(e) => {
                    error!(batch = %batch_id, error = %e, "参数扫描失败");
                    record_failure(&recorder);
                    Err(e)
                }
            }
        });

        Ok(SweepHandle {
            batch_id,
            unit_count,
            completion,
        })
    }
}

fn record_failure(recorder: &StatusRecorder) {
    if let Err(status_err) = recorder.record_status(STATUS_FAILED) {
        error!(error = %status_err, "无法记录失败状态");
    }
}
