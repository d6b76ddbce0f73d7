// task_splitter.rs
// 任务拆分器：把参数空间（两个初始角度的笛卡尔积）展开为工作单元，再包装成可分发的仿真任务。
use crate::config::SweepConfig;
use crate::error::{Error, Result};
use crate::task::{BatchId, SimulationTask, TaskId, TaskStatus};
use crate::types::WorkUnit;
use std::f64::consts::PI;
use tracing::debug;

/// 在 [start, stop] 上取 num 个等间距点（包含两端）。num == 1 时只返回 start。
pub fn linspace(start: f64, stop: f64, num: usize) -> Vec<f64> {
    match num {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (stop - start) / (num - 1) as f64;
            (0..num)
                .map(|i| if i == num - 1 { stop } else { start + step * i as f64 })
                .collect()
        }
    }
}

/// 参数空间的惰性序列：外层 theta1，内层 theta2（行优先）。
/// 有限且可重新开始：克隆或重新构造即可从头遍历，本身不持有外部状态。
#[derive(Debug, Clone)]
pub struct ParameterSweep {
    thetas: Vec<f64>,
    t_max: f64,
    dt: f64,
    next: usize,
}

impl ParameterSweep {
    pub fn new(theta_resolution: usize, t_max: f64, dt: f64) -> Result<Self> {
        if theta_resolution == 0 {
            return Err(Error::ConfigError("theta_resolution 必须 >= 1".to_string()));
        }
        if !(t_max.is_finite() && t_max > 0.0) {
            return Err(Error::ConfigError(format!("t_max 必须为正数，当前为 {}", t_max)));
        }
        if !(dt.is_finite() && dt > 0.0) {
            return Err(Error::ConfigError(format!("dt 必须为正数，当前为 {}", dt)));
        }
        Ok(Self {
            thetas: linspace(0.0, 2.0 * PI, theta_resolution),
            t_max,
            dt,
            next: 0,
        })
    }

    pub fn from_config(config: &SweepConfig) -> Result<Self> {
        Self::new(config.theta_resolution, config.t_max, config.dt)
    }

    /// 每个角度轴上的取值
    pub fn theta_values(&self) -> &[f64] {
        &self.thetas
    }

    /// 工作单元总数 = resolution²
    pub fn total(&self) -> usize {
        self.thetas.len() * self.thetas.len()
    }
}

impl Iterator for ParameterSweep {
    type Item = WorkUnit;

    fn next(&mut self) -> Option<WorkUnit> {
        let n = self.thetas.len();
        if self.next >= n * n {
            return None;
        }
        let (i, j) = (self.next / n, self.next % n);
        self.next += 1;
        Some(WorkUnit::with_defaults(self.t_max, self.dt, self.thetas[i], self.thetas[j]))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.total() - self.next;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for ParameterSweep {}

/// 任务拆分器，负责把工作单元包装为带ID的仿真任务
pub struct TaskSplitter {
    /// 每个任务的最大尝试次数
    pub max_attempts: u32,
}

impl TaskSplitter {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn from_config(config: &SweepConfig) -> Self {
        Self::new(config.scheduler.task_max_attempts)
    }

    /// 把工作单元拆分为批次内的仿真任务，任务顺序即提交顺序
    pub fn split_task<I>(&self, batch_id: BatchId, units: I) -> Vec<SimulationTask>
    where
        I: IntoIterator<Item = WorkUnit>,
    {
        let tasks: Vec<SimulationTask> = units
            .into_iter()
            .enumerate()
            .map(|(index, unit)| SimulationTask {
                task_id: self.generate_task_id(batch_id, index),
                batch_id,
                unit,
                status: TaskStatus::Pending,
                result: None,
                max_attempts: self.max_attempts,
            })
            .collect();

        debug!(batch = %batch_id, tasks = tasks.len(), "参数空间拆分完成");
        tasks
    }

    /// 生成任务ID
    fn generate_task_id(&self, batch_id: BatchId, index: usize) -> TaskId {
        TaskId(format!("{}_unit_{}", batch_id, index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_sweep_yields_resolution_squared_units() {
        for n in 1..=7 {
            let sweep = ParameterSweep::new(n, 1.0, 0.1).unwrap();
            assert_eq!(sweep.len(), n * n);
            assert_eq!(sweep.count(), n * n);
        }
    }

    #[test]
    fn test_sweep_axes_are_equal_and_evenly_spaced() {
        let n = 5;
        let units: Vec<WorkUnit> = ParameterSweep::new(n, 1.0, 0.1).unwrap().collect();

        let bits = |v: f64| v.to_bits();
        let theta1: HashSet<u64> = units.iter().map(|u| bits(u.theta1_init)).collect();
        let theta2: HashSet<u64> = units.iter().map(|u| bits(u.theta2_init)).collect();
        let expected: HashSet<u64> = linspace(0.0, 2.0 * PI, n).into_iter().map(bits).collect();
        assert_eq!(theta1, expected);
        assert_eq!(theta2, expected);

        let values = linspace(0.0, 2.0 * PI, n);
        assert_eq!(values[0], 0.0);
        assert_eq!(values[n - 1], 2.0 * PI);
        for w in values.windows(2) {
            assert!((w[1] - w[0] - PI / 2.0).abs() < 1e-12);
        }
    }

    #[test]
    fn test_resolution_one_yields_single_zero() {
        let units: Vec<WorkUnit> = ParameterSweep::new(1, 1.0, 0.1).unwrap().collect();
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].theta1_init, 0.0);
        assert_eq!(units[0].theta2_init, 0.0);
    }

    #[test]
    fn test_resolution_two_is_row_major() {
        let pairs: Vec<(f64, f64)> = ParameterSweep::new(2, 30.0, 0.01)
            .unwrap()
            .map(|u| (u.theta1_init, u.theta2_init))
            .collect();
        let tau = 2.0 * PI;
        assert_eq!(pairs, vec![(0.0, 0.0), (0.0, tau), (tau, 0.0), (tau, tau)]);
    }

    #[test]
    fn test_units_carry_fixed_constants() {
        for unit in ParameterSweep::new(3, 12.5, 0.02).unwrap() {
            assert_eq!(unit.rod_length1, 1.0);
            assert_eq!(unit.rod_length2, 1.0);
            assert_eq!(unit.mass1, 1.0);
            assert_eq!(unit.mass2, 1.0);
            assert_eq!(unit.t_max, 12.5);
            assert_eq!(unit.dt, 0.02);
        }
    }

    #[test]
    fn test_sweep_is_restartable() {
        let sweep = ParameterSweep::new(3, 1.0, 0.1).unwrap();
        let first: Vec<WorkUnit> = sweep.clone().collect();
        let second: Vec<WorkUnit> = sweep.collect();
        assert_eq!(first, second);
    }

    #[test]
    fn test_invalid_sweep_parameters() {
        assert!(ParameterSweep::new(0, 1.0, 0.1).is_err());
        assert!(ParameterSweep::new(2, 0.0, 0.1).is_err());
        assert!(ParameterSweep::new(2, 1.0, f64::NAN).is_err());
    }

    #[test]
    fn test_split_assigns_unique_ids_in_submission_order() {
        let batch_id = BatchId::new();
        let splitter = TaskSplitter::new(3);
        let tasks = splitter.split_task(batch_id, ParameterSweep::new(2, 1.0, 0.1).unwrap());

        assert_eq!(tasks.len(), 4);
        let ids: HashSet<&TaskId> = tasks.iter().map(|t| &t.task_id).collect();
        assert_eq!(ids.len(), 4);
        assert_eq!(tasks[3].task_id.0, format!("{}_unit_3", batch_id));
        assert!(tasks.iter().all(|t| t.status == TaskStatus::Pending && t.max_attempts == 3));
    }
}
