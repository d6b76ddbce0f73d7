// types.rs
// 定义通用类型：工作单元、仿真轨迹、单元结果，以及物理常量、CSV表头等常量。
use serde::{Deserialize, Serialize};

// 常量定义，避免硬编码
pub const ROD_LENGTH: f64 = 1.0; // m
pub const BOB_MASS: f64 = 1.0; // kg
pub const GRAVITY: f64 = 9.81; // m/s^2
pub const RESULTS_FILE_NAME: &str = "results.csv";
pub const CSV_HEADER: [&str; 8] = [
    "theta1_init",
    "theta2_init",
    "theta1",
    "theta2",
    "x1",
    "y1",
    "x2",
    "y2",
];

/// 一次独立仿真的输入：初始条件 + 物理/积分参数，创建后不可变
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WorkUnit {
    pub rod_length1: f64,
    pub rod_length2: f64,
    pub mass1: f64,
    pub mass2: f64,
    pub t_max: f64,
    pub dt: f64,
    pub theta1_init: f64,
    pub theta2_init: f64,
}

impl WorkUnit {
    /// 使用默认杆长和质量构造工作单元
    pub fn with_defaults(t_max: f64, dt: f64, theta1_init: f64, theta2_init: f64) -> Self {
        Self {
            rod_length1: ROD_LENGTH,
            rod_length2: ROD_LENGTH,
            mass1: BOB_MASS,
            mass2: BOB_MASS,
            t_max,
            dt,
            theta1_init,
            theta2_init,
        }
    }
}

/// 仿真轨迹，每个字段是按时间顺序排列的采样序列
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Trajectory {
    pub theta1: Vec<f64>,
    pub theta2: Vec<f64>,
    pub x1: Vec<f64>,
    pub y1: Vec<f64>,
    pub x2: Vec<f64>,
    pub y2: Vec<f64>,
}

impl Trajectory {
    pub fn with_capacity(samples: usize) -> Self {
        Self {
            theta1: Vec::with_capacity(samples),
            theta2: Vec::with_capacity(samples),
            x1: Vec::with_capacity(samples),
            y1: Vec::with_capacity(samples),
            x2: Vec::with_capacity(samples),
            y2: Vec::with_capacity(samples),
        }
    }

    /// 采样点数量（以theta1为准）
    pub fn len(&self) -> usize {
        self.theta1.len()
    }

    pub fn is_empty(&self) -> bool {
        self.theta1.is_empty()
    }
}

/// 单个工作单元的仿真结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkResult {
    pub theta1_init: f64,
    pub theta2_init: f64,
    pub trajectory: Trajectory,
}
