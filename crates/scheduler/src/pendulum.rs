// pendulum.rs
// 仿真能力接口，以及默认的双摆RK4积分实现。
use crate::types::{Trajectory, WorkUnit, GRAVITY};
use anyhow::{bail, Result};

/// 外部仿真能力：输入物理参数，输出轨迹。在 worker 的阻塞线程上调用。
pub trait Simulator: Send + Sync {
    fn simulate(&self, unit: &WorkUnit) -> Result<Trajectory>;
}

/// 双摆仿真，初始角速度为0，经典四阶龙格-库塔积分
#[derive(Debug, Clone)]
pub struct DoublePendulum {
    pub gravity: f64,
}

impl Default for DoublePendulum {
    fn default() -> Self {
        Self { gravity: GRAVITY }
    }
}

/// 状态向量 [theta1, omega1, theta2, omega2]
type State = [f64; 4];

impl DoublePendulum {
    fn derivatives(&self, unit: &WorkUnit, y: &State) -> State {
        let (l1, l2) = (unit.rod_length1, unit.rod_length2);
        let (m1, m2, g) = (unit.mass1, unit.mass2, self.gravity);
        let [theta1, z1, theta2, z2] = *y;
        let (s, c) = (theta1 - theta2).sin_cos();
        let denom = m1 + m2 * s * s;

        let z1dot = (m2 * g * theta2.sin() * c
            - m2 * s * (l1 * z1 * z1 * c + l2 * z2 * z2)
            - (m1 + m2) * g * theta1.sin())
            / l1
            / denom;
        let z2dot = ((m1 + m2) * (l1 * z1 * z1 * s - g * theta2.sin() + g * theta1.sin() * c)
            + m2 * l2 * z2 * z2 * s * c)
            / l2
            / denom;

        [z1, z1dot, z2, z2dot]
    }

    fn rk4_step(&self, unit: &WorkUnit, y: &State, h: f64) -> State {
        let shift = |base: &State, k: &State, f: f64| -> State {
            [base[0] + k[0] * f, base[1] + k[1] * f, base[2] + k[2] * f, base[3] + k[3] * f]
        };
        let k1 = self.derivatives(unit, y);
        let k2 = self.derivatives(unit, &shift(y, &k1, h / 2.0));
        let k3 = self.derivatives(unit, &shift(y, &k2, h / 2.0));
        let k4 = self.derivatives(unit, &shift(y, &k3, h));

        let mut next = *y;
        for i in 0..4 {
            next[i] += h / 6.0 * (k1[i] + 2.0 * k2[i] + 2.0 * k3[i] + k4[i]);
        }
        next
    }

    /// 采样点数：t = 0, dt, 2dt, ..., t_max
    pub fn sample_count(unit: &WorkUnit) -> usize {
        (unit.t_max / unit.dt + 1e-9).floor() as usize + 1
    }
}

impl Simulator for DoublePendulum {
    fn simulate(&self, unit: &WorkUnit) -> Result<Trajectory> {
        if !(unit.dt.is_finite() && unit.dt > 0.0 && unit.t_max.is_finite() && unit.t_max >= 0.0) {
            bail!("无效的积分参数 t_max={} dt={}", unit.t_max, unit.dt);
        }
        if unit.rod_length1 <= 0.0 || unit.rod_length2 <= 0.0 {
            bail!("杆长必须为正数");
        }

        let samples = Self::sample_count(unit);
        let mut trajectory = Trajectory::with_capacity(samples);
        let mut y: State = [unit.theta1_init, 0.0, unit.theta2_init, 0.0];

        for step in 0..samples {
            if step > 0 {
                y = self.rk4_step(unit, &y, unit.dt);
            }
            let (theta1, theta2) = (y[0], y[2]);
            if !(theta1.is_finite() && theta2.is_finite()) {
                bail!("积分在第 {} 步发散", step);
            }
            let x1 = unit.rod_length1 * theta1.sin();
            let y1 = -unit.rod_length1 * theta1.cos();
            let x2 = x1 + unit.rod_length2 * theta2.sin();
            let y2 = y1 - unit.rod_length2 * theta2.cos();

            trajectory.theta1.push(theta1);
            trajectory.theta2.push(theta2);
            trajectory.x1.push(x1);
            trajectory.y1.push(y1);
            trajectory.x2.push(x2);
            trajectory.y2.push(y2);
        }

        Ok(trajectory)
    }
}
