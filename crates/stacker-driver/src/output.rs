//! 执行器输出封装
//!
//! 所有写入都先经过 [`sanitize`]：非有限值归零，其余限幅到 `[-1, 1]`。
//! 写入失败只记录告警，不向上传播（控制路径上失败即停）。

use stacker_hal::Actuator;
use tracing::warn;

/// 归一化输出：NaN/无穷大 → 0，其余限幅到 `[-1, 1]`
pub fn sanitize(value: f64) -> f64 {
    if value.is_finite() {
        value.clamp(-1.0, 1.0)
    } else {
        0.0
    }
}

/// 对称限幅 `[-limit, limit]`
pub fn ablimit(value: f64, limit: f64) -> f64 {
    let limit = limit.abs();
    value.clamp(-limit, limit)
}

/// 命名电机
pub struct Motor {
    name: &'static str,
    actuator: Box<dyn Actuator>,
}

impl Motor {
    pub fn new(name: &'static str, actuator: Box<dyn Actuator>) -> Self {
        Self { name, actuator }
    }

    /// 设置输出（先归一化）
    pub fn set(&mut self, value: f64) {
        let value = sanitize(value);
        if let Err(e) = self.actuator.set_output(value) {
            warn!("{}: failed to set output {:.3}: {}", self.name, value, e);
        }
    }

    pub fn stop(&mut self) {
        self.set(0.0);
    }

    pub fn output(&self) -> f64 {
        self.actuator.output()
    }

    /// 输出电流（安培）
    pub fn current(&self) -> f64 {
        self.actuator.output_current()
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl std::fmt::Debug for Motor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Motor")
            .field("name", &self.name)
            .field("output", &self.output())
            .finish()
    }
}
