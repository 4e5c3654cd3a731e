//! 模拟硬件
//!
//! 所有模拟设备都是可克隆的句柄（内部 `Arc`），
//! 一份交给 Worker 持有，另一份留给测试观察输出或注入传感器状态。

use crate::{
    Actuator, Clock, HalError, HeadingSensor, LimitSensor, Side, TelemetrySink, TelemetryValue,
};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tracing::trace;

/// 手动推进的时钟
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    micros: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// 向前推进
    pub fn advance(&self, by: Duration) {
        self.micros
            .fetch_add(by.as_micros() as u64, Ordering::AcqRel);
    }

    /// 推进（秒）
    pub fn advance_secs(&self, secs: f64) {
        self.advance(Duration::from_secs_f64(secs));
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        Duration::from_micros(self.micros.load(Ordering::Acquire))
    }
}

#[derive(Debug, Default)]
struct MotorState {
    output: f64,
    current: f64,
    fault: Option<String>,
    writes: u64,
}

/// 模拟电机
#[derive(Debug, Clone, Default)]
pub struct SimMotor {
    name: Arc<str>,
    state: Arc<Mutex<MotorState>>,
}

impl SimMotor {
    pub fn new(name: &str) -> Self {
        Self {
            name: Arc::from(name),
            state: Arc::new(Mutex::new(MotorState::default())),
        }
    }

    /// 注入输出电流（安培）
    pub fn set_current(&self, amps: f64) {
        self.state.lock().current = amps;
    }

    /// 注入故障：之后的写入都会失败
    pub fn inject_fault(&self, reason: &str) {
        self.state.lock().fault = Some(reason.to_string());
    }

    pub fn clear_fault(&self) {
        self.state.lock().fault = None;
    }

    /// 累计写入次数
    pub fn writes(&self) -> u64 {
        self.state.lock().writes
    }
}

impl Actuator for SimMotor {
    fn set_output(&mut self, value: f64) -> Result<(), HalError> {
        let mut state = self.state.lock();
        if let Some(reason) = &state.fault {
            return Err(HalError::Fault(format!("{}: {}", self.name, reason)));
        }
        if !value.is_finite() {
            return Err(HalError::InvalidOutput(value));
        }
        trace!("{} <- {:.3}", self.name, value);
        state.output = value;
        state.writes += 1;
        Ok(())
    }

    fn output(&self) -> f64 {
        self.state.lock().output
    }

    fn output_current(&self) -> f64 {
        self.state.lock().current
    }
}

/// 模拟传感器组
#[derive(Debug, Clone, Default)]
pub struct SimSensors {
    tripped: Arc<[AtomicBool; 8]>,
}

impl SimSensors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, side: Side, tripped: bool) {
        self.tripped[side.index()].store(tripped, Ordering::Release);
    }

    pub fn trip(&self, side: Side) {
        self.set(side, true);
    }

    pub fn clear(&self, side: Side) {
        self.set(side, false);
    }
}

impl LimitSensor for SimSensors {
    fn is_tripped(&self, side: Side) -> bool {
        self.tripped[side.index()].load(Ordering::Acquire)
    }
}

#[derive(Debug)]
struct GyroState {
    heading: f64,
    last_update: Duration,
}

/// 模拟陀螺仪
///
/// 航向变化率与左右电机输出之和成正比：
/// `d(heading)/dt = rate * (left + right) / 2`。
/// 由于右电机反装，原地转向时两侧同号，直行时两侧异号。
#[derive(Clone)]
pub struct SimGyro {
    state: Arc<Mutex<GyroState>>,
    left: SimMotor,
    right: SimMotor,
    /// 满输出时的转速（度/秒）
    rate: f64,
    clock: Arc<dyn Clock>,
}

impl SimGyro {
    pub fn new(left: SimMotor, right: SimMotor, rate: f64, clock: Arc<dyn Clock>) -> Self {
        let now = clock.now();
        Self {
            state: Arc::new(Mutex::new(GyroState {
                heading: 0.0,
                last_update: now,
            })),
            left,
            right,
            rate,
            clock,
        }
    }

    /// 直接设置航向（模拟外力扰动）
    pub fn set_heading(&self, heading: f64) {
        let mut state = self.state.lock();
        state.last_update = self.clock.now();
        state.heading = heading;
    }

    fn integrate(&self) -> f64 {
        let mut state = self.state.lock();
        let now = self.clock.now();
        let dt = now.saturating_sub(state.last_update).as_secs_f64();
        let drive = (self.left.output() + self.right.output()) / 2.0;
        state.heading += self.rate * drive * dt;
        state.last_update = now;
        state.heading
    }
}

impl HeadingSensor for SimGyro {
    fn heading(&self) -> f64 {
        self.integrate()
    }

    fn zero(&mut self) {
        self.integrate();
        self.state.lock().heading = 0.0;
    }
}

/// 记录所有遥测（测试用）
#[derive(Debug, Default)]
pub struct RecordingTelemetry {
    entries: Mutex<Vec<(String, TelemetryValue)>>,
}

impl RecordingTelemetry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 某个键最近一次发布的值
    pub fn last(&self, key: &str) -> Option<TelemetryValue> {
        self.entries
            .lock()
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl TelemetrySink for RecordingTelemetry {
    fn publish(&self, key: &str, value: TelemetryValue) {
        self.entries.lock().push((key.to_string(), value));
    }
}
