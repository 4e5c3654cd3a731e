//! 子系统控制器
//!
//! 每个模块实现一个 [`Controller`](crate::worker::Controller)，
//! 独占自己的执行器与传感器，只在所属 Worker 线程上运行。

pub mod canarm;
pub mod claw;
pub mod conveyor;
pub mod cube;
pub mod drivetrain;
pub mod fan;
pub mod lifter;

pub use canarm::{ArmMotion, CanArm, CanArmStatus};
pub use claw::{Claw, ClawStatus};
pub use conveyor::{Conveyor, ConveyorHardware, ConveyorOperation, ConveyorStatus};
pub use cube::{ClickerState, Cube, CubeHardware, CubeStatus};
pub use drivetrain::{Drivetrain, DrivetrainHardware, DrivetrainStatus, ManeuverKind};
pub use fan::{Fan, FanStatus};
pub use lifter::{Lifter, LifterHardware, LifterOperation, LifterStatus};
