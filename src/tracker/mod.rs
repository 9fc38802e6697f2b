pub mod arm;
pub mod base;
pub mod calibrate;
pub mod head;
pub mod idle;
pub mod lerp;
pub mod smooth;
pub mod spine;

pub use arm::{ArmRetargeter, ArmSolution, Side};
pub use base::{BasePose, RegionContext, RegionState};
pub use calibrate::{CalibrationBaseline, ChannelCurve, ExpressionCalibrator};
pub use head::HeadRetargeter;
pub use idle::IdleBlender;
pub use smooth::ChannelSmoother;
pub use spine::{SpineLean, SpineRetargeter};
