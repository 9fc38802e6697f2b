pub mod keypoint;

pub use keypoint::{Joint, Keypoint, PoseFrame};
