pub mod animation;
pub mod capture;
pub mod config;
pub mod error;
pub mod expression;
pub mod face;
pub mod pipeline;
pub mod pose;
pub mod scene;
pub mod skeleton;
pub mod tracker;
pub mod vmc;

pub use error::RetargetError;
pub use pipeline::{AvatarPipeline, FrameInput, FrameReport, PerceptionSource};
