//! 会話・感情の文脈に応じたボディアニメーション
//!
//! フレーム毎のリターゲットより遅い、イベント駆動の周期で動く。
//! 出力はレスト相対の回転層で、追従していない領域の待機目標に重なる。

pub mod cache;
pub mod clip;
pub mod context;
pub mod controller;
pub mod mixer;

pub use cache::{ClipCache, ClipLoader, LoadPurpose};
pub use clip::{AnimationClip, ClipSource, JsonClipLibrary};
pub use context::{select_animation, AnimationContext, IntensityBucket, Sentiment};
pub use controller::AnimationController;
pub use mixer::{AnimationLayer, AnimationMixer, ClipMixer};
