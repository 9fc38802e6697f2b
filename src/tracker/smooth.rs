use std::collections::HashMap;

use crate::config::SmoothingConfig;
use crate::face::FaceChannel;

use super::lerp::lerp;

/// チャンネルごとの EMA 平滑化
///
/// smoothed = smoothed + α·(raw − smoothed)
/// 状態はプロセス存続中ずっと保持し、アバター再ロード時のみ reset する。
pub struct ChannelSmoother {
    alpha: f32,
    state: HashMap<FaceChannel, f32>,
}

impl ChannelSmoother {
    pub fn new(alpha: f32) -> Self {
        Self {
            alpha: alpha.clamp(0.0, 1.0),
            state: HashMap::new(),
        }
    }

    pub fn from_config(config: &SmoothingConfig) -> Self {
        Self::new(config.alpha)
    }

    /// 前回値（未観測なら 0）から目標値へ α だけ寄せる
    pub fn apply(&mut self, channel: FaceChannel, value: f32) -> f32 {
        let prev = self.state.get(&channel).copied().unwrap_or(0.0);
        let smoothed = lerp(prev, value, self.alpha);
        self.state.insert(channel, smoothed);
        smoothed
    }

    pub fn get(&self, channel: FaceChannel) -> Option<f32> {
        self.state.get(&channel).copied()
    }

    pub fn alpha(&self) -> f32 {
        self.alpha
    }

    pub fn reset(&mut self) {
        self.state.clear();
    }
}
