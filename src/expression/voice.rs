use std::collections::HashMap;

use crate::config::VoiceConfig;
use crate::face::FaceChannel;
use crate::tracker::lerp::{clamp01, lerp};

use super::merge_max;

/// mouthFunnel は jawOpen のこの割合だけ開く
const FUNNEL_RATIO: f32 = 0.3;

/// 音声の強さで口を動かす
pub struct VoiceMouth {
    gain: f32,
    floor: f32,
    alpha: f32,
    level: f32,
}

impl VoiceMouth {
    pub fn from_config(config: &VoiceConfig) -> Self {
        Self {
            gain: config.gain,
            floor: config.floor,
            alpha: config.alpha.clamp(0.0, 1.0),
            level: 0.0,
        }
    }

    /// 音量 [0,1]（無音・未接続は None）から口の開きを更新
    pub fn update(&mut self, intensity: Option<f32>) -> f32 {
        let target = match intensity {
            Some(v) if v.is_finite() && v >= self.floor => clamp01(v * self.gain),
            _ => 0.0,
        };
        self.level = lerp(self.level, target, self.alpha);
        self.level
    }

    pub fn level(&self) -> f32 {
        self.level
    }

    pub fn contribute(&self, values: &mut HashMap<FaceChannel, f32>) {
        if self.level <= 0.0 {
            return;
        }
        merge_max(values, FaceChannel::JawOpen, self.level);
        merge_max(values, FaceChannel::MouthFunnel, self.level * FUNNEL_RATIO);
    }
}
