use std::collections::HashMap;

use crate::animation::Sentiment;
use crate::config::EmotionConfig;
use crate::face::FaceChannel;
use crate::tracker::lerp::{clamp01, lerp};

use super::merge_max;

/// 感情ごとの表情プリセット
fn preset(sentiment: Sentiment) -> &'static [(FaceChannel, f32)] {
    use FaceChannel::*;
    match sentiment {
        Sentiment::Positive => &[
            (MouthSmileLeft, 1.0),
            (MouthSmileRight, 1.0),
            (CheekSquintLeft, 0.4),
            (CheekSquintRight, 0.4),
        ],
        Sentiment::Negative => &[
            (MouthFrownLeft, 0.8),
            (MouthFrownRight, 0.8),
            (BrowDownLeft, 0.5),
            (BrowDownRight, 0.5),
        ],
        Sentiment::Flirty => &[
            (MouthSmileLeft, 0.7),
            (MouthSmileRight, 0.5),
            (EyeSquintLeft, 0.3),
            (EyeSquintRight, 0.3),
        ],
        Sentiment::Nervous => &[
            (BrowInnerUp, 0.7),
            (MouthStretchLeft, 0.3),
            (MouthStretchRight, 0.3),
        ],
        Sentiment::Confident => &[
            (MouthSmileLeft, 0.4),
            (MouthSmileRight, 0.4),
            (BrowOuterUpLeft, 0.2),
            (BrowOuterUpRight, 0.2),
        ],
        Sentiment::Neutral => &[],
    }
}

/// 手動の感情オーバーライド
///
/// プリセット × 強度 × strength へ rate でゆっくり寄せ、解除後は 0 へ戻す。
pub struct EmotionOverride {
    strength: f32,
    rate: f32,
    target: Option<(Sentiment, f32)>,
    weights: HashMap<FaceChannel, f32>,
}

impl EmotionOverride {
    pub fn from_config(config: &EmotionConfig) -> Self {
        Self {
            strength: config.strength,
            rate: config.rate.clamp(0.0, 1.0),
            target: None,
            weights: HashMap::new(),
        }
    }

    pub fn set(&mut self, sentiment: Sentiment, intensity: f32) {
        self.target = Some((sentiment, clamp01(intensity)));
    }

    pub fn clear(&mut self) {
        self.target = None;
    }

    pub fn current(&self) -> Option<(Sentiment, f32)> {
        self.target
    }

    pub fn weight(&self, channel: FaceChannel) -> f32 {
        self.weights.get(&channel).copied().unwrap_or(0.0)
    }

    pub fn update(&mut self) {
        let mut goal: HashMap<FaceChannel, f32> = HashMap::new();
        if let Some((sentiment, intensity)) = self.target {
            for &(channel, w) in preset(sentiment) {
                goal.insert(channel, clamp01(w * intensity * self.strength));
            }
        }
        for &channel in goal.keys() {
            self.weights.entry(channel).or_insert(0.0);
        }
        let rate = self.rate;
        self.weights.retain(|channel, w| {
            let g = goal.get(channel).copied().unwrap_or(0.0);
            *w = lerp(*w, g, rate);
            g > 0.0 || *w > 1.0e-4
        });
    }

    pub fn contribute(&self, values: &mut HashMap<FaceChannel, f32>) {
        for (&channel, &w) in &self.weights {
            merge_max(values, channel, w);
        }
    }
}
