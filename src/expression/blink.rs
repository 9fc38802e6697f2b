use std::collections::HashMap;
use std::f32::consts::PI;

use crate::config::BlinkConfig;
use crate::face::FaceChannel;

/// 検出器と独立に走るまばたき
///
/// interval 秒ごとに duration 秒の半正弦パルスを出す。
/// 検出器が今フレームに 0 でないまばたき値を出しているときは何もしない。
pub struct BlinkOscillator {
    enabled: bool,
    interval: f32,
    duration: f32,
    elapsed: f32,
    value: f32,
}

impl BlinkOscillator {
    pub fn new(interval: f32, duration: f32) -> Self {
        Self {
            enabled: true,
            interval: interval.max(0.1),
            duration: duration.max(1.0e-3),
            elapsed: 0.0,
            value: 0.0,
        }
    }

    pub fn from_config(config: &BlinkConfig) -> Self {
        Self {
            enabled: config.enabled,
            ..Self::new(config.interval, config.duration)
        }
    }

    /// 時間を進めて今フレームのまばたき量を返す
    pub fn update(&mut self, dt: f32) -> f32 {
        if !self.enabled {
            self.value = 0.0;
            return 0.0;
        }
        self.elapsed += dt.max(0.0);
        if self.elapsed >= self.interval {
            self.elapsed %= self.interval;
        }
        self.value = if self.elapsed < self.duration {
            (PI * self.elapsed / self.duration).sin()
        } else {
            0.0
        };
        self.value
    }

    pub fn value(&self) -> f32 {
        self.value
    }

    /// 今フレームの表情値に合成する。検出器側のまばたきが 0 のときだけ埋める
    pub fn fill(&self, values: &mut HashMap<FaceChannel, f32>) {
        let detected = [FaceChannel::EyeBlinkLeft, FaceChannel::EyeBlinkRight]
            .iter()
            .any(|c| values.get(c).copied().unwrap_or(0.0) > 0.0);
        if detected {
            return;
        }
        values.insert(FaceChannel::EyeBlinkLeft, self.value);
        values.insert(FaceChannel::EyeBlinkRight, self.value);
    }
}

impl Default for BlinkOscillator {
    fn default() -> Self {
        Self::from_config(&BlinkConfig::default())
    }
}
