use std::collections::HashMap;

use crate::config::{ChannelsConfig, CurveConfig, SmoothingConfig};
use crate::face::{FaceChannel, NamedChannel};

use super::lerp::clamp01;
use super::smooth::ChannelSmoother;

/// 「無表情」の基準値スナップショット
///
/// セッション開始時は空。calibrate のたびに丸ごと置き換え、部分更新はしない。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CalibrationBaseline {
    values: HashMap<FaceChannel, f32>,
}

impl CalibrationBaseline {
    pub fn get(&self, channel: FaceChannel) -> f32 {
        self.values.get(&channel).copied().unwrap_or(0.0)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }
}

/// 閾値 + 増幅
/// output = clamp01(max(0, v − threshold) × amplification)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChannelCurve {
    pub threshold: f32,
    pub amplification: f32,
}

impl ChannelCurve {
    pub fn apply(&self, value: f32) -> f32 {
        clamp01((value - self.threshold).max(0.0) * self.amplification)
    }
}

impl From<CurveConfig> for ChannelCurve {
    fn from(c: CurveConfig) -> Self {
        Self {
            threshold: c.threshold,
            amplification: c.amplification,
        }
    }
}

/// キャリブレーション & 平滑化ステージ
///
/// 1. 基準値を引いて個人差を除く
/// 2. EMA でフレーム間のジッタを除く
/// 3. 閾値 + 増幅で検出器の控えめな出力を表情の幅に戻す
pub struct ExpressionCalibrator {
    baseline: CalibrationBaseline,
    latest_raw: HashMap<FaceChannel, f32>,
    smoother: ChannelSmoother,
    curves: HashMap<FaceChannel, ChannelCurve>,
    default_curve: ChannelCurve,
}

impl ExpressionCalibrator {
    pub fn new(smoothing: &SmoothingConfig, channels: &ChannelsConfig) -> Self {
        let curves = channels
            .resolved()
            .into_iter()
            .map(|(c, curve)| (c, ChannelCurve::from(curve)))
            .collect();
        Self {
            baseline: CalibrationBaseline::default(),
            latest_raw: HashMap::new(),
            smoother: ChannelSmoother::from_config(smoothing),
            curves,
            default_curve: channels.default.into(),
        }
    }

    /// 直近の生値スナップショットを基準値として丸ごと保存する
    pub fn calibrate(&mut self) {
        self.baseline = CalibrationBaseline {
            values: self.latest_raw.clone(),
        };
    }

    pub fn baseline(&self) -> &CalibrationBaseline {
        &self.baseline
    }

    /// 基準値を差し引いた値
    pub fn calibrated(&self, channel: FaceChannel, raw: f32) -> f32 {
        clamp01(raw - self.baseline.get(channel))
    }

    pub fn curve(&self, channel: FaceChannel) -> ChannelCurve {
        self.curves.get(&channel).copied().unwrap_or(self.default_curve)
    }

    /// 1チャンネル分の処理。生値スナップショットは更新しない
    pub fn update(&mut self, raw: NamedChannel) -> NamedChannel {
        let value = clamp01(raw.value);
        let calibrated = self.calibrated(raw.channel, value);
        let smoothed = self.smoother.apply(raw.channel, calibrated);
        NamedChannel::new(raw.channel, self.curve(raw.channel).apply(smoothed))
    }

    /// 1フレーム分の処理。生値スナップショットをこのフレームの値で置き換える
    pub fn update_all(&mut self, raw: &[NamedChannel]) -> Vec<NamedChannel> {
        self.latest_raw = raw.iter().map(|c| (c.channel, clamp01(c.value))).collect();
        raw.iter().map(|&c| self.update(c)).collect()
    }

    /// アバター再ロード時
    pub fn reset(&mut self) {
        self.baseline = CalibrationBaseline::default();
        self.latest_raw.clear();
        self.smoother.reset();
    }
}
