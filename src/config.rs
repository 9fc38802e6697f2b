use std::collections::HashMap;
use std::f32::consts::PI;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::warn;

use crate::face::FaceChannel;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub app: AppConfig,
    #[serde(default)]
    pub smoothing: SmoothingConfig,
    #[serde(default)]
    pub channels: ChannelsConfig,
    #[serde(default)]
    pub retarget: RetargetConfig,
    #[serde(default)]
    pub idle: IdleConfig,
    #[serde(default)]
    pub blink: BlinkConfig,
    #[serde(default)]
    pub voice: VoiceConfig,
    #[serde(default)]
    pub emotion: EmotionConfig,
    #[serde(default)]
    pub animation: AnimationConfig,
    #[serde(default)]
    pub vmc: VmcConfig,
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config: Config = toml::from_str(&content).context("Failed to parse config")?;
        Ok(config)
    }

    /// 読み込みに失敗したらデフォルト設定で続行
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        match Self::load(path.as_ref()) {
            Ok(config) => config,
            Err(e) => {
                warn!("config {} not loaded ({:#}), using defaults", path.as_ref().display(), e);
                Self::default()
            }
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_target_fps")]
    pub target_fps: u32,
    /// 再生する知覚キャプチャ (JSON lines)
    #[serde(default = "default_capture_path")]
    pub capture_path: String,
    /// アバター定義 (JSON)。空なら組み込みのヒューマノイド
    #[serde(default)]
    pub avatar_path: Option<String>,
}

fn default_target_fps() -> u32 { 60 }
fn default_capture_path() -> String { "capture.jsonl".to_string() }

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            target_fps: default_target_fps(),
            capture_path: default_capture_path(),
            avatar_path: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SmoothingConfig {
    /// チャンネルごとの EMA 係数 α
    #[serde(default = "default_alpha")]
    pub alpha: f32,
}

fn default_alpha() -> f32 { 0.3 }

impl Default for SmoothingConfig {
    fn default() -> Self {
        Self { alpha: default_alpha() }
    }
}

/// 閾値 + 増幅カーブ
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct CurveConfig {
    pub threshold: f32,
    pub amplification: f32,
}

impl CurveConfig {
    pub const fn new(threshold: f32, amplification: f32) -> Self {
        Self { threshold, amplification }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChannelsConfig {
    #[serde(default = "default_curve")]
    pub default: CurveConfig,
    /// チャンネル名ごとの上書き。組み込みの上書きにキー単位でマージされる
    #[serde(default)]
    pub overrides: HashMap<FaceChannel, CurveConfig>,
}

fn default_curve() -> CurveConfig { CurveConfig::new(0.1, 1.2) }

impl ChannelsConfig {
    /// 組み込みの上書き
    /// まばたきは二値的なので高い閾値、笑顔は検出器が弱めに出すので強めに増幅
    pub fn builtin_overrides() -> HashMap<FaceChannel, CurveConfig> {
        let mut m = HashMap::new();
        m.insert(FaceChannel::EyeBlinkLeft, CurveConfig::new(0.3, 1.5));
        m.insert(FaceChannel::EyeBlinkRight, CurveConfig::new(0.3, 1.5));
        m.insert(FaceChannel::MouthSmileLeft, CurveConfig::new(0.1, 2.0));
        m.insert(FaceChannel::MouthSmileRight, CurveConfig::new(0.1, 2.0));
        m.insert(FaceChannel::BrowInnerUp, CurveConfig::new(0.15, 1.8));
        m
    }

    pub fn curve_for(&self, channel: FaceChannel) -> CurveConfig {
        if let Some(c) = self.overrides.get(&channel) {
            return *c;
        }
        Self::builtin_overrides()
            .get(&channel)
            .copied()
            .unwrap_or(self.default)
    }

    /// 組み込み + 設定ファイルを合成した全チャンネルのカーブ
    pub fn resolved(&self) -> HashMap<FaceChannel, CurveConfig> {
        FaceChannel::ALL.iter().map(|&c| (c, self.curve_for(c))).collect()
    }
}

impl Default for ChannelsConfig {
    fn default() -> Self {
        Self {
            default: default_curve(),
            overrides: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetargetConfig {
    /// 頭/首の回転配分 [pitch, yaw, roll]
    #[serde(default = "default_head_weights")]
    pub head_weights: [f32; 3],
    #[serde(default = "default_neck_weights")]
    pub neck_weights: [f32; 3],
    #[serde(default = "default_head_lerp")]
    pub head_lerp: f32,
    #[serde(default = "default_neck_lerp")]
    pub neck_lerp: f32,
    /// 腕キーポイントの信頼度下限
    #[serde(default = "default_arm_confidence")]
    pub arm_confidence: f32,
    /// 上腕の slerp 係数 (0.1〜0.3)
    #[serde(default = "default_arm_slerp")]
    pub arm_slerp: f32,
    /// 肘曲げの倍率 (0.7〜0.8)
    #[serde(default = "default_elbow_scale")]
    pub elbow_scale: f32,
    /// 肘曲げの上限（ラジアン）
    #[serde(default = "default_elbow_max")]
    pub elbow_max: f32,
    /// 肘・手首に与える合成深度
    #[serde(default = "default_elbow_depth")]
    pub elbow_depth: f32,
    #[serde(default = "default_wrist_depth")]
    pub wrist_depth: f32,
    /// 肩・腰の信頼度下限（背骨の傾き）
    #[serde(default = "default_spine_confidence")]
    pub spine_confidence: f32,
    #[serde(default = "default_shoulder_tilt_gain")]
    pub shoulder_tilt_gain: f32,
    #[serde(default = "default_lean_gain")]
    pub lean_gain: f32,
    /// 肩-腰の基準縦オフセット（画像の縦を [0,1] に正規化、下向き）。キャリブレーションで上書き
    #[serde(default = "default_lean_reference")]
    pub lean_reference: f32,
    /// 背骨オフセットの上限（ラジアン）
    #[serde(default = "default_spine_max")]
    pub spine_max: f32,
    #[serde(default = "default_spine_slerp")]
    pub spine_slerp: f32,
    /// 自撮りカメラ: 左右を入れ替える
    #[serde(default)]
    pub mirror: bool,
}

fn default_head_weights() -> [f32; 3] { [0.7, 0.7, 0.5] }
fn default_neck_weights() -> [f32; 3] { [0.3, 0.3, 0.2] }
fn default_head_lerp() -> f32 { 0.2 }
fn default_neck_lerp() -> f32 { 0.15 }
fn default_arm_confidence() -> f32 { 0.1 }
fn default_arm_slerp() -> f32 { 0.3 }
fn default_elbow_scale() -> f32 { 0.75 }
fn default_elbow_max() -> f32 { 0.8 * PI }
fn default_elbow_depth() -> f32 { 0.1 }
fn default_wrist_depth() -> f32 { 0.2 }
fn default_spine_confidence() -> f32 { 0.2 }
fn default_shoulder_tilt_gain() -> f32 { 0.3 }
fn default_lean_gain() -> f32 { 0.5 }
fn default_lean_reference() -> f32 { -0.25 }
fn default_spine_max() -> f32 { 0.5 }
fn default_spine_slerp() -> f32 { 0.2 }

impl Default for RetargetConfig {
    fn default() -> Self {
        Self {
            head_weights: default_head_weights(),
            neck_weights: default_neck_weights(),
            head_lerp: default_head_lerp(),
            neck_lerp: default_neck_lerp(),
            arm_confidence: default_arm_confidence(),
            arm_slerp: default_arm_slerp(),
            elbow_scale: default_elbow_scale(),
            elbow_max: default_elbow_max(),
            elbow_depth: default_elbow_depth(),
            wrist_depth: default_wrist_depth(),
            spine_confidence: default_spine_confidence(),
            shoulder_tilt_gain: default_shoulder_tilt_gain(),
            lean_gain: default_lean_gain(),
            lean_reference: default_lean_reference(),
            spine_max: default_spine_max(),
            spine_slerp: default_spine_slerp(),
            mirror: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct IdleConfig {
    /// レスト姿勢へ戻す slerp 係数（毎フレーム）
    #[serde(default = "default_idle_rate")]
    pub rate: f32,
    /// 1フレームあたりの最小角速度（ラジアン）
    #[serde(default = "default_idle_min_step")]
    pub min_step: f32,
    /// 欠損した表情チャンネルの減衰係数（毎フレーム）
    #[serde(default = "default_expression_decay")]
    pub expression_decay: f32,
    /// ロード後レスト姿勢を取るまでの待ち時間（秒）
    #[serde(default = "default_rest_capture_delay")]
    pub rest_capture_delay: f32,
}

fn default_idle_rate() -> f32 { 0.05 }
fn default_idle_min_step() -> f32 { 0.02 }
fn default_expression_decay() -> f32 { 0.1 }
fn default_rest_capture_delay() -> f32 { 1.0 }

impl Default for IdleConfig {
    fn default() -> Self {
        Self {
            rate: default_idle_rate(),
            min_step: default_idle_min_step(),
            expression_decay: default_expression_decay(),
            rest_capture_delay: default_rest_capture_delay(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BlinkConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// まばたき間隔（秒）
    #[serde(default = "default_blink_interval")]
    pub interval: f32,
    /// 半正弦パルスの長さ（秒）
    #[serde(default = "default_blink_duration")]
    pub duration: f32,
}

fn default_true() -> bool { true }
fn default_blink_interval() -> f32 { 2.0 }
fn default_blink_duration() -> f32 { 0.065 }

impl Default for BlinkConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval: default_blink_interval(),
            duration: default_blink_duration(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct VoiceConfig {
    #[serde(default = "default_voice_gain")]
    pub gain: f32,
    /// 音量が閾値未満なら口を閉じる
    #[serde(default = "default_voice_floor")]
    pub floor: f32,
    #[serde(default = "default_voice_alpha")]
    pub alpha: f32,
}

fn default_voice_gain() -> f32 { 1.4 }
fn default_voice_floor() -> f32 { 0.05 }
fn default_voice_alpha() -> f32 { 0.5 }

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            gain: default_voice_gain(),
            floor: default_voice_floor(),
            alpha: default_voice_alpha(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmotionConfig {
    /// 感情プリセットの全体倍率
    #[serde(default = "default_emotion_strength")]
    pub strength: f32,
    /// プリセットが目標値に寄る速さ（毎フレーム）
    #[serde(default = "default_emotion_rate")]
    pub rate: f32,
}

fn default_emotion_strength() -> f32 { 0.6 }
fn default_emotion_rate() -> f32 { 0.05 }

impl Default for EmotionConfig {
    fn default() -> Self {
        Self {
            strength: default_emotion_strength(),
            rate: default_emotion_rate(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AnimationConfig {
    /// クリップ JSON の置き場所
    #[serde(default = "default_clip_dir")]
    pub clip_dir: String,
    /// 候補を巡回する時間窓（ミリ秒）
    #[serde(default = "default_cycle_ms")]
    pub cycle_ms: u64,
    /// これより長いクリップはループ再生（秒）
    #[serde(default = "default_loop_threshold")]
    pub loop_threshold: f32,
    #[serde(default = "default_true")]
    pub preload: bool,
}

fn default_clip_dir() -> String { "animations".to_string() }
fn default_cycle_ms() -> u64 { 10_000 }
fn default_loop_threshold() -> f32 { 3.0 }

impl Default for AnimationConfig {
    fn default() -> Self {
        Self {
            clip_dir: default_clip_dir(),
            cycle_ms: default_cycle_ms(),
            loop_threshold: default_loop_threshold(),
            preload: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct VmcConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_vmc_addr")]
    pub addr: String,
}

fn default_vmc_addr() -> String { crate::vmc::VMC_DEFAULT_ADDR.to_string() }

impl Default for VmcConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            addr: default_vmc_addr(),
        }
    }
}
