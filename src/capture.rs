//! 記録済み知覚データ (JSON lines) の再生
//!
//! 1 行 = 1 フレーム。検出器そのものは持たず、記録を `PerceptionSource` として流す。

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::animation::{AnimationContext, Sentiment};
use crate::error::RetargetError;
use crate::face::{BlendshapeCategory, FaceNormalizer, HeadRotation, NamedChannel};
use crate::pipeline::PerceptionSource;
use crate::pose::{Keypoint, PoseFrame};

/// 推定器が返す関節マップ
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoseRecord {
    pub width: f32,
    pub height: f32,
    pub keypoints: HashMap<String, Keypoint>,
}

impl PoseRecord {
    pub fn to_frame(&self) -> PoseFrame {
        PoseFrame::from_named(
            self.width,
            self.height,
            self.keypoints.iter().map(|(name, kp)| (name.as_str(), *kp)),
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmotionRecord {
    pub sentiment: Sentiment,
    pub intensity: f32,
}

fn default_dt() -> f32 {
    1.0 / 60.0
}

/// 記録 1 フレーム
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureFrame {
    #[serde(default = "default_dt")]
    pub dt: f32,
    #[serde(default)]
    pub face: Option<Vec<BlendshapeCategory>>,
    #[serde(default)]
    pub head: Option<HeadRotation>,
    /// 顔変換行列（列優先 4x4）。`head` が無いときはここから頭部回転を取る
    #[serde(default)]
    pub face_transform: Option<[f32; 16]>,
    #[serde(default)]
    pub pose: Option<PoseRecord>,
    #[serde(default)]
    pub voice: Option<f32>,
    #[serde(default)]
    pub context: Option<AnimationContext>,
    /// 強度 0 で解除
    #[serde(default)]
    pub emotion: Option<EmotionRecord>,
    /// このフレームで「今を無表情とする」
    #[serde(default)]
    pub calibrate: bool,
    /// 切断中の検出器 ("face" / "pose")
    #[serde(default)]
    pub unavailable: Vec<String>,
}

impl CaptureFrame {
    fn is_unavailable(&self, source: &str) -> bool {
        self.unavailable.iter().any(|s| s == source)
    }
}

/// 記録の再生器
pub struct CaptureReplay {
    frames: Vec<CaptureFrame>,
    cursor: Option<usize>,
    normalizer: FaceNormalizer,
}

impl CaptureReplay {
    pub fn from_frames(frames: Vec<CaptureFrame>) -> Self {
        Self {
            frames,
            cursor: None,
            normalizer: FaceNormalizer::new(),
        }
    }

    pub fn parse(content: &str) -> Result<Self> {
        let frames = content
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(i, line)| {
                serde_json::from_str::<CaptureFrame>(line)
                    .with_context(|| format!("Failed to parse capture line {}", i + 1))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::from_frames(frames))
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read capture {}", path.display()))?;
        Self::parse(&content)
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// 次のフレームへ進む。終端なら None
    pub fn advance(&mut self) -> Option<&CaptureFrame> {
        let next = self.cursor.map_or(0, |c| c + 1);
        if next >= self.frames.len() {
            return None;
        }
        self.cursor = Some(next);
        self.frames.get(next)
    }

    pub fn current(&self) -> Option<&CaptureFrame> {
        self.cursor.and_then(|c| self.frames.get(c))
    }

    /// 語彙外として捨てたカテゴリ件数
    pub fn dropped_categories(&self) -> u64 {
        self.normalizer.dropped_count()
    }

    fn frame_for(&self, source: &str) -> Result<Option<&CaptureFrame>, RetargetError> {
        match self.current() {
            None => Err(RetargetError::detector_unavailable(source)),
            Some(frame) if frame.is_unavailable(source) => {
                Err(RetargetError::detector_unavailable(source))
            }
            Some(frame) => Ok(Some(frame)),
        }
    }
}

impl PerceptionSource for CaptureReplay {
    fn facial_channels(&mut self) -> Result<Option<Vec<NamedChannel>>, RetargetError> {
        let categories = match self.frame_for("face")? {
            Some(frame) => frame.face.clone(),
            None => None,
        };
        Ok(categories.map(|c| self.normalizer.normalize(&c)))
    }

    fn head_rotation(&mut self) -> Result<Option<HeadRotation>, RetargetError> {
        Ok(self.frame_for("face")?.and_then(|f| {
            f.head
                .or_else(|| f.face_transform.as_ref().and_then(HeadRotation::from_transform))
        }))
    }

    fn pose_keypoints(&mut self) -> Result<Option<PoseFrame>, RetargetError> {
        Ok(self
            .frame_for("pose")?
            .and_then(|f| f.pose.as_ref())
            .map(PoseRecord::to_frame))
    }

    fn voice_intensity(&mut self) -> Option<f32> {
        self.current().and_then(|f| f.voice)
    }

    fn animation_context(&mut self) -> Option<AnimationContext> {
        self.current().and_then(|f| f.context.clone())
    }
}
