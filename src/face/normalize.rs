use std::collections::HashSet;

use nalgebra::{Matrix3, Rotation3, UnitQuaternion};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::channel::{FaceChannel, NamedChannel};

/// 検出器が返すブレンドシェイプ 1 件（カテゴリ名とスコア）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlendshapeCategory {
    #[serde(alias = "categoryName")]
    pub category_name: String,
    pub score: f32,
}

impl BlendshapeCategory {
    pub fn new(category_name: &str, score: f32) -> Self {
        Self {
            category_name: category_name.to_string(),
            score,
        }
    }
}

/// 頭部回転（ラジアン）
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct HeadRotation {
    pub pitch: f32,
    pub yaw: f32,
    pub roll: f32,
}

impl HeadRotation {
    pub fn new(pitch: f32, yaw: f32, roll: f32) -> Self {
        Self { pitch, yaw, roll }
    }

    pub fn is_finite(&self) -> bool {
        self.pitch.is_finite() && self.yaw.is_finite() && self.roll.is_finite()
    }

    /// 顔変換行列（列優先 4x4）の回転成分から pitch/yaw/roll を取り出す
    pub fn from_transform(m: &[f32; 16]) -> Option<Self> {
        let basis = Matrix3::new(m[0], m[4], m[8], m[1], m[5], m[9], m[2], m[6], m[10]);
        if !basis.iter().all(|v| v.is_finite()) {
            return None;
        }
        // スケールが乗っていても回転だけを取り出す
        let rotation = Rotation3::from_matrix(&basis);
        let (x, y, z) = UnitQuaternion::from_rotation_matrix(&rotation).euler_angles();
        Some(Self::new(x, y, z))
    }
}

/// ブレンドシェイプ出力を固定語彙の [0,1] チャンネルへ変換する
pub struct FaceNormalizer {
    unknown: HashSet<String>,
    dropped: u64,
}

impl FaceNormalizer {
    pub fn new() -> Self {
        Self {
            unknown: HashSet::new(),
            dropped: 0,
        }
    }

    /// 未知のカテゴリは捨てる（型変換で無理に通さない）
    /// NaN は欠損扱い、範囲外は [0,1] にクランプ
    pub fn normalize(&mut self, categories: &[BlendshapeCategory]) -> Vec<NamedChannel> {
        let mut out = Vec::with_capacity(categories.len());
        for cat in categories {
            let channel = match FaceChannel::from_name(&cat.category_name) {
                Some(c) => c,
                None => {
                    self.dropped += 1;
                    if self.unknown.insert(cat.category_name.clone()) {
                        debug!(category = %cat.category_name, "dropping unknown blendshape category");
                    }
                    continue;
                }
            };
            if !cat.score.is_finite() {
                continue;
            }
            out.push(NamedChannel::new(channel, cat.score.clamp(0.0, 1.0)));
        }
        out
    }

    /// これまでに捨てたカテゴリ件数
    pub fn dropped_count(&self) -> u64 {
        self.dropped
    }
}

impl Default for FaceNormalizer {
    fn default() -> Self {
        Self::new()
    }
}
