use std::f32::consts::TAU;
use std::fs;
use std::path::PathBuf;

use nalgebra::UnitQuaternion;
use serde::{Deserialize, Serialize};

use crate::error::RetargetError;
use crate::skeleton::BoneRole;
use crate::tracker::lerp::{euler_xyz, slerp};

/// ループ待機クリップのキー
pub const IDLE_CLIP: &str = "idle";

/// キーフレーム: 時刻（秒）とレスト相対のオイラー角 (x, y, z)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Keyframe {
    pub time: f32,
    pub rotation: [f32; 3],
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoneTrack {
    pub role: BoneRole,
    pub keyframes: Vec<Keyframe>,
}

impl BoneTrack {
    /// 時刻 t の回転。キーフレーム間は slerp、範囲外は端の値
    pub fn sample(&self, t: f32) -> Option<UnitQuaternion<f32>> {
        let first = self.keyframes.first()?;
        let to_quat = |k: &Keyframe| euler_xyz(k.rotation[0], k.rotation[1], k.rotation[2]);
        if t <= first.time {
            return Some(to_quat(first));
        }
        for pair in self.keyframes.windows(2) {
            let (a, b) = (&pair[0], &pair[1]);
            if t <= b.time {
                let span = b.time - a.time;
                let f = if span > 0.0 { (t - a.time) / span } else { 1.0 };
                return Some(slerp(&to_quat(a), &to_quat(b), f));
            }
        }
        self.keyframes.last().map(to_quat)
    }
}

/// アニメーションクリップ（JSON アセット）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnimationClip {
    pub name: String,
    /// 長さ（秒）
    pub duration: f32,
    #[serde(default)]
    pub blend_in: Option<f32>,
    #[serde(default)]
    pub blend_out: Option<f32>,
    pub tracks: Vec<BoneTrack>,
    /// 手続き生成されたクリップ
    #[serde(skip)]
    pub procedural: bool,
}

/// クリップごとのフェード時間と公称長さ
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClipMeta {
    pub blend_in: f32,
    pub blend_out: f32,
    pub duration: f32,
}

/// 既知クリップのメタデータ。ゆっくりした社交的ジェスチャほどフェードを長くする
pub fn clip_meta(name: &str) -> ClipMeta {
    let (blend_in, blend_out, duration) = match name {
        IDLE_CLIP | "idleBreathing" => (0.5, 0.5, 4.0),
        "genuineLaugh" => (0.3, 0.4, 2.5),
        "flirtyHairFlip" => (0.4, 0.5, 2.0),
        "interestedLean" => (0.6, 0.6, 4.0),
        "thoughtfulLook" => (0.5, 0.5, 3.5),
        "subtleShift" => (0.4, 0.4, 3.0),
        "nervousLaugh" => (0.2, 0.3, 1.8),
        "headShake" | "gentleNod" | "happyNod" | "firmNod" => (0.2, 0.2, 1.2),
        "confidentPosture" => (0.6, 0.6, 5.0),
        "sighShrug" => (0.4, 0.5, 2.2),
        _ => (0.3, 0.3, 2.0),
    };
    ClipMeta {
        blend_in,
        blend_out,
        duration,
    }
}

/// キー名から決まる 0..1 の値（同じキーは常に同じ見た目になる）
fn key_hash(name: &str) -> f32 {
    let mut h: u32 = 0x811c_9dc5;
    for b in name.bytes() {
        h ^= b as u32;
        h = h.wrapping_mul(0x0100_0193);
    }
    (h % 1000) as f32 / 1000.0
}

const PROCEDURAL_STEPS: usize = 16;

fn sine_track(role: BoneRole, axis: usize, amplitude: f32, duration: f32, cycles: f32) -> BoneTrack {
    let keyframes = (0..=PROCEDURAL_STEPS)
        .map(|i| {
            let time = duration * i as f32 / PROCEDURAL_STEPS as f32;
            let mut rotation = [0.0; 3];
            rotation[axis] = amplitude * (TAU * cycles * time / duration).sin();
            Keyframe { time, rotation }
        })
        .collect();
    BoneTrack { role, keyframes }
}

impl AnimationClip {
    pub fn blend_in(&self) -> f32 {
        self.blend_in.unwrap_or_else(|| clip_meta(&self.name).blend_in)
    }

    pub fn blend_out(&self) -> f32 {
        self.blend_out.unwrap_or_else(|| clip_meta(&self.name).blend_out)
    }

    pub fn is_looping(&self, loop_threshold: f32) -> bool {
        self.duration > loop_threshold
    }

    /// 再生できる形か（長さが正、トラックがある、キーフレームが有限）
    pub fn is_playable(&self) -> bool {
        self.duration.is_finite()
            && self.duration > 0.0
            && !self.tracks.is_empty()
            && self.tracks.iter().all(|t| {
                t.keyframes
                    .iter()
                    .all(|k| k.time.is_finite() && k.rotation.iter().all(|v| v.is_finite()))
            })
    }

    pub fn sample(&self, role: BoneRole, t: f32) -> Option<UnitQuaternion<f32>> {
        self.tracks.iter().find(|tr| tr.role == role)?.sample(t)
    }

    pub fn roles(&self) -> impl Iterator<Item = BoneRole> + '_ {
        self.tracks.iter().map(|t| t.role)
    }

    /// アセットが無いときの代用クリップ
    ///
    /// 背骨・首・頭の小さな正弦運動。振幅と周期はキー名から決まる。
    pub fn procedural(name: &str) -> Self {
        let meta = clip_meta(name);
        let h = key_hash(name);
        let amplitude = 0.05 + 0.1 * h;
        let cycles = 1.0 + (h * 3.0).floor();
        Self {
            name: name.to_string(),
            duration: meta.duration,
            blend_in: Some(meta.blend_in),
            blend_out: Some(meta.blend_out),
            tracks: vec![
                sine_track(BoneRole::Spine, 0, amplitude * 0.5, meta.duration, cycles),
                sine_track(BoneRole::Neck, 1, amplitude, meta.duration, cycles),
                sine_track(BoneRole::Head, 2, amplitude * 0.6, meta.duration, cycles),
            ],
            procedural: true,
        }
    }

    /// 4 秒周期の呼吸ループ
    pub fn idle() -> Self {
        let meta = clip_meta(IDLE_CLIP);
        Self {
            name: IDLE_CLIP.to_string(),
            duration: meta.duration,
            blend_in: Some(meta.blend_in),
            blend_out: Some(meta.blend_out),
            tracks: vec![
                sine_track(BoneRole::Spine, 0, 0.02, meta.duration, 1.0),
                sine_track(BoneRole::Spine2, 0, 0.015, meta.duration, 1.0),
                sine_track(BoneRole::Head, 0, -0.01, meta.duration, 1.0),
            ],
            procedural: true,
        }
    }
}

/// クリップの読み込み元。ローダースレッドから呼ばれる
pub trait ClipSource: Send + Sync {
    fn load(&self, name: &str) -> Result<AnimationClip, RetargetError>;
}

/// `<dir>/<name>.json` を読むクリップライブラリ
pub struct JsonClipLibrary {
    dir: PathBuf,
}

impl JsonClipLibrary {
    pub fn new<P: Into<PathBuf>>(dir: P) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}.json", name))
    }
}

impl ClipSource for JsonClipLibrary {
    fn load(&self, name: &str) -> Result<AnimationClip, RetargetError> {
        let path = self.path_for(name);
        let content =
            fs::read_to_string(&path).map_err(|e| RetargetError::clip_load(name, e))?;
        let mut clip: AnimationClip =
            serde_json::from_str(&content).map_err(|e| RetargetError::clip_load(name, e))?;
        if !clip.is_playable() {
            return Err(RetargetError::clip_load(name, "clip has no playable tracks"));
        }
        clip.name = name.to_string();
        Ok(clip)
    }
}
