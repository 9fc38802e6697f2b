use std::collections::HashMap;
use std::fmt;

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::error::RetargetError;

/// 姿勢推定器が出力する 17 関節
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Joint {
    Nose,
    LeftEye,
    RightEye,
    LeftEar,
    RightEar,
    LeftShoulder,
    RightShoulder,
    LeftElbow,
    RightElbow,
    LeftWrist,
    RightWrist,
    LeftHip,
    RightHip,
    LeftKnee,
    RightKnee,
    LeftAnkle,
    RightAnkle,
}

impl Joint {
    pub const COUNT: usize = 17;

    pub const ALL: [Joint; Joint::COUNT] = [
        Joint::Nose,
        Joint::LeftEye,
        Joint::RightEye,
        Joint::LeftEar,
        Joint::RightEar,
        Joint::LeftShoulder,
        Joint::RightShoulder,
        Joint::LeftElbow,
        Joint::RightElbow,
        Joint::LeftWrist,
        Joint::RightWrist,
        Joint::LeftHip,
        Joint::RightHip,
        Joint::LeftKnee,
        Joint::RightKnee,
        Joint::LeftAnkle,
        Joint::RightAnkle,
    ];

    /// 推定器側の関節名 (camelCase)
    pub fn name(self) -> &'static str {
        match self {
            Joint::Nose => "nose",
            Joint::LeftEye => "leftEye",
            Joint::RightEye => "rightEye",
            Joint::LeftEar => "leftEar",
            Joint::RightEar => "rightEar",
            Joint::LeftShoulder => "leftShoulder",
            Joint::RightShoulder => "rightShoulder",
            Joint::LeftElbow => "leftElbow",
            Joint::RightElbow => "rightElbow",
            Joint::LeftWrist => "leftWrist",
            Joint::RightWrist => "rightWrist",
            Joint::LeftHip => "leftHip",
            Joint::RightHip => "rightHip",
            Joint::LeftKnee => "leftKnee",
            Joint::RightKnee => "rightKnee",
            Joint::LeftAnkle => "leftAnkle",
            Joint::RightAnkle => "rightAnkle",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|j| j.name() == name)
    }

    /// 左右反転した関節（自撮りカメラ用）
    pub fn mirrored(self) -> Self {
        match self {
            Joint::LeftEye => Joint::RightEye,
            Joint::RightEye => Joint::LeftEye,
            Joint::LeftEar => Joint::RightEar,
            Joint::RightEar => Joint::LeftEar,
            Joint::LeftShoulder => Joint::RightShoulder,
            Joint::RightShoulder => Joint::LeftShoulder,
            Joint::LeftElbow => Joint::RightElbow,
            Joint::RightElbow => Joint::LeftElbow,
            Joint::LeftWrist => Joint::RightWrist,
            Joint::RightWrist => Joint::LeftWrist,
            Joint::LeftHip => Joint::RightHip,
            Joint::RightHip => Joint::LeftHip,
            Joint::LeftKnee => Joint::RightKnee,
            Joint::RightKnee => Joint::LeftKnee,
            Joint::LeftAnkle => Joint::RightAnkle,
            Joint::RightAnkle => Joint::LeftAnkle,
            Joint::Nose => Joint::Nose,
        }
    }
}

impl fmt::Display for Joint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// 単一キーポイント（画像ピクセル座標）
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Keypoint {
    pub x: f32,
    pub y: f32,
    /// 信頼度スコア (0.0〜1.0)
    #[serde(alias = "score")]
    pub confidence: f32,
}

impl Keypoint {
    pub fn new(x: f32, y: f32, confidence: f32) -> Self {
        Self { x, y, confidence }
    }

    /// 信頼度が閾値以上か
    pub fn is_valid(&self, threshold: f32) -> bool {
        self.confidence.is_finite() && self.x.is_finite() && self.y.is_finite()
            && self.confidence >= threshold
    }
}

impl Default for Keypoint {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            confidence: 0.0,
        }
    }
}

/// 1フレーム分のキーポイント集合
///
/// 座標はソース画像のピクセル空間のまま保持し、
/// 必要な時点で [-1,1] の正規化平面に変換する。
#[derive(Debug, Clone, PartialEq)]
pub struct PoseFrame {
    pub width: f32,
    pub height: f32,
    keypoints: HashMap<Joint, Keypoint>,
}

impl PoseFrame {
    pub fn new(width: f32, height: f32) -> Self {
        Self {
            width,
            height,
            keypoints: HashMap::new(),
        }
    }

    /// 推定器の `jointName → Keypoint` マップから構築
    /// 未知の関節名は捨てる
    pub fn from_named<'a, I>(width: f32, height: f32, named: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, Keypoint)>,
    {
        let mut frame = Self::new(width, height);
        for (name, kp) in named {
            if let Some(joint) = Joint::from_name(name) {
                frame.keypoints.insert(joint, kp);
            }
        }
        frame
    }

    pub fn with(mut self, joint: Joint, kp: Keypoint) -> Self {
        self.keypoints.insert(joint, kp);
        self
    }

    pub fn insert(&mut self, joint: Joint, kp: Keypoint) {
        self.keypoints.insert(joint, kp);
    }

    pub fn get(&self, joint: Joint) -> Option<&Keypoint> {
        self.keypoints.get(&joint)
    }

    /// 閾値以上の関節を返す。無い・低信頼度は「欠損」として扱う
    pub fn require(&self, joint: Joint, min_confidence: f32) -> Result<&Keypoint, RetargetError> {
        match self.keypoints.get(&joint) {
            Some(kp) if kp.is_valid(min_confidence) => Ok(kp),
            _ => Err(RetargetError::InsufficientConfidence { joint }),
        }
    }

    /// ピクセル座標 → 正規化平面 [-1,1]×[-1,1]（y は上向き）
    pub fn to_plane(&self, kp: &Keypoint, depth: f32) -> Vector3<f32> {
        let w = self.width.max(1.0);
        let h = self.height.max(1.0);
        Vector3::new(kp.x / w * 2.0 - 1.0, 1.0 - kp.y / h * 2.0, depth)
    }

    /// 左右を入れ替えたフレーム（自撮りカメラの鏡像補正）
    pub fn mirrored(&self) -> Self {
        let keypoints = self
            .keypoints
            .iter()
            .map(|(joint, kp)| {
                let x = self.width - kp.x;
                (joint.mirrored(), Keypoint::new(x, kp.y, kp.confidence))
            })
            .collect();
        Self {
            width: self.width,
            height: self.height,
            keypoints,
        }
    }

    /// 全関節の平均信頼度（欠損は 0 として数える）
    pub fn average_confidence(&self) -> f32 {
        let sum: f32 = self.keypoints.values().map(|k| k.confidence).sum();
        sum / Joint::COUNT as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_joint_name_roundtrip_known() {
        assert_eq!(Joint::from_name("leftShoulder"), Some(Joint::LeftShoulder));
        assert_eq!(Joint::from_name("rightAnkle"), Some(Joint::RightAnkle));
        assert_eq!(Joint::from_name("left_shoulder"), None);
    }

    #[test]
    fn test_keypoint_is_valid() {
        let kp = Keypoint::new(10.0, 10.0, 0.7);
        assert!(kp.is_valid(0.5));
        assert!(!kp.is_valid(0.8));
        assert!(!Keypoint::new(f32::NAN, 0.0, 0.9).is_valid(0.1));
    }

    #[test]
    fn test_require_reports_absent_not_zero() {
        let frame = PoseFrame::new(640.0, 480.0)
            .with(Joint::LeftElbow, Keypoint::new(100.0, 100.0, 0.05));
        assert_eq!(
            frame.require(Joint::LeftElbow, 0.1),
            Err(RetargetError::InsufficientConfidence {
                joint: Joint::LeftElbow
            })
        );
        assert!(frame.require(Joint::LeftWrist, 0.1).is_err());
        assert!(frame.require(Joint::LeftElbow, 0.05).is_ok());
    }

    #[test]
    fn test_to_plane_corners() {
        let frame = PoseFrame::new(200.0, 100.0);
        let top_left = frame.to_plane(&Keypoint::new(0.0, 0.0, 1.0), 0.0);
        assert!((top_left.x + 1.0).abs() < 1e-6);
        assert!((top_left.y - 1.0).abs() < 1e-6);
        let bottom_right = frame.to_plane(&Keypoint::new(200.0, 100.0, 1.0), 0.2);
        assert!((bottom_right.x - 1.0).abs() < 1e-6);
        assert!((bottom_right.y + 1.0).abs() < 1e-6);
        assert!((bottom_right.z - 0.2).abs() < 1e-6);
    }

    #[test]
    fn test_from_named_drops_unknown() {
        let frame = PoseFrame::from_named(
            640.0,
            480.0,
            vec![
                ("leftWrist", Keypoint::new(1.0, 2.0, 0.9)),
                ("tail", Keypoint::new(1.0, 2.0, 0.9)),
            ],
        );
        assert!(frame.get(Joint::LeftWrist).is_some());
        assert!((frame.average_confidence() - 0.9 / 17.0).abs() < 1e-6);
    }

    #[test]
    fn test_mirrored_swaps_sides() {
        let frame = PoseFrame::new(100.0, 100.0)
            .with(Joint::LeftShoulder, Keypoint::new(30.0, 40.0, 0.9));
        let m = frame.mirrored();
        assert!(m.get(Joint::LeftShoulder).is_none());
        let kp = m.get(Joint::RightShoulder).unwrap();
        assert!((kp.x - 70.0).abs() < 1e-6);
        assert!((kp.y - 40.0).abs() < 1e-6);
    }
}
