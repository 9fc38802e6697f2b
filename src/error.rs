use thiserror::Error;

use crate::pose::Joint;
use crate::skeleton::BoneRole;

/// リターゲット処理のエラー分類
///
/// どれもフレームループを止めない。呼び出し側はバリアントごとに
/// 劣化動作（レスト姿勢へのフォールバック、手続き型クリップ等）を選ぶ。
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RetargetError {
    /// スケルトンに該当ボーンが無い（アバター単位で恒久的にno-op）
    #[error("missing bone for role {role}")]
    MissingBone { role: BoneRole },

    /// キーポイントが無い、または信頼度が閾値未満
    #[error("insufficient confidence for joint {joint}")]
    InsufficientConfidence { joint: Joint },

    /// アニメーションクリップが読み込めない
    #[error("failed to load clip {clip}: {reason}")]
    ClipLoad { clip: String, reason: String },

    /// 知覚ソースが未初期化・切断
    #[error("detector unavailable: {source_name}")]
    DetectorUnavailable { source_name: String },

    /// ミキサーがクリップ再生を拒否した
    #[error("mixer rejected clip {clip}")]
    MixerRejected { clip: String },
}

impl RetargetError {
    pub fn clip_load(clip: &str, reason: impl ToString) -> Self {
        Self::ClipLoad {
            clip: clip.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn detector_unavailable(source_name: &str) -> Self {
        Self::DetectorUnavailable {
            source_name: source_name.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_messages() {
        let e = RetargetError::MissingBone {
            role: BoneRole::RightForeArm,
        };
        assert_eq!(e.to_string(), "missing bone for role rightForeArm");

        let e = RetargetError::clip_load("genuineLaugh", "not found");
        assert_eq!(e.to_string(), "failed to load clip genuineLaugh: not found");

        let e = RetargetError::InsufficientConfidence {
            joint: Joint::LeftElbow,
        };
        assert_eq!(e.to_string(), "insufficient confidence for joint leftElbow");
    }
}
