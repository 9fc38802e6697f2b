use nalgebra::UnitQuaternion;

use crate::config::RetargetConfig;
use crate::error::RetargetError;
use crate::pose::{Joint, PoseFrame};
use crate::skeleton::{BoneRole, Skeleton};

use super::base::{RegionContext, RegionState};
use super::lerp::{euler_xyz, slerp};

/// 肩と腰から求めた上半身の傾き（ラジアン、クランプ済み）
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpineLean {
    /// 肩の高さの差による横傾き（Z 軸）
    pub tilt: f32,
    /// 肩-腰の縦距離の基準からのずれによる前後傾き（X 軸）
    pub lean: f32,
}

/// 背骨の回転
///
/// 肩2点と腰2点がそろったときだけ追従する。
/// 前後傾きの基準はキャリブレーション時の肩-腰距離。
pub struct SpineRetargeter {
    confidence: f32,
    tilt_gain: f32,
    lean_gain: f32,
    reference: f32,
    configured: f32,
    max: f32,
    slerp: f32,
}

struct Torso {
    shoulder_dy: f32,
    height: f32,
}

impl SpineRetargeter {
    pub fn from_config(config: &RetargetConfig) -> Self {
        Self {
            confidence: config.spine_confidence,
            tilt_gain: config.shoulder_tilt_gain,
            lean_gain: config.lean_gain,
            reference: config.lean_reference,
            configured: config.lean_reference,
            max: config.spine_max.abs(),
            slerp: config.spine_slerp,
        }
    }

    pub fn reference(&self) -> f32 {
        self.reference
    }

    /// 画像の縦方向を [0,1]（下向き）に正規化して肩・腰の高さを取る
    fn torso(&self, pose: &PoseFrame) -> Result<Torso, RetargetError> {
        let h = pose.height.max(1.0);
        let y = |joint: Joint| -> Result<f32, RetargetError> {
            Ok(pose.require(joint, self.confidence)?.y / h)
        };
        let ls = y(Joint::LeftShoulder)?;
        let rs = y(Joint::RightShoulder)?;
        let lh = y(Joint::LeftHip)?;
        let rh = y(Joint::RightHip)?;
        Ok(Torso {
            shoulder_dy: rs - ls,
            height: (ls + rs) * 0.5 - (lh + rh) * 0.5,
        })
    }

    /// 基準を設定値に戻す（アバター再読込時）
    pub fn reset(&mut self) {
        self.reference = self.configured;
    }

    pub fn solve(&self, pose: &PoseFrame) -> Result<SpineLean, RetargetError> {
        let torso = self.torso(pose)?;
        let tilt = torso.shoulder_dy * self.tilt_gain;
        let lean = (torso.height - self.reference) * self.lean_gain;
        Ok(SpineLean {
            tilt: tilt.clamp(-self.max, self.max),
            lean: lean.clamp(-self.max, self.max),
        })
    }

    /// 現在の肩-腰距離を前後傾きの基準にする。肩・腰が見えなければ false
    pub fn calibrate(&mut self, pose: &PoseFrame) -> bool {
        match self.torso(pose) {
            Ok(torso) => {
                self.reference = torso.height;
                true
            }
            Err(_) => false,
        }
    }

    pub fn update<S: Skeleton + ?Sized>(
        &self,
        skeleton: &mut S,
        ctx: &RegionContext,
        pose: Option<&PoseFrame>,
    ) -> RegionState {
        let lean = match pose.map(|p| self.solve(p)) {
            Some(Ok(l)) => l,
            _ => {
                for role in [BoneRole::Spine, BoneRole::Spine1, BoneRole::Spine2] {
                    if let Some(id) = ctx.bones.get(role) {
                        ctx.idle.blend_bone(skeleton, id, &ctx.base.idle_target(role));
                    }
                }
                return RegionState::Idle;
            }
        };

        // 横傾きは上部の背骨へ。無ければ根元の背骨にまとめて乗せる
        let upper = [BoneRole::Spine2, BoneRole::Spine1]
            .into_iter()
            .find(|r| ctx.bones.get(*r).is_some());
        match upper {
            Some(role) => {
                self.approach(skeleton, ctx, role, euler_xyz(0.0, 0.0, lean.tilt));
                self.approach(skeleton, ctx, BoneRole::Spine, euler_xyz(lean.lean, 0.0, 0.0));
            }
            None => {
                self.approach(skeleton, ctx, BoneRole::Spine, euler_xyz(lean.lean, 0.0, lean.tilt));
            }
        }
        RegionState::Tracked
    }

    fn approach<S: Skeleton + ?Sized>(
        &self,
        skeleton: &mut S,
        ctx: &RegionContext,
        role: BoneRole,
        offset: UnitQuaternion<f32>,
    ) {
        if let Some(id) = ctx.bones.get(role) {
            if let Some(current) = skeleton.rotation(id) {
                let target = ctx.base.rest(role) * offset;
                skeleton.set_rotation(id, slerp(&current, &target, self.slerp));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pose::Keypoint;
    use crate::scene::SceneModel;
    use crate::skeleton::BoneMap;
    use crate::tracker::base::BasePose;
    use crate::tracker::idle::IdleBlender;

    fn torso(conf: f32, left_shoulder_y: f32, right_shoulder_y: f32) -> PoseFrame {
        PoseFrame::new(640.0, 480.0)
            .with(Joint::LeftShoulder, Keypoint::new(380.0, left_shoulder_y, conf))
            .with(Joint::RightShoulder, Keypoint::new(260.0, right_shoulder_y, conf))
            .with(Joint::LeftHip, Keypoint::new(360.0, 360.0, conf))
            .with(Joint::RightHip, Keypoint::new(280.0, 360.0, conf))
    }

    #[test]
    fn test_level_shoulders_no_tilt() {
        let mut spine = SpineRetargeter::from_config(&RetargetConfig::default());
        assert!(spine.calibrate(&torso(0.9, 120.0, 120.0)));
        assert!((spine.reference() + 0.5).abs() < 1e-6);
        let lean = spine.solve(&torso(0.9, 120.0, 120.0)).unwrap();
        assert!(lean.tilt.abs() < 1e-6);
        // 基準と同じ距離なので前後傾きも 0
        assert!(lean.lean.abs() < 1e-6);
    }

    #[test]
    fn test_tilt_follows_shoulder_height_difference() {
        let spine = SpineRetargeter::from_config(&RetargetConfig::default());
        // 右肩が 48px 下がる → 画像の縦 0.1 ぶん下
        let lean = spine.solve(&torso(0.9, 120.0, 168.0)).unwrap();
        assert!((lean.tilt - 0.1 * 0.3).abs() < 1e-5, "tilt={}", lean.tilt);
        // 左肩が下がれば逆向き
        let lean = spine.solve(&torso(0.9, 168.0, 120.0)).unwrap();
        assert!((lean.tilt + 0.1 * 0.3).abs() < 1e-5, "tilt={}", lean.tilt);
    }

    #[test]
    fn test_lean_follows_image_space_offset() {
        let mut spine = SpineRetargeter::from_config(&RetargetConfig::default());
        assert!(spine.calibrate(&torso(0.9, 120.0, 120.0)));
        // 肩が 48px 下がる（前かがみ）→ (-0.4 - -0.5) * 0.5
        let lean = spine.solve(&torso(0.9, 168.0, 168.0)).unwrap();
        assert!((lean.lean - 0.05).abs() < 1e-5, "lean={}", lean.lean);
    }

    #[test]
    fn test_reset_restores_configured_reference() {
        let config = RetargetConfig::default();
        let mut spine = SpineRetargeter::from_config(&config);
        assert!(spine.calibrate(&torso(0.9, 40.0, 40.0)));
        assert!((spine.reference() - config.lean_reference).abs() > 0.1);
        spine.reset();
        assert_eq!(spine.reference(), config.lean_reference);
    }

    #[test]
    fn test_offsets_clamped() {
        let config = RetargetConfig {
            shoulder_tilt_gain: 50.0,
            ..RetargetConfig::default()
        };
        let spine = SpineRetargeter::from_config(&config);
        let lean = spine.solve(&torso(0.9, 400.0, 120.0)).unwrap();
        assert_eq!(lean.tilt.abs(), config.spine_max);
    }

    #[test]
    fn test_low_confidence_idles() {
        let mut scene = SceneModel::humanoid();
        let bones = BoneMap::from_skeleton(&scene);
        let base = BasePose::default();
        let idle = IdleBlender::default();
        let ctx = RegionContext { bones: &bones, base: &base, idle: &idle };
        let spine = SpineRetargeter::from_config(&RetargetConfig::default());
        assert!(matches!(
            spine.solve(&torso(0.1, 120.0, 120.0)),
            Err(RetargetError::InsufficientConfidence { .. })
        ));
        assert_eq!(spine.update(&mut scene, &ctx, Some(&torso(0.1, 120.0, 120.0))), RegionState::Idle);
    }

    #[test]
    fn test_update_applies_tilt_to_upper_spine() {
        let mut scene = SceneModel::humanoid();
        let bones = BoneMap::from_skeleton(&scene);
        let base = BasePose::default();
        let idle = IdleBlender::default();
        let ctx = RegionContext { bones: &bones, base: &base, idle: &idle };
        let spine = SpineRetargeter::from_config(&RetargetConfig::default());
        for _ in 0..60 {
            assert_eq!(spine.update(&mut scene, &ctx, Some(&torso(0.9, 120.0, 168.0))), RegionState::Tracked);
        }
        let id = bones.get(BoneRole::Spine2).unwrap();
        let (_, _, z) = scene.rotation(id).unwrap().euler_angles();
        assert!((z - 0.03).abs() < 1e-3, "z={}", z);
    }
}
