use std::f32::consts::PI;

use nalgebra::{UnitQuaternion, Vector3};

use crate::config::RetargetConfig;
use crate::error::RetargetError;
use crate::pose::{Joint, PoseFrame};
use crate::skeleton::{BoneRole, Skeleton};

use super::base::{RegionContext, RegionState};
use super::lerp::{rotation_between, slerp};

/// 体のどちら側か
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Left,
    Right,
}

impl Side {
    /// (肩, 肘, 手首)
    pub fn joints(self) -> (Joint, Joint, Joint) {
        match self {
            Side::Left => (Joint::LeftShoulder, Joint::LeftElbow, Joint::LeftWrist),
            Side::Right => (Joint::RightShoulder, Joint::RightElbow, Joint::RightWrist),
        }
    }

    pub fn upper_arm(self) -> BoneRole {
        match self {
            Side::Left => BoneRole::LeftArm,
            Side::Right => BoneRole::RightArm,
        }
    }

    pub fn forearm(self) -> BoneRole {
        match self {
            Side::Left => BoneRole::LeftForeArm,
            Side::Right => BoneRole::RightForeArm,
        }
    }

    /// T ポーズでの上腕の向き（正規化平面）
    pub fn rest_direction(self) -> Vector3<f32> {
        match self {
            Side::Left => Vector3::new(-1.0, 0.0, 0.0),
            Side::Right => Vector3::new(1.0, 0.0, 0.0),
        }
    }

    /// 肘を曲げる向き。左右で鏡像
    fn bend_sign(self) -> f32 {
        match self {
            Side::Left => 1.0,
            Side::Right => -1.0,
        }
    }
}

/// 1フレーム分の腕の解
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ArmSolution {
    /// レスト方向から観測方向への回転（レスト相対）
    pub upper: UnitQuaternion<f32>,
    /// 肘の曲げ角。肘が見えないときは None
    pub bend: Option<f32>,
}

/// 肘の内角から求めた曲げ角 π - ∠(肩-肘-手首) を [0, max] に収める
pub fn elbow_bend(
    shoulder: &Vector3<f32>,
    elbow: &Vector3<f32>,
    wrist: &Vector3<f32>,
    max: f32,
) -> f32 {
    let to_shoulder = shoulder - elbow;
    let to_wrist = wrist - elbow;
    let interior = match (to_shoulder.try_normalize(1.0e-6), to_wrist.try_normalize(1.0e-6)) {
        (Some(a), Some(b)) => a.dot(&b).clamp(-1.0, 1.0).acos(),
        _ => PI,
    };
    (PI - interior).clamp(0.0, max.max(0.0))
}

/// 片腕の回転
pub struct ArmRetargeter {
    side: Side,
    confidence: f32,
    slerp: f32,
    elbow_scale: f32,
    elbow_max: f32,
    elbow_depth: f32,
    wrist_depth: f32,
}

impl ArmRetargeter {
    pub fn from_config(side: Side, config: &RetargetConfig) -> Self {
        Self {
            side,
            confidence: config.arm_confidence,
            slerp: config.arm_slerp,
            elbow_scale: config.elbow_scale,
            elbow_max: config.elbow_max,
            elbow_depth: config.elbow_depth,
            wrist_depth: config.wrist_depth,
        }
    }

    pub fn side(&self) -> Side {
        self.side
    }

    /// キーポイントから上腕の向きと肘の曲げを求める
    ///
    /// 肩・肘・手首がそろえば完全な解、肘だけ欠けていれば手首へ向けた
    /// 上腕のみ。それ以外は `InsufficientConfidence`。
    pub fn solve(&self, pose: &PoseFrame) -> Result<ArmSolution, RetargetError> {
        let (shoulder_joint, elbow_joint, wrist_joint) = self.side.joints();
        let shoulder = pose.to_plane(pose.require(shoulder_joint, self.confidence)?, 0.0);
        let elbow = pose.require(elbow_joint, self.confidence);
        let wrist = pose.require(wrist_joint, self.confidence);

        let (aim, bend) = match (elbow, wrist) {
            (Ok(e), Ok(w)) => {
                let e = pose.to_plane(e, self.elbow_depth);
                let w = pose.to_plane(w, self.wrist_depth);
                (e, Some(elbow_bend(&shoulder, &e, &w, self.elbow_max)))
            }
            (Err(_), Ok(w)) => (pose.to_plane(w, self.wrist_depth), None),
            (Ok(_), Err(e)) | (Err(e), Err(_)) => return Err(e),
        };

        let direction = (aim - shoulder)
            .try_normalize(1.0e-6)
            .ok_or(RetargetError::InsufficientConfidence { joint: elbow_joint })?;
        Ok(ArmSolution {
            upper: rotation_between(&self.side.rest_direction(), &direction),
            bend,
        })
    }

    pub fn update<S: Skeleton + ?Sized>(
        &self,
        skeleton: &mut S,
        ctx: &RegionContext,
        pose: Option<&PoseFrame>,
    ) -> RegionState {
        let upper_role = self.side.upper_arm();
        let fore_role = self.side.forearm();

        let solution = match pose.map(|p| self.solve(p)) {
            Some(Ok(s)) => s,
            _ => {
                self.idle(skeleton, ctx, upper_role);
                self.idle(skeleton, ctx, fore_role);
                return RegionState::Idle;
            }
        };

        let upper_target = ctx.base.rest(upper_role) * solution.upper;
        self.approach(skeleton, ctx, upper_role, &upper_target);

        match solution.bend {
            Some(bend) => {
                let angle = self.side.bend_sign() * bend * self.elbow_scale;
                let fore_target = ctx.base.rest(fore_role)
                    * UnitQuaternion::from_axis_angle(&Vector3::y_axis(), angle);
                self.approach(skeleton, ctx, fore_role, &fore_target);
                RegionState::Tracked
            }
            None => {
                self.idle(skeleton, ctx, fore_role);
                RegionState::Degraded
            }
        }
    }

    fn approach<S: Skeleton + ?Sized>(
        &self,
        skeleton: &mut S,
        ctx: &RegionContext,
        role: BoneRole,
        target: &UnitQuaternion<f32>,
    ) {
        if let Some(id) = ctx.bones.get(role) {
            if let Some(current) = skeleton.rotation(id) {
                skeleton.set_rotation(id, slerp(&current, target, self.slerp));
            }
        }
    }

    fn idle<S: Skeleton + ?Sized>(&self, skeleton: &mut S, ctx: &RegionContext, role: BoneRole) {
        if let Some(id) = ctx.bones.get(role) {
            ctx.idle.blend_bone(skeleton, id, &ctx.base.idle_target(role));
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
    use crate::tracker::lerp::angle_between;

    fn left_arm_pose(conf: f32) -> PoseFrame {
        PoseFrame::new(640.0, 480.0)
            .with(Joint::LeftShoulder, Keypoint::new(300.0, 200.0, 0.9))
            .with(Joint::LeftElbow, Keypoint::new(240.0, 215.0, conf))
            .with(Joint::LeftWrist, Keypoint::new(180.0, 230.0, conf))
    }

    #[test]
    fn test_elbow_bend_straight_and_folded() {
        let s = Vector3::new(0.0, 0.0, 0.0);
        let e = Vector3::new(-1.0, 0.0, 0.0);
        let straight = Vector3::new(-2.0, 0.0, 0.0);
        assert!(elbow_bend(&s, &e, &straight, 0.8 * PI) < 1e-4);

        let right_angle = Vector3::new(-1.0, 1.0, 0.0);
        assert!((elbow_bend(&s, &e, &right_angle, 0.8 * PI) - PI / 2.0).abs() < 1e-4);

        // 完全に折りたたむと上限で止まる
        let folded = Vector3::new(-0.0001, 0.0, 0.0);
        assert!((elbow_bend(&s, &e, &folded, 0.8 * PI) - 0.8 * PI).abs() < 1e-4);
    }

    #[test]
    fn test_elbow_bend_always_in_range() {
        let s = Vector3::zeros();
        for i in 0..36 {
            let a = i as f32 * PI / 18.0;
            let e = Vector3::new(0.3, -0.2, 0.1);
            let w = e + Vector3::new(a.cos(), a.sin(), 0.1);
            let bend = elbow_bend(&s, &e, &w, 0.8 * PI);
            assert!((0.0..=0.8 * PI + 1e-6).contains(&bend));
        }
        // 縮退ケース
        assert_eq!(elbow_bend(&s, &s, &s, 0.8 * PI), 0.0);
    }

    #[test]
    fn test_solve_full_arm() {
        let arm = ArmRetargeter::from_config(Side::Left, &RetargetConfig::default());
        let sol = arm.solve(&left_arm_pose(0.9)).unwrap();
        assert!(sol.bend.is_some());
        assert!(sol.upper.angle() > 0.1);
    }

    #[test]
    fn test_solve_wrist_only_is_degraded() {
        let arm = ArmRetargeter::from_config(Side::Left, &RetargetConfig::default());
        let pose = left_arm_pose(0.9).with(Joint::LeftElbow, Keypoint::new(240.0, 215.0, 0.01));
        let sol = arm.solve(&pose).unwrap();
        assert!(sol.bend.is_none());
    }

    #[test]
    fn test_solve_low_confidence_is_error() {
        let arm = ArmRetargeter::from_config(Side::Left, &RetargetConfig::default());
        let err = arm.solve(&left_arm_pose(0.05)).unwrap_err();
        assert!(matches!(err, RetargetError::InsufficientConfidence { .. }));
    }

    #[test]
    fn test_update_moves_toward_target_and_idles_back() {
        let mut scene = SceneModel::humanoid();
        let bones = BoneMap::from_skeleton(&scene);
        let base = BasePose::default();
        let idle = IdleBlender::default();
        let ctx = RegionContext { bones: &bones, base: &base, idle: &idle };
        let arm = ArmRetargeter::from_config(Side::Left, &RetargetConfig::default());
        let pose = left_arm_pose(0.9);
        let id = bones.get(BoneRole::LeftArm).unwrap();

        assert_eq!(arm.update(&mut scene, &ctx, Some(&pose)), RegionState::Tracked);
        let first = scene.rotation(id).unwrap().angle();
        let target = arm.solve(&pose).unwrap().upper.angle();
        // 1フレーム目は slerp 係数 0.3 の分だけ
        assert!((first - target * 0.3).abs() < 1e-3);

        for _ in 0..60 {
            arm.update(&mut scene, &ctx, Some(&pose));
        }
        assert!(angle_between(&scene.rotation(id).unwrap(), &arm.solve(&pose).unwrap().upper) < 1e-3);

        let mut state = RegionState::Tracked;
        for _ in 0..90 {
            state = arm.update(&mut scene, &ctx, None);
        }
        assert_eq!(state, RegionState::Idle);
        assert!(scene.rotation(id).unwrap().angle() < 1e-3);
    }

    #[test]
    fn test_missing_forearm_is_noop() {
        let mut scene = SceneModel::humanoid().without_bone("mixamorigRightForeArm");
        let bones = BoneMap::from_skeleton(&scene);
        let base = BasePose::default();
        let idle = IdleBlender::default();
        let ctx = RegionContext { bones: &bones, base: &base, idle: &idle };
        let arm = ArmRetargeter::from_config(Side::Right, &RetargetConfig::default());
        let pose = PoseFrame::new(640.0, 480.0)
            .with(Joint::RightShoulder, Keypoint::new(340.0, 200.0, 0.9))
            .with(Joint::RightElbow, Keypoint::new(400.0, 260.0, 0.9))
            .with(Joint::RightWrist, Keypoint::new(420.0, 200.0, 0.9));
        assert_eq!(arm.update(&mut scene, &ctx, Some(&pose)), RegionState::Tracked);
        let upper = bones.get(BoneRole::RightArm).unwrap();
        assert!(scene.rotation(upper).unwrap().angle() > 0.0);
    }
}
