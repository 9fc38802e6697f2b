use nalgebra::UnitQuaternion;

use crate::config::RetargetConfig;
use crate::face::HeadRotation;
use crate::skeleton::{BoneRole, Skeleton};

use super::base::{RegionContext, RegionState};
use super::lerp::{euler_xyz, lerp_euler};

/// 検出器の頭部角度の上限（ラジアン）。これを超える値は外れ値として丸める
const HEAD_LIMIT: f32 = 1.2;

/// 頭・首の回転
///
/// 回転を頭 0.7 / 首 0.3 に配分し、頭ボーンだけを回すより自然に見せる。
/// 状態はレスト相対のオイラー角で持ち、毎フレーム lerp で寄せる。
pub struct HeadRetargeter {
    head_weights: [f32; 3],
    neck_weights: [f32; 3],
    head_lerp: f32,
    neck_lerp: f32,
    head: [f32; 3],
    neck: [f32; 3],
}

impl HeadRetargeter {
    pub fn from_config(config: &RetargetConfig) -> Self {
        Self {
            head_weights: config.head_weights,
            neck_weights: config.neck_weights,
            head_lerp: config.head_lerp,
            neck_lerp: config.neck_lerp,
            head: [0.0; 3],
            neck: [0.0; 3],
        }
    }

    /// 頭ボーンのレスト相対オイラー角 (x=pitch, y=yaw, z=roll)
    pub fn head_offset(&self) -> [f32; 3] {
        self.head
    }

    pub fn neck_offset(&self) -> [f32; 3] {
        self.neck
    }

    /// オフセットを捨てる。次の追従はレストから寄せ直す
    pub fn reset(&mut self) {
        self.head = [0.0; 3];
        self.neck = [0.0; 3];
    }

    pub fn update<S: Skeleton + ?Sized>(
        &mut self,
        skeleton: &mut S,
        ctx: &RegionContext,
        rotation: Option<HeadRotation>,
    ) -> RegionState {
        let rotation = match rotation.filter(|r| r.is_finite()) {
            Some(r) => r,
            None => {
                self.head = Self::settle(skeleton, ctx, BoneRole::Head);
                self.neck = Self::settle(skeleton, ctx, BoneRole::Neck);
                return RegionState::Idle;
            }
        };

        let angles = [
            rotation.pitch.clamp(-HEAD_LIMIT, HEAD_LIMIT),
            rotation.yaw.clamp(-HEAD_LIMIT, HEAD_LIMIT),
            rotation.roll.clamp(-HEAD_LIMIT, HEAD_LIMIT),
        ];
        let head_target = weighted(&angles, &self.head_weights);
        let neck_target = weighted(&angles, &self.neck_weights);
        self.head = lerp_euler(&self.head, &head_target, self.head_lerp);
        self.neck = lerp_euler(&self.neck, &neck_target, self.neck_lerp);

        Self::write(skeleton, ctx, BoneRole::Head, &self.head);
        Self::write(skeleton, ctx, BoneRole::Neck, &self.neck);
        RegionState::Tracked
    }

    fn write<S: Skeleton + ?Sized>(
        skeleton: &mut S,
        ctx: &RegionContext,
        role: BoneRole,
        offset: &[f32; 3],
    ) {
        if let Some(id) = ctx.bones.get(role) {
            let rotation = ctx.base.rest(role) * euler_xyz(offset[0], offset[1], offset[2]);
            skeleton.set_rotation(id, rotation);
        }
    }

    /// レストへ戻しつつ、実際のボーン回転からオフセットを取り直す
    /// 追従再開時にオフセットとボーンがずれて跳ばないようにする
    fn settle<S: Skeleton + ?Sized>(
        skeleton: &mut S,
        ctx: &RegionContext,
        role: BoneRole,
    ) -> [f32; 3] {
        let id = match ctx.bones.get(role) {
            Some(id) => id,
            None => return [0.0; 3],
        };
        ctx.idle.blend_bone(skeleton, id, &ctx.base.idle_target(role));
        let current = skeleton.rotation(id).unwrap_or_else(UnitQuaternion::identity);
        let relative = ctx.base.rest(role).inverse() * current;
        let (x, y, z) = relative.euler_angles();
        [x, y, z]
    }
}

fn weighted(angles: &[f32; 3], weights: &[f32; 3]) -> [f32; 3] {
    [angles[0] * weights[0], angles[1] * weights[1], angles[2] * weights[2]]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::SceneModel;
    use crate::skeleton::BoneMap;
    use crate::tracker::base::BasePose;
    use crate::tracker::idle::IdleBlender;

    fn setup() -> (SceneModel, BoneMap, BasePose, IdleBlender) {
        let scene = SceneModel::humanoid();
        let bones = BoneMap::from_skeleton(&scene);
        (scene, bones, BasePose::default(), IdleBlender::default())
    }

    #[test]
    fn test_first_frame_lerp_factors() {
        let (mut scene, bones, base, idle) = setup();
        let ctx = RegionContext { bones: &bones, base: &base, idle: &idle };
        let mut head = HeadRetargeter::from_config(&RetargetConfig::default());
        let state = head.update(&mut scene, &ctx, Some(HeadRotation::new(0.5, -0.4, 0.2)));
        assert_eq!(state, RegionState::Tracked);
        // head = lerp(0, (0.35, -0.28, 0.1), 0.2)
        let h = head.head_offset();
        assert!((h[0] - 0.07).abs() < 1e-6);
        assert!((h[1] + 0.056).abs() < 1e-6);
        assert!((h[2] - 0.02).abs() < 1e-6);
        // neck = lerp(0, (0.15, -0.12, 0.04), 0.15)
        let n = head.neck_offset();
        assert!((n[0] - 0.0225).abs() < 1e-6);
        assert!((n[1] + 0.018).abs() < 1e-6);
        assert!((n[2] - 0.006).abs() < 1e-6);
    }

    #[test]
    fn test_converges_to_weighted_target() {
        let (mut scene, bones, base, idle) = setup();
        let ctx = RegionContext { bones: &bones, base: &base, idle: &idle };
        let mut head = HeadRetargeter::from_config(&RetargetConfig::default());
        for _ in 0..200 {
            head.update(&mut scene, &ctx, Some(HeadRotation::new(0.0, 0.6, 0.0)));
        }
        let id = bones.get(BoneRole::Head).unwrap();
        let (_, y, _) = scene.rotation(id).unwrap().euler_angles();
        assert!((y - 0.42).abs() < 1e-3, "yaw={}", y);
    }

    #[test]
    fn test_absent_rotation_returns_to_rest() {
        let (mut scene, bones, base, idle) = setup();
        let ctx = RegionContext { bones: &bones, base: &base, idle: &idle };
        let mut head = HeadRetargeter::from_config(&RetargetConfig::default());
        for _ in 0..30 {
            head.update(&mut scene, &ctx, Some(HeadRotation::new(0.4, 0.4, 0.0)));
        }
        let mut state = RegionState::Tracked;
        for _ in 0..120 {
            state = head.update(&mut scene, &ctx, None);
        }
        assert_eq!(state, RegionState::Idle);
        let id = bones.get(BoneRole::Head).unwrap();
        assert!(scene.rotation(id).unwrap().angle() < 1e-3);
        assert!(head.head_offset().iter().all(|v| v.abs() < 1e-3));
    }

    #[test]
    fn test_reset_eases_in_from_rest() {
        let (mut scene, bones, base, idle) = setup();
        let ctx = RegionContext { bones: &bones, base: &base, idle: &idle };
        let mut head = HeadRetargeter::from_config(&RetargetConfig::default());
        for _ in 0..100 {
            head.update(&mut scene, &ctx, Some(HeadRotation::new(0.0, 0.6, 0.0)));
        }
        head.reset();
        assert_eq!(head.head_offset(), [0.0; 3]);
        assert_eq!(head.neck_offset(), [0.0; 3]);
        head.update(&mut scene, &ctx, Some(HeadRotation::new(0.0, 0.6, 0.0)));
        // 0.42 * 0.2 で、前の値には跳ばない
        assert!((head.head_offset()[1] - 0.084).abs() < 1e-6);
    }

    #[test]
    fn test_non_finite_rotation_is_absent() {
        let (mut scene, bones, base, idle) = setup();
        let ctx = RegionContext { bones: &bones, base: &base, idle: &idle };
        let mut head = HeadRetargeter::from_config(&RetargetConfig::default());
        let state = head.update(&mut scene, &ctx, Some(HeadRotation::new(f32::NAN, 0.0, 0.0)));
        assert_eq!(state, RegionState::Idle);
    }
}
