use nalgebra::UnitQuaternion;

use crate::config::IdleConfig;
use crate::skeleton::{BoneId, Skeleton};

use super::lerp::{angle_between, slerp};

/// これ未満の角度差・影響度は目標に一致したとみなす
const SETTLE_EPSILON: f32 = 1.0e-4;

/// 入力が足りない領域をレスト姿勢（表情は 0）へゆっくり戻す
///
/// 固まったままにも、一瞬で飛ばすこともしない。
/// 係数は max(rate, min_step / 残り角度) なので、残り角度が小さくなっても
/// 1フレームあたり min_step ラジアンは必ず進み、1〜2 秒以内に収束する。
#[derive(Debug, Clone, Copy)]
pub struct IdleBlender {
    rate: f32,
    min_step: f32,
    expression_decay: f32,
}

impl IdleBlender {
    pub fn new(rate: f32, min_step: f32, expression_decay: f32) -> Self {
        Self {
            rate: rate.clamp(0.0, 1.0),
            min_step: min_step.max(0.0),
            expression_decay: expression_decay.clamp(0.0, 1.0),
        }
    }

    pub fn from_config(config: &IdleConfig) -> Self {
        Self::new(config.rate, config.min_step, config.expression_decay)
    }

    pub fn rate(&self) -> f32 {
        self.rate
    }

    /// このフレームで実際に使う slerp 係数
    pub fn factor(&self, remaining_angle: f32) -> f32 {
        if remaining_angle <= SETTLE_EPSILON {
            return 1.0;
        }
        self.rate.max(self.min_step / remaining_angle).min(1.0)
    }

    /// current から target へ 1 フレーム分進めた回転
    pub fn step(
        &self,
        current: &UnitQuaternion<f32>,
        target: &UnitQuaternion<f32>,
    ) -> UnitQuaternion<f32> {
        let remaining = angle_between(current, target);
        slerp(current, target, self.factor(remaining))
    }

    pub fn blend_bone<S: Skeleton + ?Sized>(
        &self,
        skeleton: &mut S,
        bone: BoneId,
        target: &UnitQuaternion<f32>,
    ) {
        if let Some(current) = skeleton.rotation(bone) {
            skeleton.set_rotation(bone, self.step(&current, target));
        }
    }

    /// 欠損した表情チャンネルを 0 へ減衰
    pub fn decay(&self, value: f32) -> f32 {
        let next = value * (1.0 - self.expression_decay);
        if next.abs() < SETTLE_EPSILON {
            0.0
        } else {
            next
        }
    }
}

impl Default for IdleBlender {
    fn default() -> Self {
        Self::from_config(&IdleConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Vector3;

    #[test]
    fn test_factor_uses_rate_for_large_offsets() {
        let idle = IdleBlender::new(0.05, 0.02, 0.1);
        assert!((idle.factor(1.0) - 0.05).abs() < 1e-6);
        // 0.02 / 0.1 = 0.2
        assert!((idle.factor(0.1) - 0.2).abs() < 1e-6);
        assert_eq!(idle.factor(0.0), 1.0);
    }

    #[test]
    fn test_step_matches_slerp_with_rate() {
        let idle = IdleBlender::new(0.05, 0.02, 0.1);
        let current = UnitQuaternion::from_axis_angle(&Vector3::z_axis(), 1.2);
        let rest = UnitQuaternion::identity();
        let stepped = idle.step(&current, &rest);
        let expected = slerp(&current, &rest, 0.05);
        assert!(angle_between(&stepped, &expected) < 1e-5);
    }

    #[test]
    fn test_settles_within_two_seconds() {
        let idle = IdleBlender::default();
        let rest = UnitQuaternion::identity();
        let mut q = UnitQuaternion::from_axis_angle(&Vector3::y_axis(), std::f32::consts::FRAC_PI_2);
        for _ in 0..120 {
            q = idle.step(&q, &rest);
        }
        assert!(angle_between(&q, &rest) < 1e-3);
    }

    #[test]
    fn test_monotonic_approach() {
        let idle = IdleBlender::default();
        let rest = UnitQuaternion::from_axis_angle(&Vector3::x_axis(), 0.3);
        let mut q = UnitQuaternion::from_axis_angle(&Vector3::x_axis(), -1.0);
        let mut prev = angle_between(&q, &rest);
        for _ in 0..60 {
            q = idle.step(&q, &rest);
            let a = angle_between(&q, &rest);
            assert!(a <= prev + 1e-6);
            prev = a;
        }
    }

    #[test]
    fn test_decay_reaches_zero() {
        let idle = IdleBlender::new(0.05, 0.02, 0.1);
        let mut v = 1.0;
        for _ in 0..200 {
            v = idle.decay(v);
        }
        assert_eq!(v, 0.0);
    }
}
