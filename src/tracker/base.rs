use std::collections::HashMap;

use nalgebra::UnitQuaternion;

use crate::skeleton::{BoneMap, BoneRole, RestPose};

use super::idle::IdleBlender;

/// 各領域の今フレームの状態（毎フレーム信頼度から決め直す）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionState {
    /// 十分な信頼度で追従
    Tracked,
    /// 一部の関節だけで追従（手首のみ等）
    Degraded,
    /// レスト姿勢へフォールバック
    Idle,
}

/// リターゲットの土台: レスト姿勢とその上に乗るアニメーション層
#[derive(Debug, Clone, Default)]
pub struct BasePose {
    rest: RestPose,
    layer: HashMap<BoneRole, UnitQuaternion<f32>>,
}

impl BasePose {
    pub fn new(rest: RestPose) -> Self {
        Self {
            rest,
            layer: HashMap::new(),
        }
    }

    pub fn rest(&self, role: BoneRole) -> UnitQuaternion<f32> {
        self.rest.get(role)
    }

    pub fn rest_pose(&self) -> &RestPose {
        &self.rest
    }

    /// アニメーションミキサーの出力（レスト相対の回転）を差し替える
    pub fn set_layer(&mut self, layer: HashMap<BoneRole, UnitQuaternion<f32>>) {
        self.layer = layer;
    }

    /// 入力が無いときの戻り先 = レスト ∘ アニメーション層
    pub fn idle_target(&self, role: BoneRole) -> UnitQuaternion<f32> {
        match self.layer.get(&role) {
            Some(offset) => self.rest.get(role) * offset,
            None => self.rest.get(role),
        }
    }
}

/// 領域ごとの更新に渡す共有コンテキスト
pub struct RegionContext<'a> {
    pub bones: &'a BoneMap,
    pub base: &'a BasePose,
    pub idle: &'a IdleBlender,
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Vector3;

    #[test]
    fn test_idle_target_without_layer_is_rest() {
        let base = BasePose::default();
        assert_eq!(base.idle_target(BoneRole::Spine), UnitQuaternion::identity());
    }

    #[test]
    fn test_idle_target_composes_layer() {
        let mut base = BasePose::default();
        let offset = UnitQuaternion::from_axis_angle(&Vector3::x_axis(), 0.2);
        let mut layer = HashMap::new();
        layer.insert(BoneRole::Spine, offset);
        base.set_layer(layer);
        assert!((base.idle_target(BoneRole::Spine).angle() - 0.2).abs() < 1e-6);
        assert_eq!(base.idle_target(BoneRole::Head), UnitQuaternion::identity());
    }
}
