use std::collections::HashMap;
use std::sync::Arc;

use nalgebra::UnitQuaternion;

use crate::error::RetargetError;
use crate::skeleton::BoneRole;
use crate::tracker::lerp::slerp;

use super::clip::AnimationClip;

/// ミキサー出力: 役割ごとのレスト相対回転
pub type AnimationLayer = HashMap<BoneRole, UnitQuaternion<f32>>;

/// レンダリング側のアニメーションサブシステム
pub trait AnimationMixer {
    /// 新しいクリップを blend_in 秒でフェードインし、再生中のものはそれぞれの
    /// blend_out でフェードアウトさせる
    fn play(
        &mut self,
        clip: Arc<AnimationClip>,
        blend_in: f32,
        looping: bool,
    ) -> Result<(), RetargetError>;
    fn stop_all(&mut self);
    fn advance(&mut self, dt: f32);
    /// 最後に再生を始めたクリップ名（フェードアウト中でないもの）
    fn current(&self) -> Option<&str>;
    fn sample(&self) -> AnimationLayer;
}

#[derive(Debug, Clone, Copy)]
struct Fade {
    from: f32,
    to: f32,
    duration: f32,
    elapsed: f32,
}

impl Fade {
    fn new(from: f32, to: f32, duration: f32) -> Self {
        Self {
            from,
            to,
            duration: duration.max(0.0),
            elapsed: 0.0,
        }
    }

    fn weight(&self) -> f32 {
        if self.duration <= 0.0 || self.elapsed >= self.duration {
            self.to
        } else {
            self.from + (self.to - self.from) * (self.elapsed / self.duration)
        }
    }

    fn done(&self) -> bool {
        self.duration <= 0.0 || self.elapsed >= self.duration
    }
}

struct Action {
    clip: Arc<AnimationClip>,
    time: f32,
    looping: bool,
    fade: Fade,
    fading_out: bool,
}

impl Action {
    fn fade_out(&mut self) {
        if !self.fading_out {
            self.fade = Fade::new(self.fade.weight(), 0.0, self.clip.blend_out());
            self.fading_out = true;
        }
    }
}

/// 線形ウェイトのクロスフェードミキサー
///
/// 1 秒未満のクリップを連打しても膨らまないよう、同時に持つアクション数は MAX_ACTIONS まで。
#[derive(Default)]
pub struct ClipMixer {
    actions: Vec<Action>,
}

const MAX_ACTIONS: usize = 4;

impl ClipMixer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn action_count(&self) -> usize {
        self.actions.len()
    }

    /// クリップ名と現在ウェイト
    pub fn weights(&self) -> Vec<(&str, f32)> {
        self.actions
            .iter()
            .map(|a| (a.clip.name.as_str(), a.fade.weight()))
            .collect()
    }
}

impl AnimationMixer for ClipMixer {
    fn play(
        &mut self,
        clip: Arc<AnimationClip>,
        blend_in: f32,
        looping: bool,
    ) -> Result<(), RetargetError> {
        if !clip.is_playable() {
            return Err(RetargetError::MixerRejected {
                clip: clip.name.clone(),
            });
        }
        for action in &mut self.actions {
            action.fade_out();
        }
        if self.actions.len() >= MAX_ACTIONS {
            self.actions.remove(0);
        }
        self.actions.push(Action {
            clip,
            time: 0.0,
            looping,
            fade: Fade::new(0.0, 1.0, blend_in),
            fading_out: false,
        });
        Ok(())
    }

    fn stop_all(&mut self) {
        self.actions.clear();
    }

    fn advance(&mut self, dt: f32) {
        let dt = dt.max(0.0);
        for action in &mut self.actions {
            action.time += dt;
            action.fade.elapsed += dt;
            let duration = action.clip.duration;
            if action.looping {
                action.time %= duration;
            } else if action.time >= duration {
                action.time = duration;
                action.fade_out();
            }
        }
        self.actions.retain(|a| !(a.fading_out && a.fade.done()));
    }

    fn current(&self) -> Option<&str> {
        self.actions
            .iter()
            .rev()
            .find(|a| !a.fading_out)
            .map(|a| a.clip.name.as_str())
    }

    fn sample(&self) -> AnimationLayer {
        let mut blended: HashMap<BoneRole, (UnitQuaternion<f32>, f32)> = HashMap::new();
        for action in &self.actions {
            let w = action.fade.weight();
            if w <= 0.0 {
                continue;
            }
            for role in action.clip.roles() {
                let q = match action.clip.sample(role, action.time) {
                    Some(q) => q,
                    None => continue,
                };
                let entry = blended
                    .entry(role)
                    .or_insert((UnitQuaternion::identity(), 0.0));
                let total = entry.1 + w;
                entry.0 = slerp(&entry.0, &q, w / total);
                entry.1 = total;
            }
        }
        blended
            .into_iter()
            .map(|(role, (q, total))| {
                // 合計ウェイトが 1 未満の分はレストが透ける
                let rotation = if total < 1.0 {
                    slerp(&UnitQuaternion::identity(), &q, total)
                } else {
                    q
                };
                (role, rotation)
            })
            .collect()
    }
}
