//! 表情チャンネル → モーフターゲット影響度

pub mod blink;
pub mod emotion;
pub mod voice;

pub use blink::BlinkOscillator;
pub use emotion::EmotionOverride;
pub use voice::VoiceMouth;

use std::collections::HashMap;

use tracing::info;

use crate::face::FaceChannel;
use crate::tracker::IdleBlender;

/// 外部所有メッシュを指す不透明ハンドル
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MeshId(pub usize);

/// シーングラフ側のモーフターゲット
pub trait MorphTargets {
    /// メッシュごとのモーフ名一覧（添字がそのまま影響度スロット）
    fn morph_target_names(&self) -> Vec<(MeshId, Vec<String>)>;
    fn set_influence(&mut self, mesh: MeshId, index: usize, value: f32);
}

/// チャンネル → (メッシュ, モーフ添字) の対応表。ロード時に一度だけ解決
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MorphTargetBinding {
    slots: HashMap<FaceChannel, Vec<(MeshId, usize)>>,
}

impl MorphTargetBinding {
    pub fn resolve<M: MorphTargets + ?Sized>(target: &M) -> Self {
        let mut slots: HashMap<FaceChannel, Vec<(MeshId, usize)>> = HashMap::new();
        for (mesh, names) in target.morph_target_names() {
            for (index, name) in names.iter().enumerate() {
                if let Some(&channel) = FaceChannel::ALL.iter().find(|c| c.matches_morph(name)) {
                    slots.entry(channel).or_default().push((mesh, index));
                }
            }
        }
        info!(
            channels = slots.len(),
            slots = slots.values().map(Vec::len).sum::<usize>(),
            "morph targets bound"
        );
        Self { slots }
    }

    /// 束縛が無いチャンネルは空スライス
    pub fn slots(&self, channel: FaceChannel) -> &[(MeshId, usize)] {
        self.slots.get(&channel).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn is_bound(&self, channel: FaceChannel) -> bool {
        !self.slots(channel).is_empty()
    }

    pub fn channels(&self) -> impl Iterator<Item = FaceChannel> + '_ {
        self.slots.keys().copied()
    }
}

/// 表情の書き込み
///
/// 今フレームの値があるチャンネルはそのまま、無いチャンネルは前回値を 0 へ減衰させて書く。
pub struct ExpressionApplicator {
    binding: MorphTargetBinding,
    applied: HashMap<FaceChannel, f32>,
    idle: IdleBlender,
}

impl ExpressionApplicator {
    pub fn new(binding: MorphTargetBinding, idle: IdleBlender) -> Self {
        Self {
            binding,
            applied: HashMap::new(),
            idle,
        }
    }

    pub fn binding(&self) -> &MorphTargetBinding {
        &self.binding
    }

    /// 最後に書き込んだ値
    pub fn applied(&self, channel: FaceChannel) -> f32 {
        self.applied.get(&channel).copied().unwrap_or(0.0)
    }

    pub fn apply<M: MorphTargets + ?Sized>(
        &mut self,
        target: &mut M,
        values: &HashMap<FaceChannel, f32>,
    ) {
        for channel in self.binding.channels().collect::<Vec<_>>() {
            let value = match values.get(&channel) {
                Some(v) => v.clamp(0.0, 1.0),
                None => self.idle.decay(self.applied(channel)),
            };
            for &(mesh, index) in self.binding.slots(channel) {
                target.set_influence(mesh, index, value);
            }
            self.applied.insert(channel, value);
        }
    }

    pub fn reset(&mut self) {
        self.applied.clear();
    }

    /// 別のアバターへ束縛し直す。書き込み済みの値は引き継がない
    pub fn rebind(&mut self, binding: MorphTargetBinding) {
        self.binding = binding;
        self.reset();
    }
}

/// 2つの値表を成分ごとの最大で合成する
pub fn merge_max(into: &mut HashMap<FaceChannel, f32>, channel: FaceChannel, value: f32) {
    let slot = into.entry(channel).or_insert(0.0);
    *slot = slot.max(value);
}
