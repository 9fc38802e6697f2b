//! ボーン役割の解決とレスト姿勢
//!
//! ボーン名の部分一致はロード時に一度だけ行い、以降の毎フレーム処理は
//! `BoneId` ハンドルだけを使う。

use std::collections::HashMap;
use std::fmt;

use nalgebra::UnitQuaternion;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::RetargetError;

/// 外部所有スケルトン内のボーンを指す不透明ハンドル
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BoneId(pub usize);

/// シーングラフ側のスケルトン
///
/// ボーンの所有権は常に実装側にあり、こちらは ID 越しに読み書きするだけ。
pub trait Skeleton {
    /// 添字がそのまま `BoneId` になるボーン名一覧
    fn bone_names(&self) -> Vec<String>;
    fn rotation(&self, bone: BoneId) -> Option<UnitQuaternion<f32>>;
    fn set_rotation(&mut self, bone: BoneId, rotation: UnitQuaternion<f32>);
}

/// リターゲット対象の正準ボーン役割
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BoneRole {
    Head,
    Neck,
    Spine,
    Spine1,
    Spine2,
    LeftShoulder,
    RightShoulder,
    LeftArm,
    RightArm,
    LeftForeArm,
    RightForeArm,
}

impl BoneRole {
    pub const COUNT: usize = 11;

    pub const ALL: [BoneRole; BoneRole::COUNT] = [
        BoneRole::Head,
        BoneRole::Neck,
        BoneRole::Spine,
        BoneRole::Spine1,
        BoneRole::Spine2,
        BoneRole::LeftShoulder,
        BoneRole::RightShoulder,
        BoneRole::LeftArm,
        BoneRole::RightArm,
        BoneRole::LeftForeArm,
        BoneRole::RightForeArm,
    ];

    /// 解決順。長いパターンから先に確保し、`spine` が `Spine1` を奪わないようにする
    const RESOLVE_ORDER: [BoneRole; BoneRole::COUNT] = [
        BoneRole::LeftForeArm,
        BoneRole::RightForeArm,
        BoneRole::LeftShoulder,
        BoneRole::RightShoulder,
        BoneRole::LeftArm,
        BoneRole::RightArm,
        BoneRole::Spine2,
        BoneRole::Spine1,
        BoneRole::Spine,
        BoneRole::Neck,
        BoneRole::Head,
    ];

    pub fn name(self) -> &'static str {
        match self {
            BoneRole::Head => "head",
            BoneRole::Neck => "neck",
            BoneRole::Spine => "spine",
            BoneRole::Spine1 => "spine1",
            BoneRole::Spine2 => "spine2",
            BoneRole::LeftShoulder => "leftShoulder",
            BoneRole::RightShoulder => "rightShoulder",
            BoneRole::LeftArm => "leftArm",
            BoneRole::RightArm => "rightArm",
            BoneRole::LeftForeArm => "leftForeArm",
            BoneRole::RightForeArm => "rightForeArm",
        }
    }

    /// ボーン名に対する部分一致パターン（小文字）
    /// サードパーティ製リグとの互換性のため変更しないこと
    pub fn patterns(self) -> &'static [&'static str] {
        match self {
            BoneRole::Head => &["head"],
            BoneRole::Neck => &["neck"],
            BoneRole::Spine => &["spine"],
            BoneRole::Spine1 => &["spine1"],
            BoneRole::Spine2 => &["spine2"],
            BoneRole::LeftShoulder => &["leftshoulder"],
            BoneRole::RightShoulder => &["rightshoulder"],
            BoneRole::LeftArm => &["leftarm", "leftupperarm"],
            BoneRole::RightArm => &["rightarm", "rightupperarm"],
            BoneRole::LeftForeArm => &["leftforearm"],
            BoneRole::RightForeArm => &["rightforearm"],
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|r| r.name() == name)
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for BoneRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// 役割 → ボーンハンドルの固定表
#[derive(Debug, Clone, PartialEq)]
pub struct BoneMap {
    handles: [Option<BoneId>; BoneRole::COUNT],
}

impl BoneMap {
    /// ボーン名を大文字小文字無視の部分一致で解決する
    ///
    /// 候補が複数あれば最も短い名前を採用（`Head` と `HeadTop_End` など）。
    /// 見つからない役割はロード時に一度だけ警告し、その役割は以後 no-op。
    pub fn resolve(bone_names: &[String]) -> Self {
        let lowered: Vec<String> = bone_names.iter().map(|n| n.to_lowercase()).collect();
        let mut claimed = vec![false; lowered.len()];
        let mut handles = [None; BoneRole::COUNT];

        for role in BoneRole::RESOLVE_ORDER {
            let best = lowered
                .iter()
                .enumerate()
                .filter(|(i, name)| {
                    !claimed[*i] && role.patterns().iter().any(|p| name.contains(p))
                })
                .min_by_key(|(i, name)| (name.len(), *i))
                .map(|(i, _)| i);

            match best {
                Some(i) => {
                    claimed[i] = true;
                    handles[role.index()] = Some(BoneId(i));
                }
                None => warn!("{}", RetargetError::MissingBone { role }),
            }
        }

        let map = Self { handles };
        info!(
            resolved = BoneRole::COUNT - map.missing().len(),
            missing = map.missing().len(),
            "bone roles resolved"
        );
        map
    }

    pub fn from_skeleton<S: Skeleton + ?Sized>(skeleton: &S) -> Self {
        Self::resolve(&skeleton.bone_names())
    }

    pub fn get(&self, role: BoneRole) -> Option<BoneId> {
        self.handles[role.index()]
    }

    pub fn missing(&self) -> Vec<BoneRole> {
        BoneRole::ALL
            .iter()
            .copied()
            .filter(|r| self.handles[r.index()].is_none())
            .collect()
    }

    /// 解決済みの (役割, ハンドル)
    pub fn iter(&self) -> impl Iterator<Item = (BoneRole, BoneId)> + '_ {
        BoneRole::ALL
            .iter()
            .filter_map(move |&r| self.handles[r.index()].map(|id| (r, id)))
    }
}

/// ロード後に落ち着いた時点のボーン回転。再ロードまで読み取り専用
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RestPose {
    rotations: HashMap<BoneRole, UnitQuaternion<f32>>,
}

impl RestPose {
    pub fn capture<S: Skeleton + ?Sized>(bones: &BoneMap, skeleton: &S) -> Self {
        let rotations = bones
            .iter()
            .filter_map(|(role, id)| skeleton.rotation(id).map(|q| (role, q)))
            .collect();
        Self { rotations }
    }

    /// 未取得の役割は単位回転
    pub fn get(&self, role: BoneRole) -> UnitQuaternion<f32> {
        self.rotations
            .get(&role)
            .copied()
            .unwrap_or_else(UnitQuaternion::identity)
    }
}
