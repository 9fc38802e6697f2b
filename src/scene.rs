//! メモリ上のシーングラフ（ボーン回転 + モーフ影響度）
//!
//! レンダラが無い環境でのリプレイとテストに使う。VMC 送信はここから読む。

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use nalgebra::UnitQuaternion;
use serde::{Deserialize, Serialize};

use crate::expression::{MeshId, MorphTargets};
use crate::face::FaceChannel;
use crate::skeleton::{BoneId, Skeleton};

/// アバター定義ファイル (JSON)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvatarDescription {
    pub bones: Vec<String>,
    #[serde(default)]
    pub meshes: Vec<MeshDescription>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeshDescription {
    pub name: String,
    #[serde(default)]
    pub morph_targets: Vec<String>,
}

#[derive(Debug, Clone)]
struct Bone {
    name: String,
    rotation: UnitQuaternion<f32>,
}

#[derive(Debug, Clone)]
struct Mesh {
    name: String,
    morph_targets: Vec<String>,
    influences: Vec<f32>,
}

#[derive(Debug, Clone)]
pub struct SceneModel {
    bones: Vec<Bone>,
    meshes: Vec<Mesh>,
}

/// Mixamo 形式の上半身ボーン名
const HUMANOID_BONES: [&str; 14] = [
    "mixamorigHips",
    "mixamorigSpine",
    "mixamorigSpine1",
    "mixamorigSpine2",
    "mixamorigNeck",
    "mixamorigHead",
    "mixamorigHeadTop_End",
    "mixamorigLeftShoulder",
    "mixamorigLeftArm",
    "mixamorigLeftForeArm",
    "mixamorigLeftHand",
    "mixamorigRightShoulder",
    "mixamorigRightArm",
    "mixamorigRightForeArm",
];

impl SceneModel {
    pub fn from_description(desc: &AvatarDescription) -> Self {
        let bones = desc
            .bones
            .iter()
            .map(|name| Bone {
                name: name.clone(),
                rotation: UnitQuaternion::identity(),
            })
            .collect();
        let meshes = desc
            .meshes
            .iter()
            .map(|m| Mesh {
                name: m.name.clone(),
                morph_targets: m.morph_targets.clone(),
                influences: vec![0.0; m.morph_targets.len()],
            })
            .collect();
        Self { bones, meshes }
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content =
            fs::read_to_string(path.as_ref()).context("Failed to read avatar description")?;
        let desc: AvatarDescription =
            serde_json::from_str(&content).context("Failed to parse avatar description")?;
        Ok(Self::from_description(&desc))
    }

    /// 組み込みのヒューマノイド
    /// 顔メッシュは全 52 チャンネル、歯メッシュは口まわりだけを持つ
    pub fn humanoid() -> Self {
        let face: Vec<String> = FaceChannel::ALL.iter().map(|c| c.name().to_string()).collect();
        let teeth = vec![
            FaceChannel::JawOpen.name().to_string(),
            FaceChannel::MouthFunnel.name().to_string(),
            "mouthOpen".to_string(),
        ];
        Self::from_description(&AvatarDescription {
            bones: HUMANOID_BONES.iter().map(|s| s.to_string()).collect(),
            meshes: vec![
                MeshDescription {
                    name: "Face".to_string(),
                    morph_targets: face,
                },
                MeshDescription {
                    name: "Teeth".to_string(),
                    morph_targets: teeth,
                },
            ],
        })
    }

    /// 指定したボーンを取り除く（ボーンが欠けたリグの再現用）
    pub fn without_bone(mut self, name: &str) -> Self {
        self.bones.retain(|b| b.name != name);
        self
    }

    pub fn bone_id(&self, name: &str) -> Option<BoneId> {
        self.bones.iter().position(|b| b.name == name).map(BoneId)
    }

    pub fn bones(&self) -> impl Iterator<Item = (&str, &UnitQuaternion<f32>)> {
        self.bones.iter().map(|b| (b.name.as_str(), &b.rotation))
    }

    pub fn influence(&self, mesh: MeshId, index: usize) -> Option<f32> {
        self.meshes.get(mesh.0)?.influences.get(index).copied()
    }

    /// (メッシュ名, モーフ名, 影響度)
    pub fn morph_weights(&self) -> impl Iterator<Item = (&str, &str, f32)> {
        self.meshes.iter().flat_map(|m| {
            m.morph_targets
                .iter()
                .zip(m.influences.iter())
                .map(move |(name, &w)| (m.name.as_str(), name.as_str(), w))
        })
    }

    /// 名前でモーフ影響度を引く（最初に見つかったメッシュ）
    pub fn morph_weight(&self, morph: &str) -> Option<f32> {
        self.morph_weights()
            .find(|(_, name, _)| *name == morph)
            .map(|(_, _, w)| w)
    }
}

impl Skeleton for SceneModel {
    fn bone_names(&self) -> Vec<String> {
        self.bones.iter().map(|b| b.name.clone()).collect()
    }

    fn rotation(&self, bone: BoneId) -> Option<UnitQuaternion<f32>> {
        self.bones.get(bone.0).map(|b| b.rotation)
    }

    fn set_rotation(&mut self, bone: BoneId, rotation: UnitQuaternion<f32>) {
        if let Some(b) = self.bones.get_mut(bone.0) {
            b.rotation = rotation;
        }
    }
}

impl MorphTargets for SceneModel {
    fn morph_target_names(&self) -> Vec<(MeshId, Vec<String>)> {
        self.meshes
            .iter()
            .enumerate()
            .map(|(i, m)| (MeshId(i), m.morph_targets.clone()))
            .collect()
    }

    fn set_influence(&mut self, mesh: MeshId, index: usize, value: f32) {
        if let Some(slot) = self
            .meshes
            .get_mut(mesh.0)
            .and_then(|m| m.influences.get_mut(index))
        {
            *slot = value;
        }
    }
}
