use anyhow::Result;
use nalgebra::UnitQuaternion;
use rosc::{encoder, OscBundle, OscMessage, OscPacket, OscTime, OscType};
use std::net::UdpSocket;

use crate::scene::SceneModel;

/// VMC プロトコルの既定の受信ポート（Performer 側）
pub const VMC_DEFAULT_ADDR: &str = "127.0.0.1:39539";

/// ボーン回転を /VMC/Ext/Bone/Pos で表す
/// 引数: name, px, py, pz, qx, qy, qz, qw（位置はローカル回転だけ送るので 0）
pub fn build_bone_message(name: &str, rotation: &UnitQuaternion<f32>) -> OscMessage {
    let q = rotation.quaternion();
    OscMessage {
        addr: "/VMC/Ext/Bone/Pos".to_string(),
        args: vec![
            OscType::String(name.to_string()),
            OscType::Float(0.0),
            OscType::Float(0.0),
            OscType::Float(0.0),
            OscType::Float(q.i),
            OscType::Float(q.j),
            OscType::Float(q.k),
            OscType::Float(q.w),
        ],
    }
}

/// モーフ影響度を /VMC/Ext/Blend/Val で表す
pub fn build_blend_message(name: &str, value: f32) -> OscMessage {
    OscMessage {
        addr: "/VMC/Ext/Blend/Val".to_string(),
        args: vec![OscType::String(name.to_string()), OscType::Float(value)],
    }
}

/// 1 フレーム分のブレンド値を確定させる
pub fn build_apply_message() -> OscMessage {
    OscMessage {
        addr: "/VMC/Ext/Blend/Apply".to_string(),
        args: vec![],
    }
}

/// シーン全体を 1 つのバンドルにまとめる
/// 同名モーフが複数メッシュにあっても最初の 1 件だけ送る
pub fn build_scene_bundle(scene: &SceneModel) -> OscPacket {
    let mut content: Vec<OscPacket> = scene
        .bones()
        .map(|(name, q)| OscPacket::Message(build_bone_message(name, q)))
        .collect();
    let mut sent: Vec<&str> = Vec::new();
    for (_, morph, weight) in scene.morph_weights() {
        if sent.contains(&morph) {
            continue;
        }
        sent.push(morph);
        content.push(OscPacket::Message(build_blend_message(morph, weight)));
    }
    content.push(OscPacket::Message(build_apply_message()));
    OscPacket::Bundle(OscBundle {
        // 即時実行
        timetag: OscTime { seconds: 0, fractional: 1 },
        content,
    })
}

/// OSC パケットをバイト列にエンコード
pub fn encode_packet(packet: &OscPacket) -> Result<Vec<u8>> {
    let encoded = encoder::encode(packet)?;
    Ok(encoded)
}

/// VMC 送信クライアント
pub struct VmcClient {
    socket: UdpSocket,
    target_addr: String,
}

impl VmcClient {
    pub fn new(target_addr: &str) -> Result<Self> {
        let socket = UdpSocket::bind("0.0.0.0:0")?;
        Ok(Self {
            socket,
            target_addr: target_addr.to_string(),
        })
    }

    pub fn target_addr(&self) -> &str {
        &self.target_addr
    }

    /// ボーン回転とモーフ影響度をまとめて送信
    pub fn send_scene(&self, scene: &SceneModel) -> Result<()> {
        let data = encode_packet(&build_scene_bundle(scene))?;
        self.socket.send_to(&data, &self.target_addr)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::skeleton::Skeleton;

    #[test]
    fn test_bone_message_layout() {
        let q = UnitQuaternion::identity();
        let msg = build_bone_message("Head", &q);
        assert_eq!(msg.addr, "/VMC/Ext/Bone/Pos");
        // name, px, py, pz, qx, qy, qz, qw
        assert_eq!(msg.args.len(), 8);
        assert_eq!(msg.args[0], OscType::String("Head".to_string()));
        assert_eq!(msg.args[7], OscType::Float(1.0));
    }

    #[test]
    fn test_blend_message() {
        let msg = build_blend_message("jawOpen", 0.25);
        assert_eq!(msg.addr, "/VMC/Ext/Blend/Val");
        assert_eq!(msg.args[1], OscType::Float(0.25));
    }

    #[test]
    fn test_scene_bundle_ends_with_apply() {
        let mut scene = SceneModel::humanoid();
        let id = scene.bone_id("mixamorigHead").unwrap();
        scene.set_rotation(id, UnitQuaternion::from_euler_angles(0.0, 0.3, 0.0));
        let bundle = match build_scene_bundle(&scene) {
            OscPacket::Bundle(b) => b,
            OscPacket::Message(_) => panic!("expected bundle"),
        };
        let bones = scene.bone_names().len();
        // 全ボーン + 重複しないモーフ 53 件 (52 + mouthOpen) + Apply
        assert_eq!(bundle.content.len(), bones + 53 + 1);
        match bundle.content.last() {
            Some(OscPacket::Message(m)) => assert_eq!(m.addr, "/VMC/Ext/Blend/Apply"),
            _ => panic!("missing apply"),
        }
        assert!(!encode_packet(&OscPacket::Bundle(bundle)).unwrap().is_empty());
    }
}
