use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! face_channels {
    ($($variant:ident => $name:literal),+ $(,)?) => {
        /// 表情チャンネルの固定語彙（ARKit 互換 52 ブレンドシェイプ）
        ///
        /// 検出器のカテゴリ名・モーフターゲット名とはこの名前で突き合わせる。
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum FaceChannel {
            $($variant),+
        }

        impl FaceChannel {
            pub const ALL: &'static [FaceChannel] = &[$(FaceChannel::$variant),+];

            pub fn name(self) -> &'static str {
                match self {
                    $(FaceChannel::$variant => $name),+
                }
            }

            pub fn from_name(name: &str) -> Option<Self> {
                match name {
                    $($name => Some(FaceChannel::$variant),)+
                    _ => None,
                }
            }
        }
    };
}

face_channels! {
    BrowDownLeft => "browDownLeft",
    BrowDownRight => "browDownRight",
    BrowInnerUp => "browInnerUp",
    BrowOuterUpLeft => "browOuterUpLeft",
    BrowOuterUpRight => "browOuterUpRight",
    CheekPuff => "cheekPuff",
    CheekSquintLeft => "cheekSquintLeft",
    CheekSquintRight => "cheekSquintRight",
    EyeBlinkLeft => "eyeBlinkLeft",
    EyeBlinkRight => "eyeBlinkRight",
    EyeLookDownLeft => "eyeLookDownLeft",
    EyeLookDownRight => "eyeLookDownRight",
    EyeLookInLeft => "eyeLookInLeft",
    EyeLookInRight => "eyeLookInRight",
    EyeLookOutLeft => "eyeLookOutLeft",
    EyeLookOutRight => "eyeLookOutRight",
    EyeLookUpLeft => "eyeLookUpLeft",
    EyeLookUpRight => "eyeLookUpRight",
    EyeSquintLeft => "eyeSquintLeft",
    EyeSquintRight => "eyeSquintRight",
    EyeWideLeft => "eyeWideLeft",
    EyeWideRight => "eyeWideRight",
    JawForward => "jawForward",
    JawLeft => "jawLeft",
    JawOpen => "jawOpen",
    JawRight => "jawRight",
    MouthClose => "mouthClose",
    MouthDimpleLeft => "mouthDimpleLeft",
    MouthDimpleRight => "mouthDimpleRight",
    MouthFrownLeft => "mouthFrownLeft",
    MouthFrownRight => "mouthFrownRight",
    MouthFunnel => "mouthFunnel",
    MouthLeft => "mouthLeft",
    MouthLowerDownLeft => "mouthLowerDownLeft",
    MouthLowerDownRight => "mouthLowerDownRight",
    MouthPressLeft => "mouthPressLeft",
    MouthPressRight => "mouthPressRight",
    MouthPucker => "mouthPucker",
    MouthRight => "mouthRight",
    MouthRollLower => "mouthRollLower",
    MouthRollUpper => "mouthRollUpper",
    MouthShrugLower => "mouthShrugLower",
    MouthShrugUpper => "mouthShrugUpper",
    MouthSmileLeft => "mouthSmileLeft",
    MouthSmileRight => "mouthSmileRight",
    MouthStretchLeft => "mouthStretchLeft",
    MouthStretchRight => "mouthStretchRight",
    MouthUpperUpLeft => "mouthUpperUpLeft",
    MouthUpperUpRight => "mouthUpperUpRight",
    NoseSneerLeft => "noseSneerLeft",
    NoseSneerRight => "noseSneerRight",
    TongueOut => "tongueOut",
}

impl FaceChannel {
    /// 語彙のバージョン。モーフ名の対応表を変えたら上げる
    pub const VOCABULARY_VERSION: u32 = 1;

    pub fn is_blink(self) -> bool {
        matches!(self, FaceChannel::EyeBlinkLeft | FaceChannel::EyeBlinkRight)
    }

    pub fn is_smile(self) -> bool {
        matches!(self, FaceChannel::MouthSmileLeft | FaceChannel::MouthSmileRight)
    }

    /// モーフターゲット名との照合（大文字小文字は無視）
    pub fn matches_morph(self, morph_name: &str) -> bool {
        morph_name.eq_ignore_ascii_case(self.name())
    }
}

impl fmt::Display for FaceChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Serialize for FaceChannel {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

impl<'de> Deserialize<'de> for FaceChannel {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        FaceChannel::from_name(&name)
            .ok_or_else(|| serde::de::Error::custom(format!("unknown face channel: {}", name)))
    }
}

/// 名前付きチャンネル値。正規化後は value ∈ [0,1]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NamedChannel {
    pub channel: FaceChannel,
    pub value: f32,
}

impl NamedChannel {
    pub fn new(channel: FaceChannel, value: f32) -> Self {
        Self { channel, value }
    }
}
