use serde::{Deserialize, Serialize};

/// 会話・感情状態の分類
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Positive,
    Negative,
    Flirty,
    Nervous,
    Confident,
    Neutral,
}

impl Sentiment {
    pub fn name(self) -> &'static str {
        match self {
            Sentiment::Positive => "positive",
            Sentiment::Negative => "negative",
            Sentiment::Flirty => "flirty",
            Sentiment::Nervous => "nervous",
            Sentiment::Confident => "confident",
            Sentiment::Neutral => "neutral",
        }
    }
}

/// 強度の段階: low < 0.3 ≤ medium < 0.7 ≤ high
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IntensityBucket {
    Low,
    Medium,
    High,
}

impl IntensityBucket {
    pub fn from_intensity(intensity: f32) -> Self {
        if intensity.is_nan() || intensity < 0.3 {
            IntensityBucket::Low
        } else if intensity < 0.7 {
            IntensityBucket::Medium
        } else {
            IntensityBucket::High
        }
    }
}

/// 呼び出し側が状態変化のたびに組み立てる一時的な文脈
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnimationContext {
    pub sentiment: Sentiment,
    pub intensity: f32,
    #[serde(default)]
    pub previous_state_key: String,
}

impl AnimationContext {
    pub fn new(sentiment: Sentiment, intensity: f32) -> Self {
        Self {
            sentiment,
            intensity,
            previous_state_key: String::new(),
        }
    }

    pub fn bucket(&self) -> IntensityBucket {
        IntensityBucket::from_intensity(self.intensity)
    }
}

/// 対応表に無い組み合わせの候補
pub const NEUTRAL_CANDIDATES: &[&str] = &["idleBreathing", "thoughtfulLook", "subtleShift"];

/// (感情, 強度段階) → 候補クリップ
pub fn candidates(sentiment: Sentiment, bucket: IntensityBucket) -> &'static [&'static str] {
    use IntensityBucket::*;
    use Sentiment::*;
    match (sentiment, bucket) {
        (Positive, Low) => &["softSmile", "gentleNod", "relaxedSway"],
        (Positive, Medium) => &["happyNod", "warmSmile", "interestedLean"],
        (Positive, High) => &["genuineLaugh", "flirtyHairFlip", "interestedLean"],
        (Negative, Low) => &["slightFrown", "lookAway"],
        (Negative, Medium) => &["sighShrug", "headShake"],
        (Negative, High) => &["frustratedCross", "headShake", "turnAway"],
        (Flirty, Low) => &["shyGlance", "subtleSmile"],
        (Flirty, Medium) => &["hairTuck", "playfulTilt"],
        (Flirty, High) => &["flirtyHairFlip", "playfulWink", "interestedLean"],
        (Nervous, Low) => &["fidget", "glanceDown"],
        (Nervous, Medium) => &["nervousLaugh", "selfTouch"],
        (Nervous, High) => &["nervousLaugh", "fidget", "lookAway"],
        (Confident, Medium) => &["confidentPosture", "firmNod"],
        (Confident, High) => &["confidentPosture", "expansiveGesture", "firmNod"],
        _ => NEUTRAL_CANDIDATES,
    }
}

/// 文脈からクリップキーを選ぶ
///
/// 同じ文脈でも cycle_ms ごとに候補を巡回する（選択履歴は持たない）。
pub fn select_animation(context: &AnimationContext, now_ms: u64, cycle_ms: u64) -> &'static str {
    let list = candidates(context.sentiment, context.bucket());
    let slot = now_ms / cycle_ms.max(1);
    list[(slot % list.len() as u64) as usize]
}

/// 次に来そうなクリップ（先読み用）
pub fn likely_next(sentiment: Sentiment) -> &'static [&'static str] {
    match sentiment {
        Sentiment::Positive => &["genuineLaugh", "happyNod"],
        Sentiment::Negative => &["sighShrug", "lookAway"],
        Sentiment::Flirty => &["flirtyHairFlip", "playfulTilt"],
        Sentiment::Nervous => &["nervousLaugh", "fidget"],
        Sentiment::Confident => &["confidentPosture"],
        Sentiment::Neutral => &["idleBreathing", "thoughtfulLook"],
    }
}
