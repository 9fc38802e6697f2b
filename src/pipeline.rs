//! アバター 1 体分のフレーム処理
//!
//! 知覚入力 → 正規化 → キャリブレーション/平滑化 → {骨格リターゲット, 表情} の
//! 一方向の流れを毎フレーム同期的に回す。ブロックする I/O は持たない。

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info};

use crate::animation::{
    AnimationContext, AnimationController, ClipCache, ClipMixer, ClipSource, Sentiment,
};
use crate::config::Config;
use crate::error::RetargetError;
use crate::expression::{
    BlinkOscillator, EmotionOverride, ExpressionApplicator, MorphTargetBinding, MorphTargets,
    VoiceMouth,
};
use crate::face::{FaceChannel, HeadRotation, NamedChannel};
use crate::pose::PoseFrame;
use crate::skeleton::{BoneMap, RestPose, Skeleton};
use crate::tracker::{
    ArmRetargeter, BasePose, ExpressionCalibrator, HeadRetargeter, IdleBlender, RegionContext,
    RegionState, Side, SpineRetargeter,
};

/// 知覚側の協調者。毎フレーム 1 回、ブロックせずに最新値を読む
///
/// `Ok(None)` は「今フレームは値なし」、`Err(DetectorUnavailable)` は未初期化・切断。
pub trait PerceptionSource {
    /// キャリブレーション前の生の表情チャンネル
    fn facial_channels(&mut self) -> Result<Option<Vec<NamedChannel>>, RetargetError>;
    fn head_rotation(&mut self) -> Result<Option<HeadRotation>, RetargetError>;
    fn pose_keypoints(&mut self) -> Result<Option<PoseFrame>, RetargetError>;

    fn voice_intensity(&mut self) -> Option<f32> {
        None
    }

    /// 文脈が変わったときだけ Some
    fn animation_context(&mut self) -> Option<AnimationContext> {
        None
    }
}

/// 1 フレーム分の入力
#[derive(Debug, Clone, Default)]
pub struct FrameInput {
    pub face: Option<Vec<NamedChannel>>,
    pub head: Option<HeadRotation>,
    pub pose: Option<PoseFrame>,
    pub voice: Option<f32>,
}

/// 領域ごとの今フレームの状態
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameReport {
    pub rest_captured: bool,
    pub head: RegionState,
    pub left_arm: RegionState,
    pub right_arm: RegionState,
    pub spine: RegionState,
}

impl FrameReport {
    fn waiting() -> Self {
        Self {
            rest_captured: false,
            head: RegionState::Idle,
            left_arm: RegionState::Idle,
            right_arm: RegionState::Idle,
            spine: RegionState::Idle,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Detector {
    Face,
    Head,
    Pose,
}

impl Detector {
    fn index(self) -> usize {
        self as usize
    }
}

pub struct AvatarPipeline {
    bones: BoneMap,
    base: BasePose,
    idle: IdleBlender,
    calibrator: ExpressionCalibrator,
    head: HeadRetargeter,
    left_arm: ArmRetargeter,
    right_arm: ArmRetargeter,
    spine: SpineRetargeter,
    expression: ExpressionApplicator,
    blink: BlinkOscillator,
    voice: VoiceMouth,
    emotion: EmotionOverride,
    animation: AnimationController<ClipMixer>,
    mirror: bool,
    rest_delay: f32,
    rest_captured: bool,
    clock: f64,
    last_pose: Option<PoseFrame>,
    available: [bool; 3],
}

impl AvatarPipeline {
    /// アバターのロード時に一度だけ呼ぶ。ボーン役割とモーフ束縛をここで解決する
    pub fn load<S: Skeleton + MorphTargets + ?Sized>(
        scene: &S,
        config: &Config,
        cache: Arc<ClipCache>,
        clips: Arc<dyn ClipSource>,
    ) -> Self {
        let bones = BoneMap::from_skeleton(scene);
        let idle = IdleBlender::from_config(&config.idle);
        let binding = MorphTargetBinding::resolve(scene);
        let mut animation =
            AnimationController::new(ClipMixer::new(), cache, clips, &config.animation);
        animation.start_idle();

        Self {
            bones,
            base: BasePose::default(),
            idle,
            calibrator: ExpressionCalibrator::new(&config.smoothing, &config.channels),
            head: HeadRetargeter::from_config(&config.retarget),
            left_arm: ArmRetargeter::from_config(Side::Left, &config.retarget),
            right_arm: ArmRetargeter::from_config(Side::Right, &config.retarget),
            spine: SpineRetargeter::from_config(&config.retarget),
            expression: ExpressionApplicator::new(binding, idle),
            blink: BlinkOscillator::from_config(&config.blink),
            voice: VoiceMouth::from_config(&config.voice),
            emotion: EmotionOverride::from_config(&config.emotion),
            animation,
            mirror: config.retarget.mirror,
            rest_delay: config.idle.rest_capture_delay.max(0.0),
            rest_captured: false,
            clock: 0.0,
            last_pose: None,
            available: [true; 3],
        }
    }

    /// 同じパイプラインで別のアバターを読み直す。平滑化状態もここでだけ捨てる
    pub fn reload<S: Skeleton + MorphTargets + ?Sized>(&mut self, scene: &S) {
        self.bones = BoneMap::from_skeleton(scene);
        self.expression.rebind(MorphTargetBinding::resolve(scene));
        self.calibrator.reset();
        self.head.reset();
        self.spine.reset();
        self.base = BasePose::default();
        self.rest_captured = false;
        self.clock = 0.0;
        self.last_pose = None;
    }

    pub fn bones(&self) -> &BoneMap {
        &self.bones
    }

    pub fn rest_pose(&self) -> &RestPose {
        self.base.rest_pose()
    }

    pub fn rest_captured(&self) -> bool {
        self.rest_captured
    }

    pub fn calibrator(&self) -> &ExpressionCalibrator {
        &self.calibrator
    }

    pub fn animation(&self) -> &AnimationController<ClipMixer> {
        &self.animation
    }

    /// ロードからの経過時間（ミリ秒）
    pub fn clock_ms(&self) -> u64 {
        (self.clock * 1000.0) as u64
    }

    /// 現在のボーン回転をレスト姿勢として固定する
    pub fn capture_rest_pose<S: Skeleton + ?Sized>(&mut self, scene: &S) {
        self.base = BasePose::new(RestPose::capture(&self.bones, scene));
        self.rest_captured = true;
        info!(bones = self.bones.iter().count(), "rest pose captured");
    }

    /// 「今を無表情とする」。直近の姿勢から背骨の前後傾き基準も取り直す
    pub fn calibrate(&mut self) {
        self.calibrator.calibrate();
        let spine = match &self.last_pose {
            Some(pose) => self.spine.calibrate(pose),
            None => false,
        };
        info!(
            channels = self.calibrator.baseline().len(),
            spine,
            "calibrated"
        );
    }

    /// 会話・感情の文脈が変わったとき
    pub fn set_context(&mut self, context: &AnimationContext) -> &'static str {
        let now = self.clock_ms();
        self.animation.apply(context, now)
    }

    /// 手動の感情オーバーライド。None で解除
    pub fn set_emotion(&mut self, emotion: Option<(Sentiment, f32)>) {
        match emotion {
            Some((sentiment, intensity)) => self.emotion.set(sentiment, intensity),
            None => self.emotion.clear(),
        }
    }

    /// 知覚ソースから今フレームの入力を集める
    ///
    /// 未接続のソースは「値なし」として扱い、全領域が待機側へ落ちる。
    /// 接続状態の変化だけを debug で記録する。
    pub fn pull<P: PerceptionSource + ?Sized>(&mut self, source: &mut P) -> FrameInput {
        let face = source.facial_channels();
        let head = source.head_rotation();
        let pose = source.pose_keypoints();
        let input = FrameInput {
            face: self.observe(Detector::Face, face),
            head: self.observe(Detector::Head, head),
            pose: self.observe(Detector::Pose, pose),
            voice: source.voice_intensity(),
        };
        if let Some(context) = source.animation_context() {
            self.set_context(&context);
        }
        input
    }

    fn observe<T>(
        &mut self,
        detector: Detector,
        result: Result<Option<T>, RetargetError>,
    ) -> Option<T> {
        let slot = &mut self.available[detector.index()];
        match result {
            Ok(value) => {
                if !*slot {
                    debug!(?detector, "detector available again");
                    *slot = true;
                }
                value
            }
            Err(e) => {
                if *slot {
                    debug!(?detector, "{}", e);
                    *slot = false;
                }
                None
            }
        }
    }

    /// 1 フレーム進める
    pub fn update<S: Skeleton + MorphTargets + ?Sized>(
        &mut self,
        scene: &mut S,
        input: &FrameInput,
        dt: f32,
    ) -> FrameReport {
        let dt = if dt.is_finite() { dt.max(0.0) } else { 0.0 };
        self.clock += dt as f64;

        self.animation.poll();
        self.animation.advance(dt);
        self.update_expression(scene, input, dt);

        if !self.rest_captured {
            if self.clock < self.rest_delay as f64 {
                return FrameReport::waiting();
            }
            self.capture_rest_pose(scene);
        }
        self.base.set_layer(self.animation.layer());

        let mirrored;
        let pose = match (&input.pose, self.mirror) {
            (Some(p), true) => {
                mirrored = p.mirrored();
                Some(&mirrored)
            }
            (p, _) => p.as_ref(),
        };
        if let Some(p) = pose {
            self.last_pose = Some(p.clone());
        }

        let ctx = RegionContext {
            bones: &self.bones,
            base: &self.base,
            idle: &self.idle,
        };
        FrameReport {
            rest_captured: true,
            head: self.head.update(scene, &ctx, input.head),
            left_arm: self.left_arm.update(scene, &ctx, pose),
            right_arm: self.right_arm.update(scene, &ctx, pose),
            spine: self.spine.update(scene, &ctx, pose),
        }
    }

    fn update_expression<S: MorphTargets + ?Sized>(
        &mut self,
        scene: &mut S,
        input: &FrameInput,
        dt: f32,
    ) {
        let mut values: HashMap<FaceChannel, f32> = HashMap::new();
        if let Some(face) = &input.face {
            for channel in self.calibrator.update_all(face) {
                values.insert(channel.channel, channel.value);
            }
        }
        self.blink.update(dt);
        self.blink.fill(&mut values);
        self.voice.update(input.voice);
        self.voice.contribute(&mut values);
        self.emotion.update();
        self.emotion.contribute(&mut values);
        self.expression.apply(scene, &values);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::animation::{select_animation, JsonClipLibrary};
    use crate::pose::{Joint, Keypoint};
    use crate::scene::SceneModel;
    use crate::skeleton::BoneRole;
    use crate::tracker::lerp::{angle_between, slerp};
    use nalgebra::{UnitQuaternion, Vector3};

    const DT: f32 = 1.0 / 60.0;

    fn pipeline(scene: &SceneModel) -> AvatarPipeline {
        let mut p = AvatarPipeline::load(
            scene,
            &Config::default(),
            Arc::new(ClipCache::new()),
            Arc::new(JsonClipLibrary::new("/nonexistent/animations")),
        );
        p.capture_rest_pose(scene);
        p
    }

    fn left_arm(conf: f32, shoulder: (f32, f32), elbow: (f32, f32), wrist: (f32, f32)) -> PoseFrame {
        PoseFrame::new(640.0, 480.0)
            .with(Joint::LeftShoulder, Keypoint::new(shoulder.0, shoulder.1, conf))
            .with(Joint::LeftElbow, Keypoint::new(elbow.0, elbow.1, conf))
            .with(Joint::LeftWrist, Keypoint::new(wrist.0, wrist.1, conf))
    }

    fn pose_input(pose: PoseFrame) -> FrameInput {
        FrameInput {
            pose: Some(pose),
            ..FrameInput::default()
        }
    }

    fn rotation(scene: &SceneModel, p: &AvatarPipeline, role: BoneRole) -> UnitQuaternion<f32> {
        scene.rotation(p.bones().get(role).unwrap()).unwrap()
    }

    #[test]
    fn test_full_tracking_scenario() {
        let mut scene = SceneModel::humanoid();
        let mut p = pipeline(&scene);
        let pose = left_arm(0.9, (100.0, 100.0), (120.0, 140.0), (110.0, 180.0));
        let input = pose_input(pose.clone());
        let mut report = FrameReport::waiting();
        for _ in 0..60 {
            report = p.update(&mut scene, &input, DT);
        }
        assert_eq!(report.left_arm, RegionState::Tracked);

        let shoulder = pose.to_plane(pose.get(Joint::LeftShoulder).unwrap(), 0.0);
        let elbow = pose.to_plane(pose.get(Joint::LeftElbow).unwrap(), 0.1);
        let expected = (elbow - shoulder).normalize();
        let upper = rotation(&scene, &p, BoneRole::LeftArm);
        let aimed = upper * Vector3::new(-1.0, 0.0, 0.0);
        assert!((aimed - expected).norm() < 1e-3, "aimed={:?}", aimed);

        assert!(rotation(&scene, &p, BoneRole::LeftForeArm).angle() > 0.0);
    }

    #[test]
    fn test_confidence_loss_recovery_scenario() {
        let mut scene = SceneModel::humanoid();
        let mut p = pipeline(&scene);
        let tracked = pose_input(left_arm(0.9, (300.0, 200.0), (240.0, 215.0), (180.0, 230.0)));
        let lost = pose_input(left_arm(0.0, (300.0, 200.0), (240.0, 215.0), (180.0, 230.0)));
        for _ in 0..10 {
            p.update(&mut scene, &tracked, DT);
        }
        assert!(rotation(&scene, &p, BoneRole::LeftArm).angle() > 0.3);
        for _ in 0..30 {
            p.update(&mut scene, &lost, DT);
        }
        let rest = p.rest_pose().get(BoneRole::LeftArm);
        assert!(angle_between(&rotation(&scene, &p, BoneRole::LeftArm), &rest) < 1e-3);
        let fore_rest = p.rest_pose().get(BoneRole::LeftForeArm);
        assert!(angle_between(&rotation(&scene, &p, BoneRole::LeftForeArm), &fore_rest) < 1e-3);
    }

    #[test]
    fn test_confidence_gating_uses_fallback_rate() {
        let mut scene = SceneModel::humanoid();
        let mut p = pipeline(&scene);
        // 腕を真下へ（約 90°）
        let down = left_arm(0.9, (300.0, 200.0), (300.0, 300.0), (300.0, 400.0));
        for _ in 0..40 {
            p.update(&mut scene, &pose_input(down.clone()), DT);
        }
        let previous = rotation(&scene, &p, BoneRole::LeftArm);
        let rest = p.rest_pose().get(BoneRole::LeftArm);
        assert!(angle_between(&previous, &rest) > 1.0);

        let weak = left_arm(0.05, (300.0, 200.0), (200.0, 100.0), (100.0, 50.0));
        p.update(&mut scene, &pose_input(weak), DT);
        let expected = slerp(&previous, &rest, Config::default().idle.rate);
        assert!(angle_between(&rotation(&scene, &p, BoneRole::LeftArm), &expected) < 1e-4);
    }

    #[test]
    fn test_animation_cycling_scenario() {
        let config = Config::default();
        let ctx = AnimationContext::new(Sentiment::Positive, 0.8);
        let t = 123_456_789u64;
        let a = select_animation(&ctx, t, config.animation.cycle_ms);
        let b = select_animation(&ctx, t + 10_000, config.animation.cycle_ms);
        assert_ne!(a, b);
        assert_eq!(a, select_animation(&ctx, t - t % 10_000, config.animation.cycle_ms));
    }

    #[test]
    fn test_blink_independence_scenario() {
        let mut scene = SceneModel::humanoid();
        let mut p = pipeline(&scene);
        let input = FrameInput {
            face: Some(vec![
                NamedChannel::new(FaceChannel::EyeBlinkLeft, 0.0),
                NamedChannel::new(FaceChannel::EyeBlinkRight, 0.0),
            ]),
            ..FrameInput::default()
        };
        let mut peak = 0.0f32;
        let mut completed = false;
        for _ in 0..300 {
            p.update(&mut scene, &input, DT);
            let w = scene.morph_weight("eyeBlinkLeft").unwrap();
            if w > 0.9 {
                peak = peak.max(w);
            }
            if peak > 0.9 && w == 0.0 {
                completed = true;
            }
        }
        assert!(completed, "no full blink pulse, peak={}", peak);
    }

    #[test]
    fn test_missing_bone_tolerance() {
        let mut scene = SceneModel::humanoid().without_bone("mixamorigRightForeArm");
        let mut p = pipeline(&scene);
        assert_eq!(p.bones().get(BoneRole::RightForeArm), None);
        let pose = PoseFrame::new(640.0, 480.0)
            .with(Joint::RightShoulder, Keypoint::new(340.0, 200.0, 0.9))
            .with(Joint::RightElbow, Keypoint::new(400.0, 260.0, 0.9))
            .with(Joint::RightWrist, Keypoint::new(420.0, 200.0, 0.9))
            .with(Joint::LeftShoulder, Keypoint::new(300.0, 200.0, 0.9))
            .with(Joint::LeftElbow, Keypoint::new(240.0, 260.0, 0.9))
            .with(Joint::LeftWrist, Keypoint::new(220.0, 200.0, 0.9));
        let input = FrameInput {
            pose: Some(pose),
            head: Some(HeadRotation::new(0.1, 0.2, 0.0)),
            ..FrameInput::default()
        };
        let report = p.update(&mut scene, &input, DT);
        assert_eq!(report.right_arm, RegionState::Tracked);
        assert_eq!(report.left_arm, RegionState::Tracked);
        assert_eq!(report.head, RegionState::Tracked);
        assert!(rotation(&scene, &p, BoneRole::RightArm).angle() > 0.0);
        assert!(rotation(&scene, &p, BoneRole::LeftForeArm).angle() > 0.0);
    }

    #[test]
    fn test_rest_capture_waits_for_delay() {
        let mut scene = SceneModel::humanoid();
        let mut p = AvatarPipeline::load(
            &scene,
            &Config::default(),
            Arc::new(ClipCache::new()),
            Arc::new(JsonClipLibrary::new("/nonexistent/animations")),
        );
        let input = FrameInput {
            head: Some(HeadRotation::new(0.3, 0.0, 0.0)),
            ..FrameInput::default()
        };
        let report = p.update(&mut scene, &input, 0.5);
        assert!(!report.rest_captured);
        assert!(rotation(&scene, &p, BoneRole::Head).angle() < 1e-6);
        let report = p.update(&mut scene, &input, 0.6);
        assert!(report.rest_captured);
        assert!(p.rest_captured());
        assert_eq!(report.head, RegionState::Tracked);
    }

    #[test]
    fn test_calibrate_zeroes_neutral_face() {
        let mut scene = SceneModel::humanoid();
        let mut p = pipeline(&scene);
        let input = FrameInput {
            face: Some(vec![NamedChannel::new(FaceChannel::BrowInnerUp, 0.4)]),
            ..FrameInput::default()
        };
        p.update(&mut scene, &input, DT);
        p.calibrate();
        p.calibrate();
        assert_eq!(p.calibrator().calibrated(FaceChannel::BrowInnerUp, 0.4), 0.0);
        for _ in 0..200 {
            p.update(&mut scene, &input, DT);
        }
        assert!(scene.morph_weight("browInnerUp").unwrap() < 1e-3);
    }

    #[test]
    fn test_voice_opens_jaw() {
        let mut scene = SceneModel::humanoid();
        let mut p = pipeline(&scene);
        let input = FrameInput {
            voice: Some(0.5),
            ..FrameInput::default()
        };
        for _ in 0..30 {
            p.update(&mut scene, &input, DT);
        }
        assert!(scene.morph_weight("jawOpen").unwrap() > 0.6);
    }

    struct OfflineSource {
        online: bool,
    }

    impl PerceptionSource for OfflineSource {
        fn facial_channels(&mut self) -> Result<Option<Vec<NamedChannel>>, RetargetError> {
            if self.online {
                Ok(Some(vec![NamedChannel::new(FaceChannel::JawOpen, 0.8)]))
            } else {
                Err(RetargetError::detector_unavailable("face"))
            }
        }

        fn head_rotation(&mut self) -> Result<Option<HeadRotation>, RetargetError> {
            if self.online {
                Ok(Some(HeadRotation::new(0.0, 0.5, 0.0)))
            } else {
                Err(RetargetError::detector_unavailable("face"))
            }
        }

        fn pose_keypoints(&mut self) -> Result<Option<PoseFrame>, RetargetError> {
            Err(RetargetError::detector_unavailable("pose"))
        }
    }

    #[test]
    fn test_detector_unavailable_degrades_to_idle() {
        let mut scene = SceneModel::humanoid();
        let mut p = pipeline(&scene);
        let mut source = OfflineSource { online: true };
        for _ in 0..30 {
            let input = p.pull(&mut source);
            p.update(&mut scene, &input, DT);
        }
        assert!(rotation(&scene, &p, BoneRole::Head).angle() > 0.1);

        source.online = false;
        let mut report = FrameReport::waiting();
        for _ in 0..120 {
            let input = p.pull(&mut source);
            assert!(input.face.is_none() && input.pose.is_none());
            report = p.update(&mut scene, &input, DT);
        }
        assert_eq!(report.head, RegionState::Idle);
        assert_eq!(report.spine, RegionState::Idle);
        // 頭は待機アニメーション（レスト ∘ 呼吸）のすぐ近くまで戻る
        assert!(rotation(&scene, &p, BoneRole::Head).angle() < 0.05);
        assert!(scene.morph_weight("jawOpen").unwrap() < 1e-3);
    }

    #[test]
    fn test_reload_eases_head_in_from_rest() {
        let mut scene = SceneModel::humanoid();
        let mut p = pipeline(&scene);
        let input = FrameInput {
            head: Some(HeadRotation::new(0.0, 0.6, 0.0)),
            ..FrameInput::default()
        };
        for _ in 0..100 {
            p.update(&mut scene, &input, DT);
        }
        let (_, yaw, _) = rotation(&scene, &p, BoneRole::Head).euler_angles();
        assert!(yaw > 0.4);

        let mut other = SceneModel::humanoid();
        p.reload(&other);
        assert!(!p.rest_captured());
        p.capture_rest_pose(&other);
        p.update(&mut other, &input, DT);
        // 初回フレームの lerp 分 (0.42 * 0.2) だけ動く
        let (_, yaw, _) = rotation(&other, &p, BoneRole::Head).euler_angles();
        assert!((yaw - 0.084).abs() < 1e-4, "yaw={}", yaw);
    }

    #[test]
    fn test_mirror_swaps_sides() {
        let mut scene = SceneModel::humanoid();
        let mut config = Config::default();
        config.retarget.mirror = true;
        let mut p = AvatarPipeline::load(
            &scene,
            &config,
            Arc::new(ClipCache::new()),
            Arc::new(JsonClipLibrary::new("/nonexistent/animations")),
        );
        p.capture_rest_pose(&scene);
        let input = pose_input(left_arm(0.9, (300.0, 200.0), (240.0, 215.0), (180.0, 230.0)));
        let report = p.update(&mut scene, &input, DT);
        assert_eq!(report.left_arm, RegionState::Idle);
        assert_eq!(report.right_arm, RegionState::Tracked);
    }
}
