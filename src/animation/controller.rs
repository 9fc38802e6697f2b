use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::AnimationConfig;

use super::cache::{ClipCache, ClipLoader, LoadPurpose, LoadResult};
use super::clip::{AnimationClip, ClipSource};
use super::context::{likely_next, select_animation, AnimationContext};
use super::mixer::{AnimationLayer, AnimationMixer, ClipMixer};

/// 文脈 → クリップ選択 → 読み込み → ミキサー再生
///
/// 読み込みはローダースレッドで行い、結果は `poll` で取り込む。
/// 結果を適用する前に文脈バージョンを照合し、その後に文脈が変わっていれば捨てる。
pub struct AnimationController<M: AnimationMixer = ClipMixer> {
    mixer: M,
    cache: Arc<ClipCache>,
    loader: ClipLoader,
    idle: Arc<AnimationClip>,
    version: u64,
    pending: Option<String>,
    cycle_ms: u64,
    loop_threshold: f32,
    preload: bool,
}

impl<M: AnimationMixer> AnimationController<M> {
    pub fn new(
        mixer: M,
        cache: Arc<ClipCache>,
        source: Arc<dyn ClipSource>,
        config: &AnimationConfig,
    ) -> Self {
        let idle = cache.insert(AnimationClip::idle());
        let loader = ClipLoader::start(source, cache.clone());
        Self {
            mixer,
            cache,
            loader,
            idle,
            version: 0,
            pending: None,
            cycle_ms: config.cycle_ms,
            loop_threshold: config.loop_threshold,
            preload: config.preload,
        }
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    /// 読み込み待ちのクリップ
    pub fn pending(&self) -> Option<&str> {
        self.pending.as_deref()
    }

    pub fn current(&self) -> Option<&str> {
        self.mixer.current()
    }

    pub fn mixer(&self) -> &M {
        &self.mixer
    }

    /// 待機ループを再生する
    pub fn start_idle(&mut self) {
        let idle = self.idle.clone();
        if let Err(e) = self.mixer.play(idle, 0.0, true) {
            warn!("{}; mixer stopped", e);
            self.mixer.stop_all();
        }
    }

    /// 文脈が変わったときに呼ぶ。選んだクリップキーを返す
    ///
    /// キャッシュにあれば即座に再生し、無ければ読み込みを要求して
    /// 完了までは今のクリップを続ける。
    pub fn apply(&mut self, context: &AnimationContext, now_ms: u64) -> &'static str {
        let key = select_animation(context, now_ms, self.cycle_ms);
        self.version += 1;
        debug!(
            clip = key,
            version = self.version,
            previous = %context.previous_state_key,
            "animation context changed"
        );

        if self.mixer.current() == Some(key) {
            self.pending = None;
        } else if let Some(clip) = self.cache.get(key) {
            self.pending = None;
            self.start(clip);
        } else {
            self.pending = Some(key.to_string());
            self.loader.request(key, LoadPurpose::Play(self.version));
        }

        if self.preload {
            for name in likely_next(context.sentiment) {
                if *name != key && !self.cache.contains(name) {
                    self.loader.request(name, LoadPurpose::Preload);
                }
            }
        }
        key
    }

    /// ローダーの結果を取り込む（毎フレーム、ブロックしない）
    pub fn poll(&mut self) {
        while let Some(result) = self.loader.try_recv() {
            self.receive(result);
        }
    }

    fn receive(&mut self, LoadResult { ticket, result }: LoadResult) {
        let version = match ticket.purpose {
            LoadPurpose::Preload => {
                if let Err(e) = result {
                    debug!(clip = %ticket.name, "preload failed: {}", e);
                }
                return;
            }
            LoadPurpose::Play(v) => v,
        };
        if version != self.version {
            debug!(clip = %ticket.name, version, current = self.version, "stale clip discarded");
            return;
        }
        self.pending = None;
        let clip = match result {
            Ok(clip) => clip,
            Err(e) => {
                self.cache.warn_once(&ticket.name, &e);
                self.cache.insert(AnimationClip::procedural(&ticket.name))
            }
        };
        self.start(clip);
    }

    fn start(&mut self, clip: Arc<AnimationClip>) {
        let looping = clip.is_looping(self.loop_threshold);
        let blend_in = clip.blend_in();
        let name = clip.name.clone();
        let procedural = clip.procedural;
        match self.mixer.play(clip, blend_in, looping) {
            Ok(()) => info!(clip = %name, looping, procedural, "animation started"),
            Err(e) => {
                warn!("{}; falling back to idle loop", e);
                let idle = self.idle.clone();
                let blend = idle.blend_in();
                if let Err(e) = self.mixer.play(idle, blend, true) {
                    warn!("{}; mixer stopped", e);
                    self.mixer.stop_all();
                }
            }
        }
    }

    pub fn advance(&mut self, dt: f32) {
        self.mixer.advance(dt);
    }

    pub fn layer(&self) -> AnimationLayer {
        self.mixer.sample()
    }
}
