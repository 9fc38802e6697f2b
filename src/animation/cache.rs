use std::collections::{HashMap, HashSet};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, warn};

use crate::error::RetargetError;

use super::clip::{AnimationClip, ClipSource};

/// クリップ名をキーにした共有キャッシュ
///
/// 同じクリップライブラリを使うアバター間で共有する。読み取りが大半なので RwLock。
/// 同じキーへの挿入は最初の書き込みが勝ち、後続はそれを使い回す。
#[derive(Default)]
pub struct ClipCache {
    clips: RwLock<HashMap<String, Arc<AnimationClip>>>,
    warned: Mutex<HashSet<String>>,
}

impl ClipCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<Arc<AnimationClip>> {
        self.clips.read().get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.clips.read().contains_key(name)
    }

    /// 挿入して、実際にキャッシュに入っているクリップを返す
    pub fn insert(&self, clip: AnimationClip) -> Arc<AnimationClip> {
        let mut clips = self.clips.write();
        clips
            .entry(clip.name.clone())
            .or_insert_with(|| Arc::new(clip))
            .clone()
    }

    pub fn len(&self) -> usize {
        self.clips.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.clips.read().is_empty()
    }

    /// クリップ読み込み失敗の警告はクリップ名ごとにプロセス中一度だけ
    pub fn warn_once(&self, clip: &str, error: &RetargetError) -> bool {
        if self.warned.lock().insert(clip.to_string()) {
            warn!("{}; using procedural clip", error);
            true
        } else {
            false
        }
    }
}

/// 読み込み要求の目的
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadPurpose {
    /// 文脈バージョン付きの再生要求
    Play(u64),
    /// 先読み（失敗は握りつぶす）
    Preload,
}

#[derive(Debug, Clone)]
pub struct LoadTicket {
    pub name: String,
    pub purpose: LoadPurpose,
}

#[derive(Debug)]
pub struct LoadResult {
    pub ticket: LoadTicket,
    pub result: Result<Arc<AnimationClip>, RetargetError>,
}

/// バックグラウンドのクリップローダー
///
/// 要求は即座に返り、結果は毎フレーム `try_recv` で受け取る。
/// 取り消しは無く、古い要求の結果は受け取り側がバージョンで捨てる。
pub struct ClipLoader {
    requests: Sender<LoadTicket>,
    results: Receiver<LoadResult>,
    _handle: thread::JoinHandle<()>,
}

impl ClipLoader {
    pub fn start(source: Arc<dyn ClipSource>, cache: Arc<ClipCache>) -> Self {
        let (request_tx, request_rx) = mpsc::channel::<LoadTicket>();
        let (result_tx, result_rx) = mpsc::channel::<LoadResult>();

        let handle = thread::spawn(move || {
            for ticket in request_rx {
                let result = match cache.get(&ticket.name) {
                    Some(clip) => Ok(clip),
                    None => source.load(&ticket.name).map(|clip| cache.insert(clip)),
                };
                debug!(clip = %ticket.name, ok = result.is_ok(), "clip load finished");
                if result_tx.send(LoadResult { ticket, result }).is_err() {
                    break;
                }
            }
        });

        Self {
            requests: request_tx,
            results: result_rx,
            _handle: handle,
        }
    }

    pub fn request(&self, name: &str, purpose: LoadPurpose) {
        let ticket = LoadTicket {
            name: name.to_string(),
            purpose,
        };
        if self.requests.send(ticket).is_err() {
            warn!(clip = %name, "clip loader thread is gone");
        }
    }

    pub fn try_recv(&self) -> Option<LoadResult> {
        self.results.try_recv().ok()
    }
}
