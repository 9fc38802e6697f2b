use anyhow::Result;
use std::sync::Arc;
use std::time::{Duration, Instant};
use talava_retarget::animation::{ClipCache, JsonClipLibrary};
use talava_retarget::capture::CaptureReplay;
use talava_retarget::config::Config;
use talava_retarget::scene::SceneModel;
use talava_retarget::skeleton::Skeleton;
use talava_retarget::tracker::RegionState;
use talava_retarget::vmc::VmcClient;
use talava_retarget::AvatarPipeline;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const CONFIG_PATH: &str = "config.toml";

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    info!("talava-retarget {}", env!("GIT_VERSION"));
    let config = Config::load_or_default(CONFIG_PATH);

    let capture_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| config.app.capture_path.clone());

    let mut scene = match &config.app.avatar_path {
        Some(path) => SceneModel::load(path)?,
        None => SceneModel::humanoid(),
    };
    info!(bones = scene.bone_names().len(), "avatar loaded");

    let cache = Arc::new(ClipCache::new());
    let clips = Arc::new(JsonClipLibrary::new(&config.animation.clip_dir));
    let mut pipeline = AvatarPipeline::load(&scene, &config, cache, clips);

    let mut replay = CaptureReplay::load(&capture_path)?;
    info!(frames = replay.len(), path = %capture_path, "capture loaded");

    let client = if config.vmc.enabled {
        let client = VmcClient::new(&config.vmc.addr)?;
        info!(addr = client.target_addr(), "sending VMC");
        Some(client)
    } else {
        None
    };

    let frame_duration = Duration::from_secs_f64(1.0 / config.app.target_fps.max(1) as f64);
    let mut frame_count: u64 = 0;
    let mut tracked_frames: u64 = 0;
    let mut send_errors: u64 = 0;

    loop {
        let loop_start = Instant::now();

        // 借用を切るため必要な値だけ先に取り出す
        let (dt, calibrate, emotion) = match replay.advance() {
            Some(frame) => (
                frame.dt,
                frame.calibrate,
                frame.emotion.as_ref().map(|e| (e.sentiment, e.intensity)),
            ),
            None => break,
        };

        if let Some((sentiment, intensity)) = emotion {
            if intensity > 0.0 {
                pipeline.set_emotion(Some((sentiment, intensity)));
            } else {
                pipeline.set_emotion(None);
            }
        }

        let input = pipeline.pull(&mut replay);
        let report = pipeline.update(&mut scene, &input, dt);
        if calibrate {
            pipeline.calibrate();
        }
        if report.head == RegionState::Tracked {
            tracked_frames += 1;
        }

        if let Some(client) = &client {
            if let Err(e) = client.send_scene(&scene) {
                // 受信側が居ないだけのことが多いので最初の 1 回だけ出す
                if send_errors == 0 {
                    warn!("VMC send failed: {}", e);
                }
                send_errors += 1;
            }
        }
        frame_count += 1;

        // FPS上限制御
        let elapsed = loop_start.elapsed();
        if elapsed < frame_duration {
            std::thread::sleep(frame_duration - elapsed);
        }
    }

    info!(
        frames = frame_count,
        head_tracked = tracked_frames,
        dropped_categories = replay.dropped_categories(),
        send_errors,
        animation = pipeline.animation().current().unwrap_or("-"),
        "replay finished"
    );
    Ok(())
}
