//! Scene playback against a simulated engine.
//!
//! Run with:
//! ```bash
//! cargo run -p core-service --example scene_demo
//!
//! # JSON logs
//! cargo run -p core-service --example scene_demo -- json
//! ```

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use bridge_traits::{
    EngineCapabilities, EngineChannel, LogLevel, MediaKind, OpenRequest, PlaybackEngine,
};
use core_runtime::events::{ChannelEvent, CoreEvent};
use core_runtime::logging::{init_logging, LogFormat, LoggingConfig};
use core_service::{CoreConfig, EngineRegistry, MediaCore, MediaItem, Scene, SceneCue};
use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::info;

/// Wall-clock driven channel: position advances while playing.
struct SimulatedChannel {
    length: Duration,
    clock: Mutex<(Duration, Option<Instant>)>,
}

impl SimulatedChannel {
    fn elapsed(&self) -> Duration {
        let (base, started) = *self.clock.lock();
        let now = base + started.map(|s| s.elapsed()).unwrap_or_default();
        now.min(self.length)
    }
}

#[async_trait]
impl EngineChannel for SimulatedChannel {
    async fn play(&self) -> bridge_traits::Result<()> {
        let mut clock = self.clock.lock();
        if clock.1.is_none() {
            clock.1 = Some(Instant::now());
        }
        Ok(())
    }

    async fn pause(&self) -> bridge_traits::Result<()> {
        let position = self.elapsed();
        *self.clock.lock() = (position, None);
        Ok(())
    }

    async fn resume(&self) -> bridge_traits::Result<()> {
        self.play().await
    }

    async fn stop(&self) -> bridge_traits::Result<()> {
        *self.clock.lock() = (Duration::ZERO, None);
        Ok(())
    }

    async fn seek(&self, position: Duration) -> bridge_traits::Result<()> {
        let mut clock = self.clock.lock();
        let playing = clock.1.is_some();
        *clock = (position, playing.then(Instant::now));
        Ok(())
    }

    fn position(&self) -> Duration {
        self.elapsed()
    }

    fn length(&self) -> Option<Duration> {
        Some(self.length)
    }

    fn is_playing(&self) -> bool {
        self.clock.lock().1.is_some() && !self.is_exhausted()
    }

    fn is_exhausted(&self) -> bool {
        self.elapsed() >= self.length
    }

    async fn release(&self) -> bridge_traits::Result<()> {
        Ok(())
    }
}

struct SimulatedEngine;

#[async_trait]
impl PlaybackEngine for SimulatedEngine {
    fn name(&self) -> &str {
        "simulated"
    }

    fn capabilities(&self) -> EngineCapabilities {
        EngineCapabilities {
            audio: true,
            direct_read: true,
            ..Default::default()
        }
    }

    async fn initialize(&self) -> bridge_traits::Result<()> {
        Ok(())
    }

    async fn open(&self, _request: OpenRequest) -> bridge_traits::Result<Box<dyn EngineChannel>> {
        Ok(Box::new(SimulatedChannel {
            length: Duration::from_secs(3),
            clock: Mutex::new((Duration::ZERO, None)),
        }))
    }
}

fn track(owner: &str, path: &str) -> anyhow::Result<MediaItem> {
    Ok(MediaItem::builder(owner, path).kind(MediaKind::Audio).build()?)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let format = match std::env::args().nth(1).as_deref() {
        Some("json") => LogFormat::Json,
        Some("compact") => LogFormat::Compact,
        _ => LogFormat::Pretty,
    };
    init_logging(
        LoggingConfig::default()
            .with_format(format)
            .with_level(LogLevel::Info),
    )
    .context("logging")?;

    let root = std::env::temp_dir().join("scene-demo");
    let config = CoreConfig::builder().storage_root(&root).build()?;
    let registry = EngineRegistry::new();
    registry.register(Arc::new(SimulatedEngine))?;
    let core = MediaCore::new(config, registry)?;

    let backend = core.backend("simulated").await?;
    let scene = Scene::build(
        backend,
        &track("demo", "/demo/drums.wav")?,
        vec![
            SceneCue::new("bass", track("demo", "/demo/bass.wav")?, Duration::ZERO),
            SceneCue::new("keys", track("demo", "/demo/keys.wav")?, Duration::from_secs(1)),
        ],
    )
    .await?;

    let mut events = scene.lead().subscribe();
    scene.play().await?;

    while let Ok(event) = events.recv().await {
        match event {
            CoreEvent::Channel(ChannelEvent::TriggerFired { name, target_ms, .. }) => {
                info!(%name, target_ms, "Cue reached");
            }
            CoreEvent::Channel(ChannelEvent::Ended { .. }) => {
                info!("Lead finished");
                break;
            }
            _ => {}
        }
    }

    scene.teardown().await;
    core.shutdown().await;
    Ok(())
}
