//! A minimal engine whose clock the test moves by hand.

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bridge_traits::{
    EngineCapabilities, EngineChannel, MediaKind, OpenRequest, PlaybackEngine,
};
use core_service::{CoreConfig, EngineRegistry, MediaCore, MediaItem};
use parking_lot::Mutex;

pub fn scratch(name: &str) -> PathBuf {
    std::env::temp_dir()
        .join("core-service-tests")
        .join(format!("{name}-{}", uuid::Uuid::new_v4()))
}

pub fn config(root: &PathBuf) -> CoreConfig {
    CoreConfig::builder()
        .storage_root(root.clone())
        .build()
        .expect("config")
}

pub fn item(owner: &str, path: &str) -> MediaItem {
    MediaItem::builder(owner, path)
        .kind(MediaKind::Audio)
        .build()
        .expect("item")
}

#[derive(Default)]
pub struct Clock {
    pub position_ms: AtomicU64,
    pub playing: AtomicBool,
    pub released: AtomicBool,
}

impl Clock {
    pub fn at(&self, ms: u64) {
        self.position_ms.store(ms, Ordering::SeqCst);
    }

    pub fn ms(&self) -> u64 {
        self.position_ms.load(Ordering::SeqCst)
    }

    pub fn is_playing(&self) -> bool {
        self.playing.load(Ordering::SeqCst)
    }
}

struct ClockChannel {
    clock: Arc<Clock>,
    length: Duration,
}

#[async_trait]
impl EngineChannel for ClockChannel {
    async fn play(&self) -> bridge_traits::Result<()> {
        self.clock.playing.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn pause(&self) -> bridge_traits::Result<()> {
        self.clock.playing.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn resume(&self) -> bridge_traits::Result<()> {
        self.play().await
    }

    async fn stop(&self) -> bridge_traits::Result<()> {
        self.clock.playing.store(false, Ordering::SeqCst);
        self.clock.at(0);
        Ok(())
    }

    async fn seek(&self, position: Duration) -> bridge_traits::Result<()> {
        self.clock.at(position.as_millis() as u64);
        Ok(())
    }

    fn position(&self) -> Duration {
        Duration::from_millis(self.clock.ms())
    }

    fn length(&self) -> Option<Duration> {
        Some(self.length)
    }

    fn is_playing(&self) -> bool {
        self.clock.is_playing()
    }

    fn is_exhausted(&self) -> bool {
        false
    }

    async fn release(&self) -> bridge_traits::Result<()> {
        self.clock.released.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Engine that records one [`Clock`] per opened channel, in open order.
pub struct ClockEngine {
    name: String,
    caps: EngineCapabilities,
    pub inits: AtomicUsize,
    /// How long `initialize` takes, in milliseconds.
    pub init_delay_ms: AtomicU64,
    pub clocks: Mutex<Vec<Arc<Clock>>>,
}

impl ClockEngine {
    pub fn new(name: &str, caps: EngineCapabilities) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            caps,
            inits: AtomicUsize::new(0),
            init_delay_ms: AtomicU64::new(0),
            clocks: Mutex::new(Vec::new()),
        })
    }

    /// Audio engine that streams sources itself.
    pub fn direct(name: &str) -> Arc<Self> {
        Self::new(
            name,
            EngineCapabilities {
                audio: true,
                direct_read: true,
                ..Default::default()
            },
        )
    }

    pub fn clock(&self, index: usize) -> Arc<Clock> {
        Arc::clone(&self.clocks.lock()[index])
    }
}

#[async_trait]
impl PlaybackEngine for ClockEngine {
    fn name(&self) -> &str {
        &self.name
    }

    fn capabilities(&self) -> EngineCapabilities {
        self.caps
    }

    async fn initialize(&self) -> bridge_traits::Result<()> {
        self.inits.fetch_add(1, Ordering::SeqCst);
        let delay = self.init_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        Ok(())
    }

    async fn open(&self, _request: OpenRequest) -> bridge_traits::Result<Box<dyn EngineChannel>> {
        let clock = Arc::new(Clock::default());
        self.clocks.lock().push(Arc::clone(&clock));
        Ok(Box::new(ClockChannel {
            clock,
            length: Duration::from_secs(30),
        }))
    }
}

/// A core over a registry holding `engines`.
pub fn core_with(root: &PathBuf, engines: &[Arc<ClockEngine>]) -> MediaCore {
    let registry = EngineRegistry::new();
    for engine in engines {
        registry.register(engine.clone()).expect("register");
    }
    MediaCore::new(config(root), registry).expect("core")
}

/// Poll `check` until it holds or a second passes.
pub async fn eventually<F: Fn() -> bool>(check: F) -> bool {
    for _ in 0..200 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    check()
}
