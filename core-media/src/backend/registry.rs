//! Explicit registry of playback engines and the extraction toolkit.
//!
//! Hosts build one registry at startup and pass it to whatever needs to pick
//! an engine. Nothing is looked up from global state.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use bridge_traits::{EngineCapabilities, MediaToolkit, PlaybackEngine};
use parking_lot::RwLock;
use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::error::{MediaError, Result};

struct Registered {
    engine: Arc<dyn PlaybackEngine>,
    initialized: Arc<OnceCell<()>>,
}

#[derive(Default)]
pub struct EngineRegistry {
    engines: RwLock<BTreeMap<String, Registered>>,
    toolkit: RwLock<Option<Arc<dyn MediaToolkit>>>,
}

impl EngineRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// # Errors
    ///
    /// [`MediaError::Validation`] for an empty or already registered name.
    pub fn register(&self, engine: Arc<dyn PlaybackEngine>) -> Result<()> {
        let name = engine.name().to_string();
        if name.trim().is_empty() {
            return Err(MediaError::Validation("engine name cannot be empty".into()));
        }

        let mut engines = self.engines.write();
        if engines.contains_key(&name) {
            return Err(MediaError::Validation(format!(
                "engine {name} is already registered"
            )));
        }

        debug!(engine = %name, caps = ?engine.capabilities(), "Engine registered");
        engines.insert(
            name,
            Registered {
                engine,
                initialized: Arc::new(OnceCell::new()),
            },
        );
        Ok(())
    }

    pub fn set_toolkit(&self, toolkit: Arc<dyn MediaToolkit>) {
        *self.toolkit.write() = Some(toolkit);
    }

    pub fn toolkit(&self) -> Option<Arc<dyn MediaToolkit>> {
        self.toolkit.read().clone()
    }

    pub fn names(&self) -> Vec<String> {
        self.engines.read().keys().cloned().collect()
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn PlaybackEngine>> {
        self.engines.read().get(name).map(|r| Arc::clone(&r.engine))
    }

    /// Look up `name` and make sure it is initialized. Initialization runs
    /// once per engine even when selected concurrently.
    pub async fn select(&self, name: &str) -> Result<Arc<dyn PlaybackEngine>> {
        let (engine, cell) = {
            let engines = self.engines.read();
            let registered = engines
                .get(name)
                .ok_or_else(|| MediaError::Validation(format!("unknown engine {name}")))?;
            (
                Arc::clone(&registered.engine),
                Arc::clone(&registered.initialized),
            )
        };

        cell.get_or_try_init(|| async {
            engine.initialize().await?;
            info!(engine = name, "Engine initialized");
            Ok::<(), MediaError>(())
        })
        .await?;

        Ok(engine)
    }

    /// First engine, by name order, whose capabilities satisfy `accept`.
    pub async fn select_matching<F>(&self, accept: F) -> Result<Arc<dyn PlaybackEngine>>
    where
        F: Fn(&EngineCapabilities) -> bool,
    {
        let name = self
            .engines
            .read()
            .iter()
            .find(|(_, r)| accept(&r.engine.capabilities()))
            .map(|(name, _)| name.clone())
            .ok_or_else(|| {
                MediaError::Validation("no registered engine has the required capabilities".into())
            })?;
        self.select(&name).await
    }
}

impl fmt::Debug for EngineRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineRegistry")
            .field("engines", &self.names())
            .field("toolkit", &self.toolkit.read().is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bridge_traits::{BridgeError, EngineChannel, OpenRequest};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Named {
        name: &'static str,
        caps: EngineCapabilities,
        inits: AtomicUsize,
        fail_init: bool,
    }

    impl Named {
        fn new(name: &'static str, caps: EngineCapabilities) -> Arc<Self> {
            Arc::new(Self {
                name,
                caps,
                inits: AtomicUsize::new(0),
                fail_init: false,
            })
        }
    }

    #[async_trait]
    impl PlaybackEngine for Named {
        fn name(&self) -> &str {
            self.name
        }

        fn capabilities(&self) -> EngineCapabilities {
            self.caps
        }

        async fn initialize(&self) -> bridge_traits::Result<()> {
            self.inits.fetch_add(1, Ordering::SeqCst);
            if self.fail_init {
                Err(BridgeError::engine(-1, "no audio device"))
            } else {
                Ok(())
            }
        }

        async fn open(&self, _request: OpenRequest) -> bridge_traits::Result<Box<dyn EngineChannel>> {
            Err(BridgeError::OperationFailed("unused".into()))
        }
    }

    #[tokio::test]
    async fn select_initializes_once() {
        let registry = EngineRegistry::new();
        let mixer = Named::new("mixer", EngineCapabilities::default());
        registry.register(mixer.clone()).unwrap();

        registry.select("mixer").await.unwrap();
        registry.select("mixer").await.unwrap();
        assert_eq!(mixer.inits.load(Ordering::SeqCst), 1);

        assert!(registry.select("missing").await.is_err());
        assert!(registry.register(Named::new("mixer", EngineCapabilities::default())).is_err());
    }

    #[tokio::test]
    async fn select_matching_uses_capabilities() {
        let registry = EngineRegistry::new();
        registry
            .register(Named::new(
                "audio",
                EngineCapabilities {
                    audio: true,
                    ..Default::default()
                },
            ))
            .unwrap();
        registry
            .register(Named::new(
                "video",
                EngineCapabilities {
                    video: true,
                    stream_selection: true,
                    ..Default::default()
                },
            ))
            .unwrap();

        let engine = registry.select_matching(|c| c.stream_selection).await.unwrap();
        assert_eq!(engine.name(), "video");
        assert!(registry.select_matching(|c| c.direct_read).await.is_err());
        assert_eq!(registry.names(), vec!["audio", "video"]);
    }

    #[tokio::test]
    async fn failed_initialization_can_be_retried() {
        let registry = EngineRegistry::new();
        let broken = Arc::new(Named {
            name: "broken",
            caps: EngineCapabilities::default(),
            inits: AtomicUsize::new(0),
            fail_init: true,
        });
        registry.register(broken.clone()).unwrap();

        assert!(registry.select("broken").await.is_err());
        assert!(registry.select("broken").await.is_err());
        assert_eq!(broken.inits.load(Ordering::SeqCst), 2);
    }
}
