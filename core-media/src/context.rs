//! Explicit dependency bundle handed to every component constructor.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bridge_traits::FileSystemAccess;
use core_runtime::config::CoreConfig;
use core_runtime::events::{CoreEvent, EventBus};

use crate::error::{MediaError, Result};

/// Shared handles every cache, extractor and backend needs.
///
/// There are no process-wide registries: hosts build one context and pass it
/// to each factory. Cloning is cheap.
#[derive(Clone)]
pub struct MediaContext {
    fs: Arc<dyn FileSystemAccess>,
    events: EventBus,
    storage_root: PathBuf,
}

impl MediaContext {
    /// # Errors
    ///
    /// [`MediaError::Validation`] when `storage_root` is empty.
    pub fn new(
        fs: Arc<dyn FileSystemAccess>,
        events: EventBus,
        storage_root: impl Into<PathBuf>,
    ) -> Result<Self> {
        let storage_root = storage_root.into();
        if storage_root.as_os_str().is_empty() {
            return Err(MediaError::Validation(
                "storage root directory is not set".into(),
            ));
        }
        Ok(Self {
            fs,
            events,
            storage_root,
        })
    }

    pub fn from_config(config: &CoreConfig) -> Result<Self> {
        Self::new(
            Arc::clone(&config.file_system),
            EventBus::new(config.event_buffer_size),
            config.storage_root.clone(),
        )
    }

    pub fn fs(&self) -> &Arc<dyn FileSystemAccess> {
        &self.fs
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn storage_root(&self) -> &Path {
        &self.storage_root
    }

    /// Publish without caring whether anyone listens.
    pub(crate) fn emit(&self, event: CoreEvent) {
        let _ = self.events.emit(event);
    }
}

impl fmt::Debug for MediaContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaContext")
            .field("storage_root", &self.storage_root)
            .field("events", &self.events)
            .finish()
    }
}
