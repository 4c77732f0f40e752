//! # Core Configuration Module
//!
//! Builder-constructed configuration shared by every media core component.
//!
//! ## Overview
//!
//! [`CoreConfig`] carries the storage root under which cache and extraction
//! artifacts live, the file system bridge used to reach it, event bus sizing
//! and feature flags. [`CoreConfigBuilder::build`] validates eagerly so that a
//! misconfigured host fails at startup instead of on the first cache call.
//!
//! ## Required Settings
//!
//! - `storage_root` - Directory that owns `media_cache/` and `extracted/`
//!
//! ## Optional Dependencies (with platform defaults)
//!
//! - `FileSystemAccess` - desktop default: `bridge_desktop::TokioFileSystem`
//!   when the `desktop-shims` feature is enabled
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::CoreConfig;
//!
//! let config = CoreConfig::builder()
//!     .storage_root("/var/lib/showrunner")
//!     .event_buffer_size(512)
//!     .enable_extraction(true)
//!     .build()?;
//! ```
//!
//! ## Error Handling
//!
//! ```should_panic
//! use core_runtime::config::CoreConfig;
//!
//! // No storage root: rejected before anything touches the disk
//! let config = CoreConfig::builder()
//!     .build()
//!     .expect("storage root is required");
//! ```

use crate::error::{Error, Result};
use crate::events::DEFAULT_EVENT_BUFFER_SIZE;
use bridge_traits::FileSystemAccess;
use std::path::PathBuf;
use std::sync::Arc;

const MAX_EVENT_BUFFER_SIZE: usize = 65_536;

/// Core configuration for the media core.
#[derive(Clone)]
pub struct CoreConfig {
    /// Root directory for every artifact the core writes
    pub storage_root: PathBuf,

    pub file_system: Arc<dyn FileSystemAccess>,

    /// Capacity of the broadcast event bus
    pub event_buffer_size: usize,

    pub features: FeatureFlags,
}

impl std::fmt::Debug for CoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreConfig")
            .field("storage_root", &self.storage_root)
            .field("file_system", &"FileSystemAccess { ... }")
            .field("event_buffer_size", &self.event_buffer_size)
            .field("features", &self.features)
            .finish()
    }
}

/// Feature flags control optional functionality.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeatureFlags {
    /// Allow stream extraction for engines without stream selection
    /// (requires a toolkit to be registered)
    pub enable_extraction: bool,

    /// Keep cached bytes in memory instead of on disk
    pub enable_memory_cache: bool,
}

impl Default for FeatureFlags {
    fn default() -> Self {
        Self {
            enable_extraction: true,
            enable_memory_cache: false,
        }
    }
}

impl CoreConfig {
    /// Creates a new builder for constructing a `CoreConfig`.
    pub fn builder() -> CoreConfigBuilder {
        CoreConfigBuilder::default()
    }

    /// Validates the configuration and returns an error if invalid.
    pub fn validate(&self) -> Result<()> {
        if self.storage_root.as_os_str().is_empty() {
            return Err(Error::Config("Storage root cannot be empty".to_string()));
        }

        if self.event_buffer_size == 0 {
            return Err(Error::Config(
                "Event buffer size must be greater than 0".to_string(),
            ));
        }

        if self.event_buffer_size > MAX_EVENT_BUFFER_SIZE {
            return Err(Error::Config(format!(
                "Event buffer size exceeds maximum of {}",
                MAX_EVENT_BUFFER_SIZE
            )));
        }

        Ok(())
    }
}

#[cfg(feature = "desktop-shims")]
fn provide_default_file_system(storage_root: &std::path::Path) -> Result<Arc<dyn FileSystemAccess>> {
    use bridge_desktop::TokioFileSystem;

    let fs: Arc<dyn FileSystemAccess> = Arc::new(TokioFileSystem::with_cache_dir(storage_root));
    Ok(fs)
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_file_system(_storage_root: &std::path::Path) -> Result<Arc<dyn FileSystemAccess>> {
    Err(Error::CapabilityMissing {
        capability: "FileSystemAccess".to_string(),
        message: "A FileSystemAccess implementation is required to store cache and extraction artifacts. \
                 Desktop: enable the 'desktop-shims' feature to use TokioFileSystem. \
                 Other hosts: inject a sandbox-aware implementation."
            .to_string(),
    })
}

/// Builder for constructing [`CoreConfig`] instances.
#[derive(Default)]
pub struct CoreConfigBuilder {
    storage_root: Option<PathBuf>,
    file_system: Option<Arc<dyn FileSystemAccess>>,
    event_buffer_size: Option<usize>,
    features: FeatureFlags,
}

impl CoreConfigBuilder {
    /// Sets the storage root.
    ///
    /// ```
    /// use core_runtime::config::CoreConfig;
    ///
    /// let builder = CoreConfig::builder().storage_root("/tmp/media");
    /// ```
    pub fn storage_root<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.storage_root = Some(path.into());
        self
    }

    /// Sets the file system access implementation.
    pub fn file_system(mut self, fs: Arc<dyn FileSystemAccess>) -> Self {
        self.file_system = Some(fs);
        self
    }

    /// Default: [`DEFAULT_EVENT_BUFFER_SIZE`]
    pub fn event_buffer_size(mut self, size: usize) -> Self {
        self.event_buffer_size = Some(size);
        self
    }

    pub fn enable_extraction(mut self, enabled: bool) -> Self {
        self.features.enable_extraction = enabled;
        self
    }

    pub fn enable_memory_cache(mut self, enabled: bool) -> Self {
        self.features.enable_memory_cache = enabled;
        self
    }

    pub fn features(mut self, features: FeatureFlags) -> Self {
        self.features = features;
        self
    }

    /// Builds and validates the final `CoreConfig`.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] when the storage root is missing or a value is out of range
    /// - [`Error::CapabilityMissing`] when no file system is provided and no
    ///   platform default is compiled in
    pub fn build(self) -> Result<CoreConfig> {
        let storage_root = self.storage_root.ok_or_else(|| {
            Error::Config("Storage root is required. Use .storage_root() to set it.".to_string())
        })?;

        let file_system = match self.file_system {
            Some(fs) => fs,
            None => provide_default_file_system(&storage_root)?,
        };

        let config = CoreConfig {
            storage_root,
            file_system,
            event_buffer_size: self.event_buffer_size.unwrap_or(DEFAULT_EVENT_BUFFER_SIZE),
            features: self.features,
        };

        config.validate()?;

        Ok(config)
    }
}
