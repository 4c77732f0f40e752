//! # Desktop Bridge Implementations
//!
//! Default implementations of bridge traits for desktop platforms
//! (macOS, Windows, Linux).
//!
//! - `FileSystemAccess` using `tokio::fs`, rooted at the platform cache
//!   directory reported by `dirs`
//!
//! Playback engines and the extraction toolkit are native components; hosts
//! register their own adapters with the core.
//!
//! ## Usage
//!
//! ```ignore
//! use bridge_desktop::TokioFileSystem;
//! use std::sync::Arc;
//!
//! let fs = Arc::new(TokioFileSystem::new());
//! let config = CoreConfig::builder().file_system(fs).storage_root("/var/media").build()?;
//! ```

mod filesystem;

pub use filesystem::TokioFileSystem;
