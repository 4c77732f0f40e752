//! Workspace umbrella crate.
//!
//! Re-exports the media core façade from `core-service` so host applications
//! can depend on a single crate and toggle platform shims through features.

#[cfg(feature = "desktop-shims")]
pub use core_service::*;
