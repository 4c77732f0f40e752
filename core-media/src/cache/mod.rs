//! # Cache Module
//!
//! Gates playback on local availability of an item's bytes.
//!
//! ## Overview
//!
//! A [`CacheStrategy`] copies bytes from a [`CacheSource`] (memory, reader or
//! path) into storage and drives the item's [`CacheState`]:
//!
//! ```text
//! NotCached ──cache()──> Caching ──ok──> Cached ──remove()──> NotCached
//!                           │
//!                           ├──io error / cancel──> NotCached
//!                           └──invalid source─────> Failed
//! ```
//!
//! Artifacts are found again by name ([`crate::naming::cache_file_name`]), so
//! a new process recognises what an earlier one cached.
//!
//! [`CacheState`]: core_runtime::events::CacheState

pub mod config;
pub mod file;
pub mod memory;
pub mod source;
pub mod stats;
pub mod strategy;

pub use config::CacheConfig;
pub use file::FileCacheStrategy;
pub use memory::MemoryCacheStrategy;
pub use source::CacheSource;
pub use stats::CacheStats;
pub use strategy::{CacheStrategy, CachedMedia};
