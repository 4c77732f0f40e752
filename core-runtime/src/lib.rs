//! # Core Runtime Module
//!
//! Ambient infrastructure shared by the media core crates:
//! - Configuration ([`config::CoreConfig`])
//! - Event bus and the state vocabulary carried on it ([`events`])
//! - Logging and tracing setup ([`logging`])
//!
//! Nothing here knows about caching, channels or extraction; those live in
//! `core-media` and publish through the bus defined here.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use error::{Error, Result};
