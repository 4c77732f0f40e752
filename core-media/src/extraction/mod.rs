//! # Stream Extraction
//!
//! Turns one embedded stream of a multiplexed container into a standalone
//! artifact named `{pathTitle}.{kind}{index}.{container}`.
//!
//! ```text
//! NotExtracted ──extract()──> Extracting ──ok──> Extracted ──remove()──> NotExtracted
//!                                  └──error / cancel──> NotExtracted
//! ```

pub mod config;
pub mod pipeline;
pub mod service;

pub use config::{ExtractionConfig, DEFAULT_QUEUE_CAPACITY};
pub use pipeline::{ExtractionPipeline, PipelineStats};
pub use service::StreamExtractor;
