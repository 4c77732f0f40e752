//! Cache statistics

use serde::{Deserialize, Serialize};

/// Snapshot of a cache strategy's contents.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheStats {
    /// Items currently mapped to an artifact
    pub entries: usize,

    /// Distinct artifacts backing those items
    pub artifacts: usize,

    /// Bytes held by the artifacts
    pub total_bytes: u64,

    /// Cache operations still running
    pub in_flight: usize,

    /// Timestamp when stats were calculated
    pub calculated_at: i64,
}

impl CacheStats {
    pub(crate) fn now() -> Self {
        Self {
            calculated_at: chrono::Utc::now().timestamp(),
            ..Self::default()
        }
    }

    /// Returns average bytes per artifact.
    pub fn average_artifact_size(&self) -> u64 {
        if self.artifacts == 0 {
            0
        } else {
            self.total_bytes / self.artifacts as u64
        }
    }

    pub fn is_idle(&self) -> bool {
        self.in_flight == 0
    }
}
