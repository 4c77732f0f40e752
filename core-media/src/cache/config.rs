//! Cache configuration

use std::time::Duration;

/// Configuration shared by the cache strategies.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Directory under the storage root that holds cache artifacts
    pub cache_directory: String,

    /// Bytes copied per loop iteration; progress is reported after each chunk
    pub chunk_size: usize,

    /// How often progress events are sampled and published
    pub progress_interval: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            cache_directory: "media_cache".to_string(),
            chunk_size: 64 * 1024,
            progress_interval: Duration::from_millis(100),
        }
    }
}

impl CacheConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cache_directory(mut self, dir: impl Into<String>) -> Self {
        self.cache_directory = dir.into();
        self
    }

    pub fn with_chunk_size(mut self, bytes: usize) -> Self {
        self.chunk_size = bytes;
        self
    }

    pub fn with_progress_interval(mut self, interval: Duration) -> Self {
        self.progress_interval = interval;
        self
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.cache_directory.trim().is_empty() {
            return Err("cache_directory cannot be empty".to_string());
        }

        if self.chunk_size == 0 {
            return Err("chunk_size must be greater than 0".to_string());
        }

        if self.progress_interval.is_zero() {
            return Err("progress_interval must be greater than 0".to_string());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = CacheConfig::default();
        assert_eq!(config.cache_directory, "media_cache");
        assert_eq!(config.chunk_size, 65_536);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_builder() {
        let config = CacheConfig::new()
            .with_cache_directory("clips")
            .with_chunk_size(4096)
            .with_progress_interval(Duration::from_millis(10));

        assert_eq!(config.cache_directory, "clips");
        assert_eq!(config.chunk_size, 4096);
        assert_eq!(config.progress_interval, Duration::from_millis(10));
    }

    #[test]
    fn test_config_validation() {
        assert!(CacheConfig::default()
            .with_cache_directory("  ")
            .validate()
            .is_err());
        assert!(CacheConfig::default().with_chunk_size(0).validate().is_err());
        assert!(CacheConfig::default()
            .with_progress_interval(Duration::ZERO)
            .validate()
            .is_err());
    }
}
