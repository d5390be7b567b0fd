//! Output cache configuration.

use std::num::NonZeroUsize;
use std::time::Duration;

pub const DEFAULT_TTL_SECS: u64 = 60;
pub const DEFAULT_CAPACITY: usize = 1024;
/// Responses with larger bodies are passed through without being stored.
pub const DEFAULT_MAX_BODY_BYTES: usize = 1024 * 1024;

#[derive(Debug, Clone)]
pub struct OutputCacheConfig {
    pub enabled: bool,
    /// Fixed lifetime of an entry from insertion. Reads never extend it.
    pub ttl: Duration,
    pub capacity: usize,
    pub max_body_bytes: usize,
}

impl Default for OutputCacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl: Duration::from_secs(DEFAULT_TTL_SECS),
            capacity: DEFAULT_CAPACITY,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }
}

impl From<&crate::config::OutputCacheSettings> for OutputCacheConfig {
    fn from(settings: &crate::config::OutputCacheSettings) -> Self {
        Self {
            enabled: settings.enabled,
            ttl: settings.ttl,
            capacity: settings.capacity.get(),
            ..Default::default()
        }
    }
}

impl OutputCacheConfig {
    /// Capacity as NonZeroUsize, clamping to 1 if zero.
    pub fn capacity_non_zero(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.capacity).unwrap_or(NonZeroUsize::MIN)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_values() {
        let config = OutputCacheConfig::default();
        assert!(config.enabled);
        assert_eq!(config.ttl, Duration::from_secs(60));
        assert_eq!(config.capacity, 1024);
    }

    #[test]
    fn capacity_clamps_to_min() {
        let config = OutputCacheConfig {
            capacity: 0,
            ..Default::default()
        };
        assert_eq!(config.capacity_non_zero().get(), 1);
    }
}
