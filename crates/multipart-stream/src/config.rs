//! Binder configuration.

use multipart_stream_core::ReaderConfig;
use serde::{Deserialize, Serialize};

/// Default cumulative budget for form field values (10MB).
pub const DEFAULT_MAX_VALUES_SIZE: u64 = 10 << 20;

/// Default size of one file copy chunk.
pub const DEFAULT_CHUNK_SIZE: usize = 100_000;

/// Configuration for a [`Binder`](crate::Binder).
///
/// Zero for `max_values_size` or `chunk_size` selects the default, so a
/// config deserialized from a file may leave them out or set them to `0`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BinderConfig {
    /// Cumulative byte budget across all form field values.
    max_values_size: u64,
    /// Bytes requested per read while streaming a file part.
    chunk_size: usize,
    /// Optional cap on the size of each file part.
    max_file_size: Option<u64>,
    /// Limits for the underlying part reader.
    reader: ReaderConfig,
}

impl Default for BinderConfig {
    fn default() -> Self {
        Self {
            max_values_size: DEFAULT_MAX_VALUES_SIZE,
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_file_size: None,
            reader: ReaderConfig::default(),
        }
    }
}

impl BinderConfig {
    /// Create a new configuration with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the form value budget. Zero selects the default.
    #[must_use]
    pub fn max_values_size(mut self, size: u64) -> Self {
        self.max_values_size = size;
        self
    }

    /// Set the file copy chunk size. Zero selects the default.
    #[must_use]
    pub fn chunk_size(mut self, size: usize) -> Self {
        self.chunk_size = size;
        self
    }

    /// Cap every file part at `size` bytes.
    #[must_use]
    pub fn max_file_size(mut self, size: u64) -> Self {
        self.max_file_size = Some(size);
        self
    }

    /// Set the part reader limits.
    #[must_use]
    pub fn reader(mut self, reader: ReaderConfig) -> Self {
        self.reader = reader;
        self
    }

    /// Get the effective form value budget.
    #[must_use]
    pub fn get_max_values_size(&self) -> u64 {
        if self.max_values_size == 0 {
            DEFAULT_MAX_VALUES_SIZE
        } else {
            self.max_values_size
        }
    }

    /// Get the effective file copy chunk size.
    #[must_use]
    pub fn get_chunk_size(&self) -> usize {
        if self.chunk_size == 0 {
            DEFAULT_CHUNK_SIZE
        } else {
            self.chunk_size
        }
    }

    /// Get the per-file cap, if any.
    #[must_use]
    pub fn get_max_file_size(&self) -> Option<u64> {
        self.max_file_size
    }

    /// Get the part reader limits.
    #[must_use]
    pub fn get_reader(&self) -> &ReaderConfig {
        &self.reader
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_selects_defaults() {
        let config = BinderConfig::new().max_values_size(0).chunk_size(0);
        assert_eq!(config.get_max_values_size(), 10 * 1024 * 1024);
        assert_eq!(config.get_chunk_size(), DEFAULT_CHUNK_SIZE);
        assert_eq!(config.get_max_file_size(), None);
    }

    #[test]
    fn test_builder_setters() {
        let config = BinderConfig::new()
            .max_values_size(64)
            .chunk_size(16)
            .max_file_size(1024)
            .reader(ReaderConfig::new().max_headers(4));
        assert_eq!(config.get_max_values_size(), 64);
        assert_eq!(config.get_chunk_size(), 16);
        assert_eq!(config.get_max_file_size(), Some(1024));
        assert_eq!(config.get_reader().get_max_headers(), 4);
    }

    #[test]
    fn test_deserialize_partial_config() {
        let config: BinderConfig =
            serde_json::from_str(r#"{"max_values_size": 2048, "reader": {"read_size": 512}}"#)
                .unwrap();
        assert_eq!(config.get_max_values_size(), 2048);
        assert_eq!(config.get_chunk_size(), DEFAULT_CHUNK_SIZE);
        assert_eq!(config.get_reader().get_read_size(), 512);

        let empty: BinderConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(empty, BinderConfig::default());
    }
}
