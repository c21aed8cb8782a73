//! Session configuration.
//!
//! All fields have defaults, so a JSON document only needs the keys it
//! overrides:
//!
//! ```
//! use netconf_engine::SessionConfig;
//!
//! let config = SessionConfig::from_json_str(r#"{ "max_chunk_size": 1048576 }"#).unwrap();
//! assert_eq!(config.max_chunk_size, 1 << 20);
//! assert_eq!(config.outbound_chunk_size, SessionConfig::default().outbound_chunk_size);
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{NetconfError, Result};
use crate::protocol::{DEFAULT_MAX_CHUNK_SIZE, DEFAULT_OUTBOUND_CHUNK_SIZE, DEFAULT_READ_BUFFER_SIZE};
use crate::writer::{
    WriterConfig, DEFAULT_BACKPRESSURE_TIMEOUT, DEFAULT_CHANNEL_CAPACITY,
    DEFAULT_MAX_PENDING_FRAMES,
};

/// Tunables for one session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SessionConfig {
    /// Largest inbound chunk accepted in chunked framing.
    pub max_chunk_size: u32,
    /// Chunk size used when framing outbound messages.
    pub outbound_chunk_size: usize,
    /// Size of the read buffer of the read loop.
    pub read_buffer_size: usize,
    /// Outbound messages queued before senders wait.
    pub max_pending_frames: usize,
    /// Capacity of the writer channel.
    pub channel_capacity: usize,
    /// How long a sender waits for the outbound queue to drain.
    pub backpressure_timeout_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_chunk_size: DEFAULT_MAX_CHUNK_SIZE,
            outbound_chunk_size: DEFAULT_OUTBOUND_CHUNK_SIZE,
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            max_pending_frames: DEFAULT_MAX_PENDING_FRAMES,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            backpressure_timeout_ms: DEFAULT_BACKPRESSURE_TIMEOUT.as_millis() as u64,
        }
    }
}

impl SessionConfig {
    /// Load a configuration from JSON.
    ///
    /// # Errors
    ///
    /// Returns [`NetconfError::Json`] for malformed JSON or unknown keys and
    /// [`NetconfError::Protocol`] for out-of-range values.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: SessionConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Check that every limit is usable.
    pub fn validate(&self) -> Result<()> {
        let zero = [
            ("max_chunk_size", self.max_chunk_size as usize),
            ("outbound_chunk_size", self.outbound_chunk_size),
            ("read_buffer_size", self.read_buffer_size),
            ("max_pending_frames", self.max_pending_frames),
            ("channel_capacity", self.channel_capacity),
        ]
        .into_iter()
        .find(|(_, value)| *value == 0);

        match zero {
            Some((name, _)) => Err(NetconfError::Protocol(format!("{} must be positive", name))),
            None => Ok(()),
        }
    }

    /// Backpressure timeout as a [`Duration`].
    pub fn backpressure_timeout(&self) -> Duration {
        Duration::from_millis(self.backpressure_timeout_ms)
    }

    pub(crate) fn writer_config(&self) -> WriterConfig {
        WriterConfig {
            max_pending_frames: self.max_pending_frames,
            channel_capacity: self.channel_capacity,
            backpressure_timeout: self.backpressure_timeout(),
            outbound_chunk_size: self.outbound_chunk_size,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SessionConfig::default();
        assert_eq!(config.max_chunk_size, DEFAULT_MAX_CHUNK_SIZE);
        assert_eq!(config.backpressure_timeout(), DEFAULT_BACKPRESSURE_TIMEOUT);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json() {
        let config = SessionConfig::from_json_str(
            r#"{ "outbound_chunk_size": 512, "backpressure_timeout_ms": 250 }"#,
        )
        .unwrap();
        assert_eq!(config.outbound_chunk_size, 512);
        assert_eq!(config.backpressure_timeout(), Duration::from_millis(250));
        assert_eq!(config.channel_capacity, DEFAULT_CHANNEL_CAPACITY);
    }

    #[test]
    fn test_unknown_key_rejected() {
        let err = SessionConfig::from_json_str(r#"{ "max_chunks": 1 }"#).unwrap_err();
        assert!(matches!(err, NetconfError::Json(_)));
    }

    #[test]
    fn test_zero_limit_rejected() {
        let err = SessionConfig::from_json_str(r#"{ "channel_capacity": 0 }"#).unwrap_err();
        assert!(err.to_string().contains("channel_capacity"));
    }

    #[test]
    fn test_json_roundtrip() {
        let config = SessionConfig {
            max_chunk_size: 4096,
            ..SessionConfig::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        assert_eq!(SessionConfig::from_json_str(&json).unwrap(), config);
    }
}
