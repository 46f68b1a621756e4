//! Session configuration

use std::time::Duration;

/// Tunables for a [`crate::Session`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// How long to wait for the server greeting before giving up.
    pub open_timeout: Duration,
    /// How long `DONE` may take to be answered after an IDLE is terminated.
    pub idle_response_timeout: Duration,
    /// Ceiling for a single response unit (line plus literals), in bytes.
    /// Protects against a malicious or broken server growing the read
    /// buffer without bound.
    pub max_response_size: u32,
    /// Prefix for generated command tags. Tags are `<prefix><counter>`,
    /// with the counter zero-padded to four digits.
    pub tag_prefix: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            open_timeout: Duration::from_secs(30),
            idle_response_timeout: Duration::from_secs(5),
            max_response_size: 512 * 1024 * 1024,
            tag_prefix: "A".into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SessionConfig::default();

        assert_eq!(config.open_timeout, Duration::from_secs(30));
        assert_eq!(config.idle_response_timeout, Duration::from_secs(5));
        assert_eq!(config.max_response_size, 512 * 1024 * 1024);
    }
}
