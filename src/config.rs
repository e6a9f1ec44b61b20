//! Node configuration.

use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;
use crate::id::{hash_content, Key};

/// Default capacity of a routing bucket.
pub const BUCKET_SIZE: usize = 16;

/// Default number of buckets a routing table may open.
pub const MAX_BUCKETS: usize = 10;

/// Default number of peers contacted per hop.
pub const FANOUT: usize = 2;

/// Default per-request timeout for peer round trips, in milliseconds.
pub const REQUEST_TIMEOUT_MS: u64 = 5_000;

/// Default bound on each store fan-out branch, in milliseconds.
pub const REPLICATION_TIMEOUT_MS: u64 = 10_000;

/// Default depth of a peer actor's inbox.
pub const MAILBOX_CAPACITY: usize = 256;

/// Predicate a key must satisfy before a record is accepted.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyCheck {
    /// The key must equal the hash of its own bytes: `key == Hash(key)`.
    ///
    /// A digest essentially never has a fixed point, so under this policy
    /// practically every store is rejected. It is kept as the default until
    /// the intended predicate is settled.
    #[default]
    SelfDigest,
    /// The key must equal the hash of the value (content addressing).
    ValueDigest,
    /// Accept every key. Intended for hand-built topologies in tests.
    Disabled,
}

impl KeyCheck {
    /// Returns `true` if `(key, value)` passes this check.
    pub fn accepts(self, key: &Key, value: &[u8]) -> bool {
        match self {
            KeyCheck::SelfDigest => hash_content(key) == *key,
            KeyCheck::ValueDigest => hash_content(value) == *key,
            KeyCheck::Disabled => true,
        }
    }
}

/// Per-peer settings.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DhtConfig {
    /// Maximum contacts per bucket.
    ///
    /// Defaults to [BUCKET_SIZE]
    pub bucket_size: usize,
    /// Maximum number of buckets. Together with `bucket_size` this bounds the
    /// routing table.
    ///
    /// Defaults to [MAX_BUCKETS]
    pub max_buckets: usize,
    /// How many of the nearest peers each hop forwards to.
    ///
    /// Lower values send fewer messages; higher values make it more likely
    /// that the true owner of a key is reached through an incomplete view.
    ///
    /// Defaults to [FANOUT]
    pub fanout: usize,
    /// Timeout for a single peer round trip.
    ///
    /// Defaults to [REQUEST_TIMEOUT_MS]
    pub request_timeout_ms: u64,
    /// Upper bound for waiting on a store's downstream branches.
    ///
    /// Defaults to [REPLICATION_TIMEOUT_MS]
    pub replication_timeout_ms: u64,
    /// Key predicate applied on every store.
    pub key_check: KeyCheck,
    /// Depth of the actor inbox when the peer runs inside an overlay.
    ///
    /// Defaults to [MAILBOX_CAPACITY]
    pub mailbox_capacity: usize,
}

impl Default for DhtConfig {
    fn default() -> Self {
        Self {
            bucket_size: BUCKET_SIZE,
            max_buckets: MAX_BUCKETS,
            fanout: FANOUT,
            request_timeout_ms: REQUEST_TIMEOUT_MS,
            replication_timeout_ms: REPLICATION_TIMEOUT_MS,
            key_check: KeyCheck::default(),
            mailbox_capacity: MAILBOX_CAPACITY,
        }
    }
}

impl DhtConfig {
    /// Parse a configuration from JSON. Missing fields take their defaults.
    pub fn from_json_str(input: &str) -> Result<Self, ConfigError> {
        let config: DhtConfig = serde_json::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the traversal cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bucket_size == 0 {
            return Err(ConfigError::Zero("bucket_size"));
        }
        if self.max_buckets == 0 {
            return Err(ConfigError::Zero("max_buckets"));
        }
        if self.fanout == 0 {
            return Err(ConfigError::Zero("fanout"));
        }
        if self.request_timeout_ms == 0 {
            return Err(ConfigError::Zero("request_timeout_ms"));
        }
        if self.replication_timeout_ms == 0 {
            return Err(ConfigError::Zero("replication_timeout_ms"));
        }
        if self.mailbox_capacity == 0 {
            return Err(ConfigError::Zero("mailbox_capacity"));
        }
        Ok(())
    }

    pub fn with_fanout(mut self, fanout: usize) -> Self {
        self.fanout = fanout;
        self
    }

    pub fn with_key_check(mut self, key_check: KeyCheck) -> Self {
        self.key_check = key_check;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn replication_timeout(&self) -> Duration {
        Duration::from_millis(self.replication_timeout_ms)
    }

    /// Upper bound on routing table entries, self included.
    pub fn table_capacity(&self) -> usize {
        self.bucket_size.saturating_mul(self.max_buckets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_constants() {
        let config = DhtConfig::default();
        assert_eq!(config.bucket_size, 16);
        assert_eq!(config.fanout, 2);
        assert_eq!(config.key_check, KeyCheck::SelfDigest);
        assert_eq!(config.table_capacity(), 160);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn json_overrides_only_given_fields() {
        let config = DhtConfig::from_json_str(r#"{"fanout": 3, "key_check": "value_digest"}"#)
            .expect("valid config");
        assert_eq!(config.fanout, 3);
        assert_eq!(config.key_check, KeyCheck::ValueDigest);
        assert_eq!(config.bucket_size, BUCKET_SIZE);
        assert_eq!(config.request_timeout(), Duration::from_millis(REQUEST_TIMEOUT_MS));
    }

    #[test]
    fn json_rejects_zero_and_unknown_fields() {
        assert!(matches!(
            DhtConfig::from_json_str(r#"{"fanout": 0}"#),
            Err(ConfigError::Zero("fanout"))
        ));
        assert!(matches!(
            DhtConfig::from_json_str(r#"{"alpha": 3}"#),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn oversized_timeout_saturates() {
        let config = DhtConfig::default().with_request_timeout(Duration::MAX);
        assert_eq!(config.request_timeout_ms, u64::MAX);
    }

    #[test]
    fn key_checks() {
        let value = b"payload";
        let content_key = hash_content(value);

        assert!(!KeyCheck::SelfDigest.accepts(&content_key, value));
        assert!(KeyCheck::ValueDigest.accepts(&content_key, value));
        assert!(!KeyCheck::ValueDigest.accepts(&content_key, b"other"));
        assert!(KeyCheck::Disabled.accepts(&[0u8; 32], value));
    }
}
