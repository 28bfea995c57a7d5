//! Server runtime configuration.

use std::path::PathBuf;

use alcove_core::{DEFAULT_ACCESS_TTL_SECS, DEFAULT_CHALLENGE_TTL_SECS, DEFAULT_REFRESH_TTL_SECS};

/// Configuration for the production runtime.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Address to bind to (e.g., "0.0.0.0:8080").
    pub bind_address: String,
    /// Directory for durable storage. In-memory (non-persistent) when
    /// absent.
    pub data_dir: Option<PathBuf>,
    /// Access-token lifetime in seconds.
    pub access_ttl_secs: u64,
    /// Refresh-token lifetime in seconds.
    pub refresh_ttl_secs: u64,
    /// Challenge validity window in seconds.
    pub challenge_ttl_secs: u64,
    /// When true, access-token validation also consults the
    /// family-revocation marker and suspension state, invalidating issued
    /// access tokens before natural expiry at the cost of a store read.
    pub strict_revocation: bool,
    /// Access-token signing secret. When `None` an ephemeral secret is
    /// generated at startup and tokens do not survive restarts.
    pub jwt_secret: Option<Vec<u8>>,
    /// Interval between expired-record sweeps, in seconds.
    pub sweep_interval_secs: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            data_dir: None,
            access_ttl_secs: DEFAULT_ACCESS_TTL_SECS,
            refresh_ttl_secs: DEFAULT_REFRESH_TTL_SECS,
            challenge_ttl_secs: DEFAULT_CHALLENGE_TTL_SECS,
            strict_revocation: false,
            jwt_secret: None,
            sweep_interval_secs: 60,
        }
    }
}
