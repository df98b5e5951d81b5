//! The durable `config` key/value relation and the engine's built-in
//! defaults. Precedence: CLI-provided values override config rows, which
//! override these defaults.

use std::sync::Arc;

use crate::error::Result;
use crate::store::JobStore;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngineConfig {
    pub default_max_retries: i64,
    pub lease_seconds: i64,
    pub backoff_base: i64,
    pub poll_interval: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_max_retries: 3,
            lease_seconds: 30,
            backoff_base: 2,
            poll_interval: 1.0,
        }
    }
}

impl EngineConfig {
    /// Loads each field from the `config` table, falling back to
    /// [`EngineConfig::default`] for any key that is unset or does not
    /// parse. Unrecognized keys in the table are simply never read here.
    pub async fn load(store: &Arc<dyn JobStore>) -> Result<Self> {
        let defaults = Self::default();

        let default_max_retries = store
            .get_config("default_max_retries")
            .await?
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.default_max_retries);
        let lease_seconds = store
            .get_config("lease_seconds")
            .await?
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.lease_seconds);
        let backoff_base = store
            .get_config("backoff_base")
            .await?
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.backoff_base);
        let poll_interval = store
            .get_config("poll_interval")
            .await?
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.poll_interval);

        Ok(Self {
            default_max_retries,
            lease_seconds,
            backoff_base,
            poll_interval,
        })
    }
}
