use std::time::Duration;

use crate::error::EngineError;

pub const DEFAULT_RECONCILE_DELAY: Duration = Duration::from_millis(2000);
/// The store's ceiling on values in one `in` filter.
pub const DEFAULT_VARIANT_BATCH_SIZE: usize = 30;
pub const DEFAULT_COPY_SUFFIX: &str = " (copy)";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// How long after an acknowledged mutation the catalog is re-fetched.
    pub reconcile_delay: Duration,
    /// Max style ids per batched variant or added-style read.
    pub variant_batch_size: usize,
    /// Appended to name and display name of copied styles.
    pub copy_suffix: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            reconcile_delay: DEFAULT_RECONCILE_DELAY,
            variant_batch_size: DEFAULT_VARIANT_BATCH_SIZE,
            copy_suffix: DEFAULT_COPY_SUFFIX.to_string(),
        }
    }
}

impl EngineConfig {
    /// Reads `STYLEBOOK_*` variables (a `.env` file is honoured), falling
    /// back to defaults for anything unset.
    pub fn from_env() -> Result<Self, EngineError> {
        dotenvy::dotenv().ok();

        let config = Self {
            reconcile_delay: Duration::from_millis(env_parse(
                "STYLEBOOK_RECONCILE_DELAY_MS",
                DEFAULT_RECONCILE_DELAY.as_millis() as u64,
            )?),
            variant_batch_size: env_parse("STYLEBOOK_VARIANT_BATCH_SIZE", DEFAULT_VARIANT_BATCH_SIZE)?,
            copy_suffix: std::env::var("STYLEBOOK_COPY_SUFFIX")
                .unwrap_or_else(|_| DEFAULT_COPY_SUFFIX.to_string()),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn with_reconcile_delay(mut self, delay: Duration) -> Self {
        self.reconcile_delay = delay;
        self
    }

    pub fn with_variant_batch_size(mut self, size: usize) -> Self {
        self.variant_batch_size = size;
        self
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        if self.variant_batch_size == 0 {
            return Err(EngineError::Config(
                "variant batch size must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> Result<T, EngineError>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(val) => val
            .trim()
            .parse::<T>()
            .map_err(|e| EngineError::Config(format!("failed to parse {key}={val}: {e}"))),
        Err(_) => Ok(default),
    }
}
