//! Run configuration.
use serde::{Deserialize, Serialize};
use std::{env, str::FromStr, time::Duration};

use crate::Error;

/// Environment variable overriding [`Config::workers`].
pub const WORKERS_VAR: &str = "CPA_WORKERS";
/// Environment variable overriding [`Config::queue_timeout`], in seconds.
pub const QUEUE_TIMEOUT_VAR: &str = "CPA_QUEUE_TIMEOUT_SECS";

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Number of parallel workers
    pub workers: usize,
    /// Maximum time a worker waits for a job before reporting starvation
    pub queue_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            workers: 8,
            queue_timeout: Duration::from_secs(5),
        }
    }
}

impl Config {
    /// Reads the configuration from the environment, falling back to defaults for unset
    /// variables.
    pub fn from_env() -> Result<Self, Error> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    fn from_lookup<L>(lookup: L) -> Result<Self, Error>
    where
        L: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(workers) = parse_var::<usize>(&lookup, WORKERS_VAR)? {
            config.workers = workers;
        }
        if let Some(secs) = parse_var::<f64>(&lookup, QUEUE_TIMEOUT_VAR)? {
            config.queue_timeout = Duration::try_from_secs_f64(secs)
                .map_err(|e| Error::InvalidConfig(format!("{QUEUE_TIMEOUT_VAR}: {e}")))?;
        }
        config.validate()?;

        Ok(config)
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_queue_timeout(mut self, queue_timeout: Duration) -> Self {
        self.queue_timeout = queue_timeout;
        self
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.workers == 0 {
            return Err(Error::InvalidConfig("workers must be at least 1".into()));
        }
        if self.queue_timeout.is_zero() {
            return Err(Error::InvalidConfig("queue timeout must be positive".into()));
        }

        Ok(())
    }
}

fn parse_var<T>(lookup: impl Fn(&str) -> Option<String>, name: &str) -> Result<Option<T>, Error>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    lookup(name)
        .map(|value| {
            value
                .trim()
                .parse()
                .map_err(|e| Error::InvalidConfig(format!("{name}={value:?}: {e}")))
        })
        .transpose()
}
