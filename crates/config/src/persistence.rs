#![forbid(unsafe_code)]

use crate::error::Error;
use serde::{Deserialize, Serialize};
use serde_with::serde_as;
use std::{path::PathBuf, time::Duration};

#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Persistence {
    /// JSON settings document. The binary falls back to `nozzle-life.json`
    /// in the working directory when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub settings_path: Option<PathBuf>,

    /// Minimum spacing between non-forced flushes while printing.
    #[serde_as(as = "serde_with::DurationSeconds")]
    pub flush_interval: Duration,

    /// Wake-up period of the background persistence task.
    #[serde_as(as = "serde_with::DurationSeconds")]
    pub wake_period: Duration,

    /// How long shutdown waits for the background task to finish.
    #[serde_as(as = "serde_with::DurationSeconds")]
    pub join_timeout: Duration,

    pub save_on_shutdown: bool,
}

impl Default for Persistence {
    fn default() -> Self {
        Self {
            settings_path: None,
            flush_interval: Duration::from_secs(30),
            wake_period: Duration::from_secs(60),
            join_timeout: Duration::from_secs(5),
            save_on_shutdown: true,
        }
    }
}

impl Persistence {
    pub fn validate(&self) -> Result<(), Error> {
        if self.wake_period.is_zero() {
            return Err(Error::InvalidValue {
                field: "persistence.wake_period",
                reason: "must be at least one second".into(),
            });
        }
        Ok(())
    }
}
