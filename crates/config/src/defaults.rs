#![forbid(unsafe_code)]

use crate::error::Error;
use serde::{Deserialize, Serialize};

/// Seed values used whenever persisted settings lack a profile or a tool.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Defaults {
    /// Id of the profile that always exists.
    pub profile_id: String,

    /// Display name of the default profile.
    pub profile_name: String,

    /// Replacement interval of the default profile, in printing hours.
    pub interval_hours: f64,

    /// Tool that is active before the host reports any tool change.
    pub initial_tool: String,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            profile_id: "default_0_4_brass".into(),
            profile_name: "0.4 Brass".into(),
            interval_hours: 100.0,
            initial_tool: "T0".into(),
        }
    }
}

impl Defaults {
    pub fn validate(&self) -> Result<(), Error> {
        if self.profile_id.trim().is_empty() {
            return Err(Error::InvalidValue {
                field: "defaults.profile_id",
                reason: "must not be empty".into(),
            });
        }
        if !self.interval_hours.is_finite() || self.interval_hours < 0.0 {
            return Err(Error::InvalidValue {
                field: "defaults.interval_hours",
                reason: format!("{} is not a non-negative number", self.interval_hours),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn non_negative_intervals_are_accepted(hours in 0.0f64..1e9) {
            let defaults = Defaults { interval_hours: hours, ..Defaults::default() };
            prop_assert!(defaults.validate().is_ok());
        }

        #[test]
        fn negative_intervals_are_rejected(hours in -1e9f64..-1e-9) {
            let defaults = Defaults { interval_hours: hours, ..Defaults::default() };
            prop_assert!(defaults.validate().is_err());
        }
    }

    #[test]
    fn blank_profile_id_is_rejected() {
        let defaults = Defaults {
            profile_id: "  ".into(),
            ..Defaults::default()
        };
        assert!(defaults.validate().is_err());
    }

    #[test]
    fn nan_interval_is_rejected() {
        let defaults = Defaults {
            interval_hours: f64::NAN,
            ..Defaults::default()
        };
        assert!(defaults.validate().is_err());
    }
}
