#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A named wear-interval policy that can be assigned to tools.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NozzleProfile {
    pub id: String,
    pub name: String,
    /// Printing hours after which the nozzle is due for replacement.
    pub interval_hours: f64,
    pub notes: String,
}

impl NozzleProfile {
    pub fn new(id: impl Into<String>, name: impl Into<String>, interval_hours: f64) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            interval_hours,
            notes: String::new(),
        }
    }
}

/// Profiles keyed by their id.
pub type ProfileMap = BTreeMap<String, NozzleProfile>;
