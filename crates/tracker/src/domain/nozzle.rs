#![forbid(unsafe_code)]

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// A physical nozzle from the inventory, tracked by wall-clock print runtime.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Nozzle {
    #[serde(deserialize_with = "lenient_string")]
    pub size: String,
    #[serde(deserialize_with = "lenient_string")]
    pub material: String,
    /// Expected life in hours; 0 when unknown.
    pub expected_life: f64,
    /// Accumulated runtime in hours.
    pub runtime: f64,
    pub retired: bool,
    #[serde(deserialize_with = "lenient_string")]
    pub name: String,
}

pub type NozzleMap = BTreeMap<String, Nozzle>;

/// One finished (or interrupted) print charged to a nozzle.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PrintLogEntry {
    #[serde(deserialize_with = "lenient_string")]
    pub timestamp: String,
    #[serde(deserialize_with = "lenient_string")]
    pub nozzle_id: String,
    #[serde(deserialize_with = "lenient_string")]
    pub nozzle_name: String,
    #[serde(deserialize_with = "lenient_string")]
    pub file: String,
    /// Hours.
    pub duration: f64,
}

/// Accept strings, numbers and booleans where a string is expected. `null`
/// becomes empty.
fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(String::new()),
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected a string, found {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn numeric_sizes_become_strings() {
        let nozzle: Nozzle =
            serde_json::from_value(json!({"size": 0.4, "material": "brass", "runtime": 2.5}))
                .unwrap();
        assert_eq!(nozzle.size, "0.4");
        assert_eq!(nozzle.material, "brass");
        assert_eq!(nozzle.runtime, 2.5);
        assert!(!nozzle.retired);
    }

    #[test]
    fn structured_names_are_rejected() {
        let result = serde_json::from_value::<Nozzle>(json!({"name": ["a"]}));
        assert!(result.is_err());
    }
}
