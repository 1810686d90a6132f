#![forbid(unsafe_code)]

//! Repair of settings read from the host store.
//!
//! Everything in here is total: any JSON value goes in, a well-formed result
//! comes out. A value that is `null`, `false`, `0`, `""`, `[]` or `{}` counts
//! as absent wherever a field falls back to another value.

use crate::domain::{
    NozzleMap, NozzleProfile, PrintLogEntry, ProfileMap, ReplacementLogEntry, ToolId, ToolState,
    ToolStateMap, normalize_tool_id,
};
use config::Defaults;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

/// The three wear-tracking settings after repair.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct NormalizedSettings {
    pub profiles: ProfileMap,
    pub tool_state: ToolStateMap,
    pub replacement_log: Vec<ReplacementLogEntry>,
}

impl NormalizedSettings {
    /// Untyped form, as written to the settings store.
    pub fn to_values(&self) -> (Value, Value, Value) {
        (
            serde_json::to_value(&self.profiles).unwrap_or_default(),
            serde_json::to_value(&self.tool_state).unwrap_or_default(),
            serde_json::to_value(&self.replacement_log).unwrap_or_default(),
        )
    }

    pub fn profile(&self, id: &str) -> Option<&NozzleProfile> {
        self.profiles.get(id)
    }
}

/// Repair possibly corrupt profiles, tool state and replacement log.
///
/// Profiles are re-keyed by their normalized id; when two entries collapse
/// onto one id the one iterated last wins. The default profile and `T0` are
/// always present, and every tool or log entry referencing an unknown
/// profile is pointed at the default one. Applying this to its own output
/// changes nothing.
pub fn ensure_settings(
    raw_profiles: &Value,
    raw_tool_state: &Value,
    raw_replacement_log: &Value,
    defaults: &Defaults,
) -> NormalizedSettings {
    let profiles = repair_profiles(raw_profiles, defaults);
    let tool_state = repair_tool_state(raw_tool_state, &profiles, &defaults.profile_id);
    let replacement_log =
        repair_replacement_log(raw_replacement_log, &profiles, &defaults.profile_id);

    NormalizedSettings {
        profiles,
        tool_state,
        replacement_log,
    }
}

fn repair_profiles(raw: &Value, defaults: &Defaults) -> ProfileMap {
    let mut profiles = ProfileMap::new();
    for (key, entry) in raw.as_object().into_iter().flatten() {
        let profile = normalize_profile_entry(key, entry, defaults.interval_hours);
        profiles.insert(profile.id.clone(), profile);
    }

    let existing = profiles.remove(&defaults.profile_id);
    let default_profile = NozzleProfile {
        id: defaults.profile_id.clone(),
        name: existing
            .as_ref()
            .map(|p| p.name.clone())
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| defaults.profile_name.clone()),
        interval_hours: existing
            .as_ref()
            .map_or(defaults.interval_hours, |p| p.interval_hours),
        notes: existing.map(|p| p.notes).unwrap_or_default(),
    };
    profiles.insert(default_profile.id.clone(), default_profile);
    profiles
}

fn normalize_profile_entry(key: &str, entry: &Value, default_interval_hours: f64) -> NozzleProfile {
    let empty = Map::new();
    let entry = entry.as_object().unwrap_or(&empty);

    let id = present(entry.get("id")).map_or_else(|| key.to_owned(), to_text);
    let interval_hours = entry
        .get("interval_hours")
        .and_then(parse_float)
        .unwrap_or(default_interval_hours)
        .max(0.0);
    let name = present(entry.get("name")).map_or_else(|| id.clone(), to_text);
    let notes = present(entry.get("notes")).map(to_text).unwrap_or_default();

    NozzleProfile {
        id,
        name,
        interval_hours,
        notes,
    }
}

fn repair_tool_state(raw: &Value, profiles: &ProfileMap, default_profile_id: &str) -> ToolStateMap {
    let empty = Map::new();
    let mut tools = ToolStateMap::new();

    for (key, entry) in raw.as_object().into_iter().flatten() {
        let entry = entry.as_object().unwrap_or(&empty);
        let Some(tool_id) = present(entry.get("tool_id"))
            .and_then(normalize_tool_id)
            .or_else(|| ToolId::parse(key))
        else {
            continue;
        };

        let profile_id = resolve_profile(entry.get("profile_id"), profiles, default_profile_id);
        let accumulated_seconds = entry
            .get("accumulated_seconds")
            .map_or(0, coerce_nonnegative_int);

        tools.insert(
            tool_id.clone(),
            ToolState {
                tool_id,
                profile_id,
                accumulated_seconds,
            },
        );
    }

    tools
        .entry(ToolId::zero())
        .or_insert_with(|| ToolState::new(ToolId::zero(), default_profile_id));
    tools
}

fn repair_replacement_log(
    raw: &Value,
    profiles: &ProfileMap,
    default_profile_id: &str,
) -> Vec<ReplacementLogEntry> {
    raw.as_array()
        .into_iter()
        .flatten()
        .filter_map(Value::as_object)
        .map(|entry| ReplacementLogEntry {
            timestamp: present(entry.get("timestamp"))
                .map(to_text)
                .unwrap_or_default(),
            tool_id: entry
                .get("tool_id")
                .and_then(normalize_tool_id)
                .unwrap_or_default(),
            profile_id: resolve_profile(entry.get("profile_id"), profiles, default_profile_id),
            accumulated_seconds_at_reset: entry
                .get("accumulated_seconds_at_reset")
                .map_or(0, coerce_nonnegative_int),
        })
        .collect()
}

fn resolve_profile(value: Option<&Value>, profiles: &ProfileMap, default_profile_id: &str) -> String {
    present(value)
        .map(to_text)
        .filter(|id| profiles.contains_key(id))
        .unwrap_or_else(|| default_profile_id.to_owned())
}

/// Legacy nozzle inventory. Entries that cannot be read are dropped.
pub fn load_nozzles(raw: &Value) -> NozzleMap {
    let mut nozzles = NozzleMap::new();
    for (id, entry) in raw.as_object().into_iter().flatten() {
        match serde_json::from_value(entry.clone()) {
            Ok(nozzle) => {
                nozzles.insert(id.clone(), nozzle);
            }
            Err(err) => warn!(nozzle_id = %id, %err, "dropping unreadable nozzle"),
        }
    }
    nozzles
}

/// Legacy print log. Entries that cannot be read are dropped.
pub fn load_print_log(raw: &Value) -> Vec<PrintLogEntry> {
    raw.as_array()
        .into_iter()
        .flatten()
        .filter_map(|entry| match serde_json::from_value(entry.clone()) {
            Ok(entry) => Some(entry),
            Err(err) => {
                warn!(%err, "dropping unreadable print log entry");
                None
            }
        })
        .collect()
}

/// `None` for absent and empty values.
fn present(value: Option<&Value>) -> Option<&Value> {
    value.filter(|v| !is_empty(v))
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
    }
}

fn to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn parse_float(value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    };
    parsed.filter(|f| f.is_finite())
}

fn coerce_nonnegative_int(value: &Value) -> u64 {
    if let Some(exact) = value.as_u64() {
        return exact;
    }
    parse_float(value).map_or(0, |f| if f <= 0.0 { 0 } else { f.trunc() as u64 })
}
