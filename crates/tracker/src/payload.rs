#![forbid(unsafe_code)]

use crate::domain::ToolId;
use crate::repair::{NormalizedSettings, ensure_settings};
use config::Defaults;
use serde::Serialize;
use serde_json::Value;
use std::cmp::Ordering;

/// Read-only wear summary for the UI and API.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusPayload {
    pub profiles: Vec<ProfileView>,
    pub tools: Vec<ToolView>,
    pub meta: PayloadMeta,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProfileView {
    pub id: String,
    pub name: String,
    pub interval_hours: f64,
    /// `None` when the profile has no notes.
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolView {
    pub tool_id: String,
    pub profile_id: String,
    pub profile_name: String,
    pub interval_hours: f64,
    pub accumulated_seconds: u64,
    pub accumulated_hours: f64,
    pub percent_to_interval: f64,
    pub is_overdue: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PayloadMeta {
    /// Opaque value supplied by the caller.
    pub generated_at: Value,
}

/// Build the payload from raw (possibly malformed) profiles and tool state.
pub fn build_status_payload(
    raw_profiles: &Value,
    raw_tool_state: &Value,
    generated_at: Value,
    defaults: &Defaults,
) -> StatusPayload {
    let settings = ensure_settings(raw_profiles, raw_tool_state, &Value::Null, defaults);

    let mut profiles: Vec<ProfileView> = settings
        .profiles
        .values()
        .map(|profile| ProfileView {
            id: profile.id.clone(),
            name: profile.name.clone(),
            interval_hours: profile.interval_hours,
            notes: Some(profile.notes.clone()).filter(|notes| !notes.is_empty()),
        })
        .collect();
    profiles.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));

    let mut tools: Vec<ToolView> = settings.tool_state.values().map(|state| {
        let profile = settings.profile(&state.profile_id);
        let interval_hours = profile.map_or(0.0, |p| p.interval_hours);
        let accumulated_hours = round_to(state.accumulated_hours(), 2);
        let (percent_to_interval, is_overdue) = if interval_hours > 0.0 {
            let percent = (accumulated_hours / interval_hours * 100.0).min(100.0);
            (round_to(percent, 1), accumulated_hours >= interval_hours)
        } else {
            (0.0, false)
        };

        ToolView {
            tool_id: state.tool_id.to_string(),
            profile_id: state.profile_id.clone(),
            profile_name: profile.map_or_else(|| state.profile_id.clone(), |p| p.name.clone()),
            interval_hours,
            accumulated_seconds: state.accumulated_seconds,
            accumulated_hours,
            percent_to_interval,
            is_overdue,
        }
    })
    .collect();
    tools.sort_by(|a, b| compare_tool_ids(&a.tool_id, &b.tool_id));

    StatusPayload {
        profiles,
        tools,
        meta: PayloadMeta { generated_at },
    }
}

impl StatusPayload {
    pub fn from_settings(
        settings: &NormalizedSettings,
        generated_at: Value,
        defaults: &Defaults,
    ) -> Self {
        let (profiles, tool_state, _) = settings.to_values();
        build_status_payload(&profiles, &tool_state, generated_at, defaults)
    }
}

/// Numeric order for valid tool ids; anything else after them, lexically.
fn compare_tool_ids(a: &str, b: &str) -> Ordering {
    match (ToolId::parse(a), ToolId::parse(b)) {
        (Some(a), Some(b)) => a.cmp(&b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.cmp(b),
    }
}

fn round_to(value: f64, places: i32) -> f64 {
    let scale = 10f64.powi(places);
    (value * scale).round() / scale
}
