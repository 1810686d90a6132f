#![forbid(unsafe_code)]

use crate::domain::{ReplacementLogEntry, ToolId, ToolState, ToolStateMap};
use crate::error::Error;
use std::borrow::Cow;

/// Whole seconds elapsed between two epoch timestamps.
///
/// Missing or non-finite inputs and clock regressions yield 0.
///
/// ```
/// # use tracker::accounting::compute_elapsed_seconds;
/// assert_eq!(compute_elapsed_seconds(Some(100.0), Some(105.4)), 5);
/// assert_eq!(compute_elapsed_seconds(Some(105.0), Some(100.0)), 0);
/// assert_eq!(compute_elapsed_seconds(None, Some(100.0)), 0);
/// ```
pub fn compute_elapsed_seconds(last_ts: Option<f64>, now_ts: Option<f64>) -> u64 {
    let (Some(last), Some(now)) = (last_ts, now_ts) else {
        return 0;
    };
    if !last.is_finite() || !now.is_finite() {
        return 0;
    }
    let delta = now - last;
    if delta <= 0.0 {
        return 0;
    }
    // float-to-int casts saturate
    delta.floor() as u64
}

/// Add `delta_seconds` to one tool without touching `tool_state`.
///
/// The input is handed back borrowed, with `changed == false`, when the tool
/// id does not normalize or the delta is not positive. Otherwise an updated
/// copy is returned; a missing tool is created with `default_profile_id`.
pub fn accumulate<'a>(
    tool_state: &'a ToolStateMap,
    tool_id: &str,
    delta_seconds: i64,
    default_profile_id: &str,
) -> (Cow<'a, ToolStateMap>, bool) {
    let Some(tool_id) = ToolId::parse(tool_id) else {
        return (Cow::Borrowed(tool_state), false);
    };
    let delta = match u64::try_from(delta_seconds) {
        Ok(delta) if delta > 0 => delta,
        _ => return (Cow::Borrowed(tool_state), false),
    };

    let current = tool_state.get(&tool_id);
    let before = current.map_or(0, |state| state.accumulated_seconds);
    if current.is_some() && before.saturating_add(delta) == before {
        return (Cow::Borrowed(tool_state), false);
    }

    let mut updated = tool_state.clone();
    let entry = updated
        .entry(tool_id.clone())
        .or_insert_with(|| ToolState::new(tool_id.clone(), default_profile_id));
    entry.tool_id = tool_id;
    if entry.profile_id.is_empty() {
        entry.profile_id = default_profile_id.to_owned();
    }
    entry.accumulated_seconds = before.saturating_add(delta);
    (Cow::Owned(updated), true)
}

/// Make sure `tool_id` has an entry, creating a zeroed one if needed.
pub fn ensure_tool<'a>(
    tool_state: &'a ToolStateMap,
    tool_id: &ToolId,
    default_profile_id: &str,
) -> Cow<'a, ToolStateMap> {
    if tool_state.contains_key(tool_id) {
        return Cow::Borrowed(tool_state);
    }
    let mut updated = tool_state.clone();
    updated.insert(
        tool_id.clone(),
        ToolState::new(tool_id.clone(), default_profile_id),
    );
    Cow::Owned(updated)
}

/// Zero one tool's counter and append the matching audit entry.
///
/// The logged profile is `profile_id` if given, else the tool's current
/// profile, else `default_profile_id`. A tool without an entry gets a fresh
/// one and logs 0 seconds.
pub fn reset_tool_state(
    tool_state: &ToolStateMap,
    replacement_log: &[ReplacementLogEntry],
    tool_id: &str,
    timestamp: &str,
    profile_id: Option<&str>,
    default_profile_id: &str,
) -> Result<(ToolStateMap, Vec<ReplacementLogEntry>), Error> {
    let tool_id: ToolId = tool_id.parse()?;
    let existing = tool_state.get(&tool_id);

    let resolved_profile = profile_id
        .filter(|id| !id.is_empty())
        .or_else(|| {
            existing
                .map(|state| state.profile_id.as_str())
                .filter(|id| !id.is_empty())
        })
        .unwrap_or(default_profile_id)
        .to_owned();
    let prior_seconds = existing.map_or(0, |state| state.accumulated_seconds);

    let mut tools = tool_state.clone();
    tools.insert(
        tool_id.clone(),
        ToolState::new(tool_id.clone(), resolved_profile.clone()),
    );

    let mut log = replacement_log.to_vec();
    log.push(ReplacementLogEntry {
        timestamp: timestamp.to_owned(),
        tool_id,
        profile_id: resolved_profile,
        accumulated_seconds_at_reset: prior_seconds,
    });

    Ok((tools, log))
}
