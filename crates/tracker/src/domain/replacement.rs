#![forbid(unsafe_code)]

use crate::domain::ToolId;
use serde::{Deserialize, Serialize};

/// Audit record written once per tool reset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplacementLogEntry {
    pub timestamp: String,
    pub tool_id: ToolId,
    pub profile_id: String,
    pub accumulated_seconds_at_reset: u64,
}
