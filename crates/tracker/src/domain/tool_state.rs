#![forbid(unsafe_code)]

use crate::domain::ToolId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Accumulated printing time of one physical tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolState {
    pub tool_id: ToolId,
    pub profile_id: String,
    pub accumulated_seconds: u64,
}

impl ToolState {
    pub fn new(tool_id: ToolId, profile_id: impl Into<String>) -> Self {
        Self {
            tool_id,
            profile_id: profile_id.into(),
            accumulated_seconds: 0,
        }
    }

    pub fn accumulated_hours(&self) -> f64 {
        self.accumulated_seconds as f64 / 3600.0
    }
}

/// Tool state keyed by canonical id, iterated in numeric tool order.
pub type ToolStateMap = BTreeMap<ToolId, ToolState>;
