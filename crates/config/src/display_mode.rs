#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};

/// How the wear gauge is drawn by the UI.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum DisplayMode {
    #[default]
    Circle,
    Bar,
    Both,
}
