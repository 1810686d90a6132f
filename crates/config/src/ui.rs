#![forbid(unsafe_code)]

use crate::display_mode::DisplayMode;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct Ui {
    pub display_mode: DisplayMode,

    /// Ask which nozzle is mounted before each print.
    pub prompt_before_print: bool,
}
