//! Top-level keys of the settings document.

pub const NOZZLE_PROFILES: &str = "nozzle_profiles";
pub const TOOL_STATE: &str = "tool_state";
pub const REPLACEMENT_LOG: &str = "replacement_log";

pub const NOZZLES: &str = "nozzles";
pub const DEFAULT_NOZZLE_ID: &str = "default_nozzle_id";
pub const PRINT_LOG: &str = "print_log";

pub const DISPLAY_MODE: &str = "display_mode";
pub const PROMPT_BEFORE_PRINT: &str = "prompt_before_print";
