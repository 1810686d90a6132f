#![forbid(unsafe_code)]

mod nozzle;
mod profile;
mod replacement;
mod tool_id;
mod tool_state;

pub use nozzle::{Nozzle, NozzleMap, PrintLogEntry};
pub use profile::{NozzleProfile, ProfileMap};
pub use replacement::ReplacementLogEntry;
pub use tool_id::{ToolId, extract_tool_id_from_command, normalize_tool_id};
pub use tool_state::{ToolState, ToolStateMap};
