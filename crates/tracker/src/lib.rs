pub mod accounting;
pub mod api;
pub mod clock;
pub mod domain;
mod error;
pub mod payload;
pub mod persistence;
pub mod repair;
pub mod scheduler;
pub mod session;
mod tracker;

pub use api::{ApiCommand, ApiResponse};
pub use error::Error;
pub use payload::StatusPayload;
pub use scheduler::{PersistPolicy, PersistenceScheduler, SchedulerHandle};
pub use tracker::Tracker;
