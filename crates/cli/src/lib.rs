pub mod cli;
pub mod error;
pub mod ingest;
pub mod signals;
