#![forbid(unsafe_code)]

pub mod keys;
mod store;

pub use store::{JsonFileStore, MemoryStore, SettingsStore, deep_merge};
