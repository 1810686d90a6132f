#![forbid(unsafe_code)]

mod defaults;
mod display_mode;
mod error;
mod persistence;
mod ui;

pub use defaults::Defaults;
pub use display_mode::DisplayMode;
pub use error::Error;
pub use persistence::Persistence;
pub use ui::Ui;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Prefix of environment variables that override file values, e.g.
/// `NOZZLE_PERSISTENCE__FLUSH_INTERVAL=10`.
pub const ENV_PREFIX: &str = "NOZZLE_";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub defaults: Defaults,
    pub persistence: Persistence,
    pub ui: Ui,
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    /// Layer the TOML file at `path` and `NOZZLE_*` variables over the
    /// built-in defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        // figment silently skips missing files
        std::fs::metadata(path)?;

        let config: Self = Figment::from(Serialized::defaults(Self::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, Error> {
        let config: Self = toml_edit::de::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String, Error> {
        Ok(toml_edit::ser::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), Error> {
        self.defaults.validate()?;
        self.persistence.validate()
    }
}
