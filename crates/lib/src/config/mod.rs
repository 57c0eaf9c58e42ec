//! Build configuration.
//!
//! The configuration file is YAML with four main sections (`languages`,
//! `flavors`, `formats`, `build`) plus optional `source`, `prerequisites` and
//! `logging` sections. See [`ConfigLoader`] for loading rules.

mod load;
mod types;

pub use load::{ConfigError, ConfigLoader, ConfigOverrides};
pub use types::*;
