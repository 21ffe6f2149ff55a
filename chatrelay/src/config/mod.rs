// Config loader and validator
//
// Loads chatrelay.yaml, resolves variable interpolation, applies defaults and
// validates ranges. Every section is optional; a file containing only the
// version key yields the defaults.

mod error;
mod interpolation;
mod loader;
mod raw;
mod source;
mod types;

pub use error::ConfigError;
pub use interpolation::resolve_variables;
pub use loader::{default_config, load_config};
pub use source::{ConfigSource, FileSource, StringSource};
pub use types::*;
