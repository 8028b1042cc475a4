mod error;
mod source;
mod validation;

pub use error::{ConfigError, ConfigResult};
pub use source::{DatabaseConfig, SourceConfig};
pub use validation::{validate_source, validate_sources};
