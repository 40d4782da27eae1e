//! Logging setup for the binary.

use env_logger::{Builder, Env};
use log::SetLoggerError;

/// Environment variable consulted when no level is given explicitly.
pub const LOG_ENV: &str = "SHELL_KERNEL_LOG";

/// Logger configuration. `level` wins over [`LOG_ENV`]; both accept
/// `env_logger` filter syntax. Logging is off when neither is set.
pub fn builder(level: Option<&str>) -> Builder {
    let mut builder = Builder::from_env(Env::default().filter_or(LOG_ENV, "off"));
    if let Some(level) = level {
        builder.parse_filters(level);
    }
    builder.format_timestamp(None);
    builder
}

pub fn init(level: Option<&str>) -> Result<(), SetLoggerError> {
    builder(level).try_init()
}
