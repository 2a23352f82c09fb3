//! Tracing subscriber setup shared by the server and the CLI
//!
//! Author: hephaex@gmail.com

use crate::config::LoggingConfig;
use crate::{MiaError, Result};
use tracing_subscriber::{fmt::MakeWriter, EnvFilter};

/// Directives used when `RUST_LOG` is unset
fn default_directives(config: &LoggingConfig) -> String {
    format!("{},tower_http=info", config.level)
}

/// Install the global tracing subscriber writing to `writer`
///
/// `RUST_LOG` wins over the configured level. Fails if a global subscriber
/// is already installed.
pub fn init_tracing<W>(config: &LoggingConfig, writer: W) -> Result<()>
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(config)));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_file(config.include_location)
        .with_line_number(config.include_location);

    let installed = if config.json_format {
        builder.json().try_init()
    } else {
        builder.try_init()
    };

    installed
        .map_err(|e| MiaError::Configuration(format!("Failed to install tracing subscriber: {e}")))
}
