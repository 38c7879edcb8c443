#![forbid(unsafe_code)]

use anyhow::{Result, anyhow};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::writer::BoxMakeWriter;

/// Environment variable that overrides the `--log` filter.
pub const LOG_ENV: &str = "TAGSYNC_LOG";

/// Install the subscriber used for progress and decision reporting.
///
/// Logs go to stdout for human runs and to stderr when `json` is set, so the
/// JSON document is the only thing on stdout. Calling this twice in one
/// process is an error from the subscriber registry.
pub fn install(filter: &str, json: bool) -> Result<()> {
    let filter = EnvFilter::try_new(filter)
        .map_err(|err| anyhow!("invalid log filter `{filter}`: {err}"))?;
    let writer = if json {
        BoxMakeWriter::new(std::io::stderr)
    } else {
        BoxMakeWriter::new(std::io::stdout)
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_target(false)
        .without_time()
        .try_init()
        .map_err(|err| anyhow!("failed to install tracing subscriber: {err}"))
}
