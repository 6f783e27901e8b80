//! Logging bootstrap: `-v` lowers the base level one step per occurrence
//! (`warn` → `info` → `debug` → `trace`), and `--log-format json` swaps
//! the event formatter.

use clap::ValueEnum;
use tracing_subscriber::EnvFilter;

#[derive(Clone, Copy, Debug, Default, ValueEnum)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

pub fn init(verbosity: u8, format: LogFormat) {
    let base_level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(base_level));

    match format {
        LogFormat::Text => {
            tracing_subscriber::fmt().with_env_filter(filter).init();
        }
        LogFormat::Json => {
            tracing_subscriber::fmt().with_env_filter(filter).json().init();
        }
    }
}
