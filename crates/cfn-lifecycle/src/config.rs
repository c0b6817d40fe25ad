//! Process configuration.
//!
//! Read once at cold start from the function's environment and handed to the
//! [`Adapter`](crate::Adapter) and the [`HttpSink`](crate::HttpSink).
use snafu::prelude::*;

use crate::{ConfigSnafu, Result};

fn parse_level(s: &str) -> Result<log::LevelFilter, String> {
    s.parse()
        .map_err(|_| format!("unknown log level '{s}', expected one of off, error, warn, info, debug, trace"))
}

#[derive(clap::Parser, Clone, Debug)]
#[command(about = "CloudFormation custom resource handler")]
pub struct Config {
    /// Maximum level of log records.
    #[arg(long, env = "LOG_LEVEL", default_value = "info", value_parser = parse_level)]
    pub log_level: log::LevelFilter,

    /// Log whole lifecycle requests and response envelopes.
    #[arg(long, env = "LOG_EVENTS")]
    pub log_events: bool,

    /// Seconds to wait for CloudFormation to accept a response.
    #[arg(long, env = "RESPONSE_TIMEOUT_SECS", default_value_t = 30)]
    pub response_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: log::LevelFilter::Info,
            log_events: false,
            response_timeout_secs: 30,
        }
    }
}

impl Config {
    /// Reads the configuration from environment variables.
    ///
    /// Command line arguments are ignored, Lambda doesn't pass any.
    pub fn from_env() -> Result<Self> {
        <Self as clap::Parser>::try_parse_from([env!("CARGO_PKG_NAME")]).context(ConfigSnafu)
    }

    /// Installs the global subscriber, forwarding `log` records into it.
    pub fn init_logging(&self) {
        use tracing_subscriber::filter::LevelFilter;

        let level = match self.log_level {
            log::LevelFilter::Off => LevelFilter::OFF,
            log::LevelFilter::Error => LevelFilter::ERROR,
            log::LevelFilter::Warn => LevelFilter::WARN,
            log::LevelFilter::Info => LevelFilter::INFO,
            log::LevelFilter::Debug => LevelFilter::DEBUG,
            log::LevelFilter::Trace => LevelFilter::TRACE,
        };
        let result = tracing_subscriber::fmt()
            .with_max_level(level)
            // disable printing the name of the module in every log line.
            .with_target(false)
            // disabling time is handy because CloudWatch will add the ingestion time.
            .without_time()
            .with_ansi(false)
            .try_init();
        if let Err(e) = result {
            eprintln!("logging was already initialized: {e}");
        }
    }
}
