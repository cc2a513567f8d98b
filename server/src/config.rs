use std::{fs, path::PathBuf, time::Duration};

use clap::Parser;
use reqwest::Url;
use serde::Deserialize;
use thiserror::Error;

pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_ROUND_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_WORK_TIME_MS: u64 = 8_000;
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 5_000;
/// Timeout for every call to the upstream endpoints.
pub const UPSTREAM_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Parser, Debug, Default)]
#[command(about, version)]
pub struct Args {
    #[arg(long, help = "Config the server listen port [default: 8080]")]
    pub port: Option<u16>,

    #[arg(long, help = "Upstream endpoint serving work units")]
    pub work_url: Option<Url>,

    #[arg(long, help = "Upstream endpoint accepting solutions")]
    pub submit_url: Option<Url>,

    #[arg(long, help = "Round deadline in milliseconds [default: 10000]")]
    pub round_timeout_ms: Option<u64>,

    #[arg(long, help = "Search budget handed to workers in milliseconds [default: 8000]")]
    pub work_time_ms: Option<u64>,

    #[arg(long, help = "Pause between rounds in milliseconds [default: 5000]")]
    pub poll_interval_ms: Option<u64>,

    #[arg(long, help = "JSON config file; explicit flags take precedence")]
    pub config: Option<PathBuf>,
}

/// Contents of the optional `--config` file. Every field may be omitted.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub port: Option<u16>,
    pub work_url: Option<String>,
    pub submit_url: Option<String>,
    pub round_timeout_ms: Option<u64>,
    pub work_time_ms: Option<u64>,
    pub poll_interval_ms: Option<u64>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("fail to read config file {path}: {source}")]
    Read { path: PathBuf, source: std::io::Error },
    #[error("fail to parse config file: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid url `{url}`: {source}")]
    InvalidUrl { url: String, source: url::ParseError },
    #[error("`{0}` is required")]
    Missing(&'static str),
    #[error("work time {work_time:?} must be shorter than the round timeout {round_timeout:?}")]
    WorkTimeTooLong { work_time: Duration, round_timeout: Duration },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub port: u16,
    pub work_url: Url,
    pub submit_url: Url,
    pub round_timeout: Duration,
    pub work_time: Duration,
    pub poll_interval: Duration,
}

impl ServerConfig {
    pub fn load(args: Args) -> Result<Self, ConfigError> {
        let file = match &args.config {
            Some(path) => {
                let text = fs::read_to_string(path)
                    .map_err(|source| ConfigError::Read { path: path.clone(), source })?;
                serde_json::from_str(&text)?
            }
            None => FileConfig::default(),
        };
        Self::merge(args, file)
    }

    pub fn merge(args: Args, file: FileConfig) -> Result<Self, ConfigError> {
        let work_url = match args.work_url {
            Some(url) => url,
            None => parse_url(file.work_url.ok_or(ConfigError::Missing("work_url"))?)?,
        };
        let submit_url = match args.submit_url {
            Some(url) => url,
            None => parse_url(file.submit_url.ok_or(ConfigError::Missing("submit_url"))?)?,
        };

        let ms = |flag: Option<u64>, file: Option<u64>, default: u64| {
            Duration::from_millis(flag.or(file).unwrap_or(default))
        };
        let round_timeout = ms(args.round_timeout_ms, file.round_timeout_ms, DEFAULT_ROUND_TIMEOUT_MS);
        let work_time = ms(args.work_time_ms, file.work_time_ms, DEFAULT_WORK_TIME_MS);
        let poll_interval = ms(args.poll_interval_ms, file.poll_interval_ms, DEFAULT_POLL_INTERVAL_MS);

        if work_time >= round_timeout {
            return Err(ConfigError::WorkTimeTooLong { work_time, round_timeout });
        }

        Ok(Self {
            port: args.port.or(file.port).unwrap_or(DEFAULT_PORT),
            work_url,
            submit_url,
            round_timeout,
            work_time,
            poll_interval,
        })
    }
}

fn parse_url(url: String) -> Result<Url, ConfigError> {
    Url::parse(&url).map_err(|source| ConfigError::InvalidUrl { url, source })
}
