//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{
    net::SocketAddr,
    num::{NonZeroU64, NonZeroUsize},
    str::FromStr,
    time::Duration,
};

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;
use url::Url;

mod cli;

pub use cli::{
    CliArgs, Command, LoggingOverrides, NotifyArgs, RevalidateOverrides, ServeArgs,
    ServeOverrides,
};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "revalidator";
const ENV_PREFIX: &str = "REVALIDATOR";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 3000;
const DEFAULT_GRACEFUL_SHUTDOWN_SECS: u64 = 30;
const DEFAULT_ENDPOINT_PATH: &str = revalidator_api_types::REVALIDATE_PATH;
const DEFAULT_EMIT_TIMEOUT_SECS: u64 = 10;
const DEFAULT_ORIGIN_TIMEOUT_SECS: u64 = 15;
const DEFAULT_CACHE_RESPONSE_LIMIT: usize = 500;
const DEFAULT_CACHE_RESPONSE_BODY_LIMIT_BYTES: usize = 2 * 1024 * 1024;

/// Fully-resolved deployment settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub revalidate: RevalidateSettings,
    pub cache: CacheSettings,
    pub origin: OriginSettings,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub addr: SocketAddr,
    pub graceful_shutdown: Duration,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

/// Shared by the emitter (outbound) and the invalidator (inbound).
#[derive(Debug, Clone)]
pub struct RevalidateSettings {
    pub secret: Option<String>,
    pub site_url: Option<Url>,
    pub endpoint_path: String,
    pub request_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub enable_response_cache: bool,
    pub response_limit: NonZeroUsize,
    pub response_body_limit_bytes: NonZeroUsize,
}

#[derive(Debug, Clone)]
pub struct OriginSettings {
    pub url: Option<Url>,
    pub request_timeout: Duration,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("failed to resolve command-line arguments: {0}")]
    Cli(#[from] clap::Error),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Parse the process arguments and resolve settings for them.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let cli = CliArgs::parse();
    let settings = load(&cli)?;
    Ok((cli, settings))
}

pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .separator("__")
            .try_parsing(true),
    );

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    match cli.command.as_ref() {
        Some(Command::Serve(args)) => raw.apply_serve_overrides(&args.overrides),
        Some(Command::Notify(args)) => {
            raw.apply_logging_overrides(&args.logging);
            raw.apply_revalidate_overrides(&args.revalidate);
        }
        None => raw.apply_serve_overrides(&ServeArgs::from_env()?.overrides),
    }

    Settings::from_raw(raw)
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    server: RawServerSettings,
    logging: RawLoggingSettings,
    revalidate: RawRevalidateSettings,
    cache: RawCacheSettings,
    origin: RawOriginSettings,
}

impl RawSettings {
    fn apply_serve_overrides(&mut self, overrides: &ServeOverrides) {
        if let Some(host) = overrides.server_host.as_ref() {
            self.server.host = Some(host.clone());
        }
        if let Some(port) = overrides.server_port {
            self.server.port = Some(port);
        }
        if let Some(seconds) = overrides.server_graceful_shutdown_seconds {
            self.server.graceful_shutdown_seconds = Some(seconds);
        }
        if let Some(url) = overrides.origin_url.as_ref() {
            self.origin.url = Some(url.clone());
        }
        if let Some(enabled) = overrides.cache_enable_response_cache {
            self.cache.enable_response_cache = Some(enabled);
        }
        if let Some(limit) = overrides.cache_response_limit {
            self.cache.response_limit = Some(limit);
        }

        self.apply_logging_overrides(&overrides.logging);
        self.apply_revalidate_overrides(&overrides.revalidate);
    }

    fn apply_logging_overrides(&mut self, overrides: &LoggingOverrides) {
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
    }

    fn apply_revalidate_overrides(&mut self, overrides: &RevalidateOverrides) {
        if let Some(secret) = overrides.secret.as_ref() {
            self.revalidate.secret = Some(secret.clone());
        }
        if let Some(url) = overrides.site_url.as_ref() {
            self.revalidate.site_url = Some(url.clone());
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            logging,
            revalidate,
            cache,
            origin,
        } = raw;

        Ok(Self {
            server: build_server_settings(server)?,
            logging: build_logging_settings(logging)?,
            revalidate: build_revalidate_settings(revalidate)?,
            cache: build_cache_settings(cache)?,
            origin: build_origin_settings(origin)?,
        })
    }
}

fn build_server_settings(server: RawServerSettings) -> Result<ServerSettings, LoadError> {
    let host = server.host.unwrap_or_else(|| DEFAULT_HOST.to_string());

    let port = server.port.unwrap_or(DEFAULT_PORT);
    if port == 0 {
        return Err(LoadError::invalid(
            "server.port",
            "port must be greater than zero",
        ));
    }

    let addr = parse_socket_addr(&host, port)
        .map_err(|reason| LoadError::invalid("server.addr", reason))?;

    let graceful_secs = server
        .graceful_shutdown_seconds
        .unwrap_or(DEFAULT_GRACEFUL_SHUTDOWN_SECS);
    let graceful_shutdown = Duration::from_secs(
        non_zero_u64(graceful_secs, "server.graceful_shutdown_seconds")?.get(),
    );

    Ok(ServerSettings {
        addr,
        graceful_shutdown,
    })
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_revalidate_settings(
    revalidate: RawRevalidateSettings,
) -> Result<RevalidateSettings, LoadError> {
    let secret = non_blank(revalidate.secret);
    let site_url = non_blank(revalidate.site_url)
        .map(|value| parse_url(&value, "revalidate.site_url"))
        .transpose()?;

    let endpoint_path =
        non_blank(revalidate.endpoint_path).unwrap_or_else(|| DEFAULT_ENDPOINT_PATH.to_string());
    if !endpoint_path.starts_with('/') {
        return Err(LoadError::invalid(
            "revalidate.endpoint_path",
            "path must start with `/`",
        ));
    }

    let timeout_secs = revalidate
        .request_timeout_seconds
        .unwrap_or(DEFAULT_EMIT_TIMEOUT_SECS);
    let request_timeout = Duration::from_secs(
        non_zero_u64(timeout_secs, "revalidate.request_timeout_seconds")?.get(),
    );

    Ok(RevalidateSettings {
        secret,
        site_url,
        endpoint_path,
        request_timeout,
    })
}

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheSettings, LoadError> {
    let response_limit = non_zero_usize(
        cache.response_limit.unwrap_or(DEFAULT_CACHE_RESPONSE_LIMIT),
        "cache.response_limit",
    )?;
    let response_body_limit_bytes = non_zero_usize(
        cache
            .response_body_limit_bytes
            .unwrap_or(DEFAULT_CACHE_RESPONSE_BODY_LIMIT_BYTES),
        "cache.response_body_limit_bytes",
    )?;

    Ok(CacheSettings {
        enable_response_cache: cache.enable_response_cache.unwrap_or(true),
        response_limit,
        response_body_limit_bytes,
    })
}

fn build_origin_settings(origin: RawOriginSettings) -> Result<OriginSettings, LoadError> {
    let url = non_blank(origin.url)
        .map(|value| parse_url(&value, "origin.url"))
        .transpose()?;

    let timeout_secs = origin
        .request_timeout_seconds
        .unwrap_or(DEFAULT_ORIGIN_TIMEOUT_SECS);
    let request_timeout =
        Duration::from_secs(non_zero_u64(timeout_secs, "origin.request_timeout_seconds")?.get());

    Ok(OriginSettings {
        url,
        request_timeout,
    })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServerSettings {
    host: Option<String>,
    port: Option<u16>,
    graceful_shutdown_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawRevalidateSettings {
    secret: Option<String>,
    site_url: Option<String>,
    endpoint_path: Option<String>,
    request_timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    enable_response_cache: Option<bool>,
    response_limit: Option<usize>,
    response_body_limit_bytes: Option<usize>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawOriginSettings {
    url: Option<String>,
    request_timeout_seconds: Option<u64>,
}

fn parse_socket_addr(host: &str, port: u16) -> Result<SocketAddr, String> {
    let candidate = if host.contains(':') && !host.starts_with('[') {
        format!("[{host}]:{port}")
    } else {
        format!("{host}:{port}")
    };
    candidate
        .parse()
        .map_err(|err| format!("failed to parse `{candidate}`: {err}"))
}

fn parse_url(value: &str, key: &'static str) -> Result<Url, LoadError> {
    let url = Url::parse(value)
        .map_err(|err| LoadError::invalid(key, format!("failed to parse `{value}`: {err}")))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(LoadError::invalid(key, "scheme must be http or https"));
    }
    Ok(url)
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    })
}

fn non_zero_u64(value: u64, key: &'static str) -> Result<NonZeroU64, LoadError> {
    NonZeroU64::new(value).ok_or_else(|| LoadError::invalid(key, "must be greater than zero"))
}

fn non_zero_usize(value: usize, key: &'static str) -> Result<NonZeroUsize, LoadError> {
    NonZeroUsize::new(value).ok_or_else(|| LoadError::invalid(key, "must be greater than zero"))
}
