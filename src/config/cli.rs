use std::path::PathBuf;

use clap::{Args, FromArgMatches, Parser, Subcommand, builder::BoolishValueParser};

/// Command-line arguments for the revalidator binary.
#[derive(Debug, Parser)]
#[command(
    name = "revalidator",
    version,
    about = "Render cache revalidation service"
)]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "REVALIDATOR_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the revalidation endpoints and the caching front.
    Serve(Box<ServeArgs>),
    /// Send a single change notification to the invalidator.
    Notify(NotifyArgs),
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: ServeOverrides,
}

impl ServeArgs {
    /// Resolve `serve` arguments when no subcommand was given, so that
    /// env-backed flags still read the environment.
    pub fn from_env() -> Result<Self, clap::Error> {
        let matches =
            Self::augment_args(clap::Command::new("serve")).try_get_matches_from(["serve"])?;
        Self::from_arg_matches(&matches)
    }
}

#[derive(Debug, Args, Default, Clone)]
pub struct LoggingOverrides {
    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct RevalidateOverrides {
    /// Shared secret expected in the `x-revalidate-secret` header.
    #[arg(
        long = "revalidate-secret",
        env = "REVALIDATE_SECRET",
        value_name = "SECRET",
        hide_env_values = true
    )]
    pub secret: Option<String>,

    /// Public base URL of the site hosting the invalidator.
    #[arg(long = "site-url", env = "NEXT_PUBLIC_SITE_URL", value_name = "URL")]
    pub site_url: Option<String>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
    #[command(flatten)]
    pub logging: LoggingOverrides,

    #[command(flatten)]
    pub revalidate: RevalidateOverrides,

    /// Override the listener host.
    #[arg(long = "server-host", value_name = "HOST")]
    pub server_host: Option<String>,

    /// Override the listener port.
    #[arg(long = "server-port", value_name = "PORT")]
    pub server_port: Option<u16>,

    /// Override the graceful shutdown timeout.
    #[arg(long = "server-graceful-shutdown-seconds", value_name = "SECONDS")]
    pub server_graceful_shutdown_seconds: Option<u64>,

    /// Origin renderer to proxy and cache page requests from.
    #[arg(long = "origin-url", value_name = "URL")]
    pub origin_url: Option<String>,

    /// Enable the in-process response cache.
    #[arg(
        long = "cache-enable-response-cache",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub cache_enable_response_cache: Option<bool>,

    /// Override the number of cached paths.
    #[arg(long = "cache-response-limit", value_name = "COUNT")]
    pub cache_response_limit: Option<usize>,
}

#[derive(Debug, Args, Clone)]
pub struct NotifyArgs {
    #[command(flatten)]
    pub logging: LoggingOverrides,

    #[command(flatten)]
    pub revalidate: RevalidateOverrides,

    /// Collection or global that changed (page, post, media, category, header, footer).
    #[arg(long, value_name = "NAME")]
    pub collection: String,

    /// Slug or identifier of the changed document; defaults to the collection name.
    #[arg(long, value_name = "SLUG")]
    pub slug: Option<String>,

    /// Report the change as a deletion.
    #[arg(long, action = clap::ArgAction::SetTrue)]
    pub delete: bool,
}
