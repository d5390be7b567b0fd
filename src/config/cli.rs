use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, builder::BoolishValueParser};

/// Command-line arguments for the Nebula binary.
#[derive(Debug, Parser)]
#[command(name = "nebula", version, about = "Nebula posts and users REST API")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "NEBULA_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Apply pending migrations and run the HTTP API.
    Serve(Box<ServeArgs>),
    /// Apply pending migrations and exit.
    Migrate(MigrateArgs),
}

#[derive(Debug, Args, Default, Clone)]
pub struct DatabaseOverride {
    /// Override the database connection URL.
    #[arg(long = "database-url", value_name = "URL")]
    pub database_url: Option<String>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: ServeOverrides,
}

#[derive(Debug, Args, Clone)]
pub struct MigrateArgs {
    #[command(flatten)]
    pub database: DatabaseOverride,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
    /// Override the listener host.
    #[arg(long = "server-host", value_name = "HOST")]
    pub server_host: Option<String>,

    /// Override the listener port.
    #[arg(long = "server-port", value_name = "PORT")]
    pub server_port: Option<u16>,

    /// Override the graceful shutdown timeout.
    #[arg(long = "server-graceful-shutdown-seconds", value_name = "SECONDS")]
    pub server_graceful_shutdown_seconds: Option<u64>,

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

    #[command(flatten)]
    pub database: DatabaseOverride,

    /// Override the database pool size.
    #[arg(long = "database-max-connections", value_name = "COUNT")]
    pub database_max_connections: Option<u32>,

    /// Override how often the initial database connection is retried.
    #[arg(long = "database-connect-retries", value_name = "COUNT")]
    pub database_connect_retries: Option<u32>,

    /// Override the page size used when a request omits or garbles `pageSize`.
    #[arg(long = "pagination-default-page-size", value_name = "COUNT")]
    pub pagination_default_page_size: Option<u64>,

    /// Override the largest accepted `pageSize`.
    #[arg(long = "pagination-max-page-size", value_name = "COUNT")]
    pub pagination_max_page_size: Option<u64>,

    /// Toggle the output cache.
    #[arg(
        long = "output-cache-enabled",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub output_cache_enabled: Option<bool>,

    /// Override the output cache entry lifetime.
    #[arg(long = "output-cache-ttl-seconds", value_name = "SECONDS")]
    pub output_cache_ttl_seconds: Option<u64>,

    /// Override the number of cached responses kept.
    #[arg(long = "output-cache-capacity", value_name = "COUNT")]
    pub output_cache_capacity: Option<u64>,

    /// Toggle the API rate limiter.
    #[arg(
        long = "rate-limit-enabled",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub rate_limit_enabled: Option<bool>,

    /// Override the rate limit window size.
    #[arg(long = "rate-limit-window-seconds", value_name = "SECONDS")]
    pub rate_limit_window_seconds: Option<u64>,

    /// Override the rate limit request ceiling.
    #[arg(long = "rate-limit-max-requests", value_name = "COUNT")]
    pub rate_limit_max_requests: Option<u64>,
}
