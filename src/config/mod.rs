//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{
    net::SocketAddr,
    num::NonZeroU32,
    path::PathBuf,
    str::FromStr,
    time::Duration,
};

use clap::{Args, Parser, Subcommand, builder::BoolishValueParser};
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

use crate::domain::types::RootKind;

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "specchio";
const DEFAULT_ADMIN_HOST: &str = "127.0.0.1";
const DEFAULT_ADMIN_PORT: u16 = 3001;
const DEFAULT_GRACEFUL_SHUTDOWN_SECS: u64 = 30;
const DEFAULT_DB_MAX_CONNECTIONS: u32 = 8;
const DEFAULT_SYNC_LIMIT: u64 = 100;
const DEFAULT_FRESHNESS_TTL_SECS: u64 = 600;
const DEFAULT_ADMIN_PAGE_SIZE: u32 = crate::application::pagination::DEFAULT_PAGE_SIZE;
const DEFAULT_REMOTE_TIMEOUT_SECS: u64 = 30;

/// Command-line arguments for the Specchio binary.
#[derive(Debug, Parser)]
#[command(name = "specchio", version, about = "Specchio asset-cache service")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(
        long = "config-file",
        env = "SPECCHIO_CONFIG_FILE",
        value_name = "PATH"
    )]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the admin HTTP service.
    Serve(Box<ServeArgs>),
    /// Apply pending database migrations and exit.
    #[command(name = "migrations")]
    Migrations(MigrationsArgs),
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: ServeOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct DatabaseOverride {
    /// Override the database connection URL.
    #[arg(long = "database-url", value_name = "URL")]
    pub database_url: Option<String>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
    /// Override the administrative listener host.
    #[arg(long = "server-admin-host", value_name = "HOST")]
    pub admin_host: Option<String>,

    /// Override the administrative listener port.
    #[arg(long = "server-admin-port", value_name = "PORT")]
    pub admin_port: Option<u16>,

    /// Override the graceful shutdown timeout.
    #[arg(long = "server-graceful-shutdown-seconds", value_name = "SECONDS")]
    pub graceful_shutdown_seconds: Option<u64>,

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

    /// Override the database connection URL.
    #[arg(long = "database-url", value_name = "URL")]
    pub database_url: Option<String>,

    /// Override the database pool size.
    #[arg(long = "database-max-connections", value_name = "COUNT")]
    pub database_max_connections: Option<u32>,

    /// Override the per-request sync queue cap.
    #[arg(long = "cache-sync-limit", value_name = "COUNT")]
    pub cache_sync_limit: Option<u64>,

    /// Override the freshness window for unresolved cache attempts.
    #[arg(long = "cache-freshness-ttl-seconds", value_name = "SECONDS")]
    pub cache_freshness_ttl_seconds: Option<u64>,

    /// Override the admin listing page size.
    #[arg(long = "cache-admin-page-size", value_name = "COUNT")]
    pub cache_admin_page_size: Option<u32>,

    /// Override the remote sync endpoint URL.
    #[arg(long = "remote-endpoint", value_name = "URL")]
    pub remote_endpoint: Option<String>,
}

#[derive(Debug, Args, Clone)]
pub struct MigrationsArgs {
    #[command(flatten)]
    pub database: DatabaseOverride,
}

/// Fully-resolved deployment settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub database: DatabaseSettings,
    pub cache: CacheSettings,
    pub remote: RemoteSettings,
    pub roots: Vec<RootSettings>,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub admin_addr: SocketAddr,
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

#[derive(Debug, Clone)]
pub struct DatabaseSettings {
    pub url: Option<String>,
    pub max_connections: NonZeroU32,
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub sync_limit: usize,
    pub freshness_ttl: Duration,
    pub admin_page_size: u32,
    /// Cache points registered and activated at startup.
    pub points: Vec<CachePointSeed>,
}

/// A cache point declared in configuration: `[[cache.points]]`.
#[derive(Debug, Clone, Deserialize)]
pub struct CachePointSeed {
    pub url: String,
    pub source_path: String,
    #[serde(default)]
    pub version: String,
}

#[derive(Debug, Clone)]
pub struct RemoteSettings {
    pub endpoint: Option<String>,
    pub timeout: Duration,
}

/// One configured asset root: `[roots.code]`, `[roots.uploads]`, ...
#[derive(Debug, Clone)]
pub struct RootSettings {
    pub kind: RootKind,
    pub url_prefix: String,
    pub dir: PathBuf,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
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

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix("SPECCHIO").separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    match cli.command.as_ref() {
        Some(Command::Serve(args)) => raw.apply_serve_overrides(&args.overrides),
        Some(Command::Migrations(args)) => raw.apply_database_override(&args.database),
        None => raw.apply_serve_overrides(&ServeOverrides::default()),
    }

    Settings::from_raw(raw)
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    server: RawServerSettings,
    logging: RawLoggingSettings,
    database: RawDatabaseSettings,
    cache: RawCacheSettings,
    remote: RawRemoteSettings,
    roots: RawRootsSettings,
}

impl RawSettings {
    fn apply_serve_overrides(&mut self, overrides: &ServeOverrides) {
        if let Some(host) = overrides.admin_host.as_ref() {
            self.server.admin_host = Some(host.clone());
        }
        if let Some(port) = overrides.admin_port {
            self.server.admin_port = Some(port);
        }
        if let Some(seconds) = overrides.graceful_shutdown_seconds {
            self.server.graceful_shutdown_seconds = Some(seconds);
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(url) = overrides.database_url.as_ref() {
            self.database.url = Some(url.clone());
        }
        if let Some(max) = overrides.database_max_connections {
            self.database.max_connections = Some(max);
        }
        if let Some(limit) = overrides.cache_sync_limit {
            self.cache.sync_limit = Some(limit);
        }
        if let Some(seconds) = overrides.cache_freshness_ttl_seconds {
            self.cache.freshness_ttl_seconds = Some(seconds);
        }
        if let Some(size) = overrides.cache_admin_page_size {
            self.cache.admin_page_size = Some(size);
        }
        if let Some(endpoint) = overrides.remote_endpoint.as_ref() {
            self.remote.endpoint = Some(endpoint.clone());
        }
    }

    fn apply_database_override(&mut self, overrides: &DatabaseOverride) {
        if let Some(url) = overrides.database_url.as_ref() {
            self.database.url = Some(url.clone());
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            logging,
            database,
            cache,
            remote,
            roots,
        } = raw;

        Ok(Self {
            server: build_server_settings(server)?,
            logging: build_logging_settings(logging)?,
            database: build_database_settings(database)?,
            cache: build_cache_settings(cache)?,
            remote: build_remote_settings(remote)?,
            roots: build_root_settings(roots)?,
        })
    }
}

fn build_server_settings(server: RawServerSettings) -> Result<ServerSettings, LoadError> {
    let admin_host = server
        .admin_host
        .unwrap_or_else(|| DEFAULT_ADMIN_HOST.to_string());

    let admin_port = server.admin_port.unwrap_or(DEFAULT_ADMIN_PORT);
    if admin_port == 0 {
        return Err(LoadError::invalid(
            "server.admin_port",
            "port must be greater than zero",
        ));
    }

    let admin_addr = parse_socket_addr(&admin_host, admin_port)
        .map_err(|reason| LoadError::invalid("server.admin_addr", reason))?;

    let graceful_secs = server
        .graceful_shutdown_seconds
        .unwrap_or(DEFAULT_GRACEFUL_SHUTDOWN_SECS);
    if graceful_secs == 0 {
        return Err(LoadError::invalid(
            "server.graceful_shutdown_seconds",
            "must be greater than zero",
        ));
    }

    Ok(ServerSettings {
        admin_addr,
        graceful_shutdown: Duration::from_secs(graceful_secs),
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

fn build_database_settings(database: RawDatabaseSettings) -> Result<DatabaseSettings, LoadError> {
    let url = database.url.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    });

    let max_value = database
        .max_connections
        .unwrap_or(DEFAULT_DB_MAX_CONNECTIONS);
    let max_connections = non_zero_u32(max_value.into(), "database.max_connections")?;

    Ok(DatabaseSettings {
        url,
        max_connections,
    })
}

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheSettings, LoadError> {
    let sync_limit = cache.sync_limit.unwrap_or(DEFAULT_SYNC_LIMIT);
    if sync_limit == 0 {
        return Err(LoadError::invalid(
            "cache.sync_limit",
            "must be greater than zero",
        ));
    }
    let sync_limit = usize::try_from(sync_limit)
        .map_err(|_| LoadError::invalid("cache.sync_limit", "value exceeds supported range"))?;

    let ttl_secs = cache
        .freshness_ttl_seconds
        .unwrap_or(DEFAULT_FRESHNESS_TTL_SECS);
    if ttl_secs == 0 {
        return Err(LoadError::invalid(
            "cache.freshness_ttl_seconds",
            "must be greater than zero",
        ));
    }

    let admin_page_size = cache.admin_page_size.unwrap_or(DEFAULT_ADMIN_PAGE_SIZE);
    if admin_page_size == 0 {
        return Err(LoadError::invalid(
            "cache.admin_page_size",
            "must be greater than zero",
        ));
    }

    for (index, point) in cache.points.iter().enumerate() {
        if point.url.trim().is_empty() || point.source_path.trim().is_empty() {
            return Err(LoadError::invalid(
                "cache.points",
                format!("entry {index} requires both `url` and `source_path`"),
            ));
        }
    }

    Ok(CacheSettings {
        sync_limit,
        freshness_ttl: Duration::from_secs(ttl_secs),
        admin_page_size,
        points: cache.points,
    })
}

fn build_remote_settings(remote: RawRemoteSettings) -> Result<RemoteSettings, LoadError> {
    let endpoint = remote.endpoint.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    });

    let timeout_secs = remote
        .timeout_seconds
        .unwrap_or(DEFAULT_REMOTE_TIMEOUT_SECS);
    if timeout_secs == 0 {
        return Err(LoadError::invalid(
            "remote.timeout_seconds",
            "must be greater than zero",
        ));
    }

    Ok(RemoteSettings {
        endpoint,
        timeout: Duration::from_secs(timeout_secs),
    })
}

fn build_root_settings(roots: RawRootsSettings) -> Result<Vec<RootSettings>, LoadError> {
    let mut settings = Vec::new();
    let entries = [
        (RootKind::Code, roots.code),
        (RootKind::Content, roots.content),
        (RootKind::Uploads, roots.uploads),
        (RootKind::Admin, roots.admin),
        (RootKind::Includes, roots.includes),
        (RootKind::Home, roots.home),
    ];
    for (kind, entry) in entries {
        let Some(entry) = entry else { continue };
        if entry.url_prefix.trim().is_empty() {
            return Err(LoadError::invalid(
                "roots",
                format!("`{}` root requires a url_prefix", kind.as_str()),
            ));
        }
        if entry.dir.as_os_str().is_empty() {
            return Err(LoadError::invalid(
                "roots",
                format!("`{}` root requires a dir", kind.as_str()),
            ));
        }
        settings.push(RootSettings {
            kind,
            url_prefix: entry.url_prefix,
            dir: entry.dir,
        });
    }
    Ok(settings)
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServerSettings {
    admin_host: Option<String>,
    admin_port: Option<u16>,
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
struct RawDatabaseSettings {
    url: Option<String>,
    max_connections: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    sync_limit: Option<u64>,
    freshness_ttl_seconds: Option<u64>,
    admin_page_size: Option<u32>,
    points: Vec<CachePointSeed>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawRemoteSettings {
    endpoint: Option<String>,
    timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawRootsSettings {
    code: Option<RawRootEntry>,
    content: Option<RawRootEntry>,
    uploads: Option<RawRootEntry>,
    admin: Option<RawRootEntry>,
    includes: Option<RawRootEntry>,
    home: Option<RawRootEntry>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawRootEntry {
    url_prefix: String,
    dir: PathBuf,
}

fn parse_socket_addr(host: &str, port: u16) -> Result<SocketAddr, String> {
    let candidate = format!("{host}:{port}");
    candidate
        .parse()
        .map_err(|err| format!("invalid address `{candidate}`: {err}"))
}

fn non_zero_u32(value: u64, key: &'static str) -> Result<NonZeroU32, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    let value_u32: u32 = value
        .try_into()
        .map_err(|_| LoadError::invalid(key, "value exceeds supported range for u32"))?;
    NonZeroU32::new(value_u32).ok_or_else(|| LoadError::invalid(key, "must be greater than zero"))
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_overrides_take_highest_precedence() {
        let mut raw = RawSettings::default();
        raw.server.admin_port = Some(4000);
        raw.logging.level = Some("info".to_string());

        let overrides = ServeOverrides {
            admin_port: Some(4321),
            log_level: Some("debug".to_string()),
            ..Default::default()
        };

        raw.apply_serve_overrides(&overrides);
        let settings = Settings::from_raw(raw).expect("valid settings");

        assert_eq!(settings.server.admin_addr.port(), 4321);
        assert_eq!(settings.logging.level, LevelFilter::DEBUG);
    }

    #[test]
    fn cache_defaults_apply() {
        let raw = RawSettings::default();
        let settings = Settings::from_raw(raw).expect("valid settings");
        assert_eq!(settings.cache.sync_limit, 100);
        assert_eq!(settings.cache.freshness_ttl, Duration::from_secs(600));
        assert_eq!(settings.cache.admin_page_size, 20);
    }

    #[test]
    fn zero_sync_limit_is_rejected() {
        let mut raw = RawSettings::default();
        raw.cache.sync_limit = Some(0);
        assert!(Settings::from_raw(raw).is_err());
    }

    #[test]
    fn cli_json_logging_enforces_format() {
        let mut raw = RawSettings::default();
        let overrides = ServeOverrides {
            log_json: Some(true),
            ..Default::default()
        };

        raw.apply_serve_overrides(&overrides);
        let settings = Settings::from_raw(raw).expect("valid settings");

        assert!(matches!(settings.logging.format, LogFormat::Json));
    }

    #[test]
    fn default_to_serve_command() {
        let args = CliArgs::parse_from(["specchio"]);
        let command = args
            .command
            .unwrap_or(Command::Serve(Box::<ServeArgs>::default()));
        assert!(matches!(command, Command::Serve(_)));
    }

    #[test]
    fn parse_serve_overrides() {
        let args = CliArgs::parse_from([
            "specchio",
            "serve",
            "--cache-sync-limit",
            "25",
            "--database-url",
            "postgres://override",
        ]);

        match args.command.expect("serve command") {
            Command::Serve(serve) => {
                assert_eq!(serve.overrides.cache_sync_limit, Some(25));
                assert_eq!(
                    serve.overrides.database_url.as_deref(),
                    Some("postgres://override")
                );
            }
            _ => panic!("wrong command parsed"),
        }
    }

    #[test]
    fn parse_migrations_arguments() {
        let args = CliArgs::parse_from([
            "specchio",
            "migrations",
            "--database-url",
            "postgres://example",
        ]);

        match args.command.expect("migrations command") {
            Command::Migrations(mig) => {
                assert_eq!(
                    mig.database.database_url.as_deref(),
                    Some("postgres://example")
                );
            }
            _ => panic!("wrong command parsed"),
        }
    }
}
