use clap::{Parser, Subcommand, ValueEnum};
use std::fmt::{Display, Formatter};
use std::path::PathBuf;
use tinylink_core::BatchItem;
use uuid::Uuid;

pub const STORAGE_BACKEND_ENV: &str = "TINYLINK_STORAGE_BACKEND";
pub const FILE_STORAGE_PATH_ENV: &str = "TINYLINK_FILE_STORAGE_PATH";
pub const DATABASE_DSN_ENV: &str = "TINYLINK_DATABASE_DSN";
pub const MAX_CONNECTIONS_ENV: &str = "TINYLINK_MAX_CONNECTIONS";
pub const MAX_CONNECTION_LIFETIME_ENV: &str = "TINYLINK_MAX_CONNECTION_LIFETIME_SECS";
pub const ACQUIRE_TIMEOUT_ENV: &str = "TINYLINK_ACQUIRE_TIMEOUT_SECS";
pub const DENYLIST_ENV: &str = "TINYLINK_DENYLIST";
pub const BASE_URL_ENV: &str = "TINYLINK_BASE_URL";
pub const OWNER_ENV: &str = "TINYLINK_OWNER";
pub const TIMEOUT_ENV: &str = "TINYLINK_TIMEOUT_SECS";
pub const LOG_FORMAT_ENV: &str = "TINYLINK_LOG_FORMAT";

pub const DEFAULT_BASE_URL: &str = "http://localhost:8080";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StorageBackendArg {
    #[value(name = "local")]
    Local,
    #[value(name = "postgres")]
    Postgres,
}

impl Display for StorageBackendArg {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageBackendArg::Local => write!(f, "local"),
            StorageBackendArg::Postgres => write!(f, "postgres"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormatArg {
    #[value(name = "text")]
    Text,
    #[value(name = "json")]
    Json,
}

impl Display for LogFormatArg {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            LogFormatArg::Text => write!(f, "text"),
            LogFormatArg::Json => write!(f, "json"),
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "tinylink", about = "Shorten, resolve and manage short links")]
pub struct CLI {
    #[arg(
        long,
        env = STORAGE_BACKEND_ENV,
        value_enum,
        default_value_t = StorageBackendArg::Local
    )]
    pub storage: StorageBackendArg,

    /// JSON file backing the local store. Without it links live only in memory.
    #[arg(long, env = FILE_STORAGE_PATH_ENV)]
    pub file_storage_path: Option<PathBuf>,

    #[arg(long, env = DATABASE_DSN_ENV, required_if_eq("storage", "postgres"))]
    pub database_dsn: Option<String>,

    #[arg(long, env = MAX_CONNECTIONS_ENV, default_value_t = 10)]
    pub max_connections: u32,

    #[arg(long, env = MAX_CONNECTION_LIFETIME_ENV)]
    pub max_connection_lifetime_secs: Option<u64>,

    #[arg(long, env = ACQUIRE_TIMEOUT_ENV, default_value_t = 5)]
    pub acquire_timeout_secs: u64,

    /// Fragments stripped from inbound URLs and codes, comma separated.
    #[arg(long, env = DENYLIST_ENV, value_delimiter = ',')]
    pub denylist: Vec<String>,

    #[arg(long, env = BASE_URL_ENV, default_value = DEFAULT_BASE_URL)]
    pub base_url: String,

    /// User the command acts as. A random one is used when omitted.
    #[arg(long, env = OWNER_ENV)]
    pub owner: Option<Uuid>,

    #[arg(long, env = TIMEOUT_ENV, default_value_t = 10)]
    pub timeout_secs: u64,

    #[arg(
        long,
        env = LOG_FORMAT_ENV,
        value_enum,
        default_value_t = LogFormatArg::Text
    )]
    pub log_format: LogFormatArg,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Shorten a URL.
    Shorten { url: String },
    /// Shorten several URLs at once, given as `correlation_id=url`.
    Batch {
        #[arg(required = true, value_parser = parse_batch_item)]
        items: Vec<BatchItem>,
    },
    /// Print the URL behind a short code.
    Resolve { code: String },
    /// List the owner's links.
    List,
    /// Delete the owner's links.
    Remove {
        #[arg(required = true)]
        codes: Vec<String>,
    },
    /// Print link and owner counts.
    Stats,
    /// Check that storage is reachable.
    Status,
}

fn parse_batch_item(value: &str) -> Result<BatchItem, String> {
    let (correlation_id, target) = value
        .split_once('=')
        .ok_or_else(|| format!("expected correlation_id=url, got '{value}'"))?;

    if correlation_id.is_empty() {
        return Err(format!("missing correlation id in '{value}'"));
    }

    Ok(BatchItem {
        correlation_id: correlation_id.to_string(),
        target: target.to_string(),
    })
}
