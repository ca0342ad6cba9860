use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use std::env;
use std::fmt;

/// Which storage backend the portal talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StorageBackend {
    /// Azure Blob Storage via a pre-shared SAS token.
    Azure,
    /// Local disk payloads with SQLite metadata.
    Local,
}

impl fmt::Display for StorageBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageBackend::Azure => write!(f, "azure"),
            StorageBackend::Local => write!(f, "local"),
        }
    }
}

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub backend: StorageBackend,
    /// Azure storage account name. May be empty; the service then starts in
    /// a degraded, never-ready state instead of refusing to boot.
    pub azure_account: String,
    /// Target container (Azure) or logical container name (local).
    pub container: String,
    /// Pre-shared SAS token authorizing every Azure request.
    pub azure_sas_token: String,
    pub storage_dir: String,
    pub database_url: String,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug)]
#[command(author, version, about = "Client file portal API")]
pub struct Args {
    /// Host to bind to (overrides PORTAL_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides PORTAL_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Storage backend to use (overrides PORTAL_STORAGE_BACKEND)
    #[arg(long, value_enum)]
    pub backend: Option<StorageBackend>,

    /// Azure storage account name (overrides PORTAL_AZURE_ACCOUNT)
    #[arg(long)]
    pub azure_account: Option<String>,

    /// Container name (overrides PORTAL_CONTAINER)
    #[arg(long)]
    pub container: Option<String>,

    /// Azure SAS token (overrides PORTAL_AZURE_SAS_TOKEN)
    #[arg(long)]
    pub azure_sas_token: Option<String>,

    /// Directory where local objects are stored (overrides PORTAL_STORAGE_DIR)
    #[arg(long)]
    pub storage_dir: Option<String>,

    /// Database URL for local metadata (overrides PORTAL_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,
}

impl AppConfig {
    /// Parse environment variables + CLI args into an AppConfig.
    pub fn from_env_and_args() -> Result<Self> {
        // Parse CLI once
        let args = Args::parse();

        // --- Environment fallback ---
        let env_host = env::var("PORTAL_HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let env_port = match env::var("PORTAL_PORT") {
            Ok(value) => value
                .parse::<u16>()
                .with_context(|| format!("parsing PORTAL_PORT value `{}`", value))?,
            Err(env::VarError::NotPresent) => 3000,
            Err(err) => return Err(err).context("reading PORTAL_PORT"),
        };
        let env_backend = match env::var("PORTAL_STORAGE_BACKEND") {
            Ok(value) => Some(
                StorageBackend::from_str(&value, true)
                    .map_err(|reason| anyhow::anyhow!(reason))
                    .with_context(|| format!("parsing PORTAL_STORAGE_BACKEND value `{}`", value))?,
            ),
            Err(_) => None,
        };
        let env_account = env::var("PORTAL_AZURE_ACCOUNT").unwrap_or_default();
        let env_container = env::var("PORTAL_CONTAINER").unwrap_or_else(|_| "documents".into());
        let env_sas = env::var("PORTAL_AZURE_SAS_TOKEN").unwrap_or_default();
        let env_storage =
            env::var("PORTAL_STORAGE_DIR").unwrap_or_else(|_| "./data/objects".into());
        let env_db = env::var("PORTAL_DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://./data/meta/portal.db".into());

        // --- Merge ---
        Ok(Self {
            host: args.host.unwrap_or(env_host),
            port: args.port.unwrap_or(env_port),
            backend: args
                .backend
                .or(env_backend)
                .unwrap_or(StorageBackend::Azure),
            azure_account: args.azure_account.unwrap_or(env_account),
            container: args.container.unwrap_or(env_container),
            azure_sas_token: args.azure_sas_token.unwrap_or(env_sas),
            storage_dir: args.storage_dir.unwrap_or(env_storage),
            database_url: args.database_url.unwrap_or(env_db),
        })
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
