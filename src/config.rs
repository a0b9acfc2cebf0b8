use crate::{
    clients::sqlite::{PlacementConfig, default_policies, parse_policies},
    services::object_storage::{DEFAULT_KEY_FILE, OrchestratorConfig},
};
use anyhow::{Context, Result};
use clap::Parser;
use std::{env, path::PathBuf, str::FromStr};

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub namespace: String,
    pub database_url: String,
    /// Root directory of the local blob services.
    pub blob_root: String,
    pub blob_services: Vec<String>,
    pub key_file: PathBuf,
    pub chunk_size: u64,
    /// Namespace-wide version retention; unset keeps one version per name.
    pub max_versions: Option<i64>,
    /// `NAME=chunk_method;...`, replacing the built-in policies.
    pub policies: Option<String>,
    pub default_policy: String,
    pub reaper_concurrency: usize,
    pub snapshot_batch: usize,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug)]
#[command(author, version, about = "Object storage orchestration service")]
pub struct Args {
    /// Host to bind to (overrides OIO_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides OIO_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Namespace name (overrides OIO_NAMESPACE)
    #[arg(long)]
    pub namespace: Option<String>,

    /// Database URL (overrides OIO_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Directory holding the blob services (overrides OIO_BLOB_ROOT)
    #[arg(long)]
    pub blob_root: Option<String>,

    /// Comma-separated blob service names (overrides OIO_BLOB_SERVICES)
    #[arg(long)]
    pub blob_services: Option<String>,

    /// Cold-storage credentials file (overrides OIO_KEY_FILE)
    #[arg(long)]
    pub key_file: Option<PathBuf>,

    /// Maximum metachunk size in bytes (overrides OIO_CHUNK_SIZE)
    #[arg(long)]
    pub chunk_size: Option<u64>,

    /// Versions kept per object name (overrides OIO_MAX_VERSIONS)
    #[arg(long, allow_negative_numbers = true)]
    pub max_versions: Option<i64>,

    /// Storage policies as `NAME=chunk_method;...` (overrides OIO_POLICIES)
    #[arg(long)]
    pub policies: Option<String>,

    /// Policy of uploads that name none (overrides OIO_DEFAULT_POLICY)
    #[arg(long)]
    pub default_policy: Option<String>,

    /// Parallel chunk deletions when reaping (overrides OIO_REAPER_CONCURRENCY)
    #[arg(long)]
    pub reaper_concurrency: Option<usize>,

    /// Chunk records per snapshot batch (overrides OIO_SNAPSHOT_BATCH)
    #[arg(long)]
    pub snapshot_batch: Option<usize>,

    /// Run migrations and exit
    #[arg(long)]
    pub migrate: bool,
}

/// Parse `key` from the environment, falling back to `default` when unset.
fn env_parse<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(value) => value
            .parse::<T>()
            .with_context(|| format!("parsing {key} value `{value}`")),
        Err(env::VarError::NotPresent) => Ok(default),
        Err(err) => Err(err).with_context(|| format!("reading {key}")),
    }
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.is_empty())
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and migrate flag.
    pub fn from_env_and_args() -> Result<(Self, bool)> {
        Self::from_args(Args::parse())
    }

    pub fn from_args(args: Args) -> Result<(Self, bool)> {
        // --- Environment fallback ---
        let env_host = env::var("OIO_HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let env_port = env_parse("OIO_PORT", 6000u16)?;
        let env_namespace = env::var("OIO_NAMESPACE").unwrap_or_else(|_| "OPENIO".into());
        let env_db =
            env::var("OIO_DATABASE_URL").unwrap_or_else(|_| "sqlite://./data/meta/oio.db".into());
        let env_blob_root = env::var("OIO_BLOB_ROOT").unwrap_or_else(|_| "./data/blob".into());
        let env_services = env::var("OIO_BLOB_SERVICES").unwrap_or_else(|_| {
            PlacementConfig::default().services.join(",")
        });
        let env_key_file = env::var("OIO_KEY_FILE").unwrap_or_else(|_| DEFAULT_KEY_FILE.into());
        let env_chunk_size = env_parse("OIO_CHUNK_SIZE", PlacementConfig::default().chunk_size)?;
        let env_max_versions = env_opt("OIO_MAX_VERSIONS")
            .map(|v| v.parse::<i64>().with_context(|| format!("parsing OIO_MAX_VERSIONS value `{v}`")))
            .transpose()?;
        let env_default_policy =
            env::var("OIO_DEFAULT_POLICY").unwrap_or_else(|_| PlacementConfig::default().default_policy);
        let env_reaper = env_parse("OIO_REAPER_CONCURRENCY", OrchestratorConfig::default().reaper_concurrency)?;
        let env_batch = env_parse("OIO_SNAPSHOT_BATCH", OrchestratorConfig::default().snapshot_batch)?;

        // --- Merge ---
        let cfg = Self {
            host: args.host.unwrap_or(env_host),
            port: args.port.unwrap_or(env_port),
            namespace: args.namespace.unwrap_or(env_namespace),
            database_url: args.database_url.unwrap_or(env_db),
            blob_root: args.blob_root.unwrap_or(env_blob_root),
            blob_services: args
                .blob_services
                .unwrap_or(env_services)
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
            key_file: args.key_file.unwrap_or_else(|| PathBuf::from(env_key_file)),
            chunk_size: args.chunk_size.unwrap_or(env_chunk_size),
            max_versions: args.max_versions.or(env_max_versions),
            policies: args.policies.or_else(|| env_opt("OIO_POLICIES")),
            default_policy: args.default_policy.unwrap_or(env_default_policy),
            reaper_concurrency: args.reaper_concurrency.unwrap_or(env_reaper),
            snapshot_batch: args.snapshot_batch.unwrap_or(env_batch),
        };

        if cfg.chunk_size == 0 {
            anyhow::bail!("chunk size must be positive");
        }

        Ok((cfg, args.migrate))
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn placement(&self) -> Result<PlacementConfig> {
        let policies = match &self.policies {
            Some(raw) => parse_policies(raw)?,
            None => default_policies(),
        };
        if !policies.contains_key(&self.default_policy) {
            anyhow::bail!("default policy `{}` is not defined", self.default_policy);
        }
        Ok(PlacementConfig {
            services: self.blob_services.clone(),
            chunk_size: self.chunk_size,
            policies,
            default_policy: self.default_policy.clone(),
        })
    }

    pub fn orchestrator(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            namespace: self.namespace.clone(),
            reaper_concurrency: self.reaper_concurrency.max(1),
            snapshot_batch: self.snapshot_batch.max(1),
            key_file: self.key_file.clone(),
            ..OrchestratorConfig::default()
        }
    }
}
