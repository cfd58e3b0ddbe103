mod cli;

use crate::cli::{Command, LogFormatArg, StorageBackendArg, CLI};
use anyhow::{bail, Context, Result};
use clap::Parser;
use std::time::Duration;
use tinylink_core::{Repository, Shortener};
use tinylink_generator::RandomGenerator;
use tinylink_shortener::{Normalizer, ShortenerService};
use tinylink_storage::{LocalRepository, PgPoolSettings, PostgresRepository};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[tokio::main]
async fn main() -> Result<()> {
    let config = CLI::parse();
    init_tracing(config.log_format);

    let owner = config.owner.unwrap_or_else(Uuid::new_v4);

    info!(
        storage_backend = %config.storage,
        owner = %owner,
        denylist_len = config.denylist.len(),
        "starting tinylink"
    );

    match config.storage {
        StorageBackendArg::Local => {
            let repository = match &config.file_storage_path {
                Some(path) => LocalRepository::open(path)
                    .await
                    .with_context(|| format!("cannot open {}", path.display()))?,
                None => LocalRepository::new(),
            };
            run(&config, owner, repository).await
        }
        StorageBackendArg::Postgres => {
            let dsn = config
                .database_dsn
                .as_deref()
                .context("database dsn is required when storage backend is postgres")?;
            let repository = PostgresRepository::connect_with(dsn, &pool_settings(&config))
                .await
                .context("cannot connect to postgres")?;
            repository
                .ensure_schema()
                .await
                .context("cannot create links schema")?;
            run(&config, owner, repository).await
        }
    }
}

fn init_tracing(format: LogFormatArg) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    // Results go to stdout, so logs stay on stderr.
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    match format {
        LogFormatArg::Text => builder.init(),
        LogFormatArg::Json => builder.json().init(),
    }
}

fn pool_settings(config: &CLI) -> PgPoolSettings {
    let builder = PgPoolSettings::builder()
        .max_connections(config.max_connections)
        .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs));

    match config.max_connection_lifetime_secs {
        Some(secs) => builder.max_lifetime(Duration::from_secs(secs)).build(),
        None => builder.build(),
    }
}

async fn run<R: Repository>(config: &CLI, owner: Uuid, repository: R) -> Result<()> {
    let service = ShortenerService::new(repository, RandomGenerator::new())
        .with_normalizer(Normalizer::new(&config.denylist));

    let deadline = Duration::from_secs(config.timeout_secs);
    let outcome = tokio::time::timeout(
        deadline,
        execute(&service, &config.command, &owner, &config.base_url),
    )
    .await;

    let closed = service.repository().close().await;

    match outcome {
        Ok(result) => result?,
        Err(_) => bail!("command timed out after {}s", config.timeout_secs),
    }
    closed.context("cannot close storage")?;

    Ok(())
}

async fn execute<S: Shortener>(
    service: &S,
    command: &Command,
    owner: &Uuid,
    base_url: &str,
) -> Result<()> {
    match command {
        Command::Shorten { url } => {
            let shortened = service.shorten(url, owner).await?;
            if shortened.already_exists() {
                warn!(code = %shortened.code(), "url was already shortened");
            }
            println!("{}", shortened.code().to_url(base_url));
        }
        Command::Batch { items } => {
            for entry in service.batch_shorten(items.clone(), owner).await? {
                println!("{}\t{}", entry.correlation_id, entry.code.to_url(base_url));
            }
        }
        Command::Resolve { code } => {
            println!("{}", service.resolve(code).await?);
        }
        Command::List => {
            for link in service.list_owned(owner).await? {
                println!("{}\t{}", link.code.to_url(base_url), link.target);
            }
        }
        Command::Remove { codes } => {
            let count = service.remove(codes, owner).await?;
            println!("{count}");
        }
        Command::Stats => {
            let stats = service.stats().await?;
            println!("links: {}\nowners: {}", stats.links, stats.owners);
        }
        Command::Status => {
            let healthy = service.status().await?;
            println!("{}", if healthy { "ok" } else { "unavailable" });
        }
    }

    Ok(())
}
