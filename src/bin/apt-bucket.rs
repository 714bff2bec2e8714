//! Command-line harness: reads an upload notification (or none) and runs one
//! publishing pass against the configured repository.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use apt_bucket::logging::LoggingArgs;
use apt_bucket::sign::{check_gpg_available, GpgSigner};
use apt_bucket::storage::{BlobStore, LocalBlobStore};
use apt_bucket::{BackoffPolicy, OwnerId, Publisher, RepositoryConfig, UploadBatch};

#[derive(Debug, Parser)]
#[command(
    name = "apt-bucket",
    version,
    about = "Publish Debian packages into an APT repository kept in a blob store"
)]
struct Args {
    #[command(flatten)]
    logging: LoggingArgs,

    /// JSON repository configuration; replaces the repository flags below.
    #[arg(long, env = "APT_CONFIG")]
    config: Option<PathBuf>,

    #[command(flatten)]
    repository: RepositoryConfig,

    /// Blob store location: `file:///path` or `gs://`.
    #[arg(long, env = "APT_STORAGE")]
    storage: url::Url,

    /// Identity recorded in the lock object; random when unset.
    #[arg(long, env = "APT_INVOCATION_ID")]
    invocation_id: Option<String>,

    /// Attempts to take the repository lock before giving up.
    #[arg(long, default_value_t = 100)]
    lock_attempts: u32,

    #[arg(long, default_value_t = 500)]
    lock_initial_delay_ms: u64,

    #[arg(long, default_value_t = 60_000)]
    lock_max_delay_ms: u64,

    /// Abort the run after this many seconds.
    #[arg(long, env = "APT_TIMEOUT_SECS")]
    timeout_secs: Option<u64>,

    /// gpg binary used for signing.
    #[arg(long, default_value = "gpg")]
    gpg: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Ingest the uploads named in a notification.
    Publish {
        /// Notification JSON file, or `-` for stdin.
        #[arg(long, default_value = "-")]
        event: String,
    },
    /// Rebuild every index from the pool.
    Regenerate,
}

async fn open_store(location: &url::Url) -> Result<Arc<dyn BlobStore>> {
    match location.scheme() {
        "file" => {
            let path = location
                .to_file_path()
                .map_err(|_| anyhow::anyhow!("invalid file location {}", location))?;
            Ok(Arc::new(LocalBlobStore::new(&path).with_context(|| {
                format!("opening local store at {}", path.display())
            })?))
        }
        #[cfg(feature = "gcs")]
        "gs" => Ok(Arc::new(
            apt_bucket::storage::GcsBlobStore::new(None).await?,
        )),
        scheme => bail!("unsupported storage scheme {:?}", scheme),
    }
}

fn read_batch(event: &str) -> Result<UploadBatch> {
    let mut contents = String::new();
    if event == "-" {
        std::io::stdin()
            .read_to_string(&mut contents)
            .context("reading notification from stdin")?;
    } else {
        contents = std::fs::read_to_string(event)
            .with_context(|| format!("reading notification {}", event))?;
    }
    if contents.trim().is_empty() {
        return Ok(UploadBatch::default());
    }
    Ok(UploadBatch::from_reader(contents.as_bytes())?)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    args.logging.init();

    let config = match &args.config {
        Some(path) => RepositoryConfig::from_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => args.repository.clone(),
    };
    config.validate()?;

    let signer = GpgSigner::new(args.gpg.clone());
    if !check_gpg_available(signer.binary()).await {
        bail!("{} is not available", signer.binary().display());
    }

    let batch = match &args.command {
        Command::Publish { event } => {
            let batch = read_batch(event)?;
            if batch.is_empty() {
                info!("Notification carries no uploads, regenerating indices");
            }
            batch
        }
        Command::Regenerate => UploadBatch::default(),
    };

    let store = open_store(&args.storage).await?;
    let policy = BackoffPolicy {
        max_attempts: args.lock_attempts,
        initial_interval: Duration::from_millis(args.lock_initial_delay_ms),
        max_interval: Duration::from_millis(args.lock_max_delay_ms),
        ..Default::default()
    };
    let publisher = Publisher::new(config, store)
        .with_signer(Arc::new(signer))
        .with_lock_policy(policy);

    let owner = args
        .invocation_id
        .clone()
        .map(OwnerId::from)
        .unwrap_or_else(OwnerId::generate);

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted, cancelling run");
                cancel.cancel();
            }
        });
    }
    if let Some(secs) = args.timeout_secs {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(secs)).await;
            warn!(timeout_secs = secs, "Deadline reached, cancelling run");
            cancel.cancel();
        });
    }

    info!(
        owner = %owner,
        distribution = %publisher.config().distribution,
        uploads = batch.records.len(),
        "Starting run"
    );
    match publisher.run(&owner, &batch, &cancel).await {
        Ok(summary) => {
            println!("{}", serde_json::to_string_pretty(&summary)?);
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "Run failed");
            Err(e.into())
        }
    }
}
