//! Mediavault storage provisioning
//!
//! Creates the configured bucket if needed, applies the public-read policy
//! when enabled, and logs what the bucket currently holds.

use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mediavault_core::storage::{BucketPolicy, ListedEntry, Storage, StorageConfig};
use mediavault_shared::AppConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mediavault=debug,storage_init=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::load()?;
    let storage_config = StorageConfig::from_settings(&config.storage)?;
    let storage = Storage::from_config(&storage_config)?;

    let policy = config
        .storage
        .public_read
        .then(|| BucketPolicy::public_read(storage.bucket()));
    let created = storage.ensure_bucket(policy.as_ref()).await?;

    let entries = storage.list_objects("", false).await?;
    let objects = entries.iter().filter_map(ListedEntry::as_object).count();
    let folders = entries.len() - objects;
    info!(
        bucket = %storage.bucket(),
        created,
        public_read = config.storage.public_read,
        objects,
        folders,
        "Storage ready"
    );

    storage.dispose().await;
    Ok(())
}
