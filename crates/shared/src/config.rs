//! Application configuration management.

use serde::Deserialize;

/// Application configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Object storage configuration.
    pub storage: StorageSettings,
}

/// Object storage connection settings.
///
/// Supplied by the bootstrap layer; the storage core never reads the
/// environment itself.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageSettings {
    /// Endpoint URL, e.g. `https://s3.eu-central-1.amazonaws.com` or
    /// `http://localhost:9000`. `memory://` selects the in-process store.
    pub endpoint: String,
    /// Bucket region.
    #[serde(default = "default_region")]
    pub region: String,
    /// Access key ID.
    #[serde(default)]
    pub access_key: String,
    /// Secret access key.
    #[serde(default)]
    pub secret_key: String,
    /// Bucket all objects are stored in.
    pub bucket_name: String,
    /// Public CDN root URL objects are served from.
    pub root_url: String,
    /// Maximum number of concurrent requests against the endpoint.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    /// Apply the public-read bucket policy when the bucket is initialized.
    #[serde(default)]
    pub public_read: bool,
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_max_concurrency() -> usize {
    100
}

impl AppConfig {
    /// Loads configuration from environment and config files.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration cannot be loaded.
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".to_string());

        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{run_mode}")).required(false))
            .add_source(config::Environment::with_prefix("MEDIAVAULT").separator("__"))
            .build()?;

        config.try_deserialize()
    }
}
