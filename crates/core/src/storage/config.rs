//! Storage configuration types.

use mediavault_shared::StorageSettings;

use super::error::StorageError;

/// Endpoint scheme selecting the in-process store.
pub const MEMORY_ENDPOINT: &str = "memory://";

/// Backend selected for an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageProvider {
    /// AWS S3, served through the AWS SDK.
    AwsSdk,
    /// Any other S3-compatible endpoint (MinIO, Ceph, R2, ...), served through OpenDAL.
    S3Compatible,
    /// In-process store for development and tests.
    Memory,
}

impl StorageProvider {
    /// Picks the backend for `endpoint`.
    ///
    /// # Errors
    ///
    /// Returns an error if the endpoint is not a URL with a host.
    pub fn detect(endpoint: &str) -> Result<Self, StorageError> {
        if endpoint.starts_with(MEMORY_ENDPOINT) {
            return Ok(Self::Memory);
        }

        let host = endpoint_host(endpoint).ok_or_else(|| {
            StorageError::configuration(format!("invalid storage endpoint '{endpoint}'"))
        })?;

        let host = host.to_ascii_lowercase();
        if host == "amazonaws.com" || host.ends_with(".amazonaws.com") {
            Ok(Self::AwsSdk)
        } else {
            Ok(Self::S3Compatible)
        }
    }

    /// Provider name for logs.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::AwsSdk => "aws-sdk",
            Self::S3Compatible => "s3-compatible",
            Self::Memory => "memory",
        }
    }
}

/// Host part of an `http(s)://host[:port][/path]` endpoint.
fn endpoint_host(endpoint: &str) -> Option<&str> {
    let rest = endpoint
        .strip_prefix("https://")
        .or_else(|| endpoint.strip_prefix("http://"))?;
    let authority = rest.split(['/', '?', '#']).next()?;
    let host = authority.rsplit('@').next()?;
    let host = match host.rsplit_once(':') {
        Some((name, port)) if port.chars().all(|c| c.is_ascii_digit()) => name,
        _ => host,
    };
    (!host.is_empty()).then_some(host)
}

/// Storage configuration resolved from [`StorageSettings`].
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Selected backend.
    pub provider: StorageProvider,
    /// Endpoint URL.
    pub endpoint: String,
    /// Bucket region.
    pub region: String,
    /// Access key ID.
    pub access_key: String,
    /// Secret access key.
    pub secret_key: String,
    /// Bucket all objects are stored in.
    pub bucket: String,
    /// Public CDN root URL, without trailing slash.
    pub root_url: String,
    /// Maximum number of concurrent requests per client.
    pub max_concurrency: usize,
}

impl StorageConfig {
    /// Default request concurrency per client.
    pub const DEFAULT_MAX_CONCURRENCY: usize = 100;

    /// Resolves settings into a configuration, selecting the backend once.
    ///
    /// # Errors
    ///
    /// Returns an error if the endpoint or bucket name is unusable.
    pub fn from_settings(settings: &StorageSettings) -> Result<Self, StorageError> {
        let provider = StorageProvider::detect(&settings.endpoint)?;

        if settings.bucket_name.trim().is_empty() {
            return Err(StorageError::configuration("bucket name must not be empty"));
        }

        Ok(Self {
            provider,
            endpoint: settings.endpoint.clone(),
            region: settings.region.clone(),
            access_key: settings.access_key.clone(),
            secret_key: settings.secret_key.clone(),
            bucket: settings.bucket_name.clone(),
            root_url: settings.root_url.trim_end_matches('/').to_string(),
            max_concurrency: settings.max_concurrency.max(1),
        })
    }

    /// In-process configuration for development and tests.
    #[must_use]
    pub fn memory(bucket: impl Into<String>, root_url: impl Into<String>) -> Self {
        Self {
            provider: StorageProvider::Memory,
            endpoint: MEMORY_ENDPOINT.to_string(),
            region: "us-east-1".to_string(),
            access_key: String::new(),
            secret_key: String::new(),
            bucket: bucket.into(),
            root_url: root_url.into().trim_end_matches('/').to_string(),
            max_concurrency: Self::DEFAULT_MAX_CONCURRENCY,
        }
    }

    /// Set the request concurrency.
    #[must_use]
    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency.max(1);
        self
    }
}
