//! Storage facade bound to one bucket.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

use bytes::Bytes;
use chrono::Utc;
use futures::{StreamExt, TryStreamExt, stream};
use reqwest::StatusCode;
use reqwest::header::CONTENT_TYPE;
use tokio_util::io::ReaderStream;
use tracing::{debug, info, warn};

use super::client::{ObjectStorageClient, build_client, schedule};
use super::config::StorageConfig;
use super::error::StorageError;
use super::policy::BucketPolicy;
use super::types::{
    ListedEntry, ObjectBody, TextEncoding, UploadedObject, body_from_bytes, empty_body,
};
use crate::scheduler::{Priority, TaskScheduler};

/// Metadata key stamped on every upload.
pub const CREATED_ON_METADATA: &str = "created-on";

/// Fallback content type for unknown extensions.
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Object storage for one bucket.
///
/// The backend is selected once at construction; callers only see the
/// [`ObjectStorageClient`] contract.
pub struct Storage {
    client: RwLock<Option<Arc<dyn ObjectStorageClient>>>,
    bucket: String,
    region: String,
    root_url: String,
    http: reqwest::Client,
    fetches: TaskScheduler,
}

impl Storage {
    /// Create a storage facade from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be initialized.
    pub fn from_config(config: &StorageConfig) -> Result<Self, StorageError> {
        let client = build_client(config)?;
        info!(
            provider = config.provider.name(),
            backend = client.backend_name(),
            bucket = %config.bucket,
            max_concurrency = config.max_concurrency,
            "storage initialized"
        );
        Ok(Self::with_client(
            client,
            config.bucket.clone(),
            config.region.clone(),
            config.root_url.clone(),
        )
        .with_fetch_concurrency(config.max_concurrency))
    }

    /// Create a storage facade over an existing client.
    #[must_use]
    pub fn with_client(
        client: Arc<dyn ObjectStorageClient>,
        bucket: impl Into<String>,
        region: impl Into<String>,
        root_url: impl Into<String>,
    ) -> Self {
        Self {
            client: RwLock::new(Some(client)),
            bucket: bucket.into(),
            region: region.into(),
            root_url: root_url.into().trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
            fetches: TaskScheduler::new(StorageConfig::DEFAULT_MAX_CONCURRENCY),
        }
    }

    /// Limit how many remote sources are fetched at once.
    #[must_use]
    pub fn with_fetch_concurrency(mut self, max_concurrency: usize) -> Self {
        self.fetches = TaskScheduler::new(max_concurrency);
        self
    }

    /// Set the HTTP client used to fetch remote sources.
    #[must_use]
    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }

    /// Bucket all operations are bound to.
    #[must_use]
    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Browser-facing URL of an object.
    #[must_use]
    pub fn object_url(&self, key: &str) -> String {
        format!("{}/{key}", self.root_url)
    }

    fn client(&self) -> Result<Arc<dyn ObjectStorageClient>, StorageError> {
        self.client
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(StorageError::Disposed)
    }

    /// Creates the bucket if it does not exist yet, then applies `policy`.
    ///
    /// Returns `true` if the bucket was created.
    ///
    /// # Errors
    ///
    /// Returns an error if listing, creation or the policy update fails.
    pub async fn ensure_bucket(&self, policy: Option<&BucketPolicy>) -> Result<bool, StorageError> {
        let client = self.client()?;
        let exists = client
            .list_buckets()
            .await?
            .iter()
            .any(|bucket| bucket.name == self.bucket);

        if !exists {
            client.create_bucket(&self.bucket, &self.region).await?;
        }
        if let Some(policy) = policy {
            client.put_bucket_policy(&self.bucket, policy).await?;
        }

        debug!(bucket = %self.bucket, created = !exists, "bucket ready");
        Ok(!exists)
    }

    /// Uploads a local file as `name`.
    ///
    /// The content type is inferred from the name's extension. The file is
    /// opened once the backend starts reading the body.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or the upload fails.
    pub async fn upload_object(
        &self,
        name: &str,
        file_path: &Path,
    ) -> Result<UploadedObject, StorageError> {
        let client = self.client()?;
        let key = normalize_key(name);
        let body = file_body(file_path.to_path_buf());

        let uploaded = client
            .upload(&self.bucket, &key, body, &content_type_for(&key), created_on())
            .await?;
        info!(bucket = %self.bucket, key = %uploaded.name, "object uploaded");
        Ok(uploaded)
    }

    /// Uploads an in-memory payload as `name`.
    ///
    /// # Errors
    ///
    /// Returns an error if the upload fails.
    pub async fn upload_buffer(
        &self,
        name: &str,
        data: impl Into<Bytes>,
    ) -> Result<UploadedObject, StorageError> {
        let client = self.client()?;
        let key = normalize_key(name);
        client
            .upload(
                &self.bucket,
                &key,
                body_from_bytes(data),
                &content_type_for(&key),
                created_on(),
            )
            .await
    }

    /// Streams the body of `source_url` into `name`.
    ///
    /// The source is only requested once a fetch slot is free, and the
    /// response stays open until the upload settles. A source answering 404
    /// is skipped with a warning and yields `None`.
    ///
    /// # Errors
    ///
    /// Returns an error if the fetch fails with any other status or the
    /// upload fails.
    pub async fn upload_object_from_url(
        &self,
        name: &str,
        source_url: &str,
    ) -> Result<Option<UploadedObject>, StorageError> {
        let client = self.client()?;
        let mirror = Mirror {
            http: self.http.clone(),
            client,
            bucket: self.bucket.clone(),
            key: normalize_key(name),
            source_url: source_url.to_string(),
        };
        schedule(&self.fetches, Priority::WRITE, move || mirror.run()).await
    }

    /// Stores a zero-byte placeholder under `name`.
    ///
    /// # Errors
    ///
    /// Returns an error if the upload fails.
    pub async fn upload_empty_object(&self, name: &str) -> Result<UploadedObject, StorageError> {
        let client = self.client()?;
        let key = normalize_key(name);
        client
            .upload(
                &self.bucket,
                &key,
                empty_body(),
                DEFAULT_CONTENT_TYPE,
                created_on(),
            )
            .await
    }

    /// Reads a whole object.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NotFound`] if the object does not exist.
    pub async fn get_object_as_buffer(&self, name: &str) -> Result<Bytes, StorageError> {
        self.client()?.get_object(&self.bucket, name).await
    }

    /// Reads a whole object as text.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Encoding`] if the content is not valid in
    /// `encoding`.
    pub async fn get_object_as_string(
        &self,
        name: &str,
        encoding: TextEncoding,
    ) -> Result<String, StorageError> {
        let data = self.get_object_as_buffer(name).await?;
        encoding.decode(&data).ok_or_else(|| StorageError::Encoding {
            key: name.to_string(),
            encoding: encoding.as_str(),
        })
    }

    /// Lists objects under `prefix`.
    ///
    /// # Errors
    ///
    /// Returns an error if the listing fails.
    pub async fn list_objects(
        &self,
        prefix: &str,
        recursive: bool,
    ) -> Result<Vec<ListedEntry>, StorageError> {
        self.client()?
            .list_objects(&self.bucket, prefix, recursive)
            .await
    }

    /// Deletes one object.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    pub async fn delete_object(&self, name: &str) -> Result<(), StorageError> {
        self.client()?.delete_object(&self.bucket, name).await
    }

    /// Deletes many objects.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::BatchDelete`] naming every unconfirmed key.
    pub async fn delete_objects(&self, names: &[String]) -> Result<(), StorageError> {
        self.client()?.delete_objects(&self.bucket, names).await
    }

    /// Returns whether an object exists.
    ///
    /// # Errors
    ///
    /// Returns an error for failures other than not-found.
    pub async fn object_exists(&self, name: &str) -> Result<bool, StorageError> {
        self.client()?.object_exists(&self.bucket, name).await
    }

    /// Releases the client once its pending requests have settled.
    ///
    /// Calling this more than once is a no-op.
    pub async fn dispose(&self) {
        let client = self
            .client
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        match client {
            Some(client) => {
                self.fetches.wait_idle().await;
                client.shutdown().await;
                info!(bucket = %self.bucket, "storage disposed");
            }
            None => debug!(bucket = %self.bucket, "storage already disposed"),
        }
    }
}

/// A remote source to copy into the bucket.
struct Mirror {
    http: reqwest::Client,
    client: Arc<dyn ObjectStorageClient>,
    bucket: String,
    key: String,
    source_url: String,
}

impl Mirror {
    async fn run(self) -> Result<Option<UploadedObject>, StorageError> {
        let response = self.http.get(&self.source_url).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            warn!(
                source_url = %self.source_url,
                key = %self.key,
                "source not found, skipping upload"
            );
            return Ok(None);
        }
        let response = response.error_for_status()?;

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map_or_else(|| content_type_for(&self.key), str::to_owned);
        let body: ObjectBody = response.bytes_stream().map_err(StorageError::from).boxed();

        let uploaded = self
            .client
            .upload(&self.bucket, &self.key, body, &content_type, created_on())
            .await?;
        info!(source_url = %self.source_url, key = %uploaded.name, "remote source mirrored");
        Ok(Some(uploaded))
    }
}

/// Streams a local file, opening it on the first poll.
fn file_body(path: PathBuf) -> ObjectBody {
    stream::once(tokio::fs::File::open(path))
        .map_ok(ReaderStream::new)
        .try_flatten()
        .map_err(StorageError::from)
        .boxed()
}

fn normalize_key(name: &str) -> String {
    name.replace('\\', "/")
}

fn content_type_for(key: &str) -> String {
    mime_guess::from_path(key)
        .first()
        .map_or_else(|| DEFAULT_CONTENT_TYPE.to_string(), |mime| mime.to_string())
}

fn created_on() -> HashMap<String, String> {
    HashMap::from([(CREATED_ON_METADATA.to_string(), Utc::now().to_rfc3339())])
}
