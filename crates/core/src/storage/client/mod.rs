//! Object storage clients.
//!
//! Two backends implement [`ObjectStorageClient`]:
//!
//! - [`AwsSdkClient`] talks to AWS S3 through the AWS SDK.
//! - [`OpendalClient`] talks to any other S3-compatible endpoint (or the
//!   in-process memory store) through Apache OpenDAL.
//!
//! Each client owns a [`TaskScheduler`]; every request is submitted to it
//! with the priority band of its operation, so a client never has more than
//! `max_concurrency` requests in flight.

mod aws;
#[cfg(test)]
pub(crate) mod fake;
mod generic;

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, NaiveDateTime, Utc};
use futures::future::join_all;
use tracing::warn;

pub use aws::AwsSdkClient;
pub use generic::OpendalClient;

use super::config::{StorageConfig, StorageProvider};
use super::error::StorageError;
use super::policy::BucketPolicy;
use super::types::{BucketInfo, ListedEntry, ObjectBody, UploadedObject};
use crate::scheduler::{Priority, TaskScheduler};

/// Largest number of keys a single batch delete request may carry.
pub const MAX_DELETE_BATCH: usize = 1000;

/// Uniform contract over S3-compatible backends.
#[async_trait]
pub trait ObjectStorageClient: Send + Sync {
    /// Short backend name for logs.
    fn backend_name(&self) -> &'static str;

    /// Creates a bucket in `region`.
    async fn create_bucket(&self, name: &str, region: &str) -> Result<(), StorageError>;

    /// Replaces the policy of a bucket.
    async fn put_bucket_policy(
        &self,
        name: &str,
        policy: &BucketPolicy,
    ) -> Result<(), StorageError>;

    /// Lists every bucket visible to the credentials.
    async fn list_buckets(&self) -> Result<Vec<BucketInfo>, StorageError>;

    /// Lists every object under `prefix`, following all pages.
    ///
    /// Non-recursive listings group keys at the first `/` below the prefix
    /// into [`ListedEntry::Prefix`] entries.
    async fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
        recursive: bool,
    ) -> Result<Vec<ListedEntry>, StorageError>;

    /// Reads a whole object.
    async fn get_object(&self, bucket: &str, name: &str) -> Result<Bytes, StorageError>;

    /// Returns whether an object exists. Not-found is `false`; other errors propagate.
    async fn object_exists(&self, bucket: &str, name: &str) -> Result<bool, StorageError>;

    /// Deletes one object.
    async fn delete_object(&self, bucket: &str, name: &str) -> Result<(), StorageError>;

    /// Deletes many objects in batches of at most [`MAX_DELETE_BATCH`].
    ///
    /// Fails with [`StorageError::BatchDelete`] naming every key whose
    /// deletion was not confirmed.
    async fn delete_objects(&self, bucket: &str, names: &[String]) -> Result<(), StorageError>;

    /// Streams `body` into `bucket/name`.
    async fn upload(
        &self,
        bucket: &str,
        name: &str,
        body: ObjectBody,
        content_type: &str,
        metadata: HashMap<String, String>,
    ) -> Result<UploadedObject, StorageError>;

    /// Deletes an (empty) bucket.
    async fn delete_bucket(&self, name: &str) -> Result<(), StorageError>;

    /// Waits for every submitted request to settle.
    async fn shutdown(&self);
}

/// Builds the client for the provider selected in `config`.
///
/// # Errors
///
/// Returns an error if the backend cannot be initialized.
pub fn build_client(config: &StorageConfig) -> Result<Arc<dyn ObjectStorageClient>, StorageError> {
    let client: Arc<dyn ObjectStorageClient> = match config.provider {
        StorageProvider::AwsSdk => Arc::new(AwsSdkClient::new(config)),
        StorageProvider::S3Compatible => Arc::new(OpendalClient::s3_compatible(config)?),
        StorageProvider::Memory => Arc::new(OpendalClient::memory(config.max_concurrency)),
    };
    Ok(client)
}

/// Runs `operation` on `scheduler` and flattens the scheduler outcome.
pub(crate) async fn schedule<F, Fut, T>(
    scheduler: &TaskScheduler,
    priority: Priority,
    operation: F,
) -> Result<T, StorageError>
where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = Result<T, StorageError>> + Send + 'static,
    T: Send + 'static,
{
    scheduler.submit(priority, operation).await?
}

/// Splits `names` into chunks of [`MAX_DELETE_BATCH`], runs `delete_chunk` on
/// all of them concurrently and aggregates the keys each chunk reports as
/// failed.
pub(crate) async fn delete_in_batches<F, Fut>(
    bucket: &str,
    names: &[String],
    delete_chunk: F,
) -> Result<(), StorageError>
where
    F: Fn(Vec<String>) -> Fut,
    Fut: Future<Output = Vec<String>>,
{
    let requests = names
        .chunks(MAX_DELETE_BATCH)
        .map(|chunk| delete_chunk(chunk.to_vec()));
    let failed_keys: Vec<String> = join_all(requests).await.into_iter().flatten().collect();

    if failed_keys.is_empty() {
        return Ok(());
    }

    warn!(
        bucket,
        requested = names.len(),
        failed = failed_keys.len(),
        "batch delete left unconfirmed objects"
    );
    Err(StorageError::BatchDelete {
        bucket: bucket.to_string(),
        failed_keys,
    })
}

/// Strips surrounding quotes, including HTML-escaped ones, from an ETag.
#[must_use]
pub fn normalize_etag(raw: &str) -> String {
    raw.replace("&quot;", "\"")
        .replace("&#34;", "\"")
        .trim_matches('"')
        .to_string()
}

/// Parses a backend timestamp rendered as RFC 3339 or as `YYYY-MM-DD HH:MM:SS[.f] UTC`.
pub(crate) fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    let trimmed = raw.trim().trim_end_matches("UTC").trim_end();
    NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}
