//! Generic S3-compatible client backed by Apache OpenDAL.
//!
//! OpenDAL covers the data plane only. Bucket administration goes through a
//! path-style SDK client against the same endpoint, or through an in-process
//! registry for the memory store.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use aws_sdk_s3::Client;
use bytes::{Bytes, BytesMut};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures::TryStreamExt;
use opendal::{ErrorKind, Metadata, Operator, services};
use tracing::{debug, info, warn};

use super::{ObjectStorageClient, aws, delete_in_batches, normalize_etag, parse_timestamp, schedule};
use crate::scheduler::{Priority, TaskScheduler};
use crate::storage::config::StorageConfig;
use crate::storage::error::StorageError;
use crate::storage::policy::BucketPolicy;
use crate::storage::types::{
    BucketInfo, CommonPrefix, ListedEntry, ObjectBody, StorageObject, UploadedObject,
};

enum Backend {
    S3 {
        config: Box<StorageConfig>,
        control: Client,
    },
    Memory {
        buckets: Arc<DashMap<String, DateTime<Utc>>>,
    },
}

/// Client for S3-compatible endpoints other than AWS (MinIO, Ceph, R2, ...).
pub struct OpendalClient {
    backend: Backend,
    operators: DashMap<String, Operator>,
    scheduler: TaskScheduler,
}

impl OpendalClient {
    /// Creates a client for the S3-compatible endpoint in `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if the OpenDAL operator cannot be built.
    pub fn s3_compatible(config: &StorageConfig) -> Result<Self, StorageError> {
        let client = Self {
            backend: Backend::S3 {
                config: Box::new(config.clone()),
                control: aws::sdk_client(config, true),
            },
            operators: DashMap::new(),
            scheduler: TaskScheduler::new(config.max_concurrency),
        };
        // Surface configuration errors at construction.
        client.operator(&config.bucket)?;
        Ok(client)
    }

    /// Creates a client over an in-process store. Buckets must be created
    /// before use.
    #[must_use]
    pub fn memory(max_concurrency: usize) -> Self {
        Self {
            backend: Backend::Memory {
                buckets: Arc::new(DashMap::new()),
            },
            operators: DashMap::new(),
            scheduler: TaskScheduler::new(max_concurrency),
        }
    }

    fn operator(&self, bucket: &str) -> Result<Operator, StorageError> {
        if let Some(op) = self.operators.get(bucket) {
            return Ok(op.clone());
        }

        let op = match &self.backend {
            Backend::S3 { config, .. } => {
                let builder = services::S3::default()
                    .root("/")
                    .endpoint(&config.endpoint)
                    .region(&config.region)
                    .bucket(bucket)
                    .access_key_id(&config.access_key)
                    .secret_access_key(&config.secret_key)
                    .disable_config_load();
                Operator::new(builder)
                    .map_err(|e| StorageError::configuration(e.to_string()))?
                    .finish()
            }
            Backend::Memory { buckets } => {
                if !buckets.contains_key(bucket) {
                    return Err(StorageError::not_found(format!("bucket '{bucket}'")));
                }
                Operator::new(services::Memory::default().root("/"))
                    .map_err(|e| StorageError::configuration(e.to_string()))?
                    .finish()
            }
        };

        Ok(self
            .operators
            .entry(bucket.to_string())
            .or_insert(op)
            .clone())
    }
}

fn opendal_error(err: opendal::Error, key: &str) -> StorageError {
    if err.kind() == ErrorKind::NotFound {
        StorageError::not_found(key)
    } else {
        StorageError::from(err)
    }
}

fn to_object(name: &str, meta: &Metadata) -> StorageObject {
    StorageObject {
        name: name.to_string(),
        last_modified: meta
            .last_modified()
            .and_then(|modified| parse_timestamp(&modified.to_string())),
        etag: meta.etag().map(normalize_etag).unwrap_or_default(),
        size: meta.content_length(),
    }
}

async fn list_entries(
    op: Operator,
    prefix: String,
    recursive: bool,
) -> Result<Vec<ListedEntry>, StorageError> {
    let path = if prefix.is_empty() { "/" } else { prefix.as_str() };
    let mut lister = op
        .lister_with(path)
        .recursive(recursive)
        .await
        .map_err(|err| opendal_error(err, &prefix))?;

    let mut entries = Vec::new();
    while let Some(entry) = lister.try_next().await? {
        let name = entry.path();
        if name == prefix || name == "/" {
            continue;
        }

        let meta = entry.metadata();
        if meta.is_dir() {
            if recursive {
                // A zero-byte folder marker stored as an object.
                entries.push(ListedEntry::Object(to_object(name, meta)));
            } else {
                entries.push(ListedEntry::Prefix(CommonPrefix {
                    prefix: name.to_string(),
                }));
            }
            continue;
        }

        // Some services list bare paths without sizes.
        if meta.content_length() == 0 && meta.etag().is_none() {
            let stat = op.stat(name).await.map_err(|err| opendal_error(err, name))?;
            entries.push(ListedEntry::Object(to_object(name, &stat)));
        } else {
            entries.push(ListedEntry::Object(to_object(name, meta)));
        }
    }

    Ok(entries)
}

async fn write_object(
    op: Operator,
    key: String,
    mut body: ObjectBody,
    content_type: String,
    metadata: HashMap<String, String>,
) -> Result<UploadedObject, StorageError> {
    let capability = op.info().full_capability();

    if capability.write_can_multi {
        let mut request = op.writer_with(&key);
        if capability.write_with_content_type {
            request = request.content_type(&content_type);
        }
        if capability.write_with_user_metadata {
            request = request.user_metadata(metadata);
        }
        let mut writer = request.await.map_err(|err| opendal_error(err, &key))?;

        let streamed: Result<(), StorageError> = async {
            while let Some(chunk) = body.try_next().await? {
                writer.write(chunk).await?;
            }
            Ok(())
        }
        .await;
        if let Err(err) = streamed {
            if let Err(abort) = writer.abort().await {
                warn!(key = %key, error = %abort, "failed to abort partial write");
            }
            return Err(err);
        }
        writer.close().await.map_err(|err| opendal_error(err, &key))?;
    } else {
        let mut buffer = BytesMut::new();
        while let Some(chunk) = body.try_next().await? {
            buffer.extend_from_slice(&chunk);
        }
        let mut request = op.write_with(&key, buffer.freeze());
        if capability.write_with_content_type {
            request = request.content_type(&content_type);
        }
        if capability.write_with_user_metadata {
            request = request.user_metadata(metadata);
        }
        request.await.map_err(|err| opendal_error(err, &key))?;
    }

    let meta = op.stat(&key).await.map_err(|err| opendal_error(err, &key))?;
    debug!(key = %key, size = meta.content_length(), "object stored");
    Ok(UploadedObject {
        etag: meta.etag().map(normalize_etag).unwrap_or_default(),
        name: key,
    })
}

#[async_trait]
impl ObjectStorageClient for OpendalClient {
    fn backend_name(&self) -> &'static str {
        match self.backend {
            Backend::S3 { .. } => "opendal-s3",
            Backend::Memory { .. } => "opendal-memory",
        }
    }

    async fn create_bucket(&self, name: &str, region: &str) -> Result<(), StorageError> {
        let (name, region) = (name.to_string(), region.to_string());
        match &self.backend {
            Backend::S3 { control, .. } => {
                let control = control.clone();
                schedule(&self.scheduler, Priority::ADMIN, move || async move {
                    aws::create_bucket(&control, &name, &region).await
                })
                .await
            }
            Backend::Memory { buckets } => {
                let buckets = Arc::clone(buckets);
                schedule(&self.scheduler, Priority::ADMIN, move || async move {
                    if buckets.contains_key(&name) {
                        return Err(StorageError::backend(
                            format!("create bucket '{name}'"),
                            "bucket already exists",
                        ));
                    }
                    buckets.insert(name.clone(), Utc::now());
                    info!(bucket = %name, region = %region, "bucket created");
                    Ok(())
                })
                .await
            }
        }
    }

    async fn put_bucket_policy(
        &self,
        name: &str,
        policy: &BucketPolicy,
    ) -> Result<(), StorageError> {
        let (name, policy) = (name.to_string(), policy.clone());
        match &self.backend {
            Backend::S3 { control, .. } => {
                let control = control.clone();
                schedule(&self.scheduler, Priority::ADMIN, move || async move {
                    aws::put_bucket_policy(&control, &name, &policy).await
                })
                .await
            }
            Backend::Memory { buckets } => {
                let buckets = Arc::clone(buckets);
                schedule(&self.scheduler, Priority::ADMIN, move || async move {
                    if !buckets.contains_key(&name) {
                        return Err(StorageError::not_found(format!("bucket '{name}'")));
                    }
                    let document = policy.to_json().map_err(|err| {
                        StorageError::backend(format!("serialize policy of bucket '{name}'"), err)
                    })?;
                    debug!(bucket = %name, document = %document, "bucket policy accepted");
                    Ok(())
                })
                .await
            }
        }
    }

    async fn list_buckets(&self) -> Result<Vec<BucketInfo>, StorageError> {
        match &self.backend {
            Backend::S3 { control, .. } => {
                let control = control.clone();
                schedule(&self.scheduler, Priority::ADMIN, move || async move {
                    aws::list_buckets(&control).await
                })
                .await
            }
            Backend::Memory { buckets } => {
                let buckets = Arc::clone(buckets);
                schedule(&self.scheduler, Priority::ADMIN, move || async move {
                    let mut infos: Vec<BucketInfo> = buckets
                        .iter()
                        .map(|bucket| BucketInfo {
                            name: bucket.key().clone(),
                            creation_date: Some(*bucket.value()),
                        })
                        .collect();
                    infos.sort_by(|a, b| a.name.cmp(&b.name));
                    Ok(infos)
                })
                .await
            }
        }
    }

    async fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
        recursive: bool,
    ) -> Result<Vec<ListedEntry>, StorageError> {
        debug!(bucket, prefix, recursive, "listing objects");
        let op = self.operator(bucket)?;
        let prefix = prefix.to_string();
        schedule(&self.scheduler, Priority::READ, move || {
            list_entries(op, prefix, recursive)
        })
        .await
    }

    async fn get_object(&self, bucket: &str, name: &str) -> Result<Bytes, StorageError> {
        debug!(bucket, key = name, "reading object");
        let op = self.operator(bucket)?;
        let key = name.to_string();
        schedule(&self.scheduler, Priority::READ, move || async move {
            let buffer = op.read(&key).await.map_err(|err| opendal_error(err, &key))?;
            Ok(buffer.to_bytes())
        })
        .await
    }

    async fn object_exists(&self, bucket: &str, name: &str) -> Result<bool, StorageError> {
        let op = self.operator(bucket)?;
        let key = name.to_string();
        schedule(&self.scheduler, Priority::READ, move || async move {
            match op.stat(&key).await {
                Ok(_) => Ok(true),
                Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
                Err(err) => Err(StorageError::from(err)),
            }
        })
        .await
    }

    async fn delete_object(&self, bucket: &str, name: &str) -> Result<(), StorageError> {
        let op = self.operator(bucket)?;
        let key = name.to_string();
        schedule(&self.scheduler, Priority::ADMIN, move || async move {
            op.delete(&key).await.map_err(|err| opendal_error(err, &key))?;
            debug!(key = %key, "object deleted");
            Ok(())
        })
        .await
    }

    async fn delete_objects(&self, bucket: &str, names: &[String]) -> Result<(), StorageError> {
        let op = self.operator(bucket)?;
        delete_in_batches(bucket, names, |keys| {
            let op = op.clone();
            let handle = self.scheduler.submit(Priority::ADMIN, {
                let keys = keys.clone();
                move || async move {
                    let count = keys.len();
                    match op.delete_iter(keys.clone()).await {
                        Ok(()) => Vec::new(),
                        Err(err) => {
                            warn!(keys = count, error = %err, "batch delete request failed");
                            keys
                        }
                    }
                }
            });
            async move { handle.await.unwrap_or(keys) }
        })
        .await
    }

    async fn upload(
        &self,
        bucket: &str,
        name: &str,
        body: ObjectBody,
        content_type: &str,
        metadata: HashMap<String, String>,
    ) -> Result<UploadedObject, StorageError> {
        let op = self.operator(bucket)?;
        let (key, content_type) = (name.to_string(), content_type.to_string());
        schedule(&self.scheduler, Priority::WRITE, move || {
            write_object(op, key, body, content_type, metadata)
        })
        .await
    }

    async fn delete_bucket(&self, name: &str) -> Result<(), StorageError> {
        let bucket = name.to_string();
        let result = match &self.backend {
            Backend::S3 { control, .. } => {
                let control = control.clone();
                schedule(&self.scheduler, Priority::ADMIN, move || async move {
                    aws::delete_bucket(&control, &bucket).await
                })
                .await
            }
            Backend::Memory { buckets } => {
                let op = self.operator(name)?;
                let buckets = Arc::clone(buckets);
                schedule(&self.scheduler, Priority::ADMIN, move || async move {
                    if !list_entries(op, String::new(), true).await?.is_empty() {
                        return Err(StorageError::backend(
                            format!("delete bucket '{bucket}': BucketNotEmpty"),
                            "the bucket you tried to delete is not empty",
                        ));
                    }
                    if buckets.remove(&bucket).is_none() {
                        return Err(StorageError::not_found(format!("bucket '{bucket}'")));
                    }
                    info!(bucket = %bucket, "bucket deleted");
                    Ok(())
                })
                .await
            }
        };
        if result.is_ok() {
            self.operators.remove(name);
        }
        result
    }

    async fn shutdown(&self) {
        self.scheduler.wait_idle().await;
    }
}
