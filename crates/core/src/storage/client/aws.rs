//! SDK-native client for AWS S3 endpoints.

use std::collections::HashMap;

use async_trait::async_trait;
use aws_sdk_s3::Client;
use aws_sdk_s3::config::{BehaviorVersion, Builder, Credentials, Region};
use aws_sdk_s3::error::{DisplayErrorContext, SdkError};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{
    BucketLocationConstraint, CompletedMultipartUpload, CompletedPart, CreateBucketConfiguration,
    Delete, ObjectIdentifier,
};
use bytes::{Bytes, BytesMut};
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use tracing::{debug, info, warn};

use super::{ObjectStorageClient, delete_in_batches, normalize_etag, schedule};
use crate::scheduler::{Priority, TaskScheduler};
use crate::storage::config::StorageConfig;
use crate::storage::error::StorageError;
use crate::storage::policy::BucketPolicy;
use crate::storage::types::{
    BucketInfo, CommonPrefix, ListedEntry, ObjectBody, StorageObject, UploadedObject,
};

/// Page size for object listings.
const LIST_PAGE_SIZE: i32 = 1000;

/// Bodies at least this large are sent as multipart uploads, in parts of this size.
const MULTIPART_THRESHOLD: usize = 8 * 1024 * 1024;

/// Region AWS treats as the default; it must not be sent as a location constraint.
const DEFAULT_REGION: &str = "us-east-1";

/// Builds an SDK client for `config` with static credentials.
pub(super) fn sdk_client(config: &StorageConfig, force_path_style: bool) -> Client {
    let credentials = Credentials::new(
        config.access_key.clone(),
        config.secret_key.clone(),
        None,
        None,
        "mediavault",
    );
    let sdk_config = Builder::new()
        .behavior_version(BehaviorVersion::latest())
        .region(Region::new(config.region.clone()))
        .credentials_provider(credentials)
        .endpoint_url(config.endpoint.clone())
        .force_path_style(force_path_style)
        .build();
    Client::from_conf(sdk_config)
}

/// Wraps an SDK error, keeping its full context in the message.
fn sdk_error<E>(action: &str, err: E) -> StorageError
where
    E: std::error::Error + Send + Sync + 'static,
{
    let message = format!("{action}: {}", DisplayErrorContext(&err));
    StorageError::backend(message, err)
}

fn to_chrono(value: &aws_sdk_s3::primitives::DateTime) -> Option<DateTime<Utc>> {
    let nanos = value.subsec_nanos();
    DateTime::from_timestamp(value.secs(), nanos)
}

fn is_not_found_status<E>(err: &SdkError<E>) -> bool {
    err.raw_response()
        .is_some_and(|response| response.status().as_u16() == 404)
}

// Bucket administration, shared with the control plane of the generic client.

pub(super) async fn create_bucket(
    client: &Client,
    name: &str,
    region: &str,
) -> Result<(), StorageError> {
    let mut request = client.create_bucket().bucket(name);
    if !region.is_empty() && region != DEFAULT_REGION {
        request = request.create_bucket_configuration(
            CreateBucketConfiguration::builder()
                .location_constraint(BucketLocationConstraint::from(region))
                .build(),
        );
    }
    request
        .send()
        .await
        .map_err(|err| sdk_error("create bucket", err))?;
    info!(bucket = name, region, "bucket created");
    Ok(())
}

pub(super) async fn put_bucket_policy(
    client: &Client,
    name: &str,
    policy: &BucketPolicy,
) -> Result<(), StorageError> {
    let document = policy.to_json().map_err(|err| {
        StorageError::backend(format!("serialize policy of bucket '{name}'"), err)
    })?;
    client
        .put_bucket_policy()
        .bucket(name)
        .policy(document)
        .send()
        .await
        .map_err(|err| sdk_error("put bucket policy", err))?;
    info!(bucket = name, statements = policy.statements.len(), "bucket policy applied");
    Ok(())
}

pub(super) async fn list_buckets(client: &Client) -> Result<Vec<BucketInfo>, StorageError> {
    let output = client
        .list_buckets()
        .send()
        .await
        .map_err(|err| sdk_error("list buckets", err))?;
    Ok(output
        .buckets()
        .iter()
        .filter_map(|bucket| {
            Some(BucketInfo {
                name: bucket.name()?.to_string(),
                creation_date: bucket.creation_date().and_then(to_chrono),
            })
        })
        .collect())
}

pub(super) async fn delete_bucket(client: &Client, name: &str) -> Result<(), StorageError> {
    client
        .delete_bucket()
        .bucket(name)
        .send()
        .await
        .map_err(|err| sdk_error("delete bucket", err))?;
    info!(bucket = name, "bucket deleted");
    Ok(())
}

async fn list_all(
    client: Client,
    bucket: String,
    prefix: String,
    recursive: bool,
) -> Result<Vec<ListedEntry>, StorageError> {
    let mut entries = Vec::new();
    let mut continuation_token: Option<String> = None;

    loop {
        let output = client
            .list_objects_v2()
            .bucket(&bucket)
            .prefix(&prefix)
            .max_keys(LIST_PAGE_SIZE)
            .set_delimiter((!recursive).then(|| "/".to_string()))
            .set_continuation_token(continuation_token.take())
            .send()
            .await
            .map_err(|err| sdk_error("list objects", err))?;

        for object in output.contents() {
            let Some(key) = object.key() else { continue };
            entries.push(ListedEntry::Object(StorageObject {
                name: key.to_string(),
                last_modified: object.last_modified().and_then(to_chrono),
                etag: object.e_tag().map(normalize_etag).unwrap_or_default(),
                size: object
                    .size()
                    .and_then(|size| u64::try_from(size).ok())
                    .unwrap_or_default(),
            }));
        }
        for common in output.common_prefixes() {
            if let Some(prefix) = common.prefix() {
                entries.push(ListedEntry::Prefix(CommonPrefix {
                    prefix: prefix.to_string(),
                }));
            }
        }

        continuation_token = output.next_continuation_token().map(str::to_owned);
        if continuation_token.is_none() {
            break;
        }
    }

    Ok(entries)
}

/// Deletes one chunk and returns the keys that were not confirmed.
async fn delete_chunk(client: Client, bucket: String, keys: Vec<String>) -> Vec<String> {
    let identifiers: Result<Vec<_>, _> = keys
        .iter()
        .map(|key| ObjectIdentifier::builder().key(key).build())
        .collect();
    let request = identifiers.and_then(|objects| {
        Delete::builder()
            .set_objects(Some(objects))
            .quiet(true)
            .build()
    });
    let delete = match request {
        Ok(delete) => delete,
        Err(err) => {
            warn!(bucket = %bucket, error = %err, "invalid batch delete request");
            return keys;
        }
    };

    match client
        .delete_objects()
        .bucket(&bucket)
        .delete(delete)
        .send()
        .await
    {
        Ok(output) => output
            .errors()
            .iter()
            .filter_map(|error| {
                warn!(
                    bucket = %bucket,
                    key = error.key().unwrap_or_default(),
                    code = error.code().unwrap_or_default(),
                    "object not deleted"
                );
                error.key().map(str::to_owned)
            })
            .collect(),
        Err(err) => {
            warn!(
                bucket = %bucket,
                keys = keys.len(),
                error = %DisplayErrorContext(&err),
                "batch delete request failed"
            );
            keys
        }
    }
}

struct PendingUpload {
    client: Client,
    bucket: String,
    key: String,
    content_type: String,
    metadata: HashMap<String, String>,
}

impl PendingUpload {
    async fn run(self, mut body: ObjectBody) -> Result<UploadedObject, StorageError> {
        let mut buffer = BytesMut::new();
        while buffer.len() < MULTIPART_THRESHOLD {
            match body.try_next().await? {
                Some(chunk) => buffer.extend_from_slice(&chunk),
                None => return self.put_single(buffer.freeze()).await,
            }
        }
        self.put_multipart(buffer, body).await
    }

    async fn put_single(self, bytes: Bytes) -> Result<UploadedObject, StorageError> {
        let size = bytes.len();
        let output = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(&self.key)
            .content_type(&self.content_type)
            .set_metadata(Some(self.metadata))
            .body(ByteStream::from(bytes))
            .send()
            .await
            .map_err(|err| sdk_error("put object", err))?;
        debug!(bucket = %self.bucket, key = %self.key, size, "object stored");
        Ok(UploadedObject {
            etag: output.e_tag().map(normalize_etag).unwrap_or_default(),
            name: self.key,
        })
    }

    async fn put_multipart(
        self,
        buffer: BytesMut,
        body: ObjectBody,
    ) -> Result<UploadedObject, StorageError> {
        let created = self
            .client
            .create_multipart_upload()
            .bucket(&self.bucket)
            .key(&self.key)
            .content_type(&self.content_type)
            .set_metadata(Some(self.metadata.clone()))
            .send()
            .await
            .map_err(|err| sdk_error("create multipart upload", err))?;
        let upload_id = created
            .upload_id()
            .ok_or_else(|| StorageError::backend("create multipart upload", "missing upload id"))?
            .to_string();

        match self.upload_parts(&upload_id, buffer, body).await {
            Ok(parts) => {
                let output = self
                    .client
                    .complete_multipart_upload()
                    .bucket(&self.bucket)
                    .key(&self.key)
                    .upload_id(&upload_id)
                    .multipart_upload(
                        CompletedMultipartUpload::builder()
                            .set_parts(Some(parts))
                            .build(),
                    )
                    .send()
                    .await
                    .map_err(|err| sdk_error("complete multipart upload", err))?;
                info!(bucket = %self.bucket, key = %self.key, "multipart upload completed");
                Ok(UploadedObject {
                    etag: output.e_tag().map(normalize_etag).unwrap_or_default(),
                    name: self.key,
                })
            }
            Err(err) => {
                if let Err(abort) = self
                    .client
                    .abort_multipart_upload()
                    .bucket(&self.bucket)
                    .key(&self.key)
                    .upload_id(&upload_id)
                    .send()
                    .await
                {
                    warn!(
                        bucket = %self.bucket,
                        key = %self.key,
                        error = %DisplayErrorContext(&abort),
                        "failed to abort multipart upload"
                    );
                }
                Err(err)
            }
        }
    }

    async fn upload_parts(
        &self,
        upload_id: &str,
        mut buffer: BytesMut,
        mut body: ObjectBody,
    ) -> Result<Vec<CompletedPart>, StorageError> {
        let mut parts = Vec::new();
        let mut exhausted = false;

        while !exhausted || !buffer.is_empty() {
            while !exhausted && buffer.len() < MULTIPART_THRESHOLD {
                match body.try_next().await? {
                    Some(chunk) => buffer.extend_from_slice(&chunk),
                    None => exhausted = true,
                }
            }
            if buffer.is_empty() {
                break;
            }

            let take = buffer.len().min(MULTIPART_THRESHOLD);
            let part = buffer.split_to(take).freeze();
            let part_number = i32::try_from(parts.len() + 1)
                .map_err(|_| StorageError::unsupported("too many multipart parts"))?;

            let output = self
                .client
                .upload_part()
                .bucket(&self.bucket)
                .key(&self.key)
                .upload_id(upload_id)
                .part_number(part_number)
                .body(ByteStream::from(part))
                .send()
                .await
                .map_err(|err| sdk_error("upload part", err))?;

            parts.push(
                CompletedPart::builder()
                    .set_e_tag(output.e_tag().map(str::to_owned))
                    .part_number(part_number)
                    .build(),
            );
        }

        Ok(parts)
    }
}

/// Client for AWS S3, backed by the AWS SDK.
pub struct AwsSdkClient {
    client: Client,
    scheduler: TaskScheduler,
}

impl AwsSdkClient {
    /// Creates a client for the AWS endpoint in `config`.
    #[must_use]
    pub fn new(config: &StorageConfig) -> Self {
        Self::from_sdk_client(sdk_client(config, false), config.max_concurrency)
    }

    /// Wraps an already configured SDK client.
    #[must_use]
    pub fn from_sdk_client(client: Client, max_concurrency: usize) -> Self {
        Self {
            client,
            scheduler: TaskScheduler::new(max_concurrency),
        }
    }
}

#[async_trait]
impl ObjectStorageClient for AwsSdkClient {
    fn backend_name(&self) -> &'static str {
        "aws-sdk"
    }

    async fn create_bucket(&self, name: &str, region: &str) -> Result<(), StorageError> {
        let client = self.client.clone();
        let (name, region) = (name.to_string(), region.to_string());
        schedule(&self.scheduler, Priority::ADMIN, move || async move {
            create_bucket(&client, &name, &region).await
        })
        .await
    }

    async fn put_bucket_policy(
        &self,
        name: &str,
        policy: &BucketPolicy,
    ) -> Result<(), StorageError> {
        let client = self.client.clone();
        let (name, policy) = (name.to_string(), policy.clone());
        schedule(&self.scheduler, Priority::ADMIN, move || async move {
            put_bucket_policy(&client, &name, &policy).await
        })
        .await
    }

    async fn list_buckets(&self) -> Result<Vec<BucketInfo>, StorageError> {
        let client = self.client.clone();
        schedule(&self.scheduler, Priority::ADMIN, move || async move {
            list_buckets(&client).await
        })
        .await
    }

    async fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
        recursive: bool,
    ) -> Result<Vec<ListedEntry>, StorageError> {
        debug!(bucket, prefix, recursive, "listing objects");
        let client = self.client.clone();
        let (bucket, prefix) = (bucket.to_string(), prefix.to_string());
        schedule(&self.scheduler, Priority::READ, move || {
            list_all(client, bucket, prefix, recursive)
        })
        .await
    }

    async fn get_object(&self, bucket: &str, name: &str) -> Result<Bytes, StorageError> {
        debug!(bucket, key = name, "reading object");
        let client = self.client.clone();
        let (bucket, key) = (bucket.to_string(), name.to_string());
        schedule(&self.scheduler, Priority::READ, move || async move {
            let output = client
                .get_object()
                .bucket(&bucket)
                .key(&key)
                .send()
                .await
                .map_err(|err| {
                    let missing = err
                        .as_service_error()
                        .is_some_and(aws_sdk_s3::operation::get_object::GetObjectError::is_no_such_key);
                    if missing || is_not_found_status(&err) {
                        StorageError::not_found(key.as_str())
                    } else {
                        sdk_error("get object", err)
                    }
                })?;
            let data = output
                .body
                .collect()
                .await
                .map_err(|err| StorageError::backend(format!("read body of '{key}'"), err))?;
            Ok(data.into_bytes())
        })
        .await
    }

    async fn object_exists(&self, bucket: &str, name: &str) -> Result<bool, StorageError> {
        let client = self.client.clone();
        let (bucket, key) = (bucket.to_string(), name.to_string());
        schedule(&self.scheduler, Priority::READ, move || async move {
            match client.head_object().bucket(&bucket).key(&key).send().await {
                Ok(_) => Ok(true),
                Err(err)
                    if err
                        .as_service_error()
                        .is_some_and(aws_sdk_s3::operation::head_object::HeadObjectError::is_not_found)
                        || is_not_found_status(&err) =>
                {
                    Ok(false)
                }
                Err(err) => Err(sdk_error("head object", err)),
            }
        })
        .await
    }

    async fn delete_object(&self, bucket: &str, name: &str) -> Result<(), StorageError> {
        let client = self.client.clone();
        let (bucket, key) = (bucket.to_string(), name.to_string());
        schedule(&self.scheduler, Priority::ADMIN, move || async move {
            client
                .delete_object()
                .bucket(&bucket)
                .key(&key)
                .send()
                .await
                .map_err(|err| sdk_error("delete object", err))?;
            debug!(bucket = %bucket, key = %key, "object deleted");
            Ok(())
        })
        .await
    }

    async fn delete_objects(&self, bucket: &str, names: &[String]) -> Result<(), StorageError> {
        delete_in_batches(bucket, names, |keys| {
            let client = self.client.clone();
            let bucket = bucket.to_string();
            let handle = self.scheduler.submit(Priority::ADMIN, {
                let keys = keys.clone();
                move || delete_chunk(client, bucket, keys)
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
        let pending = PendingUpload {
            client: self.client.clone(),
            bucket: bucket.to_string(),
            key: name.to_string(),
            content_type: content_type.to_string(),
            metadata,
        };
        schedule(&self.scheduler, Priority::WRITE, move || pending.run(body)).await
    }

    async fn delete_bucket(&self, name: &str) -> Result<(), StorageError> {
        let client = self.client.clone();
        let name = name.to_string();
        schedule(&self.scheduler, Priority::ADMIN, move || async move {
            delete_bucket(&client, &name).await
        })
        .await
    }

    async fn shutdown(&self) {
        self.scheduler.wait_idle().await;
    }
}
