//! In-memory [`ObjectStorageClient`] that records every call.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Mutex;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::TryStreamExt;

use super::{ObjectStorageClient, normalize_etag};
use crate::storage::error::StorageError;
use crate::storage::policy::BucketPolicy;
use crate::storage::types::{
    BucketInfo, CommonPrefix, ListedEntry, ObjectBody, StorageObject, UploadedObject,
};

#[derive(Debug, Clone)]
pub(crate) struct StoredObject {
    pub data: Bytes,
    pub content_type: String,
    pub metadata: HashMap<String, String>,
}

#[derive(Default)]
struct State {
    calls: Vec<String>,
    buckets: BTreeSet<String>,
    policies: HashMap<String, BucketPolicy>,
    objects: BTreeMap<(String, String), StoredObject>,
    fail_uploads: bool,
    discard_bodies: bool,
    shutdowns: usize,
}

#[derive(Default)]
pub(crate) struct RecordingClient {
    state: Mutex<State>,
}

impl RecordingClient {
    pub(crate) fn with_bucket(bucket: &str) -> Self {
        let client = Self::default();
        client.state().buckets.insert(bucket.to_string());
        client
    }

    fn state(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    fn record(&self, call: impl Into<String>) {
        self.state().calls.push(call.into());
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.state().calls.clone()
    }

    pub(crate) fn count(&self, operation: &str) -> usize {
        self.state()
            .calls
            .iter()
            .filter(|call| call.split(' ').next() == Some(operation))
            .count()
    }

    pub(crate) fn object(&self, bucket: &str, key: &str) -> Option<StoredObject> {
        self.state()
            .objects
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
    }

    pub(crate) fn keys(&self, bucket: &str) -> Vec<String> {
        self.state()
            .objects
            .keys()
            .filter(|(b, _)| b == bucket)
            .map(|(_, key)| key.clone())
            .collect()
    }

    pub(crate) fn insert(&self, bucket: &str, key: &str, data: impl Into<Bytes>) {
        self.state().objects.insert(
            (bucket.to_string(), key.to_string()),
            StoredObject {
                data: data.into(),
                content_type: "application/octet-stream".to_string(),
                metadata: HashMap::new(),
            },
        );
    }

    pub(crate) fn policy(&self, bucket: &str) -> Option<BucketPolicy> {
        self.state().policies.get(bucket).cloned()
    }

    pub(crate) fn fail_uploads(&self) {
        self.state().fail_uploads = true;
    }

    /// Accept uploads without ever polling their bodies.
    pub(crate) fn discard_bodies(&self) {
        self.state().discard_bodies = true;
    }

    pub(crate) fn shutdowns(&self) -> usize {
        self.state().shutdowns
    }
}

#[async_trait]
impl ObjectStorageClient for RecordingClient {
    fn backend_name(&self) -> &'static str {
        "recording"
    }

    async fn create_bucket(&self, name: &str, _region: &str) -> Result<(), StorageError> {
        self.record(format!("create_bucket {name}"));
        self.state().buckets.insert(name.to_string());
        Ok(())
    }

    async fn put_bucket_policy(
        &self,
        name: &str,
        policy: &BucketPolicy,
    ) -> Result<(), StorageError> {
        self.record(format!("put_bucket_policy {name}"));
        self.state()
            .policies
            .insert(name.to_string(), policy.clone());
        Ok(())
    }

    async fn list_buckets(&self) -> Result<Vec<BucketInfo>, StorageError> {
        self.record("list_buckets");
        Ok(self
            .state()
            .buckets
            .iter()
            .map(|name| BucketInfo {
                name: name.clone(),
                creation_date: None,
            })
            .collect())
    }

    async fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
        recursive: bool,
    ) -> Result<Vec<ListedEntry>, StorageError> {
        self.record(format!("list_objects {bucket}/{prefix}"));
        let state = self.state();
        let mut prefixes = BTreeSet::new();
        let mut entries = Vec::new();

        for ((b, key), object) in &state.objects {
            if b != bucket || !key.starts_with(prefix) {
                continue;
            }
            let rest = &key[prefix.len()..];
            match rest.find('/') {
                Some(slash) if !recursive => {
                    prefixes.insert(format!("{prefix}{}", &rest[..=slash]));
                }
                _ => entries.push(ListedEntry::Object(StorageObject {
                    name: key.clone(),
                    last_modified: None,
                    etag: format!("etag-{}", object.data.len()),
                    size: object.data.len() as u64,
                })),
            }
        }

        entries.extend(
            prefixes
                .into_iter()
                .map(|prefix| ListedEntry::Prefix(CommonPrefix { prefix })),
        );
        Ok(entries)
    }

    async fn get_object(&self, bucket: &str, name: &str) -> Result<Bytes, StorageError> {
        self.record(format!("get_object {name}"));
        self.object(bucket, name)
            .map(|object| object.data)
            .ok_or_else(|| StorageError::not_found(name))
    }

    async fn object_exists(&self, bucket: &str, name: &str) -> Result<bool, StorageError> {
        self.record(format!("object_exists {name}"));
        Ok(self.object(bucket, name).is_some())
    }

    async fn delete_object(&self, bucket: &str, name: &str) -> Result<(), StorageError> {
        self.record(format!("delete_object {name}"));
        self.state()
            .objects
            .remove(&(bucket.to_string(), name.to_string()));
        Ok(())
    }

    async fn delete_objects(&self, bucket: &str, names: &[String]) -> Result<(), StorageError> {
        self.record(format!("delete_objects {}", names.len()));
        let mut state = self.state();
        for name in names {
            state.objects.remove(&(bucket.to_string(), name.clone()));
        }
        Ok(())
    }

    async fn upload(
        &self,
        bucket: &str,
        name: &str,
        body: ObjectBody,
        content_type: &str,
        metadata: HashMap<String, String>,
    ) -> Result<UploadedObject, StorageError> {
        self.record(format!("upload {name}"));
        if self.state().fail_uploads {
            return Err(StorageError::backend("upload", "injected failure"));
        }
        if self.state().discard_bodies {
            drop(body);
            return Ok(UploadedObject {
                name: name.to_string(),
                etag: String::new(),
            });
        }

        let data = body
            .try_fold(BytesMut::new(), |mut buffer, chunk| async move {
                buffer.extend_from_slice(&chunk);
                Ok(buffer)
            })
            .await?
            .freeze();
        let etag = normalize_etag(&format!("\"etag-{}\"", data.len()));

        self.state().objects.insert(
            (bucket.to_string(), name.to_string()),
            StoredObject {
                data,
                content_type: content_type.to_string(),
                metadata,
            },
        );
        Ok(UploadedObject {
            name: name.to_string(),
            etag,
        })
    }

    async fn delete_bucket(&self, name: &str) -> Result<(), StorageError> {
        self.record(format!("delete_bucket {name}"));
        self.state().buckets.remove(name);
        Ok(())
    }

    async fn shutdown(&self) {
        self.record("shutdown");
        self.state().shutdowns += 1;
    }
}
