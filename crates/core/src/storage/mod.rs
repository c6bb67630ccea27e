//! Object storage for media.
//!
//! The [`Storage`] facade is bound to one bucket and selects its backend once,
//! from the endpoint host:
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                    Storage (one bucket)                        │
//! ├────────────────────────────────────────────────────────────────┤
//! │              Arc<dyn ObjectStorageClient>                      │
//! ├───────────────────────────────┬────────────────────────────────┤
//! │ AwsSdkClient (*.amazonaws.com)│ OpendalClient (MinIO, R2, ...) │
//! │ aws-sdk-s3                    │ opendal + SDK control plane    │
//! ├───────────────────────────────┴────────────────────────────────┤
//! │          TaskScheduler per client (admin > read > write)       │
//! └────────────────────────────────────────────────────────────────┘
//! ```

mod client;
mod config;
mod error;
mod policy;
mod service;
mod types;


pub use client::{
    AwsSdkClient, MAX_DELETE_BATCH, ObjectStorageClient, OpendalClient, build_client,
    normalize_etag,
};
pub use config::{MEMORY_ENDPOINT, StorageConfig, StorageProvider};
pub use error::{BoxError, StorageError};
pub use policy::{BucketPolicy, POLICY_VERSION, PolicyStatement, Principal};
pub use service::{CREATED_ON_METADATA, DEFAULT_CONTENT_TYPE, Storage};
pub use types::{
    BucketInfo, CommonPrefix, ListedEntry, ObjectBody, StorageObject, TextEncoding,
    UploadedObject, body_from_bytes, empty_body,
};

#[cfg(test)]
pub(crate) use client::fake::RecordingClient;
