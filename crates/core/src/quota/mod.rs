//! Storage quota enforcement.
//!
//! Every destination is classified before any I/O happens:
//!
//! - `media/...` and `document-media/<id>/...` are public and unmetered.
//! - `room-media/<room-id>/...` is private and counted against the plan of
//!   the user owning the room.
//! - Anything else is rejected.
//!
//! Used storage is recomputed from the bucket after each private mutation.

mod error;
mod naming;
mod path;
mod service;
mod types;

#[cfg(test)]
mod tests;

pub use error::QuotaError;
pub use naming::{UNIQUE_SUFFIX_LEN, slugify, unique_object_name};
pub use path::{
    DOCUMENT_MEDIA_PREFIX, MEDIA_PREFIX, ROOM_MEDIA_PREFIX, StoragePathClassification, object_key,
    room_media_prefix,
};
pub use service::{StorageQuotaRepository, StorageQuotaService};
pub use types::{
    DeleteObjectInput, ListObjectsInput, StoragePlan, StorageUser, UploadFile, UploadFilesInput,
    UserStorage,
};
