//! Quota domain types.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use mediavault_shared::{StoragePlanId, UserId};
use serde::{Deserialize, Serialize};

/// A storage plan: how many bytes of private storage a user may use.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoragePlan {
    /// Plan ID.
    pub id: StoragePlanId,
    /// Display name.
    pub name: String,
    /// Allocation in bytes.
    pub max_size_in_bytes: u64,
}

/// Storage record of a user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserStorage {
    /// Assigned plan, if any.
    pub plan: Option<StoragePlanId>,
    /// Bytes used across all private locations the user owns.
    pub used_storage_in_bytes: u64,
    /// When quota reminders were sent. Not touched by this crate.
    #[serde(default)]
    pub reminders: Vec<DateTime<Utc>>,
}

/// The user a request is made for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageUser {
    /// User ID.
    pub id: UserId,
    /// Storage record.
    pub storage: UserStorage,
}

/// A local file to upload.
#[derive(Debug, Clone)]
pub struct UploadFile {
    /// Name the file had on the client; its extension is kept.
    pub original_name: String,
    /// Where the file is staged on disk.
    pub path: PathBuf,
    /// Size in bytes.
    pub size: u64,
}

/// Input for uploading files.
#[derive(Debug, Clone)]
pub struct UploadFilesInput {
    /// Destination prefix.
    pub prefix: String,
    /// Files to upload.
    pub files: Vec<UploadFile>,
    /// Requesting user.
    pub user: StorageUser,
}

/// Input for listing objects.
#[derive(Debug, Clone)]
pub struct ListObjectsInput {
    /// Prefix to list.
    pub prefix: String,
    /// Whether to descend into sub-folders.
    pub recursive: bool,
}

/// Input for deleting an object.
#[derive(Debug, Clone)]
pub struct DeleteObjectInput {
    /// Prefix the object lives under.
    pub prefix: String,
    /// Name of the object below the prefix.
    pub object_name: String,
    /// Requesting user.
    pub user: StorageUser,
}
