//! Storage quota service implementation.

use std::sync::Arc;

use futures::future::{join_all, try_join_all};
use mediavault_shared::{RoomId, StoragePlanId, UserId};
use tracing::{debug, info, warn};

use super::error::QuotaError;
use super::naming::unique_object_name;
use super::path::{StoragePathClassification, object_key, room_media_prefix};
use super::types::{
    DeleteObjectInput, ListObjectsInput, StoragePlan, StorageUser, UploadFile, UploadFilesInput,
};
use crate::storage::{ListedEntry, Storage, UploadedObject};

/// Repository trait for quota persistence.
///
/// This trait is implemented by the persistence layer.
pub trait StorageQuotaRepository: Send + Sync {
    /// Find a storage plan by ID.
    fn find_storage_plan(
        &self,
        id: StoragePlanId,
    ) -> impl std::future::Future<Output = Result<Option<StoragePlan>, QuotaError>> + Send;

    /// List the rooms whose private storage counts against the user's plan.
    fn find_owned_room_ids(
        &self,
        user_id: UserId,
    ) -> impl std::future::Future<Output = Result<Vec<RoomId>, QuotaError>> + Send;

    /// Persist the user's recomputed usage.
    fn update_used_storage(
        &self,
        user_id: UserId,
        used_storage_in_bytes: u64,
    ) -> impl std::future::Future<Output = Result<(), QuotaError>> + Send;
}

/// Enforces storage plans on top of the [`Storage`] facade.
///
/// Usage is never incremented: after every mutation of private storage it is
/// recomputed by listing all rooms the user owns.
pub struct StorageQuotaService<R: StorageQuotaRepository> {
    storage: Arc<Storage>,
    repo: Arc<R>,
}

impl<R: StorageQuotaRepository> StorageQuotaService<R> {
    /// Create a new storage quota service.
    #[must_use]
    pub fn new(storage: Arc<Storage>, repo: Arc<R>) -> Self {
        Self { storage, repo }
    }

    /// Uploads files under `input.prefix`.
    ///
    /// Private destinations require a plan with enough room left for all
    /// files; the check happens before any object is written. Each file is
    /// stored under a unique name derived from its original name.
    ///
    /// # Errors
    ///
    /// - [`QuotaError::InvalidStoragePath`] for unknown destinations
    /// - [`QuotaError::MissingStoragePlan`] / [`QuotaError::PlanNotFound`]
    /// - [`QuotaError::InsufficientStorage`] if the files do not fit
    /// - [`QuotaError::Storage`] if an upload fails; private usage is still
    ///   recomputed so it counts the files that did land
    pub async fn upload_files(
        &self,
        input: UploadFilesInput,
    ) -> Result<Vec<UploadedObject>, QuotaError> {
        let UploadFilesInput {
            prefix,
            files,
            user,
        } = input;

        match StoragePathClassification::of(&prefix) {
            StoragePathClassification::Unknown => Err(QuotaError::invalid_storage_path(prefix)),
            StoragePathClassification::Public => self.store_files(&prefix, &files).await,
            StoragePathClassification::Private { room_id } => {
                self.ensure_capacity(&user, &files).await?;
                debug!(
                    room_id = %room_id,
                    user_id = %user.id,
                    files = files.len(),
                    "uploading private media"
                );

                match self.store_files(&prefix, &files).await {
                    Ok(uploaded) => {
                        self.refresh_used_storage(user.id).await?;
                        Ok(uploaded)
                    }
                    Err(err) => {
                        // Some files may have landed before the failure.
                        if let Err(refresh) = self.refresh_used_storage(user.id).await {
                            warn!(
                                user_id = %user.id,
                                error = %refresh,
                                "failed to recompute storage usage"
                            );
                        }
                        Err(err)
                    }
                }
            }
        }
    }

    /// Lists objects under `input.prefix`.
    ///
    /// # Errors
    ///
    /// Returns [`QuotaError::InvalidStoragePath`] for unknown prefixes.
    pub async fn list_objects(
        &self,
        input: ListObjectsInput,
    ) -> Result<Vec<ListedEntry>, QuotaError> {
        if StoragePathClassification::of(&input.prefix).is_unknown() {
            return Err(QuotaError::invalid_storage_path(input.prefix));
        }
        Ok(self
            .storage
            .list_objects(&input.prefix, input.recursive)
            .await?)
    }

    /// Deletes `input.object_name` below `input.prefix`.
    ///
    /// Deleting private media recomputes the user's usage.
    ///
    /// # Errors
    ///
    /// Returns [`QuotaError::InvalidStoragePath`] for unknown destinations or
    /// names escaping the prefix.
    pub async fn delete_object(&self, input: DeleteObjectInput) -> Result<(), QuotaError> {
        let classification = StoragePathClassification::of(&input.prefix);
        if classification.is_unknown() {
            return Err(QuotaError::invalid_storage_path(input.prefix));
        }

        let key = object_key(&input.prefix, &input.object_name);
        if StoragePathClassification::of(&key) != classification {
            return Err(QuotaError::invalid_storage_path(key));
        }

        self.storage.delete_object(&key).await?;
        info!(key = %key, user_id = %input.user.id, "object deleted");

        if matches!(classification, StoragePathClassification::Private { .. }) {
            self.refresh_used_storage(input.user.id).await?;
        }
        Ok(())
    }

    /// Sums object sizes across every room the user owns.
    ///
    /// # Errors
    ///
    /// Returns an error if the rooms cannot be loaded or a listing fails.
    pub async fn calculate_used_storage(&self, user_id: UserId) -> Result<u64, QuotaError> {
        let rooms = self.repo.find_owned_room_ids(user_id).await?;

        let listings = try_join_all(rooms.into_iter().map(|room_id| {
            let storage = Arc::clone(&self.storage);
            async move {
                storage
                    .list_objects(&room_media_prefix(room_id), true)
                    .await
            }
        }))
        .await?;

        Ok(listings
            .iter()
            .flatten()
            .map(ListedEntry::size)
            .fold(0u64, u64::saturating_add))
    }

    /// Recomputes and persists the user's usage, returning it.
    ///
    /// # Errors
    ///
    /// Returns an error if the computation or the update fails.
    pub async fn refresh_used_storage(&self, user_id: UserId) -> Result<u64, QuotaError> {
        let used = self.calculate_used_storage(user_id).await?;
        self.repo.update_used_storage(user_id, used).await?;
        debug!(user_id = %user_id, used_storage_in_bytes = used, "storage usage recomputed");
        Ok(used)
    }

    async fn ensure_capacity(
        &self,
        user: &StorageUser,
        files: &[UploadFile],
    ) -> Result<(), QuotaError> {
        let plan_id = user.storage.plan.ok_or(QuotaError::MissingStoragePlan)?;
        let plan = self
            .repo
            .find_storage_plan(plan_id)
            .await?
            .ok_or(QuotaError::PlanNotFound(plan_id))?;

        let required = files
            .iter()
            .map(|file| file.size)
            .fold(0u64, u64::saturating_add);
        let available = plan
            .max_size_in_bytes
            .saturating_sub(user.storage.used_storage_in_bytes);

        if available < required {
            warn!(
                user_id = %user.id,
                plan = %plan.name,
                available,
                required,
                "upload rejected by storage plan"
            );
            return Err(QuotaError::InsufficientStorage {
                available,
                required,
            });
        }
        Ok(())
    }

    /// Uploads every file, waiting for all of them to settle before
    /// reporting the first failure.
    async fn store_files(
        &self,
        prefix: &str,
        files: &[UploadFile],
    ) -> Result<Vec<UploadedObject>, QuotaError> {
        let uploads = files.iter().map(|file| {
            let key = object_key(prefix, &unique_object_name(&file.original_name));
            let storage = Arc::clone(&self.storage);
            async move { storage.upload_object(&key, &file.path).await }
        });
        let uploaded = join_all(uploads)
            .await
            .into_iter()
            .collect::<Result<Vec<_>, _>>()?;
        Ok(uploaded)
    }
}
