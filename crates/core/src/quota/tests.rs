//! Tests for quota enforcement.

use std::collections::HashMap;
use std::io::Write;
use std::sync::{Arc, Mutex};

use mediavault_shared::{RoomId, StoragePlanId, UserId};
use tempfile::NamedTempFile;

use super::*;
use crate::storage::{ListedEntry, ObjectStorageClient, RecordingClient, Storage, StorageError};

const BUCKET: &str = "vault";

#[derive(Default)]
struct MockQuotaRepository {
    plans: HashMap<StoragePlanId, StoragePlan>,
    rooms: Vec<RoomId>,
    updates: Mutex<Vec<(UserId, u64)>>,
}

impl MockQuotaRepository {
    fn with_plan(max_size_in_bytes: u64) -> (Self, StoragePlanId) {
        let plan = StoragePlan {
            id: StoragePlanId::new(),
            name: "Basic".to_string(),
            max_size_in_bytes,
        };
        let id = plan.id;
        let repo = Self {
            plans: HashMap::from([(id, plan)]),
            ..Self::default()
        };
        (repo, id)
    }

    fn owning(mut self, rooms: &[RoomId]) -> Self {
        self.rooms = rooms.to_vec();
        self
    }

    fn updates(&self) -> Vec<(UserId, u64)> {
        self.updates.lock().unwrap().clone()
    }
}

impl StorageQuotaRepository for MockQuotaRepository {
    async fn find_storage_plan(&self, id: StoragePlanId) -> Result<Option<StoragePlan>, QuotaError> {
        Ok(self.plans.get(&id).cloned())
    }

    async fn find_owned_room_ids(&self, _user_id: UserId) -> Result<Vec<RoomId>, QuotaError> {
        Ok(self.rooms.clone())
    }

    async fn update_used_storage(
        &self,
        user_id: UserId,
        used_storage_in_bytes: u64,
    ) -> Result<(), QuotaError> {
        self.updates
            .lock()
            .unwrap()
            .push((user_id, used_storage_in_bytes));
        Ok(())
    }
}

struct Fixture {
    client: Arc<RecordingClient>,
    repo: Arc<MockQuotaRepository>,
    service: StorageQuotaService<MockQuotaRepository>,
}

fn fixture(repo: MockQuotaRepository) -> Fixture {
    let client = Arc::new(RecordingClient::with_bucket(BUCKET));
    let dyn_client: Arc<dyn ObjectStorageClient> = client.clone();
    let storage = Arc::new(Storage::with_client(
        dyn_client,
        BUCKET,
        "us-east-1",
        "https://cdn.example.com",
    ));
    let repo = Arc::new(repo);
    let service = StorageQuotaService::new(storage, Arc::clone(&repo));
    Fixture {
        client,
        repo,
        service,
    }
}

fn user(plan: Option<StoragePlanId>, used_storage_in_bytes: u64) -> StorageUser {
    StorageUser {
        id: UserId::new(),
        storage: UserStorage {
            plan,
            used_storage_in_bytes,
            reminders: Vec::new(),
        },
    }
}

/// Stages `content` on disk; `size` is what the client declared.
fn staged(original_name: &str, content: &[u8], size: u64) -> (NamedTempFile, UploadFile) {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(content).unwrap();
    let upload = UploadFile {
        original_name: original_name.to_string(),
        path: file.path().to_path_buf(),
        size,
    };
    (file, upload)
}

#[tokio::test]
async fn test_upload_over_plan_is_rejected_before_io() {
    let room = RoomId::new();
    let (repo, plan) = MockQuotaRepository::with_plan(10_000_000);
    let f = fixture(repo.owning(&[room]));
    let (_a, first) = staged("a.png", b"a", 5_000_000);
    let (_b, second) = staged("b.png", b"b", 5_000_000);

    let err = f
        .service
        .upload_files(UploadFilesInput {
            prefix: room_media_prefix(room),
            files: vec![first, second],
            user: user(Some(plan), 2_000_000),
        })
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        QuotaError::InsufficientStorage {
            available: 8_000_000,
            required: 10_000_000
        }
    ));
    assert_eq!(
        err.to_string(),
        "Insufficient storage: 8,000,000 bytes available, 10,000,000 bytes required"
    );
    assert_eq!(f.client.count("upload"), 0);
    assert!(f.repo.updates().is_empty());
}

#[tokio::test]
async fn test_upload_within_plan_recomputes_usage_across_rooms() {
    let room = RoomId::new();
    let other_room = RoomId::new();
    let (repo, plan) = MockQuotaRepository::with_plan(10_000_000);
    let f = fixture(repo.owning(&[room, other_room]));
    f.client.insert(
        BUCKET,
        &format!("{}old.bin", room_media_prefix(other_room)),
        vec![0u8; 10],
    );
    f.client.insert(
        BUCKET,
        &format!("{}foreign.bin", room_media_prefix(RoomId::new())),
        vec![0u8; 100],
    );

    let (_a, first) = staged("Quarterly Report.PDF", b"abc", 3_000_000);
    let (_b, second) = staged("photo.jpg", b"defgh", 3_000_000);
    let requester = user(Some(plan), 2_000_000);

    let uploaded = f
        .service
        .upload_files(UploadFilesInput {
            prefix: room_media_prefix(room),
            files: vec![first, second],
            user: requester.clone(),
        })
        .await
        .unwrap();

    assert_eq!(uploaded.len(), 2);
    let prefix = room_media_prefix(room);
    let report = uploaded[0].name.strip_prefix(&prefix).unwrap();
    assert!(report.starts_with("quarterly-report-"));
    assert!(report.ends_with(".pdf"));
    let photo = uploaded[1].name.strip_prefix(&prefix).unwrap();
    assert!(photo.starts_with("photo-"));
    assert_eq!(photo.len(), "photo-".len() + UNIQUE_SUFFIX_LEN + ".jpg".len());

    assert_eq!(f.client.count("upload"), 2);
    assert_eq!(f.repo.updates(), vec![(requester.id, 3 + 5 + 10)]);
}

#[tokio::test]
async fn test_unknown_destination_is_rejected_without_io() {
    let (repo, plan) = MockQuotaRepository::with_plan(10_000_000);
    let f = fixture(repo);
    let (_a, file) = staged("a.png", b"a", 1);

    let err = f
        .service
        .upload_files(UploadFilesInput {
            prefix: "other-path/media".to_string(),
            files: vec![file],
            user: user(Some(plan), 0),
        })
        .await
        .unwrap_err();

    assert_eq!(err.to_string(), "Invalid storage path 'other-path/media'");
    assert!(f.client.calls().is_empty());
}

#[tokio::test]
async fn test_private_upload_requires_plan() {
    let room = RoomId::new();
    let f = fixture(MockQuotaRepository::default().owning(&[room]));
    let (_a, file) = staged("a.png", b"a", 1);

    let err = f
        .service
        .upload_files(UploadFilesInput {
            prefix: room_media_prefix(room),
            files: vec![file],
            user: user(None, 0),
        })
        .await
        .unwrap_err();

    assert!(matches!(err, QuotaError::MissingStoragePlan));
    assert!(f.client.calls().is_empty());
}

#[tokio::test]
async fn test_private_upload_with_dangling_plan() {
    let room = RoomId::new();
    let f = fixture(MockQuotaRepository::default().owning(&[room]));
    let missing = StoragePlanId::new();
    let (_a, file) = staged("a.png", b"a", 1);

    let err = f
        .service
        .upload_files(UploadFilesInput {
            prefix: room_media_prefix(room),
            files: vec![file],
            user: user(Some(missing), 0),
        })
        .await
        .unwrap_err();

    assert!(matches!(err, QuotaError::PlanNotFound(id) if id == missing));
    assert!(f.client.calls().is_empty());
}

#[tokio::test]
async fn test_usage_above_plan_leaves_no_room() {
    let room = RoomId::new();
    let (repo, plan) = MockQuotaRepository::with_plan(1_000);
    let f = fixture(repo.owning(&[room]));
    let (_a, file) = staged("a.png", b"a", 1);

    let err = f
        .service
        .upload_files(UploadFilesInput {
            prefix: room_media_prefix(room),
            files: vec![file],
            user: user(Some(plan), 5_000),
        })
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        QuotaError::InsufficientStorage {
            available: 0,
            required: 1
        }
    ));
}

#[tokio::test]
async fn test_public_upload_skips_quota() {
    let f = fixture(MockQuotaRepository::default());
    let (_a, file) = staged("avatar.webp", b"img", 9_999_999_999);

    let uploaded = f
        .service
        .upload_files(UploadFilesInput {
            prefix: "media/avatars/".to_string(),
            files: vec![file],
            user: user(None, 0),
        })
        .await
        .unwrap();

    assert_eq!(uploaded.len(), 1);
    assert!(uploaded[0].name.starts_with("media/avatars/avatar-"));
    assert_eq!(f.client.count("list_objects"), 0);
    assert!(f.repo.updates().is_empty());
}

#[tokio::test]
async fn test_failed_upload_still_recomputes_usage() {
    let room = RoomId::new();
    let (repo, plan) = MockQuotaRepository::with_plan(10_000);
    let f = fixture(repo.owning(&[room]));
    f.client.fail_uploads();
    let (_a, file) = staged("a.png", b"a", 1);
    let requester = user(Some(plan), 0);
    let requester_id = requester.id;

    let err = f
        .service
        .upload_files(UploadFilesInput {
            prefix: room_media_prefix(room),
            files: vec![file],
            user: requester,
        })
        .await
        .unwrap_err();

    assert!(matches!(err, QuotaError::Storage(_)));
    assert_eq!(f.repo.updates(), vec![(requester_id, 0)]);
}

#[tokio::test]
async fn test_partial_upload_failure_recomputes_usage() {
    let room = RoomId::new();
    let (repo, plan) = MockQuotaRepository::with_plan(1_000_000);
    let f = fixture(repo.owning(&[room]));
    let (_a, good) = staged("a.png", &[1u8; 4096], 4096);
    let dir = tempfile::tempdir().unwrap();
    let missing = UploadFile {
        original_name: "b.png".to_string(),
        path: dir.path().join("missing.png"),
        size: 10,
    };
    let requester = user(Some(plan), 0);
    let requester_id = requester.id;

    let err = f
        .service
        .upload_files(UploadFilesInput {
            prefix: room_media_prefix(room),
            files: vec![good, missing],
            user: requester,
        })
        .await
        .unwrap_err();

    assert!(matches!(err, QuotaError::Storage(StorageError::Io(_))));
    assert_eq!(f.client.keys(BUCKET).len(), 1);
    assert_eq!(f.repo.updates(), vec![(requester_id, 4096)]);
}

#[tokio::test]
async fn test_delete_private_object_recomputes_usage() {
    let room = RoomId::new();
    let f = fixture(MockQuotaRepository::default().owning(&[room]));
    let prefix = room_media_prefix(room);
    f.client.insert(BUCKET, &format!("{prefix}a.png"), vec![0u8; 4]);
    f.client.insert(BUCKET, &format!("{prefix}b.png"), vec![0u8; 6]);
    let requester = user(None, 10);

    f.service
        .delete_object(DeleteObjectInput {
            prefix: prefix.clone(),
            object_name: "a.png".to_string(),
            user: requester.clone(),
        })
        .await
        .unwrap();

    assert_eq!(f.client.keys(BUCKET), vec![format!("{prefix}b.png")]);
    assert_eq!(f.repo.updates(), vec![(requester.id, 6)]);
}

#[tokio::test]
async fn test_delete_public_object_skips_recompute() {
    let f = fixture(MockQuotaRepository::default());
    f.client.insert(BUCKET, "media/a.png", "x");

    f.service
        .delete_object(DeleteObjectInput {
            prefix: "media".to_string(),
            object_name: "a.png".to_string(),
            user: user(None, 0),
        })
        .await
        .unwrap();

    assert!(f.client.keys(BUCKET).is_empty());
    assert!(f.repo.updates().is_empty());
}

#[tokio::test]
async fn test_delete_cannot_escape_prefix() {
    let room = RoomId::new();
    let f = fixture(MockQuotaRepository::default().owning(&[room]));

    let err = f
        .service
        .delete_object(DeleteObjectInput {
            prefix: room_media_prefix(room),
            object_name: "../../media/a.png".to_string(),
            user: user(None, 0),
        })
        .await
        .unwrap_err();

    assert!(matches!(err, QuotaError::InvalidStoragePath(_)));
    assert!(f.client.calls().is_empty());
}

#[tokio::test]
async fn test_list_objects_checks_prefix() {
    let f = fixture(MockQuotaRepository::default());
    f.client.insert(BUCKET, "media/a.png", "abc");
    f.client.insert(BUCKET, "media/nested/b.png", "de");

    let err = f
        .service
        .list_objects(ListObjectsInput {
            prefix: "secrets/".to_string(),
            recursive: true,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, QuotaError::InvalidStoragePath(_)));

    let entries = f
        .service
        .list_objects(ListObjectsInput {
            prefix: "media/".to_string(),
            recursive: false,
        })
        .await
        .unwrap();
    let names: Vec<&str> = entries.iter().map(ListedEntry::name).collect();
    assert_eq!(names, vec!["media/a.png", "media/nested/"]);
}

#[tokio::test]
async fn test_calculate_used_storage_without_rooms_is_zero() {
    let f = fixture(MockQuotaRepository::default());
    f.client.insert(BUCKET, "media/a.png", "abc");

    assert_eq!(f.service.calculate_used_storage(UserId::new()).await.unwrap(), 0);
    assert_eq!(f.client.count("list_objects"), 0);
}
