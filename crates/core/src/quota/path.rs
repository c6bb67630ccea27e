//! Classification of storage destinations.

use mediavault_shared::RoomId;

/// Prefix of public media.
pub const MEDIA_PREFIX: &str = "media";
/// Prefix of media embedded in documents (public).
pub const DOCUMENT_MEDIA_PREFIX: &str = "document-media";
/// Prefix of per-room private media.
pub const ROOM_MEDIA_PREFIX: &str = "room-media";

/// Where a storage path points.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoragePathClassification {
    /// Publicly readable media, not counted against any plan.
    Public,
    /// Private media of one room, counted against the owner's plan.
    Private {
        /// Room owning the location.
        room_id: RoomId,
    },
    /// Anything else; always rejected.
    Unknown,
}

impl StoragePathClassification {
    /// Classifies `path` (a prefix or a full key).
    #[must_use]
    pub fn of(path: &str) -> Self {
        let trimmed = path.strip_suffix('/').unwrap_or(path);
        let segments: Vec<&str> = trimmed.split('/').collect();
        if segments
            .iter()
            .any(|segment| segment.is_empty() || *segment == "." || *segment == "..")
        {
            return Self::Unknown;
        }

        match segments.as_slice() {
            [MEDIA_PREFIX, ..] | [DOCUMENT_MEDIA_PREFIX, _, ..] => Self::Public,
            [ROOM_MEDIA_PREFIX, room, ..] => room
                .parse::<RoomId>()
                .map_or(Self::Unknown, |room_id| Self::Private { room_id }),
            _ => Self::Unknown,
        }
    }

    /// Returns true for rejected paths.
    #[must_use]
    pub fn is_unknown(self) -> bool {
        matches!(self, Self::Unknown)
    }
}

/// Listing prefix of a room's private media.
#[must_use]
pub fn room_media_prefix(room_id: RoomId) -> String {
    format!("{ROOM_MEDIA_PREFIX}/{room_id}/")
}

/// Joins a destination prefix and an object name into a key.
#[must_use]
pub fn object_key(prefix: &str, name: &str) -> String {
    format!("{}/{name}", prefix.trim_end_matches('/'))
}
