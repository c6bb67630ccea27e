//! Quota error types.

use mediavault_shared::StoragePlanId;
use thiserror::Error;

use crate::storage::StorageError;

/// Storage quota errors.
#[derive(Debug, Error)]
pub enum QuotaError {
    /// Destination is neither public nor a room's private storage.
    #[error("Invalid storage path '{0}'")]
    InvalidStoragePath(String),

    /// Private uploads require an assigned storage plan.
    #[error("Cannot upload to private storage without a storage plan")]
    MissingStoragePlan,

    /// The user's plan reference points to no plan.
    #[error("storage plan not found: {0}")]
    PlanNotFound(StoragePlanId),

    /// The upload would exceed the plan.
    #[error(
        "Insufficient storage: {} bytes available, {} bytes required",
        group_digits(.available),
        group_digits(.required)
    )]
    InsufficientStorage {
        /// Bytes left in the plan.
        available: u64,
        /// Bytes the upload needs.
        required: u64,
    },

    /// Storage operation failed.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Repository operation failed.
    #[error("repository error: {0}")]
    Repository(String),
}

impl QuotaError {
    /// Create an invalid storage path error.
    #[must_use]
    pub fn invalid_storage_path(path: impl Into<String>) -> Self {
        Self::InvalidStoragePath(path.into())
    }

    /// Create a repository error.
    #[must_use]
    pub fn repository(msg: impl Into<String>) -> Self {
        Self::Repository(msg.into())
    }
}

/// Formats a byte count with `,` thousands separators.
#[allow(clippy::trivially_copy_pass_by_ref)]
fn group_digits(value: &u64) -> String {
    let digits = value.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, digit) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }
    grouped
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(0, "0")]
    #[case(999, "999")]
    #[case(1_000, "1,000")]
    #[case(8_000_000, "8,000,000")]
    #[case(10_000_000, "10,000,000")]
    #[case(123_456_789_012, "123,456,789,012")]
    fn test_group_digits(#[case] value: u64, #[case] expected: &str) {
        assert_eq!(group_digits(&value), expected);
    }

    #[test]
    fn test_insufficient_storage_message() {
        let err = QuotaError::InsufficientStorage {
            available: 8_000_000,
            required: 10_000_000,
        };
        assert_eq!(
            err.to_string(),
            "Insufficient storage: 8,000,000 bytes available, 10,000,000 bytes required"
        );
    }

    #[test]
    fn test_invalid_path_message() {
        assert_eq!(
            QuotaError::invalid_storage_path("other-path/media").to_string(),
            "Invalid storage path 'other-path/media'"
        );
    }
}
