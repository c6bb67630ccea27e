//! Bucket policy documents.

use serde::{Deserialize, Serialize};

/// Policy language version understood by S3-compatible endpoints.
pub const POLICY_VERSION: &str = "2012-10-17";

/// A bucket policy, applied wholesale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct BucketPolicy {
    /// Policy language version.
    pub version: String,
    /// Policy statements.
    #[serde(rename = "Statement")]
    pub statements: Vec<PolicyStatement>,
}

/// One statement of a [`BucketPolicy`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PolicyStatement {
    /// Statement identifier.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sid: Option<String>,
    /// `Allow` or `Deny`.
    pub effect: String,
    /// Principals the statement applies to.
    pub principal: Principal,
    /// Actions covered by the statement.
    pub action: Vec<String>,
    /// Resource ARNs covered by the statement.
    pub resource: Vec<String>,
}

/// Principal block of a statement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    /// AWS principals, `*` for everyone.
    #[serde(rename = "AWS")]
    pub aws: Vec<String>,
}

impl BucketPolicy {
    /// Anonymous read access to every object of `bucket`.
    #[must_use]
    pub fn public_read(bucket: &str) -> Self {
        Self {
            version: POLICY_VERSION.to_string(),
            statements: vec![PolicyStatement {
                sid: Some("PublicRead".to_string()),
                effect: "Allow".to_string(),
                principal: Principal {
                    aws: vec!["*".to_string()],
                },
                action: vec!["s3:GetObject".to_string()],
                resource: vec![format!("arn:aws:s3:::{bucket}/*")],
            }],
        }
    }

    /// Serializes the document to the JSON the endpoint expects.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
