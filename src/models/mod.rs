use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use utoipa::ToSchema;

/// An uploaded image held in the staging area until its owning entity exists.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct StagedUpload {
    pub handle: String,
    pub owner_id: String,
    pub original_file_name: String,
    pub mime_type: String,
    pub byte_size: u64,
    #[serde(skip)]
    pub staged_path: PathBuf,
    pub preview_data_url: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl StagedUpload {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// A file already written to a local temporary path by the upload boundary.
#[derive(Debug, Clone)]
pub struct InboundFile {
    pub original_file_name: String,
    pub mime_type: String,
    pub byte_size: u64,
    pub path: PathBuf,
}

/// Bytes and metadata handed to the caller when a staged upload is promoted.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PromotedUpload {
    pub file_name: String,
    pub mime_type: String,
    pub byte_size: u64,
    pub base64_data: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct StagingStats {
    pub total: usize,
    pub active: usize,
    pub expired: usize,
}
