use crate::config::StagingConfig;
use crate::models::{InboundFile, PromotedUpload, StagedUpload, StagingStats};
use crate::services::clock::{Clock, SystemClock};
use crate::services::worker::{ExpirySweeper, SweeperHandle};
use crate::utils::validation::staged_extension;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::fs;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum StagingError {
    #[error("failed to create staging directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to read uploaded file {path}: {source}")]
    ReadSource {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to write staged file {path}: {source}")]
    WriteStaged {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to read staged file {path}: {source}")]
    ReadStaged {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid staging config: {0}")]
    InvalidConfig(String),
}

/// Holds uploaded avatars for a short window before the chat or user that
/// owns them exists.
///
/// The in-memory index is the source of truth for metadata; the staging
/// directory holds one file per live record, named after its handle.
/// Whoever removes an entry from the index owns the deletion of its file,
/// so lazy eviction, explicit deletes, promotion and the background sweep
/// can race on the same handle without double-deleting.
pub struct TempAvatarStore {
    config: StagingConfig,
    ttl: chrono::Duration,
    clock: Arc<dyn Clock>,
    uploads: DashMap<String, StagedUpload>,
}

const DEFAULT_TTL_MINUTES: i64 = 3;

/// Converts the configured TTL once. Zero or unrepresentable values are rejected.
fn resolve_ttl(ttl: std::time::Duration) -> Result<chrono::Duration, StagingError> {
    if ttl.is_zero() {
        return Err(StagingError::InvalidConfig("ttl must be non-zero".to_string()));
    }
    chrono::Duration::from_std(ttl)
        .map_err(|_| StagingError::InvalidConfig(format!("ttl {:?} is out of range", ttl)))
}

impl TempAvatarStore {
    pub fn new(config: StagingConfig, clock: Arc<dyn Clock>) -> Self {
        let ttl = resolve_ttl(config.ttl).unwrap_or_else(|e| {
            tracing::warn!("{}; falling back to {} minutes", e, DEFAULT_TTL_MINUTES);
            chrono::Duration::minutes(DEFAULT_TTL_MINUTES)
        });

        Self {
            config,
            ttl,
            clock,
            uploads: DashMap::new(),
        }
    }

    pub fn with_system_clock(config: StagingConfig) -> Self {
        Self::new(config, Arc::new(SystemClock))
    }

    pub fn config(&self) -> &StagingConfig {
        &self.config
    }

    pub fn staging_dir(&self) -> &Path {
        &self.config.staging_dir
    }

    /// Rejects settings the store cannot run with.
    pub fn validate_config(&self) -> Result<(), StagingError> {
        resolve_ttl(self.config.ttl)?;
        if self.config.sweep_interval.is_zero() {
            return Err(StagingError::InvalidConfig(
                "sweep_interval must be non-zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Creates the staging directory if needed. Idempotent.
    pub async fn ensure_staging_dir(&self) -> Result<(), StagingError> {
        fs::create_dir_all(&self.config.staging_dir)
            .await
            .map_err(|source| StagingError::CreateDir {
                path: self.config.staging_dir.clone(),
                source,
            })
    }

    /// Validates the config, prepares the staging directory and starts the
    /// background sweep.
    ///
    /// The sweep runs until [`SweeperHandle::shutdown`] is called or the
    /// handle is dropped.
    pub async fn initialize(self: &Arc<Self>) -> Result<SweeperHandle, StagingError> {
        self.validate_config()?;
        self.ensure_staging_dir().await?;

        tracing::info!(
            "📁 Temp avatar staging at {} (ttl={:?}, sweep every {:?})",
            self.config.staging_dir.display(),
            self.config.ttl,
            self.config.sweep_interval
        );

        Ok(ExpirySweeper::spawn(self.clone(), self.config.sweep_interval))
    }

    fn staged_path_for(&self, handle: &str, original_file_name: &str) -> PathBuf {
        let name = match staged_extension(original_file_name) {
            Some(ext) => format!("{}.{}", handle, ext),
            None => handle.to_string(),
        };
        self.config.staging_dir.join(name)
    }

    /// Takes ownership of an uploaded file and stages it under a fresh handle.
    ///
    /// The record is only indexed once the staged copy is fully written, so a
    /// failure leaves nothing behind.
    pub async fn stage(
        &self,
        owner_id: &str,
        file: InboundFile,
    ) -> Result<StagedUpload, StagingError> {
        let handle = Uuid::new_v4().simple().to_string();

        let bytes = fs::read(&file.path)
            .await
            .map_err(|source| StagingError::ReadSource {
                path: file.path.clone(),
                source,
            })?;

        let preview_data_url = to_data_url(&file.mime_type, &bytes);
        let staged_path = self.staged_path_for(&handle, &file.original_file_name);

        if let Err(source) = fs::write(&staged_path, &bytes).await {
            // A partial write may have left a file behind
            let _ = fs::remove_file(&staged_path).await;
            return Err(StagingError::WriteStaged {
                path: staged_path,
                source,
            });
        }

        if let Err(e) = fs::remove_file(&file.path).await {
            tracing::warn!(
                "Staged {} but could not remove source {}: {}",
                handle,
                file.path.display(),
                e
            );
        }

        let created_at = self.clock.now();
        let upload = StagedUpload {
            handle: handle.clone(),
            owner_id: owner_id.to_string(),
            original_file_name: file.original_file_name,
            mime_type: file.mime_type,
            byte_size: file.byte_size,
            staged_path,
            preview_data_url,
            created_at,
            expires_at: created_at
                .checked_add_signed(self.ttl)
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
        };

        self.uploads.insert(handle.clone(), upload.clone());

        tracing::info!(
            "Staged temp avatar {} for owner {} ({} bytes, expires {})",
            handle,
            owner_id,
            upload.byte_size,
            upload.expires_at
        );

        Ok(upload)
    }

    /// Returns a live record. An expired one is evicted on the spot and
    /// reported as absent.
    pub async fn get(&self, handle: &str) -> Option<StagedUpload> {
        let now = self.clock.now();
        let upload = self.uploads.get(handle)?.value().clone();

        if upload.is_expired_at(now) {
            self.evict_expired(handle, now).await;
            return None;
        }

        Some(upload)
    }

    /// Snapshot of an owner's live uploads, in no particular order.
    pub async fn list_for_owner(&self, owner_id: &str) -> Vec<StagedUpload> {
        let now = self.clock.now();
        let mut live = Vec::new();
        let mut expired = Vec::new();

        for entry in self.uploads.iter() {
            let upload = entry.value();
            if upload.owner_id != owner_id {
                continue;
            }
            if upload.is_expired_at(now) {
                expired.push(upload.handle.clone());
            } else {
                live.push(upload.clone());
            }
        }

        for handle in expired {
            self.evict_expired(&handle, now).await;
        }

        live
    }

    /// Consumes a staged upload and hands back its bytes.
    ///
    /// The record is removed whether or not the caller manages to persist the
    /// result. An error means the record existed but its file could not be
    /// read; the record is gone either way.
    pub async fn promote(&self, handle: &str) -> Result<Option<PromotedUpload>, StagingError> {
        let now = self.clock.now();
        let Some((_, upload)) = self.uploads.remove(handle) else {
            return Ok(None);
        };

        if upload.is_expired_at(now) {
            tracing::debug!("Promote of expired temp avatar {}", handle);
            remove_staged_file(&upload).await;
            return Ok(None);
        }

        let read = fs::read(&upload.staged_path).await;
        remove_staged_file(&upload).await;

        let bytes = read.map_err(|source| StagingError::ReadStaged {
            path: upload.staged_path.clone(),
            source,
        })?;

        tracing::info!(
            "Promoted temp avatar {} for owner {} ({} bytes)",
            handle,
            upload.owner_id,
            bytes.len()
        );

        Ok(Some(PromotedUpload {
            file_name: upload.original_file_name,
            mime_type: upload.mime_type,
            byte_size: upload.byte_size,
            base64_data: STANDARD.encode(&bytes),
        }))
    }

    /// Removes a staged upload. Returns false for unknown or already expired
    /// handles.
    pub async fn delete(&self, handle: &str) -> bool {
        let now = self.clock.now();
        let Some((_, upload)) = self.uploads.remove(handle) else {
            return false;
        };

        remove_staged_file(&upload).await;
        !upload.is_expired_at(now)
    }

    /// Evicts `handle` if it is still indexed and expired at `now`.
    ///
    /// Safe to call redundantly: only the caller that actually removes the
    /// entry deletes the file.
    async fn evict_expired(&self, handle: &str, now: DateTime<Utc>) -> bool {
        match self
            .uploads
            .remove_if(handle, |_, upload| upload.is_expired_at(now))
        {
            Some((_, upload)) => {
                tracing::debug!("Evicted expired temp avatar {}", handle);
                remove_staged_file(&upload).await;
                true
            }
            None => false,
        }
    }

    /// One pass of the background sweep. Returns how many records were evicted.
    pub async fn sweep_expired(&self) -> usize {
        let now = self.clock.now();
        let expired: Vec<String> = self
            .uploads
            .iter()
            .filter(|entry| entry.value().is_expired_at(now))
            .map(|entry| entry.key().clone())
            .collect();

        let mut evicted = 0;
        for handle in expired {
            if self.evict_expired(&handle, now).await {
                evicted += 1;
            }
        }
        evicted
    }

    /// Classifies every indexed record against the current time. Read-only.
    pub fn stats(&self) -> StagingStats {
        let now = self.clock.now();
        let mut stats = StagingStats::default();

        for entry in self.uploads.iter() {
            stats.total += 1;
            if entry.value().is_expired_at(now) {
                stats.expired += 1;
            } else {
                stats.active += 1;
            }
        }

        stats
    }
}

fn to_data_url(mime_type: &str, bytes: &[u8]) -> String {
    format!("data:{};base64,{}", mime_type, STANDARD.encode(bytes))
}

/// Best-effort removal; the index entry is already gone.
async fn remove_staged_file(upload: &StagedUpload) {
    match fs::remove_file(&upload.staged_path).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!(
                "Staged file for {} already gone: {}",
                upload.handle,
                upload.staged_path.display()
            );
        }
        Err(e) => {
            tracing::error!(
                "Failed to delete staged file {} for {}: {}",
                upload.staged_path.display(),
                upload.handle,
                e
            );
        }
    }
}
