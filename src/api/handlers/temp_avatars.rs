use crate::AppState;
use crate::api::error::AppError;
use crate::api::middleware::owner::Owner;
use crate::models::{InboundFile, PromotedUpload, StagedUpload, StagingStats};
use crate::utils::validation::{sanitize_filename, validate_avatar_image, validate_file_size};
use axum::{
    Extension, Json,
    extract::{Multipart, Path, State},
    http::StatusCode,
};
use std::io::Write;
use std::path::PathBuf;

#[utoipa::path(
    post,
    path = "/temp-avatars",
    request_body(content = Object, description = "Avatar image file", content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Avatar staged", body = StagedUpload),
        (status = 400, description = "No file in request"),
        (status = 401, description = "Unauthorized"),
        (status = 413, description = "File too large"),
        (status = 415, description = "Not an accepted image type")
    ),
    tag = "temp-avatars"
)]
pub async fn upload_temp_avatar(
    State(state): State<AppState>,
    Extension(owner): Extension<Owner>,
    mut multipart: Multipart,
) -> Result<Json<StagedUpload>, AppError> {
    let mut received = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(e.to_string()))?
    {
        // Skip plain form fields; the first file field is the avatar
        let Some(name) = field.file_name() else {
            continue;
        };
        let file_name = sanitize_filename(name);
        let content_type = field.content_type().map(|s| s.to_string());
        let data = field
            .bytes()
            .await
            .map_err(|e| AppError::BadRequest(e.to_string()))?;
        received = Some((file_name, content_type, data));
        break;
    }

    let (file_name, content_type, data) =
        received.ok_or_else(|| AppError::BadRequest("No file found in request".to_string()))?;

    validate_file_size(data.len(), state.config.max_file_size)?;
    let mime_type = validate_avatar_image(content_type.as_deref(), &data)?;
    let byte_size = data.len() as u64;

    let temp_path = write_temp_file(data).await?;
    let inbound = InboundFile {
        original_file_name: file_name,
        mime_type,
        byte_size,
        path: temp_path.clone(),
    };

    match state.store.stage(&owner.id, inbound).await {
        Ok(upload) => Ok(Json(upload)),
        Err(e) => {
            let _ = tokio::fs::remove_file(&temp_path).await;
            Err(e.into())
        }
    }
}

/// Puts the received bytes on local disk, where the store expects inbound files.
async fn write_temp_file(data: bytes::Bytes) -> Result<PathBuf, AppError> {
    tokio::task::spawn_blocking(move || -> std::io::Result<PathBuf> {
        let mut file = tempfile::Builder::new()
            .prefix("avatar-upload-")
            .tempfile()?;
        file.write_all(&data)?;
        file.flush()?;
        let (_, path) = file.keep().map_err(|e| e.error)?;
        Ok(path)
    })
    .await
    .map_err(|e| AppError::Internal(e.to_string()))?
    .map_err(|e| AppError::Internal(format!("Failed to buffer upload: {}", e)))
}

#[utoipa::path(
    get,
    path = "/temp-avatars",
    responses(
        (status = 200, description = "Caller's pending avatar uploads", body = Vec<StagedUpload>),
        (status = 401, description = "Unauthorized")
    ),
    tag = "temp-avatars"
)]
pub async fn list_temp_avatars(
    State(state): State<AppState>,
    Extension(owner): Extension<Owner>,
) -> Json<Vec<StagedUpload>> {
    Json(state.store.list_for_owner(&owner.id).await)
}

/// Resolves a handle only if it belongs to the caller. Foreign handles look
/// exactly like missing ones.
async fn find_owned(state: &AppState, owner: &Owner, handle: &str) -> Result<StagedUpload, AppError> {
    state
        .store
        .get(handle)
        .await
        .filter(|upload| upload.owner_id == owner.id)
        .ok_or_else(|| AppError::NotFound("Temp avatar not found".to_string()))
}

#[utoipa::path(
    get,
    path = "/temp-avatars/{handle}",
    params(
        ("handle" = String, Path, description = "Staged upload handle")
    ),
    responses(
        (status = 200, description = "Staged upload", body = StagedUpload),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Unknown or expired handle")
    ),
    tag = "temp-avatars"
)]
pub async fn get_temp_avatar(
    State(state): State<AppState>,
    Extension(owner): Extension<Owner>,
    Path(handle): Path<String>,
) -> Result<Json<StagedUpload>, AppError> {
    Ok(Json(find_owned(&state, &owner, &handle).await?))
}

#[utoipa::path(
    delete,
    path = "/temp-avatars/{handle}",
    params(
        ("handle" = String, Path, description = "Staged upload handle")
    ),
    responses(
        (status = 204, description = "Staged upload removed"),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Unknown or expired handle")
    ),
    tag = "temp-avatars"
)]
pub async fn delete_temp_avatar(
    State(state): State<AppState>,
    Extension(owner): Extension<Owner>,
    Path(handle): Path<String>,
) -> Result<StatusCode, AppError> {
    find_owned(&state, &owner, &handle).await?;

    if state.store.delete(&handle).await {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFound("Temp avatar not found".to_string()))
    }
}

#[utoipa::path(
    post,
    path = "/temp-avatars/{handle}/promote",
    params(
        ("handle" = String, Path, description = "Staged upload handle")
    ),
    responses(
        (status = 200, description = "Staged bytes, consumed", body = PromotedUpload),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Unknown or expired handle")
    ),
    tag = "temp-avatars"
)]
pub async fn promote_temp_avatar(
    State(state): State<AppState>,
    Extension(owner): Extension<Owner>,
    Path(handle): Path<String>,
) -> Result<Json<PromotedUpload>, AppError> {
    find_owned(&state, &owner, &handle).await?;

    state
        .store
        .promote(&handle)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound("Temp avatar not found".to_string()))
}

#[utoipa::path(
    get,
    path = "/temp-avatars/stats",
    responses(
        (status = 200, description = "Staging area counters", body = StagingStats)
    ),
    tag = "system"
)]
pub async fn temp_avatar_stats(State(state): State<AppState>) -> Json<StagingStats> {
    Json(state.store.stats())
}
