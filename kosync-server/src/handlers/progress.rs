//! Progress sync handlers
//!
//! Progress is keyed by the fingerprint the client sends, whether or not the
//! server can tie it to a library document. Resolution runs alongside so the
//! mapping exists for later, but never decides whether a write is accepted.

use axum::{
    body::Bytes,
    extract::{Path, State},
};
use kosync_core::Fingerprint;

use crate::auth::KoreaderAuth;
use crate::db::{ProgressUpdate, User};
use crate::error::ApiError;
use crate::protocol::{
    KoJson, ProgressResponse, UpdateProgressRequest, UpdateProgressResponse,
};
use crate::state::AppState;

/// Try to map `fingerprint` to a document. Failures are logged only.
async fn resolve_quietly(state: &AppState, user: &User, fingerprint: &Fingerprint) -> Option<i64> {
    match state.resolver.resolve(user, fingerprint).await {
        Ok(found) => found,
        Err(e) => {
            tracing::warn!(
                owner = user.id,
                fingerprint = %fingerprint,
                error = %e,
                "Fingerprint resolution failed"
            );
            None
        }
    }
}

/// Whether `fingerprint` has no mapping yet. A failed lookup is logged and
/// skips resolution.
async fn is_unmapped(state: &AppState, user: &User, fingerprint: &Fingerprint) -> bool {
    match state.mappings.lookup_document(user.id, fingerprint).await {
        Ok(found) => found.is_none(),
        Err(e) => {
            tracing::warn!(
                owner = user.id,
                fingerprint = %fingerprint,
                error = %e,
                "Mapping lookup failed, skipping resolution"
            );
            false
        }
    }
}

/// GET /syncs/progress/{document} - Fetch the stored progress for a fingerprint
#[utoipa::path(
    get,
    path = "/sync/syncs/progress/{document}",
    tag = "Progress",
    params(
        ("document" = String, Path, description = "Document fingerprint"),
        ("x-auth-user" = String, Header, description = "Sync username"),
        ("x-auth-key" = String, Header, description = "MD5 of the user's password")
    ),
    responses(
        (status = 200, description = "Stored progress", body = ProgressResponse,
            content_type = "application/vnd.koreader.v1+json"),
        (status = 401, description = "Missing or invalid credentials"),
        (status = 404, description = "No progress recorded for this document")
    )
)]
pub async fn get_progress(
    State(state): State<AppState>,
    auth: KoreaderAuth,
    Path(document): Path<String>,
) -> Result<KoJson<ProgressResponse>, ApiError> {
    let owner = &auth.user;
    let fingerprint = Fingerprint::from_client(document);

    if let Some(record) = state.progress.get(owner.id, &fingerprint).await? {
        return Ok(KoJson(record.into()));
    }

    // Resolution only adds a mapping, so a second lookup can still miss
    if is_unmapped(&state, owner, &fingerprint).await
        && resolve_quietly(&state, owner, &fingerprint).await.is_some()
    {
        if let Some(record) = state.progress.get(owner.id, &fingerprint).await? {
            return Ok(KoJson(record.into()));
        }
    }

    Err(ApiError::not_found("Document not found"))
}

/// PUT /syncs/progress - Store progress for a fingerprint
///
/// Accepted even when the fingerprint matches no known document.
#[utoipa::path(
    put,
    path = "/sync/syncs/progress",
    tag = "Progress",
    params(
        ("x-auth-user" = String, Header, description = "Sync username"),
        ("x-auth-key" = String, Header, description = "MD5 of the user's password")
    ),
    request_body(content = UpdateProgressRequest, content_type = "application/json"),
    responses(
        (status = 200, description = "Progress stored", body = UpdateProgressResponse,
            content_type = "application/vnd.koreader.v1+json"),
        (status = 400, description = "Missing document field or malformed body"),
        (status = 401, description = "Missing or invalid credentials")
    )
)]
pub async fn update_progress(
    State(state): State<AppState>,
    auth: KoreaderAuth,
    body: Bytes,
) -> Result<KoJson<UpdateProgressResponse>, ApiError> {
    let owner = &auth.user;
    let request: UpdateProgressRequest = serde_json::from_slice(&body)
        .map_err(|e| ApiError::bad_request(format!("Invalid request body: {e}")))?;

    let document = request
        .document
        .filter(|d| !d.trim().is_empty())
        .ok_or_else(|| ApiError::bad_request("Field 'document' not provided."))?;
    let fingerprint = Fingerprint::from_client(document);

    if is_unmapped(&state, owner, &fingerprint).await {
        resolve_quietly(&state, owner, &fingerprint).await;
    }

    let record = state
        .progress
        .upsert(
            owner.id,
            &fingerprint,
            ProgressUpdate {
                progress: request.progress,
                percentage: request.percentage,
                device: request.device,
                device_id: request.device_id,
            },
        )
        .await?;

    tracing::info!(
        owner = owner.id,
        fingerprint = %fingerprint,
        percentage = ?record.percentage,
        "Progress updated"
    );

    Ok(KoJson(UpdateProgressResponse {
        document: record.fingerprint.into_inner(),
        timestamp: record.updated_at.timestamp(),
    }))
}
