use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::NaiveDate;
use uuid::Uuid;

use crate::config::is_valid_owner;
use crate::db::Database;
use crate::models::*;

type ApiResult<T> = Result<T, (StatusCode, String)>;

// ============================================================
// Error Handling
// ============================================================

/// Log a storage failure and hide its details from the client.
fn internal_error(e: impl std::fmt::Display) -> (StatusCode, String) {
    tracing::error!("Internal error: {}", e);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "Internal server error".to_string(),
    )
}

fn bad_request(msg: impl Into<String>) -> (StatusCode, String) {
    let msg = msg.into();
    tracing::warn!("Validation error: {}", msg);
    (StatusCode::BAD_REQUEST, msg)
}

/// Owners are path segments: letters, digits, `-` and `_` only.
fn check_owner(owner: &str) -> ApiResult<()> {
    if is_valid_owner(owner) {
        Ok(())
    } else {
        Err(bad_request(format!("Invalid owner: {}", owner)))
    }
}

// ============================================================
// Health
// ============================================================

pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

// ============================================================
// Snapshot
// ============================================================

pub async fn get_snapshot(
    State(db): State<Database>,
    Path(owner): Path<String>,
) -> ApiResult<Json<Snapshot>> {
    check_owner(&owner)?;
    db.get_snapshot(&owner).map(Json).map_err(internal_error)
}

/// Replace everything the owner has with the posted document.
pub async fn replace_snapshot(
    State(db): State<Database>,
    Path(owner): Path<String>,
    body: Bytes,
) -> ApiResult<Json<Snapshot>> {
    check_owner(&owner)?;
    let text = std::str::from_utf8(&body).map_err(|e| bad_request(e.to_string()))?;
    let snapshot =
        Snapshot::from_json(text).map_err(|e| bad_request(format!("Invalid snapshot: {}", e)))?;
    db.replace_owner_data(&owner, &snapshot)
        .map(Json)
        .map_err(internal_error)
}

// ============================================================
// Days
// ============================================================

pub async fn get_day(
    State(db): State<Database>,
    Path((owner, date)): Path<(String, NaiveDate)>,
) -> ApiResult<Json<DayMeta>> {
    check_owner(&owner)?;
    db.get_day(&owner, date)
        .map_err(internal_error)?
        .map(Json)
        .ok_or((StatusCode::NOT_FOUND, "Day not found".to_string()))
}

/// Create the day if absent; an existing record comes back unchanged.
pub async fn create_day(
    State(db): State<Database>,
    Path((owner, date)): Path<(String, NaiveDate)>,
) -> ApiResult<Json<DayMeta>> {
    check_owner(&owner)?;
    db.get_or_create_day(&owner, date)
        .map(Json)
        .map_err(internal_error)
}

pub async fn put_day(
    State(db): State<Database>,
    Path((owner, date)): Path<(String, NaiveDate)>,
    Json(meta): Json<DayMeta>,
) -> ApiResult<Json<DayMeta>> {
    check_owner(&owner)?;
    if meta.date != date {
        return Err(bad_request(format!(
            "Body date {} does not match path date {}",
            meta.date, date
        )));
    }
    db.upsert_day(&owner, &meta).map(Json).map_err(internal_error)
}

// ============================================================
// Entries
// ============================================================

pub async fn create_entry(
    State(db): State<Database>,
    Path(owner): Path<String>,
    Json(input): Json<NewEntry>,
) -> ApiResult<(StatusCode, Json<Entry>)> {
    check_owner(&owner)?;
    input.validate().map_err(bad_request)?;
    db.create_entry(&owner, input)
        .map(|entry| (StatusCode::CREATED, Json(entry)))
        .map_err(internal_error)
}

/// Deleting is idempotent: an unknown id still answers 204.
pub async fn delete_entry(
    State(db): State<Database>,
    Path((owner, id)): Path<(String, Uuid)>,
) -> ApiResult<StatusCode> {
    check_owner(&owner)?;
    if !db.delete_entry(&owner, id).map_err(internal_error)? {
        tracing::debug!("Delete of unknown entry {} for {}", id, owner);
    }
    Ok(StatusCode::NO_CONTENT)
}

// ============================================================
// Notes
// ============================================================

pub async fn upsert_note(
    State(db): State<Database>,
    Path(owner): Path<String>,
    Json(input): Json<UpsertNoteInput>,
) -> ApiResult<Json<Note>> {
    check_owner(&owner)?;
    let text = normalize_note_text(&input.text)
        .ok_or_else(|| bad_request("Note text must not be empty"))?;
    db.upsert_note(&owner, &text, input.now)
        .map(Json)
        .map_err(internal_error)
}
