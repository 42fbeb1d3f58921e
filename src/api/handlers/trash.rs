use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use serde_json::json;

use crate::AppState;
use crate::api::error::AppError;
use crate::entities::resources;

#[utoipa::path(
    get,
    path = "/trash",
    responses((status = 200, description = "Trashed resources", body = [resources::Model])),
    tag = "trash"
)]
pub async fn list_trash(
    State(state): State<AppState>,
) -> Result<Json<Vec<resources::Model>>, AppError> {
    Ok(Json(state.trash.list_trash().await?))
}

#[utoipa::path(
    post,
    path = "/trash/{id}/restore",
    params(("id" = String, Path, description = "Resource id")),
    responses(
        (status = 200, description = "Restored resource", body = resources::Model),
        (status = 404, description = "Resource not found"),
        (status = 409, description = "Resource is not in trash")
    ),
    tag = "trash"
)]
pub async fn restore_resource(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<resources::Model>, AppError> {
    Ok(Json(state.trash.restore(&id).await?))
}

#[utoipa::path(
    delete,
    path = "/trash/{id}",
    params(("id" = String, Path, description = "Resource id")),
    responses(
        (status = 204, description = "Resource permanently deleted"),
        (status = 404, description = "Resource not found"),
        (status = 409, description = "Resource is not in trash")
    ),
    tag = "trash"
)]
pub async fn permanently_delete(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    state.trash.permanently_delete(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    delete,
    path = "/trash",
    responses((status = 200, description = "Count of resources removed")),
    tag = "trash"
)]
pub async fn empty_trash(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, AppError> {
    let removed = state.trash.empty_trash().await?;
    Ok(Json(json!({ "removed": removed })))
}
