use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use serde::Deserialize;
use utoipa::ToSchema;

use crate::AppState;
use crate::api::error::AppError;
use crate::entities::tags;

#[derive(Debug, Deserialize, ToSchema)]
pub struct TagRequest {
    pub name: String,
}

#[utoipa::path(
    get,
    path = "/tags",
    responses((status = 200, description = "All tags", body = [tags::Model])),
    tag = "tags"
)]
pub async fn list_tags(State(state): State<AppState>) -> Result<Json<Vec<tags::Model>>, AppError> {
    Ok(Json(state.tags.list().await?))
}

#[utoipa::path(
    post,
    path = "/tags",
    request_body = TagRequest,
    responses(
        (status = 201, description = "Created tag", body = tags::Model),
        (status = 409, description = "Tag already exists")
    ),
    tag = "tags"
)]
pub async fn create_tag(
    State(state): State<AppState>,
    Json(body): Json<TagRequest>,
) -> Result<(StatusCode, Json<tags::Model>), AppError> {
    let tag = state.tags.create(&body.name).await?;
    Ok((StatusCode::CREATED, Json(tag)))
}

#[utoipa::path(
    patch,
    path = "/tags/{id}",
    params(("id" = String, Path, description = "Tag id")),
    request_body = TagRequest,
    responses(
        (status = 200, description = "Renamed tag", body = tags::Model),
        (status = 404, description = "Tag not found"),
        (status = 409, description = "Tag already exists")
    ),
    tag = "tags"
)]
pub async fn rename_tag(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<TagRequest>,
) -> Result<Json<tags::Model>, AppError> {
    Ok(Json(state.tags.rename(&id, &body.name).await?))
}

#[utoipa::path(
    delete,
    path = "/tags/{id}",
    params(("id" = String, Path, description = "Tag id")),
    responses(
        (status = 204, description = "Tag deleted"),
        (status = 404, description = "Tag not found")
    ),
    tag = "tags"
)]
pub async fn delete_tag(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    state.tags.delete(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}
