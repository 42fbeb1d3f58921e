use axum::{
    Json,
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
};
use serde::Deserialize;
use serde_json::json;
use utoipa::{IntoParams, ToSchema};

use crate::AppState;
use crate::api::error::AppError;
use crate::entities::resources::{self, ResourceCategory};
use crate::services::resource_service::{
    FolderCount, ResourcePage, ResourceQuery, ResourceWithTags, UpdateResource,
};

fn default_page() -> u64 {
    1
}

fn default_per_page() -> u64 {
    20
}

fn default_sort_desc() -> bool {
    true
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct ListParams {
    #[serde(default = "default_page")]
    pub page: u64,
    #[serde(default = "default_per_page")]
    pub per_page: u64,
    pub category: Option<ResourceCategory>,
    pub search: Option<String>,
    /// Comma-separated extension filter, e.g. `jpg,png`
    pub ext: Option<String>,
    /// Comma-separated tag filter
    pub tag: Option<String>,
    pub folder: Option<String>,
    pub sort_by: Option<String>,
    #[serde(default = "default_sort_desc")]
    pub sort_desc: bool,
}

fn split_csv(value: Option<String>) -> Vec<String> {
    value
        .map(|v| {
            v.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

#[utoipa::path(
    get,
    path = "/resources",
    params(ListParams),
    responses((status = 200, description = "Paginated resources", body = ResourcePage)),
    tag = "resources"
)]
pub async fn list_resources(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<ResourcePage>, AppError> {
    let page = state
        .resources
        .list(ResourceQuery {
            page: params.page,
            per_page: params.per_page,
            category: params.category,
            search: params.search,
            ext: split_csv(params.ext),
            tag: split_csv(params.tag),
            folder: params.folder,
            sort_by: params.sort_by,
            sort_desc: params.sort_desc,
        })
        .await?;
    Ok(Json(page))
}

#[utoipa::path(
    get,
    path = "/resources/folders",
    responses((status = 200, description = "Folders in use", body = [FolderCount])),
    tag = "resources"
)]
pub async fn list_folders(
    State(state): State<AppState>,
) -> Result<Json<Vec<FolderCount>>, AppError> {
    Ok(Json(state.resources.list_folders().await?))
}

#[utoipa::path(
    get,
    path = "/resources/{id}",
    params(("id" = String, Path, description = "Resource id")),
    responses(
        (status = 200, description = "Resource with tags", body = ResourceWithTags),
        (status = 404, description = "Resource not found")
    ),
    tag = "resources"
)]
pub async fn get_resource(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ResourceWithTags>, AppError> {
    Ok(Json(state.resources.load_with_tags(&id).await?))
}

#[utoipa::path(
    post,
    path = "/resources/upload",
    responses(
        (status = 201, description = "Resource stored", body = resources::Model),
        (status = 400, description = "Invalid upload")
    ),
    tag = "resources"
)]
pub async fn upload_resource(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<resources::Model>), AppError> {
    let mut content: Option<Vec<u8>> = None;
    let mut filename: Option<String> = None;
    let mut title: Option<String> = None;
    let mut tags: Vec<String> = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("Invalid multipart body: {}", e)))?
    {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("file") => {
                filename = field.file_name().map(str::to_string);
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::Validation(format!("Failed to read file: {}", e)))?;
                content = Some(bytes.to_vec());
            }
            Some("title") => {
                title = field.text().await.ok().filter(|t| !t.is_empty());
            }
            Some("tags") => {
                if let Ok(csv) = field.text().await {
                    tags = csv
                        .split(',')
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(str::to_string)
                        .collect();
                }
            }
            _ => {}
        }
    }

    let content =
        content.ok_or_else(|| AppError::Validation("Missing 'file' field".to_string()))?;
    if content.len() > state.config.max_upload_size {
        return Err(AppError::Validation("File too large".to_string()));
    }

    let resource = state
        .resources
        .upload(&content, filename.as_deref(), title.as_deref(), &tags)
        .await?;
    Ok((StatusCode::CREATED, Json(resource)))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ImportRequest {
    pub url: String,
}

#[utoipa::path(
    post,
    path = "/resources/import",
    request_body = ImportRequest,
    responses((status = 202, description = "Download accepted")),
    tag = "resources"
)]
pub async fn import_resource(
    State(state): State<AppState>,
    Json(body): Json<ImportRequest>,
) -> Result<(StatusCode, Json<serde_json::Value>), AppError> {
    // Validate the URL up front; the download itself runs in the background.
    reqwest::Url::parse(&body.url)
        .map_err(|_| AppError::Validation("Invalid URL".to_string()))?;

    let resources = state.resources.clone();
    let url = body.url.clone();
    tokio::spawn(async move {
        match resources.import_from_url(&url).await {
            Ok(resource) => tracing::info!("import of {} completed: {}", url, resource.id),
            Err(err) => tracing::error!("import of {} failed: {}", url, err),
        }
    });

    Ok((StatusCode::ACCEPTED, Json(json!({ "status": "accepted" }))))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateRequest {
    pub title: Option<String>,
    pub tags: Option<Vec<String>>,
    /// Empty string clears the folder
    pub folder: Option<String>,
}

#[utoipa::path(
    patch,
    path = "/resources/{id}",
    params(("id" = String, Path, description = "Resource id")),
    request_body = UpdateRequest,
    responses(
        (status = 200, description = "Updated resource", body = resources::Model),
        (status = 404, description = "Resource not found")
    ),
    tag = "resources"
)]
pub async fn update_resource(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<UpdateRequest>,
) -> Result<Json<resources::Model>, AppError> {
    let resource = state
        .resources
        .update(
            &id,
            UpdateResource {
                title: body.title,
                tags: body.tags,
                folder: body.folder,
            },
        )
        .await?;
    Ok(Json(resource))
}

#[utoipa::path(
    delete,
    path = "/resources/{id}",
    params(("id" = String, Path, description = "Resource id")),
    responses(
        (status = 204, description = "Resource moved to trash"),
        (status = 404, description = "Resource not found")
    ),
    tag = "resources"
)]
pub async fn delete_resource(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    state.trash.soft_delete(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct BatchDeleteRequest {
    pub ids: Vec<String>,
}

#[utoipa::path(
    post,
    path = "/resources/batch-delete",
    request_body = BatchDeleteRequest,
    responses((status = 200, description = "Count of resources trashed")),
    tag = "resources"
)]
pub async fn batch_delete_resources(
    State(state): State<AppState>,
    Json(body): Json<BatchDeleteRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    let deleted = state.trash.batch_soft_delete(&body.ids).await?;
    Ok(Json(json!({ "deleted_count": deleted })))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ThumbnailRequest {
    pub timestamp: f64,
}

#[utoipa::path(
    post,
    path = "/resources/{id}/thumbnail",
    params(("id" = String, Path, description = "Resource id")),
    request_body = ThumbnailRequest,
    responses(
        (status = 200, description = "Thumbnail updated", body = resources::Model),
        (status = 404, description = "Resource not found")
    ),
    tag = "resources"
)]
pub async fn set_thumbnail(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<ThumbnailRequest>,
) -> Result<Json<resources::Model>, AppError> {
    if !body.timestamp.is_finite() || body.timestamp < 0.0 {
        return Err(AppError::Validation(
            "Timestamp must be non-negative".to_string(),
        ));
    }
    Ok(Json(state.thumbnails.set_thumbnail(&id, body.timestamp).await?))
}

#[utoipa::path(
    delete,
    path = "/resources/{id}/thumbnail",
    params(("id" = String, Path, description = "Resource id")),
    responses(
        (status = 200, description = "Thumbnail removed", body = resources::Model),
        (status = 404, description = "Resource not found")
    ),
    tag = "resources"
)]
pub async fn remove_thumbnail(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<resources::Model>, AppError> {
    Ok(Json(state.thumbnails.remove_thumbnail(&id).await?))
}
