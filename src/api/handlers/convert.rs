use axum::{
    Json,
    extract::{Path, State},
};
use serde::Deserialize;
use utoipa::ToSchema;
use validator::Validate;

use crate::AppState;
use crate::api::error::AppError;
use crate::entities::resources;
use crate::services::codec::ImageOp;

fn default_webp_quality() -> u8 {
    80
}

fn default_jpg_quality() -> u8 {
    85
}

fn default_crf() -> u8 {
    23
}

fn default_ico_sizes() -> Vec<u32> {
    vec![16, 32, 48, 256]
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct WebpRequest {
    #[serde(default = "default_webp_quality")]
    #[validate(range(min = 1, max = 100))]
    pub quality: u8,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct JpgRequest {
    #[serde(default = "default_jpg_quality")]
    #[validate(range(min = 1, max = 100))]
    pub quality: u8,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct IcoRequest {
    #[serde(default = "default_ico_sizes")]
    pub sizes: Vec<u32>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ResizeRequest {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub scale: Option<f32>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct Mp4Request {
    /// Constant Rate Factor, 0-51, lower is better quality.
    #[serde(default = "default_crf")]
    #[validate(range(max = 51))]
    pub crf: u8,
}

#[utoipa::path(
    post,
    path = "/convert/{id}/webp",
    params(("id" = String, Path, description = "Resource id")),
    request_body = WebpRequest,
    responses(
        (status = 200, description = "Derived resource created", body = resources::Model),
        (status = 404, description = "Resource not found")
    ),
    tag = "convert"
)]
pub async fn convert_webp(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<WebpRequest>,
) -> Result<Json<resources::Model>, AppError> {
    body.validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;
    let resource = state
        .conversions
        .convert_image(&id, ImageOp::Webp { quality: body.quality }, Some("webp"))
        .await?;
    Ok(Json(resource))
}

#[utoipa::path(
    post,
    path = "/convert/{id}/jpg",
    params(("id" = String, Path, description = "Resource id")),
    request_body = JpgRequest,
    responses(
        (status = 200, description = "Derived resource created", body = resources::Model),
        (status = 404, description = "Resource not found")
    ),
    tag = "convert"
)]
pub async fn convert_jpg(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<JpgRequest>,
) -> Result<Json<resources::Model>, AppError> {
    body.validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;
    let resource = state
        .conversions
        .convert_image(&id, ImageOp::Jpeg { quality: body.quality }, Some("jpg"))
        .await?;
    Ok(Json(resource))
}

#[utoipa::path(
    post,
    path = "/convert/{id}/png",
    params(("id" = String, Path, description = "Resource id")),
    responses(
        (status = 200, description = "Derived resource created", body = resources::Model),
        (status = 404, description = "Resource not found")
    ),
    tag = "convert"
)]
pub async fn convert_png(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<resources::Model>, AppError> {
    let resource = state
        .conversions
        .convert_image(&id, ImageOp::Png, Some("png"))
        .await?;
    Ok(Json(resource))
}

#[utoipa::path(
    post,
    path = "/convert/{id}/ico",
    params(("id" = String, Path, description = "Resource id")),
    request_body = IcoRequest,
    responses(
        (status = 200, description = "Derived resource created", body = resources::Model),
        (status = 404, description = "Resource not found")
    ),
    tag = "convert"
)]
pub async fn convert_ico(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<IcoRequest>,
) -> Result<Json<resources::Model>, AppError> {
    if body.sizes.is_empty() || body.sizes.iter().any(|s| *s == 0 || *s > 256) {
        return Err(AppError::Validation(
            "Icon sizes must be between 1 and 256".to_string(),
        ));
    }
    let resource = state
        .conversions
        .convert_image(&id, ImageOp::Ico { sizes: body.sizes }, Some("ico"))
        .await?;
    Ok(Json(resource))
}

#[utoipa::path(
    post,
    path = "/convert/{id}/resize",
    params(("id" = String, Path, description = "Resource id")),
    request_body = ResizeRequest,
    responses(
        (status = 200, description = "Derived resource created", body = resources::Model),
        (status = 404, description = "Resource not found")
    ),
    tag = "convert"
)]
pub async fn convert_resize(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<ResizeRequest>,
) -> Result<Json<resources::Model>, AppError> {
    if body.width.is_none() && body.height.is_none() && body.scale.is_none() {
        return Err(AppError::Validation(
            "One of width, height or scale is required".to_string(),
        ));
    }
    if let Some(scale) = body.scale {
        if !(scale > 0.0 && scale <= 10.0) {
            return Err(AppError::Validation(
                "Scale must be between 0 and 10".to_string(),
            ));
        }
    }
    let op = ImageOp::Resize {
        width: body.width,
        height: body.height,
        scale: body.scale,
    };
    // Keeps the source extension
    let resource = state.conversions.convert_image(&id, op, None).await?;
    Ok(Json(resource))
}

#[utoipa::path(
    post,
    path = "/convert/{id}/mp4",
    params(("id" = String, Path, description = "Resource id")),
    request_body = Mp4Request,
    responses(
        (status = 200, description = "Derived resource created", body = resources::Model),
        (status = 400, description = "Already MP4 or conversion failed"),
        (status = 404, description = "Resource not found")
    ),
    tag = "convert"
)]
pub async fn convert_mp4(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<Mp4Request>,
) -> Result<Json<resources::Model>, AppError> {
    body.validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;
    let resource = state.conversions.convert_to_mp4(&id, body.crf).await?;
    Ok(Json(resource))
}
