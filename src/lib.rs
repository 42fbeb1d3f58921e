pub mod api;
pub mod config;
pub mod entities;
pub mod infrastructure;
pub mod services;
pub mod utils;

use crate::api::handlers;
use crate::config::MediaConfig;
use crate::services::codec::CodecGateway;
use crate::services::conversion_service::ConversionService;
use crate::services::file_store::FileStore;
use crate::services::resource_service::ResourceService;
use crate::services::tag_service::TagService;
use crate::services::thumbnail_service::ThumbnailService;
use crate::services::trash_service::TrashService;
use axum::{
    Router,
    routing::{delete, get, patch, post},
};
use sea_orm::DatabaseConnection;
use std::sync::Arc;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::health::health,
        handlers::resources::list_resources,
        handlers::resources::list_folders,
        handlers::resources::get_resource,
        handlers::resources::upload_resource,
        handlers::resources::import_resource,
        handlers::resources::update_resource,
        handlers::resources::delete_resource,
        handlers::resources::batch_delete_resources,
        handlers::resources::set_thumbnail,
        handlers::resources::remove_thumbnail,
        handlers::convert::convert_webp,
        handlers::convert::convert_jpg,
        handlers::convert::convert_png,
        handlers::convert::convert_ico,
        handlers::convert::convert_resize,
        handlers::convert::convert_mp4,
        handlers::trash::list_trash,
        handlers::trash::restore_resource,
        handlers::trash::permanently_delete,
        handlers::trash::empty_trash,
        handlers::tags::list_tags,
        handlers::tags::create_tag,
        handlers::tags::rename_tag,
        handlers::tags::delete_tag,
    ),
    components(
        schemas(
            entities::resources::Model,
            entities::resources::ResourceCategory,
            entities::tags::Model,
            services::resource_service::ResourcePage,
            services::resource_service::ResourceWithTags,
            services::resource_service::FolderCount,
            handlers::resources::ImportRequest,
            handlers::resources::UpdateRequest,
            handlers::resources::BatchDeleteRequest,
            handlers::resources::ThumbnailRequest,
            handlers::convert::WebpRequest,
            handlers::convert::JpgRequest,
            handlers::convert::IcoRequest,
            handlers::convert::ResizeRequest,
            handlers::convert::Mp4Request,
            handlers::tags::TagRequest,
        )
    ),
    tags(
        (name = "resources", description = "Media resource management"),
        (name = "convert", description = "On-demand format conversion"),
        (name = "trash", description = "Soft-delete lifecycle"),
        (name = "tags", description = "Tag management")
    )
)]
pub struct ApiDoc;

#[derive(Clone)]
pub struct AppState {
    pub db: DatabaseConnection,
    pub config: MediaConfig,
    pub files: Arc<FileStore>,
    pub codec: Arc<dyn CodecGateway>,
    pub resources: Arc<ResourceService>,
    pub conversions: Arc<ConversionService>,
    pub trash: Arc<TrashService>,
    pub thumbnails: Arc<ThumbnailService>,
    pub tags: Arc<TagService>,
}

impl AppState {
    /// Wire the service graph from its explicit dependencies.
    pub fn new(db: DatabaseConnection, config: MediaConfig, codec: Arc<dyn CodecGateway>) -> Self {
        let files = Arc::new(FileStore::new(&config));
        let resources = Arc::new(ResourceService::new(
            db.clone(),
            files.clone(),
            codec.clone(),
        ));
        let conversions = Arc::new(ConversionService::new(
            db.clone(),
            files.clone(),
            codec.clone(),
        ));
        let trash = Arc::new(TrashService::new(db.clone(), files.clone()));
        let thumbnails = Arc::new(ThumbnailService::new(
            db.clone(),
            files.clone(),
            codec.clone(),
        ));
        let tags = Arc::new(TagService::new(db.clone()));

        Self {
            db,
            config,
            files,
            codec,
            resources,
            conversions,
            trash,
            thumbnails,
            tags,
        }
    }
}

pub fn create_app(state: AppState) -> Router {
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .route("/health", get(handlers::health::health))
        .route(
            "/resources",
            get(handlers::resources::list_resources),
        )
        .route("/resources/folders", get(handlers::resources::list_folders))
        .route("/resources/upload", post(handlers::resources::upload_resource))
        .route("/resources/import", post(handlers::resources::import_resource))
        .route(
            "/resources/batch-delete",
            post(handlers::resources::batch_delete_resources),
        )
        .route(
            "/resources/:id",
            get(handlers::resources::get_resource)
                .patch(handlers::resources::update_resource)
                .delete(handlers::resources::delete_resource),
        )
        .route(
            "/resources/:id/thumbnail",
            post(handlers::resources::set_thumbnail)
                .delete(handlers::resources::remove_thumbnail),
        )
        .route("/convert/:id/webp", post(handlers::convert::convert_webp))
        .route("/convert/:id/jpg", post(handlers::convert::convert_jpg))
        .route("/convert/:id/png", post(handlers::convert::convert_png))
        .route("/convert/:id/ico", post(handlers::convert::convert_ico))
        .route("/convert/:id/resize", post(handlers::convert::convert_resize))
        .route("/convert/:id/mp4", post(handlers::convert::convert_mp4))
        .route(
            "/trash",
            get(handlers::trash::list_trash).delete(handlers::trash::empty_trash),
        )
        .route("/trash/:id/restore", post(handlers::trash::restore_resource))
        .route("/trash/:id", delete(handlers::trash::permanently_delete))
        .route(
            "/tags",
            get(handlers::tags::list_tags).post(handlers::tags::create_tag),
        )
        .route(
            "/tags/:id",
            patch(handlers::tags::rename_tag).delete(handlers::tags::delete_tag),
        )
        .with_state(state)
}
