use crate::api::error::AppError;
use crate::entities::resources::ResourceCategory;
use crate::entities::{prelude::*, *};
use crate::services::codec::CodecGateway;
use crate::services::file_store::FileStore;
use sea_orm::{ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set};
use std::sync::Arc;
use tracing::info;

/// Extracts and manages video poster frames, stored as
/// `<filename-stem>_thumb.jpg` under the thumbnail root.
pub struct ThumbnailService {
    db: DatabaseConnection,
    files: Arc<FileStore>,
    codec: Arc<dyn CodecGateway>,
}

impl ThumbnailService {
    pub fn new(db: DatabaseConnection, files: Arc<FileStore>, codec: Arc<dyn CodecGateway>) -> Self {
        Self { db, files, codec }
    }

    async fn find_active(&self, resource_id: &str) -> Result<resources::Model, AppError> {
        Resources::find_by_id(resource_id)
            .filter(resources::Column::DeletedAt.is_null())
            .one(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound("Resource not found".to_string()))
    }

    /// Re-extract the thumbnail from a frame at `timestamp` seconds,
    /// replacing any existing one.
    pub async fn set_thumbnail(
        &self,
        resource_id: &str,
        timestamp: f64,
    ) -> Result<resources::Model, AppError> {
        let resource = self.find_active(resource_id).await?;

        if resource.category != ResourceCategory::Video {
            return Err(AppError::Validation("Resource is not a video".to_string()));
        }
        let filename = resource
            .filename
            .clone()
            .ok_or_else(|| AppError::Validation("Video file not found".to_string()))?;

        let video_path = self.files.source_path(&filename, resource.folder.as_deref());
        if !self.files.exists(&filename, resource.folder.as_deref()).await {
            return Err(AppError::SourceMissing("Video file not found".to_string()));
        }

        if let Some(ref old) = resource.thumbnail {
            self.files.delete_thumbnail(old).await?;
        }

        let stem = filename.rsplit_once('.').map(|(s, _)| s).unwrap_or(&filename);
        let thumb_name = format!("{}_thumb.jpg", stem);
        let thumb_path = self.files.stage_thumbnail(&thumb_name).await?;

        if !self.codec.extract_frame(&video_path, &thumb_path, timestamp).await {
            return Err(AppError::Conversion("Frame extraction failed".to_string()));
        }

        info!("thumbnail for {} set from t={}s", resource_id, timestamp);

        let mut active: resources::ActiveModel = resource.into();
        active.thumbnail = Set(Some(thumb_name));
        Ok(active.update(&self.db).await?)
    }

    pub async fn remove_thumbnail(
        &self,
        resource_id: &str,
    ) -> Result<resources::Model, AppError> {
        let resource = self.find_active(resource_id).await?;

        let Some(ref thumbnail) = resource.thumbnail else {
            return Ok(resource);
        };
        self.files.delete_thumbnail(thumbnail).await?;

        let mut active: resources::ActiveModel = resource.into();
        active.thumbnail = Set(None);
        Ok(active.update(&self.db).await?)
    }
}
