use crate::api::error::AppError;
use crate::entities::resources::ResourceCategory;
use crate::entities::{prelude::*, *};
use crate::services::codec::{CodecGateway, ImageOp};
use crate::services::file_store::FileStore;
use crate::utils::hash::{calculate_hash, content_filename};
use crate::utils::validation::file_extension;
use chrono::Utc;
use sea_orm::{ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set};
use std::path::Path;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// Orchestrates a conversion: validate the source resource, stage a temp
/// output next to the target location, run the codec, hash the result,
/// dedup-or-rename into place, and register a new derived resource row.
///
/// Conversions are non-destructive: the source resource is never modified,
/// and any failure after staging removes the orphaned temp file before the
/// error propagates.
pub struct ConversionService {
    db: DatabaseConnection,
    files: Arc<FileStore>,
    codec: Arc<dyn CodecGateway>,
}

/// Title for a derived resource: stem of the original display name plus the
/// new extension.
fn derived_title(original: &str, ext: &str) -> String {
    let stem = Path::new(original)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| original.to_string());
    format!("{}.{}", stem, ext)
}

impl ConversionService {
    pub fn new(db: DatabaseConnection, files: Arc<FileStore>, codec: Arc<dyn CodecGateway>) -> Self {
        Self { db, files, codec }
    }

    /// Fetch a resource and check it is active, of the expected category, and
    /// backed by a physical file.
    async fn validate(
        &self,
        resource_id: &str,
        category: ResourceCategory,
    ) -> Result<(resources::Model, String), AppError> {
        let resource = Resources::find_by_id(resource_id)
            .filter(resources::Column::DeletedAt.is_null())
            .one(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound("Resource not found".to_string()))?;

        if resource.category != category {
            let expected = match category {
                ResourceCategory::Image => "an image",
                ResourceCategory::Video => "a video",
            };
            return Err(AppError::Validation(format!("Resource is not {}", expected)));
        }

        let filename = resource
            .filename
            .clone()
            .ok_or_else(|| AppError::Validation("Resource has no file".to_string()))?;

        if !self.files.exists(&filename, resource.folder.as_deref()).await {
            return Err(AppError::SourceMissing("Source file not found".to_string()));
        }

        Ok((resource, filename))
    }

    /// Generic image pipeline; `target_ext = None` keeps the source
    /// extension (resize and other format-preserving operations).
    pub async fn convert_image(
        &self,
        resource_id: &str,
        op: ImageOp,
        target_ext: Option<&str>,
    ) -> Result<resources::Model, AppError> {
        let (resource, filename) = self.validate(resource_id, ResourceCategory::Image).await?;
        let source = self.files.source_path(&filename, resource.folder.as_deref());

        let ext = match target_ext {
            Some(ext) => ext.trim_start_matches('.').to_lowercase(),
            None => file_extension(&filename)
                .ok_or_else(|| AppError::Validation("Resource file has no extension".to_string()))?,
        };

        let temp = self
            .files
            .stage_temp_output(resource.folder.as_deref(), &ext)
            .await?;

        if !self.codec.encode_image(&source, &temp, op).await {
            self.files.discard_temp(&temp).await;
            return Err(AppError::Conversion(format!(
                "{} conversion failed",
                ext.to_uppercase()
            )));
        }

        self.finalize_conversion(&temp, &ext, &resource, None).await
    }

    /// Probe the source and either remux (already H.264 + AAC-or-silent) or
    /// transcode at the given CRF. Sources already in an MP4 container are
    /// rejected as not needing conversion.
    pub async fn convert_to_mp4(
        &self,
        resource_id: &str,
        crf: u8,
    ) -> Result<resources::Model, AppError> {
        let (resource, filename) = self.validate(resource_id, ResourceCategory::Video).await?;
        let source = self.files.source_path(&filename, resource.folder.as_deref());

        if file_extension(&filename).as_deref() == Some("mp4") {
            return Err(AppError::ConversionNotNeeded(
                "Resource is already MP4".to_string(),
            ));
        }

        let temp = self
            .files
            .stage_temp_output(resource.folder.as_deref(), "mp4")
            .await?;

        let probe = self.codec.probe(&source).await;
        let ok = match probe {
            Some(ref info) if info.is_mp4_ready() => {
                info!("remuxing {} ({:?})", filename, info.video_codec);
                self.codec.remux(&source, &temp).await
            }
            _ => {
                info!("transcoding {} at crf {}", filename, crf);
                self.codec.transcode(&source, &temp, crf).await
            }
        };

        if !ok {
            self.files.discard_temp(&temp).await;
            return Err(AppError::Conversion("MP4 conversion failed".to_string()));
        }

        self.finalize_conversion(&temp, "mp4", &resource, Some(ResourceCategory::Video))
            .await
    }

    /// Hash the staged output, dedup-or-rename it into place, and insert the
    /// derived resource row. Repeated conversions of the same source
    /// converge on one physical file while each call still yields a fresh
    /// row.
    async fn finalize_conversion(
        &self,
        temp: &Path,
        ext: &str,
        source: &resources::Model,
        category: Option<ResourceCategory>,
    ) -> Result<resources::Model, AppError> {
        let result: Result<resources::Model, AppError> = async {
            let content = tokio::fs::read(temp).await?;
            let digest = calculate_hash(&content);
            let new_filename = content_filename(&digest, ext);

            self.files
                .finalize(temp, &new_filename, source.folder.as_deref())
                .await?;

            let original_title = source
                .title
                .clone()
                .or_else(|| source.filename.clone())
                .unwrap_or_else(|| digest.clone());

            let model = resources::ActiveModel {
                id: Set(Uuid::new_v4().to_string()),
                category: Set(category.unwrap_or(source.category)),
                filename: Set(Some(new_filename)),
                title: Set(Some(derived_title(&original_title, ext))),
                folder: Set(source.folder.clone()),
                thumbnail: Set(None),
                created_at: Set(Utc::now()),
                deleted_at: Set(None),
            };
            Ok(model.insert(&self.db).await?)
        }
        .await;

        if result.is_err() {
            self.files.discard_temp(temp).await;
        }
        result
    }
}
