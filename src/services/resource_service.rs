use crate::api::error::AppError;
use crate::entities::resources::ResourceCategory;
use crate::entities::{prelude::*, *};
use crate::services::codec::CodecGateway;
use crate::services::file_store::FileStore;
use crate::services::tag_service::link_tags;
use crate::utils::hash::{calculate_hash, content_filename};
use crate::utils::validation::{classify_extension, file_extension, normalize_folder};
use chrono::Utc;
use sea_orm::sea_query::{Expr, Query as SeaQuery, SimpleExpr};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, EntityTrait, IntoSimpleExpr,
    Order, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set,
};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};
use utoipa::ToSchema;
use uuid::Uuid;

pub struct ResourceService {
    db: DatabaseConnection,
    files: Arc<FileStore>,
    codec: Arc<dyn CodecGateway>,
    http: reqwest::Client,
}

pub struct CreateResource {
    pub category: ResourceCategory,
    pub filename: Option<String>,
    pub title: Option<String>,
    pub folder: Option<String>,
    pub tags: Vec<String>,
}

#[derive(Debug, Default)]
pub struct UpdateResource {
    pub title: Option<String>,
    pub tags: Option<Vec<String>>,
    /// `Some("")` clears the folder; `None` leaves it unchanged.
    pub folder: Option<String>,
}

#[derive(Debug, Default)]
pub struct ResourceQuery {
    pub page: u64,
    pub per_page: u64,
    pub category: Option<ResourceCategory>,
    pub search: Option<String>,
    pub ext: Vec<String>,
    pub tag: Vec<String>,
    pub folder: Option<String>,
    pub sort_by: Option<String>,
    pub sort_desc: bool,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ResourcePage {
    pub items: Vec<resources::Model>,
    pub total: u64,
    pub page: u64,
    pub per_page: u64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ResourceWithTags {
    #[serde(flatten)]
    pub resource: resources::Model,
    pub tags: Vec<tags::Model>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct FolderCount {
    pub folder: String,
    pub count: i64,
}

/// Closed set of sortable fields. Unknown sort keys fall back to
/// `created_at`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SortKey {
    Title,
    Filename,
    Ext,
    CreatedAt,
}

impl SortKey {
    pub fn from_param(param: Option<&str>) -> Self {
        match param {
            Some("title") => SortKey::Title,
            Some("filename") => SortKey::Filename,
            Some("ext") => SortKey::Ext,
            _ => SortKey::CreatedAt,
        }
    }

    fn order_expr(self) -> SimpleExpr {
        match self {
            SortKey::Title => resources::Column::Title.into_simple_expr(),
            SortKey::Filename => resources::Column::Filename.into_simple_expr(),
            SortKey::Ext => SimpleExpr::Custom("substr(filename, instr(filename, '.'))".to_owned()),
            SortKey::CreatedAt => resources::Column::CreatedAt.into_simple_expr(),
        }
    }
}

impl ResourceService {
    pub fn new(db: DatabaseConnection, files: Arc<FileStore>, codec: Arc<dyn CodecGateway>) -> Self {
        Self {
            db,
            files,
            codec,
            http: reqwest::Client::new(),
        }
    }

    // -----------------------------------------------------------------------
    // Repository operations
    // -----------------------------------------------------------------------

    /// Insert a new resource row. Fails with `Duplicate` when the filename is
    /// already registered to a non-deleted resource, so callers can treat
    /// "already imported" as a distinct outcome.
    pub async fn create(&self, input: CreateResource) -> Result<resources::Model, AppError> {
        let folder = normalize_folder(input.folder.as_deref())?;

        if let Some(ref filename) = input.filename {
            let existing = Resources::find()
                .filter(resources::Column::Filename.eq(filename))
                .filter(resources::Column::DeletedAt.is_null())
                .one(&self.db)
                .await?;
            if existing.is_some() {
                return Err(AppError::Duplicate("File already imported".to_string()));
            }
        }

        let model = resources::ActiveModel {
            id: Set(Uuid::new_v4().to_string()),
            category: Set(input.category),
            filename: Set(input.filename),
            title: Set(input.title),
            folder: Set(folder),
            thumbnail: Set(None),
            created_at: Set(Utc::now()),
            deleted_at: Set(None),
        };
        let resource = model.insert(&self.db).await?;

        if !input.tags.is_empty() {
            link_tags(&self.db, &resource.id, &input.tags).await?;
        }

        Ok(resource)
    }

    /// Fetch an active (non-trashed) resource.
    pub async fn get(&self, resource_id: &str) -> Result<resources::Model, AppError> {
        Resources::find_by_id(resource_id)
            .filter(resources::Column::DeletedAt.is_null())
            .one(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound("Resource not found".to_string()))
    }

    /// Fetch a resource with its tags fully materialized (explicit join, no
    /// lazy loading).
    pub async fn load_with_tags(&self, resource_id: &str) -> Result<ResourceWithTags, AppError> {
        let mut rows = Resources::find_by_id(resource_id)
            .filter(resources::Column::DeletedAt.is_null())
            .find_with_related(Tags)
            .all(&self.db)
            .await?;
        let (resource, tags) = rows
            .pop()
            .ok_or_else(|| AppError::NotFound("Resource not found".to_string()))?;
        Ok(ResourceWithTags { resource, tags })
    }

    fn apply_filters(
        mut query: sea_orm::Select<Resources>,
        params: &ResourceQuery,
    ) -> sea_orm::Select<Resources> {
        if let Some(ref folder) = params.folder {
            query = query.filter(resources::Column::Folder.eq(folder));
        }
        if let Some(category) = params.category {
            query = query.filter(resources::Column::Category.eq(category));
        }
        if let Some(ref search) = params.search {
            query = query.filter(
                Condition::any()
                    .add(resources::Column::Title.contains(search))
                    .add(resources::Column::Filename.contains(search)),
            );
        }
        if !params.ext.is_empty() {
            let mut cond = Condition::any();
            for ext in &params.ext {
                let suffix = format!(".{}", ext.trim_start_matches('.').to_lowercase());
                cond = cond.add(resources::Column::Filename.ends_with(&suffix));
            }
            query = query.filter(cond);
        }
        for tag in &params.tag {
            let pattern = format!("%{}%", tag);
            let sub = SeaQuery::select()
                .column(resource_tags::Column::ResourceId)
                .from(ResourceTags)
                .inner_join(
                    Tags,
                    Expr::col((Tags, tags::Column::Id))
                        .equals((ResourceTags, resource_tags::Column::TagId)),
                )
                .and_where(Expr::col((Tags, tags::Column::Name)).like(&pattern))
                .to_owned();
            query = query.filter(resources::Column::Id.in_subquery(sub));
        }
        query
    }

    pub async fn list(&self, params: ResourceQuery) -> Result<ResourcePage, AppError> {
        let page = params.page.max(1);
        let per_page = params.per_page.clamp(1, 100);
        let offset = (page - 1) * per_page;

        let base = Resources::find().filter(resources::Column::DeletedAt.is_null());
        let filtered = Self::apply_filters(base, &params);

        let total = filtered.clone().count(&self.db).await?;

        let sort = SortKey::from_param(params.sort_by.as_deref());
        let order = if params.sort_desc { Order::Desc } else { Order::Asc };
        let items = filtered
            .order_by(sort.order_expr(), order)
            .offset(offset)
            .limit(per_page)
            .all(&self.db)
            .await?;

        Ok(ResourcePage { items, total, page, per_page })
    }

    pub async fn list_folders(&self) -> Result<Vec<FolderCount>, AppError> {
        let rows: Vec<(String, i64)> = Resources::find()
            .select_only()
            .column(resources::Column::Folder)
            .column_as(resources::Column::Id.count(), "count")
            .filter(resources::Column::Folder.is_not_null())
            .filter(resources::Column::DeletedAt.is_null())
            .group_by(resources::Column::Folder)
            .order_by_asc(resources::Column::Folder)
            .into_tuple()
            .all(&self.db)
            .await?;
        Ok(rows
            .into_iter()
            .map(|(folder, count)| FolderCount { folder, count })
            .collect())
    }

    /// Move a resource to a different folder. The filesystem move happens
    /// first; a failed move leaves the folder column unchanged.
    pub async fn reassign_folder(
        &self,
        resource_id: &str,
        new_folder: Option<&str>,
    ) -> Result<resources::Model, AppError> {
        let resource = self.get(resource_id).await?;
        let new_folder = normalize_folder(new_folder)?;

        if new_folder == resource.folder {
            return Ok(resource);
        }

        if let Some(ref filename) = resource.filename {
            self.files
                .move_between_folders(filename, resource.folder.as_deref(), new_folder.as_deref())
                .await?;
        }

        let mut active: resources::ActiveModel = resource.into();
        active.folder = Set(new_folder);
        Ok(active.update(&self.db).await?)
    }

    pub async fn update(
        &self,
        resource_id: &str,
        body: UpdateResource,
    ) -> Result<resources::Model, AppError> {
        let mut resource = self.get(resource_id).await?;

        if let Some(folder) = body.folder {
            resource = self.reassign_folder(resource_id, Some(folder.as_str())).await?;
        }

        if let Some(title) = body.title {
            let mut active: resources::ActiveModel = resource.into();
            active.title = Set(Some(title));
            resource = active.update(&self.db).await?;
        }

        if let Some(ref tag_names) = body.tags {
            link_tags(&self.db, resource_id, tag_names).await?;
        }

        Ok(resource)
    }

    // -----------------------------------------------------------------------
    // Upload / import
    // -----------------------------------------------------------------------

    /// Store uploaded bytes under their content-addressed name and register a
    /// resource row. A true duplicate upload resolves to the existing
    /// resource instead of double-storing.
    pub async fn upload(
        &self,
        content: &[u8],
        original_filename: Option<&str>,
        title: Option<&str>,
        tags: &[String],
    ) -> Result<resources::Model, AppError> {
        let ext = original_filename
            .and_then(file_extension)
            .ok_or_else(|| AppError::Validation("Filename has no extension".to_string()))?;
        let category = classify_extension(&ext).ok_or_else(|| {
            AppError::Validation(format!("Unsupported file extension: .{}", ext))
        })?;

        // Magic-byte sanity check: reject content whose sniffed kind
        // contradicts the claimed extension.
        if let Some(kind) = infer::get(content) {
            let sniffed = match kind.matcher_type() {
                infer::MatcherType::Image => Some(ResourceCategory::Image),
                infer::MatcherType::Video => Some(ResourceCategory::Video),
                _ => None,
            };
            if let Some(sniffed) = sniffed {
                if sniffed != category {
                    return Err(AppError::Validation(format!(
                        "File content ({}) does not match extension .{}",
                        kind.mime_type(),
                        ext
                    )));
                }
            }
        }

        let digest = calculate_hash(content);
        let new_name = content_filename(&digest, &ext);

        if let Some(existing) = Resources::find()
            .filter(resources::Column::Filename.eq(&new_name))
            .filter(resources::Column::DeletedAt.is_null())
            .one(&self.db)
            .await?
        {
            info!("duplicate upload resolved to resource {}", existing.id);
            return Ok(existing);
        }

        let dest = self.files.store_bytes(&new_name, None, content).await?;

        let thumbnail = if category == ResourceCategory::Video {
            self.generate_video_thumbnail(&dest, &digest).await
        } else {
            None
        };

        let title = title
            .map(str::to_string)
            .or_else(|| original_filename.map(str::to_string));

        let resource = self
            .create(CreateResource {
                category,
                filename: Some(new_name),
                title,
                folder: None,
                tags: tags.to_vec(),
            })
            .await?;

        if let Some(thumb) = thumbnail {
            let mut active: resources::ActiveModel = resource.into();
            active.thumbnail = Set(Some(thumb));
            return Ok(active.update(&self.db).await?);
        }

        Ok(resource)
    }

    /// Download a URL into the library. Intended to be run as a spawned
    /// background task; the caller gets an immediate "accepted" response.
    pub async fn import_from_url(&self, url: &str) -> Result<resources::Model, AppError> {
        let parsed = reqwest::Url::parse(url)
            .map_err(|_| AppError::Validation("Invalid URL".to_string()))?;
        let ext = file_extension(parsed.path())
            .ok_or_else(|| AppError::Validation("URL has no file extension".to_string()))?;

        if ext == "m3u8" {
            return self.import_playlist(&parsed).await;
        }

        let category = classify_extension(&ext).ok_or_else(|| {
            AppError::Validation(format!("Unsupported file extension: .{}", ext))
        })?;

        let content = self.fetch_bytes(parsed.clone()).await?;
        let digest = calculate_hash(&content);
        let new_name = content_filename(&digest, &ext);

        if let Some(existing) = Resources::find()
            .filter(resources::Column::Filename.eq(&new_name))
            .filter(resources::Column::DeletedAt.is_null())
            .one(&self.db)
            .await?
        {
            info!("import already present as resource {}", existing.id);
            return Ok(existing);
        }

        let dest = self.files.store_bytes(&new_name, None, &content).await?;
        let thumbnail = if category == ResourceCategory::Video {
            self.generate_video_thumbnail(&dest, &digest).await
        } else {
            None
        };

        let resource = self
            .create(CreateResource {
                category,
                filename: Some(new_name.clone()),
                title: Some(new_name),
                folder: None,
                tags: Vec::new(),
            })
            .await?;

        if let Some(thumb) = thumbnail {
            let mut active: resources::ActiveModel = resource.into();
            active.thumbnail = Set(Some(thumb));
            return Ok(active.update(&self.db).await?);
        }

        Ok(resource)
    }

    /// HLS import: fetch every segment of the playlist, concatenate the
    /// transport stream, and remux it into a progressive MP4.
    async fn import_playlist(&self, url: &reqwest::Url) -> Result<resources::Model, AppError> {
        let playlist = self
            .http
            .get(url.clone())
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| AppError::Conversion(format!("Playlist download failed: {}", e)))?
            .text()
            .await
            .map_err(|e| AppError::Conversion(format!("Playlist download failed: {}", e)))?;

        let mut content = Vec::new();
        for line in playlist.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let segment_url = url
                .join(line)
                .map_err(|_| AppError::Validation("Invalid segment URL".to_string()))?;
            let segment = self.fetch_bytes(segment_url).await?;
            content.extend_from_slice(&segment);
        }
        if content.is_empty() {
            return Err(AppError::Conversion("Playlist has no segments".to_string()));
        }

        let temp_ts = self.files.stage_temp_output(None, "ts").await?;
        tokio::fs::write(&temp_ts, &content).await?;

        let temp_mp4 = self.files.stage_temp_output(None, "mp4").await?;
        let ok = self.codec.remux(&temp_ts, &temp_mp4).await;
        self.files.discard_temp(&temp_ts).await;
        if !ok {
            self.files.discard_temp(&temp_mp4).await;
            return Err(AppError::Conversion("Playlist remux failed".to_string()));
        }

        let result: Result<resources::Model, AppError> = async {
            let bytes = tokio::fs::read(&temp_mp4).await?;
            let digest = calculate_hash(&bytes);
            let new_name = content_filename(&digest, "mp4");

            if let Some(existing) = Resources::find()
                .filter(resources::Column::Filename.eq(&new_name))
                .filter(resources::Column::DeletedAt.is_null())
                .one(&self.db)
                .await?
            {
                self.files.discard_temp(&temp_mp4).await;
                return Ok(existing);
            }

            let final_path = self.files.finalize(&temp_mp4, &new_name, None).await?;
            let thumbnail = self.generate_video_thumbnail(&final_path, &digest).await;

            let resource = self
                .create(CreateResource {
                    category: ResourceCategory::Video,
                    filename: Some(new_name.clone()),
                    title: Some(new_name),
                    folder: None,
                    tags: Vec::new(),
                })
                .await?;

            if let Some(thumb) = thumbnail {
                let mut active: resources::ActiveModel = resource.into();
                active.thumbnail = Set(Some(thumb));
                return Ok(active.update(&self.db).await?);
            }
            Ok(resource)
        }
        .await;

        if result.is_err() {
            self.files.discard_temp(&temp_mp4).await;
        }
        result
    }

    async fn fetch_bytes(&self, url: reqwest::Url) -> Result<Vec<u8>, AppError> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| AppError::Conversion(format!("Download failed: {}", e)))?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| AppError::Conversion(format!("Download failed: {}", e)))?;
        Ok(bytes.to_vec())
    }

    /// Grab a frame at 1 s as `<digest>_thumb.jpg`. Best effort: a failed
    /// extraction leaves the resource without a thumbnail.
    async fn generate_video_thumbnail(&self, video_path: &Path, stem: &str) -> Option<String> {
        let thumb_name = format!("{}_thumb.jpg", stem);
        let thumb_path = match self.files.stage_thumbnail(&thumb_name).await {
            Ok(path) => path,
            Err(err) => {
                warn!("failed to prepare thumbnail dir: {}", err);
                return None;
            }
        };
        if self.codec.extract_frame(video_path, &thumb_path, 1.0).await {
            Some(thumb_name)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sort_key_fallback() {
        assert_eq!(SortKey::from_param(Some("title")), SortKey::Title);
        assert_eq!(SortKey::from_param(Some("filename")), SortKey::Filename);
        assert_eq!(SortKey::from_param(Some("ext")), SortKey::Ext);
        assert_eq!(SortKey::from_param(Some("created_at")), SortKey::CreatedAt);
        // Unknown keys fall back to the default column
        assert_eq!(SortKey::from_param(Some("bogus")), SortKey::CreatedAt);
        assert_eq!(SortKey::from_param(None), SortKey::CreatedAt);
    }
}
