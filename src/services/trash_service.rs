use crate::api::error::AppError;
use crate::entities::resources::TrashState;
use crate::entities::{prelude::*, *};
use crate::services::file_store::FileStore;
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, ModelTrait, QueryFilter,
    QueryOrder, Set,
};
use std::sync::Arc;
use tracing::{info, warn};

/// Soft-delete / restore / permanent-delete transitions, keeping the
/// database state consistent with filesystem moves.
///
/// File operations run before the row is committed and are no-ops on absent
/// files, so a transition interrupted mid-way can simply be retried.
pub struct TrashService {
    db: DatabaseConnection,
    files: Arc<FileStore>,
}

impl TrashService {
    pub fn new(db: DatabaseConnection, files: Arc<FileStore>) -> Self {
        Self { db, files }
    }

    async fn find(&self, resource_id: &str) -> Result<resources::Model, AppError> {
        Resources::find_by_id(resource_id)
            .one(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound("Resource not found".to_string()))
    }

    pub async fn list_trash(&self) -> Result<Vec<resources::Model>, AppError> {
        Ok(Resources::find()
            .filter(resources::Column::DeletedAt.is_not_null())
            .order_by_desc(resources::Column::DeletedAt)
            .all(&self.db)
            .await?)
    }

    /// Move a resource to the trash: thumbnail deleted, file relocated to
    /// the trash root, then `deleted_at` committed.
    pub async fn soft_delete(&self, resource_id: &str) -> Result<(), AppError> {
        let resource = self.find(resource_id).await?;
        if let TrashState::Trashed { .. } = resource.trash_state() {
            return Err(AppError::WrongState(
                "Resource is already in trash".to_string(),
            ));
        }

        if let Some(ref thumbnail) = resource.thumbnail {
            self.files.delete_thumbnail(thumbnail).await?;
        }
        if let Some(ref filename) = resource.filename {
            self.files
                .move_to_trash(filename, resource.folder.as_deref())
                .await?;
        }

        let mut active: resources::ActiveModel = resource.into();
        active.deleted_at = Set(Some(Utc::now()));
        active.update(&self.db).await?;
        Ok(())
    }

    /// Best-effort batch: ids that are missing or already trashed are
    /// skipped, not errors. Returns the number of resources trashed.
    pub async fn batch_soft_delete(&self, ids: &[String]) -> Result<usize, AppError> {
        let mut deleted = 0;
        for id in ids {
            match self.soft_delete(id).await {
                Ok(()) => deleted += 1,
                Err(AppError::NotFound(_)) | Err(AppError::WrongState(_)) => {
                    warn!("skipping batch delete of {}: not eligible", id);
                }
                Err(err) => return Err(err),
            }
        }
        info!("batch deleted {} resources", deleted);
        Ok(deleted)
    }

    /// Move a trashed resource back to its recorded folder and clear
    /// `deleted_at`.
    pub async fn restore(&self, resource_id: &str) -> Result<resources::Model, AppError> {
        let resource = self.find(resource_id).await?;
        if resource.trash_state() == TrashState::Active {
            return Err(AppError::WrongState("Resource is not in trash".to_string()));
        }

        if let Some(ref filename) = resource.filename {
            self.files
                .restore_from_trash(filename, resource.folder.as_deref())
                .await?;
        }

        let mut active: resources::ActiveModel = resource.into();
        active.deleted_at = Set(None);
        Ok(active.update(&self.db).await?)
    }

    /// Remove the trash file and the row. Only trashed resources can be
    /// permanently deleted; an active resource must be trashed first.
    pub async fn permanently_delete(&self, resource_id: &str) -> Result<(), AppError> {
        let resource = self.find(resource_id).await?;
        if resource.trash_state() == TrashState::Active {
            return Err(AppError::WrongState("Resource is not in trash".to_string()));
        }

        if let Some(ref filename) = resource.filename {
            self.files.permanently_delete(filename).await?;
        }
        resource.delete(&self.db).await?;
        Ok(())
    }

    /// Sweep everything currently in the trash. One failing resource does
    /// not stop the rest. Returns the number of resources removed.
    pub async fn empty_trash(&self) -> Result<usize, AppError> {
        let trashed = self.list_trash().await?;
        let mut removed = 0;
        for resource in trashed {
            let id = resource.id.clone();
            match self.permanently_delete(&id).await {
                Ok(()) => removed += 1,
                Err(err) => warn!("failed to purge {}: {}", id, err),
            }
        }
        info!("emptied trash: {} resources removed", removed);
        Ok(removed)
    }
}
