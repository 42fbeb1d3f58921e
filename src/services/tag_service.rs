use crate::api::error::AppError;
use crate::entities::{prelude::*, *};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, ModelTrait,
    QueryFilter, QueryOrder, Set,
};
use uuid::Uuid;

pub struct TagService {
    db: DatabaseConnection,
}

impl TagService {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub async fn list(&self) -> Result<Vec<tags::Model>, AppError> {
        Ok(Tags::find()
            .order_by_asc(tags::Column::Name)
            .all(&self.db)
            .await?)
    }

    pub async fn create(&self, name: &str) -> Result<tags::Model, AppError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(AppError::Validation("Tag name cannot be empty".to_string()));
        }
        let existing = Tags::find()
            .filter(tags::Column::Name.eq(name))
            .one(&self.db)
            .await?;
        if existing.is_some() {
            return Err(AppError::Duplicate("Tag already exists".to_string()));
        }
        let tag = tags::ActiveModel {
            id: Set(Uuid::new_v4().to_string()),
            name: Set(name.to_string()),
            created_at: Set(Utc::now()),
        };
        Ok(tag.insert(&self.db).await?)
    }

    pub async fn rename(&self, tag_id: &str, name: &str) -> Result<tags::Model, AppError> {
        let tag = Tags::find_by_id(tag_id)
            .one(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound("Tag not found".to_string()))?;

        let taken = Tags::find()
            .filter(tags::Column::Name.eq(name))
            .filter(tags::Column::Id.ne(tag_id))
            .one(&self.db)
            .await?;
        if taken.is_some() {
            return Err(AppError::Duplicate("Tag already exists".to_string()));
        }

        let mut active: tags::ActiveModel = tag.into();
        active.name = Set(name.to_string());
        Ok(active.update(&self.db).await?)
    }

    pub async fn delete(&self, tag_id: &str) -> Result<(), AppError> {
        let tag = Tags::find_by_id(tag_id)
            .one(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound("Tag not found".to_string()))?;
        tag.delete(&self.db).await?;
        Ok(())
    }
}

/// Resolve tag names to rows, creating missing tags on first reference.
pub async fn resolve_tags(
    db: &impl ConnectionTrait,
    tag_names: &[String],
) -> Result<Vec<tags::Model>, AppError> {
    let mut resolved = Vec::with_capacity(tag_names.len());
    for name in tag_names {
        let name = name.trim();
        if name.is_empty() {
            continue;
        }
        let tag = match Tags::find()
            .filter(tags::Column::Name.eq(name))
            .one(db)
            .await?
        {
            Some(tag) => tag,
            None => {
                let new_tag = tags::ActiveModel {
                    id: Set(Uuid::new_v4().to_string()),
                    name: Set(name.to_string()),
                    created_at: Set(Utc::now()),
                };
                new_tag.insert(db).await?
            }
        };
        resolved.push(tag);
    }
    Ok(resolved)
}

/// Replace the tag set linked to a resource.
pub async fn link_tags(
    db: &impl ConnectionTrait,
    resource_id: &str,
    tag_names: &[String],
) -> Result<Vec<tags::Model>, AppError> {
    let resolved = resolve_tags(db, tag_names).await?;

    ResourceTags::delete_many()
        .filter(resource_tags::Column::ResourceId.eq(resource_id))
        .exec(db)
        .await?;

    for tag in &resolved {
        let link = resource_tags::ActiveModel {
            resource_id: Set(resource_id.to_string()),
            tag_id: Set(tag.id.clone()),
        };
        link.insert(db).await?;
    }

    Ok(resolved)
}
