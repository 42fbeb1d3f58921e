use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(
    Copy, Clone, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize, ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(None)")]
#[serde(rename_all = "lowercase")]
pub enum ResourceCategory {
    #[sea_orm(string_value = "image")]
    Image,
    #[sea_orm(string_value = "video")]
    Video,
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize, ToSchema)]
#[sea_orm(table_name = "resources")]
#[schema(as = Resource)]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub category: ResourceCategory,
    /// Content-addressed name `<sha256>.<ext>`. Uploads and imports resolve
    /// a repeated filename to the existing resource; derived resources from
    /// repeated conversions may share it on purpose.
    pub filename: Option<String>,
    pub title: Option<String>,
    pub folder: Option<String>,
    pub thumbnail: Option<String>,
    pub created_at: DateTimeUtc,
    pub deleted_at: Option<DateTimeUtc>,
}

/// Domain view of the soft-delete column. The file for an `Active` resource
/// lives under the media root; a `Trashed` resource's file lives in the trash
/// root.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum TrashState {
    Active,
    Trashed { at: DateTimeUtc },
}

impl Model {
    pub fn trash_state(&self) -> TrashState {
        match self.deleted_at {
            Some(at) => TrashState::Trashed { at },
            None => TrashState::Active,
        }
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::resource_tags::Entity")]
    ResourceTags,
}

impl Related<super::resource_tags::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ResourceTags.def()
    }
}

impl Related<super::tags::Entity> for Entity {
    fn to() -> RelationDef {
        super::resource_tags::Relation::Tags.def()
    }

    fn via() -> Option<RelationDef> {
        Some(super::resource_tags::Relation::Resources.def().rev())
    }
}

impl ActiveModelBehavior for ActiveModel {}
