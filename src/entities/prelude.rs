pub use super::resource_tags::Entity as ResourceTags;
pub use super::resources::Entity as Resources;
pub use super::tags::Entity as Tags;
