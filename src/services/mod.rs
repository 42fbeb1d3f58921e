pub mod codec;
pub mod conversion_service;
pub mod file_store;
pub mod resource_service;
pub mod tag_service;
pub mod thumbnail_service;
pub mod trash_service;
