use crate::api::error::AppError;
use crate::entities::resources::ResourceCategory;
use std::path::Path;

/// Extensions accepted for image resources.
pub const IMAGE_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "gif", "bmp", "webp", "tiff", "svg", "ico",
];

/// Extensions accepted for video resources.
pub const VIDEO_EXTENSIONS: &[&str] = &[
    "mp4", "mkv", "avi", "mov", "wmv", "flv", "webm", "m4v", "ts",
];

/// Classify a file extension (without dot, any case) into a resource category.
pub fn classify_extension(ext: &str) -> Option<ResourceCategory> {
    let ext = ext.trim_start_matches('.').to_lowercase();
    if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
        return Some(ResourceCategory::Image);
    }
    if VIDEO_EXTENSIONS.contains(&ext.as_str()) {
        return Some(ResourceCategory::Video);
    }
    None
}

/// Extract the lowercased extension of a filename, without the dot.
pub fn file_extension(filename: &str) -> Option<String> {
    Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
}

/// Validate and normalize a folder path supplied by a caller.
///
/// Empty or whitespace-only input normalizes to `None` ("no folder").
/// Any `..` segment, absolute path, or backslash is rejected before a
/// filesystem move can happen.
pub fn normalize_folder(folder: Option<&str>) -> Result<Option<String>, AppError> {
    let Some(raw) = folder else {
        return Ok(None);
    };
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    if trimmed.starts_with('/') || trimmed.contains('\\') {
        return Err(AppError::Validation("Invalid folder path".to_string()));
    }
    if trimmed.split('/').any(|segment| segment == "..") {
        return Err(AppError::Validation("Invalid folder path".to_string()));
    }
    Ok(Some(trimmed.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_extension() {
        assert_eq!(classify_extension("jpg"), Some(ResourceCategory::Image));
        assert_eq!(classify_extension(".PNG"), Some(ResourceCategory::Image));
        assert_eq!(classify_extension("mkv"), Some(ResourceCategory::Video));
        assert_eq!(classify_extension("mp4"), Some(ResourceCategory::Video));
        assert_eq!(classify_extension("pdf"), None);
    }

    #[test]
    fn test_file_extension() {
        assert_eq!(file_extension("abc.MP4"), Some("mp4".to_string()));
        assert_eq!(file_extension("a.b.webp"), Some("webp".to_string()));
        assert_eq!(file_extension("noext"), None);
    }

    #[test]
    fn test_normalize_folder_ok() {
        assert_eq!(normalize_folder(None).unwrap(), None);
        assert_eq!(normalize_folder(Some("")).unwrap(), None);
        assert_eq!(normalize_folder(Some("   ")).unwrap(), None);
        assert_eq!(
            normalize_folder(Some("vacation/2024")).unwrap(),
            Some("vacation/2024".to_string())
        );
    }

    #[test]
    fn test_normalize_folder_rejects_traversal() {
        assert!(normalize_folder(Some("../etc")).is_err());
        assert!(normalize_folder(Some("a/../b")).is_err());
        assert!(normalize_folder(Some("a/..")).is_err());
        assert!(normalize_folder(Some("/absolute")).is_err());
        assert!(normalize_folder(Some("a\\b")).is_err());
        // A folder merely containing dots is fine
        assert!(normalize_folder(Some("a.b/c..d")).is_ok());
    }
}
