use crate::api::error::AppError;
use crate::config::MediaConfig;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;
use uuid::Uuid;

/// On-disk layout of the library: an active media tree (optionally
/// partitioned by folder), a flat trash area, and a thumbnail area.
/// Directories are created lazily on first use.
///
/// Move/delete operations are no-ops when the source file is already absent,
/// so a crashed transition can be retried without error.
pub struct FileStore {
    media_dir: PathBuf,
    trash_dir: PathBuf,
    thumbnail_dir: PathBuf,
}

async fn is_file(path: &Path) -> bool {
    fs::metadata(path)
        .await
        .map(|meta| meta.is_file())
        .unwrap_or(false)
}

impl FileStore {
    pub fn new(config: &MediaConfig) -> Self {
        Self {
            media_dir: config.media_dir.clone(),
            trash_dir: config.trash_dir.clone(),
            thumbnail_dir: config.thumbnail_dir.clone(),
        }
    }

    fn folder_dir(&self, folder: Option<&str>) -> PathBuf {
        match folder {
            Some(folder) => self.media_dir.join(folder),
            None => self.media_dir.clone(),
        }
    }

    /// Path of an active resource's file: `media/<folder?>/<filename>`.
    /// Existence is the caller's concern.
    pub fn source_path(&self, filename: &str, folder: Option<&str>) -> PathBuf {
        self.folder_dir(folder).join(filename)
    }

    pub fn trash_path(&self, filename: &str) -> PathBuf {
        self.trash_dir.join(filename)
    }

    pub fn thumbnail_path(&self, filename: &str) -> PathBuf {
        self.thumbnail_dir.join(filename)
    }

    pub async fn exists(&self, filename: &str, folder: Option<&str>) -> bool {
        is_file(&self.source_path(filename, folder)).await
    }

    /// Reserve a collision-free temp output path inside the *target* folder,
    /// so the later finalize step is a same-volume rename.
    pub async fn stage_temp_output(
        &self,
        folder: Option<&str>,
        extension: &str,
    ) -> Result<PathBuf, AppError> {
        let dir = self.folder_dir(folder);
        fs::create_dir_all(&dir).await?;
        let ext = extension.trim_start_matches('.').to_lowercase();
        Ok(dir.join(format!("{}.{}", Uuid::new_v4(), ext)))
    }

    /// Remove a staged temp file, tolerating one that was never written.
    pub async fn discard_temp(&self, temp: &Path) {
        if let Err(err) = fs::remove_file(temp).await {
            if err.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!("failed to remove temp file {}: {}", temp.display(), err);
            }
        }
    }

    /// If content with this canonical name is already present, the temp file
    /// is discarded; otherwise it is renamed into place. Two conversions
    /// producing identical bytes converge on one physical file.
    pub async fn finalize(
        &self,
        temp: &Path,
        filename: &str,
        folder: Option<&str>,
    ) -> Result<PathBuf, AppError> {
        let final_path = self.source_path(filename, folder);
        if is_file(&final_path).await {
            debug!("dedup hit for {}, discarding temp", filename);
            self.discard_temp(temp).await;
        } else {
            fs::rename(temp, &final_path).await?;
        }
        Ok(final_path)
    }

    /// Dedup-aware write used by uploads and imports: content already present
    /// under its canonical name is not written twice.
    pub async fn store_bytes(
        &self,
        filename: &str,
        folder: Option<&str>,
        content: &[u8],
    ) -> Result<PathBuf, AppError> {
        let dir = self.folder_dir(folder);
        fs::create_dir_all(&dir).await?;
        let dest = dir.join(filename);
        if !is_file(&dest).await {
            fs::write(&dest, content).await?;
        }
        Ok(dest)
    }

    /// Folder information is dropped in the trash (flat layout); it stays
    /// recorded in the database so restore can reconstruct it.
    pub async fn move_to_trash(&self, filename: &str, folder: Option<&str>) -> Result<(), AppError> {
        let src = self.source_path(filename, folder);
        if !is_file(&src).await {
            return Ok(());
        }
        fs::create_dir_all(&self.trash_dir).await?;
        fs::rename(&src, self.trash_path(filename)).await?;
        Ok(())
    }

    pub async fn restore_from_trash(
        &self,
        filename: &str,
        folder: Option<&str>,
    ) -> Result<(), AppError> {
        let src = self.trash_path(filename);
        if !is_file(&src).await {
            return Ok(());
        }
        let dest = self.source_path(filename, folder);
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::rename(&src, &dest).await?;
        Ok(())
    }

    pub async fn permanently_delete(&self, filename: &str) -> Result<(), AppError> {
        let path = self.trash_path(filename);
        if is_file(&path).await {
            fs::remove_file(&path).await?;
        }
        Ok(())
    }

    pub async fn move_between_folders(
        &self,
        filename: &str,
        old_folder: Option<&str>,
        new_folder: Option<&str>,
    ) -> Result<(), AppError> {
        let src = self.source_path(filename, old_folder);
        if !is_file(&src).await {
            return Ok(());
        }
        let dest = self.source_path(filename, new_folder);
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::rename(&src, &dest).await?;
        Ok(())
    }

    /// Reserve a thumbnail output path, creating the thumbnail root.
    pub async fn stage_thumbnail(&self, filename: &str) -> Result<PathBuf, AppError> {
        fs::create_dir_all(&self.thumbnail_dir).await?;
        Ok(self.thumbnail_path(filename))
    }

    pub async fn delete_thumbnail(&self, filename: &str) -> Result<(), AppError> {
        let path = self.thumbnail_path(filename);
        if is_file(&path).await {
            fs::remove_file(&path).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store(dir: &TempDir) -> FileStore {
        let config = MediaConfig {
            media_dir: dir.path().join("media"),
            trash_dir: dir.path().join("trash"),
            thumbnail_dir: dir.path().join("thumbs"),
            ..MediaConfig::default()
        };
        FileStore::new(&config)
    }

    #[tokio::test]
    async fn test_finalize_renames_new_content() {
        let dir = TempDir::new().unwrap();
        let files = store(&dir);

        let temp = files.stage_temp_output(None, "webp").await.unwrap();
        fs::write(&temp, b"payload").await.unwrap();

        let final_path = files.finalize(&temp, "abc.webp", None).await.unwrap();
        assert!(is_file(&final_path).await);
        assert!(!is_file(&temp).await);
    }

    #[tokio::test]
    async fn test_finalize_discards_temp_on_dedup() {
        let dir = TempDir::new().unwrap();
        let files = store(&dir);

        files.store_bytes("abc.webp", None, b"original").await.unwrap();

        let temp = files.stage_temp_output(None, "webp").await.unwrap();
        fs::write(&temp, b"identical bytes, different temp").await.unwrap();

        let final_path = files.finalize(&temp, "abc.webp", None).await.unwrap();
        assert!(!is_file(&temp).await);
        // The first write wins; only one physical file remains.
        assert_eq!(fs::read(&final_path).await.unwrap(), b"original");
    }

    #[tokio::test]
    async fn test_trash_round_trip() {
        let dir = TempDir::new().unwrap();
        let files = store(&dir);

        files
            .store_bytes("abc.jpg", Some("vacation"), b"photo")
            .await
            .unwrap();

        files.move_to_trash("abc.jpg", Some("vacation")).await.unwrap();
        assert!(!files.exists("abc.jpg", Some("vacation")).await);
        assert!(is_file(&files.trash_path("abc.jpg")).await);

        files
            .restore_from_trash("abc.jpg", Some("vacation"))
            .await
            .unwrap();
        assert!(files.exists("abc.jpg", Some("vacation")).await);
        assert!(!is_file(&files.trash_path("abc.jpg")).await);
    }

    #[tokio::test]
    async fn test_moves_are_noops_when_absent() {
        let dir = TempDir::new().unwrap();
        let files = store(&dir);

        files.move_to_trash("ghost.jpg", None).await.unwrap();
        files.restore_from_trash("ghost.jpg", None).await.unwrap();
        files
            .move_between_folders("ghost.jpg", None, Some("a"))
            .await
            .unwrap();
        files.permanently_delete("ghost.jpg").await.unwrap();
        files.delete_thumbnail("ghost_thumb.jpg").await.unwrap();
    }

    #[tokio::test]
    async fn test_move_between_folders() {
        let dir = TempDir::new().unwrap();
        let files = store(&dir);

        files.store_bytes("abc.jpg", None, b"photo").await.unwrap();
        files
            .move_between_folders("abc.jpg", None, Some("albums/summer"))
            .await
            .unwrap();
        assert!(files.exists("abc.jpg", Some("albums/summer")).await);
        assert!(!files.exists("abc.jpg", None).await);
    }
}
