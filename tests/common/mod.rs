use async_trait::async_trait;
use chrono::Utc;
use rust_media_backend::AppState;
use rust_media_backend::config::MediaConfig;
use rust_media_backend::entities::resources::{self, ResourceCategory};
use rust_media_backend::infrastructure::database::run_migrations;
use rust_media_backend::services::codec::{CodecGateway, ImageOp, ProbeResult};
use sea_orm::{ActiveModelTrait, Database, Set};
use std::path::Path;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use tempfile::TempDir;
use uuid::Uuid;

/// Codec stand-in: writes deterministic bytes instead of invoking ffmpeg, so
/// identical operations produce identical (dedupable) output.
#[derive(Default)]
pub struct StubCodec {
    pub probe_result: Mutex<Option<ProbeResult>>,
    pub fail: AtomicBool,
    pub calls: Mutex<Vec<String>>,
}

impl StubCodec {
    pub fn set_probe(&self, video: Option<&str>, audio: Option<&str>) {
        *self.probe_result.lock().unwrap() = Some(ProbeResult {
            video_codec: video.map(str::to_string),
            audio_codec: audio.map(str::to_string),
            container: Some("matroska".to_string()),
            duration: Some(10.0),
            width: Some(1280),
            height: Some(720),
        });
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: impl Into<String>) {
        self.calls.lock().unwrap().push(call.into());
    }

    async fn produce(&self, dst: &Path, content: &[u8]) -> bool {
        if self.fail.load(Ordering::Relaxed) {
            return false;
        }
        tokio::fs::write(dst, content).await.is_ok()
    }
}

#[async_trait]
impl CodecGateway for StubCodec {
    async fn probe(&self, _path: &Path) -> Option<ProbeResult> {
        self.record("probe");
        self.probe_result.lock().unwrap().clone()
    }

    async fn remux(&self, _src: &Path, dst: &Path) -> bool {
        self.record("remux");
        self.produce(dst, b"remuxed output").await
    }

    async fn transcode(&self, _src: &Path, dst: &Path, crf: u8) -> bool {
        self.record(format!("transcode:{}", crf));
        self.produce(dst, b"transcoded output").await
    }

    async fn encode_image(&self, _src: &Path, dst: &Path, op: ImageOp) -> bool {
        self.record(format!("encode:{:?}", op));
        let content = format!("encoded:{:?}", op);
        self.produce(dst, content.as_bytes()).await
    }

    async fn extract_frame(&self, _src: &Path, dst: &Path, timestamp: f64) -> bool {
        self.record(format!("frame:{}", timestamp));
        self.produce(dst, b"frame").await
    }
}

pub struct TestApp {
    pub state: AppState,
    pub stub: Arc<StubCodec>,
    // Holds the media/trash/thumbnail roots alive for the test's duration
    #[allow(dead_code)]
    pub dir: TempDir,
}

pub async fn spawn_app() -> TestApp {
    let dir = TempDir::new().unwrap();

    // A file-backed database: every pooled connection must see the same
    // schema and rows.
    let db_url = format!("sqlite://{}/test.db?mode=rwc", dir.path().display());
    let db = Database::connect(db_url).await.unwrap();
    run_migrations(&db).await.unwrap();
    let config = MediaConfig {
        media_dir: dir.path().join("media"),
        trash_dir: dir.path().join("trash"),
        thumbnail_dir: dir.path().join("thumbnails"),
        ..MediaConfig::default()
    };

    let stub = Arc::new(StubCodec::default());
    let state = AppState::new(db, config, stub.clone());

    TestApp { state, stub, dir }
}

impl TestApp {
    /// Insert a resource row and write its backing file under the media root.
    pub async fn seed_resource(
        &self,
        category: ResourceCategory,
        filename: &str,
        folder: Option<&str>,
        title: Option<&str>,
        content: &[u8],
    ) -> resources::Model {
        let path = self
            .state
            .files
            .store_bytes(filename, folder, content)
            .await
            .unwrap();
        assert!(path.is_file());

        let model = resources::ActiveModel {
            id: Set(Uuid::new_v4().to_string()),
            category: Set(category),
            filename: Set(Some(filename.to_string())),
            title: Set(title.map(str::to_string)),
            folder: Set(folder.map(str::to_string)),
            thumbnail: Set(None),
            created_at: Set(Utc::now()),
            deleted_at: Set(None),
        };
        model.insert(&self.state.db).await.unwrap()
    }

    pub fn media_files(&self, folder: Option<&str>) -> Vec<String> {
        let mut dir = self.dir.path().join("media");
        if let Some(folder) = folder {
            dir = dir.join(folder);
        }
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .map(|entries| {
                entries
                    .filter_map(|e| e.ok())
                    .filter(|e| e.path().is_file())
                    .map(|e| e.file_name().to_string_lossy().into_owned())
                    .collect()
            })
            .unwrap_or_default();
        names.sort();
        names
    }
}
