mod common;

use common::spawn_app;
use rust_media_backend::api::error::AppError;
use rust_media_backend::entities::prelude::*;
use rust_media_backend::entities::resources::ResourceCategory;
use rust_media_backend::services::codec::ImageOp;
use rust_media_backend::utils::hash::calculate_hash;
use sea_orm::{EntityTrait, PaginatorTrait};
use std::sync::atomic::Ordering;

/// Remux path: H.264 + AAC source goes through `remux`, the derived resource
/// gets the content-addressed mp4 name, and the source row stays untouched.
#[tokio::test]
async fn test_mp4_conversion_remuxes_compatible_source() {
    let app = spawn_app().await;
    let source = app
        .seed_resource(
            ResourceCategory::Video,
            "abc123.mkv",
            None,
            None,
            b"mkv bytes",
        )
        .await;

    app.stub.set_probe(Some("h264"), Some("aac"));

    let derived = app
        .state
        .conversions
        .convert_to_mp4(&source.id, 23)
        .await
        .unwrap();

    assert_eq!(app.stub.calls(), vec!["probe", "remux"]);

    let expected_name = format!("{}.mp4", calculate_hash(b"remuxed output"));
    assert_eq!(derived.filename.as_deref(), Some(expected_name.as_str()));
    assert_eq!(derived.category, ResourceCategory::Video);
    assert_eq!(derived.title.as_deref(), Some("abc123.mp4"));
    assert_eq!(derived.folder, None);
    assert!(derived.deleted_at.is_none());

    // Non-destructive: the original row is byte-for-byte unchanged
    let original = Resources::find_by_id(&source.id)
        .one(&app.state.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(original, source);

    // Source file and derived file, nothing else (no temp leftovers)
    assert_eq!(
        app.media_files(None),
        vec!["abc123.mkv".to_string(), expected_name]
    );
}

/// Remux is also chosen when the source has no audio stream at all.
#[tokio::test]
async fn test_mp4_conversion_remuxes_silent_h264() {
    let app = spawn_app().await;
    let source = app
        .seed_resource(ResourceCategory::Video, "clip.mov", None, None, b"mov")
        .await;

    app.stub.set_probe(Some("h264"), None);

    app.state
        .conversions
        .convert_to_mp4(&source.id, 23)
        .await
        .unwrap();
    assert_eq!(app.stub.calls(), vec!["probe", "remux"]);
}

/// Transcode path: incompatible codec is fully re-encoded at the given CRF.
#[tokio::test]
async fn test_mp4_conversion_transcodes_incompatible_source() {
    let app = spawn_app().await;
    let source = app
        .seed_resource(ResourceCategory::Video, "xyz.webm", None, None, b"webm")
        .await;

    app.stub.set_probe(Some("vp9"), Some("opus"));

    let derived = app
        .state
        .conversions
        .convert_to_mp4(&source.id, 23)
        .await
        .unwrap();

    assert_eq!(app.stub.calls(), vec!["probe", "transcode:23"]);
    assert_eq!(
        derived.filename.as_deref(),
        Some(format!("{}.mp4", calculate_hash(b"transcoded output")).as_str())
    );
}

/// A failed probe falls back to the transcode path rather than erroring.
#[tokio::test]
async fn test_mp4_conversion_transcodes_when_probe_fails() {
    let app = spawn_app().await;
    let source = app
        .seed_resource(ResourceCategory::Video, "odd.avi", None, None, b"avi")
        .await;

    // probe_result stays None
    app.state
        .conversions
        .convert_to_mp4(&source.id, 30)
        .await
        .unwrap();
    assert_eq!(app.stub.calls(), vec!["probe", "transcode:30"]);
}

/// Sources already in an MP4 container are rejected without touching disk.
#[tokio::test]
async fn test_mp4_conversion_rejects_mp4_source() {
    let app = spawn_app().await;
    let source = app
        .seed_resource(ResourceCategory::Video, "already.mp4", None, None, b"mp4")
        .await;

    let err = app
        .state
        .conversions
        .convert_to_mp4(&source.id, 23)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::ConversionNotNeeded(_)));

    assert!(app.stub.calls().is_empty());
    assert_eq!(Resources::find().count(&app.state.db).await.unwrap(), 1);
    assert_eq!(app.media_files(None), vec!["already.mp4".to_string()]);
}

/// Dedup idempotence: converting the same source twice with identical
/// parameters yields one physical file but two resource rows.
#[tokio::test]
async fn test_repeated_image_conversion_dedupes_output() {
    let app = spawn_app().await;
    let source = app
        .seed_resource(
            ResourceCategory::Image,
            "src.png",
            None,
            Some("holiday.png"),
            b"png bytes",
        )
        .await;

    let op = ImageOp::Webp { quality: 80 };
    let first = app
        .state
        .conversions
        .convert_image(&source.id, op.clone(), Some("webp"))
        .await
        .unwrap();
    let second = app
        .state
        .conversions
        .convert_image(&source.id, op, Some("webp"))
        .await
        .unwrap();

    assert_ne!(first.id, second.id);
    assert_eq!(first.filename, second.filename);
    assert!(first.filename.as_deref().unwrap().ends_with(".webp"));
    assert_eq!(first.title.as_deref(), Some("holiday.webp"));

    // Three rows (source + two derived), two physical files
    assert_eq!(Resources::find().count(&app.state.db).await.unwrap(), 3);
    let files = app.media_files(None);
    assert_eq!(files.len(), 2);
    assert!(files.contains(&"src.png".to_string()));
    assert!(files.contains(first.filename.as_ref().unwrap()));
}

/// Derived resources land in the source's folder.
#[tokio::test]
async fn test_conversion_keeps_source_folder() {
    let app = spawn_app().await;
    let source = app
        .seed_resource(
            ResourceCategory::Image,
            "pic.jpg",
            Some("albums/summer"),
            None,
            b"jpeg bytes",
        )
        .await;

    let derived = app
        .state
        .conversions
        .convert_image(&source.id, ImageOp::Png, Some("png"))
        .await
        .unwrap();

    assert_eq!(derived.folder.as_deref(), Some("albums/summer"));
    let files = app.media_files(Some("albums/summer"));
    assert_eq!(files.len(), 2);
}

/// No orphan temp files: a codec failure cleans up the staged output before
/// the error surfaces, and no row is created.
#[tokio::test]
async fn test_failed_conversion_leaves_no_temp_file() {
    let app = spawn_app().await;
    let source = app
        .seed_resource(ResourceCategory::Image, "src.png", None, None, b"png")
        .await;

    app.stub.fail.store(true, Ordering::Relaxed);

    let err = app
        .state
        .conversions
        .convert_image(&source.id, ImageOp::Png, Some("png"))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Conversion(_)));

    assert_eq!(app.media_files(None), vec!["src.png".to_string()]);
    assert_eq!(Resources::find().count(&app.state.db).await.unwrap(), 1);
}

#[tokio::test]
async fn test_failed_mp4_conversion_leaves_no_temp_file() {
    let app = spawn_app().await;
    let source = app
        .seed_resource(ResourceCategory::Video, "clip.mkv", None, None, b"mkv")
        .await;

    app.stub.set_probe(Some("h264"), Some("aac"));
    app.stub.fail.store(true, Ordering::Relaxed);

    let err = app
        .state
        .conversions
        .convert_to_mp4(&source.id, 23)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Conversion(_)));
    assert_eq!(app.media_files(None), vec!["clip.mkv".to_string()]);
}

#[tokio::test]
async fn test_conversion_validation_errors() {
    let app = spawn_app().await;

    // Unknown id
    let err = app
        .state
        .conversions
        .convert_image("missing", ImageOp::Png, Some("png"))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));

    // Category mismatch: image conversion requested on a video
    let video = app
        .seed_resource(ResourceCategory::Video, "v.mkv", None, None, b"v")
        .await;
    let err = app
        .state
        .conversions
        .convert_image(&video.id, ImageOp::Png, Some("png"))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    // Row exists but the physical file is gone
    let image = app
        .seed_resource(ResourceCategory::Image, "gone.png", None, None, b"x")
        .await;
    tokio::fs::remove_file(app.state.files.source_path("gone.png", None))
        .await
        .unwrap();
    let err = app
        .state
        .conversions
        .convert_image(&image.id, ImageOp::Png, Some("png"))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::SourceMissing(_)));
}

/// Folder safety: a traversal path is rejected before any file move.
#[tokio::test]
async fn test_folder_reassignment_rejects_traversal() {
    let app = spawn_app().await;
    let resource = app
        .seed_resource(ResourceCategory::Image, "pic.png", None, None, b"pic")
        .await;

    let err = app
        .state
        .resources
        .reassign_folder(&resource.id, Some("../outside"))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    // File did not move
    assert!(app.state.files.exists("pic.png", None).await);
    let row = Resources::find_by_id(&resource.id)
        .one(&app.state.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.folder, None);
}

#[tokio::test]
async fn test_folder_reassignment_moves_file_before_commit() {
    let app = spawn_app().await;
    let resource = app
        .seed_resource(ResourceCategory::Image, "pic.png", None, None, b"pic")
        .await;

    let updated = app
        .state
        .resources
        .reassign_folder(&resource.id, Some("wallpapers"))
        .await
        .unwrap();

    assert_eq!(updated.folder.as_deref(), Some("wallpapers"));
    assert!(app.state.files.exists("pic.png", Some("wallpapers")).await);
    assert!(!app.state.files.exists("pic.png", None).await);

    // Empty string clears the folder again
    let cleared = app
        .state
        .resources
        .reassign_folder(&resource.id, Some(""))
        .await
        .unwrap();
    assert_eq!(cleared.folder, None);
    assert!(app.state.files.exists("pic.png", None).await);
}
