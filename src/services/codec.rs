use async_trait::async_trait;
use image::codecs::ico::{IcoEncoder, IcoFrame};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat};
use serde::Deserialize;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::warn;

use crate::utils::validation::file_extension;

/// Codec info for a video file, as reported by a probe. Ephemeral, never
/// persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeResult {
    pub video_codec: Option<String>,
    pub audio_codec: Option<String>,
    pub container: Option<String>,
    pub duration: Option<f64>,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

impl ProbeResult {
    /// A video qualifies for remux (instead of transcode) iff the video
    /// stream is already H.264 and the audio stream is AAC or absent.
    pub fn is_mp4_ready(&self) -> bool {
        self.video_codec.as_deref() == Some("h264")
            && (self.audio_codec.as_deref() == Some("aac") || self.audio_codec.is_none())
    }
}

/// ffprobe JSON output structure.
#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    format: Option<FfprobeFormat>,
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    format_name: Option<String>,
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: Option<String>,
    codec_name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
}

impl FfprobeOutput {
    fn into_probe_result(self) -> ProbeResult {
        let video = self
            .streams
            .iter()
            .find(|s| s.codec_type.as_deref() == Some("video"));
        let audio = self
            .streams
            .iter()
            .find(|s| s.codec_type.as_deref() == Some("audio"));

        ProbeResult {
            video_codec: video.and_then(|s| s.codec_name.clone()),
            audio_codec: audio.and_then(|s| s.codec_name.clone()),
            container: self.format.as_ref().and_then(|f| f.format_name.clone()),
            duration: self
                .format
                .as_ref()
                .and_then(|f| f.duration.as_ref())
                .and_then(|d| d.parse().ok()),
            width: video.and_then(|s| s.width),
            height: video.and_then(|s| s.height),
        }
    }
}

/// An image encoding operation, resolved from the request DTO at the handler
/// boundary.
#[derive(Debug, Clone, PartialEq)]
pub enum ImageOp {
    Webp { quality: u8 },
    Jpeg { quality: u8 },
    Png,
    Ico { sizes: Vec<u32> },
    Resize { width: Option<u32>, height: Option<u32>, scale: Option<f32> },
}

/// Capability interface over the external codec tooling. Expected failures
/// are values (`false` / `None`), never errors: a failed invocation may leave
/// a partial output file behind, and the caller owns cleaning up its staged
/// temp path.
#[async_trait]
pub trait CodecGateway: Send + Sync {
    /// Inspect a video's container/codecs without decoding it. `None` on
    /// unreadable input or tool failure.
    async fn probe(&self, path: &Path) -> Option<ProbeResult>;

    /// Repackage streams into an MP4 container without re-encoding.
    async fn remux(&self, src: &Path, dst: &Path) -> bool;

    /// Fully re-encode to H.264/AAC MP4 at the given CRF (0-51).
    async fn transcode(&self, src: &Path, dst: &Path, crf: u8) -> bool;

    /// Re-encode an image in-process.
    async fn encode_image(&self, src: &Path, dst: &Path, op: ImageOp) -> bool;

    /// Grab a single frame of a video at `timestamp` seconds as a JPEG.
    async fn extract_frame(&self, src: &Path, dst: &Path, timestamp: f64) -> bool;
}

/// Production gateway: videos via ffmpeg/ffprobe subprocesses, images via the
/// `image` crate on the blocking pool.
pub struct FfmpegCodec {
    timeout: Duration,
}

impl FfmpegCodec {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    async fn run_ffmpeg(&self, args: &[&str], dst: &Path) -> bool {
        let mut command = Command::new("ffmpeg");
        command
            .kill_on_drop(true)
            .args(args)
            .arg(dst)
            .arg("-y")
            .stdout(Stdio::null())
            .stderr(Stdio::piped());

        match timeout(self.timeout, command.output()).await {
            Ok(Ok(output)) if output.status.success() => dst.is_file(),
            Ok(Ok(output)) => {
                let stderr = String::from_utf8_lossy(&output.stderr);
                warn!("ffmpeg failed: {}", stderr.trim());
                false
            }
            Ok(Err(err)) => {
                warn!("failed to spawn ffmpeg: {}", err);
                false
            }
            Err(_) => {
                warn!("ffmpeg timed out after {:?}", self.timeout);
                false
            }
        }
    }
}

#[async_trait]
impl CodecGateway for FfmpegCodec {
    async fn probe(&self, path: &Path) -> Option<ProbeResult> {
        let mut command = Command::new("ffprobe");
        command
            .kill_on_drop(true)
            .args([
                "-v",
                "quiet",
                "-print_format",
                "json",
                "-show_format",
                "-show_streams",
            ])
            .arg(path)
            .stdout(Stdio::piped())
            .stderr(Stdio::null());

        match timeout(self.timeout, command.output()).await {
            Ok(Ok(output)) if output.status.success() => {
                match serde_json::from_slice::<FfprobeOutput>(&output.stdout) {
                    Ok(parsed) => Some(parsed.into_probe_result()),
                    Err(err) => {
                        warn!("invalid ffprobe payload: {}", err);
                        None
                    }
                }
            }
            Ok(Ok(_)) => None,
            Ok(Err(err)) => {
                warn!("failed to spawn ffprobe: {}", err);
                None
            }
            Err(_) => {
                warn!("ffprobe timed out after {:?}", self.timeout);
                None
            }
        }
    }

    async fn remux(&self, src: &Path, dst: &Path) -> bool {
        // -c copy keeps the compressed streams; +faststart moves the moov
        // atom to the front for progressive playback; make_zero fixes
        // negative timestamp offsets some containers produce.
        let src = src.to_string_lossy();
        self.run_ffmpeg(
            &[
                "-fflags",
                "+genpts+discardcorrupt",
                "-i",
                &src,
                "-c",
                "copy",
                "-movflags",
                "+faststart",
                "-avoid_negative_ts",
                "make_zero",
            ],
            dst,
        )
        .await
    }

    async fn transcode(&self, src: &Path, dst: &Path, crf: u8) -> bool {
        let src = src.to_string_lossy();
        let crf = crf.to_string();
        self.run_ffmpeg(
            &[
                "-i",
                &src,
                "-c:v",
                "libx264",
                "-preset",
                "medium",
                "-crf",
                &crf,
                "-c:a",
                "aac",
                "-b:a",
                "128k",
                "-movflags",
                "+faststart",
            ],
            dst,
        )
        .await
    }

    async fn encode_image(&self, src: &Path, dst: &Path, op: ImageOp) -> bool {
        let src = src.to_path_buf();
        let dst: PathBuf = dst.to_path_buf();
        let result =
            tokio::task::spawn_blocking(move || encode_image_blocking(&src, &dst, op)).await;
        match result {
            Ok(Ok(())) => true,
            Ok(Err(err)) => {
                warn!("image encode failed: {}", err);
                false
            }
            Err(err) => {
                warn!("image encode task panicked: {}", err);
                false
            }
        }
    }

    async fn extract_frame(&self, src: &Path, dst: &Path, timestamp: f64) -> bool {
        let src = src.to_string_lossy();
        let ts = timestamp.to_string();
        self.run_ffmpeg(&["-ss", &ts, "-i", &src, "-frames:v", "1", "-q:v", "2"], dst)
            .await
    }
}

// ---------------------------------------------------------------------------
// In-process image encoding
// ---------------------------------------------------------------------------

/// Read the EXIF orientation tag (1-8, 1 = upright) from a file, if present.
fn exif_orientation(path: &Path) -> u32 {
    let Ok(file) = std::fs::File::open(path) else {
        return 1;
    };
    let mut reader = std::io::BufReader::new(file);
    exif::Reader::new()
        .read_from_container(&mut reader)
        .ok()
        .and_then(|data| {
            data.get_field(exif::Tag::Orientation, exif::In::PRIMARY)
                .and_then(|field| field.value.get_uint(0))
        })
        .unwrap_or(1)
}

fn apply_orientation(img: DynamicImage, orientation: u32) -> DynamicImage {
    match orientation {
        2 => img.fliph(),
        3 => img.rotate180(),
        4 => img.flipv(),
        5 => img.rotate90().fliph(),
        6 => img.rotate90(),
        7 => img.rotate270().fliph(),
        8 => img.rotate270(),
        _ => img,
    }
}

/// Load an image and bake any embedded EXIF rotation into the pixel data.
fn load_oriented(src: &Path) -> anyhow::Result<DynamicImage> {
    let img = image::open(src)?;
    Ok(apply_orientation(img, exif_orientation(src)))
}

/// Composite an image onto an opaque white background, dropping alpha.
fn flatten_alpha(img: &DynamicImage) -> image::RgbImage {
    if !img.color().has_alpha() {
        return img.to_rgb8();
    }
    let rgba = img.to_rgba8();
    let (w, h) = rgba.dimensions();
    let mut out = image::RgbImage::new(w, h);
    for (x, y, px) in rgba.enumerate_pixels() {
        let a = px[3] as u32;
        let blend = |c: u8| (((c as u32) * a + 255 * (255 - a)) / 255) as u8;
        out.put_pixel(x, y, image::Rgb([blend(px[0]), blend(px[1]), blend(px[2])]));
    }
    out
}

/// WebP has no 16-bit or float color support. Convert down to 8-bit first.
fn to_8bit(img: DynamicImage) -> DynamicImage {
    match img.color() {
        image::ColorType::Rgba16 | image::ColorType::La16 | image::ColorType::Rgba32F => {
            DynamicImage::ImageRgba8(img.to_rgba8())
        }
        image::ColorType::Rgb16 | image::ColorType::L16 | image::ColorType::Rgb32F => {
            DynamicImage::ImageRgb8(img.to_rgb8())
        }
        _ => img,
    }
}

fn resize_dimensions(
    orig_w: u32,
    orig_h: u32,
    width: Option<u32>,
    height: Option<u32>,
    scale: Option<f32>,
) -> Option<(u32, u32)> {
    match (width, height, scale) {
        (_, _, Some(s)) => Some((
            ((orig_w as f32 * s) as u32).max(1),
            ((orig_h as f32 * s) as u32).max(1),
        )),
        (Some(w), None, None) => Some((w, ((orig_h as u64 * w as u64) / orig_w as u64) as u32)),
        (None, Some(h), None) => Some((((orig_w as u64 * h as u64) / orig_h as u64) as u32, h)),
        (Some(_), Some(_), None) => None, // fit-within-box, handled by thumbnail()
        (None, None, None) => None,
    }
}

fn encode_image_blocking(src: &Path, dst: &Path, op: ImageOp) -> anyhow::Result<()> {
    let img = load_oriented(src)?;

    match op {
        // The image crate's WebP writer is lossless; the quality knob only
        // affects lossy formats.
        ImageOp::Webp { .. } => {
            let img = to_8bit(img);
            let mut data = Vec::new();
            img.write_to(&mut Cursor::new(&mut data), ImageFormat::WebP)?;
            std::fs::write(dst, data)?;
        }
        ImageOp::Jpeg { quality } => {
            let rgb = flatten_alpha(&img);
            let file = std::fs::File::create(dst)?;
            let mut encoder = JpegEncoder::new_with_quality(std::io::BufWriter::new(file), quality);
            encoder.encode_image(&rgb)?;
        }
        ImageOp::Png => {
            img.save_with_format(dst, ImageFormat::Png)?;
        }
        ImageOp::Ico { sizes } => {
            let rgba = DynamicImage::ImageRgba8(img.to_rgba8());
            let resized: Vec<image::RgbaImage> = sizes
                .iter()
                .map(|size| rgba.resize(*size, *size, FilterType::Lanczos3).to_rgba8())
                .collect();
            let mut frames = Vec::with_capacity(resized.len());
            for entry in &resized {
                let (w, h) = entry.dimensions();
                frames.push(IcoFrame::as_png(
                    entry.as_raw(),
                    w,
                    h,
                    image::ColorType::Rgba8,
                )?);
            }
            let file = std::fs::File::create(dst)?;
            IcoEncoder::new(file).encode_images(&frames)?;
        }
        ImageOp::Resize { width, height, scale } => {
            if width.is_none() && height.is_none() && scale.is_none() {
                anyhow::bail!("no sizing strategy given");
            }
            let (orig_w, orig_h) = (img.width(), img.height());
            let resized = match resize_dimensions(orig_w, orig_h, width, height, scale) {
                Some((w, h)) => img.resize_exact(w, h, FilterType::Lanczos3),
                // width + height: fit within the box, preserving aspect ratio
                None => img.resize(width.unwrap(), height.unwrap(), FilterType::Lanczos3),
            };
            let jpeg_out = matches!(
                file_extension(&dst.to_string_lossy()).as_deref(),
                Some("jpg") | Some("jpeg")
            );
            if jpeg_out {
                let rgb = flatten_alpha(&resized);
                let file = std::fs::File::create(dst)?;
                let mut encoder = JpegEncoder::new_with_quality(std::io::BufWriter::new(file), 85);
                encoder.encode_image(&rgb)?;
            } else {
                resized.save(dst)?;
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn probe(video: Option<&str>, audio: Option<&str>) -> ProbeResult {
        ProbeResult {
            video_codec: video.map(str::to_string),
            audio_codec: audio.map(str::to_string),
            container: Some("matroska".to_string()),
            duration: Some(12.5),
            width: Some(1920),
            height: Some(1080),
        }
    }

    #[test]
    fn test_mp4_ready_h264_aac() {
        assert!(probe(Some("h264"), Some("aac")).is_mp4_ready());
    }

    #[test]
    fn test_mp4_ready_h264_no_audio() {
        assert!(probe(Some("h264"), None).is_mp4_ready());
    }

    #[test]
    fn test_not_mp4_ready_hevc() {
        assert!(!probe(Some("hevc"), Some("aac")).is_mp4_ready());
        assert!(!probe(Some("hevc"), None).is_mp4_ready());
    }

    #[test]
    fn test_not_mp4_ready_wrong_audio() {
        assert!(!probe(Some("h264"), Some("opus")).is_mp4_ready());
        assert!(!probe(None, Some("aac")).is_mp4_ready());
    }

    #[test]
    fn test_ffprobe_parsing() {
        let payload = r#"{
            "streams": [
                {"codec_type": "video", "codec_name": "h264", "width": 1280, "height": 720},
                {"codec_type": "audio", "codec_name": "aac"}
            ],
            "format": {"format_name": "matroska,webm", "duration": "42.360000"}
        }"#;
        let parsed: FfprobeOutput = serde_json::from_str(payload).unwrap();
        let result = parsed.into_probe_result();
        assert_eq!(result.video_codec.as_deref(), Some("h264"));
        assert_eq!(result.audio_codec.as_deref(), Some("aac"));
        assert_eq!(result.container.as_deref(), Some("matroska,webm"));
        assert_eq!(result.width, Some(1280));
        assert_eq!(result.height, Some(720));
        assert!((result.duration.unwrap() - 42.36).abs() < 1e-6);
        assert!(result.is_mp4_ready());
    }

    #[test]
    fn test_ffprobe_parsing_no_audio() {
        let payload = r#"{
            "streams": [{"codec_type": "video", "codec_name": "vp9", "width": 640, "height": 480}],
            "format": {"format_name": "webm"}
        }"#;
        let parsed: FfprobeOutput = serde_json::from_str(payload).unwrap();
        let result = parsed.into_probe_result();
        assert_eq!(result.video_codec.as_deref(), Some("vp9"));
        assert_eq!(result.audio_codec, None);
        assert!(!result.is_mp4_ready());
    }

    #[test]
    fn test_resize_dimensions() {
        // scale
        assert_eq!(
            resize_dimensions(100, 50, None, None, Some(0.5)),
            Some((50, 25))
        );
        // width only keeps aspect
        assert_eq!(
            resize_dimensions(100, 50, Some(40), None, None),
            Some((40, 20))
        );
        // height only keeps aspect
        assert_eq!(
            resize_dimensions(100, 50, None, Some(25), None),
            Some((50, 25))
        );
        // width + height handled by fit-within
        assert_eq!(resize_dimensions(100, 50, Some(40), Some(40), None), None);
    }

    #[test]
    fn test_encode_png_and_jpeg() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src.png");

        // Semi-transparent red square
        let mut img = image::RgbaImage::new(8, 8);
        for px in img.pixels_mut() {
            *px = image::Rgba([255, 0, 0, 128]);
        }
        img.save(&src).unwrap();

        let png_out = dir.path().join("out.png");
        encode_image_blocking(&src, &png_out, ImageOp::Png).unwrap();
        assert!(png_out.is_file());

        // JPEG output must flatten alpha rather than fail
        let jpg_out = dir.path().join("out.jpg");
        encode_image_blocking(&src, &jpg_out, ImageOp::Jpeg { quality: 85 }).unwrap();
        let reloaded = image::open(&jpg_out).unwrap();
        assert!(!reloaded.color().has_alpha());
    }

    #[test]
    fn test_encode_resize_scale() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src.png");
        image::RgbaImage::new(64, 32).save(&src).unwrap();

        let out = dir.path().join("half.png");
        encode_image_blocking(
            &src,
            &out,
            ImageOp::Resize { width: None, height: None, scale: Some(0.5) },
        )
        .unwrap();
        let resized = image::open(&out).unwrap();
        assert_eq!((resized.width(), resized.height()), (32, 16));
    }

    #[test]
    fn test_encode_resize_requires_strategy() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src.png");
        image::RgbaImage::new(4, 4).save(&src).unwrap();

        let out = dir.path().join("out.png");
        let result = encode_image_blocking(
            &src,
            &out,
            ImageOp::Resize { width: None, height: None, scale: None },
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_encode_ico() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src.png");
        image::RgbaImage::new(64, 64).save(&src).unwrap();

        let out = dir.path().join("favicon.ico");
        encode_image_blocking(&src, &out, ImageOp::Ico { sizes: vec![16, 32] }).unwrap();
        assert!(out.is_file());
    }
}
