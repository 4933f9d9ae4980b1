//! Preview image generation.
//!
//! One JPEG per video, taken from a fixed offset into the stream. Generation
//! never overwrites an existing thumbnail and failures are logged and dropped
//! so a broken file cannot stall a library scan.

use crate::error::{Result, VidshelfError};
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Pulls a single frame out of a video and writes it as a JPEG.
#[async_trait]
pub trait FrameExtractor: Send + Sync {
    async fn extract_frame(&self, video: &Path, output: &Path, offset: Duration) -> Result<()>;
}

pub struct FfmpegFrameExtractor {
    ffmpeg_path: String,
}

impl FfmpegFrameExtractor {
    pub fn new(ffmpeg_path: impl Into<String>) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
        }
    }

    fn command(&self, video: &Path, output: &Path, offset: Duration) -> tokio::process::Command {
        let mut cmd = tokio::process::Command::new(&self.ffmpeg_path);
        cmd.arg("-hide_banner")
            .args(["-loglevel", "error"])
            .arg("-n")
            .arg("-ss")
            .arg(offset.as_secs().to_string())
            .arg("-i")
            .arg(video)
            .args(["-frames:v", "1"])
            .args(["-f", "image2"])
            .args(["-c:v", "mjpeg"])
            .arg(output)
            .stdin(Stdio::null())
            .kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl FrameExtractor for FfmpegFrameExtractor {
    async fn extract_frame(&self, video: &Path, output: &Path, offset: Duration) -> Result<()> {
        // Only a file this call wrote may be cleaned up on failure.
        let created_here = matches!(tokio::fs::try_exists(output).await, Ok(false));

        let result = self
            .command(video, output, offset)
            .output()
            .await
            .map_err(|e| {
                VidshelfError::ExternalToolFailure(format!(
                    "failed to run {}: {}",
                    self.ffmpeg_path, e
                ))
            })?;

        if !result.status.success() {
            if created_here {
                remove_partial(output).await;
            }
            let stderr = String::from_utf8_lossy(&result.stderr);
            return Err(VidshelfError::ExternalToolFailure(format!(
                "{} exited with {}: {}",
                self.ffmpeg_path,
                result.status,
                stderr.trim()
            )));
        }

        // ffmpeg exits cleanly without writing anything when the offset is
        // past the end of the stream.
        match tokio::fs::metadata(output).await {
            Ok(metadata) if metadata.len() > 0 => Ok(()),
            _ => {
                if created_here {
                    remove_partial(output).await;
                }
                Err(VidshelfError::ExternalToolFailure(format!(
                    "no frame at {}s",
                    offset.as_secs()
                )))
            }
        }
    }
}

async fn remove_partial(output: &Path) {
    if let Err(e) = tokio::fs::remove_file(output).await {
        if e.kind() != ErrorKind::NotFound {
            warn!("Could not remove partial thumbnail {:?}: {}", output, e);
        }
    }
}

/// Checks that the ffmpeg binary runs and returns its version line.
pub async fn verify_ffmpeg(ffmpeg_path: &str) -> Result<String> {
    let output = tokio::process::Command::new(ffmpeg_path)
        .arg("-version")
        .output()
        .await
        .map_err(|e| VidshelfError::ExternalToolFailure(format!("FFmpeg not found: {}", e)))?;

    if !output.status.success() {
        return Err(VidshelfError::ExternalToolFailure(
            "FFmpeg returned error".into(),
        ));
    }

    let version = String::from_utf8_lossy(&output.stdout);
    let first_line = version.lines().next().unwrap_or("unknown");

    info!("FFmpeg version: {}", first_line);
    Ok(first_line.to_string())
}

/// `clip.mp4` -> `clip.jpg`.
pub fn thumbnail_file_name(filename: &str) -> Option<String> {
    let stem = Path::new(filename).file_stem()?.to_str()?;
    Some(format!("{}.jpg", stem))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThumbnailOutcome {
    Existing,
    Created,
    Failed,
}

pub struct ThumbnailGenerator {
    extractor: Arc<dyn FrameExtractor>,
    thumbnail_dir: PathBuf,
    offset: Duration,
}

impl ThumbnailGenerator {
    pub fn new(extractor: Arc<dyn FrameExtractor>, thumbnail_dir: PathBuf, offset: Duration) -> Self {
        Self {
            extractor,
            thumbnail_dir,
            offset,
        }
    }

    pub fn thumbnail_path_for(&self, filename: &str) -> Option<PathBuf> {
        thumbnail_file_name(filename).map(|name| self.thumbnail_dir.join(name))
    }

    /// Runs the extraction unconditionally.
    pub async fn generate(&self, video: &Path, thumbnail: &Path) -> Result<()> {
        self.extractor
            .extract_frame(video, thumbnail, self.offset)
            .await
    }

    /// Log-and-continue policy: creates the thumbnail for `video` unless it
    /// already exists. Failures are logged and reported as
    /// [`ThumbnailOutcome::Failed`]; the next scan retries them.
    pub async fn ensure_thumbnail(&self, video: &Path, filename: &str) -> ThumbnailOutcome {
        let Some(thumbnail) = self.thumbnail_path_for(filename) else {
            warn!("Cannot derive a thumbnail name for {:?}", video);
            return ThumbnailOutcome::Failed;
        };

        match tokio::fs::try_exists(&thumbnail).await {
            Ok(true) => {
                debug!("Thumbnail already present: {:?}", thumbnail);
                return ThumbnailOutcome::Existing;
            }
            Ok(false) => {}
            Err(e) => {
                warn!("Could not check thumbnail {:?}: {}", thumbnail, e);
                return ThumbnailOutcome::Failed;
            }
        }

        match self.generate(video, &thumbnail).await {
            Ok(()) => {
                info!("Created thumbnail {:?}", thumbnail);
                ThumbnailOutcome::Created
            }
            Err(e) => {
                warn!("Error creating thumbnail for {:?}: {}", video, e);
                ThumbnailOutcome::Failed
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::testing::RecordingExtractor;
    use super::*;

    #[test]
    fn thumbnail_name_replaces_extension() {
        assert_eq!(thumbnail_file_name("clip.mp4").as_deref(), Some("clip.jpg"));
        assert_eq!(thumbnail_file_name("a.b.mp4").as_deref(), Some("a.b.jpg"));
        assert_eq!(thumbnail_file_name("noext").as_deref(), Some("noext.jpg"));
        assert_eq!(thumbnail_file_name(""), None);
    }

    #[test]
    fn ffmpeg_command_seeks_and_grabs_one_frame() {
        let extractor = FfmpegFrameExtractor::new("ffmpeg");
        let cmd = extractor.command(
            Path::new("/videos/clip.mp4"),
            Path::new("/thumbs/clip.jpg"),
            Duration::from_secs(15),
        );
        let args: Vec<String> = cmd
            .as_std()
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();

        let seek = args.iter().position(|a| a == "-ss").expect("-ss");
        assert_eq!(args[seek + 1], "15");
        let input = args.iter().position(|a| a == "-i").expect("-i");
        assert!(seek < input, "seek must precede input");
        assert_eq!(args[input + 1], "/videos/clip.mp4");
        assert!(args.windows(2).any(|w| w[0] == "-frames:v" && w[1] == "1"));
        assert!(args.windows(2).any(|w| w[0] == "-c:v" && w[1] == "mjpeg"));
        assert!(args.iter().any(|a| a == "-n"));
        assert_eq!(args.last().map(String::as_str), Some("/thumbs/clip.jpg"));
    }

    #[tokio::test]
    async fn ensure_extracts_at_most_once() {
        let thumbs = tempfile::tempdir().expect("tempdir");
        let extractor = Arc::new(RecordingExtractor::default());
        let generator = ThumbnailGenerator::new(
            extractor.clone(),
            thumbs.path().to_path_buf(),
            Duration::from_secs(15),
        );
        let video = Path::new("/videos/clip.mp4");

        assert_eq!(
            generator.ensure_thumbnail(video, "clip.mp4").await,
            ThumbnailOutcome::Created
        );
        assert_eq!(
            generator.ensure_thumbnail(video, "clip.mp4").await,
            ThumbnailOutcome::Existing
        );
        assert_eq!(extractor.calls(), 1);
        assert!(thumbs.path().join("clip.jpg").exists());
    }

    #[tokio::test]
    async fn ensure_swallows_failures_and_retries_later() {
        let thumbs = tempfile::tempdir().expect("tempdir");
        let extractor = Arc::new(RecordingExtractor::failing());
        let generator = ThumbnailGenerator::new(
            extractor.clone(),
            thumbs.path().to_path_buf(),
            Duration::from_secs(15),
        );
        let video = Path::new("/videos/broken.mp4");

        assert_eq!(
            generator.ensure_thumbnail(video, "broken.mp4").await,
            ThumbnailOutcome::Failed
        );
        assert_eq!(
            generator.ensure_thumbnail(video, "broken.mp4").await,
            ThumbnailOutcome::Failed
        );
        assert_eq!(extractor.calls(), 2);
        assert!(!thumbs.path().join("broken.jpg").exists());
    }

    #[tokio::test]
    async fn missing_ffmpeg_is_external_tool_failure() {
        let thumbs = tempfile::tempdir().expect("tempdir");
        let extractor = FfmpegFrameExtractor::new("/nonexistent/bin/ffmpeg");
        let result = extractor
            .extract_frame(
                Path::new("/videos/clip.mp4"),
                &thumbs.path().join("clip.jpg"),
                Duration::from_secs(15),
            )
            .await;
        assert!(matches!(result, Err(VidshelfError::ExternalToolFailure(_))));
    }

    #[tokio::test]
    async fn unreadable_thumbnail_location_skips_extraction() {
        let root = tempfile::tempdir().expect("tempdir");
        // A regular file where the thumbnail directory should be makes the
        // existence check fail with ENOTDIR rather than answer "absent".
        let not_a_dir = root.path().join("thumbs");
        std::fs::write(&not_a_dir, b"").expect("write");
        let extractor = Arc::new(RecordingExtractor::default());
        let generator = ThumbnailGenerator::new(
            extractor.clone(),
            not_a_dir,
            Duration::from_secs(15),
        );

        assert_eq!(
            generator
                .ensure_thumbnail(Path::new("/videos/clip.mp4"), "clip.mp4")
                .await,
            ThumbnailOutcome::Failed
        );
        assert_eq!(extractor.calls(), 0);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn failed_extraction_keeps_existing_output() {
        let thumbs = tempfile::tempdir().expect("tempdir");
        let existing = thumbs.path().join("clip.jpg");
        std::fs::write(&existing, [0xFF, 0xD8, 0xFF, 0xD9]).expect("write");

        let extractor = FfmpegFrameExtractor::new("false");
        let result = extractor
            .extract_frame(Path::new("/videos/clip.mp4"), &existing, Duration::from_secs(15))
            .await;

        assert!(matches!(result, Err(VidshelfError::ExternalToolFailure(_))));
        assert_eq!(
            std::fs::read(&existing).expect("thumbnail kept"),
            vec![0xFF, 0xD8, 0xFF, 0xD9]
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn clean_exit_without_output_is_no_frame() {
        let thumbs = tempfile::tempdir().expect("tempdir");
        let output = thumbs.path().join("clip.jpg");

        let extractor = FfmpegFrameExtractor::new("true");
        let result = extractor
            .extract_frame(Path::new("/videos/clip.mp4"), &output, Duration::from_secs(15))
            .await;

        assert!(matches!(result, Err(VidshelfError::ExternalToolFailure(_))));
        assert!(!output.exists());
    }
}
