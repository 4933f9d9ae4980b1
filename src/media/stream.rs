//! Byte-range serving of video files.

use crate::error::{Result, VidshelfError};
use crate::range::ByteRange;
use axum::body::Body;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use std::io::{ErrorKind, SeekFrom};
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt, Take};
use tokio_util::io::ReaderStream;
use tracing::{debug, error, warn};

const STREAM_CHUNK_SIZE: usize = 64 * 1024;

/// The byte window a request resolves to once clamped against the file size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServeWindow {
    pub start: u64,
    pub end: u64,
    pub file_size: u64,
    pub partial: bool,
}

impl ServeWindow {
    /// Without a start offset the whole file is served. A start past the end
    /// is clamped to the last byte; an absent or oversized end becomes the
    /// last byte.
    pub fn resolve(file_size: u64, range: Option<ByteRange>) -> Self {
        let requested = range.unwrap_or_default();
        match requested.start {
            Some(start) if file_size > 0 => {
                let last = file_size - 1;
                let start = start.min(last);
                let end = match requested.end {
                    Some(end) if end < file_size => end.max(start),
                    _ => last,
                };
                Self {
                    start,
                    end,
                    file_size,
                    partial: true,
                }
            }
            _ => Self {
                start: 0,
                end: file_size.saturating_sub(1),
                file_size,
                partial: false,
            },
        }
    }

    pub fn length(&self) -> u64 {
        if self.partial {
            self.end - self.start + 1
        } else {
            self.file_size
        }
    }

    pub fn status(&self) -> StatusCode {
        if self.partial {
            StatusCode::PARTIAL_CONTENT
        } else {
            StatusCode::OK
        }
    }

    pub fn content_range(&self) -> Option<String> {
        self.partial
            .then(|| format!("bytes {}-{}/{}", self.start, self.end, self.file_size))
    }
}

/// An opened file positioned at the start of its serve window.
pub struct PartialContent {
    pub window: ServeWindow,
    pub content_type: String,
    reader: Take<File>,
}

impl PartialContent {
    pub async fn open(path: &Path, range: Option<ByteRange>) -> Result<Self> {
        let mut file = match File::open(path).await {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(VidshelfError::video_not_found())
            }
            Err(e) => return Err(e.into()),
        };

        let metadata = file.metadata().await?;
        if !metadata.is_file() {
            return Err(VidshelfError::video_not_found());
        }

        let window = ServeWindow::resolve(metadata.len(), range);
        if window.start > 0 {
            file.seek(SeekFrom::Start(window.start)).await?;
        }

        let content_type = mime_guess::from_path(path)
            .first_or_octet_stream()
            .to_string();

        debug!(
            "Serving {:?} bytes {}-{}/{} ({})",
            path,
            window.start,
            window.end,
            window.file_size,
            window.status()
        );

        Ok(Self {
            window,
            content_type,
            reader: file.take(window.length()),
        })
    }

    #[cfg(test)]
    async fn read_to_vec(mut self) -> Result<Vec<u8>> {
        let mut data = Vec::with_capacity(self.window.length() as usize);
        self.reader.read_to_end(&mut data).await?;
        Ok(data)
    }
}

impl IntoResponse for PartialContent {
    fn into_response(self) -> Response {
        let mut builder = Response::builder()
            .status(self.window.status())
            .header(header::CONTENT_TYPE, &self.content_type)
            .header(header::CONTENT_LENGTH, self.window.length().to_string())
            .header(header::ACCEPT_RANGES, "bytes");
        if let Some(content_range) = self.window.content_range() {
            builder = builder.header(header::CONTENT_RANGE, content_range);
        }

        let body = Body::from_stream(ReaderStream::with_capacity(self.reader, STREAM_CHUNK_SIZE));
        match builder.body(body) {
            Ok(response) => response,
            Err(e) => {
                error!("Failed to build video response: {}", e);
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            }
        }
    }
}

/// A bare file name: no separators, not `.` or `..`.
pub fn is_plain_file_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\', '\0'])
}

/// Finds `filename` in the first video directory that holds it as a regular
/// file.
pub async fn resolve_video_path(dirs: &[PathBuf], filename: &str) -> Result<PathBuf> {
    if !is_plain_file_name(filename) {
        return Err(VidshelfError::video_not_found());
    }

    for dir in dirs {
        let candidate = dir.join(filename);
        match tokio::fs::metadata(&candidate).await {
            Ok(metadata) if metadata.is_file() => return Ok(candidate),
            Ok(_) => continue,
            Err(e) if e.kind() == ErrorKind::NotFound => continue,
            Err(e) => {
                warn!("Could not stat {:?}: {}", candidate, e);
                continue;
            }
        }
    }

    Err(VidshelfError::video_not_found())
}
