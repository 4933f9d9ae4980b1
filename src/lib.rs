pub mod config;
pub mod db;
pub mod error;
pub mod media;
pub mod range;
pub mod reconciler;
pub mod server;

pub use config::Config;
pub use db::{Db, VideoRecord};
pub use error::VidshelfError;
pub use media::thumbnail::{FfmpegFrameExtractor, FrameExtractor, ThumbnailGenerator};
pub use range::{parse_range, ByteRange};
pub use reconciler::{Reconciler, ReconcilerState};
