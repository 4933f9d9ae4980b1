use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::VidshelfError;

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub library: LibraryConfig,
    pub database: DatabaseConfig,
    pub reconciler: ReconcilerConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct LibraryConfig {
    pub video_dirs: Vec<PathBuf>,
    pub thumbnail_dir: PathBuf,
    pub extensions: Vec<String>, // matched case-insensitively, without the dot
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: PathBuf,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct ReconcilerConfig {
    pub gc_interval_secs: u64,
    pub thumbnail_offset_secs: u64,
    pub ffmpeg_path: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:5000".to_string(),
        }
    }
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self {
            video_dirs: Vec::new(),
            thumbnail_dir: PathBuf::from("thumbnails"),
            extensions: vec!["mp4".to_string()],
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("vidshelf.db"),
        }
    }
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            gc_interval_secs: 3600,
            thumbnail_offset_secs: 15,
            ffmpeg_path: "ffmpeg".to_string(),
        }
    }
}

impl ReconcilerConfig {
    pub fn gc_interval(&self) -> Duration {
        Duration::from_secs(self.gc_interval_secs)
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Checks the settings the service cannot run without.
    pub fn validate(&self) -> std::result::Result<(), VidshelfError> {
        if self.library.video_dirs.is_empty() {
            return Err(VidshelfError::Config(
                "at least one video directory is required".into(),
            ));
        }
        if self.reconciler.gc_interval_secs == 0 {
            return Err(VidshelfError::Config(
                "reconciler.gc_interval_secs must be greater than zero".into(),
            ));
        }
        if self.library.extensions.is_empty() {
            return Err(VidshelfError::Config(
                "library.extensions must not be empty".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let config = match Config::load(Path::new("/nonexistent/vidshelf.toml")) {
            Ok(config) => config,
            Err(e) => panic!("Expected defaults, got {}", e),
        };
        assert_eq!(config.server.bind, "0.0.0.0:5000");
        assert_eq!(config.library.extensions, vec!["mp4".to_string()]);
        assert_eq!(config.reconciler.gc_interval_secs, 3600);
        assert_eq!(config.reconciler.thumbnail_offset_secs, 15);
    }

    #[test]
    fn partial_file_keeps_remaining_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("vidshelf.toml");
        std::fs::write(
            &path,
            "[library]\nvideo_dirs = [\"/srv/videos\"]\n\n[reconciler]\ngc_interval_secs = 60\n",
        )
        .expect("write config");

        let config = Config::load(&path).expect("load config");
        assert_eq!(config.library.video_dirs, vec![PathBuf::from("/srv/videos")]);
        assert_eq!(config.library.thumbnail_dir, PathBuf::from("thumbnails"));
        assert_eq!(config.reconciler.gc_interval(), Duration::from_secs(60));
        assert_eq!(config.database.path, PathBuf::from("vidshelf.db"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn validate_rejects_empty_video_dirs() {
        let config = Config::default();
        assert!(matches!(config.validate(), Err(VidshelfError::Config(_))));
    }

    #[test]
    fn validate_rejects_zero_interval() {
        let mut config = Config::default();
        config.library.video_dirs.push(PathBuf::from("/srv/videos"));
        config.reconciler.gc_interval_secs = 0;
        assert!(matches!(config.validate(), Err(VidshelfError::Config(_))));
    }
}
