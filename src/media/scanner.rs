use rayon::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// A playable file found directly under one of the video directories.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredVideo {
    pub path: PathBuf,
    /// Catalog key: the bare file name relative to its directory.
    pub filename: String,
}

pub struct Scanner {
    pub extensions: Vec<String>,
}

impl Default for Scanner {
    fn default() -> Self {
        Self::new(vec!["mp4".to_string()])
    }
}

impl Scanner {
    pub fn new(extensions: Vec<String>) -> Self {
        Self {
            extensions: extensions
                .into_iter()
                .map(|ext| ext.trim_start_matches('.').to_lowercase())
                .collect(),
        }
    }

    pub fn is_supported(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|s| s.to_str())
            .map(|ext| self.extensions.contains(&ext.to_lowercase()))
            .unwrap_or(false)
    }

    /// Lists supported files in each directory (non-recursive). Directories
    /// are walked in parallel; the result is sorted by path.
    pub fn scan(&self, directories: &[PathBuf]) -> Vec<DiscoveredVideo> {
        let mut found: Vec<DiscoveredVideo> = directories
            .par_iter()
            .flat_map_iter(|dir| self.scan_dir(dir))
            .collect();

        // Deterministic ordering
        found.sort_by(|a, b| a.path.cmp(&b.path));

        info!("Found {} candidate video files", found.len());
        found
    }

    fn scan_dir(&self, dir: &Path) -> Vec<DiscoveredVideo> {
        if !dir.is_dir() {
            warn!("Video directory does not exist: {:?}", dir);
            return Vec::new();
        }
        info!("Scanning directory: {:?}", dir);

        let mut local = Vec::new();
        for entry in WalkDir::new(dir)
            .min_depth(1)
            .max_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
        {
            if !entry.file_type().is_file() || !self.is_supported(entry.path()) {
                continue;
            }
            match entry.file_name().to_str() {
                Some(name) => {
                    debug!("Found video file: {:?}", entry.path());
                    local.push(DiscoveredVideo {
                        path: entry.path().to_path_buf(),
                        filename: name.to_string(),
                    });
                }
                None => warn!("Skipping non UTF-8 file name: {:?}", entry.path()),
            }
        }
        local
    }
}
