use std::path::{Path, PathBuf};
use log::{debug, info, warn};
use thiserror::Error;
use walkdir::WalkDir;
use crate::job::Job;

/// Recognized video extensions, compared case-insensitively
pub const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mkv", "mov", "avi"];

#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("input folder not found: {}; choose an existing folder", .0.display())]
    DirectoryNotFound(PathBuf),
    #[error("failed to list input folder {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },
}

/// Check the extension only, ignoring case
pub fn is_video_file(path: &Path) -> bool {
    path.extension()
        .and_then(|s| s.to_str())
        .map(|ext| {
            let ext = ext.to_lowercase();
            VIDEO_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}

/// List `directory` (non-recursively) and return one pending job per video
/// file, ordered by file name. An empty result is not an error.
pub fn discover(directory: &Path, output_dir: &Path) -> Result<Vec<Job>, DiscoveryError> {
    if !directory.is_dir() {
        return Err(DiscoveryError::DirectoryNotFound(directory.to_path_buf()));
    }

    info!("Scanning input folder: {}", directory.display());

    let walker = WalkDir::new(directory)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name();

    let mut jobs = Vec::new();
    for entry in walker {
        let entry = match entry {
            Ok(e) => e,
            // The root itself could not be read
            Err(e) if e.depth() == 0 => {
                return Err(DiscoveryError::Io {
                    path: directory.to_path_buf(),
                    source: e,
                });
            }
            Err(e) => {
                warn!("Error reading directory entry: {}", e);
                continue;
            }
        };

        let path = entry.path();
        if !path.is_file() || !is_video_file(path) {
            continue;
        }

        debug!("Found video file: {}", path.display());
        jobs.push(Job::new(path.to_path_buf(), output_dir));
    }

    info!("Discovery complete: {} video file(s) in {}", jobs.len(), directory.display());
    Ok(jobs)
}
