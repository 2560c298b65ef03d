//! Saving a finished recording to disk

use crate::utils::error::{AppError, AppResult};
use std::io::Write;
use std::path::PathBuf;

/// Destination for downloaded recordings
pub trait FileSaver: Send + Sync {
    /// Save `bytes` as `filename`, returning where the file ended up
    fn save(&self, filename: &str, mime_type: &str, bytes: &[u8]) -> AppResult<PathBuf>;
}

/// Writes downloads into a directory.
///
/// The file is written to a temporary file in the same directory and then
/// renamed over the target, so a partial download never replaces an older one.
pub struct DownloadDirSaver {
    dir: PathBuf,
}

impl DownloadDirSaver {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl FileSaver for DownloadDirSaver {
    fn save(&self, filename: &str, mime_type: &str, bytes: &[u8]) -> AppResult<PathBuf> {
        if filename.contains(|c: char| c == '/' || c == '\\') {
            return Err(AppError::Config(format!("invalid download filename: {}", filename)));
        }
        std::fs::create_dir_all(&self.dir)?;

        let target = self.dir.join(filename);
        let mut file = tempfile::NamedTempFile::new_in(&self.dir)?;
        file.write_all(bytes)?;
        file.as_file().sync_all()?;
        file.persist(&target).map_err(|e| AppError::Io(e.error))?;

        tracing::info!(
            "Saved {} ({}, {} bytes) to {:?}",
            filename,
            mime_type,
            bytes.len(),
            target
        );
        Ok(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_save_creates_directory_and_file() {
        let dir = tempdir().unwrap();
        let saver = DownloadDirSaver::new(dir.path().join("downloads"));

        let path = saver.save("clip.webm", "video/webm", b"abc").unwrap();
        assert_eq!(path, dir.path().join("downloads").join("clip.webm"));
        assert_eq!(std::fs::read(&path).unwrap(), b"abc");
    }

    #[test]
    fn test_save_overwrites_existing_file() {
        let dir = tempdir().unwrap();
        let saver = DownloadDirSaver::new(dir.path());

        saver.save("clip.webm", "video/webm", b"first").unwrap();
        let path = saver.save("clip.webm", "video/webm", b"second").unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"second");
    }

    #[test]
    fn test_rejects_path_in_filename() {
        let dir = tempdir().unwrap();
        let saver = DownloadDirSaver::new(dir.path());
        assert!(saver.save("../escape.webm", "video/webm", b"x").is_err());
    }
}
