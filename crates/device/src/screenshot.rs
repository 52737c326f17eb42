//! Screenshot persistence.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

/// Writes captured screens to a directory as `<unix-millis>_screen.png`.
#[derive(Debug, Clone)]
pub struct ScreenshotStore {
    dir: PathBuf,
}

impl ScreenshotStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Save one PNG. Failures are logged and reported as `None`.
    pub async fn save(&self, png: &[u8]) -> Option<PathBuf> {
        if let Err(e) = tokio::fs::create_dir_all(&self.dir).await {
            warn!(dir = %self.dir.display(), error = %e, "Cannot create screenshot directory");
            return None;
        }

        let path = self.dir.join(file_name(chrono::Utc::now().timestamp_millis()));
        match tokio::fs::write(&path, png).await {
            Ok(()) => {
                debug!(path = %path.display(), bytes = png.len(), "Screenshot saved");
                Some(path)
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to save screenshot");
                None
            }
        }
    }
}

fn file_name(unix_millis: i64) -> String {
    format!("{unix_millis}_screen.png")
}
