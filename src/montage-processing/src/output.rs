//! Output file replacement

use std::io;
use std::path::Path;

use tracing::{debug, warn};

/// Remove whatever sits at `path` so a new artifact can take its place
pub async fn replace_existing(path: &Path) -> io::Result<()> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {
            debug!("removed previous output {:?}", path);
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

/// Best-effort cleanup of a half-written artifact after a failure
pub async fn discard_partial(path: &Path) {
    if let Err(e) = replace_existing(path).await {
        warn!("failed to remove partial output {:?}: {}", path, e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_replace_existing_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("video.mp4");

        std::fs::write(&path, b"stale").unwrap();
        replace_existing(&path).await.unwrap();
        assert!(!path.exists());

        // nothing left to remove
        replace_existing(&path).await.unwrap();
    }
}
