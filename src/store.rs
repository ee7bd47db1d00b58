//! Local persistence of downloaded documents.

use crate::error::WorkflowError;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Name used when the server-provided name has no usable file-name part.
pub const FALLBACK_FILENAME: &str = "downloaded_file.odt";

/// Bytes written to a staging location, not yet visible under their final
/// name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedArtifact {
    /// Where the bytes currently are.
    pub staging_path: PathBuf,
    /// Where [`ArtifactStore::commit`] moves them.
    pub target: PathBuf,
}

/// Persists fetched artifact bytes into the user's environment.
///
/// Saving is two-phase. [`stage`](Self::stage) does the slow write and may
/// be abandoned; [`commit`](Self::commit) is a quick synchronous move that
/// the download coordinator runs while it holds its session lock, so a
/// session closed during the write never ends up with a saved file.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Write `bytes` for `filename` to a staging location.
    async fn stage(&self, filename: &str, bytes: &[u8]) -> Result<StagedArtifact, WorkflowError>;

    /// Move staged bytes to their final location, returning it.
    fn commit(&self, staged: &StagedArtifact) -> Result<PathBuf, WorkflowError>;

    /// Drop staged bytes that will not be committed. Best effort.
    fn discard(&self, staged: &StagedArtifact);

    /// Stage and commit in one go.
    async fn save(&self, filename: &str, bytes: &[u8]) -> Result<PathBuf, WorkflowError> {
        let staged = self.stage(filename, bytes).await?;
        self.commit(&staged)
    }
}

/// Writes artifacts into a directory on the local filesystem.
#[derive(Debug, Clone)]
pub struct FsArtifactStore {
    dir: PathBuf,
}

impl FsArtifactStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Final path for a server-provided name, confined to the store directory.
    pub fn target_path(&self, filename: &str) -> PathBuf {
        self.dir.join(sanitize_filename(filename))
    }
}

#[async_trait]
impl ArtifactStore for FsArtifactStore {
    async fn stage(&self, filename: &str, bytes: &[u8]) -> Result<StagedArtifact, WorkflowError> {
        let target = self.target_path(filename);
        let fail = |source| WorkflowError::SaveFailed {
            path: target.clone(),
            source,
        };

        tokio::fs::create_dir_all(&self.dir).await.map_err(fail)?;

        let mut tmp_name = target.file_name().unwrap_or_default().to_os_string();
        tmp_name.push(".part");
        let staging_path = target.with_file_name(tmp_name);
        if let Err(e) = tokio::fs::write(&staging_path, bytes).await {
            let _ = tokio::fs::remove_file(&staging_path).await;
            return Err(fail(e));
        }

        debug!("Staged {} bytes at {}", bytes.len(), staging_path.display());
        Ok(StagedArtifact {
            staging_path,
            target,
        })
    }

    fn commit(&self, staged: &StagedArtifact) -> Result<PathBuf, WorkflowError> {
        if let Err(source) = std::fs::rename(&staged.staging_path, &staged.target) {
            self.discard(staged);
            return Err(WorkflowError::SaveFailed {
                path: staged.target.clone(),
                source,
            });
        }
        debug!("Saved {}", staged.target.display());
        Ok(staged.target.clone())
    }

    fn discard(&self, staged: &StagedArtifact) {
        match std::fs::remove_file(&staged.staging_path) {
            Ok(()) => debug!("Discarded {}", staged.staging_path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Could not remove {}: {}", staged.staging_path.display(), e),
        }
    }
}

/// Keep only the last path component of `name`; empty or dot-only names
/// become [`FALLBACK_FILENAME`].
pub fn sanitize_filename(name: &str) -> String {
    let last = name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim();
    if last.is_empty() || last.chars().all(|c| c == '.') {
        FALLBACK_FILENAME.to_string()
    } else {
        last.to_string()
    }
}
