//! Download stage: fetch-and-save of the generated document.
//!
//! One explicit state machine replaces the "is downloading" / "show dialog"
//! flags a UI would otherwise juggle:
//!
//! ```text
//!            start_download            ok
//!   Idle ───────────────────▶ Downloading ─────▶ Downloaded ──restart──▶ (Upload)
//!                               │    ▲
//!                          fail │    │ start_download
//!                               ▼    │
//!                               Error
//! ```
//!
//! `start_download` while `Downloading` is a no-op, so rapid repeated clicks
//! cause a single fetch. `close` is allowed in every phase; when a fetch or
//! save is in flight its result is dropped instead of being applied to a
//! session that no longer exists. Each opened or closed session bumps a
//! generation counter, and results carrying a stale generation are ignored.
//! The fetched bytes are staged first and only committed to their final
//! name under the session lock, after the generation check.
//!
//! The state sits behind a `Mutex` so the coordinator can be shared between
//! tasks; the lock is never held across an `.await`.

use super::WorkflowContext;
use crate::error::WorkflowError;
use crate::model::GeneratedArtifactRef;
use crate::notify::{FollowUp, Notification};
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadPhase {
    Idle,
    Downloading,
    Downloaded,
    Error,
}

impl DownloadPhase {
    fn describe(self) -> &'static str {
        match self {
            DownloadPhase::Idle => "the download has not started",
            DownloadPhase::Downloading => "a download is in progress",
            DownloadPhase::Downloaded => "the document is already saved",
            DownloadPhase::Error => "the last download failed",
        }
    }
}

/// A generated document awaiting (or done with) download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadSession {
    pub artifact: GeneratedArtifactRef,
    pub phase: DownloadPhase,
    /// Where the document was written, once `Downloaded`.
    pub saved_to: Option<PathBuf>,
    /// Message of the last failure, while in `Error`.
    pub last_error: Option<String>,
}

impl DownloadSession {
    fn new(artifact: GeneratedArtifactRef) -> Self {
        Self {
            artifact,
            phase: DownloadPhase::Idle,
            saved_to: None,
            last_error: None,
        }
    }
}

/// Result of a [`DownloadCoordinator::start_download`] call.
#[derive(Debug)]
pub enum DownloadOutcome {
    /// Fetched and written to disk.
    Saved(PathBuf),
    /// Fetch or save failed; the session is in `Error` and may be retried.
    Failed(WorkflowError),
    /// Nothing was started because of the current phase.
    Ignored(DownloadPhase),
    /// No session is open.
    NoSession,
    /// The session was closed or replaced while the fetch was in flight.
    Abandoned,
}

impl DownloadOutcome {
    pub fn is_saved(&self) -> bool {
        matches!(self, DownloadOutcome::Saved(_))
    }
}

#[derive(Debug, Default)]
struct Inner {
    session: Option<DownloadSession>,
    generation: u64,
}

pub struct DownloadCoordinator {
    ctx: WorkflowContext,
    inner: Mutex<Inner>,
}

impl DownloadCoordinator {
    pub fn new(ctx: WorkflowContext) -> Self {
        Self {
            ctx,
            inner: Mutex::new(Inner::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Open a fresh `Idle` session, replacing any previous one.
    pub fn open(&self, artifact: GeneratedArtifactRef) {
        let mut inner = self.lock();
        inner.generation += 1;
        debug!("Download session {} opened for '{}'", inner.generation, artifact.filename);
        inner.session = Some(DownloadSession::new(artifact));
    }

    pub fn phase(&self) -> Option<DownloadPhase> {
        self.lock().session.as_ref().map(|s| s.phase)
    }

    pub fn session(&self) -> Option<DownloadSession> {
        self.lock().session.clone()
    }

    /// Fetch the artifact and save it.
    ///
    /// Permitted from `Idle` and `Error`; a no-op in any other phase.
    pub async fn start_download(&self) -> DownloadOutcome {
        let (artifact, generation) = {
            let mut guard = self.lock();
            let inner = &mut *guard;
            let Some(session) = inner.session.as_mut() else {
                return DownloadOutcome::NoSession;
            };
            match session.phase {
                DownloadPhase::Idle | DownloadPhase::Error => {}
                phase @ (DownloadPhase::Downloading | DownloadPhase::Downloaded) => {
                    debug!("start_download ignored: {}", phase.describe());
                    return DownloadOutcome::Ignored(phase);
                }
            }
            session.phase = DownloadPhase::Downloading;
            session.last_error = None;
            (session.artifact.clone(), inner.generation)
        };

        info!("Downloading '{}'", artifact.filename);
        let bytes = match self.ctx.service.fetch(&artifact.filename).await {
            Ok(bytes) => bytes,
            Err(e) => return self.finish(generation, || Err(e.into())),
        };
        if !self.is_current(generation) {
            debug!("Discarding response for closed session {generation}");
            return DownloadOutcome::Abandoned;
        }

        let staged = match self.ctx.store.stage(&artifact.filename, &bytes).await {
            Ok(staged) => staged,
            Err(e) => return self.finish(generation, || Err(e)),
        };
        let outcome = self.finish(generation, || self.ctx.store.commit(&staged));
        if let DownloadOutcome::Abandoned = outcome {
            self.ctx.store.discard(&staged);
        }
        outcome
    }

    fn is_current(&self, generation: u64) -> bool {
        let inner = self.lock();
        inner.generation == generation && inner.session.is_some()
    }

    /// Apply the result of a download to its session.
    ///
    /// `result` runs under the session lock and only if the session is still
    /// the one the download started for, so a concurrent `close` either sees
    /// the finished session or prevents `result` from running at all.
    fn finish(
        &self,
        generation: u64,
        result: impl FnOnce() -> Result<PathBuf, WorkflowError>,
    ) -> DownloadOutcome {
        let (notification, result) = {
            let mut guard = self.lock();
            let inner = &mut *guard;
            let current = inner.generation;
            let session = match inner.session.as_mut() {
                Some(s) if current == generation => s,
                _ => {
                    debug!("Discarding result for closed session {generation}");
                    return DownloadOutcome::Abandoned;
                }
            };
            let result = result();
            let notification = match &result {
                Ok(path) => {
                    session.phase = DownloadPhase::Downloaded;
                    session.saved_to = Some(path.clone());
                    info!("Saved '{}' to {}", session.artifact.filename, path.display());
                    Notification::success(format!("Download complete: {}", path.display()))
                        .with_follow_up(FollowUp::StartNewWorkflow)
                }
                Err(e) => {
                    session.phase = DownloadPhase::Error;
                    session.last_error = Some(e.to_string());
                    warn!("Download of '{}' failed: {}", session.artifact.filename, e);
                    Notification::error(format!("Download failed: {e}"))
                        .with_follow_up(FollowUp::Retry)
                }
            };
            (notification, result)
        };
        self.ctx.notifier.notify(&notification);

        match result {
            Ok(path) => DownloadOutcome::Saved(path),
            Err(e) => DownloadOutcome::Failed(e),
        }
    }

    /// Discard the session without side effects. Returns whether one was open.
    ///
    /// Closing mid-download abandons the in-flight fetch.
    pub fn close(&self) -> bool {
        let mut inner = self.lock();
        match inner.session.take() {
            Some(session) => {
                if session.phase == DownloadPhase::Downloading {
                    info!("Abandoning in-flight download of '{}'", session.artifact.filename);
                }
                inner.generation += 1;
                true
            }
            None => false,
        }
    }

    /// Discard a completed session and ask the navigator to go back to the
    /// upload stage. Only allowed from `Downloaded`.
    pub fn restart(&self) -> Result<(), WorkflowError> {
        {
            let mut inner = self.lock();
            match inner.session.as_ref().map(|s| s.phase) {
                Some(DownloadPhase::Downloaded) => {
                    inner.session = None;
                    inner.generation += 1;
                }
                Some(phase) => {
                    return Err(WorkflowError::InvalidTransition {
                        action: "start a new workflow",
                        state: phase.describe().into(),
                    })
                }
                None => {
                    return Err(WorkflowError::InvalidTransition {
                        action: "start a new workflow",
                        state: "no download session is open".into(),
                    })
                }
            }
        }
        self.ctx.navigator.reset_workflow();
        Ok(())
    }
}
