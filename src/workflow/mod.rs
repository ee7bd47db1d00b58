//! The four-stage workflow and its coordinators.
//!
//! ```text
//! Upload ──ProcessedFields──▶ Review ──ValidatedReviewPayload──▶ Submission
//!   ▲                                                               │
//!   └────────────── restart ◀── Download ◀──GeneratedArtifactRef────┘
//! ```
//!
//! Each coordinator owns one stage. [`Workflow`] owns one instance of the
//! whole sequence and refuses out-of-order actions: review data exists only
//! after an upload succeeded, and a download session only after a
//! submission succeeded. Errors never move the workflow backwards; the user
//! stays on the stage where the failure happened with their data intact.

pub mod download;
pub mod submission;
pub mod upload;

pub use download::{DownloadCoordinator, DownloadOutcome, DownloadPhase, DownloadSession};
pub use submission::SubmissionCoordinator;
pub use upload::{UploadCoordinator, UploadState};

use crate::config::ClientConfig;
use crate::error::WorkflowError;
use crate::model::{GeneratedArtifactRef, ProcessedFields, RawUploadFile};
use crate::notify::{
    Navigator, NoopNavigator, NoopNotifier, Notification, NotificationSink, SharedNavigator,
    SharedNotifier,
};
use crate::review::ReviewForm;
use crate::service::{DocumentService, HttpDocumentService};
use crate::store::{ArtifactStore, FsArtifactStore};
use std::fmt;
use std::sync::Arc;
use tracing::info;

/// External collaborators shared by every coordinator of a workflow.
#[derive(Clone)]
pub struct WorkflowContext {
    pub service: Arc<dyn DocumentService>,
    pub store: Arc<dyn ArtifactStore>,
    pub notifier: SharedNotifier,
    pub navigator: SharedNavigator,
}

impl fmt::Debug for WorkflowContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkflowContext")
            .field("service", &"<dyn DocumentService>")
            .field("store", &"<dyn ArtifactStore>")
            .field("notifier", &"<dyn NotificationSink>")
            .field("navigator", &"<dyn Navigator>")
            .finish()
    }
}

impl WorkflowContext {
    /// Context with silent notifications and navigation.
    pub fn new(service: Arc<dyn DocumentService>, store: Arc<dyn ArtifactStore>) -> Self {
        Self {
            service,
            store,
            notifier: Arc::new(NoopNotifier),
            navigator: Arc::new(NoopNavigator),
        }
    }

    /// HTTP service and filesystem store built from `config`.
    pub fn from_config(config: &ClientConfig) -> Result<Self, WorkflowError> {
        let service = HttpDocumentService::new(config)?;
        let store = FsArtifactStore::new(config.download_dir.clone());
        Ok(Self::new(Arc::new(service), Arc::new(store)))
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn NotificationSink>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_navigator(mut self, navigator: Arc<dyn Navigator>) -> Self {
        self.navigator = navigator;
        self
    }
}

/// The stage a [`Workflow`] is currently in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Upload,
    Review,
    Download,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Upload => "upload",
            Stage::Review => "review",
            Stage::Download => "download",
        };
        f.write_str(s)
    }
}

/// One run of upload → review → submission → download.
pub struct Workflow {
    ctx: WorkflowContext,
    stage: Stage,
    upload: UploadCoordinator,
    review: Option<ReviewForm>,
    submission: SubmissionCoordinator,
    download: Arc<DownloadCoordinator>,
}

impl Workflow {
    pub fn new(ctx: WorkflowContext) -> Self {
        Self {
            upload: UploadCoordinator::new(ctx.clone()),
            submission: SubmissionCoordinator::new(ctx.clone()),
            download: Arc::new(DownloadCoordinator::new(ctx.clone())),
            review: None,
            stage: Stage::Upload,
            ctx,
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    fn require(&self, stage: Stage, action: &'static str) -> Result<(), WorkflowError> {
        if self.stage == stage {
            Ok(())
        } else {
            Err(WorkflowError::InvalidTransition {
                action,
                state: format!("in the {} stage", self.stage),
            })
        }
    }

    // ── Upload ───────────────────────────────────────────────────────────

    pub fn upload_state(&self) -> &UploadState {
        self.upload.state()
    }

    pub fn select_file(&mut self, file: RawUploadFile) -> Result<(), WorkflowError> {
        self.require(Stage::Upload, "select a file")?;
        self.upload.select_file(file)
    }

    /// Upload the selected file and enter the review stage with its fields.
    pub async fn upload(&mut self) -> Result<&mut ReviewForm, WorkflowError> {
        self.require(Stage::Upload, "upload")?;
        self.upload.submit().await?;
        let fields = self
            .upload
            .hand_off()
            .ok_or_else(|| WorkflowError::Internal("upload succeeded without fields".into()))?;
        Ok(self.enter_review(fields))
    }

    /// Enter the review stage with the server's most recently processed fields.
    pub async fn resume_latest_review(&mut self) -> Result<&mut ReviewForm, WorkflowError> {
        self.require(Stage::Upload, "resume a review")?;
        match self.ctx.service.latest_review().await {
            Ok(fields) => Ok(self.enter_review(fields)),
            Err(e) => {
                self.ctx.notifier.notify(&Notification::error(e.to_string()));
                Err(e.into())
            }
        }
    }

    fn enter_review(&mut self, fields: ProcessedFields) -> &mut ReviewForm {
        info!("Entering review for case '{}'", fields.numero_processo);
        self.stage = Stage::Review;
        self.review.insert(ReviewForm::from_processed(fields))
    }

    // ── Review ───────────────────────────────────────────────────────────

    pub fn review(&self) -> Option<&ReviewForm> {
        self.review.as_ref()
    }

    pub fn review_mut(&mut self) -> Option<&mut ReviewForm> {
        if self.stage == Stage::Review {
            self.review.as_mut()
        } else {
            None
        }
    }

    /// Leave the review stage without submitting.
    pub fn discard_review(&mut self) -> Result<(), WorkflowError> {
        self.require(Stage::Review, "go back to upload")?;
        self.review = None;
        self.stage = Stage::Upload;
        Ok(())
    }

    /// Validate the form and submit it.
    ///
    /// Validation failures return [`WorkflowError::Validation`] without any
    /// network call. On any failure the stage stays `Review` and the form is
    /// left exactly as the user typed it.
    pub async fn submit(&mut self) -> Result<GeneratedArtifactRef, WorkflowError> {
        self.require(Stage::Review, "submit")?;
        let form = self
            .review
            .as_ref()
            .ok_or_else(|| WorkflowError::Internal("review stage without a form".into()))?;
        let payload = form.validate().map_err(WorkflowError::Validation)?;

        let artifact = self.submission.submit(&payload, &self.download).await?;
        self.stage = Stage::Download;
        Ok(artifact)
    }

    // ── Download ─────────────────────────────────────────────────────────

    /// The download coordinator, shareable with other tasks.
    pub fn download(&self) -> &Arc<DownloadCoordinator> {
        &self.download
    }

    pub async fn start_download(&self) -> DownloadOutcome {
        if self.stage != Stage::Download {
            return DownloadOutcome::NoSession;
        }
        self.download.start_download().await
    }

    /// Dismiss the download step: the session is dropped and the workflow
    /// is back at upload, without notifications or navigation.
    pub fn close_download(&mut self) -> Result<(), WorkflowError> {
        self.require(Stage::Download, "close the download")?;
        self.download.close();
        self.reset();
        Ok(())
    }

    /// Start a new workflow after a completed download.
    pub fn restart(&mut self) -> Result<(), WorkflowError> {
        self.require(Stage::Download, "start a new workflow")?;
        self.download.restart()?;
        self.reset();
        Ok(())
    }

    fn reset(&mut self) {
        self.review = None;
        self.upload = UploadCoordinator::new(self.ctx.clone());
        self.stage = Stage::Upload;
    }
}
