//! Upload stage: file-type gate and the upload call.

use super::WorkflowContext;
use crate::error::{TransportError, WorkflowError};
use crate::model::{ProcessedFields, RawUploadFile, PDF_MEDIA_TYPE};
use crate::notify::{FollowUp, Notification};
use tracing::{info, warn};

/// `Idle → Uploading → (Success | Failed)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadState {
    Idle,
    Uploading,
    /// Processed fields waiting to be handed to the review stage.
    Success(ProcessedFields),
    /// The last upload failed; the file selection was cleared.
    Failed(TransportError),
}

/// Owns the selected file and the upload call.
pub struct UploadCoordinator {
    ctx: WorkflowContext,
    state: UploadState,
    selected: Option<RawUploadFile>,
}

impl UploadCoordinator {
    pub fn new(ctx: WorkflowContext) -> Self {
        Self {
            ctx,
            state: UploadState::Idle,
            selected: None,
        }
    }

    pub fn state(&self) -> &UploadState {
        &self.state
    }

    pub fn selected_file(&self) -> Option<&RawUploadFile> {
        self.selected.as_ref()
    }

    /// Select a file for upload. Anything not declared as `application/pdf`
    /// is rejected locally and nothing is sent. Refused while processed
    /// fields are waiting for [`hand_off`](Self::hand_off).
    pub fn select_file(&mut self, file: RawUploadFile) -> Result<(), WorkflowError> {
        if let UploadState::Success(_) = self.state {
            return Err(WorkflowError::InvalidTransition {
                action: "select a file",
                state: "processed fields are waiting for review".into(),
            });
        }
        if file.media_type != PDF_MEDIA_TYPE {
            warn!("Rejected '{}': media type {}", file.name, file.media_type);
            let err = WorkflowError::UnsupportedFileType {
                name: file.name,
                media_type: file.media_type,
            };
            self.ctx.notifier.notify(&Notification::error(err.to_string()));
            return Err(err);
        }
        info!("Selected '{}' ({} bytes)", file.name, file.bytes.len());
        self.selected = Some(file);
        self.state = UploadState::Idle;
        Ok(())
    }

    /// Upload the selected file.
    ///
    /// On success the processed fields wait in [`UploadState::Success`] until
    /// [`hand_off`](Self::hand_off) collects them. Either way the file
    /// selection is cleared.
    pub async fn submit(&mut self) -> Result<(), WorkflowError> {
        if let UploadState::Success(_) = self.state {
            return Err(WorkflowError::InvalidTransition {
                action: "upload",
                state: "processed fields are waiting for review".into(),
            });
        }
        let Some(file) = self.selected.take() else {
            self.ctx
                .notifier
                .notify(&Notification::error(WorkflowError::NoFileSelected.to_string()));
            return Err(WorkflowError::NoFileSelected);
        };

        self.state = UploadState::Uploading;
        match self.ctx.service.upload(&file).await {
            Ok(fields) => {
                info!("Upload of '{}' processed", file.name);
                self.ctx
                    .notifier
                    .notify(&Notification::success(format!("'{}' processed", file.name)));
                self.state = UploadState::Success(fields);
                Ok(())
            }
            Err(e) => {
                warn!("Upload of '{}' failed: {}", file.name, e);
                self.ctx
                    .notifier
                    .notify(&Notification::error(e.to_string()).with_follow_up(FollowUp::Retry));
                self.state = UploadState::Failed(e.clone());
                Err(e.into())
            }
        }
    }

    /// Take the processed fields for the review stage and return to `Idle`.
    pub fn hand_off(&mut self) -> Option<ProcessedFields> {
        match std::mem::replace(&mut self.state, UploadState::Idle) {
            UploadState::Success(fields) => Some(fields),
            other => {
                self.state = other;
                None
            }
        }
    }
}
