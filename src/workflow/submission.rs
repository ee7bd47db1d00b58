//! Submission stage: turn a validated payload into a generated document.

use super::download::DownloadCoordinator;
use super::WorkflowContext;
use crate::error::WorkflowError;
use crate::model::{GeneratedArtifactRef, ValidatedReviewPayload};
use crate::notify::{FollowUp, Notification};
use tracing::{info, warn};

pub struct SubmissionCoordinator {
    ctx: WorkflowContext,
}

impl SubmissionCoordinator {
    pub fn new(ctx: WorkflowContext) -> Self {
        Self { ctx }
    }

    /// Call the generation service and open a download session for the result.
    ///
    /// The payload is only borrowed: on failure the caller still holds
    /// everything the user entered and can submit again unchanged.
    pub async fn submit(
        &self,
        payload: &ValidatedReviewPayload,
        download: &DownloadCoordinator,
    ) -> Result<GeneratedArtifactRef, WorkflowError> {
        match self.ctx.service.submit(payload).await {
            Ok(artifact) => {
                info!(
                    "Generated '{}' for case {}",
                    artifact.filename,
                    payload.numero_processo()
                );
                download.open(artifact.clone());
                self.ctx.notifier.notify(&Notification::success(format!(
                    "Document '{}' generated and ready to download",
                    artifact.filename
                )));
                Ok(artifact)
            }
            Err(e) => {
                warn!("Generation failed for case {}: {}", payload.numero_processo(), e);
                self.ctx
                    .notifier
                    .notify(&Notification::error(e.to_string()).with_follow_up(FollowUp::Retry));
                Err(e.into())
            }
        }
    }
}
