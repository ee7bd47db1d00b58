//! # suprimento-client
//!
//! Client-side workflow for generating court sentences from case-file PDFs.
//!
//! A user uploads a PDF, the document service extracts the case fields, the
//! user reviews and corrects them, the service generates an ODT document from
//! the reviewed data, and the user downloads it. This crate is the workflow
//! core: the stage sequencing, the data passed between stages, the validation
//! rules applied before submission and the download state machine with its
//! retry and cancel rules. Rendering is left to the caller.
//!
//! ## Workflow Overview
//!
//! ```text
//! PDF
//!  │
//!  ├─ 1. Upload    media-type gate, POST /upload → ProcessedFields
//!  ├─ 2. Review    ReviewForm: date mask, certidões preview, 9 field rules
//!  ├─ 3. Submit    POST /review → server-assigned filename
//!  └─ 4. Download  GET /download/{filename} → saved .odt (retry / restart)
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use suprimento_client::{ClientConfig, RawUploadFile, Workflow, WorkflowContext};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ClientConfig::builder()
//!         .base_url("http://localhost:8000")
//!         .download_dir("sentencas")
//!         .build()?;
//!     let mut workflow = Workflow::new(WorkflowContext::from_config(&config)?);
//!
//!     workflow.select_file(RawUploadFile::from_path("processo.pdf").await?)?;
//!     let form = workflow.upload().await?;
//!     form.input_date("12032024");
//!
//!     let artifact = workflow.submit().await?;
//!     println!("generated {}", artifact.filename);
//!     let outcome = workflow.start_download().await;
//!     println!("{outcome:?}");
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `suprimento` binary (clap + anyhow + tracing-subscriber + indicatif) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod model;
pub mod notify;
pub mod review;
pub mod service;
pub mod store;
pub mod workflow;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ClientConfig, ClientConfigBuilder};
pub use error::{Operation, TransportError, WorkflowError};
pub use model::{
    CertidoesValue, GeneratedArtifactRef, ProcessedFields, RawUploadFile, ValidatedReviewPayload,
};
pub use notify::{
    FollowUp, Navigator, NoopNavigator, NoopNotifier, Notification, NotificationLevel,
    NotificationSink, TracingNotifier,
};
pub use review::{FieldErrors, ReviewField, ReviewForm};
pub use service::{DocumentService, HttpDocumentService};
pub use store::{ArtifactStore, FsArtifactStore, StagedArtifact};
pub use workflow::{
    DownloadCoordinator, DownloadOutcome, DownloadPhase, DownloadSession, Stage,
    SubmissionCoordinator, UploadCoordinator, UploadState, Workflow, WorkflowContext,
};
