//! Workflow integration tests.
//!
//! Every collaborator is an in-memory fake, so these run offline and
//! deterministically. Interleavings that matter for the download guard are
//! driven with `futures::join!`, which polls its futures in order on a
//! single task, the same cooperative model the workflow is designed for.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use suprimento_client::{
    ArtifactStore, CertidoesValue, DocumentService, DownloadOutcome, DownloadPhase, FollowUp,
    GeneratedArtifactRef, Navigator, Notification, NotificationSink, Operation, ProcessedFields,
    RawUploadFile, ReviewField, Stage, StagedArtifact, TransportError, UploadState,
    ValidatedReviewPayload, Workflow, WorkflowContext, WorkflowError,
};
use tokio::sync::Notify;
use tokio_test::{assert_err, assert_ok};
use tracing_subscriber::EnvFilter;

// ── Test helpers ─────────────────────────────────────────────────────────────

fn processed_fields() -> ProcessedFields {
    ProcessedFields {
        numero_processo: "0801234-56.2024.8.20.5001".into(),
        requerente: "Maria da Silva".into(),
        parentesco: "filha".into(),
        nome_falecido: "João da Silva".into(),
        local_obito: "Hospital Walfredo Gurgel, Natal/RN".into(),
        data: "12/03/2024".into(),
        id_parecer: "98765432".into(),
        id_declaracao: "12345678".into(),
        id_certidoes: CertidoesValue::List(vec![
            "Num. 72323682 - Pág. 3".into(),
            "Num. 7232554 - Pág. 2".into(),
        ]),
    }
}

fn pdf_file() -> RawUploadFile {
    RawUploadFile::new("processo.pdf", "application/pdf", b"%PDF-1.7\n%test".to_vec())
}

fn network_error(operation: Operation) -> TransportError {
    TransportError::Network {
        operation,
        reason: "connection refused".into(),
    }
}

#[derive(Default)]
struct FakeService {
    uploads: AtomicUsize,
    submits: AtomicUsize,
    fetches: AtomicUsize,
    fail_upload: AtomicBool,
    fail_submit: AtomicBool,
    /// Number of upcoming fetches that should fail.
    failing_fetches: AtomicUsize,
    /// When set, every fetch waits for a permit before answering.
    gate: Option<Arc<Notify>>,
    last_payload: Mutex<Option<ValidatedReviewPayload>>,
}

impl FakeService {
    fn gated(gate: Arc<Notify>) -> Self {
        Self {
            gate: Some(gate),
            ..Self::default()
        }
    }
}

#[async_trait]
impl DocumentService for FakeService {
    async fn upload(&self, _file: &RawUploadFile) -> Result<ProcessedFields, TransportError> {
        self.uploads.fetch_add(1, Ordering::SeqCst);
        if self.fail_upload.load(Ordering::SeqCst) {
            return Err(network_error(Operation::Upload));
        }
        Ok(processed_fields())
    }

    async fn submit(
        &self,
        payload: &ValidatedReviewPayload,
    ) -> Result<GeneratedArtifactRef, TransportError> {
        self.submits.fetch_add(1, Ordering::SeqCst);
        *self.last_payload.lock().unwrap() = Some(payload.clone());
        if self.fail_submit.load(Ordering::SeqCst) {
            return Err(TransportError::Status {
                operation: Operation::Submit,
                status: 500,
                body: "template missing".into(),
            });
        }
        Ok(GeneratedArtifactRef::new(format!(
            "sentenca_{}.odt",
            payload.numero_processo()
        )))
    }

    async fn fetch(&self, filename: &str) -> Result<Vec<u8>, TransportError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        let failing = self.failing_fetches.load(Ordering::SeqCst);
        if failing > 0 {
            self.failing_fetches.store(failing - 1, Ordering::SeqCst);
            return Err(network_error(Operation::Fetch));
        }
        Ok(format!("odt:{filename}").into_bytes())
    }

    async fn latest_review(&self) -> Result<ProcessedFields, TransportError> {
        Ok(processed_fields())
    }
}

#[derive(Default)]
struct MemoryStore {
    saved: Mutex<Vec<(String, Vec<u8>)>>,
    staged: Mutex<HashMap<PathBuf, (String, Vec<u8>)>>,
    discarded: AtomicUsize,
    failing_saves: AtomicUsize,
    /// When set, every stage call waits for a permit before writing.
    gate: Option<Arc<Notify>>,
}

impl MemoryStore {
    fn gated(gate: Arc<Notify>) -> Self {
        Self {
            gate: Some(gate),
            ..Self::default()
        }
    }
}

#[async_trait]
impl ArtifactStore for MemoryStore {
    async fn stage(&self, filename: &str, bytes: &[u8]) -> Result<StagedArtifact, WorkflowError> {
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        let target = PathBuf::from("/downloads").join(filename);
        let failing = self.failing_saves.load(Ordering::SeqCst);
        if failing > 0 {
            self.failing_saves.store(failing - 1, Ordering::SeqCst);
            return Err(WorkflowError::SaveFailed {
                path: target,
                source: std::io::Error::new(std::io::ErrorKind::Other, "disk full"),
            });
        }
        let staging_path = PathBuf::from("/downloads/.staging").join(filename);
        self.staged
            .lock()
            .unwrap()
            .insert(staging_path.clone(), (filename.to_string(), bytes.to_vec()));
        Ok(StagedArtifact {
            staging_path,
            target,
        })
    }

    fn commit(&self, staged: &StagedArtifact) -> Result<PathBuf, WorkflowError> {
        let entry = self.staged.lock().unwrap().remove(&staged.staging_path);
        match entry {
            Some(entry) => {
                self.saved.lock().unwrap().push(entry);
                Ok(staged.target.clone())
            }
            None => Err(WorkflowError::SaveFailed {
                path: staged.target.clone(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "nothing staged"),
            }),
        }
    }

    fn discard(&self, staged: &StagedArtifact) {
        self.staged.lock().unwrap().remove(&staged.staging_path);
        self.discarded.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Default)]
struct Recorder {
    seen: Mutex<Vec<Notification>>,
}

impl Recorder {
    fn all(&self) -> Vec<Notification> {
        self.seen.lock().unwrap().clone()
    }

    fn last(&self) -> Option<Notification> {
        self.seen.lock().unwrap().last().cloned()
    }
}

impl NotificationSink for Recorder {
    fn notify(&self, notification: &Notification) {
        self.seen.lock().unwrap().push(notification.clone());
    }
}

#[derive(Default)]
struct CountingNavigator {
    resets: AtomicUsize,
}

impl Navigator for CountingNavigator {
    fn reset_workflow(&self) {
        self.resets.fetch_add(1, Ordering::SeqCst);
    }
}

struct Harness {
    service: Arc<FakeService>,
    store: Arc<MemoryStore>,
    notes: Arc<Recorder>,
    nav: Arc<CountingNavigator>,
    workflow: Workflow,
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn harness_with(service: FakeService) -> Harness {
    harness_with_store(service, MemoryStore::default())
}

fn harness_with_store(service: FakeService, store: MemoryStore) -> Harness {
    init_tracing();
    let service = Arc::new(service);
    let store = Arc::new(store);
    let notes = Arc::new(Recorder::default());
    let nav = Arc::new(CountingNavigator::default());
    let ctx = WorkflowContext::new(service.clone(), store.clone())
        .with_notifier(notes.clone())
        .with_navigator(nav.clone());
    Harness {
        service,
        store,
        notes,
        nav,
        workflow: Workflow::new(ctx),
    }
}

fn harness() -> Harness {
    harness_with(FakeService::default())
}

/// Drive a workflow to the download stage.
async fn at_download_stage(h: &mut Harness) {
    h.workflow.select_file(pdf_file()).unwrap();
    h.workflow.upload().await.unwrap();
    h.workflow.submit().await.unwrap();
    assert_eq!(h.workflow.stage(), Stage::Download);
}

// ── Upload stage ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn non_pdf_is_rejected_without_network_call() {
    let mut h = harness();
    let txt = RawUploadFile::new("notas.txt", "text/plain", b"hello".to_vec());

    let err = h.workflow.select_file(txt).unwrap_err();
    assert!(matches!(err, WorkflowError::UnsupportedFileType { .. }), "got: {err:?}");
    assert_eq!(h.workflow.upload_state(), &UploadState::Idle);
    assert_eq!(h.workflow.stage(), Stage::Upload);

    let note = h.notes.last().expect("a notification");
    assert!(note.is_error());
    assert!(note.message.contains("text/plain"), "got: {}", note.message);

    // Nothing was selected, so uploading is refused locally too.
    let err = assert_err!(h.workflow.upload().await);
    assert!(matches!(err, WorkflowError::NoFileSelected));
    assert_eq!(h.service.uploads.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn successful_upload_enters_review_with_seeded_form() {
    let mut h = harness();
    h.workflow.select_file(pdf_file()).unwrap();

    let form = assert_ok!(h.workflow.upload().await);
    assert_eq!(form.requerente, "Maria da Silva");
    assert_eq!(form.id_certidoes, "Num. 72323682 - Pág. 3, Num. 7232554 - Pág. 2");

    assert_eq!(h.workflow.stage(), Stage::Review);
    assert_eq!(h.workflow.upload_state(), &UploadState::Idle);
    assert_eq!(h.service.uploads.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn failed_upload_clears_selection_and_stays_on_upload() {
    let mut h = harness();
    h.service.fail_upload.store(true, Ordering::SeqCst);
    h.workflow.select_file(pdf_file()).unwrap();

    let err = h.workflow.upload().await.unwrap_err();
    assert!(err.is_retryable());
    assert!(matches!(h.workflow.upload_state(), UploadState::Failed(_)));
    assert_eq!(h.workflow.stage(), Stage::Upload);
    assert!(h.workflow.review().is_none());
    let note = h.notes.last().unwrap();
    assert!(note.is_error());
    assert_eq!(note.follow_up, Some(FollowUp::Retry));

    // The user must re-select the file before retrying.
    assert!(matches!(
        h.workflow.upload().await.unwrap_err(),
        WorkflowError::NoFileSelected
    ));

    h.service.fail_upload.store(false, Ordering::SeqCst);
    h.workflow.select_file(pdf_file()).unwrap();
    assert_eq!(h.workflow.upload_state(), &UploadState::Idle);
    assert_ok!(h.workflow.upload().await);
    assert_eq!(h.workflow.stage(), Stage::Review);
}

#[tokio::test]
async fn resume_latest_review_enters_review() {
    let mut h = harness();
    let form = h.workflow.resume_latest_review().await.unwrap();
    assert_eq!(form.numero_processo, "0801234-56.2024.8.20.5001");
    assert_eq!(h.workflow.stage(), Stage::Review);
    assert_eq!(h.service.uploads.load(Ordering::SeqCst), 0);
}

// ── Review and submission ────────────────────────────────────────────────────

#[tokio::test]
async fn invalid_form_is_not_sent() {
    let mut h = harness();
    h.workflow.select_file(pdf_file()).unwrap();
    h.workflow.upload().await.unwrap().numero_processo = "1234".into();

    let err = h.workflow.submit().await.unwrap_err();
    let WorkflowError::Validation(errors) = err else {
        panic!("expected validation error, got {err:?}");
    };
    assert_eq!(errors.len(), 1);
    assert!(errors.contains(ReviewField::NumeroProcesso));
    assert_eq!(h.service.submits.load(Ordering::SeqCst), 0);
    assert_eq!(h.workflow.stage(), Stage::Review);
}

#[tokio::test]
async fn submitted_payload_is_normalised() {
    let mut h = harness();
    h.workflow.select_file(pdf_file()).unwrap();
    let form = h.workflow.upload().await.unwrap();
    form.set(ReviewField::IdCertidoes, "ab; cd, ab ;; ef");
    form.set(ReviewField::Requerente, "  Maria  ");
    form.input_date("01/01/2023");

    let artifact = h.workflow.submit().await.unwrap();
    assert_eq!(artifact.filename, "sentenca_0801234-56.2024.8.20.5001.odt");

    let payload = h.service.last_payload.lock().unwrap().clone().unwrap();
    assert_eq!(payload.id_certidoes(), ["ab", "cd", "ef"]);
    assert_eq!(payload.requerente(), "Maria");
    assert_eq!(payload.data(), "01/01/2023");
}

#[tokio::test]
async fn failed_submission_keeps_entered_data() {
    let mut h = harness();
    h.service.fail_submit.store(true, Ordering::SeqCst);
    h.workflow.select_file(pdf_file()).unwrap();
    let form = h.workflow.upload().await.unwrap();
    form.set(ReviewField::LocalObito, "Mossoró/RN");
    let before = form.clone();

    let err = h.workflow.submit().await.unwrap_err();
    assert!(matches!(err, WorkflowError::Transport(TransportError::Status { status: 500, .. })));
    assert_eq!(h.workflow.stage(), Stage::Review);
    assert_eq!(h.workflow.review(), Some(&before));
    assert!(h.workflow.download().session().is_none());

    // Still editable, and a retry needs no re-entry.
    h.workflow.review_mut().unwrap().set(ReviewField::Parentesco, "neta");
    h.service.fail_submit.store(false, Ordering::SeqCst);
    assert_ok!(h.workflow.submit().await);
    let payload = h.service.last_payload.lock().unwrap().clone().unwrap();
    assert_eq!(payload.local_obito(), "Mossoró/RN");
    assert_eq!(payload.parentesco(), "neta");
}

#[tokio::test]
async fn stages_cannot_be_skipped() {
    let mut h = harness();
    assert!(matches!(
        h.workflow.submit().await.unwrap_err(),
        WorkflowError::InvalidTransition { .. }
    ));
    assert!(matches!(
        h.workflow.start_download().await,
        DownloadOutcome::NoSession
    ));
    assert!(h.workflow.restart().is_err());

    h.workflow.select_file(pdf_file()).unwrap();
    h.workflow.upload().await.unwrap();
    assert!(h.workflow.select_file(pdf_file()).is_err());
    assert!(matches!(
        h.workflow.start_download().await,
        DownloadOutcome::NoSession
    ));
    assert_eq!(h.service.fetches.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn discard_review_returns_to_upload() {
    let mut h = harness();
    h.workflow.select_file(pdf_file()).unwrap();
    h.workflow.upload().await.unwrap();
    h.workflow.discard_review().unwrap();
    assert_eq!(h.workflow.stage(), Stage::Upload);
    assert!(h.workflow.review().is_none());
}

// ── Download stage ───────────────────────────────────────────────────────────

#[tokio::test]
async fn download_saves_and_offers_new_workflow() {
    let mut h = harness();
    at_download_stage(&mut h).await;
    assert_eq!(h.workflow.download().phase(), Some(DownloadPhase::Idle));

    let outcome = h.workflow.start_download().await;
    assert!(outcome.is_saved(), "got: {outcome:?}");
    assert_eq!(h.workflow.download().phase(), Some(DownloadPhase::Downloaded));

    let saved = h.store.saved.lock().unwrap().clone();
    assert_eq!(saved.len(), 1);
    assert_eq!(saved[0].0, "sentenca_0801234-56.2024.8.20.5001.odt");

    let note = h.notes.last().unwrap();
    assert!(!note.is_error());
    assert_eq!(note.follow_up, Some(FollowUp::StartNewWorkflow));

    // Downloaded is terminal for start_download.
    assert!(matches!(
        h.workflow.start_download().await,
        DownloadOutcome::Ignored(DownloadPhase::Downloaded)
    ));
    assert_eq!(h.service.fetches.load(Ordering::SeqCst), 1);

    h.workflow.restart().unwrap();
    assert_eq!(h.nav.resets.load(Ordering::SeqCst), 1);
    assert_eq!(h.workflow.stage(), Stage::Upload);
    assert!(h.workflow.review().is_none());
    assert!(h.workflow.download().session().is_none());
}

#[tokio::test]
async fn rapid_repeated_start_triggers_one_fetch() {
    let gate = Arc::new(Notify::new());
    let mut h = harness_with(FakeService::gated(gate.clone()));
    at_download_stage(&mut h).await;
    let download = h.workflow.download().clone();

    let (first, second, ()) = futures::join!(
        download.start_download(),
        async {
            assert_eq!(download.phase(), Some(DownloadPhase::Downloading));
            download.start_download().await
        },
        async { gate.notify_one() },
    );

    assert!(first.is_saved(), "got: {first:?}");
    assert!(matches!(second, DownloadOutcome::Ignored(DownloadPhase::Downloading)));
    assert_eq!(h.service.fetches.load(Ordering::SeqCst), 1);
    assert_eq!(h.store.saved.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn failed_fetch_is_retryable() {
    let mut h = harness();
    h.service.failing_fetches.store(1, Ordering::SeqCst);
    at_download_stage(&mut h).await;

    let outcome = h.workflow.start_download().await;
    let DownloadOutcome::Failed(err) = outcome else {
        panic!("expected failure, got {outcome:?}");
    };
    assert!(err.is_retryable());
    let session = h.workflow.download().session().unwrap();
    assert_eq!(session.phase, DownloadPhase::Error);
    assert!(session.last_error.is_some());
    assert_eq!(h.notes.last().unwrap().follow_up, Some(FollowUp::Retry));

    // Restart is only offered after a successful download.
    assert!(h.workflow.restart().is_err());
    assert_eq!(h.nav.resets.load(Ordering::SeqCst), 0);

    assert!(h.workflow.start_download().await.is_saved());
    assert_eq!(h.service.fetches.load(Ordering::SeqCst), 2);
    let session = h.workflow.download().session().unwrap();
    assert_eq!(session.phase, DownloadPhase::Downloaded);
    assert!(session.last_error.is_none());
}

#[tokio::test]
async fn failed_save_lands_in_error() {
    let mut h = harness();
    h.store.failing_saves.store(1, Ordering::SeqCst);
    at_download_stage(&mut h).await;

    let outcome = h.workflow.start_download().await;
    assert!(matches!(
        outcome,
        DownloadOutcome::Failed(WorkflowError::SaveFailed { .. })
    ));
    assert_eq!(h.workflow.download().phase(), Some(DownloadPhase::Error));
    assert!(h.notes.last().unwrap().message.contains("disk full"));

    assert!(h.workflow.start_download().await.is_saved());
}

#[tokio::test]
async fn closing_mid_download_ignores_late_response() {
    let gate = Arc::new(Notify::new());
    let mut h = harness_with(FakeService::gated(gate.clone()));
    at_download_stage(&mut h).await;
    let download = h.workflow.download().clone();
    let notes_before = h.notes.all().len();

    let (outcome, closed) = futures::join!(download.start_download(), async {
        let closed = download.close();
        gate.notify_one();
        closed
    });

    assert!(closed);
    assert!(matches!(outcome, DownloadOutcome::Abandoned), "got: {outcome:?}");
    assert!(download.session().is_none());
    assert!(h.store.saved.lock().unwrap().is_empty());
    assert_eq!(h.notes.all().len(), notes_before);
}

#[tokio::test]
async fn closing_during_save_leaves_no_file() {
    let gate = Arc::new(Notify::new());
    let mut h = harness_with_store(FakeService::default(), MemoryStore::gated(gate.clone()));
    at_download_stage(&mut h).await;
    let download = h.workflow.download().clone();
    let notes_before = h.notes.all().len();

    let (outcome, closed) = futures::join!(download.start_download(), async {
        let closed = download.close();
        gate.notify_one();
        closed
    });

    assert!(closed);
    assert!(matches!(outcome, DownloadOutcome::Abandoned), "got: {outcome:?}");
    assert_eq!(h.service.fetches.load(Ordering::SeqCst), 1);
    assert!(h.store.saved.lock().unwrap().is_empty());
    assert!(h.store.staged.lock().unwrap().is_empty());
    assert_eq!(h.store.discarded.load(Ordering::SeqCst), 1);
    assert_eq!(h.notes.all().len(), notes_before);
}

#[tokio::test]
async fn close_download_discards_session_quietly() {
    let mut h = harness();
    at_download_stage(&mut h).await;
    let notes_before = h.notes.all().len();

    h.workflow.close_download().unwrap();
    assert_eq!(h.workflow.stage(), Stage::Upload);
    assert!(h.workflow.download().session().is_none());
    assert_eq!(h.nav.resets.load(Ordering::SeqCst), 0);
    assert_eq!(h.notes.all().len(), notes_before);
    assert_eq!(h.service.fetches.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn new_session_replaces_stale_one() {
    let gate = Arc::new(Notify::new());
    let mut h = harness_with(FakeService::gated(gate.clone()));
    at_download_stage(&mut h).await;
    let download = h.workflow.download().clone();

    let (outcome, ()) = futures::join!(download.start_download(), async {
        download.open(GeneratedArtifactRef::new("outra.odt"));
        gate.notify_one();
    });

    assert!(matches!(outcome, DownloadOutcome::Abandoned));
    let session = download.session().unwrap();
    assert_eq!(session.artifact.filename, "outra.odt");
    assert_eq!(session.phase, DownloadPhase::Idle);
}
