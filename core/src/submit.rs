//! Submission orchestration: sequence the location and face gates, then
//! perform the single atomic upload.
//!
//! Ordering guarantees: the face gate is never opened without an
//! `Inside` classification of the current session's fix, and the upload
//! is never issued before the gate reaches `Success`. Only a confirmed
//! server acknowledgment discards the draft.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::attachments::AttachmentManager;
use crate::draft_store::{DraftStore, StorageError};
use crate::face::{
    CameraProvider, EnrollmentStatus, FaceGateError, FaceVerificationGate, FaceVerifier, GateState,
};
use crate::geo::{AuthorizedZone, LocationFix, ZoneCheck, classify};
use crate::location::{LocationError, LocationGate, LocationStatus, PositionProvider};
use crate::report::{AttachmentRef, DraftValidationError, ReportDraft};

/// Everything sent to the review backend for one report.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportPayload {
    pub merchant_name: String,
    pub address: String,
    pub registration_id: String,
    pub findings: String,
    pub attachments: Vec<AttachmentRef>,
    pub latitude: f64,
    pub longitude: f64,
}

impl ReportPayload {
    fn new(draft: &ReportDraft, fix: &LocationFix) -> Self {
        Self {
            merchant_name: draft.merchant_name.clone(),
            address: draft.address.clone(),
            registration_id: draft.registration_id.clone(),
            findings: draft.findings.clone(),
            attachments: draft.attachments.clone(),
            latitude: fix.latitude,
            longitude: fix.longitude,
        }
    }
}

/// Server acknowledgment of an accepted report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportReceipt {
    pub id: String,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum UploadError {
    #[error("network error: {0}")]
    Network(String),

    /// Structured rejection carrying the server's human-readable
    /// reason.
    #[error("server rejected report: {0}")]
    Server(String),
}

/// One-shot report upload. No retries happen here; the user re-invokes
/// the submission flow.
#[async_trait]
pub trait ReportSubmitter: Send + Sync {
    async fn submit_report(&self, payload: &ReportPayload) -> Result<ReportReceipt, UploadError>;
}

/// Result of one upload attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmissionOutcome {
    Success { report_id: String },
    Failed { reason: String },
}

#[derive(Debug, Error)]
pub enum SubmitError {
    #[error(transparent)]
    IncompleteDraft(#[from] DraftValidationError),

    /// No location fix has been acquired this session.
    #[error("no location fix acquired")]
    NoLocation,

    /// Submission is refused, not merely warned, outside the zone.
    #[error("position is {distance_m:.0} m from the zone center, outside the authorized area")]
    OutOfZone { distance_m: f64 },

    #[error(transparent)]
    Gate(#[from] FaceGateError),

    /// Upload was requested before the gate reached `Success`.
    #[error("face verification has not succeeded in this attempt")]
    VerificationPending,
}

/// Owns the gates, the draft store, and the provider seams; drives one
/// report form session.
pub struct SubmissionCoordinator {
    location: LocationGate,
    camera: Arc<dyn CameraProvider>,
    verifier: Arc<dyn FaceVerifier>,
    submitter: Arc<dyn ReportSubmitter>,
    store: DraftStore,
    attachments: AttachmentManager,
}

impl SubmissionCoordinator {
    pub fn new(
        position: Arc<dyn PositionProvider>,
        camera: Arc<dyn CameraProvider>,
        verifier: Arc<dyn FaceVerifier>,
        submitter: Arc<dyn ReportSubmitter>,
        store: DraftStore,
        zone: AuthorizedZone,
    ) -> Self {
        Self {
            location: LocationGate::new(position, zone),
            camera,
            verifier,
            submitter,
            store,
            attachments: AttachmentManager::new(),
        }
    }

    /// Restore the prior draft (or the empty default) and rebuild
    /// attachment previews. Called on form entry.
    pub fn restore_draft(&mut self) -> ReportDraft {
        let mut draft = self.store.load();
        self.attachments.restore_previews(&mut draft);
        draft
    }

    /// Persist the draft; called on every field mutation.
    pub fn save_draft(&self, draft: &ReportDraft) -> Result<(), StorageError> {
        self.store.save(draft)
    }

    pub fn draft_store(&self) -> &DraftStore {
        &self.store
    }

    /// The attachment manager for this form session.
    pub fn attachments_mut(&mut self) -> &mut AttachmentManager {
        &mut self.attachments
    }

    /// Resolve the device position for this session and report where it
    /// landed relative to the zone.
    pub async fn acquire_location(&mut self) -> Result<LocationStatus, LocationError> {
        self.location.acquire().await?;
        Ok(self.location.status())
    }

    pub fn location_status(&self) -> LocationStatus {
        self.location.status()
    }

    /// Fail-fast checks, then open the face gate.
    ///
    /// Errors: `IncompleteDraft` on missing fields or a malformed
    /// registration id, `NoLocation` without a fix, `OutOfZone` when
    /// the current fix falls outside the zone (the camera is never
    /// opened in any of these cases).
    pub async fn begin(&mut self, draft: &ReportDraft) -> Result<PendingSubmission<'_>, SubmitError> {
        draft.validate_for_submission()?;
        let fix = *self.location.fix().ok_or(SubmitError::NoLocation)?;
        match classify(&fix, self.location.zone()) {
            ZoneCheck::Inside => {}
            ZoneCheck::Outside { distance_m } => {
                tracing::warn!(distance_m, "submission refused outside the authorized zone");
                return Err(SubmitError::OutOfZone { distance_m });
            }
        }

        let mut gate =
            FaceVerificationGate::new(Arc::clone(&self.camera), Arc::clone(&self.verifier));
        gate.open().await?;
        Ok(PendingSubmission {
            coordinator: self,
            draft: draft.clone(),
            fix,
            gate,
        })
    }
}

/// An in-flight submission attempt: the face gate is open and the
/// caller drives it to `Success` before the single upload.
///
/// Dropping this value closes the gate (releasing the camera) and
/// leaves the draft untouched — the owner-unmount path.
pub struct PendingSubmission<'a> {
    coordinator: &'a mut SubmissionCoordinator,
    draft: ReportDraft,
    fix: LocationFix,
    gate: FaceVerificationGate,
}

impl std::fmt::Debug for PendingSubmission<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingSubmission")
            .field("gate_state", &self.gate.state())
            .field("fix", &self.fix)
            .finish_non_exhaustive()
    }
}

impl PendingSubmission<'_> {
    pub fn gate_state(&self) -> GateState {
        self.gate.state()
    }

    pub fn enrollment(&self) -> EnrollmentStatus {
        self.gate.enrollment()
    }

    pub fn capture_enabled(&self) -> bool {
        self.gate.capture_enabled()
    }

    /// Handle for aborting the in-flight attempt from elsewhere.
    pub fn cancel_token(&self) -> CancellationToken {
        self.gate.cancel_token()
    }

    /// One verification attempt; retryable until the caller gives up.
    pub async fn capture_and_verify(&mut self) -> Result<(), FaceGateError> {
        self.gate.capture_and_verify().await
    }

    /// Abort the attempt. The camera is released and the draft is left
    /// untouched.
    pub fn cancel(mut self) {
        self.gate.cancel();
    }

    /// The single upload attempt.
    ///
    /// Refused with `VerificationPending` unless the gate reached
    /// `Success` in this attempt. On acknowledgment the draft store is
    /// cleared and previews are released; on failure the draft is
    /// preserved unchanged and the failure reason is surfaced.
    pub async fn upload(mut self) -> Result<SubmissionOutcome, SubmitError> {
        if self.gate.state() != GateState::Success {
            return Err(SubmitError::VerificationPending);
        }

        let payload = ReportPayload::new(&self.draft, &self.fix);
        tracing::info!(attachments = payload.attachments.len(), "uploading report");
        match self.coordinator.submitter.submit_report(&payload).await {
            Ok(receipt) => {
                self.coordinator.attachments.release_all(&mut self.draft);
                if let Err(err) = self.coordinator.store.clear() {
                    tracing::warn!("failed to clear draft after acceptance: {err}");
                }
                tracing::info!(report_id = %receipt.id, "report accepted");
                Ok(SubmissionOutcome::Success { report_id: receipt.id })
            }
            Err(err) => {
                self.gate.close();
                let reason = match err {
                    UploadError::Server(reason) => reason,
                    UploadError::Network(detail) => format!("network failure: {detail}"),
                };
                tracing::warn!("upload failed, draft preserved: {reason}");
                Ok(SubmissionOutcome::Failed { reason })
            }
        }
    }
}
