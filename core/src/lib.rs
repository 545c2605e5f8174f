//! Core of the field-inspection reporting pipeline: durable report
//! drafts, geofenced submission, a face-verification gate with its
//! one-time enrollment flow, and the orchestration that uploads a
//! report only after both checks pass.
//!
//! Device and network capabilities (position, camera, face detection
//! and matching, report upload, durable storage) are injected through
//! traits so the whole pipeline runs against fakes in tests.

pub mod attachments;
pub mod draft_store;
pub mod enroll;
pub mod face;
pub mod geo;
pub mod location;
pub mod report;
pub mod submit;

pub use attachments::{AttachmentError, AttachmentManager, NewAttachment, PreviewHandle};
pub use draft_store::{DRAFT_KEY, DraftStorage, DraftStore, JsonFileStorage, StorageError};
pub use enroll::{
    EnrollState, FaceDetectError, FaceDetector, FaceEnrollError, FaceEnroller, FaceEnrollment,
};
pub use face::{
    CameraError, CameraProvider, CameraStream, EnrollmentStatus, FaceGateError, FaceServiceError,
    FaceVerificationGate, FaceVerifier, GateState, VerifyResult,
};
pub use geo::{AuthorizedZone, EARTH_RADIUS_M, LocationFix, ZoneCheck, classify, haversine_m};
pub use location::{LocationError, LocationGate, LocationStatus, PositionProvider};
pub use report::{
    AttachmentRef, DraftValidationError, MAX_ATTACHMENTS, REGISTRATION_ID_LEN, ReportDraft,
    registration_id_is_valid,
};
pub use submit::{
    PendingSubmission, ReportPayload, ReportReceipt, ReportSubmitter, SubmissionCoordinator,
    SubmissionOutcome, SubmitError, UploadError,
};
