//! One-time face enrollment: capture a reference face and register it
//! with the face-capability service.
//!
//! The verification gate only compares a live capture against an
//! already-enrolled face; this flow is how that reference gets
//! captured. The service accepts a replacement reference at any time,
//! so the same flow also updates an existing enrollment.
//!
//! Unlike verification, enrollment screens the captured frame with an
//! on-device face detector first: exactly one face must be visible, or
//! the reference would be useless for later matching.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::face::{
    CameraError, CameraGuard, CameraProvider, EnrollmentStatus, FaceServiceError, FaceVerifier,
    downscale_frame,
};

/// Error from the on-device face detector.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FaceDetectError {
    #[error("face model unavailable: {0}")]
    ModelUnavailable(String),

    #[error("face detection failed: {0}")]
    Detection(String),
}

/// Detect faces in an encoded image. The model behind it is opaque.
#[async_trait]
pub trait FaceDetector: Send + Sync {
    /// Number of faces found in the image.
    async fn detect_faces(&self, image: &[u8]) -> Result<usize, FaceDetectError>;
}

/// Registers a reference face with the face-capability service.
#[async_trait]
pub trait FaceEnroller: Send + Sync {
    async fn register_face(&self, frame: &[u8]) -> Result<(), FaceServiceError>;
}

/// States of one enrollment flow instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnrollState {
    Closed,
    Ready,
    Enrolling,
}

#[derive(Debug, Error)]
pub enum FaceEnrollError {
    /// The detector found no face in the captured frame. Retryable.
    #[error("no face detected, make sure your face is clearly visible")]
    NoFaceDetected,

    /// More than one face in the frame; the reference must be
    /// unambiguous. Retryable.
    #[error("{0} faces detected, only your own face may be visible")]
    TooManyFaces(usize),

    #[error(transparent)]
    Camera(#[from] CameraError),

    #[error(transparent)]
    Detector(#[from] FaceDetectError),

    /// The registration call failed; the flow stays ready for a retry.
    #[error("enrollment service error: {0}")]
    Service(#[from] FaceServiceError),

    /// The captured frame could not be decoded; retryable.
    #[error("could not process captured frame: {0}")]
    BadFrame(String),

    /// The flow is not in a state that allows the requested operation.
    #[error("enrollment flow is not ready")]
    NotReady,
}

/// Camera-backed flow that captures and registers a reference face.
///
/// The camera stream stays live after a successful enrollment so the
/// user can immediately re-capture to update the reference; it is
/// released when the flow closes or is dropped.
pub struct FaceEnrollment {
    camera: Arc<dyn CameraProvider>,
    detector: Arc<dyn FaceDetector>,
    enroller: Arc<dyn FaceEnroller>,
    verifier: Arc<dyn FaceVerifier>,
    state: EnrollState,
    enrollment: EnrollmentStatus,
    guard: Option<CameraGuard>,
}

impl FaceEnrollment {
    pub fn new(
        camera: Arc<dyn CameraProvider>,
        detector: Arc<dyn FaceDetector>,
        enroller: Arc<dyn FaceEnroller>,
        verifier: Arc<dyn FaceVerifier>,
    ) -> Self {
        Self {
            camera,
            detector,
            enroller,
            verifier,
            state: EnrollState::Closed,
            enrollment: EnrollmentStatus::Unknown,
            guard: None,
        }
    }

    pub fn state(&self) -> EnrollState {
        self.state
    }

    /// Current enrollment status, so the UI can offer "enroll" versus
    /// "update".
    pub fn enrollment(&self) -> EnrollmentStatus {
        self.enrollment
    }

    pub fn camera_active(&self) -> bool {
        self.guard.as_ref().is_some_and(CameraGuard::is_active)
    }

    /// Open the camera and fetch the current enrollment status.
    ///
    /// A failed status fetch leaves the status `Unknown`; the flow
    /// still opens, since enrolling does not depend on it.
    pub async fn open(&mut self) -> Result<(), FaceEnrollError> {
        if self.state != EnrollState::Closed {
            return Err(FaceEnrollError::NotReady);
        }
        let stream = self.camera.open().await?;
        self.guard = Some(CameraGuard::new(stream));

        self.enrollment = match self.verifier.enrollment_status().await {
            Ok(status) => status,
            Err(err) => {
                tracing::warn!("enrollment status fetch failed: {err}");
                EnrollmentStatus::Unknown
            }
        };
        self.state = EnrollState::Ready;
        tracing::debug!(enrollment = ?self.enrollment, "enrollment flow ready");
        Ok(())
    }

    /// Capture one frame, require exactly one detected face, and
    /// register it as the reference.
    ///
    /// Every failure except a dead camera returns the flow to `Ready`
    /// with the stream live, so the user can retry.
    pub async fn capture_and_enroll(&mut self) -> Result<(), FaceEnrollError> {
        if self.state != EnrollState::Ready {
            return Err(FaceEnrollError::NotReady);
        }
        let Some(mut guard) = self.guard.take() else {
            return Err(FaceEnrollError::NotReady);
        };

        self.state = EnrollState::Enrolling;
        let frame = match guard.capture().await {
            Ok(frame) => frame,
            Err(err) => {
                tracing::warn!("frame capture failed: {err}");
                guard.release();
                self.state = EnrollState::Closed;
                return Err(FaceEnrollError::Camera(err));
            }
        };
        self.guard = Some(guard);

        match self.enroll_frame(&frame).await {
            Ok(()) => {
                self.state = EnrollState::Ready;
                tracing::info!("reference face enrolled");
                Ok(())
            }
            Err(err) => {
                tracing::debug!("enrollment attempt failed: {err}");
                self.state = EnrollState::Ready;
                Err(err)
            }
        }
    }

    async fn enroll_frame(&mut self, frame: &[u8]) -> Result<(), FaceEnrollError> {
        let frame =
            downscale_frame(frame).map_err(|err| FaceEnrollError::BadFrame(err.to_string()))?;

        match self.detector.detect_faces(&frame).await? {
            1 => {}
            0 => return Err(FaceEnrollError::NoFaceDetected),
            count => return Err(FaceEnrollError::TooManyFaces(count)),
        }

        self.enroller.register_face(&frame).await?;

        // Refresh the status; the register call just succeeded, so a
        // failed refresh still means enrolled.
        self.enrollment = match self.verifier.enrollment_status().await {
            Ok(status) => status,
            Err(err) => {
                tracing::debug!("status refresh after enrollment failed: {err}");
                EnrollmentStatus::Enrolled
            }
        };
        Ok(())
    }

    /// Close the flow, releasing the camera. Safe in any state.
    pub fn close(&mut self) {
        if let Some(mut guard) = self.guard.take() {
            guard.release();
        }
        self.state = EnrollState::Closed;
    }
}
