//! Face-verification gate: the camera-backed challenge that must reach
//! `Success` before a report upload is permitted.
//!
//! The gate is an explicit state machine. The camera stream lives in an
//! RAII guard owned by the gate, so every exit path (success, cancel,
//! owner teardown, a dropped future) releases the device; and a capture
//! can only start from `Ready`, so a half-finished attempt can never
//! double-submit.

use std::sync::Arc;

use async_trait::async_trait;
use image::GenericImageView;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Captured frames are shrunk to half size before verification.
const CAPTURE_SCALE_DIV: u32 = 2;

/// JPEG quality of the downscaled verification frame.
const CAPTURE_JPEG_QUALITY: u8 = 70;

/// States of one verification gate instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
    Closed,
    Opening,
    AwaitingEnrollmentStatus,
    Ready,
    Capturing,
    Verifying,
    Success,
    Failure,
}

/// Whether the user has a previously enrolled reference face.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EnrollmentStatus {
    #[default]
    Unknown,
    Enrolled,
    NotEnrolled,
}

/// Outcome of the most recent verification attempt in this session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VerifyResult {
    #[default]
    None,
    Success,
    Failure,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CameraError {
    #[error("camera unavailable: {0}")]
    Unavailable(String),

    #[error("frame capture failed: {0}")]
    Capture(String),
}

/// Error talking to the face-capability service.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FaceServiceError {
    #[error("network error: {0}")]
    Network(String),

    #[error("server error: {0}")]
    Server(String),

    #[error("parse error: {0}")]
    Parse(String),
}

#[derive(Debug, Error)]
pub enum FaceGateError {
    /// No reference face is enrolled; capture stays disabled. A hard
    /// stop, not a retryable error.
    #[error("no face enrolled for this user")]
    NotEnrolled,

    /// The provider reported no match, or errored mid-verification.
    /// The gate is back at `Ready` with the camera live for a retry.
    #[error("face verification failed")]
    VerificationFailed,

    #[error(transparent)]
    Camera(#[from] CameraError),

    /// The captured frame could not be decoded; retryable.
    #[error("could not process captured frame: {0}")]
    BadFrame(String),

    #[error("verification cancelled")]
    Cancelled,

    /// The gate is not in a state that allows the requested operation.
    #[error("gate is not ready")]
    NotReady,
}

/// Live camera stream handle.
///
/// `close` must be idempotent. Implementations should also release the
/// device on drop; the gate closes explicitly on every ordinary path.
#[async_trait]
pub trait CameraStream: Send {
    /// Capture a single still frame from the live stream, as encoded
    /// image bytes (JPEG or PNG).
    async fn capture_frame(&mut self) -> Result<Vec<u8>, CameraError>;

    /// Release the underlying device.
    fn close(&mut self);
}

/// Opens live camera streams. At most one stream is open per gate.
#[async_trait]
pub trait CameraProvider: Send + Sync {
    async fn open(&self) -> Result<Box<dyn CameraStream>, CameraError>;
}

/// The face capability: enrollment status plus verification of a live
/// capture against the enrolled face. The matcher itself is opaque.
#[async_trait]
pub trait FaceVerifier: Send + Sync {
    async fn enrollment_status(&self) -> Result<EnrollmentStatus, FaceServiceError>;

    /// Compare a still frame against the enrolled face.
    async fn verify(&self, frame: &[u8]) -> Result<bool, FaceServiceError>;
}

/// Owns the open stream; releases it exactly once. Shared with the
/// enrollment flow, which has the same camera lifecycle.
pub(crate) struct CameraGuard {
    stream: Option<Box<dyn CameraStream>>,
}

impl CameraGuard {
    pub(crate) fn new(stream: Box<dyn CameraStream>) -> Self {
        Self { stream: Some(stream) }
    }

    pub(crate) async fn capture(&mut self) -> Result<Vec<u8>, CameraError> {
        match self.stream.as_mut() {
            Some(stream) => stream.capture_frame().await,
            None => Err(CameraError::Capture("stream already released".to_string())),
        }
    }

    pub(crate) fn is_active(&self) -> bool {
        self.stream.is_some()
    }

    pub(crate) fn release(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            stream.close();
            tracing::debug!("camera stream released");
        }
    }
}

impl Drop for CameraGuard {
    fn drop(&mut self) {
        self.release();
    }
}

/// The face-match challenge gating report submission.
pub struct FaceVerificationGate {
    camera: Arc<dyn CameraProvider>,
    verifier: Arc<dyn FaceVerifier>,
    state: GateState,
    enrollment: EnrollmentStatus,
    last_result: VerifyResult,
    guard: Option<CameraGuard>,
    cancel: CancellationToken,
}

impl FaceVerificationGate {
    pub fn new(camera: Arc<dyn CameraProvider>, verifier: Arc<dyn FaceVerifier>) -> Self {
        Self {
            camera,
            verifier,
            state: GateState::Closed,
            enrollment: EnrollmentStatus::Unknown,
            last_result: VerifyResult::None,
            guard: None,
            cancel: CancellationToken::new(),
        }
    }

    pub fn state(&self) -> GateState {
        self.state
    }

    pub fn enrollment(&self) -> EnrollmentStatus {
        self.enrollment
    }

    pub fn last_result(&self) -> VerifyResult {
        self.last_result
    }

    pub fn camera_active(&self) -> bool {
        self.guard.as_ref().is_some_and(CameraGuard::is_active)
    }

    /// Whether `capture_and_verify` is currently allowed.
    pub fn capture_enabled(&self) -> bool {
        self.state == GateState::Ready && self.enrollment == EnrollmentStatus::Enrolled
    }

    /// Clonable handle that aborts the gate from outside an await.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// `Closed → Opening → AwaitingEnrollmentStatus → Ready`.
    ///
    /// The camera stream and the enrollment query start together. A
    /// camera failure closes the gate; a failed enrollment fetch keeps
    /// the gate open with capture disabled (treated as not enrolled).
    pub async fn open(&mut self) -> Result<(), FaceGateError> {
        if self.state != GateState::Closed {
            return Err(FaceGateError::NotReady);
        }
        self.state = GateState::Opening;

        let cancel = self.cancel.clone();
        let camera = Arc::clone(&self.camera);
        let verifier = Arc::clone(&self.verifier);
        let camera_fut = async move { camera.open().await };
        let status_fut = async move { verifier.enrollment_status().await };
        tokio::pin!(camera_fut);
        tokio::pin!(status_fut);

        // Drive both until the camera resolves; the camera result
        // decides whether the gate opens at all.
        let mut status_res = None;
        let camera_res = loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    self.state = GateState::Closed;
                    return Err(FaceGateError::Cancelled);
                }
                status = &mut status_fut, if status_res.is_none() => {
                    status_res = Some(status);
                }
                opened = &mut camera_fut => break opened,
            }
        };

        let stream = match camera_res {
            Ok(stream) => stream,
            Err(err) => {
                tracing::warn!("camera failed to open: {err}");
                self.state = GateState::Closed;
                return Err(FaceGateError::Camera(err));
            }
        };
        self.guard = Some(CameraGuard::new(stream));

        self.state = GateState::AwaitingEnrollmentStatus;
        let status = match status_res {
            Some(status) => status,
            None => {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        self.close();
                        return Err(FaceGateError::Cancelled);
                    }
                    status = &mut status_fut => status,
                }
            }
        };
        self.enrollment = match status {
            Ok(status) => status,
            Err(err) => {
                // Same hard stop the guidance message explains; the
                // user cannot verify without enrolling first.
                tracing::warn!("enrollment status fetch failed, capture disabled: {err}");
                EnrollmentStatus::NotEnrolled
            }
        };
        self.state = GateState::Ready;
        tracing::debug!(enrollment = ?self.enrollment, "face gate ready");
        Ok(())
    }

    /// One verification attempt:
    /// `Ready → Capturing → Verifying → Success | Failure`.
    ///
    /// On `Success` the camera is released immediately. On `Failure`
    /// the gate returns to `Ready` with the camera live; attempts are
    /// unbounded.
    pub async fn capture_and_verify(&mut self) -> Result<(), FaceGateError> {
        if self.state != GateState::Ready {
            return Err(FaceGateError::NotReady);
        }
        if self.enrollment != EnrollmentStatus::Enrolled {
            return Err(FaceGateError::NotEnrolled);
        }
        let Some(mut guard) = self.guard.take() else {
            return Err(FaceGateError::NotReady);
        };

        self.state = GateState::Capturing;
        let cancel = self.cancel.clone();
        let frame = match or_cancelled(&cancel, guard.capture()).await {
            None => {
                guard.release();
                self.state = GateState::Closed;
                return Err(FaceGateError::Cancelled);
            }
            Some(Err(err)) => {
                // A dead camera is not retryable from here.
                tracing::warn!("frame capture failed: {err}");
                guard.release();
                self.state = GateState::Closed;
                return Err(FaceGateError::Camera(err));
            }
            Some(Ok(frame)) => frame,
        };
        // The stream stays with the gate for the retry paths.
        self.guard = Some(guard);

        let frame = match downscale_frame(&frame) {
            Ok(frame) => frame,
            Err(err) => {
                self.state = GateState::Ready;
                return Err(FaceGateError::BadFrame(err.to_string()));
            }
        };

        self.state = GateState::Verifying;
        let verifier = Arc::clone(&self.verifier);
        let verdict = match or_cancelled(&cancel, async move { verifier.verify(&frame).await }).await
        {
            None => {
                self.close();
                return Err(FaceGateError::Cancelled);
            }
            Some(verdict) => verdict,
        };

        match verdict {
            Ok(true) => {
                self.state = GateState::Success;
                self.last_result = VerifyResult::Success;
                // The camera must never stay active after a terminal
                // state.
                self.release_camera();
                tracing::info!("face verified");
                Ok(())
            }
            Ok(false) => self.fail_attempt("no match"),
            Err(err) => self.fail_attempt(&err.to_string()),
        }
    }

    /// `Verifying → Failure → Ready`: the attempt is recorded and the
    /// gate reopens for capture with the camera still live.
    fn fail_attempt(&mut self, reason: &str) -> Result<(), FaceGateError> {
        tracing::debug!("face verification failed: {reason}");
        self.state = GateState::Failure;
        self.last_result = VerifyResult::Failure;
        self.state = GateState::Ready;
        Err(FaceGateError::VerificationFailed)
    }

    /// Close the gate, releasing the camera. Safe in any state; called
    /// on explicit cancel and by the owning submission on teardown.
    pub fn close(&mut self) {
        self.release_camera();
        if self.state != GateState::Success && self.state != GateState::Closed {
            tracing::debug!(state = ?self.state, "face gate closed before success");
        }
        self.state = GateState::Closed;
    }

    /// Cancel any in-flight open or verification and close the gate.
    pub fn cancel(&mut self) {
        self.cancel.cancel();
        self.close();
    }

    fn release_camera(&mut self) {
        if let Some(mut guard) = self.guard.take() {
            guard.release();
        }
    }
}

/// Race a future against the gate's cancellation token. `None` means
/// the token won.
async fn or_cancelled<F: Future>(token: &CancellationToken, fut: F) -> Option<F::Output> {
    tokio::select! {
        _ = token.cancelled() => None,
        out = fut => Some(out),
    }
}

/// Shrink a captured frame to half size and re-encode it as JPEG
/// before it goes to the face service. Used by verification and
/// enrollment alike.
pub(crate) fn downscale_frame(frame: &[u8]) -> Result<Vec<u8>, image::ImageError> {
    let img = image::load_from_memory(frame)?;
    let (width, height) = img.dimensions();
    let scaled = img
        .resize_exact(
            (width / CAPTURE_SCALE_DIV).max(1),
            (height / CAPTURE_SCALE_DIV).max(1),
            FilterType::Triangle,
        )
        .to_rgb8();
    let mut out = Vec::new();
    scaled.write_with_encoder(JpegEncoder::new_with_quality(&mut out, CAPTURE_JPEG_QUALITY))?;
    Ok(out)
}
