//! HTTP client for the report-review backend.
//!
//! Implements the face-capability and report-submission seams from
//! `sidak-core` against the backend's REST API. Verification frames
//! travel as base64 JPEG data URLs; reports go up as one multipart
//! request carrying every field, every photo, and the fix coordinates.

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use reqwest::StatusCode;
use reqwest::multipart;
use serde::{Deserialize, Serialize};
use url::Url;

use sidak_core::{
    EnrollmentStatus, FaceEnroller, FaceServiceError, FaceVerifier, ReportPayload, ReportReceipt,
    ReportSubmitter, UploadError,
};

const FACE_STATUS_PATH: &str = "/api/face";
const FACE_REGISTER_PATH: &str = "/api/face/register";
const FACE_VERIFY_PATH: &str = "/api/face/verify";
const REPORT_PATH: &str = "/api/laporan";

/// Authenticated client for the review backend.
pub struct BackendClient {
    http: reqwest::Client,
    base_url: Url,
    token: String,
}

impl BackendClient {
    pub fn new(base_url: Url, token: impl Into<String>) -> Self {
        Self::with_http_client(reqwest::Client::new(), base_url, token)
    }

    /// Create with a preconfigured `reqwest::Client` (timeouts,
    /// proxies).
    pub fn with_http_client(http: reqwest::Client, base_url: Url, token: impl Into<String>) -> Self {
        Self {
            http,
            base_url,
            token: token.into(),
        }
    }

    fn endpoint(&self, path: &str) -> Result<Url, url::ParseError> {
        self.base_url.join(path)
    }
}

#[derive(Debug, Deserialize)]
struct FaceStatusResponse {
    registered: bool,
}

/// Request body shared by the verify and register endpoints: the frame
/// as a base64 JPEG data URL.
#[derive(Debug, Serialize)]
struct FaceImageRequest {
    image: String,
}

impl FaceImageRequest {
    fn new(frame: &[u8]) -> Self {
        Self {
            image: format!("data:image/jpeg;base64,{}", BASE64.encode(frame)),
        }
    }
}

#[derive(Debug, Deserialize)]
struct FaceVerifyResponse {
    success: bool,
}

#[derive(Debug, Deserialize)]
struct ReportResponse {
    id: ReportId,
}

/// The backend returns numeric or string report ids depending on the
/// storage backing it.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ReportId {
    Text(String),
    Number(i64),
}

impl std::fmt::Display for ReportId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text(id) => write!(f, "{id}"),
            Self::Number(id) => write!(f, "{id}"),
        }
    }
}

/// Error body shape used by the backend: either `msg` or `message`.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// The server's human-readable reason when the body carries one, else
/// the raw status and body.
fn failure_reason(status: StatusCode, body: &str) -> String {
    if let Ok(parsed) = serde_json::from_str::<ErrorBody>(body) {
        if let Some(reason) = parsed.msg.or(parsed.message) {
            return reason;
        }
    }
    format!("HTTP {status}: {body}")
}

#[async_trait]
impl FaceVerifier for BackendClient {
    async fn enrollment_status(&self) -> Result<EnrollmentStatus, FaceServiceError> {
        let url = self
            .endpoint(FACE_STATUS_PATH)
            .map_err(|err| FaceServiceError::Network(err.to_string()))?;
        let response = self
            .http
            .get(url)
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|err| FaceServiceError::Network(err.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(FaceServiceError::Server(failure_reason(status, &body)));
        }

        let parsed: FaceStatusResponse = response
            .json()
            .await
            .map_err(|err| FaceServiceError::Parse(err.to_string()))?;
        Ok(if parsed.registered {
            EnrollmentStatus::Enrolled
        } else {
            EnrollmentStatus::NotEnrolled
        })
    }

    async fn verify(&self, frame: &[u8]) -> Result<bool, FaceServiceError> {
        let url = self
            .endpoint(FACE_VERIFY_PATH)
            .map_err(|err| FaceServiceError::Network(err.to_string()))?;
        let response = self
            .http
            .post(url)
            .bearer_auth(&self.token)
            .json(&FaceImageRequest::new(frame))
            .send()
            .await
            .map_err(|err| FaceServiceError::Network(err.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(FaceServiceError::Server(failure_reason(status, &body)));
        }

        let parsed: FaceVerifyResponse = response
            .json()
            .await
            .map_err(|err| FaceServiceError::Parse(err.to_string()))?;
        tracing::debug!(matched = parsed.success, "face verify response");
        Ok(parsed.success)
    }
}

#[async_trait]
impl FaceEnroller for BackendClient {
    async fn register_face(&self, frame: &[u8]) -> Result<(), FaceServiceError> {
        let url = self
            .endpoint(FACE_REGISTER_PATH)
            .map_err(|err| FaceServiceError::Network(err.to_string()))?;
        let response = self
            .http
            .post(url)
            .bearer_auth(&self.token)
            .json(&FaceImageRequest::new(frame))
            .send()
            .await
            .map_err(|err| FaceServiceError::Network(err.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(FaceServiceError::Server(failure_reason(status, &body)));
        }
        tracing::debug!("reference face registered");
        Ok(())
    }
}

#[async_trait]
impl ReportSubmitter for BackendClient {
    async fn submit_report(&self, payload: &ReportPayload) -> Result<ReportReceipt, UploadError> {
        let url = self
            .endpoint(REPORT_PATH)
            .map_err(|err| UploadError::Network(err.to_string()))?;

        let mut form = multipart::Form::new()
            .text("nama_merk", payload.merchant_name.clone())
            .text("alamat", payload.address.clone())
            .text("npwpd", payload.registration_id.clone())
            .text("hasil_pemeriksaan", payload.findings.clone())
            .text("latitude", payload.latitude.to_string())
            .text("longitude", payload.longitude.to_string());
        for attachment in &payload.attachments {
            let part = multipart::Part::bytes(attachment.bytes.clone())
                .file_name(attachment.file_name.clone())
                .mime_str(&attachment.content_type)
                .map_err(|err| {
                    UploadError::Server(format!(
                        "invalid content type {}: {err}",
                        attachment.content_type
                    ))
                })?;
            form = form.part("foto", part);
        }

        tracing::debug!(attachments = payload.attachments.len(), "posting report");
        let response = self
            .http
            .post(url)
            .bearer_auth(&self.token)
            .multipart(form)
            .send()
            .await
            .map_err(|err| UploadError::Network(err.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(UploadError::Server(failure_reason(status, &body)));
        }

        // A success status is the acknowledgment; an unreadable body
        // only costs us the id.
        let id = match response.json::<ReportResponse>().await {
            Ok(parsed) => parsed.id.to_string(),
            Err(err) => {
                tracing::debug!("report accepted but id missing from response: {err}");
                String::new()
            }
        };
        Ok(ReportReceipt { id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_reason_prefers_msg() {
        let reason = failure_reason(StatusCode::BAD_REQUEST, r#"{"msg":"NPWPD tidak terdaftar"}"#);
        assert_eq!(reason, "NPWPD tidak terdaftar");
    }

    #[test]
    fn failure_reason_falls_back_to_message() {
        let reason = failure_reason(StatusCode::BAD_REQUEST, r#"{"message":"invalid photo"}"#);
        assert_eq!(reason, "invalid photo");
    }

    #[test]
    fn failure_reason_without_a_body_reports_the_status() {
        let reason = failure_reason(StatusCode::INTERNAL_SERVER_ERROR, "");
        assert!(reason.contains("500"), "got {reason}");
    }

    #[test]
    fn report_id_display_handles_both_shapes() {
        let text: ReportResponse = serde_json::from_str(r#"{"id":"abc-1"}"#).unwrap();
        assert_eq!(text.id.to_string(), "abc-1");
        let number: ReportResponse = serde_json::from_str(r#"{"id":42}"#).unwrap();
        assert_eq!(number.id.to_string(), "42");
    }
}
