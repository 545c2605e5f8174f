//! Wire-level tests of the backend client against a mock HTTP server.

use pretty_assertions::assert_eq;
use url::Url;
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use sidak_backend_client::BackendClient;
use sidak_core::{
    AttachmentRef, EnrollmentStatus, FaceEnroller, FaceServiceError, FaceVerifier, ReportPayload,
    ReportSubmitter, UploadError,
};

fn client_for(server: &MockServer) -> BackendClient {
    let base = Url::parse(&server.uri()).unwrap();
    BackendClient::new(base, "officer-token")
}

fn payload() -> ReportPayload {
    ReportPayload {
        merchant_name: "Toko Sinar Jaya".to_string(),
        address: "Jl. Merdeka 45".to_string(),
        registration_id: "AB12345678901".to_string(),
        findings: "Sticker missing".to_string(),
        attachments: vec![AttachmentRef {
            file_name: "storefront.jpg".to_string(),
            content_type: "image/jpeg".to_string(),
            // Plain ASCII bytes keep the multipart body matchable.
            bytes: b"jpegdata-storefront".to_vec(),
            preview: None,
        }],
        latitude: -6.911303,
        longitude: 107.610311,
    }
}

#[tokio::test]
async fn enrollment_status_maps_registered_flag() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/face"))
        .and(header("authorization", "Bearer officer-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "registered": true
        })))
        .expect(1)
        .mount(&server)
        .await;

    let status = client_for(&server).enrollment_status().await.unwrap();
    assert_eq!(status, EnrollmentStatus::Enrolled);
}

#[tokio::test]
async fn enrollment_status_maps_unregistered_flag() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/face"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "registered": false
        })))
        .mount(&server)
        .await;

    let status = client_for(&server).enrollment_status().await.unwrap();
    assert_eq!(status, EnrollmentStatus::NotEnrolled);
}

#[tokio::test]
async fn enrollment_status_surfaces_server_errors() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/face"))
        .respond_with(ResponseTemplate::new(500).set_body_json(serde_json::json!({
            "message": "face service down"
        })))
        .mount(&server)
        .await;

    let err = client_for(&server).enrollment_status().await.unwrap_err();
    assert_eq!(err, FaceServiceError::Server("face service down".to_string()));
}

#[tokio::test]
async fn verify_posts_a_jpeg_data_url() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/face/verify"))
        .and(header("authorization", "Bearer officer-token"))
        .and(body_string_contains("data:image/jpeg;base64,"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "success": true
        })))
        .expect(1)
        .mount(&server)
        .await;

    let matched = client_for(&server).verify(b"framedata").await.unwrap();
    assert!(matched);
}

#[tokio::test]
async fn verify_reports_a_non_match() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/face/verify"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "success": false
        })))
        .mount(&server)
        .await;

    let matched = client_for(&server).verify(b"framedata").await.unwrap();
    assert!(!matched);
}

#[tokio::test]
async fn register_face_posts_a_jpeg_data_url() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/face/register"))
        .and(header("authorization", "Bearer officer-token"))
        .and(body_string_contains("data:image/jpeg;base64,"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
        .expect(1)
        .mount(&server)
        .await;

    client_for(&server).register_face(b"framedata").await.unwrap();
}

#[tokio::test]
async fn register_face_surfaces_the_server_reason() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/face/register"))
        .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
            "msg": "gambar tidak valid"
        })))
        .mount(&server)
        .await;

    let err = client_for(&server).register_face(b"framedata").await.unwrap_err();
    assert_eq!(err, FaceServiceError::Server("gambar tidak valid".to_string()));
}

#[tokio::test]
async fn submit_report_sends_the_multipart_form() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/laporan"))
        .and(header("authorization", "Bearer officer-token"))
        .and(body_string_contains("name=\"nama_merk\""))
        .and(body_string_contains("Toko Sinar Jaya"))
        .and(body_string_contains("name=\"npwpd\""))
        .and(body_string_contains("AB12345678901"))
        .and(body_string_contains("name=\"hasil_pemeriksaan\""))
        .and(body_string_contains("name=\"latitude\""))
        .and(body_string_contains("name=\"longitude\""))
        .and(body_string_contains("name=\"foto\""))
        .and(body_string_contains("filename=\"storefront.jpg\""))
        .and(body_string_contains("jpegdata-storefront"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": 77
        })))
        .expect(1)
        .mount(&server)
        .await;

    let receipt = client_for(&server).submit_report(&payload()).await.unwrap();
    assert_eq!(receipt.id, "77");
}

#[tokio::test]
async fn submit_report_extracts_the_rejection_reason() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/laporan"))
        .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
            "msg": "NPWPD tidak terdaftar"
        })))
        .mount(&server)
        .await;

    let err = client_for(&server).submit_report(&payload()).await.unwrap_err();
    assert_eq!(err, UploadError::Server("NPWPD tidak terdaftar".to_string()));
}

#[tokio::test]
async fn submit_report_accepts_a_body_without_an_id() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/laporan"))
        .respond_with(ResponseTemplate::new(201).set_body_string("created"))
        .mount(&server)
        .await;

    let receipt = client_for(&server).submit_report(&payload()).await.unwrap();
    assert_eq!(receipt.id, "");
}

#[tokio::test]
async fn unreachable_server_is_a_network_error() {
    // Nothing listens on this port.
    let base = Url::parse("http://127.0.0.1:9").unwrap();
    let client = BackendClient::new(base, "officer-token");

    let err = client.submit_report(&payload()).await.unwrap_err();
    assert!(matches!(err, UploadError::Network(_)));

    let err = client.enrollment_status().await.unwrap_err();
    assert!(matches!(err, FaceServiceError::Network(_)));
}
