//! Integration tests for the HTTP routes

mod common;

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
};
use serde_json::json;

use common::*;

#[tokio::test]
async fn test_health_check() {
    let app = create_test_app();
    for uri in ["/health", "/healthz", "/api/health"] {
        let (status, headers, body) = get(&app, uri).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, b"ok");
        assert!(headers.contains_key("x-request-id"));
    }
}

#[tokio::test]
async fn test_list_engines() {
    let app = create_test_app();
    let (status, _, body) = get(&app, "/engines").await;

    assert_eq!(status, StatusCode::OK);
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["engines"], json!(["tone"]));
}

#[tokio::test]
async fn test_convert_async_returns_job_id() {
    let app = create_test_app();
    let (status, body) = post_json(&app, "/convert_async", json!({ "text": "Hello world." })).await;

    assert_eq!(status, StatusCode::ACCEPTED);
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    let job_id = json["job_id"].as_str().unwrap();
    assert_eq!(job_id.len(), 32);
}

#[tokio::test]
async fn test_convert_async_rejects_empty_text() {
    let app = create_test_app();
    let (status, body) = post_json(&app, "/convert_async", json!({ "text": "   " })).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert!(json["error"].as_str().unwrap().contains("empty"));
    assert_eq!(json["code"], 400);
}

#[tokio::test]
async fn test_convert_async_rejects_long_text() {
    let app = create_test_app();
    let text = "word ".repeat(200);
    let (status, body) = post_json(&app, "/convert_async", json!({ "text": text })).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert!(json["error"].as_str().unwrap().contains("too long"));
}

#[tokio::test]
async fn test_convert_async_rejects_unknown_content_type() {
    let app = create_test_app();
    let request = Request::builder()
        .method("POST")
        .uri("/convert_async")
        .header("content-type", "text/plain")
        .body(Body::from("Hello"))
        .unwrap();
    let (status, _, _) = send(&app, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_multipart_text_field() {
    let app = create_test_app();
    let (status, _, body) = send(&app, multipart_request("/convert_async", Some("Hello from a form."), None)).await;

    assert_eq!(status, StatusCode::ACCEPTED);
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    let job_id = json["job_id"].as_str().unwrap().to_string();
    let seen = wait_for_job(&app, &job_id).await;
    assert_eq!(seen.last().unwrap()["status"], "finished");
}

#[tokio::test]
async fn test_multipart_txt_upload() {
    let app = create_test_app();
    let file = "Uploaded text. வணக்கம்.".as_bytes();
    let request = multipart_request("/convert_async", None, Some(("notes.txt", file)));
    let (status, _, _) = send(&app, request).await;
    assert_eq!(status, StatusCode::ACCEPTED);
}

#[tokio::test]
async fn test_multipart_unsupported_file() {
    let app = create_test_app();
    let request = multipart_request("/convert_async", None, Some(("scan.pdf", &b"%PDF-1.4"[..])));
    let (status, _, body) = send(&app, request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert!(json["error"].as_str().unwrap().contains("Unsupported file type"));
}

#[tokio::test]
async fn test_multipart_without_content() {
    let app = create_test_app();
    let (status, _, _) = send(&app, multipart_request("/convert_async", None, None)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_progress_unknown_job() {
    let app = create_test_app();
    let (status, _, body) = get(&app, "/progress/00000000000000000000000000000000").await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["code"], 404);
}

#[tokio::test]
async fn test_progress_malformed_job_id() {
    let app = create_test_app();
    let (status, _, _) = get(&app, "/progress/not%20a%20job").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_download_before_finish() {
    let app = slow_app();
    let job_id = submit(&app, "Slow sentence one. Slow sentence two.").await;

    let (status, _, body) = get(&app, &format!("/download/{job_id}")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["error"], "Job not finished");
}

#[tokio::test]
async fn test_download_finished_job() {
    let app = create_test_app();
    let job_id = submit(&app, "Hello world.").await;
    wait_for_job(&app, &job_id).await;

    let (status, headers, body) = get(&app, &format!("/download/{job_id}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers[header::CONTENT_TYPE], "audio/wav");
    assert!(headers[header::CONTENT_DISPOSITION]
        .to_str()
        .unwrap()
        .contains("mixed_tts_output.wav"));
    assert_eq!(&body[0..4], b"RIFF");
}

#[tokio::test]
async fn test_cancel_job() {
    let app = slow_app();
    let job_id = submit(&app, "One. Two. Three. Four. Five. Six.").await;

    let request = Request::builder()
        .method("POST")
        .uri(format!("/cancel/{job_id}"))
        .body(Body::empty())
        .unwrap();
    let (status, _, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["status"], "cancelled");

    let seen = wait_for_job(&app, &job_id).await;
    assert_eq!(seen.last().unwrap()["status"], "cancelled");
    let (status, _, _) = get(&app, &format!("/download/{job_id}")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_convert_sync_returns_wav() {
    let app = create_test_app();
    let request = Request::builder()
        .method("POST")
        .uri("/convert")
        .header("content-type", "application/json")
        .body(Body::from(json!({ "text": "Hello world." }).to_string()))
        .unwrap();
    let (status, headers, body) = send(&app, request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers[header::CONTENT_TYPE], "audio/wav");
    assert_eq!(&body[0..4], b"RIFF");
}

#[tokio::test]
async fn test_tts_endpoint_success() {
    let app = create_test_app();
    let (status, body) = post_json(&app, "/tts", json!({ "text": "Hello world. நான் நன்றாக இருக்கிறேன்." })).await;

    assert_eq!(status, StatusCode::OK);
    let tts_response: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert!(tts_response["audio_base64"].is_string());
    assert_eq!(tts_response["sample_rate"], RATE);
    assert_eq!(tts_response["segments"], 2);
    // two half-second clips and one 200 ms gap
    assert_eq!(tts_response["duration_ms"], 1200);
}

#[tokio::test]
async fn test_tts_endpoint_validation_empty_text() {
    let app = create_test_app();
    let (status, body) = post_json(&app, "/tts", json!({ "text": "" })).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    let error_response: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert!(error_response["error"].is_string());
}

#[tokio::test]
async fn test_api_prefix_routes() {
    let app = create_test_app();
    let (status, body) = post_json(&app, "/api/convert_async", json!({ "text": "Prefixed." })).await;
    assert_eq!(status, StatusCode::ACCEPTED);

    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    let job_id = json["job_id"].as_str().unwrap();
    let (status, _, _) = get(&app, &format!("/api/progress/{job_id}")).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let app = create_test_app();
    let job_id = submit(&app, "Count me.").await;
    wait_for_job(&app, &job_id).await;

    let (status, _, body) = get(&app, "/metrics").await;
    assert_eq!(status, StatusCode::OK);

    let metrics: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert!(metrics["system"]["uptime_seconds"].is_number());
    assert!(metrics["system"]["request_count"].as_u64().unwrap() >= 1);
    assert_eq!(metrics["jobs"]["finished"], 1);
    assert_eq!(metrics["backends"][0]["name"], "tone");
    assert_eq!(metrics["backends"][0]["successes"], 1);
}

#[tokio::test]
async fn test_cors_headers() {
    let app = create_test_app();
    let request = Request::builder()
        .method("OPTIONS")
        .uri("/tts")
        .header("Origin", "http://localhost:3000")
        .header("Access-Control-Request-Method", "POST")
        .body(Body::empty())
        .unwrap();
    let (status, headers, _) = send(&app, request).await;

    assert!(status.is_success());
    assert!(headers.contains_key("access-control-allow-origin"));
}
