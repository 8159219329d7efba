//! End-to-end conversion flows through the full router.

mod common;

use std::io::Write;
use std::sync::Arc;

use axum::http::StatusCode;
use base64::Engine as _;
use serde_json::json;
use zip::write::SimpleFileOptions;

use common::*;

fn wav_samples(bytes: &[u8]) -> (u32, usize) {
    let reader = hound::WavReader::new(std::io::Cursor::new(bytes)).unwrap();
    (reader.spec().sample_rate, reader.len() as usize)
}

fn docx(paragraphs: &[&str]) -> Vec<u8> {
    let body: String = paragraphs
        .iter()
        .map(|p| format!("<w:p><w:r><w:t>{p}</w:t></w:r></w:p>"))
        .collect();
    let xml = format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\
         <w:document xmlns:w=\"http://schemas.openxmlformats.org/wordprocessingml/2006/main\">\
         <w:body>{body}</w:body></w:document>"
    );

    let mut cursor = std::io::Cursor::new(Vec::new());
    let mut zip = zip::ZipWriter::new(&mut cursor);
    zip.start_file("word/document.xml", SimpleFileOptions::default()).unwrap();
    zip.write_all(xml.as_bytes()).unwrap();
    zip.finish().unwrap();
    cursor.into_inner()
}

#[tokio::test]
async fn test_mixed_text_full_pipeline() {
    let app = create_test_app();
    let job_id = submit(&app, "Hello world. நான் நன்றாக இருக்கிறேன்.").await;

    let seen = wait_for_job(&app, &job_id).await;
    let percents: Vec<u64> = seen.iter().map(|s| s["percent"].as_u64().unwrap()).collect();
    assert!(percents.windows(2).all(|w| w[0] <= w[1]), "percent went backwards: {percents:?}");

    let last = seen.last().unwrap();
    assert_eq!(last["status"], "finished");
    assert_eq!(last["percent"], 100);
    assert!(last.get("error").is_none());

    let (status, _, body) = get(&app, &format!("/download/{job_id}")).await;
    assert_eq!(status, StatusCode::OK);
    let (rate, samples) = wav_samples(&body);
    assert_eq!(rate, RATE);
    // 0.5 s + 200 ms gap + 0.5 s
    assert_eq!(samples, 9_600);
}

#[tokio::test]
async fn test_docx_upload_pipeline() {
    let app = create_test_app();
    let file = docx(&["First paragraph.", "இரண்டாவது பத்தி."]);
    let request = multipart_request("/tts", Some("ignored when a file is present"), Some(("story.docx", file.as_slice())));

    let (status, _, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);

    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["segments"], 2);
    let wav = base64::engine::general_purpose::STANDARD
        .decode(json["audio_base64"].as_str().unwrap())
        .unwrap();
    assert_eq!(&wav[0..4], b"RIFF");
}

#[tokio::test]
async fn test_corrupt_docx_is_rejected() {
    let app = create_test_app();
    let request = multipart_request("/convert_async", None, Some(("broken.docx", &b"not a zip archive"[..])));

    let (status, _, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert!(json["error"].as_str().unwrap().contains(".docx"));
}

#[tokio::test]
async fn test_all_backends_failing_yields_silence() {
    let app = app_with(vec![Arc::new(FailingBackend)], 1.25);
    let job_id = submit(&app, "First sentence. Second sentence.").await;

    let seen = wait_for_job(&app, &job_id).await;
    assert_eq!(seen.last().unwrap()["status"], "finished");

    let (status, _, body) = get(&app, &format!("/download/{job_id}")).await;
    assert_eq!(status, StatusCode::OK);
    let (rate, samples) = wav_samples(&body);
    assert_eq!(rate, RATE);
    // two 1 s placeholders, no gap, sped up by 1.25
    assert_eq!(samples, 12_800);

    let (_, _, metrics) = get(&app, "/metrics").await;
    let metrics: serde_json::Value = serde_json::from_slice(&metrics).unwrap();
    assert_eq!(metrics["backends"][0]["name"], "failing");
    assert_eq!(metrics["backends"][0]["failures"], 2);
}

#[tokio::test]
async fn test_punctuation_only_text_fails_job() {
    let app = create_test_app();
    let job_id = submit(&app, "... !!! ???").await;

    let seen = wait_for_job(&app, &job_id).await;
    let last = seen.last().unwrap();
    assert_eq!(last["status"], "error");
    assert!(last["error"].is_string());

    let (status, _, _) = get(&app, &format!("/download/{job_id}")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_concurrent_jobs_are_independent() {
    let app = create_test_app();
    let first = submit(&app, "Job one.").await;
    let second = submit(&app, "Job two. Has more. Sentences here.").await;
    assert_ne!(first, second);

    for id in [&first, &second] {
        let seen = wait_for_job(&app, id).await;
        assert_eq!(seen.last().unwrap()["status"], "finished");
    }

    let (status, body) = post_json(&app, "/tts", json!({ "text": "Job two. Has more. Sentences here." })).await;
    assert_eq!(status, StatusCode::OK);
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["segments"], 3);
}
