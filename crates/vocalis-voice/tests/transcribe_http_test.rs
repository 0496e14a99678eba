//! `HttpTranscriber` against a local stand-in for the `/api/transcribe` endpoint.

use axum::body::Bytes;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{json, Value};
use std::time::Duration;
use vocalis_core::ErrorKind;
use vocalis_voice::{CapturedAudio, HttpTranscriber, RemoteTranscriber, VoiceError};

async fn serve(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}

fn one_second_of_audio() -> CapturedAudio {
    CapturedAudio::from_pcm(&[0.1; 16_000], 16_000)
}

async fn transcribe_with(router: Router) -> Result<String, VoiceError> {
    let base = serve(router).await;
    let transcriber = HttpTranscriber::new(base, Duration::from_secs(5)).unwrap();
    transcriber.transcribe(one_second_of_audio()).await
}

#[tokio::test]
async fn transcript_is_returned_trimmed() {
    let router = Router::new().route(
        "/api/transcribe",
        post(|body: Bytes| async move {
            assert!(!body.is_empty());
            Json(json!({ "transcript": "  turn on the lights " }))
        }),
    );
    assert_eq!(transcribe_with(router).await.unwrap(), "turn on the lights");
}

#[tokio::test]
async fn error_status_carries_the_server_message() {
    let router = Router::new().route(
        "/api/transcribe",
        post(|| async {
            (
                StatusCode::TOO_MANY_REQUESTS,
                Json(json!({ "error": "quota exceeded" })),
            )
        }),
    );
    let err = transcribe_with(router).await.unwrap_err();
    assert_eq!(
        err,
        VoiceError::SttStatus {
            status: 429,
            body: "quota exceeded".into(),
        }
    );
    assert_eq!(err.to_raw().kind, Some(ErrorKind::RateLimitError));
}

#[tokio::test]
async fn server_failure_is_classified_as_connection_trouble() {
    let router = Router::new().route(
        "/api/transcribe",
        post(|| async { (StatusCode::BAD_GATEWAY, "upstream down") }),
    );
    let err = transcribe_with(router).await.unwrap_err();
    assert_eq!(
        err,
        VoiceError::SttStatus {
            status: 502,
            body: "upstream down".into(),
        }
    );
    assert_eq!(err.to_raw().kind, Some(ErrorKind::ConnectionError));
}

#[tokio::test]
async fn success_without_transcript_is_an_error() {
    let router = Router::new().route(
        "/api/transcribe",
        post(|| async { Json(Value::Object(Default::default())) }),
    );
    let err = transcribe_with(router).await.unwrap_err();
    assert_eq!(err, VoiceError::Stt("response carried no transcript".into()));
    assert_eq!(err.to_raw().kind, Some(ErrorKind::AsrError));
}
