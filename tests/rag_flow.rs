use std::sync::Arc;

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Method, Request, StatusCode, header},
};
use httpmock::{Method::POST, Mock, MockServer};
use pbs_rag::{
    api::{RouterOptions, create_router},
    config::Config,
    embedding::OllamaEmbeddingClient,
    generation::OllamaGenerationClient,
    index::{IndexState, MemoryIndex},
    pipeline::{PipelineApi, PipelineSettings, RagPipeline},
    storage::{MemoryObjectStore, ObjectStore},
};
use serde_json::{Value, json};
use std::time::Duration;
use tower::ServiceExt;

const DIMENSION: usize = 4;
const BOUNDARY: &str = "rag-flow-boundary";
const JPEG_HEADER: [u8; 8] = [0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, 0x4A, 0x46];

struct OllamaMocks<'a> {
    embeddings: Mock<'a>,
    summaries: Mock<'a>,
    answers: Mock<'a>,
}

async fn mock_ollama(server: &MockServer) -> OllamaMocks<'_> {
    let embeddings = server
        .mock_async(|when, then| {
            when.method(POST).path("/api/embeddings");
            then.status(200)
                .json_body(json!({ "embedding": [1.0, 0.0, 0.0, 0.0] }));
        })
        .await;
    let summaries = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/api/generate")
                .body_contains("Summarize");
            then.status(200)
                .json_body(json!({ "response": "A note about the sky.", "done": true }));
        })
        .await;
    let answers = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/api/generate")
                .body_contains("[Question]");
            then.status(200)
                .json_body(json!({ "response": " The sky is blue. ", "done": true }));
        })
        .await;
    OllamaMocks {
        embeddings,
        summaries,
        answers,
    }
}

fn build_pipeline(server: &MockServer) -> Arc<RagPipeline> {
    let embedder = OllamaEmbeddingClient::new(
        server.base_url(),
        "mxbai-embed-large",
        DIMENSION,
        Duration::from_secs(5),
    )
    .expect("embedding client");
    let generator =
        OllamaGenerationClient::new(server.base_url(), "solar:10.7b").expect("generation client");
    Arc::new(RagPipeline::new(
        Arc::new(MemoryObjectStore::new()),
        Arc::new(embedder),
        Arc::new(generator),
        Arc::new(MemoryIndex::new(DIMENSION)),
        PipelineSettings {
            summary_timeout: Duration::from_secs(5),
            generation_timeout: Duration::from_secs(5),
            top_k: 3,
            presign_ttl: Duration::from_secs(60),
        },
    ))
}

fn router(pipeline: Arc<RagPipeline>) -> Router {
    create_router(
        pipeline,
        RouterOptions {
            cors_allowed_origins: Vec::new(),
            max_upload_bytes: 1024 * 1024,
        },
    )
}

fn upload_request(filename: &str, content: &[u8]) -> Request<Body> {
    let mut body = format!(
        "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\n\
         Content-Type: application/octet-stream\r\n\r\n"
    )
    .into_bytes();
    body.extend_from_slice(content);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

    Request::builder()
        .method(Method::POST)
        .uri("/api/upload")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .expect("upload request")
}

fn chat_request(query: &str) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri("/api/chat")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(json!({ "query": query }).to_string()))
        .expect("chat request")
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.expect("router response");
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body bytes");
    (status, serde_json::from_slice(&body).expect("json body"))
}

#[tokio::test]
async fn uploaded_text_grounds_chat_answer() {
    let server = MockServer::start_async().await;
    let mocks = mock_ollama(&server).await;
    let app = router(build_pipeline(&server));

    let (status, upload) = send(&app, upload_request("a.txt", b"The sky is blue.")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(upload["message"], "Success");
    assert_eq!(upload["filename"], "a.txt");
    assert_eq!(upload["summary"], "A note about the sky.");

    let (status, chat) = send(&app, chat_request("What color is the sky?")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(chat["answer"], "The sky is blue.");
    assert_eq!(chat["context"], "The sky is blue.");

    assert_eq!(mocks.embeddings.hits_async().await, 2);
    assert_eq!(mocks.summaries.hits_async().await, 1);
    assert_eq!(mocks.answers.hits_async().await, 1);
}

#[tokio::test]
async fn binary_upload_is_listed_without_analysis() {
    let server = MockServer::start_async().await;
    let mocks = mock_ollama(&server).await;
    let pipeline = build_pipeline(&server);
    let app = router(pipeline.clone());

    let (status, upload) = send(&app, upload_request("img.jpg", &JPEG_HEADER)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(upload["summary"], "analysis unavailable (binary file)");

    let (status, listing) = send(
        &app,
        Request::get("/api/documents")
            .body(Body::empty())
            .expect("request"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let entries = listing.as_array().expect("listing array");
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["filename"], "img.jpg");
    assert_eq!(
        entries[0]["summary"],
        "No AI summary available for this document."
    );

    assert_eq!(
        pipeline.store().get("img.jpg").await.expect("stored"),
        JPEG_HEADER
    );
    assert_eq!(mocks.embeddings.hits_async().await, 0);
    assert_eq!(mocks.summaries.hits_async().await, 0);

    let (_, chat) = send(&app, chat_request("What is in the picture?")).await;
    assert_eq!(
        chat["answer"],
        "No relevant document was found for this question."
    );
    assert_eq!(mocks.answers.hits_async().await, 0);
}

#[tokio::test]
async fn download_returns_uploaded_bytes() {
    let server = MockServer::start_async().await;
    mock_ollama(&server).await;
    let app = router(build_pipeline(&server));

    send(&app, upload_request("a.txt", b"The sky is blue.")).await;

    let response = app
        .clone()
        .oneshot(
            Request::get("/api/download/a.txt")
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("router response");
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "text/plain; charset=utf-8"
    );
    let body = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body bytes");
    assert_eq!(&body[..], b"The sky is blue.");
}

#[tokio::test]
async fn local_backends_are_selected_from_configuration() {
    let server = MockServer::start_async().await;
    let mocks = mock_ollama(&server).await;
    let base_url = server.base_url();
    let config = Config::from_lookup(|key| match key {
        "OLLAMA_URL" => Some(base_url.clone()),
        "EMBEDDING_DIMENSION" => Some(DIMENSION.to_string()),
        "VECTOR_BACKEND" => Some("memory".into()),
        "OBJECT_STORE_BACKEND" => Some("memory".into()),
        _ => None,
    })
    .expect("config");

    let pipeline = RagPipeline::from_config(&config).await.expect("pipeline");
    assert_eq!(pipeline.index_state(), IndexState::Ready);

    let outcome = pipeline
        .upload("a.txt", b"The sky is blue.".to_vec())
        .await
        .expect("upload");
    assert_eq!(outcome.message(), "Success");

    let answer = pipeline.chat("What color is the sky?").await;
    assert_eq!(answer.answer, "The sky is blue.");
    assert_eq!(mocks.embeddings.hits_async().await, 2);
}
