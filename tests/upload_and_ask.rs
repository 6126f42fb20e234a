use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Method, Request, StatusCode, header},
    response::Response,
};
use lopdf::content::{Content, Operation};
use lopdf::{Document, Object, Stream, dictionary};
use pdfqa::{
    api::create_router,
    config::Config,
    embedding::{EmbeddingClient, EmbeddingClientError},
    hashing::fingerprint_bytes,
    llm::{CompletionRequest, LanguageModel, LanguageModelError, ModelOutput},
    processing::DocumentService,
};
use serde_json::{Value, json};
use tempfile::TempDir;
use tower::ServiceExt;

const BOUNDARY: &str = "pdfqa-integration-boundary";
const DIMENSION: usize = 16;

/// Deterministic bag-of-bytes encoder that counts provider calls.
#[derive(Default)]
struct CountingEncoder {
    calls: AtomicUsize,
}

#[async_trait]
impl EmbeddingClient for CountingEncoder {
    fn model(&self) -> &str {
        "counting-encoder"
    }

    async fn generate_embeddings(
        &self,
        texts: Vec<String>,
    ) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(texts
            .iter()
            .map(|text| {
                let mut vector = vec![1.0_f32; DIMENSION];
                for byte in text.bytes() {
                    vector[usize::from(byte) % DIMENSION] += 1.0;
                }
                vector
            })
            .collect())
    }
}

/// Chat stub echoing a fixed answer and counting calls.
#[derive(Default)]
struct CountingModel {
    calls: AtomicUsize,
}

#[async_trait]
impl LanguageModel for CountingModel {
    fn model(&self) -> &str {
        "counting-model"
    }

    async fn complete(
        &self,
        request: CompletionRequest,
    ) -> Result<ModelOutput, LanguageModelError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        assert!(request.prompt.contains("mascot"), "question missing from prompt");
        Ok(ModelOutput::Text("Ferris the crab is the mascot.".into()))
    }
}

struct Harness {
    _dir: TempDir,
    config: Config,
    encoder: Arc<CountingEncoder>,
    model: Arc<CountingModel>,
    app: Router,
}

impl Harness {
    async fn new() -> Self {
        let dir = tempfile::tempdir().expect("temp dir");
        let config = Config {
            upload_dir: dir.path().join("uploads"),
            vector_store_dir: dir.path().join("vector_store"),
            ..Config::default()
        };
        let encoder = Arc::new(CountingEncoder::default());
        let model = Arc::new(CountingModel::default());
        let service = DocumentService::with_clients(&config, encoder.clone(), model.clone());
        service.initialize().await.expect("initialize storage");
        let app = create_router(Arc::new(service), config.max_upload_bytes);
        Self {
            _dir: dir,
            config,
            encoder,
            model,
            app,
        }
    }

    async fn send(&self, request: Request<Body>) -> Response {
        self.app
            .clone()
            .oneshot(request)
            .await
            .expect("router response")
    }

    async fn upload(&self, filename: &str, contents: &[u8]) -> Response {
        let mut body = Vec::new();
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; \
                 filename=\"{filename}\"\r\nContent-Type: application/pdf\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(contents);
        body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

        self.send(
            Request::builder()
                .method(Method::POST)
                .uri("/api/upload-pdf")
                .header(
                    header::CONTENT_TYPE,
                    format!("multipart/form-data; boundary={BOUNDARY}"),
                )
                .body(Body::from(body))
                .expect("request"),
        )
        .await
    }

    async fn ask(&self, question: &str, file_hash: &str) -> Response {
        self.send(
            Request::builder()
                .method(Method::POST)
                .uri("/api/ask-question")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(
                    json!({ "question": question, "file_hash": file_hash }).to_string(),
                ))
                .expect("request"),
        )
        .await
    }

    fn embed_calls(&self) -> usize {
        self.encoder.calls.load(Ordering::SeqCst)
    }

    fn model_calls(&self) -> usize {
        self.model.calls.load(Ordering::SeqCst)
    }

    fn index_entries(&self) -> Vec<String> {
        list_dir(&self.config.vector_store_dir)
    }
}

fn list_dir(path: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(path)
        .expect("read dir")
        .map(|entry| entry.expect("dir entry").file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

async fn json_body(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body bytes");
    serde_json::from_slice(&bytes).expect("json body")
}

fn pdf_with_pages(pages: &[&str]) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });

    let mut kids: Vec<Object> = Vec::new();
    for text in pages {
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 12.into()]),
                Operation::new("Td", vec![72.into(), 720.into()]),
                Operation::new("Tj", vec![Object::string_literal(*text)]),
                Operation::new("ET", vec![]),
            ],
        };
        let content_id =
            doc.add_object(Stream::new(dictionary! {}, content.encode().expect("encode")));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => resources_id,
        });
        kids.push(page_id.into());
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).expect("save pdf");
    bytes
}

fn sample_pdf() -> Vec<u8> {
    pdf_with_pages(&[
        "Ferris the crab is the unofficial mascot of Rust.",
        "Cargo is the Rust package manager and build tool.",
    ])
}

#[tokio::test]
async fn upload_ask_and_reupload_under_new_name() {
    let harness = Harness::new().await;
    let pdf = sample_pdf();
    let expected_hash = fingerprint_bytes(&pdf).to_string();

    let first = harness.upload("doc.pdf", &pdf).await;
    assert_eq!(first.status(), StatusCode::OK);
    let first = json_body(first).await;
    assert_eq!(first["file_hash"], expected_hash.as_str());
    assert_eq!(first["filename"], "doc.pdf");
    assert_eq!(harness.embed_calls(), 1);
    assert_eq!(harness.index_entries(), vec![expected_hash.clone()]);
    let index_dir = harness.config.vector_store_dir.join(&expected_hash);
    assert_eq!(list_dir(&index_dir), vec!["chunks.json", "manifest.json"]);

    let answer = harness
        .ask("Who is the mascot of Rust?", &expected_hash)
        .await;
    assert_eq!(answer.status(), StatusCode::OK);
    let answer = json_body(answer).await;
    assert_eq!(answer["file_hash"], expected_hash.as_str());
    assert_eq!(answer["answer"], "Ferris the crab is the mascot.");
    assert!(harness.model_calls() >= 1);
    let embed_calls_after_question = harness.embed_calls();
    let model_calls_after_question = harness.model_calls();

    let second = harness.upload("copy.pdf", &pdf).await;
    assert_eq!(second.status(), StatusCode::OK);
    let second = json_body(second).await;
    assert_eq!(second["file_hash"], expected_hash.as_str());
    assert_eq!(second["filename"], "copy.pdf");
    assert_eq!(harness.embed_calls(), embed_calls_after_question);
    assert_eq!(harness.model_calls(), model_calls_after_question);
    assert_eq!(harness.index_entries(), vec![expected_hash]);
    assert_eq!(
        list_dir(&harness.config.upload_dir),
        vec!["copy.pdf", "doc.pdf"]
    );

    let metrics = json_body(
        harness
            .send(Request::get("/api/metrics").body(Body::empty()).expect("request"))
            .await,
    )
    .await;
    assert_eq!(metrics["documents_ingested"], 1);
    assert_eq!(metrics["cache_hits"], 1);
    assert_eq!(metrics["chunks_indexed"], 2);
    assert_eq!(metrics["questions_answered"], 1);
}

#[tokio::test]
async fn unknown_fingerprint_is_not_found_without_model_calls() {
    let harness = Harness::new().await;
    let unknown = fingerprint_bytes(b"never uploaded").to_string();

    let response = harness.ask("Who is the mascot?", &unknown).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert!(json_body(response).await["detail"].is_string());

    let malformed = harness.ask("Who is the mascot?", "../../etc/passwd").await;
    assert_eq!(malformed.status(), StatusCode::NOT_FOUND);

    assert_eq!(harness.embed_calls(), 0);
    assert_eq!(harness.model_calls(), 0);
}

#[tokio::test]
async fn blank_question_is_rejected_before_retrieval() {
    let harness = Harness::new().await;
    let pdf = sample_pdf();
    let hash = json_body(harness.upload("doc.pdf", &pdf).await).await["file_hash"]
        .as_str()
        .expect("file hash")
        .to_string();
    let embed_calls_after_upload = harness.embed_calls();

    let response = harness.ask("   ", &hash).await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let detail = json_body(response).await["detail"]
        .as_str()
        .expect("detail")
        .to_string();
    assert!(detail.contains("empty"), "unexpected detail: {detail}");
    assert_eq!(harness.embed_calls(), embed_calls_after_upload);
    assert_eq!(harness.model_calls(), 0);
}

#[tokio::test]
async fn non_pdf_upload_is_rejected_and_not_stored() {
    let harness = Harness::new().await;
    let response = harness.upload("report.TXT", b"plain text").await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(list_dir(&harness.config.upload_dir).is_empty());
    assert_eq!(harness.embed_calls(), 0);
}

#[tokio::test]
async fn failed_ingest_leaves_no_index_behind() {
    let harness = Harness::new().await;
    let broken = b"%PDF-1.4 this is not really a pdf".to_vec();
    let hash = fingerprint_bytes(&broken).to_string();

    let response = harness.upload("broken.PDF", &broken).await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(harness.index_entries().is_empty());
    assert_eq!(harness.embed_calls(), 0);

    let ask = harness.ask("Who is the mascot?", &hash).await;
    assert_eq!(ask.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn corrupt_index_fails_the_question_without_model_calls() {
    let harness = Harness::new().await;
    let pdf = sample_pdf();
    let hash = json_body(harness.upload("doc.pdf", &pdf).await).await["file_hash"]
        .as_str()
        .expect("file hash")
        .to_string();
    let chunks_path = harness
        .config
        .vector_store_dir
        .join(&hash)
        .join("chunks.json");
    std::fs::write(&chunks_path, b"{ this is not an index").expect("overwrite chunks");

    let response = harness.ask("Who is the mascot of Rust?", &hash).await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let detail = json_body(response).await["detail"]
        .as_str()
        .expect("detail")
        .to_string();
    assert!(
        detail.starts_with("Error answering question"),
        "unexpected detail: {detail}"
    );
    assert_eq!(harness.model_calls(), 0);
}

#[cfg(unix)]
#[tokio::test]
async fn unwritable_index_root_is_forbidden() {
    use std::os::unix::fs::PermissionsExt;

    let harness = Harness::new().await;
    let root = harness.config.vector_store_dir.clone();
    std::fs::set_permissions(&root, std::fs::Permissions::from_mode(0o555))
        .expect("make index root read-only");

    // Privileged users ignore directory modes; nothing to assert in that case.
    let writable_check = root.join("writable-check");
    if std::fs::create_dir(&writable_check).is_ok() {
        std::fs::remove_dir(&writable_check).expect("remove check dir");
        std::fs::set_permissions(&root, std::fs::Permissions::from_mode(0o755))
            .expect("restore permissions");
        return;
    }

    let response = harness.upload("doc.pdf", &sample_pdf()).await;
    std::fs::set_permissions(&root, std::fs::Permissions::from_mode(0o755))
        .expect("restore permissions");

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let detail = json_body(response).await["detail"]
        .as_str()
        .expect("detail")
        .to_string();
    assert!(detail.starts_with("Permission denied"), "unexpected detail: {detail}");
    assert!(harness.index_entries().is_empty());
}
