use docqa::config::{ChatProvider, Config, EmbeddingProvider};
use docqa::ingestion::UploadedFile;
use docqa::pipeline::{DocumentApi, DocumentService, Sentiment};
use httpmock::{
    Method::{GET, POST, PUT},
    MockServer,
};
use serde_json::json;
use std::path::Path;

fn config(root: &Path, qdrant: &MockServer, openai: &MockServer) -> Config {
    Config {
        artifact_dir: root.join("artifact"),
        file_storage_dir_name: "file_storage".into(),
        text_splitter_chunk_size: 1000,
        text_splitter_chunk_overlap: 200,
        document_converter_path: "false".into(),
        ocr_executable: "false".into(),
        pdf_rasterizer_path: "false".into(),
        external_tool_timeout: None,
        qdrant_url: qdrant.base_url(),
        qdrant_collection_name: "docs".into(),
        qdrant_api_key: None,
        embedding_provider: EmbeddingProvider::Local,
        embedding_model: "local".into(),
        embedding_dimension: 16,
        chat_provider: ChatProvider::OpenAI,
        qa_model: "gpt-3.5-turbo-0125".into(),
        summary_model: "gpt-3.5-turbo-1106".into(),
        sentiment_model: "gpt-3.5-turbo".into(),
        openai_api_key: Some("sk-test".into()),
        openai_base_url: openai.base_url(),
        ollama_url: "http://127.0.0.1:11434".into(),
        record_ledger_path: root.join("ledger.sqlite"),
        server_port: None,
    }
}

async fn mock_collection(server: &MockServer) {
    server
        .mock_async(|when, then| {
            when.method(GET).path("/collections/docs");
            then.status(200)
                .json_body(json!({ "status": "ok", "result": {} }));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(PUT).path("/collections/docs/index");
            then.status(200)
                .json_body(json!({ "status": "ok", "result": {} }));
        })
        .await;
}

fn run_dirs(root: &Path) -> Vec<std::path::PathBuf> {
    std::fs::read_dir(root.join("artifact"))
        .map(|entries| {
            entries
                .filter_map(Result::ok)
                .map(|entry| entry.path())
                .filter(|path| path.file_name().is_some_and(|name| name != "logs"))
                .collect()
        })
        .unwrap_or_default()
}

#[tokio::test]
async fn uploads_are_stored_chunked_and_indexed() {
    let qdrant = MockServer::start_async().await;
    let openai = MockServer::start_async().await;
    mock_collection(&qdrant).await;
    let upsert = qdrant
        .mock_async(|when, then| {
            when.method(PUT)
                .path("/collections/docs/points")
                .query_param("wait", "true");
            then.status(200)
                .json_body(json!({ "status": "ok", "result": {} }));
        })
        .await;
    let root = tempfile::tempdir().unwrap();

    let service = DocumentService::new(config(root.path(), &qdrant, &openai))
        .await
        .unwrap();
    let outcome = service
        .process_documents(vec![
            UploadedFile::new("Notes.txt", b"The invoice total is 42 dollars.".to_vec()),
            UploadedFile::new("readme.md", b"# Title\n\nSome markdown body.".to_vec()),
            UploadedFile::new("table.csv", b"item,price\nwidget,3\n".to_vec()),
        ])
        .await
        .unwrap();

    assert_eq!(outcome.files, 3);
    assert_eq!(outcome.chunks, 3);
    assert_eq!(outcome.indexing.num_added, 3);
    assert_eq!(outcome.indexing.num_skipped, 0);
    assert_eq!(upsert.hits_async().await, 1);

    let runs = run_dirs(root.path());
    assert_eq!(runs.len(), 1);
    assert!(runs[0].join("file_storage").join("notes.txt").is_file());

    let snapshot = service.metrics_snapshot();
    assert_eq!(snapshot.files_ingested, 3);
    assert_eq!(snapshot.chunks_produced, 3);

    let again = service
        .process_documents(vec![UploadedFile::new(
            "notes.txt",
            b"The invoice total is 42 dollars.".to_vec(),
        )])
        .await
        .unwrap();
    assert_eq!(again.indexing.num_added, 0);
    assert_eq!(again.indexing.num_skipped, 1);
    assert_eq!(upsert.hits_async().await, 1);
}

#[tokio::test]
async fn unsupported_files_abort_the_batch_before_indexing() {
    let qdrant = MockServer::start_async().await;
    let openai = MockServer::start_async().await;
    mock_collection(&qdrant).await;
    let upsert = qdrant
        .mock_async(|when, then| {
            when.method(PUT).path("/collections/docs/points");
            then.status(200)
                .json_body(json!({ "status": "ok", "result": {} }));
        })
        .await;
    let root = tempfile::tempdir().unwrap();

    let service = DocumentService::new(config(root.path(), &qdrant, &openai))
        .await
        .unwrap();
    let err = service
        .process_documents(vec![
            UploadedFile::new("a.csv", b"h\nv\n".to_vec()),
            UploadedFile::new("b.unknownext", b"???".to_vec()),
        ])
        .await
        .unwrap_err();

    assert_eq!(err.context(), "failed to transform b.unknownext");
    assert_eq!(upsert.hits_async().await, 0);
    assert_eq!(service.metrics_snapshot().files_ingested, 0);
}

#[tokio::test]
async fn questions_summaries_and_sentiment_use_the_chat_model() {
    let qdrant = MockServer::start_async().await;
    let openai = MockServer::start_async().await;
    mock_collection(&qdrant).await;
    qdrant
        .mock_async(|when, then| {
            when.method(POST).path("/collections/docs/points/query");
            then.status(200).json_body(json!({
                "status": "ok",
                "result": { "points": [
                    { "id": "1", "score": 0.9, "payload": { "text": "Invoice total 42" } }
                ]}
            }));
        })
        .await;
    let answer = openai
        .mock_async(|when, then| {
            when.method(POST)
                .path("/chat/completions")
                .body_contains("Invoice total 42");
            then.status(200).json_body(json!({
                "choices": [{ "message": { "content": "The total is 42." } }]
            }));
        })
        .await;
    let summary = openai
        .mock_async(|when, then| {
            when.method(POST)
                .path("/chat/completions")
                .body_contains("CONCISE SUMMARY");
            then.status(200).json_body(json!({
                "choices": [{ "message": { "content": "A short note." } }]
            }));
        })
        .await;
    let sentiment = openai
        .mock_async(|when, then| {
            when.method(POST)
                .path("/chat/completions")
                .body_contains("sentiment analysis");
            then.status(200).json_body(json!({
                "choices": [{ "message": { "content": "Positive." } }]
            }));
        })
        .await;
    let root = tempfile::tempdir().unwrap();

    let service = DocumentService::new(config(root.path(), &qdrant, &openai))
        .await
        .unwrap();

    let reply = service.answer_question("What is the total?").await.unwrap();
    assert_eq!(reply, "The total is 42.");
    answer.assert_async().await;

    let summaries = service
        .summarize_documents(vec![UploadedFile::new("Note One.txt", b"hello there".to_vec())])
        .await
        .unwrap();
    assert_eq!(summaries.get("note-one.txt").map(String::as_str), Some("A short note."));
    summary.assert_async().await;

    let label = service.analyze_sentiment("I love it").await.unwrap();
    assert_eq!(label, Sentiment::Positive);
    sentiment.assert_async().await;

    let snapshot = service.metrics_snapshot();
    assert_eq!(snapshot.questions_answered, 1);
    assert_eq!(snapshot.summaries_generated, 1);
}

#[tokio::test]
async fn missing_openai_key_fails_at_construction() {
    let qdrant = MockServer::start_async().await;
    let openai = MockServer::start_async().await;
    let root = tempfile::tempdir().unwrap();
    let mut config = config(root.path(), &qdrant, &openai);
    config.openai_api_key = None;

    let err = match DocumentService::new(config).await {
        Ok(_) => panic!("service should not start without a key"),
        Err(err) => err,
    };
    assert_eq!(err.context(), "failed to build chat model");
    assert!(err.to_string().contains("OPENAI_API_KEY"));
}
