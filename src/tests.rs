use std::io::Cursor;
use std::sync::{Arc, Mutex};

use anyhow::anyhow;
use async_trait::async_trait;
use futures::TryStreamExt;
use image::{DynamicImage, ImageBuffer, Rgba};
use poem::endpoint::BoxEndpoint;
use poem::http::StatusCode;
use poem::test::{TestClient, TestForm, TestFormField, TestRequestBuilder};
use poem::EndpointExt;
use serde_json::json;
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::controller::FaceclaimController;
use crate::queue::Publisher;
use crate::storage::backends::FileSystemBackend;
use crate::storage::BlobStore;
use crate::utils::direct_client;

const TOKEN: &str = "test-token";
const BUCKET: &str = "pcs.inconnu.app";
const LOG_BUCKET: &str = "inconnu-logs";
const TEST_ID: &str = "__test";

/// Remembers every message instead of delivering it.
#[derive(Default)]
struct RecordingPublisher {
    reject: bool,
    messages: Mutex<Vec<(String, serde_json::Value)>>,
}

impl RecordingPublisher {
    fn messages(&self) -> Vec<(String, serde_json::Value)> {
        self.messages.lock().unwrap().clone()
    }
}

#[async_trait]
impl Publisher for RecordingPublisher {
    async fn publish(&self, topic: &str, data: Vec<u8>) -> anyhow::Result<String> {
        if self.reject {
            return Err(anyhow!("broker unreachable"));
        }

        let payload = serde_json::from_slice(&data)?;
        let mut messages = self.messages.lock().unwrap();
        messages.push((topic.to_string(), payload));
        Ok(messages.len().to_string())
    }
}

struct Environment {
    app: TestClient<BoxEndpoint<'static>>,
    images: Arc<FileSystemBackend>,
    logs: Arc<FileSystemBackend>,
    publisher: Arc<RecordingPublisher>,
}

impl Environment {
    async fn keys(&self, prefix: &str) -> anyhow::Result<Vec<String>> {
        self.images.list(prefix).try_collect().await
    }
}

async fn setup_environment_with(publisher: RecordingPublisher) -> anyhow::Result<Environment> {
    let root = std::env::temp_dir().join(format!("faceclaims-test-{}", crate::utils::new_object_id()));
    let images = Arc::new(FileSystemBackend::open(&root, BUCKET).await?);
    let logs = Arc::new(FileSystemBackend::open(&root, LOG_BUCKET).await?);
    let publisher = Arc::new(publisher);

    let controller = FaceclaimController::new(
        images.clone(),
        logs.clone(),
        publisher.clone(),
        direct_client(),
        None,
    );

    let app = crate::routes::build_app(controller, TOKEN)
        .map_to_response()
        .boxed();

    Ok(Environment {
        app: TestClient::new(app),
        images,
        logs,
        publisher,
    })
}

async fn setup_environment() -> anyhow::Result<Environment> {
    setup_environment_with(RecordingPublisher::default()).await
}

fn test_image() -> Vec<u8> {
    let img = ImageBuffer::from_fn(24, 16, |x, y| Rgba([(x * 10) as u8, (y * 15) as u8, 200, 255]));
    let mut buff = Cursor::new(Vec::new());
    DynamicImage::ImageRgba8(img)
        .write_to(&mut buff, image::ImageFormat::Png)
        .expect("failed to encode test image");
    buff.into_inner()
}

async fn serve(response: ResponseTemplate) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET")).respond_with(response).mount(&server).await;
    server
}

async fn serve_test_image() -> MockServer {
    serve(ResponseTemplate::new(200).set_body_raw(test_image(), "image/png")).await
}

fn upload_payload(charid: &str, image_url: &str) -> serde_json::Value {
    json!({
        "guild": 987654321i64,
        "user": 123456789i64,
        "charid": charid,
        "image_url": image_url,
    })
}

fn with_token<'a>(
    builder: TestRequestBuilder<'a, BoxEndpoint<'static>>,
    token: Option<&str>,
) -> TestRequestBuilder<'a, BoxEndpoint<'static>> {
    match token {
        Some(token) => builder.header("Authorization", token),
        None => builder,
    }
}

fn log_form(filename: &str, content: &str) -> TestForm {
    TestForm::new().field(
        TestFormField::bytes(content.as_bytes().to_vec())
            .name("log_file")
            .filename(filename),
    )
}

#[tokio::test]
async fn test_no_auth_is_rejected_without_side_effects() -> anyhow::Result<()> {
    let env = setup_environment().await?;
    let source = serve_test_image().await;
    let image_url = format!("{}/Nadea-FC0.png", source.uri());

    for token in [None, Some("fake"), Some("Bearer test-token")] {
        with_token(env.app.post("/faceclaim/upload"), token)
            .body_json(&upload_payload(TEST_ID, &image_url))
            .send()
            .await
            .assert_status(StatusCode::UNAUTHORIZED);

        with_token(env.app.post("/faceclaim/upload"), token)
            .body("{not json")
            .send()
            .await
            .assert_status(StatusCode::UNAUTHORIZED);

        with_token(env.app.delete(format!("/faceclaim/delete/{}/all", TEST_ID)), token)
            .send()
            .await
            .assert_status(StatusCode::UNAUTHORIZED);

        with_token(env.app.delete(format!("/faceclaim/delete/{}/42342436ae2.webp", TEST_ID)), token)
            .send()
            .await
            .assert_status(StatusCode::UNAUTHORIZED);

        with_token(env.app.post("/upload_log"), token)
            .multipart(log_form("bot.log", "hello"))
            .send()
            .await
            .assert_status(StatusCode::UNAUTHORIZED);

        with_token(env.app.get("/docs"), token)
            .send()
            .await
            .assert_status(StatusCode::UNAUTHORIZED);
    }

    assert!(env.keys("").await?.is_empty());
    assert!(env.logs.list("").try_collect::<Vec<_>>().await?.is_empty());
    assert!(env.publisher.messages().is_empty());

    Ok(())
}

#[tokio::test]
async fn test_faceclaim_upload() -> anyhow::Result<()> {
    let env = setup_environment().await?;
    let source = serve_test_image().await;
    let image_url = format!("{}/Nadea-FC0.png", source.uri());

    let res = env
        .app
        .post("/faceclaim/upload")
        .header("Authorization", TOKEN)
        .body_json(&upload_payload(TEST_ID, &image_url))
        .send()
        .await;

    res.assert_status_is_ok();
    let url = res.json().await.value().string().to_string();

    assert!(url.starts_with(&format!("https://{}/{}/", BUCKET, TEST_ID)));
    assert!(url.ends_with(".webp"));

    let key = url
        .strip_prefix(&format!("https://{}/", BUCKET))
        .expect("url is not in the bucket");
    assert!(env.images.exists(key).await?);

    let stored = env.images.fetch(key).await?.expect("stored image missing");
    assert_eq!(&stored[..4], b"RIFF");
    assert_eq!(&stored[8..12], b"WEBP");

    let (content_type, metadata) = env.images.describe(key).await?.expect("sidecar missing");
    let metadata = metadata.expect("metadata missing");
    assert_eq!(content_type, "image/webp");
    assert_eq!(metadata.uploader, "123456789");
    assert_eq!(metadata.guild, "987654321");
    assert_eq!(metadata.original, image_url);

    Ok(())
}

#[tokio::test]
async fn test_non_ascii_source_url_is_stored_encoded() -> anyhow::Result<()> {
    let env = setup_environment().await?;
    let source = serve_test_image().await;
    let image_url = format!("{}/Nadéa FC.png", source.uri());

    let res = env
        .app
        .post("/faceclaim/upload")
        .header("Authorization", TOKEN)
        .body_json(&upload_payload(TEST_ID, &image_url))
        .send()
        .await;

    res.assert_status_is_ok();
    let url = res.json().await.value().string().to_string();
    let key = url
        .strip_prefix(&format!("https://{}/", BUCKET))
        .expect("url is not in the bucket");

    let (_, metadata) = env.images.describe(key).await?.expect("sidecar missing");
    let original = metadata.expect("metadata missing").original;
    assert_eq!(original, format!("{}/Nad%C3%A9a%20FC.png", source.uri()));
    assert!(original.is_ascii());

    let requests = source.received_requests().await.expect("recording disabled");
    assert_eq!(requests[0].url.path(), "/Nad%C3%A9a%20FC.png");

    Ok(())
}

#[tokio::test]
async fn test_negative_ids_are_accepted() -> anyhow::Result<()> {
    let env = setup_environment().await?;
    let source = serve_test_image().await;
    let image_url = format!("{}/Nadea-FC0.png", source.uri());

    let res = env
        .app
        .post("/faceclaim/upload")
        .header("Authorization", TOKEN)
        .body_json(&json!({
            "guild": -5,
            "user": -7,
            "charid": TEST_ID,
            "image_url": image_url,
        }))
        .send()
        .await;

    res.assert_status_is_ok();
    let url = res.json().await.value().string().to_string();
    let key = url
        .strip_prefix(&format!("https://{}/", BUCKET))
        .expect("url is not in the bucket");

    let (_, metadata) = env.images.describe(key).await?.expect("sidecar missing");
    let metadata = metadata.expect("metadata missing");
    assert_eq!(metadata.uploader, "-7");
    assert_eq!(metadata.guild, "-5");

    Ok(())
}

#[tokio::test]
async fn test_identical_uploads_get_distinct_keys() -> anyhow::Result<()> {
    let env = setup_environment().await?;
    let source = serve_test_image().await;
    let image_url = format!("{}/Nadea-FC0.png", source.uri());

    let mut urls = vec![];
    for _ in 0..2 {
        let res = env
            .app
            .post("/faceclaim/upload")
            .header("Authorization", TOKEN)
            .body_json(&upload_payload(TEST_ID, &image_url))
            .send()
            .await;

        res.assert_status_is_ok();
        urls.push(res.json().await.value().string().to_string());
    }

    assert_ne!(urls[0], urls[1]);
    assert_eq!(env.keys(&format!("{}/", TEST_ID)).await?.len(), 2);

    Ok(())
}

#[tokio::test]
async fn test_malformed_upload_is_client_error() -> anyhow::Result<()> {
    let env = setup_environment().await?;

    let bad_bodies = [
        json!({"guild": "abc", "user": 1, "charid": TEST_ID, "image_url": "http://x/y.png"}),
        json!({"guild": 1, "user": 1, "charid": TEST_ID}),
        json!({"guild": 1, "user": 1, "charid": "", "image_url": "http://x/y.png"}),
        json!({"guild": 1, "user": 1, "charid": "a/b", "image_url": "http://x/y.png"}),
        json!({"guild": 1, "user": 1, "charid": TEST_ID, "image_url": ""}),
    ];

    for body in bad_bodies {
        env.app
            .post("/faceclaim/upload")
            .header("Authorization", TOKEN)
            .body_json(&body)
            .send()
            .await
            .assert_status(StatusCode::BAD_REQUEST);
    }

    assert!(env.keys("").await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_bad_source_is_upstream_error() -> anyhow::Result<()> {
    let env = setup_environment().await?;
    let not_image = serve(ResponseTemplate::new(200).set_body_raw("<html></html>", "text/html")).await;
    let missing = serve(ResponseTemplate::new(404)).await;

    let sources = [
        format!("{}/page.html", not_image.uri()),
        format!("{}/gone.png", missing.uri()),
        "http://127.0.0.1:1/refused.png".to_string(),
        "not a url".to_string(),
    ];

    for image_url in sources {
        env.app
            .post("/faceclaim/upload")
            .header("Authorization", TOKEN)
            .body_json(&upload_payload(TEST_ID, &image_url))
            .send()
            .await
            .assert_status(StatusCode::BAD_GATEWAY);
    }

    assert!(env.keys("").await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_delete_all_publishes_group_message() -> anyhow::Result<()> {
    let env = setup_environment().await?;

    env.app
        .delete(format!("/faceclaim/delete/{}/all", TEST_ID))
        .header("Authorization", TOKEN)
        .send()
        .await
        .assert_status_is_ok();

    assert_eq!(
        env.publisher.messages(),
        vec![("delete-faceclaim-group".to_string(), json!({ "charid": TEST_ID }))],
    );

    Ok(())
}

#[tokio::test]
async fn test_single_delete_publishes_key() -> anyhow::Result<()> {
    let env = setup_environment().await?;

    env.app
        .delete(format!("/faceclaim/delete/{}/42342436ae2.webp", TEST_ID))
        .header("Authorization", TOKEN)
        .send()
        .await
        .assert_status_is_ok();

    assert_eq!(
        env.publisher.messages(),
        vec![(
            "delete-single-faceclaim".to_string(),
            json!({ "key": format!("{}/42342436ae2.webp", TEST_ID) }),
        )],
    );

    Ok(())
}

#[tokio::test]
async fn test_rejected_publish_is_server_error() -> anyhow::Result<()> {
    let env = setup_environment_with(RecordingPublisher {
        reject: true,
        ..Default::default()
    })
    .await?;

    env.app
        .delete(format!("/faceclaim/delete/{}/all", TEST_ID))
        .header("Authorization", TOKEN)
        .send()
        .await
        .assert_status(StatusCode::INTERNAL_SERVER_ERROR);

    Ok(())
}

#[tokio::test]
async fn test_upload_log_overwrites() -> anyhow::Result<()> {
    let env = setup_environment().await?;

    for content in ["first run", "second run"] {
        let res = env
            .app
            .post("/upload_log")
            .header("Authorization", TOKEN)
            .multipart(log_form("bot.log", content))
            .send()
            .await;

        res.assert_status_is_ok();
        res.assert_text("").await;
    }

    let keys: Vec<String> = env.logs.list("").try_collect().await?;
    assert_eq!(keys, vec!["bot.log"]);
    assert_eq!(env.logs.fetch("bot.log").await?.as_deref(), Some(&b"second run"[..]));

    let (content_type, metadata) = env.logs.describe("bot.log").await?.expect("sidecar missing");
    assert_eq!(content_type, "text/plain");
    assert!(metadata.is_none());

    Ok(())
}

#[tokio::test]
async fn test_upload_log_requires_file() -> anyhow::Result<()> {
    let env = setup_environment().await?;

    env.app
        .post("/upload_log")
        .header("Authorization", TOKEN)
        .multipart(TestForm::new().field(TestFormField::bytes(b"value".to_vec()).name("other")))
        .send()
        .await
        .assert_status(StatusCode::BAD_REQUEST);

    assert!(env.logs.list("").try_collect::<Vec<_>>().await?.is_empty());
    Ok(())
}
