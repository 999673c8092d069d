use std::io::Cursor;
use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode, header};
use flate2::Compression;
use flate2::write::GzEncoder;
use http_body_util::BodyExt;
use sha1::{Digest, Sha1};
use tower::ServiceExt;
use url::Url;

use npmgoproxy::config::Config;
use npmgoproxy::proxy::ModProxy;
use npmgoproxy::registry::{ABBREVIATED_METADATA, FULL_METADATA};

// ============================================================================
// Fixtures
// ============================================================================

const DEMO_FILES: &[(&str, &str)] = &[
    ("package/package.json", r#"{"name":"demo","version":"3.0.0"}"#),
    ("package/index.js", "module.exports = 42;\n"),
];

const ALPINE_FILES: &[(&str, &str)] = &[
    ("package/package.json", r#"{"name":"alpinejs","version":"3.3.3"}"#),
    ("package/dist/cdn.js", "window.Alpine = {};\n"),
    ("package/builds/module.js", "export default {};\n"),
];

const ALPINE_ZIP: &str = "/gohugo.io/npmjs/alpinejs/v3/@v/v3.3.3.zip";

fn tarball(files: &[(&str, &str)]) -> Vec<u8> {
    let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
    for &(path, body) in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(body.len() as u64);
        header.set_mode(0o644);
        header.set_entry_type(tar::EntryType::Regular);
        builder.append_data(&mut header, path, body.as_bytes()).unwrap();
    }
    builder.into_inner().unwrap().finish().unwrap()
}

fn sha1_hex(bytes: &[u8]) -> String {
    hex::encode(Sha1::digest(bytes))
}

/// Abbreviated documents carry `modified`, full ones a `time` map.
fn demo_document(base: &str, shasum: &str, full: bool) -> String {
    let mut document = serde_json::json!({
        "name": "demo",
        "modified": "2022-01-10T13:09:42.552Z",
        "dist-tags": { "latest": "3.0.0" },
        "time": {
            "modified": "2022-01-10T13:09:42.552Z",
            "3.0.0": "2021-01-02T03:04:05.678Z"
        },
        "versions": {
            "3.0.0": {
                "name": "demo",
                "version": "3.0.0",
                "dependencies": { "left-pad": "^1.1.0" },
                "dist": {
                    "shasum": shasum,
                    "tarball": format!("{base}/demo/-/demo-3.0.0.tgz")
                }
            },
            "1.0.0": {
                "name": "demo",
                "version": "1.0.0",
                "dist": {
                    "shasum": shasum,
                    "tarball": format!("{base}/demo/-/demo-1.0.0.tgz")
                }
            }
        }
    });
    let fields = document.as_object_mut().unwrap();
    if full {
        fields.remove("modified");
    } else {
        fields.remove("time");
    }
    document.to_string()
}

fn simple_document(name: &str, versions: &[&str], base: &str) -> String {
    let versions: serde_json::Map<String, serde_json::Value> = versions
        .iter()
        .map(|version| {
            (
                version.to_string(),
                serde_json::json!({
                    "name": name,
                    "version": version,
                    "dist": {
                        "shasum": "0000000000000000000000000000000000000000",
                        "tarball": format!("{base}/{name}/-/{name}-{version}.tgz")
                    }
                }),
            )
        })
        .collect();
    serde_json::json!({ "name": name, "versions": versions }).to_string()
}

fn alpine_document(base: &str, shasum: &str) -> String {
    serde_json::json!({
        "name": "alpinejs",
        "modified": "2021-09-02T10:11:12.000Z",
        "dist-tags": { "latest": "3.3.3" },
        "versions": {
            "3.3.3": {
                "name": "alpinejs",
                "version": "3.3.3",
                "dependencies": { "@vue/reactivity": "^3.0.2" },
                "dist": {
                    "shasum": shasum,
                    "tarball": format!("{base}/alpinejs/-/alpinejs-3.3.3.tgz")
                }
            }
        }
    })
    .to_string()
}

async fn mock_document(server: &mut mockito::Server, path: &str, accept: &str, body: String) {
    server
        .mock("GET", path)
        .match_header("accept", accept)
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(body)
        .create_async()
        .await;
}

struct Harness {
    server: mockito::ServerGuard,
}

impl Harness {
    async fn new() -> Self {
        let mut server = mockito::Server::new_async().await;
        let demo = tarball(DEMO_FILES);
        let url = server.url();

        let shasum = sha1_hex(&demo);
        let abbreviated = demo_document(&url, &shasum, false);
        mock_document(&mut server, "/demo", ABBREVIATED_METADATA, abbreviated).await;
        mock_document(&mut server, "/demo", FULL_METADATA, demo_document(&url, &shasum, true)).await;

        let trio = simple_document("trio", &["1.0.0", "2.0.0", "1.5.0"], &url);
        mock_document(&mut server, "/trio", ABBREVIATED_METADATA, trio).await;

        let left_pad = simple_document("left-pad", &["1.1.0", "1.3.0", "2.0.0"], &url);
        mock_document(&mut server, "/left-pad", ABBREVIATED_METADATA, left_pad).await;

        let tampered = demo_document(&url, &sha1_hex(b"something else"), false);
        mock_document(&mut server, "/tampered", ABBREVIATED_METADATA, tampered).await;

        let alpine = tarball(ALPINE_FILES);
        let alpine_document = alpine_document(&url, &sha1_hex(&alpine));
        mock_document(&mut server, "/alpinejs", ABBREVIATED_METADATA, alpine_document).await;
        let reactivity = simple_document("@vue/reactivity", &["3.0.1", "3.0.2", "3.2.0", "4.0.0"], &url);
        mock_document(&mut server, "/@vue%2Freactivity", ABBREVIATED_METADATA, reactivity).await;
        server
            .mock("GET", "/alpinejs/-/alpinejs-3.3.3.tgz")
            .with_status(200)
            .with_body(&alpine)
            .create_async()
            .await;

        server
            .mock("GET", "/demo/-/demo-3.0.0.tgz")
            .with_status(200)
            .with_body(&demo)
            .create_async()
            .await;
        server
            .mock("GET", "/nope")
            .with_status(404)
            .with_body(r#"{"error":"Not found"}"#)
            .create_async()
            .await;
        server
            .mock("GET", "/flaky")
            .with_status(500)
            .create_async()
            .await;

        Self { server }
    }

    fn config(&self, expose_errors: bool) -> Config {
        let mut config = Config::default();
        config.upstream.url = Url::parse(&self.server.url()).unwrap();
        config.upstream.reliability.retry.enabled = false;
        config.server.expose_errors = expose_errors;
        config
    }

    fn router(&self, expose_errors: bool) -> Router {
        ModProxy::new(Arc::new(self.config(expose_errors))).unwrap().router()
    }
}

fn request(method: Method, path: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(path)
        .body(Body::empty())
        .unwrap()
}

async fn send(router: Router, method: Method, path: &str) -> (StatusCode, axum::http::HeaderMap, Vec<u8>) {
    let response = router.oneshot(request(method, path)).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body = response.into_body().collect().await.unwrap().to_bytes().to_vec();
    (status, headers, body)
}

async fn get(router: Router, path: &str) -> (StatusCode, axum::http::HeaderMap, Vec<u8>) {
    send(router, Method::GET, path).await
}

fn text(body: &[u8]) -> &str {
    std::str::from_utf8(body).unwrap()
}

// ============================================================================
// Endpoints
// ============================================================================

#[tokio::test]
async fn health_endpoint_is_up() {
    let harness = Harness::new().await;
    let (status, _, body) = get(harness.router(true), "/up").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(text(&body), "ok\n");
}

#[tokio::test]
async fn list_returns_ascending_versions() {
    let harness = Harness::new().await;
    let (status, headers, body) = get(harness.router(true), "/gohugo.io/npmjs/trio/@v/list").await;
    assert_eq!(status, StatusCode::OK);
    assert!(
        headers[header::CONTENT_TYPE]
            .to_str()
            .unwrap()
            .starts_with("text/plain")
    );
    assert_eq!(text(&body), "v1.0.0\nv1.5.0\nv2.0.0");
}

#[tokio::test]
async fn info_reports_version_and_publish_time() {
    let harness = Harness::new().await;
    let (status, headers, body) =
        get(harness.router(true), "/gohugo.io/npmjs/demo/v3/@v/v3.0.0.info").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers[header::CONTENT_TYPE], "application/json");

    let info: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(info["Version"], "v3.0.0");
    assert_eq!(info["Time"], "2021-01-02T03:04:05.678Z");
}

#[tokio::test]
async fn manifest_requires_resolved_dependencies() {
    let harness = Harness::new().await;
    let (status, _, body) = get(harness.router(true), "/gohugo.io/npmjs/demo/v3/@v/v3.0.0.mod").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        text(&body),
        "module gohugo.io/npmjs/demo/v3\n\ngo 1.17\n\nrequire (\n\tgohugo.io/npmjs/left-pad v1.3.0\n)\n"
    );
}

#[tokio::test]
async fn manifest_without_dependencies() {
    let harness = Harness::new().await;
    let (status, _, body) = get(harness.router(true), "/gohugo.io/npmjs/demo/@v/v1.0.0.mod").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(text(&body), "module gohugo.io/npmjs/demo\n\ngo 1.17\n");
}

#[tokio::test]
async fn archive_is_a_module_zip() {
    let harness = Harness::new().await;
    let (status, headers, body) =
        get(harness.router(true), "/gohugo.io/npmjs/demo/v3/@v/v3.0.0.zip").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers[header::CONTENT_TYPE], "application/zip");
    assert_eq!(headers[header::CONTENT_LENGTH], body.len().to_string().as_str());
    assert_eq!(headers[header::LAST_MODIFIED], "Mon, 10 Jan 2022 13:09:42 GMT");

    let archive = zip::ZipArchive::new(Cursor::new(body)).unwrap();
    let mut names: Vec<&str> = archive.file_names().collect();
    names.sort_unstable();
    assert_eq!(
        names,
        vec![
            "gohugo.io/npmjs/demo/v3@v3.0.0/package/index.js",
            "gohugo.io/npmjs/demo/v3@v3.0.0/package/package.json",
        ]
    );
}

#[tokio::test]
async fn alpinejs_requires_vue_reactivity() {
    let harness = Harness::new().await;
    let (status, _, body) =
        get(harness.router(true), "/gohugo.io/npmjs/alpinejs/v3/@v/v3.3.3.mod").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        text(&body),
        "module gohugo.io/npmjs/alpinejs/v3\n\ngo 1.17\n\n\
         require (\n\
         \tgohugo.io/npmjs/___vue/reactivity/v3 v3.2.0\n\
         )\n"
    );
}

#[tokio::test]
async fn alpinejs_archive_is_prefixed_with_the_v3_module() {
    let harness = Harness::new().await;
    let (status, _, body) = get(harness.router(true), ALPINE_ZIP).await;
    assert_eq!(status, StatusCode::OK, "{}", String::from_utf8_lossy(&body));

    let archive = zip::ZipArchive::new(Cursor::new(body)).unwrap();
    let mut names: Vec<&str> = archive.file_names().collect();
    names.sort_unstable();
    assert_eq!(
        names,
        vec![
            "gohugo.io/npmjs/alpinejs/v3@v3.3.3/package/builds/module.js",
            "gohugo.io/npmjs/alpinejs/v3@v3.3.3/package/dist/cdn.js",
            "gohugo.io/npmjs/alpinejs/v3@v3.3.3/package/package.json",
        ]
    );
}

#[tokio::test]
async fn staging_is_removed_once_the_archive_is_gone() {
    let harness = Harness::new().await;
    let root = tempfile::tempdir().unwrap();
    let mut config = harness.config(true);
    config.storage.staging_dir = Some(root.path().to_path_buf());
    let router = ModProxy::new(Arc::new(config)).unwrap().router();
    let leftovers = || std::fs::read_dir(root.path()).unwrap().count();

    let (status, _, _) = get(router.clone(), ALPINE_ZIP).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(leftovers(), 0);

    let response = router.oneshot(request(Method::GET, ALPINE_ZIP)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(leftovers(), 1);
    drop(response);
    assert_eq!(leftovers(), 0);
}

// ============================================================================
// Failures
// ============================================================================

#[tokio::test]
async fn delete_is_not_allowed() {
    let harness = Harness::new().await;
    let (status, _, _) = send(harness.router(true), Method::DELETE, "/gohugo.io/npmjs/trio/@v/list").await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn unknown_package_is_not_found() {
    let harness = Harness::new().await;
    let (status, _, _) = get(harness.router(true), "/gohugo.io/npmjs/nope/@v/list").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn unknown_version_is_not_found() {
    let harness = Harness::new().await;
    let (status, _, body) = get(harness.router(true), "/gohugo.io/npmjs/demo/v3/@v/v3.9.9.info").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(text(&body).starts_with("fetching package version: "), "{}", text(&body));
}

#[tokio::test]
async fn version_under_the_wrong_major_is_not_found() {
    let harness = Harness::new().await;
    let (status, _, _) = get(harness.router(true), "/gohugo.io/npmjs/demo/@v/v3.0.0.info").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn base_path_alone_is_not_found() {
    let harness = Harness::new().await;
    for path in ["/gohugo.io/npmjs/@v/list", "/", "/github.com/foo/bar/@v/list"] {
        let (status, _, _) = get(harness.router(true), path).await;
        assert_eq!(status, StatusCode::NOT_FOUND, "{path}");
    }
}

#[tokio::test]
async fn malformed_escapes_are_bad_requests() {
    let harness = Harness::new().await;
    let (status, _, _) = get(harness.router(true), "/gohugo.io/npmjs/Demo/@v/list").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn checksum_mismatch_is_a_bad_gateway() {
    let mut harness = Harness::new().await;
    harness
        .server
        .mock("GET", "/demo/-/demo-1.0.0.tgz")
        .with_status(200)
        .with_body(b"not the published tarball")
        .create_async()
        .await;

    let (status, _, body) = get(harness.router(true), "/gohugo.io/npmjs/tampered/@v/v1.0.0.zip").await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert!(text(&body).contains("checksum mismatch"), "{}", text(&body));
}

#[tokio::test]
async fn hidden_errors_only_name_the_step() {
    let harness = Harness::new().await;
    let (status, _, body) = get(harness.router(false), "/gohugo.io/npmjs/flaky/@v/list").await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(text(&body), "fetching package\n");
}
