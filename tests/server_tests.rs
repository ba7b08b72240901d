//! Handler-level tests: drive the WebDAV server with raw `http::Request`s,
//! no network involved.

use dav_server::body::Body;
use headers::{Authorization, HeaderMapExt};
use http::{Request, StatusCode};
use http_body_util::BodyExt;
use webdav_fs::auth::{AuthError, BasicAuth, BearerAuth, MultiAuth, RecordingAuth};
use webdav_fs::{DavServer, LocalFs};

fn server(dir: &tempfile::TempDir) -> DavServer {
    let _ = env_logger::builder().is_test(true).try_init();
    DavServer::builder(LocalFs::new(dir.path())).build()
}

fn request(method: &str, uri: &str, body: impl Into<Body>) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(body.into())
        .unwrap()
}

async fn body_string(resp: http::Response<Body>) -> String {
    let collected = resp.into_body().collect().await.unwrap();
    String::from_utf8(collected.to_bytes().to_vec()).unwrap_or_default()
}

#[tokio::test]
async fn propfind_lists_directory_contents() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("report.txt"), b"twelve bytes").unwrap();
    std::fs::create_dir(dir.path().join("archive")).unwrap();
    let dav = server(&dir);

    let mut req = request("PROPFIND", "/", Body::empty());
    req.headers_mut().insert("Depth", "1".parse().unwrap());
    let resp = dav.handle(req).await;
    assert_eq!(resp.status(), StatusCode::MULTI_STATUS);

    let text = body_string(resp).await;
    assert!(text.contains("report.txt"));
    assert!(text.contains("archive"));
    assert!(text.contains("collection"));
    assert!(text.contains("12"));
}

#[tokio::test]
async fn put_then_get_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let dav = server(&dir);

    let resp = dav
        .handle(request("PUT", "/hello.txt", Body::from(bytes::Bytes::from("hello world"))))
        .await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    assert_eq!(
        std::fs::read(dir.path().join("hello.txt")).unwrap(),
        b"hello world"
    );

    let resp = dav.handle(request("GET", "/hello.txt", Body::empty())).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_string(resp).await, "hello world");
}

#[tokio::test]
async fn get_missing_resource_is_404() {
    let dir = tempfile::tempdir().unwrap();
    let dav = server(&dir);
    let resp = dav.handle(request("GET", "/nope.txt", Body::empty())).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn mkcol_then_delete() {
    let dir = tempfile::tempdir().unwrap();
    let dav = server(&dir);

    let resp = dav.handle(request("MKCOL", "/photos/", Body::empty())).await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    assert!(dir.path().join("photos").is_dir());

    // MKCOL on an existing collection must not succeed.
    let resp = dav.handle(request("MKCOL", "/photos/", Body::empty())).await;
    assert_ne!(resp.status(), StatusCode::CREATED);

    let resp = dav.handle(request("DELETE", "/photos/", Body::empty())).await;
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);
    assert!(!dir.path().join("photos").exists());
}

#[tokio::test]
async fn move_renames_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("old.txt"), b"data").unwrap();
    let dav = server(&dir);

    let mut req = request("MOVE", "/old.txt", Body::empty());
    req.headers_mut()
        .insert("Destination", "/new.txt".parse().unwrap());
    let resp = dav.handle(req).await;
    assert!(resp.status().is_success(), "MOVE failed: {}", resp.status());

    assert!(!dir.path().join("old.txt").exists());
    assert_eq!(std::fs::read(dir.path().join("new.txt")).unwrap(), b"data");
}

#[tokio::test]
async fn move_directory_with_trailing_slash_destination() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir(dir.path().join("sub")).unwrap();
    std::fs::write(dir.path().join("sub/f.txt"), b"x").unwrap();
    let dav = server(&dir);

    let mut req = request("MOVE", "/sub/", Body::empty());
    req.headers_mut()
        .insert("Destination", "/sub2/".parse().unwrap());
    let resp = dav.handle(req).await;
    assert!(resp.status().is_success(), "MOVE failed: {}", resp.status());
    assert!(!dir.path().join("sub").exists());
    assert_eq!(std::fs::read(dir.path().join("sub2/f.txt")).unwrap(), b"x");
}

#[tokio::test]
async fn move_refuses_overwrite_when_asked() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("a.txt"), b"a").unwrap();
    std::fs::write(dir.path().join("b.txt"), b"b").unwrap();
    let dav = server(&dir);

    let mut req = request("MOVE", "/a.txt", Body::empty());
    req.headers_mut()
        .insert("Destination", "/b.txt".parse().unwrap());
    req.headers_mut().insert("Overwrite", "F".parse().unwrap());
    let resp = dav.handle(req).await;
    assert_eq!(resp.status(), StatusCode::PRECONDITION_FAILED);
    assert_eq!(std::fs::read(dir.path().join("b.txt")).unwrap(), b"b");
}

#[tokio::test]
async fn missing_credentials_get_a_challenge() {
    let dir = tempfile::tempdir().unwrap();
    let dav = DavServer::builder(LocalFs::new(dir.path()))
        .auth(BasicAuth::new("alice", "secret").realm("files"))
        .build();

    let resp = dav.handle(request("GET", "/x", Body::empty())).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(
        resp.headers().get("WWW-Authenticate").unwrap(),
        "Basic realm=\"files\""
    );
}

#[tokio::test]
async fn valid_credentials_pass_through() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("a.txt"), b"ok").unwrap();
    let dav = DavServer::builder(LocalFs::new(dir.path()))
        .auth(BasicAuth::new("alice", "secret"))
        .build();

    let mut req = request("GET", "/a.txt", Body::empty());
    req.headers_mut()
        .typed_insert(Authorization::basic("alice", "secret"));
    let resp = dav.handle(req).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let mut req = request("GET", "/a.txt", Body::empty());
    req.headers_mut()
        .typed_insert(Authorization::basic("alice", "wrong"));
    let resp = dav.handle(req).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn multi_auth_accepts_either_scheme() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("a.txt"), b"ok").unwrap();
    let multi = MultiAuth::new(vec![
        Box::new(BearerAuth::new("tok-1")),
        Box::new(BasicAuth::new("bob", "pw").realm("backup")),
    ]);
    let dav = DavServer::builder(LocalFs::new(dir.path())).auth(multi).build();

    let mut req = request("GET", "/a.txt", Body::empty());
    req.headers_mut()
        .typed_insert(Authorization::bearer("tok-1").unwrap());
    assert_eq!(dav.handle(req).await.status(), StatusCode::OK);

    let mut req = request("GET", "/a.txt", Body::empty());
    req.headers_mut()
        .typed_insert(Authorization::basic("bob", "pw"));
    assert_eq!(dav.handle(req).await.status(), StatusCode::OK);

    // Challenge comes from the last provider in the chain.
    let resp = dav.handle(request("GET", "/a.txt", Body::empty())).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(
        resp.headers().get("WWW-Authenticate").unwrap(),
        "Basic realm=\"backup\""
    );
}

#[tokio::test]
async fn empty_provider_chain_gets_a_plain_401() {
    let dir = tempfile::tempdir().unwrap();
    let dav = DavServer::builder(LocalFs::new(dir.path()))
        .auth(MultiAuth::new(Vec::new()))
        .build();

    let resp = dav.handle(request("GET", "/x", Body::empty())).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert!(resp.headers().get("WWW-Authenticate").is_none());
}

#[tokio::test]
async fn recording_auth_observes_handler_traffic() {
    let dir = tempfile::tempdir().unwrap();
    let recorder = std::sync::Arc::new(RecordingAuth::new(BasicAuth::new("u", "p")));
    let dav = DavServer::builder(LocalFs::new(dir.path()))
        .auth(recorder.clone())
        .build();

    let mut req = request("PROPFIND", "/", Body::empty());
    req.headers_mut().typed_insert(Authorization::basic("u", "p"));
    dav.handle(req).await;
    dav.handle(request("PROPFIND", "/", Body::empty())).await;

    let attempts = recorder.attempts();
    assert_eq!(attempts.len(), 2);
    assert_eq!(attempts[0].principal.as_deref(), Some("u"));
    assert_eq!(attempts[1].error, Some(AuthError::Missing));
}
