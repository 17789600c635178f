use flate2::{write::GzEncoder, Compression};
use safedate_updater::{
    Capabilities, DirectReplace, HttpFetcher, KeyPair, ReleaseMetadata, UpdateConfig,
    UpdateOutcome, UpdateStatus, Updater, UpdaterError,
};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::tempdir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn gzip(data: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

fn signed_release(pair: &KeyPair, version: &str, content: &[u8], url: &str) -> ReleaseMetadata {
    let checksum = safedate_updater::checksum(content).unwrap();
    ReleaseMetadata {
        version: version.to_string(),
        signature: pair
            .sign(&safedate_updater::signed_message(version, &checksum))
            .unwrap(),
        checksum,
        download_url: url.to_string(),
    }
}

fn install(dir: &Path) -> PathBuf {
    let target = dir.join("myapp");
    fs::write(&target, b"old-binary").unwrap();
    target
}

fn no_restart() -> Capabilities {
    Capabilities::system().with_exec(|command| panic!("unexpected exec of {:?}", command.get_program()))
}

async fn serve_metadata(server: &MockServer, body: Vec<u8>) {
    Mock::given(method("GET"))
        .and(path("/releases/metadata.json"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "application/json"))
        .mount(server)
        .await;
}

#[tokio::test]
async fn updates_from_relative_download_url() {
    let server = MockServer::start().await;
    let pair = KeyPair::generate();
    let metadata = signed_release(&pair, "v2.0.0", b"new-binary", "bin/myapp-v2.0.0.gz");
    serve_metadata(&server, serde_json::to_vec(&metadata).unwrap()).await;
    Mock::given(method("GET"))
        .and(path("/releases/bin/myapp-v2.0.0.gz"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(gzip(b"new-binary")))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempdir().unwrap();
    let target = install(dir.path());
    let config = UpdateConfig::new(format!("{}/releases/metadata.json", server.uri()), "v1.9.0")
        .with_public_key(pair.public_key_bytes())
        .with_target_path(&target);
    let updater = Updater::new(HttpFetcher::builder().build().unwrap(), config)
        .with_strategy(DirectReplace)
        .with_capabilities(no_restart());

    let outcome = updater.update_if_newer().await.unwrap();

    assert_eq!(
        outcome,
        UpdateOutcome::Replaced {
            version: "v2.0.0".into(),
            target: target.clone()
        }
    );
    assert_eq!(fs::read(&target).unwrap(), b"new-binary");
    assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
}

#[tokio::test]
async fn missing_artifact_is_a_transport_error() {
    let server = MockServer::start().await;
    let pair = KeyPair::generate();
    let metadata = signed_release(&pair, "v2.0.0", b"new-binary", "missing.gz");
    serve_metadata(&server, serde_json::to_vec(&metadata).unwrap()).await;
    Mock::given(method("GET"))
        .and(path("/releases/missing.gz"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let dir = tempdir().unwrap();
    let target = install(dir.path());
    let config = UpdateConfig::new(format!("{}/releases/metadata.json", server.uri()), "v1.9.0")
        .with_public_key(pair.public_key_bytes())
        .with_target_path(&target);
    let updater = Updater::new(HttpFetcher::builder().build().unwrap(), config)
        .with_strategy(DirectReplace)
        .with_capabilities(no_restart());

    let err = updater.update_if_newer().await.unwrap_err();

    assert!(matches!(err, UpdaterError::Transport(_)), "unexpected error: {err}");
    assert_eq!(fs::read(&target).unwrap(), b"old-binary");
    assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
}

#[tokio::test]
async fn malformed_metadata_is_a_parse_error() {
    let server = MockServer::start().await;
    serve_metadata(&server, br#"{"version": "v2.0.0", "sha256": "#.to_vec()).await;

    let config = UpdateConfig::new(format!("{}/releases/metadata.json", server.uri()), "v1.9.0");
    let updater = Updater::new(HttpFetcher::builder().build().unwrap(), config);

    let err = updater.has_newer().await.unwrap_err();
    assert!(matches!(err, UpdaterError::Parse(_)), "unexpected error: {err}");
}

#[tokio::test]
async fn metadata_server_error_is_a_transport_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/releases/metadata.json"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let config = UpdateConfig::new(format!("{}/releases/metadata.json", server.uri()), "v1.9.0");
    let updater = Updater::new(HttpFetcher::builder().build().unwrap(), config);

    let err = updater.has_newer().await.unwrap_err();
    assert!(matches!(err, UpdaterError::Transport(_)));
}

#[tokio::test]
async fn older_release_is_not_offered() {
    let server = MockServer::start().await;
    let metadata = signed_release(&KeyPair::generate(), "v1.8.9", b"old", "myapp.gz");
    serve_metadata(&server, serde_json::to_vec(&metadata).unwrap()).await;

    let config = UpdateConfig::new(format!("{}/releases/metadata.json", server.uri()), "v1.9.0");
    let updater = Updater::new(HttpFetcher::builder().build().unwrap(), config);

    assert_eq!(updater.has_newer().await.unwrap(), UpdateStatus::UpToDate);
}
