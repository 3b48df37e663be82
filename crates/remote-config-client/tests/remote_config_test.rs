use forkful_config_and_utils::FirebaseApp;
use remote_config_client::{ClientSecretTable, RemoteConfigClient, RemoteConfigError};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{header, header_exists, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const INSTALL_PATH: &str = "/v1/projects/test-project/installations";
const FETCH_PATH: &str = "/v1/projects/1234/namespaces/firebase:fetch";

fn test_app() -> FirebaseApp {
    FirebaseApp {
        package_name: "com.example.app".into(),
        cert_sha1: "ABCDEF".into(),
        api_key: "key".into(),
        project_id: "test-project".into(),
        project_number: "1234".into(),
        app_id: "1:1234:android:abc".into(),
    }
}

fn client_for(server: &MockServer) -> RemoteConfigClient {
    RemoteConfigClient::with_base_urls(test_app(), &server.uri(), &server.uri()).unwrap()
}

#[tokio::test]
async fn test_fetch_performs_install_then_fetch() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(INSTALL_PATH))
        .and(header("X-Android-Package", "com.example.app"))
        .and(header("X-Android-Cert", "ABCDEF"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "fid": "fid123",
            "authToken": {"token": "at123"}
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path(FETCH_PATH))
        .and(header("X-Android-Package", "com.example.app"))
        .and(header("X-Android-Cert", "ABCDEF"))
        .and(header("X-Goog-Firebase-Installations-Id", "fid123"))
        .and(header("X-Goog-Firebase-Installations-Auth", "at123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "state": "UPDATE",
            "templateVersion": 1,
            "entries": {"client_secrets": "{\"MJ\":\"\",\"AT\":\"{\\\"android\\\":\\\"sec\\\"}\"}"}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let resp = client_for(&server)
        .fetch(&CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(resp.state, "UPDATE");
    assert_eq!(resp.template_version, "1");

    let table = ClientSecretTable::from_response(&resp).unwrap();
    let candidates = vec!["AT".to_string(), "MJ".to_string()];
    assert_eq!(table.lookup(&candidates, "android"), Some(("AT", "sec")));
}

#[tokio::test]
async fn test_install_failure_skips_fetch() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(INSTALL_PATH))
        .respond_with(ResponseTemplate::new(500).set_body_string("nope"))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path(FETCH_PATH))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let err = client_for(&server)
        .fetch(&CancellationToken::new())
        .await
        .unwrap_err();

    match err {
        RemoteConfigError::Status(failure) => {
            assert_eq!(failure.status, 500);
            assert_eq!(failure.method, "POST");
            assert!(failure.url.ends_with("/installations"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_fetch_failure_is_transport_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(INSTALL_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "fid": "fid123",
            "authToken": {"token": "at123"}
        })))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path(FETCH_PATH))
        .and(header_exists("X-Goog-Firebase-Installations-Auth"))
        .respond_with(ResponseTemplate::new(403).set_body_string("denied"))
        .mount(&server)
        .await;

    let err = client_for(&server)
        .fetch(&CancellationToken::new())
        .await
        .unwrap_err();

    assert_eq!(err.code(), "transport");
    assert!(err.to_string().contains("HTTP 403: denied"));
}

#[tokio::test]
async fn test_cancelled_fetch() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(INSTALL_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .set_delay(std::time::Duration::from_secs(10))
                .set_body_json(json!({"fid": "f", "authToken": {"token": "t"}})),
        )
        .mount(&server)
        .await;

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let err = client_for(&server).fetch(&cancel).await.unwrap_err();
    assert!(matches!(err, RemoteConfigError::Cancelled));
}
