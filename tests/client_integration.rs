//! HTTP config source against a mock Apollo server.

use std::path::PathBuf;

use lapollo_agent::client::{ConfigSource, FetchError, FetchOutcome, HttpConfigSource};
use lapollo_agent::config::AgentConfig;
use lapollo_agent::sync::NamespaceTarget;

mod common;

fn source(host: String) -> HttpConfigSource {
    let config = AgentConfig {
        host,
        ip: Some("10.0.0.7".into()),
        ..AgentConfig::default()
    };
    HttpConfigSource::new(&config).unwrap()
}

fn target() -> NamespaceTarget {
    NamespaceTarget {
        app_id: "shop".into(),
        cluster: "default".into(),
        namespace: "application".into(),
        directory: PathBuf::from("/srv/shop"),
    }
}

#[tokio::test]
async fn test_fetch_cached_returns_snapshot() {
    let body = r#"{"db.host":"10.0.0.5","port":"5432"}"#;
    let mock = common::start_apollo(move |_| async move { (200, body.to_string()) }).await;

    let outcome = source(mock.host()).fetch_cached(&target()).await.unwrap();
    let FetchOutcome::Updated(snapshot) = outcome else {
        panic!("expected a snapshot, got {:?}", outcome);
    };
    assert_eq!(snapshot.get("db.host").map(String::as_str), Some("10.0.0.5"));
    assert_eq!(snapshot.len(), 2);

    let requests = mock.requests_to("/configfiles/json/shop/default/application");
    assert_eq!(requests.len(), 1);
    assert_eq!(common::query_param(&requests[0], "ip").as_deref(), Some("10.0.0.7"));
}

#[tokio::test]
async fn test_fetch_cached_non_200_is_not_an_error() {
    let mock = common::start_apollo(|_| async { (404, "not found".to_string()) }).await;

    let outcome = source(mock.host()).fetch_cached(&target()).await.unwrap();
    assert!(matches!(outcome, FetchOutcome::NotModified { status: 404 }));
}

#[tokio::test]
async fn test_fetch_cached_malformed_body() {
    let mock = common::start_apollo(|_| async { (200, "<html>oops</html>".to_string()) }).await;

    let err = source(mock.host()).fetch_cached(&target()).await.unwrap_err();
    assert!(matches!(err, FetchError::Decode(_)), "got {:?}", err);
    assert!(!err.is_transient());
}

#[tokio::test]
async fn test_notifications_fold_to_highest_id() {
    let mock = common::start_apollo(|_| async {
        (
            200,
            r#"[{"namespaceName":"application","notificationId":7},
                {"namespaceName":"other","notificationId":99},
                {"namespaceName":"application.properties","notificationId":9}]"#
                .to_string(),
        )
    })
    .await;

    let outcome = source(mock.host()).fetch_notifications(&target(), 3).await.unwrap();
    assert!(matches!(outcome, FetchOutcome::Updated(9)), "got {:?}", outcome);

    let requests = mock.requests_to("/notifications/v2");
    assert_eq!(requests.len(), 1);
    assert_eq!(common::query_param(&requests[0], "appId").as_deref(), Some("shop"));
    assert_eq!(common::query_param(&requests[0], "cluster").as_deref(), Some("default"));
    let notifications: serde_json::Value =
        serde_json::from_str(&common::query_param(&requests[0], "notifications").unwrap()).unwrap();
    assert_eq!(
        notifications,
        serde_json::json!([{"namespaceName": "application", "notificationId": 3}])
    );
}

#[tokio::test]
async fn test_notifications_304_and_missing_entry() {
    let mock = common::start_apollo(|_| async { (304, String::new()) }).await;
    let outcome = source(mock.host()).fetch_notifications(&target(), 0).await.unwrap();
    assert!(matches!(outcome, FetchOutcome::NotModified { status: 304 }));

    let mock = common::start_apollo(|_| async {
        (200, r#"[{"namespaceName":"other","notificationId":4}]"#.to_string())
    })
    .await;
    let err = source(mock.host()).fetch_notifications(&target(), 0).await.unwrap_err();
    assert!(matches!(err, FetchError::EmptyNotification(ref ns) if ns == "application"));
}

#[tokio::test]
async fn test_fetch_uncached_passes_release_key() {
    let mock = common::start_apollo(|_| async {
        (
            200,
            r#"{"appId":"shop","cluster":"default","namespaceName":"application",
                "configurations":{"a":"1"},"releaseKey":"20240101-R2"}"#
                .to_string(),
        )
    })
    .await;

    let outcome = source(mock.host()).fetch_uncached(&target(), "20240101-R1").await.unwrap();
    let FetchOutcome::Updated(released) = outcome else {
        panic!("expected a release, got {:?}", outcome);
    };
    assert_eq!(released.release_key, "20240101-R2");
    assert_eq!(released.configurations.get("a").map(String::as_str), Some("1"));

    let requests = mock.requests_to("/configs/shop/default/application");
    assert_eq!(common::query_param(&requests[0], "releaseKey").as_deref(), Some("20240101-R1"));
}

#[tokio::test]
async fn test_connection_refused_is_transient() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let err = source(format!("http://{}", addr)).fetch_cached(&target()).await.unwrap_err();
    assert!(err.is_transient(), "got {:?}", err);
}

#[tokio::test]
async fn test_cached_timeout_does_not_follow_uncached_timeout() {
    let mock = common::start_apollo(|target| async move {
        tokio::time::sleep(std::time::Duration::from_millis(1500)).await;
        if target.starts_with("/configs/") {
            (200, r#"{"configurations":{"a":"1"},"releaseKey":"R1"}"#.to_string())
        } else {
            (200, r#"{"a":"1"}"#.to_string())
        }
    })
    .await;

    let mut config = AgentConfig {
        host: mock.host(),
        ..AgentConfig::default()
    };
    config.polling.request_timeout_secs = 1;
    config.long_polling.fetch_timeout_secs = 5;
    let source = HttpConfigSource::new(&config).unwrap();

    let err = source.fetch_cached(&target()).await.unwrap_err();
    assert!(matches!(err, FetchError::Timeout), "got {:?}", err);

    let outcome = source.fetch_uncached(&target(), "").await.unwrap();
    assert!(matches!(outcome, FetchOutcome::Updated(_)), "got {:?}", outcome);
}
