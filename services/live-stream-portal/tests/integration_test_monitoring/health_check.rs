use crate::integration_test_helpers::server;
use reqwest::StatusCode;

/// Test healthcheck endpoint
#[tokio::test]
async fn test_healthcheck() {
    let handle = server::start_server().await;

    let resp = handle
        .client()
        .get(handle.url("/health"))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body, serde_json::json!({ "status": "ok" }));
}
