use crate::integration_test_helpers::{
    mux_mock::{self, live_stream},
    server,
};
use httpmock::Method::POST;
use live_stream_portal::db::Database;
use reqwest::StatusCode;

#[tokio::test]
async fn test_create_live_stream_stores_stream_key() {
    let handle = server::start_server().await;
    let client = handle.logged_in_client("judy").await;
    let create = mux_mock::mock_create_live_stream(
        handle.mux_mock(),
        live_stream("stream-1", "sk-1", "play-1"),
    )
    .await;

    let resp = client
        .post(handle.url("/create_stream/"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = resp.text().await.unwrap();
    assert!(body.contains("https://stream.mux.com/play-1.m3u8"));
    assert!(body.contains("<code>sk-1</code>"));
    create.assert_async().await;

    let user = handle
        .db()
        .find_user_by_username("judy")
        .await
        .unwrap()
        .unwrap();
    let profile = handle.db().get_profile(user.id).await.unwrap().unwrap();
    assert_eq!(profile.stream_key, "sk-1");

    // The form shows the stored key from now on.
    let resp = client
        .get(handle.url("/create_stream/"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(resp.text().await.unwrap().contains("<code>sk-1</code>"));
}

#[tokio::test]
async fn test_create_live_stream_replaces_previous_key() {
    let handle = server::start_server().await;
    let client = handle.logged_in_client("ken").await;
    let user = handle
        .db()
        .find_user_by_username("ken")
        .await
        .unwrap()
        .unwrap();
    handle.db().set_stream_key(user.id, "old-key").await.unwrap();
    mux_mock::mock_create_live_stream(
        handle.mux_mock(),
        live_stream("stream-2", "new-key", "play-2"),
    )
    .await;

    let resp = client
        .post(handle.url("/create_stream/"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let profile = handle.db().get_profile(user.id).await.unwrap().unwrap();
    assert_eq!(profile.stream_key, "new-key");
}

#[tokio::test]
async fn test_create_live_stream_reports_api_errors() {
    let handle = server::start_server().await;
    let client = handle.logged_in_client("leo").await;
    let create = mux_mock::mock_unauthorized(handle.mux_mock(), POST).await;

    let resp = client
        .post(handle.url("/create_stream/"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(
        resp.text().await.unwrap(),
        "Error creating live stream: (401 Unauthorized) Unauthorized request"
    );
    create.assert_async().await;

    let user = handle
        .db()
        .find_user_by_username("leo")
        .await
        .unwrap()
        .unwrap();
    assert!(handle.db().get_profile(user.id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_create_live_stream_without_playback_id() {
    let handle = server::start_server().await;
    let client = handle.logged_in_client("mallory").await;
    let mut stream = live_stream("stream-3", "sk-3", "unused");
    stream["playback_ids"] = serde_json::json!([]);
    mux_mock::mock_create_live_stream(handle.mux_mock(), stream).await;

    let resp = client
        .post(handle.url("/create_stream/"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(
        resp.text().await.unwrap(),
        "Error creating live stream: the live stream stream-3 has no playback ids"
    );
}

#[tokio::test]
async fn test_create_live_stream_requires_login() {
    let handle = server::start_server().await;
    let create = mux_mock::mock_create_live_stream(
        handle.mux_mock(),
        live_stream("stream-4", "sk-4", "play-4"),
    )
    .await;

    let resp = handle
        .client()
        .post(handle.url("/create_stream/"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    assert_eq!(create.hits_async().await, 0);
}

#[tokio::test]
async fn test_create_live_stream_with_oversized_key() {
    let handle = server::start_server().await;
    let client = handle.logged_in_client("rupert").await;
    let long_key = "k".repeat(101);
    mux_mock::mock_create_live_stream(
        handle.mux_mock(),
        live_stream("stream-long", &long_key, "play-long"),
    )
    .await;

    let resp = client
        .post(handle.url("/create_stream/"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(resp.text().await.unwrap(), "Internal error.");

    let user = handle
        .db()
        .find_user_by_username("rupert")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(handle.db().get_profile(user.id).await.unwrap(), None);

    // The session did not pick up the stream either.
    let list = mux_mock::mock_list_live_streams(handle.mux_mock(), vec![]).await;
    let resp = client
        .get(handle.url("/view-streams/"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    assert_eq!(list.hits_async().await, 1);
}
