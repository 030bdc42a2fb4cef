use crate::integration_test_helpers::{
    mux_mock::{self, live_stream},
    server::{self, PASSWORD},
};
use live_stream_portal::db::Database;
use reqwest::{header::LOCATION, StatusCode};

#[tokio::test]
async fn test_login_page_renders() {
    let handle = server::start_server().await;

    let resp = handle
        .client()
        .get(handle.url("/?next=/view-streams/"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = resp.text().await.unwrap();
    assert!(body.contains("name=\"username\""));
    assert!(body.contains("name=\"next\" value=\"/view-streams/\""));
}

#[tokio::test]
async fn test_login_redirects_to_stream_creation() {
    let handle = server::start_server().await;
    handle.logged_in_client("erin").await;

    let client = handle.client();
    let resp = handle.login(&client, "erin", PASSWORD).await;
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    assert_eq!(resp.headers()[LOCATION], "/create_stream/");

    let resp = client
        .get(handle.url("/create_stream/"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_login_with_wrong_password() {
    let handle = server::start_server().await;
    handle.logged_in_client("frank").await;

    let client = handle.client();
    let resp = handle.login(&client, "frank", "not-the-password").await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body = resp.text().await.unwrap();
    assert!(body.contains("Invalid username or password"));
    assert!(body.contains("value=\"frank\""));

    // No session was established.
    let resp = client
        .get(handle.url("/create_stream/"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
}

#[tokio::test]
async fn test_login_with_unknown_user() {
    let handle = server::start_server().await;

    let resp = handle.login(&handle.client(), "nobody", PASSWORD).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(resp
        .text()
        .await
        .unwrap()
        .contains("Invalid username or password"));
}

#[tokio::test]
async fn test_inactive_user_cannot_login() {
    let handle = server::start_server().await;
    handle.logged_in_client("grace").await;
    let user = handle
        .db()
        .find_user_by_username("grace")
        .await
        .unwrap()
        .unwrap();
    handle.db().set_active(user.id, false).await.unwrap();

    let resp = handle.login(&handle.client(), "grace", PASSWORD).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(resp
        .text()
        .await
        .unwrap()
        .contains("Invalid username or password"));
}

#[tokio::test]
async fn test_login_follows_local_next_only() {
    let handle = server::start_server().await;
    handle.logged_in_client("heidi").await;

    let resp = handle
        .client()
        .post(handle.url("/"))
        .form(&[
            ("username", "heidi"),
            ("password", PASSWORD),
            ("next", "/view-streams/"),
        ])
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    assert_eq!(resp.headers()[LOCATION], "/view-streams/");

    let resp = handle
        .client()
        .post(handle.url("/"))
        .form(&[
            ("username", "heidi"),
            ("password", PASSWORD),
            ("next", "//evil.example/"),
        ])
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    assert_eq!(resp.headers()[LOCATION], "/create_stream/");
}

#[tokio::test]
async fn test_protected_pages_redirect_to_login() {
    let handle = server::start_server().await;
    let client = handle.client();

    for (path, next) in [
        ("/create_stream/", "%2Fcreate_stream%2F"),
        ("/view-streams/", "%2Fview-streams%2F"),
    ] {
        let resp = client.get(handle.url(path)).send().await.unwrap();
        assert_eq!(resp.status(), StatusCode::SEE_OTHER);
        assert_eq!(resp.headers()[LOCATION], format!("/?next={next}").as_str());
    }
}

#[tokio::test]
async fn test_logout_ends_session() {
    let handle = server::start_server().await;
    let client = handle.logged_in_client("ivan").await;

    let resp = client.post(handle.url("/logout/")).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    assert_eq!(resp.headers()[LOCATION], "/");

    let resp = client
        .get(handle.url("/create_stream/"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
}

#[tokio::test]
async fn test_login_as_other_user_drops_previous_stream() {
    let handle = server::start_server().await;
    handle.logged_in_client("mallory").await;
    let client = handle.logged_in_client("alice").await;
    mux_mock::mock_create_live_stream(
        handle.mux_mock(),
        live_stream("stream-alice", "sk-alice", "play-alice"),
    )
    .await;
    let list = mux_mock::mock_list_live_streams(
        handle.mux_mock(),
        vec![live_stream("stream-other", "sk-other", "play-other")],
    )
    .await;

    let resp = client
        .post(handle.url("/create_stream/"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    // Same browser, no logout in between.
    let resp = handle.login(&client, "mallory", PASSWORD).await;
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);

    let resp = client
        .get(handle.url("/view-streams/"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = resp.text().await.unwrap();
    assert!(!body.contains("play-alice"));
    assert!(body.contains("data-stream-id=\"play-other\""));
    assert_eq!(list.hits_async().await, 1);
}

#[tokio::test]
async fn test_login_again_as_same_user_keeps_stream() {
    let handle = server::start_server().await;
    let client = handle.logged_in_client("trent").await;
    mux_mock::mock_create_live_stream(
        handle.mux_mock(),
        live_stream("stream-trent", "sk-trent", "play-trent"),
    )
    .await;

    let resp = client
        .post(handle.url("/create_stream/"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = handle.login(&client, "trent", PASSWORD).await;
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);

    let resp = client
        .get(handle.url("/view-streams/"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(resp.text().await.unwrap().contains("data-stream-id=\"play-trent\""));
}
