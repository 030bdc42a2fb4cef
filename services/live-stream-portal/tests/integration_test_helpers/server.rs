use std::{net::SocketAddr, sync::Arc};

use httpmock::MockServer;
use live_stream_portal::{configuration::Cli, db::MemoryDatabase, service};
use reqwest::{redirect, Client, Response};
use tracing::level_filters::LevelFilter;

pub const PASSWORD: &str = "cl0udy-skies!";

fn config(mux_base_url: &str) -> Cli {
    Cli {
        listen_address: SocketAddr::new("127.0.0.1".parse().unwrap(), 0),
        log_level: LevelFilter::INFO,
        log_headers: false,
        request_timeout: 5000u64,
        mux_token_id: "token-id".into(),
        mux_token_secret: "token-secret".into(),
        mux_api_url: mux_base_url.parse().unwrap(),
        playback_base_url: "https://stream.mux.com".parse().unwrap(),
        db_config: None,
        db_pool_size: 1,
        session_secret: None,
        secure_cookies: false,
        password_hash_iterations: 1000,
        prometheus_address: None,
    }
}

/// A running portal backed by an in-memory store and a mocked Mux API.
pub struct ServerHandle {
    base_url: String,
    mux_mock: MockServer,
    db: Arc<MemoryDatabase>,
}

#[allow(dead_code)]
impl ServerHandle {
    pub fn mux_mock(&self) -> &MockServer {
        &self.mux_mock
    }

    pub fn db(&self) -> &MemoryDatabase {
        &self.db
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// A browser-like client with its own cookie jar. Redirects are not
    /// followed so that tests can inspect them.
    pub fn client(&self) -> Client {
        Client::builder()
            .cookie_store(true)
            .redirect(redirect::Policy::none())
            .build()
            .expect("http client")
    }

    pub async fn signup(&self, client: &Client, username: &str) -> Response {
        client
            .post(self.url("/signup/"))
            .form(&[
                ("username", username),
                ("first_name", "Test"),
                ("last_name", "User"),
                ("email", ""),
                ("password1", PASSWORD),
                ("password2", PASSWORD),
            ])
            .send()
            .await
            .expect("signup request")
    }

    pub async fn login(&self, client: &Client, username: &str, password: &str) -> Response {
        client
            .post(self.url("/"))
            .form(&[("username", username), ("password", password)])
            .send()
            .await
            .expect("login request")
    }

    /// A fresh client holding the session of a newly registered user.
    pub async fn logged_in_client(&self, username: &str) -> Client {
        let client = self.client();
        let resp = self.signup(&client, username).await;
        assert_eq!(resp.status(), reqwest::StatusCode::SEE_OTHER);
        client
    }
}

pub async fn start_server() -> ServerHandle {
    let mux_mock = MockServer::start_async().await;
    let config = config(&mux_mock.base_url());

    let db = Arc::new(MemoryDatabase::new());
    let state = service::state_with_database(&config, db.clone()).expect("portal state");
    let router = service::build_router(state, &config).expect("portal router");

    let listener = std::net::TcpListener::bind(config.listen_address).expect("bind listener");
    let address = listener.local_addr().expect("listener address");
    tokio::spawn(service::serve(
        listener,
        router,
        futures::future::pending::<()>(),
    ));

    ServerHandle {
        base_url: format!("http://{address}"),
        mux_mock,
        db,
    }
}
