use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::Context;
use axum::Router;
use axum_prometheus::{metrics_exporter_prometheus::PrometheusHandle, PrometheusMetricLayerBuilder};
use axum_sessions::{async_session::CookieStore, PersistencePolicy, SameSite, SessionLayer};
use futures::{Future, FutureExt};
use rand::RngCore;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse};

use crate::{
    accounts::PasswordHasher,
    configuration::Cli,
    db::{Database, MemoryDatabase, PostgresDatabase},
    model::State,
    mux::MuxClient,
    routes::{auth, monitoring, streams},
    templates,
};

const SESSION_COOKIE_NAME: &str = "live_stream_portal_session";
const MIN_SESSION_SECRET_LEN: usize = 64;

/// Connect to the configured store and build the shared state.
pub async fn build_state(cli: &Cli) -> anyhow::Result<State> {
    let db: Arc<dyn Database> = match &cli.db_config {
        Some(config) => {
            tracing::info!("Connecting to database...");
            Arc::new(
                PostgresDatabase::connect(config.clone(), cli.db_pool_size)
                    .await
                    .context("Unable to connect to the database.")?,
            )
        }
        None => Arc::new(MemoryDatabase::new()),
    };
    state_with_database(cli, db)
}

/// Build the shared state around an existing store.
pub fn state_with_database(cli: &Cli, db: Arc<dyn Database>) -> anyhow::Result<State> {
    let mux = MuxClient::new(
        cli.mux_api_url.clone(),
        &cli.mux_token_id,
        &cli.mux_token_secret,
        Duration::from_millis(cli.request_timeout),
    )
    .context("Unable to build the Mux API client.")?;
    let handlebars = templates::registry().context("Unable to compile page templates.")?;

    Ok(State {
        db,
        mux,
        handlebars: Arc::new(handlebars),
        hasher: PasswordHasher::new(cli.password_hash_iterations),
        playback_base_url: Arc::new(cli.playback_base_url.clone()),
    })
}

fn session_layer(cli: &Cli) -> anyhow::Result<SessionLayer<CookieStore>> {
    let secret = match &cli.session_secret {
        Some(secret) => {
            let secret = hex::decode(secret.trim()).context("Session secret is not valid hex.")?;
            anyhow::ensure!(
                secret.len() >= MIN_SESSION_SECRET_LEN,
                "Session secret must be at least {MIN_SESSION_SECRET_LEN} bytes."
            );
            secret
        }
        None => {
            tracing::warn!("No session secret configured. Sessions will not survive a restart.");
            let mut secret = [0u8; 128];
            rand::thread_rng().fill_bytes(&mut secret);
            secret.to_vec()
        }
    };

    Ok(SessionLayer::new(CookieStore::new(), &secret)
        .with_cookie_name(SESSION_COOKIE_NAME)
        .with_persistence_policy(PersistencePolicy::ChangedOnly)
        .with_same_site_policy(SameSite::Lax)
        .with_http_only(true)
        .with_secure(cli.secure_cookies))
}

/// All routes of the portal with the session, tracing, timeout, body limit
/// and compression layers applied.
pub fn build_router(state: State, cli: &Cli) -> anyhow::Result<Router> {
    let router = Router::new()
        .merge(auth::auth_router(state.clone())?)
        .merge(streams::streams_router(state)?)
        .layer(session_layer(cli)?)
        .merge(monitoring::monitoring_router()?)
        .layer(
            tower_http::trace::TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().include_headers(cli.log_headers))
                .on_response(DefaultOnResponse::new().include_headers(cli.log_headers)),
        )
        .layer(tower_http::timeout::TimeoutLayer::new(Duration::from_millis(
            cli.request_timeout,
        )))
        .layer(axum::extract::DefaultBodyLimit::max(100_000)) // at most 100kB of data.
        .layer(tower_http::compression::CompressionLayer::new());
    Ok(router)
}

/// Serve the router on an already bound listener until `shutdown` resolves.
pub async fn serve(
    listener: std::net::TcpListener,
    router: Router,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    listener.set_nonblocking(true)?;
    axum::Server::from_tcp(listener)?
        .http1_header_read_timeout(Duration::from_secs(5))
        .serve(router.into_make_service())
        .with_graceful_shutdown(shutdown)
        .await
        .context("Server crashed.")
}

/// Run the portal with the given configuration until a shutdown signal is
/// received or one of the servers fails.
pub async fn run_service(cli: Cli) -> anyhow::Result<()> {
    let state = build_state(&cli).await?;
    let mut router = build_router(state, &cli)?;

    let prometheus = match cli.prometheus_address {
        Some(address) => {
            let (prometheus_layer, metric_handle) = PrometheusMetricLayerBuilder::new()
                .with_prefix("live_stream_portal")
                .with_default_metrics()
                .build_pair();
            router = router.layer(prometheus_layer);
            Some((address, metric_handle))
        }
        None => None,
    };

    let listener = std::net::TcpListener::bind(cli.listen_address)
        .with_context(|| format!("Unable to bind to {}.", cli.listen_address))?;

    start_services(prometheus, listener, router).await
}

/// Like `tokio::spawn` but the provided future is modified so that
/// once it terminates it sends a message on the provided channel.
/// This is sent regardless of how the future terminates, as long as it
/// terminates normally (i.e., does not panic).
fn spawn_cancel<T>(
    died_sender: tokio::sync::broadcast::Sender<()>,
    future: T,
) -> tokio::task::JoinHandle<T::Output>
where
    T: futures::Future + Send + 'static,
    T::Output: Send + 'static,
{
    tokio::spawn(async move {
        let res = future.await;
        // Ignored, a receiver lives until the end of `start_services`.
        let _ = died_sender.send(());
        res
    })
}

async fn start_services(
    prometheus: Option<(SocketAddr, PrometheusHandle)>,
    listener: std::net::TcpListener,
    router: Router,
) -> anyhow::Result<()> {
    // If a service stops, it sends a message on this channel which shuts down
    // the others.
    let (died_sender, died_receiver) = tokio::sync::broadcast::channel(10);
    // Subscribe before anything can be sent.
    let prometheus_receiver = died_sender.subscribe();
    let server_receiver = died_sender.subscribe();

    {
        let died_sender = died_sender.clone();
        // Start handling of shutdown signals now, before starting the server.
        let shutdown_signal = set_shutdown()?;
        tokio::spawn(async move {
            shutdown_signal.await;
            if died_sender.send(()).is_err() {
                tracing::error!("Unable to notify shutdown.");
            }
        });
    }

    if let Some((prometheus_address, metric_handle)) = prometheus {
        let prometheus_api = Router::new()
            .route(
                "/metrics",
                axum::routing::get(|| async move { metric_handle.render() }),
            )
            .layer(tower_http::timeout::TimeoutLayer::new(
                Duration::from_millis(1000),
            ))
            .layer(tower_http::limit::RequestBodyLimitLayer::new(0));
        tracing::info!("Starting prometheus server at {prometheus_address}.");
        spawn_cancel(died_sender.clone(), async move {
            let res = axum::Server::bind(&prometheus_address)
                .serve(prometheus_api.into_make_service())
                .with_graceful_shutdown(shutdown_trigger(prometheus_receiver))
                .await
                .context("Unable to start Prometheus server.");
            if let Err(e) = &res {
                tracing::error!("{e:#}");
            }
            res
        });
    }

    let server_handle = spawn_cancel(
        died_sender.clone(),
        serve(listener, router, shutdown_trigger(server_receiver)),
    );

    // Wait until something triggers shutdown. Either a signal handler or a
    // server stopping.
    shutdown_trigger(died_receiver).await;
    tracing::info!("Received shutdown trigger.");

    // Open connections can keep the server alive, so give outstanding requests
    // 5s and then stop waiting.
    match tokio::time::timeout(Duration::from_secs(5), server_handle).await {
        Ok(Ok(Ok(()))) => tracing::info!("Service is shut down"),
        Ok(Ok(Err(e))) => return Err(e),
        Ok(Err(e)) => return Err(e).context("Server task failed."),
        Err(_) => tracing::error!(
            "Unable to stop the server gracefully in required time. Terminating forcefully."
        ),
    }

    Ok(())
}

async fn shutdown_trigger(mut receiver: tokio::sync::broadcast::Receiver<()>) {
    if receiver.recv().await.is_err() {
        tracing::error!("Shutdown channel unexpectedly closed.");
    }
}

/// Construct a future for shutdown signals (for unix: SIGINT and SIGTERM) (for
/// windows: ctrl c and ctrl break). The signal handler is set when the future
/// is polled and until then the default signal handler.
fn set_shutdown() -> anyhow::Result<impl Future<Output = ()>> {
    #[cfg(unix)]
    {
        use tokio::signal::unix as unix_signal;

        let mut terminate_stream = unix_signal::signal(unix_signal::SignalKind::terminate())?;
        let mut interrupt_stream = unix_signal::signal(unix_signal::SignalKind::interrupt())?;

        Ok(async move {
            futures::future::select(
                Box::pin(terminate_stream.recv()),
                Box::pin(interrupt_stream.recv()),
            )
            .map(|_| ())
            .await
        })
    }
    #[cfg(windows)]
    {
        use tokio::signal::windows as windows_signal;

        let mut ctrl_break_stream = windows_signal::ctrl_break()?;
        let mut ctrl_c_stream = windows_signal::ctrl_c()?;

        Ok(async move {
            futures::future::select(
                Box::pin(ctrl_break_stream.recv()),
                Box::pin(ctrl_c_stream.recv()),
            )
            .map(|_| ())
            .await
        })
    }
}
