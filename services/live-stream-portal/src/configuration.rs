use clap::Parser;
use std::net::SocketAddr;
use url::Url;

#[derive(Clone, Debug, Parser)]
#[clap(version, author)]
pub struct Cli {
    /// the listen address for the portal
    #[clap(
        long = "listen-address",
        default_value = "0.0.0.0:8080",
        help = "Listen address for the server.",
        env = "LIVE_STREAM_PORTAL_LISTEN_ADDRESS"
    )]
    pub listen_address: SocketAddr,

    /// log level to start this service
    #[clap(
        long = "log-level",
        default_value = "info",
        help = "Maximum log level.",
        env = "LIVE_STREAM_PORTAL_LOG_LEVEL"
    )]
    pub log_level: tracing_subscriber::filter::LevelFilter,

    /// whether headers should be logged or not for requests and responses
    #[clap(
        long = "log-headers",
        help = "Whether to log headers for requests and responses.",
        env = "LIVE_STREAM_PORTAL_LOG_HEADERS"
    )]
    pub log_headers: bool,

    /// the request timeout in milliseconds, applied to incoming requests and
    /// to calls made to the Mux API
    #[clap(
        long = "request-timeout",
        help = "Request timeout in milliseconds.",
        default_value = "10000",
        env = "LIVE_STREAM_PORTAL_REQUEST_TIMEOUT"
    )]
    pub request_timeout: u64,

    #[clap(
        long = "mux-token-id",
        help = "Mux access token id.",
        env = "MUX_TOKEN",
        hide_env_values = true
    )]
    pub mux_token_id: String,

    #[clap(
        long = "mux-token-secret",
        help = "Mux access token secret.",
        env = "MUX_SECRET",
        hide_env_values = true
    )]
    pub mux_token_secret: String,

    #[clap(
        long = "mux-api-url",
        help = "Base URL of the Mux API.",
        default_value = "https://api.mux.com",
        env = "LIVE_STREAM_PORTAL_MUX_API_URL"
    )]
    pub mux_api_url: Url,

    /// playback URLs take the form `<playback-base-url>/<playback id>.m3u8`
    #[clap(
        long = "playback-base-url",
        help = "Base URL used to build HLS playback URLs.",
        default_value = "https://stream.mux.com",
        env = "LIVE_STREAM_PORTAL_PLAYBACK_BASE_URL"
    )]
    pub playback_base_url: Url,

    /// If unset the portal keeps users and profiles in memory.
    #[clap(
        long = "db",
        help = "Database connection string. If not set, an in-memory store is used and all \
                accounts are lost on restart.",
        env = "LIVE_STREAM_PORTAL_DB_STRING",
        hide_env_values = true
    )]
    pub db_config: Option<tokio_postgres::Config>,

    #[clap(
        long = "db-pool-size",
        help = "Maximum number of pooled database connections.",
        default_value = "16",
        env = "LIVE_STREAM_PORTAL_DB_POOL_SIZE"
    )]
    pub db_pool_size: usize,

    /// hex encoded, at least 64 bytes
    #[clap(
        long = "session-secret",
        help = "Hex encoded secret used to sign session cookies. If not set, a random secret is \
                generated and sessions do not survive a restart.",
        env = "LIVE_STREAM_PORTAL_SESSION_SECRET",
        hide_env_values = true
    )]
    pub session_secret: Option<String>,

    #[clap(
        long = "secure-cookies",
        help = "Only send the session cookie over HTTPS.",
        env = "LIVE_STREAM_PORTAL_SECURE_COOKIES"
    )]
    pub secure_cookies: bool,

    #[clap(
        long = "password-hash-iterations",
        help = "PBKDF2 iterations used when hashing new passwords.",
        default_value = "600000",
        env = "LIVE_STREAM_PORTAL_PASSWORD_HASH_ITERATIONS"
    )]
    pub password_hash_iterations: u32,

    /// prometheus address for metrics scraping
    #[clap(
        long = "prometheus-address",
        help = "Address to which the Prometheus server should bind. If not set, the Prometheus \
                server will not start.",
        env = "LIVE_STREAM_PORTAL_PROMETHEUS_ADDRESS"
    )]
    pub prometheus_address: Option<SocketAddr>,
}
