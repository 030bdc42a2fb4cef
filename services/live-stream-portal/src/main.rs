use clap::Parser;
use live_stream_portal::{configuration::Cli, logging, service};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // a .env file may provide the Mux credentials
    dotenvy::dotenv().ok();

    // parse the cli arguments
    let cli = Cli::parse();

    // setup logging and tracing
    logging::init(&cli)?;

    // some verification checks
    anyhow::ensure!(
        cli.request_timeout >= 1000,
        "Request timeout should be at least 1s."
    );
    anyhow::ensure!(
        cli.password_hash_iterations >= 1,
        "Password hash iterations must be positive."
    );

    service::run_service(cli).await
}
