use crate::configuration::Cli;

pub fn init(cli: &Cli) -> anyhow::Result<()> {
    {
        use tracing_subscriber::prelude::*;
        let log_filter = tracing_subscriber::filter::Targets::new()
            .with_target(env!("CARGO_CRATE_NAME"), cli.log_level)
            .with_target("tower_http", cli.log_level);
        tracing_subscriber::registry()
            .with(tracing_subscriber::fmt::layer())
            .with(log_filter)
            .try_init()?;
    }

    banner(cli);

    Ok(())
}

fn banner(cli: &Cli) {
    tracing::info!("Starting service version {}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Using Mux API at {}", cli.mux_api_url);
    match &cli.db_config {
        Some(db) => tracing::info!(
            "Using database {:?} on {:?}",
            db.get_dbname().unwrap_or("<default>"),
            db.get_hosts()
        ),
        None => tracing::warn!("No database configured. Accounts are kept in memory only."),
    }
    tracing::info!("Listening on: {}", cli.listen_address);
}
