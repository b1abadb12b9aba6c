use clap::Parser;
use tracing::{error, info, level_filters::LevelFilter};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};
use watchtower_core::{Engine, WatchtowerConfig};

#[derive(Debug, Clone, Parser)]
struct Args {
    /// Load configuration from this dotenv file instead of searching for `.env`.
    #[arg(long)]
    env_file: Option<String>,
}

fn init_tracing() {
    let filter = filter::Targets::new().with_targets(vec![
        ("watchtower_core", LevelFilter::DEBUG),
        ("watchtower_hub", LevelFilter::DEBUG),
    ]);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .compact(),
        )
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let args = Args::parse();

    let config = WatchtowerConfig::from_env_file(args.env_file.as_deref())?;
    info!("resolved configuration: {config:#?}");

    let engine = Engine::connect(config).await?;
    engine.start().await?;
    info!("scheduler and retention job started");

    let bus = engine.bus();
    let sweeper = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(std::time::Duration::from_secs(60));
        loop {
            ticker.tick().await;
            let evicted = bus.sweep_idle().await;
            if evicted > 0 {
                info!(evicted, "swept idle bus sessions");
            }
        }
    });

    info!("press Ctrl+C to shutdown gracefully");
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("received shutdown signal, stopping..."),
        Err(err) => error!("unable to listen for shutdown signal: {err}"),
    }

    sweeper.abort();

    info!("shutting down probe loops and retention job...");
    engine.shutdown().await;

    info!("shutdown complete");
    Ok(())
}
