//! polis-relay entry point: poll loop with graceful ctrl-c drain, plus a
//! `--check` readiness mode for orchestration probes.

use anyhow::Result;
use clap::Parser;
use std::time::Duration;
use tracing::{error, info};

use polis_config::{worker_owner, RelayConfig};
use polis_relay::{KafkaPublisher, Relay};

#[derive(Parser)]
#[command(name = "polis-relay")]
#[command(about = "Outbox relay: publishes queued game events to Kafka", long_about = None)]
struct Args {
    /// Readiness check (db + kafka tcp), print JSON and exit.
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Dev convenience; production injects env vars directly.
    let _ = dotenvy::dotenv();

    let args = Args::parse();
    let cfg = RelayConfig::from_env()?;
    let owner = worker_owner();

    if args.check {
        let pool = polis_db::connect_from_env().await?;
        let (report, ready) = polis_relay::readiness(&pool, &cfg, &owner).await?;
        println!("{}", serde_json::to_string(&report)?);
        std::process::exit(if ready { 0 } else { 2 });
    }

    init_tracing();

    let pool = polis_db::connect_from_env().await?;
    polis_db::migrate(&pool).await?;

    info!(
        owner = %owner,
        config = %cfg.fingerprint(),
        bootstrap = %cfg.kafka.bootstrap,
        topic = %cfg.kafka.topic,
        dlq = %cfg.kafka.dlq_topic,
        batch = cfg.batch_size,
        max_attempts = cfg.max_attempts,
        lock_ttl_secs = cfg.lock_ttl_secs,
        "relay starting"
    );

    let publisher = KafkaPublisher::new(&cfg.kafka, cfg.publish_timeout())?;
    let relay = Relay::new(pool, publisher.clone(), cfg.clone(), owner);

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("shutdown signal received");
                break;
            }
            cycle = relay.run_cycle() => {
                match cycle {
                    Ok(0) => tokio::time::sleep(cfg.idle_sleep()).await,
                    Ok(_) => {}
                    Err(e) => {
                        error!(error = ?e, "relay cycle failed");
                        tokio::time::sleep(cfg.idle_sleep()).await;
                    }
                }
            }
        }
    }

    // Drain anything the producer still holds before exiting.
    if let Err(e) = publisher.flush(Duration::from_secs(5)) {
        error!(error = ?e, "producer flush on shutdown failed");
    }
    info!("relay stopped");

    Ok(())
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();
}
