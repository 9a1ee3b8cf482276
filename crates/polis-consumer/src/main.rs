//! polis-consumer entry point: manual-commit Kafka loop with periodic metric
//! summaries, graceful ctrl-c drain and a `--check` readiness mode.

use anyhow::{Context, Result};
use clap::Parser;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::ClientConfig;
use rdkafka::Message;
use std::time::Duration;
use tracing::{error, info};

use polis_config::ConsumerConfig;
use polis_consumer::{EventProcessor, KafkaDlqSink, RecordMeta};

#[derive(Parser)]
#[command(name = "polis-consumer")]
#[command(about = "Materializes the game read model from the event stream", long_about = None)]
struct Args {
    /// Readiness check (db + kafka tcp), print JSON and exit.
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    let args = Args::parse();
    let cfg = ConsumerConfig::from_env()?;

    if args.check {
        let pool = polis_db::connect_from_env().await?;
        let (report, ready) = polis_consumer::readiness(&pool, &cfg).await?;
        println!("{}", serde_json::to_string(&report)?);
        std::process::exit(if ready { 0 } else { 2 });
    }

    init_tracing();

    let pool = polis_db::connect_from_env().await?;
    polis_db::migrate(&pool).await?;

    info!(
        config = %cfg.fingerprint(),
        bootstrap = %cfg.kafka.bootstrap,
        topic = %cfg.kafka.topic,
        group = %cfg.group_id,
        "consumer starting"
    );

    let consumer: StreamConsumer = ClientConfig::new()
        .set("bootstrap.servers", &cfg.kafka.bootstrap)
        .set("group.id", &cfg.group_id)
        .set("client.id", "polis-consumer")
        // Offsets commit only after the database transaction committed.
        .set("enable.auto.commit", "false")
        .set("auto.offset.reset", "earliest")
        .create()
        .context("failed to create Kafka consumer")?;

    consumer
        .subscribe(&[cfg.kafka.topic.as_str()])
        .context("subscribe failed")?;

    let dlq = KafkaDlqSink::new(&cfg.kafka)?;
    let processor = EventProcessor::new(pool, dlq, cfg.clone());

    let mut metrics_tick = tokio::time::interval(cfg.metrics_every());
    metrics_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("shutdown signal received");
                break;
            }
            _ = metrics_tick.tick() => {
                info!(metrics = %processor.metrics.summary(), "consumer metrics");
            }
            delivered = consumer.recv() => {
                let msg = match delivered {
                    Ok(m) => m,
                    Err(e) => {
                        error!(error = %e, "kafka receive failed");
                        tokio::time::sleep(Duration::from_millis(200)).await;
                        continue;
                    }
                };

                let meta = RecordMeta {
                    topic: msg.topic().to_string(),
                    partition: msg.partition(),
                    offset: msg.offset(),
                    key: msg
                        .key()
                        .map(|k| String::from_utf8_lossy(k).into_owned()),
                };

                match processor.handle_record(&meta, msg.payload()).await {
                    Ok(_) => {
                        // Applied, dedup, skipped or dead-lettered: all are
                        // terminal for this record, so advance the offset.
                        if let Err(e) = consumer.commit_message(&msg, CommitMode::Sync) {
                            error!(error = %e, "offset commit failed");
                        }
                    }
                    Err(e) => {
                        // Neither applied nor dead-lettered (DB or DLQ down):
                        // leave the offset alone and let the broker redeliver.
                        error!(
                            topic = %meta.topic,
                            partition = meta.partition,
                            offset = meta.offset,
                            error = ?e,
                            "record processing failed, will be redelivered"
                        );
                        tokio::time::sleep(Duration::from_millis(200)).await;
                    }
                }
            }
        }
    }

    info!(metrics = %processor.metrics.summary(), "consumer stopped");

    Ok(())
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();
}
