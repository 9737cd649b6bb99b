//! indexer-ack-probe entry point.
//!
//! Usage: indexer-ack-probe --url <url> --token <token> [--count <n>]
//!
//! Submits `count` test events, waits for each to be confirmed or given up,
//! and exits non-zero if any was not confirmed.

use anyhow::Context;
use clap::Parser;
use indexer_ack_client::{
    ChannelPlacement, ClientConfig, DeliveryOutcome, EventPayload, IngestClient,
};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

/// Probe an ingestion endpoint end to end, through indexer acknowledgment.
#[derive(Parser, Debug)]
#[command(name = "indexer-ack-probe")]
#[command(about = "Submit test events and wait for indexer acknowledgment")]
struct Args {
    /// Collector base URL, e.g. https://collector.example.com:8088
    #[arg(long, env = "INGEST_URL")]
    url: String,

    /// Ingestion token.
    #[arg(long, env = "INGEST_TOKEN", hide_env_values = true)]
    token: String,

    /// Authorization scheme placed before the token.
    #[arg(long, env = "INGEST_AUTH_SCHEME", default_value = "Splunk")]
    auth_scheme: String,

    /// Number of test events to submit.
    #[arg(long, default_value = "1")]
    count: usize,

    /// Acknowledgment poll interval in milliseconds.
    #[arg(long, env = "INGEST_POLL_INTERVAL_MS", default_value = "2000")]
    poll_interval_ms: u64,

    /// Seconds before an unacknowledged event is resent.
    #[arg(long, env = "INGEST_ACK_TIMEOUT_SECS", default_value = "60")]
    ack_timeout_secs: u64,

    /// Sends per event before giving up.
    #[arg(long, env = "INGEST_MAX_ATTEMPTS", default_value = "5")]
    max_attempts: u32,

    /// Pass the channel as a query parameter instead of a header.
    #[arg(long)]
    channel_in_query: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Append JSON lines logs here instead of the default per-user log file.
    #[arg(long, env = "INGEST_LOG_FILE")]
    log_file: Option<PathBuf>,

    /// Do not write a log file.
    #[arg(long, conflicts_with = "log_file")]
    no_log_file: bool,

    /// Write stderr logs as JSON lines.
    #[arg(long)]
    json_logs: bool,
}

impl Args {
    fn log_config(&self) -> observability::LogConfig {
        let config = observability::LogConfig {
            service_name: "indexer-ack-probe".into(),
            default_level: self.log_level.clone(),
            stderr: if self.json_logs {
                observability::StderrFormat::Json
            } else {
                observability::StderrFormat::Compact
            },
            log_path: self.log_file.clone(),
        };
        if config.log_path.is_none() && !self.no_log_file {
            config.with_default_log_file()
        } else {
            config
        }
    }

    fn client_config(&self) -> ClientConfig {
        let mut config = ClientConfig::new(self.url.clone(), self.token.clone());
        config.endpoint.auth_scheme = self.auth_scheme.clone();
        if self.channel_in_query {
            config.endpoint.channel_placement = ChannelPlacement::Query;
        }
        config.poll_interval = Duration::from_millis(self.poll_interval_ms);
        config.per_handle_timeout = Duration::from_secs(self.ack_timeout_secs);
        config.max_attempts = self.max_attempts;
        config
    }
}

/// Per-event results, filled in as tickets resolve.
#[derive(Debug, Default)]
struct Tally {
    submitted: usize,
    confirmed: usize,
    failed: usize,
}

/// Submit `count` events, then wait for each ticket in submission order.
async fn run_probe(
    client: &IngestClient,
    count: usize,
    probe_run: Uuid,
    tally: &mut Tally,
) -> anyhow::Result<()> {
    let mut tickets = Vec::with_capacity(count);
    for i in 0..count {
        let payload = EventPayload::new(serde_json::json!({
            "message": format!("probe event {}", i),
            "probe_run": probe_run.to_string(),
        }))
        .with_source("indexer-ack-probe");

        let ticket = client
            .submit(payload)
            .await
            .with_context(|| format!("failed to submit probe event {}", i))?;
        tally.submitted += 1;
        tickets.push((i, ticket));
    }

    for (i, ticket) in tickets {
        let delivery_id = ticket.delivery_id();
        match ticket.outcome().await {
            DeliveryOutcome::Confirmed { attempts } => {
                tally.confirmed += 1;
                println!(
                    "event {}: confirmed after {} attempt(s) ({})",
                    i, attempts, delivery_id
                );
            }
            DeliveryOutcome::Failed { attempts, reason } => {
                tally.failed += 1;
                println!(
                    "event {}: failed after {} attempt(s): {} ({})",
                    i, attempts, reason, delivery_id
                );
            }
            DeliveryOutcome::FatalAuth { message } => {
                tally.failed += 1;
                println!("event {}: credentials rejected: {}", i, message);
            }
            DeliveryOutcome::Unconfirmed { attempts } => {
                println!(
                    "event {}: unconfirmed after {} attempt(s) ({})",
                    i, attempts, delivery_id
                );
            }
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let args = Args::parse();

    observability::init_with_config(args.log_config()).context("failed to initialize logging")?;

    let config = args.client_config();
    config.validate().context("invalid configuration")?;

    let probe_run = Uuid::new_v4();
    info!(
        url = %config.endpoint.base_url,
        count = args.count,
        probe_run = %probe_run,
        "Probe starting"
    );

    let client = IngestClient::new(config).context("failed to create ingestion client")?;

    let mut tally = Tally::default();
    tokio::select! {
        result = run_probe(&client, args.count, probe_run, &mut tally) => result?,
        _ = tokio::signal::ctrl_c() => {
            warn!("Interrupted, shutting down without waiting for remaining acknowledgments");
        }
    }

    let report = client.shutdown().await;
    let unconfirmed = tally.submitted - tally.confirmed - tally.failed;

    println!(
        "summary: {} submitted, {} confirmed, {} failed, {} unconfirmed",
        tally.submitted, tally.confirmed, tally.failed, unconfirmed
    );
    for delivery in &report.unconfirmed {
        match delivery.handle {
            Some((channel, ack_id)) => println!(
                "  unconfirmed {} after {} attempt(s), last handle {} on channel {}",
                delivery.delivery_id, delivery.attempts, ack_id, channel
            ),
            None => println!(
                "  unconfirmed {} after {} attempt(s), no live handle",
                delivery.delivery_id, delivery.attempts
            ),
        }
    }

    if tally.confirmed == args.count {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}
