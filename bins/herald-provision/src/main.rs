use std::sync::Arc;
use std::time::Duration;

use clap::Parser;

use broker_kafka::KafkaConnector;
use codec_avro::AvroCodecFactory;
use herald_engine::config::HeraldConfig;
use herald_engine::{Backends, ProducerContext, ProvisionOutcome};
use registry_http::HttpRegistryConnector;

#[derive(Parser)]
#[command(name = "herald-provision", about = "Create every topic declared in a herald config")]
struct Cli {
    /// Path to TOML configuration file.
    #[arg(long, default_value = "herald.toml", env = "HERALD_CONFIG")]
    config: String,

    /// Exit non-zero if any topic could not be provisioned.
    #[arg(long)]
    fail_on_error: bool,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();

    tracing::info!(config = %cli.config, "loading configuration");
    let config = match HeraldConfig::load(&cli.config) {
        Ok(c) => c,
        Err(e) => {
            tracing::error!(error = %e, "failed to load config");
            std::process::exit(1);
        }
    };
    let descriptors = match config.descriptors() {
        Ok(d) => d,
        Err(e) => {
            tracing::error!(error = %e, "invalid topic declaration");
            std::process::exit(1);
        }
    };
    if descriptors.is_empty() {
        tracing::warn!("no [[topics]] declared, nothing to do");
        return;
    }

    let settings = config.client_settings();
    let backends = Backends::new(
        Arc::new(KafkaConnector),
        Arc::new(HttpRegistryConnector::new(Duration::from_millis(config.admin_timeout_ms))),
        Arc::new(AvroCodecFactory),
    );
    let ctx = ProducerContext::builder(settings, backends).build();

    tracing::info!(topics = descriptors.len(), "provisioning topics");
    let mut failed = 0usize;
    for (topic, outcome) in ctx.ensure_topics(&descriptors).await {
        match outcome {
            ProvisionOutcome::Created => println!("{topic}\tcreated"),
            ProvisionOutcome::AlreadyExists | ProvisionOutcome::Assumed => println!("{topic}\texists"),
            ProvisionOutcome::Failed(e) => {
                failed += 1;
                println!("{topic}\tfailed: {e}");
            }
        }
    }

    if failed > 0 {
        tracing::warn!(failed, "some topics were not provisioned");
        if cli.fail_on_error {
            std::process::exit(2);
        }
    }
}
