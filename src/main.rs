mod alert;
mod backend;
mod clock;
mod config;
mod error;
mod location;
mod models;
mod processor;
#[cfg(test)]
mod testing;

use std::sync::Arc;

use alert::controller::AlertController;
use backend::HttpAlertBackend;
use clock::SystemClock;
use config::AppConfig;
use location::kafka::KafkaLocationService;
use location::sampler::PositionSampler;
use tokio::io::BufReader;
use tracing::info;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    // Load config
    let config = AppConfig::load()?;

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(&config.log_level)
        .init();

    info!("Starting Siscom SOS trigger for device '{}'...", config.device_id);

    let backend = HttpAlertBackend::new(&config)?;
    info!("Alert service at {}", config.alert_api_url);

    let location = KafkaLocationService::new(&config);
    let controller = Arc::new(AlertController::new(
        backend,
        location,
        PositionSampler::new(config.sampler_settings()),
        Arc::new(SystemClock),
        config.alert_settings(),
    ));

    processor::trigger_input::run(controller, BufReader::new(tokio::io::stdin())).await?;

    info!("Siscom SOS trigger stopped");
    Ok(())
}
