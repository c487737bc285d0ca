use std::sync::Arc;

use serde::Serialize;
use tracing::{error, info};

use topicrelay::broker::Broker;
use topicrelay::config::{Scenario, Settings, load_config};
use topicrelay::samples::{dto, latency};
use topicrelay::utils::logging;

#[tokio::main]
async fn main() {
    // a missing .env is fine
    let _ = dotenvy::dotenv();

    let settings = match load_config() {
        Ok(settings) => settings,
        Err(e) => {
            logging::init("info");
            error!("Failed to load configuration: {}", e);
            return;
        }
    };
    logging::init(&settings.logging.level);

    if let Err(e) = run(&settings).await {
        error!("Scenario failed: {}", e);
    }
}

async fn run(settings: &Settings) -> Result<(), Box<dyn std::error::Error>> {
    let broker = Arc::new(Broker::with_settings(&settings.broker));

    match settings.samples.scenario {
        Scenario::Dto => report(&dto::run(broker.clone(), &settings.dto).await?)?,
        Scenario::Latency => report(&latency::run(broker.clone(), &settings.latency).await?)?,
    }

    let stats = broker.stats();
    info!(
        sent = stats.total.sent,
        received = stats.total.received,
        "Number of messages sent: {}, received: {}",
        stats.total.sent,
        stats.total.received
    );
    Ok(())
}

fn report<T: Serialize>(summary: &T) -> Result<(), serde_json::Error> {
    info!("Summary:\n{}", serde_json::to_string_pretty(summary)?);
    Ok(())
}
