use std::sync::Arc;

use anyhow::Context;

use credence::{
    amqp::Amqp,
    app::serve,
    bootstrap::Bootstrapper,
    config::BrokerConfig,
    logging,
    relay::{build_relay, BrokerState},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    logging::init("credence=debug,lapin=info,tower_http=info");

    let config = BrokerConfig::from_env()?;

    let mut bootstrap = Bootstrapper::new(config.connect);
    let conn = bootstrap
        .establish(&Amqp::new(config.amqp_url.clone()))
        .await
        .context("amqp bootstrap")?;
    tracing::info!("connected to RabbitMQ");

    let app = build_relay(BrokerState {
        queue: Arc::new(conn),
    });
    serve(app, config.addr()?).await
}
