use anyhow::Context;

use credence::{
    app::{build_app, serve},
    bootstrap::Bootstrapper,
    config::AppConfig,
    db::Postgres,
    logging,
    state::AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    logging::init("credence=debug,axum=info,tower_http=info");

    let config = AppConfig::from_env()?;
    tracing::info!(env = ?config.env, "starting auth service");

    // Not ready until the database answers; exhausting the budget ends the process.
    let mut bootstrap = Bootstrapper::new(config.database.connect);
    let db = bootstrap
        .establish(&Postgres::new(config.database.clone()))
        .await
        .context("database bootstrap")?;

    sqlx::migrate!("./migrations")
        .run(&db)
        .await
        .context("run migrations")?;

    let addr = config.addr()?;
    let app = build_app(AppState::init(config, db)?);
    serve(app, addr).await
}
