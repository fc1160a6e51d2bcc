use actix_web::{web, App, HttpServer};
use anyhow::Context;
use tracing_subscriber::EnvFilter;

use academic_insights::{config, db::Store, handlers, model};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = config::load().context("failed to load configuration")?;

    let store = Store::connect()
        .await
        .context("failed to open performance store")?;
    store.seed().await.context("failed to seed store")?;

    let records = store.all_performance().await?;
    tracing::info!(records = records.len(), "performance store ready");

    let pass_model = model::train_pass_model(&records, config.pass_mark)?;
    tracing::info!(accuracy = pass_model.accuracy, "pass model trained");

    let bind_addr = config.bind_addr.clone();
    let config_data = web::Data::new(config);
    let store_data = web::Data::new(store);
    let model_data = web::Data::new(pass_model);

    tracing::info!(%bind_addr, "starting Academic Insights API");
    HttpServer::new(move || {
        App::new()
            .app_data(config_data.clone())
            .app_data(store_data.clone())
            .app_data(model_data.clone())
            .configure(handlers::configure)
    })
    .bind(bind_addr.as_str())
    .with_context(|| format!("failed to bind {bind_addr}"))?
    .run()
    .await?;

    Ok(())
}
