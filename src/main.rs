use std::sync::Arc;

use anyhow::Context;
use octoshop::{web, Config, OctoAiClient, Octoshop};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    let config = Config::from_env().context("loading configuration from environment")?;
    octoshop::logging::init(config.log_json)?;

    let client = OctoAiClient::new(&config)?;
    let octoshop = Octoshop::new(Arc::new(client), &config);

    info!(
        endpoint = %config.endpoint_url,
        images = config.num_images,
        policy = ?config.crop_policy,
        "octoshop configured"
    );

    let bind_address = config.bind_address();
    let app = web::router(web::AppState::new(octoshop, config));

    let listener = tokio::net::TcpListener::bind(&bind_address)
        .await
        .with_context(|| format!("binding {bind_address}"))?;
    info!("Server running on http://{}", listener.local_addr()?);

    axum::serve(listener, app).await?;
    Ok(())
}
