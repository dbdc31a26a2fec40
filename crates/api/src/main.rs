use anyhow::Context;

use tradeflow_infra::AppConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tradeflow_observability::init();

    let config = AppConfig::from_env()?;
    let app = tradeflow_api::app::build_app(&config).await?;

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;

    tracing::info!(
        addr = %listener.local_addr()?,
        store = if config.database_url.is_some() { "postgres" } else { "memory" },
        "listening"
    );

    axum::serve(listener, app).await?;
    Ok(())
}
