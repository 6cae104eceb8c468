use anyhow::Context;
use quillbook_server::{build_router, init_tracing, AppState, Config};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing("quillbook-server");

    let config = Config::load().context("loading configuration")?;
    anyhow::ensure!(
        !config.jwt_secret.is_empty(),
        "jwt_secret must be set in the config file or QUILLBOOK_JWT_SECRET"
    );

    let state = AppState::from_config(&config).await?;
    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("binding {}", config.bind_addr))?;

    tracing::info!(addr = %config.bind_addr, "Quillbook server listening");
    axum::serve(listener, build_router(state)).await?;
    Ok(())
}
