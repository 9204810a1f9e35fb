use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::net::TcpListener;
use tuf_gate::AuthorizationService;
use tuf_gate_server::{Config, Server, init_tracing, reload, repository};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = Config::parse();
    config.validate()?;

    let bundle = repository::load(&config.repository)?;
    let service = Arc::new(
        AuthorizationService::new(&bundle, config.service())
            .context("failed to admit repository metadata")?,
    );
    tracing::info!(repository = %config.repository.display(), "trusted metadata loaded");

    let listen_addr = config.listen_addr();
    let listener = TcpListener::bind(listen_addr)
        .await
        .with_context(|| format!("failed to bind {listen_addr}"))?;
    let server = Server::serve(listener, service.clone())?;
    let reloader = reload::spawn(
        service,
        config.repository.clone(),
        config.refresh_interval(),
    );

    let endpoint = server.endpoint();
    tracing::info!(%endpoint, "tuf-gate listening");
    tracing::info!("auth endpoint: {endpoint}/auth");
    tracing::info!("health endpoint: {endpoint}/health");
    tracing::info!("debug endpoint: {endpoint}/debug");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown")?;
    tracing::info!("shutting down");

    reloader.abort();
    server.stop().await;
    Ok(())
}
