use std::net::SocketAddr;

use anyhow::Context;
use tokio::net::TcpListener;
use tracing::info;

use crate::{AppState, config::GalleryConfig, routes};

pub struct Server;

impl Server {
    pub async fn run(config: GalleryConfig) -> anyhow::Result<()> {
        tokio::fs::create_dir_all(&config.uploads_dir)
            .await
            .with_context(|| {
                format!(
                    "failed to create uploads directory {}",
                    config.uploads_dir.display()
                )
            })?;

        let listen_addr = config.listen_addr.clone();
        let uploads_dir = config.uploads_dir.clone();
        let router = routes::router(AppState::new(config));

        let listener = TcpListener::bind(&listen_addr)
            .await
            .with_context(|| format!("failed to bind {listen_addr}"))?;
        info!(
            listen_addr = %listen_addr,
            uploads_dir = %uploads_dir.display(),
            "Gallery server listening"
        );

        axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

        info!("Gallery server stopped");
        Ok(())
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
