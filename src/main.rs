use anyhow::Context;
use pbs_rag::{
    api::{self, RouterOptions},
    config, logging,
    pipeline::RagPipeline,
};
use std::sync::Arc;
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    logging::init_tracing();
    let config = config::init_config().context("Failed to load configuration")?;

    let pipeline = Arc::new(
        RagPipeline::from_config(config)
            .await
            .context("Failed to build pipeline")?,
    );
    spawn_index_warmup(&pipeline, config.index_startup_delay);

    let app = api::create_router(pipeline, RouterOptions::from_config(config));
    let (listener, port) = bind_listener().await.context("Failed to bind listener")?;
    tracing::info!("Listening on http://0.0.0.0:{}", port);
    axum::serve(listener, app).await.context("Server error")?;
    Ok(())
}

/// Connect to the vector index once the settling delay has passed; requests are served meanwhile.
fn spawn_index_warmup(pipeline: &RagPipeline, delay: std::time::Duration) {
    let index = pipeline.index();
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        match index.ensure_ready().await {
            Ok(()) => tracing::info!("Vector index ready"),
            Err(error) => {
                tracing::warn!(error = %error, "Vector index not ready; will retry on demand")
            }
        }
    });
}

async fn bind_listener() -> Result<(TcpListener, u16), std::io::Error> {
    use std::net::Ipv4Addr;

    let config = config::get_config();
    if let Some(port) = config.server_port {
        return TcpListener::bind((Ipv4Addr::UNSPECIFIED, port))
            .await
            .map(|listener| (listener, port));
    }

    const PORT_RANGE: std::ops::RangeInclusive<u16> = 8000..=8099;
    for port in PORT_RANGE {
        match TcpListener::bind((Ipv4Addr::UNSPECIFIED, port)).await {
            Ok(listener) => {
                tracing::debug!(port, "Bound server port");
                return Ok((listener, port));
            }
            Err(err) if err.kind() == std::io::ErrorKind::AddrInUse => {
                tracing::debug!(port, "Port already in use; trying next");
                continue;
            }
            Err(err) => return Err(err),
        }
    }

    Err(std::io::Error::new(
        std::io::ErrorKind::AddrNotAvailable,
        "No available port found in range 8000-8099",
    ))
}
