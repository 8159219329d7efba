use std::{net::SocketAddr, sync::Arc, time::Duration};

use mixtts_core::{LinguaDetector, PipelineConfig};
use mixtts_server::{build_router, config::ServerConfig, AppState};
use tokio::net::TcpListener;
use tracing::info;

/// How often expired jobs are swept from the registry.
const EVICTION_PERIOD: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let _ = dotenv::dotenv();

    async_main().await
}

async fn async_main() -> anyhow::Result<()> {
    info!("Starting mixed-language narration server...");

    let pipeline = PipelineConfig::from_env();
    info!(
        "Pipeline: engine={:?}, gap={}ms, tempo={}, rate={}Hz, concurrency={}",
        pipeline.engine,
        pipeline.assembler.boundary_gap_ms,
        pipeline.assembler.tempo,
        pipeline.assembler.output_sample_rate,
        pipeline.orchestrator.max_concurrent_synthesis
    );

    info!("Loading language detector...");
    let detector = tokio::task::spawn_blocking(LinguaDetector::new).await?;
    let orchestrator = pipeline.build_orchestrator(Arc::new(detector))?;
    orchestrator.spawn_eviction(pipeline.job_ttl, EVICTION_PERIOD);

    let config = ServerConfig::from_env();
    info!(
        "Server configuration loaded: port={}, rate_limit={}/min, request_timeout={}s",
        config.port, config.rate_limit_per_minute, config.request_timeout_secs
    );

    let port = config.port;
    let app = build_router(AppState::new(orchestrator, config))?;

    let addr: SocketAddr = format!("0.0.0.0:{}", port).parse()?;
    let listener = TcpListener::bind(addr).await.map_err(|e| {
        anyhow::anyhow!("Failed to bind {addr}: {e}. Try a different PORT.")
    })?;

    info!("Server listening on http://{addr}");
    axum::serve(listener, app).await?;
    Ok(())
}
