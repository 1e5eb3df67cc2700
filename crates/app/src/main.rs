use anyhow::Context;
use mesmer_app::runtime;
use mesmer_app::server::{create_router, ServerState};
use mesmer_foundation::config::MesmerConfig;
use mesmer_foundation::state::{LifecycleManager, ServiceState};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::writer::MakeWriterExt;

fn init_logging() -> Result<(), Box<dyn std::error::Error>> {
    std::fs::create_dir_all("logs")?;
    let file_appender = RollingFileAppender::new(Rotation::DAILY, "logs", "mesmer.log");
    let (non_blocking_file, _guard) = tracing_appender::non_blocking(file_appender);
    let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt()
        .with_writer(std::io::stdout.and(non_blocking_file))
        .with_env_filter(log_level)
        .init();
    std::mem::forget(_guard);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging().map_err(|e| anyhow::anyhow!("failed to initialize logging: {e}"))?;
    tracing::info!("Starting Mesmer service");

    let lifecycle = LifecycleManager::new();
    let config = MesmerConfig::load().context("loading configuration")?;
    let addr = format!("{}:{}", config.server.host, config.server.port);

    let handle = runtime::start(config).context("starting runtime")?;
    let state = ServerState::from_handle(&handle);
    let router = create_router(state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    lifecycle.transition(ServiceState::Running)?;
    tracing::info!("Listening on http://{addr}");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving")?;

    lifecycle.transition(ServiceState::Stopping)?;
    handle.shutdown();
    lifecycle.transition(ServiceState::Stopped)?;
    tracing::info!("Mesmer service stopped");
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("Shutdown signal received");
}
