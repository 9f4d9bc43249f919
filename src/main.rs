//! Live binary: preflight the environment, run the pipeline until SIGINT or
//! SIGTERM asks for a graceful stop.

use anyhow::Context;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use live_minutes::health;
use live_minutes::{Config, Pipeline};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::from_env();
    std::fs::create_dir_all(&config.data_dir)
        .with_context(|| format!("creating {}", config.data_dir.display()))?;
    std::fs::create_dir_all(&config.out_dir)
        .with_context(|| format!("creating {}", config.out_dir.display()))?;

    let mut pipeline = Pipeline::new(config.clone());

    // Fatal when the loopback device is missing; everything else only warns.
    if let Err(e) = health::run_preflight(&pipeline.health(), pipeline.lm(), &config.out_dir).await
    {
        error!(error = %e, "preflight failed");
        anyhow::bail!("preflight failed: {e}");
    }

    let signals = pipeline.signals();
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("shutdown requested");
        signals.request_stop();
    });

    pipeline.run().await;
    Ok(())
}

/// Resolves on SIGINT or SIGTERM.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut term = signal(SignalKind::terminate()).expect("install SIGTERM handler");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = term.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
