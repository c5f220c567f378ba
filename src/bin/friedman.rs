use anyhow::Context;
use friedman_agent::{init_logger, prelude::*};
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Friedman agent: register with the playing field, then answer round requests until
/// interrupted.
fn main() -> anyhow::Result<()> {
    let config = Configuration::from_env()?;
    init_logger(&config)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.workers())
        .thread_name("friedman-worker")
        .enable_all()
        .build()
        .context("building the runtime")?;

    runtime.block_on(run(config))
}

async fn run(config: Configuration) -> anyhow::Result<()> {
    let (tx, mut rx) = mpsc::unbounded_channel();
    ctrlc::set_handler(move || {
        let _ = tx.send(());
    })
    .context("installing signal handler")?;

    let agent = start_friedman(&config).await?;
    info!(
        "{} listening on port {}, announced as {}",
        agent.name(),
        agent.local_addr().port(),
        agent.address()
    );

    // a closed channel means the handler is gone, stop as well
    let _ = rx.recv().await;
    info!("shutdown requested");
    if !agent.shutdown().await {
        warn!("some requests were cut short");
    }

    Ok(())
}
