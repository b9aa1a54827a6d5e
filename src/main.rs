use anyhow::Context;
use ferrumslot::{server, web, Config, Services};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_args(std::env::args().skip(1))?;

    // RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.as_str()));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!(node = %config.node_id, "FerrumSlot starting...");

    let ownership = config.ownership().context("invalid cluster configuration")?;
    if ownership.is_clustered() {
        info!(
            ranges = ownership.local_ranges().len(),
            "cluster mode enabled"
        );
    }

    let services = Services::start(Arc::new(ownership)).context("failed to start the kernel")?;

    let resp_addr = config.bind.clone();
    let resp_services = services.clone();
    let resp_handle = tokio::spawn(async move {
        if let Err(e) = server::run(&resp_addr, resp_services).await {
            error!("RESP server error: {}", e);
        }
    });

    let Some(web_addr) = config.web_bind.clone() else {
        let _ = resp_handle.await;
        error!("RESP server stopped");
        return Ok(());
    };

    let web_handle = tokio::spawn(async move {
        if let Err(e) = web::run_web_server(&web_addr, services).await {
            error!("Web server error: {}", e);
        }
    });

    tokio::select! {
        _ = resp_handle => error!("RESP server stopped"),
        _ = web_handle => error!("Web server stopped"),
    }

    Ok(())
}
