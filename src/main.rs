use std::net::SocketAddr;
use std::sync::Arc;

use saucier::provider::ProviderClient;
use saucier::{AppContext, Config, MemoryEntitlementStore, RestProviderClient};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    saucier::init_tracing();

    let config = Config::from_env();

    // Development default; production deployments implement
    // EntitlementStore against their document store.
    let store = Arc::new(MemoryEntitlementStore::new());

    let provider: Option<Arc<dyn ProviderClient>> = if config.provider.api_key.is_some() {
        Some(Arc::new(RestProviderClient::from_config(&config.provider)?))
    } else {
        tracing::warn!(
            target: "saucier",
            "No provider API key configured; pull reconciliation is disabled"
        );
        None
    };

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    let ctx = AppContext::new(config, store, provider);
    let app = saucier::http::router(ctx);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(target: "saucier", %addr, "Listening");
    axum::serve(listener, app).await?;

    Ok(())
}
