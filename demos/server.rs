//! Example server: loads the API config from env (`CONFIG_PATH`, `DATABASE_URL`, `PORT`, `API_BASE`)
//! and serves it. Uses Postgres when a database URL is configured, otherwise an in-memory store.

use docrest::{api_router, from_env, AppState, DocumentStore, MemoryStore, PgDocumentStore, ReadySignal};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("docrest=info".parse()?))
        .init();

    let config = from_env().await?;
    let port = config.port;
    let body_limit = config.max_body_bytes;

    let pg = match &config.database.url {
        Some(url) => Some(PgDocumentStore::connect_lazy(url, config.database.schema.clone())?),
        None => None,
    };
    let (store, ready): (Arc<dyn DocumentStore>, ReadySignal) = match &pg {
        Some(pg) => (Arc::new(pg.clone()), ReadySignal::new()),
        None => {
            tracing::warn!("no database configured; using in-memory store");
            (Arc::new(MemoryStore::new()), ReadySignal::ready())
        }
    };

    let state = AppState::new(config, store, ready.clone())?;

    // Tables are created in the background; resource requests get 503 until then.
    if let Some(pg) = pg {
        let collections: Vec<String> = state.registry.iter().map(|r| r.name.clone()).collect();
        tokio::spawn(async move {
            if let Err(e) = pg.prepare(collections.iter().map(String::as_str), &ready).await {
                tracing::error!(error = %e, "document store failed to initialize");
            }
        });
    }

    let app = api_router(state)
        .layer(RequestBodyLimitLayer::new(body_limit))
        .layer(TraceLayer::new_for_http());

    let listener = TcpListener::bind(("0.0.0.0", port)).await?;
    tracing::info!("listening on {}", listener.local_addr()?);
    axum::serve(listener, app).await?;
    Ok(())
}
