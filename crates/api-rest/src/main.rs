//! Standalone REST API server binary.
//!
//! ## Purpose
//! Runs the REST API server on its own.
//!
//! ## Intended use
//! Useful for development and debugging when you only want the REST server
//! (with OpenAPI/Swagger UI). The workspace's main `tvs-run` binary is the
//! production entry point.

use api_rest::{router, AppState};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use tvs_core::config::namespace_from_env_value;
use tvs_core::CoreConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env().add_directive("tvs=info".parse()?))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let addr = std::env::var("TVS_REST_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".into());
    let namespace = namespace_from_env_value(std::env::var("TVS_NAMESPACE").ok())?;
    let module_id = std::env::var("TVS_MODULE_ID")
        .unwrap_or_else(|_| tvs_core::config::CORE_MODULE_ID.to_owned());
    let config = CoreConfig::new(namespace, module_id)?;

    tracing::info!("++ Starting TVS REST on {}", addr);

    let app = router(AppState::new(config));
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
