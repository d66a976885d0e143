use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use api_rest::{router, AppState};
use tvs_core::config::{namespace_from_env_value, CORE_MODULE_ID};
use tvs_core::CoreConfig;

/// Main entry point for the TVS application
///
/// Starts the REST server (default port 3000) serving the branching,
/// compare, review, merge and component editing endpoints, plus Swagger UI
/// under `/swagger-ui`.
///
/// # Environment Variables
/// - `TVS_REST_ADDR`: REST server address (default: "0.0.0.0:3000")
/// - `TVS_NAMESPACE`: SNOMED CT namespace for newly generated identifiers
///   (default: unset, i.e. short-format International identifiers)
/// - `TVS_MODULE_ID`: module assigned to new components (default: the
///   SNOMED CT core module)
///
/// # Returns
/// * `Ok(())` - If the server starts and runs successfully
/// * `Err(anyhow::Error)` - If server startup or runtime fails
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env().add_directive("tvs=info".parse()?))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let rest_addr = std::env::var("TVS_REST_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".into());
    let namespace = namespace_from_env_value(std::env::var("TVS_NAMESPACE").ok())?;
    let module_id = std::env::var("TVS_MODULE_ID").unwrap_or_else(|_| CORE_MODULE_ID.to_owned());
    let config = CoreConfig::new(namespace, module_id)?;

    tracing::info!("++ Starting TVS REST on {}", rest_addr);

    let app = router(AppState::new(config));
    let listener = tokio::net::TcpListener::bind(&rest_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
