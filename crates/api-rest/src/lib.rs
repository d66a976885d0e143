//! # API REST
//!
//! REST API implementation for the terminology versioning system.
//!
//! Handles:
//! - HTTP endpoints with axum
//! - OpenAPI/Swagger documentation
//! - REST-specific concerns (JSON serialization, CORS, error bodies)
//!
//! Core semantics live in `tvs-core`; this crate only maps them onto HTTP.

#![warn(rust_2018_idioms)]

pub mod dto;
pub mod error;
pub mod handlers;

use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tvs_core::{
    CompareService, CoreConfig, EditingService, JobRegistry, MergeService, ReviewService,
    RevisionStore,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

/// Application state shared across REST API handlers.
///
/// Holds one revision store and the services built on top of it. Cloning is
/// cheap; every clone operates on the same store.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<RevisionStore>,
    pub compare: CompareService,
    pub reviews: ReviewService,
    pub merges: MergeService,
    pub editing: EditingService,
    pub jobs: JobRegistry,
}

impl AppState {
    pub fn new(config: CoreConfig) -> Self {
        let store = Arc::new(RevisionStore::new());
        let compare = CompareService::new(Arc::clone(&store));
        let reviews = ReviewService::new(Arc::clone(&store));
        let merges = MergeService::new(Arc::clone(&store), reviews.clone());
        let editing = EditingService::new(
            Arc::clone(&store),
            Arc::new(sctid::SctIdGenerator::new()),
            config,
        );
        Self {
            store,
            compare,
            reviews,
            merges,
            editing,
            jobs: JobRegistry::new(),
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::health,
        handlers::create_branch,
        handlers::get_branch,
        handlers::delete_branch,
        handlers::compare,
        handlers::create_review,
        handlers::get_review,
        handlers::get_concept_changes,
        handlers::create_merge,
        handlers::get_merge,
        handlers::create_component,
        handlers::get_component,
        handlers::update_component,
        handlers::delete_component,
        handlers::start_import,
        handlers::start_export,
        handlers::get_job,
    ),
    components(schemas(
        dto::HealthRes,
        dto::CreateBranchReq,
        dto::BranchRes,
        dto::BranchChildrenRes,
        dto::CompareReq,
        dto::CompareRes,
        dto::ComponentRef,
        dto::CreateReviewReq,
        dto::ReviewRes,
        dto::ConceptChangesRes,
        dto::CreateMergeReq,
        dto::MergeRes,
        dto::ConflictRes,
        dto::CreateComponentReq,
        dto::UpdateComponentReq,
        dto::ComponentRes,
        dto::ComponentPayloadDto,
        dto::ImportReq,
        dto::ImportComponent,
        dto::ExportReq,
        dto::JobRes,
        error::ErrorRes,
    ))
)]
pub struct ApiDoc;

/// Builds the full application router, Swagger UI included.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/branches", post(handlers::create_branch))
        .route(
            "/branches/*path",
            get(handlers::get_branch).delete(handlers::delete_branch),
        )
        .route("/compare", post(handlers::compare))
        .route("/reviews", post(handlers::create_review))
        .route("/reviews/:id", get(handlers::get_review))
        .route(
            "/reviews/:id/concept-changes",
            get(handlers::get_concept_changes),
        )
        .route("/merges", post(handlers::create_merge))
        .route("/merges/:id", get(handlers::get_merge))
        .route("/components", post(handlers::create_component))
        .route(
            "/components/:category/:id",
            get(handlers::get_component)
                .put(handlers::update_component)
                .delete(handlers::delete_component),
        )
        .route("/imports", post(handlers::start_import))
        .route("/exports", post(handlers::start_export))
        .route("/jobs/:id", get(handlers::get_job))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
