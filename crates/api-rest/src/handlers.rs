//! Request handlers.
//!
//! Handlers stay thin: extract, call the core service, map the result. All
//! error mapping lives in [`crate::error::ApiError`]. Long-running work
//! (review snapshots, merges, imports) is pushed onto blocking tasks and
//! polled by the client.

use crate::dto::*;
use crate::error::{ApiError, ErrorRes};
use crate::AppState;
use axum::extract::{Path as AxumPath, Query, State};
use axum::http::{header::LOCATION, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use serde::Deserialize;
use tvs_core::{ComponentIdentifier, EditContext, MergeRequest};

#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, description = "Service is up", body = HealthRes))
)]
pub async fn health() -> Json<HealthRes> {
    Json(HealthRes {
        status: "ok".to_owned(),
    })
}

// --- branches ---

#[utoipa::path(
    post,
    path = "/branches",
    request_body = CreateBranchReq,
    responses(
        (status = 201, description = "Branch created", body = BranchRes),
        (status = 400, description = "Invalid path", body = ErrorRes),
        (status = 404, description = "Parent branch not found", body = ErrorRes),
        (status = 409, description = "Branch already exists", body = ErrorRes)
    )
)]
pub async fn create_branch(
    State(state): State<AppState>,
    Json(req): Json<CreateBranchReq>,
) -> Result<Response, ApiError> {
    let branch = state
        .store
        .create_branch(&req.parent, &req.name, req.metadata)?;
    let location = format!("/branches/{}", branch.path);
    let body = BranchRes::from_branch(branch, None);
    Ok((StatusCode::CREATED, [(LOCATION, location)], Json(body)).into_response())
}

#[utoipa::path(
    get,
    path = "/branches/{path}",
    params(("path" = String, Path, description = "Branch path, or a path suffixed with /children")),
    responses(
        (status = 200, description = "The branch, or its direct children", body = BranchRes),
        (status = 404, description = "Branch not found", body = ErrorRes)
    )
)]
pub async fn get_branch(
    State(state): State<AppState>,
    AxumPath(path): AxumPath<String>,
) -> Result<Response, ApiError> {
    // An existing branch wins over the /children interpretation, so a child
    // literally named "children" stays addressable.
    if let Ok(branch) = state.store.get_branch(&path) {
        let branch_state = state.store.branch_state(&path).ok();
        return Ok(Json(BranchRes::from_branch(branch, branch_state)).into_response());
    }
    if let Some(parent) = path.strip_suffix("/children") {
        let children = state.store.children(parent)?;
        let items = children
            .into_iter()
            .map(|branch| {
                let branch_state = state.store.branch_state(&branch.path).ok();
                BranchRes::from_branch(branch, branch_state)
            })
            .collect();
        return Ok(Json(BranchChildrenRes { items }).into_response());
    }
    Err(tvs_core::TvsError::BranchNotFound(path).into())
}

#[utoipa::path(
    delete,
    path = "/branches/{path}",
    params(("path" = String, Path, description = "Branch path")),
    responses(
        (status = 204, description = "Branch deleted"),
        (status = 400, description = "MAIN cannot be deleted", body = ErrorRes),
        (status = 404, description = "Branch not found", body = ErrorRes)
    )
)]
pub async fn delete_branch(
    State(state): State<AppState>,
    AxumPath(path): AxumPath<String>,
) -> Result<StatusCode, ApiError> {
    state.store.delete_branch(&path)?;
    Ok(StatusCode::NO_CONTENT)
}

// --- compare ---

#[utoipa::path(
    post,
    path = "/compare",
    request_body = CompareReq,
    responses(
        (status = 200, description = "Branch delta", body = CompareRes),
        (status = 404, description = "Branch not found", body = ErrorRes)
    )
)]
pub async fn compare(
    State(state): State<AppState>,
    Json(req): Json<CompareReq>,
) -> Result<Json<CompareRes>, ApiError> {
    let result = state.compare.compare(&req.base, &req.compare)?;
    Ok(Json(result.into()))
}

// --- reviews ---

#[utoipa::path(
    post,
    path = "/reviews",
    request_body = CreateReviewReq,
    responses(
        (status = 201, description = "Review scheduled", body = ReviewRes),
        (status = 400, description = "Branches invalid or unrelated", body = ErrorRes)
    )
)]
pub async fn create_review(
    State(state): State<AppState>,
    Json(req): Json<CreateReviewReq>,
) -> Result<Response, ApiError> {
    let review = state.reviews.create(&req.source, &req.target)?;
    let reviews = state.reviews.clone();
    let id = review.id.clone();
    tokio::task::spawn_blocking(move || {
        if let Err(error) = reviews.compute(&id) {
            tracing::warn!(review = %id, %error, "review computation aborted");
        }
    });
    let location = format!("/reviews/{}", review.id);
    Ok((StatusCode::CREATED, [(LOCATION, location)], Json(ReviewRes::from(review)))
        .into_response())
}

#[utoipa::path(
    get,
    path = "/reviews/{id}",
    params(("id" = String, Path, description = "Review id")),
    responses(
        (status = 200, description = "The review", body = ReviewRes),
        (status = 404, description = "Review not found", body = ErrorRes)
    )
)]
pub async fn get_review(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<String>,
) -> Result<Json<ReviewRes>, ApiError> {
    Ok(Json(state.reviews.get(&id)?.into()))
}

#[utoipa::path(
    get,
    path = "/reviews/{id}/concept-changes",
    params(("id" = String, Path, description = "Review id")),
    responses(
        (status = 200, description = "Concept-level changes", body = ConceptChangesRes),
        (status = 404, description = "Review not found", body = ErrorRes),
        (status = 409, description = "Review not computed yet", body = ErrorRes)
    )
)]
pub async fn get_concept_changes(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<String>,
) -> Result<Json<ConceptChangesRes>, ApiError> {
    Ok(Json(state.reviews.concept_changes(&id)?.into()))
}

// --- merges ---

#[utoipa::path(
    post,
    path = "/merges",
    request_body = CreateMergeReq,
    responses(
        (status = 201, description = "Merge scheduled; poll the Location header", body = MergeRes),
        (status = 400, description = "Branches invalid or unrelated", body = ErrorRes),
        (status = 404, description = "Branch not found", body = ErrorRes),
        (status = 409, description = "Review not current", body = ErrorRes)
    )
)]
pub async fn create_merge(
    State(state): State<AppState>,
    Json(req): Json<CreateMergeReq>,
) -> Result<Response, ApiError> {
    let request = MergeRequest {
        source: req.source,
        target: req.target,
        commit_comment: req.commit_comment,
        review_id: req.review_id,
    };
    let merge = state.merges.create(request.clone())?;
    let merges = state.merges.clone();
    let id = merge.id.clone();
    tokio::task::spawn_blocking(move || {
        if let Err(error) = merges.run(&id, &request) {
            tracing::warn!(merge = %id, %error, "merge run aborted");
        }
    });
    let location = format!("/merges/{}", merge.id);
    Ok((StatusCode::CREATED, [(LOCATION, location)], Json(MergeRes::from(merge)))
        .into_response())
}

#[utoipa::path(
    get,
    path = "/merges/{id}",
    params(("id" = String, Path, description = "Merge id")),
    responses(
        (status = 200, description = "The merge job", body = MergeRes),
        (status = 404, description = "Merge not found", body = ErrorRes)
    )
)]
pub async fn get_merge(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<String>,
) -> Result<Json<MergeRes>, ApiError> {
    Ok(Json(state.merges.get(&id)?.into()))
}

// --- components ---

#[derive(Deserialize)]
pub struct BranchQuery {
    pub branch: String,
}

#[derive(Deserialize)]
pub struct EditQuery {
    pub branch: String,
    pub author: String,
    pub comment: String,
}

#[utoipa::path(
    post,
    path = "/components",
    request_body = CreateComponentReq,
    responses(
        (status = 201, description = "Component created", body = ComponentRes),
        (status = 400, description = "Invalid payload", body = ErrorRes),
        (status = 404, description = "Branch or referenced component not found", body = ErrorRes)
    )
)]
pub async fn create_component(
    State(state): State<AppState>,
    Json(req): Json<CreateComponentReq>,
) -> Result<Response, ApiError> {
    let payload = req.payload.into_payload().map_err(ApiError::bad_request)?;
    let context = EditContext {
        branch_path: req.branch.clone(),
        author: req.author,
        comment: req.comment,
    };
    let component = state.editing.create(&context, payload)?;
    let location = format!("/components/{}/{}", component.category, component.id);
    let body = ComponentRes {
        category: component.category.to_string(),
        id: component.id,
        branch: req.branch,
        payload: None,
    };
    Ok((StatusCode::CREATED, [(LOCATION, location)], Json(body)).into_response())
}

#[utoipa::path(
    get,
    path = "/components/{category}/{id}",
    params(
        ("category" = String, Path, description = "Component category"),
        ("id" = String, Path, description = "Component id"),
        ("branch" = String, Query, description = "Branch to read from")
    ),
    responses(
        (status = 200, description = "The component", body = ComponentRes),
        (status = 404, description = "Component not found on branch", body = ErrorRes)
    )
)]
pub async fn get_component(
    State(state): State<AppState>,
    AxumPath((category, id)): AxumPath<(String, String)>,
    Query(query): Query<BranchQuery>,
) -> Result<Json<ComponentRes>, ApiError> {
    let category = parse_category(&category).map_err(ApiError::bad_request)?;
    let component = ComponentIdentifier::new(category, id);
    let payload = state.store.get_component(&query.branch, &component)?;
    Ok(Json(ComponentRes {
        category: component.category.to_string(),
        id: component.id,
        branch: query.branch,
        payload: Some(ComponentPayloadDto::from_payload(&payload)),
    }))
}

#[utoipa::path(
    put,
    path = "/components/{category}/{id}",
    params(
        ("category" = String, Path, description = "Component category"),
        ("id" = String, Path, description = "Component id")
    ),
    request_body = UpdateComponentReq,
    responses(
        (status = 204, description = "Component updated"),
        (status = 400, description = "Invalid payload", body = ErrorRes),
        (status = 404, description = "Component not found on branch", body = ErrorRes)
    )
)]
pub async fn update_component(
    State(state): State<AppState>,
    AxumPath((category, id)): AxumPath<(String, String)>,
    Json(req): Json<UpdateComponentReq>,
) -> Result<StatusCode, ApiError> {
    let category = parse_category(&category).map_err(ApiError::bad_request)?;
    let payload = req.payload.into_payload().map_err(ApiError::bad_request)?;
    let context = EditContext {
        branch_path: req.branch,
        author: req.author,
        comment: req.comment,
    };
    state
        .editing
        .update(&context, &ComponentIdentifier::new(category, id), payload)?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    delete,
    path = "/components/{category}/{id}",
    params(
        ("category" = String, Path, description = "Component category"),
        ("id" = String, Path, description = "Component id"),
        ("branch" = String, Query, description = "Branch to delete from"),
        ("author" = String, Query, description = "Commit author"),
        ("comment" = String, Query, description = "Commit comment")
    ),
    responses(
        (status = 204, description = "Component (and its dependants) deleted"),
        (status = 404, description = "Component not found on branch", body = ErrorRes)
    )
)]
pub async fn delete_component(
    State(state): State<AppState>,
    AxumPath((category, id)): AxumPath<(String, String)>,
    Query(query): Query<EditQuery>,
) -> Result<StatusCode, ApiError> {
    let category = parse_category(&category).map_err(ApiError::bad_request)?;
    let context = EditContext {
        branch_path: query.branch,
        author: query.author,
        comment: query.comment,
    };
    state
        .editing
        .delete(&context, &ComponentIdentifier::new(category, id))?;
    Ok(StatusCode::NO_CONTENT)
}

// --- jobs ---

#[utoipa::path(
    post,
    path = "/imports",
    request_body = ImportReq,
    responses(
        (status = 201, description = "Import job started; poll the Location header", body = JobRes),
        (status = 400, description = "Invalid component list", body = ErrorRes),
        (status = 404, description = "Branch not found", body = ErrorRes)
    )
)]
pub async fn start_import(
    State(state): State<AppState>,
    Json(req): Json<ImportReq>,
) -> Result<Response, ApiError> {
    // Fail fast on anything the client can fix before a job exists.
    state.store.get_branch(&req.branch)?;
    let mut components = Vec::with_capacity(req.components.len());
    for entry in req.components {
        let category = parse_category(&entry.category).map_err(ApiError::bad_request)?;
        let payload = entry.payload.into_payload().map_err(ApiError::bad_request)?;
        components.push((ComponentIdentifier::new(category, entry.id), payload));
    }

    let job = state.jobs.start("import");
    let jobs = state.jobs.clone();
    let editing = state.editing.clone();
    let context = EditContext {
        branch_path: req.branch,
        author: req.author,
        comment: req.comment,
    };
    let job_id = job.id.clone();
    tokio::task::spawn_blocking(move || {
        let outcome = match editing.bulk_load(&context, components) {
            Ok(count) => jobs.complete(&job_id, format!("{count} components imported")),
            Err(error) => jobs.fail(&job_id, error.to_string()),
        };
        if let Err(error) = outcome {
            tracing::error!(job = %job_id, %error, "import job bookkeeping failed");
        }
    });

    let location = format!("/jobs/{}", job.id);
    Ok((StatusCode::CREATED, [(LOCATION, location)], Json(JobRes::from(job))).into_response())
}

#[utoipa::path(
    post,
    path = "/exports",
    request_body = ExportReq,
    responses(
        (status = 201, description = "Export job started; poll the Location header", body = JobRes),
        (status = 404, description = "Branch not found", body = ErrorRes)
    )
)]
pub async fn start_export(
    State(state): State<AppState>,
    Json(req): Json<ExportReq>,
) -> Result<Response, ApiError> {
    state.store.get_branch(&req.branch)?;

    let job = state.jobs.start("export");
    let jobs = state.jobs.clone();
    let store = state.store.clone();
    let job_id = job.id.clone();
    tokio::task::spawn_blocking(move || {
        let outcome = match store.state_of(&req.branch) {
            Ok(components) => {
                jobs.complete(&job_id, format!("{} components exported", components.len()))
            }
            Err(error) => jobs.fail(&job_id, error.to_string()),
        };
        if let Err(error) = outcome {
            tracing::error!(job = %job_id, %error, "export job bookkeeping failed");
        }
    });

    let location = format!("/jobs/{}", job.id);
    Ok((StatusCode::CREATED, [(LOCATION, location)], Json(JobRes::from(job))).into_response())
}

#[utoipa::path(
    get,
    path = "/jobs/{id}",
    params(("id" = String, Path, description = "Job id")),
    responses(
        (status = 200, description = "The job", body = JobRes),
        (status = 404, description = "Job not found", body = ErrorRes)
    )
)]
pub async fn get_job(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<String>,
) -> Result<Json<JobRes>, ApiError> {
    Ok(Json(state.jobs.get(&id)?.into()))
}
