//! Branch policy handlers

use crate::dto::ApiResponse;
use crate::state::AppState;
use actix_web::{web, HttpResponse};
use salon_core::models::BranchConfigUpdate;
use salon_core::traits::CacheService;
use salon_core::AppError;
use tracing::{info, instrument};
use uuid::Uuid;

/// Effective policy of a branch, defaults included
///
/// GET /api/v1/branches/{id}/config
#[instrument(skip(state))]
pub async fn get_branch_config<C: CacheService + 'static>(
    state: web::Data<AppState<C>>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let config = state.policy.resolve(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(config)))
}

/// Update individual policy fields of a branch
///
/// PUT /api/v1/branches/{id}/config
#[instrument(skip(state, req))]
pub async fn update_branch_config<C: CacheService + 'static>(
    state: web::Data<AppState<C>>,
    path: web::Path<Uuid>,
    req: web::Json<BranchConfigUpdate>,
) -> Result<HttpResponse, AppError> {
    let branch_id = path.into_inner();
    let config = state.policy.update(branch_id, &req).await?;

    info!(%branch_id, "Branch configuration updated");

    Ok(HttpResponse::Ok().json(ApiResponse::with_message(config, "Configuration updated")))
}

/// Configure branch routes
pub fn configure<C: CacheService + 'static>(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::resource("/branches/{id}/config")
            .route(web::get().to(get_branch_config::<C>))
            .route(web::put().to(update_branch_config::<C>)),
    );
}
