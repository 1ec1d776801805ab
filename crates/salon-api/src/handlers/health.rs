//! Liveness endpoint

use actix_web::HttpResponse;
use serde_json::json;

/// Health check endpoint
///
/// GET /api/v1/health
pub async fn health_check() -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "status": "healthy",
        "service": "salon-booking",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
