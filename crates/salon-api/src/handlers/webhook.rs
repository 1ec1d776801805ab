//! Gateway webhook receiver
//!
//! The body is passed through untouched; signatures are computed over the
//! exact bytes the gateway sent.

use crate::state::AppState;
use actix_web::{web, HttpRequest, HttpResponse};
use salon_core::traits::CacheService;
use salon_core::AppError;
use serde_json::json;
use tracing::{info, instrument, warn};

/// Signature headers, checked in order
pub const SIGNATURE_HEADERS: [&str; 3] = ["x-razorpay-signature", "stripe-signature", "x-signature"];

/// First signature header present on the request
pub fn signature_header(req: &HttpRequest) -> Option<&str> {
    SIGNATURE_HEADERS
        .iter()
        .find_map(|name| req.headers().get(*name))
        .and_then(|value| value.to_str().ok())
}

/// Apply a gateway callback
///
/// POST /api/v1/webhooks/{gateway}
#[instrument(skip(state, req, body))]
pub async fn receive_webhook<C: CacheService + 'static>(
    state: web::Data<AppState<C>>,
    path: web::Path<String>,
    req: HttpRequest,
    body: web::Bytes,
) -> Result<HttpResponse, AppError> {
    let gateway = path.into_inner();
    let signature = signature_header(&req).ok_or_else(|| {
        warn!(%gateway, "Webhook without signature header");
        AppError::InvalidSignature("missing signature header".to_string())
    })?;

    let outcome = state
        .payments
        .handle_webhook(&gateway, &body, signature)
        .await?;

    info!(%gateway, ?outcome, "Webhook processed");

    Ok(HttpResponse::Ok().json(json!({ "outcome": outcome })))
}

/// Configure webhook routes
pub fn configure<C: CacheService + 'static>(cfg: &mut web::ServiceConfig) {
    cfg.route("/webhooks/{gateway}", web::post().to(receive_webhook::<C>));
}
