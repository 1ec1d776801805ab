//! Payment handlers
//!
//! Initiation, confirmation, retry and refunds. Every mutating endpoint is
//! keyed by a client idempotency key carried in the body.

use crate::dto::{
    ApiResponse, ConfirmPaymentDto, InitiatePaymentDto, InitiationResponse, PaymentResponse,
    RefundDto, RefundResponse,
};
use crate::state::AppState;
use actix_web::{web, HttpResponse};
use salon_core::traits::CacheService;
use salon_core::AppError;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

/// Start a payment for an `initiated` booking
///
/// POST /api/v1/payments
#[instrument(skip(state, req), fields(key = %req.idempotency_key))]
pub async fn initiate_payment<C: CacheService + 'static>(
    state: web::Data<AppState<C>>,
    req: web::Json<InitiatePaymentDto>,
) -> Result<HttpResponse, AppError> {
    req.validate().map_err(|e| {
        warn!("Payment validation failed: {}", e);
        AppError::Validation(e.to_string())
    })?;

    let initiation = state.payments.initiate(req.into_inner().into()).await?;

    info!(
        payment_id = %initiation.payment.id,
        status = %initiation.payment.status,
        "Payment initiation answered"
    );

    Ok(HttpResponse::Created().json(ApiResponse::success(InitiationResponse::from(initiation))))
}

/// Get a payment
///
/// GET /api/v1/payments/{id}
#[instrument(skip(state))]
pub async fn get_payment<C: CacheService + 'static>(
    state: web::Data<AppState<C>>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let payment = state.payments.get(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(PaymentResponse::from(payment))))
}

/// Gateway attempts of a payment
///
/// GET /api/v1/payments/{id}/attempts
#[instrument(skip(state))]
pub async fn list_attempts<C: CacheService + 'static>(
    state: web::Data<AppState<C>>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let attempts = state.payments.attempts(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(attempts)))
}

/// Client-side confirmation after the gateway redirect
///
/// POST /api/v1/payments/{id}/confirm
#[instrument(skip(state, req))]
pub async fn confirm_payment<C: CacheService + 'static>(
    state: web::Data<AppState<C>>,
    path: web::Path<Uuid>,
    req: web::Json<ConfirmPaymentDto>,
) -> Result<HttpResponse, AppError> {
    req.validate()?;

    let payment = state
        .payments
        .confirm(path.into_inner(), &req.gateway_payment_id)
        .await?;

    debug!(payment_id = %payment.id, status = %payment.status, "Payment confirmation processed");

    Ok(HttpResponse::Ok().json(ApiResponse::success(PaymentResponse::from(payment))))
}

/// Retry a failed payment
///
/// POST /api/v1/payments/{id}/retry
#[instrument(skip(state))]
pub async fn retry_payment<C: CacheService + 'static>(
    state: web::Data<AppState<C>>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let initiation = state.payments.retry(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(InitiationResponse::from(initiation))))
}

/// Refund part or all of a successful payment
///
/// POST /api/v1/payments/{id}/refunds
#[instrument(skip(state, req), fields(key = %req.idempotency_key))]
pub async fn refund_payment<C: CacheService + 'static>(
    state: web::Data<AppState<C>>,
    path: web::Path<Uuid>,
    req: web::Json<RefundDto>,
) -> Result<HttpResponse, AppError> {
    req.validate().map_err(|e| {
        warn!("Refund validation failed: {}", e);
        AppError::Validation(e.to_string())
    })?;

    let refund = state
        .payments
        .refund(path.into_inner(), req.into_inner().into())
        .await?;

    Ok(HttpResponse::Created().json(ApiResponse::success(RefundResponse::from(refund))))
}

/// Configure payment routes
pub fn configure<C: CacheService + 'static>(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/payments")
            .route("", web::post().to(initiate_payment::<C>))
            .route("/{id}", web::get().to(get_payment::<C>))
            .route("/{id}/attempts", web::get().to(list_attempts::<C>))
            .route("/{id}/confirm", web::post().to(confirm_payment::<C>))
            .route("/{id}/retry", web::post().to(retry_payment::<C>))
            .route("/{id}/refunds", web::post().to(refund_payment::<C>)),
    );
}
