//! Booking handlers
//!
//! HTTP handlers for the booking lifecycle and stylist availability.

use crate::dto::{
    ApiResponse, BookingResponse, CancelBookingDto, CreateBookingDto, PaginationParams,
    RescheduleBookingDto, SlotQueryParams, SlotResponse,
};
use crate::state::AppState;
use actix_web::{web, HttpResponse};
use salon_core::traits::{CacheService, PaginatedResponse};
use salon_core::AppError;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

/// Create a booking in `initiated` status
///
/// POST /api/v1/bookings
#[instrument(skip(state, req))]
pub async fn create_booking<C: CacheService + 'static>(
    state: web::Data<AppState<C>>,
    req: web::Json<CreateBookingDto>,
) -> Result<HttpResponse, AppError> {
    req.validate().map_err(|e| {
        warn!("Booking validation failed: {}", e);
        AppError::Validation(e.to_string())
    })?;

    let req = req.into_inner();
    debug!(user_id = %req.user_id, branch_id = %req.branch_id, items = req.items.len(), "Creating booking");

    let booking = state.bookings.create(req.into()).await?;

    info!(booking_id = %booking.id, total = %booking.total_amount, "Booking created");

    Ok(HttpResponse::Created().json(ApiResponse::success(BookingResponse::from(booking))))
}

/// Get a booking with its line items
///
/// GET /api/v1/bookings/{id}
#[instrument(skip(state))]
pub async fn get_booking<C: CacheService + 'static>(
    state: web::Data<AppState<C>>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let booking = state.bookings.get(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(BookingResponse::from(booking))))
}

/// Audit trail of a booking, oldest first
///
/// GET /api/v1/bookings/{id}/history
#[instrument(skip(state))]
pub async fn booking_history<C: CacheService + 'static>(
    state: web::Data<AppState<C>>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let history = state.bookings.history(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(history)))
}

/// List the bookings of a user, newest first
///
/// GET /api/v1/users/{id}/bookings
#[instrument(skip(state))]
pub async fn list_user_bookings<C: CacheService + 'static>(
    state: web::Data<AppState<C>>,
    path: web::Path<Uuid>,
    query: web::Query<PaginationParams>,
) -> Result<HttpResponse, AppError> {
    query.validate().map_err(|e| {
        warn!("Pagination validation failed: {}", e);
        AppError::Validation(e.to_string())
    })?;

    let page = state
        .bookings
        .list_by_user(path.into_inner(), query.to_pagination())
        .await?;

    let response = PaginatedResponse {
        data: page
            .data
            .into_iter()
            .map(BookingResponse::from)
            .collect::<Vec<_>>(),
        pagination: page.pagination,
    };

    Ok(HttpResponse::Ok().json(response))
}

/// Cancel a booking
///
/// POST /api/v1/bookings/{id}/cancel
#[instrument(skip(state, req))]
pub async fn cancel_booking<C: CacheService + 'static>(
    state: web::Data<AppState<C>>,
    path: web::Path<Uuid>,
    req: Option<web::Json<CancelBookingDto>>,
) -> Result<HttpResponse, AppError> {
    let req = req.map(web::Json::into_inner).unwrap_or_default();
    req.validate()?;

    let booking = state
        .bookings
        .cancel(path.into_inner(), req.actor_id, req.reason)
        .await?;

    Ok(HttpResponse::Ok().json(ApiResponse::with_message(
        BookingResponse::from(booking),
        "Booking canceled",
    )))
}

/// Move a confirmed booking onto new slots
///
/// POST /api/v1/bookings/{id}/reschedule
#[instrument(skip(state, req))]
pub async fn reschedule_booking<C: CacheService + 'static>(
    state: web::Data<AppState<C>>,
    path: web::Path<Uuid>,
    req: web::Json<RescheduleBookingDto>,
) -> Result<HttpResponse, AppError> {
    req.validate().map_err(|e| {
        warn!("Reschedule validation failed: {}", e);
        AppError::Validation(e.to_string())
    })?;

    let booking = state
        .bookings
        .reschedule(path.into_inner(), req.into_inner().into())
        .await?;

    Ok(HttpResponse::Ok().json(ApiResponse::with_message(
        BookingResponse::from(booking),
        "Booking rescheduled",
    )))
}

/// Bookable slots of a stylist on a date
///
/// GET /api/v1/stylists/{id}/slots?date=YYYY-MM-DD
#[instrument(skip(state))]
pub async fn stylist_slots<C: CacheService + 'static>(
    state: web::Data<AppState<C>>,
    path: web::Path<Uuid>,
    query: web::Query<SlotQueryParams>,
) -> Result<HttpResponse, AppError> {
    query.validate()?;

    let slots = state
        .availability
        .available_slots(path.into_inner(), query.date, query.duration_minutes)
        .await?;

    let slots: Vec<SlotResponse> = slots.into_iter().map(Into::into).collect();
    Ok(HttpResponse::Ok().json(ApiResponse::success(slots)))
}

/// Configure booking routes
pub fn configure<C: CacheService + 'static>(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/bookings")
            .route("", web::post().to(create_booking::<C>))
            .route("/{id}", web::get().to(get_booking::<C>))
            .route("/{id}/history", web::get().to(booking_history::<C>))
            .route("/{id}/cancel", web::post().to(cancel_booking::<C>))
            .route("/{id}/reschedule", web::post().to(reschedule_booking::<C>)),
    )
    .route("/users/{id}/bookings", web::get().to(list_user_bookings::<C>))
    .route("/stylists/{id}/slots", web::get().to(stylist_slots::<C>));
}
