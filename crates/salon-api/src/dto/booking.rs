//! Booking DTOs
//!
//! Request and response types for booking and slot endpoints.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use salon_core::models::{
    Booking, BookingLineItem, BookingPaymentStatus, BookingStatus, TimeRange,
};
use salon_services::{BookingItemRequest, CreateBookingRequest, RescheduleRequest};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// One requested appointment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingItemDto {
    pub service_id: Uuid,
    pub stylist_id: Uuid,
    pub start_time: DateTime<Utc>,
}

impl From<BookingItemDto> for BookingItemRequest {
    fn from(dto: BookingItemDto) -> Self {
        Self {
            service_id: dto.service_id,
            stylist_id: dto.stylist_id,
            start_time: dto.start_time,
        }
    }
}

/// Booking creation request
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateBookingDto {
    pub user_id: Uuid,
    pub branch_id: Uuid,

    #[validate(length(min = 1, max = 10, message = "between 1 and 10 items are required"))]
    pub items: Vec<BookingItemDto>,

    #[validate(length(max = 500))]
    pub note: Option<String>,
}

impl From<CreateBookingDto> for CreateBookingRequest {
    fn from(dto: CreateBookingDto) -> Self {
        Self {
            user_id: dto.user_id,
            branch_id: dto.branch_id,
            items: dto.items.into_iter().map(Into::into).collect(),
            note: dto.note,
        }
    }
}

/// Booking cancellation request
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct CancelBookingDto {
    pub actor_id: Option<Uuid>,

    #[validate(length(max = 500))]
    pub reason: Option<String>,
}

/// Booking reschedule request
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct RescheduleBookingDto {
    #[validate(length(min = 1, max = 10, message = "between 1 and 10 items are required"))]
    pub items: Vec<BookingItemDto>,

    pub actor_id: Option<Uuid>,

    #[validate(length(max = 500))]
    pub reason: Option<String>,
}

impl From<RescheduleBookingDto> for RescheduleRequest {
    fn from(dto: RescheduleBookingDto) -> Self {
        Self {
            items: dto.items.into_iter().map(Into::into).collect(),
            actor_id: dto.actor_id,
            reason: dto.reason,
        }
    }
}

/// Reserved appointment
#[derive(Debug, Clone, Serialize)]
pub struct LineItemResponse {
    pub id: Uuid,
    pub service_id: Uuid,
    pub stylist_id: Uuid,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub price: Decimal,
}

impl From<BookingLineItem> for LineItemResponse {
    fn from(item: BookingLineItem) -> Self {
        Self {
            id: item.id,
            service_id: item.service_id,
            stylist_id: item.stylist_id,
            start_time: item.start_time,
            end_time: item.end_time,
            price: item.price,
        }
    }
}

/// Booking response
#[derive(Debug, Clone, Serialize)]
pub struct BookingResponse {
    pub id: Uuid,
    pub user_id: Uuid,
    pub salon_id: Uuid,
    pub branch_id: Uuid,
    pub status: BookingStatus,
    pub payment_status: BookingPaymentStatus,
    pub subtotal: Decimal,
    pub fee_amount: Decimal,
    pub tax_amount: Decimal,
    pub total_amount: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_id: Option<Uuid>,
    pub items: Vec<LineItemResponse>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Booking> for BookingResponse {
    fn from(booking: Booking) -> Self {
        Self {
            id: booking.id,
            user_id: booking.user_id,
            salon_id: booking.salon_id,
            branch_id: booking.branch_id,
            status: booking.status,
            payment_status: booking.payment_status,
            subtotal: booking.subtotal,
            fee_amount: booking.fee_amount,
            tax_amount: booking.tax_amount,
            total_amount: booking.total_amount,
            note: booking.note,
            payment_id: booking.payment_id,
            items: booking.line_items.into_iter().map(Into::into).collect(),
            created_at: booking.created_at,
            updated_at: booking.updated_at,
        }
    }
}

/// Query parameters for slot listing
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct SlotQueryParams {
    pub date: NaiveDate,

    /// Length of the wanted appointment, defaults to the slot interval
    #[validate(range(min = 5, max = 600))]
    pub duration_minutes: Option<i64>,
}

/// Bookable slot
#[derive(Debug, Clone, Serialize)]
pub struct SlotResponse {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl From<TimeRange> for SlotResponse {
    fn from(range: TimeRange) -> Self {
        Self {
            start: range.start,
            end: range.end,
        }
    }
}
