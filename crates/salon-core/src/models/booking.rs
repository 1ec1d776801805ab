//! Booking aggregate and line items
//!
//! A booking owns an ordered list of line items, each reserving one stylist
//! for one service over a time range. Totals are snapshotted at creation (and
//! at reschedule) so later catalog or policy changes never alter what was
//! quoted.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::schedule::TimeRange;

/// Booking lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    /// Created, waiting for payment
    #[default]
    Initiated,
    /// Payment settled
    Confirmed,
    /// Canceled by the customer or the salon
    Canceled,
    /// Moved to new slots; behaves like `Confirmed`
    Rescheduled,
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BookingStatus::Initiated => write!(f, "initiated"),
            BookingStatus::Confirmed => write!(f, "confirmed"),
            BookingStatus::Canceled => write!(f, "canceled"),
            BookingStatus::Rescheduled => write!(f, "rescheduled"),
        }
    }
}

impl BookingStatus {
    /// Parse from string
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "initiated" => Some(BookingStatus::Initiated),
            "confirmed" => Some(BookingStatus::Confirmed),
            "canceled" | "cancelled" => Some(BookingStatus::Canceled),
            "rescheduled" => Some(BookingStatus::Rescheduled),
            _ => None,
        }
    }

    /// Paid and holding its slots
    pub fn is_confirmed_equivalent(&self) -> bool {
        matches!(self, BookingStatus::Confirmed | BookingStatus::Rescheduled)
    }

    /// Statuses a booking may be canceled from
    pub const CANCELABLE: [BookingStatus; 3] = [
        BookingStatus::Initiated,
        BookingStatus::Confirmed,
        BookingStatus::Rescheduled,
    ];

    /// Statuses a booking may be rescheduled from
    pub const RESCHEDULABLE: [BookingStatus; 2] =
        [BookingStatus::Confirmed, BookingStatus::Rescheduled];
}

/// Payment state as seen from the booking
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BookingPaymentStatus {
    #[default]
    Pending,
    Paid,
    Refunded,
}

impl fmt::Display for BookingPaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BookingPaymentStatus::Pending => write!(f, "pending"),
            BookingPaymentStatus::Paid => write!(f, "paid"),
            BookingPaymentStatus::Refunded => write!(f, "refunded"),
        }
    }
}

impl BookingPaymentStatus {
    /// Parse from string
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Some(BookingPaymentStatus::Pending),
            "paid" => Some(BookingPaymentStatus::Paid),
            "refunded" => Some(BookingPaymentStatus::Refunded),
            _ => None,
        }
    }
}

/// Subtotal, fee, tax and total for a set of services
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct PriceSummary {
    pub subtotal: Decimal,
    pub fee: Decimal,
    pub tax: Decimal,
    pub total: Decimal,
}

/// One reserved (service, stylist, time range) tuple
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingLineItem {
    pub id: Uuid,
    pub booking_id: Uuid,
    pub service_id: Uuid,
    pub stylist_id: Uuid,

    /// Start of the bare service window (no buffer)
    pub start_time: DateTime<Utc>,

    /// `start_time` plus the service duration
    pub end_time: DateTime<Utc>,

    /// Price snapshot taken at booking time
    pub price: Decimal,

    pub created_at: DateTime<Utc>,
}

impl BookingLineItem {
    pub fn new(
        booking_id: Uuid,
        service_id: Uuid,
        stylist_id: Uuid,
        window: TimeRange,
        price: Decimal,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            booking_id,
            service_id,
            stylist_id,
            start_time: window.start,
            end_time: window.end,
            price,
            created_at: Utc::now(),
        }
    }

    #[inline]
    pub fn window(&self) -> TimeRange {
        TimeRange::new(self.start_time, self.end_time)
    }
}

/// Booking aggregate root
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Booking {
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
    pub note: Option<String>,
    pub payment_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub line_items: Vec<BookingLineItem>,
}

impl Booking {
    /// Create a new booking in `initiated` status
    ///
    /// Line items must already carry `booking_id == id`; use [`Booking::new_id`]
    /// to mint the identifier first.
    pub fn new(
        id: Uuid,
        user_id: Uuid,
        salon_id: Uuid,
        branch_id: Uuid,
        note: Option<String>,
        line_items: Vec<BookingLineItem>,
        summary: PriceSummary,
    ) -> Self {
        let now = Utc::now();
        Self {
            id,
            user_id,
            salon_id,
            branch_id,
            status: BookingStatus::Initiated,
            payment_status: BookingPaymentStatus::Pending,
            subtotal: summary.subtotal,
            fee_amount: summary.fee,
            tax_amount: summary.tax,
            total_amount: summary.total,
            note,
            payment_id: None,
            created_at: now,
            updated_at: now,
            line_items,
        }
    }

    pub fn new_id() -> Uuid {
        Uuid::new_v4()
    }

    /// Start of the first appointment, used for cutoff checks
    pub fn earliest_start(&self) -> Option<DateTime<Utc>> {
        self.line_items.iter().map(|item| item.start_time).min()
    }

    pub fn items_total(&self) -> Decimal {
        self.line_items.iter().map(|item| item.price).sum()
    }

    pub fn price_summary(&self) -> PriceSummary {
        PriceSummary {
            subtotal: self.subtotal,
            fee: self.fee_amount,
            tax: self.tax_amount,
            total: self.total_amount,
        }
    }

    /// `total = Σ price + fee + tax`
    pub fn totals_consistent(&self) -> bool {
        self.total_amount == self.items_total() + self.fee_amount + self.tax_amount
    }

    /// Confirmed-equivalent bookings must be paid
    pub fn status_consistent(&self) -> bool {
        !self.status.is_confirmed_equivalent()
            || self.payment_status == BookingPaymentStatus::Paid
    }
}
