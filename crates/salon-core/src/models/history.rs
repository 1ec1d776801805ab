//! Booking history model
//!
//! Append-only audit trail of every booking transition.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::booking::{BookingLineItem, BookingPaymentStatus, BookingStatus};

/// Kind of transition recorded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryAction {
    Created,
    Confirmed,
    Canceled,
    Rescheduled,
}

impl fmt::Display for HistoryAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HistoryAction::Created => write!(f, "created"),
            HistoryAction::Confirmed => write!(f, "confirmed"),
            HistoryAction::Canceled => write!(f, "canceled"),
            HistoryAction::Rescheduled => write!(f, "rescheduled"),
        }
    }
}

impl HistoryAction {
    /// Parse from string
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "created" => Some(HistoryAction::Created),
            "confirmed" => Some(HistoryAction::Confirmed),
            "canceled" => Some(HistoryAction::Canceled),
            "rescheduled" => Some(HistoryAction::Rescheduled),
            _ => None,
        }
    }
}

/// Structured before/after payload of a history entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HistorySnapshot {
    /// Status pair at a point in time
    Status {
        status: BookingStatus,
        payment_status: BookingPaymentStatus,
        payment_id: Option<Uuid>,
    },
    /// Reserved line items and the resulting total
    LineItems {
        items: Vec<BookingLineItem>,
        total: Decimal,
    },
}

/// Booking history entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookingHistoryEntry {
    pub id: Uuid,
    pub booking_id: Uuid,
    pub action: HistoryAction,
    pub actor_id: Option<Uuid>,
    pub reason: Option<String>,
    pub old_value: Option<HistorySnapshot>,
    pub new_value: Option<HistorySnapshot>,
    pub created_at: DateTime<Utc>,
}

impl BookingHistoryEntry {
    pub fn new(booking_id: Uuid, action: HistoryAction) -> Self {
        Self {
            id: Uuid::new_v4(),
            booking_id,
            action,
            actor_id: None,
            reason: None,
            old_value: None,
            new_value: None,
            created_at: Utc::now(),
        }
    }

    pub fn actor(mut self, actor_id: Option<Uuid>) -> Self {
        self.actor_id = actor_id;
        self
    }

    pub fn reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn old_value(mut self, snapshot: HistorySnapshot) -> Self {
        self.old_value = Some(snapshot);
        self
    }

    pub fn new_value(mut self, snapshot: HistorySnapshot) -> Self {
        self.new_value = Some(snapshot);
        self
    }
}
