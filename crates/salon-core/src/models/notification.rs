//! Outbound booking events for the notification collaborator

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::booking::Booking;
use super::catalog::UserInfo;

/// Denormalized appointment line for message templates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppointmentSummary {
    pub service_id: Uuid,
    pub stylist_id: Uuid,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

/// Booking data carried by every notification
///
/// `recipient` is filled in by the delivery worker from `user_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookingNotice {
    pub booking_id: Uuid,
    pub branch_id: Uuid,
    pub user_id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient: Option<UserInfo>,
    pub appointments: Vec<AppointmentSummary>,
    pub total_amount: Decimal,
}

impl BookingNotice {
    pub fn new(booking: &Booking) -> Self {
        Self {
            booking_id: booking.id,
            branch_id: booking.branch_id,
            user_id: booking.user_id,
            recipient: None,
            appointments: booking
                .line_items
                .iter()
                .map(|item| AppointmentSummary {
                    service_id: item.service_id,
                    stylist_id: item.stylist_id,
                    start_time: item.start_time,
                    end_time: item.end_time,
                })
                .collect(),
            total_amount: booking.total_amount,
        }
    }
}

/// Event fired on terminal booking transitions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum NotificationEvent {
    BookingConfirmed {
        #[serde(flatten)]
        notice: BookingNotice,
    },
    BookingCanceled {
        #[serde(flatten)]
        notice: BookingNotice,
        reason: Option<String>,
    },
}

impl NotificationEvent {
    pub fn name(&self) -> &'static str {
        match self {
            NotificationEvent::BookingConfirmed { .. } => "booking_confirmed",
            NotificationEvent::BookingCanceled { .. } => "booking_canceled",
        }
    }

    pub fn booking_id(&self) -> Uuid {
        self.notice().booking_id
    }

    pub fn notice(&self) -> &BookingNotice {
        match self {
            NotificationEvent::BookingConfirmed { notice }
            | NotificationEvent::BookingCanceled { notice, .. } => notice,
        }
    }

    pub fn notice_mut(&mut self) -> &mut BookingNotice {
        match self {
            NotificationEvent::BookingConfirmed { notice }
            | NotificationEvent::BookingCanceled { notice, .. } => notice,
        }
    }
}
