//! Branch configuration model
//!
//! Per-branch booking policy. Created lazily from system defaults the first
//! time a branch is referenced.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::config::BookingConfig;

/// Booking policy of a branch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BranchConfig {
    pub branch_id: Uuid,

    /// Minutes padded around every reservation for conflict checks
    pub buffer_minutes: i32,

    pub cancellation_cutoff_hours: i32,

    pub reschedule_window_hours: i32,

    pub max_advance_booking_days: i32,

    /// Flat fee per booking
    pub booking_fee: Decimal,

    /// Percentage applied to the subtotal
    pub tax_percentage: Decimal,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl BranchConfig {
    /// Build the system default policy for a branch
    pub fn from_defaults(branch_id: Uuid, defaults: &BookingConfig) -> Self {
        let now = Utc::now();
        Self {
            branch_id,
            buffer_minutes: defaults.default_buffer_minutes,
            cancellation_cutoff_hours: defaults.default_cancellation_cutoff_hours,
            reschedule_window_hours: defaults.default_reschedule_window_hours,
            max_advance_booking_days: defaults.default_max_advance_booking_days,
            booking_fee: defaults.booking_fee(),
            tax_percentage: defaults.tax_percentage(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Apply a partial update, leaving unspecified fields untouched
    pub fn apply(&mut self, update: &BranchConfigUpdate) {
        if let Some(v) = update.buffer_minutes {
            self.buffer_minutes = v;
        }
        if let Some(v) = update.cancellation_cutoff_hours {
            self.cancellation_cutoff_hours = v;
        }
        if let Some(v) = update.reschedule_window_hours {
            self.reschedule_window_hours = v;
        }
        if let Some(v) = update.max_advance_booking_days {
            self.max_advance_booking_days = v;
        }
        if let Some(v) = update.booking_fee {
            self.booking_fee = v;
        }
        if let Some(v) = update.tax_percentage {
            self.tax_percentage = v;
        }
        self.updated_at = Utc::now();
    }
}

/// Explicit configuration update
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct BranchConfigUpdate {
    #[validate(range(min = 0, max = 240))]
    pub buffer_minutes: Option<i32>,

    #[validate(range(min = 0, max = 720))]
    pub cancellation_cutoff_hours: Option<i32>,

    #[validate(range(min = 0, max = 720))]
    pub reschedule_window_hours: Option<i32>,

    #[validate(range(min = 1, max = 730))]
    pub max_advance_booking_days: Option<i32>,

    pub booking_fee: Option<Decimal>,

    pub tax_percentage: Option<Decimal>,
}

impl BranchConfigUpdate {
    /// Decimal fields cannot be range-checked by the derive
    pub fn validate_amounts(&self) -> Result<(), String> {
        if let Some(fee) = self.booking_fee {
            if fee < Decimal::ZERO {
                return Err("booking_fee must not be negative".to_string());
            }
        }
        if let Some(tax) = self.tax_percentage {
            if tax < Decimal::ZERO || tax > Decimal::ONE_HUNDRED {
                return Err("tax_percentage must be between 0 and 100".to_string());
            }
        }
        Ok(())
    }
}
