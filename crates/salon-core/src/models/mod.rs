//! Domain models for the booking engine
//!
//! This module contains all the core domain models used throughout the application.

pub mod booking;
pub mod branch;
pub mod catalog;
pub mod gateway;
pub mod history;
pub mod notification;
pub mod payment;
pub mod schedule;

pub use booking::{Booking, BookingLineItem, BookingPaymentStatus, BookingStatus, PriceSummary};
pub use branch::{BranchConfig, BranchConfigUpdate};
pub use catalog::{Branch, SalonService, Stylist, UserInfo};
pub use gateway::{GatewayInitiation, GatewayRefund, GatewayStatusReport, WebhookEvent, WebhookSubject};
pub use history::{BookingHistoryEntry, HistoryAction, HistorySnapshot};
pub use notification::{AppointmentSummary, BookingNotice, NotificationEvent};
pub use payment::{
    GatewayPayload, IdempotencyRecord, InitiatePaymentRequest, Payment, PaymentAttempt,
    PaymentInitiation, PaymentStatus, PaymentUpdate, Refund,
};
pub use schedule::{StylistSchedule, TimeRange};
