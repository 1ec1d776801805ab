//! Shared application state handed to every handler

use salon_core::traits::CacheService;
use salon_services::{AvailabilityService, BookingManager, BranchPolicyResolver, PaymentOrchestrator};
use std::sync::Arc;

/// Services reachable from the HTTP layer
pub struct AppState<C: CacheService> {
    pub bookings: Arc<BookingManager<C>>,
    pub payments: Arc<PaymentOrchestrator<C>>,
    pub availability: Arc<AvailabilityService<C>>,
    pub policy: Arc<BranchPolicyResolver<C>>,
}

impl<C: CacheService> AppState<C> {
    pub fn new(
        bookings: Arc<BookingManager<C>>,
        payments: Arc<PaymentOrchestrator<C>>,
        availability: Arc<AvailabilityService<C>>,
        policy: Arc<BranchPolicyResolver<C>>,
    ) -> Self {
        Self {
            bookings,
            payments,
            availability,
            policy,
        }
    }
}

impl<C: CacheService> Clone for AppState<C> {
    fn clone(&self) -> Self {
        Self {
            bookings: self.bookings.clone(),
            payments: self.payments.clone(),
            availability: self.availability.clone(),
            policy: self.policy.clone(),
        }
    }
}
