//! Booking lifecycle tests against in-memory storage

mod common;

use chrono::Duration;
use common::Harness;
use rust_decimal_macros::dec;
use salon_core::{
    models::{
        BookingPaymentStatus, BookingStatus, BranchConfigUpdate, HistoryAction, HistorySnapshot,
        NotificationEvent,
    },
    traits::Pagination,
    AppError, ErrorKind,
};
use salon_services::RescheduleRequest;
use std::sync::atomic::Ordering;
use uuid::Uuid;

#[tokio::test]
async fn test_single_service_priced_with_fee_and_tax() {
    let h = Harness::new();

    let booking = h.book_haircut(h.at(10, 0)).await.unwrap();

    assert_eq!(booking.status, BookingStatus::Initiated);
    assert_eq!(booking.payment_status, BookingPaymentStatus::Pending);
    assert_eq!(booking.subtotal, dec!(500));
    assert_eq!(booking.fee_amount, dec!(50));
    assert_eq!(booking.tax_amount, dec!(55));
    assert_eq!(booking.total_amount, dec!(605));
    assert!(booking.totals_consistent());
    assert_eq!(booking.line_items.len(), 1);
    assert_eq!(booking.line_items[0].end_time, h.at(10, 30));
    assert_eq!(booking.salon_id, h.salon_id);

    // Branch defaults were persisted on first use
    let stored = h.branch_configs.stored(h.branch_id).unwrap();
    assert_eq!(stored.buffer_minutes, 15);

    let history = h.manager.history(booking.id).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].action, HistoryAction::Created);
}

#[tokio::test]
async fn test_multi_service_totals() {
    let h = Harness::new();
    let request = h.request(vec![
        h.item(h.haircut_id, h.stylist_id, h.at(10, 0)),
        h.item(h.coloring_id, h.other_stylist_id, h.at(10, 0)),
    ]);

    let booking = h.manager.create(request).await.unwrap();

    // 500 + 1200 = 1700, fee 50, tax 10% of 1750
    assert_eq!(booking.subtotal, dec!(1700));
    assert_eq!(booking.tax_amount, dec!(175));
    assert_eq!(booking.total_amount, dec!(1925));
    assert!(booking.totals_consistent());
}

#[tokio::test]
async fn test_simultaneous_requests_for_same_slot() {
    let h = Harness::new();
    let first = h.request(vec![h.item(h.haircut_id, h.stylist_id, h.at(11, 0))]);
    let second = first.clone();

    let (a, b) = tokio::join!(h.manager.create(first), h.manager.create(second));

    let outcomes = [a, b];
    let successes = outcomes.iter().filter(|r| r.is_ok()).count();
    assert_eq!(successes, 1);
    assert!(outcomes
        .iter()
        .any(|r| matches!(r, Err(AppError::SlotUnavailable(_)))));
    assert_eq!(h.bookings.count(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_no_double_booking_under_parallel_load() {
    let h = Harness::new();
    let request = h.request(vec![h.item(h.haircut_id, h.stylist_id, h.at(15, 0))]);

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let manager = h.manager.clone();
            let request = request.clone();
            tokio::spawn(async move { manager.create(request).await })
        })
        .collect();

    let mut successes = 0;
    for handle in futures::future::join_all(handles).await {
        match handle.unwrap() {
            Ok(_) => successes += 1,
            Err(e) => assert_eq!(e.kind(), ErrorKind::PolicyViolation),
        }
    }

    assert_eq!(successes, 1);
    assert_eq!(h.bookings.count(), 1);
}

#[tokio::test]
async fn test_buffer_applies_to_abutting_bookings() {
    let h = Harness::new();
    h.book_haircut(h.at(10, 0)).await.unwrap();

    // Ends at 10:30; a 15 minute buffer blocks 10:30 but not 10:45
    let err = h.book_haircut(h.at(10, 30)).await.unwrap_err();
    assert!(matches!(err, AppError::SlotUnavailable(_)));
    assert!(h.book_haircut(h.at(10, 45)).await.is_ok());

    // Another stylist is unaffected
    let request = h.request(vec![h.item(h.haircut_id, h.other_stylist_id, h.at(10, 0))]);
    assert!(h.manager.create(request).await.is_ok());
}

#[tokio::test]
async fn test_items_of_one_request_must_not_overlap() {
    let h = Harness::new();
    let request = h.request(vec![
        h.item(h.haircut_id, h.stylist_id, h.at(10, 0)),
        h.item(h.haircut_id, h.stylist_id, h.at(10, 30)),
    ]);

    let err = h.manager.create(request).await.unwrap_err();
    assert!(matches!(err, AppError::SlotUnavailable(_)));
    assert_eq!(h.bookings.count(), 0);
}

#[tokio::test]
async fn test_stylist_must_belong_to_branch() {
    let h = Harness::new();
    let request = h.request(vec![h.item(h.haircut_id, h.foreign_stylist_id, h.at(10, 0))]);

    let err = h.manager.create(request).await.unwrap_err();
    assert!(matches!(err, AppError::StylistBranchMismatch { .. }));
    assert_eq!(err.kind(), ErrorKind::PolicyViolation);
}

#[tokio::test]
async fn test_slot_must_fit_schedule() {
    let h = Harness::new();

    // Before opening, across the lunch break, past closing
    for start in [h.at(8, 30), h.at(12, 45), h.at(17, 45)] {
        let err = h.book_haircut(start).await.unwrap_err();
        assert!(matches!(err, AppError::SlotUnavailable(_)), "start {}", start);
    }

    h.catalog.day_off(h.day + Duration::days(1));
    let err = h
        .book_haircut(h.at(10, 0) + Duration::days(1))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::SlotUnavailable(_)));
    assert_eq!(h.bookings.count(), 0);
}

#[tokio::test]
async fn test_start_must_be_future_and_within_advance_limit() {
    let h = Harness::new();

    h.advance_to(h.at(10, 0));
    let err = h.book_haircut(h.at(10, 0)).await.unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    let err = h
        .book_haircut(h.at(10, 0) + Duration::days(91))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::PolicyViolation(_)));
}

#[tokio::test]
async fn test_unknown_references_abort_creation() {
    let h = Harness::new();

    let mut request = h.request(vec![h.item(h.haircut_id, h.stylist_id, h.at(10, 0))]);
    request.user_id = Uuid::new_v4();
    assert!(matches!(
        h.manager.create(request).await,
        Err(AppError::UserNotFound(_))
    ));

    let request = h.request(vec![h.item(Uuid::new_v4(), h.stylist_id, h.at(10, 0))]);
    assert!(matches!(
        h.manager.create(request).await,
        Err(AppError::ServiceNotFound(_))
    ));

    let request = h.request(vec![]);
    assert!(matches!(
        h.manager.create(request).await,
        Err(AppError::Validation(_))
    ));

    assert_eq!(h.bookings.count(), 0);
}

#[tokio::test]
async fn test_confirm_sets_paid_and_notifies() {
    let mut h = Harness::new();
    let booking = h.book_haircut(h.at(10, 0)).await.unwrap();
    let payment_id = Uuid::new_v4();

    let confirmed = h.manager.confirm(booking.id, payment_id).await.unwrap();

    assert_eq!(confirmed.status, BookingStatus::Confirmed);
    assert_eq!(confirmed.payment_status, BookingPaymentStatus::Paid);
    assert_eq!(confirmed.payment_id, Some(payment_id));
    assert!(confirmed.status_consistent());

    let events = h.drain_notifications();
    assert_eq!(events.len(), 1);
    match &events[0] {
        NotificationEvent::BookingConfirmed { notice } => {
            assert_eq!(notice.booking_id, booking.id);
            assert_eq!(notice.user_id, h.user_id);
            // Contact details are looked up by the delivery worker
            assert!(notice.recipient.is_none());
            assert_eq!(notice.total_amount, dec!(605));
        }
        other => panic!("unexpected event {:?}", other),
    }

    // Second confirmation is refused without changes
    let err = h.manager.confirm(booking.id, Uuid::new_v4()).await.unwrap_err();
    assert!(matches!(err, AppError::InvalidTransition { .. }));
    let current = h.manager.get(booking.id).await.unwrap();
    assert_eq!(current.payment_id, Some(payment_id));
}

#[tokio::test]
async fn test_transitions_notify_without_identity_lookup() {
    let mut h = Harness::new();
    let first = h.book_haircut(h.at(10, 0)).await.unwrap();
    let second = h.book_haircut(h.at(15, 0)).await.unwrap();
    h.identity.remove(h.user_id);

    h.manager.confirm(first.id, Uuid::new_v4()).await.unwrap();
    h.manager
        .cancel(second.id, None, Some("schedule change".to_string()))
        .await
        .unwrap();

    let events = h.drain_notifications();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].name(), "booking_confirmed");
    assert_eq!(events[0].booking_id(), first.id);
    assert_eq!(events[1].name(), "booking_canceled");
    assert_eq!(events[1].notice().user_id, h.user_id);
}

#[tokio::test]
async fn test_confirm_canceled_booking_is_refused() {
    let h = Harness::new();
    let booking = h.book_haircut(h.at(10, 0)).await.unwrap();
    h.manager.cancel(booking.id, None, None).await.unwrap();

    let err = h.manager.confirm(booking.id, Uuid::new_v4()).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::PolicyViolation);
    let current = h.manager.get(booking.id).await.unwrap();
    assert_eq!(current.status, BookingStatus::Canceled);
    assert_eq!(current.payment_status, BookingPaymentStatus::Pending);
    assert_eq!(current.payment_id, None);
}

#[tokio::test]
async fn test_cancel_cutoff_boundary() {
    let h = Harness::new();
    let on_time = h.book_haircut(h.at(10, 0)).await.unwrap();
    let late = h.book_haircut(h.at(11, 0)).await.unwrap();

    // Exactly at the 24h cutoff is still accepted
    h.advance_to(h.hours_before(h.at(10, 0), 24));
    assert!(h.manager.cancel(on_time.id, None, None).await.is_ok());

    h.advance_to(h.hours_before(h.at(11, 0), 24) + Duration::seconds(1));
    let err = h.manager.cancel(late.id, None, None).await.unwrap_err();
    assert!(matches!(err, AppError::CutoffPassed(_)));
    assert_eq!(
        h.manager.get(late.id).await.unwrap().status,
        BookingStatus::Initiated
    );
}

#[tokio::test]
async fn test_cancel_releases_slot_and_records_reason() {
    let mut h = Harness::new();
    let booking = h.book_haircut(h.at(10, 0)).await.unwrap();
    h.manager.confirm(booking.id, Uuid::new_v4()).await.unwrap();
    h.drain_notifications();

    let actor = Uuid::new_v4();
    let canceled = h
        .manager
        .cancel(booking.id, Some(actor), Some("feeling unwell".to_string()))
        .await
        .unwrap();
    assert_eq!(canceled.status, BookingStatus::Canceled);

    // Slot is free again
    assert!(h.book_haircut(h.at(10, 0)).await.is_ok());

    let history = h.manager.history(booking.id).await.unwrap();
    let entry = history
        .iter()
        .find(|e| e.action == HistoryAction::Canceled)
        .unwrap();
    assert_eq!(entry.actor_id, Some(actor));
    assert_eq!(entry.reason.as_deref(), Some("feeling unwell"));

    let events = h.drain_notifications();
    assert!(matches!(
        &events[..],
        [NotificationEvent::BookingCanceled { reason: Some(r), .. }] if r == "feeling unwell"
    ));

    // Canceled is final
    let err = h.manager.cancel(booking.id, None, None).await.unwrap_err();
    assert!(matches!(err, AppError::InvalidTransition { .. }));
}

#[tokio::test]
async fn test_reschedule_swaps_items_and_reprices() {
    let h = Harness::new();
    let booking = h.book_haircut(h.at(10, 0)).await.unwrap();
    h.manager.confirm(booking.id, Uuid::new_v4()).await.unwrap();

    let request = RescheduleRequest {
        items: vec![h.item(h.coloring_id, h.stylist_id, h.at(15, 0))],
        actor_id: Some(h.user_id),
        reason: Some("later slot".to_string()),
    };
    let moved = h.manager.reschedule(booking.id, request).await.unwrap();

    assert_eq!(moved.status, BookingStatus::Rescheduled);
    assert_eq!(moved.payment_status, BookingPaymentStatus::Paid);
    assert_eq!(moved.line_items.len(), 1);
    assert_eq!(moved.line_items[0].start_time, h.at(15, 0));
    // 1200 + 50 + 125
    assert_eq!(moved.total_amount, dec!(1375));
    assert!(moved.totals_consistent());

    // The old slot is free again
    assert!(h.book_haircut(h.at(10, 0)).await.is_ok());

    let history = h.manager.history(booking.id).await.unwrap();
    let entry = history
        .iter()
        .find(|e| e.action == HistoryAction::Rescheduled)
        .unwrap();
    match (&entry.old_value, &entry.new_value) {
        (
            Some(HistorySnapshot::LineItems { total: old_total, .. }),
            Some(HistorySnapshot::LineItems { total: new_total, items }),
        ) => {
            assert_eq!(*old_total, dec!(605));
            assert_eq!(*new_total, dec!(1375));
            assert_eq!(items[0].service_id, h.coloring_id);
        }
        other => panic!("unexpected snapshots {:?}", other),
    }

    // Rescheduled is re-entrant
    let again = RescheduleRequest {
        items: vec![h.item(h.coloring_id, h.stylist_id, h.at(16, 0))],
        actor_id: None,
        reason: None,
    };
    let moved = h.manager.reschedule(booking.id, again).await.unwrap();
    assert_eq!(moved.line_items[0].start_time, h.at(16, 0));
}

#[tokio::test]
async fn test_reschedule_may_overlap_own_slot() {
    let h = Harness::new();
    let booking = h.book_haircut(h.at(10, 0)).await.unwrap();
    h.manager.confirm(booking.id, Uuid::new_v4()).await.unwrap();

    let request = RescheduleRequest {
        items: vec![h.item(h.haircut_id, h.stylist_id, h.at(10, 15))],
        actor_id: None,
        reason: None,
    };
    let moved = h.manager.reschedule(booking.id, request).await.unwrap();
    assert_eq!(moved.line_items[0].start_time, h.at(10, 15));
}

#[tokio::test]
async fn test_failed_reschedule_keeps_old_items() {
    let h = Harness::new();
    let booking = h.book_haircut(h.at(10, 0)).await.unwrap();
    let booking = h.manager.confirm(booking.id, Uuid::new_v4()).await.unwrap();

    // Someone else holds the other stylist at 16:00
    let blocker = h.request(vec![h.item(h.haircut_id, h.other_stylist_id, h.at(16, 0))]);
    h.manager.create(blocker).await.unwrap();

    let request = RescheduleRequest {
        items: vec![
            h.item(h.haircut_id, h.stylist_id, h.at(15, 0)),
            h.item(h.haircut_id, h.other_stylist_id, h.at(16, 0)),
        ],
        actor_id: None,
        reason: None,
    };
    let err = h.manager.reschedule(booking.id, request).await.unwrap_err();
    assert!(matches!(err, AppError::SlotUnavailable(_)));

    let current = h.manager.get(booking.id).await.unwrap();
    assert_eq!(current.status, BookingStatus::Confirmed);
    assert_eq!(current.line_items, booking.line_items);
    assert_eq!(current.total_amount, booking.total_amount);

    // The first new slot was never claimed
    assert!(h.book_haircut(h.at(15, 0)).await.is_ok());
}

#[tokio::test]
async fn test_reschedule_requires_confirmed_booking_and_open_window() {
    let h = Harness::new();
    let booking = h.book_haircut(h.at(10, 0)).await.unwrap();

    let request = RescheduleRequest {
        items: vec![h.item(h.haircut_id, h.stylist_id, h.at(15, 0))],
        actor_id: None,
        reason: None,
    };
    let err = h
        .manager
        .reschedule(booking.id, request.clone())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidTransition { .. }));

    h.manager.confirm(booking.id, Uuid::new_v4()).await.unwrap();
    h.advance_to(h.hours_before(h.at(10, 0), 12) + Duration::minutes(1));
    let err = h.manager.reschedule(booking.id, request).await.unwrap_err();
    assert!(matches!(err, AppError::CutoffPassed(_)));
}

#[tokio::test]
async fn test_history_failures_do_not_fail_transitions() {
    let h = Harness::new();
    h.history.fail_writes.store(true, Ordering::SeqCst);

    let booking = h.book_haircut(h.at(10, 0)).await.unwrap();
    let confirmed = h.manager.confirm(booking.id, Uuid::new_v4()).await.unwrap();

    assert_eq!(confirmed.status, BookingStatus::Confirmed);
    assert!(h.manager.history(booking.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_available_slots_exclude_buffered_reservations() {
    let h = Harness::new();
    h.book_haircut(h.at(10, 0)).await.unwrap();

    let slots = h
        .availability
        .available_slots(h.stylist_id, h.day, None)
        .await
        .unwrap();
    let starts: Vec<_> = slots.iter().map(|s| s.start).collect();

    assert!(starts.contains(&h.at(9, 0)));
    assert!(!starts.contains(&h.at(9, 30)));
    assert!(!starts.contains(&h.at(10, 0)));
    assert!(!starts.contains(&h.at(10, 30)));
    assert!(starts.contains(&h.at(11, 0)));
    assert!(!starts.contains(&h.at(13, 0)));
    assert!(starts.contains(&h.at(17, 30)));
    // 18 half-hour candidates minus 3 around the booking and 2 in the break
    assert_eq!(slots.len(), 13);
    assert!(starts.windows(2).all(|w| w[0] < w[1]));

    let hour_slots = h
        .availability
        .available_slots(h.stylist_id, h.day, Some(60))
        .await
        .unwrap();
    assert!(hour_slots.iter().all(|s| s.duration_minutes() == 60));
    assert!(!hour_slots.iter().any(|s| s.start == h.at(12, 30)));
}

#[tokio::test]
async fn test_list_by_user_is_paginated() {
    let h = Harness::new();
    for hour in [9, 10, 11] {
        h.book_haircut(h.at(hour, 0)).await.unwrap();
    }

    let page = h
        .manager
        .list_by_user(h.user_id, Pagination::new(1, 2))
        .await
        .unwrap();
    assert_eq!(page.data.len(), 2);
    assert_eq!(page.pagination.total, 3);
    assert_eq!(page.pagination.total_pages, 2);

    let page = h
        .manager
        .list_by_user(h.user_id, Pagination::new(2, 2))
        .await
        .unwrap();
    assert_eq!(page.data.len(), 1);
}

#[tokio::test]
async fn test_branch_policy_update_takes_effect() {
    let h = Harness::new();
    h.book_haircut(h.at(10, 0)).await.unwrap();

    let update = BranchConfigUpdate {
        buffer_minutes: Some(0),
        booking_fee: Some(dec!(0)),
        ..Default::default()
    };
    let config = h.policy.update(h.branch_id, &update).await.unwrap();
    assert_eq!(config.buffer_minutes, 0);

    // Abutting is fine without a buffer, and the new fee applies
    let booking = h.book_haircut(h.at(10, 30)).await.unwrap();
    assert_eq!(booking.total_amount, dec!(550));

    let invalid = BranchConfigUpdate {
        tax_percentage: Some(dec!(150)),
        ..Default::default()
    };
    assert!(matches!(
        h.policy.update(h.branch_id, &invalid).await,
        Err(AppError::Validation(_))
    ));
}
