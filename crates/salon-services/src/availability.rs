//! Availability engine
//!
//! Reconciles a stylist's working hours, breaks and committed reservations.
//! Reservations are stored with their bare service window; the branch buffer
//! is applied only here, at conflict-check time. Slots are recomputed on every
//! call and never cached.

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use salon_core::{
    models::{StylistSchedule, TimeRange},
    traits::{BookingRepository, CacheService, CatalogService, Clock},
    AppError, AppResult,
};
use std::sync::Arc;
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::branch_policy::BranchPolicyResolver;
use crate::constants::DEFAULT_SLOT_INTERVAL_MINUTES;

/// Parameters of a slot generation run
#[derive(Debug, Clone, Copy)]
pub struct SlotQuery {
    /// Step between candidate starts
    pub interval_minutes: i64,
    /// Length of each candidate; defaults to the interval
    pub duration_minutes: Option<i64>,
    /// Padding applied to both sides of every reservation
    pub buffer_minutes: i64,
    /// Only slots starting strictly after this instant are returned
    pub now: DateTime<Utc>,
}

impl SlotQuery {
    fn interval(&self) -> i64 {
        if self.interval_minutes > 0 {
            self.interval_minutes
        } else {
            DEFAULT_SLOT_INTERVAL_MINUTES
        }
    }

    fn duration(&self) -> i64 {
        match self.duration_minutes {
            Some(d) if d > 0 => d,
            _ => self.interval(),
        }
    }
}

/// Enumerate bookable slots, in chronological order
///
/// Each working window is walked from its start in `interval` steps. A
/// candidate is kept when it fits inside the window, misses every break,
/// misses every buffered reservation and starts after `query.now`. A schedule
/// without working hours yields no slots.
pub fn generate_slots(
    schedule: &StylistSchedule,
    reservations: &[TimeRange],
    query: &SlotQuery,
) -> Vec<TimeRange> {
    let step = Duration::minutes(query.interval());
    let duration = query.duration();

    let mut windows: Vec<&TimeRange> = schedule
        .working_hours
        .iter()
        .filter(|w| w.is_valid())
        .collect();
    windows.sort_by_key(|w| w.start);

    let mut slots = Vec::new();
    for window in windows {
        let mut start = window.start;
        loop {
            let candidate = TimeRange::with_minutes(start, duration);
            if candidate.end > window.end {
                break;
            }

            if candidate.start > query.now
                && !schedule.breaks.iter().any(|b| b.overlaps(&candidate))
                && is_available(&candidate, reservations, query.buffer_minutes)
            {
                slots.push(candidate);
            }

            start += step;
        }
    }

    // Overlapping working windows can yield the same candidate twice
    slots.sort_by_key(|s| s.start);
    slots.dedup();
    slots
}

/// Whether `proposed` misses every reservation padded by `buffer_minutes`
#[inline]
pub fn is_available(proposed: &TimeRange, reservations: &[TimeRange], buffer_minutes: i64) -> bool {
    !reservations
        .iter()
        .any(|r| r.expand(buffer_minutes).overlaps(proposed))
}

/// Whether `slot` lies inside one working window and outside all breaks
pub fn fits_schedule(slot: &TimeRange, schedule: &StylistSchedule) -> bool {
    schedule.working_hours.iter().any(|w| w.contains(slot))
        && !schedule.breaks.iter().any(|b| b.overlaps(slot))
}

/// UTC day covered by `date`
pub fn day_bounds(date: NaiveDate) -> TimeRange {
    let start = date.and_time(NaiveTime::default()).and_utc();
    TimeRange::new(start, start + Duration::days(1))
}

/// Availability lookups backed by the catalog and booking storage
pub struct AvailabilityService<C: CacheService> {
    catalog: Arc<dyn CatalogService>,
    bookings: Arc<dyn BookingRepository>,
    policy: Arc<BranchPolicyResolver<C>>,
    clock: Arc<dyn Clock>,
    interval_minutes: i64,
}

impl<C: CacheService> AvailabilityService<C> {
    pub fn new(
        catalog: Arc<dyn CatalogService>,
        bookings: Arc<dyn BookingRepository>,
        policy: Arc<BranchPolicyResolver<C>>,
        clock: Arc<dyn Clock>,
        interval_minutes: i64,
    ) -> Self {
        Self {
            catalog,
            bookings,
            policy,
            clock,
            interval_minutes,
        }
    }

    /// Bookable slots of a stylist on `date`
    #[instrument(skip(self))]
    pub async fn available_slots(
        &self,
        stylist_id: Uuid,
        date: NaiveDate,
        duration_minutes: Option<i64>,
    ) -> AppResult<Vec<TimeRange>> {
        if let Some(d) = duration_minutes {
            if d <= 0 {
                return Err(AppError::Validation(
                    "duration_minutes must be positive".to_string(),
                ));
            }
        }

        let stylist = self.catalog.get_stylist(stylist_id).await?;
        let policy = self.policy.resolve(stylist.branch_id).await?;
        let schedule = self.catalog.get_stylist_schedule(stylist_id, date).await?;

        if schedule.is_day_off() {
            debug!("Stylist {} has no working hours on {}", stylist_id, date);
            return Ok(Vec::new());
        }

        let buffer = i64::from(policy.buffer_minutes);
        let reservations = self
            .reservations(stylist_id, day_bounds(date).expand(buffer), None)
            .await?;

        let query = SlotQuery {
            interval_minutes: self.interval_minutes,
            duration_minutes,
            buffer_minutes: buffer,
            now: self.clock.now(),
        };

        let slots = generate_slots(&schedule, &reservations, &query);
        debug!(
            "Generated {} slots for stylist {} on {}",
            slots.len(),
            stylist_id,
            date
        );

        Ok(slots)
    }

    /// Whether a stylist is free over `window` once buffers are applied
    ///
    /// Reservations of `exclude_booking` are ignored so a booking can be
    /// moved onto a range overlapping its own current slots.
    #[instrument(skip(self))]
    pub async fn is_stylist_available(
        &self,
        stylist_id: Uuid,
        window: TimeRange,
        buffer_minutes: i64,
        exclude_booking: Option<Uuid>,
    ) -> AppResult<bool> {
        let reservations = self
            .reservations(stylist_id, window.expand(buffer_minutes), exclude_booking)
            .await?;
        Ok(is_available(&window, &reservations, buffer_minutes))
    }

    async fn reservations(
        &self,
        stylist_id: Uuid,
        window: TimeRange,
        exclude_booking: Option<Uuid>,
    ) -> AppResult<Vec<TimeRange>> {
        Ok(self
            .bookings
            .find_reservations(stylist_id, window, exclude_booking)
            .await?
            .iter()
            .map(|item| item.window())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2030, 6, 10, hour, minute, 0).unwrap()
    }

    fn range(h1: u32, m1: u32, h2: u32, m2: u32) -> TimeRange {
        TimeRange::new(at(h1, m1), at(h2, m2))
    }

    fn query(buffer: i64) -> SlotQuery {
        SlotQuery {
            interval_minutes: 30,
            duration_minutes: None,
            buffer_minutes: buffer,
            now: at(0, 0),
        }
    }

    #[test]
    fn test_slots_fill_window() {
        let schedule = StylistSchedule {
            working_hours: vec![range(9, 0, 11, 0)],
            breaks: vec![],
        };
        let slots = generate_slots(&schedule, &[], &query(0));
        let starts: Vec<_> = slots.iter().map(|s| s.start).collect();
        assert_eq!(starts, vec![at(9, 0), at(9, 30), at(10, 0), at(10, 30)]);
    }

    #[test]
    fn test_slots_skip_breaks_and_buffered_reservations() {
        let schedule = StylistSchedule {
            working_hours: vec![range(9, 0, 13, 0)],
            breaks: vec![range(12, 0, 13, 0)],
        };
        let booked = vec![range(10, 0, 10, 30)];

        let slots = generate_slots(&schedule, &booked, &query(15));
        let starts: Vec<_> = slots.iter().map(|s| s.start).collect();

        // 09:30 and 10:30 abut the booking and fall inside its 15 minute buffer
        assert_eq!(starts, vec![at(9, 0), at(11, 0), at(11, 30)]);
    }

    #[test]
    fn test_slots_respect_duration_and_now() {
        let schedule = StylistSchedule {
            working_hours: vec![range(9, 0, 11, 0)],
            breaks: vec![],
        };
        let q = SlotQuery {
            duration_minutes: Some(60),
            now: at(9, 0),
            ..query(0)
        };
        let slots = generate_slots(&schedule, &[], &q);
        // 09:00 is not strictly after now; 10:30 + 60 overruns the window
        assert_eq!(slots, vec![range(9, 30, 10, 30), range(10, 0, 11, 0)]);
    }

    #[test]
    fn test_slots_are_chronological_across_windows() {
        let schedule = StylistSchedule {
            working_hours: vec![range(14, 0, 15, 0), range(9, 0, 10, 0)],
            breaks: vec![],
        };
        let slots = generate_slots(&schedule, &[], &query(0));
        let starts: Vec<_> = slots.iter().map(|s| s.start).collect();
        assert_eq!(starts, vec![at(9, 0), at(9, 30), at(14, 0), at(14, 30)]);
    }

    #[test]
    fn test_day_off_yields_nothing() {
        let slots = generate_slots(&StylistSchedule::default(), &[], &query(0));
        assert!(slots.is_empty());
    }

    #[test]
    fn test_abutting_booking_conflicts_only_with_buffer() {
        let booked = vec![range(10, 0, 10, 30)];
        let proposed = range(10, 30, 11, 0);
        assert!(is_available(&proposed, &booked, 0));
        assert!(!is_available(&proposed, &booked, 10));
    }

    #[test]
    fn test_fits_schedule() {
        let schedule = StylistSchedule {
            working_hours: vec![range(9, 0, 17, 0)],
            breaks: vec![range(13, 0, 14, 0)],
        };
        assert!(fits_schedule(&range(9, 0, 9, 30), &schedule));
        assert!(!fits_schedule(&range(12, 45, 13, 15), &schedule));
        assert!(!fits_schedule(&range(16, 45, 17, 15), &schedule));
        assert!(!fits_schedule(&range(9, 0, 9, 30), &StylistSchedule::default()));
    }

    #[test]
    fn test_day_bounds() {
        let bounds = day_bounds(NaiveDate::from_ymd_opt(2030, 6, 10).unwrap());
        assert_eq!(bounds.start, at(0, 0));
        assert_eq!(bounds.duration_minutes(), 24 * 60);
    }
}
