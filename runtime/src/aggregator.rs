//! RSVP statistics computed straight from the RSVP collection.
//!
//! Counters on the wedding document are a cache; statistics never read them.

use crate::deadline::{Timeouts, with_deadline};
use crate::load_owned;
use chrono::{Duration, NaiveDate};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::instrument;
use wedding_rsvp_core::environment::Clock;
use wedding_rsvp_core::{Result, Rsvp, RsvpFilter, RsvpStatus, Stores, UserId, WeddingId};

/// Trend window used when the caller does not pick one.
pub const DEFAULT_TREND_DAYS: u32 = 30;

/// Longest trend window.
pub const MAX_TREND_DAYS: u32 = 365;

/// Submissions on one UTC calendar day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DailyCount {
    /// The day.
    pub date: NaiveDate,
    /// Responses submitted that day.
    pub count: u64,
}

/// Aggregate view of a wedding's responses.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RsvpStatistics {
    /// Responses with status `attending`.
    pub attending: u64,
    /// Responses with status `not_attending`.
    pub not_attending: u64,
    /// Responses with status `maybe`.
    pub maybe: u64,
    /// All responses.
    pub total_responses: u64,
    /// Headcount: sum of `attendance_count` over attending responses.
    pub total_guests: u64,
    /// Sum of `plus_one_count` over all responses.
    pub plus_ones_count: u64,
    /// Responses per selected dietary option.
    pub dietary: BTreeMap<String, u64>,
    /// Oldest day first, zero-filled.
    pub daily_trend: Vec<DailyCount>,
}

/// Compute statistics in one pass over `rsvps`.
///
/// The trend covers the `days` UTC days ending on `today`, `days` clamped to
/// 1..=365. Submissions outside the window still count towards the totals.
#[must_use]
pub fn compute_statistics(rsvps: &[Rsvp], today: NaiveDate, days: u32) -> RsvpStatistics {
    let days = days.clamp(1, MAX_TREND_DAYS);
    let first_day = today - Duration::days(i64::from(days - 1));

    let mut stats = RsvpStatistics::default();
    let mut per_day: BTreeMap<NaiveDate, u64> = BTreeMap::new();

    for rsvp in rsvps {
        stats.total_responses += 1;
        match rsvp.status {
            RsvpStatus::Attending => {
                stats.attending += 1;
                stats.total_guests += u64::from(rsvp.attendance_count);
            }
            RsvpStatus::NotAttending => stats.not_attending += 1,
            RsvpStatus::Maybe => stats.maybe += 1,
        }
        stats.plus_ones_count += u64::from(rsvp.plus_one_count);

        for option in &rsvp.dietary_selections {
            *stats.dietary.entry(option.clone()).or_default() += 1;
        }

        let day = rsvp.submitted_at.date_naive();
        if (first_day..=today).contains(&day) {
            *per_day.entry(day).or_default() += 1;
        }
    }

    stats.daily_trend = first_day
        .iter_days()
        .take_while(|day| *day <= today)
        .map(|date| DailyCount {
            date,
            count: per_day.get(&date).copied().unwrap_or_default(),
        })
        .collect();
    stats
}

/// Owner-facing statistics.
#[derive(Clone)]
pub struct Aggregator {
    stores: Stores,
    clock: Arc<dyn Clock>,
    timeouts: Timeouts,
}

impl Aggregator {
    /// Create the aggregator.
    #[must_use]
    pub fn new(stores: Stores, clock: Arc<dyn Clock>, timeouts: Timeouts) -> Self {
        Self {
            stores,
            clock,
            timeouts,
        }
    }

    /// Statistics for a wedding the caller owns, with a trend over `days`
    /// (default 30).
    ///
    /// # Errors
    ///
    /// `NOT_FOUND`, `UNAUTHORIZED`, or `STORAGE` (including an elapsed
    /// long-operation deadline).
    #[instrument(skip_all, fields(user_id = %owner, wedding_id = %wedding_id))]
    pub async fn statistics(
        &self,
        owner: &UserId,
        wedding_id: WeddingId,
        days: Option<u32>,
    ) -> Result<RsvpStatistics> {
        with_deadline(self.timeouts.long_operation, "rsvp statistics", async {
            load_owned(&self.stores, wedding_id, owner).await?;
            let rsvps = self
                .stores
                .rsvps
                .export(wedding_id, RsvpFilter::default())
                .await?;
            let today = self.clock.now().date_naive();
            Ok(compute_statistics(
                &rsvps,
                today,
                days.unwrap_or(DEFAULT_TREND_DAYS),
            ))
        })
        .await
    }
}
