//! Dwell-time accrual per region.
//!
//! Each call to [`OccupancyTracker::accrue`] measures the wall-clock interval
//! since the previous call and credits it to the bucket (region name or
//! `elsewhere`) of the qualifying detection(s) seen in this call.
//!
//! - The first call only establishes the baseline timestamp: nothing is
//!   credited retroactively, but the buckets it classifies into become
//!   eligible for dominance with a zero total.
//! - A `now` earlier than the previous call (clock skew) credits nothing and
//!   moves the baseline to `now`.
//! - Totals never decrease.

use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

use crate::detect::Detection;
use crate::region::RegionRegistry;
use crate::NONE;

/// How elapsed time is credited when several qualifying detections arrive
/// in the same call.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccrualPolicy {
    /// Only the first qualifying detection (input order) is credited, so the
    /// sum over all buckets never exceeds wall-clock time.
    #[default]
    FirstDetection,
    /// Every qualifying detection credits the full interval to its own bucket.
    PerDetection,
}

impl FromStr for AccrualPolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "first_detection" | "first" => Ok(AccrualPolicy::FirstDetection),
            "per_detection" | "each" => Ok(AccrualPolicy::PerDetection),
            other => Err(anyhow!(
                "unknown accrual policy '{}' (expected first_detection or per_detection)",
                other
            )),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
struct Bucket {
    name: String,
    rank: usize,
    total: Duration,
}

/// Accumulated dwell time plus the timestamp of the last accrual.
///
/// Buckets are kept in registry order (`elsewhere` last) and only exist once
/// something has been classified into them.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct OccupancyState {
    buckets: Vec<Bucket>,
    last_update: Option<SystemTime>,
}

impl OccupancyState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accumulated time for `bucket`; zero when it was never touched.
    pub fn total(&self, bucket: &str) -> Duration {
        self.buckets
            .iter()
            .find(|b| b.name == bucket)
            .map(|b| b.total)
            .unwrap_or(Duration::ZERO)
    }

    /// Touched buckets with their totals, in priority order.
    pub fn buckets(&self) -> impl Iterator<Item = (&str, Duration)> + '_ {
        self.buckets.iter().map(|b| (b.name.as_str(), b.total))
    }

    pub fn last_update(&self) -> Option<SystemTime> {
        self.last_update
    }

    /// Sum over every bucket.
    pub fn total_accrued(&self) -> Duration {
        self.buckets.iter().map(|b| b.total).sum()
    }

    /// Bucket with the greatest total. Ties go to the bucket ranked first;
    /// `none` when nothing was ever classified.
    pub fn dominant(&self) -> &str {
        let mut best: Option<&Bucket> = None;
        for bucket in &self.buckets {
            // Strictly greater keeps the earlier bucket on ties.
            if best.map_or(true, |b| bucket.total > b.total) {
                best = Some(bucket);
            }
        }
        best.map(|b| b.name.as_str()).unwrap_or(NONE)
    }

    fn credit(&mut self, name: &str, rank: usize, elapsed: Duration) {
        if let Some(bucket) = self.buckets.iter_mut().find(|b| b.name == name) {
            bucket.total += elapsed;
            return;
        }
        let at = self
            .buckets
            .iter()
            .position(|b| b.rank > rank)
            .unwrap_or(self.buckets.len());
        self.buckets.insert(
            at,
            Bucket {
                name: name.to_string(),
                rank,
                total: elapsed,
            },
        );
    }
}

/// What a single accrual did.
#[derive(Clone, Debug, PartialEq)]
pub struct AccrualOutcome {
    /// Interval credited to each entry in `credited`.
    pub elapsed: Duration,
    /// Buckets credited during this call, one entry per credited detection.
    pub credited: Vec<String>,
    /// Dominant bucket after the update.
    pub dominant: String,
}

/// Owns the occupancy state and the only code path that mutates it.
///
/// `accrue` takes `&mut self`: callers sharing a tracker across threads must
/// serialize access (the pipeline holds it behind a `Mutex`) so that reading
/// the baseline, crediting and moving the baseline happen as one unit.
pub struct OccupancyTracker {
    regions: Arc<RegionRegistry>,
    policy: AccrualPolicy,
    state: OccupancyState,
}

impl OccupancyTracker {
    pub fn new(regions: Arc<RegionRegistry>, policy: AccrualPolicy) -> Self {
        Self::resume(regions, policy, OccupancyState::new())
    }

    /// Continue from a previously extracted state.
    pub fn resume(
        regions: Arc<RegionRegistry>,
        policy: AccrualPolicy,
        state: OccupancyState,
    ) -> Self {
        Self {
            regions,
            policy,
            state,
        }
    }

    pub fn state(&self) -> &OccupancyState {
        &self.state
    }

    pub fn into_state(self) -> OccupancyState {
        self.state
    }

    /// Classify `qualifying` detections and credit the time since the last call.
    pub fn accrue(&mut self, qualifying: &[Detection], now: SystemTime) -> AccrualOutcome {
        let elapsed = match self.state.last_update {
            None => Duration::ZERO,
            Some(last) => match now.duration_since(last) {
                Ok(elapsed) => elapsed,
                Err(regression) => {
                    log::warn!(
                        "clock moved backwards by {:?}; crediting no time this call",
                        regression.duration()
                    );
                    Duration::ZERO
                }
            },
        };

        let limit = match self.policy {
            AccrualPolicy::FirstDetection => 1,
            AccrualPolicy::PerDetection => usize::MAX,
        };

        let mut credited = Vec::new();
        for detection in qualifying.iter().take(limit) {
            let bucket = self.regions.classify(&detection.bbox);
            let rank = self.regions.rank(bucket);
            self.state.credit(bucket, rank, elapsed);
            log::debug!(
                "credited {:?} to {} (conf={:.2})",
                elapsed,
                bucket,
                detection.confidence
            );
            credited.push(bucket.to_string());
        }

        self.state.last_update = Some(now);

        AccrualOutcome {
            elapsed,
            credited,
            dominant: self.state.dominant().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::region::{BoundingBox, Region};
    use crate::ELSEWHERE;
    use std::time::UNIX_EPOCH;

    fn at(secs: u64) -> SystemTime {
        UNIX_EPOCH + Duration::from_secs(secs)
    }

    fn cat(xmin: f32, ymin: f32, xmax: f32, ymax: f32) -> Detection {
        Detection {
            label: "cat".to_string(),
            confidence: 0.9,
            bbox: BoundingBox::new(xmin, ymin, xmax, ymax).unwrap(),
            class_id: None,
        }
    }

    fn registry() -> Arc<RegionRegistry> {
        Arc::new(
            RegionRegistry::new(vec![
                Region::new(
                    "sofa",
                    BoundingBox::new(0.0, 0.0, 300.0, 300.0).unwrap(),
                    [0, 0, 255],
                )
                .unwrap(),
                Region::new(
                    "table",
                    BoundingBox::new(400.0, 0.0, 600.0, 300.0).unwrap(),
                    [0, 255, 0],
                )
                .unwrap(),
            ])
            .unwrap(),
        )
    }

    fn on_sofa() -> Detection {
        cat(10.0, 10.0, 50.0, 50.0)
    }

    fn on_table() -> Detection {
        cat(450.0, 10.0, 500.0, 50.0)
    }

    fn on_floor() -> Detection {
        cat(10.0, 500.0, 50.0, 550.0)
    }

    #[test]
    fn first_call_only_sets_baseline() {
        let mut tracker = OccupancyTracker::new(registry(), AccrualPolicy::FirstDetection);
        let outcome = tracker.accrue(&[on_sofa()], at(1_000));

        assert_eq!(outcome.elapsed, Duration::ZERO);
        assert_eq!(tracker.state().total_accrued(), Duration::ZERO);
        assert_eq!(tracker.state().last_update(), Some(at(1_000)));
        // The bucket was touched, so it is already dominant.
        assert_eq!(outcome.dominant, "sofa");
    }

    #[test]
    fn empty_history_reports_none() {
        let mut tracker = OccupancyTracker::new(registry(), AccrualPolicy::FirstDetection);
        assert_eq!(tracker.state().dominant(), NONE);
        let outcome = tracker.accrue(&[], at(5));
        assert_eq!(outcome.dominant, NONE);
        let outcome = tracker.accrue(&[], at(50));
        assert_eq!(outcome.dominant, NONE);
        assert_eq!(tracker.state().last_update(), Some(at(50)));
    }

    #[test]
    fn credits_exact_interval_to_one_bucket() {
        let mut tracker = OccupancyTracker::new(registry(), AccrualPolicy::FirstDetection);
        tracker.accrue(&[on_table()], at(100));
        tracker.accrue(&[on_floor()], at(103));
        let before_table = tracker.state().total("table");
        let before_elsewhere = tracker.state().total(ELSEWHERE);

        tracker.accrue(&[on_sofa()], at(110));

        assert_eq!(tracker.state().total("sofa"), Duration::from_secs(7));
        assert_eq!(tracker.state().total("table"), before_table);
        assert_eq!(tracker.state().total(ELSEWHERE), before_elsewhere);
    }

    #[test]
    fn calls_without_detections_still_move_baseline() {
        let mut tracker = OccupancyTracker::new(registry(), AccrualPolicy::FirstDetection);
        tracker.accrue(&[on_sofa()], at(0));
        tracker.accrue(&[], at(60));
        tracker.accrue(&[on_sofa()], at(65));
        // Only the last five seconds are credited.
        assert_eq!(tracker.state().total("sofa"), Duration::from_secs(5));
    }

    #[test]
    fn same_timestamp_is_idempotent() {
        let mut tracker = OccupancyTracker::new(registry(), AccrualPolicy::PerDetection);
        tracker.accrue(&[on_sofa()], at(0));
        tracker.accrue(&[on_sofa()], at(10));
        let snapshot = tracker.state().clone();

        tracker.accrue(&[on_sofa(), on_table()], at(10));

        assert_eq!(tracker.state().total("sofa"), snapshot.total("sofa"));
        assert_eq!(tracker.state().total_accrued(), snapshot.total_accrued());
    }

    #[test]
    fn clock_regression_clamps_to_zero() {
        let mut tracker = OccupancyTracker::new(registry(), AccrualPolicy::FirstDetection);
        tracker.accrue(&[on_sofa()], at(100));
        let outcome = tracker.accrue(&[on_sofa()], at(40));

        assert_eq!(outcome.elapsed, Duration::ZERO);
        assert_eq!(tracker.state().total("sofa"), Duration::ZERO);
        assert_eq!(tracker.state().last_update(), Some(at(40)));

        tracker.accrue(&[on_sofa()], at(45));
        assert_eq!(tracker.state().total("sofa"), Duration::from_secs(5));
    }

    #[test]
    fn first_detection_policy_caps_to_wall_clock() {
        let mut tracker = OccupancyTracker::new(registry(), AccrualPolicy::FirstDetection);
        tracker.accrue(&[], at(0));
        let outcome = tracker.accrue(&[on_table(), on_sofa()], at(10));

        assert_eq!(outcome.credited, vec!["table".to_string()]);
        assert_eq!(tracker.state().total("table"), Duration::from_secs(10));
        assert_eq!(tracker.state().total("sofa"), Duration::ZERO);
        assert_eq!(tracker.state().total_accrued(), Duration::from_secs(10));
    }

    #[test]
    fn per_detection_policy_credits_every_detection() {
        let mut tracker = OccupancyTracker::new(registry(), AccrualPolicy::PerDetection);
        tracker.accrue(&[], at(0));
        let outcome = tracker.accrue(&[on_table(), on_sofa(), on_sofa()], at(10));

        assert_eq!(outcome.credited.len(), 3);
        assert_eq!(tracker.state().total("table"), Duration::from_secs(10));
        assert_eq!(tracker.state().total("sofa"), Duration::from_secs(20));
        // Exceeds wall-clock time by construction.
        assert_eq!(tracker.state().total_accrued(), Duration::from_secs(30));
    }

    #[test]
    fn ties_resolve_to_registry_order() {
        let mut tracker = OccupancyTracker::new(registry(), AccrualPolicy::FirstDetection);
        // Touch table before sofa so insertion order differs from registry order.
        tracker.accrue(&[on_table()], at(0));
        tracker.accrue(&[on_table()], at(5));
        tracker.accrue(&[on_sofa()], at(5));
        tracker.accrue(&[on_sofa()], at(10));

        assert_eq!(tracker.state().total("sofa"), tracker.state().total("table"));
        for _ in 0..3 {
            assert_eq!(tracker.state().dominant(), "sofa");
        }
        let order: Vec<&str> = tracker.state().buckets().map(|(name, _)| name).collect();
        assert_eq!(order, vec!["sofa", "table"]);
    }

    #[test]
    fn elsewhere_loses_ties_to_regions() {
        let mut tracker = OccupancyTracker::new(registry(), AccrualPolicy::FirstDetection);
        tracker.accrue(&[on_floor()], at(0));
        tracker.accrue(&[on_floor()], at(4));
        tracker.accrue(&[on_table()], at(4));
        tracker.accrue(&[on_table()], at(8));
        assert_eq!(tracker.state().dominant(), "table");

        tracker.accrue(&[on_floor()], at(9));
        assert_eq!(tracker.state().dominant(), ELSEWHERE);
    }

    #[test]
    fn state_round_trips_through_resume() {
        let regions = registry();
        let mut tracker = OccupancyTracker::new(regions.clone(), AccrualPolicy::FirstDetection);
        tracker.accrue(&[on_sofa()], at(0));
        tracker.accrue(&[on_sofa()], at(3));
        let state = tracker.into_state();

        let mut resumed = OccupancyTracker::resume(regions, AccrualPolicy::FirstDetection, state);
        resumed.accrue(&[on_sofa()], at(5));
        assert_eq!(resumed.state().total("sofa"), Duration::from_secs(5));
    }

    #[test]
    fn parses_policy_names() {
        assert_eq!(
            "per_detection".parse::<AccrualPolicy>().unwrap(),
            AccrualPolicy::PerDetection
        );
        assert_eq!(
            " First_Detection ".parse::<AccrualPolicy>().unwrap(),
            AccrualPolicy::FirstDetection
        );
        assert!("divide".parse::<AccrualPolicy>().is_err());
    }
}
