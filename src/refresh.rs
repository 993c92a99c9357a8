//! Full vs. partial refresh decisions.
//!
//! E-paper accumulates ghosting with every partial refresh, so the policy
//! forces a full erase whenever the configured interval has passed and
//! escalates large or risky changes to a full refresh. It is evaluated once
//! per tick against the frame last shown on the panel.

use std::collections::BTreeSet;

use chrono::{DateTime, FixedOffset, TimeDelta};
use log::{debug, warn};

use crate::config::RefreshConfig;
use crate::error::ClockError;
use crate::framebuffer::{FrameBuffer, Rect, Resolution};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyState {
    /// Panel matches the last rendered frame
    Idle,
    NeedsPartial,
    NeedsFull,
}

/// What the scheduler should do with the panel this tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshDecision {
    NoOp,
    PartialRefresh(Vec<Rect>),
    FullRefresh,
}

impl RefreshDecision {
    pub fn is_full(&self) -> bool {
        matches!(self, RefreshDecision::FullRefresh)
    }
}

#[derive(Debug, Clone)]
pub struct RefreshPolicy {
    state: PolicyState,
    resolution: Resolution,
    last_full_refresh: Option<DateTime<FixedOffset>>,
    refresh_interval_limit: TimeDelta,
    partial_area_threshold: f64,
    max_partial_refreshes: Option<u32>,
    pending: BTreeSet<Rect>,
    partials_since_full: u32,
    push_failed: bool,
}

impl RefreshPolicy {
    pub fn new(config: &RefreshConfig, resolution: Resolution) -> Result<Self, ClockError> {
        let refresh_interval_limit = TimeDelta::from_std(config.erase_interval)
            .map_err(|_| ClockError::config("refresh.erase_interval is too long"))?;
        if refresh_interval_limit <= TimeDelta::zero() {
            return Err(ClockError::config("refresh.erase_interval must be positive"));
        }
        Ok(Self {
            state: PolicyState::NeedsFull,
            resolution,
            last_full_refresh: None,
            refresh_interval_limit,
            partial_area_threshold: config.partial_area_threshold,
            max_partial_refreshes: config.max_partial_refreshes,
            pending: BTreeSet::new(),
            partials_since_full: 0,
            push_failed: false,
        })
    }

    pub fn state(&self) -> PolicyState {
        self.state
    }

    pub fn last_full_refresh(&self) -> Option<DateTime<FixedOffset>> {
        self.last_full_refresh
    }

    /// Regions partially refreshed since the last full refresh.
    pub fn pending_regions(&self) -> &BTreeSet<Rect> {
        &self.pending
    }

    pub fn partials_since_full(&self) -> u32 {
        self.partials_since_full
    }

    /// When the erase interval will force the next full refresh. Before the
    /// first one it is counted from `now`, since that refresh is imminent.
    pub fn next_full_refresh_due(&self, now: DateTime<FixedOffset>) -> DateTime<FixedOffset> {
        let base = self.last_full_refresh.unwrap_or(now);
        base.checked_add_signed(self.refresh_interval_limit)
            .unwrap_or(base)
    }

    /// The last push never reached the panel, so its content is unknown.
    pub fn mark_push_failed(&mut self) {
        self.push_failed = true;
        self.state = PolicyState::NeedsFull;
    }

    /// Decide how to bring the panel from `previous` to `current`.
    pub fn evaluate(
        &mut self,
        now: DateTime<FixedOffset>,
        current: &FrameBuffer,
        previous: &FrameBuffer,
    ) -> RefreshDecision {
        let Some(last_full) = self.last_full_refresh else {
            debug!("No full refresh yet, starting with one");
            return self.full(now);
        };
        if self.push_failed {
            debug!("Previous push failed, redrawing everything");
            return self.full(now);
        }

        let elapsed = (now - last_full).max(TimeDelta::zero());
        if elapsed >= self.refresh_interval_limit {
            debug!("Erase interval reached after {}s", elapsed.num_seconds());
            return self.full(now);
        }

        let regions = match current.diff(previous) {
            Ok(regions) => regions,
            Err(e) => {
                warn!("Frame diff failed, falling back to a full refresh: {}", e);
                return self.full(now);
            }
        };
        if regions.is_empty() {
            self.state = PolicyState::Idle;
            return RefreshDecision::NoOp;
        }

        let changed: u64 = regions.iter().map(Rect::area).sum();
        let coverage = changed as f64 / self.resolution.area() as f64;
        if coverage > self.partial_area_threshold {
            debug!(
                "{:.1}% of the panel changed, above the {:.1}% partial threshold",
                coverage * 100.0,
                self.partial_area_threshold * 100.0
            );
            return self.full(now);
        }
        if let Some(limit) = self.max_partial_refreshes {
            if self.partials_since_full >= limit {
                debug!("{} partial refreshes since the last full one", limit);
                return self.full(now);
            }
        }

        let bounds = self.resolution.bounds();
        self.pending
            .extend(regions.iter().filter_map(|r| r.intersection(&bounds)));
        self.partials_since_full += 1;
        self.state = PolicyState::NeedsPartial;
        RefreshDecision::PartialRefresh(regions)
    }

    fn full(&mut self, now: DateTime<FixedOffset>) -> RefreshDecision {
        self.state = PolicyState::NeedsFull;
        self.pending.clear();
        self.partials_since_full = 0;
        self.push_failed = false;
        self.last_full_refresh = Some(match self.last_full_refresh {
            Some(last) if last > now => last,
            _ => now,
        });
        RefreshDecision::FullRefresh
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::framebuffer::Channel;
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    const DAY: u64 = 86_400;

    fn at(text: &str) -> DateTime<FixedOffset> {
        DateTime::parse_from_rfc3339(text).unwrap()
    }

    fn setup() -> (RefreshPolicy, FrameBuffer) {
        let config = RefreshConfig {
            erase_interval: Duration::from_secs(90 * DAY),
            ..RefreshConfig::default()
        };
        let resolution = Resolution::new(296, 128).unwrap();
        (
            RefreshPolicy::new(&config, resolution).unwrap(),
            FrameBuffer::new(resolution),
        )
    }

    fn square(frame: &FrameBuffer, x: u32, y: u32, side: u32) -> FrameBuffer {
        let mut next = frame.clone();
        for py in y..y + side {
            for px in x..x + side {
                next.set_pixel(px, py, Channel::Primary, true).unwrap();
            }
        }
        next
    }

    #[test]
    fn first_evaluation_is_full_even_without_changes() {
        let (mut policy, frame) = setup();
        let now = at("2026-10-19T12:00:00+00:00");
        assert_eq!(policy.state(), PolicyState::NeedsFull);
        assert_eq!(policy.evaluate(now, &frame, &frame), RefreshDecision::FullRefresh);
        assert_eq!(policy.last_full_refresh(), Some(now));
        assert_eq!(policy.evaluate(now, &frame, &frame), RefreshDecision::NoOp);
        assert_eq!(policy.state(), PolicyState::Idle);
    }

    #[test]
    fn small_change_just_before_the_interval_is_partial() {
        let (mut policy, frame) = setup();
        let start = at("2026-10-19T12:00:00+00:00");
        policy.evaluate(start, &frame, &frame);

        let now = start + TimeDelta::seconds(90 * DAY as i64 - 1);
        let next = square(&frame, 20, 30, 10);
        let expected = vec![Rect::new(20, 30, 10, 10)];
        assert_eq!(
            policy.evaluate(now, &next, &frame),
            RefreshDecision::PartialRefresh(expected.clone())
        );
        assert_eq!(policy.state(), PolicyState::NeedsPartial);
        assert_eq!(policy.pending_regions().iter().copied().collect::<Vec<_>>(), expected);
        assert_eq!(policy.partials_since_full(), 1);
    }

    #[test]
    fn interval_forces_full_and_resets_the_accumulator() {
        let (mut policy, frame) = setup();
        let start = at("2026-10-19T12:00:00+00:00");
        policy.evaluate(start, &frame, &frame);
        policy.evaluate(start, &square(&frame, 0, 0, 4), &frame);
        assert_eq!(policy.pending_regions().len(), 1);

        let now = start + TimeDelta::seconds(90 * DAY as i64 + 1);
        assert_eq!(policy.evaluate(now, &frame, &frame), RefreshDecision::FullRefresh);
        assert!(policy.pending_regions().is_empty());
        assert_eq!(policy.last_full_refresh(), Some(now));
        assert_eq!(policy.partials_since_full(), 0);
    }

    #[test]
    fn large_change_escalates_to_full() {
        let (mut policy, frame) = setup();
        let now = at("2026-10-19T12:00:00+00:00");
        policy.evaluate(now, &frame, &frame);
        // 64x64 is about 11% of a 296x128 panel
        let next = square(&frame, 0, 0, 64);
        assert_eq!(policy.evaluate(now, &next, &frame), RefreshDecision::FullRefresh);
    }

    #[test]
    fn mismatched_frames_degrade_to_full() {
        let (mut policy, frame) = setup();
        let now = at("2026-10-19T12:00:00+00:00");
        policy.evaluate(now, &frame, &frame);
        let other = FrameBuffer::new(Resolution::new(10, 10).unwrap());
        assert_eq!(policy.evaluate(now, &frame, &other), RefreshDecision::FullRefresh);
    }

    #[test]
    fn failed_push_forces_full_next_time() {
        let (mut policy, frame) = setup();
        let now = at("2026-10-19T12:00:00+00:00");
        policy.evaluate(now, &frame, &frame);
        policy.mark_push_failed();
        assert_eq!(policy.state(), PolicyState::NeedsFull);
        assert_eq!(policy.evaluate(now, &frame, &frame), RefreshDecision::FullRefresh);
        assert_eq!(policy.evaluate(now, &frame, &frame), RefreshDecision::NoOp);
    }

    #[test]
    fn partial_budget_forces_full() {
        let config = RefreshConfig {
            max_partial_refreshes: Some(2),
            ..RefreshConfig::default()
        };
        let resolution = Resolution::new(296, 128).unwrap();
        let mut policy = RefreshPolicy::new(&config, resolution).unwrap();
        let blank = FrameBuffer::new(resolution);
        let now = at("2026-10-19T12:00:00+00:00");
        policy.evaluate(now, &blank, &blank);

        let dot = square(&blank, 1, 1, 2);
        assert!(matches!(policy.evaluate(now, &dot, &blank), RefreshDecision::PartialRefresh(_)));
        assert!(matches!(policy.evaluate(now, &blank, &dot), RefreshDecision::PartialRefresh(_)));
        assert_eq!(policy.evaluate(now, &dot, &blank), RefreshDecision::FullRefresh);
    }

    #[test]
    fn clock_stepping_back_keeps_the_last_full_refresh() {
        let (mut policy, frame) = setup();
        let later = at("2026-10-19T12:00:00+00:00");
        policy.evaluate(later, &frame, &frame);
        policy.mark_push_failed();

        let earlier = at("2026-10-19T11:00:00+00:00");
        assert_eq!(policy.evaluate(earlier, &frame, &frame), RefreshDecision::FullRefresh);
        assert_eq!(policy.last_full_refresh(), Some(later));
    }

    #[test]
    fn next_erase_is_one_interval_after_the_last_full_refresh() {
        let (mut policy, frame) = setup();
        let now = at("2026-10-19T12:00:00+00:00");
        assert_eq!(policy.next_full_refresh_due(now), at("2027-01-17T12:00:00+00:00"));
        policy.evaluate(now, &frame, &frame);
        let later = at("2026-11-01T00:00:00+00:00");
        assert_eq!(policy.next_full_refresh_due(later), at("2027-01-17T12:00:00+00:00"));
    }
}
