//! The tick loop.
//!
//! One tick fetches the data feeds, renders the face into the working frame,
//! asks the [`RefreshPolicy`] what the panel needs and pushes it. Panel
//! failures are retried on later ticks with a full refresh until
//! `refresh.max_consecutive_failures` is reached, which ends the loop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, FixedOffset};
use log::{debug, info, warn};

use crate::config::Config;
use crate::data::DataSources;
use crate::error::ClockError;
use crate::framebuffer::{FrameBuffer, Resolution};
use crate::layout::{
    BlockContent, LayoutEngine, MonoRasterizer, RenderContext, TextRasterizer,
};
use crate::panel::{PanelDriver, PanelError};
use crate::refresh::{RefreshDecision, RefreshPolicy};
use crate::time::TimeSource;

/// Longest single sleep between shutdown checks.
const SLEEP_SLICE: Duration = Duration::from_secs(1);

pub struct Scheduler<P, T, R = MonoRasterizer> {
    layout: LayoutEngine<R>,
    policy: RefreshPolicy,
    panel: P,
    clock: T,
    sources: DataSources,
    resolution: Resolution,
    /// Frame being drawn this tick
    frame: FrameBuffer,
    /// Frame the panel is known to show
    shown: FrameBuffer,
    contents: Vec<BlockContent>,
    initialized: bool,
    asleep: bool,
    consecutive_failures: u32,
    max_failures: u32,
    tick_interval: Duration,
    align: bool,
    shutdown: Arc<AtomicBool>,
}

impl<P, T, R> Scheduler<P, T, R>
where
    P: PanelDriver,
    T: TimeSource,
    R: TextRasterizer,
{
    pub fn new(
        config: &Config,
        layout: LayoutEngine<R>,
        panel: P,
        clock: T,
        sources: DataSources,
    ) -> Result<Self, ClockError> {
        config.validate()?;
        let resolution = config.resolution()?;
        Ok(Self {
            layout,
            policy: RefreshPolicy::new(&config.refresh, resolution)?,
            panel,
            clock,
            sources,
            resolution,
            frame: FrameBuffer::new(resolution),
            shown: FrameBuffer::new(resolution),
            contents: Vec::new(),
            initialized: false,
            asleep: true,
            consecutive_failures: 0,
            max_failures: config.refresh.max_consecutive_failures,
            tick_interval: config.schedule.tick_interval,
            align: config.schedule.align_to_interval,
            shutdown: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Raising this flag stops [`Scheduler::run`] before its next tick.
    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        self.shutdown.clone()
    }

    pub fn policy(&self) -> &RefreshPolicy {
        &self.policy
    }

    pub fn panel(&self) -> &P {
        &self.panel
    }

    /// The frame rendered by the most recent tick.
    pub fn frame(&self) -> &FrameBuffer {
        &self.frame
    }

    /// The frame the panel was last successfully updated with.
    pub fn shown(&self) -> &FrameBuffer {
        &self.shown
    }

    /// Block contents of the most recent tick.
    pub fn contents(&self) -> &[BlockContent] {
        &self.contents
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Render one frame and bring the panel up to date with it.
    pub fn tick(&mut self) -> Result<RefreshDecision, ClockError> {
        let now = self.clock.now();
        let snapshot = self.sources.snapshot(now);
        let context = RenderContext {
            erase_due: self.policy.next_full_refresh_due(now),
        };
        self.contents = self.layout.render(&snapshot, &context, &mut self.frame);

        let decision = self.policy.evaluate(now, &self.frame, &self.shown);
        match &decision {
            RefreshDecision::NoOp => {
                debug!("{}: nothing changed", now.format("%H:%M:%S"));
                return Ok(decision);
            }
            RefreshDecision::FullRefresh => info!("{}: full refresh", now.format("%H:%M:%S")),
            RefreshDecision::PartialRefresh(regions) => info!(
                "{}: partial refresh of {} regions",
                now.format("%H:%M:%S"),
                regions.len()
            ),
        }

        match self.push(&decision) {
            Ok(()) => {
                self.consecutive_failures = 0;
                self.shown.copy_from(&self.frame)?;
                Ok(decision)
            }
            Err(e) => {
                self.consecutive_failures += 1;
                self.policy.mark_push_failed();
                warn!(
                    "Panel update failed ({} of {}): {}",
                    self.consecutive_failures, self.max_failures, e
                );
                if self.consecutive_failures >= self.max_failures {
                    return Err(ClockError::PanelCommunication {
                        failures: self.consecutive_failures,
                        source: e,
                    });
                }
                Ok(decision)
            }
        }
    }

    /// Blank the panel with a full refresh.
    pub fn erase(&mut self) -> Result<(), ClockError> {
        info!("Erasing the panel");
        let blank = FrameBuffer::new(self.resolution);
        self.ensure_initialized()
            .and_then(|()| {
                dispatch(
                    &mut self.panel,
                    &mut self.asleep,
                    &blank,
                    &RefreshDecision::FullRefresh,
                )
            })
            .map_err(|source| ClockError::PanelCommunication {
                failures: 1,
                source,
            })?;
        self.shown.copy_from(&blank)?;
        Ok(())
    }

    /// Tick until shut down, a fatal error, or `limit` ticks. Returns the
    /// number of ticks run. The panel is left asleep.
    pub fn run(&mut self, limit: Option<u64>) -> Result<u64, ClockError> {
        let mut ticks = 0u64;
        let result = loop {
            if self.shutdown.load(Ordering::SeqCst) {
                info!("Shutdown requested after {} ticks", ticks);
                break Ok(ticks);
            }
            let started = self.clock.now();
            if let Err(e) = self.tick() {
                break Err(e);
            }
            ticks += 1;
            if limit.is_some_and(|limit| ticks >= limit) {
                break Ok(ticks);
            }
            let wait = self.until_next_tick(started, self.clock.now());
            debug!("Next tick in {}s", wait.as_secs());
            self.idle(wait);
        };
        self.park();
        result
    }

    /// How long to wait before the tick that follows one begun at `started`.
    fn until_next_tick(
        &self,
        started: DateTime<FixedOffset>,
        now: DateTime<FixedOffset>,
    ) -> Duration {
        let interval = self.tick_interval;
        if self.align {
            let interval_ms = interval.as_millis().max(1);
            // Local wall-clock milliseconds, so "1h" lands on the local hour
            let local_ms = now.naive_local().and_utc().timestamp_millis();
            let into_interval = local_ms.rem_euclid(interval_ms as i64) as u128;
            let wait = interval_ms - into_interval;
            return Duration::from_millis(u64::try_from(wait).unwrap_or(u64::MAX));
        }
        let spent = (now - started).to_std().unwrap_or(Duration::ZERO);
        interval.saturating_sub(spent)
    }

    fn idle(&self, mut remaining: Duration) {
        while !remaining.is_zero() && !self.shutdown.load(Ordering::SeqCst) {
            let slice = remaining.min(SLEEP_SLICE);
            self.clock.sleep(slice);
            remaining -= slice;
        }
    }

    /// Put the panel to sleep if a push left it awake.
    fn park(&mut self) {
        if self.initialized && !self.asleep {
            match self.panel.sleep() {
                Ok(()) => self.asleep = true,
                Err(e) => warn!("Cannot put the panel to sleep: {}", e),
            }
        }
    }

    fn push(&mut self, decision: &RefreshDecision) -> Result<(), PanelError> {
        self.ensure_initialized()?;
        dispatch(&mut self.panel, &mut self.asleep, &self.frame, decision)
    }

    fn ensure_initialized(&mut self) -> Result<(), PanelError> {
        if !self.initialized {
            self.panel.initialize(self.resolution)?;
            self.initialized = true;
            self.asleep = true;
        }
        Ok(())
    }
}

/// Wake the panel, show `frame` as `decision` says and put it back to sleep.
fn dispatch<P: PanelDriver>(
    panel: &mut P,
    asleep: &mut bool,
    frame: &FrameBuffer,
    decision: &RefreshDecision,
) -> Result<(), PanelError> {
    panel.wake()?;
    *asleep = false;
    match decision {
        RefreshDecision::FullRefresh => panel.display_full(frame)?,
        RefreshDecision::PartialRefresh(regions) => panel.display_partial(frame, regions)?,
        RefreshDecision::NoOp => {}
    }
    panel.sleep()?;
    *asleep = true;
    Ok(())
}
