use std::cell::RefCell;
use std::io::Write;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, FixedOffset, TimeZone};
use pretty_assertions::assert_eq;

use eink_clock::config::{BlockConfig, Config, ContentSource, FontRole};
use eink_clock::data::{DataError, Feed, FileFeed, WeatherReport};
use eink_clock::layout::{LayoutEngine, MonoRasterizer};
use eink_clock::panel::{PanelDriver, PanelError};
use eink_clock::{
    ClockError, DataSources, FrameBuffer, ManualClock, Rect, RefreshDecision, Resolution,
    Scheduler,
};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Call {
    Initialize(Resolution),
    Wake,
    Full,
    Partial(Vec<Rect>),
    Sleep,
}

#[derive(Default)]
struct PanelState {
    calls: Vec<Call>,
    failing_displays: u32,
}

/// Records every call and fails the next `failing_displays` displays.
#[derive(Clone, Default)]
struct RecordingPanel(Rc<RefCell<PanelState>>);

impl RecordingPanel {
    fn fail_next(&self, displays: u32) {
        self.0.borrow_mut().failing_displays = displays;
    }

    fn calls(&self) -> Vec<Call> {
        self.0.borrow().calls.clone()
    }

    fn display(&mut self, call: Call) -> Result<(), PanelError> {
        let mut state = self.0.borrow_mut();
        state.calls.push(call);
        if state.failing_displays > 0 {
            state.failing_displays -= 1;
            return Err(PanelError::BusyTimeout(Duration::from_secs(20)));
        }
        Ok(())
    }
}

impl PanelDriver for RecordingPanel {
    fn initialize(&mut self, resolution: Resolution) -> Result<(), PanelError> {
        self.0.borrow_mut().calls.push(Call::Initialize(resolution));
        Ok(())
    }

    fn display_full(&mut self, _frame: &FrameBuffer) -> Result<(), PanelError> {
        self.display(Call::Full)
    }

    fn display_partial(
        &mut self,
        _frame: &FrameBuffer,
        regions: &[Rect],
    ) -> Result<(), PanelError> {
        self.display(Call::Partial(regions.to_vec()))
    }

    fn sleep(&mut self) -> Result<(), PanelError> {
        self.0.borrow_mut().calls.push(Call::Sleep);
        Ok(())
    }

    fn wake(&mut self) -> Result<(), PanelError> {
        self.0.borrow_mut().calls.push(Call::Wake);
        Ok(())
    }
}

/// Weather that answers at once until `hang` is raised.
struct Weather {
    hang: Arc<AtomicBool>,
}

impl Feed<WeatherReport> for Weather {
    fn name(&self) -> &str {
        "weather"
    }

    fn fetch(&self) -> Result<WeatherReport, DataError> {
        if self.hang.load(Ordering::SeqCst) {
            std::thread::sleep(Duration::from_secs(3));
        }
        Ok(WeatherReport {
            temperature_c: 7.0,
            condition: "Rain".into(),
            observed_at: None,
        })
    }
}

fn start() -> DateTime<FixedOffset> {
    FixedOffset::east_opt(3600)
        .unwrap()
        .with_ymd_and_hms(2026, 10, 19, 8, 0, 0)
        .unwrap()
}

struct Harness {
    panel: RecordingPanel,
    clock: ManualClock,
    scheduler: Scheduler<RecordingPanel, ManualClock>,
}

fn harness(config: Config, sources: DataSources) -> Harness {
    let panel = RecordingPanel::default();
    let clock = ManualClock::new(start());
    let layout = LayoutEngine::new(&config, MonoRasterizer).unwrap();
    let scheduler = Scheduler::new(&config, layout, panel.clone(), clock.clone(), sources).unwrap();
    Harness {
        panel,
        clock,
        scheduler,
    }
}

fn clock_face() -> Harness {
    let config = Config::for_panel(296, 128);
    let sources = DataSources::new(config.schedule.fetch_timeout);
    harness(config, sources)
}

#[test]
fn first_tick_is_a_full_refresh_with_the_full_push_sequence() {
    let mut h = clock_face();
    assert_eq!(h.scheduler.tick().unwrap(), RefreshDecision::FullRefresh);
    assert_eq!(
        h.panel.calls(),
        vec![
            Call::Initialize(Resolution::new(296, 128).unwrap()),
            Call::Wake,
            Call::Full,
            Call::Sleep,
        ]
    );
    assert_eq!(h.scheduler.policy().last_full_refresh(), Some(start()));
}

#[test]
fn same_minute_is_a_no_op_and_next_minute_is_partial() {
    let mut h = clock_face();
    h.scheduler.tick().unwrap();

    h.clock.advance(Duration::from_secs(30));
    assert_eq!(h.scheduler.tick().unwrap(), RefreshDecision::NoOp);
    assert_eq!(h.panel.calls().len(), 4);

    h.clock.advance(Duration::from_secs(30));
    let RefreshDecision::PartialRefresh(regions) = h.scheduler.tick().unwrap() else {
        panic!("expected a partial refresh");
    };
    assert!(!regions.is_empty());
    assert_eq!(h.panel.calls()[5], Call::Partial(regions.clone()));
    assert_eq!(
        h.scheduler.policy().pending_regions().len(),
        regions.len()
    );
    assert_eq!(h.scheduler.shown(), h.scheduler.frame());
}

#[test]
fn three_consecutive_panel_failures_are_fatal() {
    let mut h = clock_face();
    h.panel.fail_next(3);

    h.scheduler.tick().unwrap();
    h.clock.advance(Duration::from_secs(60));
    h.scheduler.tick().unwrap();
    h.clock.advance(Duration::from_secs(60));
    let err = h.scheduler.tick().unwrap_err();

    assert!(matches!(
        err,
        ClockError::PanelCommunication { failures: 3, .. }
    ));
    assert!(err.is_fatal());
}

#[test]
fn two_failures_then_success_recovers() {
    let mut h = clock_face();
    h.panel.fail_next(2);

    for _ in 0..2 {
        assert_eq!(h.scheduler.tick().unwrap(), RefreshDecision::FullRefresh);
        h.clock.advance(Duration::from_secs(60));
    }
    assert_eq!(h.scheduler.consecutive_failures(), 2);
    assert!(h.scheduler.shown().is_blank());

    assert_eq!(h.scheduler.tick().unwrap(), RefreshDecision::FullRefresh);
    assert_eq!(h.scheduler.consecutive_failures(), 0);
    assert_eq!(h.scheduler.shown(), h.scheduler.frame());

    h.clock.advance(Duration::from_secs(60));
    assert!(matches!(
        h.scheduler.tick().unwrap(),
        RefreshDecision::PartialRefresh(_)
    ));
}

#[test]
fn erase_interval_forces_a_full_refresh() {
    let mut config = Config::for_panel(296, 128);
    config.refresh.erase_interval = Duration::from_secs(3600);
    let sources = DataSources::new(config.schedule.fetch_timeout);
    let mut h = harness(config, sources);

    h.scheduler.tick().unwrap();
    h.clock.advance(Duration::from_secs(3600));
    assert_eq!(h.scheduler.tick().unwrap(), RefreshDecision::FullRefresh);
    assert!(h.scheduler.policy().pending_regions().is_empty());
    assert_eq!(
        h.scheduler.policy().last_full_refresh(),
        Some(start() + chrono::TimeDelta::hours(1))
    );
}

#[test]
fn slow_weather_feed_renders_last_known_good_then_placeholder() {
    let mut config = Config::for_panel(296, 128);
    config.schedule.fetch_timeout = Duration::from_millis(200);
    config.data.stale_after = Duration::from_secs(3600);
    config.blocks = vec![
        BlockConfig::new("clock", ContentSource::Clock, Rect::new(0, 0, 296, 64))
            .with_font(FontRole::Large),
        BlockConfig::new("weather", ContentSource::Weather, Rect::new(0, 64, 296, 32)),
    ];
    let hang = Arc::new(AtomicBool::new(false));
    let sources = DataSources::new(config.schedule.fetch_timeout).with_weather(Weather {
        hang: hang.clone(),
    });
    let mut h = harness(config, sources);

    h.scheduler.tick().unwrap();
    assert_eq!(h.scheduler.contents()[1].text(), "7.0°C Rain");

    hang.store(true, Ordering::SeqCst);
    h.clock.advance(Duration::from_secs(60));
    h.scheduler.tick().unwrap();
    let weather = &h.scheduler.contents()[1];
    assert!(!weather.placeholder);
    assert_eq!(weather.text(), "7.0°C Rain (as of 08:00)");

    h.clock.advance(Duration::from_secs(2 * 3600));
    h.scheduler.tick().unwrap();
    let weather = &h.scheduler.contents()[1];
    assert!(weather.placeholder);
    assert_eq!(weather.text(), "weather unavailable");
}

#[test]
fn weather_file_left_behind_by_a_dead_poller_goes_stale() {
    let mut config = Config::for_panel(296, 128);
    config.data.stale_after = Duration::from_secs(3 * 3600);
    config.blocks = vec![BlockConfig::new(
        "weather",
        ContentSource::Weather,
        Rect::new(0, 0, 296, 32),
    )];
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        "temperature_c = 20.0\ncondition = \"Sunny\"\nobserved_at = \"2026-10-19T07:30:00+01:00\""
    )
    .unwrap();
    let sources = DataSources::new(config.schedule.fetch_timeout)
        .with_weather(FileFeed::new("weather", file.path()));
    let mut h = harness(config, sources);

    h.scheduler.tick().unwrap();
    assert_eq!(h.scheduler.contents()[0].text(), "20.0°C Sunny");

    // Same file, read again well past the staleness limit
    h.clock.advance(Duration::from_secs(18 * 24 * 3600));
    h.scheduler.tick().unwrap();
    let weather = &h.scheduler.contents()[0];
    assert!(weather.placeholder);
    assert_eq!(weather.text(), "weather unavailable");
}
