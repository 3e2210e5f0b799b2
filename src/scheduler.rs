/// Scheduling for automatic regrouping
///
/// The periodic timer is a pure state machine: `tick` decides what to do at a
/// given instant and `complete` records how a run ended. The caller owns the
/// real timer. The fast path is debounced with an explicit `Debouncer`.
use crate::storage::Settings;

const MINUTE_MS: u64 = 60 * 1000;

/// How often settings are re-read while automatic regrouping is off
pub const SETTINGS_POLL_MS: u64 = MINUTE_MS;
/// Delay before retrying a scheduled run that failed
pub const RETRY_BACKOFF_MS: u64 = 5 * MINUTE_MS;
/// Window in which fast-path triggers collapse into one run
pub const FAST_PATH_DEBOUNCE_MS: u64 = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    /// Nothing scheduled yet; the next tick acts immediately
    #[default]
    Idle,
    Waiting,
    Running,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SchedulerState {
    pub next_fire_at: Option<u64>,
    pub mode: Mode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Not due yet, or a run is in flight
    Wait,
    /// Auto-regroup is off; settings will be checked again later
    PollSettings,
    /// Start a full regroup, then report back through `complete`
    Regroup,
}

impl SchedulerState {
    fn waiting_until(at: u64) -> Self {
        SchedulerState {
            next_fire_at: Some(at),
            mode: Mode::Waiting,
        }
    }

    /// How long the caller should sleep before the next tick
    pub fn delay_from(&self, now: u64) -> u64 {
        match (self.mode, self.next_fire_at) {
            (Mode::Running, _) | (_, None) => 0,
            (_, Some(at)) => at.saturating_sub(now),
        }
    }
}

pub fn tick(state: SchedulerState, now: u64, settings: &Settings) -> (SchedulerState, Action) {
    if state.mode == Mode::Running {
        return (state, Action::Wait);
    }
    if state.next_fire_at.is_some_and(|at| now < at) {
        return (state, Action::Wait);
    }

    if settings.auto_regroup_enabled() {
        let running = SchedulerState {
            next_fire_at: None,
            mode: Mode::Running,
        };
        (running, Action::Regroup)
    } else {
        (SchedulerState::waiting_until(now + SETTINGS_POLL_MS), Action::PollSettings)
    }
}

/// Schedule the next run: the configured interval after a success, the short
/// backoff after a failure.
pub fn complete(_state: SchedulerState, now: u64, settings: &Settings, succeeded: bool) -> SchedulerState {
    let delay = if succeeded {
        u64::from(settings.interval_minutes()) * MINUTE_MS
    } else {
        RETRY_BACKOFF_MS
    };
    SchedulerState::waiting_until(now + delay)
}

/// Trailing-edge debounce
///
/// Each `trigger` replaces the pending call. The caller waits out the window
/// on its own timer and then calls `fire` with its ticket; only the latest
/// ticket fires. Timer accuracy does not matter, only trigger order.
#[derive(Debug, Clone)]
pub struct Debouncer {
    window_ms: u64,
    issued: u64,
    pending: Option<u64>,
}

impl Debouncer {
    pub fn new(window_ms: u64) -> Self {
        Debouncer {
            window_ms,
            issued: 0,
            pending: None,
        }
    }

    pub fn window_ms(&self) -> u64 {
        self.window_ms
    }

    pub fn trigger(&mut self) -> u64 {
        self.issued += 1;
        self.pending = Some(self.issued);
        self.issued
    }

    /// Whether the call behind `ticket` should run now. Consumes the pending call.
    pub fn fire(&mut self, ticket: u64) -> bool {
        if self.pending == Some(ticket) {
            self.pending = None;
            true
        } else {
            false
        }
    }
}

impl Default for Debouncer {
    fn default() -> Self {
        Debouncer::new(FAST_PATH_DEBOUNCE_MS)
    }
}
