//! Receiving side of the protocol
//!
//! A display applies server events to its local render state, counts the
//! timer down once per second between server actions, and reconnects with
//! exponential backoff when the channel drops. Nothing here talks back to the
//! server.

use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::events::SyncEvent;
use crate::state::FormattingOptions;
use crate::timer::{TimerAction, TimerActionKind, TimerPhase, TimerSnapshot};

/// Visual emphasis for the remaining time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerDecoration {
    Normal,
    Warning,
    Danger,
    Finished,
}

impl TimerDecoration {
    /// Thresholds are checked lowest first: 0 finished, 10 danger, 30 warning
    pub fn for_remaining(remaining: u32) -> Self {
        if remaining == 0 {
            TimerDecoration::Finished
        } else if remaining <= 10 {
            TimerDecoration::Danger
        } else if remaining <= 30 {
            TimerDecoration::Warning
        } else {
            TimerDecoration::Normal
        }
    }
}

/// Local countdown extrapolated from the last server action
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Countdown {
    pub duration: u32,
    pub remaining: u32,
    pub running: bool,
    pub timer_size: u32,
}

impl Countdown {
    pub fn from_snapshot(snapshot: &TimerSnapshot) -> Self {
        Self::from_snapshot_at(snapshot, Utc::now())
    }

    /// Catch up with a running checkpoint: whole seconds elapsed since
    /// `updated_at` are already gone on displays that were connected
    pub fn from_snapshot_at(snapshot: &TimerSnapshot, now: DateTime<Utc>) -> Self {
        let running = snapshot.phase == TimerPhase::Running;
        let remaining = if running {
            let elapsed = (now - snapshot.updated_at).num_seconds().max(0);
            let elapsed = u32::try_from(elapsed).unwrap_or(u32::MAX);
            snapshot.remaining.saturating_sub(elapsed)
        } else {
            snapshot.remaining
        };

        Self {
            duration: snapshot.duration,
            remaining,
            running: running && remaining > 0,
            timer_size: snapshot.timer_size,
        }
    }

    /// Server correction: replace local state with the action's checkpoint
    pub fn apply(&mut self, action: &TimerAction) {
        self.duration = action.duration;
        self.remaining = action.remaining;
        self.timer_size = action.timer_size;
        self.running = matches!(action.action, TimerActionKind::Start | TimerActionKind::Resume);
    }

    /// One local second. Returns true if the displayed value changed.
    pub fn tick(&mut self) -> bool {
        if !self.running {
            return false;
        }
        if self.remaining == 0 {
            self.running = false;
            return false;
        }
        self.remaining -= 1;
        if self.remaining == 0 {
            self.running = false;
        }
        true
    }

    pub fn decoration(&self) -> TimerDecoration {
        TimerDecoration::for_remaining(self.remaining)
    }

    /// `MM:SS`
    pub fn label(&self) -> String {
        format!("{:02}:{:02}", self.remaining / 60, self.remaining % 60)
    }
}

impl Default for Countdown {
    fn default() -> Self {
        Self {
            duration: 0,
            remaining: 0,
            running: false,
            timer_size: crate::state::DEFAULT_TIMER_SIZE,
        }
    }
}

/// What an applied event changed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisplayChange {
    Initialized,
    Text,
    Logo,
    Timer(TimerActionKind),
    Rejected(String),
}

/// Everything a display needs to render
#[derive(Debug, Clone, Default)]
pub struct DisplayModel {
    pub passport_text: String,
    pub prize_text: String,
    pub formatting: FormattingOptions,
    pub logo_path: String,
    pub countdown: Countdown,
    pub initialized: bool,
}

impl DisplayModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&mut self, event: SyncEvent) -> DisplayChange {
        match event {
            SyncEvent::Init(init) => {
                self.passport_text = init.passport_text;
                self.prize_text = init.prize_text;
                self.formatting = init.formatting;
                self.logo_path = init.logo_path;
                self.countdown = Countdown::from_snapshot(&init.timer);
                self.initialized = true;
                DisplayChange::Initialized
            }
            SyncEvent::PassportUpdate(update) => {
                self.passport_text = update.passport_text;
                self.prize_text = update.prize_text;
                self.formatting = update.formatting;
                DisplayChange::Text
            }
            SyncEvent::LogoUpdate(update) => {
                self.logo_path = update.logo_path;
                DisplayChange::Logo
            }
            SyncEvent::TimerAction(action) => {
                self.countdown.apply(&action);
                DisplayChange::Timer(action.action)
            }
            SyncEvent::Error { message } => DisplayChange::Rejected(message),
        }
    }

    /// `None` when no logo should be shown
    pub fn logo(&self) -> Option<&str> {
        if self.logo_path.is_empty() {
            None
        } else {
            Some(self.logo_path.as_str())
        }
    }

    /// Text lines split into the configured number of columns, filled top to
    /// bottom
    pub fn columns(&self) -> Vec<Vec<&str>> {
        let lines: Vec<&str> = self.passport_text.lines().collect();
        let count = usize::from(self.formatting.columns.max(1));
        if lines.is_empty() {
            return vec![Vec::new(); count];
        }

        let per_column = lines.len().div_ceil(count);
        let mut columns: Vec<Vec<&str>> = lines.chunks(per_column).map(|c| c.to_vec()).collect();
        columns.resize(count, Vec::new());
        columns
    }
}

/// Client reconnect schedule: `base * multiplier^attempt`, giving up after
/// `max_attempts` consecutive failures
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReconnectPolicy {
    pub base: Duration,
    pub multiplier: f64,
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(1),
            multiplier: 1.5,
            max_attempts: 10,
        }
    }
}

impl ReconnectPolicy {
    /// Delay before retry number `attempt` (0-based), or `None` once the
    /// attempts are used up
    pub fn delay(&self, attempt: u32) -> Option<Duration> {
        if attempt >= self.max_attempts {
            return None;
        }
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        Some(self.base.mul_f64(self.multiplier.powi(exponent)))
    }
}
