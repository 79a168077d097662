//! Server-side countdown checkpoint
//!
//! The server never ticks. It records the last action (duration, remaining,
//! phase, timestamp) and replicates each transition to clients, which count
//! down locally between actions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SyncError};

/// Countdown length used when nothing else has been configured
pub const DEFAULT_TIMER_DURATION_SECS: u32 = 300;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimerPhase {
    Idle,
    Running,
    Paused,
}

impl std::fmt::Display for TimerPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TimerPhase::Idle => write!(f, "idle"),
            TimerPhase::Running => write!(f, "running"),
            TimerPhase::Paused => write!(f, "paused"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimerActionKind {
    Start,
    Pause,
    Resume,
    Reset,
}

impl TimerActionKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "start" => Some(Self::Start),
            "pause" => Some(Self::Pause),
            "resume" => Some(Self::Resume),
            "reset" => Some(Self::Reset),
            _ => None,
        }
    }
}

impl std::fmt::Display for TimerActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TimerActionKind::Start => write!(f, "start"),
            TimerActionKind::Pause => write!(f, "pause"),
            TimerActionKind::Resume => write!(f, "resume"),
            TimerActionKind::Reset => write!(f, "reset"),
        }
    }
}

/// A transition as replicated to every client (`timer_action` payload)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimerAction {
    pub action: TimerActionKind,
    pub duration: u32,
    pub remaining: u32,
    pub timer_size: u32,
}

/// Admin request for a timer transition. Missing values fall back to the
/// engine's current configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimerCommand {
    pub action: TimerActionKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remaining: Option<u32>,
    #[serde(default, alias = "timerSizePx", skip_serializing_if = "Option::is_none")]
    pub timer_size: Option<u32>,
}

impl TimerCommand {
    pub fn new(action: TimerActionKind) -> Self {
        Self {
            action,
            duration: None,
            remaining: None,
            timer_size: None,
        }
    }
}

/// Last recorded checkpoint, handed to newly joined clients
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimerSnapshot {
    pub phase: TimerPhase,
    pub running: bool,
    pub duration: u32,
    pub remaining: u32,
    pub timer_size: u32,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct TimerEngine {
    duration: u32,
    remaining: u32,
    phase: TimerPhase,
    timer_size: u32,
    updated_at: DateTime<Utc>,
}

impl TimerEngine {
    pub fn new(duration: u32, timer_size: u32) -> Self {
        Self {
            duration,
            remaining: duration,
            phase: TimerPhase::Idle,
            timer_size,
            updated_at: Utc::now(),
        }
    }

    pub fn phase(&self) -> TimerPhase {
        self.phase
    }

    pub fn duration(&self) -> u32 {
        self.duration
    }

    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    pub fn timer_size(&self) -> u32 {
        self.timer_size
    }

    pub fn is_running(&self) -> bool {
        self.phase == TimerPhase::Running
    }

    /// Any state → Running with a full countdown
    pub fn start(&mut self, duration: u32, timer_size: u32) -> TimerAction {
        self.duration = duration;
        self.remaining = duration;
        self.timer_size = timer_size;
        self.record(TimerActionKind::Start, TimerPhase::Running, Utc::now())
    }

    /// Running → Paused
    pub fn pause(&mut self, remaining: Option<u32>) -> Result<TimerAction> {
        self.pause_at(remaining, Utc::now())
    }

    /// Running → Paused, freezing `remaining` as of `now`.
    ///
    /// Without an explicit value the frozen time is the checkpoint minus the
    /// whole seconds elapsed since the last action.
    pub fn pause_at(
        &mut self,
        remaining: Option<u32>,
        now: DateTime<Utc>,
    ) -> Result<TimerAction> {
        self.require(TimerActionKind::Pause, TimerPhase::Running)?;

        let frozen = match remaining {
            Some(r) => r,
            None => self.remaining_at(now),
        };
        self.remaining = frozen.min(self.duration);
        Ok(self.record(TimerActionKind::Pause, TimerPhase::Paused, now))
    }

    /// Paused → Running, continuing from `remaining` (or the frozen value)
    pub fn resume(&mut self, remaining: Option<u32>) -> Result<TimerAction> {
        self.require(TimerActionKind::Resume, TimerPhase::Paused)?;

        if let Some(r) = remaining {
            self.remaining = r.min(self.duration);
        }
        Ok(self.record(TimerActionKind::Resume, TimerPhase::Running, Utc::now()))
    }

    /// Any state → Idle with `remaining = duration`
    pub fn reset(&mut self, duration: u32, timer_size: u32) -> TimerAction {
        self.duration = duration;
        self.remaining = duration;
        self.timer_size = timer_size;
        self.record(TimerActionKind::Reset, TimerPhase::Idle, Utc::now())
    }

    /// The raw checkpoint; never extrapolated
    pub fn snapshot(&self) -> TimerSnapshot {
        TimerSnapshot {
            phase: self.phase,
            running: self.is_running(),
            duration: self.duration,
            remaining: self.remaining,
            timer_size: self.timer_size,
            updated_at: self.updated_at,
        }
    }

    fn remaining_at(&self, now: DateTime<Utc>) -> u32 {
        if self.phase != TimerPhase::Running {
            return self.remaining;
        }
        let elapsed = (now - self.updated_at).num_seconds().max(0);
        let elapsed = u32::try_from(elapsed).unwrap_or(u32::MAX);
        self.remaining.saturating_sub(elapsed)
    }

    fn require(&self, action: TimerActionKind, expected: TimerPhase) -> Result<()> {
        if self.phase == expected {
            Ok(())
        } else {
            Err(SyncError::InvalidTransition {
                action,
                phase: self.phase,
            })
        }
    }

    fn record(
        &mut self,
        action: TimerActionKind,
        phase: TimerPhase,
        now: DateTime<Utc>,
    ) -> TimerAction {
        self.phase = phase;
        self.updated_at = now;
        TimerAction {
            action,
            duration: self.duration,
            remaining: self.remaining,
            timer_size: self.timer_size,
        }
    }
}

impl Default for TimerEngine {
    fn default() -> Self {
        Self::new(DEFAULT_TIMER_DURATION_SECS, crate::state::DEFAULT_TIMER_SIZE)
    }
}
