use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionTimer {
    pub total_seconds: u32,
    pub remaining_seconds: u32,
}

impl SessionTimer {
    pub fn elapsed_seconds(&self) -> u32 {
        self.total_seconds - self.remaining_seconds
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockTick {
    pub remaining: u32,
    pub expired: bool,
}

/// Whole-second countdown driven by arbitrary tick deltas.
#[derive(Debug, Clone)]
pub struct SessionClock {
    timer: SessionTimer,
    carry: Duration,
    running: bool,
    expired: bool,
}

impl SessionClock {
    pub fn new(total_seconds: u32) -> Self {
        Self {
            timer: SessionTimer {
                total_seconds,
                remaining_seconds: total_seconds,
            },
            carry: Duration::ZERO,
            running: false,
            expired: false,
        }
    }

    pub fn start(&mut self) {
        if self.expired {
            return;
        }
        self.running = true;
        info!(total_seconds = self.timer.total_seconds, "clock started");
    }

    pub fn stop(&mut self) {
        if self.running {
            debug!(remaining = self.timer.remaining_seconds, "clock stopped");
        }
        self.running = false;
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn has_expired(&self) -> bool {
        self.expired
    }

    pub fn timer(&self) -> SessionTimer {
        self.timer
    }

    pub fn remaining(&self) -> u32 {
        self.timer.remaining_seconds
    }

    /// Returns `Some` whenever at least one whole second passed. `expired` is
    /// set on exactly one tick, after which the clock stops itself.
    pub fn tick(&mut self, dt: Duration) -> Option<ClockTick> {
        if !self.running {
            return None;
        }
        self.carry += dt;
        let whole = self.carry.as_secs();
        if whole == 0 {
            return None;
        }
        self.carry -= Duration::from_secs(whole);

        let step = u32::try_from(whole).unwrap_or(u32::MAX);
        self.timer.remaining_seconds = self.timer.remaining_seconds.saturating_sub(step);

        let expired = self.timer.remaining_seconds == 0;
        if expired {
            self.expired = true;
            self.running = false;
            info!("clock expired");
        }
        Some(ClockTick {
            remaining: self.timer.remaining_seconds,
            expired,
        })
    }
}
