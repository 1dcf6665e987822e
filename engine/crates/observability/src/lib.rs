use std::time::Duration;

use tracing_subscriber::{fmt, EnvFilter};

pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"));
    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
}

/// Slowest command handling considered healthy.
pub const COMMAND_BUDGET: Duration = Duration::from_millis(10);

/// Per-session counters, logged once when the session ends.
#[derive(Debug, Clone, Default)]
pub struct SessionMetrics {
    pub session_id: u64,
    pub commands: u64,
    pub throttled: u64,
    pub steps: u64,
    pub frames_out: u64,
    pub slowest_command: Duration,
}

impl SessionMetrics {
    pub fn new(session_id: u64) -> Self {
        Self {
            session_id,
            ..Default::default()
        }
    }

    pub fn record_command(&mut self, elapsed: Duration) {
        self.commands += 1;
        if elapsed > self.slowest_command {
            self.slowest_command = elapsed;
        }
        if elapsed > COMMAND_BUDGET {
            tracing::warn!(
                session_id = self.session_id,
                elapsed_us = elapsed.as_micros() as u64,
                "command exceeded budget ({}us > {}us)",
                elapsed.as_micros(),
                COMMAND_BUDGET.as_micros()
            );
        }
    }

    pub fn log(&self, lifetime: Duration) {
        tracing::info!(
            session_id = self.session_id,
            commands = self.commands,
            throttled = self.throttled,
            steps = self.steps,
            frames_out = self.frames_out,
            slowest_us = self.slowest_command.as_micros() as u64,
            lifetime_ms = lifetime.as_millis() as u64,
            "session closed"
        );
    }
}
