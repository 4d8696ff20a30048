//! Logging and tracing initialization.
//!
//! Structured logging via the `tracing` ecosystem, with pretty console
//! output for interactive use and JSON output for machine parsing.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::Level;
use tracing_subscriber::{
    EnvFilter,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

/// Configuration for the logging system.
#[derive(Default)]
pub struct LogConfig {
    /// Output logs as JSON (for machine parsing)
    pub json: bool,
    /// Enable verbose logging (sets default level to DEBUG)
    pub verbose: bool,
}

/// Initialize the tracing subscriber with the given configuration.
///
/// Called once, early in `main`, after config is loaded. The level can be
/// overridden at runtime via the `RUST_LOG` environment variable.
pub fn init(config: LogConfig) {
    let default_level = if config.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "isoflash={}",
            default_level.as_str().to_lowercase()
        ))
    });

    if config.json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .json()
                    .with_span_events(FmtSpan::CLOSE)
                    .with_current_span(true)
                    .with_target(true),
            )
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .init();
    }
}

/// A rate limiter for throttling log messages.
///
/// Used to keep per-chunk download progress from spamming the debug log
/// while a progress bar handles the interactive display.
pub struct LogThrottle {
    interval_ms: u64,
    /// Last log time in ms, or `u64::MAX` to indicate "never logged"
    last_log_ms: AtomicU64,
    start: Instant,
}

/// Sentinel value indicating the throttle has never logged
const NEVER_LOGGED: u64 = u64::MAX;

impl LogThrottle {
    /// Create a new throttle with the given minimum interval between logs.
    pub fn new(interval: std::time::Duration) -> Self {
        Self {
            interval_ms: interval.as_millis() as u64,
            last_log_ms: AtomicU64::new(NEVER_LOGGED),
            start: Instant::now(),
        }
    }

    /// Returns true if enough time has passed since the last log.
    ///
    /// Thread-safe; uses atomic operations.
    pub fn should_log(&self) -> bool {
        let now_ms = self.start.elapsed().as_millis() as u64;
        let last = self.last_log_ms.load(Ordering::Relaxed);

        let should = last == NEVER_LOGGED || now_ms.saturating_sub(last) >= self.interval_ms;

        if should {
            // If we lose the race, another thread logged first.
            self.last_log_ms
                .compare_exchange(last, now_ms, Ordering::Relaxed, Ordering::Relaxed)
                .is_ok()
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn throttle_allows_first_log() {
        let throttle = LogThrottle::new(Duration::from_secs(1));
        assert!(throttle.should_log());
    }

    #[test]
    fn throttle_blocks_immediate_second_log() {
        let throttle = LogThrottle::new(Duration::from_secs(1));
        assert!(throttle.should_log());
        assert!(!throttle.should_log());
    }

    #[test]
    fn throttle_allows_log_after_interval() {
        let throttle = LogThrottle::new(Duration::from_millis(10));
        assert!(throttle.should_log());
        std::thread::sleep(Duration::from_millis(20));
        assert!(throttle.should_log());
    }
}
