use std::collections::VecDeque;
use std::time::Duration;

use tokio::time::Instant;

/// Trailing accounting interval for per-minute limits.
pub const WINDOW: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy)]
struct UsageEvent {
    at: Instant,
    tokens: u64,
}

/// Counts of in-window events for one backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UsageSnapshot {
    pub requests: u64,
    pub tokens: u64,
}

/// Ordered usage events for one backend, trimmed to the trailing 60 seconds.
///
/// Expired entries are evicted lazily on read, never on a timer. The window
/// also remembers the last recorded call instant for minimum-spacing
/// enforcement.
#[derive(Debug, Default)]
pub struct UsageWindow {
    events: VecDeque<UsageEvent>,
    last_call: Option<Instant>,
}

impl UsageWindow {
    pub fn record(&mut self, now: Instant, tokens: u64) {
        self.events.push_back(UsageEvent { at: now, tokens });
        self.last_call = Some(now);
    }

    pub fn last_call(&self) -> Option<Instant> {
        self.last_call
    }

    fn evict(&mut self, now: Instant) {
        while let Some(event) = self.events.front() {
            if now.duration_since(event.at) >= WINDOW {
                self.events.pop_front();
            } else {
                break;
            }
        }
    }

    /// Evict-then-count. Callers must hold the window's lock across the
    /// whole call so the sequence stays atomic.
    pub fn snapshot(&mut self, now: Instant) -> UsageSnapshot {
        self.evict(now);
        UsageSnapshot {
            requests: self.events.len() as u64,
            tokens: self.events.iter().map(|e| e.tokens).sum(),
        }
    }

    /// How long until one more request carrying `extra_tokens` fits under
    /// both limits, assuming no further traffic. Zero when it fits now.
    ///
    /// Walks events oldest-first, simulating their expiry, until enough
    /// capacity has drained. When even an empty window cannot admit the
    /// request the full window length is returned; the scheduler re-checks
    /// on that cadence rather than spinning.
    pub fn time_to_admit(
        &mut self,
        now: Instant,
        extra_tokens: u64,
        request_limit: u64,
        token_limit: u64,
    ) -> Duration {
        self.evict(now);

        if request_limit == 0 || extra_tokens > token_limit {
            return WINDOW;
        }

        let mut requests = self.events.len() as u64;
        let mut tokens: u64 = self.events.iter().map(|e| e.tokens).sum();

        if requests + 1 <= request_limit && tokens + extra_tokens <= token_limit {
            return Duration::ZERO;
        }

        for event in &self.events {
            requests -= 1;
            tokens -= event.tokens;
            if requests + 1 <= request_limit && tokens + extra_tokens <= token_limit {
                let expires_at = event.at + WINDOW;
                return expires_at.saturating_duration_since(now);
            }
        }

        WINDOW
    }
}
