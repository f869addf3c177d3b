use std::collections::VecDeque;
use std::time::Duration;

use dashmap::DashMap;
use tokio::time::Instant;

/// How far back success/latency samples count toward a backend's health.
pub const STATS_WINDOW: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, Copy)]
struct Sample {
    at: Instant,
    success: bool,
    latency: Duration,
}

/// Recency-windowed health summary for one backend.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackendHealth {
    /// Fraction of in-window attempts that succeeded. 1.0 when no history
    /// exists, so untried backends are not penalized.
    pub success_rate: f64,
    pub mean_latency: Duration,
    pub samples: u64,
}

impl Default for BackendHealth {
    fn default() -> Self {
        Self {
            success_rate: 1.0,
            mean_latency: Duration::ZERO,
            samples: 0,
        }
    }
}

/// Per-backend invocation outcomes over a trailing window, feeding the
/// Smart ordering strategy. Same lazy-eviction shape as the usage ledger.
#[derive(Debug, Default)]
pub struct BackendStats {
    samples: DashMap<String, VecDeque<Sample>>,
}

impl BackendStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, key: &str, success: bool, latency: Duration) {
        let mut entry = self.samples.entry(key.to_string()).or_default();
        let now = Instant::now();
        Self::evict(&mut entry, now);
        entry.push_back(Sample {
            at: now,
            success,
            latency,
        });
    }

    pub fn health(&self, key: &str) -> BackendHealth {
        let Some(mut entry) = self.samples.get_mut(key) else {
            return BackendHealth::default();
        };
        Self::evict(&mut entry, Instant::now());

        let count = entry.len() as u64;
        if count == 0 {
            return BackendHealth::default();
        }

        let successes = entry.iter().filter(|s| s.success).count() as f64;
        let total_latency: Duration = entry.iter().map(|s| s.latency).sum();

        BackendHealth {
            success_rate: successes / count as f64,
            mean_latency: total_latency / count as u32,
            samples: count,
        }
    }

    fn evict(samples: &mut VecDeque<Sample>, now: Instant) {
        while let Some(sample) = samples.front() {
            if now.duration_since(sample.at) >= STATS_WINDOW {
                samples.pop_front();
            } else {
                break;
            }
        }
    }
}
