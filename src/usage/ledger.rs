use dashmap::DashMap;
use tokio::time::Instant;

use super::window::{UsageSnapshot, UsageWindow};

/// Per-backend sliding-window usage counters.
///
/// Windows are keyed by `ModelLimits::key()` and locked per entry, so
/// distinct backends never contend. The evict-then-count sequence for a key
/// runs under a single entry guard.
#[derive(Debug, Default)]
pub struct UsageLedger {
    windows: DashMap<String, UsageWindow>,
}

impl UsageLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a usage event for `key` at the current instant. Side effect
    /// only; never fails.
    pub fn record(&self, key: &str, tokens: u64) {
        self.with_window(key, |window| window.record(Instant::now(), tokens));
    }

    /// In-window request/token counts for `key`, evicting expired events as
    /// a side effect of the read.
    pub fn usage(&self, key: &str) -> UsageSnapshot {
        self.with_window(key, |window| window.snapshot(Instant::now()))
    }

    pub fn last_call(&self, key: &str) -> Option<Instant> {
        self.with_window(key, |window| window.last_call())
    }

    /// Run `f` against the window for `key` while holding its entry guard.
    /// The scheduler uses this to make its whole admission decision atomic
    /// per key.
    pub(crate) fn with_window<R>(&self, key: &str, f: impl FnOnce(&mut UsageWindow) -> R) -> R {
        let mut entry = self.windows.entry(key.to_string()).or_default();
        f(entry.value_mut())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_record_and_usage() {
        let ledger = UsageLedger::new();
        ledger.record("anthropic:sonnet", 1_000);
        ledger.record("anthropic:sonnet", 2_000);
        ledger.record("anthropic:haiku", 50);

        let sonnet = ledger.usage("anthropic:sonnet");
        assert_eq!(sonnet.requests, 2);
        assert_eq!(sonnet.tokens, 3_000);

        let haiku = ledger.usage("anthropic:haiku");
        assert_eq!(haiku.requests, 1);
        assert_eq!(haiku.tokens, 50);
    }

    #[tokio::test(start_paused = true)]
    async fn test_usage_zero_after_window_elapses() {
        let ledger = UsageLedger::new();
        ledger.record("anthropic:sonnet", 1_000);

        tokio::time::advance(Duration::from_secs(61)).await;

        let snap = ledger.usage("anthropic:sonnet");
        assert_eq!(snap.requests, 0);
        assert_eq!(snap.tokens, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_key_is_empty() {
        let ledger = UsageLedger::new();
        assert_eq!(ledger.usage("nope").requests, 0);
        assert!(ledger.last_call("nope").is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_records_are_not_lost() {
        let ledger = Arc::new(UsageLedger::new());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let ledger = Arc::clone(&ledger);
                tokio::spawn(async move {
                    for _ in 0..100 {
                        ledger.record("shared:model", 10);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap();
        }

        let snap = ledger.usage("shared:model");
        assert_eq!(snap.requests, 800);
        assert_eq!(snap.tokens, 8_000);
    }
}
