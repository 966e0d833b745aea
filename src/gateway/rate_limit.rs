//! Per-configuration request limiter
//!
//! A fixed one-minute bucket per config id. The hour and day ceilings are
//! compared against the same bucket while the elapsed time falls inside
//! their bracket. Counters live in process memory only.

use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::models::{ConfigId, RateLimitPolicy};
use crate::store::ConfigStore;

const MINUTE: Duration = Duration::from_secs(60);
const HOUR: Duration = Duration::from_secs(60 * 60);
const DAY: Duration = Duration::from_secs(24 * 60 * 60);
const MIN_CLEANUP_INTERVAL: Duration = Duration::from_secs(1);

/// Counter state for one config id
#[derive(Debug, Clone)]
pub struct RateLimitWindow {
    pub config_id: ConfigId,
    pub window_started_at: Instant,
    pub count_in_window: u32,
}

impl RateLimitWindow {
    fn new(config_id: ConfigId, now: Instant) -> Self {
        Self {
            config_id,
            window_started_at: now,
            count_in_window: 0,
        }
    }

    fn admit(&mut self, policy: &RateLimitPolicy, now: Instant) -> bool {
        // Brackets are judged on the elapsed time before any reset
        let elapsed = now.saturating_duration_since(self.window_started_at);
        if elapsed >= MINUTE {
            self.count_in_window = 0;
            self.window_started_at = now;
        }

        let ceilings = [
            (policy.requests_per_minute, MINUTE),
            (policy.requests_per_hour, HOUR),
            (policy.requests_per_day, DAY),
        ];
        for (limit, bracket) in ceilings {
            if let Some(limit) = limit {
                if elapsed < bracket && self.count_in_window >= limit {
                    return false;
                }
            }
        }

        self.count_in_window += 1;
        true
    }
}

/// Rate limiter keyed by provider config id
pub struct RateLimiter {
    store: Arc<dyn ConfigStore>,
    windows: Arc<DashMap<ConfigId, RateLimitWindow>>,
    idle_ttl: Duration,
    cleanup_task: RwLock<Option<JoinHandle<()>>>,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn ConfigStore>, idle_ttl: Duration) -> Self {
        Self {
            store,
            windows: Arc::new(DashMap::new()),
            idle_ttl,
            cleanup_task: RwLock::new(None),
        }
    }

    /// Admit one request for `config_id` under its current policy.
    ///
    /// Unknown configs are denied; configs without a policy are unlimited.
    pub async fn check_and_consume(&self, config_id: ConfigId) -> Result<bool> {
        let Some(config) = self.store.get(config_id).await? else {
            warn!(config_id = config_id, "Rate check for unknown config");
            return Ok(false);
        };

        match config.extra.rate_limit() {
            Some(policy) => Ok(self.check_policy(config_id, &policy)),
            None => Ok(true),
        }
    }

    /// Admit one request for `config_id` under an explicit policy
    pub fn check_policy(&self, config_id: ConfigId, policy: &RateLimitPolicy) -> bool {
        let now = Instant::now();
        let mut window = self
            .windows
            .entry(config_id)
            .or_insert_with(|| RateLimitWindow::new(config_id, now));

        let allowed = window.admit(policy, now);
        if !allowed {
            debug!(
                config_id = config_id,
                count = window.count_in_window,
                "Rate limit reached"
            );
        }
        allowed
    }

    /// Snapshot of one window, mostly for diagnostics
    pub fn window(&self, config_id: ConfigId) -> Option<RateLimitWindow> {
        self.windows.get(&config_id).map(|w| w.clone())
    }

    /// Drop windows idle for longer than the idle TTL; returns how many went
    pub fn cleanup(&self) -> usize {
        evict_idle(&self.windows, self.idle_ttl)
    }

    /// Run `cleanup` on a background task every `interval` (at least one second)
    pub async fn start_cleanup(&self, interval: Duration) {
        let interval = interval.max(MIN_CLEANUP_INTERVAL);
        let windows = self.windows.clone();
        let idle_ttl = self.idle_ttl;

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // First tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let evicted = evict_idle(&windows, idle_ttl);
                if evicted > 0 {
                    debug!(evicted = evicted, "Evicted idle rate limit windows");
                }
            }
        });

        if let Some(previous) = self.cleanup_task.write().await.replace(handle) {
            previous.abort();
        }
        info!(interval_secs = interval.as_secs(), "Started rate limit cleanup task");
    }

    pub async fn stop_cleanup(&self) {
        if let Some(handle) = self.cleanup_task.write().await.take() {
            handle.abort();
            info!("Stopped rate limit cleanup task");
        }
    }

    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }
}

fn evict_idle(windows: &DashMap<ConfigId, RateLimitWindow>, idle_ttl: Duration) -> usize {
    let now = Instant::now();
    let before = windows.len();
    windows.retain(|_, w| now.saturating_duration_since(w.window_started_at) <= idle_ttl);
    before.saturating_sub(windows.len())
}
