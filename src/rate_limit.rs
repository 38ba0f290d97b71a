//! Fixed-window request quotas keyed by client identity and route category.
//!
//! Each key owns one counter per quota window. A request is admitted only if every window of
//! its category still has room; an admitted request increments all of them, a rejected one
//! increments none. State lives in process memory and is lost on restart. Keys whose windows
//! have all elapsed are swept periodically, so idle clients do not accumulate.
use async_trait::async_trait;
use dashmap::DashMap;
use std::{
    fmt,
    sync::{
        Arc, Mutex,
        atomic::{AtomicU64, Ordering},
    },
    time::{Duration, Instant},
};
use tracing::debug;

/// Every this many checks, keys with no live window are dropped.
const SWEEP_INTERVAL: u64 = 1024;

/// Routes are grouped into categories that share a quota.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RouteCategory {
    /// Routes that cost an upstream model call (chat, quiz generation).
    Expensive,
    /// Everything else.
    Standard,
}

impl fmt::Display for RouteCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RouteCategory::Expensive => f.write_str("expensive"),
            RouteCategory::Standard => f.write_str("standard"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RateLimitKey {
    pub client: String,
    pub category: RouteCategory,
}

impl RateLimitKey {
    pub fn new(client: impl Into<String>, category: RouteCategory) -> Self {
        Self {
            client: client.into(),
            category,
        }
    }
}

/// `limit` requests per `period`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quota {
    pub limit: u32,
    pub period: Duration,
}

impl Quota {
    pub const fn new(limit: u32, period: Duration) -> Self {
        Self { limit, period }
    }

    pub const fn per_seconds(limit: u32, seconds: u64) -> Self {
        Self::new(limit, Duration::from_secs(seconds))
    }
}

/// The quotas enforced for each route category. A category may carry several nested windows.
#[derive(Debug, Clone)]
pub struct QuotaPolicy {
    pub expensive: Vec<Quota>,
    pub standard: Vec<Quota>,
}

impl QuotaPolicy {
    pub fn quotas(&self, category: RouteCategory) -> &[Quota] {
        match category {
            RouteCategory::Expensive => &self.expensive,
            RouteCategory::Standard => &self.standard,
        }
    }
}

impl Default for QuotaPolicy {
    /// 2 per 15 seconds for model calls; 200 per day and 50 per hour for everything else.
    fn default() -> Self {
        Self {
            expensive: vec![Quota::per_seconds(2, 15)],
            standard: vec![
                Quota::per_seconds(200, 24 * 60 * 60),
                Quota::per_seconds(50, 60 * 60),
            ],
        }
    }
}

/// The outcome of an admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Admitted,
    Rejected { retry_after: Option<Duration> },
}

impl Admission {
    pub fn is_admitted(&self) -> bool {
        matches!(self, Admission::Admitted)
    }
}

/// Decides whether a request may proceed. Implementations must make the check-and-count for
/// a single key atomic with respect to concurrent callers.
#[async_trait]
pub trait RateLimiter: fmt::Debug + Send + Sync {
    async fn admit(&self, key: &RateLimitKey) -> Admission;
}

/// Source of the current instant, replaceable in tests.
pub trait Clock: fmt::Debug + Send + Sync {
    fn now(&self) -> Instant;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<Instant>>,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self {
            now: Arc::new(Mutex::new(Instant::now())),
        }
    }
}

impl ManualClock {
    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *self.now.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[derive(Debug, Clone, Copy)]
struct Window {
    start: Instant,
    count: u32,
}

impl Window {
    /// A window covers `[start, start + period)`.
    fn has_elapsed(&self, period: Duration, now: Instant) -> bool {
        now.saturating_duration_since(self.start) >= period
    }
}

/// In-process fixed-window limiter.
#[derive(Debug)]
pub struct FixedWindowLimiter<C: Clock = SystemClock> {
    policy: QuotaPolicy,
    clock: C,
    windows: DashMap<RateLimitKey, Vec<Window>>,
    checks: AtomicU64,
}

impl FixedWindowLimiter<SystemClock> {
    pub fn new(policy: QuotaPolicy) -> Self {
        Self::with_clock(policy, SystemClock)
    }
}

impl<C: Clock> FixedWindowLimiter<C> {
    pub fn with_clock(policy: QuotaPolicy, clock: C) -> Self {
        Self {
            policy,
            clock,
            windows: DashMap::new(),
            checks: AtomicU64::new(0),
        }
    }

    /// Number of keys currently tracked.
    pub fn tracked_keys(&self) -> usize {
        self.windows.len()
    }

    /// Drops every key whose windows have all elapsed and returns how many were removed. Such a
    /// key would be reset on its next check anyway, so removing it changes no decision.
    pub fn evict_expired(&self) -> usize {
        let now = self.clock.now();
        let before = self.windows.len();
        self.windows.retain(|key, windows| {
            windows
                .iter()
                .zip(self.policy.quotas(key.category))
                .any(|(window, quota)| !window.has_elapsed(quota.period, now))
        });
        let evicted = before.saturating_sub(self.windows.len());
        if evicted > 0 {
            debug!(evicted, remaining = self.windows.len(), "Evicted idle rate limit keys");
        }
        evicted
    }

    /// The synchronous core of [`RateLimiter::admit`].
    pub fn check(&self, key: &RateLimitKey) -> Admission {
        let quotas = self.policy.quotas(key.category);
        if quotas.is_empty() {
            return Admission::Admitted;
        }
        let admission = self.check_windows(key, quotas);

        // The entry guard from `check_windows` is gone; `retain` takes every shard lock.
        if (self.checks.fetch_add(1, Ordering::Relaxed) + 1) % SWEEP_INTERVAL == 0 {
            self.evict_expired();
        }
        admission
    }

    fn check_windows(&self, key: &RateLimitKey, quotas: &[Quota]) -> Admission {
        let now = self.clock.now();

        // The entry guard holds the shard lock, serializing concurrent checks for this key.
        let mut entry = self.windows.entry(key.clone()).or_insert_with(|| {
            vec![
                Window {
                    start: now,
                    count: 0,
                };
                quotas.len()
            ]
        });
        let windows = entry.value_mut();

        for (window, quota) in windows.iter_mut().zip(quotas) {
            if window.has_elapsed(quota.period, now) {
                *window = Window {
                    start: now,
                    count: 0,
                };
            }
        }

        let retry_after = windows
            .iter()
            .zip(quotas)
            .filter(|(window, quota)| window.count >= quota.limit)
            .map(|(window, quota)| (window.start + quota.period).saturating_duration_since(now))
            .max();

        if let Some(wait) = retry_after {
            debug!(
                client = %key.client,
                category = %key.category,
                retry_after_ms = wait.as_millis() as u64,
                "Rate limit exceeded"
            );
            return Admission::Rejected {
                retry_after: Some(wait),
            };
        }

        for window in windows.iter_mut() {
            window.count += 1;
        }
        Admission::Admitted
    }
}

#[async_trait]
impl<C: Clock> RateLimiter for FixedWindowLimiter<C> {
    async fn admit(&self, key: &RateLimitKey) -> Admission {
        self.check(key)
    }
}

/// Admits everything. Used when rate limiting is switched off.
#[derive(Debug, Clone, Copy, Default)]
pub struct Unlimited;

#[async_trait]
impl RateLimiter for Unlimited {
    async fn admit(&self, _key: &RateLimitKey) -> Admission {
        Admission::Admitted
    }
}
