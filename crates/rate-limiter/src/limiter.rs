use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use callguard_core_types::{CallerId, Clock, Timestamp};
use tracing::{debug, info};

use crate::config::{RateLimitConfig, RateLimiterSettings};
use crate::model::{CallEntry, LimitScope, RateLimitResult};

/// Horizon kept by cleanup when no limit is configured at all.
const FALLBACK_HORIZON: Duration = Duration::from_secs(86_400);

type MethodHistory = HashMap<String, Vec<CallEntry>>;

/// Sliding-window limiter.
///
/// `check` never mutates; `record` appends and may prune. Callers must
/// `check` before admitting a call and `record` only once it was admitted,
/// so rejected calls never count against the caller.
pub struct RateLimiter {
    clock: Arc<dyn Clock>,
    global: Option<RateLimitConfig>,
    methods: HashMap<String, RateLimitConfig>,
    history: HashMap<CallerId, MethodHistory>,
    cleanup_interval: Duration,
    last_cleanup: Timestamp,
}

struct WindowUsage {
    count: u64,
    oldest: Option<Timestamp>,
}

impl RateLimiter {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self::with_settings(RateLimiterSettings::default(), clock)
    }

    pub fn with_settings(settings: RateLimiterSettings, clock: Arc<dyn Clock>) -> Self {
        let last_cleanup = clock.now();
        Self {
            clock,
            global: settings.global,
            methods: settings.methods.into_iter().collect(),
            history: HashMap::new(),
            cleanup_interval: settings.cleanup_interval,
            last_cleanup,
        }
    }

    pub fn set_global_limit(&mut self, config: Option<RateLimitConfig>) {
        self.global = config;
    }

    pub fn set_method_limit(&mut self, method: impl Into<String>, config: RateLimitConfig) {
        self.methods.insert(method.into(), config);
    }

    pub fn remove_method_limit(&mut self, method: &str) -> Option<RateLimitConfig> {
        self.methods.remove(method)
    }

    pub fn method_limit(&self, method: &str) -> Option<&RateLimitConfig> {
        self.methods.get(method)
    }

    pub fn global_limit(&self) -> Option<&RateLimitConfig> {
        self.global.as_ref()
    }

    /// Method-specific limit first, then the global one; first denial wins.
    pub fn check(&self, caller: &CallerId, roles: &[String], method: &str) -> RateLimitResult {
        let now = self.clock.now();

        if let Some(config) = self.methods.get(method) {
            if !config.is_exempt(caller, roles) {
                let start = now.saturating_sub(config.window.duration());
                let usage = self.method_usage(caller, method, start);
                if let Some(denied) = deny_if_exhausted(config, &usage, now, LimitScope::Method) {
                    debug!(%caller, method, count = usage.count, "method rate limit reached");
                    return denied;
                }
            }
        }

        if let Some(config) = &self.global {
            if !config.is_exempt(caller, roles) {
                let start = now.saturating_sub(config.window.duration());
                let usage = self.caller_usage(caller, start);
                if let Some(denied) = deny_if_exhausted(config, &usage, now, LimitScope::Global) {
                    debug!(%caller, method, count = usage.count, "global rate limit reached");
                    return denied;
                }
            }
        }

        RateLimitResult::Allowed
    }

    /// Records one admitted call and prunes history when the cleanup
    /// interval has elapsed.
    pub fn record(&mut self, caller: &CallerId, method: &str) {
        let now = self.clock.now();
        let entries = self
            .history
            .entry(caller.clone())
            .or_default()
            .entry(method.to_string())
            .or_default();
        match entries.last_mut() {
            Some(last) if last.timestamp == now => last.count = last.count.saturating_add(1),
            _ => entries.push(CallEntry {
                timestamp: now,
                count: 1,
            }),
        }

        if now.duration_since(self.last_cleanup) >= self.cleanup_interval {
            self.cleanup();
        }
    }

    /// Drops entries older than the largest configured window. Returns the
    /// number of entries removed.
    pub fn cleanup(&mut self) -> usize {
        let now = self.clock.now();
        let cutoff = now.saturating_sub(self.horizon());
        let mut removed = 0usize;

        self.history.retain(|_, methods| {
            methods.retain(|_, entries| {
                let before = entries.len();
                entries.retain(|entry| entry.timestamp >= cutoff);
                removed += before - entries.len();
                !entries.is_empty()
            });
            !methods.is_empty()
        });
        self.last_cleanup = now;

        if removed > 0 {
            info!(removed, callers = self.history.len(), "rate limiter history pruned");
        }
        removed
    }

    /// Calls to `method` by `caller` inside the method's window, or inside
    /// the global window when the method has no limit of its own.
    pub fn usage(&self, caller: &CallerId, method: &str) -> u64 {
        let window = self
            .methods
            .get(method)
            .or(self.global.as_ref())
            .map(|config| config.window.duration())
            .unwrap_or_else(|| self.horizon());
        let start = self.clock.now().saturating_sub(window);
        self.method_usage(caller, method, start).count
    }

    pub fn reset(&mut self, caller: &CallerId) {
        self.history.remove(caller);
    }

    pub fn tracked_callers(&self) -> usize {
        self.history.len()
    }

    pub fn tracked_entries(&self) -> usize {
        self.history
            .values()
            .flat_map(|methods| methods.values())
            .map(Vec::len)
            .sum()
    }

    fn horizon(&self) -> Duration {
        self.methods
            .values()
            .chain(self.global.iter())
            .map(|config| config.window.duration())
            .max()
            .unwrap_or(FALLBACK_HORIZON)
    }

    fn method_usage(&self, caller: &CallerId, method: &str, start: Timestamp) -> WindowUsage {
        let entries = self
            .history
            .get(caller)
            .and_then(|methods| methods.get(method))
            .map(Vec::as_slice)
            .unwrap_or_default();
        usage_since(entries.iter(), start)
    }

    fn caller_usage(&self, caller: &CallerId, start: Timestamp) -> WindowUsage {
        let Some(methods) = self.history.get(caller) else {
            return WindowUsage {
                count: 0,
                oldest: None,
            };
        };
        usage_since(methods.values().flatten(), start)
    }
}

fn usage_since<'a>(entries: impl Iterator<Item = &'a CallEntry>, start: Timestamp) -> WindowUsage {
    let mut usage = WindowUsage {
        count: 0,
        oldest: None,
    };
    for entry in entries.filter(|entry| entry.timestamp >= start) {
        usage.count += u64::from(entry.count);
        usage.oldest = Some(match usage.oldest {
            Some(oldest) => oldest.min(entry.timestamp),
            None => entry.timestamp,
        });
    }
    usage
}

fn deny_if_exhausted(
    config: &RateLimitConfig,
    usage: &WindowUsage,
    now: Timestamp,
    scope: LimitScope,
) -> Option<RateLimitResult> {
    if usage.count < u64::from(config.max_requests) {
        return None;
    }
    let window = config.window.duration();
    // The window start is inclusive, so the oldest entry leaves one tick
    // after `oldest + window`.
    let retry_after = match usage.oldest {
        Some(oldest) => {
            oldest.saturating_add(window).duration_since(now) + Duration::from_nanos(1)
        }
        None => window,
    };
    Some(RateLimitResult::Denied {
        scope,
        limit: config.max_requests,
        window: config.window,
        retry_after,
    })
}
