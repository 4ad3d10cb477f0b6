use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use callguard_core_types::{duration_str, CallerId};
use serde::{Deserialize, Serialize};

const DEFAULT_CLEANUP_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Length of a sliding window. Serialized as `{ minutes: 1 }`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeWindow {
    Seconds(u64),
    Minutes(u64),
    Hours(u64),
    Days(u64),
}

impl TimeWindow {
    pub fn duration(&self) -> Duration {
        match *self {
            TimeWindow::Seconds(n) => Duration::from_secs(n),
            TimeWindow::Minutes(n) => Duration::from_secs(n.saturating_mul(60)),
            TimeWindow::Hours(n) => Duration::from_secs(n.saturating_mul(3_600)),
            TimeWindow::Days(n) => Duration::from_secs(n.saturating_mul(86_400)),
        }
    }
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (n, unit) = match *self {
            TimeWindow::Seconds(n) => (n, "second"),
            TimeWindow::Minutes(n) => (n, "minute"),
            TimeWindow::Hours(n) => (n, "hour"),
            TimeWindow::Days(n) => (n, "day"),
        };
        if n == 1 {
            write!(f, "1 {unit}")
        } else {
            write!(f, "{n} {unit}s")
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub max_requests: u32,
    pub window: TimeWindow,
    #[serde(default)]
    pub exempt_roles: Vec<String>,
    #[serde(default)]
    pub exempt_callers: Vec<CallerId>,
}

impl RateLimitConfig {
    pub fn new(max_requests: u32, window: TimeWindow) -> Self {
        Self {
            max_requests,
            window,
            exempt_roles: Vec::new(),
            exempt_callers: Vec::new(),
        }
    }

    pub fn exempt_role(mut self, role: impl Into<String>) -> Self {
        self.exempt_roles.push(role.into());
        self
    }

    pub fn exempt_caller(mut self, caller: CallerId) -> Self {
        self.exempt_callers.push(caller);
        self
    }

    pub fn is_exempt(&self, caller: &CallerId, roles: &[String]) -> bool {
        self.exempt_callers.contains(caller)
            || roles.iter().any(|role| self.exempt_roles.contains(role))
    }
}

/// Limiter section of a policy document.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimiterSettings {
    #[serde(default)]
    pub global: Option<RateLimitConfig>,
    #[serde(default)]
    pub methods: BTreeMap<String, RateLimitConfig>,
    #[serde(default = "default_cleanup_interval", with = "duration_str")]
    pub cleanup_interval: Duration,
}

fn default_cleanup_interval() -> Duration {
    DEFAULT_CLEANUP_INTERVAL
}

impl Default for RateLimiterSettings {
    fn default() -> Self {
        Self {
            global: None,
            methods: BTreeMap::new(),
            cleanup_interval: DEFAULT_CLEANUP_INTERVAL,
        }
    }
}
