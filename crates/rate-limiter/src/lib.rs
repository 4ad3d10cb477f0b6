pub mod config;
pub mod limiter;
pub mod model;

pub use config::{RateLimitConfig, RateLimiterSettings, TimeWindow};
pub use limiter::RateLimiter;
pub use model::{CallEntry, LimitScope, RateLimitResult};

#[cfg(test)]
mod tests;
