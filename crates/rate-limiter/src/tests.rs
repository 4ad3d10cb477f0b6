use std::sync::Arc;
use std::time::Duration;

use callguard_core_types::{CallerId, ManualClock, Timestamp};

use crate::*;

const START: Timestamp = Timestamp(1_700_000_000_000_000_000);

fn limiter_with(method: &str, config: RateLimitConfig) -> (RateLimiter, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(START));
    let mut limiter = RateLimiter::new(clock.clone());
    limiter.set_method_limit(method, config);
    (limiter, clock)
}

/// check-then-record, the way the engine admits calls.
fn admit(limiter: &mut RateLimiter, caller: &CallerId, roles: &[String], method: &str) -> RateLimitResult {
    let result = limiter.check(caller, roles, method);
    if result.is_allowed() {
        limiter.record(caller, method);
    }
    result
}

#[test]
fn fourth_call_in_window_is_denied_until_window_passes() {
    let (mut limiter, clock) =
        limiter_with("transfer", RateLimitConfig::new(3, TimeWindow::Minutes(1)));
    let alice = CallerId::external("alice");

    for _ in 0..3 {
        assert!(admit(&mut limiter, &alice, &[], "transfer").is_allowed());
        clock.advance(Duration::from_secs(1));
    }

    match limiter.check(&alice, &[], "transfer") {
        RateLimitResult::Denied {
            limit,
            window,
            retry_after,
            scope,
        } => {
            assert_eq!(limit, 3);
            assert_eq!(window, TimeWindow::Minutes(1));
            assert_eq!(scope, LimitScope::Method);
            assert!(retry_after > Duration::ZERO);
            assert!(retry_after <= Duration::from_secs(57) + Duration::from_nanos(1));
        }
        RateLimitResult::Allowed => panic!("fourth call should be denied"),
    }

    clock.advance(Duration::from_secs(61));
    assert!(limiter.check(&alice, &[], "transfer").is_allowed());
}

#[test]
fn retry_after_points_at_oldest_entry_leaving_window() {
    let (mut limiter, clock) =
        limiter_with("transfer", RateLimitConfig::new(1, TimeWindow::Seconds(10)));
    let bob = CallerId::external("bob");
    limiter.record(&bob, "transfer");
    clock.advance(Duration::from_secs(4));

    let RateLimitResult::Denied { retry_after, .. } = limiter.check(&bob, &[], "transfer") else {
        panic!("expected denial");
    };
    assert_eq!(retry_after, Duration::from_secs(6) + Duration::from_nanos(1));

    clock.advance(retry_after);
    assert!(limiter.check(&bob, &[], "transfer").is_allowed());
}

#[test]
fn denied_checks_are_not_counted() {
    let (mut limiter, clock) =
        limiter_with("post", RateLimitConfig::new(2, TimeWindow::Minutes(1)));
    let carol = CallerId::external("carol");

    let denials = (0..5)
        .filter(|_| !admit(&mut limiter, &carol, &[], "post").is_allowed())
        .count();
    assert_eq!(denials, 3);
    assert_eq!(limiter.usage(&carol, "post"), 2);

    clock.advance(Duration::from_secs(61));
    assert_eq!(limiter.usage(&carol, "post"), 0);
}

#[test]
fn exempt_roles_and_callers_bypass_limits() {
    let config = RateLimitConfig::new(2, TimeWindow::Minutes(1))
        .exempt_role("admin")
        .exempt_caller(CallerId::local("indexer"));
    let (mut limiter, _clock) = limiter_with("send", config);
    let admin_roles = vec!["admin".to_string()];

    let root = CallerId::external("root");
    for _ in 0..5 {
        assert!(admit(&mut limiter, &root, &admin_roles, "send").is_allowed());
    }
    let indexer = CallerId::local("indexer");
    for _ in 0..5 {
        assert!(admit(&mut limiter, &indexer, &[], "send").is_allowed());
    }

    let user = CallerId::external("user");
    let verdicts: Vec<bool> = (0..3)
        .map(|_| admit(&mut limiter, &user, &[], "send").is_allowed())
        .collect();
    assert_eq!(verdicts, vec![true, true, false]);
}

#[test]
fn method_limit_is_checked_before_global_limit() {
    let (mut limiter, _clock) =
        limiter_with("search", RateLimitConfig::new(1, TimeWindow::Minutes(1)));
    limiter.set_global_limit(Some(RateLimitConfig::new(1, TimeWindow::Hours(1))));
    let dave = CallerId::external("dave");
    limiter.record(&dave, "search");

    let RateLimitResult::Denied { scope, .. } = limiter.check(&dave, &[], "search") else {
        panic!("expected denial");
    };
    assert_eq!(scope, LimitScope::Method);

    // Global limit spans methods.
    let RateLimitResult::Denied { scope, window, .. } = limiter.check(&dave, &[], "browse") else {
        panic!("expected global denial");
    };
    assert_eq!(scope, LimitScope::Global);
    assert_eq!(window, TimeWindow::Hours(1));

    assert!(limiter
        .check(&CallerId::external("erin"), &[], "browse")
        .is_allowed());
}

#[test]
fn calls_at_the_same_instant_coalesce() {
    let (mut limiter, _clock) =
        limiter_with("ping", RateLimitConfig::new(10, TimeWindow::Seconds(1)));
    let frank = CallerId::external("frank");
    for _ in 0..4 {
        limiter.record(&frank, "ping");
    }
    assert_eq!(limiter.tracked_entries(), 1);
    assert_eq!(limiter.usage(&frank, "ping"), 4);
}

#[test]
fn cleanup_drops_entries_beyond_largest_window() {
    let (mut limiter, clock) =
        limiter_with("short", RateLimitConfig::new(5, TimeWindow::Seconds(10)));
    limiter.set_method_limit("long", RateLimitConfig::new(5, TimeWindow::Minutes(1)));
    let gina = CallerId::external("gina");

    limiter.record(&gina, "short");
    limiter.record(&gina, "long");
    clock.advance(Duration::from_secs(30));
    assert_eq!(limiter.cleanup(), 0);

    clock.advance(Duration::from_secs(31));
    assert_eq!(limiter.cleanup(), 2);
    assert_eq!(limiter.tracked_callers(), 0);
}

#[test]
fn record_triggers_cleanup_after_interval() {
    let clock = Arc::new(ManualClock::new(START));
    let settings = RateLimiterSettings {
        cleanup_interval: Duration::from_secs(60),
        ..RateLimiterSettings::default()
    };
    let mut limiter = RateLimiter::with_settings(settings, clock.clone());
    limiter.set_method_limit("a", RateLimitConfig::new(5, TimeWindow::Seconds(5)));
    let hank = CallerId::external("hank");

    limiter.record(&hank, "a");
    clock.advance(Duration::from_secs(61));
    limiter.record(&CallerId::external("ivy"), "a");

    assert_eq!(limiter.tracked_callers(), 1);
    assert_eq!(limiter.usage(&hank, "a"), 0);
}

#[test]
fn settings_deserialize_from_yaml() {
    let settings: RateLimiterSettings = serde_yaml::from_str(
        r#"
cleanup_interval: 2m
global:
  max_requests: 100
  window: { hours: 1 }
methods:
  send_message:
    max_requests: 2
    window: { minutes: 1 }
    exempt_roles: [admin]
    exempt_callers: ["local:indexer"]
"#,
    )
    .unwrap();
    assert_eq!(settings.cleanup_interval, Duration::from_secs(120));
    let send = &settings.methods["send_message"];
    assert_eq!(send.window, TimeWindow::Minutes(1));
    assert_eq!(send.exempt_callers, vec![CallerId::local("indexer")]);
    assert_eq!(settings.global.unwrap().window.duration(), Duration::from_secs(3_600));
}

#[test]
fn denial_display_is_human_readable() {
    let denied = RateLimitResult::Denied {
        scope: LimitScope::Method,
        limit: 2,
        window: TimeWindow::Minutes(1),
        retry_after: Duration::from_millis(44_100),
    };
    assert_eq!(
        denied.to_string(),
        "method limit of 2 per 1 minute exceeded, retry after 45s"
    );
}

#[test]
fn full_window_denial_reports_window_length() {
    let (mut limiter, _clock) =
        limiter_with("post", RateLimitConfig::new(1, TimeWindow::Minutes(1)));
    let jo = CallerId::external("jo");

    assert!(admit(&mut limiter, &jo, &[], "post").is_allowed());
    let denied = limiter.check(&jo, &[], "post");
    assert_eq!(
        denied.to_string(),
        "method limit of 1 per 1 minute exceeded, retry after 60s"
    );
}

#[test]
fn removed_method_limit_stops_limiting() {
    let (mut limiter, _clock) =
        limiter_with("post", RateLimitConfig::new(1, TimeWindow::Minutes(1)));
    let kim = CallerId::external("kim");

    assert!(admit(&mut limiter, &kim, &[], "post").is_allowed());
    assert!(!limiter.check(&kim, &[], "post").is_allowed());

    let removed = limiter.remove_method_limit("post").unwrap();
    assert_eq!(removed.max_requests, 1);
    assert!(limiter.method_limit("post").is_none());
    assert!(limiter.check(&kim, &[], "post").is_allowed());
    assert!(limiter.remove_method_limit("post").is_none());
}
