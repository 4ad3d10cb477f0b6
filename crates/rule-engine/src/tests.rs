use std::collections::BTreeMap;
use std::env;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};
use std::time::Duration;

use callguard_core_types::{CallContext, CallerId, ManualClock, Timestamp};
use callguard_rate_limiter::{RateLimitConfig, TimeWindow};
use callguard_session::{PermissionResult, RoleDefinition, SessionSettings};
use callguard_structural::{Property, StructuralRule, TaggedValue};

use crate::*;

const START: Timestamp = Timestamp(1_700_000_000_000_000_000);

#[derive(Clone, Debug)]
enum Call {
    SendMessage { text: String },
    Transfer { amount: u128, memo: Vec<u8> },
    UpdateProfile { profile: TaggedValue },
}

struct Message<'a> {
    text: &'a str,
}

fn engine() -> (Engine<Call>, Arc<ManualClock>) {
    engine_with(EngineConfig::default())
}

fn engine_with(config: EngineConfig) -> (Engine<Call>, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(START));
    (Engine::with_config(config, clock.clone()), clock)
}

fn message_text(call: &Call) -> Option<String> {
    match call {
        Call::SendMessage { text } => Some(text.clone()),
        _ => None,
    }
}

fn send(caller: &CallerId, text: &str) -> CallContext<Call> {
    CallContext::new(
        "send_message",
        caller.clone(),
        Call::SendMessage {
            text: text.to_string(),
        },
    )
}

fn login(engine: &Engine<Call>, caller: &CallerId, roles: &[&str]) {
    engine
        .create_session(
            caller.clone(),
            roles.iter().map(|r| r.to_string()).collect(),
            BTreeMap::new(),
            None,
        )
        .unwrap();
}

#[test]
fn failing_rule_stops_evaluation_before_later_predicates() {
    let (mut engine, _clock) = engine();
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    engine.register_guard(
        "send_message",
        false,
        vec![
            ValidationRule::RequireAuth,
            ValidationRule::custom(move |_: &RuleCall<'_, String>| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }),
        ],
        message_text,
    );

    let err = engine
        .evaluate(&send(&CallerId::Anonymous, "hi"))
        .unwrap_err();
    assert!(err.starts_with("requireAuth:"), "{err}");
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    engine
        .evaluate(&send(&CallerId::external("alice"), "hi"))
        .unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn send_message_scenario() {
    let (mut engine, _clock) = engine();
    engine.register_guard(
        "send_message",
        false,
        vec![
            ValidationRule::RequireAuth,
            ValidationRule::text_size(|text: &String| text.as_str(), 1, 100),
        ],
        message_text,
    );
    let alice = CallerId::external("alice");

    let anonymous = engine.evaluate(&send(&CallerId::Anonymous, "hello"));
    assert!(anonymous.unwrap_err().contains("authenticated"));

    let long = engine.evaluate(&send(&alice, &"x".repeat(101)));
    assert_eq!(long.unwrap_err(), "textSize: max 100 violated, got 101");

    assert!(engine.evaluate(&send(&alice, &"x".repeat(50))).is_ok());
    assert!(engine.evaluate(&send(&alice, &"x".repeat(100))).is_ok());
    assert_eq!(
        engine.evaluate(&send(&alice, "")).unwrap_err(),
        "textSize: min 1 violated, got 0"
    );
}

#[test]
fn text_size_counts_characters_not_bytes() {
    let (mut engine, _clock) = engine();
    engine.register_guard(
        "send_message",
        false,
        vec![ValidationRule::text_size(|m: &Message<'static>| m.text, 1, 3)],
        |call: &Call| match call {
            Call::SendMessage { text } if text == "héé" => Some(Message { text: "héé" }),
            _ => None,
        },
    );
    let bob = CallerId::external("bob");
    assert!(engine.evaluate(&send(&bob, "héé")).is_ok());
}

#[test]
fn accessor_runs_lazily_and_at_most_once() {
    let (mut engine, _clock) = engine();
    let invocations = Arc::new(AtomicUsize::new(0));
    let seen = invocations.clone();
    engine.register_guard(
        "send_message",
        false,
        vec![
            ValidationRule::BlockedCallers(vec![CallerId::external("mallory")]),
            ValidationRule::text_size(|text: &String| text.as_str(), 1, 10),
            ValidationRule::text_size(|text: &String| text.as_str(), 2, 10),
        ],
        move |call: &Call| {
            seen.fetch_add(1, Ordering::SeqCst);
            message_text(call)
        },
    );

    let blocked = engine.evaluate(&send(&CallerId::external("mallory"), "hey"));
    assert_eq!(blocked.unwrap_err(), "blockedCallers: mallory is blocked");
    assert_eq!(invocations.load(Ordering::SeqCst), 0);

    engine
        .evaluate(&send(&CallerId::external("carol"), "hey"))
        .unwrap();
    assert_eq!(invocations.load(Ordering::SeqCst), 1);
}

#[test]
fn mismatched_variant_is_an_accessor_rejection() {
    let (mut engine, _clock) = engine();
    engine.register_guard(
        "send_message",
        false,
        vec![ValidationRule::text_size(|text: &String| text.as_str(), 1, 10)],
        message_text,
    );
    let call = CallContext::new(
        "send_message",
        CallerId::external("dan"),
        Call::Transfer {
            amount: 1,
            memo: vec![],
        },
    );
    let rejection = engine.evaluate_detailed(&call).unwrap_err();
    assert_eq!(rejection.kind, RuleKind::Accessor);
}

#[test]
fn numeric_and_blob_bounds_are_inclusive() {
    let (mut engine, _clock) = engine();
    engine.register_guard(
        "transfer",
        false,
        vec![
            ValidationRule::nat_range(|t: &(u128, Vec<u8>)| t.0, 1, 1_000),
            ValidationRule::blob_size(|t: &(u128, Vec<u8>)| t.1.as_slice(), 0, 4),
        ],
        |call: &Call| match call {
            Call::Transfer { amount, memo } => Some((*amount, memo.clone())),
            _ => None,
        },
    );
    let erin = CallerId::external("erin");
    let transfer = |amount: u128, memo: &[u8]| {
        CallContext::new(
            "transfer",
            erin.clone(),
            Call::Transfer {
                amount,
                memo: memo.to_vec(),
            },
        )
    };

    assert!(engine.evaluate(&transfer(1, b"")).is_ok());
    assert!(engine.evaluate(&transfer(1_000, b"memo")).is_ok());
    assert_eq!(
        engine.evaluate(&transfer(0, b"")).unwrap_err(),
        "natRange: min 1 violated, got 0"
    );
    assert_eq!(
        engine.evaluate(&transfer(1_001, b"")).unwrap_err(),
        "natRange: max 1000 violated, got 1001"
    );
    assert_eq!(
        engine.evaluate(&transfer(5, b"memos")).unwrap_err(),
        "blobSize: max 4 violated, got 5"
    );
}

#[test]
fn int_range_handles_negative_bounds() {
    let (mut engine, _clock) = engine();
    engine.register_guard(
        "adjust",
        false,
        vec![ValidationRule::int_range(|delta: &i128| *delta, -10, 10)],
        |call: &Call| match call {
            Call::Transfer { amount, .. } => Some(*amount as i128 - 50),
            _ => None,
        },
    );
    let frank = CallerId::external("frank");
    let adjust = |amount: u128| {
        CallContext::new("adjust", frank.clone(), Call::Transfer { amount, memo: vec![] })
    };
    assert!(engine.evaluate(&adjust(40)).is_ok());
    assert_eq!(
        engine.evaluate(&adjust(39)).unwrap_err(),
        "intRange: min -10 violated, got -11"
    );
}

#[test]
fn rate_limit_exempts_admins_and_counts_only_admitted_calls() {
    let (mut engine, _clock) = engine();
    let limit = RateLimitConfig::new(2, TimeWindow::Minutes(1)).exempt_role("admin");
    engine.register_guard(
        "send_message",
        false,
        vec![
            ValidationRule::RequireAuth,
            ValidationRule::rate_limit(limit),
            ValidationRule::text_size(|text: &String| text.as_str(), 1, 5),
        ],
        message_text,
    );
    engine.define_role(RoleDefinition::new("admin", ["chat.moderate"]));

    let root = CallerId::external("root");
    login(&engine, &root, &["admin"]);
    for _ in 0..5 {
        assert!(engine.evaluate(&send(&root, "hi")).is_ok());
    }

    let user = CallerId::external("user");
    // Rejected by a later rule: must not consume quota.
    assert!(engine.evaluate(&send(&user, "too long")).is_err());
    assert!(engine.evaluate(&send(&user, "one")).is_ok());
    assert!(engine.evaluate(&send(&user, "two")).is_ok());
    let third = engine.evaluate_detailed(&send(&user, "three")).unwrap_err();
    assert_eq!(third.kind, RuleKind::RateLimit);
    assert_eq!(engine.rate_usage(&user, "send_message"), 2);
}

#[test]
fn rate_limit_window_reopens_after_it_passes() {
    let (mut engine, clock) = engine();
    engine.register_guard(
        "send_message",
        false,
        vec![ValidationRule::RateLimit(None)],
        message_text,
    );
    engine.set_rate_limit("send_message", RateLimitConfig::new(3, TimeWindow::Minutes(1)));
    let gus = CallerId::external("gus");

    for _ in 0..3 {
        assert!(engine.evaluate(&send(&gus, "hi")).is_ok());
    }
    let denied = engine.evaluate(&send(&gus, "hi")).unwrap_err();
    assert!(denied.starts_with("rateLimit: method limit of 3 per 1 minute exceeded"));

    clock.advance(Duration::from_secs(61));
    assert!(engine.evaluate(&send(&gus, "hi")).is_ok());
}

#[test]
fn call_checked_at_boundary_and_runtime_counts_once() {
    let (mut engine, _clock) = engine();
    let limit = RateLimitConfig::new(2, TimeWindow::Minutes(1));
    engine.register_inspect(
        "send_message",
        false,
        vec![ValidationRule::<()>::rate_limit(limit.clone())],
        |_: &Call| Some(()),
    );
    engine.register_guard(
        "send_message",
        false,
        vec![ValidationRule::<()>::rate_limit(limit)],
        |_: &Call| Some(()),
    );
    let ona = CallerId::external("ona");

    for count in 1..=2 {
        assert!(engine.evaluate(&send(&ona, "hi").boundary()).is_ok());
        assert!(engine.evaluate(&send(&ona, "hi")).is_ok());
        assert_eq!(engine.rate_usage(&ona, "send_message"), count);
    }
    assert_eq!(
        engine.evaluate(&send(&ona, "hi").boundary()).unwrap_err(),
        "rateLimit: method limit of 2 per 1 minute exceeded, retry after 60s"
    );
    assert!(engine.evaluate(&send(&ona, "hi")).is_err());
    assert_eq!(engine.rate_usage(&ona, "send_message"), 2);
}

#[test]
fn boundary_only_limit_records_admissions() {
    let (mut engine, _clock) = engine();
    engine.register_inspect(
        "send_message",
        false,
        vec![ValidationRule::<()>::rate_limit(RateLimitConfig::new(1, TimeWindow::Minutes(1)))],
        |_: &Call| Some(()),
    );
    engine.register_guard("send_message", false, vec![ValidationRule::<()>::RequireAuth], |_: &Call| Some(()));
    let pia = CallerId::external("pia");

    assert!(engine.evaluate(&send(&pia, "hi").boundary()).is_ok());
    assert_eq!(engine.rate_usage(&pia, "send_message"), 1);
    assert!(engine.evaluate(&send(&pia, "hi").boundary()).is_err());
}

#[test]
fn guard_limit_wins_over_conflicting_inspect_limit() {
    let (mut engine, _clock) = engine();
    engine.register_guard(
        "send_message",
        false,
        vec![ValidationRule::<()>::rate_limit(RateLimitConfig::new(3, TimeWindow::Minutes(1)))],
        |_: &Call| Some(()),
    );
    engine.register_inspect(
        "send_message",
        false,
        vec![ValidationRule::<()>::rate_limit(RateLimitConfig::new(1, TimeWindow::Minutes(1)))],
        |_: &Call| Some(()),
    );
    let active = engine.method_rate_limit("send_message");
    assert_eq!(active.map(|config| config.max_requests), Some(3));

    let raj = CallerId::external("raj");
    for _ in 0..3 {
        assert!(engine.evaluate(&send(&raj, "hi").boundary()).is_ok());
        assert!(engine.evaluate(&send(&raj, "hi")).is_ok());
    }
    assert!(engine.evaluate(&send(&raj, "hi").boundary()).is_err());

    // Once the guard is gone the inspect declaration takes over.
    assert!(engine.unregister(Phase::Guard, "send_message"));
    assert_eq!(engine.method_rate_limit("send_message").map(|c| c.max_requests), Some(1));
}

#[test]
fn unregister_drops_declared_limit_but_keeps_configured_one() {
    let (mut engine, _clock) = engine();
    engine.register_guard(
        "send_message",
        false,
        vec![ValidationRule::<()>::rate_limit(RateLimitConfig::new(1, TimeWindow::Minutes(1)))],
        |_: &Call| Some(()),
    );
    engine.set_rate_limit("transfer", RateLimitConfig::new(1, TimeWindow::Minutes(1)));
    engine.register_guard("transfer", false, vec![ValidationRule::<()>::RateLimit(None)], |_: &Call| Some(()));

    assert!(engine.unregister(Phase::Guard, "send_message"));
    assert!(engine.unregister(Phase::Guard, "transfer"));
    assert!(!engine.unregister(Phase::Guard, "transfer"));
    assert!(engine.method_rate_limit("send_message").is_none());
    assert!(engine.method_rate_limit("transfer").is_some());
}

#[test]
fn permission_rule_sees_role_changes_only_after_cache_ttl() {
    let config = EngineConfig {
        sessions: SessionSettings {
            cache_ttl: Duration::from_secs(30),
            ..SessionSettings::default()
        },
        ..EngineConfig::default()
    };
    let (mut engine, clock) = engine_with(config);
    engine.register_guard(
        "delete_post",
        false,
        vec![ValidationRule::<()>::require_permission("posts.delete")],
        |_: &Call| Some(()),
    );
    engine.define_role(RoleDefinition::new("editor", ["posts.write"]));
    let hana = CallerId::external("hana");
    login(&engine, &hana, &["editor"]);
    let delete = CallContext::new("delete_post", hana.clone(), Call::SendMessage { text: String::new() });

    assert!(engine.evaluate(&delete).is_err());
    engine.define_role(RoleDefinition::new("editor", ["posts.write", "posts.delete"]));
    assert!(engine.evaluate(&delete).is_err());

    clock.advance(Duration::from_secs(30));
    assert!(engine.evaluate(&delete).is_ok());
}

#[test]
fn role_and_caller_list_rules() {
    let (mut engine, _clock) = engine();
    engine.define_role(RoleDefinition::new("moderator", ["chat.delete"]).inherit("member"));
    engine.define_role(RoleDefinition::new("member", ["chat.send"]));
    engine.register_guard(
        "pin",
        false,
        vec![
            ValidationRule::<()>::AllowedCallers(vec![
                CallerId::external("ivy"),
                CallerId::external("jon"),
            ]),
            ValidationRule::require_role("member"),
        ],
        |_: &Call| Some(()),
    );
    let ivy = CallerId::external("ivy");
    let jon = CallerId::external("jon");
    login(&engine, &ivy, &["moderator"]);
    let pin = |caller: &CallerId| CallContext::new("pin", caller.clone(), Call::SendMessage { text: String::new() });

    assert!(engine.evaluate(&pin(&ivy)).is_ok());
    assert_eq!(
        engine.evaluate(&pin(&jon)).unwrap_err(),
        "requireRole: jon lacks role 'member'"
    );
    assert_eq!(
        engine.evaluate(&pin(&CallerId::external("kim"))).unwrap_err(),
        "allowedCallers: kim is not on the allow list"
    );
}

#[test]
fn inspect_and_guard_registries_are_separate() {
    let (mut engine, _clock) = engine();
    engine.register_inspect("send_message", false, vec![ValidationRule::<()>::BlockIngress], |_: &Call| Some(()));
    engine.register_guard("send_message", false, vec![ValidationRule::<()>::RequireAuth], |_: &Call| Some(()));

    let external = CallerId::external("lee");
    let boundary = send(&external, "hi").boundary();
    assert_eq!(
        engine.evaluate_detailed(&boundary).unwrap_err().kind,
        RuleKind::BlockIngress
    );
    assert!(engine.evaluate(&send(&external, "hi")).is_ok());
    assert!(engine.evaluate(&send(&CallerId::local("relay"), "hi").boundary()).is_ok());

    assert_eq!(engine.registered_methods(Phase::Inspect), vec!["send_message"]);
    let handle = engine.handle(Phase::Guard, "send_message").unwrap();
    assert_eq!(handle.rules, vec![RuleKind::RequireAuth]);
    assert!(engine.unregister(Phase::Inspect, "send_message"));
    assert!(engine.evaluate(&boundary).is_ok());
}

#[test]
fn unknown_methods_follow_configured_policy() {
    let (engine, _clock) = engine();
    let call = send(&CallerId::external("max"), "hi");
    assert!(engine.evaluate(&call).is_ok());

    let (strict, _clock) = engine_with(EngineConfig {
        unknown_method: UnknownMethodPolicy::Reject,
        ..EngineConfig::default()
    });
    assert_eq!(
        strict.evaluate(&call).unwrap_err(),
        "unknownMethod: no validator registered for send_message"
    );
}

#[test]
fn block_all_rejects_everyone() {
    let (mut engine, _clock) = engine();
    engine.register_guard("shutdown", false, vec![ValidationRule::<()>::BlockAll], |_: &Call| Some(()));
    let call = CallContext::new("shutdown", CallerId::local("ops"), Call::SendMessage { text: String::new() });
    assert_eq!(engine.evaluate(&call).unwrap_err(), "blockAll: method shutdown is blocked");
}

#[test]
fn require_session_for_auth_needs_live_session() {
    let (mut engine, clock) = engine_with(EngineConfig {
        require_session_for_auth: true,
        ..EngineConfig::default()
    });
    engine.register_guard("send_message", false, vec![ValidationRule::<()>::RequireAuth], |_: &Call| Some(()));
    let nia = CallerId::external("nia");

    assert!(engine.evaluate(&send(&nia, "hi")).is_err());
    engine
        .create_session(nia.clone(), vec![], BTreeMap::new(), Some(Duration::from_secs(10)))
        .unwrap();
    assert!(engine.evaluate(&send(&nia, "hi")).is_ok());

    clock.advance(Duration::from_secs(10));
    assert!(engine.evaluate(&send(&nia, "hi")).is_err());
    assert!(engine.revoke_session(&nia));
}

#[test]
fn dynamic_auth_reads_session_state() {
    let (mut engine, _clock) = engine();
    engine.define_role(RoleDefinition::new("owner", ["docs.share"]));
    engine.register_guard(
        "share",
        false,
        vec![ValidationRule::dynamic_auth(
            |call: &RuleCall<'_, String>, auth: &AuthView<'_>| {
                if call.args.starts_with("public/") {
                    return Ok(());
                }
                match auth.has_permission(call.caller(), "docs.share") {
                    PermissionResult::Granted => Ok(()),
                    other => Err(format!("cannot share {}: {other}", call.args)),
                }
            },
        )],
        message_text,
    );
    let ola = CallerId::external("ola");
    let share = |text: &str| {
        CallContext::new("share", ola.clone(), Call::SendMessage { text: text.to_string() })
    };

    assert!(engine.evaluate(&share("public/readme")).is_ok());
    assert!(engine
        .evaluate(&share("private/plan"))
        .unwrap_err()
        .starts_with("dynamicAuth: cannot share private/plan"));
    login(&engine, &ola, &["owner"]);
    assert!(engine.evaluate(&share("private/plan")).is_ok());
}

#[test]
fn custom_predicates_see_call_metadata() {
    let (mut engine, _clock) = engine();
    engine.register_guard(
        "send_message",
        true,
        vec![ValidationRule::custom(|call: &RuleCall<'_, String>| {
            match call.call.resource_budget {
                Some(budget) if budget < call.args.len() as u64 => Err("over budget".into()),
                _ => Ok(()),
            }
        })],
        message_text,
    );
    let pat = CallerId::external("pat");
    assert_eq!(
        engine
            .evaluate(&send(&pat, "hello").with_resource_budget(3))
            .unwrap_err(),
        "customCheck: over budget"
    );
    assert!(engine.evaluate(&send(&pat, "hello").with_resource_budget(8)).is_ok());
    assert!(engine.handle(Phase::Guard, "send_message").unwrap().is_read_only);
}

#[test]
fn structural_rules_report_path_and_rule_kind() {
    let (mut engine, _clock) = engine();
    engine.register_guard(
        "update_profile",
        false,
        vec![ValidationRule::structural(
            |profile: &TaggedValue| profile.clone(),
            vec![
                StructuralRule::Size {
                    min: Some(1),
                    max: Some(10),
                },
                StructuralRule::PropertyExists("name".into()),
                StructuralRule::nested(
                    "name",
                    vec![StructuralRule::Size {
                        min: Some(1),
                        max: Some(3),
                    }],
                ),
            ],
        )],
        |call: &Call| match call {
            Call::UpdateProfile { profile } => Some(profile.clone()),
            _ => None,
        },
    );
    let quinn = CallerId::external("quinn");
    let update = |properties: Vec<Property>| {
        CallContext::new(
            "update_profile",
            quinn.clone(),
            Call::UpdateProfile {
                profile: TaggedValue::class(properties),
            },
        )
    };

    assert!(engine
        .evaluate(&update(vec![Property::new("name", TaggedValue::text("Al"))]))
        .is_ok());
    assert!(engine
        .evaluate(&update(vec![]))
        .unwrap_err()
        .starts_with("valueSize: args:"));
    assert_eq!(
        engine
            .evaluate(&update(vec![Property::new("bio", TaggedValue::text("x"))]))
            .unwrap_err(),
        "propertyExists: args: missing property 'name'"
    );
    assert!(engine
        .evaluate(&update(vec![Property::new("name", TaggedValue::text("Alice"))]))
        .unwrap_err()
        .starts_with("valueNested: args.name:"));
}

#[test]
fn handle_names_structural_rule_lists_as_a_whole() {
    let (mut engine, _clock) = engine();
    let profile = |call: &Call| match call {
        Call::UpdateProfile { profile } => Some(profile.clone()),
        _ => None,
    };
    let handle = engine.register_guard(
        "update_profile",
        false,
        vec![
            ValidationRule::RequireAuth,
            ValidationRule::structural(
                |profile: &TaggedValue| profile.clone(),
                vec![StructuralRule::PropertyExists("name".into())],
            ),
        ],
        profile,
    );
    assert_eq!(
        handle.rules,
        vec![RuleKind::RequireAuth, RuleKind::Structural("structural")]
    );

    let empty = engine.register_inspect(
        "update_profile",
        false,
        vec![ValidationRule::structural(|profile: &TaggedValue| profile.clone(), Vec::new())],
        profile,
    );
    assert_eq!(empty.rules[0].to_string(), "structural");
}

#[test]
fn removing_a_role_revokes_what_it_granted() {
    let (mut engine, _clock) = engine();
    engine.define_role(RoleDefinition::new("editor", ["posts.write"]));
    engine.register_guard(
        "edit_post",
        false,
        vec![ValidationRule::<()>::require_permission("posts.write")],
        |_: &Call| Some(()),
    );
    let sam = CallerId::external("sam");
    login(&engine, &sam, &["editor"]);
    let edit = CallContext::new("edit_post", sam.clone(), Call::SendMessage { text: String::new() });
    assert!(engine.evaluate(&edit).is_ok());

    assert!(engine.remove_role("editor").is_some());
    assert!(engine.remove_role("editor").is_none());
    assert!(engine.evaluate(&edit).is_err());

    // A new session caches the role-less resolution.
    login(&engine, &sam, &["editor"]);
    engine.define_role(RoleDefinition::new("editor", ["posts.write"]));
    assert!(engine.evaluate(&edit).is_err());
    engine.invalidate_permissions();
    assert!(engine.evaluate(&edit).is_ok());
}

#[test]
fn size_only_reports_raw_length_without_rules() {
    let (mut engine, _clock) = engine();
    engine.register_inspect("send_message", false, vec![ValidationRule::<()>::BlockAll], |_: &Call| Some(()));
    let call = send(&CallerId::external("rue"), "hi")
        .boundary()
        .with_arg_bytes(vec![0u8; 42]);
    assert_eq!(engine.size_only(&call), 42);
}

#[test]
fn maintenance_prunes_limiter_and_sessions() {
    let (mut engine, clock) = engine();
    engine.register_guard(
        "send_message",
        false,
        vec![ValidationRule::<()>::rate_limit(RateLimitConfig::new(10, TimeWindow::Seconds(5)))],
        |_: &Call| Some(()),
    );
    let sam = CallerId::external("sam");
    engine
        .create_session(sam.clone(), vec![], BTreeMap::new(), Some(Duration::from_secs(5)))
        .unwrap();
    engine.evaluate(&send(&sam, "hi")).unwrap();

    clock.advance(Duration::from_secs(6));
    let report = engine.maintenance();
    assert_eq!(
        report,
        MaintenanceReport {
            rate_entries_pruned: 1,
            expired_sessions: 1,
            stale_cache_entries: 1,
        }
    );
}

fn env_guard() -> MutexGuard<'static, ()> {
    static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    LOCK.get_or_init(|| Mutex::new(()))
        .lock()
        .unwrap_or_else(|poison| poison.into_inner())
}

#[test]
fn load_config_reads_yaml_file() {
    let _guard = env_guard();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("callguard.yaml");
    std::fs::write(
        &path,
        r#"unknown_method: reject
sessions:
  cache_ttl: 45s
  default_ttl: 2h
rate_limits:
  methods:
    send_message:
      max_requests: 2
      window: { minutes: 1 }
      exempt_roles: [admin]
roles:
  - name: admin
    permissions: [chat.moderate]
    inherits: [member]
  - name: member
    permissions: [chat.send]
"#,
    )
    .unwrap();

    let config = load_config(Some(&path)).unwrap();
    assert_eq!(config.unknown_method, UnknownMethodPolicy::Reject);
    assert_eq!(config.sessions.cache_ttl, Duration::from_secs(45));
    assert_eq!(config.sessions.default_ttl, Some(Duration::from_secs(7_200)));
    assert_eq!(config.roles.len(), 2);
    let send = &config.rate_limits.methods["send_message"];
    assert_eq!(send.max_requests, 2);
    assert_eq!(send.exempt_roles, vec!["admin".to_string()]);
}

#[test]
fn env_overrides_apply_on_top_of_file() {
    let _guard = env_guard();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("callguard.yaml");
    std::fs::write(&path, "sessions:\n  cache_ttl: 45s\n").unwrap();

    env::set_var("CALLGUARD__SESSIONS__CACHE_TTL", "2m");
    env::set_var("CALLGUARD__REQUIRE_SESSION_FOR_AUTH", "true");
    env::set_var(
        "CALLGUARD_CONFIG_JSON",
        r#"{"rate_limits": {"global": {"max_requests": 50, "window": {"hours": 1}}}}"#,
    );
    let loaded = load_config(Some(&path));
    env::remove_var("CALLGUARD__SESSIONS__CACHE_TTL");
    env::remove_var("CALLGUARD__REQUIRE_SESSION_FOR_AUTH");
    env::remove_var("CALLGUARD_CONFIG_JSON");

    let config = loaded.unwrap();
    assert_eq!(config.sessions.cache_ttl, Duration::from_secs(120));
    assert!(config.require_session_for_auth);
    let global = config.rate_limits.global.unwrap();
    assert_eq!(global.max_requests, 50);
    assert_eq!(global.window, TimeWindow::Hours(1));
}

#[test]
fn invalid_documents_are_reported() {
    let _guard = env_guard();
    assert!(matches!(
        parse_document::<EngineConfig>("unknown_method: sometimes"),
        Err(ConfigError::Invalid(_))
    ));
    let missing = std::path::Path::new("/nonexistent/callguard.yaml");
    assert!(matches!(load_config(Some(missing)), Err(ConfigError::Io(_))));
}
