//! Test-mode detection.
//!
//! Test mode is a time-boxed bypass that makes every canonical role available
//! so engineers can exercise each role without real grants. It is switched on
//! by any one of several request signals. Each signal is a pure predicate over
//! an immutable [`SignalBag`]; the predicates are evaluated in precedence order
//! and combined with OR, so order only matters for short-circuiting and for
//! reporting which signal fired.
//!
//! The referrer is a low-trust hint: it is reported for diagnostics but never
//! activates test mode. See [`informational_signal`].
//!
//! Detection never fails. A malformed signal is an absent signal.

use base64::Engine;
use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD, URL_SAFE, URL_SAFE_NO_PAD};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::context::RequestContext;

pub const DEFAULT_TEST_KEY_PREFIX: &str = "npub_test";
pub const DEFAULT_MARKER_COOKIE: &str = "test_mode";
pub const DEFAULT_MARKER_HEADER: &str = "x-test-mode";
pub const DEFAULT_STATE_COOKIE: &str = "test_mode_state";

/// Names and windows that parameterize detection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestModePolicy {
    /// Reserved identity prefix for test keys.
    pub key_prefix: String,
    pub marker_cookie: String,
    pub marker_header: String,
    /// Cookie holding a structured `{ "isActive": bool, "expiresAt": millis }` payload.
    pub state_cookie: String,
    /// Query parameters that flag test mode on a referrer URL.
    pub referrer_params: Vec<String>,
    /// Lifetime of a [`TestModeSession`].
    pub session_window: Duration,
}

impl Default for TestModePolicy {
    fn default() -> Self {
        Self {
            key_prefix: DEFAULT_TEST_KEY_PREFIX.to_string(),
            marker_cookie: DEFAULT_MARKER_COOKIE.to_string(),
            marker_header: DEFAULT_MARKER_HEADER.to_string(),
            state_cookie: DEFAULT_STATE_COOKIE.to_string(),
            referrer_params: vec!["test_mode".to_string(), "testMode".to_string()],
            session_window: Duration::hours(4),
        }
    }
}

/// Which signal was observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TestModeSignal {
    ExplicitFlag,
    TestKeyPrefix,
    MarkerCookieOrHeader,
    StateCookie,
    Referrer,
}

/// Immutable inputs to detection.
#[derive(Debug, Clone, Copy)]
pub struct SignalBag<'a> {
    pub context: &'a RequestContext,
    /// `isTestUser` on the identity record.
    pub explicit_flag: bool,
    pub now: DateTime<Utc>,
}

type Predicate = fn(&SignalBag<'_>, &TestModePolicy) -> bool;

/// Activating signals, in precedence order.
const DETECTORS: [(TestModeSignal, Predicate); 4] = [
    (TestModeSignal::ExplicitFlag, explicit_flag),
    (TestModeSignal::TestKeyPrefix, test_key_prefix),
    (TestModeSignal::MarkerCookieOrHeader, marker_cookie_or_header),
    (TestModeSignal::StateCookie, state_cookie),
];

/// Whether any activating signal puts the caller in test mode.
pub fn detect(bag: &SignalBag<'_>, policy: &TestModePolicy) -> bool {
    first_signal(bag, policy).is_some()
}

/// The highest-precedence activating signal that fired, if any.
pub fn first_signal(bag: &SignalBag<'_>, policy: &TestModePolicy) -> Option<TestModeSignal> {
    DETECTORS
        .iter()
        .find(|(_, predicate)| predicate(bag, policy))
        .map(|(signal, _)| *signal)
}

/// Low-trust hints that are logged but never activate test mode.
pub fn informational_signal(bag: &SignalBag<'_>, policy: &TestModePolicy) -> Option<TestModeSignal> {
    referrer_flag(bag, policy).then_some(TestModeSignal::Referrer)
}

pub fn explicit_flag(bag: &SignalBag<'_>, _policy: &TestModePolicy) -> bool {
    bag.explicit_flag
}

pub fn test_key_prefix(bag: &SignalBag<'_>, policy: &TestModePolicy) -> bool {
    bag.context.identity().has_prefix(&policy.key_prefix)
}

pub fn marker_cookie_or_header(bag: &SignalBag<'_>, policy: &TestModePolicy) -> bool {
    let cookie = bag.context.cookie(&policy.marker_cookie);
    let header = bag.context.header(&policy.marker_header);
    cookie.is_some_and(is_truthy) || header.is_some_and(is_truthy)
}

pub fn state_cookie(bag: &SignalBag<'_>, policy: &TestModePolicy) -> bool {
    let Some(raw) = bag.context.cookie(&policy.state_cookie) else {
        return false;
    };

    match decode_state(raw) {
        Some(state) => state.is_live(bag.now),
        None => {
            tracing::debug!(
                identity = %bag.context.identity(),
                cookie = %policy.state_cookie,
                "ignoring undecodable test-mode state cookie"
            );
            false
        }
    }
}

pub fn referrer_flag(bag: &SignalBag<'_>, policy: &TestModePolicy) -> bool {
    let Some(referrer) = bag.context.referrer() else {
        return false;
    };

    match url::Url::parse(referrer) {
        Ok(url) => {
            let in_query = url
                .query_pairs()
                .any(|(k, v)| policy.referrer_params.iter().any(|p| *p == k) && is_truthy(&v));
            let in_fragment = url.fragment().is_some_and(|fragment| {
                url::form_urlencoded::parse(fragment.as_bytes())
                    .any(|(k, v)| policy.referrer_params.iter().any(|p| *p == k) && is_truthy(&v))
            });
            in_query || in_fragment
        }
        // Relative or mangled referrers: fall back to a plain substring match.
        Err(_) => policy
            .referrer_params
            .iter()
            .any(|p| referrer.contains(&format!("{p}=true"))),
    }
}

fn is_truthy(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "true" | "1" | "yes" | "on"
    )
}

/// Decoded payload of the structured state cookie.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TestModeState {
    is_active: bool,
    #[serde(default)]
    expires_at: Option<i64>,
}

impl TestModeState {
    fn is_live(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at {
            Some(expires_at) => self.is_active && now.timestamp_millis() < expires_at,
            None => self.is_active,
        }
    }
}

/// Accepts raw JSON or base64 (standard/url-safe, padded or not) JSON.
fn decode_state(raw: &str) -> Option<TestModeState> {
    let raw = raw.trim();
    if let Ok(state) = serde_json::from_str::<TestModeState>(raw) {
        return Some(state);
    }

    [STANDARD, URL_SAFE, STANDARD_NO_PAD, URL_SAFE_NO_PAD]
        .iter()
        .filter_map(|engine| engine.decode(raw).ok())
        .find_map(|bytes| serde_json::from_slice::<TestModeState>(&bytes).ok())
}

/// Server-side record of an activated test mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestModeSession {
    pub active: bool,
    pub activated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl TestModeSession {
    pub fn open(now: DateTime<Utc>, window: Duration) -> Self {
        Self {
            active: true,
            activated_at: now,
            expires_at: now + window,
        }
    }

    /// Expiry is evaluated lazily; an expired session is simply absent.
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.active && now < self.expires_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rolegate_core::Identity;

    fn ctx(id: &str) -> RequestContext {
        RequestContext::new(Identity::parse(id).unwrap())
    }

    fn bag(context: &RequestContext) -> SignalBag<'_> {
        SignalBag {
            context,
            explicit_flag: false,
            now: Utc::now(),
        }
    }

    #[test]
    fn no_signals_means_no_test_mode() {
        let c = ctx("npub_abc");
        assert!(!detect(&bag(&c), &TestModePolicy::default()));
    }

    #[test]
    fn explicit_flag_wins_precedence() {
        let c = ctx("npub_test_alice").with_header("x-test-mode", "true");
        let b = SignalBag {
            explicit_flag: true,
            ..bag(&c)
        };
        assert_eq!(
            first_signal(&b, &TestModePolicy::default()),
            Some(TestModeSignal::ExplicitFlag)
        );
    }

    #[test]
    fn reserved_prefix_is_detected() {
        let c = ctx("npub_test_alice");
        assert_eq!(
            first_signal(&bag(&c), &TestModePolicy::default()),
            Some(TestModeSignal::TestKeyPrefix)
        );
    }

    #[test]
    fn marker_cookie_and_header_are_detected() {
        let policy = TestModePolicy::default();

        let c = ctx("npub_abc").with_cookie("test_mode", "TRUE");
        assert!(marker_cookie_or_header(&bag(&c), &policy));

        let c = ctx("npub_abc").with_header("X-Test-Mode", "1");
        assert!(marker_cookie_or_header(&bag(&c), &policy));

        let c = ctx("npub_abc").with_cookie("test_mode", "false");
        assert!(!marker_cookie_or_header(&bag(&c), &policy));
    }

    #[test]
    fn state_cookie_accepts_raw_and_base64_json() {
        let policy = TestModePolicy::default();

        let c = ctx("npub_abc").with_cookie("test_mode_state", r#"{"isActive":true}"#);
        assert!(state_cookie(&bag(&c), &policy));

        let encoded = STANDARD.encode(r#"{"isActive":true,"activatedAt":1}"#);
        let c = ctx("npub_abc").with_cookie("test_mode_state", encoded);
        assert!(state_cookie(&bag(&c), &policy));

        let c = ctx("npub_abc").with_cookie("test_mode_state", r#"{"isActive":false}"#);
        assert!(!state_cookie(&bag(&c), &policy));
    }

    #[test]
    fn state_cookie_honours_expiry() {
        let policy = TestModePolicy::default();
        let now = Utc::now();
        let past = (now - Duration::minutes(1)).timestamp_millis();
        let future = (now + Duration::minutes(1)).timestamp_millis();

        let c = ctx("npub_abc").with_cookie(
            "test_mode_state",
            format!(r#"{{"isActive":true,"expiresAt":{past}}}"#),
        );
        assert!(!state_cookie(&SignalBag { now, ..bag(&c) }, &policy));

        let c = ctx("npub_abc").with_cookie(
            "test_mode_state",
            format!(r#"{{"isActive":true,"expiresAt":{future}}}"#),
        );
        assert!(state_cookie(&SignalBag { now, ..bag(&c) }, &policy));
    }

    #[test]
    fn malformed_state_cookie_is_silently_absent() {
        let policy = TestModePolicy::default();
        for raw in ["{not json", "!!!", "", r#"{"isActive":"yes"}"#, "bnVsbA=="] {
            let c = ctx("npub_abc").with_cookie("test_mode_state", raw);
            assert!(!state_cookie(&bag(&c), &policy), "payload {raw:?}");
            assert!(!detect(&bag(&c), &policy));
        }
    }

    #[test]
    fn referrer_query_and_fragment_are_detected() {
        let policy = TestModePolicy::default();

        let c = ctx("npub_abc").with_referrer("https://app.example/dashboard?testMode=true");
        assert!(referrer_flag(&bag(&c), &policy));

        let c = ctx("npub_abc").with_referrer("https://app.example/#test_mode=1");
        assert!(referrer_flag(&bag(&c), &policy));

        let c = ctx("npub_abc").with_referrer("/relative?test_mode=true");
        assert!(referrer_flag(&bag(&c), &policy));

        let c = ctx("npub_abc").with_referrer("https://app.example/?test_mode=false");
        assert!(!referrer_flag(&bag(&c), &policy));
    }

    #[test]
    fn referrer_is_reported_but_never_activates() {
        let policy = TestModePolicy::default();
        let c = ctx("npub_abc").with_referrer("https://evil.example/?testMode=true");

        assert!(!detect(&bag(&c), &policy));
        assert_eq!(first_signal(&bag(&c), &policy), None);
        assert_eq!(
            informational_signal(&bag(&c), &policy),
            Some(TestModeSignal::Referrer)
        );

        let plain = ctx("npub_abc");
        assert_eq!(informational_signal(&bag(&plain), &policy), None);
    }

    #[test]
    fn session_expires_lazily() {
        let now = Utc::now();
        let session = TestModeSession::open(now, Duration::hours(4));
        assert!(session.is_live(now + Duration::hours(3)));
        assert!(!session.is_live(now + Duration::hours(4)));

        let inactive = TestModeSession {
            active: false,
            ..session
        };
        assert!(!inactive.is_live(now));
    }
}
