//! Checkout orchestration: plan resolution, checkout creation, hosted
//! checkout in an external browser, and mapping of the browser's outcome.
//!
//! # State machine
//!
//! ```text
//! Idle ─► Matching ─┬─► Requesting ─┬─► AwaitingBrowser ─┬─► Succeeded
//!                   │               │                    ├─► Cancelled
//!                   └───────────────┴────────────────────┴─► Failed
//! ```
//!
//! Terminal states stay visible through [`CheckoutSession::state`] until
//! [`CheckoutSession::acknowledge`] (or the next `start`) returns the session
//! to `Idle`. Only one attempt runs at a time per session; a concurrent
//! `start` is rejected with [`ClientError::AlreadyInProgress`].

use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tokio::sync::Notify;
use tracing::{debug, info, instrument, warn, Span};
use url::Url;
use uuid::Uuid;

use crate::browser::{BrowserOutcome, BrowserSession};
use crate::catalog::PlanCatalog;
use crate::client::BackendClient;
use crate::config::AppConfig;
use crate::error::{ClientError, ClientResult};
use crate::matcher::match_by_months;
use crate::model::{CheckoutRequest, CheckoutResult, CheckoutUrlResponse, DurationSelection, Plan, PlanId};

pub const CREATE_CHECKOUT_PATH: &str = "subscriptions/create-checkout";

// ---------------------------------------------------------------------------
// CheckoutState
// ---------------------------------------------------------------------------

/// Where a [`CheckoutSession`] is in its flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckoutState {
    Idle,
    Matching,
    Requesting { plan_id: PlanId },
    AwaitingBrowser { plan_id: PlanId },
    Succeeded { plan_id: PlanId },
    Cancelled,
    Failed { message: String },
}

impl CheckoutState {
    /// An attempt is running; a new `start` must be rejected.
    pub fn is_in_flight(&self) -> bool {
        matches!(
            self,
            CheckoutState::Matching
                | CheckoutState::Requesting { .. }
                | CheckoutState::AwaitingBrowser { .. }
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            CheckoutState::Succeeded { .. } | CheckoutState::Cancelled | CheckoutState::Failed { .. }
        )
    }

    /// Whether the flow may move from `self` to `next`.
    pub fn can_transition_to(&self, next: &CheckoutState) -> bool {
        use CheckoutState::*;
        match (self, next) {
            (Idle, Matching) => true,
            (Matching, Requesting { .. } | Failed { .. }) => true,
            (Requesting { .. }, AwaitingBrowser { .. } | Failed { .. }) => true,
            (AwaitingBrowser { .. }, Succeeded { .. } | Cancelled | Failed { .. }) => true,
            (from, Idle) => from.is_terminal() || from.is_in_flight(),
            _ => false,
        }
    }

    fn for_result(result: &CheckoutResult) -> Self {
        match result {
            CheckoutResult::Success { plan_id } => CheckoutState::Succeeded { plan_id: *plan_id },
            CheckoutResult::Cancelled => CheckoutState::Cancelled,
            CheckoutResult::Error(err) => CheckoutState::Failed {
                message: err.to_string(),
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Attempt guard
// ---------------------------------------------------------------------------

/// Owns the session state for the duration of one attempt. Dropping it
/// without [`Attempt::finish`] (the `start` future was dropped or aborted)
/// puts the session back to `Idle`.
struct Attempt<'a> {
    state: &'a Mutex<CheckoutState>,
    finished: bool,
}

impl<'a> Attempt<'a> {
    fn begin(state: &'a Mutex<CheckoutState>) -> Option<Self> {
        let mut guard = state.lock().unwrap_or_else(PoisonError::into_inner);
        if guard.is_in_flight() {
            return None;
        }
        *guard = CheckoutState::Matching;
        Some(Self {
            state,
            finished: false,
        })
    }

    fn advance(&self, next: CheckoutState) {
        let mut guard = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        debug_assert!(
            guard.can_transition_to(&next),
            "invalid checkout transition {guard:?} -> {next:?}"
        );
        debug!(from = ?*guard, to = ?next, "checkout state");
        *guard = next;
    }

    fn finish(mut self, result: CheckoutResult) -> CheckoutResult {
        self.advance(CheckoutState::for_result(&result));
        self.finished = true;
        result
    }
}

impl Drop for Attempt<'_> {
    fn drop(&mut self) {
        if !self.finished {
            *self.state.lock().unwrap_or_else(PoisonError::into_inner) = CheckoutState::Idle;
        }
    }
}

// ---------------------------------------------------------------------------
// CheckoutSession
// ---------------------------------------------------------------------------

/// Runs hosted checkouts against the companion backend.
pub struct CheckoutSession<B> {
    client: BackendClient,
    catalog: PlanCatalog,
    browser: B,
    redirect_uri: Url,
    plans: RwLock<Arc<Vec<Plan>>>,
    state: Mutex<CheckoutState>,
    abort: Notify,
}

impl<B: BrowserSession> CheckoutSession<B> {
    /// Fails with [`ClientError::Config`] when `redirect_uri` is blank or not
    /// an absolute URL.
    pub fn new(client: BackendClient, browser: B, redirect_uri: &str) -> ClientResult<Self> {
        let redirect_uri = parse_redirect_uri(redirect_uri)?;
        Ok(Self {
            catalog: PlanCatalog::new(client.clone()),
            client,
            browser,
            redirect_uri,
            plans: RwLock::new(Arc::new(Vec::new())),
            state: Mutex::new(CheckoutState::Idle),
            abort: Notify::new(),
        })
    }

    /// Build a session from validated configuration.
    pub fn from_config(config: &AppConfig, browser: B) -> ClientResult<Self> {
        config.validate()?;
        let client = BackendClient::from_config(&config.backend)?;
        Self::new(client, browser, &config.checkout.redirect_uri)
    }

    /// The redirect URI handed to the browser, in normalized form.
    pub fn redirect_uri(&self) -> &Url {
        &self.redirect_uri
    }

    pub fn catalog(&self) -> &PlanCatalog {
        &self.catalog
    }

    /// The plans the next `start` will match against.
    pub fn plans(&self) -> Arc<Vec<Plan>> {
        Arc::clone(&self.plans.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Replace the catalog snapshot.
    pub fn set_catalog(&self, plans: Vec<Plan>) {
        *self.plans.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(plans);
    }

    /// Fetch plans and replace the snapshot. On failure the previous snapshot
    /// is kept.
    pub async fn refresh_catalog(&self) -> ClientResult<usize> {
        match self.catalog.fetch_plans().await {
            Ok(plans) => {
                let count = plans.len();
                self.set_catalog(plans);
                Ok(count)
            }
            Err(err) => {
                warn!(error = %err, "plan catalog refresh failed");
                Err(err)
            }
        }
    }

    pub fn state(&self) -> CheckoutState {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Return a finished session to `Idle`. No effect while an attempt runs.
    pub fn acknowledge(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.is_terminal() {
            *state = CheckoutState::Idle;
        }
    }

    /// Abandon the in-flight attempt, if any. Its `start` call resolves to
    /// [`CheckoutResult::Cancelled`] and the session returns to `Idle`
    /// without recording an outcome. With no attempt in flight this does
    /// nothing, so a later `start` is unaffected.
    pub fn abort(&self) {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.is_in_flight() {
            self.abort.notify_waiters();
        }
    }

    /// Run one checkout for `selection`.
    ///
    /// Never fails: every outcome, including errors, is carried by the
    /// returned [`CheckoutResult`].
    #[instrument(skip(self, selection), fields(attempt = %Uuid::new_v4(), months = selection.months, plan_id))]
    pub async fn start(&self, selection: &DurationSelection) -> CheckoutResult {
        // Registered before the attempt becomes visible as in flight, so an
        // `abort` that observes the attempt always wakes this waiter.
        let abandoned = self.abort.notified();
        tokio::pin!(abandoned);
        abandoned.as_mut().enable();

        let Some(attempt) = Attempt::begin(&self.state) else {
            warn!("checkout start rejected, another attempt is in flight");
            return CheckoutResult::Error(ClientError::AlreadyInProgress);
        };

        tokio::select! {
            result = self.run(&attempt, selection) => {
                match &result {
                    CheckoutResult::Success { plan_id } => info!(plan_id, "checkout completed"),
                    CheckoutResult::Cancelled => info!("checkout cancelled by user"),
                    CheckoutResult::Error(err) => warn!(error = %err, "checkout failed"),
                }
                attempt.finish(result)
            }
            _ = &mut abandoned => {
                info!("checkout abandoned");
                CheckoutResult::Cancelled
            }
        }
    }

    async fn run(&self, attempt: &Attempt<'_>, selection: &DurationSelection) -> CheckoutResult {
        let plan_id = {
            let plans = self.plans();
            match match_by_months(&plans, selection.months) {
                Some(plan) => plan.plan_id,
                None => return CheckoutResult::Error(ClientError::NoMatchingPlan),
            }
        };
        Span::current().record("plan_id", plan_id);

        attempt.advance(CheckoutState::Requesting { plan_id });
        let checkout_url = match self.create_checkout(CheckoutRequest::new(plan_id)).await {
            Ok(url) => url,
            Err(err) => return CheckoutResult::Error(err),
        };

        attempt.advance(CheckoutState::AwaitingBrowser { plan_id });
        let outcome = self
            .browser
            .open_auth_session(&checkout_url, self.redirect_uri.as_str())
            .await;
        debug!(?outcome, "browser session finished");

        interpret_outcome(outcome, &self.redirect_uri, plan_id)
    }

    /// `POST /subscriptions/create-checkout` and extract the hosted URL.
    async fn create_checkout(&self, request: CheckoutRequest) -> ClientResult<Url> {
        let resp: CheckoutUrlResponse = self
            .client
            .post(CREATE_CHECKOUT_PATH, &request)
            .await
            .map_err(|err| match err {
                ClientError::Serialization(err) => {
                    ClientError::MalformedResponse(format!("checkout response is not valid: {err}"))
                }
                other => other,
            })?;

        let raw = resp.checkout_url().ok_or_else(|| {
            ClientError::MalformedResponse("checkout response has no URL".to_string())
        })?;
        Url::parse(raw)
            .map_err(|err| ClientError::MalformedResponse(format!("invalid checkout URL '{raw}': {err}")))
    }
}

fn parse_redirect_uri(raw: &str) -> ClientResult<Url> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(ClientError::Config("checkout redirect URI is empty".to_string()));
    }
    Url::parse(raw)
        .map_err(|err| ClientError::Config(format!("invalid checkout redirect URI '{raw}': {err}")))
}

/// Whether `target` lands on the registered redirect URI. Scheme, host, port
/// and path must match exactly; query and fragment are ignored.
fn is_redirect_target(target: &Url, redirect: &Url) -> bool {
    fn path(url: &Url) -> &str {
        match url.path() {
            "" => "/",
            path => path,
        }
    }
    target.scheme() == redirect.scheme()
        && target.host_str() == redirect.host_str()
        && target.port_or_known_default() == redirect.port_or_known_default()
        && path(target) == path(redirect)
}

/// Map a browser session's terminal state to a checkout result.
pub fn interpret_outcome(outcome: BrowserOutcome, redirect_uri: &Url, plan_id: PlanId) -> CheckoutResult {
    match outcome {
        BrowserOutcome::Cancelled | BrowserOutcome::Dismissed => CheckoutResult::Cancelled,
        BrowserOutcome::Failed(message) => {
            CheckoutResult::Error(ClientError::BrowserSession(message))
        }
        BrowserOutcome::Redirected { url } => {
            let target = match Url::parse(&url) {
                Ok(target) if is_redirect_target(&target, redirect_uri) => target,
                _ => {
                    return CheckoutResult::Error(ClientError::BrowserSession(format!(
                        "unexpected redirect target '{url}'"
                    )))
                }
            };
            match redirect_status(&target) {
                RedirectStatus::Cancelled => CheckoutResult::Cancelled,
                RedirectStatus::Failed => CheckoutResult::Error(ClientError::BrowserSession(
                    "checkout reported a payment failure".to_string(),
                )),
                RedirectStatus::Completed => CheckoutResult::Success { plan_id },
            }
        }
    }
}

enum RedirectStatus {
    Completed,
    Cancelled,
    Failed,
}

fn redirect_status(url: &Url) -> RedirectStatus {
    for (key, value) in url.query_pairs() {
        let value = value.to_ascii_lowercase();
        match (key.as_ref(), value.as_str()) {
            ("status", "cancel" | "canceled" | "cancelled") => return RedirectStatus::Cancelled,
            ("canceled" | "cancelled", "true" | "1") => return RedirectStatus::Cancelled,
            ("status", "error" | "failed") => return RedirectStatus::Failed,
            _ => {}
        }
    }
    RedirectStatus::Completed
}

#[cfg(test)]
mod tests {
    use super::*;

    const REDIRECT: &str = "companion://checkout-complete";

    fn redirect() -> Url {
        Url::parse(REDIRECT).unwrap()
    }

    fn redirected(url: &str) -> BrowserOutcome {
        BrowserOutcome::Redirected { url: url.to_string() }
    }

    #[test]
    fn test_transitions() {
        use CheckoutState::*;
        assert!(Idle.can_transition_to(&Matching));
        assert!(Matching.can_transition_to(&Requesting { plan_id: 1 }));
        assert!(Matching.can_transition_to(&Failed { message: "x".into() }));
        assert!(!Matching.can_transition_to(&AwaitingBrowser { plan_id: 1 }));
        assert!(!Idle.can_transition_to(&AwaitingBrowser { plan_id: 1 }));
        assert!(!Succeeded { plan_id: 1 }.can_transition_to(&AwaitingBrowser { plan_id: 1 }));
        assert!(Cancelled.can_transition_to(&Idle));
    }

    #[test]
    fn test_redirect_success() {
        let outcome = BrowserOutcome::Redirected {
            url: format!("{REDIRECT}?status=success&session_id=cs_1"),
        };
        assert!(matches!(
            interpret_outcome(outcome, &redirect(), 4),
            CheckoutResult::Success { plan_id: 4 }
        ));
    }

    #[test]
    fn test_redirect_cancel_query() {
        for query in ["status=cancel", "status=Cancelled", "canceled=true"] {
            let outcome = BrowserOutcome::Redirected {
                url: format!("{REDIRECT}?{query}"),
            };
            assert!(interpret_outcome(outcome, &redirect(), 1).is_cancelled(), "{query}");
        }
    }

    #[test]
    fn test_foreign_redirect_is_error() {
        let outcome = BrowserOutcome::Redirected {
            url: "https://evil.example.com/checkout-complete".to_string(),
        };
        assert!(interpret_outcome(outcome, &redirect(), 1).is_error());
    }

    #[test]
    fn test_lookalike_redirect_is_error() {
        for url in [
            "companion://checkout-complete-evil?status=success",
            "companion://checkout-complete.evil.example/?status=success",
            "companionx://checkout-complete?status=success",
            "companion://checkout-complete/extra?status=success",
        ] {
            assert!(
                interpret_outcome(redirected(url), &redirect(), 1).is_error(),
                "{url}"
            );
        }

        let loopback = Url::parse("http://127.0.0.1:8765/checkout-complete").unwrap();
        for url in [
            "http://127.0.0.1:8765/checkout-completed?status=success",
            "http://127.0.0.1:8766/checkout-complete?status=success",
            "https://127.0.0.1:8765/checkout-complete?status=success",
            "not a url",
        ] {
            assert!(interpret_outcome(redirected(url), &loopback, 1).is_error(), "{url}");
        }
    }

    #[test]
    fn test_redirect_match_ignores_host_case_query_and_fragment() {
        let configured = parse_redirect_uri("http://LOCALHOST:8765/cb").unwrap();
        let result = interpret_outcome(
            redirected("http://localhost:8765/cb?session_id=cs_9"),
            &configured,
            9,
        );
        assert!(matches!(result, CheckoutResult::Success { plan_id: 9 }));

        let result = interpret_outcome(
            redirected("companion://checkout-complete#done"),
            &redirect(),
            2,
        );
        assert!(matches!(result, CheckoutResult::Success { plan_id: 2 }));
    }

    #[test]
    fn test_redirect_failure_query() {
        for query in ["status=error", "status=failed", "status=FAILED", "session_id=cs_1&status=Error"] {
            let result = interpret_outcome(redirected(&format!("{REDIRECT}?{query}")), &redirect(), 1);
            match result {
                CheckoutResult::Error(ClientError::BrowserSession(message)) => {
                    assert_eq!(message, "checkout reported a payment failure", "{query}")
                }
                other => panic!("{query}: expected failure, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_parse_redirect_uri() {
        assert!(matches!(parse_redirect_uri(""), Err(ClientError::Config(_))));
        assert!(matches!(parse_redirect_uri("   "), Err(ClientError::Config(_))));
        assert!(matches!(parse_redirect_uri("/checkout-complete"), Err(ClientError::Config(_))));
        assert_eq!(
            parse_redirect_uri("http://LOCALHOST:8765/cb").unwrap().as_str(),
            "http://localhost:8765/cb"
        );
    }

    #[test]
    fn test_browser_outcomes() {
        assert!(interpret_outcome(BrowserOutcome::Cancelled, &redirect(), 1).is_cancelled());
        assert!(interpret_outcome(BrowserOutcome::Dismissed, &redirect(), 1).is_cancelled());
        let result = interpret_outcome(BrowserOutcome::Failed("boom".into()), &redirect(), 1);
        assert!(matches!(result, CheckoutResult::Error(ClientError::BrowserSession(_))));
    }

    #[test]
    fn test_attempt_guard_resets_on_drop() {
        let state = Mutex::new(CheckoutState::Idle);
        {
            let attempt = Attempt::begin(&state).unwrap();
            attempt.advance(CheckoutState::Requesting { plan_id: 3 });
            assert!(Attempt::begin(&state).is_none());
        }
        assert_eq!(*state.lock().unwrap(), CheckoutState::Idle);
    }

    #[test]
    fn test_attempt_finish_records_terminal_state() {
        let state = Mutex::new(CheckoutState::Idle);
        let attempt = Attempt::begin(&state).unwrap();
        let result = attempt.finish(CheckoutResult::Error(ClientError::NoMatchingPlan));
        assert!(result.is_error());
        assert_eq!(
            *state.lock().unwrap(),
            CheckoutState::Failed {
                message: "no matching plan".to_string()
            }
        );

        // A terminal state does not block the next attempt.
        assert!(Attempt::begin(&state).is_some());
    }
}
