//! The interaction façade: `perform`, `check`, and bounded waits.
//!
//! A [`UiDriver`] bundles the owner-thread executor, the element tree, the
//! idling machinery and a failure handler. [`UiDriver::on_node`] yields an
//! [`Interaction`] scoped to one matcher; every interaction first drives the
//! app to idleness, then re-queries the tree, so callers never operate on a
//! stale node reference.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use crate::diagnostics::DiagnosticCapture;
use crate::executor::OwnerExecutor;
use crate::finder::{ElementFinder, MatchResult, NoMatchDiagnostic};
use crate::idle::{IdleDetector, IdlingRegistry};
use crate::matcher::MatcherRef;
use crate::policy::IdlingPolicies;
use crate::result::{SondearError, SondearResult};
use crate::tree::{ElementTree, NodeId, NodeRef, Subscription};

/// Floor between re-checks during a bounded wait. Tree-change notifications
/// wake the wait earlier; changes that fire no notification (e.g. a plain
/// text mutation) are still caught within one interval.
pub const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// A mutation applied to a matched node.
pub trait NodeAction: Send + Sync {
    /// Description used in logs and failure messages
    fn description(&self) -> String;

    /// Preconditions the target must satisfy before [`perform`](Self::perform)
    /// runs; violation fails the interaction without touching the node.
    fn constraints(&self) -> MatcherRef;

    /// Apply the action. Runs on the owner thread against an idle tree.
    fn perform(&self, node: &NodeRef) -> SondearResult<()>;
}

/// A predicate checked against the result of a node query.
///
/// `check` receives either the unique match or the no-match diagnostic;
/// assertions about absence inspect the latter.
pub trait NodeAssertion: Send + Sync {
    /// Description used in logs and failure messages
    fn description(&self) -> String;

    /// Verify the query outcome. Runs on the owner thread.
    fn check(
        &self,
        node: Option<&NodeRef>,
        no_match: Option<&NoMatchDiagnostic>,
    ) -> SondearResult<()>;
}

struct FnAction<F> {
    description: String,
    constraints: MatcherRef,
    func: F,
}

impl<F> NodeAction for FnAction<F>
where
    F: Fn(&NodeRef) -> SondearResult<()> + Send + Sync,
{
    fn description(&self) -> String {
        self.description.clone()
    }

    fn constraints(&self) -> MatcherRef {
        Arc::clone(&self.constraints)
    }

    fn perform(&self, node: &NodeRef) -> SondearResult<()> {
        (self.func)(node)
    }
}

/// Build an action from a closure and its constraint matcher
pub fn action<F>(
    description: impl Into<String>,
    constraints: MatcherRef,
    func: F,
) -> Arc<dyn NodeAction>
where
    F: Fn(&NodeRef) -> SondearResult<()> + Send + Sync + 'static,
{
    Arc::new(FnAction {
        description: description.into(),
        constraints,
        func,
    })
}

struct FnAssertion<F> {
    description: String,
    func: F,
}

impl<F> NodeAssertion for FnAssertion<F>
where
    F: Fn(Option<&NodeRef>, Option<&NoMatchDiagnostic>) -> SondearResult<()> + Send + Sync,
{
    fn description(&self) -> String {
        self.description.clone()
    }

    fn check(
        &self,
        node: Option<&NodeRef>,
        no_match: Option<&NoMatchDiagnostic>,
    ) -> SondearResult<()> {
        (self.func)(node, no_match)
    }
}

/// Build an assertion from a closure
pub fn assertion<F>(description: impl Into<String>, func: F) -> Arc<dyn NodeAssertion>
where
    F: Fn(Option<&NodeRef>, Option<&NoMatchDiagnostic>) -> SondearResult<()>
        + Send
        + Sync
        + 'static,
{
    Arc::new(FnAssertion {
        description: description.into(),
        func,
    })
}

/// Asserts that the unique match additionally satisfies `matcher`
#[must_use]
pub fn matches(matcher: MatcherRef) -> Arc<dyn NodeAssertion> {
    let description = format!("matches({})", matcher.description());
    let desc = description.clone();
    assertion(description, move |node, no_match| match node {
        Some(node) if matcher.matches(node) => Ok(()),
        Some(node) => Err(SondearError::AssertionFailed {
            assertion: desc.clone(),
            reason: format!("node {} does not satisfy the matcher", node.describe()),
        }),
        None => Err(no_match
            .cloned()
            .map_or_else(
                || SondearError::AssertionFailed {
                    assertion: desc.clone(),
                    reason: "no matching node".into(),
                },
                NoMatchDiagnostic::into_error,
            )),
    })
}

/// Asserts that no node matches the interaction's matcher
#[must_use]
pub fn does_not_exist() -> Arc<dyn NodeAssertion> {
    assertion("does_not_exist", |node, _no_match| match node {
        None => Ok(()),
        Some(node) => Err(SondearError::AssertionFailed {
            assertion: "does_not_exist".into(),
            reason: format!("unexpectedly found {}", node.describe()),
        }),
    })
}

/// Hook invoked for every interaction failure before it reaches the caller.
///
/// Handlers may rewrite the error (attach context, translate into a
/// domain-specific failure) but must return one; swallowing failures is not
/// supported.
pub trait FailureHandler: Send + Sync {
    /// Process a failure raised while interacting with `matcher`
    fn handle(&self, matcher: &str, error: SondearError) -> SondearError;
}

/// Logs the failure and passes it through unchanged
#[derive(Debug, Default)]
pub struct LoggingFailureHandler;

impl FailureHandler for LoggingFailureHandler {
    fn handle(&self, matcher: &str, error: SondearError) -> SondearError {
        tracing::error!(matcher = %matcher, error = %error, "interaction failed");
        error
    }
}

/// Entry point for interacting with an element tree.
pub struct UiDriver {
    executor: Arc<OwnerExecutor>,
    tree: Arc<dyn ElementTree>,
    policies: Arc<IdlingPolicies>,
    registry: Arc<IdlingRegistry>,
    detector: Arc<IdleDetector>,
    failure_handler: Arc<dyn FailureHandler>,
    capture: Option<Arc<dyn DiagnosticCapture>>,
}

impl UiDriver {
    /// Start building a driver over the given executor and tree
    #[must_use]
    pub fn builder(executor: Arc<OwnerExecutor>, tree: Arc<dyn ElementTree>) -> UiDriverBuilder {
        UiDriverBuilder {
            executor,
            tree,
            policies: None,
            registry: None,
            failure_handler: None,
            capture: None,
        }
    }

    /// The active timeout policies; mutate through its setters to reconfigure
    #[must_use]
    pub fn policies(&self) -> &Arc<IdlingPolicies> {
        &self.policies
    }

    /// The idling resource registry; register resources here
    #[must_use]
    pub fn registry(&self) -> &Arc<IdlingRegistry> {
        &self.registry
    }

    /// Scope an interaction to the nodes matching `matcher`
    #[must_use]
    pub fn on_node(&self, matcher: MatcherRef) -> Interaction {
        Interaction {
            matcher,
            executor: Arc::clone(&self.executor),
            tree: Arc::clone(&self.tree),
            detector: Arc::clone(&self.detector),
            policies: Arc::clone(&self.policies),
            failure_handler: Arc::clone(&self.failure_handler),
            capture: self.capture.clone(),
        }
    }

    /// Block until the app is idle under the master policy
    pub fn wait_for_idle(&self) -> SondearResult<()> {
        let detector = Arc::clone(&self.detector);
        self.executor.execute(move || detector.loop_until_idle())
    }
}

impl std::fmt::Debug for UiDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UiDriver")
            .field("policies", &self.policies)
            .field("resources", &self.registry.len())
            .finish_non_exhaustive()
    }
}

/// Builder for [`UiDriver`]; unset collaborators get fresh defaults
pub struct UiDriverBuilder {
    executor: Arc<OwnerExecutor>,
    tree: Arc<dyn ElementTree>,
    policies: Option<Arc<IdlingPolicies>>,
    registry: Option<Arc<IdlingRegistry>>,
    failure_handler: Option<Arc<dyn FailureHandler>>,
    capture: Option<Arc<dyn DiagnosticCapture>>,
}

impl std::fmt::Debug for UiDriverBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UiDriverBuilder")
            .field("policies", &self.policies)
            .field("capture", &self.capture.is_some())
            .finish_non_exhaustive()
    }
}

impl UiDriverBuilder {
    /// Use an existing policy coordinator instead of the defaults
    #[must_use]
    pub fn policies(mut self, policies: Arc<IdlingPolicies>) -> Self {
        self.policies = Some(policies);
        self
    }

    /// Use an existing idling resource registry
    #[must_use]
    pub fn registry(mut self, registry: Arc<IdlingRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Route failures through a custom handler
    #[must_use]
    pub fn failure_handler(mut self, handler: Arc<dyn FailureHandler>) -> Self {
        self.failure_handler = Some(handler);
        self
    }

    /// Capture a tree snapshot ahead of every `perform`, `check`, and
    /// `wait_for` attempt
    #[must_use]
    pub fn diagnostic_capture(mut self, capture: Arc<dyn DiagnosticCapture>) -> Self {
        self.capture = Some(capture);
        self
    }

    /// Assemble the driver
    #[must_use]
    pub fn build(self) -> UiDriver {
        let policies = self.policies.unwrap_or_default();
        let registry = self.registry.unwrap_or_default();
        let detector = Arc::new(IdleDetector::new(
            Arc::clone(&self.executor),
            Arc::clone(&registry),
            Arc::clone(&policies),
        ));
        UiDriver {
            executor: self.executor,
            tree: self.tree,
            policies,
            registry,
            detector,
            failure_handler: self
                .failure_handler
                .unwrap_or_else(|| Arc::new(LoggingFailureHandler)),
            capture: self.capture,
        }
    }
}

/// An interaction scoped to one matcher.
///
/// Every operation synchronizes with the owner thread and waits for idleness
/// before touching the tree, and re-runs the query each time rather than
/// caching a node reference.
pub struct Interaction {
    matcher: MatcherRef,
    executor: Arc<OwnerExecutor>,
    tree: Arc<dyn ElementTree>,
    detector: Arc<IdleDetector>,
    policies: Arc<IdlingPolicies>,
    failure_handler: Arc<dyn FailureHandler>,
    capture: Option<Arc<dyn DiagnosticCapture>>,
}

impl Interaction {
    fn finder(&self) -> ElementFinder {
        ElementFinder::new(
            Arc::clone(&self.matcher),
            Arc::clone(&self.tree),
            Arc::clone(&self.executor),
        )
    }

    /// Record tree state ahead of a synchronized operation. Capture errors
    /// are logged and swallowed; diagnostics must never fail an interaction.
    fn snapshot(&self, label: &str) {
        if let Some(capture) = &self.capture {
            if let Err(capture_err) = capture.capture(label, self.tree.as_ref()) {
                tracing::warn!(error = %capture_err, "diagnostic capture failed");
            }
        }
    }

    /// Route a terminal failure through the failure handler
    fn fail(&self, error: SondearError) -> SondearError {
        self.failure_handler
            .handle(&self.matcher.description(), error)
    }

    /// Apply `action` to the unique matching node.
    ///
    /// Blocks until the app is idle, resolves the matcher to exactly one
    /// node, verifies the active perform precondition and the action's own
    /// constraints, then runs the action on the owner thread.
    pub fn perform(&self, action: &Arc<dyn NodeAction>) -> SondearResult<()> {
        self.snapshot("perform");
        let act = Arc::clone(action);
        let detector = Arc::clone(&self.detector);
        let finder = self.finder();
        let precondition = self.policies.perform_precondition();
        let result = self.executor.execute(move || {
            detector.loop_until_idle()?;
            let node = finder.find()?.into_unique()?;
            if !precondition.matches(&node) {
                return Err(SondearError::PerformFailed {
                    action: act.description(),
                    node: node.describe(),
                    reason: format!(
                        "target does not satisfy the perform precondition {}",
                        precondition.description()
                    ),
                });
            }
            let constraints = act.constraints();
            if !constraints.matches(&node) {
                return Err(SondearError::PerformFailed {
                    action: act.description(),
                    node: node.describe(),
                    reason: format!(
                        "target does not satisfy constraint {}",
                        constraints.description()
                    ),
                });
            }
            tracing::info!(action = %act.description(), node = %node.describe(), "performing");
            act.perform(&node)
        });
        result.map_err(|e| self.fail(e))
    }

    /// Verify `assertion` against the current query outcome.
    ///
    /// A unique match is handed to the assertion; so is a no-match, together
    /// with its diagnostic. An ambiguous match fails outright.
    pub fn check(&self, assertion: &Arc<dyn NodeAssertion>) -> SondearResult<()> {
        self.snapshot("check");
        let assertion = Arc::clone(assertion);
        let detector = Arc::clone(&self.detector);
        let finder = self.finder();
        let result = self.executor.execute(move || {
            detector.loop_until_idle()?;
            check_once(&finder, assertion.as_ref())
        });
        result.map_err(|e| self.fail(e))
    }

    /// Whether exactly one node currently matches. An ambiguous match is an
    /// error, not `true`.
    pub fn exists(&self) -> SondearResult<bool> {
        let detector = Arc::clone(&self.detector);
        let finder = self.finder();
        let result = self.executor.execute(move || {
            detector.loop_until_idle()?;
            match finder.find()? {
                MatchResult::Unique(_) => Ok(true),
                MatchResult::NoMatch(_) => Ok(false),
                MatchResult::Ambiguous(diag) => Err(diag.into_error()),
            }
        });
        result.map_err(|e| self.fail(e))
    }

    /// Fetch the unique matching node
    pub fn get(&self) -> SondearResult<NodeRef> {
        let detector = Arc::clone(&self.detector);
        let finder = self.finder();
        let result = self.executor.execute(move || {
            detector.loop_until_idle()?;
            finder.find()?.into_unique()
        });
        result.map_err(|e| self.fail(e))
    }

    /// Retry `assertion` until it passes or `timeout` expires.
    ///
    /// The deadline is computed once up front. Between attempts the call
    /// sleeps at most [`POLL_INTERVAL`], waking early when any tree root
    /// reports a change. On expiry the last failure is wrapped in
    /// [`SondearError::WaitTimedOut`] so callers see both the budget and the
    /// reason the final attempt failed.
    pub fn wait_for(
        &self,
        timeout: Duration,
        assertion: &Arc<dyn NodeAssertion>,
    ) -> SondearResult<()> {
        if timeout.is_zero() {
            return Err(self.fail(SondearError::invalid_argument(
                "wait_for timeout must be non-zero",
            )));
        }
        let deadline = Instant::now() + timeout;
        let notifier: Arc<(Mutex<bool>, Condvar)> = Arc::new((Mutex::new(false), Condvar::new()));
        // Subscriptions live in this frame so they survive across attempts
        // and unregister when the wait returns.
        let mut subscriptions: HashMap<NodeId, Subscription> = HashMap::new();

        loop {
            self.snapshot("wait_for");
            {
                let (flag, _) = &*notifier;
                *flag.lock().expect("wait notifier poisoned") = false;
            }

            let assertion = Arc::clone(assertion);
            let detector = Arc::clone(&self.detector);
            let finder = self.finder();
            let tree = Arc::clone(&self.tree);
            let notify = Arc::clone(&notifier);
            let known: HashSet<NodeId> = subscriptions.keys().copied().collect();

            type Attempt = (SondearResult<()>, Vec<(NodeId, Subscription)>);
            let attempt: SondearResult<Attempt> = self.executor.execute(move || {
                let outcome = detector
                    .loop_until_idle()
                    .and_then(|()| check_once(&finder, assertion.as_ref()));
                let mut new_subs = Vec::new();
                if outcome.is_err() {
                    // Listen on every root we are not yet subscribed to, so
                    // changes under late-appearing roots also wake the wait.
                    for root in tree.roots() {
                        let id = root.id();
                        if known.contains(&id) {
                            continue;
                        }
                        let notify = Arc::clone(&notify);
                        let listener = Arc::new(move || {
                            let (flag, cvar) = &*notify;
                            *flag.lock().expect("wait notifier poisoned") = true;
                            cvar.notify_all();
                        });
                        new_subs.push((id, tree.subscribe(&root, listener)?));
                    }
                }
                Ok((outcome, new_subs))
            });
            // Executor and subscription failures are terminal too; they take
            // the same handler path as an expired deadline.
            let (outcome, new_subs) = attempt.map_err(|e| self.fail(e))?;
            for (id, sub) in new_subs {
                subscriptions.insert(id, sub);
            }

            let last_failure = match outcome {
                Ok(()) => return Ok(()),
                Err(err) => err,
            };

            let now = Instant::now();
            if now >= deadline {
                return Err(self.fail(SondearError::WaitTimedOut {
                    timeout,
                    source: Box::new(last_failure),
                }));
            }

            let budget = POLL_INTERVAL.min(deadline - now);
            let (flag, cvar) = &*notifier;
            let signalled = flag.lock().expect("wait notifier poisoned");
            if !*signalled {
                let _unused = cvar
                    .wait_timeout(signalled, budget)
                    .expect("wait notifier poisoned");
            }
        }
    }
}

impl std::fmt::Debug for Interaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Interaction({})", self.matcher.description())
    }
}

/// One query-and-check cycle shared by `check` and `wait_for`
fn check_once(finder: &ElementFinder, assertion: &dyn NodeAssertion) -> SondearResult<()> {
    match finder.find()? {
        MatchResult::Unique(node) => assertion.check(Some(&node), None),
        MatchResult::NoMatch(diag) => assertion.check(None, Some(&diag)),
        MatchResult::Ambiguous(diag) => Err(diag.into_error()),
    }
}
