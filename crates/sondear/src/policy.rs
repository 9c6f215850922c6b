//! Idling policies: how long to wait for quiescence and what to do when the
//! wait is exceeded.
//!
//! Policies are immutable once built. The [`IdlingPolicies`] registry stores
//! each named policy behind an [`arc_swap::ArcSwap`], so configuration calls
//! replace the whole value atomically and a concurrent reader always observes
//! a fully-formed policy, old or new, never a half-updated one.

use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;

use crate::matcher::{is_displayed, MatcherRef};
use crate::result::{SondearError, SondearResult};

/// Default master timeout before declaring the application not idle
pub const DEFAULT_MASTER_TIMEOUT: Duration = Duration::from_secs(60);

/// Default per-resource timeout before an idling-resource error
pub const DEFAULT_RESOURCE_ERROR_TIMEOUT: Duration = Duration::from_secs(26);

/// Default per-resource budget before a slow-resource warning is logged
pub const DEFAULT_RESOURCE_WARNING_TIMEOUT: Duration = Duration::from_secs(5);

/// How a timeout violation is reported to the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseAction {
    /// Raise an "application not idle" failure carrying the busy resources
    FailHard,
    /// Raise a distinct "idling-resource timeout" failure
    FailTimeout,
    /// Log a warning and return normally (the only non-interrupting path)
    LogOnly,
}

/// Immutable idling configuration: a timeout plus a response action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdlingPolicy {
    idle_timeout: Duration,
    response: ResponseAction,
    wait_for_background_tasks: bool,
}

impl IdlingPolicy {
    /// Start building a policy
    #[must_use]
    pub fn builder() -> IdlingPolicyBuilder {
        IdlingPolicyBuilder::default()
    }

    /// Copy this policy into a builder for read-copy-replace updates
    #[must_use]
    pub fn to_builder(&self) -> IdlingPolicyBuilder {
        IdlingPolicyBuilder {
            idle_timeout: Some(self.idle_timeout),
            response: Some(self.response),
            wait_for_background_tasks: self.wait_for_background_tasks,
        }
    }

    /// The amount of time the policy allows a resource to be non-idle
    #[must_use]
    pub const fn idle_timeout(&self) -> Duration {
        self.idle_timeout
    }

    /// The configured response action
    #[must_use]
    pub const fn response(&self) -> ResponseAction {
        self.response
    }

    /// Whether idle detection should also wait on registered background work
    #[must_use]
    pub const fn waits_for_background_tasks(&self) -> bool {
        self.wait_for_background_tasks
    }

    /// Invoked when the idle timeout has been exceeded.
    ///
    /// `busy_resources` names everything that was still busy; `message` adds
    /// timeout context for the error text. Only `LogOnly` returns `Ok`.
    pub fn handle_timeout(
        &self,
        busy_resources: Vec<String>,
        message: impl Into<String>,
    ) -> SondearResult<()> {
        match self.response {
            ResponseAction::FailHard => Err(SondearError::AppNotIdle {
                busy: busy_resources,
                message: message.into(),
            }),
            ResponseAction::FailTimeout => Err(SondearError::IdlingResourceTimeout {
                resources: busy_resources,
            }),
            ResponseAction::LogOnly => {
                tracing::warn!(
                    busy = ?busy_resources,
                    "these resources are not idle: {}",
                    message.into()
                );
                Ok(())
            }
        }
    }
}

/// Builder for [`IdlingPolicy`]; no partially-built policy is observable.
#[derive(Debug, Clone, Default)]
pub struct IdlingPolicyBuilder {
    idle_timeout: Option<Duration>,
    response: Option<ResponseAction>,
    wait_for_background_tasks: bool,
}

impl IdlingPolicyBuilder {
    /// Set the idle timeout; must be positive
    #[must_use]
    pub const fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = Some(timeout);
        self
    }

    /// Report violations as "application not idle"
    #[must_use]
    pub const fn fail_hard(mut self) -> Self {
        self.response = Some(ResponseAction::FailHard);
        self
    }

    /// Report violations as an idling-resource timeout
    #[must_use]
    pub const fn fail_timeout(mut self) -> Self {
        self.response = Some(ResponseAction::FailTimeout);
        self
    }

    /// Downgrade violations to a logged warning
    #[must_use]
    pub const fn log_only(mut self) -> Self {
        self.response = Some(ResponseAction::LogOnly);
        self
    }

    /// Whether idle detection should also wait on background work
    #[must_use]
    pub const fn waits_for_background_tasks(mut self, wait: bool) -> Self {
        self.wait_for_background_tasks = wait;
        self
    }

    /// Build the policy, validating the configuration
    pub fn build(self) -> SondearResult<IdlingPolicy> {
        let idle_timeout = self
            .idle_timeout
            .ok_or_else(|| SondearError::invalid_argument("idle timeout is not set"))?;
        if idle_timeout.is_zero() {
            return Err(SondearError::invalid_argument(
                "idle timeout must be positive",
            ));
        }
        let response = self
            .response
            .ok_or_else(|| SondearError::invalid_argument("response action is not set"))?;
        Ok(IdlingPolicy {
            idle_timeout,
            response,
            wait_for_background_tasks: self.wait_for_background_tasks,
        })
    }
}

/// Which named policy a configuration call targets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyKind {
    /// Governs overall "is the app responsive" detection
    Master,
    /// Governs individual registered resources (error threshold)
    ResourceError,
    /// Governs the non-fatal slow-resource warning
    ResourceWarning,
}

/// Process-wide, hot-swappable set of named idling policies.
///
/// The registry is an explicit, injectable context object: the driver owns
/// one and hands it to idle detection, rather than resolving policies through
/// ambient globals. Reads are wait-free; writes replace the whole policy.
pub struct IdlingPolicies {
    master: ArcSwap<IdlingPolicy>,
    resource_error: ArcSwap<IdlingPolicy>,
    resource_warning: ArcSwap<IdlingPolicy>,
    perform_precondition: ArcSwap<MatcherRef>,
}

impl Default for IdlingPolicies {
    fn default() -> Self {
        Self {
            perform_precondition: ArcSwap::from_pointee(is_displayed()),
            master: ArcSwap::from_pointee(
                IdlingPolicy::builder()
                    .with_idle_timeout(DEFAULT_MASTER_TIMEOUT)
                    .fail_hard()
                    .waits_for_background_tasks(true)
                    .build()
                    .unwrap(),
            ),
            resource_error: ArcSwap::from_pointee(
                IdlingPolicy::builder()
                    .with_idle_timeout(DEFAULT_RESOURCE_ERROR_TIMEOUT)
                    .fail_timeout()
                    .build()
                    .unwrap(),
            ),
            resource_warning: ArcSwap::from_pointee(
                IdlingPolicy::builder()
                    .with_idle_timeout(DEFAULT_RESOURCE_WARNING_TIMEOUT)
                    .log_only()
                    .build()
                    .unwrap(),
            ),
        }
    }
}

impl IdlingPolicies {
    /// Create a registry with the default policies
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, kind: PolicyKind) -> &ArcSwap<IdlingPolicy> {
        match kind {
            PolicyKind::Master => &self.master,
            PolicyKind::ResourceError => &self.resource_error,
            PolicyKind::ResourceWarning => &self.resource_warning,
        }
    }

    /// Current master policy
    #[must_use]
    pub fn master(&self) -> Arc<IdlingPolicy> {
        self.master.load_full()
    }

    /// Current per-resource error policy
    #[must_use]
    pub fn resource_error(&self) -> Arc<IdlingPolicy> {
        self.resource_error.load_full()
    }

    /// Current per-resource warning policy
    #[must_use]
    pub fn resource_warning(&self) -> Arc<IdlingPolicy> {
        self.resource_warning.load_full()
    }

    /// Read any named policy
    #[must_use]
    pub fn get(&self, kind: PolicyKind) -> Arc<IdlingPolicy> {
        self.slot(kind).load_full()
    }

    /// Replace a named policy wholesale; last writer wins
    pub fn set(&self, kind: PolicyKind, policy: IdlingPolicy) {
        self.slot(kind).store(Arc::new(policy));
    }

    /// Replace the timeout of a named policy, preserving its other fields.
    ///
    /// Fails with `InvalidArgument` when the timeout is zero; the stored
    /// policy is left unchanged in that case.
    pub fn set_timeout(&self, kind: PolicyKind, timeout: Duration) -> SondearResult<()> {
        let slot = self.slot(kind);
        let updated = slot
            .load()
            .to_builder()
            .with_idle_timeout(timeout)
            .build()?;
        slot.store(Arc::new(updated));
        Ok(())
    }

    /// Matcher every perform target must satisfy on top of the action's own
    /// constraints; defaults to [`is_displayed`].
    #[must_use]
    pub fn perform_precondition(&self) -> MatcherRef {
        self.perform_precondition.load_full().as_ref().clone()
    }

    /// Replace the perform precondition wholesale; last writer wins
    pub fn set_perform_precondition(&self, matcher: MatcherRef) {
        self.perform_precondition.store(Arc::new(matcher));
    }

    /// Replace only the master policy's background-tasks flag, preserving its
    /// timeout and response action.
    pub fn set_wait_for_background_tasks(&self, wait: bool) {
        let updated = self
            .master
            .load()
            .to_builder()
            .waits_for_background_tasks(wait)
            .build()
            .expect("existing policy is always valid");
        self.master.store(Arc::new(updated));
    }
}

impl std::fmt::Debug for IdlingPolicies {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdlingPolicies")
            .field("master", &self.master.load_full())
            .field("resource_error", &self.resource_error.load_full())
            .field("resource_warning", &self.resource_warning.load_full())
            .field(
                "perform_precondition",
                &self.perform_precondition().description(),
            )
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_rejects_zero_timeout() {
        let result = IdlingPolicy::builder()
            .with_idle_timeout(Duration::ZERO)
            .fail_hard()
            .build();
        assert!(matches!(
            result,
            Err(SondearError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn builder_rejects_unset_response() {
        let result = IdlingPolicy::builder()
            .with_idle_timeout(Duration::from_secs(1))
            .build();
        assert!(matches!(
            result,
            Err(SondearError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn handle_timeout_dispatches_on_response() {
        let hard = IdlingPolicy::builder()
            .with_idle_timeout(Duration::from_secs(1))
            .fail_hard()
            .build()
            .unwrap();
        assert!(matches!(
            hard.handle_timeout(vec!["net".into()], "busy"),
            Err(SondearError::AppNotIdle { .. })
        ));

        let timeout = hard.to_builder().fail_timeout().build().unwrap();
        assert!(matches!(
            timeout.handle_timeout(vec!["net".into()], "busy"),
            Err(SondearError::IdlingResourceTimeout { .. })
        ));

        let log = hard.to_builder().log_only().build().unwrap();
        assert!(log.handle_timeout(vec!["net".into()], "busy").is_ok());
    }

    #[test]
    fn registry_defaults_match_documented_values() {
        let policies = IdlingPolicies::new();
        assert_eq!(policies.master().idle_timeout(), DEFAULT_MASTER_TIMEOUT);
        assert_eq!(policies.master().response(), ResponseAction::FailHard);
        assert!(policies.master().waits_for_background_tasks());
        assert_eq!(
            policies.resource_error().response(),
            ResponseAction::FailTimeout
        );
        assert_eq!(
            policies.resource_warning().response(),
            ResponseAction::LogOnly
        );
    }

    #[test]
    fn set_timeout_rejects_zero_and_preserves_policy() {
        let policies = IdlingPolicies::new();
        let before = policies.master();
        assert!(policies
            .set_timeout(PolicyKind::Master, Duration::ZERO)
            .is_err());
        assert_eq!(*policies.master(), *before);
    }

    #[test]
    fn set_timeout_preserves_other_fields() {
        let policies = IdlingPolicies::new();
        policies
            .set_timeout(PolicyKind::Master, Duration::from_secs(5))
            .unwrap();
        let master = policies.master();
        assert_eq!(master.idle_timeout(), Duration::from_secs(5));
        assert_eq!(master.response(), ResponseAction::FailHard);
        assert!(master.waits_for_background_tasks());
    }

    #[test]
    fn set_wait_flag_preserves_timeout() {
        let policies = IdlingPolicies::new();
        policies
            .set_timeout(PolicyKind::Master, Duration::from_secs(7))
            .unwrap();
        policies.set_wait_for_background_tasks(false);
        let master = policies.master();
        assert!(!master.waits_for_background_tasks());
        assert_eq!(master.idle_timeout(), Duration::from_secs(7));
    }

    #[test]
    fn perform_precondition_defaults_to_displayed_and_swaps() {
        use crate::matcher::any_node;

        let policies = IdlingPolicies::new();
        assert_eq!(policies.perform_precondition().description(), "is_displayed");
        policies.set_perform_precondition(any_node());
        assert_eq!(policies.perform_precondition().description(), "any_node");
    }

    #[test]
    fn concurrent_reads_never_see_half_updates() {
        use std::sync::atomic::{AtomicBool, Ordering};
        let policies = Arc::new(IdlingPolicies::new());
        let stop = Arc::new(AtomicBool::new(false));

        let reader = {
            let policies = Arc::clone(&policies);
            let stop = Arc::clone(&stop);
            std::thread::spawn(move || {
                while !stop.load(Ordering::Relaxed) {
                    let p = policies.master();
                    // A consistent policy always has a positive timeout and
                    // a response action; builder validation guarantees it.
                    assert!(!p.idle_timeout().is_zero());
                }
            })
        };

        for i in 1..500u64 {
            policies
                .set_timeout(PolicyKind::Master, Duration::from_millis(i))
                .unwrap();
            policies.set_wait_for_background_tasks(i % 2 == 0);
        }
        stop.store(true, Ordering::Relaxed);
        reader.join().unwrap();
    }
}
