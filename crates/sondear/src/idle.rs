//! Idle detection: draining the owner thread and registered background work.
//!
//! Every synchronized action or check starts here. The detector repeatedly
//! runs queued owner-thread work to completion and polls every registered
//! idling resource, transitioning to idle when one full pass finds the queue
//! empty and every resource idle. Three policy budgets apply, shortest
//! first: a per-resource warning (log only), a per-resource error, and the
//! master "is the app responsive" timeout.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::executor::OwnerExecutor;
use crate::policy::IdlingPolicies;
use crate::result::SondearResult;

/// Pause between detection passes while the owner thread is still busy
pub const IDLE_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// An external collaborator representing pending asynchronous work.
///
/// The idle detector polls resources; resources never push.
pub trait IdlingResource: Send + Sync {
    /// Name used in diagnostics when the resource holds up idleness
    fn name(&self) -> String;

    /// Whether the resource is currently idle
    fn is_idle(&self) -> bool;
}

/// A counter-backed idling resource: busy while the count is above zero.
///
/// Increment when asynchronous work starts, decrement when it completes.
#[derive(Debug)]
pub struct CountingIdlingResource {
    name: String,
    count: std::sync::atomic::AtomicIsize,
}

impl CountingIdlingResource {
    /// Create an idle counter with the given diagnostic name
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            count: std::sync::atomic::AtomicIsize::new(0),
        }
    }

    /// Record that a unit of background work has started
    pub fn increment(&self) {
        self.count
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
    }

    /// Record that a unit of background work has completed
    pub fn decrement(&self) {
        let previous = self
            .count
            .fetch_sub(1, std::sync::atomic::Ordering::SeqCst);
        assert!(
            previous > 0,
            "counter '{}' decremented below zero",
            self.name
        );
    }
}

impl IdlingResource for CountingIdlingResource {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn is_idle(&self) -> bool {
        self.count.load(std::sync::atomic::Ordering::SeqCst) <= 0
    }
}

struct Registered {
    resource: Arc<dyn IdlingResource>,
    busy_since: Option<Instant>,
    warned: bool,
}

/// Registry of idling resources the detector must wait on.
#[derive(Default)]
pub struct IdlingRegistry {
    resources: Mutex<Vec<Registered>>,
}

impl IdlingRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a resource; false when one with the same name already exists
    pub fn register(&self, resource: Arc<dyn IdlingResource>) -> bool {
        let mut resources = self.resources.lock().expect("registry poisoned");
        let name = resource.name();
        if resources.iter().any(|r| r.resource.name() == name) {
            tracing::warn!(resource = %name, "ignoring duplicate idling resource registration");
            return false;
        }
        resources.push(Registered {
            resource,
            busy_since: None,
            warned: false,
        });
        true
    }

    /// Remove a resource by name; false when it was not registered
    pub fn unregister(&self, name: &str) -> bool {
        let mut resources = self.resources.lock().expect("registry poisoned");
        let before = resources.len();
        resources.retain(|r| r.resource.name() != name);
        resources.len() != before
    }

    /// Number of registered resources
    #[must_use]
    pub fn len(&self) -> usize {
        self.resources.lock().expect("registry poisoned").len()
    }

    /// Whether no resources are registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// One polling pass: refresh busy-since tracking and return the state of
    /// every currently busy resource as `(name, busy duration, warned)`.
    /// The `warned` flag is set by [`Self::mark_warned`], once per busy
    /// episode; it resets when the resource goes idle.
    fn poll(&self, now: Instant) -> Vec<(String, Duration, bool)> {
        let mut resources = self.resources.lock().expect("registry poisoned");
        let mut busy = Vec::new();
        for entry in resources.iter_mut() {
            if entry.resource.is_idle() {
                entry.busy_since = None;
                entry.warned = false;
            } else {
                let since = *entry.busy_since.get_or_insert(now);
                busy.push((entry.resource.name(), now - since, entry.warned));
            }
        }
        busy
    }

    fn mark_warned(&self, name: &str) {
        let mut resources = self.resources.lock().expect("registry poisoned");
        if let Some(entry) = resources
            .iter_mut()
            .find(|r| r.resource.name() == name)
        {
            entry.warned = true;
        }
    }
}

impl std::fmt::Debug for IdlingRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdlingRegistry")
            .field("resources", &self.len())
            .finish()
    }
}

/// Drives the owner thread and registered resources to quiescence.
pub struct IdleDetector {
    executor: Arc<OwnerExecutor>,
    registry: Arc<IdlingRegistry>,
    policies: Arc<IdlingPolicies>,
}

impl IdleDetector {
    /// Create a detector over the given executor, registry, and policies
    #[must_use]
    pub fn new(
        executor: Arc<OwnerExecutor>,
        registry: Arc<IdlingRegistry>,
        policies: Arc<IdlingPolicies>,
    ) -> Self {
        Self {
            executor,
            registry,
            policies,
        }
    }

    /// Drain owner-thread work and poll resources until everything is idle
    /// or the active policies say otherwise. Owner thread only.
    ///
    /// A master-policy violation is reported through the master policy's
    /// response action; with `LogOnly` this logs and returns `Ok`, the one
    /// path that gives up without interrupting the caller.
    pub fn loop_until_idle(&self) -> SondearResult<()> {
        self.executor.check_owner_thread("loop_until_idle")?;

        let master = self.policies.master();
        let resource_error = self.policies.resource_error();
        let resource_warning = self.policies.resource_warning();
        let started = Instant::now();

        loop {
            let drained = self.executor.drain_pending()?;

            let busy = if master.waits_for_background_tasks() {
                self.registry.poll(Instant::now())
            } else {
                Vec::new()
            };

            if drained == 0 && busy.is_empty() && !self.executor.has_pending() {
                return Ok(());
            }

            // Per-resource budgets come first, so a single slow resource is
            // diagnosed by name before the coarser master timeout fires.
            for (name, busy_for, warned) in &busy {
                if *busy_for >= resource_error.idle_timeout() {
                    resource_error.handle_timeout(
                        vec![name.clone()],
                        format!("resource busy for {busy_for:?}"),
                    )?;
                } else if !warned && *busy_for >= resource_warning.idle_timeout() {
                    resource_warning.handle_timeout(
                        vec![name.clone()],
                        format!("resource slow, busy for {busy_for:?}"),
                    )?;
                    self.registry.mark_warned(name);
                }
            }

            if started.elapsed() >= master.idle_timeout() {
                let mut names: Vec<String> = busy.iter().map(|(n, _, _)| n.clone()).collect();
                if self.executor.has_pending() {
                    names.push("owner-thread queue".to_string());
                }
                // LogOnly downgrades this to a warning and we give up quietly.
                return master.handle_timeout(
                    names,
                    format!("{:?} (master idle timeout)", master.idle_timeout()),
                );
            }

            // A pass that drained work made progress; re-check immediately
            // and only pause when the queue was already empty.
            if drained == 0 {
                std::thread::sleep(IDLE_POLL_INTERVAL.min(master.idle_timeout()));
            }
        }
    }
}

impl std::fmt::Debug for IdleDetector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdleDetector")
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}
