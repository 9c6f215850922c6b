//! Element finding: breadth-first search across roots with strict
//! single-match semantics.
//!
//! Ambiguity and no-match are query *outcomes*, carried in [`MatchResult`],
//! never retried here — retry is the caller's responsibility (see
//! `Interaction::wait_for`). The thin [`MatchResult::into_unique`] adapter
//! converts unwanted variants into raised failures only at boundaries whose
//! contract demands it.

use std::fmt::Write as _;
use std::sync::Arc;

use crate::executor::OwnerExecutor;
use crate::matcher::{has_child_count_at_least, MatcherRef};
use crate::result::{SondearError, SondearResult};
use crate::tree::{breadth_first, dump_tree, ElementTree, NodeRef};

/// Containers with this many direct children are reported as possibly
/// virtualizing their content when a query comes up empty.
pub const MANY_CHILDREN_THRESHOLD: usize = 4;

/// Diagnostic context for a query that matched nothing
#[derive(Debug, Clone)]
pub struct NoMatchDiagnostic {
    /// Description of the matcher used
    pub matcher: String,
    /// Rendering of the tree state at query time
    pub tree: String,
    /// Descriptions of container nodes that may virtualize the target
    pub virtualized_containers: Vec<String>,
}

impl NoMatchDiagnostic {
    /// Extra guidance appended to the failure message, when applicable
    #[must_use]
    pub fn hint(&self) -> Option<String> {
        if self.virtualized_containers.is_empty() {
            return None;
        }
        let mut hint = String::from(
            "\nIf the target node is virtualized it may not be part of the tree yet; \
             it could live inside one of these containers:",
        );
        for container in &self.virtualized_containers {
            let _ = write!(hint, "\n- {container}");
        }
        Some(hint)
    }

    /// Convert into the corresponding error
    #[must_use]
    pub fn into_error(self) -> SondearError {
        let hint = self.hint();
        SondearError::NoMatch {
            matcher: self.matcher,
            tree: self.tree,
            hint,
        }
    }
}

/// Diagnostic context for a query that matched more than one node
#[derive(Debug)]
pub struct AmbiguousMatch {
    /// Description of the matcher used
    pub matcher: String,
    /// The first matching node
    pub first: NodeRef,
    /// The second matching node, which proved the ambiguity
    pub second: NodeRef,
    /// Any further matches, exhausted for the diagnostic
    pub others: Vec<NodeRef>,
    /// Rendering of the tree state at query time
    pub tree: String,
}

impl AmbiguousMatch {
    /// Total number of matching nodes
    #[must_use]
    pub fn count(&self) -> usize {
        2 + self.others.len()
    }

    /// Convert into the corresponding error
    #[must_use]
    pub fn into_error(self) -> SondearError {
        let count = self.count();
        SondearError::AmbiguousMatch {
            matcher: self.matcher,
            count,
            tree: self.tree,
        }
    }
}

/// Outcome of one finder query; produced fresh on every call, never cached,
/// because the tree may have mutated since the last query.
#[derive(Debug)]
pub enum MatchResult {
    /// Exactly one node matched
    Unique(NodeRef),
    /// No node matched
    NoMatch(NoMatchDiagnostic),
    /// More than one node matched
    Ambiguous(AmbiguousMatch),
}

impl MatchResult {
    /// Demand the unique match, raising `NoMatch` / `AmbiguousMatch`
    /// otherwise.
    pub fn into_unique(self) -> SondearResult<NodeRef> {
        match self {
            Self::Unique(node) => Ok(node),
            Self::NoMatch(diag) => Err(diag.into_error()),
            Self::Ambiguous(diag) => Err(diag.into_error()),
        }
    }
}

/// Finds the unique node satisfying a matcher across all tree roots.
pub struct ElementFinder {
    matcher: MatcherRef,
    tree: Arc<dyn ElementTree>,
    executor: Arc<OwnerExecutor>,
}

impl ElementFinder {
    /// Create a finder for the given matcher over the given tree
    #[must_use]
    pub fn new(
        matcher: MatcherRef,
        tree: Arc<dyn ElementTree>,
        executor: Arc<OwnerExecutor>,
    ) -> Self {
        Self {
            matcher,
            tree,
            executor,
        }
    }

    /// Run the query. Owner thread only: the element tree must never be read
    /// off its owner thread, and violating calls fail with `WrongThread`
    /// naming the offending thread.
    pub fn find(&self) -> SondearResult<MatchResult> {
        self.executor.check_owner_thread("ElementFinder::find")?;

        let roots = self.tree.roots();
        let mut candidates = roots
            .iter()
            .cloned()
            .flat_map(breadth_first)
            .filter(|node| self.matcher.matches(node));

        let Some(first) = candidates.next() else {
            return Ok(MatchResult::NoMatch(self.diagnose_no_match(&roots)));
        };
        if let Some(second) = candidates.next() {
            // Ambiguous. Exhaust the remainder for the diagnostic, but do
            // no further work beyond reporting it meaningfully.
            let others: Vec<NodeRef> = candidates.collect();
            return Ok(MatchResult::Ambiguous(AmbiguousMatch {
                matcher: self.matcher.description(),
                first,
                second,
                others,
                tree: dump_tree(&roots),
            }));
        }
        Ok(MatchResult::Unique(first))
    }

    fn diagnose_no_match(&self, roots: &[NodeRef]) -> NoMatchDiagnostic {
        let container_shape = has_child_count_at_least(MANY_CHILDREN_THRESHOLD);
        let virtualized_containers: Vec<String> = roots
            .iter()
            .cloned()
            .flat_map(breadth_first)
            .filter(|node| container_shape.matches(node))
            .map(|node| node.describe())
            .collect();
        NoMatchDiagnostic {
            matcher: self.matcher.description(),
            tree: dump_tree(roots),
            virtualized_containers,
        }
    }
}

impl std::fmt::Debug for ElementFinder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ElementFinder")
            .field("matcher", &self.matcher.description())
            .finish_non_exhaustive()
    }
}
