//! Sondear: deterministic UI test synchronization for element trees
//!
//! Sondear (Spanish: "to sound out, to poll") keeps UI tests and the
//! application under test in lockstep: every interaction is marshalled onto
//! the tree's single owner thread, runs only once the app is idle, and
//! resolves its target node fresh at that moment. Timeouts are governed by
//! immutable policies behind a hot-swappable coordinator.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                      SONDEAR Architecture                    │
//! ├──────────────────────────────────────────────────────────────┤
//! │  ┌───────────┐   ┌───────────────┐   ┌────────────────────┐  │
//! │  │ UiDriver  │──►│ OwnerExecutor │──►│ owner thread       │  │
//! │  │ perform / │   │ (sync bridge) │   │  IdleDetector      │  │
//! │  │ check /   │   └───────────────┘   │  ElementFinder     │  │
//! │  │ wait_for  │                       │  actions/asserts   │  │
//! │  └───────────┘                       └────────────────────┘  │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Quick start
//!
//! ```
//! use std::sync::Arc;
//! use sondear::{
//!     matches, with_text, FakeTree, OwnerExecutor, Rect, UiDriver,
//! };
//!
//! let tree = FakeTree::new();
//! let root = tree.node("Root").with_frame(Rect::new(0, 0, 800, 600));
//! root.add_child(&tree.node("Button").with_text("Save"));
//! tree.add_root(&root);
//!
//! let executor = Arc::new(OwnerExecutor::start("ui-owner"));
//! let driver = UiDriver::builder(executor, Arc::new(tree)).build();
//! driver
//!     .on_node(with_text("Save"))
//!     .check(&matches(with_text("Save")))
//!     .unwrap();
//! ```

#![warn(missing_docs)]
// Lints are configured in workspace Cargo.toml [workspace.lints.clippy]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]

mod diagnostics;
mod executor;
pub mod fake;
mod finder;
mod geometry;
mod idle;
mod interaction;
mod matcher;
mod policy;
mod result;
mod tree;
mod visibility;

pub use diagnostics::{
    init_tracing, DiagnosticCapture, JsonTreeCapture, NodeSnapshot, TreeSnapshot,
};
pub use executor::OwnerExecutor;
pub use fake::{FakeNode, FakeTree};
pub use finder::{AmbiguousMatch, ElementFinder, MatchResult, NoMatchDiagnostic};
pub use geometry::Rect;
pub use idle::{
    CountingIdlingResource, IdleDetector, IdlingRegistry, IdlingResource, IDLE_POLL_INTERVAL,
};
pub use interaction::{
    action, assertion, does_not_exist, matches, FailureHandler, Interaction,
    LoggingFailureHandler, NodeAction, NodeAssertion, UiDriver, UiDriverBuilder, POLL_INTERVAL,
};
pub use matcher::{
    all_of, any_node, any_of, has_child_count_at_least, is_completely_displayed, is_displayed,
    is_displaying_at_least, is_not, matcher, with_effective_visibility, with_node_type, with_tag,
    with_text, with_text_containing, MatcherRef, NodeMatcher,
};
pub use policy::{
    IdlingPolicies, IdlingPolicy, IdlingPolicyBuilder, PolicyKind, ResponseAction,
    DEFAULT_MASTER_TIMEOUT, DEFAULT_RESOURCE_ERROR_TIMEOUT, DEFAULT_RESOURCE_WARNING_TIMEOUT,
};
pub use result::{SondearError, SondearResult};
pub use tree::{
    breadth_first, dump_tree, same_node, BreadthFirst, ChangeListener, ElementTree, Node, NodeId,
    NodeRef, Subscription,
};
pub use visibility::{effective_visibility, potential_covers, visible_percentage, Visibility};
