//! Element-tree collaborator interfaces.
//!
//! The element tree is owned and mutated by the external UI toolkit; this
//! crate only observes it through the [`Node`] and [`ElementTree`] traits.
//! Handles are cheap to clone and safe to move between threads, but the tree
//! behind them may only be touched on the owner thread — that precondition is
//! enforced dynamically by the callers in [`crate::finder`] and
//! [`crate::executor`], not by these types.

use std::collections::VecDeque;
use std::fmt::Write as _;
use std::sync::Arc;

use crate::geometry::Rect;
use crate::result::SondearResult;

/// Stable identity of a node within its tree.
///
/// Two handles refer to the same node exactly when their ids are equal;
/// handle (pointer) identity is not meaningful because adapters may mint a
/// fresh handle per query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u64);

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Shared handle to a node in the externally-owned element tree
pub type NodeRef = Arc<dyn Node>;

/// A node in the element tree, as exposed by the UI toolkit adapter.
pub trait Node: Send + Sync {
    /// Stable identity of this node
    fn id(&self) -> NodeId;

    /// Parent node, if this node is not a root
    fn parent(&self) -> Option<NodeRef>;

    /// Direct children in declaration order (later children paint on top)
    fn children(&self) -> Vec<NodeRef>;

    /// The node's own geometry, in absolute coordinates
    fn frame(&self) -> Rect;

    /// The part of the node's frame that is within the screen, or `None`
    /// when nothing of it is on screen. Snapshot semantics: the returned
    /// value never aliases live geometry.
    fn global_visible_rect(&self) -> Option<Rect>;

    /// The node's own shown/hidden flag, not inherited from ancestors.
    ///
    /// Effective visibility up the ancestor chain is computed by
    /// [`crate::visibility::effective_visibility`].
    fn is_shown(&self) -> bool;

    /// Toolkit type of this node, e.g. `"Button"`
    fn node_type(&self) -> String;

    /// Text content, for nodes that have any
    fn text(&self) -> Option<String> {
        None
    }

    /// Test tag / identifier assigned by the application, if any
    fn tag(&self) -> Option<String> {
        None
    }

    /// One-line human-readable description used in diagnostics
    fn describe(&self) -> String {
        let mut s = format!("{}{}", self.node_type(), self.id());
        if let Some(tag) = self.tag() {
            let _ = write!(s, " tag={tag:?}");
        }
        if let Some(text) = self.text() {
            let _ = write!(s, " text={text:?}");
        }
        let _ = write!(s, " frame={}", self.frame());
        if !self.is_shown() {
            s.push_str(" (hidden)");
        }
        s
    }
}

impl std::fmt::Debug for dyn Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Node({})", self.describe())
    }
}

/// Whether two handles refer to the same tree node
#[must_use]
pub fn same_node(a: &NodeRef, b: &NodeRef) -> bool {
    a.id() == b.id()
}

/// Callback fired by the toolkit when a root's subtree changes structurally
pub type ChangeListener = Arc<dyn Fn() + Send + Sync>;

/// A registered change listener; unregisters itself when dropped.
///
/// Owning the subscription in the waiting frame guarantees release on every
/// exit path of a wait, instead of relying on manual cleanup per branch.
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    /// Wrap an unsubscribe closure
    #[must_use]
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").finish_non_exhaustive()
    }
}

/// The element-tree collaborator: root enumeration plus change notification.
pub trait ElementTree: Send + Sync {
    /// All current root nodes, in stacking order
    fn roots(&self) -> Vec<NodeRef>;

    /// Register a listener fired whenever `root`'s subtree changes
    /// structurally. The listener stays registered until the returned
    /// [`Subscription`] is dropped.
    fn subscribe(&self, root: &NodeRef, listener: ChangeListener) -> SondearResult<Subscription>;
}

/// Breadth-first traversal of one root: the root itself, then all children
/// before any grandchildren, siblings in declaration order.
pub fn breadth_first(root: NodeRef) -> BreadthFirst {
    let mut queue = VecDeque::new();
    queue.push_back(root);
    BreadthFirst { queue }
}

/// Iterator returned by [`breadth_first`]
#[derive(Debug)]
pub struct BreadthFirst {
    queue: VecDeque<NodeRef>,
}

impl Iterator for BreadthFirst {
    type Item = NodeRef;

    fn next(&mut self) -> Option<NodeRef> {
        let node = self.queue.pop_front()?;
        self.queue.extend(node.children());
        Some(node)
    }
}

/// Render the full tree state as an indented listing for failure messages
#[must_use]
pub fn dump_tree(roots: &[NodeRef]) -> String {
    let mut out = String::new();
    for root in roots {
        dump_node(root, 0, &mut out);
    }
    out
}

fn dump_node(node: &NodeRef, depth: usize, out: &mut String) {
    for _ in 0..depth {
        out.push_str("  ");
    }
    out.push_str(&node.describe());
    out.push('\n');
    for child in node.children() {
        dump_node(&child, depth + 1, out);
    }
}
