//! An in-memory element tree for tests and examples.
//!
//! [`FakeTree`] plays the role of the UI toolkit adapter: it owns a mutable
//! tree of [`FakeNode`]s, exposes it through the [`ElementTree`] / [`Node`]
//! collaborator traits, and fires change listeners on structural mutation.
//! `set_text` deliberately does *not* notify — it models a property mutation
//! without a layout pass, which waits must catch via their bounded poll.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use crate::geometry::Rect;
use crate::result::SondearResult;
use crate::tree::{ChangeListener, ElementTree, Node, NodeId, NodeRef, Subscription};

/// Default screen rectangle for a fake tree
pub const DEFAULT_SCREEN: Rect = Rect::new(0, 0, 800, 600);

struct NodeInner {
    id: NodeId,
    tree: Weak<TreeInner>,
    node_type: String,
    text: Mutex<Option<String>>,
    tag: Mutex<Option<String>>,
    shown: AtomicBool,
    frame: Mutex<Rect>,
    parent: Mutex<Weak<NodeInner>>,
    children: Mutex<Vec<Arc<NodeInner>>>,
}

impl NodeInner {
    fn root_id(self: &Arc<Self>) -> NodeId {
        let mut current = Arc::clone(self);
        loop {
            let parent = current.parent.lock().expect("fake node poisoned").upgrade();
            match parent {
                Some(parent) => current = parent,
                None => return current.id,
            }
        }
    }

    fn notify_structural_change(self: &Arc<Self>) {
        if let Some(tree) = self.tree.upgrade() {
            tree.notify_root(self.root_id());
        }
    }
}

struct TreeInner {
    next_id: AtomicU64,
    next_token: AtomicU64,
    screen: Mutex<Rect>,
    roots: Mutex<Vec<Arc<NodeInner>>>,
    listeners: Mutex<HashMap<NodeId, Vec<(u64, ChangeListener)>>>,
}

impl TreeInner {
    fn notify_root(&self, root: NodeId) {
        let fired: Vec<ChangeListener> = {
            let listeners = self.listeners.lock().expect("fake tree poisoned");
            listeners
                .get(&root)
                .map(|entries| entries.iter().map(|(_, l)| Arc::clone(l)).collect())
                .unwrap_or_default()
        };
        for listener in fired {
            listener();
        }
    }

    fn notify_all(&self) {
        let fired: Vec<ChangeListener> = {
            let listeners = self.listeners.lock().expect("fake tree poisoned");
            listeners
                .values()
                .flatten()
                .map(|(_, l)| Arc::clone(l))
                .collect()
        };
        for listener in fired {
            listener();
        }
    }
}

/// A mutable in-memory element tree
#[derive(Clone)]
pub struct FakeTree {
    inner: Arc<TreeInner>,
}

impl Default for FakeTree {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeTree {
    /// Create an empty tree with the default screen rectangle
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(TreeInner {
                next_id: AtomicU64::new(1),
                next_token: AtomicU64::new(1),
                screen: Mutex::new(DEFAULT_SCREEN),
                roots: Mutex::new(Vec::new()),
                listeners: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Replace the screen rectangle used for on-screen clipping
    pub fn set_screen(&self, screen: Rect) {
        *self.inner.screen.lock().expect("fake tree poisoned") = screen;
    }

    /// Create a detached node of the given toolkit type
    #[must_use]
    pub fn node(&self, node_type: impl Into<String>) -> FakeNode {
        let id = NodeId(self.inner.next_id.fetch_add(1, Ordering::SeqCst));
        FakeNode {
            inner: Arc::new(NodeInner {
                id,
                tree: Arc::downgrade(&self.inner),
                node_type: node_type.into(),
                text: Mutex::new(None),
                tag: Mutex::new(None),
                shown: AtomicBool::new(true),
                frame: Mutex::new(Rect::new(0, 0, 0, 0)),
                parent: Mutex::new(Weak::new()),
                children: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Attach a node as a new root; wakes every registered listener, since a
    /// new root is a structural change any waiter may care about
    pub fn add_root(&self, node: &FakeNode) {
        self.inner
            .roots
            .lock()
            .expect("fake tree poisoned")
            .push(Arc::clone(&node.inner));
        self.inner.notify_all();
    }

    /// Number of currently registered change listeners (test support)
    #[must_use]
    pub fn live_listener_count(&self) -> usize {
        self.inner
            .listeners
            .lock()
            .expect("fake tree poisoned")
            .values()
            .map(Vec::len)
            .sum()
    }
}

impl ElementTree for FakeTree {
    fn roots(&self) -> Vec<NodeRef> {
        self.inner
            .roots
            .lock()
            .expect("fake tree poisoned")
            .iter()
            .map(|inner| wrap(inner))
            .collect()
    }

    fn subscribe(&self, root: &NodeRef, listener: ChangeListener) -> SondearResult<Subscription> {
        let root_id = root.id();
        let token = self.inner.next_token.fetch_add(1, Ordering::SeqCst);
        self.inner
            .listeners
            .lock()
            .expect("fake tree poisoned")
            .entry(root_id)
            .or_default()
            .push((token, listener));

        let tree = Arc::downgrade(&self.inner);
        Ok(Subscription::new(move || {
            if let Some(tree) = tree.upgrade() {
                let mut listeners = tree.listeners.lock().expect("fake tree poisoned");
                if let Some(entries) = listeners.get_mut(&root_id) {
                    entries.retain(|(t, _)| *t != token);
                    if entries.is_empty() {
                        listeners.remove(&root_id);
                    }
                }
            }
        }))
    }
}

impl std::fmt::Debug for FakeTree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FakeTree")
            .field("roots", &self.inner.roots.lock().expect("poisoned").len())
            .field("listeners", &self.live_listener_count())
            .finish()
    }
}

fn wrap(inner: &Arc<NodeInner>) -> NodeRef {
    Arc::new(FakeNode {
        inner: Arc::clone(inner),
    })
}

/// A node in a [`FakeTree`]
#[derive(Clone)]
pub struct FakeNode {
    inner: Arc<NodeInner>,
}

impl FakeNode {
    /// View this node through the collaborator trait
    #[must_use]
    pub fn as_node(&self) -> NodeRef {
        wrap(&self.inner)
    }

    /// Builder: set the text content
    #[must_use]
    pub fn with_text(self, text: impl Into<String>) -> Self {
        *self.inner.text.lock().expect("fake node poisoned") = Some(text.into());
        self
    }

    /// Builder: set the test tag
    #[must_use]
    pub fn with_tag(self, tag: impl Into<String>) -> Self {
        *self.inner.tag.lock().expect("fake node poisoned") = Some(tag.into());
        self
    }

    /// Builder: set the frame, in absolute coordinates
    #[must_use]
    pub fn with_frame(self, frame: Rect) -> Self {
        *self.inner.frame.lock().expect("fake node poisoned") = frame;
        self
    }

    /// Attach a child; notifies the owning root's listeners
    pub fn add_child(&self, child: &FakeNode) {
        *child.inner.parent.lock().expect("fake node poisoned") =
            Arc::downgrade(&self.inner);
        self.inner
            .children
            .lock()
            .expect("fake node poisoned")
            .push(Arc::clone(&child.inner));
        self.inner.notify_structural_change();
    }

    /// Detach a child; notifies the owning root's listeners
    pub fn remove_child(&self, child: &FakeNode) {
        self.inner
            .children
            .lock()
            .expect("fake node poisoned")
            .retain(|c| c.id != child.inner.id);
        *child.inner.parent.lock().expect("fake node poisoned") = Weak::new();
        self.inner.notify_structural_change();
    }

    /// Replace the text content. Deliberately does not notify listeners: a
    /// text change is a property mutation without a layout pass.
    pub fn set_text(&self, text: impl Into<String>) {
        *self.inner.text.lock().expect("fake node poisoned") = Some(text.into());
    }

    /// Replace the frame; notifies the owning root's listeners
    pub fn set_frame(&self, frame: Rect) {
        *self.inner.frame.lock().expect("fake node poisoned") = frame;
        self.inner.notify_structural_change();
    }

    /// Show or hide this node; notifies the owning root's listeners
    pub fn set_shown(&self, shown: bool) {
        self.inner.shown.store(shown, Ordering::SeqCst);
        self.inner.notify_structural_change();
    }
}

impl Node for FakeNode {
    fn id(&self) -> NodeId {
        self.inner.id
    }

    fn parent(&self) -> Option<NodeRef> {
        self.inner
            .parent
            .lock()
            .expect("fake node poisoned")
            .upgrade()
            .map(|inner| wrap(&inner))
    }

    fn children(&self) -> Vec<NodeRef> {
        self.inner
            .children
            .lock()
            .expect("fake node poisoned")
            .iter()
            .map(|inner| wrap(inner))
            .collect()
    }

    fn frame(&self) -> Rect {
        *self.inner.frame.lock().expect("fake node poisoned")
    }

    fn global_visible_rect(&self) -> Option<Rect> {
        let screen = self
            .inner
            .tree
            .upgrade()
            .map_or(DEFAULT_SCREEN, |tree| {
                *tree.screen.lock().expect("fake tree poisoned")
            });
        self.frame().intersect(&screen)
    }

    fn is_shown(&self) -> bool {
        self.inner.shown.load(Ordering::SeqCst)
    }

    fn node_type(&self) -> String {
        self.inner.node_type.clone()
    }

    fn text(&self) -> Option<String> {
        self.inner.text.lock().expect("fake node poisoned").clone()
    }

    fn tag(&self) -> Option<String> {
        self.inner.tag.lock().expect("fake node poisoned").clone()
    }
}

impl std::fmt::Debug for FakeNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "FakeNode({})", self.as_node().describe())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn structural_mutations_notify_root_listeners() {
        let tree = FakeTree::new();
        let root = tree.node("Root");
        tree.add_root(&root);

        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);
        let _sub = tree
            .subscribe(&root.as_node(), Arc::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }))
            .unwrap();

        let child = tree.node("Child");
        root.add_child(&child);
        child.set_frame(Rect::new(0, 0, 10, 10));
        child.set_shown(false);
        root.remove_child(&child);
        assert_eq!(fired.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn text_mutation_does_not_notify() {
        let tree = FakeTree::new();
        let root = tree.node("Root");
        tree.add_root(&root);
        let label = tree.node("Label");
        root.add_child(&label);

        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);
        let _sub = tree
            .subscribe(&root.as_node(), Arc::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }))
            .unwrap();

        label.set_text("new text");
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn listeners_are_scoped_to_their_root() {
        let tree = FakeTree::new();
        let first = tree.node("First");
        let second = tree.node("Second");
        tree.add_root(&first);
        tree.add_root(&second);

        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);
        let _sub = tree
            .subscribe(&first.as_node(), Arc::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }))
            .unwrap();

        second.add_child(&tree.node("Child"));
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        first.add_child(&tree.node("Child"));
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn new_root_wakes_existing_listeners() {
        let tree = FakeTree::new();
        let first = tree.node("First");
        tree.add_root(&first);

        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);
        let _sub = tree
            .subscribe(&first.as_node(), Arc::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }))
            .unwrap();

        tree.add_root(&tree.node("Second"));
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn global_visible_rect_clips_to_screen() {
        let tree = FakeTree::new();
        let node = tree.node("N").with_frame(Rect::new(700, 500, 900, 700));
        assert_eq!(
            node.as_node().global_visible_rect(),
            Some(Rect::new(700, 500, 800, 600))
        );
        tree.set_screen(Rect::new(0, 0, 640, 480));
        assert_eq!(node.as_node().global_visible_rect(), None);
    }
}
