//! Interaction diagnostics: element-tree snapshots and capture hooks.
//!
//! Ahead of every synchronized operation, the driver asks its configured
//! [`DiagnosticCapture`] to record the state of the tree, so a failure can be
//! traced back to what the operation saw. Capture failures are logged and
//! swallowed by the caller; diagnostics must never turn a test outcome into
//! a different one.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::geometry::Rect;
use crate::result::SondearResult;
use crate::tree::{ElementTree, NodeRef};

/// Serializable snapshot of one node and its subtree
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeSnapshot {
    /// Node identity
    pub id: u64,
    /// Toolkit type name
    pub node_type: String,
    /// Text content, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Test tag, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    /// Frame in absolute coordinates
    pub frame: Rect,
    /// Whether the node reports itself as shown
    pub shown: bool,
    /// Child subtrees, in declaration order
    pub children: Vec<NodeSnapshot>,
}

impl NodeSnapshot {
    /// Capture one node and its whole subtree
    #[must_use]
    pub fn of(node: &NodeRef) -> Self {
        Self {
            id: node.id().0,
            node_type: node.node_type(),
            text: node.text(),
            tag: node.tag(),
            frame: node.frame(),
            shown: node.is_shown(),
            children: node.children().iter().map(Self::of).collect(),
        }
    }

    /// Total number of nodes in this subtree, the root included
    #[must_use]
    pub fn node_count(&self) -> usize {
        1 + self
            .children
            .iter()
            .map(NodeSnapshot::node_count)
            .sum::<usize>()
    }
}

/// Serializable snapshot of an entire element tree
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeSnapshot {
    /// Why the snapshot was taken, e.g. `"perform"` or `"wait_for"`
    pub label: String,
    /// Capture time, RFC 3339
    pub captured_at: String,
    /// All roots in stacking order
    pub roots: Vec<NodeSnapshot>,
}

impl TreeSnapshot {
    /// Capture all roots of the tree
    #[must_use]
    pub fn capture(label: impl Into<String>, tree: &dyn ElementTree) -> Self {
        Self {
            label: label.into(),
            captured_at: chrono::Utc::now().to_rfc3339(),
            roots: tree.roots().iter().map(NodeSnapshot::of).collect(),
        }
    }
}

/// Hook recording diagnostic state ahead of each synchronized interaction.
///
/// Implementations run on the interacting thread, not on the owner thread;
/// they must only use the thread-safe tree collaborators.
pub trait DiagnosticCapture: Send + Sync {
    /// Record the current state of `tree` under `label`
    fn capture(&self, label: &str, tree: &dyn ElementTree) -> SondearResult<()>;
}

/// Writes one pretty-printed JSON tree snapshot per capture.
#[derive(Debug, Clone)]
pub struct JsonTreeCapture {
    directory: PathBuf,
}

impl JsonTreeCapture {
    /// Capture into `directory`; the directory is created on first use
    #[must_use]
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    /// Directory the snapshots land in
    #[must_use]
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    fn file_name(label: &str) -> String {
        let safe: String = label
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
            .collect();
        let stamp = chrono::Utc::now().format("%Y%m%dT%H%M%S%3fZ");
        format!("snapshot-{safe}-{stamp}.json")
    }
}

impl DiagnosticCapture for JsonTreeCapture {
    fn capture(&self, label: &str, tree: &dyn ElementTree) -> SondearResult<()> {
        let snapshot = TreeSnapshot::capture(label, tree);
        fs::create_dir_all(&self.directory)?;
        let path = self.directory.join(Self::file_name(label));
        fs::write(&path, serde_json::to_string_pretty(&snapshot)?)?;
        tracing::debug!(path = %path.display(), "wrote tree snapshot");
        Ok(())
    }
}

/// Install a process-wide tracing subscriber filtered by `RUST_LOG`.
///
/// Safe to call more than once; later calls are no-ops.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init();
}
