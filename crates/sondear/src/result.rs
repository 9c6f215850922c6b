//! Result and error types for Sondear.

use std::time::Duration;
use thiserror::Error;

/// Result type for Sondear operations
pub type SondearResult<T> = Result<T, SondearError>;

/// Errors that can occur while driving or querying an element tree
#[derive(Debug, Error)]
pub enum SondearError {
    /// Invalid configuration value (fails fast at the call that set it)
    #[error("Invalid argument: {message}")]
    InvalidArgument {
        /// What was wrong with the argument
        message: String,
    },

    /// A tree query or mutation was attempted off the owner thread
    #[error("'{operation}' must run on the owner thread, was called on thread '{thread}'")]
    WrongThread {
        /// The operation that was attempted
        operation: String,
        /// Name of the offending thread
        thread: String,
    },

    /// No node in the tree matched the selection matcher
    #[error("No node matching '{matcher}' found{hint}\nTree state:\n{tree}", hint = hint.as_deref().unwrap_or(""))]
    NoMatch {
        /// Description of the matcher used
        matcher: String,
        /// Rendering of the tree state at failure time
        tree: String,
        /// Extra guidance, e.g. virtualized containers that may hold the target
        hint: Option<String>,
    },

    /// More than one node matched the selection matcher
    #[error("'{matcher}' matched {count} nodes in the tree; matchers must select exactly one\nTree state:\n{tree}")]
    AmbiguousMatch {
        /// Description of the matcher used
        matcher: String,
        /// Total number of matching nodes
        count: usize,
        /// Rendering of the tree state at failure time
        tree: String,
    },

    /// The owner thread failed to quiesce within the master idling policy
    #[error("Application not idle after {message}; busy resources: {busy:?}")]
    AppNotIdle {
        /// Names of the resources that were still busy
        busy: Vec<String>,
        /// Additional timeout context
        message: String,
    },

    /// A registered idling resource stayed busy past its own policy budget
    #[error("Idling resource(s) {resources:?} failed to become idle within their timeout")]
    IdlingResourceTimeout {
        /// Names of the resources that timed out
        resources: Vec<String>,
    },

    /// An action could not be performed on the matched node
    #[error("Could not perform '{action}' on {node}: {reason}")]
    PerformFailed {
        /// Description of the action
        action: String,
        /// Description of the target node
        node: String,
        /// Why the action was refused or failed
        reason: String,
    },

    /// An assertion on the matched node did not hold
    #[error("Assertion '{assertion}' failed: {reason}")]
    AssertionFailed {
        /// Description of the assertion
        assertion: String,
        /// Why the assertion failed
        reason: String,
    },

    /// A bounded wait expired before its check ever succeeded
    #[error("Wait timed out after {timeout:?}: {source}")]
    WaitTimedOut {
        /// Configured wait timeout
        timeout: Duration,
        /// The last failure captured before the deadline passed
        #[source]
        source: Box<SondearError>,
    },

    /// The owner thread is gone; a blocked caller cannot be resumed
    #[error("Owner thread lost while {context}")]
    OwnerThreadLost {
        /// What the caller was blocked on
        context: String,
    },

    /// A unit of work panicked on the owner thread
    #[error("Task panicked on the owner thread: {message}")]
    TaskPanicked {
        /// Panic payload, when it was a string
        message: String,
    },

    /// I/O error (diagnostic artifact capture)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error (diagnostic artifact capture)
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SondearError {
    /// Shorthand for an [`SondearError::InvalidArgument`]
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Whether this failure classifies as a wait/idle timeout
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Self::AppNotIdle { .. } | Self::IdlingResourceTimeout { .. } | Self::WaitTimedOut { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_match_message_includes_hint_and_tree() {
        let err = SondearError::NoMatch {
            matcher: "with_text(\"Save\")".into(),
            tree: "Root\n  Button".into(),
            hint: Some("\nThe target may be inside a virtualized container".into()),
        };
        let msg = err.to_string();
        assert!(msg.contains("with_text(\"Save\")"));
        assert!(msg.contains("virtualized container"));
        assert!(msg.contains("Button"));
    }

    #[test]
    fn no_match_message_without_hint() {
        let err = SondearError::NoMatch {
            matcher: "with_tag(\"x\")".into(),
            tree: "Root".into(),
            hint: None,
        };
        assert!(!err.to_string().contains("virtualized"));
    }

    #[test]
    fn wait_timed_out_wraps_inner_failure() {
        let inner = SondearError::NoMatch {
            matcher: "m".into(),
            tree: String::new(),
            hint: None,
        };
        let err = SondearError::WaitTimedOut {
            timeout: Duration::from_millis(200),
            source: Box::new(inner),
        };
        assert!(err.to_string().contains("200ms"));
        assert!(err.to_string().contains("No node matching"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn timeout_classification() {
        assert!(SondearError::AppNotIdle {
            busy: vec![],
            message: String::new()
        }
        .is_timeout());
        assert!(!SondearError::invalid_argument("x").is_timeout());
    }
}
