//! Node matchers: composable predicates with human-readable descriptions.
//!
//! A matcher is a pure function over a node plus a description used in every
//! diagnostic. Matchers must select exactly one node per query; composition
//! via [`all_of`] / [`any_of`] is how callers narrow an ambiguous selection.

use std::sync::Arc;

use crate::tree::NodeRef;
use crate::visibility::{self, Visibility};

/// Shared handle to a matcher
pub type MatcherRef = Arc<dyn NodeMatcher>;

/// A pure predicate over tree nodes with a diagnostic description
pub trait NodeMatcher: Send + Sync {
    /// Whether the node satisfies this matcher
    fn matches(&self, node: &NodeRef) -> bool;

    /// Description used in failure messages, e.g. `with_text("Save")`
    fn description(&self) -> String;
}

impl std::fmt::Debug for dyn NodeMatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "NodeMatcher({})", self.description())
    }
}

struct FnMatcher<F: Fn(&NodeRef) -> bool + Send + Sync> {
    func: F,
    description: String,
}

impl<F: Fn(&NodeRef) -> bool + Send + Sync> NodeMatcher for FnMatcher<F> {
    fn matches(&self, node: &NodeRef) -> bool {
        (self.func)(node)
    }

    fn description(&self) -> String {
        self.description.clone()
    }
}

/// Build a matcher from a function and a description
pub fn matcher(
    description: impl Into<String>,
    func: impl Fn(&NodeRef) -> bool + Send + Sync + 'static,
) -> MatcherRef {
    Arc::new(FnMatcher {
        func,
        description: description.into(),
    })
}

fn describe_all(matchers: &[MatcherRef], joiner: &str) -> String {
    matchers
        .iter()
        .map(|m| m.description())
        .collect::<Vec<_>>()
        .join(joiner)
}

/// Matches every node; the identity element for constraint composition
#[must_use]
pub fn any_node() -> MatcherRef {
    matcher("any_node", |_node| true)
}

/// Matches when every inner matcher matches
pub fn all_of(matchers: Vec<MatcherRef>) -> MatcherRef {
    let description = format!("({})", describe_all(&matchers, " and "));
    matcher(description, move |node| {
        matchers.iter().all(|m| m.matches(node))
    })
}

/// Matches when any inner matcher matches
pub fn any_of(matchers: Vec<MatcherRef>) -> MatcherRef {
    let description = format!("({})", describe_all(&matchers, " or "));
    matcher(description, move |node| {
        matchers.iter().any(|m| m.matches(node))
    })
}

/// Inverts a matcher
pub fn is_not(inner: MatcherRef) -> MatcherRef {
    let description = format!("not {}", inner.description());
    matcher(description, move |node| !inner.matches(node))
}

/// Matches nodes whose text equals `text` exactly
pub fn with_text(text: impl Into<String>) -> MatcherRef {
    let text = text.into();
    let description = format!("with_text({text:?})");
    matcher(description, move |node| {
        node.text().as_deref() == Some(text.as_str())
    })
}

/// Matches nodes whose text contains `fragment`
pub fn with_text_containing(fragment: impl Into<String>) -> MatcherRef {
    let fragment = fragment.into();
    let description = format!("with_text_containing({fragment:?})");
    matcher(description, move |node| {
        node.text().is_some_and(|t| t.contains(&fragment))
    })
}

/// Matches nodes carrying the given test tag
pub fn with_tag(tag: impl Into<String>) -> MatcherRef {
    let tag = tag.into();
    let description = format!("with_tag({tag:?})");
    matcher(description, move |node| {
        node.tag().as_deref() == Some(tag.as_str())
    })
}

/// Matches nodes of the given toolkit type
pub fn with_node_type(node_type: impl Into<String>) -> MatcherRef {
    let node_type = node_type.into();
    let description = format!("with_node_type({node_type:?})");
    matcher(description, move |node| node.node_type() == node_type)
}

/// Matches nodes whose effective visibility equals `visibility`
pub fn with_effective_visibility(visibility: Visibility) -> MatcherRef {
    let description = format!("with_effective_visibility({visibility:?})");
    matcher(description, move |node| {
        visibility::effective_visibility(node) == visibility
    })
}

/// Matches nodes with any positive on-screen area and effectively shown.
///
/// Selects partially displayed nodes too; use [`is_completely_displayed`]
/// when the whole rectangle must be on screen and unobstructed.
pub fn is_displayed() -> MatcherRef {
    matcher("is_displayed", |node| visibility::is_displayed(node))
}

/// Matches nodes whose entire area is displayed to the user
pub fn is_completely_displayed() -> MatcherRef {
    is_displaying_at_least(100)
}

/// Matches nodes with at least `area_percentage` percent of their area not
/// obscured by any other node.
///
/// # Panics
///
/// Panics when `area_percentage` is outside `1..=100`; that is a programming
/// error at the call site, not a query outcome.
pub fn is_displaying_at_least(area_percentage: u8) -> MatcherRef {
    assert!(
        area_percentage > 0 && area_percentage <= 100,
        "area percentage must be within (0, 100], got {area_percentage}"
    );
    let description = format!("is_displaying_at_least({area_percentage})");
    matcher(description, move |node| {
        visibility::visible_percentage(node) >= area_percentage
            && visibility::effective_visibility(node) == Visibility::Shown
    })
}

/// Matches container-shaped nodes with at least `count` direct children.
///
/// Used by the finder to suggest virtualized containers when a query comes
/// up empty.
pub fn has_child_count_at_least(count: usize) -> MatcherRef {
    let description = format!("has_child_count_at_least({count})");
    matcher(description, move |node| node.children().len() >= count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::FakeTree;
    use crate::geometry::Rect;

    fn labelled_tree() -> (FakeTree, NodeRef) {
        let tree = FakeTree::new();
        let root = tree.node("Root").with_frame(Rect::new(0, 0, 800, 600));
        let button = tree
            .node("Button")
            .with_text("Save")
            .with_tag("save-button")
            .with_frame(Rect::new(0, 0, 100, 40));
        root.add_child(&button);
        tree.add_root(&root);
        (tree, button.as_node())
    }

    #[test]
    fn text_and_tag_matchers() {
        let (_tree, button) = labelled_tree();
        assert!(with_text("Save").matches(&button));
        assert!(!with_text("Cancel").matches(&button));
        assert!(with_text_containing("av").matches(&button));
        assert!(with_tag("save-button").matches(&button));
        assert!(with_node_type("Button").matches(&button));
    }

    #[test]
    fn combinators_compose_and_describe() {
        let (_tree, button) = labelled_tree();
        let both = all_of(vec![with_text("Save"), with_node_type("Button")]);
        assert!(both.matches(&button));
        assert_eq!(
            both.description(),
            "(with_text(\"Save\") and with_node_type(\"Button\"))"
        );

        let either = any_of(vec![with_text("Cancel"), with_tag("save-button")]);
        assert!(either.matches(&button));

        assert!(!is_not(with_text("Save")).matches(&button));
        assert!(is_not(with_text("Cancel")).matches(&button));
    }

    #[test]
    fn displayed_matchers_track_visibility() {
        let (_tree, button) = labelled_tree();
        assert!(is_displayed().matches(&button));
        assert!(is_completely_displayed().matches(&button));
        assert!(is_displaying_at_least(50).matches(&button));
        assert!(with_effective_visibility(Visibility::Shown).matches(&button));
    }

    #[test]
    #[should_panic(expected = "area percentage must be within (0, 100]")]
    fn displaying_at_least_rejects_zero() {
        let _ = is_displaying_at_least(0);
    }

    #[test]
    fn child_count_matcher() {
        let tree = FakeTree::new();
        let list = tree.node("List");
        for _ in 0..5 {
            list.add_child(&tree.node("Row"));
        }
        tree.add_root(&list);
        assert!(has_child_count_at_least(5).matches(&list.as_node()));
        assert!(!has_child_count_at_least(6).matches(&list.as_node()));
    }
}
