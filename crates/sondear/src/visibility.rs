//! On-screen visibility: effective shown/hidden state and the quantitative
//! occlusion computation.
//!
//! Two independent notions live here. *Effective visibility* is the
//! shown/hidden flag inherited down the ancestor chain, regardless of
//! geometry. *Visible percentage* is geometric: how much of the node's own
//! rectangle survives after subtracting everything that paints above it.

use crate::geometry::Rect;
use crate::tree::{same_node, NodeRef};

/// A node's shown/hidden state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    /// The node (and, for effective visibility, all its ancestors) is shown
    Shown,
    /// The node or one of its ancestors is hidden
    Hidden,
}

/// The node's visibility including everything inherited from its ancestors.
///
/// A node is effectively shown only when it and every ancestor up the chain
/// are in the shown state. This is independent of on-screen occlusion area.
#[must_use]
pub fn effective_visibility(node: &NodeRef) -> Visibility {
    if !node.is_shown() {
        return Visibility::Hidden;
    }
    let mut current = node.parent();
    while let Some(ancestor) = current {
        if !ancestor.is_shown() {
            return Visibility::Hidden;
        }
        current = ancestor.parent();
    }
    Visibility::Shown
}

/// Every node that paints above `node`: later siblings at the node's own
/// level, plus the "uncles" later in declaration order at each ancestor
/// level. Later-declared siblings paint on top.
#[must_use]
pub fn potential_covers(node: &NodeRef) -> Vec<NodeRef> {
    let Some(parent) = node.parent() else {
        return Vec::new();
    };

    // Uncles first (outermost levels), then this node's later siblings.
    let mut covers = potential_covers(&parent);
    let mut past_self = false;
    for sibling in parent.children() {
        if past_self {
            covers.push(sibling);
        } else if same_node(&sibling, node) {
            past_self = true;
        }
    }
    covers
}

/// The fraction of the node's own rectangle not occluded by nodes painting
/// above it, as an integer percentage 0..=100.
///
/// Starts from the node's screen-clipped rectangle and iteratively subtracts
/// each cover's rectangle from the working set (an exact tiling, see
/// [`Rect::subtract`]). Covers that are effectively hidden never occlude,
/// even when geometrically overlapping. A node with an empty on-screen
/// rectangle is 0% visible and no occlusion arithmetic runs.
#[must_use]
pub fn visible_percentage(node: &NodeRef) -> u8 {
    let Some(on_screen) = node.global_visible_rect() else {
        return 0;
    };
    if on_screen.is_empty() {
        return 0;
    }
    let own_area = node.frame().area();
    if own_area == 0 {
        return 0;
    }

    let mut surviving = vec![on_screen];
    for cover in potential_covers(node) {
        let Some(cover_rect) = cover.global_visible_rect() else {
            continue;
        };
        if effective_visibility(&cover) == Visibility::Hidden {
            continue;
        }
        surviving = surviving
            .iter()
            .flat_map(|rect| rect.subtract(&cover_rect))
            .collect();
        if surviving.is_empty() {
            break;
        }
    }

    let visible_area: i64 = surviving.iter().map(Rect::area).sum();
    let percentage = ((visible_area as f64 / own_area as f64) * 100.0).round() as i64;
    percentage.clamp(0, 100) as u8
}

/// Whether any part of the node is on screen and it is effectively shown
#[must_use]
pub fn is_displayed(node: &NodeRef) -> bool {
    node.global_visible_rect()
        .is_some_and(|r| !r.is_empty())
        && effective_visibility(node) == Visibility::Shown
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::{FakeNode, FakeTree};

    fn two_layer_tree(occluder_frame: Rect) -> (FakeTree, FakeNode, FakeNode) {
        let tree = FakeTree::new();
        let root = tree.node("Root").with_frame(Rect::new(0, 0, 800, 600));
        let target = tree.node("Target").with_frame(Rect::new(0, 0, 100, 100));
        let occluder = tree.node("Occluder").with_frame(occluder_frame);
        root.add_child(&target);
        root.add_child(&occluder);
        tree.add_root(&root);
        (tree, target, occluder)
    }

    #[test]
    fn fully_covered_target_is_zero_percent() {
        let (_tree, target, _occluder) = two_layer_tree(Rect::new(0, 0, 100, 100));
        assert_eq!(visible_percentage(&target.as_node()), 0);
    }

    #[test]
    fn quarter_covered_target_is_seventy_five_percent() {
        let (_tree, target, _occluder) = two_layer_tree(Rect::new(50, 0, 150, 50));
        assert_eq!(visible_percentage(&target.as_node()), 75);
    }

    #[test]
    fn unobstructed_target_is_fully_visible() {
        let (_tree, target, _occluder) = two_layer_tree(Rect::new(500, 500, 600, 600));
        assert_eq!(visible_percentage(&target.as_node()), 100);
    }

    #[test]
    fn hidden_occluder_does_not_occlude() {
        let (_tree, target, occluder) = two_layer_tree(Rect::new(0, 0, 100, 100));
        occluder.set_shown(false);
        assert_eq!(visible_percentage(&target.as_node()), 100);
    }

    #[test]
    fn occluder_under_hidden_ancestor_does_not_occlude() {
        let tree = FakeTree::new();
        let root = tree.node("Root").with_frame(Rect::new(0, 0, 800, 600));
        let target = tree.node("Target").with_frame(Rect::new(0, 0, 100, 100));
        let panel = tree.node("Panel").with_frame(Rect::new(0, 0, 200, 200));
        let cover = tree.node("Cover").with_frame(Rect::new(0, 0, 100, 100));
        panel.add_child(&cover);
        root.add_child(&target);
        root.add_child(&panel);
        tree.add_root(&root);

        panel.set_shown(false);
        assert_eq!(visible_percentage(&target.as_node()), 100);
    }

    #[test]
    fn earlier_siblings_do_not_occlude() {
        let tree = FakeTree::new();
        let root = tree.node("Root").with_frame(Rect::new(0, 0, 800, 600));
        let below = tree.node("Below").with_frame(Rect::new(0, 0, 100, 100));
        let target = tree.node("Target").with_frame(Rect::new(0, 0, 100, 100));
        root.add_child(&below);
        root.add_child(&target);
        tree.add_root(&root);

        // `below` paints under the later-declared target.
        assert_eq!(visible_percentage(&target.as_node()), 100);
        assert_eq!(visible_percentage(&below.as_node()), 0);
    }

    #[test]
    fn uncle_above_parent_occludes_nephew() {
        let tree = FakeTree::new();
        let root = tree.node("Root").with_frame(Rect::new(0, 0, 800, 600));
        let panel = tree.node("Panel").with_frame(Rect::new(0, 0, 200, 200));
        let target = tree.node("Target").with_frame(Rect::new(0, 0, 100, 100));
        let uncle = tree.node("Uncle").with_frame(Rect::new(0, 0, 100, 50));
        panel.add_child(&target);
        root.add_child(&panel);
        root.add_child(&uncle);
        tree.add_root(&root);

        assert_eq!(visible_percentage(&target.as_node()), 50);
    }

    #[test]
    fn two_covers_subtract_cumulatively() {
        let tree = FakeTree::new();
        let root = tree.node("Root").with_frame(Rect::new(0, 0, 800, 600));
        let target = tree.node("Target").with_frame(Rect::new(0, 0, 100, 100));
        let left = tree.node("Left").with_frame(Rect::new(0, 0, 50, 100));
        let top = tree.node("Top").with_frame(Rect::new(0, 0, 100, 50));
        root.add_child(&target);
        root.add_child(&left);
        root.add_child(&top);
        tree.add_root(&root);

        // Left half plus top half leaves the bottom-right quarter.
        assert_eq!(visible_percentage(&target.as_node()), 25);
    }

    #[test]
    fn off_screen_node_is_zero_without_occlusion_math() {
        let tree = FakeTree::new();
        let root = tree.node("Root").with_frame(Rect::new(0, 0, 800, 600));
        let target = tree
            .node("Target")
            .with_frame(Rect::new(-200, -200, -100, -100));
        root.add_child(&target);
        tree.add_root(&root);

        assert_eq!(visible_percentage(&target.as_node()), 0);
        assert!(!is_displayed(&target.as_node()));
    }

    #[test]
    fn partially_off_screen_node_reports_clipped_share() {
        let tree = FakeTree::new();
        let root = tree.node("Root").with_frame(Rect::new(0, 0, 800, 600));
        // Half the frame hangs off the left screen edge.
        let target = tree.node("Target").with_frame(Rect::new(-50, 0, 50, 100));
        root.add_child(&target);
        tree.add_root(&root);

        assert_eq!(visible_percentage(&target.as_node()), 50);
        assert!(is_displayed(&target.as_node()));
    }

    #[test]
    fn effective_visibility_inherits_from_ancestors() {
        let tree = FakeTree::new();
        let root = tree.node("Root");
        let child = tree.node("Child");
        root.add_child(&child);
        tree.add_root(&root);

        assert_eq!(effective_visibility(&child.as_node()), Visibility::Shown);
        root.set_shown(false);
        assert_eq!(effective_visibility(&child.as_node()), Visibility::Hidden);
        assert!(child.as_node().is_shown(), "own flag is unaffected");
    }
}
