//! Rectangle value type and exact occlusion arithmetic.
//!
//! Rectangles here are snapshots: once read from a node they never alias the
//! node's live geometry. All occlusion math is an exact tiling decomposition,
//! not an approximation.

use serde::{Deserialize, Serialize};

/// An axis-aligned rectangle with integer edges.
///
/// The rectangle covers `left..right` horizontally and `top..bottom`
/// vertically; it is empty when either span is non-positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rect {
    /// Left edge (inclusive)
    pub left: i32,
    /// Top edge (inclusive)
    pub top: i32,
    /// Right edge (exclusive)
    pub right: i32,
    /// Bottom edge (exclusive)
    pub bottom: i32,
}

impl Rect {
    /// Create a rectangle from its four edges
    #[must_use]
    pub const fn new(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    /// Width of the rectangle (zero when empty)
    #[must_use]
    pub const fn width(&self) -> i64 {
        let w = self.right as i64 - self.left as i64;
        if w > 0 {
            w
        } else {
            0
        }
    }

    /// Height of the rectangle (zero when empty)
    #[must_use]
    pub const fn height(&self) -> i64 {
        let h = self.bottom as i64 - self.top as i64;
        if h > 0 {
            h
        } else {
            0
        }
    }

    /// Area covered by the rectangle
    #[must_use]
    pub const fn area(&self) -> i64 {
        self.width() * self.height()
    }

    /// Whether the rectangle covers no area
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.right <= self.left || self.bottom <= self.top
    }

    /// Whether `other` lies entirely within this rectangle
    #[must_use]
    pub fn contains(&self, other: &Rect) -> bool {
        !other.is_empty()
            && self.left <= other.left
            && self.top <= other.top
            && self.right >= other.right
            && self.bottom >= other.bottom
    }

    /// Intersection of two rectangles, or `None` when they do not overlap
    #[must_use]
    pub fn intersect(&self, other: &Rect) -> Option<Rect> {
        let r = Rect::new(
            self.left.max(other.left),
            self.top.max(other.top),
            self.right.min(other.right),
            self.bottom.min(other.bottom),
        );
        if r.is_empty() {
            None
        } else {
            Some(r)
        }
    }

    /// Subtract `cutout` from this rectangle, returning the 0-4 rectangles
    /// that tile the remaining area.
    ///
    /// The cutout is first clipped to this rectangle. The pieces are emitted
    /// as a top strip, a bottom strip, and left/right strips spanning only
    /// the cutout's vertical extent, so they never overlap each other and
    /// their areas sum to exactly `self.area() - intersection.area()`. The
    /// piece count follows from which clipped-cutout edges coincide with this
    /// rectangle's edges: all four (full containment) leaves nothing, three
    /// leave one piece, and so on down to zero shared edges, which leaves a
    /// four-piece frame around an interior cutout.
    #[must_use]
    pub fn subtract(&self, cutout: &Rect) -> Vec<Rect> {
        let Some(cut) = self.intersect(cutout) else {
            return vec![*self];
        };
        if cut == *self {
            return Vec::new();
        }

        let mut pieces = Vec::with_capacity(4);
        if cut.top > self.top {
            pieces.push(Rect::new(self.left, self.top, self.right, cut.top));
        }
        if cut.bottom < self.bottom {
            pieces.push(Rect::new(self.left, cut.bottom, self.right, self.bottom));
        }
        if cut.left > self.left {
            pieces.push(Rect::new(self.left, cut.top, cut.left, cut.bottom));
        }
        if cut.right < self.right {
            pieces.push(Rect::new(cut.right, cut.top, self.right, cut.bottom));
        }
        pieces
    }
}

impl std::fmt::Display for Rect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "({}, {})-({}, {})",
            self.left, self.top, self.right, self.bottom
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn empty_rects() {
        assert!(Rect::new(0, 0, 0, 10).is_empty());
        assert!(Rect::new(5, 5, 3, 10).is_empty());
        assert!(!Rect::new(0, 0, 1, 1).is_empty());
        assert_eq!(Rect::new(5, 5, 3, 10).area(), 0);
    }

    #[test]
    fn intersect_disjoint_is_none() {
        let a = Rect::new(0, 0, 10, 10);
        let b = Rect::new(20, 20, 30, 30);
        assert_eq!(a.intersect(&b), None);
        // Edge-touching rectangles share no area.
        assert_eq!(a.intersect(&Rect::new(10, 0, 20, 10)), None);
    }

    #[test]
    fn intersect_overlapping() {
        let a = Rect::new(0, 0, 10, 10);
        let b = Rect::new(5, 5, 15, 15);
        assert_eq!(a.intersect(&b), Some(Rect::new(5, 5, 10, 10)));
    }

    #[test]
    fn subtract_disjoint_returns_start() {
        let a = Rect::new(0, 0, 10, 10);
        assert_eq!(a.subtract(&Rect::new(50, 50, 60, 60)), vec![a]);
    }

    #[test]
    fn subtract_full_cover_returns_nothing() {
        let a = Rect::new(0, 0, 100, 100);
        assert!(a.subtract(&Rect::new(0, 0, 100, 100)).is_empty());
        assert!(a.subtract(&Rect::new(-10, -10, 110, 110)).is_empty());
    }

    #[test]
    fn subtract_three_edges_shared_leaves_one_strip() {
        let a = Rect::new(0, 0, 100, 100);
        // Cutout is the bottom half: only the top strip survives.
        let pieces = a.subtract(&Rect::new(0, 50, 100, 100));
        assert_eq!(pieces, vec![Rect::new(0, 0, 100, 50)]);
    }

    #[test]
    fn subtract_corner_leaves_two_pieces() {
        let a = Rect::new(0, 0, 100, 100);
        // Occluder over the top-right quarter leaves 75% of the area.
        let pieces = a.subtract(&Rect::new(50, 0, 150, 50));
        let total: i64 = pieces.iter().map(Rect::area).sum();
        assert_eq!(pieces.len(), 2);
        assert_eq!(total, 7500);
    }

    #[test]
    fn subtract_cleaving_cut_leaves_two_pieces() {
        let a = Rect::new(0, 0, 100, 100);
        // Vertical band through the middle, full height.
        let pieces = a.subtract(&Rect::new(40, 0, 60, 100));
        assert_eq!(
            pieces,
            vec![Rect::new(0, 0, 40, 100), Rect::new(60, 0, 100, 100)]
        );
    }

    #[test]
    fn subtract_one_edge_shared_leaves_three_pieces() {
        let a = Rect::new(0, 0, 100, 100);
        let pieces = a.subtract(&Rect::new(20, 0, 80, 50));
        assert_eq!(pieces.len(), 3);
        let total: i64 = pieces.iter().map(Rect::area).sum();
        assert_eq!(total, 10_000 - 60 * 50);
    }

    #[test]
    fn subtract_interior_cutout_leaves_frame() {
        let a = Rect::new(0, 0, 100, 100);
        let pieces = a.subtract(&Rect::new(25, 25, 75, 75));
        assert_eq!(pieces.len(), 4);
        let total: i64 = pieces.iter().map(Rect::area).sum();
        assert_eq!(total, 10_000 - 2500);
        for (i, p) in pieces.iter().enumerate() {
            for q in &pieces[i + 1..] {
                assert_eq!(p.intersect(q), None, "pieces {p} and {q} overlap");
            }
        }
    }

    fn rect_strategy() -> impl Strategy<Value = Rect> {
        (0i32..200, 0i32..200, 1i32..100, 1i32..100)
            .prop_map(|(l, t, w, h)| Rect::new(l, t, l + w, t + h))
    }

    proptest! {
        /// Pieces tile exactly: areas sum to target minus intersection.
        #[test]
        fn prop_subtract_exact_area(target in rect_strategy(), cutout in rect_strategy()) {
            let removed = target.intersect(&cutout).map_or(0, |r| r.area());
            let total: i64 = target.subtract(&cutout).iter().map(Rect::area).sum();
            prop_assert_eq!(total, target.area() - removed);
        }

        /// Pieces never overlap each other.
        #[test]
        fn prop_subtract_disjoint_pieces(target in rect_strategy(), cutout in rect_strategy()) {
            let pieces = target.subtract(&cutout);
            for (i, p) in pieces.iter().enumerate() {
                for q in &pieces[i + 1..] {
                    prop_assert!(p.intersect(q).is_none());
                }
            }
        }

        /// Pieces stay inside the target and clear of the cutout.
        #[test]
        fn prop_subtract_containment(target in rect_strategy(), cutout in rect_strategy()) {
            for p in target.subtract(&cutout) {
                prop_assert!(!p.is_empty());
                prop_assert!(target.contains(&p));
                prop_assert!(p.intersect(&cutout).is_none());
            }
        }

        /// Piece count is always 0..=4.
        #[test]
        fn prop_subtract_piece_count(target in rect_strategy(), cutout in rect_strategy()) {
            prop_assert!(target.subtract(&cutout).len() <= 4);
        }
    }
}
