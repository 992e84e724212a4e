//! Robust geometric predicates for numerical stability.
//!
//! Ray casting against triangle meshes decides inside/outside from the
//! parity of segment/triangle crossings. Near-coplanar configurations are
//! exactly where naive floating-point arithmetic flips signs, so the
//! predicates here use Shewchuk's adaptive precision `orient3d`.
//!
//! ## References
//!
//! - Shewchuk, J.R. (1997). "Adaptive Precision Floating-Point Arithmetic and
//!   Fast Robust Predicates for Computational Geometry"
//! - <https://www.cs.cmu.edu/~quake/robust.html>
//!
//! ## Example
//!
//! ```rust
//! use u_cellpack_core::robust::{orient3d, Orientation3};
//! use u_cellpack_core::geometry::Pt3;
//!
//! let a = Pt3::new(0.0, 0.0, 0.0);
//! let b = Pt3::new(1.0, 0.0, 0.0);
//! let c = Pt3::new(0.0, 1.0, 0.0);
//!
//! assert_eq!(orient3d(&a, &b, &c, &Pt3::new(0.0, 0.0, 1.0)), Orientation3::Above);
//! ```

use crate::geometry::Pt3;
use robust::{orient3d as robust_orient3d, Coord3D};

/// Side of an oriented plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Orientation3 {
    /// On the side the counter-clockwise normal points to.
    Above,
    /// On the opposite side.
    Below,
    /// Exactly on the plane.
    Coplanar,
}

impl Orientation3 {
    /// Returns true for [`Orientation3::Coplanar`].
    #[inline]
    pub fn is_coplanar(self) -> bool {
        matches!(self, Orientation3::Coplanar)
    }

    fn sign(self) -> i8 {
        match self {
            Orientation3::Above => 1,
            Orientation3::Below => -1,
            Orientation3::Coplanar => 0,
        }
    }
}

#[inline]
fn coord(p: &Pt3) -> Coord3D<f64> {
    Coord3D {
        x: p.x,
        y: p.y,
        z: p.z,
    }
}

/// Raw orientation determinant, positive when `pd` lies below the plane
/// through `pa`, `pb`, `pc` (counter-clockwise seen from above).
#[inline]
pub fn orient3d_raw(pa: &Pt3, pb: &Pt3, pc: &Pt3, pd: &Pt3) -> f64 {
    robust_orient3d(coord(pa), coord(pb), coord(pc), coord(pd))
}

/// Side of `pd` relative to the oriented plane `pa`, `pb`, `pc`.
#[inline]
pub fn orient3d(pa: &Pt3, pb: &Pt3, pc: &Pt3, pd: &Pt3) -> Orientation3 {
    let det = orient3d_raw(pa, pb, pc, pd);
    if det < 0.0 {
        Orientation3::Above
    } else if det > 0.0 {
        Orientation3::Below
    } else {
        Orientation3::Coplanar
    }
}

/// Outcome of a segment/triangle crossing test.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentCrossing {
    /// The segment passes through the triangle interior.
    Proper,
    /// No contact.
    Miss,
    /// The segment touches an edge, a vertex, or lies in the triangle plane.
    Degenerate,
}

/// Exact crossing test between segment `pq` and triangle `abc`.
pub fn segment_triangle_crossing(p: &Pt3, q: &Pt3, a: &Pt3, b: &Pt3, c: &Pt3) -> SegmentCrossing {
    let sp = orient3d(a, b, c, p).sign();
    let sq = orient3d(a, b, c, q).sign();

    if sp != 0 && sp == sq {
        return SegmentCrossing::Miss;
    }
    if sp == 0 && sq == 0 {
        return SegmentCrossing::Degenerate;
    }

    let e1 = orient3d(p, q, a, b).sign();
    let e2 = orient3d(p, q, b, c).sign();
    let e3 = orient3d(p, q, c, a).sign();

    let has_pos = e1 > 0 || e2 > 0 || e3 > 0;
    let has_neg = e1 < 0 || e2 < 0 || e3 < 0;
    if has_pos && has_neg {
        return SegmentCrossing::Miss;
    }
    if e1 == 0 || e2 == 0 || e3 == 0 || sp == 0 || sq == 0 {
        return SegmentCrossing::Degenerate;
    }
    SegmentCrossing::Proper
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tri() -> (Pt3, Pt3, Pt3) {
        (
            Pt3::new(0.0, 0.0, 0.0),
            Pt3::new(4.0, 0.0, 0.0),
            Pt3::new(0.0, 4.0, 0.0),
        )
    }

    #[test]
    fn test_orient3d_sides() {
        let (a, b, c) = tri();
        assert_eq!(orient3d(&a, &b, &c, &Pt3::new(1.0, 1.0, 1.0)), Orientation3::Above);
        assert_eq!(orient3d(&a, &b, &c, &Pt3::new(1.0, 1.0, -1.0)), Orientation3::Below);
        assert!(orient3d(&a, &b, &c, &Pt3::new(9.0, -3.0, 0.0)).is_coplanar());
    }

    #[test]
    fn test_orient3d_near_coplanar() {
        let (a, b, c) = tri();
        let tiny = Pt3::new(1.0, 1.0, 1e-300);
        assert_eq!(orient3d(&a, &b, &c, &tiny), Orientation3::Above);
    }

    #[test]
    fn test_segment_crossing_proper() {
        let (a, b, c) = tri();
        let r = segment_triangle_crossing(
            &Pt3::new(1.0, 1.0, -1.0),
            &Pt3::new(1.0, 1.0, 1.0),
            &a,
            &b,
            &c,
        );
        assert_eq!(r, SegmentCrossing::Proper);
    }

    #[test]
    fn test_segment_crossing_miss() {
        let (a, b, c) = tri();
        let beside = segment_triangle_crossing(
            &Pt3::new(5.0, 5.0, -1.0),
            &Pt3::new(5.0, 5.0, 1.0),
            &a,
            &b,
            &c,
        );
        assert_eq!(beside, SegmentCrossing::Miss);
        let above = segment_triangle_crossing(
            &Pt3::new(1.0, 1.0, 1.0),
            &Pt3::new(1.0, 1.0, 2.0),
            &a,
            &b,
            &c,
        );
        assert_eq!(above, SegmentCrossing::Miss);
    }

    #[test]
    fn test_segment_crossing_edge_is_degenerate() {
        let (a, b, c) = tri();
        let r = segment_triangle_crossing(
            &Pt3::new(2.0, 0.0, -1.0),
            &Pt3::new(2.0, 0.0, 1.0),
            &a,
            &b,
            &c,
        );
        assert_eq!(r, SegmentCrossing::Degenerate);
    }

    #[test]
    fn test_segment_endpoint_on_triangle() {
        let (a, b, c) = tri();
        let r = segment_triangle_crossing(
            &Pt3::new(1.0, 1.0, 0.0),
            &Pt3::new(1.0, 1.0, 3.0),
            &a,
            &b,
            &c,
        );
        assert_eq!(r, SegmentCrossing::Degenerate);
    }
}
