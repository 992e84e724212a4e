use super::{ambiguity, ClassificationStrategy, Side};
use crate::spatial_grid::SpatialGrid;
use rayon::prelude::*;
use u_cellpack_core::geometry::{Aabb3, Pt3, TriangleMesh, Vec3};
use u_cellpack_core::robust::{segment_triangle_crossing, SegmentCrossing};
use u_cellpack_core::Result;

/// Skewed directions, none parallel to a lattice axis or plane.
const RAY_DIRECTIONS: [[f64; 3]; 3] = [
    [0.573_462, 0.271_891, 0.772_811],
    [-0.312_705, 0.825_119, 0.470_357],
    [0.228_311, -0.521_908, 0.821_860],
];

/// Parity ray casting with exact segment/triangle predicates.
///
/// Two rays must agree; if either is inconclusive (grazing an edge or a
/// vertex) or they disagree, a third is cast and every conclusive ray must
/// agree with at least one other, otherwise the point is ambiguous.
pub struct RayCast<'a> {
    mesh: &'a TriangleMesh,
    face_boxes: Vec<Aabb3>,
    bbox: Aabb3,
    reach: f64,
}

impl<'a> RayCast<'a> {
    /// Precomputes per-face boxes for `mesh`.
    pub fn new(mesh: &'a TriangleMesh) -> Self {
        let face_boxes = (0..mesh.faces.len())
            .map(|f| {
                let (a, b, c) = mesh.triangle(f);
                Aabb3::new(a.inf(b).inf(c), a.sup(b).sup(c))
            })
            .collect();
        let bbox = mesh.bounding_box();
        Self {
            mesh,
            face_boxes,
            bbox,
            reach: 2.0 * bbox.diagonal() + 1.0,
        }
    }

    /// Crossing parity of one ray, `None` when a crossing is degenerate.
    fn cast(&self, p: &Pt3, direction: &Vec3) -> Option<bool> {
        let length = self.reach + (p - self.bbox.center()).norm();
        let q = p + direction * length;
        let seg_box = Aabb3::new(p.inf(&q), p.sup(&q));
        let mut crossings = 0usize;
        for (f, fb) in self.face_boxes.iter().enumerate() {
            if !fb.intersects(&seg_box) {
                continue;
            }
            let (a, b, c) = self.mesh.triangle(f);
            match segment_triangle_crossing(p, &q, a, b, c) {
                SegmentCrossing::Proper => crossings += 1,
                SegmentCrossing::Miss => {}
                SegmentCrossing::Degenerate => return None,
            }
        }
        Some(crossings % 2 == 1)
    }

    /// Classifies one point.
    pub fn classify_point(&self, index: usize, p: &Pt3) -> Result<Side> {
        if !self.bbox.contains_point(p) {
            return Ok(Side::Outside);
        }
        let dirs = RAY_DIRECTIONS.map(|d| Vec3::new(d[0], d[1], d[2]).normalize());
        let first = self.cast(p, &dirs[0]);
        let second = self.cast(p, &dirs[1]);
        let inside = match (first, second) {
            (Some(a), Some(b)) if a == b => a,
            _ => {
                let votes: Vec<bool> = [first, second, self.cast(p, &dirs[2])]
                    .into_iter()
                    .flatten()
                    .collect();
                let agree = votes.len() >= 2 && votes.iter().all(|&v| v == votes[0]);
                if !agree {
                    return Err(ambiguity(
                        index,
                        format!("{} conclusive rays out of 3 do not agree", votes.len()),
                    ));
                }
                votes[0]
            }
        };
        Ok(if inside { Side::Inside } else { Side::Outside })
    }
}

impl ClassificationStrategy for RayCast<'_> {
    fn name(&self) -> &'static str {
        "raycast"
    }

    fn classify(&self, grid: &SpatialGrid, candidates: &[usize]) -> Vec<Result<Side>> {
        let positions = grid.positions();
        candidates
            .par_iter()
            .map(|&i| self.classify_point(i, &positions[i]))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use u_cellpack_core::Error;

    #[test]
    fn test_cube_inside_outside() {
        let mesh = TriangleMesh::cube(Pt3::origin(), 10.0);
        let rc = RayCast::new(&mesh);
        assert_eq!(rc.classify_point(0, &Pt3::new(1.0, 2.0, 3.0)).ok(), Some(Side::Inside));
        assert_eq!(rc.classify_point(0, &Pt3::new(9.5, -9.5, 0.0)).ok(), Some(Side::Inside));
        assert_eq!(rc.classify_point(0, &Pt3::new(11.0, 0.0, 0.0)).ok(), Some(Side::Outside));
        assert_eq!(rc.classify_point(0, &Pt3::new(50.0, 0.0, 0.0)).ok(), Some(Side::Outside));
    }

    #[test]
    fn test_icosphere_agrees_with_winding() {
        let mesh = TriangleMesh::icosphere(Pt3::origin(), 20.0, 2);
        let rc = RayCast::new(&mesh);
        for p in [
            Pt3::new(0.0, 0.0, 0.0),
            Pt3::new(10.0, 5.0, -3.0),
            Pt3::new(19.0, 0.0, 0.0),
            Pt3::new(0.0, 21.0, 0.0),
            Pt3::new(15.0, 15.0, 15.0),
        ] {
            let expect = if mesh.winding_number(&p).abs() > 0.5 {
                Side::Inside
            } else {
                Side::Outside
            };
            assert_eq!(rc.classify_point(0, &p).ok(), Some(expect), "point {p:?}");
        }
    }

    #[test]
    fn test_point_on_face_is_ambiguous_or_resolved() {
        let mesh = TriangleMesh::cube(Pt3::origin(), 10.0);
        let rc = RayCast::new(&mesh);
        match rc.classify_point(7, &Pt3::new(10.0, 1.0, 2.0)) {
            Err(Error::ClassificationAmbiguity { index, .. }) => assert_eq!(index, 7),
            Ok(_) => {}
            Err(e) => panic!("unexpected error {e}"),
        }
    }
}
