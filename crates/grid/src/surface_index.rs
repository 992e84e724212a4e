//! Nearest-neighbour indices over a compartment's surface.
//!
//! [`SurfaceIndex`] answers "closest sample and its normal"; [`FaceIndex`]
//! answers "closest point on the mesh", which the distance field needs on
//! large flat faces where the nearest sample can be far away.

use rstar::primitives::{GeomWithData, Rectangle};
use rstar::{RTree, AABB};
use u_cellpack_core::geometry::{closest_point_on_triangle, Pt3, TriangleMesh, Vec3};
use u_cellpack_core::{Error, Result};

type Sample = GeomWithData<[f64; 3], usize>;
type FaceBox = GeomWithData<Rectangle<[f64; 3]>, usize>;

/// Nearest surface sample with its normal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SurfaceHit {
    /// Index into the sample list.
    pub index: usize,
    /// Sample position.
    pub point: Pt3,
    /// Outward unit normal at the sample.
    pub normal: Vec3,
    /// Euclidean distance from the query point.
    pub distance: f64,
}

/// R-tree over surface sample points.
#[derive(Debug, Clone)]
pub struct SurfaceIndex {
    tree: RTree<Sample>,
    points: Vec<Pt3>,
    normals: Vec<Vec3>,
}

impl SurfaceIndex {
    /// Bulk loads the index. `points` and `normals` must be parallel.
    pub fn new(points: Vec<Pt3>, normals: Vec<Vec3>) -> Result<Self> {
        if points.len() != normals.len() {
            return Err(Error::InvalidMesh(format!(
                "{} surface samples but {} normals",
                points.len(),
                normals.len()
            )));
        }
        let entries = points
            .iter()
            .enumerate()
            .map(|(i, p)| GeomWithData::new([p.x, p.y, p.z], i))
            .collect();
        Ok(Self {
            tree: RTree::bulk_load(entries),
            points,
            normals,
        })
    }

    /// Number of samples.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// True when there are no samples.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Sample positions.
    pub fn points(&self) -> &[Pt3] {
        &self.points
    }

    /// Sample normals.
    pub fn normals(&self) -> &[Vec3] {
        &self.normals
    }

    /// Closest sample to `p`.
    pub fn nearest(&self, p: &Pt3) -> Option<SurfaceHit> {
        let hit = self.tree.nearest_neighbor(&[p.x, p.y, p.z])?;
        let index = hit.data;
        let point = self.points[index];
        Some(SurfaceHit {
            index,
            point,
            normal: self.normals[index],
            distance: (point - p).norm(),
        })
    }

    /// Indices of samples within `radius` of `p`, ascending.
    pub fn within(&self, p: &Pt3, radius: f64) -> Vec<usize> {
        let envelope = AABB::from_corners(
            [p.x - radius, p.y - radius, p.z - radius],
            [p.x + radius, p.y + radius, p.z + radius],
        );
        let r2 = radius * radius;
        let mut out: Vec<usize> = self
            .tree
            .locate_in_envelope_intersecting(&envelope)
            .map(|s| s.data)
            .filter(|&i| (self.points[i] - p).norm_squared() <= r2)
            .collect();
        out.sort_unstable();
        out
    }
}

/// Closest point on a mesh.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FaceHit {
    /// Face index.
    pub face: usize,
    /// Closest point on that face.
    pub point: Pt3,
    /// Euclidean distance from the query point.
    pub distance: f64,
}

/// R-tree over the bounding boxes of a mesh's faces.
#[derive(Debug, Clone)]
pub struct FaceIndex {
    tree: RTree<FaceBox>,
    mesh: TriangleMesh,
}

impl FaceIndex {
    /// Bulk loads the face boxes of `mesh`.
    pub fn new(mesh: &TriangleMesh) -> Self {
        let entries = (0..mesh.faces.len())
            .map(|f| {
                let (a, b, c) = mesh.triangle(f);
                let (lo, hi) = (a.inf(b).inf(c), a.sup(b).sup(c));
                GeomWithData::new(
                    Rectangle::from_corners([lo.x, lo.y, lo.z], [hi.x, hi.y, hi.z]),
                    f,
                )
            })
            .collect();
        Self {
            tree: RTree::bulk_load(entries),
            mesh: mesh.clone(),
        }
    }

    /// Number of faces.
    pub fn len(&self) -> usize {
        self.mesh.faces.len()
    }

    /// True for a mesh without faces.
    pub fn is_empty(&self) -> bool {
        self.mesh.faces.is_empty()
    }

    /// Closest point on any face to `p`.
    ///
    /// Faces are visited by box distance, which bounds the face distance
    /// from below, so the walk stops once no box can beat the best hit.
    pub fn nearest(&self, p: &Pt3) -> Option<FaceHit> {
        let mut best: Option<FaceHit> = None;
        for (entry, box_d2) in self.tree.nearest_neighbor_iter_with_distance_2(&[p.x, p.y, p.z]) {
            if let Some(hit) = &best {
                if box_d2 > hit.distance * hit.distance {
                    break;
                }
            }
            let (a, b, c) = self.mesh.triangle(entry.data);
            let point = closest_point_on_triangle(p, a, b, c);
            let distance = (point - p).norm();
            if best.map_or(true, |hit| distance < hit.distance) {
                best = Some(FaceHit {
                    face: entry.data,
                    point,
                    distance,
                });
            }
        }
        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn index() -> SurfaceIndex {
        SurfaceIndex::new(
            vec![Pt3::new(0.0, 0.0, 0.0), Pt3::new(10.0, 0.0, 0.0)],
            vec![Vec3::x(), -Vec3::x()],
        )
        .unwrap()
    }

    #[test]
    fn test_nearest() {
        let idx = index();
        let hit = idx.nearest(&Pt3::new(8.0, 1.0, 0.0)).unwrap();
        assert_eq!(hit.index, 1);
        assert_eq!(hit.normal, -Vec3::x());
        assert_relative_eq!(hit.distance, 5f64.sqrt());
    }

    #[test]
    fn test_within() {
        let idx = index();
        assert_eq!(idx.within(&Pt3::new(5.0, 0.0, 0.0), 5.0), vec![0, 1]);
        assert_eq!(idx.within(&Pt3::new(1.0, 0.0, 0.0), 2.0), vec![0]);
    }

    #[test]
    fn test_mismatched_lengths() {
        let r = SurfaceIndex::new(vec![Pt3::origin()], Vec::new());
        assert!(matches!(r, Err(Error::InvalidMesh(_))));
    }

    #[test]
    fn test_face_distance_on_flat_face() {
        let cube = TriangleMesh::cube(Pt3::origin(), 500.0);
        let faces = FaceIndex::new(&cube);
        assert_eq!(faces.len(), 12);

        // far from every vertex, close to the +z face
        let hit = faces.nearest(&Pt3::new(0.0, 0.0, 450.0)).unwrap();
        assert_relative_eq!(hit.distance, 50.0, epsilon = 1e-9);
        assert_relative_eq!(hit.point.z, 500.0, epsilon = 1e-9);

        let samples = SurfaceIndex::new(cube.vertices.clone(), cube.normals.clone()).unwrap();
        assert!(samples.nearest(&Pt3::new(0.0, 0.0, 450.0)).unwrap().distance > 700.0);

        let outside = faces.nearest(&Pt3::new(520.0, 530.0, 0.0)).unwrap();
        assert_relative_eq!(outside.distance, (20.0f64 * 20.0 + 30.0 * 30.0).sqrt(), epsilon = 1e-9);
    }

    #[test]
    fn test_empty_index() {
        let idx = SurfaceIndex::new(Vec::new(), Vec::new()).unwrap();
        assert!(idx.is_empty());
        assert!(idx.nearest(&Pt3::origin()).is_none());
    }
}
