//! Vector, box and triangle primitives shared by the grid and packing crates.
//!
//! # Features
//!
//! - [`Aabb3`]: inclusive axis-aligned box with signed distance queries
//! - Triangle helpers: normals, areas, closest points, ray intersection and
//!   solid angles
//! - [`TriangleMesh`]: validated indexed mesh with vertex normals and a
//!   generalized winding number
//! - Rotation helpers: shortest-arc alignment, axis-angle and uniformly
//!   distributed random rotations

use crate::error::{Error, Result};
use nalgebra::{Point3, Quaternion, Rotation3, Unit, UnitQuaternion, Vector3};
use rand::Rng;
use std::collections::HashMap;
use std::f64::consts::PI;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Tolerance used for inclusive containment tests.
pub const EPSILON: f64 = 1e-9;

/// 3D vector.
pub type Vec3 = Vector3<f64>;

/// 3D point.
pub type Pt3 = Point3<f64>;

/// Rotation matrix.
pub type Rot3 = Rotation3<f64>;

/// Axis-aligned bounding box. All containment tests are inclusive.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Aabb3 {
    /// Minimum corner.
    pub min: Pt3,
    /// Maximum corner.
    pub max: Pt3,
}

impl Aabb3 {
    /// Creates a new box from two corners.
    pub fn new(min: Pt3, max: Pt3) -> Self {
        Self { min, max }
    }

    /// Creates a cube centered on `center`.
    pub fn from_center_half_extent(center: Pt3, half: f64) -> Self {
        let h = Vec3::repeat(half);
        Self::new(center - h, center + h)
    }

    /// Smallest box containing all points. `None` for an empty iterator.
    pub fn from_points<'a, I>(points: I) -> Option<Self>
    where
        I: IntoIterator<Item = &'a Pt3>,
    {
        let mut iter = points.into_iter();
        let first = iter.next()?;
        let mut bb = Self::new(*first, *first);
        for p in iter {
            bb.min = bb.min.inf(p);
            bb.max = bb.max.sup(p);
        }
        Some(bb)
    }

    /// Edge lengths.
    pub fn size(&self) -> Vec3 {
        self.max - self.min
    }

    /// Center point.
    pub fn center(&self) -> Pt3 {
        nalgebra::center(&self.min, &self.max)
    }

    /// Length of the main diagonal.
    pub fn diagonal(&self) -> f64 {
        self.size().norm()
    }

    /// Volume (zero for degenerate boxes).
    pub fn volume(&self) -> f64 {
        let s = self.size();
        (s.x * s.y * s.z).max(0.0)
    }

    /// Total area of the six faces.
    pub fn surface_area(&self) -> f64 {
        let s = self.size();
        2.0 * (s.x * s.y + s.y * s.z + s.x * s.z)
    }

    /// True when any extent is non-positive or non-finite.
    pub fn is_degenerate(&self) -> bool {
        let s = self.size();
        s.iter().any(|v| !v.is_finite() || *v <= 0.0)
    }

    /// Inclusive containment with a small tolerance.
    pub fn contains_point(&self, p: &Pt3) -> bool {
        (0..3).all(|i| p[i] >= self.min[i] - EPSILON && p[i] <= self.max[i] + EPSILON)
    }

    /// Containment in the box shrunk by `margin` on every side.
    pub fn contains_point_with_margin(&self, p: &Pt3, margin: f64) -> bool {
        self.expand(-margin).contains_point(p)
    }

    /// Inclusive overlap test.
    pub fn intersects(&self, other: &Aabb3) -> bool {
        (0..3).all(|i| self.min[i] <= other.max[i] && self.max[i] >= other.min[i])
    }

    /// True when `other` lies entirely inside this box.
    pub fn contains_box(&self, other: &Aabb3) -> bool {
        self.contains_point(&other.min) && self.contains_point(&other.max)
    }

    /// Grows the box by `margin` on all sides. Negative margins shrink it.
    pub fn expand(&self, margin: f64) -> Self {
        let m = Vec3::repeat(margin);
        Self::new(self.min - m, self.max + m)
    }

    /// Smallest box containing both boxes.
    pub fn union(&self, other: &Aabb3) -> Self {
        Self::new(self.min.inf(&other.min), self.max.sup(&other.max))
    }

    /// Euclidean distance from `p` to the box, zero inside.
    pub fn distance_to_point(&self, p: &Pt3) -> f64 {
        let mut d2 = 0.0;
        for i in 0..3 {
            let v = if p[i] < self.min[i] {
                self.min[i] - p[i]
            } else if p[i] > self.max[i] {
                p[i] - self.max[i]
            } else {
                0.0
            };
            d2 += v * v;
        }
        d2.sqrt()
    }

    /// Signed distance: negative inside (distance to the nearest face),
    /// positive outside.
    pub fn signed_distance(&self, p: &Pt3) -> f64 {
        if self.contains_point(p) {
            let mut inner = f64::INFINITY;
            for i in 0..3 {
                inner = inner.min(p[i] - self.min[i]).min(self.max[i] - p[i]);
            }
            -inner.max(0.0)
        } else {
            self.distance_to_point(p)
        }
    }
}

/// Unit normal of a counter-clockwise triangle. Zero for degenerate triangles.
pub fn face_normal(a: &Pt3, b: &Pt3, c: &Pt3) -> Vec3 {
    let n = (b - a).cross(&(c - a));
    let len = n.norm();
    if len > 0.0 {
        n / len
    } else {
        Vec3::zeros()
    }
}

/// Triangle area.
pub fn triangle_area(a: &Pt3, b: &Pt3, c: &Pt3) -> f64 {
    0.5 * (b - a).cross(&(c - a)).norm()
}

/// Closest point on triangle `abc` to `p` (Voronoi region walk).
pub fn closest_point_on_triangle(p: &Pt3, a: &Pt3, b: &Pt3, c: &Pt3) -> Pt3 {
    let ab = b - a;
    let ac = c - a;
    let ap = p - a;
    let d1 = ab.dot(&ap);
    let d2 = ac.dot(&ap);
    if d1 <= 0.0 && d2 <= 0.0 {
        return *a;
    }

    let bp = p - b;
    let d3 = ab.dot(&bp);
    let d4 = ac.dot(&bp);
    if d3 >= 0.0 && d4 <= d3 {
        return *b;
    }

    let vc = d1 * d4 - d3 * d2;
    if vc <= 0.0 && d1 >= 0.0 && d3 <= 0.0 {
        let v = d1 / (d1 - d3);
        return a + ab * v;
    }

    let cp = p - c;
    let d5 = ab.dot(&cp);
    let d6 = ac.dot(&cp);
    if d6 >= 0.0 && d5 <= d6 {
        return *c;
    }

    let vb = d5 * d2 - d1 * d6;
    if vb <= 0.0 && d2 >= 0.0 && d6 <= 0.0 {
        let w = d2 / (d2 - d6);
        return a + ac * w;
    }

    let va = d3 * d6 - d5 * d4;
    if va <= 0.0 && (d4 - d3) >= 0.0 && (d5 - d6) >= 0.0 {
        let w = (d4 - d3) / ((d4 - d3) + (d5 - d6));
        return b + (c - b) * w;
    }

    let denom = 1.0 / (va + vb + vc);
    let v = vb * denom;
    let w = vc * denom;
    a + ab * v + ac * w
}

/// Möller–Trumbore ray/triangle intersection.
///
/// Returns the ray parameter `t > eps` of the hit, or `None`.
pub fn ray_triangle_intersect(
    origin: &Pt3,
    direction: &Vec3,
    a: &Pt3,
    b: &Pt3,
    c: &Pt3,
    eps: f64,
) -> Option<f64> {
    let e1 = b - a;
    let e2 = c - a;
    let h = direction.cross(&e2);
    let det = e1.dot(&h);
    if det.abs() < eps {
        return None;
    }
    let inv = 1.0 / det;
    let s = origin - a;
    let u = inv * s.dot(&h);
    if !(0.0..=1.0).contains(&u) {
        return None;
    }
    let q = s.cross(&e1);
    let v = inv * direction.dot(&q);
    if v < 0.0 || u + v > 1.0 {
        return None;
    }
    let t = inv * e2.dot(&q);
    (t > eps).then_some(t)
}

/// Signed solid angle subtended by triangle `abc` at `p`
/// (Van Oosterom and Strackee).
pub fn solid_angle(p: &Pt3, a: &Pt3, b: &Pt3, c: &Pt3) -> f64 {
    let ra = a - p;
    let rb = b - p;
    let rc = c - p;
    let la = ra.norm();
    let lb = rb.norm();
    let lc = rc.norm();
    let num = ra.dot(&rb.cross(&rc));
    let den = la * lb * lc + ra.dot(&rb) * lc + ra.dot(&rc) * lb + rb.dot(&rc) * la;
    2.0 * num.atan2(den)
}

/// Rotation taking unit direction `from` onto `to` along the shortest arc.
///
/// Antiparallel inputs rotate half a turn about an arbitrary perpendicular axis.
pub fn rotation_between(from: &Vec3, to: &Vec3) -> Rot3 {
    if let Some(r) = Rot3::rotation_between(from, to) {
        return r;
    }
    if from.norm() == 0.0 || to.norm() == 0.0 {
        return Rot3::identity();
    }
    let helper = if from.x.abs() < 0.9 {
        Vec3::x()
    } else {
        Vec3::y()
    };
    let axis = from.cross(&helper);
    Rot3::from_axis_angle(&Unit::new_normalize(axis), PI)
}

/// Rotation of `angle` radians about `axis`. Identity for a zero axis.
pub fn rotation_about_axis(axis: &Vec3, angle: f64) -> Rot3 {
    match Unit::try_new(*axis, 1e-12) {
        Some(unit) => Rot3::from_axis_angle(&unit, angle),
        None => Rot3::identity(),
    }
}

/// Uniformly distributed random rotation (Shoemake's quaternion method).
pub fn random_rotation<R: Rng + ?Sized>(rng: &mut R) -> Rot3 {
    let u1: f64 = rng.gen();
    let u2: f64 = rng.gen();
    let u3: f64 = rng.gen();
    let s1 = (1.0 - u1).sqrt();
    let s2 = u1.sqrt();
    let (a, b) = (2.0 * PI * u2, 2.0 * PI * u3);
    let q = Quaternion::new(s2 * b.cos(), s1 * a.sin(), s1 * a.cos(), s2 * b.sin());
    UnitQuaternion::from_quaternion(q).to_rotation_matrix()
}

/// Indexed triangle mesh with per-vertex normals.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TriangleMesh {
    /// Vertex positions.
    pub vertices: Vec<Pt3>,
    /// Counter-clockwise faces (outward normals).
    pub faces: Vec<[usize; 3]>,
    /// Unit vertex normals, one per vertex.
    pub normals: Vec<Vec3>,
}

impl TriangleMesh {
    /// Builds a mesh and derives area-weighted vertex normals.
    pub fn new(vertices: Vec<Pt3>, faces: Vec<[usize; 3]>) -> Result<Self> {
        let mut mesh = Self {
            normals: Vec::new(),
            vertices,
            faces,
        };
        mesh.validate_topology()?;
        mesh.normals = mesh.compute_vertex_normals();
        Ok(mesh)
    }

    /// Builds a mesh with caller-supplied vertex normals.
    pub fn with_normals(
        vertices: Vec<Pt3>,
        faces: Vec<[usize; 3]>,
        normals: Vec<Vec3>,
    ) -> Result<Self> {
        let mesh = Self {
            vertices,
            faces,
            normals,
        };
        mesh.validate()?;
        Ok(mesh)
    }

    fn validate_topology(&self) -> Result<()> {
        if self.vertices.is_empty() || self.faces.is_empty() {
            return Err(Error::InvalidMesh("mesh has no vertices or faces".into()));
        }
        if let Some(v) = self
            .vertices
            .iter()
            .position(|v| !v.iter().all(|c| c.is_finite()))
        {
            return Err(Error::InvalidMesh(format!("vertex {v} is not finite")));
        }
        let n = self.vertices.len();
        for (fi, f) in self.faces.iter().enumerate() {
            if f.iter().any(|&i| i >= n) {
                return Err(Error::InvalidMesh(format!(
                    "face {fi} references a vertex out of range (vertex count {n})"
                )));
            }
        }
        Ok(())
    }

    /// Checks indices, finiteness and normal count.
    pub fn validate(&self) -> Result<()> {
        self.validate_topology()?;
        if self.normals.len() != self.vertices.len() {
            return Err(Error::InvalidMesh(format!(
                "{} normals for {} vertices",
                self.normals.len(),
                self.vertices.len()
            )));
        }
        Ok(())
    }

    /// Corner positions of face `f`.
    #[inline]
    pub fn triangle(&self, f: usize) -> (&Pt3, &Pt3, &Pt3) {
        let [a, b, c] = self.faces[f];
        (&self.vertices[a], &self.vertices[b], &self.vertices[c])
    }

    /// Bounding box of all vertices.
    pub fn bounding_box(&self) -> Aabb3 {
        Aabb3::from_points(&self.vertices)
            .unwrap_or_else(|| Aabb3::new(Pt3::origin(), Pt3::origin()))
    }

    /// Unit normal of every face.
    pub fn face_normals(&self) -> Vec<Vec3> {
        (0..self.faces.len())
            .map(|f| {
                let (a, b, c) = self.triangle(f);
                face_normal(a, b, c)
            })
            .collect()
    }

    /// Centroid of every face.
    pub fn face_centroids(&self) -> Vec<Pt3> {
        (0..self.faces.len())
            .map(|f| {
                let (a, b, c) = self.triangle(f);
                Pt3::from((a.coords + b.coords + c.coords) / 3.0)
            })
            .collect()
    }

    fn compute_vertex_normals(&self) -> Vec<Vec3> {
        let mut acc = vec![Vec3::zeros(); self.vertices.len()];
        for f in &self.faces {
            let (a, b, c) = (&self.vertices[f[0]], &self.vertices[f[1]], &self.vertices[f[2]]);
            // unnormalized cross product is area weighted
            let n = (b - a).cross(&(c - a));
            for &i in f {
                acc[i] += n;
            }
        }
        acc.into_iter()
            .map(|n| n.try_normalize(1e-18).unwrap_or_else(Vec3::zeros))
            .collect()
    }

    /// Total surface area.
    pub fn surface_area(&self) -> f64 {
        (0..self.faces.len())
            .map(|f| {
                let (a, b, c) = self.triangle(f);
                triangle_area(a, b, c)
            })
            .sum()
    }

    /// Mean of the vertex positions.
    pub fn centroid(&self) -> Pt3 {
        let sum = self
            .vertices
            .iter()
            .fold(Vec3::zeros(), |acc, v| acc + v.coords);
        Pt3::from(sum / self.vertices.len().max(1) as f64)
    }

    /// Generalized winding number at `p`: about 1 inside a closed mesh,
    /// about 0 outside, fractional near holes.
    pub fn winding_number(&self, p: &Pt3) -> f64 {
        let total: f64 = (0..self.faces.len())
            .map(|f| {
                let (a, b, c) = self.triangle(f);
                solid_angle(p, a, b, c)
            })
            .sum();
        total / (4.0 * PI)
    }

    /// Copy of the mesh rotated about the origin, then translated.
    pub fn transformed(&self, rotation: &Rot3, translation: &Vec3) -> Self {
        Self {
            vertices: self
                .vertices
                .iter()
                .map(|v| rotation * v + translation)
                .collect(),
            faces: self.faces.clone(),
            normals: self.normals.iter().map(|n| rotation * n).collect(),
        }
    }

    /// Closed cube with outward winding.
    pub fn cube(center: Pt3, half: f64) -> Self {
        let c = center.coords;
        let vertices = [
            [-1.0, -1.0, -1.0],
            [1.0, -1.0, -1.0],
            [1.0, 1.0, -1.0],
            [-1.0, 1.0, -1.0],
            [-1.0, -1.0, 1.0],
            [1.0, -1.0, 1.0],
            [1.0, 1.0, 1.0],
            [-1.0, 1.0, 1.0],
        ]
        .iter()
        .map(|[x, y, z]| Pt3::from(c + Vec3::new(*x, *y, *z) * half))
        .collect::<Vec<_>>();
        let faces = vec![
            [0, 2, 1],
            [0, 3, 2],
            [4, 5, 6],
            [4, 6, 7],
            [0, 1, 5],
            [0, 5, 4],
            [3, 7, 6],
            [3, 6, 2],
            [0, 4, 7],
            [0, 7, 3],
            [1, 2, 6],
            [1, 6, 5],
        ];
        let mut mesh = Self {
            vertices,
            faces,
            normals: Vec::new(),
        };
        mesh.normals = mesh.compute_vertex_normals();
        mesh
    }

    /// Subdivided icosahedron projected onto a sphere.
    pub fn icosphere(center: Pt3, radius: f64, subdivisions: u32) -> Self {
        let t = (1.0 + 5f64.sqrt()) / 2.0;
        let mut unit: Vec<Vec3> = [
            (-1.0, t, 0.0),
            (1.0, t, 0.0),
            (-1.0, -t, 0.0),
            (1.0, -t, 0.0),
            (0.0, -1.0, t),
            (0.0, 1.0, t),
            (0.0, -1.0, -t),
            (0.0, 1.0, -t),
            (t, 0.0, -1.0),
            (t, 0.0, 1.0),
            (-t, 0.0, -1.0),
            (-t, 0.0, 1.0),
        ]
        .iter()
        .map(|&(x, y, z)| Vec3::new(x, y, z).normalize())
        .collect();
        let mut faces: Vec<[usize; 3]> = vec![
            [0, 11, 5],
            [0, 5, 1],
            [0, 1, 7],
            [0, 7, 10],
            [0, 10, 11],
            [1, 5, 9],
            [5, 11, 4],
            [11, 10, 2],
            [10, 7, 6],
            [7, 1, 8],
            [3, 9, 4],
            [3, 4, 2],
            [3, 2, 6],
            [3, 6, 8],
            [3, 8, 9],
            [4, 9, 5],
            [2, 4, 11],
            [6, 2, 10],
            [8, 6, 7],
            [9, 8, 1],
        ];

        for _ in 0..subdivisions {
            let mut cache: HashMap<(usize, usize), usize> = HashMap::new();
            let mut midpoint = |i: usize, j: usize, unit: &mut Vec<Vec3>| -> usize {
                let key = (i.min(j), i.max(j));
                *cache.entry(key).or_insert_with(|| {
                    let mid = ((unit[i] + unit[j]) * 0.5).normalize();
                    unit.push(mid);
                    unit.len() - 1
                })
            };
            let mut next = Vec::with_capacity(faces.len() * 4);
            for [a, b, c] in faces {
                let ab = midpoint(a, b, &mut unit);
                let bc = midpoint(b, c, &mut unit);
                let ca = midpoint(c, a, &mut unit);
                next.push([a, ab, ca]);
                next.push([b, bc, ab]);
                next.push([c, ca, bc]);
                next.push([ab, bc, ca]);
            }
            faces = next;
        }

        // orient every face outward
        for f in &mut faces {
            let n = (unit[f[1]] - unit[f[0]]).cross(&(unit[f[2]] - unit[f[0]]));
            if n.dot(&(unit[f[0]] + unit[f[1]] + unit[f[2]])) < 0.0 {
                f.swap(1, 2);
            }
        }

        Self {
            vertices: unit
                .iter()
                .map(|u| Pt3::from(center.coords + u * radius))
                .collect(),
            normals: unit,
            faces,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_aabb_basic() {
        let bb = Aabb3::new(Pt3::new(0.0, 0.0, 0.0), Pt3::new(2.0, 4.0, 6.0));
        assert_relative_eq!(bb.volume(), 48.0);
        assert_relative_eq!(bb.surface_area(), 2.0 * (8.0 + 24.0 + 12.0));
        assert_eq!(bb.center(), Pt3::new(1.0, 2.0, 3.0));
        assert!(bb.contains_point(&Pt3::new(2.0, 4.0, 6.0)));
        assert!(!bb.contains_point(&Pt3::new(2.1, 4.0, 6.0)));
        assert!(!bb.is_degenerate());
        assert!(Aabb3::new(Pt3::origin(), Pt3::new(1.0, 0.0, 1.0)).is_degenerate());
    }

    #[test]
    fn test_aabb_signed_distance() {
        let bb = Aabb3::from_center_half_extent(Pt3::origin(), 1.0);
        assert_relative_eq!(bb.signed_distance(&Pt3::origin()), -1.0);
        assert_relative_eq!(bb.signed_distance(&Pt3::new(0.5, 0.0, 0.0)), -0.5);
        assert_relative_eq!(bb.signed_distance(&Pt3::new(3.0, 0.0, 0.0)), 2.0);
        assert_relative_eq!(
            bb.signed_distance(&Pt3::new(2.0, 2.0, 1.0)),
            2f64.sqrt(),
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_aabb_intersects_touching() {
        let a = Aabb3::new(Pt3::origin(), Pt3::new(1.0, 1.0, 1.0));
        let b = Aabb3::new(Pt3::new(1.0, 0.0, 0.0), Pt3::new(2.0, 1.0, 1.0));
        let c = Aabb3::new(Pt3::new(1.5, 0.0, 0.0), Pt3::new(2.0, 1.0, 1.0));
        assert!(a.intersects(&b));
        assert!(!a.intersects(&c));
    }

    #[test]
    fn test_closest_point_regions() {
        let a = Pt3::new(0.0, 0.0, 0.0);
        let b = Pt3::new(1.0, 0.0, 0.0);
        let c = Pt3::new(0.0, 1.0, 0.0);
        let inside = closest_point_on_triangle(&Pt3::new(0.2, 0.2, 5.0), &a, &b, &c);
        assert_relative_eq!(inside, Pt3::new(0.2, 0.2, 0.0), epsilon = 1e-12);
        let vertex = closest_point_on_triangle(&Pt3::new(-1.0, -1.0, 0.0), &a, &b, &c);
        assert_relative_eq!(vertex, a);
        let edge = closest_point_on_triangle(&Pt3::new(1.0, 1.0, 0.0), &a, &b, &c);
        assert_relative_eq!(edge, Pt3::new(0.5, 0.5, 0.0), epsilon = 1e-12);
    }

    #[test]
    fn test_ray_triangle() {
        let a = Pt3::new(0.0, 0.0, 1.0);
        let b = Pt3::new(1.0, 0.0, 1.0);
        let c = Pt3::new(0.0, 1.0, 1.0);
        let hit = ray_triangle_intersect(&Pt3::new(0.2, 0.2, 0.0), &Vec3::z(), &a, &b, &c, 1e-12);
        assert_relative_eq!(hit.unwrap_or(0.0), 1.0, epsilon = 1e-12);
        let miss = ray_triangle_intersect(&Pt3::new(2.0, 2.0, 0.0), &Vec3::z(), &a, &b, &c, 1e-12);
        assert!(miss.is_none());
        let behind =
            ray_triangle_intersect(&Pt3::new(0.2, 0.2, 2.0), &Vec3::z(), &a, &b, &c, 1e-12);
        assert!(behind.is_none());
    }

    #[test]
    fn test_cube_mesh_outward() {
        let mesh = TriangleMesh::cube(Pt3::origin(), 1.0);
        assert!(mesh.validate().is_ok());
        for (n, c) in mesh.face_normals().iter().zip(mesh.face_centroids()) {
            assert!(n.dot(&c.coords) > 0.0);
        }
        assert_relative_eq!(mesh.surface_area(), 24.0, epsilon = 1e-9);
    }

    #[test]
    fn test_winding_number() {
        let mesh = TriangleMesh::cube(Pt3::origin(), 1.0);
        assert_relative_eq!(mesh.winding_number(&Pt3::new(0.1, 0.2, 0.3)).abs(), 1.0, epsilon = 1e-9);
        assert!(mesh.winding_number(&Pt3::new(3.0, 0.0, 0.0)).abs() < 1e-9);

        let sphere = TriangleMesh::icosphere(Pt3::new(5.0, 5.0, 5.0), 2.0, 2);
        assert!(sphere.winding_number(&Pt3::new(5.0, 5.0, 5.0)).abs() > 0.5);
        assert!(sphere.winding_number(&Pt3::new(9.0, 5.0, 5.0)).abs() < 0.5);
    }

    #[test]
    fn test_icosphere_shape() {
        let sphere = TriangleMesh::icosphere(Pt3::origin(), 3.0, 1);
        assert_eq!(sphere.faces.len(), 80);
        for v in &sphere.vertices {
            assert_relative_eq!(v.coords.norm(), 3.0, epsilon = 1e-9);
        }
        assert!(sphere.validate().is_ok());
    }

    #[test]
    fn test_mesh_validation() {
        let bad = TriangleMesh::new(vec![Pt3::origin()], vec![[0, 1, 2]]);
        assert!(matches!(bad, Err(Error::InvalidMesh(_))));
        let empty = TriangleMesh::new(Vec::new(), Vec::new());
        assert!(empty.is_err());
    }

    #[test]
    fn test_rotation_between() {
        let r = rotation_between(&Vec3::x(), &Vec3::y());
        assert_relative_eq!(r * Vec3::x(), Vec3::y(), epsilon = 1e-12);
        let flip = rotation_between(&Vec3::z(), &(-Vec3::z()));
        assert_relative_eq!(flip * Vec3::z(), -Vec3::z(), epsilon = 1e-12);
    }

    #[test]
    fn test_random_rotation_is_proper() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..20 {
            let r = random_rotation(&mut rng);
            assert_relative_eq!(r.matrix().determinant(), 1.0, epsilon = 1e-9);
        }
    }
}
