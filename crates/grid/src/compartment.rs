//! Compartments: bounded sub-volumes that ingredients are assigned to.
//!
//! # Features
//!
//! - Mesh, sphere and axis-aligned box shapes
//! - Surface sampling with normals (vertices plus optional edge and face
//!   subdivision for meshes, Fibonacci points for spheres, face lattices for
//!   boxes)
//! - Flat arena ([`CompartmentTree`]) holding parent ids and child ids, so
//!   ownership runs strictly from the tree to every compartment

use crate::mesh_store::GeometryBackend;
use crate::surface_index::{FaceIndex, SurfaceHit, SurfaceIndex};
use std::collections::{BTreeMap, BTreeSet};
use std::f64::consts::PI;
use std::ops::Range;
use u_cellpack_core::geometry::{face_normal, Aabb3, Pt3, TriangleMesh, Vec3};
use u_cellpack_core::{Error, Result};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Index of a compartment inside its [`CompartmentTree`].
pub type CompartmentId = usize;

/// Geometry bounding a compartment.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum CompartmentShape {
    /// Closed triangle mesh.
    Mesh(TriangleMesh),
    /// Analytic sphere.
    Sphere {
        /// Centre.
        center: Pt3,
        /// Radius.
        radius: f64,
    },
    /// Analytic axis-aligned box.
    Box(Aabb3),
}

impl CompartmentShape {
    /// Bounding box of the shape.
    pub fn bounding_box(&self) -> Aabb3 {
        match self {
            CompartmentShape::Mesh(mesh) => mesh.bounding_box(),
            CompartmentShape::Sphere { center, radius } => {
                Aabb3::from_center_half_extent(*center, *radius)
            }
            CompartmentShape::Box(bb) => *bb,
        }
    }

    /// True for the analytic shapes.
    pub fn is_primitive(&self) -> bool {
        !matches!(self, CompartmentShape::Mesh(_))
    }

    /// Point containment. Meshes use the generalized winding number.
    pub fn contains_point(&self, p: &Pt3) -> bool {
        match self {
            CompartmentShape::Mesh(mesh) => {
                mesh.bounding_box().contains_point(p) && mesh.winding_number(p).abs() > 0.5
            }
            CompartmentShape::Sphere { center, radius } => (p - center).norm() <= *radius,
            CompartmentShape::Box(bb) => bb.contains_point(p),
        }
    }

    /// Surface area.
    pub fn surface_area(&self) -> f64 {
        match self {
            CompartmentShape::Mesh(mesh) => mesh.surface_area(),
            CompartmentShape::Sphere { radius, .. } => 4.0 * PI * radius * radius,
            CompartmentShape::Box(bb) => bb.surface_area(),
        }
    }

    fn validate(&self) -> Result<()> {
        match self {
            CompartmentShape::Mesh(mesh) => mesh.validate(),
            CompartmentShape::Sphere { center, radius } => {
                if radius.is_finite() && *radius > 0.0 && center.iter().all(|c| c.is_finite()) {
                    Ok(())
                } else {
                    Err(Error::Configuration(format!(
                        "sphere compartment radius must be positive, got {radius}"
                    )))
                }
            }
            CompartmentShape::Box(bb) => {
                if bb.is_degenerate() {
                    Err(Error::Configuration(
                        "box compartment is degenerate".into(),
                    ))
                } else {
                    Ok(())
                }
            }
        }
    }
}

/// Surface samples of a shape.
#[derive(Debug, Clone, Default)]
pub struct SurfaceSamples {
    /// Sample positions.
    pub points: Vec<Pt3>,
    /// Outward unit normals.
    pub normals: Vec<Vec3>,
}

impl SurfaceSamples {
    fn push(&mut self, p: Pt3, n: Vec3) {
        self.points.push(p);
        self.normals.push(n);
    }
}

/// Samples `shape`'s surface roughly every `max_length` units.
///
/// Mesh samples are the vertices, plus points along long edges and inside
/// large faces when `subdivide` is set.
pub fn sample_surface(shape: &CompartmentShape, max_length: f64, subdivide: bool) -> SurfaceSamples {
    let mut out = SurfaceSamples::default();
    match shape {
        CompartmentShape::Mesh(mesh) => {
            for (v, n) in mesh.vertices.iter().zip(&mesh.normals) {
                out.push(*v, *n);
            }
            if subdivide && max_length > 0.0 {
                subdivide_mesh(mesh, max_length, &mut out);
            }
        }
        CompartmentShape::Sphere { center, radius } => {
            let area = 4.0 * PI * radius * radius;
            let count = ((area / (max_length * max_length)).ceil() as usize).max(12);
            let golden = PI * (3.0 - 5f64.sqrt());
            for i in 0..count {
                let y = 1.0 - 2.0 * (i as f64 + 0.5) / count as f64;
                let r = (1.0 - y * y).max(0.0).sqrt();
                let theta = golden * i as f64;
                let dir = Vec3::new(r * theta.cos(), y, r * theta.sin());
                out.push(center + dir * *radius, dir);
            }
        }
        CompartmentShape::Box(bb) => {
            let size = bb.size();
            for axis in 0..3 {
                let (u, v) = ((axis + 1) % 3, (axis + 2) % 3);
                let nu = (size[u] / max_length).ceil().max(1.0) as usize;
                let nv = (size[v] / max_length).ceil().max(1.0) as usize;
                for side in [-1.0, 1.0] {
                    let mut normal = Vec3::zeros();
                    normal[axis] = side;
                    let plane = if side < 0.0 { bb.min[axis] } else { bb.max[axis] };
                    for i in 0..=nu {
                        for j in 0..=nv {
                            let mut p = Pt3::origin();
                            p[axis] = plane;
                            p[u] = bb.min[u] + size[u] * i as f64 / nu as f64;
                            p[v] = bb.min[v] + size[v] * j as f64 / nv as f64;
                            out.push(p, normal);
                        }
                    }
                }
            }
        }
    }
    out
}

fn subdivide_mesh(mesh: &TriangleMesh, max_length: f64, out: &mut SurfaceSamples) {
    let mut edges = BTreeSet::new();
    for f in &mesh.faces {
        for k in 0..3 {
            let (a, b) = (f[k], f[(k + 1) % 3]);
            edges.insert((a.min(b), a.max(b)));
        }
    }
    for (a, b) in edges {
        let (pa, pb) = (mesh.vertices[a], mesh.vertices[b]);
        let steps = ((pb - pa).norm() / max_length).ceil() as usize;
        if steps < 2 {
            continue;
        }
        let n = (mesh.normals[a] + mesh.normals[b])
            .try_normalize(1e-12)
            .unwrap_or(mesh.normals[a]);
        for s in 1..steps {
            out.push(pa + (pb - pa) * (s as f64 / steps as f64), n);
        }
    }

    for f in 0..mesh.faces.len() {
        let (a, b, c) = mesh.triangle(f);
        let longest = (b - a).norm().max((c - b).norm()).max((a - c).norm());
        let steps = (longest / max_length).ceil() as usize;
        if steps < 3 {
            continue;
        }
        let n = face_normal(a, b, c);
        for i in 1..steps {
            for j in 1..(steps - i) {
                let (u, v) = (i as f64 / steps as f64, j as f64 / steps as f64);
                out.push(a + (b - a) * u + (c - a) * v, n);
            }
        }
    }
}

/// A compartment and its classification results.
#[derive(Debug, Clone)]
pub struct Compartment {
    /// Display name.
    pub name: String,
    number: i32,
    shape: CompartmentShape,
    parent: Option<CompartmentId>,
    children: Vec<CompartmentId>,
    faces: Option<FaceIndex>,
    surface_index: Option<SurfaceIndex>,
    off_grid_range: Option<Range<usize>>,
    inside_points: Vec<usize>,
    surface_points: Vec<usize>,
    surface_normals: BTreeMap<usize, Vec3>,
    interior_volume: f64,
    surface_volume: f64,
}

impl Compartment {
    /// Creates an unregistered compartment. The number is assigned by
    /// [`CompartmentTree::add`].
    pub fn new(name: impl Into<String>, shape: CompartmentShape) -> Self {
        let faces = match &shape {
            CompartmentShape::Mesh(mesh) => Some(FaceIndex::new(mesh)),
            _ => None,
        };
        Self {
            name: name.into(),
            number: 0,
            shape,
            parent: None,
            children: Vec::new(),
            faces,
            surface_index: None,
            off_grid_range: None,
            inside_points: Vec::new(),
            surface_points: Vec::new(),
            surface_normals: BTreeMap::new(),
            interior_volume: 0.0,
            surface_volume: 0.0,
        }
    }

    /// Mesh compartment.
    pub fn mesh(name: impl Into<String>, mesh: TriangleMesh) -> Self {
        Self::new(name, CompartmentShape::Mesh(mesh))
    }

    /// Mesh compartment loaded from a geometry backend by mesh name.
    pub fn from_backend(backend: &dyn GeometryBackend, mesh_name: &str) -> Result<Self> {
        let mesh = backend.get_mesh(mesh_name)?;
        Ok(Self::mesh(mesh_name, mesh.clone()))
    }

    /// Sphere compartment.
    pub fn sphere(name: impl Into<String>, center: Pt3, radius: f64) -> Self {
        Self::new(name, CompartmentShape::Sphere { center, radius })
    }

    /// Box compartment.
    pub fn cuboid(name: impl Into<String>, bbox: Aabb3) -> Self {
        Self::new(name, CompartmentShape::Box(bbox))
    }

    /// Compartment number `k` (1-based).
    pub fn number(&self) -> i32 {
        self.number
    }

    /// Id carried by this compartment's surface points.
    pub fn surface_id(&self) -> i32 {
        self.number
    }

    /// Id carried by this compartment's interior points.
    pub fn interior_id(&self) -> i32 {
        -self.number
    }

    /// Bounding shape.
    pub fn shape(&self) -> &CompartmentShape {
        &self.shape
    }

    /// Bounding box.
    pub fn bounding_box(&self) -> Aabb3 {
        self.shape.bounding_box()
    }

    /// Parent compartment id.
    pub fn parent(&self) -> Option<CompartmentId> {
        self.parent
    }

    /// Child compartment ids.
    pub fn children(&self) -> &[CompartmentId] {
        &self.children
    }

    /// Point containment in the bounding shape.
    pub fn contains_point(&self, p: &Pt3) -> bool {
        self.shape.contains_point(p)
    }

    /// Computes surface samples and their nearest-neighbour index once.
    pub fn ensure_surface_samples(&mut self, max_length: f64, subdivide: bool) -> Result<()> {
        if self.surface_index.is_none() {
            let samples = sample_surface(&self.shape, max_length, subdivide);
            self.surface_index = Some(SurfaceIndex::new(samples.points, samples.normals)?);
        }
        Ok(())
    }

    /// Surface sample index, once sampled.
    pub fn surface_index(&self) -> Option<&SurfaceIndex> {
        self.surface_index.as_ref()
    }

    /// Nearest surface sample to `p`.
    pub fn nearest_surface(&self, p: &Pt3) -> Option<SurfaceHit> {
        self.surface_index.as_ref().and_then(|idx| idx.nearest(p))
    }

    /// Unsigned distance from `p` to the compartment surface.
    ///
    /// Exact for every shape: analytic for spheres and boxes, closest point
    /// over the faces for meshes.
    pub fn surface_distance(&self, p: &Pt3) -> f64 {
        match (&self.shape, &self.faces) {
            (CompartmentShape::Sphere { center, radius }, _) => ((p - center).norm() - radius).abs(),
            (CompartmentShape::Box(bb), _) => bb.signed_distance(p).abs(),
            (CompartmentShape::Mesh(_), Some(faces)) => {
                faces.nearest(p).map_or(f64::INFINITY, |hit| hit.distance)
            }
            (CompartmentShape::Mesh(_), None) => f64::INFINITY,
        }
    }

    /// Grid range holding this compartment's off-grid surface samples.
    pub fn off_grid_range(&self) -> Option<Range<usize>> {
        self.off_grid_range.clone()
    }

    pub(crate) fn set_off_grid_range(&mut self, range: Range<usize>) {
        self.off_grid_range = Some(range);
    }

    /// Grid indices classified as interior, ascending.
    pub fn inside_points(&self) -> &[usize] {
        &self.inside_points
    }

    /// Grid indices classified as surface (on-grid and off-grid), ascending.
    pub fn surface_points(&self) -> &[usize] {
        &self.surface_points
    }

    /// Surface normal recorded for surface grid point `index`.
    pub fn surface_normal(&self, index: usize) -> Option<Vec3> {
        self.surface_normals.get(&index).copied()
    }

    pub(crate) fn set_classification(
        &mut self,
        inside: Vec<usize>,
        surface: Vec<usize>,
        normals: BTreeMap<usize, Vec3>,
        spacing: f64,
    ) {
        self.interior_volume = inside.len() as f64 * spacing.powi(3);
        self.surface_volume = self.shape.surface_area();
        self.inside_points = inside;
        self.surface_points = surface;
        self.surface_normals = normals;
    }

    /// True once the grid builder has run on this compartment.
    pub fn is_classified(&self) -> bool {
        self.off_grid_range.is_some()
    }

    /// Interior volume: interior point count times the cell volume.
    pub fn interior_volume(&self) -> f64 {
        self.interior_volume
    }

    /// Surface "volume" used for surface ingredient counts: the surface area.
    pub fn surface_volume(&self) -> f64 {
        self.surface_volume
    }
}

/// Flat arena of compartments. Parents are always registered before their
/// children, so index order is a valid processing order.
#[derive(Debug, Clone, Default)]
pub struct CompartmentTree {
    compartments: Vec<Compartment>,
}

impl CompartmentTree {
    /// Creates an empty tree.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `compartment` under `parent` and assigns its number.
    pub fn add(&mut self, mut compartment: Compartment, parent: Option<CompartmentId>) -> Result<CompartmentId> {
        compartment.shape.validate()?;
        if let Some(p) = parent {
            if p >= self.compartments.len() {
                return Err(Error::Configuration(format!(
                    "compartment '{}' references unknown parent {p}",
                    compartment.name
                )));
            }
        }
        let id = self.compartments.len();
        compartment.number = i32::try_from(id + 1).map_err(|_| {
            Error::Configuration("too many compartments".into())
        })?;
        compartment.parent = parent;
        self.compartments.push(compartment);
        if let Some(p) = parent {
            self.compartments[p].children.push(id);
        }
        Ok(id)
    }

    /// Registers every connected component of backend mesh `mesh_name` as
    /// its own compartment under `parent`. A single component keeps the mesh
    /// name; several are suffixed `#0`, `#1`, ...
    pub fn add_from_backend(
        &mut self,
        backend: &dyn GeometryBackend,
        mesh_name: &str,
        parent: Option<CompartmentId>,
    ) -> Result<Vec<CompartmentId>> {
        let parts = backend.decompose_mesh(mesh_name)?;
        if parts.len() == 1 {
            let id = self.add(Compartment::from_backend(backend, mesh_name)?, parent)?;
            return Ok(vec![id]);
        }
        parts
            .into_iter()
            .enumerate()
            .map(|(k, mesh)| self.add(Compartment::mesh(format!("{mesh_name}#{k}"), mesh), parent))
            .collect()
    }

    /// Number of compartments.
    pub fn len(&self) -> usize {
        self.compartments.len()
    }

    /// True when no compartment is registered.
    pub fn is_empty(&self) -> bool {
        self.compartments.is_empty()
    }

    /// Compartment by id.
    pub fn get(&self, id: CompartmentId) -> Option<&Compartment> {
        self.compartments.get(id)
    }

    /// Mutable compartment by id.
    pub fn get_mut(&mut self, id: CompartmentId) -> Option<&mut Compartment> {
        self.compartments.get_mut(id)
    }

    /// Compartment with number `k`.
    pub fn by_number(&self, number: i32) -> Option<&Compartment> {
        usize::try_from(number)
            .ok()
            .filter(|&n| n >= 1)
            .and_then(|n| self.compartments.get(n - 1))
    }

    /// Compartment by name.
    pub fn by_name(&self, name: &str) -> Option<&Compartment> {
        self.compartments.iter().find(|c| c.name == name)
    }

    /// Iterator over all compartments, parents first.
    pub fn iter(&self) -> impl Iterator<Item = &Compartment> {
        self.compartments.iter()
    }

    /// Id the points surrounding compartment `id` carry before it is
    /// classified: 0 for top-level, the parent's interior id otherwise.
    pub fn region_id(&self, id: CompartmentId) -> i32 {
        self.compartments
            .get(id)
            .and_then(|c| c.parent)
            .and_then(|p| self.compartments.get(p))
            .map_or(0, |p| p.interior_id())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh_store::MeshStore;
    use approx::assert_relative_eq;

    #[test]
    fn test_tree_numbers_and_regions() {
        let mut tree = CompartmentTree::new();
        let outer = tree
            .add(Compartment::sphere("cell", Pt3::origin(), 100.0), None)
            .unwrap();
        let inner = tree
            .add(Compartment::sphere("nucleus", Pt3::origin(), 30.0), Some(outer))
            .unwrap();
        assert_eq!(tree.get(outer).unwrap().number(), 1);
        assert_eq!(tree.get(inner).unwrap().number(), 2);
        assert_eq!(tree.get(outer).unwrap().children(), &[inner]);
        assert_eq!(tree.get(inner).unwrap().parent(), Some(outer));
        assert_eq!(tree.region_id(outer), 0);
        assert_eq!(tree.region_id(inner), -1);
        assert_eq!(tree.by_number(2).map(|c| c.name.as_str()), Some("nucleus"));
        assert!(tree.by_number(0).is_none());
    }

    #[test]
    fn test_tree_rejects_bad_input() {
        let mut tree = CompartmentTree::new();
        let r = tree.add(Compartment::sphere("x", Pt3::origin(), 1.0), Some(3));
        assert!(matches!(r, Err(Error::Configuration(_))));
        let r = tree.add(Compartment::sphere("x", Pt3::origin(), -1.0), None);
        assert!(r.is_err());
    }

    #[test]
    fn test_sphere_samples_on_surface() {
        let shape = CompartmentShape::Sphere {
            center: Pt3::new(1.0, 2.0, 3.0),
            radius: 50.0,
        };
        let s = sample_surface(&shape, 10.0, false);
        assert!(s.points.len() >= 300);
        for (p, n) in s.points.iter().zip(&s.normals) {
            assert_relative_eq!((p - Pt3::new(1.0, 2.0, 3.0)).norm(), 50.0, epsilon = 1e-9);
            assert_relative_eq!(n.norm(), 1.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_box_samples_on_faces() {
        let bb = Aabb3::new(Pt3::origin(), Pt3::new(10.0, 20.0, 30.0));
        let s = sample_surface(&CompartmentShape::Box(bb), 10.0, false);
        for (p, n) in s.points.iter().zip(&s.normals) {
            assert!(bb.contains_point(p));
            assert_relative_eq!(bb.signed_distance(p), 0.0, epsilon = 1e-9);
            assert_relative_eq!(n.norm(), 1.0);
        }
    }

    #[test]
    fn test_mesh_subdivision_adds_samples() {
        let shape = CompartmentShape::Mesh(TriangleMesh::cube(Pt3::origin(), 10.0));
        let coarse = sample_surface(&shape, 4.0, false);
        let fine = sample_surface(&shape, 4.0, true);
        assert_eq!(coarse.points.len(), 8);
        assert!(fine.points.len() > 8);
        let bb = Aabb3::from_center_half_extent(Pt3::origin(), 10.0);
        for p in &fine.points {
            assert_relative_eq!(bb.signed_distance(p), 0.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_surface_distance_is_exact() {
        let cube = Compartment::mesh("box", TriangleMesh::cube(Pt3::origin(), 500.0));
        assert_relative_eq!(cube.surface_distance(&Pt3::new(0.0, 0.0, 450.0)), 50.0, epsilon = 1e-9);
        assert_relative_eq!(cube.surface_distance(&Pt3::new(0.0, 600.0, 0.0)), 100.0, epsilon = 1e-9);
        let ball = Compartment::sphere("ball", Pt3::origin(), 10.0);
        assert_relative_eq!(ball.surface_distance(&Pt3::new(0.0, 4.0, 0.0)), 6.0);
        let bb = Compartment::cuboid("bb", Aabb3::from_center_half_extent(Pt3::origin(), 10.0));
        assert_relative_eq!(bb.surface_distance(&Pt3::new(0.0, 0.0, 13.0)), 3.0);
    }

    #[test]
    fn test_compartments_from_backend() {
        let mut store = MeshStore::new();
        store.insert("cell", TriangleMesh::cube(Pt3::origin(), 50.0));
        let a = TriangleMesh::cube(Pt3::new(-20.0, 0.0, 0.0), 5.0);
        let b = TriangleMesh::cube(Pt3::new(20.0, 0.0, 0.0), 5.0);
        let offset = a.vertices.len();
        let mut vertices = a.vertices.clone();
        vertices.extend(b.vertices.iter().copied());
        let mut faces = a.faces.clone();
        faces.extend(b.faces.iter().map(|f| [f[0] + offset, f[1] + offset, f[2] + offset]));
        store.insert("granules", TriangleMesh::new(vertices, faces).unwrap());

        let mut tree = CompartmentTree::new();
        let cell = tree.add_from_backend(&store, "cell", None).unwrap();
        assert_eq!(cell, vec![0]);
        assert_eq!(tree.get(0).unwrap().name, "cell");
        let granules = tree.add_from_backend(&store, "granules", Some(0)).unwrap();
        assert_eq!(granules, vec![1, 2]);
        assert_eq!(tree.get(2).unwrap().name, "granules#1");
        assert!(tree.get(2).unwrap().contains_point(&Pt3::new(20.0, 1.0, 0.0)));
        assert_eq!(tree.get(0).unwrap().children(), &[1, 2]);

        assert!(matches!(
            tree.add_from_backend(&store, "missing", None),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn test_shape_contains() {
        let mesh = CompartmentShape::Mesh(TriangleMesh::cube(Pt3::origin(), 1.0));
        assert!(mesh.contains_point(&Pt3::new(0.5, 0.0, 0.0)));
        assert!(!mesh.contains_point(&Pt3::new(1.5, 0.0, 0.0)));
        let sphere = CompartmentShape::Sphere {
            center: Pt3::origin(),
            radius: 1.0,
        };
        assert!(sphere.contains_point(&Pt3::new(0.0, 0.0, 1.0)));
        assert!(!sphere.contains_point(&Pt3::new(0.0, 0.8, 0.8)));
    }
}
