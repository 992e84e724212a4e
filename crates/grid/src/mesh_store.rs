//! Read-only mesh queries.
//!
//! Packing never mutates meshes. Everything it needs from a geometry host
//! goes through [`GeometryBackend`]; [`MeshStore`] is the in-memory
//! implementation.

use std::collections::BTreeMap;
use u_cellpack_core::geometry::{Pt3, TriangleMesh, Vec3};
use u_cellpack_core::{Error, Result};

/// Mesh lookup and point containment by mesh name.
pub trait GeometryBackend: Send + Sync {
    /// Mesh registered under `name`.
    fn get_mesh(&self, name: &str) -> Result<&TriangleMesh>;

    /// Whether `point` lies inside the closed mesh `name`.
    fn contains_point(&self, name: &str, point: &Pt3) -> Result<bool>;

    /// Splits mesh `name` into its connected components.
    fn decompose_mesh(&self, name: &str) -> Result<Vec<TriangleMesh>>;
}

/// Named meshes held in memory.
#[derive(Debug, Clone, Default)]
pub struct MeshStore {
    meshes: BTreeMap<String, TriangleMesh>,
}

impl MeshStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a mesh, returning the one it replaced.
    pub fn insert(&mut self, name: impl Into<String>, mesh: TriangleMesh) -> Option<TriangleMesh> {
        self.meshes.insert(name.into(), mesh)
    }

    /// Registered names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.meshes.keys().map(String::as_str)
    }

    /// Number of meshes.
    pub fn len(&self) -> usize {
        self.meshes.len()
    }

    /// True when no mesh is registered.
    pub fn is_empty(&self) -> bool {
        self.meshes.is_empty()
    }
}

impl GeometryBackend for MeshStore {
    fn get_mesh(&self, name: &str) -> Result<&TriangleMesh> {
        self.meshes
            .get(name)
            .ok_or_else(|| Error::Configuration(format!("unknown mesh '{name}'")))
    }

    fn contains_point(&self, name: &str, point: &Pt3) -> Result<bool> {
        let mesh = self.get_mesh(name)?;
        Ok(mesh.bounding_box().contains_point(point) && mesh.winding_number(point).abs() > 0.5)
    }

    fn decompose_mesh(&self, name: &str) -> Result<Vec<TriangleMesh>> {
        connected_components(self.get_mesh(name)?)
    }
}

fn find(parent: &mut [usize], mut x: usize) -> usize {
    while parent[x] != x {
        parent[x] = parent[parent[x]];
        x = parent[x];
    }
    x
}

/// Splits a mesh into components of faces sharing vertices.
///
/// Components are ordered by their smallest face index.
pub fn connected_components(mesh: &TriangleMesh) -> Result<Vec<TriangleMesh>> {
    let mut parent: Vec<usize> = (0..mesh.vertices.len()).collect();
    for f in &mesh.faces {
        let a = find(&mut parent, f[0]);
        for &v in &f[1..] {
            let b = find(&mut parent, v);
            if a != b {
                parent[b] = a;
            }
        }
    }

    let mut groups: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    let mut order: Vec<usize> = Vec::new();
    for (fi, f) in mesh.faces.iter().enumerate() {
        let root = find(&mut parent, f[0]);
        let group = groups.entry(root).or_default();
        if group.is_empty() {
            order.push(root);
        }
        group.push(fi);
    }

    let mut components = Vec::with_capacity(order.len());
    for root in order {
        let faces = &groups[&root];
        let mut remap: BTreeMap<usize, usize> = BTreeMap::new();
        let mut vertices: Vec<Pt3> = Vec::new();
        let mut normals: Vec<Vec3> = Vec::new();
        let mut local_faces = Vec::with_capacity(faces.len());
        for &fi in faces {
            let mut local = [0usize; 3];
            for (k, &v) in mesh.faces[fi].iter().enumerate() {
                local[k] = *remap.entry(v).or_insert_with(|| {
                    vertices.push(mesh.vertices[v]);
                    normals.push(mesh.normals.get(v).copied().unwrap_or_else(Vec3::zeros));
                    vertices.len() - 1
                });
            }
            local_faces.push(local);
        }
        components.push(TriangleMesh::with_normals(vertices, local_faces, normals)?);
    }
    Ok(components)
}
