//! # U-Cellpack Grid
//!
//! Scene lattice and compartment classification for the u-cellpack engine.
//!
//! ## Features
//!
//! - [`SpatialGrid`]: row-major lattice with off-grid surface samples, a
//!   signed distance field, compartment ids and occupancy
//! - [`CompartmentTree`]: nested mesh, sphere and box compartments
//! - [`CompartmentGridBuilder`]: interior/surface classification with
//!   interchangeable [`classify::ClassificationStrategy`] implementations
//!   (ray casting, sidedness, flood fill, voxel SDF, primitives)
//! - [`MeshStore`]: in-memory [`GeometryBackend`]
//!
//! ## Example
//!
//! ```rust
//! use u_cellpack_core::geometry::{Aabb3, Pt3};
//! use u_cellpack_core::ClassificationMethod;
//! use u_cellpack_grid::{Compartment, CompartmentGridBuilder, CompartmentTree, SpatialGrid};
//!
//! let mut grid = SpatialGrid::build(Aabb3::from_center_half_extent(Pt3::origin(), 60.0), 10.0).unwrap();
//! let mut tree = CompartmentTree::new();
//! tree.add(Compartment::sphere("vesicle", Pt3::origin(), 40.0), None).unwrap();
//!
//! let reports = CompartmentGridBuilder::new(ClassificationMethod::RayCast)
//!     .build_all(&mut grid, &mut tree)
//!     .unwrap();
//! assert!(reports[0].inside > 0);
//! ```

pub mod builder;
pub mod classify;
pub mod compartment;
pub mod mesh_store;
pub mod spatial_grid;
pub mod surface_index;

// Re-exports
pub use builder::{ClassificationReport, CompartmentGridBuilder};
pub use classify::{ClassificationStrategy, Side};
pub use compartment::{Compartment, CompartmentId, CompartmentShape, CompartmentTree};
pub use mesh_store::{GeometryBackend, MeshStore};
pub use spatial_grid::SpatialGrid;
pub use surface_index::{FaceHit, FaceIndex, SurfaceHit, SurfaceIndex};
