//! # U-Cellpack
//!
//! Ingredient placement for the u-cellpack mesoscale packing engine.
//!
//! This crate places rigid molecular ingredients into the compartments
//! classified by `u-cellpack-grid`, one candidate grid point at a time,
//! without overlap.
//!
//! ## Features
//!
//! - Sphere-tree ingredients with surface, interior and free-space targets
//! - Count and molarity targets with rejection thresholds
//! - Jittered poses with free, fixed-axis and biased rotations
//! - Random, close and partner-bound packing modes
//! - Sphere-tree or rigid-body narrow phase behind an R*-tree broad phase
//! - Periodic boundaries, cancellation and visualization hooks
//!
//! ## Example
//!
//! ```
//! use u_cellpack::{Ingredient, PackingContext, PlacementScheduler, Recipe};
//! use u_cellpack::{Aabb3, Compartment, CompartmentTree, PackingConfig, Pt3};
//!
//! let mut compartments = CompartmentTree::new();
//! compartments
//!     .add(Compartment::sphere("cell", Pt3::origin(), 60.0), None)
//!     .unwrap();
//!
//! let recipe = Recipe::new("cytoplasm")
//!     .with_ingredient(Ingredient::sphere("ribosome", 10.0).with_compartment(-1).with_count(3))
//!     .with_ingredient(Ingredient::sphere("porin", 4.0).with_compartment(1).with_count(2));
//!
//! let context = PackingContext::build(
//!     PackingConfig::new().with_spacing(10.0).with_seed(7),
//!     Aabb3::from_center_half_extent(Pt3::origin(), 80.0),
//!     compartments,
//!     recipe,
//! )
//! .unwrap();
//!
//! let result = PlacementScheduler::new(context).run().unwrap();
//! for instance in &result.instances {
//!     assert!(instance.compartment == -1 || instance.compartment == 1);
//! }
//! ```

pub mod collision;
pub mod context;
pub mod ingredient;
pub mod physics;
pub mod placement;
pub mod recipe;
pub mod scheduler;
pub mod spatial_index;

// Re-exports
pub use collision::{CollisionEngine, CollisionStrategy};
pub use context::PackingContext;
pub use ingredient::{
    Ingredient, PackingMode, Partner, Pose, RotationPolicy, SphereLevel, SphereTree,
};
pub use physics::{BodyHandle, PhysicsBackend, SphereContactBackend};
pub use placement::{AttemptState, PlacementAttempt, RejectReason};
pub use recipe::Recipe;
pub use scheduler::{PlacementScheduler, StepOutcome};
pub use spatial_index::{InstanceIndex, PlacedEntry};
pub use u_cellpack_core::{
    Aabb3, ClassificationMethod, Error, HookError, NoopHook, PackingConfig, PackingResult, PlacedInstance,
    Pt3, Result, Rot3, StopReason, TriangleMesh, Vec3, VisualizationHook,
};
pub use u_cellpack_grid::{
    ClassificationReport, Compartment, CompartmentGridBuilder, CompartmentTree, GeometryBackend,
    MeshStore, SpatialGrid,
};
