//! # U-Cellpack Core
//!
//! Shared types for the u-cellpack molecular packing engine.
//!
//! This crate provides the foundational types used by the grid construction
//! and the placement crates.
//!
//! ## Core Components
//!
//! - **Geometry**: [`Aabb3`], [`TriangleMesh`], triangle and rotation helpers
//! - **Robust predicates**: exact [`robust::orient3d`] and segment/triangle crossing
//! - **Configuration**: [`PackingConfig`], [`ClassificationMethod`]
//! - **Progress**: [`VisualizationHook`], [`ProgressInfo`]
//! - **Results**: [`PackingResult`], [`PlacedInstance`]
//!
//! ## Configuration
//!
//! ```rust
//! use u_cellpack_core::{ClassificationMethod, PackingConfig};
//!
//! let config = PackingConfig::new()
//!     .with_spacing(25.0)
//!     .with_seed(42)
//!     .with_classification(ClassificationMethod::Voxel);
//! assert!(config.validate().is_ok());
//! ```
//!
//! ## Feature Flags
//!
//! - `serde`: Enable serialization/deserialization support

pub mod config;
pub mod error;
pub mod geometry;
pub mod progress;
pub mod result;
pub mod robust;

// Re-exports
pub use config::{ClassificationMethod, PackingConfig};
pub use error::{Error, Result};
pub use geometry::{Aabb3, Pt3, Rot3, TriangleMesh, Vec3};
pub use progress::{CallbackHook, HookError, NoopHook, ProgressCallback, ProgressInfo, VisualizationHook};
pub use result::{IngredientReport, PackingResult, PlacedInstance, StopReason};
