//! Inside/outside classification of grid points against one compartment.
//!
//! Every strategy answers the same question for a batch of candidate grid
//! points and may decline a point by returning
//! [`Error::ClassificationAmbiguity`]; the grid builder then resolves that
//! point with the generalized winding number.
//!
//! | Strategy | Cost per point | Notes |
//! |----------|----------------|-------|
//! | [`RayCast`] | O(faces) × rays | exact predicates, up to three rays |
//! | [`Sidedness`] | O(log samples) | degrades on thin or open surfaces |
//! | [`FloodFill`] | amortized O(1) | only points near a face are tested |
//! | [`Voxel`] | O(1) after rasterization | resolution bound accuracy |
//! | [`Primitive`] | O(1) | spheres and boxes only |

mod floodfill;
mod primitive;
mod raycast;
mod sidedness;
mod voxel;

pub use floodfill::FloodFill;
pub use primitive::Primitive;
pub use raycast::RayCast;
pub use sidedness::Sidedness;
pub use voxel::{SignedDistanceField, Voxel};

use crate::compartment::{Compartment, CompartmentShape};
use crate::spatial_grid::SpatialGrid;
use u_cellpack_core::{ClassificationMethod, Error, Result};

/// Classification of a single grid point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    /// Inside the compartment.
    Inside,
    /// Outside the compartment.
    Outside,
    /// On the compartment boundary.
    Surface,
}

/// A point-classification algorithm bound to one compartment's geometry.
pub trait ClassificationStrategy: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Classifies `candidates` (grid indices), one result per candidate in
    /// the same order.
    fn classify(&self, grid: &SpatialGrid, candidates: &[usize]) -> Vec<Result<Side>>;
}

pub(crate) fn ambiguity(index: usize, reason: impl Into<String>) -> Error {
    Error::ClassificationAmbiguity {
        index,
        reason: reason.into(),
    }
}

/// Builds the strategy for `compartment`.
///
/// Spheres and boxes always use [`Primitive`]; meshes use `method`.
pub fn strategy_for<'a>(
    compartment: &'a Compartment,
    method: ClassificationMethod,
    voxel_resolution: usize,
) -> Result<Box<dyn ClassificationStrategy + 'a>> {
    let mesh = match compartment.shape() {
        CompartmentShape::Mesh(mesh) => mesh,
        shape => return Ok(Box::new(Primitive::new(shape))),
    };
    Ok(match method {
        ClassificationMethod::RayCast => Box::new(RayCast::new(mesh)),
        ClassificationMethod::Sidedness => {
            let index = compartment.surface_index().ok_or_else(|| {
                Error::Configuration(format!(
                    "compartment '{}' has no surface samples",
                    compartment.name
                ))
            })?;
            Box::new(Sidedness::new(index))
        }
        ClassificationMethod::FloodFill => Box::new(FloodFill::new(mesh)),
        ClassificationMethod::Voxel => Box::new(Voxel::new(SignedDistanceField::build(
            mesh,
            voxel_resolution,
        )?)),
    })
}
