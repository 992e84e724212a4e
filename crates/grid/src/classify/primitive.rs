use super::{ClassificationStrategy, Side};
use crate::compartment::CompartmentShape;
use crate::spatial_grid::SpatialGrid;
use rayon::prelude::*;
use u_cellpack_core::Result;

/// Analytic containment for sphere and box compartments.
pub struct Primitive<'a> {
    shape: &'a CompartmentShape,
}

impl<'a> Primitive<'a> {
    /// Wraps an analytic shape.
    pub fn new(shape: &'a CompartmentShape) -> Self {
        Self { shape }
    }
}

impl ClassificationStrategy for Primitive<'_> {
    fn name(&self) -> &'static str {
        "primitive"
    }

    fn classify(&self, grid: &SpatialGrid, candidates: &[usize]) -> Vec<Result<Side>> {
        let positions = grid.positions();
        candidates
            .par_iter()
            .map(|&i| {
                Ok(if self.shape.contains_point(&positions[i]) {
                    Side::Inside
                } else {
                    Side::Outside
                })
            })
            .collect()
    }
}
