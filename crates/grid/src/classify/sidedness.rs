use super::{ambiguity, ClassificationStrategy, Side};
use crate::spatial_grid::SpatialGrid;
use crate::surface_index::SurfaceIndex;
use rayon::prelude::*;
use u_cellpack_core::geometry::Pt3;
use u_cellpack_core::Result;

/// Sign of the offset to the nearest surface sample along that sample's
/// normal. Negative means inside.
pub struct Sidedness<'a> {
    index: &'a SurfaceIndex,
}

impl<'a> Sidedness<'a> {
    /// Uses the compartment's surface sample index.
    pub fn new(index: &'a SurfaceIndex) -> Self {
        Self { index }
    }

    /// Classifies one point.
    pub fn classify_point(&self, index: usize, p: &Pt3) -> Result<Side> {
        let hit = self
            .index
            .nearest(p)
            .ok_or_else(|| ambiguity(index, "no surface samples"))?;
        if hit.normal.norm_squared() == 0.0 {
            return Err(ambiguity(index, "nearest surface sample has no normal"));
        }
        Ok(if (p - hit.point).dot(&hit.normal) < 0.0 {
            Side::Inside
        } else {
            Side::Outside
        })
    }
}

impl ClassificationStrategy for Sidedness<'_> {
    fn name(&self) -> &'static str {
        "sidedness"
    }

    fn classify(&self, grid: &SpatialGrid, candidates: &[usize]) -> Vec<Result<Side>> {
        let positions = grid.positions();
        candidates
            .par_iter()
            .map(|&i| self.classify_point(i, &positions[i]))
            .collect()
    }
}
