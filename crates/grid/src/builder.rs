//! Per-compartment grid classification.
//!
//! For each compartment, parents first:
//!
//! 1. sample the surface once and append the samples inside the grid box as
//!    off-grid points carrying the surface id;
//! 2. collect candidate points in the padded bounding box whose id is the
//!    surrounding region or this compartment (points beyond the box are
//!    taken as exterior without a test);
//! 3. classify them with the configured strategy, resolving ambiguous points
//!    with the winding number;
//! 4. promote interior lattice points next to an exterior one to surface
//!    (meshes only);
//! 5. write ids sequentially and tighten the distance field with the
//!    nearest-sample distance of every point except the compartment's own
//!    surface points.

use crate::classify::{strategy_for, Side};
use crate::compartment::{CompartmentId, CompartmentTree};
use crate::spatial_grid::SpatialGrid;
use rayon::prelude::*;
use std::collections::{BTreeMap, HashMap};
use u_cellpack_core::geometry::Pt3;
use u_cellpack_core::{ClassificationMethod, Error, PackingConfig, Result};

/// Outcome of classifying one compartment.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassificationReport {
    /// Compartment id.
    pub compartment: CompartmentId,
    /// Strategy that classified the compartment.
    pub strategy: &'static str,
    /// Points tested.
    pub candidates: usize,
    /// Interior points.
    pub inside: usize,
    /// Surface points, on-grid and off-grid.
    pub surface: usize,
    /// Off-grid surface samples appended by this run.
    pub off_grid_added: usize,
    /// Ambiguous points resolved by the fallback test.
    pub recovered: usize,
}

/// Classifies grid points against compartments.
#[derive(Debug, Clone)]
pub struct CompartmentGridBuilder {
    method: ClassificationMethod,
    voxel_resolution: usize,
    subdivide_surface: bool,
    padding: Option<f64>,
}

impl CompartmentGridBuilder {
    /// Creates a builder using `method` for mesh compartments.
    pub fn new(method: ClassificationMethod) -> Self {
        Self {
            method,
            voxel_resolution: 32,
            subdivide_surface: false,
            padding: None,
        }
    }

    /// Creates a builder from the engine configuration.
    pub fn from_config(config: &PackingConfig) -> Self {
        Self {
            method: config.classification,
            voxel_resolution: config.voxel_resolution,
            subdivide_surface: config.subdivide_surface,
            padding: None,
        }
    }

    /// Sets the bounding box padding (defaults to one grid spacing).
    pub fn with_padding(mut self, padding: f64) -> Self {
        self.padding = Some(padding);
        self
    }

    /// Sets the signed distance field resolution.
    pub fn with_voxel_resolution(mut self, resolution: usize) -> Self {
        self.voxel_resolution = resolution;
        self
    }

    /// Enables edge and face subdivision of mesh surface samples.
    pub fn with_subdivided_surface(mut self, subdivide: bool) -> Self {
        self.subdivide_surface = subdivide;
        self
    }

    /// Classification method for mesh compartments.
    pub fn method(&self) -> ClassificationMethod {
        self.method
    }

    /// Classifies every compartment, parents before children.
    pub fn build_all(
        &self,
        grid: &mut SpatialGrid,
        tree: &mut CompartmentTree,
    ) -> Result<Vec<ClassificationReport>> {
        (0..tree.len()).map(|id| self.build(grid, tree, id)).collect()
    }

    /// Classifies one compartment. Running it again without packing in
    /// between yields the same interior and surface sets.
    pub fn build(
        &self,
        grid: &mut SpatialGrid,
        tree: &mut CompartmentTree,
        id: CompartmentId,
    ) -> Result<ClassificationReport> {
        let spacing = grid.spacing();
        let region = tree.region_id(id);
        let compartment = tree
            .get_mut(id)
            .ok_or_else(|| Error::Configuration(format!("unknown compartment id {id}")))?;
        compartment.ensure_surface_samples(spacing, self.subdivide_surface)?;

        let number = compartment.number();
        let mut off_grid_added = 0;
        let off_range = match compartment.off_grid_range() {
            Some(range) => range,
            None => {
                let samples: Vec<Pt3> = compartment
                    .surface_index()
                    .map(|idx| {
                        idx.points()
                            .iter()
                            .filter(|p| grid.bbox().contains_point(p))
                            .copied()
                            .collect()
                    })
                    .unwrap_or_default();
                let range = grid.append_off_grid_points(&samples, number);
                off_grid_added = range.len();
                compartment.set_off_grid_range(range.clone());
                range
            }
        };

        let compartment = tree
            .get(id)
            .ok_or_else(|| Error::Configuration(format!("unknown compartment id {id}")))?;
        let padding = self.padding.unwrap_or(spacing);
        let region_box = compartment.bounding_box().expand(padding);
        let candidates: Vec<usize> = {
            let ids = grid.compartment_ids();
            grid.points_in_box(&region_box)
                .into_iter()
                .filter(|i| !off_range.contains(i))
                .filter(|&i| {
                    let cid = ids[i];
                    cid == region || cid == number || cid == -number
                })
                .collect()
        };

        let strategy = strategy_for(compartment, self.method, self.voxel_resolution)?;
        let raw = strategy.classify(grid, &candidates);

        let mut recovered = 0;
        let mut sides: HashMap<usize, Side> = HashMap::with_capacity(candidates.len());
        for (&i, result) in candidates.iter().zip(raw) {
            let side = match result {
                Ok(side) => side,
                Err(Error::ClassificationAmbiguity { reason, .. }) => {
                    log::debug!(
                        "{}: point {i} ambiguous under {} ({reason}), using winding number",
                        compartment.name,
                        strategy.name()
                    );
                    recovered += 1;
                    if compartment.contains_point(&grid.positions()[i]) {
                        Side::Inside
                    } else {
                        Side::Outside
                    }
                }
                Err(e) => return Err(e),
            };
            sides.insert(i, side);
        }

        if !compartment.shape().is_primitive() {
            let promoted: Vec<usize> = candidates
                .iter()
                .copied()
                .filter(|i| sides.get(i) == Some(&Side::Inside))
                .filter(|&i| {
                    grid.lattice_neighbors(i).into_iter().any(|n| match sides.get(&n) {
                        Some(side) => *side == Side::Outside,
                        None => !region_box.contains_point(&grid.positions()[n]),
                    })
                })
                .collect();
            for i in promoted {
                sides.insert(i, Side::Surface);
            }
        }

        let mut inside = Vec::new();
        let mut surface: Vec<usize> = off_range.clone().collect();
        let mut id_writes = Vec::with_capacity(candidates.len());
        for &i in &candidates {
            match sides.get(&i) {
                Some(Side::Inside) => {
                    inside.push(i);
                    id_writes.push((i, -number));
                }
                Some(Side::Surface) => {
                    surface.push(i);
                    id_writes.push((i, number));
                }
                _ => id_writes.push((i, region)),
            }
        }
        surface.sort_unstable();

        let index = compartment
            .surface_index()
            .ok_or_else(|| Error::GridInconsistency(format!("{} lost its surface samples", compartment.name)))?;
        let normals: BTreeMap<usize, _> = surface
            .iter()
            .filter_map(|&i| index.nearest(&grid.positions()[i]).map(|h| (i, h.normal)))
            .collect();

        for (i, cid) in id_writes {
            grid.set_compartment_id(i, cid)?;
        }

        let updates: Vec<(usize, f64)> = {
            let ids = grid.compartment_ids();
            let positions = grid.positions();
            (0..grid.len())
                .into_par_iter()
                .filter(|&i| ids[i] != number)
                .map(|i| (i, compartment.surface_distance(&positions[i])))
                .filter(|(_, d)| d.is_finite())
                .collect()
        };
        for (i, d) in updates {
            grid.nearest_surface_distance_update(i, d)?;
        }

        let report = ClassificationReport {
            compartment: id,
            strategy: strategy.name(),
            candidates: candidates.len(),
            inside: inside.len(),
            surface: surface.len(),
            off_grid_added,
            recovered,
        };
        log::info!(
            "{}: {} inside, {} surface ({} off-grid added), {} recovered by {} of {} candidates",
            compartment.name,
            report.inside,
            report.surface,
            report.off_grid_added,
            report.recovered,
            report.strategy,
            report.candidates
        );

        drop(strategy);
        if let Some(compartment) = tree.get_mut(id) {
            compartment.set_classification(inside, surface, normals, spacing);
        }
        Ok(report)
    }
}
