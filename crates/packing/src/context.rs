//! State of one packing run.
//!
//! [`PackingContext`] owns everything a run mutates: the classified grid,
//! the compartments, the ingredients with their counters, the placed
//! instances with their index, the random generator and the per-ingredient
//! candidate point lists. The scheduler and the collision engine receive it
//! by reference; it is dropped when the run ends.

use crate::ingredient::{Ingredient, PackingMode, Pose};
use crate::recipe::Recipe;
use crate::spatial_index::InstanceIndex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use u_cellpack_core::geometry::{Aabb3, Pt3, Vec3};
use u_cellpack_core::{Error, PackingConfig, PlacedInstance, Result};
use u_cellpack_grid::{ClassificationReport, CompartmentGridBuilder, CompartmentTree, SpatialGrid};

/// Mutable state of a packing run.
#[derive(Debug)]
pub struct PackingContext {
    config: PackingConfig,
    grid: SpatialGrid,
    compartments: CompartmentTree,
    ingredients: Vec<Ingredient>,
    instances: Vec<PlacedInstance>,
    index: InstanceIndex,
    rng: StdRng,
    candidates: Vec<Option<Vec<usize>>>,
    reports: Vec<ClassificationReport>,
    largest_radius: f64,
}

impl PackingContext {
    /// Validates the inputs, builds the grid over `bbox` and classifies
    /// every compartment.
    ///
    /// The recipe is checked before any grid work starts.
    pub fn build(
        config: PackingConfig,
        bbox: Aabb3,
        mut compartments: CompartmentTree,
        recipe: Recipe,
    ) -> Result<Self> {
        config.validate()?;
        let ingredients = recipe.resolve(&compartments)?;
        let mut grid = SpatialGrid::build(bbox, config.spacing)?;
        let reports = CompartmentGridBuilder::from_config(&config).build_all(&mut grid, &mut compartments)?;
        Self::assemble(config, grid, compartments, ingredients, reports)
    }

    /// Starts a run on an already classified grid.
    pub fn with_grid(
        config: PackingConfig,
        grid: SpatialGrid,
        compartments: CompartmentTree,
        recipe: Recipe,
    ) -> Result<Self> {
        config.validate()?;
        if let Some(c) = compartments.iter().find(|c| !c.is_classified()) {
            return Err(Error::Configuration(format!(
                "compartment '{}' has not been classified on the grid",
                c.name
            )));
        }
        let ingredients = recipe.resolve(&compartments)?;
        Self::assemble(config, grid, compartments, ingredients, Vec::new())
    }

    fn assemble(
        config: PackingConfig,
        grid: SpatialGrid,
        compartments: CompartmentTree,
        mut ingredients: Vec<Ingredient>,
        reports: Vec<ClassificationReport>,
    ) -> Result<Self> {
        for ingredient in &mut ingredients {
            let volume = region_volume(&grid, &compartments, ingredient.compartment)?;
            ingredient.reset(volume);
            log::debug!(
                "ingredient '{}' targets {} instances in compartment {}",
                ingredient.name,
                ingredient.target(),
                ingredient.compartment
            );
        }
        let largest_radius = ingredients
            .iter()
            .map(Ingredient::encapsulating_radius)
            .fold(0.0, f64::max);
        let rng = config
            .seed
            .map_or_else(StdRng::from_entropy, StdRng::seed_from_u64);
        let candidates = vec![None; ingredients.len()];
        Ok(Self {
            config,
            grid,
            compartments,
            ingredients,
            instances: Vec::new(),
            index: InstanceIndex::new(),
            rng,
            candidates,
            reports,
            largest_radius,
        })
    }

    /// Run configuration.
    pub fn config(&self) -> &PackingConfig {
        &self.config
    }

    /// Scene grid.
    pub fn grid(&self) -> &SpatialGrid {
        &self.grid
    }

    /// Compartments.
    pub fn compartments(&self) -> &CompartmentTree {
        &self.compartments
    }

    /// Ingredients in recipe order.
    pub fn ingredients(&self) -> &[Ingredient] {
        &self.ingredients
    }

    /// Ingredient by recipe index.
    pub fn ingredient(&self, index: usize) -> Result<&Ingredient> {
        self.ingredients
            .get(index)
            .ok_or_else(|| Error::GridInconsistency(format!("unknown ingredient {index}")))
    }

    pub(crate) fn ingredient_mut(&mut self, index: usize) -> Result<&mut Ingredient> {
        self.ingredients
            .get_mut(index)
            .ok_or_else(|| Error::GridInconsistency(format!("unknown ingredient {index}")))
    }

    /// Accepted instances in acceptance order.
    pub fn instances(&self) -> &[PlacedInstance] {
        &self.instances
    }

    /// Index over placed instances and their periodic images.
    pub fn index(&self) -> &InstanceIndex {
        &self.index
    }

    /// Per-compartment classification reports, when the grid was built here.
    pub fn classification_reports(&self) -> &[ClassificationReport] {
        &self.reports
    }

    /// Grid points whose classification needed the fallback test.
    pub fn ambiguous_points(&self) -> usize {
        self.reports.iter().map(|r| r.recovered).sum()
    }

    /// Largest encapsulating radius in the recipe.
    pub fn largest_radius(&self) -> f64 {
        self.largest_radius
    }

    pub(crate) fn rng(&mut self) -> &mut StdRng {
        &mut self.rng
    }

    /// Padding added to the encapsulating radius when updating the
    /// distance field around a new instance.
    pub fn influence_padding(&self, ingredient: &Ingredient) -> f64 {
        self.config.influence_padding.unwrap_or_else(|| {
            ingredient.min_radius()
                + self.largest_radius
                + ingredient.max_jitter_distance(self.grid.spacing())
        })
    }

    /// Draws an orientation and a jittered position around `base`.
    /// Surface ingredients jitter in the frame of their rotation.
    pub(crate) fn jittered_pose(&mut self, ingredient: usize, base: &Pt3, normal: Option<&Vec3>) -> Result<Pose> {
        let spacing = self.grid.spacing();
        let ing = self
            .ingredients
            .get(ingredient)
            .ok_or_else(|| Error::GridInconsistency(format!("unknown ingredient {ingredient}")))?;
        let rotation = ing.pick_rotation(normal, &mut self.rng);
        let mut offset = ing.jitter_offset(spacing, &mut self.rng);
        if ing.is_surface() {
            offset = rotation * offset;
        }
        Ok(Pose::new(base + offset, rotation))
    }

    /// Draws a random candidate point for `ingredient`, dropping points
    /// that became occupied or too close to placed objects.
    pub(crate) fn pick_candidate(&mut self, ingredient: usize) -> Result<Option<usize>> {
        let spacing = self.grid.spacing();
        let ing = self
            .ingredients
            .get(ingredient)
            .ok_or_else(|| Error::GridInconsistency(format!("unknown ingredient {ingredient}")))?;
        let wanted = ing.compartment;
        let list = self.candidates[ingredient].get_or_insert_with(|| {
            let ids = self.grid.compartment_ids();
            (0..self.grid.len()).filter(|&i| ids[i] == wanted).collect()
        });
        let occupied = self.grid.occupied();
        let distances = self.grid.distances();

        if ing.packing_mode == PackingMode::Close {
            // the band moves as distances tighten, so filter on every draw
            list.retain(|&i| !occupied[i]);
            let valid: Vec<usize> = list
                .iter()
                .copied()
                .filter(|&i| ing.accepts_distance(distances[i], spacing))
                .collect();
            if valid.is_empty() {
                return Ok(None);
            }
            return Ok(Some(valid[self.rng.gen_range(0..valid.len())]));
        }

        while !list.is_empty() {
            let k = self.rng.gen_range(0..list.len());
            let i = list[k];
            if occupied[i] || !ing.accepts_distance(distances[i], spacing) {
                list.swap_remove(k);
                continue;
            }
            return Ok(Some(i));
        }
        Ok(None)
    }

    /// Drops a rejected point from the ingredient's candidates.
    pub(crate) fn remove_candidate(&mut self, ingredient: usize, point: usize) {
        if let Some(Some(list)) = self.candidates.get_mut(ingredient) {
            if let Some(k) = list.iter().position(|&i| i == point) {
                list.swap_remove(k);
            }
        }
    }

    /// Candidate points still listed for `ingredient`, if its list was built.
    pub fn remaining_candidates(&self, ingredient: usize) -> Option<usize> {
        self.candidates.get(ingredient)?.as_ref().map(Vec::len)
    }

    /// Records an accepted pose: appends the instance, registers it (and
    /// its periodic images) in the index and tightens the distance field
    /// over the region of influence.
    pub(crate) fn commit(&mut self, ingredient: usize, grid_index: usize, pose: Pose) -> Result<usize> {
        let ing = self
            .ingredients
            .get(ingredient)
            .ok_or_else(|| Error::GridInconsistency(format!("unknown ingredient {ingredient}")))?;
        let radius = ing.encapsulating_radius();
        let reach = radius + self.influence_padding(ing);
        let id = self.instances.len();

        let mut copies = vec![pose.position];
        if self.config.periodic {
            copies.extend(self.grid.periodic_images(&pose.position, radius));
        }
        for (k, position) in copies.into_iter().enumerate() {
            let copy = Pose::new(position, pose.rotation);
            self.index.insert(id, ingredient, &copy, radius, k > 0);
            for i in self.grid.points_in_sphere(&position, reach) {
                let p = self.grid.positions()[i];
                let d = ing.sphere_tree.signed_distance(&copy, &p);
                self.grid.nearest_surface_distance_update(i, d)?;
                if d <= 0.0 {
                    self.grid.mark_occupied(i)?;
                }
            }
        }

        self.instances.push(PlacedInstance {
            id,
            ingredient,
            ingredient_name: ing.name.clone(),
            compartment: ing.compartment,
            position: pose.position,
            rotation: pose.rotation,
            grid_index,
        });
        self.ingredients[ingredient].place();
        Ok(id)
    }
}

/// Volume available to ingredients of signed compartment `number`.
fn region_volume(grid: &SpatialGrid, compartments: &CompartmentTree, number: i32) -> Result<f64> {
    if number == 0 {
        let ids = grid.compartment_ids();
        let free = (0..grid.base_len()).filter(|&i| ids[i] == 0).count();
        return Ok(free as f64 * grid.spacing().powi(3));
    }
    let compartment = compartments
        .by_number(number.saturating_abs())
        .ok_or_else(|| Error::Configuration(format!("unknown compartment {number}")))?;
    Ok(if number > 0 {
        compartment.surface_volume()
    } else {
        compartment.interior_volume()
    })
}
