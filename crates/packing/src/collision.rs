//! Placement gates.
//!
//! A candidate pose must pass three independent gates, any failure being a
//! full rejection:
//!
//! | Gate | Test |
//! |------|------|
//! | region | nearest grid point carries the ingredient's compartment id, every grid point under its spheres does too, and no sphere crosses a compartment surface |
//! | boundary | inside the grid box shrunk by `cutoff_boundary`, and `cutoff_surface` away from foreign compartment surfaces |
//! | collision | no grid point under its spheres lies inside a placed object, no placed instance overlaps it |
//!
//! The collision gate runs a broad phase over the instance index
//! (encapsulating spheres) and a narrow phase chosen by
//! [`CollisionStrategy`].

use crate::context::PackingContext;
use crate::ingredient::{Ingredient, Pose};
use crate::physics::{BodyHandle, PhysicsBackend};
use crate::placement::RejectReason;
use std::collections::HashMap;
use std::fmt;
use u_cellpack_core::geometry::{Pt3, EPSILON};
use u_cellpack_core::Result;

/// Narrow phase used after the encapsulating-sphere broad phase.
#[derive(Default)]
pub enum CollisionStrategy {
    /// Coarse-to-fine sphere hierarchy walk.
    #[default]
    SphereTree,
    /// Contact queries delegated to a physics backend.
    Physics(Box<dyn PhysicsBackend>),
}

impl CollisionStrategy {
    /// Short name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::SphereTree => "sphere-tree",
            Self::Physics(_) => "physics",
        }
    }
}

impl fmt::Debug for CollisionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Runs the placement gates against a [`PackingContext`].
#[derive(Debug, Default)]
pub struct CollisionEngine {
    strategy: CollisionStrategy,
    bodies: HashMap<usize, BodyHandle>,
    candidates: HashMap<usize, BodyHandle>,
}

impl CollisionEngine {
    /// Creates an engine with `strategy` as the narrow phase.
    pub fn new(strategy: CollisionStrategy) -> Self {
        Self {
            strategy,
            bodies: HashMap::new(),
            candidates: HashMap::new(),
        }
    }

    /// Narrow phase in use.
    pub fn strategy(&self) -> &CollisionStrategy {
        &self.strategy
    }

    /// Bodies registered with the physics backend, 0 for the sphere tree.
    pub fn body_count(&self) -> usize {
        match &self.strategy {
            CollisionStrategy::SphereTree => 0,
            CollisionStrategy::Physics(backend) => backend.body_count(),
        }
    }

    /// Drops the candidate body kept for `ingredient`. Called once the
    /// ingredient stops placing.
    pub fn release(&mut self, ingredient: usize) -> Result<()> {
        let Some(handle) = self.candidates.remove(&ingredient) else {
            return Ok(());
        };
        match &mut self.strategy {
            CollisionStrategy::Physics(backend) => backend.remove_rigid_body(handle),
            CollisionStrategy::SphereTree => Ok(()),
        }
    }

    /// Runs every gate in order and returns the first failure.
    pub fn validate(
        &mut self,
        ctx: &PackingContext,
        ingredient: usize,
        pose: &Pose,
    ) -> Result<Option<RejectReason>> {
        let ing = ctx.ingredient(ingredient)?;
        let p = &pose.position;
        if !inside_grid(ctx, ing, p) {
            return Ok(Some(RejectReason::OutOfBounds));
        }
        if !point_in_correct_region(ctx, ing, p) {
            return Ok(Some(RejectReason::WrongRegion));
        }
        if !far_enough_from_surfaces(ctx, ing, p) {
            return Ok(Some(RejectReason::TooCloseToSurface));
        }
        if !volume_in_region(ctx, ing, pose) {
            return Ok(Some(RejectReason::WrongRegion));
        }
        if self.check(ctx, ingredient, pose)? {
            return Ok(Some(RejectReason::Collision));
        }
        Ok(None)
    }

    /// Collision gate alone: `true` when the pose hits a placed object.
    pub fn check(&mut self, ctx: &PackingContext, ingredient: usize, pose: &Pose) -> Result<bool> {
        let ing = ctx.ingredient(ingredient)?;
        let grid = ctx.grid();
        let distances = grid.distances();
        for (center, radius) in ing.sphere_tree.world_level(usize::MAX, pose) {
            if grid
                .points_in_sphere(&center, radius)
                .into_iter()
                .any(|i| distances[i] < 0.0)
            {
                return Ok(true);
            }
        }

        let radius = ing.encapsulating_radius();
        let mut copies = vec![pose.position];
        if ctx.config().periodic {
            copies.extend(grid.periodic_images(&pose.position, radius));
        }
        for position in copies {
            let moved = Pose::new(position, pose.rotation);
            for entry in ctx.index().query_overlapping(&position, radius) {
                let other = ctx.ingredient(entry.ingredient)?;
                let hit = match &mut self.strategy {
                    CollisionStrategy::SphereTree => {
                        ing.sphere_tree
                            .overlaps(&moved, &other.sphere_tree, &entry.pose())
                    }
                    CollisionStrategy::Physics(backend) => {
                        let body = *self
                            .bodies
                            .entry(entry.slot)
                            .or_insert_with(|| backend.add_rigid_body(&other.sphere_tree, &entry.pose()));
                        let candidate = match self.candidates.get(&ingredient) {
                            Some(&h) => {
                                backend.set_pose(h, &moved)?;
                                h
                            }
                            None => {
                                let h = backend.add_rigid_body(&ing.sphere_tree, &moved);
                                self.candidates.insert(ingredient, h);
                                h
                            }
                        };
                        backend.test_contact(candidate, body)?
                    }
                };
                if hit {
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }
}

/// Grid bounds gate: `p` inside the grid box shrunk by `cutoff_boundary`.
pub fn inside_grid(ctx: &PackingContext, ingredient: &Ingredient, p: &Pt3) -> bool {
    match ingredient.cutoff_boundary {
        Some(margin) => ctx.grid().bbox().contains_point_with_margin(p, margin),
        None => true,
    }
}

/// Region gate on the nearest grid point.
///
/// Surface ingredients of compartment `k` accept `k` and `-k`; interior
/// ingredients need `-k` and, with the precise check, containment in the
/// compartment; free-space ingredients need 0 and, with the precise check,
/// no containing compartment.
pub fn point_in_correct_region(ctx: &PackingContext, ingredient: &Ingredient, p: &Pt3) -> bool {
    let grid = ctx.grid();
    let id = grid.compartment_ids()[grid.nearest_index(p)];
    let comp = ingredient.compartment;
    let precise = ctx.config().precise_region_check;
    if comp > 0 {
        id == comp || id == -comp
    } else if comp < 0 {
        id == comp
            && (!precise
                || ctx
                    .compartments()
                    .by_number(-comp)
                    .is_some_and(|c| c.contains_point(p)))
    } else {
        id == 0 && (!precise || ctx.compartments().iter().all(|c| !c.contains_point(p)))
    }
}

/// Surface clearance gate: `p` at least `cutoff_surface` from the surface
/// of every compartment, skipping the ingredient's own compartment for
/// surface ingredients.
pub fn far_enough_from_surfaces(ctx: &PackingContext, ingredient: &Ingredient, p: &Pt3) -> bool {
    let cutoff = ingredient.cutoff_surface;
    if cutoff <= 0.0 {
        return true;
    }
    ctx.compartments()
        .iter()
        .filter(|c| !(ingredient.is_surface() && c.number() == ingredient.compartment))
        .all(|c| c.surface_distance(p) >= cutoff)
}

/// Every grid point under the finest spheres carries the ingredient's id,
/// and no finest sphere crosses a compartment surface. Surface ingredients
/// straddle their membrane and skip this gate.
pub fn volume_in_region(ctx: &PackingContext, ingredient: &Ingredient, pose: &Pose) -> bool {
    if ingredient.is_surface() || !ctx.config().precise_region_check {
        return true;
    }
    let grid = ctx.grid();
    let ids = grid.compartment_ids();
    ingredient
        .sphere_tree
        .world_level(usize::MAX, pose)
        .iter()
        .all(|(center, radius)| {
            grid.points_in_sphere(center, *radius)
                .into_iter()
                .all(|i| ids[i] == ingredient.compartment)
                && ctx
                    .compartments()
                    .iter()
                    .all(|c| c.surface_distance(center) >= *radius - EPSILON)
        })
}
