//! Single placement attempt as a bounded state machine.
//!
//! ```text
//! Proposed ──jitter──▶ Jittered ──gates pass──▶ Validated ──▶ Accepted
//!    ▲                    │
//!    └────gates fail──────┘   (after jitter_attempts tries: Rejected)
//! ```
//!
//! Each call to [`PlacementAttempt::advance`] performs one transition, so
//! every edge can be driven and inspected on its own.

use crate::collision::CollisionEngine;
use crate::context::PackingContext;
use crate::ingredient::{PackingMode, Pose};
use rand::Rng;
use u_cellpack_core::geometry::{Pt3, Vec3};
use u_cellpack_core::Result;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Why a candidate point was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum RejectReason {
    /// Outside the grid box minus the boundary margin.
    OutOfBounds,
    /// Nearest grid point, or a point under the spheres, belongs to another region.
    WrongRegion,
    /// Closer than `cutoff_surface` to a compartment surface.
    TooCloseToSurface,
    /// Overlaps a placed instance.
    Collision,
    /// No placed partner to bind to.
    NoPartner,
}

/// State of a placement attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum AttemptState {
    /// Start position chosen, waiting for the next jitter.
    Proposed {
        /// Unjittered position.
        base: Pt3,
        /// Surface normal used to orient surface ingredients.
        normal: Option<Vec3>,
    },
    /// Perturbed pose awaiting the gates.
    Jittered(Pose),
    /// Pose passed every gate.
    Validated(Pose),
    /// Terminal: pose to commit.
    Accepted(Pose),
    /// Terminal: the candidate point failed.
    Rejected(RejectReason),
}

impl AttemptState {
    /// Whether no further transition is possible.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Accepted(_) | Self::Rejected(_))
    }
}

/// One ingredient at one candidate grid point.
#[derive(Debug, Clone)]
pub struct PlacementAttempt {
    ingredient: usize,
    grid_index: usize,
    state: AttemptState,
    tries: usize,
    base: Pt3,
    normal: Option<Vec3>,
    last_reason: Option<RejectReason>,
}

impl PlacementAttempt {
    /// Proposes `ingredient` at grid point `grid_index`.
    ///
    /// Surface ingredients pick up the surface normal of the point. In
    /// close-partner mode the start moves to the binding site of the
    /// nearest placed partner, unless the binding is skipped with
    /// probability `proba_not_binding`; with no partner placed yet only
    /// the first instance may go ahead.
    pub fn propose(ctx: &mut PackingContext, ingredient: usize, grid_index: usize) -> Result<Self> {
        let position = ctx.grid().position(grid_index)?;
        let ing = ctx.ingredient(ingredient)?;
        let normal = if ing.is_surface() {
            ctx.compartments().by_number(ing.compartment).and_then(|c| {
                c.surface_normal(grid_index)
                    .or_else(|| c.nearest_surface(&position).map(|hit| hit.normal))
            })
        } else {
            None
        };

        let mut attempt = Self {
            ingredient,
            grid_index,
            state: AttemptState::Proposed {
                base: position,
                normal,
            },
            tries: 0,
            base: position,
            normal,
            last_reason: None,
        };

        if ing.packing_mode == PackingMode::ClosePartner && !ing.partners.is_empty() {
            let skip_probability = ing.proba_not_binding;
            let placed = ing.placed();
            let partners: Vec<(usize, Vec3)> = ing
                .partners
                .iter()
                .filter_map(|p| p.ingredient.map(|id| (id, p.offset)))
                .collect();
            if ctx.rng().gen::<f64>() >= skip_probability {
                let ids: Vec<usize> = partners.iter().map(|(id, _)| *id).collect();
                let site = ctx.index().nearest_of(&position, &ids).and_then(|entry| {
                    partners
                        .iter()
                        .find(|(id, _)| *id == entry.ingredient)
                        .map(|(_, offset)| entry.pose().apply(offset))
                });
                match site {
                    Some(site) => {
                        attempt.base = site;
                        attempt.state = AttemptState::Proposed { base: site, normal };
                    }
                    None if placed > 0 => {
                        attempt.state = AttemptState::Rejected(RejectReason::NoPartner);
                    }
                    None => {}
                }
            }
        }
        Ok(attempt)
    }

    /// Current state.
    pub fn state(&self) -> &AttemptState {
        &self.state
    }

    /// Jittered poses tried so far.
    pub fn tries(&self) -> usize {
        self.tries
    }

    /// Ingredient index.
    pub fn ingredient(&self) -> usize {
        self.ingredient
    }

    /// Grid point the attempt started from.
    pub fn grid_index(&self) -> usize {
        self.grid_index
    }

    /// Performs one transition.
    pub fn advance(&mut self, ctx: &mut PackingContext, engine: &mut CollisionEngine) -> Result<&AttemptState> {
        let next = match &self.state {
            AttemptState::Proposed { .. } => {
                if self.tries >= ctx.ingredient(self.ingredient)?.jitter_attempts {
                    AttemptState::Rejected(self.last_reason.unwrap_or(RejectReason::Collision))
                } else {
                    self.tries += 1;
                    let pose = ctx.jittered_pose(self.ingredient, &self.base, self.normal.as_ref())?;
                    AttemptState::Jittered(pose)
                }
            }
            AttemptState::Jittered(pose) => match engine.validate(ctx, self.ingredient, pose)? {
                None => AttemptState::Validated(*pose),
                Some(reason) => {
                    log::debug!(
                        "ingredient {} at point {}: try {} rejected ({reason:?})",
                        self.ingredient,
                        self.grid_index,
                        self.tries
                    );
                    self.last_reason = Some(reason);
                    AttemptState::Proposed {
                        base: self.base,
                        normal: self.normal,
                    }
                }
            },
            AttemptState::Validated(pose) => AttemptState::Accepted(*pose),
            terminal => terminal.clone(),
        };
        self.state = next;
        Ok(&self.state)
    }

    /// Advances until a terminal state and returns it.
    pub fn run(mut self, ctx: &mut PackingContext, engine: &mut CollisionEngine) -> Result<AttemptState> {
        while !self.state.is_terminal() {
            self.advance(ctx, engine)?;
        }
        Ok(self.state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingredient::Ingredient;
    use crate::recipe::Recipe;
    use u_cellpack_core::geometry::Aabb3;
    use u_cellpack_core::PackingConfig;
    use u_cellpack_grid::{Compartment, CompartmentTree};

    fn scene(recipe: Recipe) -> PackingContext {
        let mut tree = CompartmentTree::new();
        tree.add(Compartment::sphere("vesicle", Pt3::origin(), 50.0), None)
            .unwrap();
        PackingContext::build(
            PackingConfig::new().with_spacing(10.0).with_seed(9),
            Aabb3::from_center_half_extent(Pt3::origin(), 100.0),
            tree,
            recipe,
        )
        .unwrap()
    }

    #[test]
    fn test_transitions_to_accept() {
        let recipe = Recipe::new("r").with_ingredient(Ingredient::sphere("a", 3.0).with_count(1));
        let mut ctx = scene(recipe);
        let mut engine = CollisionEngine::default();
        let gi = ctx.grid().nearest_index(&Pt3::new(80.0, 80.0, 80.0));
        let mut attempt = PlacementAttempt::propose(&mut ctx, 0, gi).unwrap();
        assert!(matches!(attempt.state(), AttemptState::Proposed { .. }));

        assert!(matches!(attempt.advance(&mut ctx, &mut engine).unwrap(), AttemptState::Jittered(_)));
        assert_eq!(attempt.tries(), 1);
        assert!(matches!(attempt.advance(&mut ctx, &mut engine).unwrap(), AttemptState::Validated(_)));
        let state = attempt.advance(&mut ctx, &mut engine).unwrap().clone();
        let AttemptState::Accepted(pose) = state else {
            panic!("expected acceptance, got {state:?}");
        };
        assert!((pose.position - Pt3::new(80.0, 80.0, 80.0)).norm() <= 5.0 + 1e-9);
        // terminal states do not move
        assert_eq!(attempt.advance(&mut ctx, &mut engine).unwrap(), &state);
    }

    #[test]
    fn test_exhausted_jitter_rejects() {
        let recipe = Recipe::new("r").with_ingredient(
            Ingredient::sphere("a", 3.0)
                .with_count(1)
                .with_jitter_attempts(3)
                .with_cutoff_surface(1.0e6),
        );
        let mut ctx = scene(recipe);
        let mut engine = CollisionEngine::default();
        let gi = ctx.grid().nearest_index(&Pt3::new(80.0, 80.0, 80.0));
        let mut attempt = PlacementAttempt::propose(&mut ctx, 0, gi).unwrap();
        for _ in 0..3 {
            attempt.advance(&mut ctx, &mut engine).unwrap();
            assert!(matches!(
                attempt.advance(&mut ctx, &mut engine).unwrap(),
                AttemptState::Proposed { .. }
            ));
        }
        assert_eq!(
            attempt.advance(&mut ctx, &mut engine).unwrap(),
            &AttemptState::Rejected(RejectReason::TooCloseToSurface)
        );
        assert_eq!(attempt.tries(), 3);
    }

    #[test]
    fn test_surface_attempt_uses_normal() {
        let recipe = Recipe::new("r").with_ingredient(
            Ingredient::sphere("m", 3.0)
                .with_compartment(1)
                .with_count(1)
                .with_principal_vector(Vec3::z()),
        );
        let mut ctx = scene(recipe);
        let surface = ctx.compartments().get(0).unwrap().surface_points()[0];
        let attempt = PlacementAttempt::propose(&mut ctx, 0, surface).unwrap();
        let AttemptState::Proposed { base, normal } = attempt.state() else {
            panic!("unexpected {:?}", attempt.state());
        };
        let normal = normal.expect("surface normal");
        let radial = base.coords.normalize();
        assert!(normal.dot(&radial) > 0.9);
    }

    #[test]
    fn test_partner_binding() {
        let recipe = Recipe::new("r")
            .with_ingredient(Ingredient::sphere("anchor", 4.0).with_count(1))
            .with_ingredient(
                Ingredient::sphere("bound", 2.0)
                    .with_count(2)
                    .with_packing_mode(PackingMode::ClosePartner)
                    .with_partner("anchor", Vec3::new(0.0, 0.0, 6.0))
                    .with_proba_not_binding(0.0),
            );
        let mut ctx = scene(recipe);
        let gi = ctx.grid().nearest_index(&Pt3::new(80.0, 80.0, 80.0));

        // nothing placed at all: the first instance may go ahead unbound
        let free = PlacementAttempt::propose(&mut ctx, 1, gi).unwrap();
        assert!(matches!(free.state(), AttemptState::Proposed { .. }));

        let anchor_at = Pt3::new(-80.0, -80.0, -80.0);
        let anchor_gi = ctx.grid().nearest_index(&anchor_at);
        ctx.commit(0, anchor_gi, Pose::at(anchor_at)).unwrap();
        let bound = PlacementAttempt::propose(&mut ctx, 1, gi).unwrap();
        assert_eq!(
            bound.state(),
            &AttemptState::Proposed {
                base: Pt3::new(-80.0, -80.0, -74.0),
                normal: None
            }
        );
    }

    #[test]
    fn test_missing_partner_after_first_placement() {
        let recipe = Recipe::new("r")
            .with_ingredient(Ingredient::sphere("anchor", 4.0).with_count(1))
            .with_ingredient(
                Ingredient::sphere("bound", 2.0)
                    .with_count(3)
                    .with_packing_mode(PackingMode::ClosePartner)
                    .with_partner("anchor", Vec3::zeros())
                    .with_proba_not_binding(0.0),
            );
        let mut ctx = scene(recipe);
        let first = Pt3::new(80.0, 80.0, 80.0);
        let gi = ctx.grid().nearest_index(&first);
        ctx.commit(1, gi, Pose::at(first)).unwrap();
        let attempt = PlacementAttempt::propose(&mut ctx, 1, gi).unwrap();
        assert_eq!(attempt.state(), &AttemptState::Rejected(RejectReason::NoPartner));
    }
}
