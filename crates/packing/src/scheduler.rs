//! Placement scheduler.
//!
//! The scheduler drives a [`PackingContext`] one step at a time. Each step
//! picks the first active ingredient in priority order, draws one of its
//! candidate grid points and runs a [`PlacementAttempt`] there. Runs always
//! terminate: every step either places an instance, consumes a candidate
//! point or stops an ingredient.
//!
//! # Example
//!
//! ```
//! use u_cellpack::{Ingredient, PackingContext, PlacementScheduler, Recipe};
//! use u_cellpack_core::geometry::{Aabb3, Pt3};
//! use u_cellpack_core::PackingConfig;
//! use u_cellpack_grid::{Compartment, CompartmentTree};
//!
//! let mut tree = CompartmentTree::new();
//! tree.add(Compartment::sphere("vesicle", Pt3::origin(), 80.0), None).unwrap();
//! let recipe = Recipe::new("demo")
//!     .with_ingredient(Ingredient::sphere("protein", 8.0).with_compartment(-1).with_count(5));
//!
//! let context = PackingContext::build(
//!     PackingConfig::new().with_spacing(10.0).with_seed(42),
//!     Aabb3::from_center_half_extent(Pt3::origin(), 100.0),
//!     tree,
//!     recipe,
//! )
//! .unwrap();
//! let mut scheduler = PlacementScheduler::new(context);
//! let result = scheduler.run().unwrap();
//! assert!(result.placed_count() <= 5);
//! ```

use crate::collision::{CollisionEngine, CollisionStrategy};
use crate::context::PackingContext;
use crate::placement::{AttemptState, PlacementAttempt, RejectReason};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use u_cellpack_core::{
    Error, HookError, IngredientReport, NoopHook, PackingResult, Result, StopReason,
    VisualizationHook,
};

/// Result of one scheduler step.
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    /// An instance was accepted.
    Placed {
        /// Ingredient index.
        ingredient: usize,
        /// Instance id.
        instance: usize,
    },
    /// A candidate point was rejected.
    Rejected {
        /// Ingredient index.
        ingredient: usize,
        /// Rejected grid point.
        grid_index: usize,
        /// Last failing gate.
        reason: RejectReason,
    },
    /// An ingredient stopped before reaching its target.
    IngredientExhausted {
        /// Ingredient index.
        ingredient: usize,
        /// Why it stopped.
        reason: StopReason,
    },
    /// No active ingredient is left, or the attempt budget is spent.
    Finished,
    /// The run was cancelled.
    Cancelled,
}

/// Sequential placement driver.
pub struct PlacementScheduler {
    context: PackingContext,
    engine: CollisionEngine,
    hook: Box<dyn VisualizationHook>,
    cancelled: Arc<AtomicBool>,
    start: Instant,
    steps: u64,
    attempts: u64,
    was_cancelled: bool,
}

impl PlacementScheduler {
    /// Creates a scheduler with the sphere-tree narrow phase and no hook.
    pub fn new(context: PackingContext) -> Self {
        Self {
            context,
            engine: CollisionEngine::default(),
            hook: Box::new(NoopHook),
            cancelled: Arc::new(AtomicBool::new(false)),
            start: Instant::now(),
            steps: 0,
            attempts: 0,
            was_cancelled: false,
        }
    }

    /// Installs a visualization hook.
    pub fn with_hook(mut self, hook: Box<dyn VisualizationHook>) -> Self {
        self.hook = hook;
        self
    }

    /// Selects the narrow phase.
    pub fn with_collision_strategy(mut self, strategy: CollisionStrategy) -> Self {
        self.engine = CollisionEngine::new(strategy);
        self
    }

    /// Flag that cancels the run when set; checked between steps.
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancelled)
    }

    /// Requests cancellation.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    /// Run state.
    pub fn context(&self) -> &PackingContext {
        &self.context
    }

    /// Ends the run and hands back its state.
    pub fn into_context(self) -> PackingContext {
        self.context
    }

    /// Steps taken so far.
    pub fn steps(&self) -> u64 {
        self.steps
    }

    /// Ingredient indices by descending priority, then descending minimum
    /// radius, then descending completion. Ties keep recipe order.
    pub fn ingredient_order(&self) -> Vec<usize> {
        let ingredients = self.context.ingredients();
        let mut order: Vec<usize> = (0..ingredients.len()).collect();
        order.sort_by(|&a, &b| {
            let (a, b) = (&ingredients[a], &ingredients[b]);
            b.priority
                .total_cmp(&a.priority)
                .then_with(|| b.min_radius().total_cmp(&a.min_radius()))
                .then_with(|| b.completion().total_cmp(&a.completion()))
        });
        order
    }

    /// Overall completion: mean ingredient completion.
    pub fn completion(&self) -> f64 {
        let ingredients = self.context.ingredients();
        if ingredients.is_empty() {
            return 1.0;
        }
        ingredients.iter().map(|i| i.completion()).sum::<f64>() / ingredients.len() as f64
    }

    /// Performs one placement step.
    pub fn step(&mut self) -> Result<StepOutcome> {
        if self.cancelled.load(Ordering::Relaxed) {
            self.was_cancelled = true;
            return Ok(StepOutcome::Cancelled);
        }
        let budget = self.context.config().max_attempts;
        if budget > 0 && self.attempts >= budget {
            return Ok(StepOutcome::Finished);
        }
        let order = self.ingredient_order();
        let Some(ingredient) = order
            .into_iter()
            .find(|&i| self.context.ingredients()[i].is_active())
        else {
            return Ok(StepOutcome::Finished);
        };
        self.steps += 1;

        let Some(grid_index) = self.context.pick_candidate(ingredient)? else {
            let ing = self.context.ingredient_mut(ingredient)?;
            log::info!(
                "ingredient '{}' has no candidate point left ({}/{} placed)",
                ing.name,
                ing.placed(),
                ing.target()
            );
            ing.stop(StopReason::NoCandidates);
            self.engine.release(ingredient)?;
            self.report_progress();
            return Ok(StepOutcome::IngredientExhausted {
                ingredient,
                reason: StopReason::NoCandidates,
            });
        };

        self.attempts += 1;
        let attempt = PlacementAttempt::propose(&mut self.context, ingredient, grid_index)?;
        match attempt.run(&mut self.context, &mut self.engine)? {
            AttemptState::Accepted(pose) => {
                let instance = self.context.commit(ingredient, grid_index, pose)?;
                if !self.context.ingredients()[ingredient].is_active() {
                    self.engine.release(ingredient)?;
                }
                let placed = &self.context.instances()[instance];
                let hook = &mut *self.hook;
                notify(|| hook.on_instance_placed(placed));
                self.report_progress();
                Ok(StepOutcome::Placed {
                    ingredient,
                    instance,
                })
            }
            AttemptState::Rejected(reason) => {
                self.context.remove_candidate(ingredient, grid_index);
                if self.context.ingredient_mut(ingredient)?.reject() {
                    self.engine.release(ingredient)?;
                    self.report_progress();
                    Ok(StepOutcome::IngredientExhausted {
                        ingredient,
                        reason: StopReason::RejectionThreshold,
                    })
                } else {
                    Ok(StepOutcome::Rejected {
                        ingredient,
                        grid_index,
                        reason,
                    })
                }
            }
            other => Err(Error::GridInconsistency(format!(
                "placement attempt stopped in state {other:?}"
            ))),
        }
    }

    /// Steps until finished or cancelled and returns the result.
    pub fn run(&mut self) -> Result<PackingResult> {
        self.cancelled.store(false, Ordering::Relaxed);
        self.was_cancelled = false;
        self.start = Instant::now();
        let total: usize = self.context.ingredients().iter().map(|i| i.target()).sum();
        let hook = &mut *self.hook;
        notify(|| hook.on_start(total));
        loop {
            match self.step()? {
                StepOutcome::Finished | StepOutcome::Cancelled => break,
                _ => {}
            }
        }
        let result = self.result();
        let hook = &mut *self.hook;
        notify(|| hook.on_progress(1.0, "finished"));
        log::info!(
            "packing finished: {}/{} placed in {} attempts ({} ms)",
            result.placed_count(),
            result.total_target(),
            result.attempts,
            result.computation_time_ms
        );
        Ok(result)
    }

    /// Snapshot of the run as a result record. Ingredients still active
    /// are reported as interrupted.
    pub fn result(&self) -> PackingResult {
        let ingredients = self
            .context
            .ingredients()
            .iter()
            .map(|i| IngredientReport {
                name: i.name.clone(),
                compartment: i.compartment,
                target: i.target(),
                placed: i.placed(),
                completion: i.completion(),
                rejections: i.total_rejections(),
                stop_reason: i.stop_reason().unwrap_or(StopReason::Interrupted),
            })
            .collect();
        PackingResult {
            instances: self.context.instances().to_vec(),
            ingredients,
            attempts: self.attempts,
            ambiguous_points: self.context.ambiguous_points(),
            cancelled: self.was_cancelled,
            computation_time_ms: self.start.elapsed().as_millis() as u64,
        }
    }

    fn report_progress(&mut self) {
        let fraction = self.completion();
        let label = format!("{} placed", self.context.instances().len());
        let hook = &mut *self.hook;
        notify(|| hook.on_progress(fraction, &label));
    }
}

/// Calls a hook, logging failures and panics instead of propagating them.
fn notify<F>(call: F)
where
    F: FnOnce() -> std::result::Result<(), HookError>,
{
    match panic::catch_unwind(AssertUnwindSafe(call)) {
        Ok(Ok(())) => {}
        Ok(Err(e)) => log::warn!("visualization hook failed: {e}"),
        Err(_) => log::warn!("visualization hook panicked"),
    }
}
