//! Packing result representation.

use crate::geometry::{Pt3, Rot3};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// One accepted placement.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PlacedInstance {
    /// Sequential instance id, in acceptance order.
    pub id: usize,
    /// Index of the ingredient in the recipe.
    pub ingredient: usize,
    /// Ingredient name.
    pub ingredient_name: String,
    /// Signed compartment number the ingredient belongs to
    /// (0 cytoplasm, +k surface of k, -k interior of k).
    pub compartment: i32,
    /// World position of the ingredient origin.
    pub position: Pt3,
    /// Orientation applied to the ingredient's local frame.
    pub rotation: Rot3,
    /// Grid point the placement was proposed at.
    pub grid_index: usize,
}

/// Why an ingredient stopped receiving placement attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum StopReason {
    /// Target count reached.
    Completed,
    /// Consecutive rejections reached the threshold.
    RejectionThreshold,
    /// No candidate grid points were left.
    NoCandidates,
    /// Still active when the run ended (cancelled or attempt cap).
    Interrupted,
}

/// Per-ingredient summary.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct IngredientReport {
    /// Ingredient name.
    pub name: String,
    /// Signed compartment number.
    pub compartment: i32,
    /// Requested instance count.
    pub target: usize,
    /// Accepted instance count.
    pub placed: usize,
    /// Completion ratio; 1.0 once the ingredient stopped for any reason
    /// other than an interruption.
    pub completion: f64,
    /// Total rejected attempts over the run.
    pub rejections: u64,
    /// Why the ingredient stopped.
    pub stop_reason: StopReason,
}

/// Result of a packing run.
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PackingResult {
    /// Accepted placements in acceptance order.
    pub instances: Vec<PlacedInstance>,
    /// One report per ingredient in recipe order.
    pub ingredients: Vec<IngredientReport>,
    /// Placement attempts made.
    pub attempts: u64,
    /// Grid points whose classification needed a fallback.
    pub ambiguous_points: usize,
    /// Whether the run was cancelled early.
    pub cancelled: bool,
    /// Computation time in milliseconds.
    pub computation_time_ms: u64,
}

impl PackingResult {
    /// Creates a new empty result.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of accepted placements.
    pub fn placed_count(&self) -> usize {
        self.instances.len()
    }

    /// Sum of all ingredient targets.
    pub fn total_target(&self) -> usize {
        self.ingredients.iter().map(|r| r.target).sum()
    }

    /// True when every ingredient reached its target.
    pub fn all_complete(&self) -> bool {
        self.ingredients.iter().all(|r| r.placed >= r.target)
    }

    /// Instances of one ingredient.
    pub fn instances_of(&self, ingredient: usize) -> impl Iterator<Item = &PlacedInstance> {
        self.instances
            .iter()
            .filter(move |i| i.ingredient == ingredient)
    }
}
