//! Ingredient geometry and placement parameters.
//!
//! An [`Ingredient`] is a packable object type: a leveled [`SphereTree`] in
//! its local frame, the compartment region it belongs to, how many copies to
//! place and how candidate poses are perturbed. It also carries the running
//! counters the scheduler updates while packing.

use rand::Rng;
use rand_distr::{Distribution, Normal};
use std::f64::consts::PI;
use u_cellpack_core::geometry::{
    random_rotation, rotation_about_axis, rotation_between, Pt3, Rot3, Vec3, EPSILON,
};
use u_cellpack_core::{Error, Result, StopReason};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Molar concentration times cubic Ångström to molecule count.
pub const MOLAR_A3_TO_COUNT: f64 = 6.022e-4;

/// Position and orientation of an ingredient's local frame.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Pose {
    /// World position of the local origin.
    pub position: Pt3,
    /// Rotation applied to local coordinates.
    pub rotation: Rot3,
}

impl Pose {
    /// Creates a pose.
    pub fn new(position: Pt3, rotation: Rot3) -> Self {
        Self { position, rotation }
    }

    /// Unrotated pose at `position`.
    pub fn at(position: Pt3) -> Self {
        Self::new(position, Rot3::identity())
    }

    /// Maps a local point to world coordinates.
    pub fn apply(&self, local: &Vec3) -> Pt3 {
        self.position + self.rotation * local
    }
}

/// One level of a sphere hierarchy, in the ingredient's local frame.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SphereLevel {
    /// Sphere centres.
    pub centers: Vec<Vec3>,
    /// Sphere radii, parallel to `centers`.
    pub radii: Vec<f64>,
}

impl SphereLevel {
    /// Creates a level from parallel centre and radius lists.
    pub fn new(centers: Vec<Vec3>, radii: Vec<f64>) -> Self {
        Self { centers, radii }
    }

    /// Number of spheres.
    pub fn len(&self) -> usize {
        self.radii.len()
    }

    /// True when the level holds no sphere.
    pub fn is_empty(&self) -> bool {
        self.radii.is_empty()
    }
}

/// Coarse-to-fine bounding spheres of an ingredient.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SphereTree {
    levels: Vec<SphereLevel>,
}

impl SphereTree {
    /// Single sphere of `radius` centred on the local origin.
    pub fn single(radius: f64) -> Self {
        Self {
            levels: vec![SphereLevel::new(vec![Vec3::zeros()], vec![radius])],
        }
    }

    /// Builds a hierarchy, coarsest level first.
    pub fn new(levels: Vec<SphereLevel>) -> Result<Self> {
        if levels.is_empty() {
            return Err(Error::Configuration("sphere tree has no level".into()));
        }
        for (l, level) in levels.iter().enumerate() {
            if level.is_empty() || level.centers.len() != level.radii.len() {
                return Err(Error::Configuration(format!(
                    "sphere tree level {l} has {} centres and {} radii",
                    level.centers.len(),
                    level.radii.len()
                )));
            }
            if level.radii.iter().any(|r| !(r.is_finite() && *r > 0.0)) {
                return Err(Error::Configuration(format!(
                    "sphere tree level {l} has a non-positive radius"
                )));
            }
        }
        Ok(Self { levels })
    }

    /// All levels, coarsest first.
    pub fn levels(&self) -> &[SphereLevel] {
        &self.levels
    }

    /// Number of levels.
    pub fn depth(&self) -> usize {
        self.levels.len()
    }

    /// Finest level.
    pub fn finest(&self) -> &SphereLevel {
        &self.levels[self.levels.len() - 1]
    }

    /// Radius of the smallest origin-centred sphere enclosing every level.
    pub fn encapsulating_radius(&self) -> f64 {
        self.levels
            .iter()
            .flat_map(|l| l.centers.iter().zip(&l.radii))
            .map(|(c, r)| c.norm() + r)
            .fold(0.0, f64::max)
    }

    /// Smallest sphere radius on the coarsest level.
    pub fn min_radius(&self) -> f64 {
        self.levels[0].radii.iter().copied().fold(f64::INFINITY, f64::min)
    }

    /// World-space spheres of `level` (clamped to the finest) at `pose`.
    pub fn world_level(&self, level: usize, pose: &Pose) -> Vec<(Pt3, f64)> {
        let level = &self.levels[level.min(self.levels.len() - 1)];
        level
            .centers
            .iter()
            .zip(&level.radii)
            .map(|(c, &r)| (pose.apply(c), r))
            .collect()
    }

    /// Level walk between two posed hierarchies.
    ///
    /// Matching levels are compared coarse to fine; the first level with no
    /// overlapping pair clears the pair, and overlap on the finest pair of
    /// levels is a collision. Spheres that only touch do not overlap.
    pub fn overlaps(&self, pose: &Pose, other: &SphereTree, other_pose: &Pose) -> bool {
        let depth = self.depth().max(other.depth());
        for level in 0..depth {
            let mine = self.world_level(level, pose);
            let theirs = other.world_level(level, other_pose);
            let any = mine.iter().any(|(ca, ra)| {
                theirs
                    .iter()
                    .any(|(cb, rb)| (ca - cb).norm() < ra + rb - EPSILON)
            });
            if !any {
                return false;
            }
        }
        true
    }

    /// Signed distance from `p` to the finest spheres at `pose`, negative inside.
    pub fn signed_distance(&self, pose: &Pose, p: &Pt3) -> f64 {
        let finest = self.depth() - 1;
        self.world_level(finest, pose)
            .iter()
            .map(|(c, r)| (p - c).norm() - r)
            .fold(f64::INFINITY, f64::min)
    }
}

/// How the orientation of a candidate pose is drawn.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum RotationPolicy {
    /// Keep the local frame unrotated.
    None,
    /// Uniformly random rotation.
    #[default]
    Free,
    /// Spin about `axis` by a uniform angle in `[-range, range]`.
    FixedAxis {
        /// Spin axis.
        axis: Vec3,
        /// Largest spin angle in radians.
        range: f64,
    },
    /// Spin about `axis` by a normally distributed angle clamped to `[min, max]`.
    Biased {
        /// Spin axis.
        axis: Vec3,
        /// Smallest angle in radians.
        min: f64,
        /// Largest angle in radians.
        max: f64,
    },
}

/// Candidate point selection mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum PackingMode {
    /// Any free point far enough from placed objects.
    #[default]
    Random,
    /// Points close to already placed objects.
    Close,
    /// Points moved next to a placed partner instance.
    ClosePartner,
}

/// Binding rule to another ingredient.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Partner {
    /// Name of the partner ingredient.
    pub name: String,
    /// Binding site in the partner's local frame.
    pub offset: Vec3,
    /// Recipe index of the partner, set when the recipe is resolved.
    pub ingredient: Option<usize>,
}

#[derive(Debug, Clone, Default)]
struct IngredientState {
    target: usize,
    placed: usize,
    completion: f64,
    rejection_count: u32,
    total_rejections: u64,
    stop: Option<StopReason>,
}

/// A packable object type.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Ingredient {
    /// Display name, unique within a recipe.
    pub name: String,
    /// Collision geometry.
    pub sphere_tree: SphereTree,
    /// Signed compartment number: 0 free space, `+k` surface of `k`, `-k`
    /// interior of `k`.
    pub compartment: i32,
    /// Explicit instance count.
    pub count: usize,
    /// Molar concentration added on top of `count`.
    pub molarity: f64,
    /// Scheduling priority, higher first.
    pub priority: f64,
    /// Local axis aligned with the surface normal for surface ingredients.
    pub principal_vector: Vec3,
    /// Per-axis jitter in units of grid spacing.
    pub max_jitter: Vec3,
    /// Jittered poses tried per candidate point.
    pub jitter_attempts: usize,
    /// Orientation policy.
    pub rotation: RotationPolicy,
    /// Gaussian tilt applied to spin axes.
    pub perturb_axis_amplitude: f64,
    /// Consecutive rejections before the ingredient stops.
    pub rejection_threshold: u32,
    /// Margin kept from the grid faces.
    pub cutoff_boundary: Option<f64>,
    /// Minimum distance from compartment surfaces.
    pub cutoff_surface: f64,
    /// Candidate selection mode.
    pub packing_mode: PackingMode,
    /// Binding partners.
    pub partners: Vec<Partner>,
    /// Probability of ignoring partners on an attempt.
    pub proba_not_binding: f64,
    #[cfg_attr(feature = "serde", serde(skip))]
    state: IngredientState,
}

impl Ingredient {
    /// Creates an ingredient in free space with default placement parameters.
    pub fn new(name: impl Into<String>, sphere_tree: SphereTree) -> Self {
        Self {
            name: name.into(),
            sphere_tree,
            compartment: 0,
            count: 0,
            molarity: 0.0,
            priority: 0.0,
            principal_vector: Vec3::x(),
            max_jitter: Vec3::new(1.0, 1.0, 1.0),
            jitter_attempts: 5,
            rotation: RotationPolicy::Free,
            perturb_axis_amplitude: 0.1,
            rejection_threshold: 30,
            cutoff_boundary: None,
            cutoff_surface: 0.0,
            packing_mode: PackingMode::Random,
            partners: Vec::new(),
            proba_not_binding: 0.5,
            state: IngredientState::default(),
        }
    }

    /// Single-sphere ingredient.
    pub fn sphere(name: impl Into<String>, radius: f64) -> Self {
        Self::new(name, SphereTree::single(radius))
    }

    /// Sets the signed compartment number.
    pub fn with_compartment(mut self, compartment: i32) -> Self {
        self.compartment = compartment;
        self
    }

    /// Sets the explicit count.
    pub fn with_count(mut self, count: usize) -> Self {
        self.count = count;
        self
    }

    /// Sets the molarity.
    pub fn with_molarity(mut self, molarity: f64) -> Self {
        self.molarity = molarity;
        self
    }

    /// Sets the priority.
    pub fn with_priority(mut self, priority: f64) -> Self {
        self.priority = priority;
        self
    }

    /// Sets the principal vector.
    pub fn with_principal_vector(mut self, v: Vec3) -> Self {
        self.principal_vector = v;
        self
    }

    /// Sets the per-axis jitter.
    pub fn with_jitter(mut self, jitter: Vec3) -> Self {
        self.max_jitter = jitter;
        self
    }

    /// Sets the jitter attempts per candidate point.
    pub fn with_jitter_attempts(mut self, attempts: usize) -> Self {
        self.jitter_attempts = attempts;
        self
    }

    /// Sets the rotation policy.
    pub fn with_rotation(mut self, rotation: RotationPolicy) -> Self {
        self.rotation = rotation;
        self
    }

    /// Sets the spin axis perturbation.
    pub fn with_perturb_axis_amplitude(mut self, amplitude: f64) -> Self {
        self.perturb_axis_amplitude = amplitude;
        self
    }

    /// Sets the rejection threshold.
    pub fn with_rejection_threshold(mut self, threshold: u32) -> Self {
        self.rejection_threshold = threshold;
        self
    }

    /// Sets the grid face margin.
    pub fn with_cutoff_boundary(mut self, cutoff: f64) -> Self {
        self.cutoff_boundary = Some(cutoff);
        self
    }

    /// Sets the minimum distance from compartment surfaces.
    pub fn with_cutoff_surface(mut self, cutoff: f64) -> Self {
        self.cutoff_surface = cutoff;
        self
    }

    /// Sets the packing mode.
    pub fn with_packing_mode(mut self, mode: PackingMode) -> Self {
        self.packing_mode = mode;
        self
    }

    /// Adds a partner binding at `offset` in the partner's frame.
    pub fn with_partner(mut self, name: impl Into<String>, offset: Vec3) -> Self {
        self.partners.push(Partner {
            name: name.into(),
            offset,
            ingredient: None,
        });
        self
    }

    /// Sets the probability of ignoring partners.
    pub fn with_proba_not_binding(mut self, proba: f64) -> Self {
        self.proba_not_binding = proba;
        self
    }

    /// Checks the parameters, failing with [`Error::Configuration`].
    pub fn validate(&self) -> Result<()> {
        let fail = |what: &str| {
            Err(Error::Configuration(format!(
                "ingredient '{}': {what}",
                self.name
            )))
        };
        if self.name.is_empty() {
            return Err(Error::Configuration("ingredient without a name".into()));
        }
        SphereTree::new(self.sphere_tree.levels.clone())?;
        if !(self.molarity.is_finite() && self.molarity >= 0.0) {
            return fail("molarity must be finite and non-negative");
        }
        if !self.priority.is_finite() {
            return fail("priority must be finite");
        }
        if self.max_jitter.iter().any(|j| !(j.is_finite() && *j >= 0.0)) {
            return fail("jitter must be finite and non-negative");
        }
        if self.jitter_attempts == 0 {
            return fail("jitter attempts must be at least 1");
        }
        if self.rejection_threshold == 0 {
            return fail("rejection threshold must be at least 1");
        }
        if self.principal_vector.norm() < EPSILON {
            return fail("principal vector is zero");
        }
        if !(self.perturb_axis_amplitude.is_finite() && self.perturb_axis_amplitude >= 0.0) {
            return fail("axis perturbation must be finite and non-negative");
        }
        if !(0.0..=1.0).contains(&self.proba_not_binding) {
            return fail("binding probability must lie in [0, 1]");
        }
        if self.cutoff_boundary.is_some_and(|c| !(c.is_finite() && c >= 0.0))
            || !(self.cutoff_surface.is_finite() && self.cutoff_surface >= 0.0)
        {
            return fail("cutoffs must be finite and non-negative");
        }
        match self.rotation {
            RotationPolicy::FixedAxis { axis, range } => {
                if axis.norm() < EPSILON || !(range.is_finite() && range >= 0.0) {
                    return fail("fixed-axis rotation needs a non-zero axis and range >= 0");
                }
            }
            RotationPolicy::Biased { axis, min, max } => {
                if axis.norm() < EPSILON || !(min.is_finite() && max.is_finite() && min <= max) {
                    return fail("biased rotation needs a non-zero axis and min <= max");
                }
            }
            RotationPolicy::None | RotationPolicy::Free => {}
        }
        if self.packing_mode == PackingMode::ClosePartner && self.partners.is_empty() {
            return fail("close-partner mode without partners");
        }
        Ok(())
    }

    /// Whether this ingredient sits on a compartment surface.
    pub fn is_surface(&self) -> bool {
        self.compartment > 0
    }

    /// Encapsulating radius.
    pub fn encapsulating_radius(&self) -> f64 {
        self.sphere_tree.encapsulating_radius()
    }

    /// Smallest coarse-level radius.
    pub fn min_radius(&self) -> f64 {
        self.sphere_tree.min_radius()
    }

    /// Largest jitter displacement at `spacing`.
    pub fn max_jitter_distance(&self, spacing: f64) -> f64 {
        self.max_jitter.amax() * spacing
    }

    /// Minimum free-space distance a candidate point needs.
    pub fn cutoff(&self, spacing: f64) -> f64 {
        self.min_radius() - self.max_jitter_distance(spacing)
    }

    /// Whether a grid point at signed distance `d` is a candidate.
    pub fn accepts_distance(&self, d: f64, spacing: f64) -> bool {
        let cutoff = self.cutoff(spacing);
        match self.packing_mode {
            PackingMode::Close if cutoff > 0.0 => d >= cutoff / 2.0 && d <= cutoff,
            _ => d >= cutoff,
        }
    }

    /// Random translation inside the jitter ellipsoid with semi-axes
    /// `max_jitter * spacing / 2`.
    pub fn jitter_offset<R: Rng + ?Sized>(&self, spacing: f64, rng: &mut R) -> Vec3 {
        let amplitude = self.max_jitter * (spacing / 2.0);
        if amplitude.amax() <= 0.0 {
            return Vec3::zeros();
        }
        for _ in 0..64 {
            let mut offset = Vec3::zeros();
            let mut norm = 0.0;
            for axis in 0..3 {
                if amplitude[axis] > 0.0 {
                    let u: f64 = rng.gen_range(-1.0..=1.0);
                    offset[axis] = u * amplitude[axis];
                    norm += u * u;
                }
            }
            if norm <= 1.0 {
                return offset;
            }
        }
        Vec3::zeros()
    }

    /// Draws an orientation. Surface ingredients align the principal
    /// vector with `normal` and spin about it.
    pub fn pick_rotation<R: Rng + ?Sized>(&self, normal: Option<&Vec3>, rng: &mut R) -> Rot3 {
        let amplitude = self.perturb_axis_amplitude;
        if let Some(normal) = normal.filter(|_| self.is_surface()) {
            let align = rotation_between(&self.principal_vector, normal);
            if self.rotation == RotationPolicy::None {
                return align;
            }
            let axis = perturb_axis(normal, amplitude, rng);
            let tau = rng.gen_range(-PI..PI);
            return rotation_about_axis(&axis, tau) * align;
        }
        match self.rotation {
            RotationPolicy::None => Rot3::identity(),
            RotationPolicy::Free => random_rotation(rng),
            RotationPolicy::FixedAxis { axis, range } => {
                let axis = perturb_axis(&axis, amplitude, rng);
                let angle = if range > 0.0 {
                    rng.gen_range(-range..=range)
                } else {
                    0.0
                };
                rotation_about_axis(&axis, angle)
            }
            RotationPolicy::Biased { axis, min, max } => {
                let axis = perturb_axis(&axis, amplitude, rng);
                let mean = 0.5 * (min + max);
                let angle = match Normal::new(mean, 0.25 * (max - min)) {
                    Ok(dist) if max > min => dist.sample(rng).clamp(min, max),
                    _ => mean,
                };
                rotation_about_axis(&axis, angle)
            }
        }
    }

    /// Resets the counters and sets the target to `count` plus the molar
    /// share of `volume`.
    pub fn reset(&mut self, volume: f64) {
        let from_molarity = (self.molarity * volume.max(0.0) * MOLAR_A3_TO_COUNT).round() as usize;
        self.state = IngredientState {
            target: self.count + from_molarity,
            ..IngredientState::default()
        };
        if self.state.target == 0 {
            self.stop(StopReason::Completed);
        }
    }

    /// Records an accepted placement.
    pub fn place(&mut self) {
        let state = &mut self.state;
        state.placed += 1;
        state.rejection_count = 0;
        state.completion = if state.target == 0 {
            1.0
        } else {
            state.placed as f64 / state.target as f64
        };
        if state.placed >= state.target {
            self.stop(StopReason::Completed);
        }
    }

    /// Records a rejected candidate. Returns `true` when this rejection
    /// exhausted the ingredient.
    pub fn reject(&mut self) -> bool {
        self.state.rejection_count += 1;
        self.state.total_rejections += 1;
        if self.state.rejection_count >= self.rejection_threshold {
            log::info!(
                "premature ending of ingredient '{}' after {} rejections ({}/{} placed)",
                self.name,
                self.state.rejection_count,
                self.state.placed,
                self.state.target
            );
            self.stop(StopReason::RejectionThreshold);
            return true;
        }
        false
    }

    /// Stops the ingredient; any reason but an interruption marks it complete.
    pub fn stop(&mut self, reason: StopReason) {
        if self.state.stop.is_none() {
            self.state.stop = Some(reason);
            if reason != StopReason::Interrupted {
                self.state.completion = 1.0;
            }
        }
    }

    /// Requested instance count.
    pub fn target(&self) -> usize {
        self.state.target
    }

    /// Accepted instance count.
    pub fn placed(&self) -> usize {
        self.state.placed
    }

    /// Completion ratio.
    pub fn completion(&self) -> f64 {
        self.state.completion
    }

    /// Consecutive rejections since the last placement.
    pub fn rejection_count(&self) -> u32 {
        self.state.rejection_count
    }

    /// Rejections over the whole run.
    pub fn total_rejections(&self) -> u64 {
        self.state.total_rejections
    }

    /// Why the ingredient stopped, if it did.
    pub fn stop_reason(&self) -> Option<StopReason> {
        self.state.stop
    }

    /// Whether the scheduler should still try this ingredient.
    pub fn is_active(&self) -> bool {
        self.state.stop.is_none()
    }
}

/// Tilts `axis` by a clamped gaussian offset per component.
fn perturb_axis<R: Rng + ?Sized>(axis: &Vec3, amplitude: f64, rng: &mut R) -> Vec3 {
    let unit = axis.try_normalize(EPSILON).unwrap_or_else(Vec3::z);
    let Ok(dist) = Normal::new(0.0, amplitude) else {
        return unit;
    };
    if amplitude <= 0.0 {
        return unit;
    }
    let tilt = Vec3::new(
        dist.sample(rng).clamp(-amplitude, amplitude),
        dist.sample(rng).clamp(-amplitude, amplitude),
        dist.sample(rng).clamp(-amplitude, amplitude),
    );
    (unit + tilt).try_normalize(EPSILON).unwrap_or(unit)
}
