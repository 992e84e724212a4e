//! Engine configuration.

use crate::error::{Error, Result};
use std::fmt;
use std::str::FromStr;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Inside/outside classification algorithm used for mesh compartments.
///
/// Sphere and box compartments are always classified analytically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ClassificationMethod {
    /// Parity of ray crossings with exact predicates.
    #[default]
    RayCast,
    /// Sign of the offset to the nearest surface sample along its normal.
    Sidedness,
    /// Per-face projection into a neighbourhood followed by a scan-line fill.
    FloodFill,
    /// Trilinear sampling of a signed distance field.
    Voxel,
}

impl ClassificationMethod {
    /// Canonical lowercase name.
    pub fn name(&self) -> &'static str {
        match self {
            ClassificationMethod::RayCast => "raycast",
            ClassificationMethod::Sidedness => "sidedness",
            ClassificationMethod::FloodFill => "floodfill",
            ClassificationMethod::Voxel => "voxel",
        }
    }
}

impl fmt::Display for ClassificationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ClassificationMethod {
    type Err = Error;

    /// Accepts canonical names and the legacy recipe spellings.
    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "raycast" | "raytrace" | "ray" | "pyray" => Ok(ClassificationMethod::RayCast),
            "sidedness" | "bhtree" | "nearest" => Ok(ClassificationMethod::Sidedness),
            "floodfill" | "flood_fill" | "kevin" => Ok(ClassificationMethod::FloodFill),
            "voxel" | "sdf" | "utsdf" | "binvox" => Ok(ClassificationMethod::Voxel),
            other => Err(Error::Configuration(format!(
                "unknown classification method '{other}'"
            ))),
        }
    }
}

/// Configuration for grid construction and packing.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PackingConfig {
    /// Lattice spacing of the spatial grid.
    pub spacing: f64,
    /// Random seed. `None` seeds from entropy.
    pub seed: Option<u64>,
    /// Mesh classification algorithm.
    pub classification: ClassificationMethod,
    /// Wrap the packing domain periodically.
    pub periodic: bool,
    /// Check the whole sphere volume of a candidate against the grid, not
    /// just its centre.
    pub precise_region_check: bool,
    /// Cells per axis of the signed distance field used by
    /// [`ClassificationMethod::Voxel`].
    pub voxel_resolution: usize,
    /// Subdivide mesh edges and faces when sampling surface points.
    pub subdivide_surface: bool,
    /// Override for the region-of-influence padding after an acceptance.
    /// `None` derives it from the ingredient and the largest radius.
    pub influence_padding: Option<f64>,
    /// Stop after this many placement attempts (0 = unlimited).
    pub max_attempts: u64,
}

impl Default for PackingConfig {
    fn default() -> Self {
        Self {
            spacing: 20.0,
            seed: None,
            classification: ClassificationMethod::default(),
            periodic: false,
            precise_region_check: true,
            voxel_resolution: 32,
            subdivide_surface: false,
            influence_padding: None,
            max_attempts: 0,
        }
    }
}

impl PackingConfig {
    /// Creates a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the grid spacing.
    pub fn with_spacing(mut self, spacing: f64) -> Self {
        self.spacing = spacing;
        self
    }

    /// Sets a fixed random seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Sets the classification method.
    pub fn with_classification(mut self, method: ClassificationMethod) -> Self {
        self.classification = method;
        self
    }

    /// Enables or disables periodic boundaries.
    pub fn with_periodic(mut self, periodic: bool) -> Self {
        self.periodic = periodic;
        self
    }

    /// Enables or disables the sphere-volume grid check.
    pub fn with_precise_region_check(mut self, precise: bool) -> Self {
        self.precise_region_check = precise;
        self
    }

    /// Sets the signed distance field resolution.
    pub fn with_voxel_resolution(mut self, resolution: usize) -> Self {
        self.voxel_resolution = resolution;
        self
    }

    /// Enables surface subdivision when sampling mesh surfaces.
    pub fn with_subdivided_surface(mut self, subdivide: bool) -> Self {
        self.subdivide_surface = subdivide;
        self
    }

    /// Overrides the region-of-influence padding.
    pub fn with_influence_padding(mut self, padding: f64) -> Self {
        self.influence_padding = Some(padding);
        self
    }

    /// Caps the number of placement attempts.
    pub fn with_max_attempts(mut self, attempts: u64) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Rejects non-positive spacing and an unusable voxel resolution.
    pub fn validate(&self) -> Result<()> {
        if !(self.spacing.is_finite() && self.spacing > 0.0) {
            return Err(Error::Configuration(format!(
                "grid spacing must be positive, got {}",
                self.spacing
            )));
        }
        if self.voxel_resolution < 2 {
            return Err(Error::Configuration(format!(
                "voxel resolution must be at least 2, got {}",
                self.voxel_resolution
            )));
        }
        if let Some(pad) = self.influence_padding {
            if !(pad.is_finite() && pad >= 0.0) {
                return Err(Error::Configuration(format!(
                    "influence padding must be non-negative, got {pad}"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_from_legacy_names() {
        assert_eq!(
            "raytrace".parse::<ClassificationMethod>().ok(),
            Some(ClassificationMethod::RayCast)
        );
        assert_eq!(
            "bhtree".parse::<ClassificationMethod>().ok(),
            Some(ClassificationMethod::Sidedness)
        );
        assert_eq!(
            "Kevin".parse::<ClassificationMethod>().ok(),
            Some(ClassificationMethod::FloodFill)
        );
        assert_eq!(
            "utsdf".parse::<ClassificationMethod>().ok(),
            Some(ClassificationMethod::Voxel)
        );
    }

    #[test]
    fn test_unknown_method_is_configuration_error() {
        let err = "pymesh".parse::<ClassificationMethod>();
        assert!(matches!(err, Err(Error::Configuration(_))));
    }

    #[test]
    fn test_builder_and_validate() {
        let config = PackingConfig::new()
            .with_spacing(50.0)
            .with_seed(3)
            .with_classification(ClassificationMethod::Voxel)
            .with_periodic(true);
        assert_eq!(config.spacing, 50.0);
        assert_eq!(config.seed, Some(3));
        assert!(config.periodic);
        assert!(config.validate().is_ok());
        assert!(PackingConfig::new().with_spacing(0.0).validate().is_err());
        assert!(PackingConfig::new()
            .with_voxel_resolution(1)
            .validate()
            .is_err());
    }
}
