//! Scene-wide lattice of candidate points.
//!
//! The grid owns, for every point, its position, a signed distance to the
//! nearest known surface, a signed compartment id and an occupancy flag.
//! Points are laid out row-major (`index = z * nx * ny + y * nx + x`); extra
//! surface samples appended with [`SpatialGrid::append_off_grid_points`]
//! follow the lattice and are tracked in an R-tree for range queries.
//!
//! # Compartment ids
//!
//! - `0`: outside every compartment
//! - `+k`: surface of compartment `k`
//! - `-k`: interior of compartment `k`

use rstar::primitives::GeomWithData;
use rstar::{RTree, AABB};
use std::ops::Range;
use u_cellpack_core::geometry::{Aabb3, Pt3, Vec3};
use u_cellpack_core::{Error, Result};

/// Upper bound on lattice size, guards against runaway allocations.
const MAX_LATTICE_POINTS: usize = 256 * 1024 * 1024;

type OffGridPoint = GeomWithData<[f64; 3], usize>;

/// Regular lattice plus appended off-grid points.
#[derive(Debug, Clone)]
pub struct SpatialGrid {
    bbox: Aabb3,
    spacing: f64,
    dims: [usize; 3],
    base_len: usize,
    diagonal: f64,
    positions: Vec<Pt3>,
    distances: Vec<f64>,
    compartment_ids: Vec<i32>,
    occupied: Vec<bool>,
    off_grid: RTree<OffGridPoint>,
}

impl SpatialGrid {
    /// Allocates a lattice covering `bbox` at `spacing`.
    ///
    /// Every distance starts at the box diagonal and every id at 0.
    pub fn build(bbox: Aabb3, spacing: f64) -> Result<Self> {
        if !(spacing.is_finite() && spacing > 0.0) {
            return Err(Error::Configuration(format!(
                "grid spacing must be positive, got {spacing}"
            )));
        }
        if bbox.is_degenerate() {
            return Err(Error::Configuration(format!(
                "degenerate grid bounding box {:?} .. {:?}",
                bbox.min, bbox.max
            )));
        }

        let size = bbox.size();
        let mut dims = [0usize; 3];
        for (i, d) in dims.iter_mut().enumerate() {
            *d = (size[i] / spacing + 1e-9).floor() as usize + 1;
        }
        let base_len = dims
            .iter()
            .try_fold(1usize, |acc, &d| acc.checked_mul(d))
            .filter(|&n| n <= MAX_LATTICE_POINTS)
            .ok_or_else(|| {
                Error::Configuration(format!(
                    "grid of {}x{}x{} points is too large",
                    dims[0], dims[1], dims[2]
                ))
            })?;

        let mut positions = Vec::with_capacity(base_len);
        for z in 0..dims[2] {
            for y in 0..dims[1] {
                for x in 0..dims[0] {
                    positions.push(
                        bbox.min + Vec3::new(x as f64, y as f64, z as f64) * spacing,
                    );
                }
            }
        }

        let diagonal = bbox.diagonal();
        log::debug!(
            "built {}x{}x{} grid ({} points) at spacing {}",
            dims[0],
            dims[1],
            dims[2],
            base_len,
            spacing
        );

        Ok(Self {
            bbox,
            spacing,
            dims,
            base_len,
            diagonal,
            positions,
            distances: vec![diagonal; base_len],
            compartment_ids: vec![0; base_len],
            occupied: vec![false; base_len],
            off_grid: RTree::new(),
        })
    }

    /// Bounding box the lattice was built for.
    pub fn bbox(&self) -> &Aabb3 {
        &self.bbox
    }

    /// Lattice spacing.
    pub fn spacing(&self) -> f64 {
        self.spacing
    }

    /// Lattice point counts along x, y and z.
    pub fn dims(&self) -> [usize; 3] {
        self.dims
    }

    /// Diagonal of the grid box, the initial distance of every point.
    pub fn diagonal(&self) -> f64 {
        self.diagonal
    }

    /// Number of regular lattice points.
    pub fn base_len(&self) -> usize {
        self.base_len
    }

    /// Total number of points including off-grid points.
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    /// True when the grid holds no points.
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// True for indices appended after the lattice.
    pub fn is_off_grid(&self, index: usize) -> bool {
        index >= self.base_len
    }

    /// All positions.
    pub fn positions(&self) -> &[Pt3] {
        &self.positions
    }

    /// All signed distances.
    pub fn distances(&self) -> &[f64] {
        &self.distances
    }

    /// All compartment ids.
    pub fn compartment_ids(&self) -> &[i32] {
        &self.compartment_ids
    }

    /// All occupancy flags.
    pub fn occupied(&self) -> &[bool] {
        &self.occupied
    }

    fn check_index(&self, index: usize) -> Result<()> {
        if index < self.positions.len() {
            Ok(())
        } else {
            Err(Error::GridInconsistency(format!(
                "grid index {index} out of bounds (len {})",
                self.positions.len()
            )))
        }
    }

    /// Position of point `index`.
    pub fn position(&self, index: usize) -> Result<Pt3> {
        self.check_index(index)?;
        Ok(self.positions[index])
    }

    /// Signed distance of point `index`.
    pub fn distance(&self, index: usize) -> Result<f64> {
        self.check_index(index)?;
        Ok(self.distances[index])
    }

    /// Compartment id of point `index`.
    pub fn compartment_id(&self, index: usize) -> Result<i32> {
        self.check_index(index)?;
        Ok(self.compartment_ids[index])
    }

    /// Occupancy of point `index`.
    pub fn is_occupied(&self, index: usize) -> Result<bool> {
        self.check_index(index)?;
        Ok(self.occupied[index])
    }

    /// Overwrites the compartment id of point `index`.
    pub fn set_compartment_id(&mut self, index: usize, id: i32) -> Result<()> {
        self.check_index(index)?;
        self.compartment_ids[index] = id;
        Ok(())
    }

    /// Marks point `index` as covered by a placed object.
    pub fn mark_occupied(&mut self, index: usize) -> Result<()> {
        self.check_index(index)?;
        self.occupied[index] = true;
        Ok(())
    }

    /// Row-major index of lattice coordinates.
    #[inline]
    pub fn lattice_index(&self, x: usize, y: usize, z: usize) -> usize {
        z * self.dims[0] * self.dims[1] + y * self.dims[0] + x
    }

    /// Lattice coordinates of a regular point, `None` for off-grid points.
    pub fn lattice_coords(&self, index: usize) -> Option<[usize; 3]> {
        if index >= self.base_len {
            return None;
        }
        let plane = self.dims[0] * self.dims[1];
        let z = index / plane;
        let rem = index % plane;
        Some([rem % self.dims[0], rem / self.dims[0], z])
    }

    /// Indices of the up to six face-adjacent lattice neighbours.
    pub fn lattice_neighbors(&self, index: usize) -> Vec<usize> {
        let Some([x, y, z]) = self.lattice_coords(index) else {
            return Vec::new();
        };
        let mut out = Vec::with_capacity(6);
        let c = [x, y, z];
        for axis in 0..3 {
            if c[axis] > 0 {
                let mut n = c;
                n[axis] -= 1;
                out.push(self.lattice_index(n[0], n[1], n[2]));
            }
            if c[axis] + 1 < self.dims[axis] {
                let mut n = c;
                n[axis] += 1;
                out.push(self.lattice_index(n[0], n[1], n[2]));
            }
        }
        out
    }

    fn tolerance(&self) -> f64 {
        1e-9 * self.spacing.max(1.0)
    }

    /// Inclusive lattice range covering `[lo, hi]` along `axis`.
    fn axis_range(&self, axis: usize, lo: f64, hi: f64) -> Option<(usize, usize)> {
        let eps = self.tolerance() / self.spacing;
        let origin = self.bbox.min[axis];
        let first = ((lo - origin) / self.spacing - eps).ceil().max(0.0);
        let last = ((hi - origin) / self.spacing + eps).floor();
        let max_index = (self.dims[axis] - 1) as f64;
        if last < 0.0 || first > max_index || first > last {
            return None;
        }
        Some((first as usize, last.min(max_index) as usize))
    }

    /// Indices of all points inside `region`, boundaries included,
    /// in ascending order.
    pub fn points_in_box(&self, region: &Aabb3) -> Vec<usize> {
        let mut out = Vec::new();
        let ranges = (
            self.axis_range(0, region.min.x, region.max.x),
            self.axis_range(1, region.min.y, region.max.y),
            self.axis_range(2, region.min.z, region.max.z),
        );
        if let (Some((x0, x1)), Some((y0, y1)), Some((z0, z1))) = ranges {
            out.reserve((x1 - x0 + 1) * (y1 - y0 + 1) * (z1 - z0 + 1));
            for z in z0..=z1 {
                for y in y0..=y1 {
                    let row = self.lattice_index(0, y, z);
                    out.extend((x0..=x1).map(|x| row + x));
                }
            }
        }

        let eps = self.tolerance();
        let envelope = AABB::from_corners(
            [region.min.x - eps, region.min.y - eps, region.min.z - eps],
            [region.max.x + eps, region.max.y + eps, region.max.z + eps],
        );
        let mut extra: Vec<usize> = self
            .off_grid
            .locate_in_envelope_intersecting(&envelope)
            .map(|p| p.data)
            .collect();
        extra.sort_unstable();
        out.extend(extra);
        out
    }

    /// Indices of all points within `radius` of `center`, boundary included,
    /// in ascending order.
    pub fn points_in_sphere(&self, center: &Pt3, radius: f64) -> Vec<usize> {
        let region = Aabb3::from_center_half_extent(*center, radius);
        let limit = radius + self.tolerance();
        let limit_sq = limit * limit;
        self.points_in_box(&region)
            .into_iter()
            .filter(|&i| (self.positions[i] - center).norm_squared() <= limit_sq)
            .collect()
    }

    /// Index of the point closest to `p`, lattice or off-grid.
    pub fn nearest_index(&self, p: &Pt3) -> usize {
        let mut c = [0usize; 3];
        for (axis, slot) in c.iter_mut().enumerate() {
            let t = ((p[axis] - self.bbox.min[axis]) / self.spacing).round();
            *slot = t.clamp(0.0, (self.dims[axis] - 1) as f64) as usize;
        }
        let lattice = self.lattice_index(c[0], c[1], c[2]);
        let lattice_d2 = (self.positions[lattice] - p).norm_squared();

        match self.off_grid.nearest_neighbor(&[p.x, p.y, p.z]) {
            Some(hit) if (self.positions[hit.data] - p).norm_squared() < lattice_d2 => hit.data,
            _ => lattice,
        }
    }

    /// Appends surface samples that do not sit on the lattice.
    ///
    /// New points start with distance equal to the diagonal and the given id.
    /// Returns the index range they occupy.
    pub fn append_off_grid_points(&mut self, points: &[Pt3], compartment_id: i32) -> Range<usize> {
        let start = self.positions.len();
        for p in points {
            let index = self.positions.len();
            self.positions.push(*p);
            self.distances.push(self.diagonal);
            self.compartment_ids.push(compartment_id);
            self.occupied.push(false);
            self.off_grid.insert(GeomWithData::new([p.x, p.y, p.z], index));
        }
        start..self.positions.len()
    }

    /// Tightens the signed distance of point `index` with `candidate`.
    ///
    /// Rules, in order:
    /// - a non-positive candidate replaces a positive distance (inside an
    ///   object wins over an influence zone);
    /// - two positive values keep the smaller;
    /// - two non-positive values keep the one closer to zero;
    /// - a positive candidate never replaces a non-positive distance.
    ///
    /// Returns whether the stored value changed.
    pub fn nearest_surface_distance_update(&mut self, index: usize, candidate: f64) -> Result<bool> {
        self.check_index(index)?;
        if candidate.is_nan() {
            return Err(Error::GridInconsistency(format!(
                "NaN distance update at grid index {index}"
            )));
        }
        let current = self.distances[index];
        let next = match (candidate <= 0.0, current <= 0.0) {
            (true, false) => candidate,
            (false, false) => current.min(candidate),
            (true, true) => current.max(candidate),
            (false, true) => current,
        };
        if next != current {
            self.distances[index] = next;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    /// Periodic copies of `position` for an object reaching within `reach`
    /// of the grid faces, up to seven (faces, edges and the corner).
    pub fn periodic_images(&self, position: &Pt3, reach: f64) -> Vec<Pt3> {
        let size = self.bbox.size();
        let mut shifts: [Option<f64>; 3] = [None; 3];
        for (axis, shift) in shifts.iter_mut().enumerate() {
            if position[axis] - self.bbox.min[axis] < reach {
                *shift = Some(size[axis]);
            } else if self.bbox.max[axis] - position[axis] < reach {
                *shift = Some(-size[axis]);
            }
        }

        let mut images = Vec::new();
        for mask in 1u8..8 {
            let mut offset = Vec3::zeros();
            let mut valid = true;
            for (axis, shift) in shifts.iter().enumerate() {
                if mask & (1 << axis) != 0 {
                    match shift {
                        Some(s) => offset[axis] = *s,
                        None => valid = false,
                    }
                }
            }
            if valid {
                images.push(position + offset);
            }
        }
        images
    }
}
