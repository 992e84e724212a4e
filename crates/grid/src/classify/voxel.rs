use super::{ClassificationStrategy, Side};
use crate::spatial_grid::SpatialGrid;
use rayon::prelude::*;
use u_cellpack_core::geometry::{closest_point_on_triangle, Aabb3, Pt3, TriangleMesh, Vec3};
use u_cellpack_core::{Error, Result};

/// Dense signed distance volume, negative inside.
#[derive(Debug, Clone)]
pub struct SignedDistanceField {
    origin: Pt3,
    cell: f64,
    dims: [usize; 3],
    values: Vec<f64>,
}

impl SignedDistanceField {
    /// Rasterizes `mesh` with `resolution` cells along its longest extent,
    /// padded by two cells on every side.
    pub fn build(mesh: &TriangleMesh, resolution: usize) -> Result<Self> {
        if resolution < 2 {
            return Err(Error::Configuration(format!(
                "voxel resolution must be at least 2, got {resolution}"
            )));
        }
        let bbox = mesh.bounding_box();
        let longest = bbox.size().max();
        if !(longest.is_finite() && longest > 0.0) {
            return Err(Error::InvalidMesh("mesh has zero extent".into()));
        }
        let cell = longest / resolution as f64;
        let padded = bbox.expand(2.0 * cell);
        let size = padded.size();
        let dims = [
            (size.x / cell).ceil() as usize + 1,
            (size.y / cell).ceil() as usize + 1,
            (size.z / cell).ceil() as usize + 1,
        ];
        let origin = padded.min;
        let count = dims[0] * dims[1] * dims[2];

        let values = (0..count)
            .into_par_iter()
            .map(|i| {
                let x = i % dims[0];
                let y = (i / dims[0]) % dims[1];
                let z = i / (dims[0] * dims[1]);
                let p = origin + Vec3::new(x as f64, y as f64, z as f64) * cell;
                let distance = (0..mesh.faces.len())
                    .map(|f| {
                        let (a, b, c) = mesh.triangle(f);
                        (p - closest_point_on_triangle(&p, a, b, c)).norm()
                    })
                    .fold(f64::INFINITY, f64::min);
                if mesh.winding_number(&p).abs() > 0.5 {
                    -distance
                } else {
                    distance
                }
            })
            .collect();

        log::debug!(
            "rasterized signed distance field {}x{}x{} at cell size {cell}",
            dims[0],
            dims[1],
            dims[2]
        );
        Ok(Self {
            origin,
            cell,
            dims,
            values,
        })
    }

    /// Node counts along x, y and z.
    pub fn dims(&self) -> [usize; 3] {
        self.dims
    }

    /// Cell edge length.
    pub fn cell_size(&self) -> f64 {
        self.cell
    }

    fn value(&self, x: usize, y: usize, z: usize) -> f64 {
        self.values[z * self.dims[0] * self.dims[1] + y * self.dims[0] + x]
    }

    fn bounds(&self) -> Aabb3 {
        let extent = Vec3::new(
            (self.dims[0] - 1) as f64,
            (self.dims[1] - 1) as f64,
            (self.dims[2] - 1) as f64,
        ) * self.cell;
        Aabb3::new(self.origin, self.origin + extent)
    }

    /// Trilinear sample. Points outside the volume get their (positive)
    /// distance to it plus the padding.
    pub fn sample(&self, p: &Pt3) -> f64 {
        let bounds = self.bounds();
        if !bounds.contains_point(p) {
            return bounds.distance_to_point(p) + 2.0 * self.cell;
        }
        let t = (p - self.origin) / self.cell;
        let mut i0 = [0usize; 3];
        let mut f = [0.0f64; 3];
        for axis in 0..3 {
            let max = (self.dims[axis] - 2) as f64;
            let base = t[axis].floor().clamp(0.0, max);
            i0[axis] = base as usize;
            f[axis] = (t[axis] - base).clamp(0.0, 1.0);
        }
        let [x, y, z] = i0;
        let lerp = |a: f64, b: f64, w: f64| a + (b - a) * w;
        let c00 = lerp(self.value(x, y, z), self.value(x + 1, y, z), f[0]);
        let c10 = lerp(self.value(x, y + 1, z), self.value(x + 1, y + 1, z), f[0]);
        let c01 = lerp(self.value(x, y, z + 1), self.value(x + 1, y, z + 1), f[0]);
        let c11 = lerp(self.value(x, y + 1, z + 1), self.value(x + 1, y + 1, z + 1), f[0]);
        let c0 = lerp(c00, c10, f[1]);
        let c1 = lerp(c01, c11, f[1]);
        lerp(c0, c1, f[2])
    }
}

/// Sign of a trilinearly sampled signed distance field.
pub struct Voxel {
    field: SignedDistanceField,
}

impl Voxel {
    /// Wraps a rasterized field.
    pub fn new(field: SignedDistanceField) -> Self {
        Self { field }
    }

    /// The underlying field.
    pub fn field(&self) -> &SignedDistanceField {
        &self.field
    }
}

impl ClassificationStrategy for Voxel {
    fn name(&self) -> &'static str {
        "voxel"
    }

    fn classify(&self, grid: &SpatialGrid, candidates: &[usize]) -> Vec<Result<Side>> {
        let positions = grid.positions();
        candidates
            .par_iter()
            .map(|&i| {
                Ok(if self.field.sample(&positions[i]) < 0.0 {
                    Side::Inside
                } else {
                    Side::Outside
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_cube_field_values() {
        let mesh = TriangleMesh::cube(Pt3::origin(), 10.0);
        let sdf = SignedDistanceField::build(&mesh, 10).unwrap();
        assert_relative_eq!(sdf.sample(&Pt3::origin()), -10.0, epsilon = 1e-9);
        assert_relative_eq!(sdf.sample(&Pt3::new(12.0, 0.0, 0.0)), 2.0, epsilon = 1e-9);
        assert!(sdf.sample(&Pt3::new(100.0, 0.0, 0.0)) > 0.0);
    }

    #[test]
    fn test_voxel_sphere_classification() {
        let mesh = TriangleMesh::icosphere(Pt3::origin(), 20.0, 2);
        let voxel = Voxel::new(SignedDistanceField::build(&mesh, 16).unwrap());
        let grid = SpatialGrid::build(Aabb3::from_center_half_extent(Pt3::origin(), 30.0), 5.0).unwrap();
        let all: Vec<usize> = (0..grid.len()).collect();
        let sides = voxel.classify(&grid, &all);
        for (i, side) in sides.iter().enumerate() {
            let r = grid.positions()[i].coords.norm();
            match side {
                Ok(Side::Inside) => assert!(r < 20.5, "r = {r}"),
                Ok(Side::Outside) => assert!(r > 14.0, "r = {r}"),
                other => panic!("unexpected {other:?}"),
            }
        }
    }

    #[test]
    fn test_bad_resolution() {
        let mesh = TriangleMesh::cube(Pt3::origin(), 1.0);
        assert!(SignedDistanceField::build(&mesh, 1).is_err());
    }
}
