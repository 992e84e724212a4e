use super::{ambiguity, ClassificationStrategy, RayCast, Side};
use crate::spatial_grid::SpatialGrid;
use rayon::prelude::*;
use std::collections::BTreeSet;
use u_cellpack_core::geometry::{closest_point_on_triangle, Pt3, TriangleMesh};
use u_cellpack_core::Result;

/// Projection sampling step as a fraction of the grid spacing.
const PROJECTION_STEP: f64 = 1.0 / 3.0;

/// Scan-line fill seeded by a polyhedron projection.
///
/// Each face is sampled finer than the grid; lattice points hit by a sample
/// are surface points and their 3×3×3 neighbourhoods remember the closest
/// face. Scan lines along x then carry the last known side forward, and a
/// point within one spacing of the surface reseeds that side with the
/// crossing parity of [`RayCast`].
pub struct FloodFill<'a> {
    mesh: &'a TriangleMesh,
    rays: RayCast<'a>,
}

/// Lattice sub-box walked by one classification pass.
struct Window {
    lo: [usize; 3],
    len: [usize; 3],
}

impl Window {
    fn local(&self, c: [i64; 3]) -> Option<usize> {
        let mut out = 0usize;
        let mut stride = 1usize;
        for axis in 0..3 {
            let v = c[axis] - self.lo[axis] as i64;
            if v < 0 || v >= self.len[axis] as i64 {
                return None;
            }
            out += v as usize * stride;
            stride *= self.len[axis];
        }
        Some(out)
    }

    fn count(&self) -> usize {
        self.len.iter().product()
    }
}

impl<'a> FloodFill<'a> {
    /// Precomputes the face boxes used for reseeding.
    pub fn new(mesh: &'a TriangleMesh) -> Self {
        Self {
            rays: RayCast::new(mesh),
            mesh,
        }
    }

    fn window(grid: &SpatialGrid, candidates: &[usize]) -> Option<Window> {
        let mut lo = [usize::MAX; 3];
        let mut hi = [0usize; 3];
        let mut any = false;
        for c in candidates.iter().filter_map(|&i| grid.lattice_coords(i)) {
            any = true;
            for axis in 0..3 {
                lo[axis] = lo[axis].min(c[axis]);
                hi[axis] = hi[axis].max(c[axis]);
            }
        }
        any.then(|| Window {
            lo,
            len: [hi[0] - lo[0] + 1, hi[1] - lo[1] + 1, hi[2] - lo[2] + 1],
        })
    }

    fn lattice_coord(grid: &SpatialGrid, p: &Pt3) -> [i64; 3] {
        let origin = grid.bbox().min;
        let s = grid.spacing();
        [
            ((p.x - origin.x) / s).round() as i64,
            ((p.y - origin.y) / s).round() as i64,
            ((p.z - origin.z) / s).round() as i64,
        ]
    }

    /// Marks projected lattice points and records the surface distance of
    /// every neighbouring lattice point.
    fn project(&self, grid: &SpatialGrid, window: &Window) -> (Vec<bool>, Vec<Option<f64>>) {
        let n = window.count();
        let mut touched = vec![false; n];
        let mut closest: Vec<Option<f64>> = vec![None; n];
        let step = grid.spacing() * PROJECTION_STEP;

        for f in 0..self.mesh.faces.len() {
            let (a, b, c) = self.mesh.triangle(f);
            let longest = (b - a).norm().max((c - a).norm()).max((c - b).norm());
            let steps = ((longest / step).ceil() as usize).max(1);

            let mut hit: BTreeSet<[i64; 3]> = BTreeSet::new();
            for i in 0..=steps {
                for j in 0..=(steps - i) {
                    let (u, v) = (i as f64 / steps as f64, j as f64 / steps as f64);
                    hit.insert(Self::lattice_coord(grid, &(a + (b - a) * u + (c - a) * v)));
                }
            }

            let mut near: BTreeSet<[i64; 3]> = BTreeSet::new();
            for h in &hit {
                if let Some(li) = window.local(*h) {
                    touched[li] = true;
                }
                for dz in -1..=1 {
                    for dy in -1..=1 {
                        for dx in -1..=1 {
                            near.insert([h[0] + dx, h[1] + dy, h[2] + dz]);
                        }
                    }
                }
            }

            for c3 in near {
                let Some(li) = window.local(c3) else {
                    continue;
                };
                let gi = grid.lattice_index(c3[0] as usize, c3[1] as usize, c3[2] as usize);
                let p = grid.positions()[gi];
                let d = (p - closest_point_on_triangle(&p, a, b, c)).norm();
                if closest[li].map_or(true, |best| d < best) {
                    closest[li] = Some(d);
                }
            }
        }
        (touched, closest)
    }

}

impl ClassificationStrategy for FloodFill<'_> {
    fn name(&self) -> &'static str {
        "floodfill"
    }

    fn classify(&self, grid: &SpatialGrid, candidates: &[usize]) -> Vec<Result<Side>> {
        let Some(window) = Self::window(grid, candidates) else {
            return candidates
                .iter()
                .map(|&i| Err(ambiguity(i, "point is not on the lattice")))
                .collect();
        };
        let (touched, closest) = self.project(grid, &window);

        let reseed_limit = grid.spacing() * (1.0 + 1e-9);
        let line_len = window.len[0];
        let lines = window.len[1] * window.len[2];
        let sides: Vec<Option<Side>> = (0..lines)
            .into_par_iter()
            .flat_map_iter(|line| {
                let y = window.lo[1] + line % window.len[1];
                let z = window.lo[2] + line / window.len[1];
                // every scan line starts outside the padded mesh box
                let mut state = Side::Outside;
                let mut out = Vec::with_capacity(line_len);
                for x in 0..line_len {
                    let li = line * line_len + x;
                    let reseed = closest[li].filter(|&d| d <= reseed_limit).map(|_| {
                        let gi = grid.lattice_index(window.lo[0] + x, y, z);
                        self.rays.classify_point(gi, &grid.positions()[gi]).ok()
                    });
                    if touched[li] {
                        if let Some(Some(side)) = reseed {
                            state = side;
                        }
                        out.push(Some(Side::Surface));
                        continue;
                    }
                    match reseed {
                        Some(Some(side)) => {
                            state = side;
                            out.push(Some(side));
                        }
                        Some(None) => out.push(None),
                        None => out.push(Some(state)),
                    }
                }
                out
            })
            .collect();

        candidates
            .iter()
            .map(|&i| {
                let coords = grid
                    .lattice_coords(i)
                    .ok_or_else(|| ambiguity(i, "point is not on the lattice"))?;
                let li = window
                    .local([coords[0] as i64, coords[1] as i64, coords[2] as i64])
                    .ok_or_else(|| ambiguity(i, "point outside the fill window"))?;
                sides[li].ok_or_else(|| ambiguity(i, "no conclusive ray near the surface"))
            })
            .collect()
    }
}
