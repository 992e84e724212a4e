//! Nearest-neighbour index over placed instances.
//!
//! Every accepted instance (and each of its periodic images) is inserted as
//! a point entry carrying its encapsulating radius. The index only grows,
//! and only after an acceptance.

use crate::ingredient::Pose;
use rstar::{PointDistance, RTree, RTreeObject, AABB};
use u_cellpack_core::geometry::{Pt3, Rot3, EPSILON};

/// One placed instance (or periodic image) in the index.
#[derive(Debug, Clone, PartialEq)]
pub struct PlacedEntry {
    /// Insertion order, stable for the index lifetime.
    pub slot: usize,
    /// Instance id in the result list.
    pub instance: usize,
    /// Ingredient index.
    pub ingredient: usize,
    /// Position of this copy.
    pub position: Pt3,
    /// Rotation of the instance.
    pub rotation: Rot3,
    /// Encapsulating radius of the ingredient.
    pub radius: f64,
    /// True for periodic images.
    pub image: bool,
}

impl PlacedEntry {
    /// Pose of this copy.
    pub fn pose(&self) -> Pose {
        Pose::new(self.position, self.rotation)
    }
}

impl RTreeObject for PlacedEntry {
    type Envelope = AABB<[f64; 3]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_point([self.position.x, self.position.y, self.position.z])
    }
}

impl PointDistance for PlacedEntry {
    fn distance_2(&self, point: &[f64; 3]) -> f64 {
        (self.position - Pt3::from(*point)).norm_squared()
    }
}

/// R-tree of placed instance centres.
#[derive(Debug, Default)]
pub struct InstanceIndex {
    tree: RTree<PlacedEntry>,
    max_radius: f64,
    len: usize,
}

impl InstanceIndex {
    /// Creates an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a copy of a placed instance and returns its slot.
    pub fn insert(
        &mut self,
        instance: usize,
        ingredient: usize,
        pose: &Pose,
        radius: f64,
        image: bool,
    ) -> usize {
        let slot = self.len;
        self.tree.insert(PlacedEntry {
            slot,
            instance,
            ingredient,
            position: pose.position,
            rotation: pose.rotation,
            radius,
            image,
        });
        self.max_radius = self.max_radius.max(radius);
        self.len += 1;
        slot
    }

    /// Number of entries, images included.
    pub fn len(&self) -> usize {
        self.len
    }

    /// True when nothing was placed.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Largest radius inserted so far.
    pub fn max_radius(&self) -> f64 {
        self.max_radius
    }

    /// Entries whose encapsulating sphere overlaps the sphere at `center`
    /// with `radius`, ordered by slot.
    pub fn query_overlapping(&self, center: &Pt3, radius: f64) -> Vec<&PlacedEntry> {
        let reach = radius + self.max_radius;
        let envelope = AABB::from_corners(
            [center.x - reach, center.y - reach, center.z - reach],
            [center.x + reach, center.y + reach, center.z + reach],
        );
        let mut hits: Vec<&PlacedEntry> = self
            .tree
            .locate_in_envelope_intersecting(&envelope)
            .filter(|e| (e.position - center).norm() < radius + e.radius - EPSILON)
            .collect();
        hits.sort_by_key(|e| e.slot);
        hits
    }

    /// Whether any entry overlaps the sphere at `center`.
    pub fn has_overlap(&self, center: &Pt3, radius: f64) -> bool {
        !self.query_overlapping(center, radius).is_empty()
    }

    /// Closest copy of any ingredient in `ingredients` to `p`. Equidistant
    /// copies resolve to the lowest slot.
    pub fn nearest_of(&self, p: &Pt3, ingredients: &[usize]) -> Option<&PlacedEntry> {
        let mut hits = self
            .tree
            .nearest_neighbor_iter_with_distance_2(&[p.x, p.y, p.z])
            .filter(|(e, _)| ingredients.contains(&e.ingredient));
        let (first, d2) = hits.next()?;
        let nearest = hits
            .take_while(|&(_, d)| d <= d2)
            .fold(first, |best, (e, _)| if e.slot < best.slot { e } else { best });
        Some(nearest)
    }

    /// All entries, unordered.
    pub fn iter(&self) -> impl Iterator<Item = &PlacedEntry> {
        self.tree.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index_with(points: &[(f64, f64, f64)], radius: f64) -> InstanceIndex {
        let mut index = InstanceIndex::new();
        for (i, &(x, y, z)) in points.iter().enumerate() {
            index.insert(i, i % 2, &Pose::at(Pt3::new(x, y, z)), radius, false);
        }
        index
    }

    #[test]
    fn test_index_new() {
        let index = InstanceIndex::new();
        assert!(index.is_empty());
        assert!(!index.has_overlap(&Pt3::origin(), 100.0));
    }

    #[test]
    fn test_query_overlapping() {
        let index = index_with(&[(0.0, 0.0, 0.0), (10.0, 0.0, 0.0), (50.0, 0.0, 0.0)], 3.0);
        assert_eq!(index.len(), 3);
        let hits = index.query_overlapping(&Pt3::new(5.0, 0.0, 0.0), 3.0);
        assert_eq!(hits.iter().map(|e| e.slot).collect::<Vec<_>>(), vec![0, 1]);
        // touching spheres do not overlap
        assert!(!index.has_overlap(&Pt3::new(56.0, 0.0, 0.0), 3.0));
        assert!(index.has_overlap(&Pt3::new(55.0, 0.0, 0.0), 3.0));
    }

    #[test]
    fn test_mixed_radii() {
        let mut index = InstanceIndex::new();
        index.insert(0, 0, &Pose::at(Pt3::origin()), 20.0, false);
        index.insert(1, 1, &Pose::at(Pt3::new(100.0, 0.0, 0.0)), 1.0, false);
        assert_eq!(index.max_radius(), 20.0);
        assert!(index.has_overlap(&Pt3::new(22.0, 0.0, 0.0), 3.0));
        assert!(!index.has_overlap(&Pt3::new(24.0, 0.0, 0.0), 3.0));
    }

    #[test]
    fn test_nearest_of() {
        let index = index_with(&[(0.0, 0.0, 0.0), (10.0, 0.0, 0.0), (20.0, 0.0, 0.0)], 1.0);
        let near = index.nearest_of(&Pt3::new(19.0, 0.0, 0.0), &[1]).unwrap();
        assert_eq!(near.slot, 1);
        let near = index.nearest_of(&Pt3::new(19.0, 0.0, 0.0), &[0]).unwrap();
        assert_eq!(near.slot, 2);
        assert!(index.nearest_of(&Pt3::origin(), &[7]).is_none());
    }

    #[test]
    fn test_nearest_of_skips_other_ingredients() {
        let mut index = InstanceIndex::new();
        for k in 0..50 {
            index.insert(k, 0, &Pose::at(Pt3::new(k as f64, 0.0, 0.0)), 0.5, false);
        }
        index.insert(50, 1, &Pose::at(Pt3::new(40.0, 5.0, 0.0)), 0.5, false);
        index.insert(51, 1, &Pose::at(Pt3::new(0.0, -5.0, 0.0)), 0.5, false);
        index.insert(52, 1, &Pose::at(Pt3::new(0.0, 5.0, 0.0)), 0.5, false);

        let near = index.nearest_of(&Pt3::new(1.0, 0.0, 0.0), &[1]).unwrap();
        assert_eq!(near.slot, 51);
        let near = index.nearest_of(&Pt3::new(38.0, 0.0, 0.0), &[1]).unwrap();
        assert_eq!(near.instance, 50);
        let near = index.nearest_of(&Pt3::new(38.2, 0.0, 0.0), &[0, 1]).unwrap();
        assert_eq!(near.slot, 38);
    }
}
