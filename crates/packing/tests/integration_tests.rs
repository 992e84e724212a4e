//! Integration tests for u-cellpack.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use u_cellpack::{
    Aabb3, ClassificationMethod, CollisionStrategy, Compartment, CompartmentGridBuilder,
    CompartmentTree, HookError, Ingredient, MeshStore, PackingConfig, PackingContext, PackingResult, PlacedInstance,
    PlacementScheduler, Pt3, Recipe, SpatialGrid, SphereContactBackend, StepOutcome, StopReason,
    TriangleMesh, VisualizationHook,
};

fn assert_no_overlap(result: &PackingResult, radii: &[f64]) {
    for (i, a) in result.instances.iter().enumerate() {
        for b in &result.instances[i + 1..] {
            let d = (a.position - b.position).norm();
            let min = radii[a.ingredient] + radii[b.ingredient];
            assert!(
                d >= min - 1e-6,
                "instances {} and {} overlap: distance {} < {}",
                a.id,
                b.id,
                d,
                min
            );
        }
    }
}

fn vesicle_context(recipe: Recipe, seed: u64) -> PackingContext {
    let mut tree = CompartmentTree::new();
    tree.add(Compartment::sphere("vesicle", Pt3::origin(), 50.0), None)
        .unwrap();
    PackingContext::build(
        PackingConfig::new().with_spacing(10.0).with_seed(seed),
        Aabb3::from_center_half_extent(Pt3::origin(), 100.0),
        tree,
        recipe,
    )
    .unwrap()
}

mod mesh_packing_tests {
    use super::*;

    #[test]
    fn test_cube_interior_packing() {
        let mut tree = CompartmentTree::new();
        tree.add(
            Compartment::mesh("box", TriangleMesh::cube(Pt3::origin(), 500.0)),
            None,
        )
        .unwrap();
        let recipe = Recipe::new("spheres").with_ingredient(
            Ingredient::sphere("sphere", 40.0)
                .with_compartment(-1)
                .with_count(10),
        );
        let context = PackingContext::build(
            PackingConfig::new()
                .with_spacing(50.0)
                .with_seed(11)
                .with_classification(ClassificationMethod::RayCast),
            Aabb3::from_center_half_extent(Pt3::origin(), 550.0),
            tree,
            recipe,
        )
        .unwrap();

        let result = PlacementScheduler::new(context).run().unwrap();

        assert!(result.placed_count() <= 10);
        assert!(result.placed_count() > 0);
        assert_no_overlap(&result, &[40.0]);
        for instance in &result.instances {
            assert_eq!(instance.compartment, -1);
            let p = instance.position;
            assert!(
                p.x.abs() <= 500.0 && p.y.abs() <= 500.0 && p.z.abs() <= 500.0,
                "instance {} outside the box at {:?}",
                instance.id,
                p
            );
        }
    }

    #[test]
    fn test_cube_bodies_stay_inside_faces() {
        let mut store = MeshStore::new();
        store.insert("box", TriangleMesh::cube(Pt3::origin(), 500.0));
        let radius = 40.0;
        for seed in [3, 11, 29] {
            let mut tree = CompartmentTree::new();
            tree.add_from_backend(&store, "box", None).unwrap();
            let recipe = Recipe::new("spheres").with_ingredient(
                Ingredient::sphere("sphere", radius)
                    .with_compartment(-1)
                    .with_count(60),
            );
            let context = PackingContext::build(
                PackingConfig::new()
                    .with_spacing(40.0)
                    .with_seed(seed)
                    .with_classification(ClassificationMethod::RayCast),
                Aabb3::from_center_half_extent(Pt3::origin(), 560.0),
                tree,
                recipe,
            )
            .unwrap();

            // 60 below the top face, far from every vertex
            let grid = context.grid();
            let below_face = grid.nearest_index(&Pt3::new(0.0, 0.0, 440.0));
            assert_eq!(grid.compartment_ids()[below_face], -1);
            assert!((grid.distances()[below_face] - 60.0).abs() < 1e-6);

            let result = PlacementScheduler::new(context).run().unwrap();
            assert!(result.placed_count() > 30, "seed {seed}: {}", result.placed_count());
            assert_no_overlap(&result, &[radius]);
            for instance in &result.instances {
                let reach = instance.position.coords.amax() + radius;
                assert!(
                    reach <= 500.0 + 1e-6,
                    "seed {seed}: instance {} reaches {reach} at {:?}",
                    instance.id,
                    instance.position
                );
            }
        }
    }

    #[test]
    fn test_methods_agree_on_cube_interior() {
        let bbox = Aabb3::from_center_half_extent(Pt3::origin(), 150.0);
        let mut reference: Option<Vec<i32>> = None;
        for method in [
            ClassificationMethod::RayCast,
            ClassificationMethod::Sidedness,
            ClassificationMethod::Voxel,
        ] {
            let mut tree = CompartmentTree::new();
            tree.add(
                Compartment::mesh("box", TriangleMesh::cube(Pt3::origin(), 100.0)),
                None,
            )
            .unwrap();
            let mut grid = SpatialGrid::build(bbox, 25.0).unwrap();
            CompartmentGridBuilder::new(method)
                .build_all(&mut grid, &mut tree)
                .unwrap();

            // lattice points well inside or well outside the box
            let deep: Vec<i32> = (0..grid.base_len())
                .filter(|&i| {
                    let p = grid.positions()[i];
                    let m = p.x.abs().max(p.y.abs()).max(p.z.abs());
                    m <= 60.0 || m >= 140.0
                })
                .map(|i| grid.compartment_ids()[i])
                .collect();
            match &reference {
                None => reference = Some(deep),
                Some(r) => assert_eq!(r, &deep, "{method} disagrees with ray casting"),
            }
        }
    }
}

mod surface_packing_tests {
    use super::*;

    #[test]
    fn test_surface_ingredients_stay_on_membrane() {
        let mut tree = CompartmentTree::new();
        tree.add(Compartment::sphere("cell", Pt3::origin(), 500.0), None)
            .unwrap();
        let recipe = Recipe::new("membrane").with_ingredient(
            Ingredient::sphere("porin", 20.0)
                .with_compartment(1)
                .with_count(8),
        );
        let spacing = 50.0;
        let context = PackingContext::build(
            PackingConfig::new().with_spacing(spacing).with_seed(5),
            Aabb3::from_center_half_extent(Pt3::origin(), 600.0),
            tree,
            recipe,
        )
        .unwrap();

        let result = PlacementScheduler::new(context).run().unwrap();

        assert!(result.placed_count() > 0);
        assert_no_overlap(&result, &[20.0]);
        for instance in &result.instances {
            assert_eq!(instance.compartment, 1);
            let r = instance.position.coords.norm();
            assert!(
                (r - 500.0).abs() <= spacing,
                "surface instance {} sits {} from the centre",
                instance.id,
                r
            );
        }
    }

    #[test]
    fn test_mixed_regions() {
        let recipe = Recipe::new("mixed")
            .with_ingredient(Ingredient::sphere("inner", 4.0).with_compartment(-1).with_count(5))
            .with_ingredient(Ingredient::sphere("membrane", 3.0).with_compartment(1).with_count(5))
            .with_ingredient(Ingredient::sphere("outer", 4.0).with_count(5));
        let context = vesicle_context(recipe, 8);
        let result = PlacementScheduler::new(context).run().unwrap();

        assert_no_overlap(&result, &[4.0, 3.0, 4.0]);
        for instance in &result.instances {
            let r = instance.position.coords.norm();
            match instance.compartment {
                -1 => assert!(r < 50.0, "interior instance at radius {r}"),
                0 => assert!(r > 50.0, "free instance at radius {r}"),
                1 => assert!((r - 50.0).abs() <= 20.0, "surface instance at radius {r}"),
                other => panic!("unexpected compartment {other}"),
            }
        }
    }
}

mod scheduling_tests {
    use super::*;

    #[test]
    fn test_rejection_threshold_stops_ingredient() {
        let recipe = Recipe::new("r").with_ingredient(
            Ingredient::sphere("shy", 5.0)
                .with_count(3)
                .with_jitter_attempts(1)
                .with_rejection_threshold(5)
                .with_cutoff_surface(1e6),
        );
        let mut scheduler = PlacementScheduler::new(vesicle_context(recipe, 3));

        let mut outcomes = Vec::new();
        loop {
            let outcome = scheduler.step().unwrap();
            if outcome == StepOutcome::Finished {
                break;
            }
            outcomes.push(outcome);
        }

        assert_eq!(outcomes.len(), 5);
        assert!(outcomes[..4]
            .iter()
            .all(|o| matches!(o, StepOutcome::Rejected { ingredient: 0, .. })));
        assert_eq!(
            outcomes[4],
            StepOutcome::IngredientExhausted {
                ingredient: 0,
                reason: StopReason::RejectionThreshold
            }
        );

        let result = scheduler.result();
        let report = &result.ingredients[0];
        assert_eq!(report.rejections, 5);
        assert_eq!(report.completion, 1.0);
        assert_eq!(report.placed, 0);
        assert!(report.placed < report.target);
        assert_eq!(report.stop_reason, StopReason::RejectionThreshold);
    }

    #[test]
    fn test_same_seed_same_result() {
        let recipe = || {
            Recipe::new("r")
                .with_ingredient(Ingredient::sphere("a", 6.0).with_compartment(-1).with_count(6))
                .with_ingredient(Ingredient::sphere("b", 3.0).with_count(6))
        };
        let first = PlacementScheduler::new(vesicle_context(recipe(), 99))
            .run()
            .unwrap();
        let second = PlacementScheduler::new(vesicle_context(recipe(), 99))
            .run()
            .unwrap();

        assert_eq!(first.instances.len(), second.instances.len());
        for (a, b) in first.instances.iter().zip(&second.instances) {
            assert_eq!(a.ingredient, b.ingredient);
            assert_eq!(a.grid_index, b.grid_index);
            assert_eq!(a.position, b.position);
            assert_eq!(a.rotation, b.rotation);
        }
    }

    #[test]
    fn test_physics_narrow_phase() {
        let recipe = Recipe::new("r")
            .with_ingredient(Ingredient::sphere("a", 6.0).with_compartment(-1).with_count(8));
        let mut scheduler = PlacementScheduler::new(vesicle_context(recipe, 17))
            .with_collision_strategy(CollisionStrategy::Physics(Box::new(
                SphereContactBackend::new(),
            )));
        let result = scheduler.run().unwrap();

        assert!(result.placed_count() > 0);
        assert_no_overlap(&result, &[6.0]);
    }

    #[test]
    fn test_molarity_target() {
        // 0.5 M over the vesicle interior adds far more than the count alone
        let recipe = Recipe::new("r").with_ingredient(
            Ingredient::sphere("solute", 1.0)
                .with_compartment(-1)
                .with_count(1)
                .with_molarity(0.5),
        );
        let context = vesicle_context(recipe, 1);
        let volume = context.compartments().by_number(1).unwrap().interior_volume();
        let expected = 1 + (0.5 * volume * 6.022e-4).round() as usize;
        assert_eq!(context.ingredients()[0].target(), expected);
    }

    struct CancelAfterFirst {
        flag: Arc<AtomicBool>,
    }

    impl VisualizationHook for CancelAfterFirst {
        fn on_instance_placed(
            &mut self,
            _instance: &PlacedInstance,
        ) -> Result<(), HookError> {
            self.flag.store(true, Ordering::Relaxed);
            Ok(())
        }
    }

    #[test]
    fn test_cancellation() {
        let recipe = Recipe::new("r")
            .with_ingredient(Ingredient::sphere("a", 4.0).with_compartment(-1).with_count(20));
        let scheduler = PlacementScheduler::new(vesicle_context(recipe, 4));
        let flag = scheduler.cancel_handle();
        let mut scheduler = scheduler.with_hook(Box::new(CancelAfterFirst { flag }));

        let result = scheduler.run().unwrap();

        assert!(result.cancelled);
        assert_eq!(result.placed_count(), 1);
        assert_eq!(result.ingredients[0].stop_reason, StopReason::Interrupted);
    }
}

mod grid_state_tests {
    use super::*;

    #[test]
    fn test_distances_only_tighten() {
        let recipe = Recipe::new("r")
            .with_ingredient(Ingredient::sphere("a", 8.0).with_compartment(-1).with_count(6))
            .with_ingredient(Ingredient::sphere("b", 8.0).with_count(6));
        let context = vesicle_context(recipe, 12);
        let before = context.grid().distances().to_vec();

        let mut scheduler = PlacementScheduler::new(context);
        scheduler.run().unwrap();
        let context = scheduler.into_context();

        for (i, (old, new)) in before.iter().zip(context.grid().distances()).enumerate() {
            assert!(
                new <= old || (*old <= 0.0 && *new <= 0.0),
                "distance at point {i} grew from {old} to {new}"
            );
        }
        // every placed centre is covered by its own body
        for instance in context.instances() {
            let i = context.grid().nearest_index(&instance.position);
            assert!(context.grid().distances()[i] < 8.0);
        }
    }

    #[test]
    fn test_membership_partition() {
        let mut tree = CompartmentTree::new();
        let outer = tree
            .add(Compartment::sphere("cell", Pt3::origin(), 80.0), None)
            .unwrap();
        tree.add(Compartment::sphere("nucleus", Pt3::origin(), 30.0), Some(outer))
            .unwrap();
        let mut grid =
            SpatialGrid::build(Aabb3::from_center_half_extent(Pt3::origin(), 100.0), 10.0)
                .unwrap();
        CompartmentGridBuilder::new(ClassificationMethod::RayCast)
            .build_all(&mut grid, &mut tree)
            .unwrap();

        let ids = grid.compartment_ids();
        for (i, &id) in ids.iter().enumerate() {
            assert!((-2..=2).contains(&id), "point {i} has id {id}");
            let r = grid.positions()[i].coords.norm();
            if id == -2 {
                assert!(r < 30.0);
            }
            if id == 0 {
                assert!(r > 80.0 - 10.0);
            }
        }
    }

    #[test]
    fn test_reclassification_is_idempotent() {
        let mut tree = CompartmentTree::new();
        tree.add(
            Compartment::mesh("box", TriangleMesh::cube(Pt3::new(5.0, -5.0, 0.0), 60.0)),
            None,
        )
        .unwrap();
        let mut grid =
            SpatialGrid::build(Aabb3::from_center_half_extent(Pt3::origin(), 100.0), 10.0)
                .unwrap();
        let builder = CompartmentGridBuilder::new(ClassificationMethod::Sidedness);

        builder.build(&mut grid, &mut tree, 0).unwrap();
        let ids = grid.compartment_ids().to_vec();
        let len = grid.len();
        let inside = tree.get(0).unwrap().inside_points().to_vec();
        let surface = tree.get(0).unwrap().surface_points().to_vec();

        let report = builder.build(&mut grid, &mut tree, 0).unwrap();
        assert_eq!(report.off_grid_added, 0);
        assert_eq!(grid.len(), len);
        assert_eq!(grid.compartment_ids(), ids.as_slice());
        assert_eq!(tree.get(0).unwrap().inside_points(), inside.as_slice());
        assert_eq!(tree.get(0).unwrap().surface_points(), surface.as_slice());
    }
}

mod periodic_packing_tests {
    use super::*;

    #[test]
    fn test_periodic_packing_respects_wrapped_neighbours() {
        let radius = 8.0;
        for seed in [4, 19] {
            let recipe = Recipe::new("periodic")
                .with_ingredient(Ingredient::sphere("crowder", radius).with_count(50));
            let context = PackingContext::build(
                PackingConfig::new().with_spacing(5.0).with_seed(seed).with_periodic(true),
                Aabb3::from_center_half_extent(Pt3::origin(), 50.0),
                CompartmentTree::new(),
                recipe,
            )
            .unwrap();
            let bbox = *context.grid().bbox();
            let size = bbox.size();

            let result = PlacementScheduler::new(context).run().unwrap();
            assert!(result.placed_count() > 20, "seed {seed}: {}", result.placed_count());
            assert_no_overlap(&result, &[radius]);

            let near_faces = result
                .instances
                .iter()
                .filter(|i| (0..3).any(|a| {
                    i.position[a] - bbox.min[a] < radius || bbox.max[a] - i.position[a] < radius
                }))
                .count();
            assert!(near_faces > 0);

            for (k, a) in result.instances.iter().enumerate() {
                for b in &result.instances[k + 1..] {
                    let mut delta = a.position - b.position;
                    for axis in 0..3 {
                        delta[axis] -= size[axis] * (delta[axis] / size[axis]).round();
                    }
                    assert!(
                        delta.norm() >= 2.0 * radius - 1e-6,
                        "seed {seed}: instances {} and {} overlap across the boundary ({})",
                        a.id,
                        b.id,
                        delta.norm()
                    );
                }
            }
        }
    }
}
