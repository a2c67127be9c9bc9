//! Integration tests for foamnest-d2.

use std::collections::HashMap;

use foamnest_d2::boolean::{self, intersection_area, Ring};
use foamnest_d2::{
    ingest, sheet_from_polygon, NestConfig, Nester, Part, Placement, PlacementStrategy,
    RawPart, SheetTemplate, Solver,
};

fn rect_path(w: f64, h: f64) -> Vec<(f64, f64)> {
    vec![(0.0, 0.0), (w, 0.0), (w, h), (0.0, h)]
}

fn small_sheet(width: f64, height: f64, padding: f64) -> SheetTemplate {
    SheetTemplate {
        width,
        height,
        padding,
    }
}

fn fast_config(sheet: SheetTemplate, seed: u64) -> NestConfig {
    NestConfig::default()
        .with_sheet(sheet)
        .with_population_size(4)
        .with_max_generations(2)
        .with_seed(seed)
}

/// Rebuilds the exterior ring of a placement in sheet coordinates.
fn placed_ring(parts: &HashMap<u64, Part>, p: &Placement) -> Ring {
    let part = &parts[&p.part_id];
    let poly = part.outline.rotated(p.rotation).translated(p.x, p.y);
    boolean::ring_from_points(&poly.points)
}

fn parts_by_id(parts: &[Part]) -> HashMap<u64, Part> {
    parts.iter().map(|p| (p.id, p.clone())).collect()
}

mod ingest_tests {
    use super::*;

    #[test]
    fn test_clockwise_input_is_normalized() {
        // Exterior drawn clockwise, hole drawn counter-clockwise.
        let raw = RawPart::new(
            "frame",
            vec![
                vec![(0.0, 0.0), (0.0, 50.0), (50.0, 50.0), (50.0, 0.0)],
                vec![(10.0, 10.0), (40.0, 10.0), (40.0, 40.0), (10.0, 40.0)],
            ],
        );

        let parts = ingest(&[raw], 0.3, 0.0).unwrap();
        assert_eq!(parts.len(), 1);

        let outline = &parts[0].outline;
        assert!(outline.is_ccw());
        assert_eq!(outline.holes.len(), 1);
        assert!(!outline.holes[0].is_ccw());

        // Net area: 2500 - 900 = 1600.
        assert!((parts[0].area() - 1600.0).abs() < 1.0, "area = {}", parts[0].area());
    }

    #[test]
    fn test_spacing_grows_outlines() {
        let raw = RawPart::new("block", vec![rect_path(20.0, 20.0)]);

        let plain = ingest(&[raw.clone()], 0.3, 0.0).unwrap();
        let spaced = ingest(&[raw], 0.3, 4.0).unwrap();

        // Half the gap on each side: 20 + 2 + 2 = 24 wide.
        let b0 = plain[0].bounds();
        let b1 = spaced[0].bounds();
        assert!((b0.width - 20.0).abs() < 0.01);
        assert!((b1.width - 24.0).abs() < 0.1, "width = {}", b1.width);
        assert!((b1.height - 24.0).abs() < 0.1, "height = {}", b1.height);
    }

    #[test]
    fn test_ids_are_assigned_sequentially() {
        let raw = vec![
            RawPart::new(
                "frame",
                vec![rect_path(50.0, 50.0), vec![
                    (10.0, 10.0),
                    (40.0, 10.0),
                    (40.0, 40.0),
                    (10.0, 40.0),
                ]],
            ),
            RawPart::new("solo", vec![rect_path(10.0, 10.0)]),
        ];

        let parts = ingest(&raw, 0.3, 0.0).unwrap();
        assert_eq!(parts.len(), 2);
        // Exterior 1, its hole 2, next exterior 3.
        assert_eq!(parts[0].id, 1);
        assert_eq!(parts[0].outline.holes[0].id, 2);
        assert_eq!(parts[1].id, 3);
    }

    #[test]
    fn test_sheet_from_polygon_applies_margin() {
        let sheet = sheet_from_polygon(
            &[(0.0, 0.0), (200.0, 0.0), (200.0, 100.0), (0.0, 100.0)],
            10.0,
        )
        .unwrap();

        // Nominal size comes from the unshrunk boundary.
        assert!((sheet.width - 200.0).abs() < 1e-9);
        assert!((sheet.height - 100.0).abs() < 1e-9);

        // Usable region is inset by the margin: 180 x 80.
        let b = sheet.bounds();
        assert!((b.width - 180.0).abs() < 0.1, "width = {}", b.width);
        assert!((b.height - 80.0).abs() < 0.1, "height = {}", b.height);
    }
}

mod nesting_tests {
    use super::*;

    #[test]
    fn test_simple_rectangle_nesting() {
        let raw = vec![RawPart::new("a", vec![rect_path(20.0, 20.0)]).with_quantity(4)];
        let config = fast_config(small_sheet(100.0, 100.0, 10.0), 3);

        let nester = Nester::new(config).unwrap();
        let result = nester.nest(&raw).unwrap();

        // Four 20x20 pieces in an 80x80 usable region.
        assert_eq!(result.placements.len(), 4);
        assert!(result.unplaced.is_empty());
        assert_eq!(result.sheets_used, 1);

        // 1600 of part area on 6400 of sheet area.
        assert!(
            (result.utilization - 0.25).abs() < 0.01,
            "utilization = {}",
            result.utilization
        );
    }

    #[test]
    fn test_mixed_geometry_nesting() {
        let raw = vec![
            RawPart::new("large", vec![rect_path(30.0, 20.0)]).with_quantity(2),
            RawPart::new("small", vec![rect_path(10.0, 10.0)]).with_quantity(5),
        ];
        let config = fast_config(small_sheet(200.0, 100.0, 0.0), 5);

        let nester = Nester::new(config).unwrap();
        let result = nester.nest(&raw).unwrap();

        assert_eq!(result.placements.len(), 7); // 2 + 5
        assert_eq!(result.sheets_used, 1);
    }

    #[test]
    fn test_overflow_reports_unplaced_instances() {
        // Only one 60x60 piece fits per 100x100 sheet; two sheets allowed.
        let raw = vec![RawPart::new("big", vec![rect_path(60.0, 60.0)]).with_quantity(5)];
        let config = fast_config(small_sheet(100.0, 100.0, 0.0), 7).with_max_sheets(2);

        let nester = Nester::new(config).unwrap();
        let result = nester.nest(&raw).unwrap();

        assert_eq!(result.placements.len(), 2);
        assert_eq!(result.sheets_used, 2);
        assert_eq!(result.unplaced.len(), 3);
        assert!(result.unplaced.iter().all(|&(id, _)| id == 1));
    }

    #[test]
    fn test_every_strategy_places_everything() {
        for strategy in [
            PlacementStrategy::Gravity,
            PlacementStrategy::BoundingBox,
            PlacementStrategy::ConvexHull,
        ] {
            let raw = vec![RawPart::new("a", vec![rect_path(25.0, 15.0)]).with_quantity(3)];
            let config = fast_config(small_sheet(120.0, 80.0, 5.0), 11).with_strategy(strategy);

            let nester = Nester::new(config).unwrap();
            let result = nester.nest(&raw).unwrap();

            assert_eq!(result.placements.len(), 3, "strategy {:?}", strategy);
            assert!(result.unplaced.is_empty(), "strategy {:?}", strategy);
        }
    }

    #[test]
    fn test_oversized_part_is_never_placed() {
        let raw = vec![
            RawPart::new("fits", vec![rect_path(20.0, 20.0)]),
            RawPart::new("too_big", vec![rect_path(300.0, 300.0)]),
        ];
        let config = fast_config(small_sheet(100.0, 100.0, 5.0), 13);

        let nester = Nester::new(config).unwrap();
        let result = nester.nest(&raw).unwrap();

        assert_eq!(result.placements.len(), 1);
        assert_eq!(result.placements[0].part_id, 1);
        assert_eq!(result.unplaced, vec![(2, 0)]);
    }
}

mod geometry_invariant_tests {
    use super::*;

    #[test]
    fn test_placements_never_overlap() {
        let raw = vec![
            RawPart::new("a", vec![rect_path(30.0, 20.0)]).with_quantity(3),
            RawPart::new("b", vec![rect_path(15.0, 15.0)]).with_quantity(4),
        ];
        let parts = ingest(&raw, 0.3, 0.0).unwrap();
        let lookup = parts_by_id(&parts);

        let config = fast_config(small_sheet(120.0, 80.0, 5.0), 21);
        let nester = Nester::new(config).unwrap();
        let result = nester.nest_parts(parts, None).unwrap();

        assert_eq!(result.placements.len(), 7);

        for (i, a) in result.placements.iter().enumerate() {
            for b in result.placements.iter().skip(i + 1) {
                if a.sheet_index != b.sheet_index {
                    continue;
                }
                let ra = placed_ring(&lookup, a);
                let rb = placed_ring(&lookup, b);
                let overlap = intersection_area(&[ra], &[rb]);
                assert!(
                    overlap < 0.01,
                    "parts {}/{} and {}/{} overlap by {}",
                    a.part_id,
                    a.instance,
                    b.part_id,
                    b.instance,
                    overlap
                );
            }
        }
    }

    #[test]
    fn test_placements_stay_inside_usable_region() {
        let raw = vec![RawPart::new("a", vec![rect_path(30.0, 20.0)]).with_quantity(4)];
        let parts = ingest(&raw, 0.3, 0.0).unwrap();
        let lookup = parts_by_id(&parts);

        // Usable region: (5, 5) to (115, 75).
        let config = fast_config(small_sheet(120.0, 80.0, 5.0), 23);
        let nester = Nester::new(config).unwrap();
        let result = nester.nest_parts(parts, None).unwrap();

        assert_eq!(result.placements.len(), 4);
        for p in &result.placements {
            let part = &lookup[&p.part_id];
            let bounds = part.outline.rotated(p.rotation).translated(p.x, p.y).bounds();
            assert!(bounds.x >= 5.0 - 1e-5, "min x = {}", bounds.x);
            assert!(bounds.y >= 5.0 - 1e-5, "min y = {}", bounds.y);
            assert!(bounds.max_x() <= 115.0 + 1e-5, "max x = {}", bounds.max_x());
            assert!(bounds.max_y() <= 75.0 + 1e-5, "max y = {}", bounds.max_y());
        }
    }

    #[test]
    fn test_small_part_nests_inside_hole() {
        let raw = vec![
            RawPart::new(
                "frame",
                vec![rect_path(100.0, 100.0), vec![
                    (25.0, 25.0),
                    (75.0, 25.0),
                    (75.0, 75.0),
                    (25.0, 75.0),
                ]],
            ),
            RawPart::new("insert", vec![rect_path(30.0, 30.0)]),
        ];
        let parts = ingest(&raw, 0.3, 0.0).unwrap();
        let lookup = parts_by_id(&parts);

        let config = fast_config(small_sheet(150.0, 150.0, 5.0), 29);
        let nester = Nester::new(config).unwrap();
        let result = nester.nest_parts(parts, None).unwrap();

        assert_eq!(result.placements.len(), 2);

        let insert = result
            .placements
            .iter()
            .find(|p| p.part_id == 3)
            .expect("insert was placed");
        assert!(insert.in_hole);
        assert_eq!(insert.hole_index, Some(0));

        let parent = &result.placements[insert.parent_index.expect("insert has a parent")];
        assert_eq!(parent.part_id, 1);

        // The insert's box sits inside the frame's hole, both in sheet
        // coordinates.
        let frame = &lookup[&parent.part_id];
        let hole = frame
            .outline
            .rotated(parent.rotation)
            .translated(parent.x, parent.y)
            .holes[0]
            .bounds();
        let seated = lookup[&insert.part_id]
            .outline
            .rotated(insert.rotation)
            .translated(insert.x, insert.y)
            .bounds();

        assert!(seated.x >= hole.x - 1e-5);
        assert!(seated.y >= hole.y - 1e-5);
        assert!(seated.max_x() <= hole.max_x() + 1e-5);
        assert!(seated.max_y() <= hole.max_y() + 1e-5);
    }

    #[test]
    fn test_grouped_parts_share_one_rotation() {
        let raw = vec![
            RawPart::new("wide", vec![rect_path(40.0, 20.0)])
                .with_quantity(2)
                .with_group("panels"),
            RawPart::new("tall", vec![rect_path(20.0, 40.0)])
                .with_quantity(2)
                .with_group("panels"),
        ];
        let config = fast_config(small_sheet(200.0, 200.0, 5.0), 31)
            .with_population_size(6)
            .with_max_generations(4);

        let nester = Nester::new(config).unwrap();
        let result = nester.nest(&raw).unwrap();

        assert_eq!(result.placements.len(), 4);
        let first = result.placements[0].rotation.rem_euclid(360.0);
        for p in &result.placements {
            assert_eq!(
                p.rotation.rem_euclid(360.0),
                first,
                "part {}/{} broke the group rotation",
                p.part_id,
                p.instance
            );
        }
    }
}

mod optimizer_tests {
    use super::*;

    #[test]
    fn test_seeded_runs_are_deterministic() {
        let raw = vec![
            RawPart::new("a", vec![rect_path(30.0, 20.0)]).with_quantity(2),
            RawPart::new("b", vec![rect_path(12.0, 18.0)]).with_quantity(3),
        ];
        let config = fast_config(small_sheet(120.0, 90.0, 5.0), 17).with_max_generations(3);

        let run = || {
            let nester = Nester::new(config.clone()).unwrap();
            nester.nest(&raw).unwrap()
        };
        let first = run();
        let second = run();

        assert_eq!(first.placements.len(), second.placements.len());
        for (a, b) in first.placements.iter().zip(&second.placements) {
            assert_eq!(a.part_id, b.part_id);
            assert_eq!(a.instance, b.instance);
            assert_eq!(a.sheet_index, b.sheet_index);
            assert_eq!(a.x, b.x);
            assert_eq!(a.y, b.y);
            assert_eq!(a.rotation, b.rotation);
        }
        assert_eq!(first.best_fitness, second.best_fitness);
        assert_eq!(first.fitness_history, second.fitness_history);
    }

    #[test]
    fn test_fitness_never_degrades_across_generations() {
        let raw = vec![
            RawPart::new("a", vec![rect_path(30.0, 20.0)]).with_quantity(3),
            RawPart::new("b", vec![rect_path(15.0, 10.0)]).with_quantity(3),
        ];
        let config = fast_config(small_sheet(150.0, 100.0, 5.0), 37)
            .with_population_size(6)
            .with_max_generations(5);

        let nester = Nester::new(config).unwrap();
        let result = nester.nest(&raw).unwrap();

        let history = result.fitness_history.expect("history is recorded");
        assert!(!history.is_empty());
        for pair in history.windows(2) {
            assert!(
                pair[1] <= pair[0],
                "fitness went from {} to {}",
                pair[0],
                pair[1]
            );
        }
        assert_eq!(result.best_fitness, history.last().copied());
    }

    #[test]
    fn test_spill_across_sheets() {
        // 18x18 blocks on a 20x20 usable region: one per sheet.
        let raw = vec![RawPart::new("block", vec![rect_path(18.0, 18.0)]).with_quantity(3)];
        let config = fast_config(small_sheet(30.0, 30.0, 5.0), 41);

        let nester = Nester::new(config).unwrap();
        let result = nester.nest(&raw).unwrap();

        assert_eq!(result.placements.len(), 3);
        assert_eq!(result.sheets_used, 3);
        assert!(result.unplaced.is_empty());

        let mut sheets: Vec<u32> = result.placements.iter().map(|p| p.sheet_index).collect();
        sheets.sort_unstable();
        assert_eq!(sheets, vec![0, 1, 2]);
    }

    #[test]
    fn test_solver_trait_reports_generations() {
        let raw = vec![RawPart::new("a", vec![rect_path(20.0, 20.0)]).with_quantity(2)];
        let mut nester =
            Nester::new(fast_config(small_sheet(100.0, 100.0, 5.0), 43)).unwrap();

        let result = Solver::solve(&mut nester, &raw).unwrap();
        assert_eq!(result.generations, Some(2));
        assert!(!result.cancelled);
        assert!(result.best_fitness.is_some());
    }
}
