//! Greedy per-sheet placement of an ordered, rotated part queue.
//!
//! Parts are taken strictly in queue order. The first part lands at the
//! leftmost feasible position; every later part scores candidate anchor
//! positions on the boundary of its free region (inner NFP against the
//! sheet minus the union of outer NFPs against placed parts) plus
//! candidate seats inside holes of already-placed parts, and takes the
//! best score that survives an explicit overlap check.

use std::collections::HashSet;
use std::sync::Arc;

use i_overlay::core::fill_rule::FillRule;
use log::warn;

use foamnest_core::{Error, NestConfig, PlacementStrategy, PlacementWeights, Result};

use crate::boolean::{self, translate_ring, Ring};
use crate::geometry::{convex_hull_of, Bounds, Part, Point, Polygon, Sheet, TOL};
use crate::nfp::{inner_nfp, outer_nfp, Nfp, NfpCache};

/// Intersection area above which two placements count as overlapping.
const OVERLAP_TOLERANCE: f64 = 1e-3;

/// A candidate part must stay under this fraction of a hole's width
/// and height to be tried inside it.
const HOLE_DIM_RATIO: f64 = 0.98;

/// A candidate part must stay under this fraction of a hole's area.
const HOLE_AREA_RATIO: f64 = 0.95;

/// Containment slack when verifying a hole seat, as a fraction of the
/// candidate's area.
const CONTAINMENT_SLACK: f64 = 0.01;

/// Slack when confirming a candidate stays inside the sheet bounds.
const BOUNDS_SLACK: f64 = 1e-6;

/// One entry of the placement queue: a part copy with its genome
/// rotation.
#[derive(Debug, Clone)]
pub struct NestInstance {
    /// The part to place.
    pub part: Arc<Part>,
    /// Copy index within the part's quantity.
    pub instance: u32,
    /// Rotation assigned by the optimizer, degrees.
    pub rotation: f64,
}

/// A part fixed on a sheet.
#[derive(Debug, Clone)]
pub struct PlacedInstance {
    /// The part that was placed.
    pub part: Arc<Part>,
    /// Copy index within the part's quantity.
    pub instance: u32,
    /// Outline rotated to the placed orientation, still at the local
    /// origin; translate by (x, y) for sheet coordinates.
    pub polygon: Polygon,
    /// Sheet-frame translation.
    pub x: f64,
    /// Sheet-frame translation.
    pub y: f64,
    /// Final rotation, degrees.
    pub rotation: f64,
    /// True when seated inside another part's hole.
    pub in_hole: bool,
    /// Index of the hole's owner in the placed list.
    pub parent: Option<usize>,
    /// Which hole of the owner.
    pub hole_index: Option<usize>,
}

impl PlacedInstance {
    /// Exterior ring in sheet coordinates.
    pub fn translated_ring(&self) -> Ring {
        translate_ring(&boolean::ring_from_points(&self.polygon.points), self.x, self.y)
    }

    /// Bounding box in sheet coordinates.
    pub fn sheet_bounds(&self) -> Bounds {
        shift_bounds(&self.polygon.bounds(), self.x, self.y)
    }

    /// Net area of the placed outline.
    pub fn area(&self) -> f64 {
        self.polygon.net_area()
    }
}

/// One rotated outline with its candidate anchor positions.
struct CandidateSet {
    polygon: Polygon,
    ring: Ring,
    local_bounds: Bounds,
    anchors: Vec<[f64; 2]>,
    seat: Option<HoleSeat>,
}

/// Hole-fitting context for a candidate set.
struct HoleSeat {
    parent: usize,
    hole: usize,
    /// Orientation and unused-hole bonuses, multiplied into the score.
    bonus: f64,
    /// Hole bounds in sheet coordinates.
    hole_bounds: Bounds,
    /// Hole outline as a solid ring in sheet coordinates.
    hole_ring: Ring,
}

/// Places as many queue entries as fit on one sheet, in order.
///
/// Returns the placements and the entries that found no position; the
/// caller carries those to the next sheet.
pub fn place_on_sheet(
    sheet: &Sheet,
    queue: &[NestInstance],
    cache: &NfpCache,
    config: &NestConfig,
) -> Result<(Vec<PlacedInstance>, Vec<NestInstance>)> {
    let mut placed: Vec<PlacedInstance> = Vec::new();
    let mut remaining: Vec<NestInstance> = Vec::new();
    let mut used_seats: HashSet<(usize, usize)> = HashSet::new();
    let mut placed_bounds: Option<Bounds> = None;
    let usable = sheet.bounds();

    'queue: for inst in queue {
        let Some((polygon, sheet_nfp)) = fit_rotation(sheet, inst, cache, config)? else {
            remaining.push(inst.clone());
            continue;
        };

        // The first part settles at the leftmost feasible position.
        if placed.is_empty() {
            let b0 = polygon.points[0];
            let local = polygon.bounds();
            let mut best: Option<(f64, f64)> = None;
            for ring in &sheet_nfp.rings {
                for v in ring {
                    let tx = v[0] - b0.x;
                    let ty = v[1] - b0.y;
                    if !fits_inside(&shift_bounds(&local, tx, ty), &usable) {
                        continue;
                    }
                    let better = match best {
                        None => true,
                        Some((bx, by)) => tx < bx - TOL || ((tx - bx).abs() <= TOL && ty < by),
                    };
                    if better {
                        best = Some((tx, ty));
                    }
                }
            }
            if let Some((tx, ty)) = best {
                let entry = place_entry(inst, polygon, tx, ty, None);
                placed_bounds = Some(merge_bounds(placed_bounds, entry.sheet_bounds()));
                placed.push(entry);
            } else {
                remaining.push(inst.clone());
            }
            continue;
        }

        let mut sets: Vec<CandidateSet> = Vec::new();

        // Free region on the sheet surface.
        let mut blocked: Vec<Ring> = Vec::new();
        for p in &placed {
            match outer_nfp(&p.polygon, &polygon, cache) {
                Ok(nfp) => blocked.extend(nfp.translated(p.x, p.y).rings),
                Err(Error::NfpFailure { reason, .. }) => {
                    warn!("outer NFP failed ({}), treating as blocked nowhere", reason);
                }
                Err(e) => return Err(e),
            }
        }
        let free = boolean::difference(
            &sheet_nfp.rings,
            &boolean::union(&blocked),
            FillRule::EvenOdd,
        );
        if !free.is_empty() {
            let anchors = free.iter().flat_map(|r| r.iter().copied()).collect();
            sets.push(CandidateSet {
                ring: boolean::ring_from_points(&polygon.points),
                local_bounds: polygon.bounds(),
                polygon: polygon.clone(),
                anchors,
                seat: None,
            });
        }

        // Hole seats compete with the sheet surface.
        if config.use_holes {
            collect_hole_sets(
                &placed,
                &inst.part,
                polygon.rotation,
                cache,
                config,
                &used_seats,
                &mut sets,
            )?;
        }

        if sets.is_empty() {
            remaining.push(inst.clone());
            continue;
        }

        // Score every anchor of every set.
        let hull_base: Vec<Point> = match config.strategy {
            PlacementStrategy::ConvexHull => placed
                .iter()
                .flat_map(|p| {
                    p.polygon
                        .points
                        .iter()
                        .map(move |q| Point::inexact(q.x + p.x, q.y + p.y))
                })
                .collect(),
            _ => Vec::new(),
        };

        let mut scored: Vec<(f64, f64, usize, usize)> = Vec::new();
        for (si, set) in sets.iter().enumerate() {
            let b0 = set.polygon.points[0];
            for (ai, anchor) in set.anchors.iter().enumerate() {
                let tx = anchor[0] - b0.x;
                let ty = anchor[1] - b0.y;
                let cand_bounds = shift_bounds(&set.local_bounds, tx, ty);

                let mut score = match config.strategy {
                    PlacementStrategy::Gravity => {
                        let merged = merge_bounds(placed_bounds, cand_bounds);
                        merged.width * config.weights.gravity_width_weight + merged.height
                    }
                    PlacementStrategy::BoundingBox => {
                        merge_bounds(placed_bounds, cand_bounds).area()
                    }
                    PlacementStrategy::ConvexHull => {
                        let mut points = hull_base.clone();
                        points.extend(
                            set.polygon
                                .points
                                .iter()
                                .map(|q| Point::inexact(q.x + tx, q.y + ty)),
                        );
                        Polygon::new(convex_hull_of(&points)).area()
                    }
                };

                if let Some(seat) = &set.seat {
                    score *= seat.bonus;
                    score *= alignment_multiplier(&cand_bounds, &seat.hole_bounds, &config.weights);
                }
                scored.push((score, tx, si, ai));
            }
        }
        scored.sort_by(|a, b| {
            a.0.partial_cmp(&b.0)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
        });

        // Accept the best candidate that verifiably fits.
        for &(_, _, si, ai) in &scored {
            let set = &sets[si];
            let b0 = set.polygon.points[0];
            let tx = set.anchors[ai][0] - b0.x;
            let ty = set.anchors[ai][1] - b0.y;
            if !fits_inside(&shift_bounds(&set.local_bounds, tx, ty), &usable) {
                continue;
            }
            let cand_ring = translate_ring(&set.ring, tx, ty);

            if let Some(seat) = &set.seat {
                let overlap =
                    boolean::intersection_area(&[cand_ring.clone()], &[seat.hole_ring.clone()]);
                let area = set.polygon.area();
                if (overlap - area).abs() > area * CONTAINMENT_SLACK {
                    continue;
                }
            }

            let parent = set.seat.as_ref().map(|s| s.parent);
            let mut collides = false;
            for (pi, p) in placed.iter().enumerate() {
                if parent == Some(pi) {
                    continue;
                }
                let overlap =
                    boolean::intersection_area(&[cand_ring.clone()], &[p.translated_ring()]);
                if overlap > OVERLAP_TOLERANCE {
                    collides = true;
                    break;
                }
            }
            if collides {
                continue;
            }

            let seat = set.seat.as_ref().map(|s| (s.parent, s.hole));
            let entry = place_entry(inst, set.polygon.clone(), tx, ty, seat);
            placed_bounds = Some(merge_bounds(placed_bounds, entry.sheet_bounds()));
            if let Some(key) = seat {
                used_seats.insert(key);
            }
            placed.push(entry);
            continue 'queue;
        }

        remaining.push(inst.clone());
    }

    Ok((placed, remaining))
}

/// Finds the first rotation on the grid, starting from the genome's,
/// whose inner NFP against the sheet is non-empty.
fn fit_rotation(
    sheet: &Sheet,
    inst: &NestInstance,
    cache: &NfpCache,
    config: &NestConfig,
) -> Result<Option<(Polygon, Nfp)>> {
    let step = config.rotation_step();
    let tries = config.rotations.max(1);

    for k in 0..tries {
        let rot = (inst.rotation + step * k as f64).rem_euclid(360.0);
        let polygon = inst.part.outline.rotated(rot);

        match inner_nfp(&sheet.outline, &polygon, cache) {
            Ok(nfp) if !nfp.is_empty() => return Ok(Some((polygon, nfp))),
            Ok(_) => {}
            Err(Error::NfpFailure { reason, .. }) => {
                warn!(
                    "inner NFP failed for part '{}' at {}° ({})",
                    inst.part.name, rot, reason
                );
            }
            Err(e) => return Err(e),
        }
    }
    Ok(None)
}

/// Gathers candidate sets for every hole of every placed part that the
/// candidate could plausibly sit in, at four trial orientations.
fn collect_hole_sets(
    placed: &[PlacedInstance],
    part: &Part,
    base_rotation: f64,
    cache: &NfpCache,
    config: &NestConfig,
    used_seats: &HashSet<(usize, usize)>,
    sets: &mut Vec<CandidateSet>,
) -> Result<()> {
    let part_area = part.outline.area();
    let base_bounds = part.outline.rotated(base_rotation).bounds();

    for (pi, p) in placed.iter().enumerate() {
        for (hi, hole) in p.polygon.holes.iter().enumerate() {
            let hole_bounds = hole.bounds();
            let hole_area = hole.area();
            if hole_area < TOL || part_area >= hole_area * HOLE_AREA_RATIO {
                continue;
            }

            let w_limit = hole_bounds.width * HOLE_DIM_RATIO;
            let h_limit = hole_bounds.height * HOLE_DIM_RATIO;
            let direct = base_bounds.width < w_limit && base_bounds.height < h_limit;
            let turned = base_bounds.height < w_limit && base_bounds.width < h_limit;
            if !direct && !turned {
                continue;
            }

            let hole_solid = hole.reversed();
            let hole_wide = hole_bounds.width >= hole_bounds.height;
            let hole_bounds_sheet = shift_bounds(&hole_bounds, p.x, p.y);
            let hole_ring = translate_ring(
                &boolean::ring_from_points(&hole_solid.points),
                p.x,
                p.y,
            );

            for t in 0..4 {
                let rot = (base_rotation + 90.0 * t as f64).rem_euclid(360.0);
                let polygon = part.outline.rotated(rot);
                let pb = polygon.bounds();
                if pb.width >= w_limit || pb.height >= h_limit {
                    continue;
                }

                let nfp = match inner_nfp(&hole_solid, &polygon, cache) {
                    Ok(nfp) => nfp,
                    Err(Error::NfpFailure { reason, .. }) => {
                        warn!("hole NFP failed ({}), skipping seat", reason);
                        continue;
                    }
                    Err(e) => return Err(e),
                };
                if nfp.is_empty() {
                    continue;
                }

                let mut bonus = 1.0;
                if (pb.width >= pb.height) == hole_wide {
                    bonus *= config.weights.orientation_bonus;
                }
                if !used_seats.contains(&(pi, hi)) {
                    bonus *= config.weights.unused_hole_bonus;
                }

                let anchors = nfp
                    .translated(p.x, p.y)
                    .rings
                    .iter()
                    .flat_map(|r| r.iter().copied())
                    .collect();

                sets.push(CandidateSet {
                    ring: boolean::ring_from_points(&polygon.points),
                    local_bounds: pb,
                    polygon,
                    anchors,
                    seat: Some(HoleSeat {
                        parent: pi,
                        hole: hi,
                        bonus,
                        hole_bounds: hole_bounds_sheet,
                        hole_ring: hole_ring.clone(),
                    }),
                });
            }
        }
    }
    Ok(())
}

/// Score multiplier rewarding candidates that hug the hole's edges.
fn alignment_multiplier(cand: &Bounds, hole: &Bounds, weights: &PlacementWeights) -> f64 {
    let distances = [
        (cand.x - hole.x).abs(),
        (cand.max_x() - hole.max_x()).abs(),
        (cand.y - hole.y).abs(),
        (cand.max_y() - hole.max_y()).abs(),
    ];
    let best = distances.iter().copied().fold(f64::INFINITY, f64::min);
    let close = distances
        .iter()
        .filter(|&&d| d < weights.adjacency_gap)
        .count();

    (weights.alignment_base - best / 100.0 - close as f64 * weights.alignment_count_step)
        .max(weights.alignment_floor)
}

fn place_entry(
    inst: &NestInstance,
    polygon: Polygon,
    tx: f64,
    ty: f64,
    seat: Option<(usize, usize)>,
) -> PlacedInstance {
    PlacedInstance {
        part: Arc::clone(&inst.part),
        instance: inst.instance,
        rotation: polygon.rotation,
        polygon,
        x: tx,
        y: ty,
        in_hole: seat.is_some(),
        parent: seat.map(|(p, _)| p),
        hole_index: seat.map(|(_, h)| h),
    }
}

/// Bounding-box containment with slack, checked once more at
/// acceptance time independently of the free-region booleans.
fn fits_inside(inner: &Bounds, outer: &Bounds) -> bool {
    inner.x >= outer.x - BOUNDS_SLACK
        && inner.y >= outer.y - BOUNDS_SLACK
        && inner.max_x() <= outer.max_x() + BOUNDS_SLACK
        && inner.max_y() <= outer.max_y() + BOUNDS_SLACK
}

fn shift_bounds(b: &Bounds, dx: f64, dy: f64) -> Bounds {
    Bounds {
        x: b.x + dx,
        y: b.y + dy,
        width: b.width,
        height: b.height,
    }
}

fn merge_bounds(acc: Option<Bounds>, next: Bounds) -> Bounds {
    match acc {
        Some(b) => b.merged(&next),
        None => next,
    }
}
