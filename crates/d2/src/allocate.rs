//! Multi-sheet allocation: runs the greedy placer sheet by sheet and
//! scores the outcome.
//!
//! Sheets all come from one template. A new sheet is opened only while
//! parts remain and the previous sheet made progress; a pass that
//! places nothing ends the run so an unplaceable part cannot open
//! empty sheets forever.

use std::sync::atomic::{AtomicBool, Ordering};

use foamnest_core::{NestConfig, Placement, PlacementWeights, Result};

use crate::geometry::{Bounds, Sheet};
use crate::nfp::NfpCache;
use crate::placement::{place_on_sheet, NestInstance, PlacedInstance};

/// Result of allocating one placement queue across sheets.
#[derive(Debug, Clone)]
pub struct AllocationOutcome {
    /// Final placement records, sheet by sheet in placement order.
    pub placements: Vec<Placement>,
    /// Number of sheets opened.
    pub sheets_used: u32,
    /// `(part_id, instance)` pairs that found no position.
    pub unplaced: Vec<(u64, u32)>,
    /// Fitness of the outcome, lower is better.
    pub fitness: f64,
    /// Net part area over the area of the opened sheets.
    pub utilization: f64,
}

impl AllocationOutcome {
    /// Number of placed instances.
    pub fn placed_count(&self) -> usize {
        self.placements.len()
    }
}

/// Places the queue across as many sheets as the configuration allows.
///
/// The cancellation flag is polled between sheets; a cancelled run
/// keeps what it placed so far and reports the rest as unplaced.
pub fn allocate(
    queue: &[NestInstance],
    config: &NestConfig,
    cache: &NfpCache,
    cancelled: &AtomicBool,
) -> Result<AllocationOutcome> {
    let sheet = Sheet::from_template(&config.sheet)?;

    let mut sheets: Vec<Vec<PlacedInstance>> = Vec::new();
    let mut pending: Vec<NestInstance> = queue.to_vec();

    while !pending.is_empty()
        && (sheets.len() as u32) < config.max_sheets
        && !cancelled.load(Ordering::Relaxed)
    {
        let (placed, remaining) = place_on_sheet(&sheet, &pending, cache, config)?;
        if placed.is_empty() {
            break;
        }
        sheets.push(placed);
        pending = remaining;
    }

    let fitness = score(&sheets, &pending, &sheet, config);
    let sheet_area_total = sheet.area() * sheets.len() as f64;
    let placed_area: f64 = sheets
        .iter()
        .flat_map(|placed| placed.iter())
        .map(PlacedInstance::area)
        .sum();
    let utilization = if sheet_area_total > 0.0 {
        placed_area / sheet_area_total
    } else {
        0.0
    };

    let mut placements = Vec::new();
    for (sheet_index, placed) in sheets.iter().enumerate() {
        let offset = placements.len();
        for p in placed {
            let mut record = Placement::new(
                p.part.id,
                p.instance,
                sheet_index as u32,
                p.x,
                p.y,
                p.rotation,
            );
            if let (Some(parent), Some(hole)) = (p.parent, p.hole_index) {
                record = record.into_hole(offset + parent, hole);
            }
            placements.push(record);
        }
    }

    Ok(AllocationOutcome {
        placements,
        sheets_used: sheets.len() as u32,
        unplaced: pending
            .iter()
            .map(|inst| (inst.part.id, inst.instance))
            .collect(),
        fitness,
        utilization,
    })
}

/// Scores an allocation. Every opened sheet costs its full area plus
/// the extent actually used on it; unplaced parts dominate everything
/// else; placements inside holes earn small rebates.
fn score(
    sheets: &[Vec<PlacedInstance>],
    unplaced: &[NestInstance],
    sheet: &Sheet,
    config: &NestConfig,
) -> f64 {
    let sheet_area = sheet.area();
    let total_area = if sheets.is_empty() {
        sheet_area
    } else {
        sheet_area * sheets.len() as f64
    };

    let mut fitness = 0.0;
    for placed in sheets {
        fitness += sheet_area;

        let mut bounds: Option<Bounds> = None;
        for p in placed {
            let b = p.sheet_bounds();
            bounds = Some(match bounds {
                Some(acc) => acc.merged(&b),
                None => b,
            });
        }
        if let Some(b) = bounds {
            fitness += b.width / sheet_area + b.area();
        }

        fitness -= hole_rewards(placed, total_area, &config.weights);
    }

    for inst in unplaced {
        fitness += config.unplaced_penalty * (inst.part.area() * 100.0 / total_area);
    }

    fitness
}

/// Rebates for placements seated in holes: one per seated part, plus
/// one per pair of parts sharing a hole with nearly touching bounds.
fn hole_rewards(placed: &[PlacedInstance], total_area: f64, weights: &PlacementWeights) -> f64 {
    let mut reward = 0.0;

    let seated: Vec<(usize, usize, Bounds, f64)> = placed
        .iter()
        .filter_map(|p| match (p.parent, p.hole_index) {
            (Some(parent), Some(hole)) => Some((parent, hole, p.sheet_bounds(), p.area())),
            _ => None,
        })
        .collect();

    for (_, _, _, area) in &seated {
        reward += area / total_area / weights.hole_reward_divisor;
    }

    for i in 0..seated.len() {
        for j in (i + 1)..seated.len() {
            let (pa, ha, ref ba, aa) = seated[i];
            let (pb, hb, ref bb, ab) = seated[j];
            if pa != pb || ha != hb {
                continue;
            }
            if ba.gap_x(bb) < weights.adjacency_gap && ba.gap_y(bb) < weights.adjacency_gap {
                reward += (2.0 * aa.min(ab) / total_area) * weights.adjacency_reward;
            }
        }
    }

    reward
}
