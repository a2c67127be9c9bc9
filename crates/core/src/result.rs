//! Solve result representation.

use crate::placement::Placement;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Result of a nesting run.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SolveResult {
    /// Placements of all successfully placed instances, in placement order.
    pub placements: Vec<Placement>,

    /// Number of sheets opened.
    pub sheets_used: u32,

    /// Net part area divided by the area of the opened sheets, 0.0 - 1.0.
    pub utilization: f64,

    /// `(part_id, instance)` pairs that could not be placed.
    pub unplaced: Vec<(u64, u32)>,

    /// Computation time in milliseconds.
    pub computation_time_ms: u64,

    /// Generations actually evolved.
    pub generations: Option<u32>,

    /// Best fitness achieved, lower is better.
    pub best_fitness: Option<f64>,

    /// Best fitness after each generation, for analysis.
    pub fitness_history: Option<Vec<f64>>,

    /// Placement strategy used.
    pub strategy: Option<String>,

    /// Whether the solve was cancelled early.
    pub cancelled: bool,

    /// Whether the target fitness was reached.
    pub target_reached: bool,
}

impl SolveResult {
    /// Creates a new empty result.
    pub fn new() -> Self {
        Self {
            placements: Vec::new(),
            sheets_used: 0,
            utilization: 0.0,
            unplaced: Vec::new(),
            computation_time_ms: 0,
            generations: None,
            best_fitness: None,
            fitness_history: None,
            strategy: None,
            cancelled: false,
            target_reached: false,
        }
    }

    /// Returns true if every instance was placed.
    pub fn all_placed(&self) -> bool {
        self.unplaced.is_empty()
    }

    /// Number of placed instances.
    pub fn placed_count(&self) -> usize {
        self.placements.len()
    }

    /// Number of unplaced instances.
    pub fn unplaced_count(&self) -> usize {
        self.unplaced.len()
    }

    /// True when something was placed and nothing was left over.
    pub fn is_successful(&self) -> bool {
        !self.placements.is_empty() && self.all_placed()
    }

    /// True when the run finished without being cancelled.
    pub fn completed_normally(&self) -> bool {
        !self.cancelled
    }

    /// Sets the strategy name.
    pub fn with_strategy(mut self, strategy: impl Into<String>) -> Self {
        self.strategy = Some(strategy.into());
        self
    }

    /// Sets the generation counter.
    pub fn with_generations(mut self, generations: u32) -> Self {
        self.generations = Some(generations);
        self
    }

    /// Sets the best fitness.
    pub fn with_best_fitness(mut self, fitness: f64) -> Self {
        self.best_fitness = Some(fitness);
        self
    }

    /// Sets the fitness history.
    pub fn with_fitness_history(mut self, history: Vec<f64>) -> Self {
        self.fitness_history = Some(history);
        self
    }

    /// Removes duplicate unplaced entries while keeping their order.
    pub fn deduplicate_unplaced(&mut self) {
        let mut seen = std::collections::HashSet::new();
        self.unplaced.retain(|entry| seen.insert(*entry));
    }

    /// Placements that landed on the given sheet.
    pub fn placements_on_sheet(&self, sheet_index: u32) -> Vec<&Placement> {
        self.placements
            .iter()
            .filter(|p| p.sheet_index == sheet_index)
            .collect()
    }

    /// Instance count per sheet, indexed by sheet.
    pub fn sheet_loads(&self) -> Vec<usize> {
        let mut loads = vec![0usize; self.sheets_used as usize];
        for placement in &self.placements {
            if let Some(load) = loads.get_mut(placement.sheet_index as usize) {
                *load += 1;
            }
        }
        loads
    }

    /// Number of placements that landed inside a hole.
    pub fn hole_placements(&self) -> usize {
        self.placements.iter().filter(|p| p.in_hole).count()
    }

    /// Utilization formatted as a percentage.
    pub fn utilization_percent(&self) -> String {
        format!("{:.1}%", self.utilization * 100.0)
    }
}

impl Default for SolveResult {
    fn default() -> Self {
        Self::new()
    }
}

/// Compact summary of a result, for logs and UIs.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SolveSummary {
    /// Number of sheets opened.
    pub sheets_used: u32,
    /// Number of placed instances.
    pub placed: usize,
    /// Number of unplaced instances.
    pub unplaced: usize,
    /// Utilization ratio.
    pub utilization: f64,
    /// Computation time in milliseconds.
    pub computation_time_ms: u64,
    /// Best fitness achieved.
    pub best_fitness: Option<f64>,
}

impl From<&SolveResult> for SolveSummary {
    fn from(result: &SolveResult) -> Self {
        Self {
            sheets_used: result.sheets_used,
            placed: result.placed_count(),
            unplaced: result.unplaced_count(),
            utilization: result.utilization,
            computation_time_ms: result.computation_time_ms,
            best_fitness: result.best_fitness,
        }
    }
}

impl std::fmt::Display for SolveSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} placed, {} unplaced on {} sheet(s), {:.1}% utilization in {} ms",
            self.placed,
            self.unplaced,
            self.sheets_used,
            self.utilization * 100.0,
            self.computation_time_ms
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result_with_two_sheets() -> SolveResult {
        let mut result = SolveResult::new();
        result.placements = vec![
            Placement::new(1, 0, 0, 10.0, 10.0, 0.0),
            Placement::new(1, 1, 0, 40.0, 10.0, 90.0),
            Placement::new(2, 0, 1, 10.0, 10.0, 0.0),
        ];
        result.sheets_used = 2;
        result.utilization = 0.42;
        result
    }

    #[test]
    fn test_counts_and_success() {
        let result = result_with_two_sheets();
        assert_eq!(result.placed_count(), 3);
        assert!(result.all_placed());
        assert!(result.is_successful());
        assert_eq!(result.sheet_loads(), vec![2, 1]);
        assert_eq!(result.placements_on_sheet(1).len(), 1);
    }

    #[test]
    fn test_unplaced_makes_unsuccessful() {
        let mut result = result_with_two_sheets();
        result.unplaced.push((9, 0));
        assert!(!result.is_successful());
        assert_eq!(result.unplaced_count(), 1);
    }

    #[test]
    fn test_deduplicate_unplaced() {
        let mut result = SolveResult::new();
        result.unplaced = vec![(1, 0), (2, 0), (1, 0), (1, 1)];
        result.deduplicate_unplaced();
        assert_eq!(result.unplaced, vec![(1, 0), (2, 0), (1, 1)]);
    }

    #[test]
    fn test_utilization_percent_format() {
        let result = result_with_two_sheets();
        assert_eq!(result.utilization_percent(), "42.0%");
    }

    #[test]
    fn test_summary_from_result() {
        let result = result_with_two_sheets();
        let summary = SolveSummary::from(&result);
        assert_eq!(summary.placed, 3);
        assert_eq!(summary.sheets_used, 2);
        assert!(summary.to_string().contains("2 sheet(s)"));
    }

    #[test]
    fn test_hole_placements_counted() {
        let mut result = result_with_two_sheets();
        result.placements[1] = result.placements[1].clone().into_hole(0, 0);
        assert_eq!(result.hole_placements(), 1);
    }
}
