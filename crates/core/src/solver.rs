//! Solver configuration and the common solver interface.

use crate::error::{Error, Result};

/// Candidate scoring strategy used by the greedy placement engine.
///
/// Every strategy is a cost: lower is better. The engine evaluates each
/// feasible anchor position with the selected strategy and keeps the
/// cheapest one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PlacementStrategy {
    /// Minimize `width * gravity_width_weight + height` of the combined
    /// bounding box. Pulls parts toward the left edge of the sheet.
    #[default]
    Gravity,
    /// Minimize the area of the combined bounding box.
    BoundingBox,
    /// Minimize the area of the convex hull of all placed vertices.
    ConvexHull,
}

impl PlacementStrategy {
    /// Stable name used in results and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            PlacementStrategy::Gravity => "Gravity",
            PlacementStrategy::BoundingBox => "BoundingBox",
            PlacementStrategy::ConvexHull => "ConvexHull",
        }
    }
}

impl std::fmt::Display for PlacementStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Dimensions of the stock sheets the allocator may open.
///
/// All sheets in a run share one template. The padding is kept clear on
/// every side, so the usable region is `(width - 2 * padding) x
/// (height - 2 * padding)` anchored at `(padding, padding)`.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SheetTemplate {
    /// Nominal sheet width.
    pub width: f64,
    /// Nominal sheet height.
    pub height: f64,
    /// Clearance kept on every side of the sheet.
    pub padding: f64,
}

impl SheetTemplate {
    /// Creates a template with the default padding.
    pub fn new(width: f64, height: f64) -> Self {
        Self {
            width,
            height,
            padding: 10.0,
        }
    }

    /// Width of the region parts may occupy.
    pub fn usable_width(&self) -> f64 {
        self.width - 2.0 * self.padding
    }

    /// Height of the region parts may occupy.
    pub fn usable_height(&self) -> f64 {
        self.height - 2.0 * self.padding
    }

    /// Checks the template describes a usable sheet.
    pub fn validate(&self) -> Result<()> {
        if !self.width.is_finite() || !self.height.is_finite() || !self.padding.is_finite() {
            return Err(Error::InvalidSheet("dimensions must be finite".into()));
        }
        if self.width <= 0.0 || self.height <= 0.0 {
            return Err(Error::InvalidSheet(format!(
                "sheet dimensions must be positive, got {} x {}",
                self.width, self.height
            )));
        }
        if self.padding < 0.0 {
            return Err(Error::InvalidSheet("padding must not be negative".into()));
        }
        if self.usable_width() <= 0.0 || self.usable_height() <= 0.0 {
            return Err(Error::InvalidSheet(
                "padding leaves no usable area on the sheet".into(),
            ));
        }
        Ok(())
    }
}

impl Default for SheetTemplate {
    fn default() -> Self {
        Self {
            width: 1000.0,
            height: 2000.0,
            padding: 10.0,
        }
    }
}

/// Tuning knobs for placement scoring and the fitness rewards.
///
/// The defaults reproduce the behaviour the engine was calibrated with;
/// they rarely need to change for foam work.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PlacementWeights {
    /// Multiplier on bounding-box width in the gravity strategy.
    pub gravity_width_weight: f64,
    /// Score multiplier when a part's long axis matches the hole's.
    pub orientation_bonus: f64,
    /// Score multiplier for the first part placed into a hole.
    pub unused_hole_bonus: f64,
    /// Divisor applied to the per-placement hole reward in the fitness.
    pub hole_reward_divisor: f64,
    /// Bounding boxes closer than this count as contour-adjacent.
    pub adjacency_gap: f64,
    /// Weight of the adjacency reward in the fitness.
    pub adjacency_reward: f64,
    /// Base of the hole alignment multiplier.
    pub alignment_base: f64,
    /// Lower clamp of the hole alignment multiplier.
    pub alignment_floor: f64,
    /// Reduction per additionally aligned edge.
    pub alignment_count_step: f64,
}

impl PlacementWeights {
    /// Checks the weights are internally consistent.
    pub fn validate(&self) -> Result<()> {
        if self.gravity_width_weight <= 0.0 {
            return Err(Error::InvalidConfig(
                "gravity_width_weight must be positive".into(),
            ));
        }
        for (name, bonus) in [
            ("orientation_bonus", self.orientation_bonus),
            ("unused_hole_bonus", self.unused_hole_bonus),
        ] {
            if !(0.0 < bonus && bonus <= 1.0) {
                return Err(Error::InvalidConfig(format!(
                    "{name} must be in (0, 1], got {bonus}"
                )));
            }
        }
        if self.alignment_floor > self.alignment_base {
            return Err(Error::InvalidConfig(
                "alignment_floor must not exceed alignment_base".into(),
            ));
        }
        if self.adjacency_gap < 0.0 {
            return Err(Error::InvalidConfig(
                "adjacency_gap must not be negative".into(),
            ));
        }
        Ok(())
    }
}

impl Default for PlacementWeights {
    fn default() -> Self {
        Self {
            gravity_width_weight: 5.0,
            orientation_bonus: 0.99,
            unused_hole_bonus: 0.99,
            hole_reward_divisor: 100.0,
            adjacency_gap: 2.0,
            adjacency_reward: 0.01,
            alignment_base: 0.9,
            alignment_floor: 0.7,
            alignment_count_step: 0.05,
        }
    }
}

/// Configuration for a nesting run.
///
/// # Example
///
/// ```
/// use foamnest_core::{NestConfig, PlacementStrategy, SheetTemplate};
///
/// let config = NestConfig::default()
///     .with_sheet(SheetTemplate::new(2500.0, 1250.0))
///     .with_strategy(PlacementStrategy::Gravity)
///     .with_rotations(4)
///     .with_max_generations(50);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NestConfig {
    /// Candidate scoring strategy.
    pub strategy: PlacementStrategy,
    /// Stock sheet template.
    pub sheet: SheetTemplate,
    /// Maximum number of sheets the allocator may open.
    pub max_sheets: u32,
    /// Number of allowed orientations; the grid step is `360 / rotations`.
    pub rotations: u32,
    /// Extra clearance between parts, applied as half on each outline.
    pub spacing: f64,
    /// Maximum deviation tolerated when simplifying outlines.
    pub curve_tolerance: f64,
    /// Try to place parts inside the holes of already placed parts.
    pub use_holes: bool,
    /// Individuals per generation.
    pub population_size: usize,
    /// Generations to evolve; zero evaluates the seed population only.
    pub max_generations: u32,
    /// Probability that two parents are recombined.
    pub crossover_rate: f64,
    /// Per-gene mutation probability.
    pub mutation_rate: f64,
    /// Best individuals copied unchanged into the next generation.
    pub elite_count: usize,
    /// Fitness penalty weight per unplaced instance.
    pub unplaced_penalty: f64,
    /// Fixed RNG seed; `None` draws from the thread RNG.
    pub seed: Option<u64>,
    /// Worker threads for fitness evaluation, 0 = rayon default.
    pub threads: usize,
    /// Wall-clock budget in milliseconds, 0 = unlimited.
    pub time_limit_ms: u64,
    /// Stop evolving once the best fitness reaches this value or below.
    pub target_fitness: Option<f64>,
    /// Scoring and reward weights.
    pub weights: PlacementWeights,
}

impl Default for NestConfig {
    fn default() -> Self {
        Self {
            strategy: PlacementStrategy::default(),
            sheet: SheetTemplate::default(),
            max_sheets: 10,
            rotations: 4,
            spacing: 0.0,
            curve_tolerance: 0.3,
            use_holes: true,
            population_size: 10,
            max_generations: 50,
            crossover_rate: 0.9,
            mutation_rate: 0.1,
            elite_count: 1,
            unplaced_penalty: 1e8,
            seed: None,
            threads: 0,
            time_limit_ms: 30_000,
            target_fitness: None,
            weights: PlacementWeights::default(),
        }
    }
}

impl NestConfig {
    /// Sets the placement strategy.
    pub fn with_strategy(mut self, strategy: PlacementStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Sets the sheet template.
    pub fn with_sheet(mut self, sheet: SheetTemplate) -> Self {
        self.sheet = sheet;
        self
    }

    /// Sets the maximum number of sheets (at least 1).
    pub fn with_max_sheets(mut self, max_sheets: u32) -> Self {
        self.max_sheets = max_sheets.max(1);
        self
    }

    /// Sets the number of allowed orientations (at least 1).
    pub fn with_rotations(mut self, rotations: u32) -> Self {
        self.rotations = rotations.max(1);
        self
    }

    /// Sets the part-to-part clearance.
    pub fn with_spacing(mut self, spacing: f64) -> Self {
        self.spacing = spacing.max(0.0);
        self
    }

    /// Sets the simplification tolerance.
    pub fn with_curve_tolerance(mut self, tolerance: f64) -> Self {
        self.curve_tolerance = tolerance;
        self
    }

    /// Enables or disables placement into part holes.
    pub fn with_use_holes(mut self, use_holes: bool) -> Self {
        self.use_holes = use_holes;
        self
    }

    /// Sets the population size (at least 2).
    pub fn with_population_size(mut self, size: usize) -> Self {
        self.population_size = size.max(2);
        self
    }

    /// Sets the number of generations.
    pub fn with_max_generations(mut self, generations: u32) -> Self {
        self.max_generations = generations;
        self
    }

    /// Sets the crossover rate, clamped to `[0, 1]`.
    pub fn with_crossover_rate(mut self, rate: f64) -> Self {
        self.crossover_rate = rate.clamp(0.0, 1.0);
        self
    }

    /// Sets the mutation rate, clamped to `[0, 1]`.
    pub fn with_mutation_rate(mut self, rate: f64) -> Self {
        self.mutation_rate = rate.clamp(0.0, 1.0);
        self
    }

    /// Sets the elite count.
    pub fn with_elite_count(mut self, count: usize) -> Self {
        self.elite_count = count;
        self
    }

    /// Sets the RNG seed for reproducible runs.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Sets the number of evaluation threads.
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }

    /// Sets the time limit in milliseconds.
    pub fn with_time_limit_ms(mut self, limit: u64) -> Self {
        self.time_limit_ms = limit;
        self
    }

    /// Sets the early-exit fitness target.
    pub fn with_target_fitness(mut self, target: f64) -> Self {
        self.target_fitness = Some(target);
        self
    }

    /// Sets the scoring weights.
    pub fn with_weights(mut self, weights: PlacementWeights) -> Self {
        self.weights = weights;
        self
    }

    /// Rotation step of the orientation grid, in degrees.
    pub fn rotation_step(&self) -> f64 {
        360.0 / self.rotations.max(1) as f64
    }

    /// Validates the whole configuration before a solve starts.
    pub fn validate(&self) -> Result<()> {
        self.sheet.validate()?;
        self.weights.validate()?;
        if self.population_size < 2 {
            return Err(Error::InvalidConfig(format!(
                "population_size must be at least 2, got {}",
                self.population_size
            )));
        }
        if self.elite_count >= self.population_size {
            return Err(Error::InvalidConfig(format!(
                "elite_count ({}) must be smaller than population_size ({})",
                self.elite_count, self.population_size
            )));
        }
        if self.max_sheets == 0 {
            return Err(Error::InvalidConfig("max_sheets must be at least 1".into()));
        }
        if self.rotations == 0 {
            return Err(Error::InvalidConfig("rotations must be at least 1".into()));
        }
        if !(0.0..=1.0).contains(&self.crossover_rate) {
            return Err(Error::InvalidConfig(format!(
                "crossover_rate must be in [0, 1], got {}",
                self.crossover_rate
            )));
        }
        if !(0.0..=1.0).contains(&self.mutation_rate) {
            return Err(Error::InvalidConfig(format!(
                "mutation_rate must be in [0, 1], got {}",
                self.mutation_rate
            )));
        }
        if !self.curve_tolerance.is_finite() || self.curve_tolerance <= 0.0 {
            return Err(Error::InvalidConfig(
                "curve_tolerance must be positive".into(),
            ));
        }
        if !self.spacing.is_finite() || self.spacing < 0.0 {
            return Err(Error::InvalidConfig(
                "spacing must not be negative".into(),
            ));
        }
        if !self.unplaced_penalty.is_finite() || self.unplaced_penalty < 0.0 {
            return Err(Error::InvalidConfig(
                "unplaced_penalty must not be negative".into(),
            ));
        }
        if let Some(target) = self.target_fitness {
            if !target.is_finite() {
                return Err(Error::InvalidConfig(
                    "target_fitness must be finite".into(),
                ));
            }
        }
        Ok(())
    }
}

/// Snapshot of solver progress delivered to progress callbacks.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ProgressInfo {
    /// Completed generation number.
    pub generation: u32,
    /// Configured generation count.
    pub max_generations: u32,
    /// Best fitness so far, lower is better.
    pub best_fitness: Option<f64>,
    /// Instances placed by the best individual.
    pub parts_placed: usize,
    /// Total instances in the run.
    pub total_parts: usize,
    /// Sheets opened by the best individual.
    pub sheets_used: u32,
    /// Elapsed wall-clock time in milliseconds.
    pub elapsed_ms: u64,
    /// Human-readable phase, e.g. "evolving".
    pub phase: String,
    /// False once the solver has finished.
    pub running: bool,
}

impl ProgressInfo {
    /// Creates a fresh snapshot marked as running.
    pub fn new(max_generations: u32, total_parts: usize) -> Self {
        Self {
            generation: 0,
            max_generations,
            best_fitness: None,
            parts_placed: 0,
            total_parts,
            sheets_used: 0,
            elapsed_ms: 0,
            phase: String::new(),
            running: true,
        }
    }

    /// Sets the completed generation.
    pub fn with_generation(mut self, generation: u32) -> Self {
        self.generation = generation;
        self
    }

    /// Sets the best fitness.
    pub fn with_fitness(mut self, fitness: f64) -> Self {
        self.best_fitness = Some(fitness);
        self
    }

    /// Sets the placement counters.
    pub fn with_placed(mut self, placed: usize, sheets_used: u32) -> Self {
        self.parts_placed = placed;
        self.sheets_used = sheets_used;
        self
    }

    /// Sets the elapsed time.
    pub fn with_elapsed_ms(mut self, elapsed_ms: u64) -> Self {
        self.elapsed_ms = elapsed_ms;
        self
    }

    /// Sets the phase label.
    pub fn with_phase(mut self, phase: impl Into<String>) -> Self {
        self.phase = phase.into();
        self
    }

    /// Marks the snapshot as final.
    pub fn finished(mut self) -> Self {
        self.running = false;
        self
    }

    /// Completion in percent, based on generations.
    pub fn progress_percent(&self) -> f64 {
        if self.max_generations == 0 {
            return 100.0;
        }
        (self.generation as f64 / self.max_generations as f64 * 100.0).min(100.0)
    }
}

/// Callback invoked after every generation and once on completion.
pub type ProgressCallback = Box<dyn Fn(ProgressInfo) + Send + Sync>;

/// Common interface of the nesting solvers.
pub trait Solver {
    /// Input the solver nests.
    type Part;

    /// Runs the solve to completion.
    fn solve(&mut self, parts: &[Self::Part]) -> Result<crate::result::SolveResult>;

    /// Runs the solve, reporting progress after every generation.
    fn solve_with_progress(
        &mut self,
        parts: &[Self::Part],
        progress: Option<ProgressCallback>,
    ) -> Result<crate::result::SolveResult>;

    /// Requests cancellation from another thread. The solver finishes the
    /// current generation and returns the best result found so far.
    fn cancel(&self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(NestConfig::default().validate().is_ok());
    }

    #[test]
    fn test_sheet_template_usable_area() {
        let sheet = SheetTemplate::default();
        assert_eq!(sheet.usable_width(), 980.0);
        assert_eq!(sheet.usable_height(), 1980.0);
        assert!(sheet.validate().is_ok());
    }

    #[test]
    fn test_sheet_template_rejects_zero_dims() {
        let sheet = SheetTemplate::new(0.0, 100.0);
        assert!(sheet.validate().is_err());

        let all_padding = SheetTemplate {
            width: 10.0,
            height: 10.0,
            padding: 5.0,
        };
        assert!(all_padding.validate().is_err());
    }

    #[test]
    fn test_config_builders_clamp() {
        let config = NestConfig::default()
            .with_mutation_rate(1.5)
            .with_crossover_rate(-0.2)
            .with_population_size(1)
            .with_rotations(0);
        assert_eq!(config.mutation_rate, 1.0);
        assert_eq!(config.crossover_rate, 0.0);
        assert_eq!(config.population_size, 2);
        assert_eq!(config.rotations, 1);
    }

    #[test]
    fn test_config_rejects_zero_population() {
        let mut config = NestConfig::default();
        config.population_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_rejects_elite_overflow() {
        let mut config = NestConfig::default();
        config.elite_count = config.population_size;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_rejects_nan_target() {
        let config = NestConfig::default().with_target_fitness(f64::NAN);
        assert!(config.validate().is_err());
        assert!(NestConfig::default()
            .with_target_fitness(5e5)
            .validate()
            .is_ok());
    }

    #[test]
    fn test_rotation_step() {
        assert_eq!(NestConfig::default().rotation_step(), 90.0);
        assert_eq!(NestConfig::default().with_rotations(6).rotation_step(), 60.0);
    }

    #[test]
    fn test_progress_percent() {
        let info = ProgressInfo::new(50, 8).with_generation(25);
        assert_eq!(info.progress_percent(), 50.0);
        assert!(info.running);
        assert!(!info.clone().finished().running);
    }

    #[test]
    fn test_strategy_names() {
        assert_eq!(PlacementStrategy::Gravity.as_str(), "Gravity");
        assert_eq!(PlacementStrategy::BoundingBox.to_string(), "BoundingBox");
    }
}
