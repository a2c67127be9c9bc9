//! The nesting solver facade.
//!
//! [`Nester`] ties the pipeline together: raw outlines are ingested
//! into clean parts, the genetic optimizer searches placement orders
//! and rotations, and the winner is decoded into a [`SolveResult`].
//! One nester can run many solves; the NFP cache and the cancellation
//! flag are reset at the start of each.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use foamnest_core::{
    Error, NestConfig, ProgressCallback, Result, SolveResult, SolveSummary, Solver,
};

use crate::ga_nesting::run_nest_ga;
use crate::geometry::Part;
use crate::ingest::{ingest, RawPart};
use crate::nfp::NfpCache;

/// 2-D sheet nesting solver.
///
/// # Example
///
/// ```no_run
/// use foamnest_d2::{Nester, RawPart};
/// use foamnest_core::NestConfig;
///
/// let config = NestConfig::default().with_seed(42).with_max_generations(10);
/// let nester = Nester::new(config)?;
///
/// let square = RawPart::new(
///     "square",
///     vec![vec![(0.0, 0.0), (100.0, 0.0), (100.0, 100.0), (0.0, 100.0)]],
/// )
/// .with_quantity(4);
///
/// let result = nester.nest(&[square])?;
/// println!("{} sheets, {:.1}% used", result.sheets_used, result.utilization * 100.0);
/// # Ok::<(), foamnest_core::Error>(())
/// ```
pub struct Nester {
    config: NestConfig,
    cancelled: Arc<AtomicBool>,
    cache: Arc<NfpCache>,
}

impl Nester {
    /// Creates a nester after validating the configuration.
    pub fn new(config: NestConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            cancelled: Arc::new(AtomicBool::new(false)),
            cache: Arc::new(NfpCache::new()),
        })
    }

    /// The configuration this nester runs with.
    pub fn config(&self) -> &NestConfig {
        &self.config
    }

    /// Number of NFPs currently cached.
    pub fn cached_nfps(&self) -> Result<usize> {
        self.cache.len()
    }

    /// Nests raw outlines: ingestion, optimization, decode.
    pub fn nest(&self, raw_parts: &[RawPart]) -> Result<SolveResult> {
        self.nest_with_progress(raw_parts, None)
    }

    /// Like [`Nester::nest`], reporting progress after every generation.
    pub fn nest_with_progress(
        &self,
        raw_parts: &[RawPart],
        progress: Option<ProgressCallback>,
    ) -> Result<SolveResult> {
        let parts = ingest(raw_parts, self.config.curve_tolerance, self.config.spacing)?;
        self.nest_parts(parts, progress)
    }

    /// Nests already-ingested parts.
    ///
    /// Outline ids are reassigned so the NFP cache keys are unique even
    /// when callers bring their own parts.
    pub fn nest_parts(
        &self,
        mut parts: Vec<Part>,
        progress: Option<ProgressCallback>,
    ) -> Result<SolveResult> {
        if parts.is_empty() {
            return Err(Error::InvalidGeometry("no parts to nest".into()));
        }
        assign_ids(&mut parts);

        self.cancelled.store(false, Ordering::Relaxed);
        self.cache.reset()?;

        let result = run_nest_ga(
            &parts,
            &self.config,
            Arc::clone(&self.cache),
            Arc::clone(&self.cancelled),
            progress,
        )?;

        log::info!("nest finished: {}", SolveSummary::from(&result));
        Ok(result)
    }

    /// Requests cancellation from another thread. The run stops at the
    /// next generation boundary and returns the best result so far.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }
}

/// Renumbers outline ids sequentially from 1, holes included. Id 0
/// stays reserved for the sheet.
fn assign_ids(parts: &mut [Part]) {
    let mut next: u64 = 1;
    for part in parts {
        part.id = next;
        part.outline.id = next;
        next += 1;
        for hole in &mut part.outline.holes {
            hole.id = next;
            next += 1;
        }
    }
}

impl Solver for Nester {
    type Part = RawPart;

    fn solve(&mut self, parts: &[RawPart]) -> Result<SolveResult> {
        self.nest(parts)
    }

    fn solve_with_progress(
        &mut self,
        parts: &[RawPart],
        progress: Option<ProgressCallback>,
    ) -> Result<SolveResult> {
        self.nest_with_progress(parts, progress)
    }

    fn cancel(&self) {
        Nester::cancel(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn square_path(size: f64) -> Vec<(f64, f64)> {
        vec![(0.0, 0.0), (size, 0.0), (size, size), (0.0, size)]
    }

    fn fast_config() -> NestConfig {
        NestConfig::default()
            .with_population_size(4)
            .with_max_generations(2)
            .with_seed(1)
    }

    #[test]
    fn test_nest_simple_squares() {
        let nester = Nester::new(fast_config()).unwrap();
        let raw = vec![
            RawPart::new("a", vec![square_path(50.0)]).with_quantity(2),
            RawPart::new("b", vec![square_path(30.0)]),
        ];

        let result = nester.nest(&raw).unwrap();
        assert_eq!(result.placements.len(), 3);
        assert!(result.unplaced.is_empty());
        assert_eq!(result.sheets_used, 1);
        assert!(result.utilization > 0.0);
        assert_eq!(result.strategy.as_deref(), Some("Gravity"));
    }

    #[test]
    fn test_nest_assigns_sequential_ids() {
        let nester = Nester::new(fast_config()).unwrap();
        let mut parts = vec![
            Part::rectangle("a", 20.0, 20.0),
            Part::rectangle("b", 30.0, 30.0),
        ];
        // Callers may bring colliding ids; the nester renumbers them.
        parts[0].id = 7;
        parts[1].id = 7;

        let result = nester.nest_parts(parts, None).unwrap();
        let mut ids: Vec<u64> = result.placements.iter().map(|p| p.part_id).collect();
        ids.sort_unstable();
        assert_eq!(ids, vec![1, 2]);
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let mut config = NestConfig::default();
        config.population_size = 0;
        assert!(Nester::new(config).is_err());
    }

    #[test]
    fn test_empty_input_is_rejected() {
        let nester = Nester::new(fast_config()).unwrap();
        assert!(nester.nest_parts(Vec::new(), None).is_err());
        assert!(nester.nest(&[]).is_err());
    }

    #[test]
    fn test_cancel_flag_resets_per_run() {
        let nester = Nester::new(fast_config()).unwrap();
        nester.cancel();

        // The flag is cleared when the next solve starts.
        let result = nester
            .nest(&[RawPart::new("a", vec![square_path(20.0)])])
            .unwrap();
        assert!(!result.cancelled);
        assert_eq!(result.placements.len(), 1);
    }

    #[test]
    fn test_cache_fills_during_solve() {
        let nester = Nester::new(fast_config()).unwrap();
        let raw = vec![RawPart::new("a", vec![square_path(25.0)]).with_quantity(3)];

        let result = nester.nest(&raw).unwrap();
        assert_eq!(result.placements.len(), 3);
        assert!(nester.cached_nfps().unwrap() > 0);
    }

    #[test]
    fn test_progress_reports_completion() {
        let nester = Nester::new(fast_config()).unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);

        let result = nester
            .nest_with_progress(
                &[RawPart::new("a", vec![square_path(20.0)]).with_quantity(2)],
                Some(Box::new(move |info| {
                    seen.fetch_add(1, Ordering::Relaxed);
                    assert!(info.total_parts == 2);
                })),
            )
            .unwrap();

        assert_eq!(result.placements.len(), 2);
        // At least the final snapshot arrives.
        assert!(calls.load(Ordering::Relaxed) >= 1);
    }

    #[test]
    fn test_solver_trait_dispatch() {
        let mut nester = Nester::new(fast_config()).unwrap();
        let solver: &mut dyn Solver<Part = RawPart> = &mut nester;

        let result = solver
            .solve(&[RawPart::new("a", vec![square_path(20.0)])])
            .unwrap();
        assert_eq!(result.placements.len(), 1);
    }
}
