//! Genetic optimization of the placement order and part rotations.
//!
//! The chromosome is a permutation of part instances plus one rotation
//! per instance, decoded by the multi-sheet allocator. Instances that
//! share a group key always carry the same rotation, so grouped parts
//! come out of the foam in one orientation.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rand::prelude::*;

use foamnest_core::{
    Error, GaConfig, GaProblem, GaProgress, GaProgressCallback, GaResult, GaRunner, Individual,
    NestConfig, ProgressCallback, ProgressInfo, Result, SolveResult,
};

use crate::allocate::allocate;
use crate::geometry::Part;
use crate::nfp::NfpCache;
use crate::placement::NestInstance;

/// Shared, immutable description of the genome layout.
#[derive(Debug)]
pub struct GenomeMeta {
    /// Group id per instance index.
    groups: Vec<usize>,
    /// Number of distinct groups.
    group_count: usize,
    /// Rotation grid shared by every part.
    angles: Vec<f64>,
    /// Per-gene mutation probability.
    mutation_rate: f64,
}

impl GenomeMeta {
    /// Builds the layout for a list of instances.
    ///
    /// Instances whose parts share a group key get the same group id.
    pub fn new(instances: &[(Arc<Part>, u32)], config: &NestConfig) -> Self {
        let mut group_ids: HashMap<&str, usize> = HashMap::new();
        let mut groups = Vec::with_capacity(instances.len());
        for (part, _) in instances {
            let next = group_ids.len();
            let id = *group_ids.entry(part.group_key.as_str()).or_insert(next);
            groups.push(id);
        }

        let step = config.rotation_step();
        let angles = (0..config.rotations.max(1))
            .map(|k| k as f64 * step)
            .collect();

        Self {
            group_count: group_ids.len(),
            groups,
            angles,
            mutation_rate: config.mutation_rate,
        }
    }

    /// Number of instances in the genome.
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    /// True when the genome is empty.
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

/// One candidate nesting: a placement order and per-instance rotations.
#[derive(Debug, Clone)]
pub struct NestIndividual {
    /// Permutation of instance indices, in placement order.
    pub order: Vec<usize>,
    /// Rotation per instance index, degrees on the grid.
    pub rotations: Vec<f64>,
    meta: Arc<GenomeMeta>,
    fitness: f64,
    placed_count: usize,
    sheets_used: u32,
}

impl NestIndividual {
    fn new(order: Vec<usize>, rotations: Vec<f64>, meta: Arc<GenomeMeta>) -> Self {
        Self {
            order,
            rotations,
            meta,
            fitness: f64::INFINITY,
            placed_count: 0,
            sheets_used: 0,
        }
    }

    /// Instances placed by this individual's best decode.
    pub fn placed_count(&self) -> usize {
        self.placed_count
    }

    /// Sheets opened by this individual's best decode.
    pub fn sheets_used(&self) -> u32 {
        self.sheets_used
    }

    fn set_result(&mut self, fitness: f64, placed_count: usize, sheets_used: u32) {
        self.fitness = fitness;
        self.placed_count = placed_count;
        self.sheets_used = sheets_used;
    }

    fn invalidate(&mut self) {
        self.fitness = f64::INFINITY;
        self.placed_count = 0;
        self.sheets_used = 0;
    }

    /// True when every group carries one rotation.
    pub fn groups_uniform(&self) -> bool {
        let mut seen: HashMap<usize, f64> = HashMap::new();
        for (idx, &group) in self.meta.groups.iter().enumerate() {
            let rotation = self.rotations[idx];
            match seen.get(&group) {
                Some(&existing) if (existing - rotation).abs() > 1e-9 => return false,
                Some(_) => {}
                None => {
                    seen.insert(group, rotation);
                }
            }
        }
        true
    }

    /// Re-establishes group uniformity: for each group, the rotation of
    /// the member appearing earliest in the order wins.
    fn enforce_group_rotations(&mut self) {
        let mut winner: HashMap<usize, f64> = HashMap::new();
        for &idx in &self.order {
            let group = self.meta.groups[idx];
            winner.entry(group).or_insert(self.rotations[idx]);
        }
        for (idx, &group) in self.meta.groups.iter().enumerate() {
            if let Some(&rotation) = winner.get(&group) {
                self.rotations[idx] = rotation;
            }
        }
    }

    /// Sets one rotation for every member of a group. Returns true when
    /// anything changed.
    fn set_group_rotation(&mut self, group: usize, rotation: f64) -> bool {
        let mut changed = false;
        for (idx, &g) in self.meta.groups.iter().enumerate() {
            if g == group && (self.rotations[idx] - rotation).abs() > 1e-9 {
                self.rotations[idx] = rotation;
                changed = true;
            }
        }
        changed
    }
}

impl Individual for NestIndividual {
    fn fitness(&self) -> f64 {
        self.fitness
    }

    fn is_evaluated(&self) -> bool {
        self.fitness.is_finite()
    }

    /// Single-point order crossover. The child keeps the head of this
    /// parent's order and fills up with the other parent's remaining
    /// genes in their order. Rotations travel with their genes; group
    /// uniformity is re-established afterwards.
    fn crossover<R: Rng + ?Sized>(&self, other: &Self, rng: &mut R) -> Self {
        let n = self.order.len();
        if n < 2 {
            return self.clone();
        }

        let cut = rng.gen_range(1..n);
        let mut order: Vec<usize> = self.order[..cut].to_vec();
        let mut rotations = self.rotations.clone();
        let mut used = vec![false; n];
        for &gene in &order {
            used[gene] = true;
        }
        for &gene in &other.order {
            if !used[gene] {
                used[gene] = true;
                rotations[gene] = other.rotations[gene];
                order.push(gene);
            }
        }

        let mut child = Self::new(order, rotations, Arc::clone(&self.meta));
        child.enforce_group_rotations();
        child
    }

    /// Neighbor swaps on the order plus whole-group rotation reassigns,
    /// each gated by the configured per-gene rate.
    fn mutate<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        let n = self.order.len();
        let mut changed = false;

        for i in 0..n.saturating_sub(1) {
            if rng.gen::<f64>() < self.meta.mutation_rate {
                self.order.swap(i, i + 1);
                changed = true;
            }
        }

        if self.meta.angles.len() > 1 {
            for group in 0..self.meta.group_count {
                if rng.gen::<f64>() < self.meta.mutation_rate {
                    let angle = self.meta.angles[rng.gen_range(0..self.meta.angles.len())];
                    changed |= self.set_group_rotation(group, angle);
                }
            }
        }

        if changed {
            self.invalidate();
        }
    }
}

/// The nesting problem evaluated by the genetic runner.
pub struct NestProblem {
    /// Instance index to (part, copy number).
    instances: Vec<(Arc<Part>, u32)>,
    meta: Arc<GenomeMeta>,
    config: NestConfig,
    cache: Arc<NfpCache>,
    cancelled: Arc<AtomicBool>,
    /// (placed, sheets) of the best individual, for progress reports.
    last_best: Mutex<(usize, u32)>,
}

impl NestProblem {
    /// Creates a problem over expanded part instances.
    pub fn new(
        instances: Vec<(Arc<Part>, u32)>,
        config: NestConfig,
        cache: Arc<NfpCache>,
        cancelled: Arc<AtomicBool>,
    ) -> Self {
        let meta = Arc::new(GenomeMeta::new(&instances, &config));
        Self {
            instances,
            meta,
            config,
            cache,
            cancelled,
            last_best: Mutex::new((0, 0)),
        }
    }

    /// Genome layout shared by all individuals of this problem.
    pub fn meta(&self) -> Arc<GenomeMeta> {
        Arc::clone(&self.meta)
    }

    /// Placement queue encoded by an individual.
    pub fn queue_of(&self, individual: &NestIndividual) -> Vec<NestInstance> {
        individual
            .order
            .iter()
            .filter_map(|&gene| {
                let (part, instance) = self.instances.get(gene)?;
                Some(NestInstance {
                    part: Arc::clone(part),
                    instance: *instance,
                    rotation: individual.rotations[gene],
                })
            })
            .collect()
    }

    /// Counters of the current best individual.
    pub fn best_counters(&self) -> (usize, u32) {
        match self.last_best.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}

impl GaProblem for NestProblem {
    type Individual = NestIndividual;

    fn evaluate(&self, individual: &mut NestIndividual) {
        if individual.order.iter().any(|&g| g >= self.instances.len()) {
            debug_assert!(false, "gene out of range");
            log::error!("chromosome references a missing instance, penalizing");
            individual.set_result(f64::MAX, 0, 0);
            return;
        }
        if !individual.groups_uniform() {
            debug_assert!(false, "group rotations drifted apart");
            log::error!("group rotations drifted apart, repairing");
            individual.enforce_group_rotations();
        }

        let queue = self.queue_of(individual);
        match allocate(&queue, &self.config, &self.cache, &self.cancelled) {
            Ok(outcome) => {
                individual.set_result(
                    outcome.fitness,
                    outcome.placed_count(),
                    outcome.sheets_used,
                );
            }
            Err(e) => {
                log::warn!("placement decode failed: {}", e);
                individual.set_result(f64::MAX, 0, 0);
            }
        }
    }

    /// Seeds with instances sorted by descending net area at rotation
    /// zero, then fills up with mutated copies of that seed.
    fn initialize_population<R: Rng + ?Sized>(
        &self,
        size: usize,
        rng: &mut R,
    ) -> Vec<NestIndividual> {
        let mut order: Vec<usize> = (0..self.instances.len()).collect();
        order.sort_by(|&a, &b| {
            let area_a = self.instances[a].0.area();
            let area_b = self.instances[b].0.area();
            area_b
                .partial_cmp(&area_a)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let rotations = vec![0.0; self.instances.len()];
        let seed = NestIndividual::new(order, rotations, self.meta());

        let mut population = vec![seed.clone()];
        while population.len() < size {
            let mut mutant = seed.clone();
            mutant.mutate(rng);
            population.push(mutant);
        }
        population
    }

    fn on_generation(&self, generation: u32, best: &NestIndividual) {
        log::debug!(
            "generation {}: fitness={:.3}, placed={}/{}, sheets={}",
            generation,
            best.fitness(),
            best.placed_count,
            self.instances.len(),
            best.sheets_used
        );
        let counters = (best.placed_count, best.sheets_used);
        match self.last_best.lock() {
            Ok(mut guard) => *guard = counters,
            Err(poisoned) => *poisoned.into_inner() = counters,
        }
    }
}

/// Expands parts into `(part, copy)` instances honoring quantities.
pub fn expand_instances(parts: &[Part]) -> Vec<(Arc<Part>, u32)> {
    let mut instances = Vec::new();
    for part in parts {
        let shared = Arc::new(part.clone());
        for copy in 0..part.quantity.max(1) {
            instances.push((Arc::clone(&shared), copy));
        }
    }
    instances
}

/// Runs the full genetic nesting optimization and decodes the best
/// individual into a final result.
pub fn run_nest_ga(
    parts: &[Part],
    config: &NestConfig,
    cache: Arc<NfpCache>,
    cancelled: Arc<AtomicBool>,
    progress: Option<ProgressCallback>,
) -> Result<SolveResult> {
    let instances = expand_instances(parts);
    let total_instances = instances.len();

    let problem = Arc::new(NestProblem::new(
        instances,
        config.clone(),
        Arc::clone(&cache),
        Arc::clone(&cancelled),
    ));

    let mut ga_config = GaConfig::default()
        .with_population_size(config.population_size)
        .with_max_generations(config.max_generations)
        .with_crossover_rate(config.crossover_rate)
        .with_mutation_rate(config.mutation_rate)
        .with_elite_count(config.elite_count);
    if config.time_limit_ms > 0 {
        ga_config = ga_config.with_time_limit(Duration::from_millis(config.time_limit_ms));
    }
    if let Some(target) = config.target_fitness {
        ga_config = ga_config.with_target_fitness(target);
    }

    let runner = GaRunner::with_cancel_flag(ga_config, Arc::clone(&problem), Arc::clone(&cancelled));

    let ga_progress: Option<GaProgressCallback> = progress.map(|callback| {
        let problem = Arc::clone(&problem);
        let max_generations = config.max_generations;
        Box::new(move |p: GaProgress| {
            let (placed, sheets) = problem.best_counters();
            let mut info = ProgressInfo::new(max_generations, total_instances)
                .with_generation(p.generation)
                .with_fitness(p.best_fitness)
                .with_placed(placed, sheets)
                .with_elapsed_ms(p.elapsed.as_millis() as u64)
                .with_phase("evolving");
            if !p.running {
                info = info.finished();
            }
            callback(info);
        }) as GaProgressCallback
    });

    let ga_result = if config.threads > 0 {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.threads)
            .build()
            .map_err(|e| Error::Internal(format!("failed to build worker pool: {}", e)))?;
        pool.install(|| run_runner(&runner, config.seed, ga_progress))?
    } else {
        run_runner(&runner, config.seed, ga_progress)?
    };

    // Decode the winner once more for the final placement records.
    let queue = problem.queue_of(&ga_result.best);
    let outcome = allocate(&queue, config, &cache, &AtomicBool::new(false))?;

    let mut result = SolveResult::new()
        .with_strategy(config.strategy.as_str())
        .with_generations(ga_result.generations)
        .with_best_fitness(ga_result.best.fitness())
        .with_fitness_history(ga_result.history);
    result.placements = outcome.placements;
    result.sheets_used = outcome.sheets_used;
    result.utilization = outcome.utilization;
    result.unplaced = outcome.unplaced;
    result.computation_time_ms = ga_result.elapsed.as_millis() as u64;
    result.cancelled = cancelled.load(Ordering::Relaxed);
    result.target_reached = ga_result.target_reached;
    Ok(result)
}

fn run_runner(
    runner: &GaRunner<NestProblem>,
    seed: Option<u64>,
    progress: Option<GaProgressCallback>,
) -> Result<GaResult<NestIndividual>> {
    match seed {
        Some(seed) => {
            runner.run_with_rng_and_progress(&mut StdRng::seed_from_u64(seed), progress)
        }
        None => runner.run_with_rng_and_progress(&mut rand::thread_rng(), progress),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;

    fn part_with_id(mut part: Part, id: u64) -> Part {
        part.id = id;
        part.outline.id = id;
        part
    }

    fn problem_of(parts: Vec<Part>, config: NestConfig) -> NestProblem {
        NestProblem::new(
            expand_instances(&parts),
            config,
            Arc::new(NfpCache::new()),
            Arc::new(AtomicBool::new(false)),
        )
    }

    fn grouped_parts() -> Vec<Part> {
        vec![
            part_with_id(Part::rectangle("wide", 20.0, 10.0).with_group("strips"), 1),
            part_with_id(Part::rectangle("tall", 10.0, 20.0).with_group("strips"), 2),
            part_with_id(Part::rectangle("lone", 15.0, 15.0), 3),
        ]
    }

    #[test]
    fn test_seed_orders_by_descending_area() {
        let parts = vec![
            part_with_id(Part::rectangle("small", 10.0, 10.0), 1),
            part_with_id(Part::rectangle("big", 50.0, 50.0), 2),
            part_with_id(Part::rectangle("mid", 30.0, 30.0), 3),
        ];
        let problem = problem_of(parts, NestConfig::default());
        let mut rng = StdRng::seed_from_u64(1);

        let population = problem.initialize_population(4, &mut rng);
        assert_eq!(population.len(), 4);
        assert_eq!(population[0].order, vec![1, 2, 0]);
        assert!(population[0].rotations.iter().all(|&r| r == 0.0));
    }

    #[test]
    fn test_crossover_yields_valid_permutation() {
        let problem = problem_of(grouped_parts(), NestConfig::default());
        let meta = problem.meta();
        let mut rng = StdRng::seed_from_u64(3);

        let a = NestIndividual::new(vec![0, 1, 2], vec![90.0, 90.0, 0.0], Arc::clone(&meta));
        let b = NestIndividual::new(vec![2, 0, 1], vec![270.0, 270.0, 180.0], meta);

        for _ in 0..50 {
            let child = a.crossover(&b, &mut rng);
            let mut sorted = child.order.clone();
            sorted.sort_unstable();
            assert_eq!(sorted, vec![0, 1, 2]);
            assert!(child.groups_uniform());
            assert!(!child.is_evaluated());
        }
    }

    #[test]
    fn test_mutation_preserves_group_uniformity() {
        let config = NestConfig::default().with_mutation_rate(1.0);
        let problem = problem_of(grouped_parts(), config);
        let meta = problem.meta();
        let mut rng = StdRng::seed_from_u64(9);

        let mut individual =
            NestIndividual::new(vec![0, 1, 2], vec![0.0, 0.0, 0.0], meta);
        for _ in 0..20 {
            individual.mutate(&mut rng);
            let mut sorted = individual.order.clone();
            sorted.sort_unstable();
            assert_eq!(sorted, vec![0, 1, 2]);
            assert!(individual.groups_uniform());
        }
    }

    #[test]
    fn test_evaluate_fills_counters() {
        let problem = problem_of(
            vec![part_with_id(Part::rectangle("a", 10.0, 10.0), 1)],
            NestConfig::default(),
        );
        let mut individual = NestIndividual::new(vec![0], vec![0.0], problem.meta());

        assert!(!individual.is_evaluated());
        problem.evaluate(&mut individual);
        assert!(individual.is_evaluated());
        assert_eq!(individual.placed_count(), 1);
        assert_eq!(individual.sheets_used(), 1);
        assert!(individual.fitness().is_finite());
    }

    #[test]
    fn test_zero_generations_evaluates_seed_only() {
        let parts = vec![part_with_id(Part::rectangle("a", 10.0, 10.0), 1).with_quantity(2)];
        let config = NestConfig::default()
            .with_max_generations(0)
            .with_population_size(4)
            .with_seed(7);

        let result = run_nest_ga(
            &parts,
            &config,
            Arc::new(NfpCache::new()),
            Arc::new(AtomicBool::new(false)),
            None,
        )
        .unwrap();

        assert_eq!(result.generations, Some(0));
        assert_eq!(result.placements.len(), 2);
        assert_eq!(result.sheets_used, 1);
        assert_eq!(result.fitness_history.as_ref().map(Vec::len), Some(1));
        assert!(!result.cancelled);
    }

    #[test]
    fn test_target_fitness_stops_evolution() {
        let parts = vec![part_with_id(Part::rectangle("a", 10.0, 10.0), 1)];
        // Any placement of one small part beats this target immediately.
        let config = NestConfig::default()
            .with_population_size(4)
            .with_seed(13)
            .with_target_fitness(1e12);

        let result = run_nest_ga(
            &parts,
            &config,
            Arc::new(NfpCache::new()),
            Arc::new(AtomicBool::new(false)),
            None,
        )
        .unwrap();

        assert!(result.target_reached);
        assert_eq!(result.generations, Some(0));
        assert_eq!(result.placements.len(), 1);
    }

    #[test]
    fn test_grouped_parts_share_rotation_in_result() {
        let parts = grouped_parts();
        let config = NestConfig::default()
            .with_max_generations(3)
            .with_population_size(6)
            .with_mutation_rate(0.5)
            .with_seed(11);

        let result = run_nest_ga(
            &parts,
            &config,
            Arc::new(NfpCache::new()),
            Arc::new(AtomicBool::new(false)),
            None,
        )
        .unwrap();

        let grouped: Vec<f64> = result
            .placements
            .iter()
            .filter(|p| p.part_id == 1 || p.part_id == 2)
            .map(|p| p.rotation.rem_euclid(360.0))
            .collect();
        assert_eq!(grouped.len(), 2);
        assert!(
            (grouped[0] - grouped[1]).abs() < 1e-9,
            "grouped parts must share one rotation, got {:?}",
            grouped
        );
    }

    #[test]
    fn test_cancelled_run_reports_cancelled() {
        let parts = vec![part_with_id(Part::rectangle("a", 10.0, 10.0), 1)];
        let config = NestConfig::default().with_seed(5);
        let cancelled = Arc::new(AtomicBool::new(true));

        let result = run_nest_ga(
            &parts,
            &config,
            Arc::new(NfpCache::new()),
            cancelled,
            None,
        )
        .unwrap();

        assert!(result.cancelled);
        assert_eq!(result.generations, Some(0));
    }
}
