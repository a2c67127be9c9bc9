//! Generic genetic algorithm runner.
//!
//! The runner minimizes a scalar fitness over a population of individuals.
//! Domain crates provide the chromosome (an [`Individual`]) and the fitness
//! evaluation (a [`GaProblem`]); the runner owns selection, elitism and the
//! generation loop. Evaluation is parallelized with rayon and individuals
//! carry their fitness so unchanged elites are never re-evaluated.

use rand::prelude::*;
use rayon::prelude::*;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Parameters of the evolution loop.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct GaConfig {
    /// Individuals per generation.
    pub population_size: usize,
    /// Generations to evolve; zero evaluates the seed population only.
    pub max_generations: u32,
    /// Probability that a child is bred from two parents instead of
    /// cloning the first parent.
    pub crossover_rate: f64,
    /// Per-gene mutation probability, applied inside the individual.
    pub mutation_rate: f64,
    /// Best individuals copied unchanged into the next generation.
    pub elite_count: usize,
    /// Wall-clock budget for the whole run.
    pub time_limit: Option<Duration>,
    /// Stop once the best fitness drops to this value or below.
    pub target_fitness: Option<f64>,
    /// Stop after this many generations without improvement.
    pub stagnation_limit: Option<u32>,
}

impl Default for GaConfig {
    fn default() -> Self {
        Self {
            population_size: 10,
            max_generations: 50,
            crossover_rate: 0.9,
            mutation_rate: 0.1,
            elite_count: 1,
            time_limit: None,
            target_fitness: None,
            stagnation_limit: None,
        }
    }
}

impl GaConfig {
    /// Sets the population size (at least 2).
    pub fn with_population_size(mut self, size: usize) -> Self {
        self.population_size = size.max(2);
        self
    }

    /// Sets the generation count.
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

    /// Sets the time limit.
    pub fn with_time_limit(mut self, limit: Duration) -> Self {
        self.time_limit = Some(limit);
        self
    }

    /// Sets the target fitness.
    pub fn with_target_fitness(mut self, target: f64) -> Self {
        self.target_fitness = Some(target);
        self
    }

    /// Sets the stagnation limit.
    pub fn with_stagnation_limit(mut self, limit: u32) -> Self {
        self.stagnation_limit = Some(limit);
        self
    }
}

/// A candidate solution.
///
/// Fitness is minimized. Individuals cache their fitness; an individual
/// whose genes changed must report `is_evaluated() == false` until the
/// problem evaluates it again.
pub trait Individual: Clone + Send + Sync {
    /// Cached fitness, lower is better.
    fn fitness(&self) -> f64;

    /// True once [`GaProblem::evaluate`] has run for the current genes.
    fn is_evaluated(&self) -> bool;

    /// Breeds a child from two parents. `self` is the dominant parent.
    fn crossover<R: Rng + ?Sized>(&self, other: &Self, rng: &mut R) -> Self;

    /// Mutates the individual in place. The per-gene rate is the
    /// individual's own concern.
    fn mutate<R: Rng + ?Sized>(&mut self, rng: &mut R);
}

/// The optimization problem evaluated by the runner.
pub trait GaProblem: Send + Sync {
    /// Chromosome type.
    type Individual: Individual;

    /// Computes and stores the fitness of one individual.
    fn evaluate(&self, individual: &mut Self::Individual);

    /// Evaluates every not-yet-evaluated individual, in parallel.
    fn evaluate_parallel(&self, population: &mut [Self::Individual]) {
        population
            .par_iter_mut()
            .filter(|individual| !individual.is_evaluated())
            .for_each(|individual| self.evaluate(individual));
    }

    /// Builds the initial population. Implementations seed it with a
    /// deterministic first individual and fill up with mutated copies.
    fn initialize_population<R: Rng + ?Sized>(
        &self,
        size: usize,
        rng: &mut R,
    ) -> Vec<Self::Individual>;

    /// Hook invoked after each generation with the best individual so far.
    fn on_generation(&self, _generation: u32, _best: &Self::Individual) {}
}

/// Per-generation progress snapshot.
#[derive(Debug, Clone)]
pub struct GaProgress {
    /// Completed generation number.
    pub generation: u32,
    /// Configured generation count.
    pub max_generations: u32,
    /// Best fitness so far.
    pub best_fitness: f64,
    /// Mean fitness of the current population.
    pub avg_fitness: f64,
    /// Elapsed time since the run started.
    pub elapsed: Duration,
    /// False once the run has finished.
    pub running: bool,
}

/// Callback receiving [`GaProgress`] snapshots.
pub type GaProgressCallback = Box<dyn Fn(GaProgress) + Send + Sync>;

/// Outcome of a run.
#[derive(Debug, Clone)]
pub struct GaResult<I> {
    /// Best individual found.
    pub best: I,
    /// Generations actually evolved.
    pub generations: u32,
    /// Wall-clock duration of the run.
    pub elapsed: Duration,
    /// True when the target fitness was reached.
    pub target_reached: bool,
    /// Best fitness after the seed evaluation and after each generation.
    pub history: Vec<f64>,
}

/// Drives the evolution loop for a [`GaProblem`].
pub struct GaRunner<P: GaProblem> {
    config: GaConfig,
    problem: Arc<P>,
    cancelled: Arc<AtomicBool>,
}

impl<P: GaProblem> GaRunner<P> {
    /// Creates a runner with its own cancellation flag.
    pub fn new(config: GaConfig, problem: Arc<P>) -> Self {
        Self::with_cancel_flag(config, problem, Arc::new(AtomicBool::new(false)))
    }

    /// Creates a runner observing an externally owned cancellation flag.
    pub fn with_cancel_flag(config: GaConfig, problem: Arc<P>, cancelled: Arc<AtomicBool>) -> Self {
        Self {
            config,
            problem,
            cancelled,
        }
    }

    /// Shared flag that stops the run at the next generation boundary.
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancelled)
    }

    /// Runs with the thread RNG and no progress reporting.
    pub fn run(&self) -> Result<GaResult<P::Individual>> {
        self.run_with_rng(&mut rand::thread_rng())
    }

    /// Runs with the thread RNG, reporting progress per generation.
    pub fn run_with_progress(
        &self,
        progress: GaProgressCallback,
    ) -> Result<GaResult<P::Individual>> {
        self.run_with_rng_and_progress(&mut rand::thread_rng(), Some(progress))
    }

    /// Runs with a caller-provided RNG, e.g. for reproducible solves.
    pub fn run_with_rng<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<GaResult<P::Individual>> {
        self.run_with_rng_and_progress(rng, None)
    }

    /// Full run loop: breed, evaluate, select, repeat.
    pub fn run_with_rng_and_progress<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        progress: Option<GaProgressCallback>,
    ) -> Result<GaResult<P::Individual>> {
        let start = Instant::now();
        let config = &self.config;

        let mut population = self
            .problem
            .initialize_population(config.population_size, rng);
        if population.is_empty() {
            return Err(Error::InvalidConfig(
                "initial population must not be empty".into(),
            ));
        }
        self.problem.evaluate_parallel(&mut population);
        sort_by_fitness(&mut population);

        let mut best = population[0].clone();
        let mut history = vec![best.fitness()];
        let mut generation = 0u32;
        let mut stagnation = 0u32;
        let mut target_reached = reached(config.target_fitness, best.fitness());

        while generation < config.max_generations && !target_reached {
            if self.cancelled.load(Ordering::Relaxed) {
                log::debug!("ga cancelled after generation {generation}");
                break;
            }
            if let Some(limit) = config.time_limit {
                if start.elapsed() >= limit {
                    log::debug!("ga time limit reached after generation {generation}");
                    break;
                }
            }

            // Elites survive unchanged; the rest are bred from
            // rank-weighted parents.
            let elite_count = config.elite_count.min(population.len());
            let mut next: Vec<P::Individual> =
                population.iter().take(elite_count).cloned().collect();
            while next.len() < config.population_size {
                let first = rank_weighted_index(population.len(), None, rng);
                let second = rank_weighted_index(population.len(), Some(first), rng);
                let mut child = if rng.gen::<f64>() < config.crossover_rate {
                    population[first].crossover(&population[second], rng)
                } else {
                    population[first].clone()
                };
                child.mutate(rng);
                next.push(child);
            }

            population = next;
            self.problem.evaluate_parallel(&mut population);
            sort_by_fitness(&mut population);

            if population[0].fitness() < best.fitness() {
                best = population[0].clone();
                stagnation = 0;
            } else {
                stagnation += 1;
            }
            history.push(best.fitness());
            generation += 1;
            target_reached = reached(config.target_fitness, best.fitness());

            self.problem.on_generation(generation, &best);
            if let Some(ref callback) = progress {
                callback(GaProgress {
                    generation,
                    max_generations: config.max_generations,
                    best_fitness: best.fitness(),
                    avg_fitness: average_fitness(&population),
                    elapsed: start.elapsed(),
                    running: true,
                });
            }

            if let Some(limit) = config.stagnation_limit {
                if stagnation >= limit {
                    log::debug!("ga stalled for {stagnation} generations, stopping");
                    break;
                }
            }
        }

        if let Some(ref callback) = progress {
            callback(GaProgress {
                generation,
                max_generations: config.max_generations,
                best_fitness: best.fitness(),
                avg_fitness: average_fitness(&population),
                elapsed: start.elapsed(),
                running: false,
            });
        }

        Ok(GaResult {
            best,
            generations: generation,
            elapsed: start.elapsed(),
            target_reached,
            history,
        })
    }
}

fn reached(target: Option<f64>, fitness: f64) -> bool {
    target.is_some_and(|t| fitness <= t)
}

fn sort_by_fitness<I: Individual>(population: &mut [I]) {
    population.sort_by(|a, b| {
        a.fitness()
            .partial_cmp(&b.fitness())
            .unwrap_or(std::cmp::Ordering::Equal)
    });
}

fn average_fitness<I: Individual>(population: &[I]) -> f64 {
    let mut sum = 0.0;
    let mut count = 0usize;
    for individual in population {
        let fitness = individual.fitness();
        if fitness.is_finite() {
            sum += fitness;
            count += 1;
        }
    }
    if count == 0 {
        f64::INFINITY
    } else {
        sum / count as f64
    }
}

/// Picks a population index with weight proportional to `1 / (rank + 2)`,
/// so better-ranked individuals are drawn more often but every rank keeps
/// a real chance. `exclude` removes one index from the draw.
fn rank_weighted_index<R: Rng + ?Sized>(len: usize, exclude: Option<usize>, rng: &mut R) -> usize {
    debug_assert!(len > 0);
    if len == 1 {
        return 0;
    }

    let weight = |rank: usize| 1.0 / (rank + 2) as f64;
    let total: f64 = (0..len)
        .filter(|rank| Some(*rank) != exclude)
        .map(weight)
        .sum();

    let mut remaining = rng.gen::<f64>() * total;
    let mut last = 0;
    for rank in 0..len {
        if Some(rank) == exclude {
            continue;
        }
        last = rank;
        let w = weight(rank);
        if remaining < w {
            return rank;
        }
        remaining -= w;
    }
    last
}
