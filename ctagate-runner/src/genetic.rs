//! Genetic parameter search.
//!
//! The search algorithm itself sits behind the `GeneticSearch` trait; the
//! runner supplies the fitness function, which scores whole generations on
//! the same worker pool and evaluation path the brute-force sweep uses.
//! Repeated settings are memoized, so revisiting a genome costs nothing.
//! The outcome ranks the list the search primitive returns; failures seen
//! along the way are kept regardless.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;

use crate::evaluation::Evaluator;
use crate::optimizer::{rank, CandidateFailure, SweepError, SweepOutcome};
use crate::space::{OptimizationSpace, ParameterSetting};

/// A population-based search primitive over a discrete parameter space.
///
/// `axes` are the candidate values along each parameter, in declaration
/// order. `fitness` scores a whole generation at once; `None` marks an
/// individual whose evaluation failed.
pub trait GeneticSearch {
    fn search(
        &self,
        axes: &[(String, Vec<f64>)],
        fitness: &dyn Fn(&[ParameterSetting]) -> Vec<Option<f64>>,
    ) -> Vec<(ParameterSetting, f64)>;
}

/// Elitist genetic algorithm: tournament selection, uniform crossover,
/// per-gene mutation, top individuals carried over unchanged.
#[derive(Debug, Clone)]
pub struct ElitistGa {
    pub population_size: usize,
    pub generations: usize,
    pub crossover_rate: f64,
    pub mutation_rate: f64,
    pub elite_count: usize,
    /// Fixed seed makes a run reproducible; `None` seeds from entropy.
    pub seed: Option<u64>,
}

impl Default for ElitistGa {
    fn default() -> Self {
        Self {
            population_size: 30,
            generations: 20,
            crossover_rate: 0.9,
            mutation_rate: 0.1,
            elite_count: 2,
            seed: None,
        }
    }
}

/// An individual is one value index per axis.
type Genome = Vec<usize>;

impl ElitistGa {
    fn rng(&self) -> StdRng {
        match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        }
    }

    fn decode(axes: &[(String, Vec<f64>)], genome: &Genome) -> ParameterSetting {
        ParameterSetting::new(
            axes.iter()
                .zip(genome)
                .map(|((name, values), &i)| (name.clone(), values[i]))
                .collect(),
        )
    }

    fn random_genome(axes: &[(String, Vec<f64>)], rng: &mut StdRng) -> Genome {
        axes.iter()
            .map(|(_, values)| rng.gen_range(0..values.len()))
            .collect()
    }

    /// Pick the fitter of two random individuals.
    fn tournament<'a>(
        scored: &'a [(Genome, f64)],
        rng: &mut StdRng,
    ) -> &'a Genome {
        let a = &scored[rng.gen_range(0..scored.len())];
        let b = &scored[rng.gen_range(0..scored.len())];
        if a.1 >= b.1 {
            &a.0
        } else {
            &b.0
        }
    }
}

impl GeneticSearch for ElitistGa {
    fn search(
        &self,
        axes: &[(String, Vec<f64>)],
        fitness: &dyn Fn(&[ParameterSetting]) -> Vec<Option<f64>>,
    ) -> Vec<(ParameterSetting, f64)> {
        if axes.is_empty() || axes.iter().any(|(_, values)| values.is_empty()) {
            return Vec::new();
        }
        let mut rng = self.rng();
        let population_size = self.population_size.max(2);
        let elite_count = self.elite_count.min(population_size);

        let mut population: Vec<Genome> = (0..population_size)
            .map(|_| Self::random_genome(axes, &mut rng))
            .collect();
        let mut scored: Vec<(Genome, f64)> = Vec::new();

        for _ in 0..self.generations.max(1) {
            let settings: Vec<ParameterSetting> = population
                .iter()
                .map(|g| Self::decode(axes, g))
                .collect();
            let scores = fitness(&settings);

            scored = population
                .iter()
                .cloned()
                .zip(scores)
                .map(|(genome, score)| (genome, score.unwrap_or(f64::NEG_INFINITY)))
                .collect();
            // Stable sort keeps earlier individuals ahead on equal fitness.
            scored.sort_by(|a, b| b.1.total_cmp(&a.1));

            let mut next: Vec<Genome> = scored
                .iter()
                .take(elite_count)
                .map(|(genome, _)| genome.clone())
                .collect();
            while next.len() < population_size {
                let parent_a = Self::tournament(&scored, &mut rng).clone();
                let parent_b = Self::tournament(&scored, &mut rng).clone();
                let mut child: Genome = if rng.gen::<f64>() < self.crossover_rate {
                    // Uniform crossover, gene by gene.
                    parent_a
                        .iter()
                        .zip(&parent_b)
                        .map(|(&a, &b)| if rng.gen::<bool>() { a } else { b })
                        .collect()
                } else {
                    parent_a
                };
                for (gene, (_, values)) in child.iter_mut().zip(axes) {
                    if rng.gen::<f64>() < self.mutation_rate {
                        *gene = rng.gen_range(0..values.len());
                    }
                }
                next.push(child);
            }
            population = next;
        }

        scored
            .into_iter()
            .filter(|(_, score)| score.is_finite())
            .map(|(genome, score)| (Self::decode(axes, &genome), score))
            .collect()
    }
}

/// Run a genetic search over the space, scoring genomes with full
/// backtests on a bounded worker pool.
///
/// The outcome ranks whatever list the primitive returns, deduplicated,
/// and reports it in the same shape as a brute-force sweep. Every failure
/// observed during the search stays in the outcome.
pub fn run_genetic(
    evaluator: &Evaluator,
    space: &OptimizationSpace,
    search: &dyn GeneticSearch,
    worker_count: usize,
    report: &(dyn Fn(&str) + Sync),
) -> Result<SweepOutcome, SweepError> {
    space.validate()?;
    let space_size = space.size();
    if space_size == 0 {
        report("search space is empty, nothing to evaluate");
        return Ok(SweepOutcome {
            results: Vec::new(),
            failures: Vec::new(),
            candidate_count: 0,
            elapsed: Duration::ZERO,
        });
    }

    let worker_count = worker_count.max(1);
    report(&format!(
        "starting genetic search: space of {space_size} on {worker_count} workers, target '{}'",
        evaluator.target_metric()
    ));

    let started = Instant::now();
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(worker_count)
        .build()?;

    // Keyed by the setting's canonical string form. A racing duplicate
    // evaluation is harmless: backtests are deterministic, last write wins
    // with an identical value.
    let memo: Mutex<HashMap<String, Result<crate::evaluation::EvaluationResult, CandidateFailure>>> =
        Mutex::new(HashMap::new());

    let fitness = |generation: &[ParameterSetting]| -> Vec<Option<f64>> {
        pool.install(|| {
            generation
                .par_iter()
                .map(|setting| {
                    let key = setting.key();
                    if let Some(cached) = memo
                        .lock()
                        .expect("memo lock poisoned")
                        .get(&key)
                    {
                        return cached.as_ref().ok().map(|r| r.metric);
                    }
                    let outcome = evaluator.evaluate(setting).map_err(|e| CandidateFailure {
                        setting: setting.clone(),
                        error: e.to_string(),
                    });
                    let metric = outcome.as_ref().ok().map(|r| r.metric);
                    memo.lock()
                        .expect("memo lock poisoned")
                        .insert(key, outcome);
                    metric
                })
                .collect()
        })
    };

    let axes = space.axis_values();
    let returned = search.search(&axes, &fitness);

    let mut memo = memo.into_inner().expect("memo lock poisoned");
    let mut candidate_count = memo.len();
    let mut results = Vec::new();
    let mut failures = Vec::new();
    let mut seen = HashSet::new();
    for (setting, _) in returned {
        let key = setting.key();
        if !seen.insert(key.clone()) {
            continue;
        }
        let outcome = match memo.remove(&key) {
            Some(outcome) => outcome,
            // A primitive may return a setting it never ran through the
            // fitness function; score it now so the report still covers it.
            None => {
                candidate_count += 1;
                evaluator.evaluate(&setting).map_err(|e| CandidateFailure {
                    setting: setting.clone(),
                    error: e.to_string(),
                })
            }
        };
        match outcome {
            Ok(result) => results.push(result),
            Err(failure) => failures.push(failure),
        }
    }
    // Failures hit along the way stay in the outcome even when the final
    // list leaves them out.
    for outcome in memo.into_values() {
        if let Err(failure) = outcome {
            failures.push(failure);
        }
    }
    failures.sort_by(|a, b| a.setting.key().cmp(&b.setting.key()));
    let results = rank(results);
    let elapsed = started.elapsed();

    for (i, result) in results.iter().enumerate() {
        report(&format!(
            "#{rank}: {setting} {target} = {value:.4}",
            rank = i + 1,
            setting = result.setting,
            target = evaluator.target_metric(),
            value = result.metric,
        ));
    }
    for failure in &failures {
        report(&format!("failed: {} ({})", failure.setting, failure.error));
    }
    report(&format!(
        "genetic search complete: {candidate_count} distinct candidates evaluated, {} failed, {}s elapsed",
        failures.len(),
        elapsed.as_secs(),
    ));

    Ok(SweepOutcome {
        results,
        failures,
        candidate_count,
        elapsed,
    })
}
