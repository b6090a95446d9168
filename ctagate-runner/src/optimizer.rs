//! Brute-force parameter search over a bounded worker pool.
//!
//! Every candidate setting is evaluated as an independent backtest; the
//! pool bounds parallelism, collection preserves generation order, and the
//! final ranking is a stable descending sort on the target metric. Worker
//! count therefore never changes the outcome, only the wall time.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use rayon::prelude::*;
use thiserror::Error;

use crate::evaluation::{EvaluationResult, Evaluator};
use crate::space::{OptimizationSpace, ParameterSetting, SpaceError};

/// Default pool width when the caller does not choose one.
pub const DEFAULT_WORKER_COUNT: usize = 4;

/// Why a whole sweep could not run (individual candidate failures are
/// collected in the outcome instead).
#[derive(Debug, Error)]
pub enum SweepError {
    #[error("invalid parameter space: {0}")]
    Space(#[from] SpaceError),
    #[error("worker pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
}

/// A candidate that errored instead of producing a result.
#[derive(Debug)]
pub struct CandidateFailure {
    pub setting: ParameterSetting,
    pub error: String,
}

/// Outcome of one search: ranked results, per-candidate failures, and
/// how long the whole thing took.
#[derive(Debug)]
pub struct SweepOutcome {
    /// Results sorted by target metric descending; equal metrics keep
    /// their generation order.
    pub results: Vec<EvaluationResult>,
    pub failures: Vec<CandidateFailure>,
    pub candidate_count: usize,
    pub elapsed: Duration,
}

impl SweepOutcome {
    pub fn best(&self) -> Option<&EvaluationResult> {
        self.results.first()
    }
}

/// Stable descending sort on the target metric.
///
/// Equal metrics keep their input order, so candidates rank in generation
/// order when nothing distinguishes them. NaN metrics sink to the bottom.
pub fn rank(mut results: Vec<EvaluationResult>) -> Vec<EvaluationResult> {
    fn sort_key(metric: f64) -> f64 {
        if metric.is_nan() {
            f64::NEG_INFINITY
        } else {
            metric
        }
    }
    results.sort_by(|a, b| sort_key(b.metric).total_cmp(&sort_key(a.metric)));
    results
}

/// Evaluate every setting in the space and rank the survivors.
///
/// A failing candidate is recorded and skipped; the sweep keeps going.
/// An empty space returns an empty outcome without building a pool.
pub fn run_brute_force(
    evaluator: &Evaluator,
    space: &OptimizationSpace,
    worker_count: usize,
    report: &(dyn Fn(&str) + Sync),
) -> Result<SweepOutcome, SweepError> {
    let settings = space.settings()?;
    let candidate_count = settings.len();
    if candidate_count == 0 {
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
        "starting brute-force search: {candidate_count} candidates on {worker_count} workers, target '{}'",
        evaluator.target_metric()
    ));

    let started = Instant::now();
    let done = AtomicUsize::new(0);

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(worker_count)
        .build()?;

    // par_iter + collect keeps generation order regardless of which worker
    // finishes first.
    let evaluated: Vec<Result<EvaluationResult, String>> = pool.install(|| {
        settings
            .par_iter()
            .map(|setting| {
                let outcome = evaluator.evaluate(setting).map_err(|e| e.to_string());
                let finished = done.fetch_add(1, Ordering::Relaxed) + 1;
                report(&format!("evaluated {finished}/{candidate_count}: {setting}"));
                outcome
            })
            .collect()
    });

    let mut results = Vec::new();
    let mut failures = Vec::new();
    for (setting, outcome) in settings.into_iter().zip(evaluated) {
        match outcome {
            Ok(result) => results.push(result),
            Err(error) => failures.push(CandidateFailure { setting, error }),
        }
    }

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
        "search complete: {candidate_count} candidates, {} failed, {}s elapsed",
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
