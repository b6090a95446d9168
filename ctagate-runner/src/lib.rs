//! ctagate runner — parameter-space search over backtest evaluations.
//!
//! This crate builds on `ctagate-core` to provide:
//! - Performance metrics computed from a replay result
//! - Parameter spaces (ranges and value lists, Cartesian expansion)
//! - Candidate evaluation: setting in, scored backtest out
//! - Brute-force search over a bounded rayon worker pool
//! - Genetic search behind the `GeneticSearch` trait, with memoized
//!   fitness sharing the same evaluation path
//! - TOML job configuration and the strategy registry

pub mod config;
pub mod evaluation;
pub mod genetic;
pub mod metrics;
pub mod optimizer;
pub mod space;

pub use config::{ConfigFileError, GaConfig, OptimizeConfig, StrategyConfig, SweepConfig};
pub use evaluation::{EvalError, EvaluationResult, Evaluator, StrategyFactory};
pub use genetic::{run_genetic, ElitistGa, GeneticSearch};
pub use metrics::PerformanceMetrics;
pub use optimizer::{
    rank, run_brute_force, CandidateFailure, SweepError, SweepOutcome, DEFAULT_WORKER_COUNT,
};
pub use space::{OptimizationSpace, ParameterSetting, SpaceError};

#[cfg(test)]
mod send_sync_checks {
    use super::*;

    fn assert_send<T: Send>() {}
    fn assert_sync<T: Sync>() {}

    #[test]
    fn results_cross_the_worker_boundary() {
        assert_send::<EvaluationResult>();
        assert_sync::<EvaluationResult>();
        assert_send::<ParameterSetting>();
        assert_sync::<ParameterSetting>();
        assert_send::<PerformanceMetrics>();
        assert_sync::<PerformanceMetrics>();
    }

    #[test]
    fn evaluator_is_shareable() {
        assert_send::<Evaluator>();
        assert_sync::<Evaluator>();
    }
}
