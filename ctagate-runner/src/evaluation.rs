//! Candidate evaluation — one parameter setting in, one scored result out.
//!
//! The `Evaluator` owns everything a worker needs to score a setting: the
//! run configuration, a factory that instantiates the strategy (and its
//! optional filter) from the setting, the data feed, and the name of the
//! target metric. It is cheap to share across threads behind references;
//! each call builds a fresh engine so candidates never share state.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use ctagate_core::data::{FeedError, MarketDataFeed};
use ctagate_core::engine::{BacktestEngine, ConfigError, RunConfig};
use ctagate_core::strategy::{Filter, Strategy};

use crate::metrics::PerformanceMetrics;
use crate::space::ParameterSetting;

/// Builds a strategy instance (and optionally a filter) for one setting.
///
/// Implementations read the values they need from the setting and reject
/// settings they cannot honor, e.g. a missing parameter or a window that
/// must be an integer.
pub trait StrategyFactory: Send + Sync {
    fn build(&self, setting: &ParameterSetting) -> anyhow::Result<Box<dyn Strategy>>;

    /// Filter to overlay on the built strategy. Default: none.
    fn filter(&self, _setting: &ParameterSetting) -> Option<Box<dyn Filter>> {
        None
    }
}

/// Why a single candidate failed. The optimizer records these per setting
/// and keeps sweeping.
#[derive(Debug, Error)]
pub enum EvalError {
    #[error("run configuration rejected: {0}")]
    Config(#[from] ConfigError),
    #[error("data load failed: {0}")]
    DataLoad(#[from] FeedError),
    #[error("strategy build failed: {0}")]
    Build(#[from] anyhow::Error),
    #[error("target metric '{metric}' not produced by this run")]
    MetricLookup { metric: String },
}

/// One scored candidate: the setting, its target metric value, and the
/// full statistics map the value was looked up in.
///
/// `metric` always equals `statistics[target]` at construction time; the
/// pair travels together so reports never have to re-run the lookup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub setting: ParameterSetting,
    pub metric: f64,
    pub statistics: BTreeMap<String, f64>,
}

/// Scores parameter settings by running full backtests.
pub struct Evaluator {
    config: RunConfig,
    factory: Arc<dyn StrategyFactory>,
    feed: Arc<dyn MarketDataFeed>,
    target_metric: String,
}

impl Evaluator {
    pub fn new(
        config: RunConfig,
        factory: Arc<dyn StrategyFactory>,
        feed: Arc<dyn MarketDataFeed>,
        target_metric: impl Into<String>,
    ) -> Self {
        Self {
            config,
            factory,
            feed,
            target_metric: target_metric.into(),
        }
    }

    pub fn target_metric(&self) -> &str {
        &self.target_metric
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Run one candidate end to end: build, load, replay, score.
    pub fn evaluate(&self, setting: &ParameterSetting) -> Result<EvaluationResult, EvalError> {
        let mut engine = BacktestEngine::new();
        engine.set_parameters(&self.config)?;
        engine.attach_strategy(self.factory.build(setting)?)?;
        if let Some(filter) = self.factory.filter(setting) {
            engine.attach_filter(filter)?;
        }
        engine.load_data(self.feed.as_ref())?;
        let result = engine.run_backtesting()?;

        let statistics = PerformanceMetrics::compute(&result, &self.config).to_map();
        let metric = *statistics
            .get(&self.target_metric)
            .ok_or_else(|| EvalError::MetricLookup {
                metric: self.target_metric.clone(),
            })?;

        Ok(EvaluationResult {
            setting: setting.clone(),
            metric,
            statistics,
        })
    }
}
