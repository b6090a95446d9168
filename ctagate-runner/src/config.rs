//! Serializable sweep configuration and the strategy registry.
//!
//! A TOML file describes one job end to end: the engine parameters, the
//! strategy to instantiate (by registry name, with its default parameter
//! values and optional session filter), and the optimization block when
//! the job is a search rather than a single run.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use ctagate_core::engine::{ConfigError, RunConfig};
use ctagate_core::strategy::examples::{DualMaStrategy, SessionFilter};
use ctagate_core::strategy::{Filter, Strategy};

use crate::evaluation::StrategyFactory;
use crate::genetic::ElitistGa;
use crate::optimizer::DEFAULT_WORKER_COUNT;
use crate::space::OptimizationSpace;

#[derive(Debug, Error)]
pub enum ConfigFileError {
    #[error("read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("unknown strategy '{name}'")]
    UnknownStrategy { name: String },
    #[error(transparent)]
    Run(#[from] ConfigError),
}

/// One job as described by a TOML file.
#[derive(Debug, Clone, Deserialize)]
pub struct SweepConfig {
    pub run: RunConfig,
    pub strategy: StrategyConfig,
    #[serde(default)]
    pub optimize: Option<OptimizeConfig>,
}

impl SweepConfig {
    pub fn from_path(path: &Path) -> Result<Self, ConfigFileError> {
        let text = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&text)?;
        config.run.validate()?;
        Ok(config)
    }

    /// Instantiate the configured strategy factory from the registry.
    pub fn factory(&self) -> Result<Arc<dyn StrategyFactory>, ConfigFileError> {
        match self.strategy.name.as_str() {
            "dual_ma" => Ok(Arc::new(DualMaFactory {
                defaults: self.strategy.params.clone(),
                session: self.strategy.session_filter.clone(),
            })),
            _ => Err(ConfigFileError::UnknownStrategy {
                name: self.strategy.name.clone(),
            }),
        }
    }
}

/// Which strategy to run and its default parameter values.
///
/// During optimization the searched axes override these defaults; a single
/// run uses them as-is.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyConfig {
    pub name: String,
    #[serde(default)]
    pub params: BTreeMap<String, f64>,
    #[serde(default)]
    pub session_filter: Option<SessionFilterConfig>,
}

/// Trading-session gate: opening actions only inside [start_hour, end_hour).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionFilterConfig {
    pub start_hour: u32,
    pub end_hour: u32,
}

/// The optimization block: target metric, worker pool width, and the
/// parameter axes to search.
#[derive(Debug, Clone, Deserialize)]
pub struct OptimizeConfig {
    pub target: String,
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default, rename = "parameter")]
    pub parameters: Vec<ParameterConfig>,
    #[serde(default)]
    pub ga: Option<GaConfig>,
}

fn default_workers() -> usize {
    DEFAULT_WORKER_COUNT
}

impl OptimizeConfig {
    pub fn space(&self) -> OptimizationSpace {
        let mut space = OptimizationSpace::new();
        for parameter in &self.parameters {
            space = match parameter {
                ParameterConfig::Range {
                    name,
                    start,
                    end,
                    step,
                } => space.add_range(name.clone(), *start, *end, *step),
                ParameterConfig::Values { name, values } => {
                    space.add_values(name.clone(), values.clone())
                }
            };
        }
        space
    }
}

/// One parameter axis: either an inclusive stepped range or an explicit
/// value list.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ParameterConfig {
    Range {
        name: String,
        start: f64,
        end: f64,
        step: f64,
    },
    Values {
        name: String,
        values: Vec<f64>,
    },
}

/// Genetic algorithm knobs; omitted fields keep the defaults.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GaConfig {
    pub population: Option<usize>,
    pub generations: Option<usize>,
    pub crossover_rate: Option<f64>,
    pub mutation_rate: Option<f64>,
    pub elite: Option<usize>,
    pub seed: Option<u64>,
}

impl GaConfig {
    pub fn build(&self) -> ElitistGa {
        let defaults = ElitistGa::default();
        ElitistGa {
            population_size: self.population.unwrap_or(defaults.population_size),
            generations: self.generations.unwrap_or(defaults.generations),
            crossover_rate: self.crossover_rate.unwrap_or(defaults.crossover_rate),
            mutation_rate: self.mutation_rate.unwrap_or(defaults.mutation_rate),
            elite_count: self.elite.unwrap_or(defaults.elite_count),
            seed: self.seed,
        }
    }
}

/// Registry factory for the dual moving-average strategy.
///
/// Searched axes shadow the configured defaults; anything neither the
/// setting nor the config provides is a build error.
struct DualMaFactory {
    defaults: BTreeMap<String, f64>,
    session: Option<SessionFilterConfig>,
}

impl DualMaFactory {
    fn param(&self, setting: &crate::space::ParameterSetting, name: &str) -> anyhow::Result<f64> {
        setting
            .get(name)
            .or_else(|| self.defaults.get(name).copied())
            .ok_or_else(|| anyhow::anyhow!("missing parameter '{name}'"))
    }
}

impl StrategyFactory for DualMaFactory {
    fn build(&self, setting: &crate::space::ParameterSetting) -> anyhow::Result<Box<dyn Strategy>> {
        let fast = self.param(setting, "fast")?;
        let slow = self.param(setting, "slow")?;
        let volume = self
            .param(setting, "volume")
            .unwrap_or(1.0);
        if fast < 1.0 || slow < 2.0 {
            anyhow::bail!("window parameters must be >= 1, got fast={fast} slow={slow}");
        }
        if fast >= slow {
            anyhow::bail!("fast window {fast} must be below slow window {slow}");
        }
        Ok(Box::new(DualMaStrategy::new(
            fast as usize,
            slow as usize,
            volume,
        )))
    }

    fn filter(&self, _setting: &crate::space::ParameterSetting) -> Option<Box<dyn Filter>> {
        self.session
            .as_ref()
            .map(|s| Box::new(SessionFilter::new(s.start_hour, s.end_hour)) as Box<dyn Filter>)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::space::ParameterSetting;

    const SAMPLE: &str = r#"
        [run]
        symbol = "RB888"
        interval = "minute"
        start = "2024-01-02T09:00:00"
        end = "2024-03-01T15:00:00"
        rate = 0.0001
        slippage = 0.2
        size = 10.0
        pricetick = 0.2
        capital = 100000.0

        [strategy]
        name = "dual_ma"
        session_filter = { start_hour = 9, end_hour = 15 }

        [strategy.params]
        fast = 5.0
        slow = 20.0

        [optimize]
        target = "end_balance"
        workers = 2

        [[optimize.parameter]]
        name = "fast"
        start = 5.0
        end = 15.0
        step = 5.0

        [[optimize.parameter]]
        name = "slow"
        values = [20.0, 30.0]
    "#;

    #[test]
    fn parses_a_full_job() {
        let config: SweepConfig = toml::from_str(SAMPLE).unwrap();
        assert_eq!(config.run.symbol, "RB888");
        assert_eq!(config.run.window, 1); // defaulted
        assert!(!config.run.inverse); // defaulted

        let optimize = config.optimize.as_ref().unwrap();
        assert_eq!(optimize.target, "end_balance");
        assert_eq!(optimize.workers, 2);
        assert_eq!(optimize.space().size(), 6);
    }

    #[test]
    fn factory_merges_setting_over_defaults() {
        let config: SweepConfig = toml::from_str(SAMPLE).unwrap();
        let factory = config.factory().unwrap();

        // Searched value for fast, configured default for slow.
        let setting = ParameterSetting::new(vec![("fast".into(), 10.0)]);
        assert!(factory.build(&setting).is_ok());
        assert!(factory.filter(&setting).is_some());

        // fast >= slow is rejected at build time.
        let bad = ParameterSetting::new(vec![("fast".into(), 30.0)]);
        assert!(factory.build(&bad).is_err());
    }

    #[test]
    fn unknown_strategy_name_is_an_error() {
        let mut config: SweepConfig = toml::from_str(SAMPLE).unwrap();
        config.strategy.name = "no_such_strategy".into();
        assert!(matches!(
            config.factory(),
            Err(ConfigFileError::UnknownStrategy { .. })
        ));
    }

    #[test]
    fn ga_block_fills_in_defaults() {
        let ga = GaConfig {
            population: Some(50),
            seed: Some(1),
            ..GaConfig::default()
        }
        .build();
        assert_eq!(ga.population_size, 50);
        assert_eq!(ga.generations, ElitistGa::default().generations);
        assert_eq!(ga.seed, Some(1));
    }

    #[test]
    fn from_path_validates_the_run_block() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("job.toml");
        let bad = SAMPLE.replace("end = \"2024-03-01T15:00:00\"", "end = \"2024-01-01T00:00:00\"");
        std::fs::write(&path, bad).unwrap();
        assert!(matches!(
            SweepConfig::from_path(&path).unwrap_err(),
            ConfigFileError::Run(_)
        ));
    }
}
