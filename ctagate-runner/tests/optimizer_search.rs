//! Integration tests for the search engines: real strategies, real
//! backtests over a synthetic price path, both search modes.

use std::sync::{Arc, Mutex};

use chrono::{NaiveDate, NaiveDateTime};

use ctagate_core::data::MemoryFeed;
use ctagate_core::domain::{Bar, Interval};
use ctagate_core::engine::{BacktestMode, RunConfig};
use ctagate_core::strategy::examples::DualMaStrategy;
use ctagate_core::strategy::{Strategy, TradeCtx};
use ctagate_runner::{
    run_brute_force, run_genetic, ElitistGa, Evaluator, GeneticSearch, OptimizationSpace,
    ParameterSetting, StrategyFactory,
};

fn dt(day: u32, hour: u32, min: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 1, day)
        .unwrap()
        .and_hms_opt(hour, min, 0)
        .unwrap()
}

/// Oscillating price path: enough swings that moving averages cross and
/// positions open and close repeatedly.
fn wave_bars() -> Vec<Bar> {
    let mut bars = Vec::new();
    let mut i = 0usize;
    for day in 2..6 {
        for hour in 9..13 {
            for min in 0..60 {
                let base = 100.0 + 8.0 * ((i as f64) / 23.0).sin();
                bars.push(Bar {
                    symbol: "RB888".into(),
                    datetime: dt(day, hour, min),
                    interval: Interval::Minute,
                    open: base,
                    high: base + 0.8,
                    low: base - 0.8,
                    close: base + 0.1,
                    volume: 10.0,
                });
                i += 1;
            }
        }
    }
    bars
}

fn config() -> RunConfig {
    RunConfig {
        symbol: "RB888".into(),
        interval: Interval::Minute,
        start: dt(1, 0, 0),
        end: dt(30, 0, 0),
        rate: 0.0001,
        slippage: 0.0,
        size: 10.0,
        pricetick: 0.01,
        capital: 100_000.0,
        mode: BacktestMode::Bar,
        inverse: false,
        risk_free: 0.0,
        annual_days: 240,
        window: 1,
    }
}

struct DualMaFactory;

impl StrategyFactory for DualMaFactory {
    fn build(&self, setting: &ParameterSetting) -> anyhow::Result<Box<dyn Strategy>> {
        let fast = setting
            .get("fast")
            .ok_or_else(|| anyhow::anyhow!("missing parameter 'fast'"))?;
        let slow = setting
            .get("slow")
            .ok_or_else(|| anyhow::anyhow!("missing parameter 'slow'"))?;
        Ok(Box::new(DualMaStrategy::new(
            fast as usize,
            slow as usize,
            1.0,
        )))
    }
}

fn evaluator(target: &str) -> Evaluator {
    Evaluator::new(
        config(),
        Arc::new(DualMaFactory),
        Arc::new(MemoryFeed::with_bars(wave_bars())),
        target,
    )
}

fn grid() -> OptimizationSpace {
    OptimizationSpace::new()
        .add_values("fast", vec![3.0, 6.0])
        .add_values("slow", vec![12.0, 24.0])
}

fn silent() -> impl Fn(&str) + Sync {
    |_: &str| {}
}

#[test]
fn brute_force_evaluates_the_whole_grid() {
    let outcome = run_brute_force(&evaluator("end_balance"), &grid(), 4, &silent()).unwrap();
    assert_eq!(outcome.candidate_count, 4);
    assert_eq!(outcome.results.len(), 4);
    assert!(outcome.failures.is_empty());

    // Head carries the maximum metric.
    let best = outcome.best().unwrap().metric;
    assert!(outcome.results.iter().all(|r| r.metric <= best));

    // Descending throughout.
    for pair in outcome.results.windows(2) {
        assert!(pair[0].metric >= pair[1].metric);
    }

    // Each result carries the full statistics map with the target inside.
    for result in &outcome.results {
        assert_eq!(result.metric, result.statistics["end_balance"]);
        assert!(result.statistics.contains_key("max_drawdown"));
    }
}

#[test]
fn worker_count_changes_nothing_but_wall_time() {
    let serial = run_brute_force(&evaluator("end_balance"), &grid(), 1, &silent()).unwrap();
    let parallel = run_brute_force(&evaluator("end_balance"), &grid(), 4, &silent()).unwrap();

    assert_eq!(serial.results.len(), parallel.results.len());
    for (a, b) in serial.results.iter().zip(&parallel.results) {
        assert_eq!(a.setting, b.setting);
        assert_eq!(a.metric, b.metric);
    }
}

#[test]
fn empty_space_yields_an_empty_outcome() {
    let outcome =
        run_brute_force(&evaluator("end_balance"), &OptimizationSpace::new(), 4, &silent())
            .unwrap();
    assert_eq!(outcome.candidate_count, 0);
    assert!(outcome.results.is_empty());
    assert!(outcome.failures.is_empty());
}

/// A strategy that never issues an order. Every candidate scores the same
/// end balance, so the ranking must fall back to generation order.
struct IdleStrategy;

impl Strategy for IdleStrategy {
    fn on_bar(&mut self, _bar: &Bar, _ctx: &mut TradeCtx<'_>) {}
}

struct IdleFactory;

impl StrategyFactory for IdleFactory {
    fn build(&self, _setting: &ParameterSetting) -> anyhow::Result<Box<dyn Strategy>> {
        Ok(Box::new(IdleStrategy))
    }
}

#[test]
fn ties_keep_generation_order() {
    let evaluator = Evaluator::new(
        config(),
        Arc::new(IdleFactory),
        Arc::new(MemoryFeed::with_bars(wave_bars())),
        "end_balance",
    );
    let space = OptimizationSpace::new().add_values("x", vec![1.0, 2.0, 3.0, 4.0]);
    let outcome = run_brute_force(&evaluator, &space, 4, &silent()).unwrap();

    let order: Vec<f64> = outcome
        .results
        .iter()
        .map(|r| r.setting.get("x").unwrap())
        .collect();
    assert_eq!(order, vec![1.0, 2.0, 3.0, 4.0]);
}

#[test]
fn failing_candidates_are_recorded_and_the_sweep_continues() {
    // win_rate is undefined for a run with no round trips, so the idle
    // strategy fails metric lookup while the dual MA candidates succeed.
    struct MixedFactory;

    impl StrategyFactory for MixedFactory {
        fn build(&self, setting: &ParameterSetting) -> anyhow::Result<Box<dyn Strategy>> {
            if setting.get("trade") == Some(1.0) {
                Ok(Box::new(DualMaStrategy::new(3, 12, 1.0)))
            } else {
                Ok(Box::new(IdleStrategy))
            }
        }
    }

    let evaluator = Evaluator::new(
        config(),
        Arc::new(MixedFactory),
        Arc::new(MemoryFeed::with_bars(wave_bars())),
        "win_rate",
    );
    let space = OptimizationSpace::new().add_values("trade", vec![0.0, 1.0]);
    let outcome = run_brute_force(&evaluator, &space, 2, &silent()).unwrap();

    assert_eq!(outcome.candidate_count, 2);
    assert_eq!(outcome.results.len(), 1);
    assert_eq!(outcome.failures.len(), 1);
    assert_eq!(outcome.failures[0].setting.get("trade"), Some(0.0));
    assert!(outcome.failures[0].error.contains("win_rate"));
}

#[test]
fn report_lines_cover_every_ranked_candidate() {
    let lines = Mutex::new(Vec::new());
    let report = |line: &str| {
        lines.lock().unwrap().push(line.to_string());
    };
    let outcome = run_brute_force(&evaluator("end_balance"), &grid(), 2, &report).unwrap();

    let lines = lines.into_inner().unwrap();
    let ranked = lines.iter().filter(|l| l.starts_with('#')).count();
    assert_eq!(ranked, outcome.results.len());
    assert!(lines.last().unwrap().contains("search complete"));
}

#[test]
fn genetic_search_scores_settings_from_the_space() {
    let space = OptimizationSpace::new()
        .add_values("fast", vec![3.0, 4.0, 5.0, 6.0])
        .add_values("slow", vec![12.0, 18.0, 24.0]);
    let ga = ElitistGa {
        population_size: 8,
        generations: 4,
        seed: Some(11),
        ..ElitistGa::default()
    };
    let outcome =
        run_genetic(&evaluator("end_balance"), &space, &ga, 4, &silent()).unwrap();

    assert!(!outcome.results.is_empty());
    assert!(outcome.candidate_count <= space.size());
    for pair in outcome.results.windows(2) {
        assert!(pair[0].metric >= pair[1].metric);
    }
    // Every evaluated setting is a point of the declared space.
    for result in &outcome.results {
        assert!([3.0, 4.0, 5.0, 6.0].contains(&result.setting.get("fast").unwrap()));
        assert!([12.0, 18.0, 24.0].contains(&result.setting.get("slow").unwrap()));
    }
}

#[test]
fn genetic_outcome_ranks_the_list_the_primitive_returns() {
    // Scores three grid points but hands back only two of them, one
    // repeated. The outcome must rank the returned pair, deduplicated,
    // not every setting that was evaluated along the way.
    struct FixedListSearch;

    impl GeneticSearch for FixedListSearch {
        fn search(
            &self,
            _axes: &[(String, Vec<f64>)],
            fitness: &dyn Fn(&[ParameterSetting]) -> Vec<Option<f64>>,
        ) -> Vec<(ParameterSetting, f64)> {
            let tried = vec![
                ParameterSetting::new(vec![("fast".into(), 3.0), ("slow".into(), 12.0)]),
                ParameterSetting::new(vec![("fast".into(), 6.0), ("slow".into(), 12.0)]),
                ParameterSetting::new(vec![("fast".into(), 6.0), ("slow".into(), 24.0)]),
            ];
            let scores = fitness(&tried);
            let pick =
                |i: usize| (tried[i].clone(), scores[i].unwrap_or(f64::NEG_INFINITY));
            vec![pick(1), pick(2), pick(1)]
        }
    }

    let outcome =
        run_genetic(&evaluator("end_balance"), &grid(), &FixedListSearch, 2, &silent()).unwrap();

    assert_eq!(outcome.candidate_count, 3);
    assert_eq!(outcome.results.len(), 2);
    assert!(outcome.failures.is_empty());
    for result in &outcome.results {
        assert_eq!(result.setting.get("fast"), Some(6.0));
    }
    for pair in outcome.results.windows(2) {
        assert!(pair[0].metric >= pair[1].metric);
    }
}

#[test]
fn brute_force_and_genetic_agree_on_the_metric_of_shared_settings() {
    let space = OptimizationSpace::new()
        .add_values("fast", vec![3.0, 6.0])
        .add_values("slow", vec![12.0, 24.0]);
    let brute = run_brute_force(&evaluator("end_balance"), &space, 2, &silent()).unwrap();
    let ga = ElitistGa {
        population_size: 8,
        generations: 3,
        seed: Some(5),
        ..ElitistGa::default()
    };
    let genetic = run_genetic(&evaluator("end_balance"), &space, &ga, 2, &silent()).unwrap();

    for result in &genetic.results {
        let twin = brute
            .results
            .iter()
            .find(|r| r.setting == result.setting)
            .expect("genetic setting must exist in the grid");
        assert_eq!(twin.metric, result.metric);
    }
}
