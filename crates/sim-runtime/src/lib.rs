#![deny(warnings)]

//! Period orchestration: drives one full simulation run.
//!
//! Each period moves through three stages: **pending** (both decision
//! pipelines run, firm 0 fully before firm 1), **resolved** (the market has
//! cleared both prices), **committed** (per-firm histories, reasoning
//! windows, and the audit trail are all updated). Nothing is written until a
//! period is fully resolved, so a terminal decision failure leaves no trace
//! of the period anywhere and propagates to the caller.
//!
//! Period 0 bypasses the oracle entirely: both opening prices are drawn
//! uniformly from the price band by an RNG seeded from the run id, so a
//! given run id always reproduces the same opening.

use chrono::Utc;
use persistence::{format_history, format_reasoning, RunStore, StoreError};
use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use sim_agent::{Decision, DecisionError, Oracle, PricingAgent, RetryPolicy};
use sim_core::{
    validate_price_band, validate_sim_params, AuditRecord, FirmId, MarketParams, PeriodOutcome,
    PriceBand, PromptVariant, ReasoningEntry, RunMetadata, RunStatus, SimParams, ValidationError,
};
use sim_econ::{EconError, LogitMarket, PeriodResult};
use std::path::Path;
use std::time::Instant;
use thiserror::Error;
use tracing::info;

/// Reasoning recorded for the seeded opening period.
const INITIAL_REASONING: &str = "Initial random pricing.";

/// Anything that can abort a run.
#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Decision(#[from] DecisionError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Econ(#[from] EconError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
}

/// Everything that parameterizes one run.
#[derive(Clone, Debug)]
pub struct RunConfig {
    pub variant: PromptVariant,
    pub run_id: u32,
    pub market: MarketParams,
    pub band: PriceBand,
    pub sim: SimParams,
    pub retry: RetryPolicy,
}

impl RunConfig {
    /// Defaults everywhere except the run key.
    pub fn new(variant: PromptVariant, run_id: u32) -> Self {
        RunConfig {
            variant,
            run_id,
            market: MarketParams::default(),
            band: PriceBand::default(),
            sim: SimParams::default(),
            retry: RetryPolicy::default(),
        }
    }
}

/// Opening prices for period 0: two independent uniform draws over the
/// band, seeded from the run id alone so a run id always reproduces the
/// same opening.
pub fn initial_prices(run_id: u32, band: &PriceBand) -> [f64; 2] {
    let mut rng = ChaCha8Rng::seed_from_u64(u64::from(run_id).wrapping_mul(42));
    [
        rng.gen_range(band.min..=band.max),
        rng.gen_range(band.min..=band.max),
    ]
}

/// One simulation run bound to its market, storage, and oracle.
pub struct ExperimentRun<O: Oracle> {
    config: RunConfig,
    market: LogitMarket,
    store: RunStore,
    agents: [PricingAgent; 2],
    oracle: O,
}

impl<O: Oracle> ExperimentRun<O> {
    pub fn new(config: RunConfig, base_dir: &Path, oracle: O) -> Result<Self, RunError> {
        validate_price_band(&config.band)?;
        validate_sim_params(&config.sim)?;
        let market = LogitMarket::new(config.market)?;
        let store = RunStore::create(base_dir, config.variant, config.run_id, &config.sim)?;
        let agents = FirmId::BOTH.map(|firm| {
            PricingAgent::new(firm, config.variant, config.market, config.band)
                .with_retry(config.retry)
        });
        Ok(ExperimentRun {
            config,
            market,
            store,
            agents,
            oracle,
        })
    }

    pub fn store(&self) -> &RunStore {
        &self.store
    }

    /// Execute the whole run. Returns the completion metadata, which has
    /// also been persisted; any error means the run aborted and no metadata
    /// exists on disk.
    pub fn run(&self) -> Result<RunMetadata, RunError> {
        let start_time = Utc::now();
        let started = Instant::now();
        info!(
            variant = %self.config.variant,
            run_id = self.config.run_id,
            periods = self.config.sim.num_periods,
            "starting run"
        );

        self.run_period_zero()?;
        for period in 1..=self.config.sim.num_periods {
            if period % 10 == 0 {
                info!(
                    period,
                    total = self.config.sim.num_periods,
                    elapsed_secs = started.elapsed().as_secs(),
                    "run progress"
                );
            }
            self.run_period(period)?;
        }

        let metadata = RunMetadata {
            prompt_variant: self.config.variant,
            run_id: self.config.run_id,
            num_periods: self.config.sim.num_periods,
            status: RunStatus::Completed,
            start_time,
            end_time: Utc::now(),
            elapsed_seconds: started.elapsed().as_secs(),
        };
        self.store.write_metadata(&metadata)?;
        info!(run_dir = %self.store.run_dir().display(), "run completed");
        Ok(metadata)
    }

    fn run_period_zero(&self) -> Result<(), RunError> {
        let [price_0, price_1] = initial_prices(self.config.run_id, &self.config.band);
        info!(price_0, price_1, "period 0 opens with seeded prices");
        let result = self.market.simulate_period(price_0, price_1);
        self.commit(
            0,
            &result,
            [INITIAL_REASONING.to_string(), INITIAL_REASONING.to_string()],
        )
    }

    /// One decision period: both pipelines resolve before the market runs,
    /// and the market runs before anything is written.
    fn run_period(&self, period: u32) -> Result<(), RunError> {
        let mut decisions: Vec<Decision> = Vec::with_capacity(2);
        for firm in FirmId::BOTH {
            let history = self.store.load_history(firm)?;
            let reasoning = self.store.load_reasoning(firm)?;
            let decision = self.agents[firm.index()].decide(
                &self.oracle,
                &format_history(&history),
                &format_reasoning(&reasoning),
            )?;
            decisions.push(decision);
        }

        let result = self
            .market
            .simulate_period(decisions[0].price, decisions[1].price);
        let reasonings = [
            decisions[0].reasoning.clone(),
            decisions[1].reasoning.clone(),
        ];
        self.commit(period, &result, reasonings)
    }

    fn commit(
        &self,
        period: u32,
        result: &PeriodResult,
        reasonings: [String; 2],
    ) -> Result<(), RunError> {
        for firm in FirmId::BOTH {
            let own = result.firms[firm.index()];
            let rival = result.firms[firm.rival().index()];
            self.store.append_history(
                firm,
                PeriodOutcome {
                    period,
                    own_price: own.price,
                    own_sales: own.demand,
                    own_profit: own.profit,
                    market_share: own.market_share,
                    competitor_price: rival.price,
                },
            )?;
            self.store.append_reasoning(
                firm,
                ReasoningEntry {
                    period: Some(period),
                    reasoning: reasonings[firm.index()].clone(),
                },
            )?;
        }

        let [f0, f1] = result.firms;
        self.store.append_audit(AuditRecord {
            period,
            price_0: f0.price,
            price_1: f1.price,
            demand_0: f0.demand,
            demand_1: f1.demand,
            profit_0: f0.profit,
            profit_1: f1.profit,
            market_share_0: f0.market_share,
            market_share_1: f1.market_share,
            reasoning_0: Some(reasonings[0].clone()),
            reasoning_1: Some(reasonings[1].clone()),
        })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sim_agent::{OracleError, OracleReply};
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::time::Duration;
    use tempfile::tempdir;

    /// Plays back a fixed script; once exhausted, every call fails.
    struct ScriptedOracle {
        script: RefCell<VecDeque<String>>,
    }

    impl ScriptedOracle {
        fn replies(prices: &[&str]) -> Self {
            ScriptedOracle {
                script: RefCell::new(prices.iter().map(|s| s.to_string()).collect()),
            }
        }
    }

    impl Oracle for ScriptedOracle {
        fn complete(&self, _prompt: &str) -> Result<OracleReply, OracleError> {
            match self.script.borrow_mut().pop_front() {
                Some(content) => Ok(OracleReply {
                    content: Some(content),
                    reasoning: Some("scripted reasoning".to_string()),
                    finish_reason: Some("stop".to_string()),
                }),
                None => Err(OracleError::Transport("oracle offline".to_string())),
            }
        }
    }

    fn test_config(num_periods: u32) -> RunConfig {
        let mut config = RunConfig::new(PromptVariant::Defensive, 7);
        config.sim.num_periods = num_periods;
        config.retry = RetryPolicy {
            max_attempts: 3,
            backoff_base: Duration::from_millis(1),
        };
        config
    }

    #[test]
    fn initial_prices_are_deterministic_per_run_id() {
        let band = PriceBand::default();
        let a = initial_prices(3, &band);
        let b = initial_prices(3, &band);
        let c = initial_prices(4, &band);
        assert_eq!(a, b);
        assert_ne!(a, c);
        for p in a.into_iter().chain(c) {
            assert!(p >= band.min && p <= band.max);
        }
    }

    #[test]
    fn completed_run_commits_every_period_and_metadata() {
        let dir = tempdir().unwrap();
        // 2 decision periods x 2 firms = 4 oracle calls.
        let oracle = ScriptedOracle::replies(&["1.70", "1.80", "1.65", "1.85"]);
        let run = ExperimentRun::new(test_config(2), dir.path(), oracle).unwrap();

        let metadata = run.run().unwrap();
        assert_eq!(metadata.status, RunStatus::Completed);
        assert_eq!(metadata.num_periods, 2);

        let store = run.store();
        for firm in FirmId::BOTH {
            let history = store.load_history(firm).unwrap();
            let periods: Vec<u32> = history.iter().map(|o| o.period).collect();
            assert_eq!(periods, vec![0, 1, 2]);
            let reasoning = store.load_reasoning(firm).unwrap();
            assert_eq!(reasoning.last().unwrap().period, Some(2));
        }
        let audit = store.load_audit().unwrap();
        assert_eq!(audit.len(), 3);
        assert_eq!(audit[1].price_0, 1.70);
        assert_eq!(audit[1].price_1, 1.80);
        assert_eq!(audit[1].reasoning_0.as_deref(), Some("scripted reasoning"));
        assert!(store.load_metadata().unwrap().is_some());
    }

    #[test]
    fn period_zero_uses_seeded_prices_not_the_oracle() {
        let dir = tempdir().unwrap();
        let oracle = ScriptedOracle::replies(&[]);
        let config = test_config(0);
        let run_id = config.run_id;
        let band = config.band;
        let run = ExperimentRun::new(config, dir.path(), oracle).unwrap();

        run.run().unwrap();

        let expected = initial_prices(run_id, &band);
        let history = run.store().load_history(FirmId::new(0).unwrap()).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].own_price, sim_core::round2(expected[0]));
        assert_eq!(history[0].competitor_price, sim_core::round2(expected[1]));
        let reasoning = run.store().load_reasoning(FirmId::new(0).unwrap()).unwrap();
        assert_eq!(reasoning[0].reasoning, INITIAL_REASONING);
    }

    #[test]
    fn history_pairs_are_mirrored_between_firms() {
        let dir = tempdir().unwrap();
        let oracle = ScriptedOracle::replies(&["1.50", "2.00"]);
        let run = ExperimentRun::new(test_config(1), dir.path(), oracle).unwrap();
        run.run().unwrap();

        let store = run.store();
        let h0 = store.load_history(FirmId::new(0).unwrap()).unwrap();
        let h1 = store.load_history(FirmId::new(1).unwrap()).unwrap();
        let p = 1;
        assert_eq!(h0[p].own_price, h1[p].competitor_price);
        assert_eq!(h1[p].own_price, h0[p].competitor_price);
        // Paired shares cover the whole market.
        assert!((h0[p].market_share + h1[p].market_share - 100.0).abs() < 0.02);
    }

    #[test]
    fn failed_period_commits_nothing_and_writes_no_metadata() {
        let dir = tempdir().unwrap();
        // Enough replies for period 1 plus firm 0 of period 2; firm 1's
        // pipeline then exhausts its retries.
        let oracle = ScriptedOracle::replies(&["1.70", "1.80", "1.75"]);
        let run = ExperimentRun::new(test_config(2), dir.path(), oracle).unwrap();

        let err = run.run().unwrap_err();
        assert!(matches!(err, RunError::Decision(_)));

        let store = run.store();
        for firm in FirmId::BOTH {
            let history = store.load_history(firm).unwrap();
            let periods: Vec<u32> = history.iter().map(|o| o.period).collect();
            assert_eq!(periods, vec![0, 1], "period 2 must leave no trace");
            let reasoning = store.load_reasoning(firm).unwrap();
            assert_eq!(reasoning.last().unwrap().period, Some(1));
        }
        assert_eq!(store.load_audit().unwrap().len(), 2);
        assert!(store.load_metadata().unwrap().is_none());
    }
}
