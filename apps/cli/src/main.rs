#![deny(warnings)]

//! Headless experiment runner for the duopoly pricing simulation.
//!
//! Runs one or many simulation runs against the configured oracle. Batch
//! mode sweeps every requested prompt variant over a range of run ids; a
//! failed run is logged and counted, and the batch moves on.

use anyhow::{bail, Context, Result};
use sim_agent::{HttpOracle, OracleConfig};
use sim_core::PromptVariant;
use sim_runtime::{ExperimentRun, RunConfig};
use std::path::PathBuf;
use tracing::{error, info, Level};
use tracing_subscriber::EnvFilter;

struct Args {
    variants: Vec<PromptVariant>,
    num_runs: u32,
    num_periods: u32,
    single_run: Option<u32>,
    base_dir: PathBuf,
    model: Option<String>,
    api_base: Option<String>,
}

impl Default for Args {
    fn default() -> Self {
        Args {
            variants: Vec::new(),
            num_runs: 10,
            num_periods: 100,
            single_run: None,
            base_dir: PathBuf::from("data/runs"),
            model: None,
            api_base: None,
        }
    }
}

const USAGE: &str = "usage: duopoly [--variant P1|P2]... [--runs K] [--periods N] \
[--run-id ID] [--base-dir DIR] [--model NAME] [--api-base URL]

Runs batch experiments for every given prompt variant (default: both).
--run-id switches to single-run mode and requires exactly one --variant.
The oracle API key is read from DEEPSEEK_API_KEY.";

fn parse_args() -> Result<Args> {
    let mut args = Args::default();
    let mut it = std::env::args().skip(1);
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--variant" => {
                let value = it.next().context("--variant needs a value")?;
                args.variants.push(value.parse()?);
            }
            "--runs" => {
                let value = it.next().context("--runs needs a value")?;
                args.num_runs = value.parse().context("--runs must be an integer")?;
            }
            "--periods" => {
                let value = it.next().context("--periods needs a value")?;
                args.num_periods = value.parse().context("--periods must be an integer")?;
            }
            "--run-id" => {
                let value = it.next().context("--run-id needs a value")?;
                args.single_run = Some(value.parse().context("--run-id must be an integer")?);
            }
            "--base-dir" => {
                args.base_dir = PathBuf::from(it.next().context("--base-dir needs a value")?);
            }
            "--model" => {
                args.model = Some(it.next().context("--model needs a value")?);
            }
            "--api-base" => {
                args.api_base = Some(it.next().context("--api-base needs a value")?);
            }
            "--help" | "-h" => {
                println!("{USAGE}");
                std::process::exit(0);
            }
            other => bail!("unknown argument: {other}\n{USAGE}"),
        }
    }
    if args.variants.is_empty() {
        args.variants = vec![PromptVariant::Defensive, PromptVariant::Offensive];
    }
    Ok(args)
}

fn build_oracle(args: &Args) -> Result<HttpOracle> {
    let api_key = std::env::var("DEEPSEEK_API_KEY")
        .context("DEEPSEEK_API_KEY is not set; export it before running experiments")?;
    let mut config = OracleConfig::new(api_key);
    if let Some(model) = &args.model {
        config.model = model.clone();
    }
    if let Some(base) = &args.api_base {
        config.api_base = base.clone();
    }
    Ok(HttpOracle::new(config)?)
}

fn run_one(variant: PromptVariant, run_id: u32, args: &Args) -> Result<()> {
    let mut config = RunConfig::new(variant, run_id);
    config.sim.num_periods = args.num_periods;

    let oracle = build_oracle(args)?;
    let run = ExperimentRun::new(config, &args.base_dir, oracle)?;
    let metadata = run.run()?;

    println!(
        "Run OK | {} run {} | periods: {} | elapsed: {:.1}min | data: {}",
        variant,
        run_id,
        metadata.num_periods,
        metadata.elapsed_seconds as f64 / 60.0,
        run.store().run_dir().display()
    );
    Ok(())
}

fn main() -> Result<()> {
    // Logging setup
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_max_level(Level::INFO)
        .init();

    let args = parse_args()?;
    info!(
        git_sha = env!("GIT_SHA"),
        variants = ?args.variants,
        runs = args.num_runs,
        periods = args.num_periods,
        "duopoly experiment runner"
    );

    if let Some(run_id) = args.single_run {
        if args.variants.len() != 1 {
            bail!("--run-id requires exactly one --variant");
        }
        return run_one(args.variants[0], run_id, &args);
    }

    let started = std::time::Instant::now();
    let mut completed = 0u32;
    let mut failed = 0u32;
    for &variant in &args.variants {
        for run_id in 1..=args.num_runs {
            match run_one(variant, run_id, &args) {
                Ok(()) => completed += 1,
                Err(e) => {
                    failed += 1;
                    error!(%variant, run_id, error = %e, "run failed");
                }
            }
        }
    }

    println!(
        "Batch done | completed: {}/{} | failed: {} | elapsed: {:.1}h",
        completed,
        completed + failed,
        failed,
        started.elapsed().as_secs_f64() / 3600.0
    );
    if completed == 0 && failed > 0 {
        bail!("every run in the batch failed");
    }
    Ok(())
}
