//! Command-line entry point for post-market evaluation runs.
//!
//! Each subcommand writes one pretty-printed JSON report.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;

use postmarket_eval::common::config::EvalCfg;
use postmarket_eval::common::{json, log};
use postmarket_eval::evaluation::{run_adversarial, run_post_market};
use postmarket_eval::inference::{HttpTransport, PredictionClient};
use postmarket_eval::validation::{run_expert_knowledge, run_statistical_analysis};

#[derive(Parser)]
#[command(name = "postmarket-eval")]
#[command(about = "Post-market evaluation of synthetic glucose-management data", long_about = None)]
struct Cli {
    #[command(flatten)]
    overrides: Overrides,

    #[command(subcommand)]
    command: Commands,
}

/// Settings that take precedence over `POSTMARKET_*` environment values.
#[derive(Args, Debug, Default)]
struct Overrides {
    /// Prediction endpoint URL
    #[arg(long, global = true)]
    endpoint: Option<String>,

    /// Per-request timeout in seconds
    #[arg(long, global = true)]
    timeout_secs: Option<u64>,

    /// Retries after the first attempt
    #[arg(long, global = true)]
    max_retries: Option<u32>,

    /// Delay before the first retry, doubled for each further retry
    #[arg(long, global = true)]
    retry_base_delay_ms: Option<u64>,

    /// Concurrent prediction workers
    #[arg(long, global = true, value_parser = clap::value_parser!(u64).range(1..))]
    workers: Option<u64>,
}

impl Overrides {
    fn apply(self, mut cfg: EvalCfg) -> EvalCfg {
        if let Some(endpoint) = self.endpoint {
            cfg.endpoint = endpoint;
        }
        if let Some(secs) = self.timeout_secs {
            cfg.timeout_secs = secs;
        }
        if let Some(retries) = self.max_retries {
            cfg.max_retries = retries;
        }
        if let Some(ms) = self.retry_base_delay_ms {
            cfg.retry_base_delay_ms = ms;
        }
        if let Some(workers) = self.workers {
            cfg.workers = workers as usize;
        }
        cfg
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Check synthetic records against clinical plausibility rules
    Expert {
        /// Directory of synthetic patient JSON files
        #[arg(long, default_value = "data/synthetic_samples")]
        synth_dir: PathBuf,

        /// Output file for the report
        #[arg(short, long, default_value = "output/expert_knowledge_results.json")]
        output: PathBuf,
    },

    /// Check synthetic records for completeness and measurement density
    Statistical {
        /// Directory of synthetic patient JSON files
        #[arg(long, default_value = "data/synthetic_samples")]
        synth_dir: PathBuf,

        /// Output file for the report
        #[arg(short, long, default_value = "output/statistical_analysis_results.json")]
        output: PathBuf,
    },

    /// Compare prediction accuracy on synthetic and real-world records
    Adversarial {
        /// Directory of synthetic patient JSON files
        #[arg(long)]
        synth_dir: PathBuf,

        /// Directory of real-world patient JSON files
        #[arg(long)]
        rwd_dir: PathBuf,

        /// Output file for the report
        #[arg(short, long, default_value = "output/adversarial_evaluation_results.json")]
        output: PathBuf,
    },

    /// Run all three evaluations into one combined report
    All {
        /// Directory of synthetic patient JSON files
        #[arg(long, default_value = "data/synthetic_samples")]
        synth_dir: PathBuf,

        /// Directory of real-world patient JSON files
        #[arg(long, default_value = "data/original_samples")]
        rwd_dir: PathBuf,

        /// Output file for the report
        #[arg(short, long, default_value = "output/post_market_evaluation_results.json")]
        output: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let cfg = cli.overrides.apply(EvalCfg::load());
    log::init(&cfg.log_level);
    tracing::debug!(?cfg, "configuration loaded");

    match cli.command {
        Commands::Expert { synth_dir, output } => {
            let report = run_expert_knowledge(&synth_dir)
                .with_context(|| format!("expert knowledge check of {}", synth_dir.display()))?;
            write_report(&report, &output)?;
        }
        Commands::Statistical { synth_dir, output } => {
            let report = run_statistical_analysis(&synth_dir)
                .with_context(|| format!("statistical analysis of {}", synth_dir.display()))?;
            write_report(&report, &output)?;
        }
        Commands::Adversarial {
            synth_dir,
            rwd_dir,
            output,
        } => {
            let client = build_client(&cfg)?;
            let report = run_adversarial(&synth_dir, &rwd_dir, client, cfg.workers)
                .context("adversarial evaluation")?;
            write_report(&report, &output)?;
        }
        Commands::All {
            synth_dir,
            rwd_dir,
            output,
        } => {
            let client = build_client(&cfg)?;
            let report = run_post_market(&synth_dir, &rwd_dir, client, cfg.workers)
                .context("post-market evaluation")?;
            write_report(&report, &output)?;
        }
    }

    Ok(())
}

fn build_client(cfg: &EvalCfg) -> Result<Arc<PredictionClient<HttpTransport>>> {
    let transport = HttpTransport::new(cfg.endpoint.clone(), cfg.timeout())
        .with_context(|| format!("http client for {}", cfg.endpoint))?;
    let policy = cfg.retry_policy();
    tracing::info!(
        endpoint = transport.endpoint(),
        max_retries = policy.max_retries,
        workers = cfg.workers,
        "prediction client ready"
    );
    Ok(Arc::new(PredictionClient::new(transport, policy)))
}

fn write_report<T: Serialize>(report: &T, output: &Path) -> Result<()> {
    json::save(report, output).with_context(|| format!("writing report to {}", output.display()))?;
    tracing::info!(output = %output.display(), "report written");
    Ok(())
}
