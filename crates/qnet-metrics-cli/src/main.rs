use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;

use qnet_metrics_abstract::{ActiveWindow, ExperimentConfig, ExperimentConfigOverride, RunTrace};
use qnet_metrics_engine::{
    Experiment, ExperimentReport, FidelitySource, FidelityTable, RunPlan, ScenarioSummary, TraceGenerator,
    validate_config,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Quantum network metrics from simulation run traces")]
struct Args {
    /// Experiment TOML file; fields left out keep their defaults.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Run trace JSON files, or directories containing them.
    #[arg(long, num_args = 1..)]
    traces: Vec<PathBuf>,

    /// Generate the runs with the built-in synthetic generator instead of reading traces.
    #[arg(long, default_value_t = false)]
    synthetic: bool,

    /// Seed for the synthetic generator.
    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Runs per initiating node and scenario.
    #[arg(long)]
    runs_per_node: Option<u32>,

    /// Entangled units per request.
    #[arg(long)]
    units: Option<u32>,

    #[arg(long, value_enum)]
    active_window: Option<WindowArg>,

    /// Reject delivered units below this fidelity.
    #[arg(long)]
    fidelity_threshold: Option<f64>,

    /// JSON table of precomputed fidelities to use instead of measured ones.
    #[arg(long)]
    fidelity_table: Option<PathBuf>,

    /// Write every analysed run trace into this directory.
    #[arg(long)]
    dump_traces: Option<PathBuf>,

    /// Where to write the JSON report.
    #[arg(long, default_value = "results/results.json")]
    out: PathBuf,

    /// Log per-run details.
    #[arg(long, short, default_value_t = false)]
    verbose: bool,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum WindowArg {
    CompletedRequests,
    WholeRun,
}

impl From<WindowArg> for ActiveWindow {
    fn from(arg: WindowArg) -> Self {
        match arg {
            WindowArg::CompletedRequests => ActiveWindow::CompletedRequests,
            WindowArg::WholeRun => ActiveWindow::WholeRun,
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);
    info!("qnet-metrics starting…");

    if args.synthetic && !args.traces.is_empty() {
        anyhow::bail!("--traces and --synthetic cannot be used together");
    }
    if !args.synthetic && args.traces.is_empty() {
        anyhow::bail!("nothing to analyse: pass --traces or --synthetic");
    }

    let config = args.build_config()?;
    let traces = if args.synthetic {
        generate_traces(&config, args.seed)?
    } else {
        load_traces(&args.traces)?
    };
    info!("Analysing {} runs", traces.len());

    if let Some(dir) = &args.dump_traces {
        dump_traces(dir, &traces)?;
    }

    let source = load_fidelity_source(config.fidelity_table.as_deref())?;
    let mut experiment = Experiment::new(config, source)?;
    for trace in &traces {
        experiment.ingest_trace(trace).with_context(|| {
            format!(
                "Failed to analyse {} run initiated by {}",
                trace.scenario, trace.node
            )
        })?;
    }
    let report = experiment.finish()?;

    log_summary(&report);
    write_report(&args.out, &report)?;
    info!("Metrics saved to {}", args.out.display());
    Ok(())
}

impl Args {
    fn build_config(&self) -> Result<ExperimentConfig> {
        let mut config = ExperimentConfig::default();
        if let Some(path) = &self.config {
            load_override(path)?.apply_to(&mut config);
        }
        let flags = ExperimentConfigOverride {
            num_requests_per_node: self.runs_per_node,
            units_per_request: self.units,
            active_window: self.active_window.map(Into::into),
            fidelity_threshold: self.fidelity_threshold,
            fidelity_table: self.fidelity_table.clone(),
            ..Default::default()
        };
        flags.apply_to(&mut config);
        validate_config(&config).context("Invalid experiment configuration")?;
        Ok(config)
    }
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn load_override(path: &Path) -> Result<ExperimentConfigOverride> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read experiment file {}", path.display()))?;
    toml::from_str(&content).context("Failed to parse experiment file")
}

fn load_fidelity_source(table: Option<&Path>) -> Result<FidelitySource> {
    let Some(path) = table else {
        return Ok(FidelitySource::Measured);
    };
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read fidelity table {}", path.display()))?;
    let table: FidelityTable =
        serde_json::from_str(&content).context("Failed to parse fidelity table")?;
    info!("Using {} precomputed fidelities from {}", table.len(), path.display());
    Ok(FidelitySource::TableLookup(table))
}

fn generate_traces(config: &ExperimentConfig, seed: u64) -> Result<Vec<RunTrace>> {
    let mut generator = TraceGenerator::new(seed);
    let mut traces = Vec::new();
    for params in [Some(&config.baseline), config.degraded.as_ref()]
        .into_iter()
        .flatten()
    {
        info!(
            "Generating {} runs (cutoffs {:?})",
            params.label, params.cutoffs
        );
        for source in &config.nodes {
            let Some(destination) = config.peer_of(source) else {
                continue;
            };
            for _ in 0..config.num_requests_per_node {
                let plan = RunPlan {
                    scenario: &params.label,
                    source,
                    destination,
                    requests: 1,
                    units_per_request: config.units_per_request,
                    profile: &params.synthetic,
                };
                let trace = generator
                    .generate_trace(&plan)
                    .with_context(|| format!("Failed to generate {} run for {}", params.label, source))?;
                traces.push(trace);
            }
        }
    }
    Ok(traces)
}

fn load_traces(paths: &[PathBuf]) -> Result<Vec<RunTrace>> {
    let mut files = Vec::new();
    for path in paths {
        if path.is_dir() {
            let mut found: Vec<PathBuf> = fs::read_dir(path)
                .with_context(|| format!("Failed to list trace directory {}", path.display()))?
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
                .collect();
            found.sort();
            files.extend(found);
        } else {
            files.push(path.clone());
        }
    }

    files
        .iter()
        .map(|file| {
            let content = fs::read_to_string(file)
                .with_context(|| format!("Failed to read trace file {}", file.display()))?;
            serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse trace file {}", file.display()))
        })
        .collect()
}

fn dump_traces(dir: &Path, traces: &[RunTrace]) -> Result<()> {
    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create trace directory {}", dir.display()))?;
    for (idx, trace) in traces.iter().enumerate() {
        let path = dir.join(format!("{}_{}_{:03}.json", trace.scenario, trace.node, idx));
        let data = serde_json::to_vec_pretty(trace).context("Failed to serialize run trace")?;
        fs::write(&path, &data)
            .with_context(|| format!("Failed to write trace file {}", path.display()))?;
    }
    info!("Dumped {} traces to {}", traces.len(), dir.display());
    Ok(())
}

fn show(value: Option<f64>, scale: f64, precision: usize) -> String {
    value.map_or_else(|| "n/a".to_string(), |v| format!("{:.*}", precision, v / scale))
}

fn show_rm(value: Option<f64>) -> String {
    value.map_or_else(
        || "n/a".to_string(),
        |rm| format!("{:.6} ({:.1}% degradation)", rm, (1.0 - rm) * 100.0),
    )
}

fn log_scenario(summary: &ScenarioSummary) {
    for node in &summary.nodes {
        let m = &node.averages.metrics;
        info!(
            "[{}] {} ({} runs): throughput {} units/s | Lr {} ms | Lu {} ms | Ls {} ms | fidelity {}",
            summary.label,
            node.node,
            node.runs.len(),
            show(m.throughput, 1.0, 2),
            show(m.latency, 1e6, 2),
            show(m.unit_latency, 1e6, 2),
            show(m.scaled_latency, 1e6, 2),
            show(m.fidelity, 1.0, 6),
        );
    }
    let j = &summary.combined_fairness;
    info!(
        "[{}] fairness: J_throughput {} | J_latency {} | J_fidelity {}",
        summary.label,
        show(j.throughput, 1.0, 6),
        show(j.latency, 1.0, 6),
        show(j.fidelity, 1.0, 9),
    );
}

fn log_summary(report: &ExperimentReport) {
    log_scenario(&report.baseline);
    if let Some(degraded) = &report.degraded {
        log_scenario(degraded);
    }
    if let Some(rm) = &report.robustness {
        info!("RM_throughput: {}", show_rm(rm.throughput));
        info!("RM_latency: {}", show_rm(rm.latency));
        info!("RM_fidelity: {}", show_rm(rm.fidelity));
    }
}

fn write_report(path: &Path, report: &ExperimentReport) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create output directory {}", parent.display()))?;
    }
    let data = serde_json::to_vec_pretty(report).context("Failed to serialize report")?;
    fs::write(path, &data)
        .with_context(|| format!("Failed to write report {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_defaults() {
        let args = Args::parse_from([
            "qnet-metrics",
            "--synthetic",
            "--runs-per-node",
            "3",
            "--active-window",
            "whole-run",
        ]);
        let config = args.build_config().unwrap();
        assert_eq!(config.num_requests_per_node, 3);
        assert_eq!(config.units_per_request, 2);
        assert_eq!(config.active_window, ActiveWindow::WholeRun);
        assert_eq!(args.out, PathBuf::from("results/results.json"));
    }

    #[test]
    fn synthetic_traces_cover_every_node_and_scenario() {
        let config = ExperimentConfig::default();
        let traces = generate_traces(&config, 42).unwrap();
        assert_eq!(traces.len(), 2 * 2 * 5);
        assert!(traces.iter().any(|t| t.scenario == "degraded" && t.node == "RB"));
    }

    #[test]
    fn total_loss_in_config_is_an_error_not_a_hang() {
        let dir = std::env::temp_dir().join(format!("qnet-metrics-cli-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("experiment.toml");
        fs::write(
            &path,
            "[degraded]\nlabel = \"degraded\"\ncutoffs = [0.1]\n\n[degraded.synthetic]\n\
             min_unit_latency_ns = 1\nmax_unit_latency_ns = 2\nfidelity = 0.9\n\
             fidelity_jitter = 0.0\nloss_rate = 1.0\n",
        )
        .unwrap();
        let args = Args::parse_from([
            "qnet-metrics",
            "--synthetic",
            "--config",
            path.to_str().unwrap(),
        ]);
        assert!(args.build_config().is_err());
        fs::remove_dir_all(&dir).unwrap();
    }
}
