use std::collections::HashMap;

use qnet_metrics_abstract::{ExperimentConfig, RunTrace};
use tracing::{debug, info};

use crate::aggregate::ScenarioAccumulator;
use crate::error::MetricsError;
use crate::fidelity::FidelitySource;
use crate::per_run::{RunOptions, analyze_run};
use crate::recorder::{RunLog, RunRecorder};
use crate::report::ExperimentReport;
use crate::robustness::compare;
use crate::synthetic::check_profile;

/// Check a configuration before any run is analysed or generated.
pub fn validate_config(config: &ExperimentConfig) -> Result<(), MetricsError> {
    // report keys are derived from lowercased node ids
    let mut seen: HashMap<String, &str> = HashMap::new();
    for node in &config.nodes {
        if let Some(other) = seen.insert(node.to_lowercase(), node) {
            return Err(MetricsError::invalid(format!(
                "node ids '{other}' and '{node}' collide once lowercased"
            )));
        }
    }
    for params in [Some(&config.baseline), config.degraded.as_ref()]
        .into_iter()
        .flatten()
    {
        check_profile(&params.synthetic).map_err(|err| {
            MetricsError::invalid(format!("synthetic profile of '{}': {err}", params.label))
        })?;
    }
    if config.degraded.as_ref().is_some_and(|d| d.label == config.baseline.label) {
        return Err(MetricsError::invalid(format!(
            "baseline and degraded share the label '{}'",
            config.baseline.label
        )));
    }
    Ok(())
}

/// Drives a batch of finished runs through the pipeline:
/// run log → per-run metrics → scenario summaries → robustness → report.
pub struct Experiment {
    config: ExperimentConfig,
    options: RunOptions,
    baseline: ScenarioAccumulator,
    degraded: Option<ScenarioAccumulator>,
}

impl Experiment {
    pub fn new(config: ExperimentConfig, fidelity_source: FidelitySource) -> Result<Self, MetricsError> {
        validate_config(&config)?;
        let options = RunOptions {
            active_window: config.active_window,
            fidelity_policy: config.fidelity_policy,
            fidelity_source,
        };
        let baseline = ScenarioAccumulator::new(&config.baseline).with_nodes(&config.nodes);
        let degraded = config
            .degraded
            .as_ref()
            .map(|params| ScenarioAccumulator::new(params).with_nodes(&config.nodes));
        Ok(Self {
            config,
            options,
            baseline,
            degraded,
        })
    }

    pub fn config(&self) -> &ExperimentConfig {
        &self.config
    }

    fn accumulator(&mut self, scenario: &str) -> Result<&mut ScenarioAccumulator, MetricsError> {
        if self.baseline.label() == scenario {
            return Ok(&mut self.baseline);
        }
        match self.degraded.as_mut() {
            Some(acc) if acc.label() == scenario => Ok(acc),
            _ => Err(MetricsError::UnknownScenario {
                label: scenario.to_string(),
            }),
        }
    }

    /// Analyse a finished run initiated by `node` and file it under `scenario`.
    pub fn ingest_log(&mut self, scenario: &str, node: &str, log: &RunLog) -> Result<(), MetricsError> {
        // Resolve the scenario first so unknown labels fail before any work.
        self.accumulator(scenario)?;
        let metrics = analyze_run(node, log, &self.options)?;
        debug!("[{}] ingested run from {}", scenario, node);
        self.accumulator(scenario)?.push(metrics);
        Ok(())
    }

    /// Replay a persisted trace through a fresh recorder and ingest it.
    pub fn ingest_trace(&mut self, trace: &RunTrace) -> Result<(), MetricsError> {
        let log = RunRecorder::replay(trace, self.config.fidelity_threshold);
        self.ingest_log(&trace.scenario, &trace.node, &log)
    }

    pub fn finish(self) -> Result<ExperimentReport, MetricsError> {
        let baseline = self.baseline.build()?;
        let degraded = self.degraded.map(ScenarioAccumulator::build).transpose()?;
        let robustness = degraded.as_ref().map(|d| compare(&baseline, d));
        info!(
            "Experiment '{}' complete: {} baseline runs, {} degraded runs",
            self.config.scenario,
            baseline.run_count(),
            degraded.as_ref().map_or(0, |d| d.run_count())
        );
        Ok(ExperimentReport::assemble(
            &self.config,
            baseline,
            degraded,
            robustness,
        ))
    }
}
