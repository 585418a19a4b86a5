use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::event::NodeId;

/// Which time span throughput is measured over.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActiveWindow {
    /// First request submission to last request completion.
    #[default]
    CompletedRequests,
    /// Run start marker to run end marker, idle gaps included.
    WholeRun,
}

/// What to do with fidelity samples that leave [0, 1] through numerical noise.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FidelityPolicy {
    #[default]
    AsIs,
    Clamp,
}

/// Shape of the traces produced by the built-in synthetic generator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyntheticProfile {
    pub min_unit_latency_ns: u64,
    pub max_unit_latency_ns: u64,
    pub fidelity: f64,
    pub fidelity_jitter: f64,
    /// Probability that a generation attempt fails and has to be repeated.
    pub loss_rate: f64,
}

impl Default for SyntheticProfile {
    fn default() -> Self {
        Self {
            min_unit_latency_ns: 400_000,
            max_unit_latency_ns: 600_000,
            fidelity: 0.97,
            fidelity_jitter: 0.005,
            loss_rate: 0.0,
        }
    }
}

/// One parameterisation of the experiment (baseline or degraded).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DegradationParams {
    /// Label that run traces use to say which scenario they belong to.
    pub label: String,
    /// Memory cutoff thresholds handed to the simulator.
    pub cutoffs: Vec<f64>,
    #[serde(default)]
    pub synthetic: SyntheticProfile,
}

impl DegradationParams {
    pub fn baseline() -> Self {
        Self {
            label: "baseline".to_string(),
            cutoffs: vec![0.03, 0.1, 0.3],
            synthetic: SyntheticProfile::default(),
        }
    }

    pub fn degraded() -> Self {
        Self {
            label: "degraded".to_string(),
            cutoffs: vec![0.1, 0.3, 0.5],
            synthetic: SyntheticProfile {
                min_unit_latency_ns: 800_000,
                max_unit_latency_ns: 1_200_000,
                fidelity: 0.95,
                fidelity_jitter: 0.01,
                loss_rate: 0.1,
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperimentConfig {
    pub scenario: String,
    pub nodes: Vec<NodeId>,
    pub num_requests_per_node: u32,
    pub units_per_request: u32,
    pub baseline: DegradationParams,
    pub degraded: Option<DegradationParams>,
    pub active_window: ActiveWindow,
    pub fidelity_policy: FidelityPolicy,
    /// Deliveries below this fidelity are rejected. `0.0` disables the check.
    pub fidelity_threshold: f64,
    /// JSON table of precomputed fidelities used instead of measured values.
    pub fidelity_table: Option<PathBuf>,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            scenario: "multiple_simulations_with_metrics".to_string(),
            nodes: vec!["RA".to_string(), "RB".to_string()],
            num_requests_per_node: 5,
            units_per_request: 2,
            baseline: DegradationParams::baseline(),
            degraded: Some(DegradationParams::degraded()),
            active_window: ActiveWindow::default(),
            fidelity_policy: FidelityPolicy::default(),
            fidelity_threshold: 0.0,
            fidelity_table: None,
        }
    }
}

impl ExperimentConfig {
    /// Look up the parameter set whose label matches a run trace.
    pub fn params_for(&self, label: &str) -> Option<&DegradationParams> {
        if self.baseline.label == label {
            return Some(&self.baseline);
        }
        self.degraded.as_ref().filter(|d| d.label == label)
    }

    /// The node a request initiated by `source` is sent to: the next node in the list.
    pub fn peer_of(&self, source: &str) -> Option<&NodeId> {
        let idx = self.nodes.iter().position(|n| n == source)?;
        if self.nodes.len() < 2 {
            return None;
        }
        self.nodes.get((idx + 1) % self.nodes.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn params_lookup_by_label() {
        let config = ExperimentConfig::default();
        assert_eq!(config.params_for("baseline").unwrap().cutoffs, vec![0.03, 0.1, 0.3]);
        assert_eq!(config.params_for("degraded").unwrap().cutoffs, vec![0.1, 0.3, 0.5]);
        assert!(config.params_for("other").is_none());
    }

    #[test]
    fn peers_wrap_around() {
        let config = ExperimentConfig::default();
        assert_eq!(config.peer_of("RA").map(String::as_str), Some("RB"));
        assert_eq!(config.peer_of("RB").map(String::as_str), Some("RA"));
        assert!(config.peer_of("RC").is_none());
    }
}
