use crate::config::{ActiveWindow, DegradationParams, ExperimentConfig, FidelityPolicy};
use crate::event::{EventRecord, NodeId};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Partial experiment configuration, as read from an experiment TOML file.
/// Every field left out keeps the value of the config it is applied to.
#[derive(Deserialize, Debug, Clone, Default)]
pub struct ExperimentConfigOverride {
    pub scenario: Option<String>,
    pub nodes: Option<Vec<NodeId>>,
    pub num_requests_per_node: Option<u32>,
    pub units_per_request: Option<u32>,
    pub baseline: Option<DegradationParams>,
    pub degraded: Option<DegradationParams>,
    /// Set to `true` to run the baseline scenario only.
    #[serde(default)]
    pub skip_degraded: bool,
    pub active_window: Option<ActiveWindow>,
    pub fidelity_policy: Option<FidelityPolicy>,
    pub fidelity_threshold: Option<f64>,
    pub fidelity_table: Option<PathBuf>,
}

impl ExperimentConfigOverride {
    pub fn apply_to(&self, config: &mut ExperimentConfig) {
        if let Some(v) = &self.scenario {
            config.scenario = v.clone();
        }
        if let Some(v) = &self.nodes {
            config.nodes = v.clone();
        }
        if let Some(v) = self.num_requests_per_node {
            config.num_requests_per_node = v;
        }
        if let Some(v) = self.units_per_request {
            config.units_per_request = v;
        }
        if let Some(v) = &self.baseline {
            config.baseline = v.clone();
        }
        if let Some(v) = &self.degraded {
            config.degraded = Some(v.clone());
        }
        if self.skip_degraded {
            config.degraded = None;
        }
        if let Some(v) = self.active_window {
            config.active_window = v;
        }
        if let Some(v) = self.fidelity_policy {
            config.fidelity_policy = v;
        }
        if let Some(v) = self.fidelity_threshold {
            config.fidelity_threshold = v;
        }
        if let Some(v) = &self.fidelity_table {
            config.fidelity_table = Some(v.clone());
        }
    }
}

/// Everything the simulator recorded for one run, as persisted on disk.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RunTrace {
    /// Label of the scenario the run belongs to (see `DegradationParams::label`).
    pub scenario: String,
    /// Node that initiated the run's requests.
    pub node: NodeId,
    pub start_time: Option<u64>,
    pub end_time: Option<u64>,
    pub events: Vec<EventRecord>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn override_keeps_unset_fields() {
        let raw = r#"
            num_requests_per_node = 3
            active_window = "whole_run"

            [degraded]
            label = "strict"
            cutoffs = [0.2, 0.4]
        "#;
        let patch: ExperimentConfigOverride = toml::from_str(raw).unwrap();
        let mut config = ExperimentConfig::default();
        patch.apply_to(&mut config);

        assert_eq!(config.num_requests_per_node, 3);
        assert_eq!(config.units_per_request, 2);
        assert_eq!(config.active_window, ActiveWindow::WholeRun);
        let degraded = config.degraded.unwrap();
        assert_eq!(degraded.label, "strict");
        assert_eq!(degraded.synthetic, Default::default());
    }

    #[test]
    fn skip_degraded_drops_the_second_scenario() {
        let patch: ExperimentConfigOverride = toml::from_str("skip_degraded = true").unwrap();
        let mut config = ExperimentConfig::default();
        patch.apply_to(&mut config);
        assert!(config.degraded.is_none());
    }
}
