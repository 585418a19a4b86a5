use qnet_metrics_abstract::ExperimentConfig;
use serde::{Deserialize, Serialize};

use crate::aggregate::ScenarioSummary;
use crate::robustness::RobustnessResult;

/// The final, serializable result of an experiment. Field names and order are
/// what downstream tooling reads; keep them stable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentReport {
    pub scenario: String,
    pub num_requests_per_node: u32,
    pub num_bps_per_request: u32,
    pub baseline: ScenarioSummary,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub degraded: Option<ScenarioSummary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub robustness: Option<RobustnessResult>,
}

impl ExperimentReport {
    /// Put the finished pieces together. No numbers are computed here.
    pub fn assemble(
        config: &ExperimentConfig,
        baseline: ScenarioSummary,
        degraded: Option<ScenarioSummary>,
        robustness: Option<RobustnessResult>,
    ) -> Self {
        Self {
            scenario: config.scenario.clone(),
            num_requests_per_node: config.num_requests_per_node,
            num_bps_per_request: config.units_per_request,
            baseline,
            degraded,
            robustness,
        }
    }
}
