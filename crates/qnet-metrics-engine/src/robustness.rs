use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::aggregate::{FairnessIndices, MetricAverages, ScenarioSummary};
use crate::error::{Ratio, Undefined, safe_ratio};

/// Whether a larger value of a metric means better service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Polarity {
    /// Throughput, fidelity, fairness.
    HigherIsBetter,
    /// Latencies.
    LowerIsBetter,
}

/// RM: how much of the baseline performance survives degradation.
/// 1.0 means unaffected, values towards 0 mean severe sensitivity.
/// Values above 1.0 (degraded beat baseline) are kept as they are.
pub fn robustness(baseline: f64, degraded: f64, polarity: Polarity) -> Ratio {
    match polarity {
        Polarity::HigherIsBetter => safe_ratio(degraded, baseline, "baseline value"),
        Polarity::LowerIsBetter => safe_ratio(baseline, degraded, "degraded value"),
    }
}

/// RM for every metric of a scenario pair; `None` where it is undefined.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RobustnessResult {
    #[serde(rename = "RM_throughput")]
    pub throughput: Option<f64>,
    #[serde(rename = "RM_latency")]
    pub latency: Option<f64>,
    #[serde(rename = "RM_fidelity")]
    pub fidelity: Option<f64>,
    #[serde(rename = "RM_unit_latency")]
    pub unit_latency: Option<f64>,
    #[serde(rename = "RM_scaled_latency")]
    pub scaled_latency: Option<f64>,
    #[serde(rename = "RM_J_throughput")]
    pub fairness_throughput: Option<f64>,
    #[serde(rename = "RM_J_latency")]
    pub fairness_latency: Option<f64>,
    #[serde(rename = "RM_J_fidelity")]
    pub fairness_fidelity: Option<f64>,
}

fn rm(metric: &'static str, baseline: Option<f64>, degraded: Option<f64>, polarity: Polarity) -> Option<f64> {
    let value = match (baseline, degraded) {
        (Some(b), Some(d)) => robustness(b, d, polarity),
        _ => Err(Undefined::MissingData("metric absent in one scenario")),
    };
    value
        .inspect_err(|reason| warn!("RM_{} undefined: {}", metric, reason))
        .ok()
}

/// Compare two scenarios run on the same topology with different cutoffs.
/// Inputs are the scenario-wide averages and the combined fairness indices.
pub fn compare(baseline: &ScenarioSummary, degraded: &ScenarioSummary) -> RobustnessResult {
    use Polarity::*;
    let (b, d): (&MetricAverages, &MetricAverages) = (&baseline.overall, &degraded.overall);
    let (bj, dj): (&FairnessIndices, &FairnessIndices) =
        (&baseline.combined_fairness, &degraded.combined_fairness);
    RobustnessResult {
        throughput: rm("throughput", b.throughput, d.throughput, HigherIsBetter),
        latency: rm("latency", b.latency, d.latency, LowerIsBetter),
        fidelity: rm("fidelity", b.fidelity, d.fidelity, HigherIsBetter),
        unit_latency: rm("unit_latency", b.unit_latency, d.unit_latency, LowerIsBetter),
        scaled_latency: rm("scaled_latency", b.scaled_latency, d.scaled_latency, LowerIsBetter),
        fairness_throughput: rm("J_throughput", bj.throughput, dj.throughput, HigherIsBetter),
        fairness_latency: rm("J_latency", bj.latency, dj.latency, HigherIsBetter),
        fairness_fidelity: rm("J_fidelity", bj.fidelity, dj.fidelity, HigherIsBetter),
    }
}
