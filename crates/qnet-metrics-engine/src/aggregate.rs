//! Cross-run aggregation: per-node averages and combined fairness for one
//! scenario (baseline or degraded).

use std::fmt;

use qnet_metrics_abstract::{DegradationParams, NodeId};
use serde::de::{self, IgnoredAny, MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tracing::{info, warn};

use crate::error::{MetricsError, mean};
use crate::fairness::jain_index;
use crate::per_run::RunMetrics;

/// Arithmetic means of the per-run metrics over a set of runs.
/// A metric is averaged over the runs where it is defined.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricAverages {
    pub throughput: Option<f64>,
    /// Request latency Lr, in nanoseconds.
    pub latency: Option<f64>,
    pub unit_latency: Option<f64>,
    pub scaled_latency: Option<f64>,
    pub fidelity: Option<f64>,
}

impl MetricAverages {
    pub fn of(runs: &[&RunMetrics]) -> Self {
        let avg = |pick: fn(&RunMetrics) -> Option<f64>| {
            mean(runs.iter().filter_map(|r| pick(r)), "defined runs").ok()
        };
        Self {
            throughput: avg(|r| r.throughput),
            latency: avg(|r| r.latency_request),
            unit_latency: avg(|r| r.latency_unit),
            scaled_latency: avg(|r| r.latency_scaled),
            fidelity: avg(|r| r.fidelity),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeAverages {
    pub node: NodeId,
    pub usable_runs: usize,
    #[serde(flatten)]
    pub metrics: MetricAverages,
}

/// Jain's index of each metric across the scenario's nodes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FairnessIndices {
    #[serde(rename = "J_throughput")]
    pub throughput: Option<f64>,
    #[serde(rename = "J_latency")]
    pub latency: Option<f64>,
    #[serde(rename = "J_fidelity")]
    pub fidelity: Option<f64>,
    #[serde(rename = "J_unit_latency")]
    pub unit_latency: Option<f64>,
    #[serde(rename = "J_scaled_latency")]
    pub scaled_latency: Option<f64>,
}

/// Raw runs and averages of one initiating node.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeSummary {
    pub node: NodeId,
    pub runs: Vec<RunMetrics>,
    pub averages: NodeAverages,
}

/// Everything known about one scenario once all its runs are in.
///
/// Serialized as a flat map whose per-node keys are derived from the node
/// name: `{label, cutoffs, ra_simulations, rb_simulations, ra_averages,
/// rb_averages, overall, combined_fairness}`.
#[derive(Debug, Clone, PartialEq)]
pub struct ScenarioSummary {
    pub label: String,
    pub cutoffs: Vec<f64>,
    pub nodes: Vec<NodeSummary>,
    /// Means over every usable run of the scenario, regardless of node.
    pub overall: MetricAverages,
    pub combined_fairness: FairnessIndices,
}

impl ScenarioSummary {
    pub fn node(&self, node: &str) -> Option<&NodeSummary> {
        self.nodes.iter().find(|n| n.node == node)
    }

    pub fn run_count(&self) -> usize {
        self.nodes.iter().map(|n| n.runs.len()).sum()
    }
}

fn node_key(node: &str) -> String {
    node.to_lowercase()
}

/// Collects the runs of one scenario. Each scenario gets its own accumulator;
/// nothing is shared between scenarios.
#[derive(Debug, Clone)]
pub struct ScenarioAccumulator {
    label: String,
    cutoffs: Vec<f64>,
    nodes: Vec<(NodeId, Vec<RunMetrics>)>,
}

impl ScenarioAccumulator {
    pub fn new(params: &DegradationParams) -> Self {
        Self {
            label: params.label.clone(),
            cutoffs: params.cutoffs.clone(),
            nodes: Vec::new(),
        }
    }

    /// Register nodes up front so the summary lists them in configuration order.
    pub fn with_nodes(mut self, nodes: &[NodeId]) -> Self {
        for node in nodes {
            self.slot(node);
        }
        self
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    fn slot(&mut self, node: &str) -> &mut Vec<RunMetrics> {
        let idx = match self.nodes.iter().position(|(n, _)| n == node) {
            Some(idx) => idx,
            None => {
                self.nodes.push((node.to_string(), Vec::new()));
                self.nodes.len() - 1
            }
        };
        &mut self.nodes[idx].1
    }

    /// Add a run, grouped under the node that initiated it.
    pub fn push(&mut self, run: RunMetrics) {
        let node = run.node.clone();
        self.slot(&node).push(run);
    }

    pub fn run_count(&self) -> usize {
        self.nodes.iter().map(|(_, runs)| runs.len()).sum()
    }

    pub fn build(self) -> Result<ScenarioSummary, MetricsError> {
        let mut keys: Vec<String> = Vec::with_capacity(self.nodes.len());
        for (node, _) in &self.nodes {
            let key = node_key(node);
            if keys.contains(&key) {
                return Err(MetricsError::invalid(format!(
                    "[{}] node '{}' collides with another node id once lowercased",
                    self.label, node
                )));
            }
            keys.push(key);
        }
        let usable: Vec<&RunMetrics> = self
            .nodes
            .iter()
            .flat_map(|(_, runs)| runs.iter())
            .filter(|r| r.is_usable())
            .collect();
        if usable.is_empty() {
            return Err(MetricsError::NoUsableRuns {
                scenario: self.label,
            });
        }
        let overall = MetricAverages::of(&usable);
        info!(
            "[{}] {} usable runs out of {}",
            self.label,
            usable.len(),
            self.run_count()
        );

        let nodes: Vec<NodeSummary> = self
            .nodes
            .into_iter()
            .map(|(node, runs)| {
                let node_usable: Vec<&RunMetrics> = runs.iter().filter(|r| r.is_usable()).collect();
                let averages = NodeAverages {
                    node: node.clone(),
                    usable_runs: node_usable.len(),
                    metrics: MetricAverages::of(&node_usable),
                };
                NodeSummary {
                    node,
                    runs,
                    averages,
                }
            })
            .collect();

        let fairness = |metric: &'static str, pick: fn(&MetricAverages) -> Option<f64>| {
            let mut values = Vec::with_capacity(nodes.len());
            for summary in &nodes {
                match pick(&summary.averages.metrics) {
                    Some(v) => values.push(v),
                    None => warn!(
                        "[{}] node {} has no {} average; left out of fairness",
                        self.label, summary.node, metric
                    ),
                }
            }
            jain_index(&values)
                .inspect_err(|reason| warn!("[{}] J_{} undefined: {}", self.label, metric, reason))
                .ok()
        };
        let combined_fairness = FairnessIndices {
            throughput: fairness("throughput", |m| m.throughput),
            latency: fairness("latency", |m| m.latency),
            fidelity: fairness("fidelity", |m| m.fidelity),
            unit_latency: fairness("unit_latency", |m| m.unit_latency),
            scaled_latency: fairness("scaled_latency", |m| m.scaled_latency),
        };

        Ok(ScenarioSummary {
            label: self.label,
            cutoffs: self.cutoffs,
            nodes,
            overall,
            combined_fairness,
        })
    }
}

impl Serialize for ScenarioSummary {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(4 + 2 * self.nodes.len()))?;
        map.serialize_entry("label", &self.label)?;
        map.serialize_entry("cutoffs", &self.cutoffs)?;
        for node in &self.nodes {
            map.serialize_entry(&format!("{}_simulations", node_key(&node.node)), &node.runs)?;
        }
        for node in &self.nodes {
            map.serialize_entry(&format!("{}_averages", node_key(&node.node)), &node.averages)?;
        }
        map.serialize_entry("overall", &self.overall)?;
        map.serialize_entry("combined_fairness", &self.combined_fairness)?;
        map.end()
    }
}

impl<'de> Deserialize<'de> for ScenarioSummary {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(ScenarioSummaryVisitor)
    }
}

struct ScenarioSummaryVisitor;

impl<'de> Visitor<'de> for ScenarioSummaryVisitor {
    type Value = ScenarioSummary;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a scenario summary map")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
        let mut label: Option<String> = None;
        let mut cutoffs: Option<Vec<f64>> = None;
        let mut overall: Option<MetricAverages> = None;
        let mut combined_fairness: Option<FairnessIndices> = None;
        let mut runs: Vec<(String, Vec<RunMetrics>)> = Vec::new();
        let mut averages: Vec<NodeAverages> = Vec::new();

        while let Some(key) = map.next_key::<String>()? {
            match key.as_str() {
                "label" => label = Some(map.next_value()?),
                "cutoffs" => cutoffs = Some(map.next_value()?),
                "overall" => overall = Some(map.next_value()?),
                "combined_fairness" => combined_fairness = Some(map.next_value()?),
                other => {
                    if let Some(prefix) = other.strip_suffix("_simulations") {
                        runs.push((prefix.to_string(), map.next_value()?));
                    } else if other.ends_with("_averages") {
                        averages.push(map.next_value()?);
                    } else {
                        map.next_value::<IgnoredAny>()?;
                    }
                }
            }
        }

        let mut nodes = Vec::with_capacity(averages.len());
        for avg in averages {
            let key = node_key(&avg.node);
            let node_runs = match runs.iter().position(|(k, _)| *k == key) {
                Some(idx) => runs.remove(idx).1,
                None => Vec::new(),
            };
            nodes.push(NodeSummary {
                node: avg.node.clone(),
                runs: node_runs,
                averages: avg,
            });
        }
        if let Some((key, _)) = runs.first() {
            return Err(de::Error::custom(format!(
                "`{key}_simulations` has no matching `{key}_averages`"
            )));
        }

        Ok(ScenarioSummary {
            label: label.ok_or_else(|| <A::Error as de::Error>::missing_field("label"))?,
            cutoffs: cutoffs.unwrap_or_default(),
            nodes,
            overall: overall.ok_or_else(|| <A::Error as de::Error>::missing_field("overall"))?,
            combined_fairness: combined_fairness
                .ok_or_else(|| <A::Error as de::Error>::missing_field("combined_fairness"))?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(crate) fn run(node: &str, throughput: f64, latency: f64, units: u32, fidelity: f64) -> RunMetrics {
        RunMetrics {
            node: node.to_string(),
            throughput: Some(throughput),
            fidelity: Some(fidelity),
            latency_request: Some(latency),
            latency_unit: Some(latency / units as f64),
            latency_scaled: Some(latency / units as f64),
            total_requests: 1,
            completed_requests: 1,
            total_units: units,
            rejected_units: 0,
            active_time_ns: Some(latency as u64),
            start_time: Some(0),
            end_time: Some(latency as u64),
            requests: Vec::new(),
        }
    }

    fn unusable(node: &str) -> RunMetrics {
        RunMetrics {
            throughput: None,
            latency_request: None,
            latency_unit: None,
            latency_scaled: None,
            completed_requests: 0,
            ..run(node, 0.0, 0.0, 1, 0.0)
        }
    }

    #[test]
    fn case_colliding_nodes_cannot_be_summarised() {
        let mut acc = ScenarioAccumulator::new(&DegradationParams::baseline());
        acc.push(run("RA", 100.0, 2_000.0, 2, 0.9));
        acc.push(run("ra", 100.0, 2_000.0, 2, 0.9));
        let err = acc.build().unwrap_err();
        assert!(matches!(err, MetricsError::InvalidConfig { .. }));
    }

    #[test]
    fn averages_per_node_and_fairness_across_nodes() {
        let mut acc = ScenarioAccumulator::new(&DegradationParams::baseline());
        acc.push(run("RA", 100.0, 2_000.0, 2, 0.9));
        acc.push(run("RA", 300.0, 4_000.0, 2, 0.8));
        acc.push(run("RB", 100.0, 3_000.0, 2, 0.85));
        let summary = acc.build().unwrap();

        let ra = &summary.node("RA").unwrap().averages;
        assert_eq!(ra.usable_runs, 2);
        assert_eq!(ra.metrics.throughput, Some(200.0));
        assert_eq!(ra.metrics.latency, Some(3_000.0));
        assert_eq!(ra.metrics.unit_latency, Some(1_500.0));
        assert!((summary.combined_fairness.throughput.unwrap() - 0.9).abs() < 1e-12);
        assert_eq!(summary.combined_fairness.latency, Some(1.0));
        assert_eq!(summary.run_count(), 3);
        assert!((summary.overall.throughput.unwrap() - 500.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn absent_runs_are_kept_but_not_averaged() {
        let mut acc = ScenarioAccumulator::new(&DegradationParams::baseline());
        acc.push(run("RA", 100.0, 1_000.0, 2, 0.9));
        acc.push(unusable("RA"));
        let summary = acc.build().unwrap();

        let ra = summary.node("RA").unwrap();
        assert_eq!(ra.runs.len(), 2);
        assert_eq!(ra.averages.usable_runs, 1);
        assert_eq!(ra.averages.metrics.throughput, Some(100.0));
    }

    #[test]
    fn scenario_without_usable_runs_is_fatal() {
        let mut acc = ScenarioAccumulator::new(&DegradationParams::degraded());
        acc.push(unusable("RA"));
        acc.push(unusable("RB"));
        let err = acc.build().unwrap_err();
        assert!(matches!(err, MetricsError::NoUsableRuns { scenario } if scenario == "degraded"));
    }

    #[test]
    fn nodes_without_runs_drop_out_of_fairness() {
        let nodes = vec!["RA".to_string(), "RB".to_string()];
        let mut acc = ScenarioAccumulator::new(&DegradationParams::baseline()).with_nodes(&nodes);
        acc.push(run("RB", 50.0, 1_000.0, 1, 0.9));
        let summary = acc.build().unwrap();

        assert_eq!(summary.nodes[0].node, "RA");
        assert_eq!(summary.nodes[0].averages.metrics.throughput, None);
        assert_eq!(summary.combined_fairness.throughput, Some(1.0));
    }

    #[test]
    fn serializes_with_per_node_keys_and_parses_back() {
        let mut acc = ScenarioAccumulator::new(&DegradationParams::baseline());
        acc.push(run("RA", 100.0, 2_000.0, 2, 0.9));
        acc.push(run("RB", 120.0, 2_500.0, 2, 0.91));
        let summary = acc.build().unwrap();

        let text = serde_json::to_string(&summary).unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["ra_averages"]["throughput"], 100.0);
        assert_eq!(value["rb_simulations"][0]["latency_request"], 2_500.0);
        assert_eq!(value["combined_fairness"]["J_latency"], summary.combined_fairness.latency.unwrap());

        let back: ScenarioSummary = serde_json::from_str(&text).unwrap();
        assert_eq!(back, summary);
    }
}
