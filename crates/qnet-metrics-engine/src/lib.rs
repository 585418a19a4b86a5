pub mod aggregate;
pub mod error;
pub mod experiment;
pub mod fairness;
pub mod fidelity;
pub mod per_run;
pub mod recorder;
pub mod report;
pub mod robustness;
pub mod synthetic;

pub use aggregate::{FairnessIndices, MetricAverages, NodeAverages, NodeSummary, ScenarioAccumulator, ScenarioSummary};
pub use error::{MetricsError, Ratio, Undefined, safe_ratio};
pub use experiment::{Experiment, validate_config};
pub use fairness::jain_index;
pub use fidelity::{FidelitySource, FidelityTable, UnitKey};
pub use per_run::{RequestMetrics, RunMetrics, RunOptions, analyze_run};
pub use recorder::{RunLog, RunRecorder};
pub use report::ExperimentReport;
pub use robustness::{Polarity, RobustnessResult, compare, robustness};
pub use synthetic::{RunPlan, TraceGenerator, check_profile};
