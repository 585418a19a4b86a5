pub mod config;
pub mod event;
pub mod interface;
pub mod scenario;

pub use event::{EventKind, EventRecord, NodeId, RequestId};
pub use interface::RunObserver;

pub use config::{ActiveWindow, DegradationParams, ExperimentConfig, FidelityPolicy, SyntheticProfile};
pub use scenario::{ExperimentConfigOverride, RunTrace};
