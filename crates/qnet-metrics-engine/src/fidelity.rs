use std::collections::HashMap;

use qnet_metrics_abstract::{FidelityPolicy, RequestId};
use serde::{Deserialize, Serialize};

/// Stable identifier of one delivered unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UnitKey {
    pub request_id: RequestId,
    pub sequence: u32,
}

/// One row of a fidelity table file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FidelityEntry {
    pub request_id: RequestId,
    pub sequence: u32,
    pub fidelity: f64,
}

/// Precomputed fidelities, stored on disk as a JSON list of
/// `{request_id, sequence, fidelity}` entries.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(from = "Vec<FidelityEntry>")]
pub struct FidelityTable {
    entries: HashMap<UnitKey, f64>,
}

impl From<Vec<FidelityEntry>> for FidelityTable {
    fn from(list: Vec<FidelityEntry>) -> Self {
        let entries = list
            .into_iter()
            .map(|e| {
                (
                    UnitKey {
                        request_id: e.request_id,
                        sequence: e.sequence,
                    },
                    e.fidelity,
                )
            })
            .collect();
        Self { entries }
    }
}

impl FidelityTable {
    pub fn insert(&mut self, key: UnitKey, fidelity: f64) {
        self.entries.insert(key, fidelity);
    }

    pub fn get(&self, key: &UnitKey) -> Option<f64> {
        self.entries.get(key).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Where a unit's fidelity comes from.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum FidelitySource {
    /// The value measured by the simulator at delivery time.
    #[default]
    Measured,
    /// A precomputed table; units missing from it fall back to the measured value.
    TableLookup(FidelityTable),
}

impl FidelitySource {
    pub fn resolve(&self, key: &UnitKey, measured: Option<f64>) -> Option<f64> {
        match self {
            FidelitySource::Measured => measured,
            FidelitySource::TableLookup(table) => table.get(key).or(measured),
        }
    }
}

/// Apply the out-of-range policy to a raw sample.
pub fn apply_policy(policy: FidelityPolicy, fidelity: f64) -> f64 {
    match policy {
        FidelityPolicy::AsIs => fidelity,
        FidelityPolicy::Clamp => fidelity.clamp(0.0, 1.0),
    }
}
