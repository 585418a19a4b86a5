use serde::{Deserialize, Serialize};

/// Name of a network node (e.g. `"RA"`).
pub type NodeId = String;

/// Identifier assigned to a request by the link layer.
pub type RequestId = u64;

/// What happened at `EventRecord::timestamp`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventKind {
    /// The initiating node asked for `unit_count` entangled units with `destination`.
    RequestSubmitted { destination: NodeId, unit_count: u32 },
    /// One entangled unit reached the application layer.
    /// `fidelity` is `None` when the collaborator could not measure the state.
    UnitDelivered {
        #[serde(default)]
        fidelity: Option<f64>,
        /// Position of the unit within its request, starting at 0.
        #[serde(default)]
        sequence: u32,
    },
    /// Every unit of the request has been delivered.
    RequestCompleted,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EventRecord {
    /// Simulation time in nanoseconds.
    pub timestamp: u64,
    pub node_id: NodeId,
    pub request_id: RequestId,
    #[serde(flatten)]
    pub kind: EventKind,
}

impl EventRecord {
    pub fn new(timestamp: u64, node_id: impl Into<NodeId>, request_id: RequestId, kind: EventKind) -> Self {
        Self {
            timestamp,
            node_id: node_id.into(),
            request_id,
            kind,
        }
    }

    pub fn submitted(
        timestamp: u64,
        source: impl Into<NodeId>,
        destination: impl Into<NodeId>,
        request_id: RequestId,
        unit_count: u32,
    ) -> Self {
        Self::new(
            timestamp,
            source,
            request_id,
            EventKind::RequestSubmitted {
                destination: destination.into(),
                unit_count,
            },
        )
    }

    pub fn delivered(
        timestamp: u64,
        node_id: impl Into<NodeId>,
        request_id: RequestId,
        sequence: u32,
        fidelity: Option<f64>,
    ) -> Self {
        Self::new(
            timestamp,
            node_id,
            request_id,
            EventKind::UnitDelivered { fidelity, sequence },
        )
    }

    pub fn completed(timestamp: u64, node_id: impl Into<NodeId>, request_id: RequestId) -> Self {
        Self::new(timestamp, node_id, request_id, EventKind::RequestCompleted)
    }

    pub fn is_submission(&self) -> bool {
        matches!(self.kind, EventKind::RequestSubmitted { .. })
    }

    pub fn is_delivery(&self) -> bool {
        matches!(self.kind, EventKind::UnitDelivered { .. })
    }

    pub fn is_completion(&self) -> bool {
        matches!(self.kind, EventKind::RequestCompleted)
    }
}
