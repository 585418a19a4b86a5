use std::collections::HashMap;

use qnet_metrics_abstract::{EventKind, EventRecord, RequestId, RunObserver, RunTrace};
use tracing::debug;

/// Collects the events of a single run. One recorder per run: recorders are
/// never shared between runs, so runs can be analysed in any order.
#[derive(Debug, Default)]
pub struct RunRecorder {
    events: Vec<EventRecord>,
    start_time: Option<u64>,
    end_time: Option<u64>,
    fidelity_threshold: f64,
    rejected_units: u32,
    // Deliveries seen so far per request, rejected ones included.
    sequences: HashMap<RequestId, u32>,
}

impl RunRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject deliveries whose measured fidelity is below `threshold`.
    /// Rejected units are counted but never become delivered units.
    ///
    /// Only the measured value is compared. A `FidelitySource::TableLookup`
    /// is consulted later, during analysis, so a table entry above the
    /// threshold does not bring a rejected unit back.
    pub fn with_fidelity_threshold(mut self, threshold: f64) -> Self {
        self.fidelity_threshold = threshold;
        self
    }

    /// Append one event. Only the fidelity threshold is applied here; ordering
    /// and lifecycle checks happen when the log is analysed.
    pub fn record(&mut self, event: EventRecord) {
        if let EventKind::UnitDelivered {
            fidelity: Some(f), ..
        } = event.kind
            && self.fidelity_threshold > 0.0
            && f < self.fidelity_threshold
        {
            debug!(
                "Rejecting unit of request {} (fidelity {:.4} < {:.4})",
                event.request_id, f, self.fidelity_threshold
            );
            self.rejected_units += 1;
            return;
        }
        self.events.push(event);
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Close the run and hand out its read-only log.
    pub fn finalize_run(self) -> RunLog {
        debug!(
            "Run finalized: {} events, {} rejected units",
            self.events.len(),
            self.rejected_units
        );
        RunLog {
            events: self.events,
            start_time: self.start_time,
            end_time: self.end_time,
            rejected_units: self.rejected_units,
        }
    }

    /// Feed a persisted trace through a fresh recorder.
    pub fn replay(trace: &RunTrace, fidelity_threshold: f64) -> RunLog {
        let mut recorder = RunRecorder::new().with_fidelity_threshold(fidelity_threshold);
        recorder.start_time = trace.start_time;
        recorder.end_time = trace.end_time;
        for event in &trace.events {
            recorder.record(event.clone());
        }
        recorder.finalize_run()
    }
}

impl RunObserver for RunRecorder {
    fn run_started(&mut self, timestamp: u64) {
        self.start_time = Some(timestamp);
    }

    fn run_ended(&mut self, timestamp: u64) {
        self.end_time = Some(timestamp);
    }

    fn request_submitted(
        &mut self,
        source: &str,
        destination: &str,
        request_id: RequestId,
        unit_count: u32,
        timestamp: u64,
    ) {
        self.record(EventRecord::submitted(
            timestamp,
            source,
            destination,
            request_id,
            unit_count,
        ));
    }

    fn unit_delivered(&mut self, node_id: &str, request_id: RequestId, fidelity: Option<f64>, timestamp: u64) {
        let seq = self.sequences.entry(request_id).or_insert(0);
        let sequence = *seq;
        *seq += 1;
        self.record(EventRecord::delivered(
            timestamp, node_id, request_id, sequence, fidelity,
        ));
    }

    fn request_completed(&mut self, node_id: &str, request_id: RequestId, timestamp: u64) {
        self.record(EventRecord::completed(timestamp, node_id, request_id));
    }
}

/// The closed event log of one run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunLog {
    events: Vec<EventRecord>,
    start_time: Option<u64>,
    end_time: Option<u64>,
    rejected_units: u32,
}

impl RunLog {
    pub fn events(&self) -> &[EventRecord] {
        &self.events
    }

    pub fn start_time(&self) -> Option<u64> {
        self.start_time
    }

    pub fn end_time(&self) -> Option<u64> {
        self.end_time
    }

    pub fn rejected_units(&self) -> u32 {
        self.rejected_units
    }

    /// Persistable form of the log, for debugging dumps.
    pub fn to_trace(&self, scenario: &str, node: &str) -> RunTrace {
        RunTrace {
            scenario: scenario.to_string(),
            node: node.to_string(),
            start_time: self.start_time,
            end_time: self.end_time,
            events: self.events.clone(),
        }
    }
}
