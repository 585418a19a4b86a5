use crate::event::RequestId;

/// The callbacks a simulation drives while a run is in progress.
/// The simulator's reception handler and request bookkeeping call these methods;
/// implementors turn them into event records.
pub trait RunObserver {
    /// The simulation clock started for this run.
    fn run_started(&mut self, _timestamp: u64) {}

    /// The simulation clock stopped for this run.
    fn run_ended(&mut self, _timestamp: u64) {}

    /// A node submitted a request for `unit_count` entangled units with `destination`.
    fn request_submitted(
        &mut self,
        source: &str,
        destination: &str,
        request_id: RequestId,
        unit_count: u32,
        timestamp: u64,
    );

    /// One entangled unit of `request_id` arrived at `node_id`.
    /// `fidelity` is `None` when the state could not be inspected before measurement.
    fn unit_delivered(&mut self, node_id: &str, request_id: RequestId, fidelity: Option<f64>, timestamp: u64);

    /// All units of `request_id` have arrived.
    fn request_completed(&mut self, node_id: &str, request_id: RequestId, timestamp: u64);
}
