//! Per-run metric calculators: throughput, end-to-end fidelity and the three
//! latency variants (request, unit, scaled).

use std::collections::HashMap;

use qnet_metrics_abstract::{ActiveWindow, EventKind, FidelityPolicy, NodeId, RequestId};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{MetricsError, Ratio, Undefined, mean, safe_ratio};
use crate::fidelity::{FidelitySource, UnitKey, apply_policy};
use crate::recorder::RunLog;

const NS_PER_SEC: f64 = 1e9;

/// How a run's raw events are turned into metrics.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub active_window: ActiveWindow,
    pub fidelity_policy: FidelityPolicy,
    pub fidelity_source: FidelitySource,
}

/// The lifecycle of one request, rebuilt from the event log.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestTimeline {
    pub request_id: RequestId,
    pub source: NodeId,
    pub destination: NodeId,
    pub requested_units: u32,
    pub submitted_at: u64,
    pub completed_at: Option<u64>,
    /// `(sequence, measured fidelity)` per delivered unit.
    pub deliveries: Vec<(u32, Option<f64>)>,
}

impl RequestTimeline {
    pub fn delivered_units(&self) -> u32 {
        self.deliveries.len() as u32
    }

    pub fn is_completed(&self) -> bool {
        self.completed_at.is_some()
    }
}

/// Rebuild every request of the run, checking the lifecycle invariants.
/// Any violation means the simulation produced a broken trace and is fatal.
pub fn request_timelines(log: &RunLog) -> Result<Vec<RequestTimeline>, MetricsError> {
    let mut timelines: Vec<RequestTimeline> = Vec::new();
    let mut index: HashMap<RequestId, usize> = HashMap::new();
    let mut last_timestamp = 0u64;

    for event in log.events() {
        let id = event.request_id;
        if event.timestamp < last_timestamp {
            return Err(MetricsError::malformed(
                id,
                format!(
                    "timestamp {} recorded after {}",
                    event.timestamp, last_timestamp
                ),
            ));
        }
        last_timestamp = event.timestamp;

        match &event.kind {
            EventKind::RequestSubmitted {
                destination,
                unit_count,
            } => {
                if index.contains_key(&id) {
                    return Err(MetricsError::malformed(id, "submitted twice"));
                }
                index.insert(id, timelines.len());
                timelines.push(RequestTimeline {
                    request_id: id,
                    source: event.node_id.clone(),
                    destination: destination.clone(),
                    requested_units: *unit_count,
                    submitted_at: event.timestamp,
                    completed_at: None,
                    deliveries: Vec::new(),
                });
            }
            EventKind::UnitDelivered { fidelity, sequence } => {
                let Some(&i) = index.get(&id) else {
                    return Err(MetricsError::malformed(id, "unit delivered before submission"));
                };
                let timeline = &mut timelines[i];
                if timeline.is_completed() {
                    return Err(MetricsError::malformed(id, "unit delivered after completion"));
                }
                if timeline.delivered_units() >= timeline.requested_units {
                    return Err(MetricsError::malformed(
                        id,
                        format!(
                            "more than {} units delivered",
                            timeline.requested_units
                        ),
                    ));
                }
                timeline.deliveries.push((*sequence, *fidelity));
            }
            EventKind::RequestCompleted => {
                let Some(&i) = index.get(&id) else {
                    return Err(MetricsError::malformed(id, "completed before submission"));
                };
                let timeline = &mut timelines[i];
                if timeline.is_completed() {
                    return Err(MetricsError::malformed(id, "completed twice"));
                }
                if event.timestamp < timeline.submitted_at {
                    return Err(MetricsError::malformed(
                        id,
                        "completion timestamp precedes submission",
                    ));
                }
                timeline.completed_at = Some(event.timestamp);
            }
        }
    }
    Ok(timelines)
}

/// Lr: time from submission to completion, in nanoseconds.
pub fn request_latency(timeline: &RequestTimeline) -> Ratio {
    timeline
        .completed_at
        .map(|done| (done - timeline.submitted_at) as f64)
        .ok_or(Undefined::MissingData("request never completed"))
}

/// Lu: request latency per unit actually delivered.
pub fn unit_latency(request_latency: f64, delivered_units: u32) -> Ratio {
    safe_ratio(request_latency, delivered_units as f64, "delivered units")
}

/// Ls: request latency per unit requested.
pub fn scaled_latency(request_latency: f64, requested_units: u32) -> Ratio {
    safe_ratio(request_latency, requested_units as f64, "requested units")
}

/// Elapsed active time of the run in nanoseconds, as selected by `window`.
/// Negative when the markers are inverted.
pub fn active_time_ns(log: &RunLog, timelines: &[RequestTimeline], window: ActiveWindow) -> Option<i128> {
    let (start, end) = match window {
        ActiveWindow::CompletedRequests => (
            timelines.iter().map(|t| t.submitted_at).min()?,
            timelines.iter().filter_map(|t| t.completed_at).max()?,
        ),
        ActiveWindow::WholeRun => {
            let events = log.events();
            (
                log.start_time().or(events.first().map(|e| e.timestamp))?,
                log.end_time().or(events.last().map(|e| e.timestamp))?,
            )
        }
    };
    Some(end as i128 - start as i128)
}

/// Units of completed requests delivered per second of active time.
pub fn throughput(log: &RunLog, timelines: &[RequestTimeline], window: ActiveWindow) -> Ratio {
    let units: u32 = timelines
        .iter()
        .filter(|t| t.is_completed())
        .map(RequestTimeline::delivered_units)
        .sum();
    let elapsed = active_time_ns(log, timelines, window)
        .ok_or(Undefined::MissingData("no completed requests"))?;
    if elapsed <= 0 {
        return Err(Undefined::DivisionByZero("active time"));
    }
    safe_ratio(units as f64, elapsed as f64 / NS_PER_SEC, "active time")
}

fn resolved_samples<'a>(
    timeline: &'a RequestTimeline,
    options: &'a RunOptions,
) -> impl Iterator<Item = f64> + 'a {
    timeline.deliveries.iter().filter_map(move |&(sequence, measured)| {
        let key = UnitKey {
            request_id: timeline.request_id,
            sequence,
        };
        options
            .fidelity_source
            .resolve(&key, measured)
            .map(|f| apply_policy(options.fidelity_policy, f))
    })
}

/// Mean fidelity over every delivered unit of the run.
pub fn fidelity(timelines: &[RequestTimeline], options: &RunOptions) -> Ratio {
    mean(
        timelines.iter().flat_map(|t| resolved_samples(t, options)),
        "fidelity samples",
    )
}

/// Metrics of a single request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestMetrics {
    pub request_id: RequestId,
    pub destination: NodeId,
    pub requested_units: u32,
    pub delivered_units: u32,
    pub latency_request: Option<f64>,
    pub latency_unit: Option<f64>,
    pub latency_scaled: Option<f64>,
    pub fidelity: Option<f64>,
}

impl RequestMetrics {
    pub fn from_timeline(timeline: &RequestTimeline, options: &RunOptions) -> Self {
        let lr = request_latency(timeline);
        Self {
            request_id: timeline.request_id,
            destination: timeline.destination.clone(),
            requested_units: timeline.requested_units,
            delivered_units: timeline.delivered_units(),
            latency_request: lr.ok(),
            latency_unit: lr.and_then(|lr| unit_latency(lr, timeline.delivered_units())).ok(),
            latency_scaled: lr.and_then(|lr| scaled_latency(lr, timeline.requested_units)).ok(),
            fidelity: mean(resolved_samples(timeline, options), "fidelity samples").ok(),
        }
    }
}

/// Metrics of one simulation run, plus the per-request breakdown they came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunMetrics {
    /// Node that initiated the run's requests.
    pub node: NodeId,
    /// Entangled units per second.
    pub throughput: Option<f64>,
    pub fidelity: Option<f64>,
    /// Mean Lr over completed requests, in nanoseconds.
    pub latency_request: Option<f64>,
    pub latency_unit: Option<f64>,
    pub latency_scaled: Option<f64>,
    pub total_requests: usize,
    pub completed_requests: usize,
    /// Units delivered to requests that completed.
    pub total_units: u32,
    pub rejected_units: u32,
    pub active_time_ns: Option<u64>,
    pub start_time: Option<u64>,
    pub end_time: Option<u64>,
    pub requests: Vec<RequestMetrics>,
}

impl RunMetrics {
    /// A run counts towards a scenario once at least one request completed.
    pub fn is_usable(&self) -> bool {
        self.completed_requests > 0
    }
}

fn settle(node: &str, metric: &'static str, value: Ratio) -> Option<f64> {
    match value {
        Ok(v) => Some(v),
        Err(reason) => {
            warn!("[{}] {} undefined: {}", node, metric, reason);
            None
        }
    }
}

/// Turn a finished run's log into its metrics.
pub fn analyze_run(node: &str, log: &RunLog, options: &RunOptions) -> Result<RunMetrics, MetricsError> {
    let timelines = request_timelines(log)?;
    let requests: Vec<RequestMetrics> = timelines
        .iter()
        .map(|t| RequestMetrics::from_timeline(t, options))
        .collect();
    let completed: Vec<&RequestMetrics> = requests
        .iter()
        .filter(|r| r.latency_request.is_some())
        .collect();

    let metrics = RunMetrics {
        node: node.to_string(),
        throughput: settle(node, "throughput", throughput(log, &timelines, options.active_window)),
        fidelity: settle(node, "fidelity", fidelity(&timelines, options)),
        latency_request: settle(
            node,
            "request latency",
            mean(completed.iter().filter_map(|r| r.latency_request), "completed requests"),
        ),
        latency_unit: settle(
            node,
            "unit latency",
            mean(completed.iter().filter_map(|r| r.latency_unit), "delivered units"),
        ),
        latency_scaled: settle(
            node,
            "scaled latency",
            mean(completed.iter().filter_map(|r| r.latency_scaled), "requested units"),
        ),
        total_requests: timelines.len(),
        completed_requests: completed.len(),
        total_units: timelines
            .iter()
            .filter(|t| t.is_completed())
            .map(RequestTimeline::delivered_units)
            .sum(),
        rejected_units: log.rejected_units(),
        active_time_ns: active_time_ns(log, &timelines, options.active_window)
            .and_then(|t| u64::try_from(t).ok()),
        start_time: log.start_time(),
        end_time: log.end_time(),
        requests,
    };
    debug!(
        "[{}] run analysed: {}/{} requests completed, throughput {:?}",
        node, metrics.completed_requests, metrics.total_requests, metrics.throughput
    );
    Ok(metrics)
}
