//! Seeded trace generator standing in for the external simulator, so a full
//! baseline/degraded experiment can be exercised without it.

use rand::{Rng, SeedableRng};
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use tracing::{debug, warn};

use qnet_metrics_abstract::{RequestId, RunObserver, RunTrace, SyntheticProfile};

use crate::error::MetricsError;
use crate::recorder::{RunLog, RunRecorder};

/// Attempts per unit before the generator gives up on a request.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 1_000;

#[derive(Debug)]
enum Step {
    Submit { request: usize },
    Attempt { request: usize, sequence: u32, attempt: u32 },
    Deliver { request: usize, sequence: u32 },
}

#[derive(Debug)]
struct Scheduled {
    time: u64,
    step: Step,
    id: u64, // Tie-breaker for steps at the same time
}

// Min-heap on (time, id)
impl PartialEq for Scheduled {
    fn eq(&self, other: &Self) -> bool {
        self.time == other.time && self.id == other.id
    }
}

impl Eq for Scheduled {}

impl PartialOrd for Scheduled {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Scheduled {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .time
            .cmp(&self.time)
            .then_with(|| other.id.cmp(&self.id))
    }
}

/// Parameters of one generated run.
#[derive(Debug, Clone)]
pub struct RunPlan<'a> {
    pub scenario: &'a str,
    pub source: &'a str,
    pub destination: &'a str,
    /// Requests issued back to back within the run.
    pub requests: u32,
    pub units_per_request: u32,
    pub profile: &'a SyntheticProfile,
}

/// Reject profiles the generator cannot sample from.
pub fn check_profile(profile: &SyntheticProfile) -> Result<(), MetricsError> {
    // NaN fails every range check below
    if !(0.0..1.0).contains(&profile.loss_rate) {
        return Err(MetricsError::invalid(format!(
            "loss_rate must be in [0, 1), got {}",
            profile.loss_rate
        )));
    }
    if !profile.fidelity.is_finite() {
        return Err(MetricsError::invalid(format!(
            "fidelity must be finite, got {}",
            profile.fidelity
        )));
    }
    if !(profile.fidelity_jitter.is_finite() && profile.fidelity_jitter >= 0.0) {
        return Err(MetricsError::invalid(format!(
            "fidelity_jitter must be finite and non-negative, got {}",
            profile.fidelity_jitter
        )));
    }
    Ok(())
}

pub struct TraceGenerator {
    rng: rand::rngs::StdRng,
    next_request_id: RequestId,
    max_attempts: u32,
}

impl TraceGenerator {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: rand::rngs::StdRng::seed_from_u64(seed),
            next_request_id: 1,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    /// Give up on a request once one of its units failed `attempts` times in a row.
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    fn unit_latency(&mut self, profile: &SyntheticProfile) -> u64 {
        let lo = profile.min_unit_latency_ns;
        let hi = profile.max_unit_latency_ns.max(lo);
        self.rng.random_range(lo..=hi)
    }

    fn sample_fidelity(&mut self, profile: &SyntheticProfile) -> f64 {
        if profile.fidelity_jitter <= 0.0 {
            return profile.fidelity;
        }
        let jitter = self
            .rng
            .random_range(-profile.fidelity_jitter..=profile.fidelity_jitter);
        profile.fidelity + jitter
    }

    /// Drive `observer` through one run, the way the simulator's callbacks would.
    /// A request whose unit runs out of attempts is abandoned without completion.
    pub fn drive(&mut self, plan: &RunPlan<'_>, observer: &mut dyn RunObserver) -> Result<(), MetricsError> {
        check_profile(plan.profile)?;
        let ids: Vec<RequestId> = (0..plan.requests)
            .map(|_| {
                let id = self.next_request_id;
                self.next_request_id += 1;
                id
            })
            .collect();

        let mut queue = BinaryHeap::new();
        let mut counter = 0u64;
        let mut push = |queue: &mut BinaryHeap<Scheduled>, time: u64, step: Step| {
            queue.push(Scheduled { time, step, id: counter });
            counter += 1;
        };

        let mut now = 0;
        observer.run_started(now);
        if !ids.is_empty() {
            push(&mut queue, 0, Step::Submit { request: 0 });
        }

        while let Some(Scheduled { time, step, .. }) = queue.pop() {
            now = time;
            match step {
                Step::Submit { request } => {
                    observer.request_submitted(
                        plan.source,
                        plan.destination,
                        ids[request],
                        plan.units_per_request,
                        now,
                    );
                    if plan.units_per_request == 0 {
                        observer.request_completed(plan.source, ids[request], now);
                        if request + 1 < ids.len() {
                            push(&mut queue, now, Step::Submit { request: request + 1 });
                        }
                    } else {
                        push(
                            &mut queue,
                            now,
                            Step::Attempt {
                                request,
                                sequence: 0,
                                attempt: 1,
                            },
                        );
                    }
                }
                Step::Attempt {
                    request,
                    sequence,
                    attempt,
                } => {
                    let latency = self.unit_latency(plan.profile);
                    if self.rng.random::<f64>() >= plan.profile.loss_rate {
                        push(&mut queue, now + latency, Step::Deliver { request, sequence });
                    } else if attempt < self.max_attempts {
                        debug!("Attempt for unit {} of request {} failed", sequence, ids[request]);
                        push(
                            &mut queue,
                            now + latency,
                            Step::Attempt {
                                request,
                                sequence,
                                attempt: attempt + 1,
                            },
                        );
                    } else {
                        warn!(
                            "Request {} abandoned after {} failed attempts for unit {}",
                            ids[request], attempt, sequence
                        );
                        if request + 1 < ids.len() {
                            push(&mut queue, now + latency, Step::Submit { request: request + 1 });
                        }
                    }
                }
                Step::Deliver { request, sequence } => {
                    let fidelity = self.sample_fidelity(plan.profile);
                    observer.unit_delivered(plan.source, ids[request], Some(fidelity), now);
                    if sequence + 1 < plan.units_per_request {
                        push(
                            &mut queue,
                            now,
                            Step::Attempt {
                                request,
                                sequence: sequence + 1,
                                attempt: 1,
                            },
                        );
                    } else {
                        observer.request_completed(plan.source, ids[request], now);
                        if request + 1 < ids.len() {
                            push(&mut queue, now, Step::Submit { request: request + 1 });
                        }
                    }
                }
            }
        }
        observer.run_ended(now);
        Ok(())
    }

    /// Generate one run into a fresh recorder.
    pub fn generate(&mut self, plan: &RunPlan<'_>, fidelity_threshold: f64) -> Result<RunLog, MetricsError> {
        let mut recorder = RunRecorder::new().with_fidelity_threshold(fidelity_threshold);
        self.drive(plan, &mut recorder)?;
        Ok(recorder.finalize_run())
    }

    pub fn generate_trace(&mut self, plan: &RunPlan<'_>) -> Result<RunTrace, MetricsError> {
        Ok(self.generate(plan, 0.0)?.to_trace(plan.scenario, plan.source))
    }
}
