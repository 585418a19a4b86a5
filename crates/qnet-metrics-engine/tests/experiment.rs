use proptest::prelude::*;
use qnet_metrics_abstract::{ExperimentConfig, RunObserver};
use qnet_metrics_engine::{
    Experiment, ExperimentReport, FidelitySource, MetricsError, RunLog, RunOptions, RunPlan, RunRecorder,
    TraceGenerator, analyze_run, compare,
};

/// One run with a single request whose units arrive evenly over `latency` ns.
fn run_log(source: &str, destination: &str, request_id: u64, latency: u64, units: u32, fidelity: f64) -> RunLog {
    let mut recorder = RunRecorder::new();
    recorder.run_started(0);
    recorder.request_submitted(source, destination, request_id, units, 0);
    for i in 1..=units as u64 {
        recorder.unit_delivered(source, request_id, Some(fidelity), latency * i / units as u64);
    }
    recorder.request_completed(source, request_id, latency);
    recorder.run_ended(latency);
    recorder.finalize_run()
}

fn experiment_with(baseline_latency: u64, degraded_latency: Option<u64>) -> Experiment {
    let mut config = ExperimentConfig::default();
    if degraded_latency.is_none() {
        config.degraded = None;
    }
    let mut experiment = Experiment::new(config, FidelitySource::Measured).unwrap();
    let mut request_id = 0;
    let mut feed = |experiment: &mut Experiment, scenario: &str, latency: u64, fidelity: f64| {
        for (source, destination) in [("RA", "RB"), ("RB", "RA")] {
            for _ in 0..5 {
                request_id += 1;
                let log = run_log(source, destination, request_id, latency, 2, fidelity);
                experiment.ingest_log(scenario, source, &log).unwrap();
            }
        }
    };
    feed(&mut experiment, "baseline", baseline_latency, 0.97);
    if let Some(latency) = degraded_latency {
        feed(&mut experiment, "degraded", latency, 0.95);
    }
    experiment
}

#[test]
fn uniform_baseline_runs_average_per_node() {
    let report = experiment_with(1_000_000, None).finish().unwrap();
    let baseline = &report.baseline;

    for node in ["RA", "RB"] {
        let summary = baseline.node(node).unwrap();
        assert_eq!(summary.runs.len(), 5);
        assert_eq!(summary.averages.metrics.unit_latency, Some(500_000.0));
        assert_eq!(summary.averages.metrics.scaled_latency, Some(500_000.0));
        assert_eq!(summary.averages.metrics.latency, Some(1_000_000.0));
        assert!((summary.averages.metrics.fidelity.unwrap() - 0.97).abs() < 1e-9);
    }
    assert!((baseline.combined_fairness.fidelity.unwrap() - 1.0).abs() < 1e-9);
    assert!((baseline.combined_fairness.throughput.unwrap() - 1.0).abs() < 1e-9);
    assert!(report.degraded.is_none());
    assert!(report.robustness.is_none());
}

#[test]
fn halved_throughput_gives_half_robustness() {
    let report = experiment_with(1_000_000, Some(2_000_000)).finish().unwrap();
    let robustness = report.robustness.unwrap();

    assert!((robustness.throughput.unwrap() - 0.5).abs() < 1e-9);
    assert!((robustness.latency.unwrap() - 0.5).abs() < 1e-9);
    assert!((robustness.fidelity.unwrap() - 0.95 / 0.97).abs() < 1e-9);
    assert!((robustness.fairness_throughput.unwrap() - 1.0).abs() < 1e-9);
}

#[test]
fn scenario_compared_with_itself_is_fully_robust() {
    let report = experiment_with(1_000_000, None).finish().unwrap();
    let rm = compare(&report.baseline, &report.baseline);
    assert_eq!(rm.throughput, Some(1.0));
    assert_eq!(rm.latency, Some(1.0));
    assert_eq!(rm.unit_latency, Some(1.0));
    assert_eq!(rm.fidelity, Some(1.0));
}

#[test]
fn report_round_trips_through_json() {
    let report = experiment_with(1_000_000, Some(1_300_000)).finish().unwrap();
    let text = serde_json::to_string_pretty(&report).unwrap();

    let value: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert_eq!(value["scenario"], "multiple_simulations_with_metrics");
    assert_eq!(value["num_requests_per_node"], 5);
    assert_eq!(value["num_bps_per_request"], 2);
    assert!(value["baseline"]["ra_averages"]["unit_latency"].is_number());
    assert!(value["baseline"]["combined_fairness"]["J_fidelity"].is_number());
    assert!(value["degraded"]["rb_simulations"].is_array());
    assert!(value["robustness"]["RM_throughput"].is_number());

    let parsed: ExperimentReport = serde_json::from_str(&text).unwrap();
    assert_eq!(parsed, report);
}

#[test]
fn traces_with_unknown_labels_are_rejected() {
    let mut experiment = Experiment::new(ExperimentConfig::default(), FidelitySource::Measured).unwrap();
    let trace = run_log("RA", "RB", 1, 1_000, 2, 0.9).to_trace("mystery", "RA");
    let err = experiment.ingest_trace(&trace).unwrap_err();
    assert!(matches!(err, MetricsError::UnknownScenario { label } if label == "mystery"));
}

#[test]
fn missing_degraded_runs_are_fatal() {
    let mut experiment = Experiment::new(ExperimentConfig::default(), FidelitySource::Measured).unwrap();
    experiment
        .ingest_log("baseline", "RA", &run_log("RA", "RB", 1, 1_000, 2, 0.9))
        .unwrap();
    let err = experiment.finish().unwrap_err();
    assert!(matches!(err, MetricsError::NoUsableRuns { scenario } if scenario == "degraded"));
}

#[test]
fn synthetic_experiment_shows_degradation() {
    let config = ExperimentConfig::default();
    let mut generator = TraceGenerator::new(42);
    let mut traces = Vec::new();
    for params in [Some(&config.baseline), config.degraded.as_ref()].into_iter().flatten() {
        for source in &config.nodes {
            let destination = config.peer_of(source).unwrap();
            for _ in 0..config.num_requests_per_node {
                traces.push(generator.generate_trace(&RunPlan {
                    scenario: &params.label,
                    source,
                    destination,
                    requests: 1,
                    units_per_request: config.units_per_request,
                    profile: &params.synthetic,
                }).unwrap());
            }
        }
    }

    let mut experiment = Experiment::new(config, FidelitySource::Measured).unwrap();
    for trace in &traces {
        experiment.ingest_trace(trace).unwrap();
    }
    let report = experiment.finish().unwrap();
    let rm = report.robustness.unwrap();

    // degraded unit latencies are at least 800 us against at most 600 us
    assert!(rm.throughput.unwrap() < 1.0);
    assert!(rm.latency.unwrap() < 1.0);
    assert_eq!(report.baseline.run_count(), 10);
}

proptest! {
    #[test]
    fn fidelity_mean_stays_in_unit_interval(samples in prop::collection::vec(0.0f64..=1.0, 1..12)) {
        let mut recorder = RunRecorder::new();
        recorder.request_submitted("RA", "RB", 1, samples.len() as u32, 0);
        for (i, f) in samples.iter().enumerate() {
            recorder.unit_delivered("RA", 1, Some(*f), i as u64 + 1);
        }
        recorder.request_completed("RA", 1, samples.len() as u64 + 1);
        let run = analyze_run("RA", &recorder.finalize_run(), &RunOptions::default()).unwrap();

        let fidelity = run.fidelity.unwrap();
        prop_assert!((0.0..=1.0).contains(&fidelity));
        prop_assert!(run.throughput.unwrap() >= 0.0);
        prop_assert_eq!(run.latency_unit, run.latency_scaled);
    }
}
