use qnet_metrics_abstract::RequestId;
use serde::Serialize;
use thiserror::Error;

/// Why a metric could not be computed. Recovered locally: the metric is
/// reported as absent and the rest of the scenario carries on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error, Serialize)]
pub enum Undefined {
    #[error("division by zero ({0})")]
    DivisionByZero(&'static str),
    #[error("missing data ({0})")]
    MissingData(&'static str),
}

/// A metric value or the reason it is undefined.
pub type Ratio = Result<f64, Undefined>;

/// Divide `numerator` by `denominator`, refusing zero denominators and
/// non-finite results. `what` names the denominator for diagnostics.
pub fn safe_ratio(numerator: f64, denominator: f64, what: &'static str) -> Ratio {
    if denominator == 0.0 {
        return Err(Undefined::DivisionByZero(what));
    }
    let value = numerator / denominator;
    if value.is_finite() {
        Ok(value)
    } else {
        Err(Undefined::DivisionByZero(what))
    }
}

/// Arithmetic mean of the defined values; `MissingData` when there are none.
pub fn mean<I>(values: I, what: &'static str) -> Ratio
where
    I: IntoIterator<Item = f64>,
{
    let (sum, count) = values
        .into_iter()
        .fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    if count == 0 {
        return Err(Undefined::MissingData(what));
    }
    safe_ratio(sum, count as f64, what)
}

/// Failures that abort a scenario instead of being recovered.
#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("malformed event for request {request_id}: {reason}")]
    MalformedEvent { request_id: RequestId, reason: String },
    #[error("scenario '{scenario}' has no usable runs")]
    NoUsableRuns { scenario: String },
    #[error("no scenario is labelled '{label}'")]
    UnknownScenario { label: String },
    #[error("invalid configuration: {reason}")]
    InvalidConfig { reason: String },
}

impl MetricsError {
    pub(crate) fn malformed(request_id: RequestId, reason: impl Into<String>) -> Self {
        MetricsError::MalformedEvent {
            request_id,
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid(reason: impl Into<String>) -> Self {
        MetricsError::InvalidConfig {
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_denominator_is_undefined() {
        assert_eq!(
            safe_ratio(1.0, 0.0, "elapsed time"),
            Err(Undefined::DivisionByZero("elapsed time"))
        );
        assert_eq!(safe_ratio(3.0, 2.0, "x"), Ok(1.5));
    }

    #[test]
    fn mean_of_nothing_is_missing() {
        assert_eq!(
            mean(std::iter::empty(), "fidelity"),
            Err(Undefined::MissingData("fidelity"))
        );
        assert_eq!(mean([1.0, 2.0, 3.0], "x"), Ok(2.0));
    }
}
