//! Threshold computation and per-sample trigger classification.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::feeds::Sample;

/// Default offset added to the baseline smoke average.
pub const DEFAULT_THRESHOLD_MARGIN: f64 = 40.0;

/// Anomalous condition detected on a single sensor reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
pub enum TriggerKind {
    SmokeSensor1,
    SmokeSensor2,
    FlameSensor1,
    FlameSensor2,
}

impl TriggerKind {
    pub const ALL: [TriggerKind; 4] = [
        TriggerKind::SmokeSensor1,
        TriggerKind::SmokeSensor2,
        TriggerKind::FlameSensor1,
        TriggerKind::FlameSensor2,
    ];

    /// Label persisted in the `alerts.trigger_type` column.
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerKind::SmokeSensor1 => "SmokeSensor1",
            TriggerKind::SmokeSensor2 => "SmokeSensor2",
            TriggerKind::FlameSensor1 => "FlameSensor1",
            TriggerKind::FlameSensor2 => "FlameSensor2",
        }
    }
}

impl fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown trigger type '{0}'")]
pub struct UnknownTrigger(pub String);

impl FromStr for TriggerKind {
    type Err = UnknownTrigger;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TriggerKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| UnknownTrigger(s.to_string()))
    }
}

/// A sample that produced at least one trigger.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub sample: Sample,
    pub triggers: Vec<TriggerKind>,
}

/// Outcome of evaluating one device's batch.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchEvaluation {
    pub threshold: f64,
    pub detections: Vec<Detection>,
}

/// Rounds half-way values toward positive infinity (2.5 -> 3, -2.5 -> -2).
///
/// Compares the exact fractional part instead of computing `value + 0.5`,
/// which rounds up just below one half.
fn round_half_up(value: f64) -> f64 {
    let floor = value.floor();
    if value - floor >= 0.5 { floor + 1.0 } else { floor }
}

/// Threshold for a batch ordered oldest to newest, derived from the oldest sample only.
///
/// Returns `None` for an empty batch.
pub fn compute_threshold(batch: &[Sample], margin: f64) -> Option<f64> {
    let baseline = batch.first()?;
    Some(round_half_up((baseline.smoke1 + baseline.smoke2) / 2.0) + margin)
}

/// Classifies one sample against the batch threshold.
///
/// Smoke triggers need a strictly greater reading; flame triggers need a reading of exactly 0.
pub fn evaluate_sample(sample: &Sample, threshold: f64) -> Vec<TriggerKind> {
    let mut triggers = Vec::new();
    if sample.smoke1 > threshold {
        triggers.push(TriggerKind::SmokeSensor1);
    }
    if sample.smoke2 > threshold {
        triggers.push(TriggerKind::SmokeSensor2);
    }
    if sample.flame1 == 0.0 {
        triggers.push(TriggerKind::FlameSensor1);
    }
    if sample.flame2 == 0.0 {
        triggers.push(TriggerKind::FlameSensor2);
    }
    triggers
}

/// Evaluates every sample of a batch with one shared threshold and drops quiet samples.
pub fn evaluate_batch(batch: &[Sample], margin: f64) -> Option<BatchEvaluation> {
    let threshold = compute_threshold(batch, margin)?;

    let detections = batch
        .iter()
        .filter_map(|sample| {
            let triggers = evaluate_sample(sample, threshold);
            (!triggers.is_empty()).then(|| Detection {
                sample: sample.clone(),
                triggers,
            })
        })
        .collect();

    Some(BatchEvaluation {
        threshold,
        detections,
    })
}
