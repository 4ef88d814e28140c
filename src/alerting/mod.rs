//! # Alerting
//!
//! Pure detection logic of the ingestion cycle (threshold and trigger
//! evaluation, duplicate suppression, cross-device propagation) and the
//! read-side alert board it refreshes.

pub mod board;
pub mod dedupe;
pub mod propagation;
pub mod trigger;

pub use board::{AlertBoard, AlertSnapshot, AlertView, collapse_same_timestamp};
pub use dedupe::{AlertKey, DEFAULT_DEDUPE_WINDOW, DedupeWindow};
pub use propagation::MirrorMap;
pub use trigger::{
    BatchEvaluation, DEFAULT_THRESHOLD_MARGIN, Detection, TriggerKind, compute_threshold,
    evaluate_batch, evaluate_sample,
};
