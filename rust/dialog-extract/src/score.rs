//! Confidence scores attached to extraction results.
//!
//! Pattern and rule strategies are binary: a result either matched
//! structurally and passed validation ([`Confidence::CERTAIN`]) or it did
//! not. Entity-recognition and language-model collaborators report their own
//! score, which is compared against the strategy's minimum.

use serde::{Deserialize, Serialize};

/// A confidence score in the range [0.0, 1.0].
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
#[serde(from = "f64", into = "f64")]
pub struct Confidence(f64);

impl Confidence {
    pub const NONE: Confidence = Confidence(0.0);
    pub const CERTAIN: Confidence = Confidence(1.0);

    /// Clamp `value` into [0.0, 1.0]. NaN is treated as no confidence.
    pub fn new(value: f64) -> Self {
        if value.is_nan() {
            Confidence::NONE
        } else {
            Confidence(value.clamp(0.0, 1.0))
        }
    }

    pub fn value(&self) -> f64 {
        self.0
    }

    /// Whether this score is at least `minimum` (inclusive).
    pub fn meets(&self, minimum: f64) -> bool {
        self.0 >= minimum
    }
}

impl From<f64> for Confidence {
    fn from(value: f64) -> Self {
        Confidence::new(value)
    }
}

impl From<Confidence> for f64 {
    fn from(confidence: Confidence) -> Self {
        confidence.0
    }
}
