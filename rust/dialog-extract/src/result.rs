//! Extraction results and the trail of strategies that produced them.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::capture::CaptureSource;
use crate::contract::CanonicalKey;
use crate::error::FieldValidationError;
use crate::normalize::FieldValue;
use crate::score::Confidence;
use crate::strategy::StrategyKind;

/// How one strategy attempt ended.
#[derive(Debug, Clone, PartialEq)]
pub enum AttemptOutcome {
    /// The strategy produced the result.
    Accepted,
    /// Nothing usable was recognized.
    NoMatch,
    /// A mandatory field was missing or failed validation.
    Invalid,
    /// The service answered below the strategy's minimum confidence.
    BelowThreshold,
    TimedOut,
    ServiceFailed(String),
    /// No service is installed for this strategy kind.
    Unavailable,
    Cancelled,
}

impl AttemptOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, AttemptOutcome::Accepted)
    }
}

impl fmt::Display for AttemptOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttemptOutcome::Accepted => write!(f, "accepted"),
            AttemptOutcome::NoMatch => write!(f, "no match"),
            AttemptOutcome::Invalid => write!(f, "invalid"),
            AttemptOutcome::BelowThreshold => write!(f, "below threshold"),
            AttemptOutcome::TimedOut => write!(f, "timed out"),
            AttemptOutcome::ServiceFailed(message) => write!(f, "service failed: {message}"),
            AttemptOutcome::Unavailable => write!(f, "unavailable"),
            AttemptOutcome::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// One entry of the provenance trail.
#[derive(Debug, Clone, PartialEq)]
pub struct StrategyAttempt {
    pub kind: StrategyKind,
    pub priority_rank: i32,
    pub outcome: AttemptOutcome,
    /// Values the attempt managed to validate, accepted or not.
    pub values: BTreeMap<CanonicalKey, FieldValue>,
    pub errors: Vec<FieldValidationError>,
    pub confidence: Confidence,
}

/// The outcome of one extraction call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractionResult {
    pub values: BTreeMap<CanonicalKey, FieldValue>,
    pub sources: BTreeMap<CanonicalKey, CaptureSource>,
    /// `None` when no strategy succeeded.
    pub strategy_used: Option<StrategyKind>,
    pub confidence: Confidence,
    pub ambiguous_fields: BTreeSet<CanonicalKey>,
    /// Every strategy that ran, in the order it ran.
    pub attempts: Vec<StrategyAttempt>,
    pub cancelled: bool,
}

impl ExtractionResult {
    /// No values, with the attempts that led here.
    pub fn empty(attempts: Vec<StrategyAttempt>) -> Self {
        ExtractionResult {
            attempts,
            ..ExtractionResult::default()
        }
    }

    pub fn cancelled(attempts: Vec<StrategyAttempt>) -> Self {
        ExtractionResult {
            attempts,
            cancelled: true,
            ..ExtractionResult::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn value(&self, key: &str) -> Option<&FieldValue> {
        self.values.get(&CanonicalKey::from(key))
    }

    pub fn integer(&self, key: &str) -> Option<i64> {
        self.value(key).and_then(FieldValue::as_integer)
    }

    pub fn text(&self, key: &str) -> Option<&str> {
        self.value(key).and_then(FieldValue::as_text)
    }

    pub fn is_ambiguous(&self, key: &str) -> bool {
        self.ambiguous_fields.contains(&CanonicalKey::from(key))
    }

    pub fn source(&self, key: &str) -> Option<CaptureSource> {
        self.sources.get(&CanonicalKey::from(key)).copied()
    }

    /// The outcomes in the order the strategies ran.
    pub fn outcomes(&self) -> Vec<(StrategyKind, &AttemptOutcome)> {
        self.attempts
            .iter()
            .map(|attempt| (attempt.kind, &attempt.outcome))
            .collect()
    }
}
