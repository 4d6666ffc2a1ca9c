//! Error types for contract compilation, extraction and classification.
//!
//! The taxonomy follows how far each failure is allowed to travel:
//!
//! - [`ConfigurationError`] is a defect in a contract, template or locale
//!   bundle. It surfaces from compile/convert calls and never reaches the
//!   executor.
//! - [`FieldValidationError`] concerns a single captured field. The
//!   normalizer collects these and drops the field; they are never raised.
//! - [`ServiceError`] is a collaborator failure. The executor records it as
//!   an attempt outcome and escalates.
//! - [`CacheLoadError`] and [`ClassifyError`] belong to the rule classifier.

use thiserror::Error;

use crate::contract::CanonicalKey;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigurationError {
    #[error("template '{template}' is missing required placeholder %{placeholder}%")]
    MissingPlaceholder {
        template: String,
        placeholder: &'static str,
    },

    #[error("template '{template}' references unknown placeholder %{name}%")]
    UnknownPlaceholder { template: String, name: String },

    #[error("locale '{locale}' has no tokens for placeholder %{placeholder}%")]
    UnresolvedPlaceholder {
        locale: String,
        placeholder: &'static str,
    },

    #[error("pattern for context '{context}' does not compile: {message}")]
    InvalidPattern { context: String, message: String },

    #[error("sub-field '{sub_field}' maps to '{key}', which no compiled pattern captures")]
    UnmappedCanonicalKey { sub_field: String, key: CanonicalKey },

    #[error("contract '{field_group_id}' has no enabled strategy")]
    NoUsableStrategy { field_group_id: String },

    #[error("contract '{field_group_id}' has a rule strategy but no pattern templates")]
    RuleCodeWithoutPatterns { field_group_id: String },

    #[error("invalid ambiguity policy: {0}")]
    AmbiguityPolicy(String),

    #[error("invalid locale bundle '{locale}': {message}")]
    InvalidLocale { locale: String, message: String },

    #[error("strategy kind '{kind}' appears more than once")]
    DuplicateStrategyKind { kind: &'static str },

    #[error("malformed contract: {0}")]
    MalformedContract(String),
}

impl From<serde_json::Error> for ConfigurationError {
    fn from(error: serde_json::Error) -> Self {
        ConfigurationError::MalformedContract(error.to_string())
    }
}

/// A problem with one captured field. The field is dropped, the rest of the
/// extraction carries on.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FieldValidationError {
    #[error("'{key}' value {raw:?} is not a number")]
    NotANumber { key: CanonicalKey, raw: String },

    #[error("'{key}' value {raw:?} is not a known month")]
    UnknownMonth { key: CanonicalKey, raw: String },

    #[error("'{key}' value {value} is outside {minimum}..={maximum}")]
    OutOfRange {
        key: CanonicalKey,
        value: i64,
        minimum: i64,
        maximum: i64,
    },
}

impl FieldValidationError {
    pub fn key(&self) -> &CanonicalKey {
        match self {
            FieldValidationError::NotANumber { key, .. }
            | FieldValidationError::UnknownMonth { key, .. }
            | FieldValidationError::OutOfRange { key, .. } => key,
        }
    }
}

/// Failure reported by (or around) an entity-recognition or language-model
/// collaborator.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ServiceError {
    #[error("no service is installed for this strategy")]
    Unavailable,

    #[error("service call failed: {0}")]
    Failed(String),

    #[error("service call timed out")]
    Timeout,
}

/// Failure while loading classification rules.
///
/// Cloneable so that every caller awaiting the same in-flight load observes
/// the same error.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CacheLoadError {
    #[error("rule source failed: {0}")]
    Source(String),

    #[error("rule for {language}/{category} does not compile: {message}")]
    InvalidRule {
        language: String,
        category: String,
        message: String,
    },
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ClassifyError {
    #[error("classification rules are unavailable: {0}")]
    CacheLoad(#[from] CacheLoadError),
}
