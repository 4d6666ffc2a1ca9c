//! # Dialog Extract: contract-driven field extraction
//!
//! Pulls structured values (a date's day, month and year, or a phone number's
//! components) out of the free-form answers a user gives during a guided
//! data-collection dialogue, and sorts short imperative labels into action
//! categories.
//!
//! ## Core Ideas
//!
//! - **Contracts are data**: a [`Contract`] declares, per field group, the
//!   sub-fields to fill and an ordered list of strategies. Contracts come
//!   from JSON in either the ordered or the legacy keyed shape.
//! - **Patterns are locale templates**: templates carry typed `%MONTHS%` /
//!   `%SEP%` slots resolved against a [`LocaleBundle`] when the contract is
//!   compiled, never per call.
//! - **Escalation**: the [`Extractor`] runs strategies by priority rank and
//!   stops at the first valid, confident result. Delegated strategies are
//!   bounded by a timeout and can be cancelled.
//! - **Ambiguity is surfaced**: a value that fits more than one role is
//!   flagged in the result for the dialog to confirm.
//!
//! ## Architecture
//!
//! ```text
//! Contract + LocaleBundle → CompiledContract
//!   utterance → capture (main / fallback) → normalize + validate
//!     → escalate (pattern → rule → entity → language model)
//!       → ambiguity → ExtractionResult
//!
//! RuleSource → RuleCache (single flight) → Classifier → Category
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use dialog_extract::{CompiledContract, Extractor, LocaleBundle, date_contract};
//!
//! let contract = CompiledContract::compile(date_contract("Birth date", "dob")?, &LocaleBundle::italian())?;
//! let result = Extractor::default().extract(&contract, "dicembre 80").await;
//! assert_eq!(result.integer("month"), Some(12));
//! assert_eq!(result.integer("year"), Some(1980));
//! ```

pub mod ambiguity;
pub mod cache;
pub mod capture;
pub mod category;
pub mod classifier;
pub mod compiled;
pub mod config;
pub mod contract;
pub mod error;
pub mod executor;
pub mod family;
pub mod legacy;
pub mod locale;
pub mod normalize;
pub mod result;
pub mod rules;
pub mod score;
pub mod service;
pub mod strategy;
pub mod template;

pub use cache::{CacheStatus, RuleCache};
pub use capture::CaptureSource;
pub use category::{Category, LanguageCode};
pub use classifier::Classifier;
pub use compiled::CompiledContract;
pub use config::{ClassifierConfig, ExtractorConfig};
pub use contract::{
    AmbiguityPolicy, CanonicalKey, ContextMode, Contract, ContractBuilder, RangeRule, SubField,
};
pub use error::{
    CacheLoadError, ClassifyError, ConfigurationError, FieldValidationError, ServiceError,
};
pub use executor::Extractor;
pub use family::{PatternFamily, date_contract, phone_contract};
pub use locale::{LocaleBundle, MonthTable};
pub use normalize::{FieldNormalizer, FieldValue, NormalizationLogic};
pub use result::{AttemptOutcome, ExtractionResult, StrategyAttempt};
pub use rules::{LanguageRules, RuleBook, RuleSet, RuleSource, StaticRuleSource};
pub use score::Confidence;
pub use service::{ServiceRequest, ServiceResponse, StrategyService};
pub use strategy::{
    EntityStrategy, LanguageModelStrategy, PatternStrategy, RuleCodeStrategy, Strategy,
    StrategyKind,
};
pub use template::{Guard, PatternTemplate, Placeholder};
