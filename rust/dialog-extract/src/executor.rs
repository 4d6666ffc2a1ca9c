//! The escalation executor.
//!
//! Strategies run in ascending `priorityRank` order; disabled ones are
//! skipped. The first strategy whose output passes validation produces the
//! result and nothing after it runs:
//!
//! ```text
//! pattern ──no match / invalid──▶ rule ──▶ entity ──▶ language model ──▶ empty
//!    │                             │          │              │
//!    └────────── accepted ─────────┴──────────┴──────────────┴──▶ result
//! ```
//!
//! Pattern and rule strategies work on the same raw captures; they differ in
//! the normalization logic applied to them. Entity and language-model
//! strategies call a [`StrategyService`] bounded by a timeout. A slow,
//! failing or missing service is recorded in the attempt trail and the
//! executor moves on.
//!
//! Fields that validated inside a failed attempt are remembered and fill
//! gaps in whatever result is finally accepted.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, trace, warn};

use crate::capture::{CaptureSource, RawCapture, RawCaptures};
use crate::compiled::CompiledContract;
use crate::config::ExtractorConfig;
use crate::contract::{CanonicalKey, Contract, RangeRule};
use crate::error::{ConfigurationError, FieldValidationError, ServiceError};
use crate::locale::LocaleBundle;
use crate::normalize::{FieldValue, NormalizationLogic, Normalizer};
use crate::result::{AttemptOutcome, ExtractionResult, StrategyAttempt};
use crate::score::Confidence;
use crate::service::{ServiceRequest, StrategyService};
use crate::strategy::{Strategy, StrategyKind};

const NO_RULES: &[RangeRule] = &[];

/// A validated field together with the text it came from.
#[derive(Debug, Clone)]
struct Extracted {
    value: FieldValue,
    capture: RawCapture,
}

/// What one strategy produced.
#[derive(Debug)]
struct Stage {
    outcome: AttemptOutcome,
    fields: BTreeMap<CanonicalKey, Extracted>,
    errors: Vec<FieldValidationError>,
    confidence: Confidence,
}

impl Stage {
    fn outcome(outcome: AttemptOutcome) -> Self {
        Stage {
            outcome,
            fields: BTreeMap::new(),
            errors: Vec::new(),
            confidence: Confidence::NONE,
        }
    }

    fn attempt(&self, strategy: &Strategy) -> StrategyAttempt {
        StrategyAttempt {
            kind: strategy.kind(),
            priority_rank: strategy.priority_rank(),
            outcome: self.outcome.clone(),
            values: self
                .fields
                .iter()
                .map(|(key, field)| (key.clone(), field.value.clone()))
                .collect(),
            errors: self.errors.clone(),
            confidence: self.confidence,
        }
    }
}

/// Runs compiled contracts against utterances.
#[derive(Clone, Default)]
pub struct Extractor {
    config: ExtractorConfig,
    entity: Option<Arc<dyn StrategyService>>,
    language_model: Option<Arc<dyn StrategyService>>,
}

impl Extractor {
    pub fn new(config: ExtractorConfig) -> Self {
        Extractor {
            config,
            entity: None,
            language_model: None,
        }
    }

    pub fn with_entity_service(mut self, service: Arc<dyn StrategyService>) -> Self {
        self.entity = Some(service);
        self
    }

    pub fn with_language_model(mut self, service: Arc<dyn StrategyService>) -> Self {
        self.language_model = Some(service);
        self
    }

    pub fn config(&self) -> &ExtractorConfig {
        &self.config
    }

    /// Compile `contract` for `locale`.
    pub fn compile(
        &self,
        contract: Contract,
        locale: &LocaleBundle,
    ) -> Result<CompiledContract, ConfigurationError> {
        CompiledContract::compile(contract, locale)
    }

    /// Run every enabled strategy of `contract` in rank order until one is
    /// accepted. Never fails: the outcome of each attempt is in the result.
    pub async fn extract(&self, contract: &CompiledContract, utterance: &str) -> ExtractionResult {
        self.extract_with_cancel(contract, utterance, &CancellationToken::new())
            .await
    }

    /// Like [`Extractor::extract`], but stops at the next strategy boundary
    /// (or mid-call for a delegated strategy) once `cancel` fires. A cancelled
    /// result carries no values, only the attempts made so far.
    #[instrument(
        skip_all,
        fields(field_group_id = %contract.contract().field_group_id, locale = contract.locale())
    )]
    pub async fn extract_with_cancel(
        &self,
        contract: &CompiledContract,
        utterance: &str,
        cancel: &CancellationToken,
    ) -> ExtractionResult {
        let captures = contract.capture(utterance);
        let mut attempts = Vec::new();
        let mut partial: BTreeMap<CanonicalKey, Extracted> = BTreeMap::new();

        for strategy in contract.contract().escalation_order() {
            if !strategy.enabled() {
                trace!(strategy = %strategy.kind(), "skipping disabled strategy");
                continue;
            }
            if cancel.is_cancelled() {
                debug!("extraction cancelled");
                return ExtractionResult::cancelled(attempts);
            }

            let stage = match strategy {
                Strategy::Pattern(_) => {
                    let logic = self.pattern_logic(contract);
                    let rules = contract
                        .contract()
                        .rule_strategy()
                        .map_or(NO_RULES, |rule| rule.validation_rules.as_slice());
                    self.run_local(contract, &captures, &logic, rules)
                }
                Strategy::RuleCode(rule) => self.run_local(
                    contract,
                    &captures,
                    &rule.normalization_logic,
                    &rule.validation_rules,
                ),
                Strategy::EntityRecognition(entity) => {
                    let request = ServiceRequest {
                        kind: StrategyKind::EntityRecognition,
                        field_group_id: &contract.contract().field_group_id,
                        canonical_keys: contract.keys().iter().collect(),
                        accepted_entity_kinds: &entity.accepted_entity_kinds,
                        instruction_text: None,
                        response_shape: None,
                    };
                    self.run_service(
                        contract,
                        utterance,
                        self.entity.as_ref(),
                        request,
                        self.timeout(entity.timeout_ms),
                        entity.min_confidence,
                        cancel,
                    )
                    .await
                }
                Strategy::LanguageModel(model) => {
                    let request = ServiceRequest {
                        kind: StrategyKind::LanguageModel,
                        field_group_id: &contract.contract().field_group_id,
                        canonical_keys: contract.keys().iter().collect(),
                        accepted_entity_kinds: &[],
                        instruction_text: Some(&model.instruction_text),
                        response_shape: (!model.response_shape.is_null())
                            .then_some(&model.response_shape),
                    };
                    self.run_service(
                        contract,
                        utterance,
                        self.language_model.as_ref(),
                        request,
                        self.timeout(model.timeout_ms),
                        model
                            .min_confidence
                            .unwrap_or(self.config.default_min_confidence),
                        cancel,
                    )
                    .await
                }
            };

            debug!(
                strategy = %strategy.kind(),
                rank = strategy.priority_rank(),
                outcome = %stage.outcome,
                fields = stage.fields.len(),
                "strategy attempted"
            );
            attempts.push(stage.attempt(strategy));

            match stage.outcome {
                AttemptOutcome::Accepted => {
                    return self.accept(contract, utterance, strategy.kind(), stage, partial, attempts);
                }
                AttemptOutcome::Cancelled => return ExtractionResult::cancelled(attempts),
                _ => {
                    for (key, field) in stage.fields {
                        partial.entry(key).or_insert(field);
                    }
                }
            }
        }

        debug!(attempts = attempts.len(), "no strategy produced a result");
        ExtractionResult::empty(attempts)
    }

    fn timeout(&self, strategy_timeout_ms: Option<u64>) -> Duration {
        strategy_timeout_ms
            .map(Duration::from_millis)
            .unwrap_or_else(|| self.config.service_timeout())
    }

    /// Default normalizers, with the year pivot the rule strategy sets, if
    /// any.
    fn pattern_logic(&self, contract: &CompiledContract) -> NormalizationLogic {
        NormalizationLogic {
            two_digit_year_pivot: contract
                .contract()
                .rule_strategy()
                .and_then(|rule| rule.normalization_logic.two_digit_year_pivot),
            ..NormalizationLogic::default()
        }
    }

    fn run_local(
        &self,
        contract: &CompiledContract,
        captures: &RawCaptures,
        logic: &NormalizationLogic,
        rules: &[RangeRule],
    ) -> Stage {
        if captures.is_empty() {
            return Stage::outcome(AttemptOutcome::NoMatch);
        }
        let normalizer = Normalizer::new(
            logic,
            rules,
            contract.months(),
            self.config.two_digit_year_pivot,
        );
        self.judge(contract, &normalizer, captures, Confidence::CERTAIN)
    }

    #[allow(clippy::too_many_arguments)]
    async fn run_service(
        &self,
        contract: &CompiledContract,
        utterance: &str,
        service: Option<&Arc<dyn StrategyService>>,
        request: ServiceRequest<'_>,
        timeout: Duration,
        min_confidence: f64,
        cancel: &CancellationToken,
    ) -> Stage {
        let Some(service) = service else {
            return Stage::outcome(AttemptOutcome::Unavailable);
        };
        let kind = request.kind;

        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Stage::outcome(AttemptOutcome::Cancelled),
            response = tokio::time::timeout(timeout, service.invoke(utterance, request)) => response,
        };

        let response = match response {
            Err(_) | Ok(Err(ServiceError::Timeout)) => {
                warn!(strategy = %kind, ?timeout, "service timed out");
                return Stage::outcome(AttemptOutcome::TimedOut);
            }
            Ok(Err(ServiceError::Unavailable)) => {
                return Stage::outcome(AttemptOutcome::Unavailable);
            }
            Ok(Err(ServiceError::Failed(message))) => {
                warn!(strategy = %kind, %message, "service failed");
                return Stage::outcome(AttemptOutcome::ServiceFailed(message));
            }
            Ok(Ok(response)) => response,
        };

        let captures: RawCaptures = response
            .values
            .into_iter()
            .filter(|(key, raw)| contract.keys().contains(key) && !raw.trim().is_empty())
            .map(|(key, raw)| (key, RawCapture::new(raw, CaptureSource::External(kind))))
            .collect();
        if captures.is_empty() {
            return Stage {
                confidence: response.confidence,
                ..Stage::outcome(AttemptOutcome::NoMatch)
            };
        }

        let logic = self.pattern_logic(contract);
        let rules = contract
            .contract()
            .rule_strategy()
            .map_or(NO_RULES, |rule| rule.validation_rules.as_slice());
        let normalizer = Normalizer::new(
            &logic,
            rules,
            contract.months(),
            self.config.two_digit_year_pivot,
        );
        let mut stage = self.judge(contract, &normalizer, &captures, response.confidence);
        if stage.outcome.is_accepted() && !response.confidence.meets(min_confidence) {
            stage.outcome = AttemptOutcome::BelowThreshold;
        }
        stage
    }

    /// Normalize and validate, then decide whether the attempt stands.
    fn judge(
        &self,
        contract: &CompiledContract,
        normalizer: &Normalizer<'_>,
        captures: &RawCaptures,
        confidence: Confidence,
    ) -> Stage {
        let normalized = normalizer.normalize(captures.iter().map(|(key, c)| (key, c.raw.as_str())));
        let fields: BTreeMap<CanonicalKey, Extracted> = normalized
            .values
            .into_iter()
            .filter_map(|(key, value)| {
                let capture = captures.get(&key)?.clone();
                Some((key, Extracted { value, capture }))
            })
            .collect();

        let mandatory_missing = contract
            .keys()
            .iter()
            .any(|key| contract.contract().is_mandatory(key) && !fields.contains_key(key));

        let outcome = if mandatory_missing {
            AttemptOutcome::Invalid
        } else if fields.is_empty() {
            if normalized.errors.is_empty() {
                AttemptOutcome::NoMatch
            } else {
                AttemptOutcome::Invalid
            }
        } else {
            AttemptOutcome::Accepted
        };

        Stage {
            outcome,
            fields,
            errors: normalized.errors,
            confidence,
        }
    }

    /// Build the final result from an accepted stage.
    fn accept(
        &self,
        contract: &CompiledContract,
        utterance: &str,
        strategy_used: StrategyKind,
        stage: Stage,
        partial: BTreeMap<CanonicalKey, Extracted>,
        attempts: Vec<StrategyAttempt>,
    ) -> ExtractionResult {
        let mut fields = stage.fields;
        for (key, field) in partial {
            fields.entry(key).or_insert(field);
        }

        let ambiguous_fields = match contract.policy() {
            Some(policy) => {
                let raw: BTreeMap<CanonicalKey, RawCapture> = fields
                    .iter()
                    .map(|(key, field)| (key.clone(), field.capture.clone()))
                    .collect();
                policy.resolve(&raw, utterance, contract.family())
            }
            None => BTreeSet::new(),
        };

        debug!(
            strategy = %strategy_used,
            fields = fields.len(),
            ambiguous = ambiguous_fields.len(),
            "extraction accepted"
        );

        let (values, sources) = fields
            .into_iter()
            .map(|(key, field)| ((key.clone(), field.value), (key, field.capture.source)))
            .unzip();

        ExtractionResult {
            values,
            sources,
            strategy_used: Some(strategy_used),
            confidence: stage.confidence,
            ambiguous_fields,
            attempts,
            cancelled: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::{ContextMode, ContractBuilder, keys};
    use crate::family::date_contract;
    use crate::normalize::FieldNormalizer;
    use crate::strategy::{PatternStrategy, RuleCodeStrategy};
    use pretty_assertions::assert_eq;
    use testresult::TestResult;

    fn compiled_date(locale: LocaleBundle) -> Result<CompiledContract, ConfigurationError> {
        CompiledContract::compile(date_contract("Date of birth", "dob")?, &locale)
    }

    #[tokio::test]
    async fn it_splits_a_numeric_date() -> TestResult {
        let contract = compiled_date(LocaleBundle::english())?;
        let result = Extractor::default().extract(&contract, "16/12/1980").await;

        assert_eq!(result.strategy_used, Some(StrategyKind::Pattern));
        assert_eq!(result.integer(keys::DAY), Some(16));
        assert_eq!(result.integer(keys::MONTH), Some(12));
        assert_eq!(result.integer(keys::YEAR), Some(1980));
        assert!(result.ambiguous_fields.is_empty());
        assert_eq!(result.confidence, Confidence::CERTAIN);
        Ok(())
    }

    #[tokio::test]
    async fn it_reads_italian_month_and_windowed_year() -> TestResult {
        let contract = compiled_date(LocaleBundle::italian())?;
        let result = Extractor::default().extract(&contract, "dicembre 80").await;

        assert_eq!(result.integer(keys::MONTH), Some(12));
        assert_eq!(result.integer(keys::YEAR), Some(1980));
        assert_eq!(result.value(keys::DAY), None);
        Ok(())
    }

    #[tokio::test]
    async fn it_extracts_month_only() -> TestResult {
        let contract = compiled_date(LocaleBundle::english())?;
        let result = Extractor::default().extract(&contract, "April").await;

        assert_eq!(result.values.len(), 1);
        assert_eq!(result.integer(keys::MONTH), Some(4));
        assert_eq!(result.source(keys::MONTH), Some(CaptureSource::Fallback));
        assert!(!result.is_ambiguous(keys::MONTH));
        Ok(())
    }

    #[tokio::test]
    async fn it_flags_a_bare_number() -> TestResult {
        let contract = compiled_date(LocaleBundle::english())?;
        let result = Extractor::default().extract(&contract, "04").await;

        assert_eq!(result.integer(keys::DAY), Some(4));
        assert!(result.is_ambiguous(keys::DAY));
        Ok(())
    }

    #[tokio::test]
    async fn it_drops_out_of_range_fields_and_keeps_the_rest() -> TestResult {
        let contract = compiled_date(LocaleBundle::english())?;
        let result = Extractor::default().extract(&contract, "16/12/2150").await;

        assert_eq!(result.integer(keys::DAY), Some(16));
        assert_eq!(result.value(keys::YEAR), None);
        assert_eq!(
            result.attempts[0].errors,
            vec![FieldValidationError::OutOfRange {
                key: keys::YEAR.into(),
                value: 2150,
                minimum: 1900,
                maximum: 2100,
            }]
        );
        Ok(())
    }

    #[tokio::test]
    async fn disabled_pattern_escalates_to_rule() -> TestResult {
        let mut contract = date_contract("Date", "date")?;
        contract.strategies[0].set_enabled(false);
        let compiled = CompiledContract::compile(contract, &LocaleBundle::english())?;
        let result = Extractor::default().extract(&compiled, "16/12/1980").await;

        assert_eq!(result.strategy_used, Some(StrategyKind::RuleCode));
        assert_eq!(result.integer(keys::YEAR), Some(1980));
        assert_eq!(result.attempts.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn invalid_mandatory_field_escalates() -> TestResult {
        let contract = ContractBuilder::new("Code", "code")
            .sub_field("n", keys::NUMBER, "Number")
            .mandatory()
            .sub_field("l", "label", "Label")
            .strategy(
                PatternStrategy::new(0).template(
                    ContextMode::Main,
                    r"^(?P<label>[a-z0-9]+)\s+(?P<number>\S+)$",
                ),
            )
            .strategy(
                RuleCodeStrategy::new(1).normalization(
                    NormalizationLogic::default().field(keys::NUMBER, FieldNormalizer::Text),
                ),
            )
            .build();
        let compiled = CompiledContract::compile(contract, &LocaleBundle::english())?;
        let result = Extractor::default().extract(&compiled, "code1 x").await;

        assert_eq!(
            result.outcomes(),
            vec![
                (StrategyKind::Pattern, &AttemptOutcome::Invalid),
                (StrategyKind::RuleCode, &AttemptOutcome::Accepted),
            ]
        );
        assert_eq!(result.text(keys::NUMBER), Some("x"));
        assert_eq!(result.text("label"), Some("code1"));
        Ok(())
    }

    #[tokio::test]
    async fn nothing_recognized_gives_an_empty_result() -> TestResult {
        let contract = compiled_date(LocaleBundle::english())?;
        let result = Extractor::default()
            .extract(&contract, "I would rather not say")
            .await;

        assert!(result.is_empty());
        assert_eq!(result.strategy_used, None);
        assert_eq!(
            result.outcomes(),
            vec![
                (StrategyKind::Pattern, &AttemptOutcome::NoMatch),
                (StrategyKind::RuleCode, &AttemptOutcome::NoMatch),
            ]
        );
        Ok(())
    }

    #[tokio::test]
    async fn cancelled_before_start_returns_no_values() -> TestResult {
        let contract = compiled_date(LocaleBundle::english())?;
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = Extractor::default()
            .extract_with_cancel(&contract, "16/12/1980", &cancel)
            .await;

        assert!(result.cancelled);
        assert!(result.is_empty());
        assert!(result.attempts.is_empty());
        Ok(())
    }
}
