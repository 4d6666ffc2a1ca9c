//! A contract bound to a locale and checked for consistency.

use std::collections::BTreeSet;

use crate::ambiguity::CompiledPolicy;
use crate::capture::{RawCaptures, capture};
use crate::contract::{CanonicalKey, ContextMode, Contract};
use crate::error::ConfigurationError;
use crate::family::{CompiledFamily, PatternFamily};
use crate::locale::{LocaleBundle, MonthTable};
use crate::normalize::FieldNormalizer;
use crate::strategy::{PatternStrategy, Strategy};
use crate::template::{PatternTemplate, Placeholder};

/// Everything the executor needs for one field group, compiled once.
#[derive(Debug, Clone)]
pub struct CompiledContract {
    contract: Contract,
    locale: String,
    family: CompiledFamily,
    months: MonthTable,
    policy: Option<CompiledPolicy>,
    keys: BTreeSet<CanonicalKey>,
}

impl CompiledContract {
    /// Resolve templates against `locale` and validate the contract.
    ///
    /// Rejects a contract when:
    /// - no strategy is enabled;
    /// - a rule strategy is enabled but there are no pattern templates to
    ///   feed it;
    /// - a template feeding a month-indexed key has no `%MONTHS%` slot;
    /// - a sub-field's canonical key is captured by no compiled pattern;
    /// - an ambiguity policy has no usable value pattern, or names roles that
    ///   are not mapped.
    pub fn compile(contract: Contract, locale: &LocaleBundle) -> Result<Self, ConfigurationError> {
        locale.validate()?;

        if !contract.strategies.iter().any(Strategy::enabled) {
            return Err(ConfigurationError::NoUsableStrategy {
                field_group_id: contract.field_group_id.clone(),
            });
        }

        let pattern = contract.pattern_strategy();
        let has_templates = pattern.is_some_and(|p| !p.pattern_templates.is_empty());
        let rule_enabled = contract
            .strategies
            .iter()
            .any(|s| matches!(s, Strategy::RuleCode(rule) if rule.enabled));
        if rule_enabled && !has_templates {
            return Err(ConfigurationError::RuleCodeWithoutPatterns {
                field_group_id: contract.field_group_id.clone(),
            });
        }

        let mut family = match pattern {
            Some(strategy) => {
                let templates = PatternFamily::from_strategy(strategy)?;
                require_month_slots(&templates, &contract)?;
                templates.compile(locale)?
            }
            None => CompiledFamily {
                main: None,
                fallbacks: Vec::new(),
            },
        };

        family.bind_slots(contract.sub_field_mapping.values());

        if has_templates {
            for (sub_field_id, sub_field) in &contract.sub_field_mapping {
                let captured = family.patterns().any(|pattern| {
                    pattern.captures_key(&sub_field.canonical_key)
                        || pattern.fallback_key() == Some(&sub_field.canonical_key)
                });
                if !captured {
                    return Err(ConfigurationError::UnmappedCanonicalKey {
                        sub_field: sub_field_id.clone(),
                        key: sub_field.canonical_key.clone(),
                    });
                }
            }
        }

        let keys: BTreeSet<CanonicalKey> = contract.canonical_keys().cloned().collect();
        let policy = compile_policy(&contract, pattern, &keys, locale)?;

        tracing::debug!(
            field_group_id = %contract.field_group_id,
            locale = %locale.code,
            fallbacks = family.fallbacks.len(),
            ambiguity = policy.is_some(),
            "compiled contract"
        );

        Ok(CompiledContract {
            months: locale.month_table(),
            locale: locale.code.clone(),
            contract,
            family,
            policy,
            keys,
        })
    }

    pub fn contract(&self) -> &Contract {
        &self.contract
    }

    pub fn locale(&self) -> &str {
        &self.locale
    }

    pub fn family(&self) -> &CompiledFamily {
        &self.family
    }

    pub fn months(&self) -> &MonthTable {
        &self.months
    }

    pub fn policy(&self) -> Option<&CompiledPolicy> {
        self.policy.as_ref()
    }

    pub fn keys(&self) -> &BTreeSet<CanonicalKey> {
        &self.keys
    }

    /// Raw captures for the contract's canonical keys.
    pub fn capture(&self, utterance: &str) -> RawCaptures {
        capture(&self.family, &self.keys, utterance)
    }
}

/// Every template that feeds a key normalized as a month index must carry the
/// month-name slot.
fn require_month_slots(family: &PatternFamily, contract: &Contract) -> Result<(), ConfigurationError> {
    let rule_logic = contract.rule_strategy().map(|rule| &rule.normalization_logic);
    let month_indexed = |key: &CanonicalKey| {
        FieldNormalizer::for_key(key) == FieldNormalizer::MonthIndex
            || rule_logic.is_some_and(|logic| logic.normalizer_for(key) == FieldNormalizer::MonthIndex)
    };
    let feeds_month = |template: &PatternTemplate| {
        template
            .group_names()
            .any(|name| month_indexed(&CanonicalKey::from(name)))
    };

    if let Some(main) = family.main.as_ref().filter(|main| feeds_month(*main)) {
        main.require(Placeholder::MonthNames)?;
    }
    for (slot, template) in &family.fields {
        let slot_mode = ContextMode::Field(slot.clone());
        let target = contract
            .sub_field_mapping
            .values()
            .find(|sub_field| sub_field.context_mode == slot_mode)
            .map_or(slot, |sub_field| &sub_field.canonical_key);
        if month_indexed(target) || feeds_month(template) {
            template.require(Placeholder::MonthNames)?;
        }
    }
    Ok(())
}

fn compile_policy(
    contract: &Contract,
    pattern: Option<&PatternStrategy>,
    keys: &BTreeSet<CanonicalKey>,
    locale: &LocaleBundle,
) -> Result<Option<CompiledPolicy>, ConfigurationError> {
    let Some(policy) = &contract.ambiguity_policy else {
        return Ok(None);
    };

    let source = if policy.ambiguous_value_pattern.trim().is_empty() {
        pattern
            .and_then(|p| p.ambiguity_pattern.as_deref())
            .ok_or_else(|| {
                ConfigurationError::AmbiguityPolicy(
                    "no ambiguous value pattern in the policy or the pattern strategy".into(),
                )
            })?
    } else {
        policy.ambiguous_value_pattern.as_str()
    };

    if policy.roles_in_conflict.len() < 2 {
        return Err(ConfigurationError::AmbiguityPolicy(
            "at least two roles must be in conflict".into(),
        ));
    }
    if let Some(role) = policy.roles_in_conflict.iter().find(|role| !keys.contains(*role)) {
        return Err(ConfigurationError::AmbiguityPolicy(format!(
            "role '{role}' is not mapped by any sub-field"
        )));
    }

    let regex = PatternTemplate::parse(source)?.compile(locale, "ambiguity")?;
    Ok(Some(CompiledPolicy::new(
        regex,
        policy.roles_in_conflict.clone(),
    )))
}
