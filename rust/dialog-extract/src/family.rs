//! Pattern families and generated contracts.
//!
//! A field group is recognized by a family of patterns:
//!
//! - one **main** pattern with a named group per canonical key, every group
//!   optional, guarded so that it only runs on input containing a digit;
//! - one **fallback** pattern per sub-field for standalone input ("April",
//!   "1980", "the 4th"), each capturing a single key.
//!
//! The executor tries main first and the fallbacks only when main does not
//! match. The built-in date family keeps `%MONTHS%` in its templates so one
//! contract serves every locale; the slot is resolved when the contract is
//! compiled.

use indexmap::IndexMap;
use regex::Regex;

use crate::contract::{
    CanonicalKey, Contract, ContextMode, ContractBuilder, RangeRule, SubField, keys,
};
use crate::error::ConfigurationError;
use crate::locale::LocaleBundle;
use crate::normalize::{FieldNormalizer, NormalizationLogic};
use crate::strategy::{EntityStrategy, LanguageModelStrategy, PatternStrategy, RuleCodeStrategy};
use crate::template::{Guard, PatternTemplate, Placeholder};

const DATE_MAIN: &str = r"^\s*(?:(?:the|on|il|lo|le)\s+)?(?:(?P<day>0?[1-9]|[12][0-9]|3[01])(?:st|nd|rd|th)?\b)?(?:\s|%SEP%)*(?:(?P<month>%MONTHS%|0?[1-9]|1[0-2])\b\.?)?(?:\s|%SEP%)*(?P<year>[0-9]{4}|[0-9]{2})?\s*$";
const DATE_DAY: &str =
    r"^\s*(?:(?:the|on|il|lo|le)\s+)?(?P<day>0?[1-9]|[12][0-9]|3[01])(?:st|nd|rd|th)?\s*$";
const DATE_MONTH: &str = r"^\s*(?:(?:in|a|di)\s+)?(?P<month>%MONTHS%|0?[1-9]|1[0-2])\.?\s*$";
const DATE_YEAR: &str = r"^\s*(?:(?:in|nel)\s+)?(?P<year>[0-9]{4})\s*$";
const DATE_AMBIGUOUS: &str = r"^(?:0?[1-9]|1[0-2])$";

const PHONE_MAIN: &str = r"^\s*(?:(?:\+|00)(?P<country_code>[0-9]{1,3})[\s.\-]*)?(?:(?P<prefix>0?[0-9]{2,4})[\s./\-]+)?(?P<number>[0-9][0-9\s]{3,10}[0-9])\s*$";
const PHONE_NUMBER: &str = r"^\s*(?P<number>[0-9][0-9\s.\-]{4,14}[0-9])\s*$";

/// Uncompiled templates for one field group.
#[derive(Debug, Clone, PartialEq)]
pub struct PatternFamily {
    pub main: Option<PatternTemplate>,
    pub fields: IndexMap<CanonicalKey, PatternTemplate>,
    pub ambiguity: Option<PatternTemplate>,
}

impl PatternFamily {
    /// Parse the templates held by a pattern strategy.
    pub fn from_strategy(strategy: &PatternStrategy) -> Result<Self, ConfigurationError> {
        let mut family = PatternFamily {
            main: None,
            fields: IndexMap::new(),
            ambiguity: None,
        };
        for (context, source) in &strategy.pattern_templates {
            let template = PatternTemplate::parse(source)?;
            match context {
                ContextMode::Main => family.main = Some(template),
                ContextMode::Field(key) => {
                    family.fields.insert(key.clone(), template);
                }
            }
        }
        family.ambiguity = strategy
            .ambiguity_pattern
            .as_deref()
            .map(PatternTemplate::parse)
            .transpose()?;
        Ok(family)
    }

    /// The day/month/year family. Main and month templates must carry the
    /// month-name slot.
    pub fn date() -> Result<Self, ConfigurationError> {
        let main = PatternTemplate::parse(DATE_MAIN)?;
        main.require(Placeholder::MonthNames)?;
        let month = PatternTemplate::parse(DATE_MONTH)?;
        month.require(Placeholder::MonthNames)?;

        let mut fields = IndexMap::new();
        fields.insert(CanonicalKey::from(keys::DAY), PatternTemplate::parse(DATE_DAY)?);
        fields.insert(CanonicalKey::from(keys::MONTH), month);
        fields.insert(CanonicalKey::from(keys::YEAR), PatternTemplate::parse(DATE_YEAR)?);

        Ok(PatternFamily {
            main: Some(main),
            fields,
            ambiguity: Some(PatternTemplate::parse(DATE_AMBIGUOUS)?),
        })
    }

    /// The country-code/prefix/number family.
    pub fn phone() -> Result<Self, ConfigurationError> {
        let mut fields = IndexMap::new();
        fields.insert(
            CanonicalKey::from(keys::NUMBER),
            PatternTemplate::parse(PHONE_NUMBER)?,
        );
        Ok(PatternFamily {
            main: Some(PatternTemplate::parse(PHONE_MAIN)?),
            fields,
            ambiguity: None,
        })
    }

    /// Render back into a pattern strategy payload.
    pub fn into_strategy(self, priority_rank: i32) -> PatternStrategy {
        let mut strategy = PatternStrategy::new(priority_rank);
        if let Some(main) = self.main {
            strategy = strategy.template(ContextMode::Main, main.source());
        }
        for (key, template) in self.fields {
            strategy = strategy.template(ContextMode::Field(key), template.source());
        }
        if let Some(ambiguity) = self.ambiguity {
            strategy = strategy.ambiguity_pattern(ambiguity.source());
        }
        strategy
    }

    /// Resolve every template against `locale` and compile it.
    pub fn compile(&self, locale: &LocaleBundle) -> Result<CompiledFamily, ConfigurationError> {
        let main = self
            .main
            .as_ref()
            .map(|template| {
                Ok::<_, ConfigurationError>(CompiledPattern {
                    context: ContextMode::Main,
                    key: None,
                    regex: template.compile(locale, "main")?,
                    guard: Guard::RequiresDigit,
                })
            })
            .transpose()?;

        let fallbacks = self
            .fields
            .iter()
            .map(|(key, template)| {
                Ok(CompiledPattern {
                    context: ContextMode::Field(key.clone()),
                    key: Some(key.clone()),
                    regex: template.compile(locale, key.as_str())?,
                    guard: Guard::None,
                })
            })
            .collect::<Result<Vec<_>, ConfigurationError>>()?;

        Ok(CompiledFamily { main, fallbacks })
    }
}

/// A compiled pattern, the slot it was declared under and the key it fills.
#[derive(Debug, Clone)]
pub struct CompiledPattern {
    pub context: ContextMode,
    /// The canonical key a fallback feeds. `None` for the main pattern.
    pub key: Option<CanonicalKey>,
    pub regex: Regex,
    pub guard: Guard,
}

impl CompiledPattern {
    /// Whether the pattern defines a named group for `key`.
    pub fn captures_key(&self, key: &CanonicalKey) -> bool {
        self.regex
            .capture_names()
            .flatten()
            .any(|name| name == key.as_str())
    }

    /// The key a fallback pattern feeds. `None` for the main pattern.
    pub fn fallback_key(&self) -> Option<&CanonicalKey> {
        self.key.as_ref()
    }

    /// Run a fallback pattern and return the text it captured for its key:
    /// the group named after the key, then the group named after the slot,
    /// then the whole match.
    pub fn capture_fallback<'t>(&self, utterance: &'t str) -> Option<&'t str> {
        let key = self.fallback_key()?;
        if !self.guard.admits(utterance) {
            return None;
        }
        let captures = self.regex.captures(utterance)?;
        let slot = match &self.context {
            ContextMode::Field(slot) => Some(slot.as_str()),
            ContextMode::Main => None,
        };
        let matched = captures
            .name(key.as_str())
            .or_else(|| slot.and_then(|slot| captures.name(slot)))
            .or_else(|| captures.get(0))?;
        let text = matched.as_str().trim();
        (!text.is_empty()).then_some(text)
    }
}

#[derive(Debug, Clone)]
pub struct CompiledFamily {
    pub main: Option<CompiledPattern>,
    pub fallbacks: Vec<CompiledPattern>,
}

impl CompiledFamily {
    pub fn patterns(&self) -> impl Iterator<Item = &CompiledPattern> {
        self.main.iter().chain(self.fallbacks.iter())
    }

    /// Point each fallback slot at the canonical key of the sub-field whose
    /// context mode names it. A slot no sub-field names keeps feeding the key
    /// of the same name.
    pub fn bind_slots<'a>(&mut self, sub_fields: impl IntoIterator<Item = &'a SubField>) {
        for sub_field in sub_fields {
            if sub_field.context_mode == ContextMode::Main {
                continue;
            }
            for pattern in self
                .fallbacks
                .iter_mut()
                .filter(|pattern| pattern.context == sub_field.context_mode)
            {
                pattern.key = Some(sub_field.canonical_key.clone());
            }
        }
    }

    pub fn fallback_for(&self, key: &CanonicalKey) -> Option<&CompiledPattern> {
        self.fallbacks
            .iter()
            .find(|pattern| pattern.fallback_key() == Some(key))
    }
}

/// A complete date contract: pattern first, then rule code, with entity
/// recognition and a language model available but disabled.
pub fn date_contract(
    field_group_name: impl Into<String>,
    field_group_id: impl Into<String>,
) -> Result<Contract, ConfigurationError> {
    let field_group_id = field_group_id.into();
    let family = PatternFamily::date()?;
    let ambiguity = family
        .ambiguity
        .as_ref()
        .map(|template| template.source().to_string())
        .unwrap_or_default();

    Ok(ContractBuilder::new(field_group_name, field_group_id.clone())
        .sub_field(format!("{field_group_id}_day"), keys::DAY, "Day")
        .sub_field(format!("{field_group_id}_month"), keys::MONTH, "Month")
        .sub_field(format!("{field_group_id}_year"), keys::YEAR, "Year")
        .ambiguity(ambiguity, &[keys::DAY, keys::MONTH])
        .strategy(family.into_strategy(0))
        .strategy(
            RuleCodeStrategy::new(1)
                .rule(RangeRule::new(keys::DAY, 1, 31))
                .rule(RangeRule::new(keys::MONTH, 1, 12))
                .rule(RangeRule::new(keys::YEAR, 1900, 2100)),
        )
        .strategy(EntityStrategy::new(2, ["DATE"], 0.8).disabled())
        .strategy(
            LanguageModelStrategy::new(
                3,
                "Extract the day, month and year mentioned in the user's answer.",
            )
            .response_shape(serde_json::json!({
                "day": "integer",
                "month": "integer",
                "year": "integer"
            }))
            .disabled(),
        )
        .build())
}

/// A phone number contract with digit normalization and no ambiguity policy.
pub fn phone_contract(
    field_group_name: impl Into<String>,
    field_group_id: impl Into<String>,
) -> Result<Contract, ConfigurationError> {
    let field_group_id = field_group_id.into();
    let family = PatternFamily::phone()?;

    Ok(ContractBuilder::new(field_group_name, field_group_id.clone())
        .sub_field(
            format!("{field_group_id}_country_code"),
            keys::COUNTRY_CODE,
            "Country code",
        )
        .sub_field(format!("{field_group_id}_prefix"), keys::PREFIX, "Prefix")
        .sub_field(format!("{field_group_id}_number"), keys::NUMBER, "Number")
        .mandatory()
        .strategy(family.into_strategy(0))
        .strategy(
            RuleCodeStrategy::new(1).normalization(
                NormalizationLogic::default()
                    .field(keys::COUNTRY_CODE, FieldNormalizer::Digits)
                    .field(keys::PREFIX, FieldNormalizer::Digits)
                    .field(keys::NUMBER, FieldNormalizer::Digits),
            ),
        )
        .strategy(EntityStrategy::new(2, ["PHONE_NUMBER"], 0.8).disabled())
        .build())
}

#[cfg(test)]
mod tests {
    use super::*;
    use testresult::TestResult;

    fn captures(family: &CompiledFamily, text: &str) -> Vec<(String, String)> {
        let Some(main) = &family.main else {
            return vec![];
        };
        let Some(found) = main.regex.captures(text) else {
            return vec![];
        };
        main.regex
            .capture_names()
            .flatten()
            .filter_map(|name| found.name(name).map(|m| (name.to_string(), m.as_str().to_string())))
            .collect()
    }

    fn pairs(items: &[(&str, &str)]) -> Vec<(String, String)> {
        items
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn date_family_compiles_for_builtin_locales() -> TestResult {
        let family = PatternFamily::date()?;
        for locale in [LocaleBundle::english(), LocaleBundle::italian()] {
            let compiled = family.compile(&locale)?;
            assert!(compiled.main.is_some());
            assert_eq!(compiled.fallbacks.len(), 3);
        }
        Ok(())
    }

    #[test]
    fn main_pattern_splits_numeric_date() -> TestResult {
        let compiled = PatternFamily::date()?.compile(&LocaleBundle::italian())?;
        assert_eq!(
            captures(&compiled, "16/12/1980"),
            pairs(&[("day", "16"), ("month", "12"), ("year", "1980")])
        );
        Ok(())
    }

    #[test]
    fn main_pattern_reads_month_names() -> TestResult {
        let compiled = PatternFamily::date()?.compile(&LocaleBundle::italian())?;
        assert_eq!(
            captures(&compiled, "dicembre 80"),
            pairs(&[("month", "dicembre"), ("year", "80")])
        );
        assert_eq!(
            captures(&compiled, "31 dic. 99"),
            pairs(&[("day", "31"), ("month", "dic"), ("year", "99")])
        );
        Ok(())
    }

    #[test]
    fn bare_number_lands_in_day_slot() -> TestResult {
        let compiled = PatternFamily::date()?.compile(&LocaleBundle::english())?;
        assert_eq!(captures(&compiled, "04"), pairs(&[("day", "04")]));
        assert_eq!(captures(&compiled, "1980"), pairs(&[("year", "1980")]));
        Ok(())
    }

    #[test]
    fn main_pattern_is_digit_guarded() -> TestResult {
        let compiled = PatternFamily::date()?.compile(&LocaleBundle::english())?;
        let main = compiled.main.as_ref().ok_or("no main pattern")?;
        assert_eq!(main.guard, Guard::RequiresDigit);
        assert!(!main.guard.admits("April"));
        Ok(())
    }

    #[test]
    fn fallback_recognizes_standalone_month() -> TestResult {
        let compiled = PatternFamily::date()?.compile(&LocaleBundle::english())?;
        let month = compiled
            .fallback_for(&keys::MONTH.into())
            .ok_or("no month fallback")?;
        assert_eq!(month.capture_fallback("April"), Some("April"));
        assert_eq!(month.capture_fallback("16 April"), None);
        Ok(())
    }

    #[test]
    fn template_without_month_slot_is_rejected() -> TestResult {
        let template = PatternTemplate::parse(r"^(?P<month>0?[1-9]|1[0-2])$")?;
        assert!(template.require(Placeholder::MonthNames).is_err());
        Ok(())
    }

    #[test]
    fn phone_family_splits_components() -> TestResult {
        let compiled = PatternFamily::phone()?.compile(&LocaleBundle::english())?;
        assert_eq!(
            captures(&compiled, "+39 02 1234567"),
            pairs(&[("country_code", "39"), ("prefix", "02"), ("number", "1234567")])
        );
        Ok(())
    }

    #[test]
    fn generated_contracts_keep_placeholders_for_compile_time() -> TestResult {
        let contract = date_contract("Date of birth", "dob")?;
        let pattern = contract.pattern_strategy().ok_or("no pattern strategy")?;
        assert!(pattern.pattern_templates[&ContextMode::Main].contains("%MONTHS%"));
        assert_eq!(contract.sub_field_mapping.len(), 3);
        assert!(!contract.strategies[2].enabled());

        let phone = phone_contract("Phone", "phone")?;
        assert!(phone.is_mandatory(&keys::NUMBER.into()));
        Ok(())
    }
}
