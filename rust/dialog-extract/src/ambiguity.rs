//! Role ambiguity.
//!
//! A bare "04" is a valid day and a valid month. When the main pattern puts
//! such a value in one slot and every other conflicting role it captured is
//! just as interchangeable ("04/05/1980"), the slot is flagged so the dialog
//! can ask. "16/12/1980" is not flagged: 16 cannot be a month, so the roles
//! cannot be swapped. The flag is withdrawn when the captured role's own
//! fallback pattern is the only one that recognizes the same value. A value
//! is never moved to another role here.

use std::collections::{BTreeMap, BTreeSet};

use regex::Regex;

use crate::capture::{CaptureSource, RawCapture};
use crate::contract::CanonicalKey;
use crate::family::CompiledFamily;

#[derive(Debug, Clone)]
pub struct CompiledPolicy {
    value_pattern: Regex,
    roles: BTreeSet<CanonicalKey>,
}

impl CompiledPolicy {
    pub fn new(value_pattern: Regex, roles: BTreeSet<CanonicalKey>) -> Self {
        CompiledPolicy {
            value_pattern,
            roles,
        }
    }

    pub fn roles(&self) -> &BTreeSet<CanonicalKey> {
        &self.roles
    }

    /// Whether a raw value is structurally valid for more than one role.
    pub fn is_ambiguous_value(&self, raw: &str) -> bool {
        self.value_pattern.is_match(raw.trim())
    }

    /// The accepted fields that stay ambiguous.
    pub fn resolve(
        &self,
        fields: &BTreeMap<CanonicalKey, RawCapture>,
        utterance: &str,
        family: &CompiledFamily,
    ) -> BTreeSet<CanonicalKey> {
        let mut ambiguous = BTreeSet::new();

        for (key, capture) in fields {
            if capture.source != CaptureSource::Main || !self.roles.contains(key) {
                continue;
            }
            let raw = capture.raw.trim();
            if !self.is_ambiguous_value(raw) {
                continue;
            }
            let swappable = self
                .roles
                .iter()
                .filter(|role| *role != key)
                .filter_map(|role| fields.get(role))
                .all(|other| self.is_ambiguous_value(&other.raw));
            if !swappable {
                continue;
            }

            let witnesses: Vec<&CanonicalKey> = self
                .roles
                .iter()
                .filter(|role| {
                    family
                        .fallback_for(role)
                        .and_then(|pattern| pattern.capture_fallback(utterance))
                        .is_some_and(|text| text.eq_ignore_ascii_case(raw))
                })
                .collect();

            if witnesses == [key] {
                tracing::trace!(field = %key, "ambiguity settled by own fallback");
                continue;
            }
            tracing::debug!(field = %key, value = raw, "ambiguous field");
            ambiguous.insert(key.clone());
        }
        ambiguous
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::{ContextMode, keys};
    use crate::family::{CompiledPattern, PatternFamily};
    use crate::locale::LocaleBundle;
    use crate::template::Guard;
    use testresult::TestResult;

    fn policy() -> Result<CompiledPolicy, regex::Error> {
        Ok(CompiledPolicy::new(
            Regex::new(r"^(?:0?[1-9]|1[0-2])$")?,
            [keys::DAY, keys::MONTH].into_iter().map(CanonicalKey::from).collect(),
        ))
    }

    fn main_capture(pairs: &[(&str, &str)]) -> BTreeMap<CanonicalKey, RawCapture> {
        pairs
            .iter()
            .map(|(key, raw)| (CanonicalKey::from(*key), RawCapture::new(*raw, CaptureSource::Main)))
            .collect()
    }

    fn fallback(key: &str, pattern: &str) -> Result<CompiledPattern, regex::Error> {
        Ok(CompiledPattern {
            context: ContextMode::field(key),
            key: Some(CanonicalKey::from(key)),
            regex: Regex::new(pattern)?,
            guard: Guard::None,
        })
    }

    #[test]
    fn complete_date_is_not_ambiguous() -> TestResult {
        let family = PatternFamily::date()?.compile(&LocaleBundle::english())?;
        let fields = main_capture(&[("day", "16"), ("month", "12"), ("year", "1980")]);
        assert!(policy()?.resolve(&fields, "16/12/1980", &family).is_empty());
        Ok(())
    }

    #[test]
    fn interchangeable_day_and_month_are_both_flagged() -> TestResult {
        let family = PatternFamily::date()?.compile(&LocaleBundle::english())?;
        let fields = main_capture(&[("day", "04"), ("month", "05"), ("year", "1980")]);
        assert_eq!(
            policy()?.resolve(&fields, "04/05/1980", &family),
            BTreeSet::from([CanonicalKey::from(keys::DAY), CanonicalKey::from(keys::MONTH)])
        );
        Ok(())
    }

    #[test]
    fn month_name_pins_the_numeric_day() -> TestResult {
        let family = PatternFamily::date()?.compile(&LocaleBundle::english())?;
        let fields = main_capture(&[("day", "4"), ("month", "April")]);
        assert!(policy()?.resolve(&fields, "4 April", &family).is_empty());
        Ok(())
    }

    #[test]
    fn bare_number_stays_ambiguous_when_both_fallbacks_agree() -> TestResult {
        let family = PatternFamily::date()?.compile(&LocaleBundle::english())?;
        let fields = main_capture(&[("day", "04")]);
        assert_eq!(
            policy()?.resolve(&fields, "04", &family),
            BTreeSet::from([CanonicalKey::from(keys::DAY)])
        );
        Ok(())
    }

    #[test]
    fn ordinal_suffix_settles_day() -> TestResult {
        let family = PatternFamily::date()?.compile(&LocaleBundle::english())?;
        let fields = main_capture(&[("day", "4")]);
        assert!(policy()?.resolve(&fields, "4th", &family).is_empty());
        Ok(())
    }

    #[test]
    fn evidence_for_another_role_keeps_the_flag() -> TestResult {
        let family = CompiledFamily {
            main: None,
            fallbacks: vec![
                fallback("day", r"^(?P<day>\d{1,2})(?:st|nd|rd|th)$")?,
                fallback("month", r"^(?P<month>\d{1,2})\.$")?,
            ],
        };
        let fields = main_capture(&[("day", "04")]);
        assert_eq!(
            policy()?.resolve(&fields, "04.", &family),
            BTreeSet::from([CanonicalKey::from(keys::DAY)])
        );
        Ok(())
    }

    #[test]
    fn fallback_captures_are_never_ambiguous() -> TestResult {
        let family = PatternFamily::date()?.compile(&LocaleBundle::english())?;
        let fields: BTreeMap<_, _> = [(
            CanonicalKey::from(keys::MONTH),
            RawCapture::new("4", CaptureSource::Fallback),
        )]
        .into();
        assert!(policy()?.resolve(&fields, "4", &family).is_empty());
        Ok(())
    }
}
