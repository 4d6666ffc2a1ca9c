//! Raw tokens → typed, range-checked field values.
//!
//! Normalization never fails as a whole. Each field is converted on its own;
//! a field that cannot be parsed, looked up or range-checked is dropped and
//! reported as a [`FieldValidationError`], and the remaining fields are
//! returned. Whether a dropped field sinks the whole strategy (because the
//! contract marks it mandatory) is the executor's decision.

use std::collections::BTreeMap;
use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::contract::{CanonicalKey, RangeRule, keys};
use crate::error::FieldValidationError;
use crate::locale::MonthTable;

/// A normalized field value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Integer(i64),
    Text(String),
}

impl FieldValue {
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            FieldValue::Integer(value) => Some(*value),
            FieldValue::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(text) => Some(text),
            FieldValue::Integer(_) => None,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Integer(value) => write!(f, "{value}"),
            FieldValue::Text(text) => f.write_str(text),
        }
    }
}

/// How one raw token is turned into a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FieldNormalizer {
    /// Parse as a decimal integer.
    Integer,
    /// A month number, or a month name looked up in the locale table.
    MonthIndex,
    /// An integer year; two-digit years are windowed around the pivot.
    Year,
    /// Keep only the digits, as text (phone numbers keep leading zeros).
    Digits,
    /// Trimmed text.
    Text,
}

impl FieldNormalizer {
    /// The normalizer a canonical key gets when the contract does not name
    /// one.
    pub fn for_key(key: &CanonicalKey) -> Self {
        match key.as_str() {
            keys::DAY => FieldNormalizer::Integer,
            keys::MONTH => FieldNormalizer::MonthIndex,
            keys::YEAR => FieldNormalizer::Year,
            keys::COUNTRY_CODE | keys::PREFIX | keys::NUMBER => FieldNormalizer::Digits,
            _ => FieldNormalizer::Text,
        }
    }
}

/// The declarative part of a rule-code strategy.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizationLogic {
    /// Per-key overrides of [`FieldNormalizer::for_key`].
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub fields: IndexMap<CanonicalKey, FieldNormalizer>,
    /// Overrides the configured two-digit year pivot.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub two_digit_year_pivot: Option<u8>,
}

impl NormalizationLogic {
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.two_digit_year_pivot.is_none()
    }

    pub fn field(mut self, key: impl Into<String>, normalizer: FieldNormalizer) -> Self {
        self.fields.insert(CanonicalKey::new(key), normalizer);
        self
    }

    pub fn pivot(mut self, pivot: u8) -> Self {
        self.two_digit_year_pivot = Some(pivot);
        self
    }

    pub fn normalizer_for(&self, key: &CanonicalKey) -> FieldNormalizer {
        self.fields
            .get(key)
            .copied()
            .unwrap_or_else(|| FieldNormalizer::for_key(key))
    }
}

/// Map a two-digit year into a full year: below `pivot` → 20xx, at or above
/// → 19xx.
pub fn window_two_digit_year(year: i64, pivot: u8) -> i64 {
    if year < i64::from(pivot) {
        2000 + year
    } else {
        1900 + year
    }
}

/// Result of normalizing a set of raw captures.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Normalized {
    pub values: BTreeMap<CanonicalKey, FieldValue>,
    pub errors: Vec<FieldValidationError>,
}

impl Normalized {
    pub fn failed(&self, key: &CanonicalKey) -> bool {
        self.errors.iter().any(|error| error.key() == key)
    }
}

/// Applies normalization logic and range rules.
#[derive(Debug, Clone, Copy)]
pub struct Normalizer<'a> {
    logic: &'a NormalizationLogic,
    rules: &'a [RangeRule],
    months: &'a MonthTable,
    pivot: u8,
}

impl<'a> Normalizer<'a> {
    /// `default_pivot` applies when `logic` does not set its own.
    pub fn new(
        logic: &'a NormalizationLogic,
        rules: &'a [RangeRule],
        months: &'a MonthTable,
        default_pivot: u8,
    ) -> Self {
        Normalizer {
            logic,
            rules,
            months,
            pivot: logic.two_digit_year_pivot.unwrap_or(default_pivot),
        }
    }

    pub fn normalize<'r>(
        &self,
        raw_captures: impl IntoIterator<Item = (&'r CanonicalKey, &'r str)>,
    ) -> Normalized {
        let mut normalized = Normalized::default();
        for (key, raw) in raw_captures {
            match self.normalize_field(key, raw) {
                Ok(Some(value)) => {
                    normalized.values.insert(key.clone(), value);
                }
                Ok(None) => {}
                Err(error) => normalized.errors.push(error),
            }
        }
        normalized
    }

    fn normalize_field(
        &self,
        key: &CanonicalKey,
        raw: &str,
    ) -> Result<Option<FieldValue>, FieldValidationError> {
        let token = raw.trim();
        if token.is_empty() {
            return Ok(None);
        }

        let value = match self.logic.normalizer_for(key) {
            FieldNormalizer::Integer => FieldValue::Integer(parse_integer(key, token)?),
            FieldNormalizer::MonthIndex => match token.parse::<i64>() {
                Ok(month) => FieldValue::Integer(month),
                Err(_) => match self.months.lookup(token) {
                    Some(month) => FieldValue::Integer(i64::from(month)),
                    None => {
                        return Err(FieldValidationError::UnknownMonth {
                            key: key.clone(),
                            raw: raw.to_string(),
                        });
                    }
                },
            },
            FieldNormalizer::Year => {
                let year = parse_integer(key, token)?;
                if token.len() == 2 {
                    FieldValue::Integer(window_two_digit_year(year, self.pivot))
                } else {
                    FieldValue::Integer(year)
                }
            }
            FieldNormalizer::Digits => {
                let digits: String = token.chars().filter(char::is_ascii_digit).collect();
                if digits.is_empty() {
                    return Err(FieldValidationError::NotANumber {
                        key: key.clone(),
                        raw: raw.to_string(),
                    });
                }
                FieldValue::Text(digits)
            }
            FieldNormalizer::Text => FieldValue::Text(token.to_string()),
        };

        if let FieldValue::Integer(number) = value {
            self.check_range(key, number)?;
        }
        Ok(Some(value))
    }

    fn check_range(&self, key: &CanonicalKey, value: i64) -> Result<(), FieldValidationError> {
        match self
            .rules
            .iter()
            .find(|rule| &rule.target_field == key && !rule.contains(value))
        {
            Some(rule) => Err(FieldValidationError::OutOfRange {
                key: key.clone(),
                value,
                minimum: rule.minimum,
                maximum: rule.maximum,
            }),
            None => Ok(()),
        }
    }
}

fn parse_integer(key: &CanonicalKey, token: &str) -> Result<i64, FieldValidationError> {
    token
        .parse::<i64>()
        .map_err(|_| FieldValidationError::NotANumber {
            key: key.clone(),
            raw: token.to_string(),
        })
}
