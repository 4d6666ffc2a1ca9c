//! Locale constants consumed by the pattern compiler and the normalizer.
//!
//! A [`LocaleBundle`] is read-only input: per-locale month names (full names
//! and abbreviations, indexed January = 1) and the separator words that may
//! sit between date parts. Bundles are normally supplied by an external
//! source as JSON:
//!
//! ```json
//! {
//!   "code": "it",
//!   "months": [["gennaio", "gen"], ["febbraio", "feb"], ...],
//!   "separators": ["/", "-", ".", "di", "del"]
//! }
//! ```
//!
//! Built-in English and Italian bundles are provided for tests and for the
//! generated date contract.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::ConfigurationError;

/// Characters stripped from the end of a month token before lookup
/// ("dic." and "Dec," both resolve to December).
const TRAILING_PUNCTUATION: &[char] = &['.', ',', ';', ':', '!', '?'];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocaleBundle {
    /// Locale code, e.g. "en" or "it".
    pub code: String,
    /// Exactly twelve entries; entry `i` holds every spelling of month `i + 1`.
    pub months: Vec<Vec<String>>,
    /// Words or symbols that may separate date parts.
    #[serde(default)]
    pub separators: Vec<String>,
}

impl LocaleBundle {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigurationError> {
        let bundle: LocaleBundle = serde_json::from_str(json)?;
        bundle.validate()?;
        Ok(bundle)
    }

    /// Check the shape of the bundle: twelve months, no empty month entry,
    /// no blank token.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        let invalid = |message: String| ConfigurationError::InvalidLocale {
            locale: self.code.clone(),
            message,
        };
        if self.months.len() != 12 {
            return Err(invalid(format!(
                "expected 12 months, found {}",
                self.months.len()
            )));
        }
        for (index, names) in self.months.iter().enumerate() {
            if names.is_empty() {
                return Err(invalid(format!("month {} has no names", index + 1)));
            }
            if names.iter().any(|name| name.trim().is_empty()) {
                return Err(invalid(format!("month {} has a blank name", index + 1)));
            }
        }
        if self.separators.iter().any(|s| s.trim().is_empty()) {
            return Err(invalid("blank separator".into()));
        }
        Ok(())
    }

    /// Every month spelling, lowercased, in bundle order.
    pub fn month_tokens(&self) -> impl Iterator<Item = String> + '_ {
        self.months
            .iter()
            .flatten()
            .map(|name| name.trim().to_lowercase())
    }

    pub fn month_table(&self) -> MonthTable {
        MonthTable::from_bundle(self)
    }

    pub fn english() -> Self {
        LocaleBundle {
            code: "en".into(),
            months: months(&[
                &["january", "jan"],
                &["february", "feb"],
                &["march", "mar"],
                &["april", "apr"],
                &["may"],
                &["june", "jun"],
                &["july", "jul"],
                &["august", "aug"],
                &["september", "sept", "sep"],
                &["october", "oct"],
                &["november", "nov"],
                &["december", "dec"],
            ]),
            separators: strings(&["/", "-", ".", ",", "of"]),
        }
    }

    pub fn italian() -> Self {
        LocaleBundle {
            code: "it".into(),
            months: months(&[
                &["gennaio", "gen"],
                &["febbraio", "feb"],
                &["marzo", "mar"],
                &["aprile", "apr"],
                &["maggio", "mag"],
                &["giugno", "giu"],
                &["luglio", "lug"],
                &["agosto", "ago"],
                &["settembre", "sett", "set"],
                &["ottobre", "ott"],
                &["novembre", "nov"],
                &["dicembre", "dic"],
            ]),
            separators: strings(&["/", "-", ".", ",", "di", "del"]),
        }
    }

    /// Union of several bundles under a new code. Earlier bundles win when
    /// two spell the same token for different months.
    pub fn merged(code: impl Into<String>, bundles: &[LocaleBundle]) -> Self {
        let mut months: Vec<Vec<String>> = vec![Vec::new(); 12];
        let mut separators: Vec<String> = Vec::new();
        for bundle in bundles {
            for (index, names) in bundle.months.iter().enumerate().take(12) {
                for name in names {
                    if !months[index].contains(name) {
                        months[index].push(name.clone());
                    }
                }
            }
            for separator in &bundle.separators {
                if !separators.contains(separator) {
                    separators.push(separator.clone());
                }
            }
        }
        LocaleBundle {
            code: code.into(),
            months,
            separators,
        }
    }
}

fn months(table: &[&[&str]]) -> Vec<Vec<String>> {
    table.iter().map(|names| strings(names)).collect()
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// Case-insensitive month name → month index (1..=12) lookup.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MonthTable {
    entries: HashMap<String, u8>,
}

impl MonthTable {
    pub fn from_bundle(bundle: &LocaleBundle) -> Self {
        let mut table = MonthTable::default();
        table.extend(bundle);
        table
    }

    /// Add a bundle's spellings. Tokens already present keep their index.
    pub fn extend(&mut self, bundle: &LocaleBundle) {
        for (index, names) in bundle.months.iter().enumerate().take(12) {
            for name in names {
                self.entries
                    .entry(name.trim().to_lowercase())
                    .or_insert(index as u8 + 1);
            }
        }
    }

    /// Resolve a raw month token, ignoring case, surrounding whitespace and
    /// trailing punctuation.
    pub fn lookup(&self, raw: &str) -> Option<u8> {
        let token = raw.trim().trim_end_matches(TRAILING_PUNCTUATION).trim();
        self.entries.get(&token.to_lowercase()).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use testresult::TestResult;

    #[test]
    fn builtin_bundles_are_valid() -> TestResult {
        LocaleBundle::english().validate()?;
        LocaleBundle::italian().validate()?;
        Ok(())
    }

    #[test]
    fn abbreviation_with_trailing_punctuation_resolves() {
        let table = LocaleBundle::italian().month_table();
        assert_eq!(table.lookup("dic."), Some(12));
        assert_eq!(table.lookup("Sett,"), Some(9));
        assert_eq!(table.lookup("  Gennaio "), Some(1));
    }

    #[test]
    fn unknown_token_is_absent() {
        let table = LocaleBundle::english().month_table();
        assert_eq!(table.lookup("smarch"), None);
        assert_eq!(table.lookup(""), None);
    }

    #[test]
    fn bundle_with_eleven_months_is_rejected() {
        let mut bundle = LocaleBundle::english();
        bundle.months.pop();
        assert!(matches!(
            bundle.validate(),
            Err(ConfigurationError::InvalidLocale { .. })
        ));
    }

    #[test]
    fn bundle_parses_from_json() -> TestResult {
        let json = serde_json::to_string(&LocaleBundle::italian())?;
        let bundle = LocaleBundle::from_json_str(&json)?;
        assert_eq!(bundle.code, "it");
        assert_eq!(bundle.month_table().lookup("agosto"), Some(8));
        Ok(())
    }

    #[test]
    fn merged_bundle_covers_both_languages() {
        let merged = LocaleBundle::merged(
            "en+it",
            &[LocaleBundle::english(), LocaleBundle::italian()],
        );
        let table = merged.month_table();
        assert_eq!(table.lookup("december"), Some(12));
        assert_eq!(table.lookup("dicembre"), Some(12));
        assert_eq!(table.lookup("mar"), Some(3));
    }
}
