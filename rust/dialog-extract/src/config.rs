//! Runtime settings for the extractor and the classifier.
//!
//! Both structs deserialize from any serde format with every field
//! optional; omitted fields take the defaults below.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::category::LanguageCode;

/// Two-digit years below this value are read as 20xx, the rest as 19xx.
pub const DEFAULT_TWO_DIGIT_YEAR_PIVOT: u8 = 30;

pub const DEFAULT_SERVICE_TIMEOUT_MS: u64 = 3_000;

pub const DEFAULT_MIN_CONFIDENCE: f64 = 0.7;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExtractorConfig {
    /// Fallback pivot for two-digit year windowing, used when a contract's
    /// rule strategy does not set its own.
    pub two_digit_year_pivot: u8,
    /// Upper bound on a single entity-recognition or language-model call,
    /// unless the strategy declares its own timeout.
    pub service_timeout_ms: u64,
    /// Minimum confidence for language-model strategies that do not
    /// declare one.
    pub default_min_confidence: f64,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        ExtractorConfig {
            two_digit_year_pivot: DEFAULT_TWO_DIGIT_YEAR_PIVOT,
            service_timeout_ms: DEFAULT_SERVICE_TIMEOUT_MS,
            default_min_confidence: DEFAULT_MIN_CONFIDENCE,
        }
    }
}

impl ExtractorConfig {
    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn service_timeout(&self) -> Duration {
        Duration::from_millis(self.service_timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClassifierConfig {
    /// Languages tried in order when classifying a label.
    pub language_order: Vec<LanguageCode>,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        ClassifierConfig {
            language_order: vec![LanguageCode::new("EN")],
        }
    }
}

impl ClassifierConfig {
    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}
