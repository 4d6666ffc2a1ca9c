//! The extraction contract: a declarative description of how one field group
//! (a date, a phone number, ...) is pulled out of free text.
//!
//! A contract names its sub-fields by [`CanonicalKey`] (the semantic role,
//! independent of any schema's field id), says which pattern slot feeds each
//! sub-field ([`ContextMode`]), lists its strategies in escalation order and
//! optionally declares an [`AmbiguityPolicy`].
//!
//! Contracts are immutable once published. A new version replaces the old
//! one wholesale under the same `field_group_id`.
//!
//! ```json
//! {
//!   "fieldGroupName": "Date of birth",
//!   "fieldGroupId": "dob",
//!   "subFieldMapping": {
//!     "dob_day": { "canonicalKey": "day", "label": "Day", "contextMode": "day" }
//!   },
//!   "ambiguityPolicy": {
//!     "ambiguousValuePattern": "^(0?[1-9]|1[0-2])$",
//!     "rolesInConflict": ["day", "month"]
//!   },
//!   "strategies": [
//!     { "type": "pattern", "enabled": true, "priorityRank": 0, "patternTemplates": { "main": "..." } }
//!   ]
//! }
//! ```
//!
//! Deserialization also accepts the legacy map-keyed strategy shape; see
//! [`crate::legacy`].

use std::collections::BTreeSet;
use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::ConfigurationError;
use crate::legacy::ContractDocument;
use crate::strategy::{PatternStrategy, RuleCodeStrategy, Strategy};

/// Well-known canonical keys.
pub mod keys {
    pub const DAY: &str = "day";
    pub const MONTH: &str = "month";
    pub const YEAR: &str = "year";
    pub const COUNTRY_CODE: &str = "country_code";
    pub const PREFIX: &str = "prefix";
    pub const NUMBER: &str = "number";
}

/// The semantic name of a sub-field, e.g. "day".
///
/// Canonical keys double as regex capture-group names, so they should be
/// plain identifiers.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CanonicalKey(String);

impl CanonicalKey {
    pub fn new(key: impl Into<String>) -> Self {
        CanonicalKey(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for CanonicalKey {
    fn from(key: &str) -> Self {
        CanonicalKey::new(key)
    }
}

impl fmt::Display for CanonicalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Which pattern slot a template (or a sub-field) belongs to.
///
/// `"main"` is the multi-field pattern; any other name is a single-field
/// fallback slot. A sub-field whose context mode names a slot is fed by it;
/// a slot no sub-field names feeds the canonical key of the same name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ContextMode {
    Main,
    Field(CanonicalKey),
}

impl ContextMode {
    pub fn field(key: impl Into<String>) -> Self {
        ContextMode::Field(CanonicalKey::new(key))
    }
}

impl From<String> for ContextMode {
    fn from(value: String) -> Self {
        if value == "main" {
            ContextMode::Main
        } else {
            ContextMode::Field(CanonicalKey(value))
        }
    }
}

impl From<ContextMode> for String {
    fn from(mode: ContextMode) -> Self {
        mode.to_string()
    }
}

impl fmt::Display for ContextMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContextMode::Main => f.write_str("main"),
            ContextMode::Field(key) => write!(f, "{key}"),
        }
    }
}

/// One entry of the sub-field mapping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubField {
    pub canonical_key: CanonicalKey,
    #[serde(default)]
    pub label: String,
    pub context_mode: ContextMode,
    /// A mandatory field that fails validation fails the whole strategy.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub mandatory: bool,
}

/// Which roles may be confused with each other, and which raw values are
/// structurally valid for more than one of them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AmbiguityPolicy {
    /// Regex (template) matched against the raw captured value. When empty,
    /// the pattern strategy's `ambiguityPattern` is used instead.
    #[serde(default)]
    pub ambiguous_value_pattern: String,
    pub roles_in_conflict: BTreeSet<CanonicalKey>,
}

/// Inclusive bounds for one field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RangeRule {
    pub target_field: CanonicalKey,
    pub minimum: i64,
    pub maximum: i64,
}

impl RangeRule {
    pub fn new(target_field: impl Into<String>, minimum: i64, maximum: i64) -> Self {
        RangeRule {
            target_field: CanonicalKey::new(target_field),
            minimum,
            maximum,
        }
    }

    pub fn contains(&self, value: i64) -> bool {
        (self.minimum..=self.maximum).contains(&value)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "ContractDocument")]
pub struct Contract {
    pub field_group_name: String,
    pub field_group_id: String,
    pub sub_field_mapping: IndexMap<String, SubField>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ambiguity_policy: Option<AmbiguityPolicy>,
    pub strategies: Vec<Strategy>,
}

impl Contract {
    /// Parse either the ordered-list or the legacy map-keyed representation.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigurationError> {
        let document: ContractDocument = serde_json::from_str(json)?;
        Contract::try_from(document)
    }

    pub fn from_json_value(value: serde_json::Value) -> Result<Self, ConfigurationError> {
        let document: ContractDocument = serde_json::from_value(value)?;
        Contract::try_from(document)
    }

    /// The ordered-list representation.
    pub fn to_json_value(&self) -> Result<serde_json::Value, ConfigurationError> {
        Ok(serde_json::to_value(self)?)
    }

    /// Every strategy, enabled or not, by ascending priority rank. Ties keep
    /// list order.
    pub fn escalation_order(&self) -> Vec<&Strategy> {
        let mut ordered: Vec<&Strategy> = self.strategies.iter().collect();
        ordered.sort_by_key(|strategy| strategy.priority_rank());
        ordered
    }

    /// The first pattern strategy, which owns the contract's templates.
    pub fn pattern_strategy(&self) -> Option<&PatternStrategy> {
        self.strategies.iter().find_map(|strategy| match strategy {
            Strategy::Pattern(pattern) => Some(pattern),
            _ => None,
        })
    }

    /// The first rule-code strategy, whose range rules also validate
    /// pattern-stage results.
    pub fn rule_strategy(&self) -> Option<&RuleCodeStrategy> {
        self.strategies.iter().find_map(|strategy| match strategy {
            Strategy::RuleCode(rule) => Some(rule),
            _ => None,
        })
    }

    pub fn sub_field(&self, key: &CanonicalKey) -> Option<&SubField> {
        self.sub_field_mapping
            .values()
            .find(|sub_field| &sub_field.canonical_key == key)
    }

    pub fn is_mandatory(&self, key: &CanonicalKey) -> bool {
        self.sub_field(key).is_some_and(|sub_field| sub_field.mandatory)
    }

    pub fn canonical_keys(&self) -> impl Iterator<Item = &CanonicalKey> {
        self.sub_field_mapping
            .values()
            .map(|sub_field| &sub_field.canonical_key)
    }
}

/// Builder for constructing contracts in code.
pub struct ContractBuilder {
    field_group_name: String,
    field_group_id: String,
    sub_field_mapping: IndexMap<String, SubField>,
    ambiguity_policy: Option<AmbiguityPolicy>,
    strategies: Vec<Strategy>,
}

impl ContractBuilder {
    pub fn new(field_group_name: impl Into<String>, field_group_id: impl Into<String>) -> Self {
        ContractBuilder {
            field_group_name: field_group_name.into(),
            field_group_id: field_group_id.into(),
            sub_field_mapping: IndexMap::new(),
            ambiguity_policy: None,
            strategies: Vec::new(),
        }
    }

    /// Map a sub-field id to a canonical key fed by the key's own fallback
    /// slot.
    pub fn sub_field(
        mut self,
        sub_field_id: impl Into<String>,
        canonical_key: impl Into<String>,
        label: impl Into<String>,
    ) -> Self {
        let key = CanonicalKey::new(canonical_key);
        self.sub_field_mapping.insert(
            sub_field_id.into(),
            SubField {
                context_mode: ContextMode::Field(key.clone()),
                canonical_key: key,
                label: label.into(),
                mandatory: false,
            },
        );
        self
    }

    /// Feed the most recently added sub-field from the fallback slot `slot`.
    pub fn context_mode(mut self, slot: impl Into<String>) -> Self {
        if let Some((_, sub_field)) = self.sub_field_mapping.last_mut() {
            sub_field.context_mode = ContextMode::from(slot.into());
        }
        self
    }

    /// Mark the most recently added sub-field as mandatory.
    pub fn mandatory(mut self) -> Self {
        if let Some((_, sub_field)) = self.sub_field_mapping.last_mut() {
            sub_field.mandatory = true;
        }
        self
    }

    pub fn ambiguity(
        mut self,
        ambiguous_value_pattern: impl Into<String>,
        roles_in_conflict: &[&str],
    ) -> Self {
        self.ambiguity_policy = Some(AmbiguityPolicy {
            ambiguous_value_pattern: ambiguous_value_pattern.into(),
            roles_in_conflict: roles_in_conflict.iter().map(|r| CanonicalKey::from(*r)).collect(),
        });
        self
    }

    /// Append a strategy. Its rank is kept as given.
    pub fn strategy(mut self, strategy: impl Into<Strategy>) -> Self {
        self.strategies.push(strategy.into());
        self
    }

    pub fn build(self) -> Contract {
        Contract {
            field_group_name: self.field_group_name,
            field_group_id: self.field_group_id,
            sub_field_mapping: self.sub_field_mapping,
            ambiguity_policy: self.ambiguity_policy,
            strategies: self.strategies,
        }
    }
}
