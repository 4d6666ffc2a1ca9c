//! Extraction strategies.
//!
//! A strategy is one way of getting field values out of an utterance. The set
//! is closed: adding a kind means touching every `match` on [`Strategy`],
//! which is what keeps the executor, the legacy converter and the compiler in
//! step. Each variant carries its own payload struct, and serde copies only
//! the fields that variant declares.
//!
//! Every payload carries `enabled` and `priorityRank`. Disabled strategies
//! are skipped by the executor but keep their rank, so re-enabling one puts
//! it back exactly where it was.

use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize};

use crate::contract::{ContextMode, RangeRule};
use crate::normalize::NormalizationLogic;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StrategyKind {
    #[serde(rename = "pattern")]
    Pattern,
    #[serde(rename = "rule")]
    RuleCode,
    #[serde(rename = "entity")]
    EntityRecognition,
    #[serde(rename = "languageModel")]
    LanguageModel,
}

impl StrategyKind {
    pub const ALL: [StrategyKind; 4] = [
        StrategyKind::Pattern,
        StrategyKind::RuleCode,
        StrategyKind::EntityRecognition,
        StrategyKind::LanguageModel,
    ];

    /// The `type` tag used in serialized contracts.
    pub fn tag(&self) -> &'static str {
        match self {
            StrategyKind::Pattern => "pattern",
            StrategyKind::RuleCode => "rule",
            StrategyKind::EntityRecognition => "entity",
            StrategyKind::LanguageModel => "languageModel",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        StrategyKind::ALL.into_iter().find(|kind| kind.tag() == tag)
    }

    /// Whether this kind is delegated to an external collaborator.
    pub fn is_delegated(&self) -> bool {
        matches!(
            self,
            StrategyKind::EntityRecognition | StrategyKind::LanguageModel
        )
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Strategy {
    #[serde(rename = "pattern")]
    Pattern(PatternStrategy),
    #[serde(rename = "rule")]
    RuleCode(RuleCodeStrategy),
    #[serde(rename = "entity")]
    EntityRecognition(EntityStrategy),
    #[serde(rename = "languageModel")]
    LanguageModel(LanguageModelStrategy),
}

impl Strategy {
    pub fn kind(&self) -> StrategyKind {
        match self {
            Strategy::Pattern(_) => StrategyKind::Pattern,
            Strategy::RuleCode(_) => StrategyKind::RuleCode,
            Strategy::EntityRecognition(_) => StrategyKind::EntityRecognition,
            Strategy::LanguageModel(_) => StrategyKind::LanguageModel,
        }
    }

    pub fn enabled(&self) -> bool {
        match self {
            Strategy::Pattern(s) => s.enabled,
            Strategy::RuleCode(s) => s.enabled,
            Strategy::EntityRecognition(s) => s.enabled,
            Strategy::LanguageModel(s) => s.enabled,
        }
    }

    pub fn priority_rank(&self) -> i32 {
        match self {
            Strategy::Pattern(s) => s.priority_rank,
            Strategy::RuleCode(s) => s.priority_rank,
            Strategy::EntityRecognition(s) => s.priority_rank,
            Strategy::LanguageModel(s) => s.priority_rank,
        }
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        match self {
            Strategy::Pattern(s) => s.enabled = enabled,
            Strategy::RuleCode(s) => s.enabled = enabled,
            Strategy::EntityRecognition(s) => s.enabled = enabled,
            Strategy::LanguageModel(s) => s.enabled = enabled,
        }
    }

    pub fn set_priority_rank(&mut self, priority_rank: i32) {
        match self {
            Strategy::Pattern(s) => s.priority_rank = priority_rank,
            Strategy::RuleCode(s) => s.priority_rank = priority_rank,
            Strategy::EntityRecognition(s) => s.priority_rank = priority_rank,
            Strategy::LanguageModel(s) => s.priority_rank = priority_rank,
        }
    }
}

/// Regex templates keyed by context slot, plus the template that recognizes
/// role-ambiguous values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatternStrategy {
    #[serde(default = "enabled_by_default", deserialize_with = "enabled_unless_false")]
    pub enabled: bool,
    #[serde(default)]
    pub priority_rank: i32,
    pub pattern_templates: IndexMap<ContextMode, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ambiguity_pattern: Option<String>,
}

impl PatternStrategy {
    pub fn new(priority_rank: i32) -> Self {
        PatternStrategy {
            enabled: true,
            priority_rank,
            pattern_templates: IndexMap::new(),
            ambiguity_pattern: None,
        }
    }

    pub fn template(mut self, context: ContextMode, template: impl Into<String>) -> Self {
        self.pattern_templates.insert(context, template.into());
        self
    }

    pub fn ambiguity_pattern(mut self, template: impl Into<String>) -> Self {
        self.ambiguity_pattern = Some(template.into());
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

/// Declarative normalization applied to raw captured tokens, followed by
/// range validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleCodeStrategy {
    #[serde(default = "enabled_by_default", deserialize_with = "enabled_unless_false")]
    pub enabled: bool,
    #[serde(default)]
    pub priority_rank: i32,
    #[serde(default, skip_serializing_if = "NormalizationLogic::is_empty")]
    pub normalization_logic: NormalizationLogic,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub validation_rules: Vec<RangeRule>,
}

impl RuleCodeStrategy {
    pub fn new(priority_rank: i32) -> Self {
        RuleCodeStrategy {
            enabled: true,
            priority_rank,
            normalization_logic: NormalizationLogic::default(),
            validation_rules: Vec::new(),
        }
    }

    pub fn normalization(mut self, logic: NormalizationLogic) -> Self {
        self.normalization_logic = logic;
        self
    }

    pub fn rule(mut self, rule: RangeRule) -> Self {
        self.validation_rules.push(rule);
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

/// Delegates to a named-entity recognizer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityStrategy {
    #[serde(default = "enabled_by_default", deserialize_with = "enabled_unless_false")]
    pub enabled: bool,
    #[serde(default)]
    pub priority_rank: i32,
    pub accepted_entity_kinds: Vec<String>,
    pub min_confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

impl EntityStrategy {
    pub fn new<K: Into<String>>(
        priority_rank: i32,
        accepted_entity_kinds: impl IntoIterator<Item = K>,
        min_confidence: f64,
    ) -> Self {
        EntityStrategy {
            enabled: true,
            priority_rank,
            accepted_entity_kinds: accepted_entity_kinds.into_iter().map(Into::into).collect(),
            min_confidence,
            timeout_ms: None,
        }
    }

    pub fn timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

/// Delegates to a language model with an instruction and the JSON shape the
/// answer must follow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LanguageModelStrategy {
    #[serde(default = "enabled_by_default", deserialize_with = "enabled_unless_false")]
    pub enabled: bool,
    #[serde(default)]
    pub priority_rank: i32,
    pub instruction_text: String,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub response_shape: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_confidence: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

impl LanguageModelStrategy {
    pub fn new(priority_rank: i32, instruction_text: impl Into<String>) -> Self {
        LanguageModelStrategy {
            enabled: true,
            priority_rank,
            instruction_text: instruction_text.into(),
            response_shape: serde_json::Value::Null,
            min_confidence: None,
            timeout_ms: None,
        }
    }

    pub fn response_shape(mut self, shape: serde_json::Value) -> Self {
        self.response_shape = shape;
        self
    }

    pub fn min_confidence(mut self, min_confidence: f64) -> Self {
        self.min_confidence = Some(min_confidence);
        self
    }

    pub fn timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

impl From<PatternStrategy> for Strategy {
    fn from(strategy: PatternStrategy) -> Self {
        Strategy::Pattern(strategy)
    }
}

impl From<RuleCodeStrategy> for Strategy {
    fn from(strategy: RuleCodeStrategy) -> Self {
        Strategy::RuleCode(strategy)
    }
}

impl From<EntityStrategy> for Strategy {
    fn from(strategy: EntityStrategy) -> Self {
        Strategy::EntityRecognition(strategy)
    }
}

impl From<LanguageModelStrategy> for Strategy {
    fn from(strategy: LanguageModelStrategy) -> Self {
        Strategy::LanguageModel(strategy)
    }
}

fn enabled_by_default() -> bool {
    true
}

/// Anything but a literal `false` (including `null`) counts as enabled.
fn enabled_unless_false<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(value != serde_json::Value::Bool(false))
}
