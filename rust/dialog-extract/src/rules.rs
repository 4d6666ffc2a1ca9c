//! Classification rules: the shape a rule source delivers and its compiled
//! form.
//!
//! A rule source answers, per language code, with one list of patterns per
//! category. The generic-problem category holds at most one pattern, and
//! when it is absent that category never matches:
//!
//! ```json
//! {
//!   "EN": {
//!     "requestData": ["\\b(ask|request)\\b"],
//!     "genericProblem": "\\bdescribe\\b.*\\bproblem\\b",
//!     "message": ["\\b(say|tell)\\b"]
//!   }
//! }
//! ```
//!
//! Patterns are case-insensitive. A [`RuleBook`] is compiled from a whole
//! rule set at once and never changes afterwards.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

use crate::category::{Category, LanguageCode};
use crate::error::CacheLoadError;

/// Uncompiled rules for one language.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LanguageRules {
    pub request_data: Vec<String>,
    pub confirmation: Vec<String>,
    pub summary: Vec<String>,
    pub problem_classification: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generic_problem: Option<String>,
    pub message: Vec<String>,
}

impl LanguageRules {
    /// The non-blank patterns for `category`.
    pub fn patterns(&self, category: Category) -> Vec<&str> {
        let patterns: Vec<&str> = match category {
            Category::RequestData => self.request_data.iter().map(String::as_str).collect(),
            Category::Confirmation => self.confirmation.iter().map(String::as_str).collect(),
            Category::Summary => self.summary.iter().map(String::as_str).collect(),
            Category::ProblemClassification => self
                .problem_classification
                .iter()
                .map(String::as_str)
                .collect(),
            Category::GenericProblem => self.generic_problem.as_deref().into_iter().collect(),
            Category::Message => self.message.iter().map(String::as_str).collect(),
            Category::Undetermined => Vec::new(),
        };
        patterns
            .into_iter()
            .filter(|pattern| !pattern.trim().is_empty())
            .collect()
    }
}

/// Everything a rule source delivers in one load.
pub type RuleSet = BTreeMap<LanguageCode, LanguageRules>;

#[derive(Debug, Clone)]
struct CompiledLanguage {
    groups: Vec<(Category, Vec<Regex>)>,
}

impl CompiledLanguage {
    fn compile(language: &LanguageCode, rules: &LanguageRules) -> Result<Self, CacheLoadError> {
        let groups = Category::PRIORITY
            .into_iter()
            .map(|category| {
                let patterns = rules
                    .patterns(category)
                    .into_iter()
                    .map(|pattern| {
                        RegexBuilder::new(pattern)
                            .case_insensitive(true)
                            .build()
                            .map_err(|error| CacheLoadError::InvalidRule {
                                language: language.to_string(),
                                category: category.to_string(),
                                message: error.to_string(),
                            })
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                Ok((category, patterns))
            })
            .collect::<Result<Vec<_>, CacheLoadError>>()?;
        Ok(CompiledLanguage { groups })
    }

    fn classify(&self, label: &str) -> Option<Category> {
        self.groups
            .iter()
            .find(|(_, patterns)| patterns.iter().any(|pattern| pattern.is_match(label)))
            .map(|(category, _)| *category)
    }
}

/// A compiled, immutable snapshot of every language's rules.
#[derive(Debug, Clone, Default)]
pub struct RuleBook {
    languages: HashMap<LanguageCode, CompiledLanguage>,
}

impl RuleBook {
    pub fn compile(rules: &RuleSet) -> Result<Self, CacheLoadError> {
        let languages = rules
            .iter()
            .map(|(language, rules)| {
                Ok((language.clone(), CompiledLanguage::compile(language, rules)?))
            })
            .collect::<Result<HashMap<_, _>, CacheLoadError>>()?;
        Ok(RuleBook { languages })
    }

    pub fn len(&self) -> usize {
        self.languages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.languages.is_empty()
    }

    pub fn contains(&self, language: &LanguageCode) -> bool {
        self.languages.contains_key(language)
    }

    /// The first category, in priority order, with a rule matching `label`.
    /// `None` when the language is unknown or nothing matches.
    pub fn classify_in(&self, language: &LanguageCode, label: &str) -> Option<Category> {
        self.languages.get(language)?.classify(label)
    }
}

/// Where classification rules come from.
#[async_trait]
pub trait RuleSource: Send + Sync {
    async fn load(&self) -> Result<RuleSet, CacheLoadError>;
}

/// A rule source holding its rules in memory.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StaticRuleSource {
    rules: RuleSet,
}

impl StaticRuleSource {
    pub fn new(rules: RuleSet) -> Self {
        StaticRuleSource { rules }
    }

    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        Ok(StaticRuleSource::new(serde_json::from_str(json)?))
    }

    /// English and Italian rules.
    pub fn builtin() -> Self {
        let mut rules = RuleSet::new();
        rules.insert(LanguageCode::english(), english_rules());
        rules.insert(LanguageCode::italian(), italian_rules());
        StaticRuleSource::new(rules)
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }
}

#[async_trait]
impl RuleSource for StaticRuleSource {
    async fn load(&self) -> Result<RuleSet, CacheLoadError> {
        Ok(self.rules.clone())
    }
}

fn strings(patterns: &[&str]) -> Vec<String> {
    patterns.iter().map(|p| p.to_string()).collect()
}

fn english_rules() -> LanguageRules {
    LanguageRules {
        request_data: strings(&[
            r"^\s*(?:ask|request|collect|gather|get|acquire)\s+(?:for\s+)?\S+",
            r"\b(?:enter|insert|provide|type)\s+(?:the\s+|your\s+|a\s+)?\w+",
        ]),
        confirmation: strings(&[
            r"\b(?:confirm|verify)\b",
            r"\bis\s+(?:this|that|it)\s+(?:correct|right)\b",
        ]),
        summary: strings(&[r"\b(?:summary|summari[sz]e|recap|review)\b"]),
        problem_classification: strings(&[
            r"\b(?:classify|categori[sz]e|identify)\b.*\b(?:problem|issue|fault)\b",
        ]),
        generic_problem: Some(r"\b(?:describe|explain|report)\b.*\b(?:problem|issue)\b".into()),
        message: strings(&[
            r"\b(?:say|tell|inform|notify|greet|thank|ask|message)\b",
        ]),
    }
}

fn italian_rules() -> LanguageRules {
    LanguageRules {
        request_data: strings(&[
            r"^\s*(?:chiedi|chiedere|richiedi|raccogli|acquisisci)\s+\S+",
            r"\b(?:inserisci|inserire|fornisci|digita)\s+\w+",
        ]),
        confirmation: strings(&[r"\b(?:conferma|confermare|verifica)\b", r"\bè\s+corretto\b"]),
        summary: strings(&[r"\b(?:riepilogo|riepiloga|riassumi|riassunto)\b"]),
        problem_classification: strings(&[
            r"\b(?:classifica|categorizza|identifica)\b.*\b(?:problema|guasto)\b",
        ]),
        generic_problem: Some(r"\b(?:descrivi|spiega|segnala)\b.*\b(?:problema|guasto)\b".into()),
        message: strings(&[
            r"\b(?:dire|comunica|informa|avvisa|saluta|ringrazia|chiedi|messaggio)\b",
        ]),
    }
}
