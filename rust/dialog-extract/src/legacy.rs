//! The two serialized shapes of a contract.
//!
//! Current documents list strategies as an array of tagged objects, each
//! carrying its own `priorityRank`:
//!
//! ```json
//! "strategies": [{ "type": "pattern", "priorityRank": 0, ... }, ...]
//! ```
//!
//! Older documents key strategies by type and order them with a separate
//! `escalationOrder` list:
//!
//! ```json
//! "strategies": { "pattern": { ... }, "rule": { ... } },
//! "escalationOrder": ["pattern", "rule"]
//! ```
//!
//! Both deserialize into the same [`Contract`]. [`Contract::to_legacy_json`]
//! writes the keyed shape back out.

use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::contract::{AmbiguityPolicy, Contract, SubField};
use crate::error::ConfigurationError;
use crate::strategy::{Strategy, StrategyKind};

const TYPE_FIELD: &str = "type";
const RANK_FIELD: &str = "priorityRank";

/// A contract as found on the wire, before strategy normalization.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractDocument {
    pub field_group_name: String,
    pub field_group_id: String,
    pub sub_field_mapping: IndexMap<String, SubField>,
    #[serde(default)]
    pub ambiguity_policy: Option<AmbiguityPolicy>,
    pub strategies: StrategyList,
    #[serde(default)]
    pub escalation_order: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum StrategyList {
    Ordered(Vec<Value>),
    Keyed(IndexMap<String, Value>),
}

impl TryFrom<ContractDocument> for Contract {
    type Error = ConfigurationError;

    fn try_from(document: ContractDocument) -> Result<Self, Self::Error> {
        let strategies = match document.strategies {
            StrategyList::Ordered(entries) => ordered_strategies(entries)?,
            StrategyList::Keyed(entries) => keyed_strategies(
                &document.field_group_id,
                entries,
                &document.escalation_order,
            )?,
        };

        Ok(Contract {
            field_group_name: document.field_group_name,
            field_group_id: document.field_group_id,
            sub_field_mapping: document.sub_field_mapping,
            ambiguity_policy: document.ambiguity_policy,
            strategies,
        })
    }
}

/// Entries without a rank take their list position.
fn ordered_strategies(entries: Vec<Value>) -> Result<Vec<Strategy>, ConfigurationError> {
    entries
        .into_iter()
        .enumerate()
        .map(|(position, mut entry)| -> Result<Strategy, ConfigurationError> {
            let object = entry.as_object_mut().ok_or_else(|| {
                ConfigurationError::MalformedContract(format!(
                    "strategy #{position} is not an object"
                ))
            })?;
            object
                .entry(RANK_FIELD)
                .or_insert_with(|| Value::from(position));
            Ok(serde_json::from_value(entry)?)
        })
        .collect()
}

/// Ranks come from `escalation_order`; types missing from it follow in
/// document order.
fn keyed_strategies(
    field_group_id: &str,
    mut entries: IndexMap<String, Value>,
    escalation_order: &[String],
) -> Result<Vec<Strategy>, ConfigurationError> {
    let mut ordered = Vec::with_capacity(entries.len());
    for name in escalation_order {
        match entries.shift_remove(name) {
            Some(entry) => ordered.push((name.clone(), entry)),
            None => tracing::warn!(
                field_group_id,
                strategy = %name,
                "escalation order names a strategy the contract does not define"
            ),
        }
    }
    ordered.extend(entries);

    ordered
        .into_iter()
        .enumerate()
        .map(|(position, (name, mut entry))| -> Result<Strategy, ConfigurationError> {
            if StrategyKind::from_tag(&name).is_none() {
                return Err(ConfigurationError::MalformedContract(format!(
                    "unknown strategy type '{name}'"
                )));
            }
            let object = entry.as_object_mut().ok_or_else(|| {
                ConfigurationError::MalformedContract(format!("strategy '{name}' is not an object"))
            })?;
            object.insert(TYPE_FIELD.into(), Value::String(name));
            object.insert(RANK_FIELD.into(), Value::from(position));
            Ok(serde_json::from_value(entry)?)
        })
        .collect()
}

impl Contract {
    /// The keyed shape: one entry per strategy type plus `escalationOrder`.
    ///
    /// Fails when two strategies share a type, since the keyed shape cannot
    /// hold both.
    pub fn to_legacy_json(&self) -> Result<Value, ConfigurationError> {
        let mut strategies = Map::new();
        let mut escalation_order = Vec::with_capacity(self.strategies.len());

        for strategy in self.escalation_order() {
            let tag = strategy.kind().tag();
            if strategies.contains_key(tag) {
                return Err(ConfigurationError::DuplicateStrategyKind { kind: tag });
            }
            let mut entry = serde_json::to_value(strategy)?;
            if let Some(object) = entry.as_object_mut() {
                object.remove(TYPE_FIELD);
                object.remove(RANK_FIELD);
            }
            strategies.insert(tag.to_string(), entry);
            escalation_order.push(Value::from(tag));
        }

        let mut document = Map::new();
        document.insert("fieldGroupName".into(), Value::from(self.field_group_name.clone()));
        document.insert("fieldGroupId".into(), Value::from(self.field_group_id.clone()));
        document.insert(
            "subFieldMapping".into(),
            serde_json::to_value(&self.sub_field_mapping)?,
        );
        if let Some(policy) = &self.ambiguity_policy {
            document.insert("ambiguityPolicy".into(), serde_json::to_value(policy)?);
        }
        document.insert("strategies".into(), Value::Object(strategies));
        document.insert("escalationOrder".into(), Value::Array(escalation_order));
        Ok(Value::Object(document))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::{ContractBuilder, keys};
    use crate::strategy::{EntityStrategy, PatternStrategy, RuleCodeStrategy};
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use testresult::TestResult;

    fn kinds(contract: &Contract) -> Vec<StrategyKind> {
        contract
            .escalation_order()
            .into_iter()
            .map(Strategy::kind)
            .collect()
    }

    fn legacy_document() -> Value {
        json!({
            "fieldGroupName": "Date",
            "fieldGroupId": "date",
            "subFieldMapping": {
                "d": { "canonicalKey": "day", "contextMode": "day" }
            },
            "strategies": {
                "rule": { "validationRules": [] },
                "pattern": { "patternTemplates": { "day": "^(?P<day>\\d{1,2})$" } },
                "entity": { "acceptedEntityKinds": ["DATE"], "minConfidence": 0.8, "enabled": null }
            },
            "escalationOrder": ["pattern", "rule"]
        })
    }

    #[test]
    fn keyed_form_follows_escalation_order_then_document_order() -> TestResult {
        let contract = Contract::from_json_value(legacy_document())?;
        assert_eq!(
            kinds(&contract),
            vec![
                StrategyKind::Pattern,
                StrategyKind::RuleCode,
                StrategyKind::EntityRecognition
            ]
        );
        assert!(contract.strategies.iter().all(Strategy::enabled));
        Ok(())
    }

    #[test]
    fn unknown_escalation_entry_is_skipped() -> TestResult {
        let mut document = legacy_document();
        document["escalationOrder"] = json!(["languageModel", "rule"]);
        let contract = Contract::from_json_value(document)?;
        assert_eq!(kinds(&contract)[0], StrategyKind::RuleCode);
        Ok(())
    }

    #[test]
    fn unknown_strategy_type_is_rejected() {
        let mut document = legacy_document();
        document["strategies"]["telepathy"] = json!({});
        assert!(matches!(
            Contract::from_json_value(document),
            Err(ConfigurationError::MalformedContract(_))
        ));
    }

    #[test]
    fn ordered_form_defaults_rank_to_position() -> TestResult {
        let contract = Contract::from_json_value(json!({
            "fieldGroupName": "Date",
            "fieldGroupId": "date",
            "subFieldMapping": {},
            "strategies": [
                { "type": "rule" },
                { "type": "entity", "acceptedEntityKinds": [], "minConfidence": 0.5, "priorityRank": -1 }
            ]
        }))?;
        assert_eq!(contract.strategies[0].priority_rank(), 0);
        assert_eq!(
            kinds(&contract),
            vec![StrategyKind::EntityRecognition, StrategyKind::RuleCode]
        );
        Ok(())
    }

    #[test]
    fn legacy_round_trip_keeps_order_and_flags() -> TestResult {
        let original = ContractBuilder::new("Date", "date")
            .sub_field("d", keys::DAY, "Day")
            .strategy(RuleCodeStrategy::new(5))
            .strategy(PatternStrategy::new(1).disabled())
            .strategy(EntityStrategy::new(9, ["DATE"], 0.8))
            .build();

        let legacy = original.to_legacy_json()?;
        assert_eq!(legacy["escalationOrder"], json!(["pattern", "rule", "entity"]));
        assert!(legacy["strategies"]["pattern"].get("type").is_none());

        let restored = Contract::from_json_value(legacy)?;
        assert_eq!(kinds(&restored), kinds(&original));
        assert!(!restored.strategies[0].enabled());
        assert_eq!(restored.sub_field_mapping, original.sub_field_mapping);
        Ok(())
    }

    #[test]
    fn duplicate_kinds_cannot_be_keyed() {
        let contract = ContractBuilder::new("Date", "date")
            .strategy(RuleCodeStrategy::new(0))
            .strategy(RuleCodeStrategy::new(1))
            .build();
        assert_eq!(
            contract.to_legacy_json(),
            Err(ConfigurationError::DuplicateStrategyKind { kind: "rule" })
        );
    }
}
