//! Collaborators behind the delegated strategies.
//!
//! Entity recognition and language-model extraction are performed by
//! services outside this crate. The executor only sees the
//! [`StrategyService`] trait: it hands over the utterance plus what the
//! strategy asks for, bounds the call with a timeout, and treats anything
//! other than a confident answer as a reason to escalate.

use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::contract::CanonicalKey;
use crate::error::ServiceError;
use crate::score::Confidence;
use crate::strategy::StrategyKind;

/// What a delegated strategy asks its service for.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceRequest<'a> {
    pub kind: StrategyKind,
    pub field_group_id: &'a str,
    /// The keys the answer may fill.
    pub canonical_keys: Vec<&'a CanonicalKey>,
    /// Entity kinds accepted by an entity-recognition strategy.
    pub accepted_entity_kinds: &'a [String],
    /// Instruction for a language-model strategy.
    pub instruction_text: Option<&'a str>,
    /// JSON shape the language model must answer with.
    pub response_shape: Option<&'a serde_json::Value>,
}

/// Raw values per canonical key, plus the service's own confidence. Values
/// go through the same normalization and validation as pattern captures.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ServiceResponse {
    pub values: BTreeMap<CanonicalKey, String>,
    pub confidence: Confidence,
}

impl ServiceResponse {
    pub fn new(confidence: f64) -> Self {
        ServiceResponse {
            values: BTreeMap::new(),
            confidence: Confidence::new(confidence),
        }
    }

    pub fn value(mut self, key: impl Into<String>, raw: impl Into<String>) -> Self {
        self.values.insert(CanonicalKey::new(key), raw.into());
        self
    }
}

#[async_trait]
pub trait StrategyService: Send + Sync {
    async fn invoke(
        &self,
        utterance: &str,
        request: ServiceRequest<'_>,
    ) -> Result<ServiceResponse, ServiceError>;
}
