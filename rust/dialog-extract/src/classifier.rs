//! The priority rule classifier.
//!
//! For each language in order, the label is tested against the category
//! groups from most to least specific, and the first match wins. When no
//! language and no category matches, the answer is
//! [`Category::Undetermined`], never a guess.

use std::sync::Arc;

use tracing::trace;

use crate::cache::RuleCache;
use crate::category::{Category, LanguageCode};
use crate::config::ClassifierConfig;
use crate::error::ClassifyError;

#[derive(Clone)]
pub struct Classifier {
    cache: Arc<RuleCache>,
    config: ClassifierConfig,
}

impl Classifier {
    pub fn new(cache: Arc<RuleCache>, config: ClassifierConfig) -> Self {
        Classifier { cache, config }
    }

    pub fn cache(&self) -> &Arc<RuleCache> {
        &self.cache
    }

    /// Classify with the configured language order.
    pub async fn classify_label(&self, label: &str) -> Result<Category, ClassifyError> {
        self.classify(label, &self.config.language_order).await
    }

    /// Waits for the rule cache when it is not loaded yet, and fails when
    /// the load fails.
    pub async fn classify(
        &self,
        label: &str,
        language_order: &[LanguageCode],
    ) -> Result<Category, ClassifyError> {
        let book = self.cache.ready().await?;
        for language in language_order {
            if !book.contains(language) {
                trace!(%language, "no rules for language");
                continue;
            }
            if let Some(category) = book.classify_in(language, label) {
                trace!(%language, %category, "label classified");
                return Ok(category);
            }
        }
        Ok(Category::Undetermined)
    }
}
