//! Action categories and language codes for the rule classifier.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The action a short imperative label asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Category {
    /// Ask the user for a piece of data.
    RequestData,
    /// Ask the user to confirm something.
    Confirmation,
    /// Recap collected data.
    Summary,
    /// Classify the user's problem into a known type.
    ProblemClassification,
    /// Let the user describe a problem freely.
    GenericProblem,
    /// Tell the user something.
    Message,
    /// No rule matched in any language.
    Undetermined,
}

impl Category {
    /// Categories tested by the classifier, most specific first. `Undetermined`
    /// is never tested; it is the answer when nothing matches.
    pub const PRIORITY: [Category; 6] = [
        Category::RequestData,
        Category::Confirmation,
        Category::Summary,
        Category::ProblemClassification,
        Category::GenericProblem,
        Category::Message,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Category::RequestData => "requestData",
            Category::Confirmation => "confirmation",
            Category::Summary => "summary",
            Category::ProblemClassification => "problemClassification",
            Category::GenericProblem => "genericProblem",
            Category::Message => "message",
            Category::Undetermined => "undetermined",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// An uppercase language code such as `EN` or `IT`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct LanguageCode(String);

impl LanguageCode {
    pub fn new(code: impl AsRef<str>) -> Self {
        LanguageCode(code.as_ref().trim().to_uppercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn english() -> Self {
        LanguageCode::new("EN")
    }

    pub fn italian() -> Self {
        LanguageCode::new("IT")
    }
}

impl From<String> for LanguageCode {
    fn from(code: String) -> Self {
        LanguageCode::new(code)
    }
}

impl From<&str> for LanguageCode {
    fn from(code: &str) -> Self {
        LanguageCode::new(code)
    }
}

impl From<LanguageCode> for String {
    fn from(code: LanguageCode) -> Self {
        code.0
    }
}

impl fmt::Display for LanguageCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
