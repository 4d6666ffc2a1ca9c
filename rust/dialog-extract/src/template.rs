//! Pattern templates and their locale-aware compilation.
//!
//! A template is regex text with named placeholder slots written as
//! `%NAME%`. Parsing splits the text into literal and [`Placeholder`]
//! segments, so an unknown slot is rejected up front and an unresolved slot
//! can never reach a compiled pattern. Resolution replaces each slot with an
//! alternation built from a [`LocaleBundle`]:
//!
//! ```text
//! (?P<month>%MONTHS%)   --it-->   (?P<month>settembre|dicembre|...|sett|dic|set|...)
//! ```
//!
//! Alternations are longest-token-first, so an abbreviation never shadows a
//! longer spelling that shares its prefix ("sett" is tried before "set").
//! Compilation is a pure function of (template, bundle) and happens once,
//! when a contract is loaded.

use std::fmt;

use regex::{Regex, RegexBuilder};

use crate::error::ConfigurationError;
use crate::locale::LocaleBundle;

/// A named slot that must be filled from a locale bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Placeholder {
    /// Every month spelling of the locale.
    MonthNames,
    /// Separator words/symbols between date parts.
    Separators,
}

impl Placeholder {
    pub const ALL: [Placeholder; 2] = [Placeholder::MonthNames, Placeholder::Separators];

    pub fn name(&self) -> &'static str {
        match self {
            Placeholder::MonthNames => "MONTHS",
            Placeholder::Separators => "SEP",
        }
    }

    /// The literal token as it appears in template text.
    pub fn token(&self) -> String {
        format!("%{}%", self.name())
    }

    fn from_name(name: &str) -> Option<Self> {
        Placeholder::ALL.into_iter().find(|p| p.name() == name)
    }

    fn render(&self, locale: &LocaleBundle) -> Result<String, ConfigurationError> {
        let rendered = match self {
            Placeholder::MonthNames => alternation(locale.month_tokens(), false),
            Placeholder::Separators => alternation(
                locale.separators.iter().map(|s| s.trim().to_lowercase()),
                true,
            ),
        };
        rendered.ok_or(ConfigurationError::UnresolvedPlaceholder {
            locale: locale.code.clone(),
            placeholder: self.name(),
        })
    }
}

impl fmt::Display for Placeholder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%{}%", self.name())
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Literal(String),
    Slot(Placeholder),
}

/// A parsed pattern template.
#[derive(Debug, Clone, PartialEq)]
pub struct PatternTemplate {
    source: String,
    segments: Vec<Segment>,
}

impl PatternTemplate {
    /// Split `source` into literal text and placeholder slots.
    ///
    /// A `%` only opens a slot when it is followed by one or more uppercase
    /// letters/underscores and a closing `%`; anything else is literal.
    pub fn parse(source: &str) -> Result<Self, ConfigurationError> {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut rest = source;

        while let Some(start) = rest.find('%') {
            literal.push_str(&rest[..start]);
            let after = &rest[start + 1..];
            let slot = after.find('%').map(|end| &after[..end]).filter(|name| {
                !name.is_empty() && name.chars().all(|c| c.is_ascii_uppercase() || c == '_')
            });

            match slot {
                Some(name) => {
                    let placeholder = Placeholder::from_name(name).ok_or_else(|| {
                        ConfigurationError::UnknownPlaceholder {
                            template: source.to_string(),
                            name: name.to_string(),
                        }
                    })?;
                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    segments.push(Segment::Slot(placeholder));
                    rest = &after[name.len() + 1..];
                }
                None => {
                    literal.push('%');
                    rest = after;
                }
            }
        }
        literal.push_str(rest);
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        Ok(PatternTemplate {
            source: source.to_string(),
            segments,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn placeholders(&self) -> impl Iterator<Item = Placeholder> + '_ {
        self.segments.iter().filter_map(|segment| match segment {
            Segment::Slot(placeholder) => Some(*placeholder),
            Segment::Literal(_) => None,
        })
    }

    /// Names of the capture groups declared in the template's literal text.
    pub fn group_names(&self) -> impl Iterator<Item = &str> + '_ {
        self.segments
            .iter()
            .filter_map(|segment| match segment {
                Segment::Literal(text) => Some(text.as_str()),
                Segment::Slot(_) => None,
            })
            .flat_map(|text| {
                text.match_indices("(?P<")
                    .chain(text.match_indices("(?<"))
                    .filter_map(move |(at, open)| {
                        let rest = &text[at + open.len()..];
                        rest.find('>').map(|end| &rest[..end])
                    })
            })
            .filter(|name| {
                !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
            })
    }

    pub fn contains(&self, placeholder: Placeholder) -> bool {
        self.placeholders().any(|p| p == placeholder)
    }

    /// Fail loudly when a template that must be locale-parameterized lacks
    /// its slot.
    pub fn require(&self, placeholder: Placeholder) -> Result<(), ConfigurationError> {
        if self.contains(placeholder) {
            Ok(())
        } else {
            Err(ConfigurationError::MissingPlaceholder {
                template: self.source.clone(),
                placeholder: placeholder.name(),
            })
        }
    }

    /// Substitute every slot with the locale's alternation.
    pub fn resolve(&self, locale: &LocaleBundle) -> Result<String, ConfigurationError> {
        let mut resolved = String::with_capacity(self.source.len());
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => resolved.push_str(text),
                Segment::Slot(placeholder) => {
                    resolved.push_str(&placeholder.render(locale)?);
                }
            }
        }
        Ok(resolved)
    }

    /// Resolve and compile into a case-insensitive regex. `context` only
    /// labels the error.
    pub fn compile(&self, locale: &LocaleBundle, context: &str) -> Result<Regex, ConfigurationError> {
        let resolved = self.resolve(locale)?;
        RegexBuilder::new(&resolved)
            .case_insensitive(true)
            .build()
            .map_err(|error| ConfigurationError::InvalidPattern {
                context: context.to_string(),
                message: error.to_string(),
            })
    }
}

/// A precondition checked before a pattern runs.
///
/// Stands in for look-ahead assertions, which the `regex` engine does not
/// support.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Guard {
    #[default]
    None,
    /// The input must contain at least one ASCII digit.
    RequiresDigit,
}

impl Guard {
    pub fn admits(&self, text: &str) -> bool {
        match self {
            Guard::None => true,
            Guard::RequiresDigit => text.chars().any(|c| c.is_ascii_digit()),
        }
    }
}

/// Build a non-capturing alternation, longest token first.
///
/// Returns `None` when there is nothing to alternate. With `word_bounded`,
/// alphabetic tokens are wrapped in `\b` so a separator word cannot eat the
/// start of a longer word.
pub fn alternation(tokens: impl IntoIterator<Item = String>, word_bounded: bool) -> Option<String> {
    let mut tokens: Vec<String> = tokens.into_iter().filter(|t| !t.is_empty()).collect();
    tokens.sort_by(|a, b| {
        b.chars()
            .count()
            .cmp(&a.chars().count())
            .then_with(|| a.cmp(b))
    });
    tokens.dedup();
    if tokens.is_empty() {
        return None;
    }

    let branches: Vec<String> = tokens
        .iter()
        .map(|token| {
            let escaped = regex::escape(token);
            if word_bounded && token.chars().all(char::is_alphabetic) {
                format!(r"\b{escaped}\b")
            } else {
                escaped
            }
        })
        .collect();
    Some(format!("(?:{})", branches.join("|")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use testresult::TestResult;

    #[test]
    fn parses_literals_and_slots() -> TestResult {
        let template = PatternTemplate::parse(r"^(?P<month>%MONTHS%)\s*%SEP%?$")?;
        assert_eq!(
            template.placeholders().collect::<Vec<_>>(),
            vec![Placeholder::MonthNames, Placeholder::Separators]
        );
        Ok(())
    }

    #[test]
    fn stray_percent_is_literal() -> TestResult {
        let template = PatternTemplate::parse(r"^\d+%$")?;
        assert_eq!(template.placeholders().count(), 0);
        assert_eq!(template.resolve(&LocaleBundle::english())?, r"^\d+%$");
        Ok(())
    }

    #[test]
    fn unknown_slot_is_rejected() {
        let result = PatternTemplate::parse(r"^%WEEKDAYS%$");
        assert!(matches!(
            result,
            Err(ConfigurationError::UnknownPlaceholder { ref name, .. }) if name == "WEEKDAYS"
        ));
    }

    #[test]
    fn missing_required_slot_fails_loudly() -> TestResult {
        let template = PatternTemplate::parse(r"^(?P<month>0?[1-9]|1[0-2])$")?;
        assert!(matches!(
            template.require(Placeholder::MonthNames),
            Err(ConfigurationError::MissingPlaceholder { placeholder: "MONTHS", .. })
        ));
        Ok(())
    }

    #[test]
    fn group_names_come_from_literal_text() -> TestResult {
        let template =
            PatternTemplate::parse(r"^(?P<day>\d{1,2})?(?:%SEP%)*(?<month>%MONTHS%)(?:\s+\d+)?$")?;
        assert_eq!(template.group_names().collect::<Vec<_>>(), vec!["day", "month"]);
        Ok(())
    }

    #[test]
    fn alternation_is_longest_first() {
        let rendered = alternation(
            ["set", "settembre", "sett"].map(String::from),
            false,
        );
        assert_eq!(rendered.as_deref(), Some("(?:settembre|sett|set)"));
    }

    #[test]
    fn separator_words_are_word_bounded() {
        let rendered = alternation(["di", "/"].map(String::from), true);
        assert_eq!(rendered.as_deref(), Some(r"(?:\bdi\b|/)"));
    }

    #[test]
    fn empty_locale_tokens_do_not_resolve() -> TestResult {
        let mut locale = LocaleBundle::english();
        locale.separators.clear();
        let template = PatternTemplate::parse(r"^%SEP%$")?;
        assert!(matches!(
            template.resolve(&locale),
            Err(ConfigurationError::UnresolvedPlaceholder { placeholder: "SEP", .. })
        ));
        Ok(())
    }

    #[test]
    fn compiled_pattern_prefers_full_abbreviation() -> TestResult {
        let template = PatternTemplate::parse(r"^(?P<month>%MONTHS%)")?;
        let regex = template.compile(&LocaleBundle::italian(), "month")?;
        let captures = regex.captures("Sett. 1980").ok_or("no match")?;
        assert_eq!(&captures["month"], "Sett");
        Ok(())
    }

    #[test]
    fn invalid_regex_reports_context() -> TestResult {
        let template = PatternTemplate::parse(r"^(?P<day>\d+$")?;
        assert!(matches!(
            template.compile(&LocaleBundle::english(), "day"),
            Err(ConfigurationError::InvalidPattern { ref context, .. }) if context == "day"
        ));
        Ok(())
    }

    #[test]
    fn digit_guard() {
        assert!(Guard::RequiresDigit.admits("dicembre 80"));
        assert!(!Guard::RequiresDigit.admits("April"));
        assert!(Guard::None.admits("April"));
    }
}
