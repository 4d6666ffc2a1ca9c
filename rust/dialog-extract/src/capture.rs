//! Raw text captured for each canonical key, with where it came from.

use std::collections::{BTreeMap, BTreeSet};

use crate::contract::CanonicalKey;
use crate::family::CompiledFamily;
use crate::strategy::StrategyKind;

/// Which recognizer produced a raw value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureSource {
    /// The multi-field main pattern. Only these values can be ambiguous.
    Main,
    /// A single-field fallback pattern.
    Fallback,
    /// An entity recognizer or language model.
    External(StrategyKind),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawCapture {
    pub raw: String,
    pub source: CaptureSource,
}

impl RawCapture {
    pub fn new(raw: impl Into<String>, source: CaptureSource) -> Self {
        RawCapture {
            raw: raw.into(),
            source,
        }
    }
}

pub type RawCaptures = BTreeMap<CanonicalKey, RawCapture>;

/// Run a compiled family over `utterance`.
///
/// The main pattern wins when its guard admits the input and it captures at
/// least one of `keys`. Otherwise every fallback runs and their captures are
/// merged, first fallback first. Blank captures and groups that are not in
/// `keys` are ignored.
pub fn capture(family: &CompiledFamily, keys: &BTreeSet<CanonicalKey>, utterance: &str) -> RawCaptures {
    let mut captured = RawCaptures::new();

    let main_match = family.main.as_ref().and_then(|main| {
        main.guard
            .admits(utterance)
            .then(|| main.regex.captures(utterance).map(|found| (main, found)))
            .flatten()
    });

    if let Some((main, found)) = main_match {
        for name in main.regex.capture_names().flatten() {
            let Some(group) = found.name(name) else {
                continue;
            };
            let raw = group.as_str().trim();
            let key = CanonicalKey::from(name);
            if !raw.is_empty() && keys.contains(&key) {
                captured.insert(key, RawCapture::new(raw, CaptureSource::Main));
            }
        }
        if !captured.is_empty() {
            tracing::trace!(fields = captured.len(), "main pattern matched");
            return captured;
        }
    }

    for fallback in &family.fallbacks {
        let Some(key) = fallback.fallback_key() else {
            continue;
        };
        if !keys.contains(key) || captured.contains_key(key) {
            continue;
        }
        if let Some(raw) = fallback.capture_fallback(utterance) {
            captured.insert(key.clone(), RawCapture::new(raw, CaptureSource::Fallback));
        }
    }
    tracing::trace!(fields = captured.len(), "fallback patterns matched");
    captured
}
