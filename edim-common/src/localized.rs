//! Localized strings keyed by language code

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Mapping from language code (`fi`, `en`, `sv`, ...) to a localized string
///
/// Persisted as a JSON object in TEXT columns.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LocalizedText(BTreeMap<String, String>);

impl LocalizedText {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from `(language, text)` pairs
    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        Self(
            pairs
                .into_iter()
                .map(|(lang, text)| (lang.to_string(), text.to_string()))
                .collect(),
        )
    }

    /// Single-language text
    pub fn single(language: &str, text: impl Into<String>) -> Self {
        let mut map = BTreeMap::new();
        map.insert(language.to_string(), text.into());
        Self(map)
    }

    pub fn insert(&mut self, language: impl Into<String>, text: impl Into<String>) {
        self.0.insert(language.into(), text.into());
    }

    /// Exact lookup for a language
    pub fn get(&self, language: &str) -> Option<&str> {
        self.0.get(language).map(String::as_str)
    }

    /// Lookup with fallback to any non-empty translation
    pub fn get_or_any(&self, language: &str) -> &str {
        self.get(language)
            .filter(|text| !text.is_empty())
            .or_else(|| self.0.values().map(String::as_str).find(|t| !t.is_empty()))
            .unwrap_or("")
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn to_json(&self) -> String {
        // A string-keyed map of strings always serializes
        serde_json::to_string(&self.0).unwrap_or_else(|_| "{}".to_string())
    }

    pub fn from_json(json: &str) -> crate::Result<Self> {
        if json.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_json::from_str(json)?)
    }
}
