use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::entry::Category;

/// Suggested note texts per category.
///
/// Each list keeps insertion order and never holds the same text twice.
/// All four categories are always present. Templates are local convenience
/// data and are never written to the remote store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(from = "BTreeMap<Category, Vec<String>>", into = "BTreeMap<Category, Vec<String>>")]
pub struct Templates {
    by_category: BTreeMap<Category, Vec<String>>,
}

impl Default for Templates {
    fn default() -> Self {
        Self {
            by_category: Category::ALL.into_iter().map(|c| (c, Vec::new())).collect(),
        }
    }
}

impl Templates {
    pub fn get(&self, category: Category) -> &[String] {
        self.by_category
            .get(&category)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Append `text` to the category. Returns false if it was empty or already present.
    pub fn add(&mut self, category: Category, text: &str) -> bool {
        let text = text.trim();
        if text.is_empty() {
            return false;
        }
        let list = self.by_category.entry(category).or_default();
        if list.iter().any(|t| t == text) {
            return false;
        }
        list.push(text.to_string());
        true
    }

    /// Remove `text` from the category. Returns false if it was absent.
    pub fn remove(&mut self, category: Category, text: &str) -> bool {
        let text = text.trim();
        let Some(list) = self.by_category.get_mut(&category) else {
            return false;
        };
        let before = list.len();
        list.retain(|t| t != text);
        list.len() != before
    }

    pub fn iter(&self) -> impl Iterator<Item = (Category, &[String])> {
        self.by_category.iter().map(|(c, list)| (*c, list.as_slice()))
    }

    /// Build templates from an untrusted JSON value.
    ///
    /// Only the four known category keys survive. Values that are not
    /// non-empty strings are dropped and duplicates collapse to their first
    /// occurrence.
    pub fn sanitized(raw: &serde_json::Value) -> Self {
        let mut templates = Self::default();
        let Some(map) = raw.as_object() else {
            return templates;
        };
        for category in Category::ALL {
            let Some(values) = map.get(category.as_str()).and_then(|v| v.as_array()) else {
                continue;
            };
            for value in values {
                if let Some(text) = value.as_str() {
                    templates.add(category, text);
                }
            }
        }
        templates
    }
}

impl From<BTreeMap<Category, Vec<String>>> for Templates {
    fn from(map: BTreeMap<Category, Vec<String>>) -> Self {
        let mut templates = Self::default();
        for (category, values) in map {
            for text in values {
                templates.add(category, &text);
            }
        }
        templates
    }
}

impl From<Templates> for BTreeMap<Category, Vec<String>> {
    fn from(templates: Templates) -> Self {
        templates.by_category
    }
}
