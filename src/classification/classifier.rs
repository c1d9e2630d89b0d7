//! Category to responsible-area lookup.

use crate::error::ConfigError;
use crate::models::DEFAULT_CATEGORY;
use std::collections::BTreeMap;

/// Immutable `category -> contact` table with a guaranteed fallback entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AreaMapping {
    areas: BTreeMap<String, String>,
    fallback: String,
}

impl AreaMapping {
    /// Builds a mapping, requiring an entry for the default category.
    pub fn new(areas: BTreeMap<String, String>) -> Result<Self, ConfigError> {
        let fallback = areas
            .get(DEFAULT_CATEGORY)
            .filter(|contact| !contact.trim().is_empty())
            .cloned()
            .ok_or_else(|| ConfigError::MissingFallback {
                key: DEFAULT_CATEGORY.to_string(),
            })?;

        Ok(Self { areas, fallback })
    }

    /// Contact for unrecognized categories.
    pub fn fallback(&self) -> &str {
        &self.fallback
    }
}

impl Default for AreaMapping {
    fn default() -> Self {
        let areas = default_areas();
        let fallback = areas
            .get(DEFAULT_CATEGORY)
            .cloned()
            .unwrap_or_default();
        Self { areas, fallback }
    }
}

/// Built-in area table.
pub fn default_areas() -> BTreeMap<String, String> {
    [
        ("security", "area-security@utec.edu.pe"),
        ("maintenance", "area-maintenance@utec.edu.pe"),
        ("cleaning", "area-cleaning@utec.edu.pe"),
        ("other", "area-general@utec.edu.pe"),
    ]
    .into_iter()
    .map(|(category, contact)| (category.to_string(), contact.to_string()))
    .collect()
}

/// Assigns a responsible area to a report category.
#[derive(Debug, Clone, Default)]
pub struct Classifier {
    mapping: AreaMapping,
}

impl Classifier {
    pub fn new(mapping: AreaMapping) -> Self {
        Self { mapping }
    }

    /// Total lookup: unknown categories resolve to the fallback contact.
    pub fn classify(&self, category: &str) -> &str {
        self.mapping
            .areas
            .get(category)
            .map(String::as_str)
            .unwrap_or(self.mapping.fallback())
    }
}
