//! Entity references, resolutions and conflicts

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Field name to value map. An empty string counts as an empty field.
pub type FieldMap = BTreeMap<String, String>;

/// Row identifier assigned by the relational store
pub type RowId = i64;

/// A request to resolve a named entity against the store
///
/// # Examples
///
/// ```
/// use gleaner_domain::EntityReference;
///
/// let reference = EntityReference::new("institution")
///     .with_key("ror_id", "https://ror.org/02s376052")
///     .with_search_text("Max Planck Institute for Biology")
///     .with_attribute("country", "DE");
///
/// assert_eq!(reference.natural_key.len(), 1);
/// assert!(reference.search_text.is_some());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityReference {
    /// Target entity type (table)
    pub entity_type: String,
    /// Fields forming one unique constraint of the target type
    #[serde(default)]
    pub natural_key: FieldMap,
    /// Display text used for fuzzy matching
    #[serde(default)]
    pub search_text: Option<String>,
    /// Other fields to merge into the row
    #[serde(default)]
    pub attributes: FieldMap,
}

impl EntityReference {
    /// Create an empty reference for an entity type
    pub fn new(entity_type: impl Into<String>) -> Self {
        Self {
            entity_type: entity_type.into(),
            natural_key: FieldMap::new(),
            search_text: None,
            attributes: FieldMap::new(),
        }
    }

    /// Add a natural-key field
    pub fn with_key(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.natural_key.insert(field.into(), value.into());
        self
    }

    /// Set the fuzzy search text
    pub fn with_search_text(mut self, text: impl Into<String>) -> Self {
        self.search_text = Some(text.into());
        self
    }

    /// Add an attribute
    pub fn with_attribute(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(field.into(), value.into());
        self
    }

    /// Whether the natural key carries at least one non-empty value
    pub fn has_natural_key(&self) -> bool {
        self.natural_key.values().any(|v| !v.trim().is_empty())
    }

    /// `natural_key ∪ attributes`, natural key winning on overlap
    pub fn all_fields(&self) -> FieldMap {
        let mut fields = self.attributes.clone();
        for (field, value) in &self.natural_key {
            fields.insert(field.clone(), value.clone());
        }
        fields
    }
}

/// How a reference was resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Found by natural key
    Exact,
    /// Found by approximate text match at the given edit distance
    Fuzzy {
        /// Edit distance between the normalized texts
        distance: usize,
    },
    /// A new row was inserted
    Created,
}

/// Result of resolving a reference
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedEntity {
    /// Store row id
    pub row_id: RowId,
    /// True only when the row was inserted by this call
    pub created: bool,
    /// Path taken to the row
    pub resolution: Resolution,
}

impl ResolvedEntity {
    /// An existing row found by natural key
    pub fn exact(row_id: RowId) -> Self {
        Self {
            row_id,
            created: false,
            resolution: Resolution::Exact,
        }
    }

    /// An existing row found by fuzzy match
    pub fn fuzzy(row_id: RowId, distance: usize) -> Self {
        Self {
            row_id,
            created: false,
            resolution: Resolution::Fuzzy { distance },
        }
    }

    /// A freshly inserted row
    pub fn created(row_id: RowId) -> Self {
        Self {
            row_id,
            created: true,
            resolution: Resolution::Created,
        }
    }
}

/// A row as read back from the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredEntity {
    /// Store row id
    pub row_id: RowId,
    /// Entity type (table)
    pub entity_type: String,
    /// Non-null fields
    pub fields: FieldMap,
}

impl StoredEntity {
    /// Value of a field, treating missing and blank as empty
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .get(name)
            .map(String::as_str)
            .filter(|v| !v.trim().is_empty())
    }
}

/// A disagreement between a stored value and an incoming one
///
/// The stored value is always kept; the record exists for diagnostics only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictRecord {
    /// Entity type
    pub entity_type: String,
    /// Field name
    pub field: String,
    /// Value kept in the store
    pub old_value: String,
    /// Incoming value that was rejected
    pub new_value: String,
}

impl fmt::Display for ConflictRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}: kept '{}', rejected '{}'",
            self.entity_type, self.field, self.old_value, self.new_value
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_fields_prefers_natural_key() {
        let reference = EntityReference::new("person")
            .with_key("orcid", "0000-0002-1825-0097")
            .with_attribute("orcid", "stale")
            .with_attribute("family_name", "Carberry");

        let fields = reference.all_fields();
        assert_eq!(fields["orcid"], "0000-0002-1825-0097");
        assert_eq!(fields["family_name"], "Carberry");
    }

    #[test]
    fn test_blank_natural_key_is_absent() {
        let reference = EntityReference::new("person").with_key("orcid", "  ");
        assert!(!reference.has_natural_key());
    }

    #[test]
    fn test_stored_field_blank_is_empty() {
        let mut fields = FieldMap::new();
        fields.insert("name".to_string(), "".to_string());
        let row = StoredEntity {
            row_id: 1,
            entity_type: "topic".to_string(),
            fields,
        };
        assert_eq!(row.field("name"), None);
        assert_eq!(row.field("missing"), None);
    }
}
