//! Entity schema declarations
//!
//! A schema tells the store which columns, unique constraints and foreign
//! keys a table has, and tells the resolver which natural keys are legal.

use std::collections::BTreeSet;

/// A foreign key from a child field to a parent entity type's row id
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKey {
    /// Child column holding the parent row id
    pub field: String,
    /// Parent entity type
    pub references: String,
}

/// Declaration of one entity type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntitySchema {
    /// Entity type, also the table name
    pub entity_type: String,
    /// Field used for fuzzy matching, if any
    pub display_field: Option<String>,
    /// All data columns (excluding the row id)
    pub fields: Vec<String>,
    /// Unique constraints, each a set of columns
    pub unique_keys: Vec<Vec<String>>,
    /// Foreign keys to parent types
    pub parents: Vec<ForeignKey>,
}

impl EntitySchema {
    /// Start a schema for an entity type
    pub fn new(entity_type: impl Into<String>) -> Self {
        Self {
            entity_type: entity_type.into(),
            display_field: None,
            fields: Vec::new(),
            unique_keys: Vec::new(),
            parents: Vec::new(),
        }
    }

    /// Add data columns
    pub fn fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for field in fields {
            let field = field.into();
            if !self.fields.contains(&field) {
                self.fields.push(field);
            }
        }
        self
    }

    /// Set the display field (added as a column if missing)
    pub fn display(mut self, field: impl Into<String>) -> Self {
        let field = field.into();
        self = self.fields([field.clone()]);
        self.display_field = Some(field);
        self
    }

    /// Declare a unique constraint (columns added if missing)
    pub fn unique<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let key: Vec<String> = fields.into_iter().map(Into::into).collect();
        self = self.fields(key.clone());
        self.unique_keys.push(key);
        self
    }

    /// Declare a foreign key (column added if missing)
    pub fn parent(mut self, field: impl Into<String>, references: impl Into<String>) -> Self {
        let field = field.into();
        self = self.fields([field.clone()]);
        self.parents.push(ForeignKey {
            field,
            references: references.into(),
        });
        self
    }

    /// Whether `fields` exactly matches one declared unique constraint
    pub fn has_unique_key(&self, fields: &BTreeSet<String>) -> bool {
        self.unique_keys
            .iter()
            .any(|key| key.iter().cloned().collect::<BTreeSet<_>>() == *fields)
    }

    /// Whether the table has a column of that name
    pub fn has_field(&self, field: &str) -> bool {
        self.fields.iter().any(|f| f == field)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_collects_columns() {
        let schema = EntitySchema::new("project")
            .display("title")
            .unique(["source", "external_id"])
            .parent("programme_id", "funding_programme")
            .fields(["start_date", "title"]);

        assert_eq!(
            schema.fields,
            vec!["title", "source", "external_id", "programme_id", "start_date"]
        );
        assert_eq!(schema.display_field.as_deref(), Some("title"));
    }

    #[test]
    fn test_unique_key_match_is_order_insensitive() {
        let schema = EntitySchema::new("project").unique(["source", "external_id"]);
        let key: BTreeSet<String> = ["external_id", "source"].iter().map(|s| s.to_string()).collect();
        assert!(schema.has_unique_key(&key));

        let partial: BTreeSet<String> = ["source"].iter().map(|s| s.to_string()).collect();
        assert!(!schema.has_unique_key(&partial));
    }
}
