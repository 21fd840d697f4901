//! SQLite-backed entity and checkpoint store

use crate::{validate_identifier, StoreError};
use chrono::Utc;
use gleaner_domain::text::normalized_len;
use gleaner_domain::traits::{CheckpointStore, EntityStore, FuzzyCandidate, InsertOutcome, Relation};
use gleaner_domain::{
    Checkpoint, CheckpointError, CheckpointKey, CursorKind, CursorValue, EntitySchema, FieldMap, RowId,
    StoredEntity,
};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, ErrorCode, OptionalExtension};
use std::path::Path;
use tracing::debug;

/// Column holding the normalized length of the display field
const NORM_LEN_COLUMN: &str = "_norm_len";

/// SQLite-based implementation of EntityStore and CheckpointStore
///
/// Each entity type in the catalogue gets its own table with an
/// auto-assigned integer id, so a parent's id is known as soon as it is
/// inserted, even inside an open transaction.
///
/// # Thread Safety
///
/// SQLite connections are not thread-safe. Each worker should open its own
/// SqliteStore; concurrent inserts of the same entity are arbitrated by the
/// unique constraints.
pub struct SqliteStore {
    conn: Connection,
    schemas: Vec<EntitySchema>,
}

impl SqliteStore {
    /// Create a new SqliteStore with the given database path and catalogue
    ///
    /// Use `:memory:` for an in-memory database (useful for testing).
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use gleaner_store::{catalogue, SqliteStore};
    ///
    /// let store = SqliteStore::new("gleaner.db", catalogue::default_catalogue()).unwrap();
    /// ```
    pub fn new<P: AsRef<Path>>(path: P, schemas: Vec<EntitySchema>) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        let mut store = Self { conn, schemas };
        store.initialize_schema()?;
        Ok(store)
    }

    /// Create the fixed tables and one table per declared entity type
    fn initialize_schema(&mut self) -> Result<(), StoreError> {
        self.conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        self.conn.execute_batch(include_str!("schema.sql"))?;

        for schema in &self.schemas {
            let ddl = Self::table_ddl(schema, &self.schemas)?;
            debug!("Creating table for entity type '{}'", schema.entity_type);
            self.conn.execute_batch(&ddl)?;
        }

        Ok(())
    }

    /// Build the CREATE TABLE statement (and index) for one entity type
    fn table_ddl(schema: &EntitySchema, all: &[EntitySchema]) -> Result<String, StoreError> {
        validate_identifier(&schema.entity_type)?;
        let table = &schema.entity_type;

        let mut columns = vec!["id INTEGER PRIMARY KEY AUTOINCREMENT".to_string()];
        for field in &schema.fields {
            validate_identifier(field)?;
            let is_fk = schema.parents.iter().any(|fk| &fk.field == field);
            let sql_type = if is_fk { "INTEGER" } else { "TEXT" };
            columns.push(format!("\"{}\" {}", field, sql_type));
        }
        if schema.display_field.is_some() {
            columns.push(format!("{} INTEGER", NORM_LEN_COLUMN));
        }
        for key in &schema.unique_keys {
            let cols: Vec<String> = key.iter().map(|f| format!("\"{}\"", f)).collect();
            columns.push(format!("UNIQUE ({})", cols.join(", ")));
        }
        for fk in &schema.parents {
            if !all.iter().any(|s| s.entity_type == fk.references) {
                return Err(StoreError::UnknownEntityType(fk.references.clone()));
            }
            columns.push(format!(
                "FOREIGN KEY (\"{}\") REFERENCES \"{}\" (id)",
                fk.field, fk.references
            ));
        }

        let mut ddl = format!(
            "CREATE TABLE IF NOT EXISTS \"{}\" (\n    {}\n);\n",
            table,
            columns.join(",\n    ")
        );
        if schema.display_field.is_some() {
            ddl.push_str(&format!(
                "CREATE INDEX IF NOT EXISTS \"{table}_norm_len\" ON \"{table}\" ({NORM_LEN_COLUMN});\n"
            ));
        }
        Ok(ddl)
    }

    /// Look up the schema for a type or fail
    fn require_schema(&self, entity_type: &str) -> Result<&EntitySchema, StoreError> {
        self.schemas
            .iter()
            .find(|s| s.entity_type == entity_type)
            .ok_or_else(|| StoreError::UnknownEntityType(entity_type.to_string()))
    }

    /// Fail on fields the table does not have
    fn require_fields<'a, I>(schema: &EntitySchema, fields: I) -> Result<(), StoreError>
    where
        I: IntoIterator<Item = &'a String>,
    {
        for field in fields {
            if !schema.has_field(field) {
                return Err(StoreError::UnknownField {
                    entity_type: schema.entity_type.clone(),
                    field: field.clone(),
                });
            }
        }
        Ok(())
    }

    /// SELECT list covering the id and every data column
    fn select_list(schema: &EntitySchema) -> String {
        let mut cols = vec!["id".to_string()];
        cols.extend(schema.fields.iter().map(|f| format!("\"{}\"", f)));
        cols.join(", ")
    }

    /// Convert a row produced by `select_list` into a StoredEntity
    fn row_to_entity(schema: &EntitySchema, row: &rusqlite::Row<'_>) -> rusqlite::Result<StoredEntity> {
        let row_id: RowId = row.get(0)?;
        let mut fields = FieldMap::new();
        for (index, field) in schema.fields.iter().enumerate() {
            let value: Value = row.get(index + 1)?;
            if let Some(text) = value_to_string(value) {
                fields.insert(field.clone(), text);
            }
        }
        Ok(StoredEntity {
            row_id,
            entity_type: schema.entity_type.clone(),
            fields,
        })
    }

    /// Number of rows of an entity type (diagnostics and tests)
    pub fn count(&self, entity_type: &str) -> Result<usize, StoreError> {
        let schema = self.require_schema(entity_type)?;
        let count: i64 = self.conn.query_row(
            &format!("SELECT COUNT(*) FROM \"{}\"", schema.entity_type),
            [],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    /// All declared schemas
    pub fn schemas(&self) -> &[EntitySchema] {
        &self.schemas
    }
}

/// Render a SQLite value as the string form used in FieldMaps
fn value_to_string(value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::Integer(i) => Some(i.to_string()),
        Value::Real(f) => Some(f.to_string()),
        Value::Text(s) => Some(s),
        Value::Blob(b) => Some(String::from_utf8_lossy(&b).into_owned()),
    }
}

/// Blank strings are stored as NULL so they never collide on unique keys
fn field_value(value: &str) -> Value {
    if value.trim().is_empty() {
        Value::Null
    } else {
        Value::Text(value.to_string())
    }
}

/// Whether an error is a UNIQUE / PRIMARY KEY violation
fn is_unique_violation(err: &rusqlite::Error) -> bool {
    match err {
        rusqlite::Error::SqliteFailure(e, _) => {
            e.code == ErrorCode::ConstraintViolation
                && (e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                    || e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY)
        }
        _ => false,
    }
}

impl EntityStore for SqliteStore {
    type Error = StoreError;

    fn schema(&self, entity_type: &str) -> Option<&EntitySchema> {
        self.schemas.iter().find(|s| s.entity_type == entity_type)
    }

    fn find_by_key(&self, entity_type: &str, key: &FieldMap) -> Result<Option<StoredEntity>, Self::Error> {
        let schema = self.require_schema(entity_type)?;
        Self::require_fields(schema, key.keys())?;
        if key.is_empty() {
            return Ok(None);
        }

        let conditions: Vec<String> = key
            .keys()
            .enumerate()
            .map(|(i, field)| format!("\"{}\" = ?{}", field, i + 1))
            .collect();
        let sql = format!(
            "SELECT {} FROM \"{}\" WHERE {} ORDER BY id LIMIT 1",
            Self::select_list(schema),
            schema.entity_type,
            conditions.join(" AND ")
        );
        let values: Vec<Value> = key.values().map(|v| Value::Text(v.clone())).collect();

        let entity = self
            .conn
            .query_row(&sql, params_from_iter(values.iter()), |row| Self::row_to_entity(schema, row))
            .optional()?;
        Ok(entity)
    }

    fn get(&self, entity_type: &str, row_id: RowId) -> Result<Option<StoredEntity>, Self::Error> {
        let schema = self.require_schema(entity_type)?;
        let sql = format!(
            "SELECT {} FROM \"{}\" WHERE id = ?1",
            Self::select_list(schema),
            schema.entity_type
        );
        let entity = self
            .conn
            .query_row(&sql, params![row_id], |row| Self::row_to_entity(schema, row))
            .optional()?;
        Ok(entity)
    }

    fn fuzzy_candidates(
        &self,
        entity_type: &str,
        min_len: usize,
        max_len: usize,
    ) -> Result<Vec<FuzzyCandidate>, Self::Error> {
        let schema = self.require_schema(entity_type)?;
        let Some(display) = &schema.display_field else {
            return Ok(Vec::new());
        };

        let sql = format!(
            "SELECT id, \"{display}\" FROM \"{}\"
             WHERE {NORM_LEN_COLUMN} BETWEEN ?1 AND ?2 AND \"{display}\" IS NOT NULL
             ORDER BY id",
            schema.entity_type
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let candidates = stmt
            .query_map(params![min_len as i64, max_len as i64], |row| {
                Ok(FuzzyCandidate {
                    row_id: row.get(0)?,
                    display: row.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(candidates)
    }

    fn insert(&mut self, entity_type: &str, fields: &FieldMap) -> Result<InsertOutcome, Self::Error> {
        let schema = self.require_schema(entity_type)?;
        Self::require_fields(schema, fields.keys())?;

        let mut columns: Vec<String> = fields.keys().map(|f| format!("\"{}\"", f)).collect();
        let mut values: Vec<Value> = fields.values().map(|v| field_value(v)).collect();
        if let Some(display) = &schema.display_field {
            if let Some(text) = fields.get(display).filter(|v| !v.trim().is_empty()) {
                columns.push(NORM_LEN_COLUMN.to_string());
                values.push(Value::Integer(normalized_len(text) as i64));
            }
        }

        let sql = if columns.is_empty() {
            format!("INSERT INTO \"{}\" DEFAULT VALUES", schema.entity_type)
        } else {
            let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("?{}", i)).collect();
            format!(
                "INSERT INTO \"{}\" ({}) VALUES ({})",
                schema.entity_type,
                columns.join(", "),
                placeholders.join(", ")
            )
        };

        match self.conn.execute(&sql, params_from_iter(values.iter())) {
            Ok(_) => Ok(InsertOutcome::Inserted(self.conn.last_insert_rowid())),
            Err(e) if is_unique_violation(&e) => Ok(InsertOutcome::DuplicateKey),
            Err(e) => Err(e.into()),
        }
    }

    fn set_field(&mut self, entity_type: &str, row_id: RowId, field: &str, value: &str) -> Result<(), Self::Error> {
        let schema = self.require_schema(entity_type)?;
        Self::require_fields(schema, [&field.to_string()])?;

        let is_display = schema.display_field.as_deref() == Some(field);
        let updated = if is_display {
            let norm_len = if value.trim().is_empty() {
                Value::Null
            } else {
                Value::Integer(normalized_len(value) as i64)
            };
            self.conn.execute(
                &format!(
                    "UPDATE \"{}\" SET \"{}\" = ?1, {NORM_LEN_COLUMN} = ?2 WHERE id = ?3",
                    schema.entity_type, field
                ),
                params![field_value(value), norm_len, row_id],
            )?
        } else {
            self.conn.execute(
                &format!("UPDATE \"{}\" SET \"{}\" = ?1 WHERE id = ?2", schema.entity_type, field),
                params![field_value(value), row_id],
            )?
        };

        if updated == 0 {
            return Err(StoreError::InvalidData(format!(
                "No {} row with id {}",
                entity_type, row_id
            )));
        }
        Ok(())
    }

    fn link(&mut self, relation: &Relation) -> Result<bool, Self::Error> {
        let inserted = self.conn.execute(
            "INSERT OR IGNORE INTO relations (from_type, from_id, relation, to_type, to_id)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                &relation.from_type,
                relation.from_id,
                &relation.relation,
                &relation.to_type,
                relation.to_id,
            ],
        )?;
        Ok(inserted > 0)
    }

    fn has_link(&self, relation: &Relation) -> Result<bool, Self::Error> {
        let exists = self
            .conn
            .query_row(
                "SELECT 1 FROM relations
                 WHERE from_type = ?1 AND from_id = ?2 AND relation = ?3 AND to_type = ?4 AND to_id = ?5",
                params![
                    &relation.from_type,
                    relation.from_id,
                    &relation.relation,
                    &relation.to_type,
                    relation.to_id,
                ],
                |_| Ok(true),
            )
            .optional()?
            .unwrap_or(false);
        Ok(exists)
    }

    fn begin(&mut self) -> Result<(), Self::Error> {
        if !self.conn.is_autocommit() {
            return Err(StoreError::InvalidData("Transaction already open".to_string()));
        }
        self.conn.execute_batch("BEGIN IMMEDIATE")?;
        Ok(())
    }

    fn commit(&mut self) -> Result<(), Self::Error> {
        self.conn.execute_batch("COMMIT")?;
        Ok(())
    }

    fn rollback(&mut self) -> Result<(), Self::Error> {
        if self.conn.is_autocommit() {
            return Ok(());
        }
        self.conn.execute_batch("ROLLBACK")?;
        Ok(())
    }
}

impl CheckpointStore for SqliteStore {
    type Error = StoreError;

    fn load(&self, key: &CheckpointKey, kind: CursorKind) -> Result<Option<Checkpoint>, Self::Error> {
        let row: Option<(String, String)> = self
            .conn
            .query_row(
                "SELECT kind, value FROM checkpoints WHERE source_id = ?1 AND query_id = ?2",
                params![&key.source_id, &key.query_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let Some((stored_kind, value)) = row else {
            return Ok(None);
        };
        let stored_kind = CursorKind::parse(&stored_kind)
            .ok_or_else(|| StoreError::InvalidData(format!("Unknown cursor kind: {}", stored_kind)))?;
        if stored_kind != kind {
            return Err(CheckpointError::KindMismatch {
                current: stored_kind,
                update: kind,
            }
            .into());
        }

        let cursor = CursorValue::parse(kind, &value)?;
        Ok(Some(Checkpoint::new(key.clone(), cursor)))
    }

    fn save(&mut self, checkpoint: &Checkpoint) -> Result<(), Self::Error> {
        self.conn.execute(
            "INSERT INTO checkpoints (source_id, query_id, kind, value, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(source_id, query_id) DO UPDATE SET
             kind = excluded.kind, value = excluded.value, updated_at = excluded.updated_at",
            params![
                &checkpoint.key.source_id,
                &checkpoint.key.query_id,
                checkpoint.cursor_kind().as_str(),
                checkpoint.cursor.to_scalar(),
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn list(&self) -> Result<Vec<(CheckpointKey, String)>, Self::Error> {
        let mut stmt = self
            .conn
            .prepare("SELECT source_id, query_id, value FROM checkpoints ORDER BY source_id, query_id")?;
        let rows = stmt
            .query_map([], |row| {
                Ok((CheckpointKey::new(row.get::<_, String>(0)?, row.get::<_, String>(1)?), row.get(2)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalogue::{default_catalogue, INSTITUTION, PROJECT};

    #[test]
    fn test_table_ddl_declares_constraints() {
        let catalogue = default_catalogue();
        let project = catalogue.iter().find(|s| s.entity_type == PROJECT).unwrap();
        let ddl = SqliteStore::table_ddl(project, &catalogue).unwrap();

        assert!(ddl.contains("UNIQUE (\"source\", \"external_id\")"));
        assert!(ddl.contains("FOREIGN KEY (\"programme_id\") REFERENCES \"funding_programme\" (id)"));
        assert!(ddl.contains("\"programme_id\" INTEGER"));
        assert!(ddl.contains("_norm_len"));
    }

    #[test]
    fn test_unknown_parent_rejected() {
        let orphan = EntitySchema::new("grant").parent("agency_id", "agency");
        let result = SqliteStore::new(":memory:", vec![orphan]);
        assert!(matches!(result, Err(StoreError::UnknownEntityType(t)) if t == "agency"));
    }

    #[test]
    fn test_blank_values_stored_as_null() {
        let mut store = SqliteStore::new(":memory:", default_catalogue()).unwrap();
        let mut fields = FieldMap::new();
        fields.insert("name".to_string(), "Institut Pasteur".to_string());
        fields.insert("ror_id".to_string(), "".to_string());

        // Two rows with blank ror_id must not collide on the unique key.
        assert!(matches!(store.insert(INSTITUTION, &fields).unwrap(), InsertOutcome::Inserted(_)));
        assert!(matches!(store.insert(INSTITUTION, &fields).unwrap(), InsertOutcome::Inserted(_)));
        assert_eq!(store.count(INSTITUTION).unwrap(), 2);
    }
}
