//! Exact, then fuzzy, then create
//!
//! [`EntityResolver::resolve`] is idempotent for identical input: the first
//! call may create a row, every later call finds it again by natural key or
//! by display text and only fills fields that are still empty.

use crate::config::ResolverConfig;
use crate::error::ResolverError;
use crate::fuzzy::FuzzyQuery;
use crate::monitor::ConflictMonitor;
use gleaner_domain::traits::{EntityStore, InsertOutcome};
use gleaner_domain::{ConflictRecord, EntityReference, FieldMap, ResolvedEntity, RowId, StoredEntity};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

/// Resolves entity references against an [`EntityStore`]
#[derive(Debug, Clone)]
pub struct EntityResolver {
    config: ResolverConfig,
    registered: BTreeMap<String, Vec<BTreeSet<String>>>,
}

impl EntityResolver {
    /// Create a resolver, validating configured natural keys against the store schema
    ///
    /// Fails with [`ResolverError::ContractViolation`] when a configured key
    /// is not exactly one of the unique constraints the store declares.
    pub fn new<S: EntityStore>(config: ResolverConfig, store: &S) -> Result<Self, ResolverError> {
        config.validate().map_err(ResolverError::Config)?;

        let mut registered = BTreeMap::new();
        for (entity_type, keys) in &config.natural_keys {
            let schema = store
                .schema(entity_type)
                .ok_or_else(|| ResolverError::UnknownEntityType(entity_type.clone()))?;

            let mut sets = Vec::with_capacity(keys.len());
            for key in keys {
                let set: BTreeSet<String> = key.iter().cloned().collect();
                if !schema.has_unique_key(&set) {
                    return Err(ResolverError::ContractViolation {
                        entity_type: entity_type.clone(),
                        key: key.clone(),
                    });
                }
                sets.push(set);
            }
            registered.insert(entity_type.clone(), sets);
        }

        Ok(Self { config, registered })
    }

    /// Resolver configuration
    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// A fresh monitor using the configured sample cap
    pub fn new_monitor(&self) -> ConflictMonitor {
        ConflictMonitor::new(self.config.max_conflict_samples)
    }

    /// Find or create the row a reference denotes
    ///
    /// 1. Exact lookup by natural key, then merge attributes.
    /// 2. Fuzzy match on the display field, then merge key and attributes.
    /// 3. Insert; a unique-constraint collision falls back to one more lookup by
    ///    the natural key or any unique key the fields cover.
    pub fn resolve<S>(
        &self,
        store: &mut S,
        monitor: &mut ConflictMonitor,
        reference: &EntityReference,
    ) -> Result<ResolvedEntity, ResolverError>
    where
        S: EntityStore,
        S::Error: std::fmt::Display,
    {
        let entity_type = reference.entity_type.as_str();
        let display_field = {
            let schema = store
                .schema(entity_type)
                .ok_or_else(|| ResolverError::UnknownEntityType(entity_type.to_string()))?;

            if reference.has_natural_key() {
                let key: BTreeSet<String> = reference.natural_key.keys().cloned().collect();
                let allowed = match self.registered.get(entity_type) {
                    Some(sets) => sets.contains(&key),
                    None => schema.has_unique_key(&key),
                };
                if !allowed {
                    return Err(ResolverError::UnregisteredKey {
                        entity_type: entity_type.to_string(),
                        key: key.into_iter().collect(),
                    });
                }
            }
            schema.display_field.clone()
        };

        if let Some(row) = self.find_exact(store, reference)? {
            self.merge(store, monitor, &row, &reference.attributes)?;
            let resolved = ResolvedEntity::exact(row.row_id);
            monitor.record_resolution(resolved.resolution);
            return Ok(resolved);
        }

        if let (true, Some(text), Some(_)) = (self.config.enable_fuzzy, &reference.search_text, &display_field) {
            if let Some(query) = FuzzyQuery::new(text, &self.config) {
                let (min_len, max_len) = query.length_window();
                let candidates = store
                    .fuzzy_candidates(entity_type, min_len, max_len)
                    .map_err(ResolverError::store)?;

                if let Some(found) = query.best_match(&candidates) {
                    let row = store
                        .get(entity_type, found.row_id)
                        .map_err(ResolverError::store)?
                        .ok_or_else(|| ResolverError::Store(format!("{} row {} vanished", entity_type, found.row_id)))?;

                    debug!(
                        "Fuzzy match for {} '{}': row {} at distance {} (similarity {:.2})",
                        entity_type, text, found.row_id, found.distance, found.similarity
                    );
                    self.merge(store, monitor, &row, &reference.all_fields())?;
                    let resolved = ResolvedEntity::fuzzy(row.row_id, found.distance);
                    monitor.record_resolution(resolved.resolution);
                    return Ok(resolved);
                }
            }
        }

        let mut fields = reference.all_fields();
        if let (Some(field), Some(text)) = (&display_field, &reference.search_text) {
            let missing = fields.get(field).map_or(true, |v| v.trim().is_empty());
            if missing && !text.trim().is_empty() {
                fields.insert(field.clone(), text.clone());
            }
        }

        match store.insert(entity_type, &fields).map_err(ResolverError::store)? {
            InsertOutcome::Inserted(row_id) => {
                debug!("Created {} row {}", entity_type, row_id);
                let resolved = ResolvedEntity::created(row_id);
                monitor.record_resolution(resolved.resolution);
                Ok(resolved)
            }
            InsertOutcome::DuplicateKey => {
                warn!("Insert of {} collided with a unique constraint, re-resolving", entity_type);
                let row = match self.find_exact(store, reference)? {
                    Some(row) => Some(row),
                    None => self.find_by_any_key(store, entity_type, &fields)?,
                }
                .ok_or_else(|| ResolverError::InsertRace(entity_type.to_string()))?;
                self.merge(store, monitor, &row, &reference.attributes)?;
                let resolved = ResolvedEntity::exact(row.row_id);
                monitor.record_resolution(resolved.resolution);
                Ok(resolved)
            }
        }
    }

    fn find_exact<S>(&self, store: &S, reference: &EntityReference) -> Result<Option<StoredEntity>, ResolverError>
    where
        S: EntityStore,
        S::Error: std::fmt::Display,
    {
        if !reference.has_natural_key() {
            return Ok(None);
        }
        store
            .find_by_key(&reference.entity_type, &reference.natural_key)
            .map_err(ResolverError::store)
    }

    /// Look up by the first declared unique key that `fields` covers in full
    fn find_by_any_key<S>(
        &self,
        store: &S,
        entity_type: &str,
        fields: &FieldMap,
    ) -> Result<Option<StoredEntity>, ResolverError>
    where
        S: EntityStore,
        S::Error: std::fmt::Display,
    {
        let keys = store.schema(entity_type).map(|s| s.unique_keys.clone()).unwrap_or_default();
        for key in keys {
            if let Some(tuple) = key_tuple(&key, |f| fields.get(f).map(String::as_str)) {
                if let Some(row) = store.find_by_key(entity_type, &tuple).map_err(ResolverError::store)? {
                    return Ok(Some(row));
                }
            }
        }
        Ok(None)
    }

    /// Fill empty stored fields; record a conflict for differing non-empty ones
    ///
    /// A fill that would complete a unique key already held by another row is
    /// recorded as a conflict and skipped.
    fn merge<S>(
        &self,
        store: &mut S,
        monitor: &mut ConflictMonitor,
        row: &StoredEntity,
        incoming: &FieldMap,
    ) -> Result<(), ResolverError>
    where
        S: EntityStore,
        S::Error: std::fmt::Display,
    {
        let unique_keys = store
            .schema(&row.entity_type)
            .map(|s| s.unique_keys.clone())
            .unwrap_or_default();
        let mut current = row.fields.clone();

        for (field, value) in incoming {
            if value.trim().is_empty() {
                continue;
            }
            match row.field(field) {
                None => {
                    if let Some(holder) = self.key_holder(store, row, &unique_keys, &current, field, value)? {
                        debug!(
                            "Not filling {}.{} of row {}: key already held by row {}",
                            row.entity_type, field, row.row_id, holder
                        );
                        monitor.record_conflict(ConflictRecord {
                            entity_type: row.entity_type.clone(),
                            field: field.clone(),
                            old_value: String::new(),
                            new_value: value.clone(),
                        });
                        continue;
                    }
                    store
                        .set_field(&row.entity_type, row.row_id, field, value)
                        .map_err(ResolverError::store)?;
                    current.insert(field.clone(), value.clone());
                    monitor.record_fill();
                }
                Some(old) if old != value => {
                    monitor.record_conflict(ConflictRecord {
                        entity_type: row.entity_type.clone(),
                        field: field.clone(),
                        old_value: old.to_string(),
                        new_value: value.clone(),
                    });
                }
                Some(_) => {}
            }
        }
        Ok(())
    }

    /// Another row holding a unique key that filling `field` would complete
    fn key_holder<S>(
        &self,
        store: &S,
        row: &StoredEntity,
        unique_keys: &[Vec<String>],
        current: &FieldMap,
        field: &str,
        value: &str,
    ) -> Result<Option<RowId>, ResolverError>
    where
        S: EntityStore,
        S::Error: std::fmt::Display,
    {
        for key in unique_keys.iter().filter(|k| k.iter().any(|f| f == field)) {
            let lookup = |f: &str| {
                if f == field {
                    Some(value)
                } else {
                    current.get(f).map(String::as_str)
                }
            };
            let Some(tuple) = key_tuple(key, lookup) else {
                continue;
            };
            if let Some(other) = store.find_by_key(&row.entity_type, &tuple).map_err(ResolverError::store)? {
                if other.row_id != row.row_id {
                    return Ok(Some(other.row_id));
                }
            }
        }
        Ok(None)
    }
}

/// The full value tuple of `key`, or `None` when a field is missing or blank
fn key_tuple<'a>(key: &[String], value: impl Fn(&str) -> Option<&'a str>) -> Option<FieldMap> {
    key.iter()
        .map(|f| {
            value(f)
                .filter(|v| !v.trim().is_empty())
                .map(|v| (f.clone(), v.to_string()))
        })
        .collect()
}
