//! Per-document transactional loading
//!
//! Each processed document is loaded inside one store transaction. A record
//! that cannot be mapped is logged and skipped; any store or resolution
//! error rolls back the whole document and restores the monitor to its
//! state before the document, so statistics only reflect committed work.
//!
//! The mtime checkpoint is written once, after a complete scan, and only
//! when no document failed.

use crate::config::LoaderConfig;
use crate::documents::{DocumentEntry, DocumentSource};
use crate::error::LoaderError;
use crate::graph::EntityGraph;
use crate::mapper::{PointerMapper, RecordMapper};
use gleaner_domain::traits::{CheckpointStore, EntityStore, Relation};
use gleaner_domain::{Checkpoint, CheckpointKey, CursorKind, CursorValue, ResolvedEntity, Transition};
use gleaner_harvest::MtimeScan;
use gleaner_resolver::{ConflictMonitor, EntityResolver};
use serde::Serialize;
use std::fmt::Display;
use tracing::{debug, error, info, warn};

/// What one load run did
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LoadReport {
    /// Documents loaded and committed
    pub documents_processed: usize,
    /// Documents skipped by the mtime checkpoint
    pub documents_skipped: usize,
    /// Documents rolled back (enrichment mode only)
    pub documents_failed: usize,
    /// Records committed
    pub records_loaded: usize,
    /// Records that could not be mapped
    pub records_skipped: usize,
    /// Entity references resolved in committed documents
    pub entities_resolved: usize,
    /// Relation rows inserted in committed documents
    pub relations_created: usize,
    /// Load checkpoint after the run (epoch seconds)
    pub checkpoint: Option<i64>,
}

impl LoadReport {
    /// Whether every processed document committed
    pub fn is_success(&self) -> bool {
        self.documents_failed == 0
    }

    /// One-line summary for logs
    pub fn summary(&self) -> String {
        format!(
            "{} documents loaded, {} skipped, {} failed; {} records loaded, {} skipped; {} entities, {} relations",
            self.documents_processed,
            self.documents_skipped,
            self.documents_failed,
            self.records_loaded,
            self.records_skipped,
            self.entities_resolved,
            self.relations_created
        )
    }
}

#[derive(Debug, Default)]
struct DocumentStats {
    records_loaded: usize,
    records_skipped: usize,
    entities: usize,
    relations: usize,
}

/// Loads raw documents into the entity store
pub struct Loader {
    resolver: EntityResolver,
    mapper: Box<dyn RecordMapper>,
    config: LoaderConfig,
}

impl Loader {
    /// Create a loader with an explicit mapper
    pub fn new(resolver: EntityResolver, mapper: Box<dyn RecordMapper>, config: LoaderConfig) -> Result<Self, LoaderError> {
        config.validate().map_err(LoaderError::Config)?;
        Ok(Self {
            resolver,
            mapper,
            config,
        })
    }

    /// Create a loader using the configured [`PointerMapper`]
    pub fn from_config(resolver: EntityResolver, config: LoaderConfig) -> Result<Self, LoaderError> {
        let mapper = PointerMapper::new(config.mapper.clone())?;
        Self::new(resolver, Box::new(mapper), config)
    }

    /// Loader configuration
    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    /// The resolver
    pub fn resolver(&self) -> &EntityResolver {
        &self.resolver
    }

    /// Load every document not covered by the mtime checkpoint of `source_id`
    ///
    /// Returns `Err` when a document fails and `skip_failed_documents` is
    /// off; the checkpoint is then left untouched.
    pub fn load<S, C>(
        &self,
        store: &mut S,
        checkpoints: &mut C,
        source_id: &str,
        documents: &dyn DocumentSource,
        monitor: &mut ConflictMonitor,
    ) -> Result<LoadReport, LoaderError>
    where
        S: EntityStore,
        S::Error: Display,
        C: CheckpointStore,
        C::Error: Display,
    {
        let key = CheckpointKey::new(source_id, self.config.checkpoint_query.clone());
        let stored = checkpoints
            .load(&key, CursorKind::Timestamp)
            .map_err(|e| LoaderError::CheckpointStore(e.to_string()))?;
        let previous = stored.as_ref().and_then(|c| match c.cursor {
            CursorValue::Timestamp(ts) => Some(ts),
            _ => None,
        });

        let entries = documents.list()?;
        info!("Loading {} documents for {} (checkpoint {:?})", entries.len(), key, previous);

        let mut scan = MtimeScan::new(previous, self.config.mtime_epsilon_secs);
        let mut report = LoadReport::default();

        for entry in &entries {
            if !scan.observe(entry.mtime) {
                debug!("Skipping {} (mtime {})", entry.path.display(), entry.mtime);
                report.documents_skipped += 1;
                continue;
            }

            let snapshot = monitor.clone();
            match self.load_document(store, monitor, documents, entry) {
                Ok(stats) => {
                    report.documents_processed += 1;
                    report.records_loaded += stats.records_loaded;
                    report.records_skipped += stats.records_skipped;
                    report.entities_resolved += stats.entities;
                    report.relations_created += stats.relations;
                }
                Err(e) => {
                    *monitor = snapshot;
                    error!("{}", e);
                    if !self.config.skip_failed_documents {
                        return Err(e);
                    }
                    report.documents_failed += 1;
                }
            }
        }

        if report.documents_failed > 0 {
            warn!(
                "{} documents failed, load checkpoint for {} not advanced",
                report.documents_failed, key
            );
            report.checkpoint = previous;
        } else if let Some(next) = scan.finish() {
            let next = CursorValue::Timestamp(next);
            let checkpoint = match &stored {
                Some(current) => current.advance(next, Transition::Advance)?,
                None => Checkpoint::new(key.clone(), next),
            };
            if stored.as_ref() != Some(&checkpoint) {
                checkpoints
                    .save(&checkpoint)
                    .map_err(|e| LoaderError::CheckpointStore(e.to_string()))?;
            }
            report.checkpoint = match checkpoint.cursor {
                CursorValue::Timestamp(ts) => Some(ts),
                _ => None,
            };
        }

        info!("{}", report.summary());
        Ok(report)
    }

    fn load_document<S>(
        &self,
        store: &mut S,
        monitor: &mut ConflictMonitor,
        documents: &dyn DocumentSource,
        entry: &DocumentEntry,
    ) -> Result<DocumentStats, LoaderError>
    where
        S: EntityStore,
        S::Error: Display,
    {
        let path = entry.path.display().to_string();
        let fail = |record: usize, e: LoaderError| LoaderError::Document {
            path: path.clone(),
            record,
            message: e.to_string(),
        };

        let document = documents.read(entry).map_err(|e| fail(0, e))?;
        let records = self.mapper.records(&document).map_err(|e| fail(0, e))?;
        let total = records.len();

        store.begin().map_err(|e| fail(0, LoaderError::store(e)))?;

        let mut stats = DocumentStats::default();
        for (index, record) in records.into_iter().enumerate() {
            let graph = match self.mapper.map(record) {
                Ok(graph) if graph.is_empty() => {
                    debug!("Record {} of {} mentions no entities", index, path);
                    stats.records_skipped += 1;
                    continue;
                }
                Ok(graph) => graph,
                Err(e) => {
                    warn!("Skipping record {} of {}: {}", index, path, e);
                    stats.records_skipped += 1;
                    continue;
                }
            };

            if let Err(e) = self.load_graph(store, monitor, &graph, &mut stats) {
                if let Err(rollback) = store.rollback() {
                    error!("Rollback of {} failed: {}", path, rollback);
                }
                return Err(fail(index, e));
            }
            stats.records_loaded += 1;
        }

        if let Err(e) = store.commit() {
            if let Err(rollback) = store.rollback() {
                error!("Rollback of {} failed: {}", path, rollback);
            }
            return Err(fail(total, LoaderError::store(e)));
        }

        debug!("Committed {} ({} records)", path, stats.records_loaded);
        Ok(stats)
    }

    fn load_graph<S>(
        &self,
        store: &mut S,
        monitor: &mut ConflictMonitor,
        graph: &EntityGraph,
        stats: &mut DocumentStats,
    ) -> Result<(), LoaderError>
    where
        S: EntityStore,
        S::Error: Display,
    {
        let mut resolved: Vec<ResolvedEntity> = Vec::with_capacity(graph.nodes().len());
        for node in graph.nodes() {
            let entity = match &node.parent {
                Some(link) => {
                    let parent = resolved
                        .get(link.node)
                        .ok_or_else(|| LoaderError::Mapping(format!("parent of '{}' not resolved", node.alias)))?;
                    let mut reference = node.reference.clone();
                    reference
                        .attributes
                        .insert(link.field.clone(), parent.row_id.to_string());
                    self.resolver.resolve(store, monitor, &reference)?
                }
                None => self.resolver.resolve(store, monitor, &node.reference)?,
            };
            resolved.push(entity);
        }
        stats.entities += resolved.len();

        let nodes = graph.nodes();
        for relation in graph.relations() {
            let (from, to) = (&resolved[relation.from], &resolved[relation.to]);
            let row = Relation {
                from_type: nodes[relation.from].reference.entity_type.clone(),
                from_id: from.row_id,
                relation: relation.relation.clone(),
                to_type: nodes[relation.to].reference.entity_type.clone(),
                to_id: to.row_id,
            };
            // A fresh endpoint cannot have links yet.
            let missing = from.created || to.created || !store.has_link(&row).map_err(LoaderError::store)?;
            if missing && store.link(&row).map_err(LoaderError::store)? {
                stats.relations += 1;
            }
        }
        Ok(())
    }
}
