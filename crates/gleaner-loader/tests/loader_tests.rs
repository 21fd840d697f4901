//! Load stage against an in-memory store

use gleaner_domain::traits::{CheckpointStore, EntityStore, Relation};
use gleaner_domain::{Checkpoint, CheckpointKey, CursorKind, CursorValue, RawRecord};
use gleaner_harvest::{JsonDirSink, RawSink, RunId};
use gleaner_loader::{DirectoryDocuments, LoadReport, Loader, LoaderConfig, LoaderError, MapperConfig, StaticDocuments};
use gleaner_resolver::{ConflictMonitor, EntityResolver, ResolverConfig};
use gleaner_store::catalogue::{default_catalogue, FUNDING_PROGRAMME, INSTITUTION, PROJECT};
use gleaner_store::{FileCheckpointStore, SqliteStore};
use serde_json::{json, Value};
use tempfile::TempDir;

const MAPPER: &str = r#"
    [[nodes]]
    alias = "programme"
    entity_type = "funding_programme"
    key = { code = "/programme/code" }
    search_text = "/programme/title"

    [[nodes]]
    alias = "project"
    entity_type = "project"
    key = { external_id = "/id" }
    constants = { source = "cordis" }
    search_text = "/title"
    parent = { node = "programme", field = "programme_id" }
    required = true

    [[nodes]]
    alias = "partner"
    entity_type = "institution"
    each = "/participants"
    key = { ror_id = "/ror" }
    search_text = "/name"
    attributes = { country = "/country", motto = "/motto" }

    [[relations]]
    from = "project"
    relation = "participant"
    to = "partner"
"#;

struct Fixture {
    store: SqliteStore,
    checkpoints: SqliteStore,
    loader: Loader,
    monitor: ConflictMonitor,
}

fn fixture(config: LoaderConfig) -> Fixture {
    let store = SqliteStore::new(":memory:", default_catalogue()).unwrap();
    let checkpoints = SqliteStore::new(":memory:", default_catalogue()).unwrap();
    let resolver = EntityResolver::new(ResolverConfig::default(), &store).unwrap();
    let monitor = resolver.new_monitor();
    let mapper: MapperConfig = toml::from_str(MAPPER).unwrap();
    let loader = Loader::from_config(resolver, LoaderConfig { mapper, ..config }).unwrap();
    Fixture {
        store,
        checkpoints,
        loader,
        monitor,
    }
}

impl Fixture {
    fn load(&mut self, documents: &StaticDocuments) -> Result<LoadReport, LoaderError> {
        self.loader
            .load(&mut self.store, &mut self.checkpoints, "cordis", documents, &mut self.monitor)
    }

    fn checkpoint(&self) -> Option<CursorValue> {
        self.checkpoints
            .load(&CheckpointKey::new("cordis", "load"), CursorKind::Timestamp)
            .unwrap()
            .map(|c| c.cursor)
    }
}

fn project(id: &str, title: &str, partners: Value) -> Value {
    json!({
        "id": id,
        "payload": {
            "id": id,
            "title": title,
            "programme": {"code": "HORIZON-CL6", "title": "Food, Bioeconomy, Natural Resources"},
            "participants": partners,
        }
    })
}

fn document(records: Vec<Value>) -> Value {
    json!({"source_id": "cordis", "records": records})
}

fn ocean_project() -> Value {
    project(
        "101057",
        "Ocean Carbon Futures",
        json!([
            {"name": "University of Bergen", "ror": "https://ror.org/03zga2b32", "country": "NO"},
            {"name": "Max-Planck-Institut für Meteorologie", "country": "DE"}
        ]),
    )
}

/// A partner with a field the institution table does not have
fn broken_project() -> Value {
    project(
        "101099",
        "Arctic Permafrost Observatory",
        json!([{"name": "Norwegian Polar Institute", "motto": "North"}]),
    )
}

#[test]
fn test_loads_graph_parents_first_with_relations() {
    let mut fx = fixture(LoaderConfig::default());
    let documents = StaticDocuments::new().with("raw/a.json", 100, document(vec![ocean_project()]));

    let report = fx.load(&documents).unwrap();
    assert_eq!(report.documents_processed, 1);
    assert_eq!(report.records_loaded, 1);
    assert_eq!(report.entities_resolved, 4);
    assert_eq!(report.relations_created, 2);
    assert_eq!(report.checkpoint, Some(100));

    assert_eq!(fx.store.count(FUNDING_PROGRAMME).unwrap(), 1);
    assert_eq!(fx.store.count(PROJECT).unwrap(), 1);
    assert_eq!(fx.store.count(INSTITUTION).unwrap(), 2);

    let programme = fx
        .store
        .find_by_key(FUNDING_PROGRAMME, &[("code".to_string(), "HORIZON-CL6".to_string())].into())
        .unwrap()
        .unwrap();
    let project = fx
        .store
        .find_by_key(
            PROJECT,
            &[
                ("source".to_string(), "cordis".to_string()),
                ("external_id".to_string(), "101057".to_string()),
            ]
            .into(),
        )
        .unwrap()
        .unwrap();
    assert_eq!(project.field("programme_id"), Some(programme.row_id.to_string().as_str()));
    assert_eq!(project.field("title"), Some("Ocean Carbon Futures"));

    let bergen = fx
        .store
        .find_by_key(INSTITUTION, &[("ror_id".to_string(), "https://ror.org/03zga2b32".to_string())].into())
        .unwrap()
        .unwrap();
    let link = Relation {
        from_type: PROJECT.to_string(),
        from_id: project.row_id,
        relation: "participant".to_string(),
        to_type: INSTITUTION.to_string(),
        to_id: bergen.row_id,
    };
    assert!(fx.store.has_link(&link).unwrap());
}

#[test]
fn test_reloading_a_document_creates_nothing() {
    let mut fx = fixture(LoaderConfig::default());
    let documents = StaticDocuments::new().with("raw/a.json", 100, document(vec![ocean_project()]));

    fx.load(&documents).unwrap();
    // Within epsilon of the checkpoint, so the document is processed again.
    let again = fx.load(&documents).unwrap();

    assert_eq!(again.documents_processed, 1);
    assert_eq!(again.relations_created, 0);
    assert_eq!(fx.store.count(INSTITUTION).unwrap(), 2);
    assert_eq!(fx.store.count(PROJECT).unwrap(), 1);
    assert_eq!(fx.monitor.created, 4);
    assert_eq!(fx.monitor.total_conflicts(), 0);
}

#[test]
fn test_mtime_checkpoint_written_once_and_skips_old_documents() {
    let mut fx = fixture(LoaderConfig::default());
    let first = StaticDocuments::new()
        .with("raw/c.json", 300, document(vec![]))
        .with("raw/a.json", 100, document(vec![ocean_project()]))
        .with("raw/b.json", 200, document(vec![]));
    let report = fx.load(&first).unwrap();
    assert_eq!(report.documents_processed, 3);
    assert_eq!(fx.checkpoint(), Some(CursorValue::Timestamp(300)));

    let second = StaticDocuments::new()
        .with("raw/a.json", 100, document(vec![ocean_project()]))
        .with("raw/d.json", 400, document(vec![]));
    let report = fx.load(&second).unwrap();
    assert_eq!(report.documents_skipped, 1);
    assert_eq!(report.documents_processed, 1);
    assert_eq!(fx.checkpoint(), Some(CursorValue::Timestamp(400)));
}

#[test]
fn test_failed_document_rolls_back_and_aborts() {
    let mut fx = fixture(LoaderConfig::default());
    let documents = StaticDocuments::new()
        .with("raw/a.json", 10, document(vec![ocean_project()]))
        .with(
            "raw/b.json",
            20,
            document(vec![
                project("101077", "Soil Microbiome Atlas", json!([{"name": "Wageningen University"}])),
                broken_project(),
            ]),
        )
        .with("raw/c.json", 30, document(vec![]));

    let err = fx.load(&documents).unwrap_err();
    match err {
        LoaderError::Document { path, record, .. } => {
            assert_eq!(path, "raw/b.json");
            assert_eq!(record, 1);
        }
        other => panic!("unexpected error: {}", other),
    }

    // Only document a committed; b's first record was rolled back with it.
    assert_eq!(fx.store.count(PROJECT).unwrap(), 1);
    assert_eq!(fx.store.count(INSTITUTION).unwrap(), 2);
    assert_eq!(fx.monitor.created, 4);
    assert_eq!(fx.checkpoint(), None);
}

#[test]
fn test_enrichment_mode_skips_failed_documents_without_advancing() {
    let mut fx = fixture(LoaderConfig::enrichment());
    fx.checkpoints
        .save(&Checkpoint::new(CheckpointKey::new("cordis", "load"), CursorValue::Timestamp(5)))
        .unwrap();
    let documents = StaticDocuments::new()
        .with("raw/a.json", 10, document(vec![ocean_project()]))
        .with("raw/b.json", 20, document(vec![broken_project()]))
        .with(
            "raw/c.json",
            30,
            document(vec![project("101088", "Urban Heat Islands", json!([{"name": "Delft University of Technology"}]))]),
        );

    let report = fx.load(&documents).unwrap();
    assert!(!report.is_success());
    assert_eq!(report.documents_processed, 2);
    assert_eq!(report.documents_failed, 1);
    assert_eq!(report.checkpoint, Some(5));
    assert_eq!(fx.checkpoint(), Some(CursorValue::Timestamp(5)));
    assert_eq!(fx.store.count(PROJECT).unwrap(), 2);
    assert_eq!(fx.monitor.created, fx.store.count(PROJECT).unwrap() + fx.store.count(INSTITUTION).unwrap() + 1);
}

#[test]
fn test_unmappable_records_are_skipped() {
    let mut fx = fixture(LoaderConfig::default());
    let documents = StaticDocuments::new().with(
        "raw/a.json",
        10,
        document(vec![json!({"id": "x", "payload": {"acronym": "NOID"}}), ocean_project()]),
    );

    let report = fx.load(&documents).unwrap();
    assert!(report.is_success());
    assert_eq!(report.records_skipped, 1);
    assert_eq!(report.records_loaded, 1);
}

#[test]
fn test_loads_raw_sink_output_from_disk() {
    let raw = TempDir::new().unwrap();
    let checkpoints_dir = TempDir::new().unwrap();
    let mut sink = JsonDirSink::new(raw.path());
    let records = vec![RawRecord::new(
        "101057",
        json!({
            "id": "101057",
            "title": "Ocean Carbon Futures",
            "participants": [{"name": "University of Bergen", "ror": "https://ror.org/03zga2b32"}]
        }),
    )];
    sink.write_unit(&RunId::new(), &CheckpointKey::new("cordis", "projects"), &CursorValue::Offset(0), &records)
        .unwrap();

    let mut store = SqliteStore::new(":memory:", default_catalogue()).unwrap();
    let resolver = EntityResolver::new(ResolverConfig::default(), &store).unwrap();
    let mut monitor = resolver.new_monitor();
    let mapper: MapperConfig = toml::from_str(MAPPER).unwrap();
    let loader = Loader::from_config(
        resolver,
        LoaderConfig {
            mapper,
            ..LoaderConfig::default()
        },
    )
    .unwrap();

    let mut checkpoints = FileCheckpointStore::new(checkpoints_dir.path());
    let documents = DirectoryDocuments::new(raw.path());
    let report = loader
        .load(&mut store, &mut checkpoints, "cordis", &documents, &mut monitor)
        .unwrap();

    assert_eq!(report.documents_processed, 1);
    assert_eq!(report.relations_created, 1);
    assert_eq!(store.count(PROJECT).unwrap(), 1);
    assert_eq!(store.count(FUNDING_PROGRAMME).unwrap(), 0);
    assert!(report.checkpoint.is_some());
}
