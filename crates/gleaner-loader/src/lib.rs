//! Gleaner Loader
//!
//! Loads harvested raw documents into the shared entity store.
//!
//! ## Pipeline
//!
//! 1. A [`DocumentSource`] lists documents with their modification times
//! 2. [`MtimeScan`](gleaner_harvest::MtimeScan) skips documents older than the load checkpoint
//! 3. A [`RecordMapper`] turns each record into an [`EntityGraph`]
//! 4. The [`EntityResolver`](gleaner_resolver::EntityResolver) resolves the
//!    graph's nodes parents-first, then relation rows are added
//! 5. The document commits as one transaction, or rolls back as a whole
//!
//! ## Example
//!
//! ```no_run
//! use gleaner_loader::{DirectoryDocuments, Loader, LoaderConfig};
//! use gleaner_resolver::{EntityResolver, ResolverConfig};
//! use gleaner_store::{catalogue, FileCheckpointStore, SqliteStore};
//!
//! # fn example(config: LoaderConfig) -> Result<(), Box<dyn std::error::Error>> {
//! let mut store = SqliteStore::new("gleaner.db", catalogue::default_catalogue())?;
//! let resolver = EntityResolver::new(ResolverConfig::default(), &store)?;
//! let mut monitor = resolver.new_monitor();
//! let loader = Loader::from_config(resolver, config)?;
//!
//! let mut checkpoints = FileCheckpointStore::new("checkpoints");
//! let documents = DirectoryDocuments::new("raw/cordis");
//! let report = loader.load(&mut store, &mut checkpoints, "cordis", &documents, &mut monitor)?;
//! println!("{}", report.summary());
//! println!("{}", monitor.summary());
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod documents;
pub mod error;
pub mod graph;
pub mod loader;
pub mod mapper;

pub use config::LoaderConfig;
pub use documents::{DirectoryDocuments, DocumentEntry, DocumentSource, StaticDocuments};
pub use error::LoaderError;
pub use graph::{EntityGraph, GraphNode, GraphRelation, ParentLink};
pub use loader::{LoadReport, Loader};
pub use mapper::{MapperConfig, NodeConfig, ParentConfig, PointerMapper, RecordMapper, RelationConfig};
