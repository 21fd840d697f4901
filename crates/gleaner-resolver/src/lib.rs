//! Gleaner Entity Resolution
//!
//! Decides, for every incoming entity reference, whether it denotes a row
//! already in the store or a new one.
//!
//! ## Resolution order
//!
//! 1. **Exact**: natural key lookup against a declared unique constraint
//! 2. **Fuzzy**: normalized display text, length/token/trigram pre-filter,
//!    Levenshtein distance within a length-proportional tolerance
//! 3. **Create**: insert, falling back to re-resolution on a key collision
//!
//! Existing rows are merged conservatively: empty fields are filled, differing
//! values are kept and reported to the run's [`ConflictMonitor`].
//!
//! ## Example
//!
//! ```no_run
//! use gleaner_domain::EntityReference;
//! use gleaner_resolver::{ConflictMonitor, EntityResolver, ResolverConfig};
//! use gleaner_store::{catalogue, SqliteStore};
//!
//! let mut store = SqliteStore::new(":memory:", catalogue::default_catalogue()).unwrap();
//! let resolver = EntityResolver::new(ResolverConfig::default(), &store).unwrap();
//! let mut monitor = ConflictMonitor::default();
//!
//! let reference = EntityReference::new("institution")
//!     .with_search_text("Max Planck Institute for Biology");
//! let resolved = resolver.resolve(&mut store, &mut monitor, &reference).unwrap();
//! println!("row {} created={}", resolved.row_id, resolved.created);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod fuzzy;
pub mod monitor;
pub mod resolver;

pub use config::ResolverConfig;
pub use error::ResolverError;
pub use fuzzy::{FuzzyMatch, FuzzyQuery};
pub use monitor::{ConflictMonitor, ConflictStats};
pub use resolver::EntityResolver;
