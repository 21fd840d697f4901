//! Record mapping
//!
//! A [`RecordMapper`] splits a raw document into records and turns each
//! record into an [`EntityGraph`]. [`PointerMapper`] does this declaratively
//! from JSON pointers, so a new provider needs configuration, not code:
//!
//! ```toml
//! [[nodes]]
//! alias = "programme"
//! entity_type = "funding_programme"
//! key = { code = "/programme/code" }
//! search_text = "/programme/title"
//!
//! [[nodes]]
//! alias = "project"
//! entity_type = "project"
//! key = { external_id = "/id" }
//! constants = { source = "cordis" }
//! search_text = "/title"
//! parent = { node = "programme", field = "programme_id" }
//! required = true
//!
//! [[nodes]]
//! alias = "partner"
//! entity_type = "institution"
//! each = "/participants"
//! key = { ror_id = "/ror" }
//! search_text = "/name"
//!
//! [[relations]]
//! from = "project"
//! relation = "participant"
//! to = "partner"
//! ```

use crate::error::LoaderError;
use crate::graph::EntityGraph;
use gleaner_domain::EntityReference;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};

/// Turns raw documents into entity graphs
pub trait RecordMapper {
    /// The records of a document
    fn records<'a>(&self, document: &'a Value) -> Result<Vec<&'a Value>, LoaderError>;

    /// Map one record to the graph of entities it mentions
    fn map(&self, record: &Value) -> Result<EntityGraph, LoaderError>;
}

/// Declarative mapper settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapperConfig {
    /// Pointer to the record array (or single record object) in a document
    #[serde(default = "default_records_pointer")]
    pub records_pointer: String,

    /// Pointer to the mapped payload inside a record
    #[serde(default = "default_payload_pointer")]
    pub payload_pointer: String,

    /// Nodes, parents before children
    #[serde(default)]
    pub nodes: Vec<NodeConfig>,

    /// Relations between nodes
    #[serde(default)]
    pub relations: Vec<RelationConfig>,
}

/// One entity node of the mapping
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Name used by `parent` and relations
    pub alias: String,

    /// Target entity type
    pub entity_type: String,

    /// Expand over the array at this pointer; other pointers are then relative to each element
    #[serde(default)]
    pub each: Option<String>,

    /// Natural-key field to pointer
    #[serde(default)]
    pub key: BTreeMap<String, String>,

    /// Natural-key fields with fixed values
    #[serde(default)]
    pub constants: BTreeMap<String, String>,

    /// Pointer to the fuzzy search text
    #[serde(default)]
    pub search_text: Option<String>,

    /// Attribute field to pointer
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,

    /// Parent node and the foreign-key field receiving its row id
    #[serde(default)]
    pub parent: Option<ParentConfig>,

    /// Fail the record when the node cannot be built
    #[serde(default)]
    pub required: bool,
}

/// Parent reference of a node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParentConfig {
    /// Parent alias
    pub node: String,
    /// Foreign-key field on the child
    pub field: String,
}

/// Relation between two node aliases
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationConfig {
    /// Source alias
    pub from: String,
    /// Relation name
    pub relation: String,
    /// Target alias
    pub to: String,
}

fn default_records_pointer() -> String {
    "/records".to_string()
}

fn default_payload_pointer() -> String {
    "/payload".to_string()
}

impl Default for MapperConfig {
    fn default() -> Self {
        Self {
            records_pointer: default_records_pointer(),
            payload_pointer: default_payload_pointer(),
            nodes: Vec::new(),
            relations: Vec::new(),
        }
    }
}

fn check_pointer(pointer: &str, what: &str) -> Result<(), String> {
    if pointer.is_empty() || pointer.starts_with('/') {
        Ok(())
    } else {
        Err(format!("{} '{}' is not a JSON pointer", what, pointer))
    }
}

impl MapperConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        check_pointer(&self.records_pointer, "records_pointer")?;
        check_pointer(&self.payload_pointer, "payload_pointer")?;

        let mut seen: HashMap<&str, &NodeConfig> = HashMap::new();
        for node in &self.nodes {
            if node.alias.trim().is_empty() {
                return Err("node alias must not be empty".to_string());
            }
            if node.entity_type.trim().is_empty() {
                return Err(format!("node '{}' has no entity_type", node.alias));
            }
            if node.key.is_empty() && node.search_text.is_none() {
                return Err(format!("node '{}' needs a key or a search_text", node.alias));
            }
            if let Some(each) = &node.each {
                check_pointer(each, "each")?;
            }
            if let Some(search_text) = &node.search_text {
                check_pointer(search_text, "search_text")?;
            }
            for pointer in node.key.values().chain(node.attributes.values()) {
                check_pointer(pointer, "field pointer")?;
            }
            if let Some(parent) = &node.parent {
                match seen.get(parent.node.as_str()) {
                    None => {
                        return Err(format!(
                            "parent '{}' of node '{}' must be declared before it",
                            parent.node, node.alias
                        ))
                    }
                    Some(p) if p.each.is_some() => {
                        return Err(format!("parent '{}' of node '{}' is an array node", parent.node, node.alias))
                    }
                    Some(_) => {}
                }
                if parent.field.trim().is_empty() {
                    return Err(format!("node '{}' has an empty parent field", node.alias));
                }
            }
            if seen.insert(node.alias.as_str(), node).is_some() {
                return Err(format!("duplicate node alias '{}'", node.alias));
            }
        }

        for relation in &self.relations {
            if relation.relation.trim().is_empty() {
                return Err(format!("relation {} -> {} has no name", relation.from, relation.to));
            }
            for alias in [&relation.from, &relation.to] {
                if !seen.contains_key(alias.as_str()) {
                    return Err(format!("relation '{}' refers to unknown node '{}'", relation.relation, alias));
                }
            }
        }
        Ok(())
    }
}

/// Scalar at a pointer as a trimmed, non-empty string
fn scalar_at(value: &Value, pointer: &str) -> Option<String> {
    match value.pointer(pointer)? {
        Value::String(s) => {
            let s = s.trim();
            (!s.is_empty()).then(|| s.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

impl NodeConfig {
    /// Build the reference for one scope, or `None` when it has neither a
    /// complete key nor search text
    ///
    /// An incomplete key is demoted to attributes so the reference can
    /// still resolve by text.
    fn reference(&self, scope: &Value) -> Option<EntityReference> {
        let mut reference = EntityReference::new(self.entity_type.clone());

        let mut key = BTreeMap::new();
        let mut complete = !self.key.is_empty();
        for (field, pointer) in &self.key {
            match scalar_at(scope, pointer) {
                Some(value) => {
                    key.insert(field.clone(), value);
                }
                None => complete = false,
            }
        }
        for (field, value) in &self.constants {
            key.insert(field.clone(), value.clone());
        }

        for (field, pointer) in &self.attributes {
            if let Some(value) = scalar_at(scope, pointer) {
                reference.attributes.insert(field.clone(), value);
            }
        }
        if complete {
            reference.natural_key = key;
        } else {
            reference.attributes.extend(key);
        }
        reference.search_text = self.search_text.as_deref().and_then(|p| scalar_at(scope, p));

        (reference.has_natural_key() || reference.search_text.is_some()).then_some(reference)
    }
}

/// Mapper driven by a [`MapperConfig`]
#[derive(Debug, Clone)]
pub struct PointerMapper {
    config: MapperConfig,
}

impl PointerMapper {
    /// Create a mapper, validating the configuration
    pub fn new(config: MapperConfig) -> Result<Self, LoaderError> {
        if config.nodes.is_empty() {
            return Err(LoaderError::Config("mapper declares no nodes".to_string()));
        }
        config.validate().map_err(LoaderError::Config)?;
        Ok(Self { config })
    }

    /// Mapper configuration
    pub fn config(&self) -> &MapperConfig {
        &self.config
    }
}

impl RecordMapper for PointerMapper {
    fn records<'a>(&self, document: &'a Value) -> Result<Vec<&'a Value>, LoaderError> {
        match document.pointer(&self.config.records_pointer) {
            Some(Value::Array(items)) => Ok(items.iter().collect()),
            Some(record @ Value::Object(_)) => Ok(vec![record]),
            Some(Value::Null) => Ok(Vec::new()),
            Some(_) => Err(LoaderError::Mapping(format!(
                "'{}' is neither an array nor an object",
                self.config.records_pointer
            ))),
            None => Err(LoaderError::Mapping(format!(
                "document has no '{}'",
                self.config.records_pointer
            ))),
        }
    }

    fn map(&self, record: &Value) -> Result<EntityGraph, LoaderError> {
        let payload = record
            .pointer(&self.config.payload_pointer)
            .ok_or_else(|| LoaderError::Mapping(format!("record has no '{}'", self.config.payload_pointer)))?;

        let mut graph = EntityGraph::new();
        let mut instances: HashMap<&str, Vec<usize>> = HashMap::new();

        for node in &self.config.nodes {
            let scopes: Vec<(String, &Value)> = match &node.each {
                None => vec![(node.alias.clone(), payload)],
                Some(pointer) => match payload.pointer(pointer) {
                    Some(Value::Array(items)) => items
                        .iter()
                        .enumerate()
                        .map(|(i, item)| (format!("{}[{}]", node.alias, i), item))
                        .collect(),
                    Some(Value::Null) | None => Vec::new(),
                    Some(_) => {
                        return Err(LoaderError::Mapping(format!(
                            "'{}' of node '{}' is not an array",
                            pointer, node.alias
                        )))
                    }
                },
            };

            let parent = node
                .parent
                .as_ref()
                .and_then(|p| instances.get(p.node.as_str()).and_then(|v| v.first().copied()).map(|i| (i, p)));

            let mut indices = Vec::new();
            for (alias, scope) in scopes {
                let Some(reference) = node.reference(scope) else {
                    continue;
                };
                let index = match parent {
                    Some((parent, link)) => graph.add_child(alias, reference, parent, link.field.clone())?,
                    None => graph.add_node(alias, reference),
                };
                indices.push(index);
            }

            if indices.is_empty() && node.required {
                return Err(LoaderError::Mapping(format!(
                    "required node '{}' has no key or search text",
                    node.alias
                )));
            }
            instances.insert(node.alias.as_str(), indices);
        }

        let mut seen = HashSet::new();
        for relation in &self.config.relations {
            let (Some(froms), Some(tos)) = (instances.get(relation.from.as_str()), instances.get(relation.to.as_str()))
            else {
                continue;
            };
            for &from in froms {
                for &to in tos {
                    if from != to && seen.insert((from, relation.relation.as_str(), to)) {
                        graph.relate(from, relation.relation.clone(), to)?;
                    }
                }
            }
        }

        Ok(graph)
    }
}
