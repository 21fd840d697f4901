//! Entity graphs
//!
//! One record maps to a small graph: entity references in dependency order,
//! foreign-key links from a child to a parent node, and relation rows
//! between nodes. Parents always precede their children, so resolving the
//! nodes in order can inject each parent's row id before the child is
//! resolved.

use crate::error::LoaderError;
use gleaner_domain::EntityReference;

/// A child's link to its parent node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParentLink {
    /// Index of the parent node
    pub node: usize,
    /// Foreign-key field on the child receiving the parent's row id
    pub field: String,
}

/// One entity reference in a graph
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphNode {
    /// Mapper alias, indexed for expanded arrays (`partner[1]`)
    pub alias: String,
    /// Reference to resolve
    pub reference: EntityReference,
    /// Parent link, if any
    pub parent: Option<ParentLink>,
}

/// A relation row between two nodes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphRelation {
    /// Index of the source node
    pub from: usize,
    /// Relation name
    pub relation: String,
    /// Index of the target node
    pub to: usize,
}

/// Nodes in dependency order plus relations between them
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntityGraph {
    nodes: Vec<GraphNode>,
    relations: Vec<GraphRelation>,
}

impl EntityGraph {
    /// Create an empty graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a root node and return its index
    pub fn add_node(&mut self, alias: impl Into<String>, reference: EntityReference) -> usize {
        self.nodes.push(GraphNode {
            alias: alias.into(),
            reference,
            parent: None,
        });
        self.nodes.len() - 1
    }

    /// Append a node whose `field` receives the row id of node `parent`
    pub fn add_child(
        &mut self,
        alias: impl Into<String>,
        reference: EntityReference,
        parent: usize,
        field: impl Into<String>,
    ) -> Result<usize, LoaderError> {
        let alias = alias.into();
        if parent >= self.nodes.len() {
            return Err(LoaderError::Mapping(format!(
                "parent {} of '{}' is not an earlier node",
                parent, alias
            )));
        }
        self.nodes.push(GraphNode {
            alias,
            reference,
            parent: Some(ParentLink {
                node: parent,
                field: field.into(),
            }),
        });
        Ok(self.nodes.len() - 1)
    }

    /// Add a relation between two existing nodes
    pub fn relate(&mut self, from: usize, relation: impl Into<String>, to: usize) -> Result<(), LoaderError> {
        let relation = relation.into();
        if from >= self.nodes.len() || to >= self.nodes.len() {
            return Err(LoaderError::Mapping(format!(
                "relation '{}' refers to a missing node ({} -> {})",
                relation, from, to
            )));
        }
        self.relations.push(GraphRelation { from, relation, to });
        Ok(())
    }

    /// Nodes in dependency order
    pub fn nodes(&self) -> &[GraphNode] {
        &self.nodes
    }

    /// Relations
    pub fn relations(&self) -> &[GraphRelation] {
        &self.relations
    }

    /// Index of the first node with this alias
    pub fn find(&self, alias: &str) -> Option<usize> {
        self.nodes.iter().position(|n| n.alias == alias)
    }

    /// Whether the graph has no nodes
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}
