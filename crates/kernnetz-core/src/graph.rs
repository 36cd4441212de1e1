//! # Graph Store
//!
//! The property-graph contract the resolution engine runs against, and the
//! in-memory implementation used for tests and dry analysis.
//!
//! The engine only ever needs three things from a store:
//! 1. pattern-match reads returning rows of properties (`query`)
//! 2. upsert-by-key node and edge creation
//! 3. property overwrite on a handle
//!
//! All data structures use `BTreeMap` for deterministic ordering.

use crate::query::{self, Pattern};
use crate::{
    EdgeHandle, EdgeLabel, KernnetzError, NodeHandle, NodeLabel, Properties, PropertyValue, Row,
    Upserted,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// =============================================================================
// RECORDS
// =============================================================================

/// A node as seen through the store: label, key, and its property map.
///
/// The key property is always present in `properties` as text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    pub handle: NodeHandle,
    pub label: NodeLabel,
    pub key: String,
    pub properties: Properties,
}

impl NodeRecord {
    /// Convert into a query row.
    #[must_use]
    pub fn into_row(self) -> Row {
        Row(self.properties)
    }
}

/// A directed edge as seen through the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeRecord {
    pub handle: EdgeHandle,
    pub label: EdgeLabel,
    pub from: NodeHandle,
    pub to: NodeHandle,
    pub properties: Properties,
}

// =============================================================================
// GRAPHSTORE TRAIT
// =============================================================================

/// The GraphStore trait defines the store operations the engine relies on.
///
/// All fallible operations return `Result<T, KernnetzError>` to support both
/// in-memory and persistent storage backends uniformly. Every mutation is an
/// upsert, so repeating a call is always safe.
pub trait GraphStore {
    /// Find or create the node identified by `(label, key)`.
    fn upsert_node(
        &mut self,
        label: NodeLabel,
        key: &str,
    ) -> Result<Upserted<NodeHandle>, KernnetzError>;

    /// Look up a node by `(label, key)` without creating it.
    fn find_node(&self, label: NodeLabel, key: &str) -> Result<Option<NodeHandle>, KernnetzError>;

    /// Fetch a node record.
    fn node(&self, handle: NodeHandle) -> Result<Option<NodeRecord>, KernnetzError>;

    /// Overwrite the named properties of a node. Other properties are kept.
    fn set_node_properties(
        &mut self,
        handle: NodeHandle,
        properties: Properties,
    ) -> Result<(), KernnetzError>;

    /// Find or create the single `label` edge from `from` to `to`.
    ///
    /// Returns `NodeNotFound` if either endpoint does not exist.
    fn upsert_edge(
        &mut self,
        label: EdgeLabel,
        from: NodeHandle,
        to: NodeHandle,
    ) -> Result<Upserted<EdgeHandle>, KernnetzError>;

    /// Overwrite the named properties of an edge. Other properties are kept.
    fn set_edge_properties(
        &mut self,
        handle: EdgeHandle,
        properties: Properties,
    ) -> Result<(), KernnetzError>;

    /// All nodes with the given label, ordered by handle.
    fn nodes_by_label(&self, label: NodeLabel) -> Result<Vec<NodeRecord>, KernnetzError>;

    /// All edges with the given label, ordered by handle.
    fn edges_by_label(&self, label: EdgeLabel) -> Result<Vec<EdgeRecord>, KernnetzError>;

    /// Outgoing `label` edges of a node, ordered by target handle.
    fn edges_from(
        &self,
        from: NodeHandle,
        label: EdgeLabel,
    ) -> Result<Vec<EdgeRecord>, KernnetzError>;

    /// Get the total number of nodes.
    fn node_count(&self) -> Result<usize, KernnetzError>;

    /// Get the total number of edges.
    fn edge_count(&self) -> Result<usize, KernnetzError>;

    /// Pattern-match read returning rows of properties.
    fn query(&self, pattern: &Pattern) -> Result<Vec<Row>, KernnetzError> {
        query::evaluate(self, pattern)
    }
}

/// Store a single property on a node.
pub fn set_node_property<G: GraphStore + ?Sized>(
    store: &mut G,
    handle: NodeHandle,
    name: &str,
    value: PropertyValue,
) -> Result<(), KernnetzError> {
    let mut properties = Properties::new();
    properties.insert(name.to_string(), value);
    store.set_node_properties(handle, properties)
}

// =============================================================================
// GRAPH IMPLEMENTATION
// =============================================================================

#[derive(Debug, Clone)]
struct StoredEdge {
    label: EdgeLabel,
    from: NodeHandle,
    to: NodeHandle,
    properties: Properties,
}

/// The in-memory property graph.
///
/// Uses `BTreeMap` exclusively for deterministic ordering.
#[derive(Debug, Clone, Default)]
pub struct Graph {
    /// Node storage: handle -> record
    nodes: BTreeMap<NodeHandle, NodeRecord>,

    /// Key index: (label, key) -> handle
    node_index: BTreeMap<(NodeLabel, String), NodeHandle>,

    /// Edge storage: handle -> edge
    edges: BTreeMap<EdgeHandle, StoredEdge>,

    /// Edge index: (label, from, to) -> handle
    edge_index: BTreeMap<(EdgeLabel, NodeHandle, NodeHandle), EdgeHandle>,

    next_node_id: u64,
    next_edge_id: u64,
}

impl Graph {
    /// Create a new empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn edge_record(handle: EdgeHandle, edge: &StoredEdge) -> EdgeRecord {
        EdgeRecord {
            handle,
            label: edge.label,
            from: edge.from,
            to: edge.to,
            properties: edge.properties.clone(),
        }
    }
}

impl GraphStore for Graph {
    fn upsert_node(
        &mut self,
        label: NodeLabel,
        key: &str,
    ) -> Result<Upserted<NodeHandle>, KernnetzError> {
        if let Some(&handle) = self.node_index.get(&(label, key.to_string())) {
            return Ok(Upserted::existing(handle));
        }

        let handle = NodeHandle(self.next_node_id);
        self.next_node_id = self.next_node_id.saturating_add(1);

        let mut properties = Properties::new();
        properties.insert(label.key_property().to_string(), PropertyValue::from(key));
        self.nodes.insert(
            handle,
            NodeRecord {
                handle,
                label,
                key: key.to_string(),
                properties,
            },
        );
        self.node_index.insert((label, key.to_string()), handle);

        Ok(Upserted::created(handle))
    }

    fn find_node(&self, label: NodeLabel, key: &str) -> Result<Option<NodeHandle>, KernnetzError> {
        Ok(self.node_index.get(&(label, key.to_string())).copied())
    }

    fn node(&self, handle: NodeHandle) -> Result<Option<NodeRecord>, KernnetzError> {
        Ok(self.nodes.get(&handle).cloned())
    }

    fn set_node_properties(
        &mut self,
        handle: NodeHandle,
        properties: Properties,
    ) -> Result<(), KernnetzError> {
        let record = self
            .nodes
            .get_mut(&handle)
            .ok_or(KernnetzError::NodeNotFound(handle))?;
        let key_property = record.label.key_property();
        for (name, value) in properties {
            // The key is immutable once assigned.
            if name == key_property {
                continue;
            }
            record.properties.insert(name, value);
        }
        Ok(())
    }

    fn upsert_edge(
        &mut self,
        label: EdgeLabel,
        from: NodeHandle,
        to: NodeHandle,
    ) -> Result<Upserted<EdgeHandle>, KernnetzError> {
        if !self.nodes.contains_key(&from) {
            return Err(KernnetzError::NodeNotFound(from));
        }
        if !self.nodes.contains_key(&to) {
            return Err(KernnetzError::NodeNotFound(to));
        }
        if let Some(&handle) = self.edge_index.get(&(label, from, to)) {
            return Ok(Upserted::existing(handle));
        }

        let handle = EdgeHandle(self.next_edge_id);
        self.next_edge_id = self.next_edge_id.saturating_add(1);
        self.edges.insert(
            handle,
            StoredEdge {
                label,
                from,
                to,
                properties: Properties::new(),
            },
        );
        self.edge_index.insert((label, from, to), handle);

        Ok(Upserted::created(handle))
    }

    fn set_edge_properties(
        &mut self,
        handle: EdgeHandle,
        properties: Properties,
    ) -> Result<(), KernnetzError> {
        let edge = self
            .edges
            .get_mut(&handle)
            .ok_or(KernnetzError::EdgeNotFound(handle))?;
        edge.properties.extend(properties);
        Ok(())
    }

    fn nodes_by_label(&self, label: NodeLabel) -> Result<Vec<NodeRecord>, KernnetzError> {
        Ok(self
            .nodes
            .values()
            .filter(|n| n.label == label)
            .cloned()
            .collect())
    }

    fn edges_by_label(&self, label: EdgeLabel) -> Result<Vec<EdgeRecord>, KernnetzError> {
        Ok(self
            .edges
            .iter()
            .filter(|(_, e)| e.label == label)
            .map(|(h, e)| Self::edge_record(*h, e))
            .collect())
    }

    fn edges_from(
        &self,
        from: NodeHandle,
        label: EdgeLabel,
    ) -> Result<Vec<EdgeRecord>, KernnetzError> {
        let mut records = Vec::new();
        for (_, handle) in self
            .edge_index
            .range((label, from, NodeHandle(0))..=(label, from, NodeHandle(u64::MAX)))
        {
            if let Some(edge) = self.edges.get(handle) {
                records.push(Self::edge_record(*handle, edge));
            }
        }
        Ok(records)
    }

    fn node_count(&self) -> Result<usize, KernnetzError> {
        Ok(self.nodes.len())
    }

    fn edge_count(&self) -> Result<usize, KernnetzError> {
        Ok(self.edges.len())
    }
}

// =============================================================================
// TESTS
// =============================================================================
