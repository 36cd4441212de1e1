//! # redb-backed Graph Storage
//!
//! A disk-backed property graph using the redb embedded database.
//!
//! - ACID transactions, one per mutation
//! - Crash safety (copy-on-write B-trees)
//! - Node and edge records are postcard-encoded
//!
//! A crash mid-run leaves every committed upsert in place; the next run
//! re-merges over it.

use crate::graph::{EdgeRecord, GraphStore, NodeRecord};
use crate::{
    EdgeHandle, EdgeLabel, KernnetzError, NodeHandle, NodeLabel, Properties, PropertyValue,
    Upserted,
};
use redb::{Database, ReadableDatabase, ReadableTable, ReadableTableMetadata, TableDefinition};
use std::collections::BTreeMap;
use std::path::Path;

/// Table for nodes: NodeHandle(u64) -> serialized NodeRecord bytes
const NODES: TableDefinition<u64, &[u8]> = TableDefinition::new("nodes");

/// Table for edges: EdgeHandle(u64) -> serialized EdgeRecord bytes
const EDGES: TableDefinition<u64, &[u8]> = TableDefinition::new("edges");

/// Table for the edge index: (label code, from, to) -> EdgeHandle(u64)
const EDGE_INDEX: TableDefinition<(u8, u64, u64), u64> = TableDefinition::new("edge_index");

/// Table for metadata: key string -> value u64
const METADATA: TableDefinition<&str, u64> = TableDefinition::new("metadata");

fn io_err(e: impl std::fmt::Display) -> KernnetzError {
    KernnetzError::IoError(e.to_string())
}

fn encode<T: serde::Serialize>(value: &T) -> Result<Vec<u8>, KernnetzError> {
    postcard::to_allocvec(value).map_err(|e| KernnetzError::SerializationError(e.to_string()))
}

fn decode<'a, T: serde::Deserialize<'a>>(bytes: &'a [u8]) -> Result<T, KernnetzError> {
    postcard::from_bytes(bytes).map_err(|e| KernnetzError::DeserializationError(e.to_string()))
}

const fn edge_label_code(label: EdgeLabel) -> u8 {
    match label {
        EdgeLabel::InYear => 0,
        EdgeLabel::Serves => 1,
        EdgeLabel::ConnectsTo => 2,
        EdgeLabel::HasSnapshot => 3,
        EdgeLabel::ServesCore => 4,
    }
}

/// A disk-backed graph store using redb.
///
/// The `(label, key)` index is mirrored in memory so that upserts of
/// existing nodes never open a write transaction.
pub struct RedbGraph {
    /// The redb database handle.
    db: Database,
    /// In-memory cache of (label, key) -> node mapping.
    key_cache: BTreeMap<(NodeLabel, String), NodeHandle>,
    /// Next available node handle.
    next_node_id: u64,
    /// Next available edge handle.
    next_edge_id: u64,
}

impl std::fmt::Debug for RedbGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbGraph")
            .field("key_cache_size", &self.key_cache.len())
            .field("next_node_id", &self.next_node_id)
            .field("next_edge_id", &self.next_edge_id)
            .finish_non_exhaustive()
    }
}

impl RedbGraph {
    /// Open or create a graph database at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, KernnetzError> {
        let db = Database::create(path.as_ref()).map_err(io_err)?;

        // Initialize tables if they don't exist
        {
            let write_txn = db.begin_write().map_err(io_err)?;
            let _ = write_txn.open_table(NODES).map_err(io_err)?;
            let _ = write_txn.open_table(EDGES).map_err(io_err)?;
            let _ = write_txn.open_table(EDGE_INDEX).map_err(io_err)?;
            let _ = write_txn.open_table(METADATA).map_err(io_err)?;
            write_txn.commit().map_err(io_err)?;
        }

        let read_txn = db.begin_read().map_err(io_err)?;

        let (next_node_id, next_edge_id) = {
            let table = read_txn.open_table(METADATA).map_err(io_err)?;
            let node = table
                .get("next_node_id")
                .map_err(io_err)?
                .map(|v| v.value())
                .unwrap_or(0);
            let edge = table
                .get("next_edge_id")
                .map_err(io_err)?
                .map(|v| v.value())
                .unwrap_or(0);
            (node, edge)
        };

        // The (label, key) index lives only in memory and is rebuilt here.
        let key_cache = {
            let nodes = read_txn.open_table(NODES).map_err(io_err)?;
            let mut cache = BTreeMap::new();
            for entry in nodes.iter().map_err(io_err)? {
                let (_, data) = entry.map_err(io_err)?;
                let record: NodeRecord = decode(data.value())?;
                cache.insert((record.label, record.key), record.handle);
            }
            cache
        };

        tracing::debug!(
            nodes = key_cache.len(),
            next_edge_id,
            "opened redb graph store"
        );

        Ok(Self {
            db,
            key_cache,
            next_node_id,
            next_edge_id,
        })
    }

    /// Compact the database (optional optimization).
    pub fn compact(&mut self) -> Result<(), KernnetzError> {
        self.db.compact().map_err(io_err)?;
        Ok(())
    }

    fn contains_node(&self, handle: NodeHandle) -> Result<bool, KernnetzError> {
        let read_txn = self.db.begin_read().map_err(io_err)?;
        let table = read_txn.open_table(NODES).map_err(io_err)?;
        Ok(table.get(handle.0).map_err(io_err)?.is_some())
    }

    fn read_edge(&self, handle: EdgeHandle) -> Result<Option<EdgeRecord>, KernnetzError> {
        let read_txn = self.db.begin_read().map_err(io_err)?;
        let table = read_txn.open_table(EDGES).map_err(io_err)?;
        let record = match table.get(handle.0).map_err(io_err)? {
            Some(data) => Some(decode(data.value())?),
            None => None,
        };
        Ok(record)
    }
}

impl GraphStore for RedbGraph {
    fn upsert_node(
        &mut self,
        label: NodeLabel,
        key: &str,
    ) -> Result<Upserted<NodeHandle>, KernnetzError> {
        if let Some(&handle) = self.key_cache.get(&(label, key.to_string())) {
            return Ok(Upserted::existing(handle));
        }

        let handle = NodeHandle(self.next_node_id);
        let next_node_id = self.next_node_id.saturating_add(1);

        let mut properties = Properties::new();
        properties.insert(label.key_property().to_string(), PropertyValue::from(key));
        let record = NodeRecord {
            handle,
            label,
            key: key.to_string(),
            properties,
        };
        let bytes = encode(&record)?;

        let write_txn = self.db.begin_write().map_err(io_err)?;
        {
            let mut nodes = write_txn.open_table(NODES).map_err(io_err)?;
            nodes.insert(handle.0, bytes.as_slice()).map_err(io_err)?;
        }
        {
            let mut meta = write_txn.open_table(METADATA).map_err(io_err)?;
            meta.insert("next_node_id", next_node_id).map_err(io_err)?;
        }
        write_txn.commit().map_err(io_err)?;

        self.next_node_id = next_node_id;
        self.key_cache.insert((label, key.to_string()), handle);

        Ok(Upserted::created(handle))
    }

    fn find_node(&self, label: NodeLabel, key: &str) -> Result<Option<NodeHandle>, KernnetzError> {
        Ok(self.key_cache.get(&(label, key.to_string())).copied())
    }

    fn node(&self, handle: NodeHandle) -> Result<Option<NodeRecord>, KernnetzError> {
        let read_txn = self.db.begin_read().map_err(io_err)?;
        let table = read_txn.open_table(NODES).map_err(io_err)?;
        let record = match table.get(handle.0).map_err(io_err)? {
            Some(data) => Some(decode(data.value())?),
            None => None,
        };
        Ok(record)
    }

    fn set_node_properties(
        &mut self,
        handle: NodeHandle,
        properties: Properties,
    ) -> Result<(), KernnetzError> {
        let mut record = self
            .node(handle)?
            .ok_or(KernnetzError::NodeNotFound(handle))?;
        let key_property = record.label.key_property();
        for (name, value) in properties {
            if name == key_property {
                continue;
            }
            record.properties.insert(name, value);
        }
        let bytes = encode(&record)?;

        let write_txn = self.db.begin_write().map_err(io_err)?;
        {
            let mut nodes = write_txn.open_table(NODES).map_err(io_err)?;
            nodes.insert(handle.0, bytes.as_slice()).map_err(io_err)?;
        }
        write_txn.commit().map_err(io_err)?;
        Ok(())
    }

    fn upsert_edge(
        &mut self,
        label: EdgeLabel,
        from: NodeHandle,
        to: NodeHandle,
    ) -> Result<Upserted<EdgeHandle>, KernnetzError> {
        if !self.contains_node(from)? {
            return Err(KernnetzError::NodeNotFound(from));
        }
        if !self.contains_node(to)? {
            return Err(KernnetzError::NodeNotFound(to));
        }

        let index_key = (edge_label_code(label), from.0, to.0);
        {
            let read_txn = self.db.begin_read().map_err(io_err)?;
            let index = read_txn.open_table(EDGE_INDEX).map_err(io_err)?;
            if let Some(existing) = index.get(index_key).map_err(io_err)? {
                return Ok(Upserted::existing(EdgeHandle(existing.value())));
            }
        }

        let handle = EdgeHandle(self.next_edge_id);
        let next_edge_id = self.next_edge_id.saturating_add(1);
        let record = EdgeRecord {
            handle,
            label,
            from,
            to,
            properties: Properties::new(),
        };
        let bytes = encode(&record)?;

        let write_txn = self.db.begin_write().map_err(io_err)?;
        {
            let mut edges = write_txn.open_table(EDGES).map_err(io_err)?;
            edges.insert(handle.0, bytes.as_slice()).map_err(io_err)?;
        }
        {
            let mut index = write_txn.open_table(EDGE_INDEX).map_err(io_err)?;
            index.insert(index_key, handle.0).map_err(io_err)?;
        }
        {
            let mut meta = write_txn.open_table(METADATA).map_err(io_err)?;
            meta.insert("next_edge_id", next_edge_id).map_err(io_err)?;
        }
        write_txn.commit().map_err(io_err)?;

        self.next_edge_id = next_edge_id;
        Ok(Upserted::created(handle))
    }

    fn set_edge_properties(
        &mut self,
        handle: EdgeHandle,
        properties: Properties,
    ) -> Result<(), KernnetzError> {
        let mut record = self
            .read_edge(handle)?
            .ok_or(KernnetzError::EdgeNotFound(handle))?;
        record.properties.extend(properties);
        let bytes = encode(&record)?;

        let write_txn = self.db.begin_write().map_err(io_err)?;
        {
            let mut edges = write_txn.open_table(EDGES).map_err(io_err)?;
            edges.insert(handle.0, bytes.as_slice()).map_err(io_err)?;
        }
        write_txn.commit().map_err(io_err)?;
        Ok(())
    }

    fn nodes_by_label(&self, label: NodeLabel) -> Result<Vec<NodeRecord>, KernnetzError> {
        let read_txn = self.db.begin_read().map_err(io_err)?;
        let table = read_txn.open_table(NODES).map_err(io_err)?;
        let mut result = Vec::new();
        for entry in table.iter().map_err(io_err)? {
            let (_, data) = entry.map_err(io_err)?;
            let record: NodeRecord = decode(data.value())?;
            if record.label == label {
                result.push(record);
            }
        }
        Ok(result)
    }

    fn edges_by_label(&self, label: EdgeLabel) -> Result<Vec<EdgeRecord>, KernnetzError> {
        let read_txn = self.db.begin_read().map_err(io_err)?;
        let table = read_txn.open_table(EDGES).map_err(io_err)?;
        let mut result = Vec::new();
        for entry in table.iter().map_err(io_err)? {
            let (_, data) = entry.map_err(io_err)?;
            let record: EdgeRecord = decode(data.value())?;
            if record.label == label {
                result.push(record);
            }
        }
        Ok(result)
    }

    fn edges_from(
        &self,
        from: NodeHandle,
        label: EdgeLabel,
    ) -> Result<Vec<EdgeRecord>, KernnetzError> {
        let read_txn = self.db.begin_read().map_err(io_err)?;
        let index = read_txn.open_table(EDGE_INDEX).map_err(io_err)?;
        let edges = read_txn.open_table(EDGES).map_err(io_err)?;
        let code = edge_label_code(label);

        let mut result = Vec::new();
        // Range query for all outgoing edges of this node under one label
        for entry in index
            .range((code, from.0, 0u64)..=(code, from.0, u64::MAX))
            .map_err(io_err)?
        {
            let (_, handle) = entry.map_err(io_err)?;
            if let Some(data) = edges.get(handle.value()).map_err(io_err)? {
                result.push(decode(data.value())?);
            }
        }
        Ok(result)
    }

    fn node_count(&self) -> Result<usize, KernnetzError> {
        let read_txn = self.db.begin_read().map_err(io_err)?;
        let table = read_txn.open_table(NODES).map_err(io_err)?;
        Ok(table.len().map_err(io_err)? as usize)
    }

    fn edge_count(&self) -> Result<usize, KernnetzError> {
        let read_txn = self.db.begin_read().map_err(io_err)?;
        let table = read_txn.open_table(EDGES).map_err(io_err)?;
        Ok(table.len().map_err(io_err)? as usize)
    }
}
