//! Secondary indexes. Each index is a store namespace mapping a column value
//! (canonical string) to the primary keys of the rows holding that value:
//! `{table}_{column}_index` for non-unique indexes, which map to a list of
//! keys in insertion order, and `{table}_{column}_uniqindex` for unique
//! indexes, which map to a single key.

use super::codec;
use super::schema::Table;
use super::types::Value;
use crate::error::{Error, Result};
use crate::storage::document::{KeyFilter, Store};

use serde_derive::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt::{self, Display};

/// Returns the store namespace holding a table's records.
pub fn table_namespace(database: &str, table: &str) -> String {
    format!("{}.{}", database, table)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IndexKind {
    Unique,
    NonUnique,
}

impl IndexKind {
    fn suffix(self) -> &'static str {
        match self {
            IndexKind::Unique => "uniqindex",
            IndexKind::NonUnique => "index",
        }
    }
}

impl Display for IndexKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            IndexKind::Unique => "Unique",
            IndexKind::NonUnique => "Non-unique",
        })
    }
}

/// An index entry value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum IndexEntry {
    Unique(String),
    NonUnique(Vec<String>),
}

impl IndexEntry {
    /// Returns the primary keys in the entry.
    pub fn into_keys(self) -> Vec<String> {
        match self {
            IndexEntry::Unique(key) => vec![key],
            IndexEntry::NonUnique(keys) => keys,
        }
    }

    fn decode(bytes: &[u8]) -> Result<Self> {
        Ok(bincode::deserialize(bytes)?)
    }

    fn encode(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }
}

/// A secondary index on a table column.
#[derive(Clone, Debug, PartialEq)]
pub struct Index {
    pub table: String,
    pub column: String,
    pub kind: IndexKind,
    pub namespace: String,
}

impl Index {
    pub fn new(database: &str, table: &str, column: &str, kind: IndexKind) -> Self {
        Self {
            table: table.to_string(),
            column: column.to_string(),
            kind,
            namespace: format!("{}.{}_{}_{}", database, table, column, kind.suffix()),
        }
    }

    /// Returns every index that currently exists on the table's non-key columns.
    pub fn existing(store: &dyn Store, database: &str, table: &Table) -> Result<Vec<Index>> {
        let mut indexes = Vec::new();
        for attribute in table.attributes.iter().skip(1) {
            for kind in [IndexKind::Unique, IndexKind::NonUnique] {
                let index = Index::new(database, &table.name, &attribute.name, kind);
                if index.exists(store)? {
                    indexes.push(index);
                }
            }
        }
        Ok(indexes)
    }

    /// Drops every index namespace derived from the table.
    pub fn drop_all(store: &mut dyn Store, database: &str, table: &Table) -> Result<()> {
        for attribute in &table.attributes {
            for kind in [IndexKind::Unique, IndexKind::NonUnique] {
                store.drop_namespace(&Index::new(database, &table.name, &attribute.name, kind).namespace)?;
            }
        }
        Ok(())
    }

    pub fn exists(&self, store: &dyn Store) -> Result<bool> {
        store.has_namespace(&self.namespace)
    }

    /// Fetches the entry for a column value, if any.
    pub fn get(&self, store: &dyn Store, value: &Value) -> Result<Option<IndexEntry>> {
        if value.is_null() {
            return Ok(None);
        }
        store.get(&self.namespace, &value.canonical())?.map(|b| IndexEntry::decode(&b)).transpose()
    }

    /// Looks up the distinct primary keys of rows holding any of the values.
    pub fn lookup(&self, store: &dyn Store, values: &[Value]) -> Result<Vec<String>> {
        let keys: BTreeSet<String> =
            values.iter().filter(|v| !v.is_null()).map(|v| v.canonical()).collect();
        let mut seen = HashSet::new();
        let mut pks = Vec::new();
        for item in store.scan(&self.namespace, KeyFilter::In(keys))? {
            let (_, bytes) = item?;
            for pk in IndexEntry::decode(&bytes)?.into_keys() {
                if seen.insert(pk.clone()) {
                    pks.push(pk);
                }
            }
        }
        Ok(pks)
    }

    /// Reads every entry of the index as a column value and its primary keys.
    pub fn entries(&self, store: &dyn Store) -> Result<Vec<(String, Vec<String>)>> {
        let mut entries = Vec::new();
        for item in store.scan(&self.namespace, KeyFilter::All)? {
            let (value, bytes) = item?;
            entries.push((value, IndexEntry::decode(&bytes)?.into_keys()));
        }
        Ok(entries)
    }

    /// Checks that adding the value would not violate a unique index.
    pub fn check(&self, store: &dyn Store, value: &Value) -> Result<()> {
        if self.kind == IndexKind::Unique && self.get(store, value)?.is_some() {
            return Err(Error::Integrity(format!(
                "Unique constraint failed for '{}' with value '{}' in table '{}'",
                self.column, value, self.table
            )));
        }
        Ok(())
    }

    /// Adds a primary key under a column value. Null values are not indexed.
    pub fn add(&self, store: &mut dyn Store, value: &Value, pk: &str) -> Result<()> {
        if value.is_null() {
            return Ok(());
        }
        self.check(&*store, value)?;
        let key = value.canonical();
        match (self.kind, self.get(&*store, value)?) {
            (IndexKind::NonUnique, Some(IndexEntry::NonUnique(mut keys))) => {
                keys.push(pk.to_string());
                store.update(&self.namespace, &key, IndexEntry::NonUnique(keys).encode()?)?;
            }
            (IndexKind::NonUnique, _) => {
                store.insert(&self.namespace, key, IndexEntry::NonUnique(vec![pk.into()]).encode()?)?
            }
            (IndexKind::Unique, _) => {
                store.insert(&self.namespace, key, IndexEntry::Unique(pk.into()).encode()?)?
            }
        }
        Ok(())
    }

    /// Removes a primary key from a column value's entry, dropping the
    /// entry once it holds no keys.
    pub fn remove(&self, store: &mut dyn Store, value: &Value, pk: &str) -> Result<()> {
        let key = value.canonical();
        match self.get(&*store, value)? {
            Some(IndexEntry::Unique(existing)) if existing == pk => {
                store.delete(&self.namespace, &key)?;
            }
            Some(IndexEntry::NonUnique(mut keys)) => {
                keys.retain(|k| k != pk);
                if keys.is_empty() {
                    store.delete(&self.namespace, &key)?;
                } else {
                    store.update(&self.namespace, &key, IndexEntry::NonUnique(keys).encode()?)?;
                }
            }
            _ => {}
        }
        Ok(())
    }

    /// Rebuilds the index from scratch by scanning the table, returning the
    /// number of distinct values indexed. Rows without a value are skipped. A
    /// unique index fails on the first duplicate, leaving it partially built.
    pub fn build(&self, store: &mut dyn Store, database: &str, table: &Table) -> Result<usize> {
        if table.is_primary_key(&self.column) {
            return Err(Error::Schema(format!(
                "Primary key '{}' cannot be explicitly indexed, it is already the record key",
                self.column
            )));
        }
        let position = table.get_attribute_index(&self.column)?;

        store.drop_namespace(&self.namespace)?;
        store.create_namespace(&self.namespace)?;

        let mut rows = Vec::new();
        for item in store.scan(&table_namespace(database, &table.name), KeyFilter::All)? {
            let (key, bytes) = item?;
            let value = codec::decode_bytes(&key, &bytes, &table.attributes)?.swap_remove(position);
            if !value.is_null() {
                rows.push((key, value));
            }
        }

        match self.kind {
            IndexKind::NonUnique => {
                let mut entries: BTreeMap<String, Vec<String>> = BTreeMap::new();
                for (pk, value) in rows {
                    entries.entry(value.canonical()).or_default().push(pk);
                }
                let count = entries.len();
                let entries = entries
                    .into_iter()
                    .map(|(k, pks)| Ok((k, IndexEntry::NonUnique(pks).encode()?)))
                    .collect::<Result<Vec<_>>>()?;
                store.insert_many(&self.namespace, entries)?;
                Ok(count)
            }
            IndexKind::Unique => {
                let count = rows.len();
                for (pk, value) in rows {
                    if self.get(&*store, &value)?.is_some() {
                        return Err(Error::Integrity(format!(
                            "Duplicate value '{}' found for unique index on '{}' in table '{}', index creation failed",
                            value, self.column, self.table
                        )));
                    }
                    self.add(store, &value, &pk)?;
                }
                Ok(count)
            }
        }
    }
}
