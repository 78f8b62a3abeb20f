use crate::error::Result;
use crate::sql::codec;
use crate::sql::index::table_namespace;
use crate::sql::plan::{JoinAccess, JoinStrategy};
use crate::sql::row::Row;
use crate::sql::schema::Table;
use crate::sql::types::{ColumnRef, DataType, Value};
use crate::storage::document::{KeyFilter, Store};

use log::debug;
use std::collections::{BTreeSet, HashMap};

/// Outer rows are processed in batches of this size by indexed nested-loop joins.
pub const BATCH_SIZE: usize = 1000;

/// Scans a table's records through a key filter.
pub fn scan(
    store: &dyn Store,
    database: &str,
    table: &Table,
    alias: &str,
    filter: KeyFilter,
) -> Result<Vec<Row>> {
    let mut rows = Vec::new();
    for item in store.scan(&table_namespace(database, &table.name), filter)? {
        let (key, bytes) = item?;
        rows.push(Row::from_record(alias, table, codec::decode_bytes(&key, &bytes, &table.attributes)?));
    }
    Ok(rows)
}

/// Joins the rows produced so far with the inner table.
#[allow(clippy::too_many_arguments)]
pub fn join(
    store: &dyn Store,
    database: &str,
    rows: Vec<Row>,
    table: &Table,
    alias: &str,
    inner: &str,
    outer: &ColumnRef,
    strategy: &JoinStrategy,
) -> Result<Vec<Row>> {
    let position = table.get_attribute_index(inner)?;
    match strategy {
        JoinStrategy::Hash => {
            let inner_rows = scan(store, database, table, alias, KeyFilter::All)?;
            let map = build_map(inner_rows, position);
            debug!("Hash join built {} keys for {}", map.len(), table.name);
            Ok(probe(&rows, outer, &map))
        }
        JoinStrategy::IndexedNestedLoop(access) => {
            // Non-integer columns can hold several stored forms of one join
            // key ("7", "07", 7.5), so their keys are resolved up front.
            let coerced = match table.attributes[position].datatype {
                DataType::Int => None,
                datatype => Some(coerced_keys(store, database, table, datatype, access)?),
            };
            let mut joined = Vec::new();
            for batch in rows.chunks(BATCH_SIZE) {
                let keys: BTreeSet<i64> =
                    batch.iter().filter_map(|r| r.get(outer).and_then(Value::join_key)).collect();
                if keys.is_empty() {
                    continue;
                }
                let pks: BTreeSet<String> = match (&coerced, access) {
                    (Some(coerced), _) => {
                        keys.iter().filter_map(|k| coerced.get(k)).flatten().cloned().collect()
                    }
                    (None, JoinAccess::PrimaryKey) => keys.iter().map(|k| k.to_string()).collect(),
                    (None, JoinAccess::SecondaryIndex(index)) => {
                        let values: Vec<Value> = keys.iter().map(|k| Value::Int(*k)).collect();
                        index.lookup(store, &values)?.into_iter().collect()
                    }
                };
                debug!("Join batch of {} rows looks up {} keys in {}", batch.len(), pks.len(), table.name);
                if pks.is_empty() {
                    continue;
                }
                let inner_rows = scan(store, database, table, alias, KeyFilter::In(pks))?;
                joined.extend(probe(batch, outer, &build_map(inner_rows, position)));
            }
            Ok(joined)
        }
    }
}

/// Maps each integer join key to the primary keys of the inner rows whose
/// join column coerces to it, reading the record keys or the index entries.
fn coerced_keys(
    store: &dyn Store,
    database: &str,
    table: &Table,
    datatype: DataType,
    access: &JoinAccess,
) -> Result<HashMap<i64, Vec<String>>> {
    let coerce = |stored: &str| Value::parse(datatype, stored).ok().and_then(|v| v.join_key());
    let mut map: HashMap<i64, Vec<String>> = HashMap::new();
    match access {
        JoinAccess::PrimaryKey => {
            for item in store.scan(&table_namespace(database, &table.name), KeyFilter::All)? {
                let (key, _) = item?;
                if let Some(k) = coerce(&key) {
                    map.entry(k).or_default().push(key);
                }
            }
        }
        JoinAccess::SecondaryIndex(index) => {
            for (value, pks) in index.entries(store)? {
                if let Some(k) = coerce(&value) {
                    map.entry(k).or_default().extend(pks);
                }
            }
        }
    }
    Ok(map)
}

/// Builds a multimap from integer join key to inner rows. Rows without an
/// integer key are skipped.
fn build_map(rows: Vec<Row>, position: usize) -> HashMap<i64, Vec<Row>> {
    let mut map: HashMap<i64, Vec<Row>> = HashMap::new();
    for row in rows {
        if let Some(key) = row.columns.get(position).and_then(|(_, v)| v.join_key()) {
            map.entry(key).or_default().push(row);
        }
    }
    map
}

/// Joins each outer row with every inner row under the same key.
fn probe(rows: &[Row], outer: &ColumnRef, map: &HashMap<i64, Vec<Row>>) -> Vec<Row> {
    let mut joined = Vec::new();
    for row in rows {
        let matches = row.get(outer).and_then(Value::join_key).and_then(|k| map.get(&k));
        for inner in matches.into_iter().flatten() {
            joined.push(row.merge(inner));
        }
    }
    joined
}
