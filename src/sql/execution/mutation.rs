//! Row mutations: INSERT, INSERT BULK and DELETE. Each keeps the table's
//! secondary indexes in step with its records and enforces the naming
//! convention foreign keys where it can.

use crate::error::{Error, Result};
use crate::sql::codec;
use crate::sql::index::{table_namespace, Index, IndexKind};
use crate::sql::parser::ast::Literal;
use crate::sql::schema::{Database, Table};
use crate::sql::types::{DataType, Value};
use crate::storage::document::{KeyFilter, Store};

use log::{debug, info, warn};

/// Converts literals to a table's attribute types.
fn convert(table: &Table, literals: &[Literal]) -> Result<Vec<Value>> {
    if literals.len() != table.attributes.len() {
        return Err(Error::Value(format!(
            "Expected {} values, got {}",
            table.attributes.len(),
            literals.len()
        )));
    }
    table
        .attributes
        .iter()
        .zip(literals)
        .map(|(attribute, literal)| {
            literal.to_type(attribute.datatype).ok_or_else(|| {
                Error::Type(format!(
                    "Value '{}' cannot be converted to type '{}' for attribute '{}'",
                    literal, attribute.datatype, attribute.name
                ))
            })
        })
        .collect()
}

/// Inserts a single row, returning its primary key. Checks run before any
/// write, in order: duplicate key, foreign keys, unique indexes.
pub fn insert(
    store: &mut dyn Store,
    database: &Database,
    table: &Table,
    literals: &[Literal],
) -> Result<String> {
    let values = convert(table, literals)?;
    let (key, value) = codec::encode(&table.attributes, &values)?;
    let namespace = table_namespace(&database.name, &table.name);

    if store.get(&namespace, &key)?.is_some() {
        return Err(Error::Integrity(format!(
            "A record with primary key '{}' already exists in table '{}'",
            key, table.name
        )));
    }

    for (attribute, value) in table.attributes.iter().zip(&values).skip(1) {
        let referenced = match database.referenced_table(attribute) {
            Some(referenced) if !value.is_null() => referenced,
            _ => continue,
        };
        let referenced_namespace = table_namespace(&database.name, &referenced.name);
        if !store.has_namespace(&referenced_namespace)? {
            debug!("Skipping foreign key check of {}, table {} has no records", attribute.name, referenced.name);
            continue;
        }
        let found = match value.cast(referenced.primary_key()?.datatype) {
            Some(referenced_key) => store.get(&referenced_namespace, &referenced_key.canonical())?.is_some(),
            None => false,
        };
        if !found {
            return Err(Error::Integrity(format!(
                "Foreign key constraint failed for '{}' with value '{}' in table '{}'",
                attribute.name, value, table.name
            )));
        }
    }

    let indexes = Index::existing(&*store, &database.name, table)?;
    for index in indexes.iter().filter(|i| i.kind == IndexKind::Unique) {
        index.check(&*store, &values[table.get_attribute_index(&index.column)?])?;
    }

    store.insert(&namespace, key.clone(), value.into_bytes())?;
    for index in &indexes {
        index.add(store, &values[table.get_attribute_index(&index.column)?], &key)?;
    }
    info!("Inserted {} into {}.{}", key, database.name, table.name);
    Ok(key)
}

/// Inserts many rows without key, foreign key or index checks. Every row is
/// converted before anything is written; rows whose key already exists are
/// skipped and their keys returned alongside the number written.
pub fn insert_bulk(
    store: &mut dyn Store,
    database: &str,
    table: &Table,
    rows: &[Vec<Literal>],
) -> Result<(usize, Vec<String>)> {
    let mut entries = Vec::with_capacity(rows.len());
    for literals in rows {
        let (key, value) = codec::encode(&table.attributes, &convert(table, literals)?)?;
        entries.push((key, value.into_bytes()));
    }

    let indexes = Index::existing(&*store, database, table)?;
    if !indexes.is_empty() {
        warn!(
            "Bulk insert into {} bypasses {} secondary index(es), recreate them afterwards",
            table.name,
            indexes.len()
        );
    }

    let total = entries.len();
    let rejected = store.insert_many(&table_namespace(database, &table.name), entries)?;
    if !rejected.is_empty() {
        warn!("Bulk insert into {} rejected {} duplicate key(s)", table.name, rejected.len());
    }
    info!("Bulk inserted {} rows into {}.{}", total - rejected.len(), database, table.name);
    Ok((total - rejected.len(), rejected))
}

/// Deletes the rows where a column equals a value, returning the coerced
/// value and the number of rows deleted. Matching no rows is an error.
pub fn delete(
    store: &mut dyn Store,
    database: &Database,
    table: &Table,
    column: &str,
    literal: &Literal,
) -> Result<(Value, usize)> {
    let attribute = table.get_attribute(column)?;
    let position = table.get_attribute_index(column)?;
    let namespace = table_namespace(&database.name, &table.name);
    let target = literal.value().cast(attribute.datatype);

    let candidates: Vec<String> = if table.is_primary_key(column) {
        let target = target.clone().ok_or_else(|| {
            Error::Type(format!(
                "Type mismatch for primary key condition: expected {}, got {}",
                attribute.datatype, literal
            ))
        })?;
        let key = target.canonical();
        match store.get(&namespace, &key)? {
            Some(_) => vec![key],
            None => Vec::new(),
        }
    } else if let Some(index) = find_index(&*store, &database.name, &table.name, column)? {
        debug!("Deleting from {} through index {}", table.name, index.namespace);
        match &target {
            Some(target) => index.get(&*store, target)?.map(|e| e.into_keys()).unwrap_or_default(),
            None => Vec::new(),
        }
    } else {
        debug!("Deleting from {} by full scan on {}", table.name, column);
        let mut keys = Vec::new();
        if let Some(target) = &target {
            for item in store.scan(&namespace, KeyFilter::All)? {
                let (key, bytes) = item?;
                if codec::decode_bytes(&key, &bytes, &table.attributes)?.get(position) == Some(target) {
                    keys.push(key);
                }
            }
        }
        keys
    };

    if candidates.is_empty() {
        return Err(Error::NotFound(format!(
            "No records found matching condition '{} = {}' in table '{}'",
            column, literal, table.name
        )));
    }

    for key in &candidates {
        check_references(&*store, database, table, key)?;
    }

    let indexes = Index::existing(&*store, &database.name, table)?;
    let mut count = 0;
    for key in &candidates {
        let bytes = match store.get(&namespace, key)? {
            Some(bytes) => bytes,
            None => continue,
        };
        let values = codec::decode_bytes(key, &bytes, &table.attributes)?;
        if store.delete(&namespace, key)? {
            count += 1;
        }
        for index in &indexes {
            index.remove(store, &values[table.get_attribute_index(&index.column)?], key)?;
        }
    }
    info!("Deleted {} record(s) from {}.{}", count, database.name, table.name);
    Ok((target.unwrap_or(Value::Null), count))
}

/// Finds an index on a column, non-unique first.
fn find_index(store: &dyn Store, database: &str, table: &str, column: &str) -> Result<Option<Index>> {
    for kind in [IndexKind::NonUnique, IndexKind::Unique] {
        let index = Index::new(database, table, column, kind);
        if index.exists(store)? {
            return Ok(Some(index));
        }
    }
    Ok(None)
}

/// Errors if another table's foreign key column refers to the record. Only
/// indexed foreign key columns can be checked; others are skipped.
fn check_references(store: &dyn Store, database: &Database, table: &Table, key: &str) -> Result<()> {
    for (referencing, attribute) in database.references_to(&table.name) {
        let index = match find_index(store, &database.name, &referencing.name, &attribute.name)? {
            Some(index) => index,
            None => {
                warn!(
                    "Cannot check references to {} from {}.{} without an index",
                    table.name, referencing.name, attribute.name
                );
                continue;
            }
        };
        let value = match attribute.datatype {
            DataType::Str => Some(Value::Str(key.to_string())),
            datatype => Value::Str(key.to_string()).cast(datatype),
        };
        if let Some(value) = value {
            if index.get(store, &value)?.is_some() {
                return Err(Error::Integrity(format!(
                    "Cannot delete record with key '{}' from table '{}' because it is referenced in table '{}' by '{}'",
                    key, table.name, referencing.name, attribute.name
                )));
            }
        }
    }
    Ok(())
}
