mod aggregate;
mod join;
pub mod mutation;
mod pipeline;

use super::index::IndexKind;
use super::plan::{Node, Plan};
use super::row::Row;
use super::types::Value;
use crate::error::Result;
use crate::storage::document::Store;

use std::fmt::{self, Display};

/// Executes a query plan node against the store, returning its rows.
pub fn execute(store: &dyn Store, database: &str, node: Node) -> Result<Vec<Row>> {
    Ok(match node {
        Node::Scan { table, alias, filter } => join::scan(store, database, &table, &alias, filter)?,
        Node::Join { source, table, alias, inner, outer, strategy } => {
            let rows = execute(store, database, *source)?;
            join::join(store, database, rows, &table, &alias, &inner, &outer, &strategy)?
        }
        Node::Filter { source, predicates } => {
            pipeline::filter(execute(store, database, *source)?, &predicates)
        }
        Node::Aggregation { source, group_by, aggregates } => {
            aggregate::aggregate(execute(store, database, *source)?, &group_by, &aggregates)
        }
        Node::Order { source, orders } => pipeline::order(execute(store, database, *source)?, &orders),
        Node::Projection { source, projection } => {
            pipeline::project(execute(store, database, *source)?, &projection)
        }
        Node::Distinct { source } => pipeline::distinct(execute(store, database, *source)?),
    })
}

/// A command result
#[derive(Clone, Debug, PartialEq)]
pub enum ResultSet {
    CreateDatabase { name: String },
    DropDatabase { name: String },
    UseDatabase { name: String },
    CreateTable { name: String },
    DropTable { name: String },
    Insert { table: String, key: String },
    InsertBulk { table: String, count: usize, rejected: Vec<String> },
    Delete { table: String, count: usize, column: String, value: Value },
    CreateIndex { table: String, column: String, kind: IndexKind, count: usize },
    Query { rows: Vec<Vec<(String, Value)>> },
    Explain(Plan),
    UnknownCommand,
}

impl ResultSet {
    /// Builds a query result from projected rows.
    pub fn from_rows(rows: Vec<Row>) -> Self {
        ResultSet::Query {
            rows: rows
                .into_iter()
                .map(|row| row.columns.into_iter().map(|(c, v)| (c.name, v)).collect())
                .collect(),
        }
    }

    /// Serializes query rows as a JSON array of objects, keeping column order.
    pub fn to_json(rows: &[Vec<(String, Value)>]) -> serde_json::Value {
        serde_json::Value::Array(
            rows.iter()
                .map(|row| {
                    serde_json::Value::Object(
                        row.iter().map(|(name, value)| (name.clone(), value.to_json())).collect(),
                    )
                })
                .collect(),
        )
    }
}

impl Display for ResultSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResultSet::CreateDatabase { name } => write!(f, "Database Created: {}", name),
            ResultSet::DropDatabase { name } => write!(f, "Database dropped: {}", name),
            ResultSet::UseDatabase { name } => write!(f, "Using database: {}", name),
            ResultSet::CreateTable { name } => write!(f, "Table created: {}", name),
            ResultSet::DropTable { name } => write!(f, "Table dropped: {}", name),
            ResultSet::Insert { table, key } => {
                write!(f, "Row inserted into {} with key {}", table, key)
            }
            ResultSet::InsertBulk { table, count, rejected } => {
                write!(f, "Inserted {} records into {}", count, table)?;
                if !rejected.is_empty() {
                    write!(f, ", rejected duplicate keys: {}", rejected.join(", "))?;
                }
                Ok(())
            }
            ResultSet::Delete { table, count, column, value } => write!(
                f,
                "Deleted {} record(s) from {} where {} = {}",
                count, table, column, value
            ),
            ResultSet::CreateIndex { table, column, kind, .. } => {
                write!(f, "{} index created on '{}' in table '{}'", kind, column, table)
            }
            ResultSet::Query { rows } => {
                let json = serde_json::to_string_pretty(&Self::to_json(rows)).map_err(|_| fmt::Error)?;
                f.write_str(&json)
            }
            ResultSet::Explain(plan) => f.write_str(plan.to_string().trim_end()),
            ResultSet::UnknownCommand => f.write_str("Unknown command"),
        }
    }
}
