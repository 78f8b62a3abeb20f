mod planner;

pub use planner::Planner;

use super::index::Index;
use super::parser::ast::{Aggregate, Condition, Direction, Expression, Projection};
use super::schema::Table;
use super::types::ColumnRef;
use crate::storage::document::{Comparison, KeyFilter, KeyOrder};

use std::fmt::{self, Display};

/// How a join reaches the rows of its inner table.
#[derive(Clone, Debug, PartialEq)]
pub enum JoinAccess {
    /// Key set lookups on the inner table's records
    PrimaryKey,
    /// Probes a non-unique secondary index, then fetches the keys it yields
    SecondaryIndex(Index),
}

/// A join algorithm, chosen per join clause.
#[derive(Clone, Debug, PartialEq)]
pub enum JoinStrategy {
    /// Batches the outer rows and looks up matching inner rows per batch
    IndexedNestedLoop(JoinAccess),
    /// Materializes the whole inner table in a hash table, then probes it
    Hash,
}

impl Display for JoinStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JoinStrategy::IndexedNestedLoop(JoinAccess::PrimaryKey) => {
                f.write_str("IndexedNestedLoopJoin via primary key")
            }
            JoinStrategy::IndexedNestedLoop(JoinAccess::SecondaryIndex(index)) => {
                write!(f, "IndexedNestedLoopJoin via index {}", index.namespace)
            }
            JoinStrategy::Hash => f.write_str("HashJoin"),
        }
    }
}

/// A plan node
#[derive(Clone, Debug, PartialEq)]
pub enum Node {
    Aggregation {
        source: Box<Node>,
        group_by: Vec<ColumnRef>,
        aggregates: Vec<Aggregate>,
    },
    Distinct {
        source: Box<Node>,
    },
    Filter {
        source: Box<Node>,
        predicates: Vec<Condition>,
    },
    Join {
        source: Box<Node>,
        table: Table,
        alias: String,
        /// The joined-on column of the inner table
        inner: String,
        /// The joined-on column of the rows produced so far
        outer: ColumnRef,
        strategy: JoinStrategy,
    },
    Order {
        source: Box<Node>,
        orders: Vec<(Expression, Direction)>,
    },
    Projection {
        source: Box<Node>,
        projection: Projection,
    },
    Scan {
        table: Table,
        alias: String,
        filter: KeyFilter,
    },
}

impl Node {
    fn format(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
        let indent = "  ".repeat(depth);
        match self {
            Node::Aggregation { source, group_by, aggregates } => {
                let groups = group_by.iter().map(|c| c.to_string()).collect::<Vec<_>>();
                let aggregates = aggregates.iter().map(|a| a.to_string()).collect::<Vec<_>>();
                writeln!(f, "{}Aggregation: [{}] group by [{}]", indent, aggregates.join(", "), groups.join(", "))?;
                source.format(f, depth + 1)
            }
            Node::Distinct { source } => {
                writeln!(f, "{}Distinct", indent)?;
                source.format(f, depth + 1)
            }
            Node::Filter { source, predicates } => {
                let predicates = predicates.iter().map(|p| p.to_string()).collect::<Vec<_>>();
                writeln!(f, "{}Filter: {}", indent, predicates.join(" AND "))?;
                source.format(f, depth + 1)
            }
            Node::Join { source, table, alias, inner, outer, strategy } => {
                writeln!(f, "{}{}: {} AS {} ON {}.{} = {}", indent, strategy, table.name, alias, alias, inner, outer)?;
                source.format(f, depth + 1)
            }
            Node::Order { source, orders } => {
                let orders =
                    orders.iter().map(|(e, d)| format!("{} {}", e, d)).collect::<Vec<_>>();
                writeln!(f, "{}Order: {}", indent, orders.join(", "))?;
                source.format(f, depth + 1)
            }
            Node::Projection { source, projection } => {
                match projection {
                    Projection::All => writeln!(f, "{}Projection: *", indent)?,
                    Projection::Items(items) => {
                        let items = items.iter().map(|e| e.to_string()).collect::<Vec<_>>();
                        writeln!(f, "{}Projection: {}", indent, items.join(", "))?
                    }
                }
                source.format(f, depth + 1)
            }
            Node::Scan { table, alias, filter } => {
                writeln!(f, "{}Scan: {} AS {} ({})", indent, table.name, alias, FilterDisplay(filter))
            }
        }
    }
}

struct FilterDisplay<'a>(&'a KeyFilter);

impl<'a> Display for FilterDisplay<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            KeyFilter::All => f.write_str("full scan"),
            KeyFilter::In(keys) => {
                write!(f, "key IN [{}]", keys.iter().cloned().collect::<Vec<_>>().join(", "))
            }
            KeyFilter::Range { order, bounds } => {
                let bounds = bounds
                    .iter()
                    .map(|(c, k)| {
                        let op = match c {
                            Comparison::Equal => "=",
                            Comparison::GreaterThan => ">",
                            Comparison::GreaterThanOrEqual => ">=",
                            Comparison::LessThan => "<",
                            Comparison::LessThanOrEqual => "<=",
                        };
                        format!("key {} {}", op, k)
                    })
                    .collect::<Vec<_>>();
                let order = match order {
                    KeyOrder::Lexical => "lexical",
                    KeyOrder::Numeric => "numeric",
                };
                write!(f, "{}, {} order", bounds.join(" AND "), order)
            }
        }
    }
}

/// A query plan
#[derive(Clone, Debug, PartialEq)]
pub struct Plan(pub Node);

impl Plan {
    /// Returns the strategy chosen for each join, in clause order.
    pub fn join_strategies(&self) -> Vec<&JoinStrategy> {
        let mut strategies = Vec::new();
        let mut node = &self.0;
        loop {
            node = match node {
                Node::Join { source, strategy, .. } => {
                    strategies.push(strategy);
                    source
                }
                Node::Aggregation { source, .. }
                | Node::Distinct { source }
                | Node::Filter { source, .. }
                | Node::Order { source, .. }
                | Node::Projection { source, .. } => source,
                Node::Scan { .. } => break,
            };
        }
        strategies.reverse();
        strategies
    }
}

impl Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.format(f, 0)
    }
}
