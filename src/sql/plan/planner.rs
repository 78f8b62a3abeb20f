use super::super::index::{Index, IndexKind};
use super::super::parser::ast::{self, Condition, Operator};
use super::super::schema::{Database, Table};
use super::super::types::{ColumnRef, DataType};
use super::{JoinAccess, JoinStrategy, Node, Plan};
use crate::error::{Error, Result};
use crate::storage::document::{Comparison, KeyFilter, KeyOrder, Store};

use log::{debug, info};
use std::collections::BTreeSet;

/// 查询计划器: turns a SELECT into a plan for the current database.
pub struct Planner<'a> {
    store: &'a dyn Store,
    database: &'a Database,
}

impl<'a> Planner<'a> {
    /// Creates a new planner.
    pub fn new(store: &'a dyn Store, database: &'a Database) -> Self {
        Self { store, database }
    }

    /// Builds a plan for a SELECT query.
    pub fn build(&self, select: ast::Select) -> Result<Plan> {
        let table = self.database.must_get_table(&select.from.name)?.clone();
        let alias = select.from.alias.clone();
        let aggregates = select.aggregates();

        let (pushdown, residual): (Vec<_>, Vec<_>) =
            select.filter.into_iter().partition(|c| Self::is_pushdown(&table, &alias, c));
        let filter = Self::build_key_filter(&table, &pushdown)?;
        debug!("Scanning {} as {} with key filter {:?}", table.name, alias, filter);
        let mut node = Node::Scan { table, alias: alias.clone(), filter };

        let mut aliases = vec![alias];
        for join in select.joins {
            let (table, alias, inner, outer, strategy) = self.build_join(&aliases, join)?;
            aliases.push(alias.clone());
            node = Node::Join { source: Box::new(node), table, alias, inner, outer, strategy };
        }

        if !residual.is_empty() {
            node = Node::Filter { source: Box::new(node), predicates: residual };
        }

        if !aggregates.is_empty() || !select.group_by.is_empty() {
            node = Node::Aggregation { source: Box::new(node), group_by: select.group_by, aggregates };
        }

        if !select.order_by.is_empty() {
            node = Node::Order { source: Box::new(node), orders: select.order_by };
        }
        node = Node::Projection { source: Box::new(node), projection: select.projection };
        Ok(Plan(Node::Distinct { source: Box::new(node) }))
    }

    /// Conditions on the base table's primary key become store key filters,
    /// provided the literal converts to the key's type.
    fn is_pushdown(table: &Table, alias: &str, condition: &Condition) -> bool {
        let column = &condition.column;
        if column.qualifier.as_deref().map(|q| q != alias).unwrap_or(false) {
            return false;
        }
        match table.attributes.first() {
            Some(pk) => pk.name == column.name && condition.value.to_type(pk.datatype).is_some(),
            None => false,
        }
    }

    fn build_key_filter(table: &Table, conditions: &[Condition]) -> Result<KeyFilter> {
        if conditions.is_empty() {
            return Ok(KeyFilter::All);
        }
        let pk = table.primary_key()?;
        let mut bounds = Vec::new();
        for condition in conditions {
            let value = condition.value.to_type(pk.datatype).ok_or_else(|| {
                Error::Internal(format!("Condition {} cannot be pushed down", condition))
            })?;
            let comparison = match condition.operator {
                Operator::Equal => Comparison::Equal,
                Operator::GreaterThan => Comparison::GreaterThan,
                Operator::GreaterThanOrEqual => Comparison::GreaterThanOrEqual,
                Operator::LessThan => Comparison::LessThan,
                Operator::LessThanOrEqual => Comparison::LessThanOrEqual,
            };
            bounds.push((comparison, value.canonical()));
        }

        // Point lookups on a single key use a key set.
        if bounds.iter().all(|(c, _)| *c == Comparison::Equal) {
            let keys: BTreeSet<String> = bounds.into_iter().map(|(_, k)| k).collect();
            if keys.len() == 1 {
                return Ok(KeyFilter::In(keys));
            }
            return Ok(KeyFilter::In(BTreeSet::new()));
        }
        let order = match pk.datatype {
            DataType::Int | DataType::Float => KeyOrder::Numeric,
            DataType::Str => KeyOrder::Lexical,
        };
        Ok(KeyFilter::Range { order, bounds })
    }

    /// Resolves a join clause against the aliases seen so far and picks its
    /// strategy.
    fn build_join(
        &self,
        aliases: &[String],
        join: ast::Join,
    ) -> Result<(Table, String, String, ColumnRef, JoinStrategy)> {
        let table = self.database.must_get_table(&join.table.name)?.clone();
        let alias = join.table.alias;
        if aliases.contains(&alias) {
            return Err(Error::Value(format!("Duplicate table alias {}", alias)));
        }
        let (inner, outer) = match (&join.left.qualifier, &join.right.qualifier) {
            (_, Some(q)) if *q == alias => (join.right.name, join.left),
            (Some(q), _) if *q == alias => (join.left.name, join.right),
            _ => {
                return Err(Error::Value(format!(
                    "Join condition {} = {} does not reference {}",
                    join.left, join.right, alias
                )))
            }
        };
        match &outer.qualifier {
            Some(q) if aliases.contains(q) => {}
            _ => return Err(Error::Schema(format!("Unknown table alias in {}", outer))),
        }
        table.get_attribute(&inner)?;

        let strategy = if table.is_primary_key(&inner) {
            JoinStrategy::IndexedNestedLoop(JoinAccess::PrimaryKey)
        } else {
            let index = Index::new(&self.database.name, &table.name, &inner, IndexKind::NonUnique);
            if index.exists(self.store)? {
                JoinStrategy::IndexedNestedLoop(JoinAccess::SecondaryIndex(index))
            } else {
                JoinStrategy::Hash
            }
        };
        info!("Joining {} as {} on {}.{} = {} using {}", table.name, alias, alias, inner, outer, strategy);
        Ok((table, alias, inner, outer, strategy))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::parser::{ast::Statement, Parser};
    use crate::sql::schema::Attribute;
    use crate::storage::document::Memory;

    fn setup() -> Result<(Memory, Database)> {
        let mut database = Database { name: "shop".into(), tables: Vec::new() };
        database.create_table(Table::new(
            "users",
            vec![Attribute::new("id", DataType::Int), Attribute::new("name", DataType::Str)],
        ))?;
        database.create_table(Table::new(
            "orders",
            vec![
                Attribute::new("order_id", DataType::Int),
                Attribute::new("user_id", DataType::Int),
                Attribute::new("total", DataType::Float),
            ],
        ))?;
        let mut store = Memory::new();
        store.create_namespace("shop.users")?;
        store.create_namespace("shop.orders")?;
        Ok((store, database))
    }

    fn plan(store: &Memory, database: &Database, query: &str) -> Result<Plan> {
        match Parser::new(query).parse()? {
            Statement::Select(select) => Planner::new(store, database).build(*select),
            s => panic!("unexpected statement {:?}", s),
        }
    }

    fn scan_filter(plan: &Plan) -> KeyFilter {
        let mut node = &plan.0;
        loop {
            node = match node {
                Node::Scan { filter, .. } => return filter.clone(),
                Node::Aggregation { source, .. }
                | Node::Distinct { source }
                | Node::Filter { source, .. }
                | Node::Join { source, .. }
                | Node::Order { source, .. }
                | Node::Projection { source, .. } => source,
            }
        }
    }

    #[test]
    fn pushdown() -> Result<()> {
        let (store, database) = setup()?;
        let p = plan(&store, &database, "SELECT * FROM users u WHERE u.id >= 2 AND id < 10 AND name = 'a'")?;
        assert_eq!(
            KeyFilter::Range {
                order: KeyOrder::Numeric,
                bounds: vec![
                    (Comparison::GreaterThanOrEqual, "2".into()),
                    (Comparison::LessThan, "10".into())
                ],
            },
            scan_filter(&p)
        );
        assert!(p.to_string().contains("Filter: name = \"a\""));

        let p = plan(&store, &database, "SELECT * FROM users WHERE id = 3")?;
        assert_eq!(KeyFilter::In(["3".to_string()].into_iter().collect()), scan_filter(&p));

        // quoted strings never match an int key, so they stay residual
        let p = plan(&store, &database, "SELECT * FROM users WHERE id = '3'")?;
        assert_eq!(KeyFilter::All, scan_filter(&p));
        Ok(())
    }

    #[test]
    fn join_strategy() -> Result<()> {
        let (mut store, database) = setup()?;
        let query = "SELECT * FROM users u INNER JOIN orders o ON u.id = o.user_id";
        assert_eq!(vec![&JoinStrategy::Hash], plan(&store, &database, query)?.join_strategies());

        let index = Index::new("shop", "orders", "user_id", IndexKind::NonUnique);
        index.build(&mut store, "shop", database.must_get_table("orders")?)?;
        assert_eq!(
            vec![&JoinStrategy::IndexedNestedLoop(JoinAccess::SecondaryIndex(index))],
            plan(&store, &database, query)?.join_strategies()
        );

        let query = "SELECT * FROM orders o INNER JOIN users u ON o.user_id = u.id";
        assert_eq!(
            vec![&JoinStrategy::IndexedNestedLoop(JoinAccess::PrimaryKey)],
            plan(&store, &database, query)?.join_strategies()
        );
        Ok(())
    }

    #[test]
    fn join_errors() -> Result<()> {
        let (store, database) = setup()?;
        assert!(matches!(
            plan(&store, &database, "SELECT * FROM users u INNER JOIN orders o ON u.id = x.user_id"),
            Err(Error::Value(_))
        ));
        assert!(matches!(
            plan(&store, &database, "SELECT * FROM users u INNER JOIN orders o ON x.id = o.user_id"),
            Err(Error::Schema(_))
        ));
        assert!(matches!(
            plan(&store, &database, "SELECT * FROM users u INNER JOIN orders o ON u.id = o.missing"),
            Err(Error::Schema(_))
        ));
        assert!(matches!(plan(&store, &database, "SELECT * FROM nope"), Err(Error::Schema(_))));
        Ok(())
    }
}
