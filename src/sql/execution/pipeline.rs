use crate::sql::parser::ast::{Condition, Direction, Expression, Operator, Projection};
use crate::sql::row::Row;
use crate::sql::types::{ColumnRef, Value};

use std::cmp::Ordering;
use std::collections::HashSet;

/// Keeps the rows satisfying every condition. The row value is converted to
/// the literal's type before comparing; rows with a missing value or one
/// that doesn't convert are rejected.
pub fn filter(rows: Vec<Row>, predicates: &[Condition]) -> Vec<Row> {
    rows.into_iter().filter(|row| predicates.iter().all(|p| matches(row, p))).collect()
}

fn matches(row: &Row, condition: &Condition) -> bool {
    let target = condition.value.value();
    let current = match (row.resolve(&condition.column), target.datatype()) {
        (Some(value), Some(datatype)) => match value.cast(datatype) {
            Some(current) => current,
            None => return false,
        },
        _ => return false,
    };
    let ordering = current.compare(&target);
    match condition.operator {
        Operator::Equal => ordering == Ordering::Equal,
        Operator::GreaterThan => ordering == Ordering::Greater,
        Operator::GreaterThanOrEqual => ordering != Ordering::Less,
        Operator::LessThan => ordering == Ordering::Less,
        Operator::LessThanOrEqual => ordering != Ordering::Greater,
    }
}

/// Resolves an expression against a row. Aggregates are looked up by their
/// output column name.
fn evaluate<'a>(row: &'a Row, expression: &Expression) -> Option<&'a Value> {
    match expression {
        Expression::Column(column) => row.resolve(column),
        Expression::Aggregate(aggregate) => {
            row.resolve(&ColumnRef::unqualified(aggregate.output_name()))
        }
    }
}

/// Sorts rows by each order key in turn, keeping the input order of ties.
/// Missing values sort as nulls: last ascending, first descending.
pub fn order(rows: Vec<Row>, orders: &[(Expression, Direction)]) -> Vec<Row> {
    let mut keyed: Vec<(Vec<Value>, Row)> = rows
        .into_iter()
        .map(|row| {
            let keys = orders
                .iter()
                .map(|(e, _)| evaluate(&row, e).cloned().unwrap_or(Value::Null))
                .collect();
            (keys, row)
        })
        .collect();
    keyed.sort_by(|(a, _), (b, _)| {
        for ((a, b), (_, direction)) in a.iter().zip(b).zip(orders) {
            let ordering = match direction {
                Direction::Ascending => a.compare(b),
                Direction::Descending => a.compare(b).reverse(),
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    });
    keyed.into_iter().map(|(_, row)| row).collect()
}

/// Projects rows onto output columns, named by their bare column name or,
/// for aggregates, by `FUNC(field)`. Listed columns that don't resolve are
/// null. A later column replaces an earlier one of the same name in place.
pub fn project(rows: Vec<Row>, projection: &Projection) -> Vec<Row> {
    rows.into_iter()
        .map(|row| {
            let mut columns: Vec<(ColumnRef, Value)> = Vec::new();
            match projection {
                Projection::All => {
                    for (column, value) in row.columns {
                        set(&mut columns, ColumnRef::unqualified(column.name), value);
                    }
                }
                Projection::Items(items) => {
                    for expression in items {
                        let name = match expression {
                            Expression::Column(column) => column.name.clone(),
                            Expression::Aggregate(aggregate) => aggregate.output_name(),
                        };
                        let value = evaluate(&row, expression).cloned().unwrap_or(Value::Null);
                        set(&mut columns, ColumnRef::unqualified(name), value);
                    }
                }
            }
            Row::new(columns)
        })
        .collect()
}

fn set(columns: &mut Vec<(ColumnRef, Value)>, column: ColumnRef, value: Value) {
    match columns.iter_mut().find(|(c, _)| *c == column) {
        Some((_, existing)) => *existing = value,
        None => columns.push((column, value)),
    }
}

/// Removes rows identical to an earlier row.
pub fn distinct(rows: Vec<Row>) -> Vec<Row> {
    let mut seen = HashSet::new();
    rows.into_iter().filter(|row| seen.insert(row.clone())).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::parser::ast::Literal;

    fn row(id: i64, name: Option<&str>) -> Row {
        Row::new(vec![
            (ColumnRef::qualified("u", "id"), Value::Int(id)),
            (ColumnRef::qualified("u", "name"), name.map(|n| Value::Str(n.into())).unwrap_or(Value::Null)),
            (ColumnRef::qualified("o", "id"), Value::Str(format!("{}0", id))),
        ])
    }

    fn condition(column: ColumnRef, operator: Operator, value: Literal) -> Condition {
        Condition { column, operator, value }
    }

    #[test]
    fn filter_coerces_to_literal() {
        let rows = vec![row(1, Some("ann")), row(2, None), row(3, Some("cid"))];
        let out = filter(
            rows.clone(),
            &[condition(ColumnRef::qualified("o", "id"), Operator::GreaterThan, Literal::Number("15".into()))],
        );
        assert_eq!(vec![row(2, None), row(3, Some("cid"))], out);

        // null values never match
        let out = filter(
            rows,
            &[condition(ColumnRef::unqualified("name"), Operator::LessThan, Literal::String("zzz".into()))],
        );
        assert_eq!(vec![row(1, Some("ann")), row(3, Some("cid"))], out);
    }

    #[test]
    fn order_nulls() {
        let rows = vec![row(1, Some("b")), row(2, None), row(3, Some("a"))];
        let name = Expression::Column(ColumnRef::unqualified("name"));
        let ids = |rows: Vec<Row>| -> Vec<Value> {
            rows.iter().map(|r| r.columns[0].1.clone()).collect()
        };
        assert_eq!(
            vec![Value::Int(3), Value::Int(1), Value::Int(2)],
            ids(order(rows.clone(), &[(name.clone(), Direction::Ascending)]))
        );
        assert_eq!(
            vec![Value::Int(2), Value::Int(1), Value::Int(3)],
            ids(order(rows, &[(name, Direction::Descending)]))
        );
    }

    #[test]
    fn project_and_distinct() {
        let rows = vec![row(1, Some("ann")), row(1, Some("ann"))];
        let all = project(rows.clone(), &Projection::All);
        assert_eq!(
            vec![
                (ColumnRef::unqualified("id"), Value::Str("10".into())),
                (ColumnRef::unqualified("name"), Value::Str("ann".into())),
            ],
            all[0].columns
        );
        assert_eq!(1, distinct(all).len());

        let items = project(
            rows,
            &Projection::Items(vec![
                Expression::Column(ColumnRef::qualified("u", "name")),
                Expression::Column(ColumnRef::unqualified("missing")),
            ]),
        );
        assert_eq!(
            vec![
                (ColumnRef::unqualified("name"), Value::Str("ann".into())),
                (ColumnRef::unqualified("missing"), Value::Null),
            ],
            items[0].columns
        );

        // same-named columns from different tables share one output column
        let items = project(
            vec![row(2, Some("bob"))],
            &Projection::Items(vec![
                Expression::Column(ColumnRef::qualified("u", "id")),
                Expression::Column(ColumnRef::qualified("u", "name")),
                Expression::Column(ColumnRef::qualified("o", "id")),
            ]),
        );
        assert_eq!(
            vec![
                (ColumnRef::unqualified("id"), Value::Str("20".into())),
                (ColumnRef::unqualified("name"), Value::Str("bob".into())),
            ],
            items[0].columns
        );
    }
}
