use crate::sql::parser::ast::{Aggregate, Function};
use crate::sql::row::Row;
use crate::sql::types::{ColumnRef, Value};

use std::cmp::Ordering;
use std::collections::HashMap;

/// Groups rows by the group-by columns and computes the aggregates of each
/// group. Groups come out in first-seen order. Without group-by columns all
/// rows form a single group, which exists even when there are no rows.
pub fn aggregate(rows: Vec<Row>, group_by: &[ColumnRef], aggregates: &[Aggregate]) -> Vec<Row> {
    let mut groups: Vec<(Vec<Value>, Vec<Accumulator>)> = Vec::new();
    let mut positions: HashMap<Vec<Value>, usize> = HashMap::new();
    if group_by.is_empty() {
        groups.push((Vec::new(), aggregates.iter().map(Accumulator::new).collect()));
        positions.insert(Vec::new(), 0);
    }

    for row in &rows {
        let key: Vec<Value> =
            group_by.iter().map(|c| row.resolve(c).cloned().unwrap_or(Value::Null)).collect();
        let position = *positions.entry(key.clone()).or_insert_with(|| {
            groups.push((key, aggregates.iter().map(Accumulator::new).collect()));
            groups.len() - 1
        });
        for (accumulator, aggregate) in groups[position].1.iter_mut().zip(aggregates) {
            match &aggregate.argument {
                None => accumulator.add(&Value::Int(1)),
                Some(column) => {
                    if let Some(value) = row.resolve(column).filter(|v| !v.is_null()) {
                        accumulator.add(value)
                    }
                }
            }
        }
    }

    groups
        .into_iter()
        .map(|(key, accumulators)| {
            let mut columns: Vec<(ColumnRef, Value)> = group_by.iter().cloned().zip(key).collect();
            for (aggregate, accumulator) in aggregates.iter().zip(accumulators) {
                columns.push((ColumnRef::unqualified(aggregate.output_name()), accumulator.finish()));
            }
            Row::new(columns)
        })
        .collect()
}

/// Accumulates values for a single aggregate function. Only non-null values
/// are added.
#[derive(Debug)]
enum Accumulator {
    Avg { sum: f64, count: i64 },
    Count(i64),
    Max(Option<Value>),
    Min(Option<Value>),
    Sum(Value),
}

impl Accumulator {
    fn new(aggregate: &Aggregate) -> Self {
        match aggregate.function {
            Function::Avg => Self::Avg { sum: 0.0, count: 0 },
            Function::Count => Self::Count(0),
            Function::Max => Self::Max(None),
            Function::Min => Self::Min(None),
            Function::Sum => Self::Sum(Value::Int(0)),
        }
    }

    fn add(&mut self, value: &Value) {
        match self {
            Self::Count(count) => *count += 1,
            Self::Avg { sum, count } => match value.numeric() {
                Some(Value::Int(i)) => {
                    *sum += i as f64;
                    *count += 1;
                }
                Some(Value::Float(f)) => {
                    *sum += f;
                    *count += 1;
                }
                _ => {}
            },
            Self::Sum(sum) => {
                *sum = match (&*sum, value.numeric()) {
                    (Value::Int(a), Some(Value::Int(b))) => match a.checked_add(b) {
                        Some(i) => Value::Int(i),
                        None => Value::Float(*a as f64 + b as f64),
                    },
                    (Value::Int(a), Some(Value::Float(b))) => Value::Float(*a as f64 + b),
                    (Value::Float(a), Some(Value::Int(b))) => Value::Float(a + b as f64),
                    (Value::Float(a), Some(Value::Float(b))) => Value::Float(a + b),
                    (current, _) => current.clone(),
                }
            }
            Self::Max(max) => {
                let value = value.numeric().unwrap_or_else(|| value.clone());
                if max.as_ref().map(|m| value.compare(m) == Ordering::Greater).unwrap_or(true) {
                    *max = Some(value)
                }
            }
            Self::Min(min) => {
                let value = value.numeric().unwrap_or_else(|| value.clone());
                if min.as_ref().map(|m| value.compare(m) == Ordering::Less).unwrap_or(true) {
                    *min = Some(value)
                }
            }
        }
    }

    fn finish(self) -> Value {
        match self {
            Self::Avg { count: 0, .. } => Value::Null,
            Self::Avg { sum, count } => Value::Float(sum / count as f64),
            Self::Count(count) => Value::Int(count),
            Self::Max(value) | Self::Min(value) => value.unwrap_or(Value::Null),
            Self::Sum(sum) => sum,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn aggregate_of(function: Function, column: Option<&str>) -> Aggregate {
        Aggregate { function, argument: column.map(|c| ColumnRef::qualified("o", c)) }
    }

    fn rows() -> Vec<Row> {
        [("a", Value::Int(3)), ("b", Value::Str("2.5".into())), ("a", Value::Str("x".into())), ("a", Value::Null)]
            .into_iter()
            .map(|(status, total)| {
                Row::new(vec![
                    (ColumnRef::qualified("o", "status"), Value::Str(status.into())),
                    (ColumnRef::qualified("o", "total"), total),
                ])
            })
            .collect()
    }

    #[test]
    fn grouped() {
        let aggregates = vec![
            aggregate_of(Function::Count, None),
            aggregate_of(Function::Count, Some("total")),
            aggregate_of(Function::Sum, Some("total")),
            aggregate_of(Function::Avg, Some("total")),
            aggregate_of(Function::Max, Some("total")),
        ];
        let out = aggregate(rows(), &[ColumnRef::unqualified("status")], &aggregates);
        assert_eq!(2, out.len());
        assert_eq!(
            vec![
                (ColumnRef::unqualified("status"), Value::Str("a".into())),
                (ColumnRef::unqualified("COUNT(*)"), Value::Int(3)),
                (ColumnRef::unqualified("COUNT(o.total)"), Value::Int(2)),
                (ColumnRef::unqualified("SUM(o.total)"), Value::Int(3)),
                (ColumnRef::unqualified("AVG(o.total)"), Value::Float(3.0)),
                // "x" outranks 3 in mixed comparison, as strings
                (ColumnRef::unqualified("MAX(o.total)"), Value::Str("x".into())),
            ],
            out[0].columns
        );
        assert_eq!(Some(&Value::Float(2.5)), out[1].get(&ColumnRef::unqualified("SUM(o.total)")));
    }

    #[test]
    fn empty_input() {
        let aggregates = vec![
            aggregate_of(Function::Count, None),
            aggregate_of(Function::Sum, Some("total")),
            aggregate_of(Function::Avg, Some("total")),
            aggregate_of(Function::Min, Some("total")),
        ];
        let out = aggregate(Vec::new(), &[], &aggregates);
        assert_eq!(
            vec![Row::new(vec![
                (ColumnRef::unqualified("COUNT(*)"), Value::Int(0)),
                (ColumnRef::unqualified("SUM(o.total)"), Value::Int(0)),
                (ColumnRef::unqualified("AVG(o.total)"), Value::Null),
                (ColumnRef::unqualified("MIN(o.total)"), Value::Null),
            ])],
            out
        );
        assert!(aggregate(Vec::new(), &[ColumnRef::unqualified("status")], &aggregates).is_empty());
    }
}
