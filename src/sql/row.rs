use super::schema::Table;
use super::types::{ColumnRef, Value};

/// A row flowing through query execution: an ordered list of columns, each
/// keyed by the alias of the table it came from (or unqualified, for
/// grouping and aggregate outputs).
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Row {
    pub columns: Vec<(ColumnRef, Value)>,
}

impl Row {
    pub fn new(columns: Vec<(ColumnRef, Value)>) -> Self {
        Self { columns }
    }

    /// Builds a row from a decoded record, qualifying every column with the alias.
    pub fn from_record(alias: &str, table: &Table, values: Vec<Value>) -> Self {
        Self {
            columns: table
                .attributes
                .iter()
                .zip(values)
                .map(|(a, v)| (ColumnRef::qualified(alias, a.name.clone()), v))
                .collect(),
        }
    }

    /// Fetches a column by exact reference.
    pub fn get(&self, column: &ColumnRef) -> Option<&Value> {
        self.columns.iter().find(|(c, _)| c == column).map(|(_, v)| v)
    }

    /// Resolves a column reference in priority order: the exact reference,
    /// then the reference with its alias stripped. An unqualified reference
    /// finally matches a column of that name under any alias; when several
    /// tables have one, the first in column order (the earliest joined
    /// table) wins rather than the reference being rejected as ambiguous.
    pub fn resolve(&self, column: &ColumnRef) -> Option<&Value> {
        if let Some(value) = self.get(column) {
            return Some(value);
        }
        match column.qualifier {
            Some(_) => self.get(&ColumnRef::unqualified(column.name.clone())),
            None => self.columns.iter().find(|(c, _)| c.name == column.name).map(|(_, v)| v),
        }
    }

    /// Returns a copy of this row extended with the columns of an inner row.
    pub fn merge(&self, inner: &Row) -> Row {
        let mut columns = self.columns.clone();
        columns.extend(inner.columns.iter().cloned());
        Row { columns }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row() -> Row {
        Row::new(vec![
            (ColumnRef::qualified("u", "id"), Value::Int(1)),
            (ColumnRef::qualified("u", "name"), Value::Str("ann".into())),
            (ColumnRef::qualified("o", "id"), Value::Int(10)),
            (ColumnRef::unqualified("COUNT(*)"), Value::Int(3)),
        ])
    }

    #[test]
    fn resolve_priority() {
        let row = row();
        assert_eq!(Some(&Value::Int(10)), row.resolve(&ColumnRef::qualified("o", "id")));
        // unqualified falls back to the first column of that name
        assert_eq!(Some(&Value::Int(1)), row.resolve(&ColumnRef::unqualified("id")));
        assert_eq!(Some(&Value::Int(3)), row.resolve(&ColumnRef::qualified("x", "COUNT(*)")));
        // an unknown alias doesn't fall back to another table's column
        assert_eq!(None, row.resolve(&ColumnRef::qualified("p", "name")));
        assert_eq!(Some(&Value::Str("ann".into())), row.resolve(&ColumnRef::unqualified("name")));
        assert_eq!(None, row.resolve(&ColumnRef::unqualified("missing")));
        assert_eq!(None, row.get(&ColumnRef::unqualified("id")));
    }
}
