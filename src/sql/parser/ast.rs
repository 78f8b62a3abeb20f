use crate::sql::types::{ColumnRef, DataType, Value};

use std::fmt::{self, Display};

/// Statements
#[derive(Clone, Debug, PartialEq)]
pub enum Statement {
    CreateDatabase { name: String },
    DropDatabase { name: String },
    Use { name: String },
    CreateTable { name: String, attributes: Vec<(String, DataType)> },
    DropTable { name: String },
    Insert { table: String, values: Vec<Literal> },
    InsertBulk { table: String, rows: Vec<Vec<Literal>> },
    Delete { table: String, condition: Condition },
    CreateIndex { table: String, column: String, unique: bool },
    Select(Box<Select>),
    Explain(Box<Select>),
}

/// A SELECT query
#[derive(Clone, Debug, PartialEq)]
pub struct Select {
    pub projection: Projection,
    pub from: TableRef,
    pub joins: Vec<Join>,
    pub filter: Vec<Condition>,
    pub group_by: Vec<ColumnRef>,
    pub order_by: Vec<(Expression, Direction)>,
}

impl Select {
    /// Returns every aggregate in the projection, in order.
    pub fn aggregates(&self) -> Vec<Aggregate> {
        match &self.projection {
            Projection::All => Vec::new(),
            Projection::Items(items) => items
                .iter()
                .filter_map(|e| match e {
                    Expression::Aggregate(a) => Some(a.clone()),
                    Expression::Column(_) => None,
                })
                .collect(),
        }
    }
}

/// The SELECT projection list
#[derive(Clone, Debug, PartialEq)]
pub enum Projection {
    /// `*`
    All,
    Items(Vec<Expression>),
}

/// A table in FROM or JOIN. The alias defaults to the table name.
#[derive(Clone, Debug, PartialEq)]
pub struct TableRef {
    pub name: String,
    pub alias: String,
}

/// An INNER JOIN clause: `INNER JOIN table [alias] ON a.x = b.y`
#[derive(Clone, Debug, PartialEq)]
pub struct Join {
    pub table: TableRef,
    pub left: ColumnRef,
    pub right: ColumnRef,
}

/// A single comparison between a column and a literal
#[derive(Clone, Debug, PartialEq)]
pub struct Condition {
    pub column: ColumnRef,
    pub operator: Operator,
    pub value: Literal,
}

impl Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.column, self.operator, self.value)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operator {
    Equal,
    GreaterThan,
    GreaterThanOrEqual,
    LessThan,
    LessThanOrEqual,
}

impl Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Operator::Equal => "=",
            Operator::GreaterThan => ">",
            Operator::GreaterThanOrEqual => ">=",
            Operator::LessThan => "<",
            Operator::LessThanOrEqual => "<=",
        })
    }
}

/// A literal value as written. Numbers keep their source text so that
/// conversion to the target column type happens at execution time.
#[derive(Clone, Debug, PartialEq)]
pub enum Literal {
    Number(String),
    String(String),
}

impl Literal {
    /// Interprets the literal on its own: integers, then floats, then strings.
    pub fn value(&self) -> Value {
        match self {
            Literal::Number(n) => n
                .parse()
                .map(Value::Int)
                .or_else(|_| n.parse().map(Value::Float))
                .unwrap_or_else(|_| Value::Str(n.clone())),
            Literal::String(s) => Value::Str(s.clone()),
        }
    }

    /// Converts the literal to a column's type. Quoted strings never
    /// convert to numbers.
    pub fn to_type(&self, datatype: DataType) -> Option<Value> {
        match (self, datatype) {
            (Literal::Number(n), DataType::Int) => n.parse().ok().map(Value::Int),
            (Literal::Number(n), DataType::Float) => n.parse().ok().map(Value::Float),
            (Literal::Number(n), DataType::Str) => Some(Value::Str(n.clone())),
            (Literal::String(s), DataType::Str) => Some(Value::Str(s.clone())),
            (Literal::String(_), _) => None,
        }
    }
}

impl Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Number(n) => f.write_str(n),
            Literal::String(s) => write!(f, "\"{}\"", s),
        }
    }
}

/// A projected or ordered expression
#[derive(Clone, Debug, PartialEq)]
pub enum Expression {
    Column(ColumnRef),
    Aggregate(Aggregate),
}

impl Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expression::Column(c) => c.fmt(f),
            Expression::Aggregate(a) => a.fmt(f),
        }
    }
}

/// An aggregate function call. A None argument is `*`.
#[derive(Clone, Debug, PartialEq)]
pub struct Aggregate {
    pub function: Function,
    pub argument: Option<ColumnRef>,
}

impl Aggregate {
    /// The output column name, e.g. `COUNT(*)` or `SUM(o.total)`.
    pub fn output_name(&self) -> String {
        self.to_string()
    }
}

impl Display for Aggregate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.argument {
            Some(column) => write!(f, "{}({})", self.function, column),
            None => write!(f, "{}(*)", self.function),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Function {
    Avg,
    Count,
    Max,
    Min,
    Sum,
}

impl Function {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_uppercase().as_str() {
            "AVG" => Some(Function::Avg),
            "COUNT" => Some(Function::Count),
            "MAX" => Some(Function::Max),
            "MIN" => Some(Function::Min),
            "SUM" => Some(Function::Sum),
            _ => None,
        }
    }
}

impl Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Function::Avg => "AVG",
            Function::Count => "COUNT",
            Function::Max => "MAX",
            Function::Min => "MIN",
            Function::Sum => "SUM",
        })
    }
}

/// Sort orders
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

impl Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Direction::Ascending => "ASC",
            Direction::Descending => "DESC",
        })
    }
}
