mod log_file;
mod memory;

pub use self::log_file::Log;
pub use self::memory::Memory;
#[cfg(test)]
use self::test::TestSuite;

use crate::error::Result;

use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt::Display;

/// A key comparison used in range filters.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Comparison {
    Equal,
    GreaterThan,
    GreaterThanOrEqual,
    LessThan,
    LessThanOrEqual,
}

impl Comparison {
    /// Checks whether an ordering of key against bound satisfies the comparison.
    pub fn accepts(self, ordering: Ordering) -> bool {
        match self {
            Comparison::Equal => ordering == Ordering::Equal,
            Comparison::GreaterThan => ordering == Ordering::Greater,
            Comparison::GreaterThanOrEqual => ordering != Ordering::Less,
            Comparison::LessThan => ordering == Ordering::Less,
            Comparison::LessThanOrEqual => ordering != Ordering::Greater,
        }
    }
}

/// How keys are ordered when evaluating a range filter.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeyOrder {
    /// Byte-wise string order
    Lexical,
    /// Keys and bounds are parsed as numbers; unparseable keys never match
    Numeric,
}

/// A store-level key filter.
#[derive(Clone, Debug, PartialEq)]
pub enum KeyFilter {
    /// Every key in the namespace
    All,
    /// Exactly the given keys, when present
    In(BTreeSet<String>),
    /// Keys satisfying every bound
    Range { order: KeyOrder, bounds: Vec<(Comparison, String)> },
}

impl KeyFilter {
    /// Checks whether a key passes the filter.
    pub fn matches(&self, key: &str) -> bool {
        match self {
            KeyFilter::All => true,
            KeyFilter::In(keys) => keys.contains(key),
            KeyFilter::Range { order, bounds } => bounds.iter().all(|(comparison, bound)| {
                match order {
                    KeyOrder::Lexical => comparison.accepts(key.cmp(bound.as_str())),
                    KeyOrder::Numeric => match (key.parse::<f64>(), bound.parse::<f64>()) {
                        (Ok(k), Ok(b)) => {
                            k.partial_cmp(&b).map(|o| comparison.accepts(o)).unwrap_or(false)
                        }
                        _ => false,
                    },
                }
            }),
        }
    }
}

/// A namespace scan, yielding key/value pairs in key order.
pub type Scan<'a> = Box<dyn Iterator<Item = Result<(String, Vec<u8>)>> + 'a>;

/// A document store: a flat set of named namespaces, each mapping an opaque
/// string key to an opaque value. The engine alone interprets the values.
pub trait Store: Display + Send {
    /// Creates a namespace. Creating an existing namespace is a no-op.
    fn create_namespace(&mut self, namespace: &str) -> Result<()>;

    /// Drops a namespace and all its entries, returning whether it existed.
    fn drop_namespace(&mut self, namespace: &str) -> Result<bool>;

    /// Lists all namespace names.
    fn namespaces(&self) -> Result<Vec<String>>;

    /// Checks whether a namespace exists.
    fn has_namespace(&self, namespace: &str) -> Result<bool> {
        Ok(self.namespaces()?.iter().any(|n| n == namespace))
    }

    /// Fetches a value by key. Missing namespaces behave as empty.
    fn get(&self, namespace: &str, key: &str) -> Result<Option<Vec<u8>>>;

    /// Scans a namespace with a key filter. Missing namespaces behave as empty.
    fn scan(&self, namespace: &str, filter: KeyFilter) -> Result<Scan>;

    /// Inserts a new entry. Errors if the key exists or the namespace is missing.
    fn insert(&mut self, namespace: &str, key: String, value: Vec<u8>) -> Result<()>;

    /// Inserts many entries without ordering guarantees. Entries whose key
    /// already exists (in the store or earlier in the batch) are skipped and
    /// their keys returned; all other entries are written.
    fn insert_many(
        &mut self,
        namespace: &str,
        entries: Vec<(String, Vec<u8>)>,
    ) -> Result<Vec<String>>;

    /// Deletes an entry, returning whether it existed.
    fn delete(&mut self, namespace: &str, key: &str) -> Result<bool>;

    /// Replaces the value of an existing entry, returning whether it existed.
    fn update(&mut self, namespace: &str, key: &str, value: Vec<u8>) -> Result<bool>;
}
