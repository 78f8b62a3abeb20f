use super::{KeyFilter, Scan, Store};
use crate::error::{Error, Result};

use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, HashSet};
use std::fmt::Display;

/// An in-memory document store, using nested B-trees.
pub struct Memory {
    namespaces: BTreeMap<String, BTreeMap<String, Vec<u8>>>,
}

impl Display for Memory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "memory")
    }
}

impl Memory {
    /// Creates a new, empty in-memory store.
    pub fn new() -> Self {
        Self { namespaces: BTreeMap::new() }
    }

    fn namespace_mut(&mut self, namespace: &str) -> Result<&mut BTreeMap<String, Vec<u8>>> {
        self.namespaces
            .get_mut(namespace)
            .ok_or_else(|| Error::Internal(format!("Namespace {} does not exist", namespace)))
    }
}

impl Store for Memory {
    fn create_namespace(&mut self, namespace: &str) -> Result<()> {
        self.namespaces.entry(namespace.to_string()).or_default();
        Ok(())
    }

    fn drop_namespace(&mut self, namespace: &str) -> Result<bool> {
        Ok(self.namespaces.remove(namespace).is_some())
    }

    fn namespaces(&self) -> Result<Vec<String>> {
        Ok(self.namespaces.keys().cloned().collect())
    }

    fn has_namespace(&self, namespace: &str) -> Result<bool> {
        Ok(self.namespaces.contains_key(namespace))
    }

    fn get(&self, namespace: &str, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.namespaces.get(namespace).and_then(|ns| ns.get(key)).cloned())
    }

    fn scan(&self, namespace: &str, filter: KeyFilter) -> Result<Scan> {
        let ns = match self.namespaces.get(namespace) {
            Some(ns) => ns,
            None => return Ok(Box::new(std::iter::empty())),
        };
        match filter {
            // 集合查询直接点查，避免全表扫描
            KeyFilter::In(keys) => Ok(Box::new(
                keys.into_iter()
                    .filter_map(move |k| ns.get(&k).map(|v| Ok((k, v.clone())))),
            )),
            filter => Ok(Box::new(
                ns.iter()
                    .filter(move |(k, _)| filter.matches(k))
                    .map(|(k, v)| Ok((k.clone(), v.clone()))),
            )),
        }
    }

    fn insert(&mut self, namespace: &str, key: String, value: Vec<u8>) -> Result<()> {
        match self.namespace_mut(namespace)?.entry(key) {
            Entry::Occupied(e) => Err(Error::Internal(format!(
                "Key {} already exists in namespace {}",
                e.key(),
                namespace
            ))),
            Entry::Vacant(e) => {
                e.insert(value);
                Ok(())
            }
        }
    }

    fn insert_many(
        &mut self,
        namespace: &str,
        entries: Vec<(String, Vec<u8>)>,
    ) -> Result<Vec<String>> {
        let ns = self.namespace_mut(namespace)?;
        let mut seen = HashSet::new();
        let mut rejected = Vec::new();
        for (key, value) in entries {
            if !seen.insert(key.clone()) || ns.contains_key(&key) {
                rejected.push(key);
                continue;
            }
            ns.insert(key, value);
        }
        Ok(rejected)
    }

    fn delete(&mut self, namespace: &str, key: &str) -> Result<bool> {
        Ok(self.namespaces.get_mut(namespace).and_then(|ns| ns.remove(key)).is_some())
    }

    fn update(&mut self, namespace: &str, key: &str, value: Vec<u8>) -> Result<bool> {
        match self.namespaces.get_mut(namespace).and_then(|ns| ns.get_mut(key)) {
            Some(existing) => {
                *existing = value;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[cfg(test)]
impl super::TestSuite<Memory> for Memory {
    fn setup() -> Result<Self> {
        Ok(Memory::new())
    }
}

#[test]
fn tests() -> Result<()> {
    use super::TestSuite;
    Memory::test()
}
