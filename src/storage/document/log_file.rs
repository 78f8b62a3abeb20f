use super::{KeyFilter, Memory, Scan, Store};
use crate::error::{Error, Result};

use serde_derive::{Deserialize, Serialize};
use std::fmt::Display;
use std::fs::{create_dir_all, File, OpenOptions};
use std::io::{BufReader, BufWriter, Read, Seek as _, SeekFrom, Write};
use std::path::Path;

/// 一个追加写的文档存储：所有变更以长度前缀的 bincode 记录追加到单个日志文件中，
/// 当前状态保存在内存里。
///
/// The log file contains sequential binary mutation records, each prefixed
/// by its length as a big-endian u32. On open the file is replayed from the
/// start to rebuild the in-memory state. Since the data set is expected to be
/// small, the cost of replaying on startup is acceptable. A truncated trailing
/// record (e.g. from a crash mid-write) is discarded and cut off the file.
pub struct Log {
    /// The append-only mutation log.
    file: File,
    /// The current state, rebuilt from the log on open.
    state: Memory,
    /// If true, fsync writes.
    sync: bool,
}

/// A logged mutation.
#[derive(Debug, Serialize, Deserialize)]
enum Mutation {
    CreateNamespace(String),
    DropNamespace(String),
    Insert(String, String, Vec<u8>),
    InsertMany(String, Vec<(String, Vec<u8>)>),
    Delete(String, String),
    Update(String, String, Vec<u8>),
}

impl Display for Log {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "log")
    }
}

impl Log {
    /// Creates or opens a log store, with its file in the given directory.
    pub fn new(dir: &Path, sync: bool) -> Result<Self> {
        create_dir_all(dir)?;

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(dir.join("documents"))?;

        let state = Self::replay(&mut file)?;
        Ok(Self { file, state, sync })
    }

    /// Rebuilds the store state by replaying the log file.
    fn replay(file: &mut File) -> Result<Memory> {
        let filesize = file.metadata()?.len();
        let mut state = Memory::new();
        let mut bufreader = BufReader::new(&mut *file);
        let mut sizebuf = [0; 4];
        let mut pos = 0;
        while pos < filesize {
            if pos + 4 > filesize {
                break;
            }
            bufreader.read_exact(&mut sizebuf)?;
            let size = u32::from_be_bytes(sizebuf) as u64;
            if pos + 4 + size > filesize {
                break;
            }
            let mut buf = vec![0; size as usize];
            bufreader.read_exact(&mut buf)?;
            Self::apply(&mut state, bincode::deserialize(&buf)?)?;
            pos += 4 + size;
        }
        drop(bufreader);

        if pos < filesize {
            log::warn!("Discarding {} bytes of incomplete log record", filesize - pos);
            file.set_len(pos)?;
        }
        file.seek(SeekFrom::End(0))?;
        Ok(state)
    }

    /// Applies a mutation to the in-memory state.
    fn apply(state: &mut Memory, mutation: Mutation) -> Result<()> {
        match mutation {
            Mutation::CreateNamespace(ns) => state.create_namespace(&ns),
            Mutation::DropNamespace(ns) => state.drop_namespace(&ns).map(|_| ()),
            Mutation::Insert(ns, key, value) => state.insert(&ns, key, value),
            Mutation::InsertMany(ns, entries) => state.insert_many(&ns, entries).map(|_| ()),
            Mutation::Delete(ns, key) => state.delete(&ns, &key).map(|_| ()),
            Mutation::Update(ns, key, value) => state.update(&ns, &key, value).map(|_| ()),
        }
    }

    /// Appends a mutation record to the log file.
    fn append(&mut self, mutation: &Mutation) -> Result<()> {
        let entry = bincode::serialize(mutation)?;
        let size = u32::try_from(entry.len())
            .map_err(|_| Error::Internal(format!("Log record of {} bytes too large", entry.len())))?;
        let mut bufwriter = BufWriter::new(&mut self.file);
        bufwriter.write_all(&size.to_be_bytes())?;
        bufwriter.write_all(&entry)?;
        bufwriter.flush()?;
        drop(bufwriter);

        if self.sync {
            self.file.sync_data()?;
        }
        Ok(())
    }
}

impl Store for Log {
    fn create_namespace(&mut self, namespace: &str) -> Result<()> {
        if self.state.has_namespace(namespace)? {
            return Ok(());
        }
        self.append(&Mutation::CreateNamespace(namespace.to_string()))?;
        self.state.create_namespace(namespace)
    }

    fn drop_namespace(&mut self, namespace: &str) -> Result<bool> {
        if !self.state.has_namespace(namespace)? {
            return Ok(false);
        }
        self.append(&Mutation::DropNamespace(namespace.to_string()))?;
        self.state.drop_namespace(namespace)
    }

    fn namespaces(&self) -> Result<Vec<String>> {
        self.state.namespaces()
    }

    fn has_namespace(&self, namespace: &str) -> Result<bool> {
        self.state.has_namespace(namespace)
    }

    fn get(&self, namespace: &str, key: &str) -> Result<Option<Vec<u8>>> {
        self.state.get(namespace, key)
    }

    fn scan(&self, namespace: &str, filter: KeyFilter) -> Result<Scan> {
        self.state.scan(namespace, filter)
    }

    fn insert(&mut self, namespace: &str, key: String, value: Vec<u8>) -> Result<()> {
        // Validate against the state first, so that only applicable records are logged.
        if !self.state.has_namespace(namespace)? {
            return Err(Error::Internal(format!("Namespace {} does not exist", namespace)));
        }
        if self.state.get(namespace, &key)?.is_some() {
            return Err(Error::Internal(format!(
                "Key {} already exists in namespace {}",
                key, namespace
            )));
        }
        let mutation = Mutation::Insert(namespace.to_string(), key, value);
        self.append(&mutation)?;
        Self::apply(&mut self.state, mutation)
    }

    fn insert_many(
        &mut self,
        namespace: &str,
        entries: Vec<(String, Vec<u8>)>,
    ) -> Result<Vec<String>> {
        if !self.state.has_namespace(namespace)? {
            return Err(Error::Internal(format!("Namespace {} does not exist", namespace)));
        }
        let mutation = Mutation::InsertMany(namespace.to_string(), entries);
        self.append(&mutation)?;
        match mutation {
            Mutation::InsertMany(ns, entries) => self.state.insert_many(&ns, entries),
            _ => Err(Error::Internal("Unexpected mutation".into())),
        }
    }

    fn delete(&mut self, namespace: &str, key: &str) -> Result<bool> {
        if self.state.get(namespace, key)?.is_none() {
            return Ok(false);
        }
        self.append(&Mutation::Delete(namespace.to_string(), key.to_string()))?;
        self.state.delete(namespace, key)
    }

    fn update(&mut self, namespace: &str, key: &str, value: Vec<u8>) -> Result<bool> {
        if self.state.get(namespace, key)?.is_none() {
            return Ok(false);
        }
        let mutation = Mutation::Update(namespace.to_string(), key.to_string(), value);
        self.append(&mutation)?;
        Self::apply(&mut self.state, mutation)?;
        Ok(true)
    }
}

impl Drop for Log {
    /// Attempt to fsync data on drop, in case we're running without sync.
    fn drop(&mut self) {
        self.file.sync_all().ok();
    }
}

#[cfg(test)]
impl super::TestSuite<Log> for Log {
    fn setup() -> Result<Self> {
        let dir = tempdir::TempDir::new("relkv")?;
        Log::new(dir.as_ref(), false)
    }
}

#[test]
fn tests() -> Result<()> {
    use super::TestSuite;
    Log::test()
}

#[test]
fn test_persistent() -> Result<()> {
    let dir = tempdir::TempDir::new("relkv")?;
    let mut s = Log::new(dir.as_ref(), true)?;

    s.create_namespace("d.t")?;
    s.insert("d.t", "1".into(), b"a".to_vec())?;
    s.insert("d.t", "2".into(), b"b".to_vec())?;
    s.insert_many("d.t", vec![("3".into(), b"c".to_vec()), ("1".into(), b"x".to_vec())])?;
    s.update("d.t", "2", b"B".to_vec())?;
    s.delete("d.t", "3")?;
    s.create_namespace("d.gone")?;
    s.drop_namespace("d.gone")?;
    drop(s);

    let s = Log::new(dir.as_ref(), true)?;
    assert_eq!(vec!["d.t".to_string()], s.namespaces()?);
    assert_eq!(
        vec![("1".to_string(), b"a".to_vec()), ("2".to_string(), b"B".to_vec())],
        s.scan("d.t", KeyFilter::All)?.collect::<Result<Vec<_>>>()?
    );
    Ok(())
}

#[test]
fn test_truncated_tail() -> Result<()> {
    let dir = tempdir::TempDir::new("relkv")?;
    let mut s = Log::new(dir.as_ref(), true)?;
    s.create_namespace("d.t")?;
    s.insert("d.t", "1".into(), b"a".to_vec())?;
    drop(s);

    // Simulate a torn write: a length prefix with no record behind it.
    let mut file = OpenOptions::new().append(true).open(dir.path().join("documents"))?;
    file.write_all(&100u32.to_be_bytes())?;
    file.write_all(&[1, 2, 3])?;
    drop(file);

    let mut s = Log::new(dir.as_ref(), true)?;
    assert_eq!(Some(b"a".to_vec()), s.get("d.t", "1")?);
    s.insert("d.t", "2".into(), b"b".to_vec())?;
    drop(s);

    let s = Log::new(dir.as_ref(), true)?;
    assert_eq!(Some(b"b".to_vec()), s.get("d.t", "2")?);
    Ok(())
}
