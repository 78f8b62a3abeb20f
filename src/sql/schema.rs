use super::types::DataType;
use crate::error::{Error, Result};

use lazy_static::lazy_static;
use regex::Regex;
use serde_derive::{Deserialize, Serialize};
use std::fmt::{self, Display};
use std::fs::{self, File as StdFile};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

lazy_static! {
    static ref IDENTIFIER: Regex = Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap();
    static ref FOREIGN_KEY: Regex = Regex::new(r"^([A-Za-z0-9_]+)_id$").unwrap();
}

/// Validates a database, table or attribute name.
pub fn validate_name(kind: &str, name: &str) -> Result<()> {
    if IDENTIFIER.is_match(name) {
        Ok(())
    } else {
        Err(Error::Schema(format!("Invalid {} name '{}'", kind, name)))
    }
}

/// The catalog stores schema information: the tree of databases, their
/// tables and the tables' ordered attributes.
//数据库中的“catalog”通常指存储和管理数据库、表、列等对象的元数据和模式信息的组件。
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct Catalog {
    pub databases: Vec<Database>,
}

impl Catalog {
    /// Fetches a database by name, if it exists
    pub fn get_database(&self, name: &str) -> Option<&Database> {
        self.databases.iter().find(|d| d.name == name)
    }

    /// Fetches a database by name for modification, if it exists
    pub fn get_database_mut(&mut self, name: &str) -> Option<&mut Database> {
        self.databases.iter_mut().find(|d| d.name == name)
    }

    /// Creates a new, empty database
    pub fn create_database(&mut self, name: &str) -> Result<()> {
        validate_name("database", name)?;
        if self.get_database(name).is_some() {
            return Err(Error::Schema(format!("Database {} already exists", name)));
        }
        self.databases.push(Database { name: name.to_string(), tables: Vec::new() });
        Ok(())
    }

    /// Removes a database, returning its definition
    pub fn drop_database(&mut self, name: &str) -> Result<Database> {
        let index = self
            .databases
            .iter()
            .position(|d| d.name == name)
            .ok_or_else(|| Error::NotFound(format!("Database {} does not exist", name)))?;
        Ok(self.databases.remove(index))
    }
}

/// A database: a named set of tables
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct Database {
    pub name: String,
    pub tables: Vec<Table>,
}

impl Database {
    /// Fetches a table by name, if it exists
    pub fn get_table(&self, name: &str) -> Option<&Table> {
        self.tables.iter().find(|t| t.name == name)
    }

    /// Fetches a table, and errors if it does not exist
    pub fn must_get_table(&self, name: &str) -> Result<&Table> {
        self.get_table(name).ok_or_else(|| {
            Error::Schema(format!("Table {} does not exist in database {}", name, self.name))
        })
    }

    /// Adds a validated table
    pub fn create_table(&mut self, table: Table) -> Result<()> {
        table.validate()?;
        if self.get_table(&table.name).is_some() {
            return Err(Error::Schema(format!("Table {} already exists", table.name)));
        }
        self.tables.push(table);
        Ok(())
    }

    /// Removes a table, returning its definition
    pub fn drop_table(&mut self, name: &str) -> Result<Table> {
        let index = self
            .tables
            .iter()
            .position(|t| t.name == name)
            .ok_or_else(|| Error::NotFound(format!("Table {} does not exist", name)))?;
        Ok(self.tables.remove(index))
    }

    /// Resolves the table a foreign key attribute refers to, by naming
    /// convention. Returns None if the attribute is not a foreign key or no
    /// matching table exists.
    pub fn referenced_table(&self, attribute: &Attribute) -> Option<&Table> {
        let stem = attribute.foreign_key_stem()?;
        reference_candidates(stem).iter().find_map(|name| self.get_table(name))
    }

    /// Returns all attributes in other tables whose naming refers to the
    /// given table, as (table, attribute) pairs.
    pub fn references_to(&self, table: &str) -> Vec<(&Table, &Attribute)> {
        self.tables
            .iter()
            .filter(|t| t.name != table)
            .flat_map(|t| {
                t.attributes
                    .iter()
                    .skip(1)
                    .filter(move |a| {
                        a.foreign_key_stem()
                            .map(|stem| reference_candidates(stem).iter().any(|c| c == table))
                            .unwrap_or(false)
                    })
                    .map(move |a| (t, a))
            })
            .collect()
    }
}

/// Table names a foreign key stem may refer to: `user_id` refers to `user`,
/// `users`, and `category_id` also to `categories`.
fn reference_candidates(stem: &str) -> Vec<String> {
    let mut candidates = vec![stem.to_string(), format!("{}s", stem), format!("{}es", stem)];
    if let Some(prefix) = stem.strip_suffix('y') {
        candidates.push(format!("{}ies", prefix));
    }
    candidates
}

/// A table schema. The first attribute is the primary key.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct Table {
    pub name: String,
    pub attributes: Vec<Attribute>,
}

impl Table {
    /// Creates a new table schema
    pub fn new(name: impl Into<String>, attributes: Vec<Attribute>) -> Self {
        Self { name: name.into(), attributes }
    }

    /// Returns the primary key attribute of the table
    pub fn primary_key(&self) -> Result<&Attribute> {
        self.attributes
            .first()
            .ok_or_else(|| Error::Schema(format!("Table {} has no attributes", self.name)))
    }

    /// Checks whether the named attribute is the primary key
    pub fn is_primary_key(&self, name: &str) -> bool {
        self.attributes.first().map(|a| a.name == name).unwrap_or(false)
    }

    /// Fetches an attribute by name
    pub fn get_attribute(&self, name: &str) -> Result<&Attribute> {
        self.attributes.iter().find(|a| a.name == name).ok_or_else(|| {
            Error::Schema(format!("Column {} not found in table {}", name, self.name))
        })
    }

    /// Fetches an attribute position by name
    pub fn get_attribute_index(&self, name: &str) -> Result<usize> {
        self.attributes.iter().position(|a| a.name == name).ok_or_else(|| {
            Error::Schema(format!("Column {} not found in table {}", name, self.name))
        })
    }

    /// Validates the table schema
    pub fn validate(&self) -> Result<()> {
        validate_name("table", &self.name)?;
        if self.attributes.is_empty() {
            return Err(Error::Schema(format!("Table {} has no attributes", self.name)));
        }
        for (i, attribute) in self.attributes.iter().enumerate() {
            validate_name("attribute", &attribute.name)?;
            if self.attributes[..i].iter().any(|a| a.name == attribute.name) {
                return Err(Error::Schema(format!(
                    "Duplicate attribute {} in table {}",
                    attribute.name, self.name
                )));
            }
        }
        Ok(())
    }
}

impl Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CREATE TABLE {} {}",
            self.name,
            self.attributes.iter().map(|a| a.to_string()).collect::<Vec<_>>().join(" ")
        )
    }
}

/// A table attribute (column) schema
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct Attribute {
    pub name: String,
    pub datatype: DataType,
}

impl Attribute {
    pub fn new(name: impl Into<String>, datatype: DataType) -> Self {
        Self { name: name.into(), datatype }
    }

    /// Returns the referenced-table stem if the name follows the `<X>_id`
    /// foreign key convention.
    pub fn foreign_key_stem(&self) -> Option<&str> {
        FOREIGN_KEY.captures(&self.name).and_then(|c| c.get(1)).map(|m| m.as_str())
    }
}

impl Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.name, self.datatype)
    }
}

/// Persists the catalog. Saves must be atomic: readers never observe a
/// partially written catalog.
pub trait CatalogStore: Send {
    /// Loads the full catalog, or an empty one if none has been saved.
    fn load(&self) -> Result<Catalog>;

    /// Replaces the persisted catalog.
    fn save(&mut self, catalog: &Catalog) -> Result<()>;
}

/// A catalog persisted as a bincode file. Saves write a temporary file and
/// rename it over the old one.
pub struct FileCatalog {
    path: PathBuf,
    sync: bool,
}

impl FileCatalog {
    pub fn new(path: &Path, sync: bool) -> Result<Self> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        Ok(Self { path: path.to_path_buf(), sync })
    }
}

impl CatalogStore for FileCatalog {
    fn load(&self) -> Result<Catalog> {
        match StdFile::open(&self.path) {
            Ok(file) => Ok(bincode::deserialize_from(BufReader::new(file))?),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Catalog::default()),
            Err(err) => Err(err.into()),
        }
    }

    fn save(&mut self, catalog: &Catalog) -> Result<()> {
        let tmp = self.path.with_extension("tmp");
        let file = StdFile::create(&tmp)?;
        let mut bufwriter = BufWriter::new(&file);
        bincode::serialize_into(&mut bufwriter, catalog)?;
        bufwriter.flush()?;
        drop(bufwriter);
        if self.sync {
            file.sync_all()?;
        }
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

/// An in-memory catalog store, for tests and memory-only servers.
#[derive(Default)]
pub struct MemoryCatalog {
    catalog: Catalog,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CatalogStore for MemoryCatalog {
    fn load(&self) -> Result<Catalog> {
        Ok(self.catalog.clone())
    }

    fn save(&mut self, catalog: &Catalog) -> Result<()> {
        self.catalog = catalog.clone();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shop() -> Database {
        let mut db = Database { name: "shop".into(), tables: Vec::new() };
        db.create_table(Table::new(
            "users",
            vec![Attribute::new("id", DataType::Int), Attribute::new("name", DataType::Str)],
        ))
        .unwrap();
        db.create_table(Table::new(
            "categories",
            vec![Attribute::new("category_id", DataType::Int)],
        ))
        .unwrap();
        db.create_table(Table::new(
            "orders",
            vec![
                Attribute::new("order_id", DataType::Int),
                Attribute::new("user_id", DataType::Int),
                Attribute::new("category_id", DataType::Int),
            ],
        ))
        .unwrap();
        db
    }

    #[test]
    fn table_validation() {
        let mut db = shop();
        assert!(matches!(
            db.create_table(Table::new("empty", vec![])),
            Err(Error::Schema(_))
        ));
        assert!(matches!(
            db.create_table(Table::new(
                "dup",
                vec![Attribute::new("a", DataType::Int), Attribute::new("a", DataType::Str)]
            )),
            Err(Error::Schema(_))
        ));
        assert!(matches!(
            db.create_table(Table::new("users", vec![Attribute::new("id", DataType::Int)])),
            Err(Error::Schema(_))
        ));
        assert!(matches!(
            db.create_table(Table::new("bad.name", vec![Attribute::new("id", DataType::Int)])),
            Err(Error::Schema(_))
        ));
    }

    #[test]
    fn foreign_key_convention() {
        let db = shop();
        let orders = db.must_get_table("orders").unwrap();
        let user_id = orders.get_attribute("user_id").unwrap();
        let category_id = orders.get_attribute("category_id").unwrap();
        assert_eq!(Some("user"), user_id.foreign_key_stem());
        assert_eq!("users", db.referenced_table(user_id).unwrap().name);
        assert_eq!("categories", db.referenced_table(category_id).unwrap().name);
        assert_eq!(None, db.must_get_table("users").unwrap().attributes[1].foreign_key_stem());

        let refs: Vec<_> =
            db.references_to("users").into_iter().map(|(t, a)| (t.name.clone(), a.name.clone())).collect();
        assert_eq!(vec![("orders".to_string(), "user_id".to_string())], refs);
    }

    #[test]
    fn file_catalog_roundtrip() -> Result<()> {
        let dir = tempdir::TempDir::new("relkv")?;
        let mut store = FileCatalog::new(&dir.path().join("catalog"), false)?;
        assert_eq!(Catalog::default(), store.load()?);

        let mut catalog = Catalog::default();
        catalog.create_database("shop")?;
        catalog.get_database_mut("shop").unwrap().tables = shop().tables;
        store.save(&catalog)?;
        assert_eq!(catalog, FileCatalog::new(&dir.path().join("catalog"), false)?.load()?);
        assert!(!dir.path().join("catalog.tmp").exists());
        Ok(())
    }
}
