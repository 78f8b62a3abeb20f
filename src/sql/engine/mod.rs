use super::execution::{self, mutation, ResultSet};
use super::index::{table_namespace, Index, IndexKind};
use super::parser::{ast, Parser};
use super::plan::{Plan, Planner};
use super::schema::{Attribute, Catalog, CatalogStore, Database, Table};
use super::types::Value;
use crate::error::{Error, Result};
use crate::storage::document::Store;

use log::{debug, info};
use std::sync::{Arc, Mutex};

/// A client session. Sessions select their current database independently.
#[derive(Clone, Debug, Default)]
pub struct Session {
    database: Option<String>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// The currently selected database, if any
    pub fn database(&self) -> Option<&str> {
        self.database.as_deref()
    }
}

struct State {
    store: Box<dyn Store>,
    catalog: Catalog,
    catalog_store: Box<dyn CatalogStore>,
}

impl State {
    fn persist(&mut self) -> Result<()> {
        self.catalog_store.save(&self.catalog)
    }
}

/// Resolves the session's current database.
fn current<'a>(session: &Session, catalog: &'a Catalog) -> Result<&'a Database> {
    let name = session.database.as_deref().ok_or_else(|| {
        Error::Schema("There is no selected database. Usage: USE <db_name>".into())
    })?;
    catalog
        .get_database(name)
        .ok_or_else(|| Error::Schema(format!("Database {} does not exist", name)))
}

/// The query engine. Every command runs to completion while holding the
/// engine lock, so commands from concurrent sessions never interleave.
#[derive(Clone)]
pub struct Engine {
    state: Arc<Mutex<State>>,
}

impl Engine {
    /// Creates an engine over a document store and a catalog store, making
    /// sure every table in the catalog has a record namespace.
    pub fn new(mut store: Box<dyn Store>, catalog_store: Box<dyn CatalogStore>) -> Result<Self> {
        let catalog = catalog_store.load()?;
        for database in &catalog.databases {
            for table in &database.tables {
                store.create_namespace(&table_namespace(&database.name, &table.name))?;
            }
        }
        info!("Loaded catalog with {} database(s) over {}", catalog.databases.len(), store);
        Ok(Self { state: Arc::new(Mutex::new(State { store, catalog, catalog_store })) })
    }

    /// Executes a single command in a session.
    pub fn execute(&self, session: &mut Session, command: &str) -> Result<ResultSet> {
        if !Parser::is_command(command) {
            debug!("Unknown command: {}", command);
            return Ok(ResultSet::UnknownCommand);
        }
        let statement = Parser::new(command).parse()?;
        let mut state = self.state.lock()?;
        Self::execute_statement(&mut state, session, statement)
    }

    /// Plans a SELECT query without running it.
    pub fn explain(&self, session: &Session, query: &str) -> Result<Plan> {
        let select = match Parser::new(query).parse()? {
            ast::Statement::Select(select) | ast::Statement::Explain(select) => select,
            _ => return Err(Error::Value("Only SELECT queries can be explained".into())),
        };
        let state = self.state.lock()?;
        let database = current(session, &state.catalog)?;
        Planner::new(state.store.as_ref(), database).build(*select)
    }

    /// Reads the primary keys stored under a value in a column's index,
    /// non-unique first. Returns None if the column has no index or no entry.
    pub fn index_lookup(
        &self,
        session: &Session,
        table: &str,
        column: &str,
        value: &Value,
    ) -> Result<Option<Vec<String>>> {
        let state = self.state.lock()?;
        let database = current(session, &state.catalog)?;
        let table = database.must_get_table(table)?;
        table.get_attribute(column)?;
        for kind in [IndexKind::NonUnique, IndexKind::Unique] {
            let index = Index::new(&database.name, &table.name, column, kind);
            if index.exists(state.store.as_ref())? {
                return Ok(index.get(state.store.as_ref(), value)?.map(|e| e.into_keys()));
            }
        }
        Ok(None)
    }

    fn execute_statement(
        state: &mut State,
        session: &mut Session,
        statement: ast::Statement,
    ) -> Result<ResultSet> {
        match statement {
            ast::Statement::CreateDatabase { name } => {
                state.catalog.create_database(&name)?;
                state.persist()?;
                info!("Created database {}", name);
                Ok(ResultSet::CreateDatabase { name })
            }
            ast::Statement::DropDatabase { name } => {
                state.catalog.drop_database(&name)?;
                state.persist()?;
                let prefix = format!("{}.", name);
                for namespace in state.store.namespaces()? {
                    if namespace.starts_with(&prefix) {
                        state.store.drop_namespace(&namespace)?;
                    }
                }
                if session.database.as_deref() == Some(name.as_str()) {
                    session.database = None;
                }
                info!("Dropped database {}", name);
                Ok(ResultSet::DropDatabase { name })
            }
            ast::Statement::Use { name } => {
                if state.catalog.get_database(&name).is_none() {
                    return Err(Error::Schema(format!("Database {} does not exist", name)));
                }
                session.database = Some(name.clone());
                Ok(ResultSet::UseDatabase { name })
            }
            ast::Statement::CreateTable { name, attributes } => {
                let database = current(session, &state.catalog)?.name.clone();
                let table = Table::new(
                    name.clone(),
                    attributes.into_iter().map(|(n, t)| Attribute::new(n, t)).collect(),
                );
                state
                    .catalog
                    .get_database_mut(&database)
                    .ok_or_else(|| Error::Schema(format!("Database {} does not exist", database)))?
                    .create_table(table)?;
                state.persist()?;
                state.store.create_namespace(&table_namespace(&database, &name))?;
                info!("Created table {}.{}", database, name);
                Ok(ResultSet::CreateTable { name })
            }
            ast::Statement::DropTable { name } => {
                let database = current(session, &state.catalog)?.name.clone();
                let table = state
                    .catalog
                    .get_database_mut(&database)
                    .ok_or_else(|| Error::Schema(format!("Database {} does not exist", database)))?
                    .drop_table(&name)?;
                state.persist()?;
                state.store.drop_namespace(&table_namespace(&database, &name))?;
                Index::drop_all(state.store.as_mut(), &database, &table)?;
                info!("Dropped table {}.{}", database, name);
                Ok(ResultSet::DropTable { name })
            }
            ast::Statement::Insert { table, values } => {
                let database = current(session, &state.catalog)?;
                let schema = database.must_get_table(&table)?;
                let key = mutation::insert(state.store.as_mut(), database, schema, &values)?;
                Ok(ResultSet::Insert { table, key })
            }
            ast::Statement::InsertBulk { table, rows } => {
                let database = current(session, &state.catalog)?;
                let schema = database.must_get_table(&table)?;
                let (count, rejected) =
                    mutation::insert_bulk(state.store.as_mut(), &database.name, schema, &rows)?;
                Ok(ResultSet::InsertBulk { table, count, rejected })
            }
            ast::Statement::Delete { table, condition } => {
                let database = current(session, &state.catalog)?;
                let schema = database.must_get_table(&table)?;
                let column = condition.column.name;
                let (value, count) =
                    mutation::delete(state.store.as_mut(), database, schema, &column, &condition.value)?;
                Ok(ResultSet::Delete { table, count, column, value })
            }
            ast::Statement::CreateIndex { table, column, unique } => {
                let database = current(session, &state.catalog)?;
                let schema = database.must_get_table(&table)?;
                let kind = if unique { IndexKind::Unique } else { IndexKind::NonUnique };
                let index = Index::new(&database.name, &table, &column, kind);
                let count = index.build(state.store.as_mut(), &database.name, schema)?;
                info!("{} index {} built with {} entries", kind, index.namespace, count);
                Ok(ResultSet::CreateIndex { table, column, kind, count })
            }
            ast::Statement::Select(select) => {
                let database = current(session, &state.catalog)?;
                let plan = Planner::new(state.store.as_ref(), database).build(*select)?;
                let rows = execution::execute(state.store.as_ref(), &database.name, plan.0)?;
                Ok(ResultSet::from_rows(rows))
            }
            ast::Statement::Explain(select) => {
                let database = current(session, &state.catalog)?;
                Ok(ResultSet::Explain(Planner::new(state.store.as_ref(), database).build(*select)?))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::schema::MemoryCatalog;
    use crate::storage::document::Memory;

    fn setup() -> Result<(Engine, Session)> {
        let engine = Engine::new(Box::new(Memory::new()), Box::new(MemoryCatalog::new()))?;
        let mut session = Session::new();
        for command in ["CREATE DATABASE shop", "USE shop", "CREATE TABLE users id:int name:str"] {
            engine.execute(&mut session, command)?;
        }
        Ok((engine, session))
    }

    #[test]
    fn requires_database() -> Result<()> {
        let engine = Engine::new(Box::new(Memory::new()), Box::new(MemoryCatalog::new()))?;
        let mut session = Session::new();
        assert!(matches!(
            engine.execute(&mut session, "CREATE TABLE t id:int"),
            Err(Error::Schema(_))
        ));
        assert!(matches!(engine.execute(&mut session, "USE nope"), Err(Error::Schema(_))));
        assert_eq!(ResultSet::UnknownCommand, engine.execute(&mut session, "UPDATE t SET x = 1")?);
        Ok(())
    }

    #[test]
    fn drop_database_clears_session() -> Result<()> {
        let (engine, mut session) = setup()?;
        let mut other = session.clone();
        engine.execute(&mut session, "DROP DATABASE shop")?;
        assert_eq!(None, session.database());
        assert!(matches!(engine.execute(&mut other, "SELECT * FROM users"), Err(Error::Schema(_))));

        // the database's namespaces are gone with it
        engine.execute(&mut session, "CREATE DATABASE shop")?;
        engine.execute(&mut session, "USE shop")?;
        engine.execute(&mut session, "CREATE TABLE users id:int name:str")?;
        assert_eq!(
            ResultSet::Query { rows: vec![] },
            engine.execute(&mut session, "SELECT * FROM users")?
        );
        Ok(())
    }

    #[test]
    fn drop_table_drops_indexes() -> Result<()> {
        let (engine, mut session) = setup()?;
        engine.execute(&mut session, "INSERT INTO users VALUES (1 ann)")?;
        engine.execute(&mut session, "CREATE INDEX name ON users")?;
        assert_eq!(
            Some(vec!["1".to_string()]),
            engine.index_lookup(&session, "users", "name", &Value::Str("ann".into()))?
        );
        engine.execute(&mut session, "DROP TABLE users")?;
        engine.execute(&mut session, "CREATE TABLE users id:int name:str")?;
        assert_eq!(None, engine.index_lookup(&session, "users", "name", &Value::Str("ann".into()))?);
        Ok(())
    }

    #[test]
    fn explain() -> Result<()> {
        let (engine, mut session) = setup()?;
        let result = engine.execute(&mut session, "EXPLAIN SELECT name FROM users WHERE id = 1")?;
        let text = result.to_string();
        assert!(text.starts_with("Distinct"));
        assert!(text.contains("Scan: users AS users (key IN [1])"));
        let plan = engine.explain(&session, "SELECT name FROM users WHERE id = 1")?;
        assert_eq!(ResultSet::Explain(plan), result);
        Ok(())
    }
}
