use relkv::client::Client;
use relkv::config::Config;
use relkv::error::{Error, Result};
use relkv::server::Server;
use relkv::sql::engine::{Engine, Session};
use relkv::sql::schema::MemoryCatalog;
use relkv::storage::document::Memory;

use tempdir::TempDir;

#[tokio::test]
async fn client_server() -> Result<()> {
    let engine = Engine::new(Box::new(Memory::new()), Box::new(MemoryCatalog::new()))?;
    let server = Server::new(engine).listen("127.0.0.1:0").await?;
    let addr = server.local_addr()?.ok_or_else(|| Error::Internal("not listening".into()))?;
    tokio::spawn(server.serve());

    let client = Client::new(addr).await?;
    assert_eq!("Database Created: shop", client.execute("CREATE DATABASE shop").await?);
    assert!(matches!(client.execute("CREATE TABLE t id:int").await, Err(Error::Schema(_))));
    assert_eq!("Using database: shop", client.execute("USE shop").await?);
    assert_eq!("Table created: t", client.execute("CREATE TABLE t id:int").await?);
    assert_eq!("Row inserted into t with key 4", client.execute("INSERT INTO t VALUES (4)").await?);
    assert_eq!("Unknown command", client.execute("HELLO").await?);

    // a second connection has its own session
    let other = Client::new(addr).await?;
    assert!(matches!(other.execute("SELECT * FROM t").await, Err(Error::Schema(_))));
    other.execute("USE shop").await?;
    assert_eq!("[\n  {\n    \"id\": 4\n  }\n]", other.execute("SELECT * FROM t").await?);
    Ok(())
}

#[test]
fn persistence() -> Result<()> {
    let dir = TempDir::new("relkv")?;
    let config = Config {
        listen: "127.0.0.1:0".into(),
        data_dir: dir.path().to_string_lossy().into_owned(),
        storage: "log".into(),
        sync: false,
        log_level: "info".into(),
    };

    {
        let engine = config.open_engine()?;
        let mut session = Session::new();
        for command in [
            "CREATE DATABASE shop",
            "USE shop",
            "CREATE TABLE users id:int name:str",
            "INSERT INTO users VALUES (1 ann)",
            "CREATE INDEX name ON users",
            "INSERT INTO users VALUES (2 ann)",
        ] {
            engine.execute(&mut session, command)?;
        }
    }

    let engine = config.open_engine()?;
    let mut session = Session::new();
    engine.execute(&mut session, "USE shop")?;
    assert_eq!(
        "[\n  {\n    \"id\": 1,\n    \"name\": \"ann\"\n  },\n  {\n    \"id\": 2,\n    \"name\": \"ann\"\n  }\n]",
        engine.execute(&mut session, "SELECT * FROM users")?.to_string()
    );
    assert_eq!(
        Some(vec!["1".to_string(), "2".to_string()]),
        engine.index_lookup(&session, "users", "name", &relkv::sql::types::Value::Str("ann".into()))?
    );
    Ok(())
}
