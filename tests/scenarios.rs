use relkv::error::{Error, Result};
use relkv::sql::engine::{Engine, Session};
use relkv::sql::execution::ResultSet;
use relkv::sql::plan::{JoinAccess, JoinStrategy};
use relkv::sql::schema::MemoryCatalog;
use relkv::sql::types::Value;
use relkv::storage::document::Memory;

use rand::Rng;
use std::collections::BTreeSet;

fn setup(commands: &[&str]) -> Result<(Engine, Session)> {
    let engine = Engine::new(Box::new(Memory::new()), Box::new(MemoryCatalog::new()))?;
    let mut session = Session::new();
    for command in ["CREATE DATABASE d", "USE d"].iter().chain(commands) {
        engine.execute(&mut session, command)?;
    }
    Ok((engine, session))
}

fn query(engine: &Engine, session: &mut Session, command: &str) -> Result<Vec<Vec<(String, Value)>>> {
    match engine.execute(session, command)? {
        ResultSet::Query { rows } => Ok(rows),
        r => panic!("expected rows, got {:?}", r),
    }
}

#[test]
fn duplicate_primary_key() -> Result<()> {
    let (engine, mut session) = setup(&["CREATE TABLE t id:int name:str", "INSERT INTO t VALUES (1 \"a\")"])?;
    assert!(matches!(
        engine.execute(&mut session, "INSERT INTO t VALUES (1 \"b\")"),
        Err(Error::Integrity(_))
    ));
    assert_eq!(
        vec![vec![("id".to_string(), Value::Int(1)), ("name".to_string(), Value::Str("a".into()))]],
        query(&engine, &mut session, "SELECT * FROM t")?
    );
    Ok(())
}

#[test]
fn delete_through_index() -> Result<()> {
    let (engine, mut session) = setup(&[
        "CREATE TABLE orders order_id:int user_id:int",
        "CREATE INDEX user_id ON orders",
        "INSERT INTO orders VALUES (1 7)",
        "INSERT INTO orders VALUES (2 7)",
        "INSERT INTO orders VALUES (3 7)",
        "INSERT INTO orders VALUES (4 8)",
    ])?;
    assert_eq!(
        Some(vec!["1".to_string(), "2".to_string(), "3".to_string()]),
        engine.index_lookup(&session, "orders", "user_id", &Value::Int(7))?
    );
    let result = engine.execute(&mut session, "DELETE FROM orders WHERE user_id = 7")?;
    assert_eq!("Deleted 3 record(s) from orders where user_id = 7", result.to_string());
    assert_eq!(None, engine.index_lookup(&session, "orders", "user_id", &Value::Int(7))?);
    assert_eq!(
        Some(vec!["4".to_string()]),
        engine.index_lookup(&session, "orders", "user_id", &Value::Int(8))?
    );
    assert!(matches!(
        engine.execute(&mut session, "DELETE FROM orders WHERE user_id = 7"),
        Err(Error::NotFound(_))
    ));
    Ok(())
}

#[test]
fn count_on_empty_table() -> Result<()> {
    let (engine, mut session) = setup(&["CREATE TABLE orders order_id:int user_id:int"])?;
    assert_eq!(
        "[\n  {\n    \"COUNT(*)\": 0\n  }\n]",
        engine.execute(&mut session, "SELECT COUNT(*) FROM orders")?.to_string()
    );
    Ok(())
}

#[test]
fn join_strategy_follows_indexes() -> Result<()> {
    let (engine, mut session) = setup(&[
        "CREATE TABLE products sku:int product_id:int name:str",
        "CREATE TABLE orders order_id:int product_id:int qty:int",
        "INSERT BULK INTO products VALUES (1 10 pen), (2 20 ink), (3 30 pad)",
        "INSERT BULK INTO orders VALUES (1 10 2), (2 10 1), (3 30 5), (4 40 1)",
    ])?;
    let select = "SELECT orders.order_id, products.name FROM orders \
                  INNER JOIN products ON orders.product_id = products.product_id \
                  ORDER BY orders.order_id";

    assert_eq!(vec![&JoinStrategy::Hash], engine.explain(&session, select)?.join_strategies());
    let hashed = engine.execute(&mut session, select)?;

    engine.execute(&mut session, "CREATE INDEX product_id ON products")?;
    let plan = engine.explain(&session, select)?;
    assert!(matches!(
        plan.join_strategies()[..],
        [JoinStrategy::IndexedNestedLoop(JoinAccess::SecondaryIndex(_))]
    ));
    let indexed = engine.execute(&mut session, select)?;
    assert_eq!(hashed, indexed);

    let rows = match indexed {
        ResultSet::Query { rows } => rows,
        r => panic!("expected rows, got {:?}", r),
    };
    assert_eq!(3, rows.len());
    assert_eq!(
        vec![("order_id".to_string(), Value::Int(3)), ("name".to_string(), Value::Str("pad".into()))],
        rows[2]
    );
    Ok(())
}

#[test]
fn join_strategies_agree_on_random_data() -> Result<()> {
    let mut rng = rand::thread_rng();
    let (engine, mut session) =
        setup(&["CREATE TABLE users id:int grp:int", "CREATE TABLE orders oid:int uid:int grp:int"])?;

    let users: Vec<(i64, i64)> = (0..60).map(|id| (id, rng.gen_range(0..8))).collect();
    let orders: Vec<(i64, i64, i64)> =
        (0..2500).map(|oid| (oid, rng.gen_range(0..80), rng.gen_range(0..10))).collect();
    let values =
        |rows: Vec<String>| rows.into_iter().map(|r| format!("({})", r)).collect::<Vec<_>>().join(", ");
    engine.execute(
        &mut session,
        &format!(
            "INSERT BULK INTO users VALUES {}",
            values(users.iter().map(|(id, grp)| format!("{} {}", id, grp)).collect())
        ),
    )?;
    engine.execute(
        &mut session,
        &format!(
            "INSERT BULK INTO orders VALUES {}",
            values(orders.iter().map(|(oid, uid, grp)| format!("{} {} {}", oid, uid, grp)).collect())
        ),
    )?;

    let as_set = |rows: Vec<Vec<(String, Value)>>| -> BTreeSet<Vec<String>> {
        rows.into_iter().map(|r| r.into_iter().map(|(_, v)| v.to_string()).collect()).collect()
    };

    // join on the users primary key
    let select = "SELECT o.oid, u.id, u.grp FROM orders o INNER JOIN users u ON o.uid = u.id";
    assert_eq!(
        vec![&JoinStrategy::IndexedNestedLoop(JoinAccess::PrimaryKey)],
        engine.explain(&session, select)?.join_strategies()
    );
    let expect: BTreeSet<Vec<String>> = orders
        .iter()
        .flat_map(|(oid, uid, _)| {
            users
                .iter()
                .filter(move |(id, _)| id == uid)
                .map(move |(id, grp)| vec![oid.to_string(), id.to_string(), grp.to_string()])
        })
        .collect();
    assert_eq!(expect, as_set(query(&engine, &mut session, select)?));

    // join on a secondary column, before and after indexing it
    let select = "SELECT o.oid, u.id FROM orders o INNER JOIN users u ON o.grp = u.grp";
    assert_eq!(vec![&JoinStrategy::Hash], engine.explain(&session, select)?.join_strategies());
    let hashed = as_set(query(&engine, &mut session, select)?);
    engine.execute(&mut session, "CREATE INDEX grp ON users")?;
    assert_ne!(vec![&JoinStrategy::Hash], engine.explain(&session, select)?.join_strategies());
    assert_eq!(hashed, as_set(query(&engine, &mut session, select)?));
    Ok(())
}

#[test]
fn results_are_distinct() -> Result<()> {
    let (engine, mut session) = setup(&[
        "CREATE TABLE users id:int city:str",
        "INSERT BULK INTO users VALUES (1 rome), (2 oslo), (3 rome), (4 rome)",
    ])?;
    let rows = query(&engine, &mut session, "SELECT city FROM users ORDER BY city")?;
    assert_eq!(
        vec![
            vec![("city".to_string(), Value::Str("oslo".into()))],
            vec![("city".to_string(), Value::Str("rome".into()))],
        ],
        rows
    );
    Ok(())
}

#[test]
fn unique_index_rejects_before_write() -> Result<()> {
    let (engine, mut session) = setup(&[
        "CREATE TABLE users id:int email:str",
        "CREATE UNIQUE INDEX email ON users",
        "INSERT INTO users VALUES (1 'a@x')",
    ])?;
    assert!(matches!(
        engine.execute(&mut session, "INSERT INTO users VALUES (2 'a@x')"),
        Err(Error::Integrity(_))
    ));
    assert!(query(&engine, &mut session, "SELECT * FROM users WHERE id = 2")?.is_empty());
    assert_eq!(
        Some(vec!["1".to_string()]),
        engine.index_lookup(&session, "users", "email", &Value::Str("a@x".into()))?
    );
    Ok(())
}

#[test]
fn grouping_and_ordering() -> Result<()> {
    let (engine, mut session) = setup(&[
        "CREATE TABLE users id:int name:str",
        "CREATE TABLE orders order_id:int user_id:int total:float",
        "INSERT INTO users VALUES (1 ann)",
        "INSERT INTO users VALUES (2 bob)",
        "INSERT INTO users VALUES (3 cid)",
        "INSERT INTO orders VALUES (10 1 5.5)",
        "INSERT INTO orders VALUES (11 1 4.5)",
        "INSERT INTO orders VALUES (12 2 1.0)",
    ])?;
    assert!(matches!(
        engine.execute(&mut session, "INSERT INTO orders VALUES (13 9 1.0)"),
        Err(Error::Integrity(_))
    ));

    let rows = query(
        &engine,
        &mut session,
        "SELECT u.name, COUNT(*), SUM(o.total) FROM users u \
         INNER JOIN orders o ON u.id = o.user_id \
         WHERE u.id >= 1 GROUP BY u.name ORDER BY SUM(o.total) DESC",
    )?;
    assert_eq!(
        vec![
            vec![
                ("name".to_string(), Value::Str("ann".into())),
                ("COUNT(*)".to_string(), Value::Int(2)),
                ("SUM(o.total)".to_string(), Value::Float(10.0)),
            ],
            vec![
                ("name".to_string(), Value::Str("bob".into())),
                ("COUNT(*)".to_string(), Value::Int(1)),
                ("SUM(o.total)".to_string(), Value::Float(1.0)),
            ],
        ],
        rows
    );

    // referenced users can't be deleted once the reference is indexed
    engine.execute(&mut session, "CREATE INDEX user_id ON orders")?;
    assert!(matches!(
        engine.execute(&mut session, "DELETE FROM users WHERE id = 1"),
        Err(Error::Integrity(_))
    ));
    assert_eq!(
        "Deleted 1 record(s) from users where id = 3",
        engine.execute(&mut session, "DELETE FROM users WHERE id = 3")?.to_string()
    );
    Ok(())
}

#[test]
fn syntax_and_type_errors() -> Result<()> {
    let (engine, mut session) = setup(&["CREATE TABLE t id:int score:float"])?;
    assert!(matches!(engine.execute(&mut session, "SELECT * t"), Err(Error::Parse(_))));
    assert!(matches!(
        engine.execute(&mut session, "INSERT INTO t VALUES (1 'high')"),
        Err(Error::Type(_))
    ));
    assert!(matches!(
        engine.execute(&mut session, "INSERT BULK INTO t VALUES (1 2.0), (x 3.0)"),
        Err(Error::Type(_))
    ));
    assert!(query(&engine, &mut session, "SELECT * FROM t")?.is_empty());
    assert_eq!("Unknown command", engine.execute(&mut session, "VACUUM")?.to_string());
    Ok(())
}

#[test]
fn chained_joins_choose_strategies_per_clause() -> Result<()> {
    let (engine, mut session) = setup(&[
        "CREATE TABLE users id:int name:str",
        "CREATE TABLE products pid:int title:str",
        "CREATE TABLE orders oid:int user_id:int product_id:int",
        "INSERT INTO users VALUES (1 ann)",
        "INSERT INTO users VALUES (2 bob)",
        "INSERT INTO products VALUES (1 pen)",
        "INSERT INTO products VALUES (2 ink)",
        "INSERT INTO orders VALUES (10 1 1)",
        "INSERT INTO orders VALUES (11 1 2)",
        "INSERT INTO orders VALUES (12 2 1)",
    ])?;
    let select = "SELECT u.name, p.title FROM users u \
                  INNER JOIN orders o ON u.id = o.user_id \
                  INNER JOIN products p ON o.product_id = p.pid";
    let expect = vec![
        vec![("name".to_string(), Value::Str("ann".into())), ("title".to_string(), Value::Str("pen".into()))],
        vec![("name".to_string(), Value::Str("ann".into())), ("title".to_string(), Value::Str("ink".into()))],
        vec![("name".to_string(), Value::Str("bob".into())), ("title".to_string(), Value::Str("pen".into()))],
    ];

    assert_eq!(
        vec![&JoinStrategy::Hash, &JoinStrategy::IndexedNestedLoop(JoinAccess::PrimaryKey)],
        engine.explain(&session, select)?.join_strategies()
    );
    assert_eq!(expect, query(&engine, &mut session, select)?);

    engine.execute(&mut session, "CREATE INDEX user_id ON orders")?;
    let plan = engine.explain(&session, select)?;
    assert!(matches!(
        plan.join_strategies()[..],
        [
            JoinStrategy::IndexedNestedLoop(JoinAccess::SecondaryIndex(_)),
            JoinStrategy::IndexedNestedLoop(JoinAccess::PrimaryKey)
        ]
    ));
    assert_eq!(expect, query(&engine, &mut session, select)?);
    Ok(())
}

#[test]
fn join_keys_coerce_the_same_under_every_strategy() -> Result<()> {
    let (engine, mut session) = setup(&[
        "CREATE TABLE users id:int name:str",
        "CREATE TABLE orders oid:int uid:str",
        "CREATE TABLE codes code:str label:str",
        "INSERT INTO users VALUES (1 ann)",
        "INSERT INTO users VALUES (7 bob)",
        "INSERT INTO orders VALUES (1 '07')",
        "INSERT INTO orders VALUES (2 '1')",
        "INSERT INTO orders VALUES (3 'x')",
        "INSERT INTO codes VALUES ('007' seven)",
    ])?;
    let select = "SELECT u.name, o.oid FROM users u INNER JOIN orders o ON u.id = o.uid";
    let expect = vec![
        vec![("name".to_string(), Value::Str("ann".into())), ("oid".to_string(), Value::Int(2))],
        vec![("name".to_string(), Value::Str("bob".into())), ("oid".to_string(), Value::Int(1))],
    ];
    assert_eq!(vec![&JoinStrategy::Hash], engine.explain(&session, select)?.join_strategies());
    assert_eq!(expect, query(&engine, &mut session, select)?);

    engine.execute(&mut session, "CREATE INDEX uid ON orders")?;
    assert_ne!(vec![&JoinStrategy::Hash], engine.explain(&session, select)?.join_strategies());
    assert_eq!(expect, query(&engine, &mut session, select)?);

    // a string primary key is matched by its coerced value too
    let rows = query(
        &engine,
        &mut session,
        "SELECT u.name, c.label FROM users u INNER JOIN codes c ON u.id = c.code",
    )?;
    assert_eq!(
        vec![vec![("name".to_string(), Value::Str("bob".into())), ("label".to_string(), Value::Str("seven".into()))]],
        rows
    );
    Ok(())
}
