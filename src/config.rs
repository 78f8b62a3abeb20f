use crate::error::{Error, Result};
use crate::sql::engine::Engine;
use crate::sql::schema::{CatalogStore, FileCatalog, MemoryCatalog};
use crate::storage::document::{Log, Memory, Store};

use serde_derive::Deserialize;
use std::net::SocketAddr;
use std::path::PathBuf;

/// Server configuration, read from defaults, an optional file and
/// `RELKV_*` environment variables, in increasing priority.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct Config {
    pub listen: String,
    pub data_dir: String,
    pub storage: String,
    pub sync: bool,
    pub log_level: String,
}

impl Config {
    /// Loads the configuration, with an optional config file.
    pub fn load(file: Option<&str>) -> Result<Self> {
        let mut builder = config::Config::builder()
            .set_default("listen", "0.0.0.0:9605")?
            .set_default("data_dir", "data")?
            .set_default("storage", "log")?
            .set_default("sync", true)?
            .set_default("log_level", "info")?;
        if let Some(file) = file {
            builder = builder.add_source(config::File::with_name(file));
        }
        let config: Config =
            builder.add_source(config::Environment::with_prefix("RELKV")).build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        self.listen_addr()?;
        match self.storage.as_str() {
            "log" | "memory" => Ok(()),
            other => Err(Error::Config(format!("Unknown storage backend {}", other))),
        }
    }

    /// The address to listen on
    pub fn listen_addr(&self) -> Result<SocketAddr> {
        Ok(self.listen.parse()?)
    }

    /// Opens the configured document store and catalog, and builds an engine
    /// over them.
    pub fn open_engine(&self) -> Result<Engine> {
        let dir = PathBuf::from(&self.data_dir);
        let (store, catalog): (Box<dyn Store>, Box<dyn CatalogStore>) = match self.storage.as_str() {
            "log" => (
                Box::new(Log::new(&dir.join("store"), self.sync)?),
                Box::new(FileCatalog::new(&dir.join("catalog"), self.sync)?),
            ),
            "memory" => (Box::new(Memory::new()), Box::new(MemoryCatalog::new())),
            other => return Err(Error::Config(format!("Unknown storage backend {}", other))),
        };
        Engine::new(store, catalog)
    }
}
