use crate::error::{Error, Result};
use crate::server::{Request, Response};

use futures::sink::SinkExt as _;
use futures::stream::TryStreamExt as _;
use std::sync::Arc;
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio::sync::Mutex;
use tokio_util::codec::{Framed, LengthDelimitedCodec};

type Connection = tokio_serde::Framed<
    Framed<TcpStream, LengthDelimitedCodec>,
    Result<Response>,
    Request,
    tokio_serde::formats::Bincode<Result<Response>, Request>,
>;

/// A relkv client. Clones share the connection, and with it the server-side
/// session.
#[derive(Clone)]
pub struct Client {
    conn: Arc<Mutex<Connection>>,
}

impl Client {
    /// Connects to a relkv server.
    pub async fn new<A: ToSocketAddrs>(addr: A) -> Result<Self> {
        Ok(Self {
            conn: Arc::new(Mutex::new(tokio_serde::Framed::new(
                Framed::new(TcpStream::connect(addr).await?, LengthDelimitedCodec::new()),
                tokio_serde::formats::Bincode::default(),
            ))),
        })
    }

    /// Executes a command, returning the server's textual response. Command
    /// errors come back as Err.
    pub async fn execute(&self, command: &str) -> Result<String> {
        let mut conn = self.conn.lock().await;
        conn.send(Request::Execute(command.to_string())).await?;
        match conn.try_next().await? {
            Some(result) => match result? {
                Response::Execute(text) => Ok(text),
            },
            None => Err(Error::Internal("Server disconnected".into())),
        }
    }
}
