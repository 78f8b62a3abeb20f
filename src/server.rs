use crate::error::{Error, Result};
use crate::sql::engine::{Engine, Session};

use futures::sink::SinkExt as _;
use futures::stream::TryStreamExt as _;
use log::{debug, error, info};
use serde_derive::{Deserialize, Serialize};
use std::net::SocketAddr;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::codec::{Framed, LengthDelimitedCodec};

/// A client request
#[derive(Debug, Serialize, Deserialize)]
pub enum Request {
    /// Executes a single textual command
    Execute(String),
}

/// A server response
#[derive(Debug, PartialEq, Serialize, Deserialize)]
pub enum Response {
    /// The textual result of a command
    Execute(String),
}

/// A relkv server. Each connection gets its own session and sends one
/// command at a time.
pub struct Server {
    engine: Engine,
    listener: Option<TcpListener>,
}

impl Server {
    /// Creates a new server over an engine.
    pub fn new(engine: Engine) -> Self {
        Self { engine, listener: None }
    }

    /// Starts listening on the given address.
    pub async fn listen(mut self, addr: &str) -> Result<Self> {
        self.listener = Some(TcpListener::bind(addr).await?);
        Ok(self)
    }

    /// The address the server is listening on, if any.
    pub fn local_addr(&self) -> Result<Option<SocketAddr>> {
        self.listener.as_ref().map(|l| l.local_addr()).transpose().map_err(Error::from)
    }

    /// Serves client connections until the listener fails.
    pub async fn serve(self) -> Result<()> {
        let listener = self
            .listener
            .ok_or_else(|| Error::Internal("Must listen before serving".into()))?;
        info!("Listening on {}", listener.local_addr()?);
        loop {
            let (socket, peer) = listener.accept().await?;
            let engine = self.engine.clone();
            tokio::spawn(async move {
                info!("Client {} connected", peer);
                match Connection::new(engine, socket).serve().await {
                    Ok(()) => info!("Client {} disconnected", peer),
                    Err(err) => error!("Client {} error: {}", peer, err),
                }
            });
        }
    }
}

/// A client connection, owning its session.
struct Connection {
    engine: Engine,
    socket: TcpStream,
    session: Session,
}

impl Connection {
    fn new(engine: Engine, socket: TcpStream) -> Self {
        Self { engine, socket, session: Session::new() }
    }

    /// Processes requests until the client disconnects. Command errors are
    /// sent back to the client and never end the connection.
    async fn serve(self) -> Result<()> {
        let Connection { engine, socket, mut session } = self;
        let mut stream = tokio_serde::Framed::<_, Request, Result<Response>, _>::new(
            Framed::new(socket, LengthDelimitedCodec::new()),
            tokio_serde::formats::Bincode::default(),
        );
        while let Some(request) = stream.try_next().await? {
            let (next, response) = Self::request(engine.clone(), session, request).await?;
            session = next;
            stream.send(response).await?;
        }
        Ok(())
    }

    /// Runs a request on the blocking pool, since engine commands hold the
    /// engine lock and do synchronous store I/O.
    async fn request(
        engine: Engine,
        mut session: Session,
        request: Request,
    ) -> Result<(Session, Result<Response>)> {
        match request {
            Request::Execute(command) => {
                debug!("Executing {}", command);
                Ok(tokio::task::spawn_blocking(move || {
                    let response = engine
                        .execute(&mut session, &command)
                        .map(|result| Response::Execute(result.to_string()));
                    (session, response)
                })
                .await?)
            }
        }
    }
}
