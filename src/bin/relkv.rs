/*
 * relkv is the relkv server. It takes configuration from an optional file
 * and RELKV_* environment variables, and serves commands over TCP.
 */

#![warn(clippy::all)]

use clap::Parser;
use relkv::config::Config;
use relkv::error::Result;
use relkv::server::Server;
use tracing_subscriber::EnvFilter;

/// relkv server
#[derive(Parser, Debug)]
#[command(name = "relkv", version, about = "A relational query engine over a document store")]
struct Args {
    /// Configuration file path
    #[arg(short = 'c', long, value_name = "FILE")]
    config: Option<String>,

    /// Address to listen on, overriding the configuration
    #[arg(short = 'l', long)]
    listen: Option<String>,

    /// Log level (error, warn, info, debug, trace), overriding the configuration
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let mut config = Config::load(args.config.as_deref())?;
    if let Some(listen) = args.listen {
        config.listen = listen;
    }
    if let Some(level) = args.log_level {
        config.log_level = level;
    }
    init_logging(&config.log_level);

    let engine = config.open_engine()?;
    Server::new(engine).listen(&config.listen).await?.serve().await
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_new(format!("relkv={}", level)).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(true).init();
}
