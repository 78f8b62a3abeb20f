/*
 * relsql is a command-line client for relkv. It connects to a relkv server
 * and runs commands read from an interactive prompt, or a single command
 * given on the command line.
 */

#![warn(clippy::all)]

use clap::Parser;
use relkv::client::Client;
use relkv::error::{Error, Result};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::path::PathBuf;

/// relkv command-line client
#[derive(Parser, Debug)]
#[command(name = "relsql", version, about = "Command-line client for relkv")]
struct Args {
    /// Host to connect to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Port to connect to
    #[arg(short = 'p', long, default_value_t = 9605)]
    port: u16,

    /// Command to execute instead of starting the prompt
    command: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let client = Client::new((args.host.as_str(), args.port)).await?;

    if let Some(command) = args.command {
        println!("{}", client.execute(&command).await?);
        return Ok(());
    }
    RelSql::new(client)?.run().await
}

/// The interactive prompt
struct RelSql {
    client: Client,
    editor: DefaultEditor,
    history_path: Option<PathBuf>,
}

impl RelSql {
    fn new(client: Client) -> Result<Self> {
        let editor = DefaultEditor::new().map_err(|e| Error::Internal(e.to_string()))?;
        let history_path = std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".relsql_history"));
        Ok(Self { client, editor, history_path })
    }

    async fn run(&mut self) -> Result<()> {
        if let Some(path) = &self.history_path {
            // 历史文件可能还不存在
            let _ = self.editor.load_history(path);
        }
        println!("Connected to relkv. Enter commands, or !quit to exit.");

        loop {
            let line = match self.editor.readline("relkv> ") {
                Ok(line) => line,
                Err(ReadlineError::Interrupted) => continue,
                Err(ReadlineError::Eof) => break,
                Err(err) => return Err(Error::Internal(err.to_string())),
            };
            let command = line.trim();
            if command.is_empty() {
                continue;
            }
            let _ = self.editor.add_history_entry(command);
            if command == "!quit" {
                break;
            }
            match self.client.execute(command).await {
                Ok(response) => println!("{}", response),
                Err(err) => println!("Error: {}", err),
            }
        }

        if let Some(path) = &self.history_path {
            if let Err(err) = self.editor.save_history(path) {
                eprintln!("Failed to save history: {}", err);
            }
        }
        Ok(())
    }
}
