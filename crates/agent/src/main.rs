#![forbid(unsafe_code)]

mod api_client;
mod cli;
mod commands;
mod shutdown;
mod startup;

use anyhow::Result;

use api_client::ApiClient;
use cli::Command;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = cli::parse();
    let output = cli.output;

    match cli.command {
        Some(Command::Version) => {
            println!("conntrack-watch {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }

        Some(Command::Health { ref conn }) => {
            let client = ApiClient::new(&conn.host, conn.port)?;
            commands::cmd_health(&client, output).await
        }

        Some(Command::Query { ref tuple, ref conn }) => {
            let client = ApiClient::new(&conn.host, conn.port)?;
            commands::cmd_query(&client, tuple, output).await
        }

        // No subcommand = run the watcher daemon
        None => startup::run(&cli).await,
    }
}
