// ABOUTME: Main entry point for the tether console
// ABOUTME: Loads config, starts the session worker, renders store events, and reads operator input

use anyhow::{Context, Result};
use clap::Parser;
use tether::cli::{Cli, Command, ConnectArgs};
use tether::repl::{self, Outcome};
use tether::{logging, render};
use tether_core::session::{self, Session};
use tether_transport::WsTransport;
use tokio::io::{AsyncBufReadExt, BufReader};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    match cli.command {
        Command::Connect(args) => connect(args).await,
    }
}

async fn connect(args: ConnectArgs) -> Result<()> {
    let config = args.resolve_config()?;
    logging::init(config.logging.format);

    let address = config.address(&args.session_id)?;
    tracing::info!(
        url = %address,
        reconnect_base_ms = config.channel.reconnect_base_ms,
        reconnect_max_attempts = config.channel.reconnect_max_attempts,
        heartbeat_secs = config.channel.heartbeat_secs,
        "Configuration loaded"
    );

    let session = Session::new(WsTransport::new(), address, config.connection_config());
    let (handle, worker) = session::spawn(session);

    let mut events = handle
        .events()
        .await
        .context("Session worker stopped before it could be observed")?;
    let renderer = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            if let Some(line) = render::render_event(&event) {
                println!("{}", line);
            }
        }
    });

    if let Err(e) = handle.connect().await {
        eprintln!("! {}", e);
    }
    println!("console for session {} (type /help)", handle.session_id());

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line.context("Failed to read from stdin")?,
            _ = tokio::signal::ctrl_c() => None,
        };
        // EOF or Ctrl-C
        let Some(line) = line else {
            repl::execute(&handle, repl::Input::Quit).await;
            break;
        };

        let input = match repl::parse_line(&line) {
            Ok(input) => input,
            Err(e) => {
                println!("! {}", e);
                continue;
            }
        };
        match repl::execute(&handle, input).await {
            Outcome::Continue(Some(output)) => println!("{}", output),
            Outcome::Continue(None) => {}
            Outcome::Quit => break,
        }
    }

    drop(handle);
    worker.await.context("Session worker panicked")?;
    renderer.await.context("Renderer task panicked")?;
    Ok(())
}
