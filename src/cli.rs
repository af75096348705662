use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::{
    client::Client,
    command::{now_nanos, parse_command},
    context::EngineConfig,
    engine::Engine,
    errors::ClientError,
    message::Message,
    simulate::{SimConfig, run_simulation},
    utils::shutdown_token,
};

/// Matching engine with an in-process client protocol
#[derive(Parser)]
#[command(name = "order-protocol")]
#[command(
    version = "0.1",
    about = "Runs the matching engine and talks to it over its message protocol"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Boot the engine, print every message it emits, and read commands from stdin
    ///
    /// Commands: `<security> buy|sell quantity=N [price=N] [id=N]`,
    /// `<security> set price=N`, `<security> cancel id=N`, `<security> panic`
    Engine {
        #[command(flatten)]
        config: EngineConfig,

        /// Print messages as JSON instead of log lines
        #[arg(long)]
        json: bool,
    },

    /// Boot the engine and drive a randomized order flow through it
    Simulate {
        #[command(flatten)]
        config: EngineConfig,

        #[command(flatten)]
        sim: SimConfig,
    },
}

fn print_message(message: &Message, json: bool) {
    if json {
        match serde_json::to_string(message) {
            Ok(line) => println!("{line}"),
            Err(err) => warn!(%err, "could not render message"),
        }
    } else {
        println!("{message}");
    }
}

/// Prints everything the engine emits until it shuts down.
async fn run_monitor(mut monitor: Client, json: bool) {
    loop {
        match monitor.get().await {
            Ok(message) => print_message(&message, json),
            Err(ClientError::Closed) => break,
            Err(err) => warn!(%err, "monitor dropped a message"),
        }
    }
}

/// Sends one message per stdin line. Stops on EOF, shutdown, or engine exit.
///
/// Messages addressed to the console are drained here; the monitor prints them.
async fn run_console(mut console: Client, shutdown: CancellationToken) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let message = tokio::select! {
            _ = shutdown.cancelled() => break,
            received = console.get() => match received {
                Err(ClientError::Closed) => break,
                Err(err) => {
                    warn!(%err, "console dropped a message");
                    continue;
                }
                Ok(_) => continue,
            },
            line = lines.next_line() => match line? {
                None => {
                    info!("stdin closed, waiting for shutdown");
                    break;
                }
                Some(line) if line.trim().is_empty() => continue,
                Some(line) => match parse_command(&line, now_nanos()) {
                    Ok(message) => message,
                    Err(err) => {
                        eprintln!("{err}");
                        continue;
                    }
                },
            },
        };
        if let Err(err) = console.send(&message).await {
            warn!(%err, "could not send message");
            break;
        }
    }
    Ok(())
}

pub async fn run_cli() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let shutdown = shutdown_token();

    match cli.command {
        Commands::Engine { config, json } => {
            let engine = Engine::new(config)?;
            let ctx = engine.context();
            let monitor = Client::monitor(&ctx)?;
            let console = Client::attach(&ctx)?;

            let engine_task = tokio::spawn(engine.run(shutdown.clone()));
            let monitor_task = tokio::spawn(run_monitor(monitor, json));

            run_console(console, shutdown.clone()).await?;
            ctx.closed().await;

            engine_task.await??;
            monitor_task.await?;
        }
        Commands::Simulate { config, sim } => {
            let engine = Engine::new(config)?;
            let ctx = engine.context();
            let mut trader = Client::attach(&ctx)?;

            let engine_task = tokio::spawn(engine.run(shutdown.clone()));
            let report = run_simulation(&mut trader, sim, shutdown.clone()).await?;

            // a bounded run ends here; the engine goes down with the simulation
            shutdown.cancel();
            engine_task.await??;

            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }
    Ok(())
}
