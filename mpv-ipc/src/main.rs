use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use futures::StreamExt;
use tokio::{
    io::{self, AsyncWriteExt},
    time::{sleep, timeout},
};
use tracing::{info, warn};

use mpv_ipc::{
    Connection, Event, EventStream,
    cli::{CallArgs, Cli, Command, DemoArgs, EventsArgs, GetArgs, SetArgs},
};

fn init_tracing() {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let connection = Connection::new(&cli.socket);
    connection.open().await?;

    let outcome = match cli.command {
        Command::Get(args) => get(&connection, args).await,
        Command::Set(args) => set(&connection, args).await,
        Command::Call(args) => call(&connection, args).await,
        Command::Events(args) => events(&connection, args).await,
        Command::Demo(args) => demo(&connection, args).await,
    };

    if let Err(err) = connection.close().await {
        warn!(error = ?err, "failed to close connection cleanly");
    }
    outcome
}

async fn get(connection: &Connection, args: GetArgs) -> Result<()> {
    let value = connection
        .get_property(&args.property)
        .await
        .with_context(|| format!("can't read property '{}'", args.property))?;
    write_stdout(&value.to_string()).await?;
    Ok(())
}

async fn set(connection: &Connection, args: SetArgs) -> Result<()> {
    connection
        .set_property(&args.property, args.value)
        .await
        .with_context(|| format!("can't set property '{}'", args.property))?;
    Ok(())
}

async fn call(connection: &Connection, args: CallArgs) -> Result<()> {
    let value = connection
        .call(args.arguments)
        .await
        .context("command failed")?;
    write_stdout(&value.to_string()).await?;
    Ok(())
}

async fn events(connection: &Connection, args: EventsArgs) -> Result<()> {
    let (mut events, stop) = connection.subscribe();

    tokio::select! {
        result = print_events(&mut events) => result?,
        _ = stop_after(args.for_secs) => info!("stopped listening"),
        ctrl_c = tokio::signal::ctrl_c() => {
            if let Err(error) = ctrl_c {
                warn!(?error, "ctrl-c handler failed");
            }
        }
    }

    stop.stop();
    Ok(())
}

/// Replays the classic library demo: pause, read the property back, resume
/// from a background task (reopening the socket if mpv dropped it), and print
/// events until the listener is stopped.
async fn demo(connection: &Connection, args: DemoArgs) -> Result<()> {
    let (mut events, stop) = connection.subscribe();

    connection
        .set_property("pause", true)
        .await
        .context("can't pause playback")?;
    let paused = connection
        .get_property("pause")
        .await
        .context("can't read pause state")?;
    info!(%paused, "paused playback");

    let resume = {
        let connection = connection.clone();
        let delay = Duration::from_secs(args.resume_after);
        tokio::spawn(async move {
            sleep(delay).await;
            if connection.is_closed() {
                connection.open().await.context("can't reopen connection")?;
            }
            connection
                .set_property("pause", false)
                .await
                .context("can't resume playback")?;
            info!("resumed playback");
            anyhow::Ok(())
        })
    };

    let listen_for = Duration::from_secs(args.listen_for);
    match timeout(listen_for, print_events(&mut events)).await {
        Ok(result) => result?,
        Err(_) => info!("stopped listening"),
    }
    stop.stop();

    resume.await.context("resume task panicked")??;
    Ok(())
}

async fn print_events(events: &mut EventStream) -> Result<()> {
    while let Some(event) = events.next().await {
        print_event(&event).await?;
    }
    info!("event stream ended");
    Ok(())
}

async fn print_event(event: &Event) -> Result<()> {
    let line = serde_json::to_string(event).context("can't encode event")?;
    write_stdout(&line).await?;
    Ok(())
}

async fn stop_after(seconds: Option<u64>) {
    match seconds {
        Some(seconds) => sleep(Duration::from_secs(seconds)).await,
        None => std::future::pending().await,
    }
}

async fn write_stdout(line: &str) -> io::Result<()> {
    let mut stdout = io::stdout();
    stdout.write_all(line.as_bytes()).await?;
    stdout.write_all(b"\n").await?;
    stdout.flush().await
}
