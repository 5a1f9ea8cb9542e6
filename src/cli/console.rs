//! Interactive console.
//!
//! Reads one command per line and drives the local peer surface.

use crate::protocol::peer::Peer;
use anyhow::Result;
use std::str::FromStr;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

/// Console help text.
pub const HELP: &str = "Commands: request (acquire), release, list, help, quit (exit)";

/// A parsed console line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleCommand {
    /// Ask for the critical section.
    Request,
    /// Leave the critical section.
    Release,
    /// Show state and active peers.
    List,
    /// Show available commands.
    Help,
    /// Leave the console.
    Quit,
}

impl FromStr for ConsoleCommand {
    type Err = String;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        match line.trim().to_ascii_lowercase().as_str() {
            "request" | "acquire" => Ok(Self::Request),
            "release" => Ok(Self::Release),
            "list" => Ok(Self::List),
            "help" | "?" => Ok(Self::Help),
            "quit" | "exit" => Ok(Self::Quit),
            other => Err(format!("Unknown command: '{}'. {}", other, HELP)),
        }
    }
}

/// What the console does after a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Print this and read the next line.
    Output(String),
    /// Stop reading.
    Quit,
}

/// Run one command against `peer`.
pub async fn execute(peer: &Arc<Peer>, command: ConsoleCommand) -> Step {
    match command {
        ConsoleCommand::Request => match peer.request_resource().await {
            Some(ticket) => Step::Output(format!(
                "Requested the resource (timestamp {}), waiting on {} peer(s).",
                ticket.timestamp,
                ticket.recipients.len()
            )),
            None => Step::Output(format!(
                "Invalid action: state is already {}.",
                peer.phase()
            )),
        },
        ConsoleCommand::Release => {
            if peer.release_resource().await {
                Step::Output("Released the resource.".to_string())
            } else {
                Step::Output("Not in the critical section, nothing to release.".to_string())
            }
        }
        ConsoleCommand::List => Step::Output(peer.list_peers().to_string()),
        ConsoleCommand::Help => Step::Output(HELP.to_string()),
        ConsoleCommand::Quit => Step::Quit,
    }
}

/// Read commands from `input` until `quit` or end of input.
pub async fn run_console<R, W>(peer: Arc<Peer>, input: R, mut output: W) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = input.lines();
    output
        .write_all(format!("{}\n{}\n", peer.id(), HELP).as_bytes())
        .await?;

    loop {
        output
            .write_all(format!(">>> {}: ", peer.id()).as_bytes())
            .await?;
        output.flush().await?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        if line.trim().is_empty() {
            continue;
        }

        let text = match line.parse::<ConsoleCommand>() {
            Ok(command) => match execute(&peer, command).await {
                Step::Output(text) => text,
                Step::Quit => break,
            },
            Err(hint) => hint,
        };
        output.write_all(text.trim_end().as_bytes()).await?;
        output.write_all(b"\n").await?;
    }

    output
        .write_all(format!("{} shutting down\n", peer.id()).as_bytes())
        .await?;
    output.flush().await?;
    Ok(())
}
