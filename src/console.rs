//! Line-oriented console front end for the `pomodoro` binary.

use std::str::FromStr;

use anyhow::Result;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::timer::{RunStatus, TimerController, TimerSnapshot};

const ENABLE_LOGS: bool = true;

pub const USAGE: &str = "commands: start (s), pause (p), reset (r), status (?), quit (q)";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Start,
    Pause,
    Reset,
    Status,
    Quit,
}

impl FromStr for Command {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "start" | "s" => Ok(Command::Start),
            "pause" | "p" => Ok(Command::Pause),
            "reset" | "r" => Ok(Command::Reset),
            "status" | "?" => Ok(Command::Status),
            "quit" | "q" | "exit" => Ok(Command::Quit),
            other => Err(format!("unknown command '{other}'")),
        }
    }
}

pub fn render_line(snapshot: &TimerSnapshot) -> String {
    format!(
        "[{}] {} {} | sessions {} | focused {}",
        snapshot.kind.label(),
        snapshot.remaining_display,
        snapshot.status.as_str(),
        snapshot.stats.completed_sessions,
        format_focused(snapshot.stats.total_minutes())
    )
}

fn format_focused(total_minutes: u64) -> String {
    let hours = total_minutes / 60;
    let minutes = total_minutes % 60;
    if hours > 0 {
        format!("{hours}h{minutes:02}m")
    } else {
        format!("{minutes}m")
    }
}

/// Reads commands from stdin until `quit` or EOF, printing a line on every state change.
/// The timer is reset on the way out so no ticker outlives the console.
pub async fn run_console(controller: TimerController) -> Result<()> {
    let mut updates = controller.subscribe();
    let renderer = tokio::spawn(async move {
        let mut last_status = RunStatus::Stopped;
        while updates.changed().await.is_ok() {
            let snapshot = updates.borrow_and_update().clone();
            // Repeated resets while stopped carry no news.
            if snapshot.status == RunStatus::Stopped && last_status == RunStatus::Stopped {
                continue;
            }
            last_status = snapshot.status;
            println!("{}", render_line(&snapshot));
        }
    });

    println!("{}", render_line(&controller.snapshot().await));
    println!("{USAGE}");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }

        match line.parse::<Command>() {
            Ok(Command::Start) => {
                controller.start().await;
            }
            Ok(Command::Pause) => {
                controller.pause().await;
            }
            Ok(Command::Reset) => {
                controller.reset().await;
            }
            Ok(Command::Status) => {
                println!("{}", render_line(&controller.snapshot().await));
            }
            Ok(Command::Quit) => break,
            Err(err) => {
                crate::log_warn!("{}", err);
                println!("{USAGE}");
            }
        }
    }

    controller.reset().await;
    renderer.abort();
    Ok(())
}
