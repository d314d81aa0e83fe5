//! Headless mode runner - event loop without a UI
//!
//! Prints every engine event as NDJSON and executes commands read from stdin.

use std::path::PathBuf;

use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};

use deck_app::config::Settings;
use deck_app::{CommandGateway, Engine, Outcome, ToolAvailability, ToolGateway};
use deck_core::prelude::*;

use super::HeadlessEvent;

/// A command read from stdin
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start(String),
    Stop(String),
    Screenshot(String),
    Record(String),
    StopRecord(String),
    /// `rename <serial>` without a name clears the custom name
    Rename {
        serial: String,
        name: Option<String>,
    },
    Devices,
    Quit,
    /// Anything else, including commands missing their serial
    Unknown(String),
}

/// Parse one stdin line; blank lines yield `None`
pub fn parse_command(line: &str) -> Option<Command> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    let (verb, rest) = match line.split_once(char::is_whitespace) {
        Some((verb, rest)) => (verb, rest.trim()),
        None => (line, ""),
    };

    let with_serial = |make: fn(String) -> Command| {
        let mut parts = rest.split_whitespace();
        match (parts.next(), parts.next()) {
            (Some(serial), None) => make(serial.to_string()),
            _ => Command::Unknown(line.to_string()),
        }
    };

    let command = match verb {
        "start" => with_serial(Command::Start),
        "stop" => with_serial(Command::Stop),
        "screenshot" => with_serial(Command::Screenshot),
        "record" => with_serial(Command::Record),
        "stop-record" => with_serial(Command::StopRecord),
        "rename" => match rest.split_once(char::is_whitespace) {
            Some((serial, name)) => Command::Rename {
                serial: serial.to_string(),
                name: Some(name.trim().to_string()),
            },
            None if !rest.is_empty() => Command::Rename {
                serial: rest.to_string(),
                name: None,
            },
            None => Command::Unknown(line.to_string()),
        },
        "devices" if rest.is_empty() => Command::Devices,
        "q" | "quit" if rest.is_empty() => Command::Quit,
        _ => Command::Unknown(line.to_string()),
    };
    Some(command)
}

/// Run in headless mode until `quit` or Ctrl+C
pub async fn run_headless(settings: Settings, config_path: Option<PathBuf>) -> Result<()> {
    info!("═══════════════════════════════════════════════════════");
    info!("scrcpy-deck starting in HEADLESS mode");
    if let Some(path) = &config_path {
        info!("Config: {}", path.display());
    }
    info!("═══════════════════════════════════════════════════════");

    let configured = settings.tool_paths();
    let availability = ToolAvailability::check(&configured);
    let gateway = CommandGateway::new(availability.resolved_paths(&configured))
        .with_discovery_timeout(settings.discovery_timeout())
        .with_screenshot_timeout(settings.screenshot_timeout());

    let mut engine = Engine::new(gateway, settings);
    if let Some(path) = config_path {
        engine = engine.with_config_path(path);
    }

    let printer = tokio::spawn(print_events(engine.subscribe()));

    engine.check_setup().await;
    engine.start();

    let (cmd_tx, cmd_rx) = mpsc::channel(32);
    std::thread::spawn(move || read_stdin_blocking(cmd_tx));

    command_loop(&engine, cmd_rx).await;

    engine.shutdown().await;
    drop(engine);
    if let Err(e) = printer.await {
        error!("Event printer failed: {}", e);
    }

    info!("scrcpy-deck headless mode exiting");
    Ok(())
}

async fn command_loop<G>(engine: &Engine<G>, mut cmd_rx: mpsc::Receiver<Command>)
where
    G: ToolGateway + Sync + 'static,
{
    let mut stdin_open = true;
    loop {
        tokio::select! {
            command = cmd_rx.recv(), if stdin_open => match command {
                Some(Command::Quit) => {
                    info!("Quit requested");
                    break;
                }
                Some(command) => execute_command(engine, command).await.emit(),
                None => {
                    // Keep running on EOF; Ctrl+C still stops us
                    debug!("stdin closed");
                    stdin_open = false;
                }
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
        }
    }
}

/// Execute one command and describe the result
pub async fn execute_command<G>(engine: &Engine<G>, command: Command) -> HeadlessEvent
where
    G: ToolGateway + Sync + 'static,
{
    match command {
        Command::Start(serial) => {
            outcome_reply("start", &serial, engine.start_mirroring(&serial).await)
        }
        Command::Stop(serial) => outcome_reply("stop", &serial, engine.stop_mirroring(&serial).await),
        Command::Screenshot(serial) => {
            path_reply("screenshot", &serial, engine.take_screenshot(&serial).await)
        }
        Command::Record(serial) => {
            path_reply("record", &serial, engine.start_recording(&serial).await)
        }
        Command::StopRecord(serial) => outcome_reply(
            "stop-record",
            &serial,
            engine.stop_recording(&serial).await,
        ),
        Command::Rename { serial, name } => match engine.rename(&serial, name).await {
            Ok(_) => HeadlessEvent::command_ok("rename", Some(&serial), Some("applied"), None),
            Err(e) => HeadlessEvent::command_failed("rename", Some(&serial), e.to_string()),
        },
        Command::Devices => {
            HeadlessEvent::devices(&engine.statuses(), &engine.unusable_devices().await)
        }
        Command::Quit => HeadlessEvent::command_ok("quit", None, None, None),
        Command::Unknown(line) => {
            warn!("Unknown stdin command: {}", line);
            HeadlessEvent::error(format!("Unknown command: {}", line), false)
        }
    }
}

fn outcome_reply(command: &str, serial: &str, result: Result<Outcome>) -> HeadlessEvent {
    match result {
        Ok(outcome) => {
            let label = match outcome {
                Outcome::Applied => "applied",
                Outcome::Ignored => "ignored",
            };
            HeadlessEvent::command_ok(command, Some(serial), Some(label), None)
        }
        Err(e) => HeadlessEvent::command_failed(command, Some(serial), e.to_string()),
    }
}

fn path_reply(command: &str, serial: &str, result: Result<PathBuf>) -> HeadlessEvent {
    match result {
        Ok(path) => HeadlessEvent::command_ok(
            command,
            Some(serial),
            Some("applied"),
            Some(path.display().to_string()),
        ),
        Err(e) => HeadlessEvent::command_failed(command, Some(serial), e.to_string()),
    }
}

async fn print_events(mut rx: broadcast::Receiver<deck_app::DeckEvent>) {
    loop {
        match rx.recv().await {
            Ok(event) => {
                debug!("event: {}", event.event_type());
                HeadlessEvent::from(&event).emit();
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!("Headless output lagged, skipped {} event(s)", skipped);
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

/// Read commands from stdin on a plain thread; stdin has no async reader
/// that does not block a runtime worker
fn read_stdin_blocking(cmd_tx: mpsc::Sender<Command>) {
    use std::io::BufRead;

    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        match line {
            Ok(line) => {
                let Some(command) = parse_command(&line) else {
                    continue;
                };
                let quit = command == Command::Quit;
                if cmd_tx.blocking_send(command).is_err() || quit {
                    break;
                }
            }
            Err(e) => {
                error!("Failed to read stdin: {}", e);
                break;
            }
        }
    }

    info!("Stdin reader exiting");
}
