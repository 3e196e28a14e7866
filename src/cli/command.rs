use crate::common::{DoorError, Result};
use crate::core::handler::DoorLockHandler;
use std::io::{BufRead, Write};
use std::str::FromStr;

/// Operator commands read from stdin, one per line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Lock,
    Status,
    Pin(String),
    Help,
    Exit,
}

impl FromStr for Command {
    type Err = DoorError;

    fn from_str(line: &str) -> Result<Self> {
        let line = line.trim().to_lowercase();
        let mut parts = line.split_whitespace();
        let command = match (parts.next(), parts.next(), parts.next()) {
            (Some("lock"), None, _) => Command::Lock,
            (Some("status"), None, _) => Command::Status,
            (Some("help"), None, _) => Command::Help,
            (Some("exit") | Some("quit"), None, _) => Command::Exit,
            (Some("pin"), Some(pin), None) => Command::Pin(pin.to_string()),
            _ => return Err(DoorError::InvalidCommand(line.clone())),
        };
        Ok(command)
    }
}

const USAGE: &str = "Commands: lock, status, pin XXXX, exit";

/// Executes one command. Returns false when the loop should end.
pub fn execute<W: Write>(handler: &DoorLockHandler, command: Command, out: &mut W) -> Result<bool> {
    match command {
        Command::Lock => handler.lock(),
        Command::Status => writeln!(out, "[DOOR] Status: {}", handler.status())?,
        Command::Pin(pin) => {
            if !handler.unlock_with_pin(&pin) {
                writeln!(out, "[DOOR] Invalid PIN")?;
            }
        }
        Command::Help => writeln!(out, "{}", USAGE)?,
        Command::Exit => return Ok(false),
    }
    Ok(true)
}

/// Foreground loop. Ends on `exit` or end of input; stopping the
/// handler is left to the caller.
pub fn run_command_loop<R: BufRead, W: Write>(
    handler: &DoorLockHandler,
    input: R,
    out: &mut W,
) -> Result<()> {
    writeln!(out, "Door Control System Ready")?;
    writeln!(out, "{}", USAGE)?;
    writeln!(out, "Note: PIN unlock has no time limit. Use 'lock' to manually lock")?;
    out.flush()?;

    for line in input.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }

        let keep_going = match line.parse::<Command>() {
            Ok(command) => execute(handler, command, out)?,
            Err(_) => {
                writeln!(out, "Invalid command")?;
                true
            }
        };
        out.flush()?;
        if !keep_going {
            break;
        }
    }
    Ok(())
}
