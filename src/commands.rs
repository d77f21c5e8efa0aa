//! Console commands
//! This module defines all the commands the operator can type, and runs them
//! against the Bluetooth manager.

use std::str::FromStr;

use crate::core::bluetooth::{BleTransport, BluetoothManager};
use crate::core::permissions::PermissionGate;

pub const HELP: &str = "\
commands:
  select <bus>   select a bus (selecting it again clears the selection)
  clear          clear the selection
  send [bus]     request a courtesy seat on the selected bus
  reset          go back to idle and clear the selection
  sound on|off   chime on the notifier or stay silent
  status         show the current state
  help           show this help
  quit           exit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Select(String),
    Clear,
    /// `None` sends to the selected bus.
    Send(Option<String>),
    Reset,
    Sound(bool),
    Status,
    Help,
    Quit,
}

impl FromStr for Command {
    type Err = String;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut words = line.split_whitespace();
        let Some(name) = words.next() else {
            return Err("empty command".to_string());
        };
        let arg = words.next();
        if words.next().is_some() {
            return Err(format!("too many arguments for '{}'", name));
        }

        match (name.to_ascii_lowercase().as_str(), arg) {
            ("select", Some(bus)) => Ok(Command::Select(bus.to_string())),
            ("select", None) => Err("usage: select <bus>".to_string()),
            ("clear", None) => Ok(Command::Clear),
            ("send", bus) => Ok(Command::Send(bus.map(str::to_string))),
            ("reset", None) => Ok(Command::Reset),
            ("sound", Some("on")) => Ok(Command::Sound(true)),
            ("sound", Some("off")) => Ok(Command::Sound(false)),
            ("sound", _) => Err("usage: sound on|off".to_string()),
            ("status", None) => Ok(Command::Status),
            ("help", None) => Ok(Command::Help),
            ("quit" | "exit", None) => Ok(Command::Quit),
            _ => Err(format!("unknown command: {}", line.trim())),
        }
    }
}

/// Runs `command` and returns the line to show the operator.
pub async fn execute<T: BleTransport, P: PermissionGate>(
    manager: &BluetoothManager<T, P>,
    command: Command,
) -> Result<String, String> {
    match command {
        Command::Select(bus) => {
            if !manager.select_bus(Some(bus)) {
                return Err("cannot change the bus while a notification is being sent".to_string());
            }
            Ok(match manager.selected_bus_id() {
                Some(bus) => format!("selected bus {}", bus),
                None => "selection cleared".to_string(),
            })
        }
        Command::Clear => {
            if !manager.select_bus(None) {
                return Err("cannot change the bus while a notification is being sent".to_string());
            }
            Ok("selection cleared".to_string())
        }
        Command::Send(bus) => {
            let Some(bus) = bus.or_else(|| manager.selected_bus_id()) else {
                // Let the manager publish the error state.
                manager.send_courtesy_seat_notification("").await;
                return Err(manager.connection_state().to_string());
            };
            match manager.send_courtesy_seat_notification(&bus).await {
                Some(_) => Ok(format!("requesting a courtesy seat on bus {}", bus)),
                None => Ok(manager.connection_state().to_string()),
            }
        }
        Command::Reset => {
            manager.reset_state();
            Ok("reset".to_string())
        }
        Command::Sound(enabled) => {
            manager.toggle_sound(enabled).await.map_err(|e| e.to_string())?;
            Ok(format!("sound {}", if enabled { "on" } else { "off" }))
        }
        Command::Status => Ok(format!(
            "{} | bus: {} | sending: {} | scanning: {}",
            manager.connection_state(),
            manager.selected_bus_id().as_deref().unwrap_or("none"),
            manager.is_sending(),
            manager.is_scanning()
        )),
        Command::Help => Ok(HELP.to_string()),
        Command::Quit => Ok("bye".to_string()),
    }
}
