use client_core::{EntryKey, Gesture};
use shared::domain::ItemId;
use thiserror::Error;

pub const HELP: &str = "commands: add <name> | toggle <id> | delete <id> | refresh | help | quit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Gesture(Gesture),
    Help,
    Quit,
    Empty,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("unknown command '{0}'; type 'help'")]
    Unknown(String),
    #[error("'{0}' needs an item id")]
    MissingId(&'static str),
}

/// Parses one stdin line. The text after `add` is passed through untrimmed
/// so name validation stays with the reconciler.
pub fn parse_command(line: &str) -> Result<Command, CommandError> {
    let line = line.trim_start();
    let (verb, rest) = match line.split_once(char::is_whitespace) {
        Some((verb, rest)) => (verb, rest),
        None => (line.trim_end(), ""),
    };

    match verb {
        "" => Ok(Command::Empty),
        "add" | "a" => Ok(Command::Gesture(Gesture::Submit(rest.to_string()))),
        "toggle" | "t" => Ok(Command::Gesture(Gesture::Toggle(item_key(rest, "toggle")?))),
        "delete" | "d" | "rm" => Ok(Command::Gesture(Gesture::Delete(item_key(rest, "delete")?))),
        "refresh" | "r" => Ok(Command::Gesture(Gesture::Refresh)),
        "help" | "?" => Ok(Command::Help),
        "quit" | "q" | "exit" => Ok(Command::Quit),
        other => Err(CommandError::Unknown(other.to_string())),
    }
}

fn item_key(raw: &str, verb: &'static str) -> Result<EntryKey, CommandError> {
    let id = raw.trim();
    if id.is_empty() {
        return Err(CommandError::MissingId(verb));
    }
    Ok(EntryKey::from(ItemId::from(id)))
}
