//! Command-string to decoder registry (spec.md §4.2). The 26 command
//! strings are fixed by the [`Command`] enum, but the registry still
//! enforces "no duplicate registration" as a startup invariant and aborts
//! the process if it's ever violated — grounded directly in spec.md §9's
//! design note that duplicate registration is a fatal startup bug, not a
//! recoverable one.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use strum::IntoEnumIterator;

use crate::messages::Command;

static REGISTRY: Lazy<HashMap<&'static str, Command>> = Lazy::new(build_registry);

fn build_registry() -> HashMap<&'static str, Command> {
    let mut map = HashMap::new();
    for command in Command::iter() {
        if map.insert(command.as_str(), command).is_some() {
            panic!(
                "duplicate message registration for command '{}'; this is a fatal startup bug",
                command.as_str()
            );
        }
    }
    map
}

/// Resolves a raw wire command string to its typed [`Command`]. `None`
/// means this core doesn't recognize the command; the transport layer
/// decides whether that's tolerated (logged and dropped) or fatal.
pub fn lookup(command: &str) -> Option<Command> {
    REGISTRY.get(command).copied()
}

pub fn registered_commands() -> usize {
    REGISTRY.len()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn registry_resolves_every_known_command() {
        for command in Command::iter() {
            assert_eq!(lookup(command.as_str()), Some(command));
        }
    }

    #[test]
    fn registry_has_no_duplicates_by_construction() {
        assert_eq!(registered_commands(), Command::iter().count());
    }

    #[test]
    fn unknown_command_is_not_registered() {
        assert_eq!(lookup("notacommand"), None);
    }
}
