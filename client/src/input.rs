//! Turns typed commands into intents

use shared::{ActorId, Payload};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Move(i32, i32),
    Attack(i32, i32),
    Look,
    Scores,
    Quit,
    Unknown,
}

impl Command {
    /// Wire payload for commands that travel as intents.
    pub fn to_payload(self, player_id: ActorId) -> Option<Payload> {
        match self {
            Command::Move(dx, dy) => Some(Payload::Movement { player_id, dx, dy }),
            Command::Attack(dx, dy) => Some(Payload::Attack { player_id, dx, dy }),
            Command::Quit => Some(Payload::Quit),
            Command::Look | Command::Scores | Command::Unknown => None,
        }
    }
}

fn direction(word: &str) -> Option<(i32, i32)> {
    let step = match word {
        "w" | "up" | "n" | "north" => (0, -1),
        "s" | "down" | "south" => (0, 1),
        "a" | "left" | "west" => (-1, 0),
        "d" | "right" | "east" => (1, 0),
        "q" | "nw" => (-1, -1),
        "e" | "ne" => (1, -1),
        "z" | "sw" => (-1, 1),
        "c" | "se" => (1, 1),
        _ => return None,
    };
    Some(step)
}

/// Parses one line at a time. A blank line repeats the previous command.
#[derive(Debug, Default)]
pub struct InputManager {
    last: Option<Command>,
}

impl InputManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parse(&mut self, line: &str) -> Command {
        let line = line.trim().to_ascii_lowercase();
        if line.is_empty() {
            return self.last.unwrap_or(Command::Unknown);
        }

        let mut words = line.split_whitespace();
        let command = match (words.next(), words.next()) {
            (Some("attack" | "f"), Some(dir)) => direction(dir)
                .map(|(dx, dy)| Command::Attack(dx, dy))
                .unwrap_or(Command::Unknown),
            (Some("look" | "l"), None) => Command::Look,
            (Some("scores" | "score"), None) => Command::Scores,
            (Some("quit" | "exit"), None) => Command::Quit,
            (Some(dir), None) => direction(dir)
                .map(|(dx, dy)| Command::Move(dx, dy))
                .unwrap_or(Command::Unknown),
            _ => Command::Unknown,
        };

        if !matches!(command, Command::Unknown | Command::Quit) {
            self.last = Some(command);
        }
        command
    }
}

pub const HELP: &str = "move: w/a/s/d q/e/z/c | attack: f <dir> | look | scores | quit | <enter> repeats";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_moves() {
        let mut input = InputManager::new();
        assert_eq!(input.parse("w"), Command::Move(0, -1));
        assert_eq!(input.parse("  LEFT "), Command::Move(-1, 0));
        assert_eq!(input.parse("c"), Command::Move(1, 1));
    }

    #[test]
    fn test_compass_words() {
        let mut input = InputManager::new();
        assert_eq!(input.parse("north"), Command::Move(0, -1));
        assert_eq!(input.parse("south"), Command::Move(0, 1));
        assert_eq!(input.parse("west"), Command::Move(-1, 0));
        assert_eq!(input.parse("east"), Command::Move(1, 0));
        assert_eq!(input.parse("f north"), Command::Attack(0, -1));
    }

    #[test]
    fn test_attacks() {
        let mut input = InputManager::new();
        assert_eq!(input.parse("attack d"), Command::Attack(1, 0));
        assert_eq!(input.parse("f nw"), Command::Attack(-1, -1));
        assert_eq!(input.parse("f nowhere"), Command::Unknown);
        assert_eq!(input.parse("attack"), Command::Unknown);
    }

    #[test]
    fn test_blank_line_repeats() {
        let mut input = InputManager::new();
        assert_eq!(input.parse(""), Command::Unknown);
        input.parse("s");
        input.parse("gibberish");
        assert_eq!(input.parse(""), Command::Move(0, 1));
        input.parse("quit");
        assert_eq!(input.parse("   "), Command::Move(0, 1));
    }

    #[test]
    fn test_payloads() {
        assert_eq!(
            Command::Move(1, 0).to_payload(7),
            Some(Payload::Movement {
                player_id: 7,
                dx: 1,
                dy: 0
            })
        );
        assert_eq!(Command::Quit.to_payload(7), Some(Payload::Quit));
        assert_eq!(Command::Look.to_payload(7), None);
    }
}
