//! Core types shared by the codec, the CLI and the tests.

use std::fmt;
use std::str::FromStr;

/// Operation code carried in every command frame.
///
/// Each code is a single ASCII character on the wire. The sync codes drive
/// the firmware's update and shake state machines; this crate treats them as
/// opaque values and only transports them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandCode {
    /// `A`: start update sync.
    StartUpdateSync,
    /// `B`: acknowledge update sync.
    AckUpdateSync,
    /// `C`: update window is open.
    UpdateWindowOpen,
    /// `D`: start shake sync.
    StartShakeSync,
    /// `E`: acknowledge shake sync.
    AckShakeSync,
    /// `F`: perform the update.
    DoUpdate,
    /// `Z`: abort the update window and any shake in progress.
    Abort,
    /// `S`: set balance.
    SetBalance,
    /// `T`: set debug level.
    SetDebugLevel,
    /// `U`: set coin count.
    SetCoinCount,
    /// `O`: turn all outputs on for two seconds.
    OutputTest,
    /// `P`: force a shake to happen.
    ShakeTest,
}

impl CommandCode {
    /// Every command code, in the order the firmware documents them.
    pub const ALL: [CommandCode; 12] = [
        CommandCode::StartUpdateSync,
        CommandCode::AckUpdateSync,
        CommandCode::UpdateWindowOpen,
        CommandCode::StartShakeSync,
        CommandCode::AckShakeSync,
        CommandCode::DoUpdate,
        CommandCode::Abort,
        CommandCode::SetBalance,
        CommandCode::SetDebugLevel,
        CommandCode::SetCoinCount,
        CommandCode::OutputTest,
        CommandCode::ShakeTest,
    ];

    /// The character transmitted for this code.
    pub fn as_char(self) -> char {
        match self {
            CommandCode::StartUpdateSync => 'A',
            CommandCode::AckUpdateSync => 'B',
            CommandCode::UpdateWindowOpen => 'C',
            CommandCode::StartShakeSync => 'D',
            CommandCode::AckShakeSync => 'E',
            CommandCode::DoUpdate => 'F',
            CommandCode::Abort => 'Z',
            CommandCode::SetBalance => 'S',
            CommandCode::SetDebugLevel => 'T',
            CommandCode::SetCoinCount => 'U',
            CommandCode::OutputTest => 'O',
            CommandCode::ShakeTest => 'P',
        }
    }

    /// Look up a code by its wire character.
    pub fn from_char(c: char) -> Option<CommandCode> {
        CommandCode::ALL.into_iter().find(|code| code.as_char() == c)
    }

    /// Operator-facing description of what the code does.
    pub fn description(self) -> &'static str {
        match self {
            CommandCode::StartUpdateSync => "Start update sync",
            CommandCode::AckUpdateSync => "Acknowledge update sync",
            CommandCode::UpdateWindowOpen => "Update window is open",
            CommandCode::StartShakeSync => "Start shake sync",
            CommandCode::AckShakeSync => "Acknowledge shake sync",
            CommandCode::DoUpdate => "Do the update!",
            CommandCode::Abort => "Abort window and shake",
            CommandCode::SetBalance => "Set balance",
            CommandCode::SetDebugLevel => "Set debug level",
            CommandCode::SetCoinCount => "Set coin count",
            CommandCode::OutputTest => "Turn all outputs on for 2 secs",
            CommandCode::ShakeTest => "Force a shake to happen",
        }
    }
}

impl fmt::Display for CommandCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

/// Error returned when a string cannot be parsed into a [`CommandCode`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseCommandCodeError(String);

impl fmt::Display for ParseCommandCodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown command code: {}", self.0)
    }
}

impl std::error::Error for ParseCommandCodeError {}

impl FromStr for CommandCode {
    type Err = ParseCommandCodeError;

    /// Parse a single code character. Lowercase input is accepted.
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let mut chars = s.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => CommandCode::from_char(c.to_ascii_uppercase())
                .ok_or_else(|| ParseCommandCodeError(s.to_string())),
            _ => Err(ParseCommandCodeError(s.to_string())),
        }
    }
}

impl TryFrom<char> for CommandCode {
    type Error = ParseCommandCodeError;

    fn try_from(c: char) -> std::result::Result<Self, Self::Error> {
        CommandCode::from_char(c).ok_or_else(|| ParseCommandCodeError(c.to_string()))
    }
}
