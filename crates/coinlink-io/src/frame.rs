//! Command frame encoding and response field extraction.
//!
//! Every command sent to the controller is one ASCII frame:
//!
//! ```text
//! AF <to> Z <op> <operand1> <operand2 low> <operand2 high> FA
//! ```
//!
//! `<to>` is the single-character destination address and `<op>` the
//! [`CommandCode`]. The operands are written as decimal digits with no
//! padding and no separators. Operand2 goes through the Firmata seven-bit
//! split first, so `300` is sent as `44` then `2`. There is no checksum and
//! no terminator beyond the trailing `FA`.
//!
//! Frames are only ever encoded. Responses come back as free-form text
//! lines; the only structure read out of them is the pair of address
//! characters at positions 1 and 2 (see [`address_fields`]).

use std::fmt::Write as _;

use coinlink_core::CommandCode;

/// Literal that opens every frame.
pub const FRAME_START: &str = "AF";

/// Literal that closes every frame.
pub const FRAME_END: &str = "FA";

/// Separator between the destination address and the command code.
pub const ADDRESS_SEPARATOR: char = 'Z';

/// A command addressed to one board.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Command {
    /// Destination address character.
    pub to: char,
    /// Operation to perform.
    pub code: CommandCode,
    /// First operand, sent as its decimal value.
    pub operand1: u8,
    /// Second operand, sent as two seven-bit values.
    pub operand2: u16,
}

impl Command {
    /// A command with both operands zero.
    pub fn new(to: char, code: CommandCode) -> Self {
        Command {
            to,
            code,
            operand1: 0,
            operand2: 0,
        }
    }

    /// Set both operands.
    pub fn with_operands(mut self, operand1: u8, operand2: u16) -> Self {
        self.operand1 = operand1;
        self.operand2 = operand2;
        self
    }

    /// Encode this command as a wire frame.
    pub fn encode(&self) -> Vec<u8> {
        encode(self.to, self.code, self.operand1, self.operand2)
    }
}

/// Split a value into its low and high seven-bit parts, low part first.
///
/// Values above 14 bits leave a high part larger than seven bits; it is
/// transmitted as-is rather than clamped.
pub fn split_seven_bit(value: u16) -> (u16, u16) {
    (value & 0x7F, value >> 7)
}

/// Encode a command frame.
///
/// # Example
///
/// ```
/// use coinlink_core::CommandCode;
/// use coinlink_io::frame::encode;
///
/// assert_eq!(encode('1', CommandCode::SetBalance, 5, 300), b"AF1ZS5442FA");
/// assert_eq!(encode('2', CommandCode::OutputTest, 0, 0), b"AF2ZO000FA");
/// ```
pub fn encode(to: char, code: CommandCode, operand1: u8, operand2: u16) -> Vec<u8> {
    let (low, high) = split_seven_bit(operand2);
    let mut frame = String::with_capacity(16);
    frame.push_str(FRAME_START);
    frame.push(to);
    frame.push(ADDRESS_SEPARATOR);
    frame.push(code.as_char());
    // Writing to a String cannot fail.
    let _ = write!(frame, "{operand1}{low}{high}");
    frame.push_str(FRAME_END);
    frame.into_bytes()
}

/// The characters at positions 1 and 2 of a response line.
///
/// These carry the addresses a response is filtered on. Either is `None`
/// when the line is too short.
pub fn address_fields(line: &str) -> (Option<char>, Option<char>) {
    let mut chars = line.chars().skip(1);
    (chars.next(), chars.next())
}
