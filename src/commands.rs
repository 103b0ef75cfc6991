//! Set of opcodes

/// Default TCP port of the query protocol
pub const DEFAULT_PORT: u16 = 4444;

/// Replace the current image set (carries an image set payload)
pub const UPDATE: u8 = b'u';

/// Declare the next image set (carries an image set payload)
pub const DECLARE_NEXT: u8 = b'd';

/// Advance one step
pub const STEP: u8 = b'l';

/// Single-shot `o` control command
pub const OUT: u8 = b'o';

/// Single-shot `i` control command
pub const IN: u8 = b'i';

/// Whether a command with this opcode is followed by a payload line
pub fn carries_payload(opcode: u8) -> bool {
    matches!(opcode, UPDATE | DECLARE_NEXT)
}
