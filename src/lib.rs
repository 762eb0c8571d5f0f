//! A classic CHIP-8 virtual machine.
//!
//! The core owns 4 KiB of RAM with the embedded font table, the register
//! file and call stack, a double-buffered 64x32 bit plane, a queue of
//! pressed keys and the two 60 Hz timers. The host drives it one frame at a
//! time through [`Emulator::advance`], reads the visible plane back with
//! [`Emulator::pixels`] and samples [`Emulator::tone_on`] for audio. Window,
//! speaker and key mapping live outside the core, in `main.rs` and
//! [`sound::Sound`].

pub mod decode;
pub mod display;
pub mod emulator;
pub mod keyboard;
pub mod memory;
pub mod registers;
pub mod sound;
pub mod timer;

use thiserror::Error;

pub use emulator::{Emulator, PostAction, Quirks};
pub use memory::{Memory, PROGRAM_START};

pub type Result<T> = std::result::Result<T, Fault>;

/// Every way a running program can stop the machine. Faults are fatal to the
/// program: the emulator latches the first one and refuses to execute until
/// it is reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Fault {
    #[error("program image is {size} bytes, it does not fit in the program region")]
    ProgramTooLarge { size: usize },
    #[error("memory access out of bounds at {addr:#05x}")]
    BadAddress { addr: u16 },
    #[error("call stack overflow")]
    StackOverflow,
    #[error("return with an empty call stack")]
    StackUnderflow,
    #[error("illegal instruction {opcode:#06x} at {pc:#05x}")]
    IllegalInstruction { pc: u16, opcode: u16 },
}
