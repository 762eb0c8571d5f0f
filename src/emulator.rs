use std::time::{Instant, SystemTime, UNIX_EPOCH};

use log::{error, info, trace};
use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::{
    decode::{decode, OpCodes},
    display::FrameBuffer,
    keyboard::Keypad,
    memory::{Addr, Memory, PROGRAM_START},
    registers::{IndexRegister, ProgramCounter, Registers, Stack},
    timer::Timer,
    Fault, Result,
};

/// Instruction budget per host frame (~60 fps, so ~720 instructions/s).
pub const INSTRUCTIONS_PER_FRAME: usize = 12;

/// How the program counter moves once an instruction has executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostAction {
    /// PC += 2
    Next,
    /// PC += 4, taken branches of the conditional skips
    Skip,
    /// PC <- addr
    Jump(Addr),
    /// PC untouched; the instruction re-executes next tick (`Fx0A` waiting
    /// on an empty key queue)
    Stall,
}

fn skip_if(cond: bool) -> PostAction {
    if cond {
        PostAction::Skip
    } else {
        PostAction::Next
    }
}

/// Behavioral choices for the historically under-specified opcodes. The
/// defaults match the majority of surviving programs.
#[derive(Debug, Clone, Copy, Default)]
pub struct Quirks {
    /// `8xy6`/`8xyE` shift Vy into Vx (COSMAC VIP) instead of shifting Vx
    /// in place.
    pub shift_reads_vy: bool,
    /// `Fx55`/`Fx65` leave I at I + x + 1 (COSMAC VIP) instead of
    /// untouched.
    pub store_bumps_index: bool,
    /// `Ex9E`/`ExA1` test the live held-key map instead of draining the
    /// event queue.
    pub level_keys: bool,
}

/// The whole machine: memory, register file, call stack, video planes, key
/// queue and timers, driven by the fetch/decode/execute loop. The host calls
/// [`Emulator::advance`] once per frame and reads [`Emulator::pixels`] and
/// [`Emulator::tone_on`] back.
pub struct Emulator {
    pub mem: Memory,
    pub regs: Registers,
    pub pc: ProgramCounter,
    pub index: IndexRegister,
    pub stack: Stack,
    pub fb: FrameBuffer,
    pub keypad: Keypad,
    pub delay_timer: Timer,
    pub sound_timer: Timer,
    pub quirks: Quirks,
    pub instructions_per_frame: usize,
    rng: StdRng,
    program: Vec<u8>,
    fault: Option<Fault>,
}

fn wall_clock_seed() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}

impl Emulator {
    pub fn new(program: &[u8], now: Instant) -> Result<Self> {
        let mut mem = Memory::new();
        mem.load(program, PROGRAM_START)?;
        info!("loaded {} byte program at {PROGRAM_START:#05x}", program.len());
        Ok(Self {
            mem,
            regs: Registers::new(),
            pc: ProgramCounter::new(),
            index: IndexRegister::new(),
            stack: Stack::new(),
            fb: FrameBuffer::new(),
            keypad: Keypad::new(),
            delay_timer: Timer::new(now),
            sound_timer: Timer::new(now),
            quirks: Quirks::default(),
            instructions_per_frame: INSTRUCTIONS_PER_FRAME,
            rng: StdRng::seed_from_u64(wall_clock_seed()),
            program: program.to_vec(),
            fault: None,
        })
    }

    /// Runs one host frame: a budget of instructions (bailing out early when
    /// the program is waiting on a key), then timer upkeep and the frame
    /// flip.
    pub fn advance(&mut self, now: Instant) -> Result<()> {
        for _ in 0..self.instructions_per_frame {
            if self.tick(now)? == PostAction::Stall {
                break;
            }
        }
        self.delay_timer.sync(now);
        self.sound_timer.sync(now);
        self.fb.present();
        Ok(())
    }

    /// Fetches, decodes and executes a single instruction. The first fault
    /// latches: every later call returns it without executing anything,
    /// until [`Emulator::reset`].
    pub fn tick(&mut self, now: Instant) -> Result<PostAction> {
        if let Some(fault) = self.fault {
            return Err(fault);
        }
        match self.step(now) {
            Ok(action) => Ok(action),
            Err(fault) => {
                error!("halted at pc={:#05x}: {fault}", self.pc.get());
                self.fault = Some(fault);
                Err(fault)
            }
        }
    }

    fn step(&mut self, now: Instant) -> Result<PostAction> {
        let pc = self.pc.get();
        let word = self.mem.read_word(pc)?;
        let op = decode(word).ok_or(Fault::IllegalInstruction { pc, opcode: word })?;
        trace!("pc={pc:#05x} word={word:#06x} {op:?}");
        let action = self.execute(op, now)?;
        match action {
            PostAction::Next => self.pc.advance(),
            PostAction::Skip => self.pc.skip(),
            PostAction::Jump(addr) => self.pc.jump(addr),
            PostAction::Stall => {}
        }
        Ok(action)
    }

    fn execute(&mut self, op: OpCodes, now: Instant) -> Result<PostAction> {
        let action = match op {
            OpCodes::ClearScreen => {
                self.fb.clear();
                PostAction::Next
            }
            OpCodes::Return => {
                let saved = self.stack.pop()?;
                PostAction::Jump(saved + 2)
            }
            OpCodes::Sys(addr) | OpCodes::Jump(addr) => PostAction::Jump(addr),
            OpCodes::Call(addr) => {
                self.stack.push(self.pc.get())?;
                PostAction::Jump(addr)
            }
            OpCodes::SkipEqImm(x, kk) => skip_if(self.regs.get(x) == kk),
            OpCodes::SkipNeImm(x, kk) => skip_if(self.regs.get(x) != kk),
            OpCodes::SkipEqReg(x, y) => skip_if(self.regs.get(x) == self.regs.get(y)),
            OpCodes::SkipNeReg(x, y) => skip_if(self.regs.get(x) != self.regs.get(y)),
            OpCodes::LoadImm(x, kk) => {
                self.regs.set(x, kk);
                PostAction::Next
            }
            OpCodes::AddImm(x, kk) => {
                // the immediate add carries no flag
                self.regs.set(x, self.regs.get(x).wrapping_add(kk));
                PostAction::Next
            }
            OpCodes::Copy(x, y) => {
                self.regs.set(x, self.regs.get(y));
                PostAction::Next
            }
            OpCodes::Or(x, y) => {
                self.regs.set(x, self.regs.get(x) | self.regs.get(y));
                PostAction::Next
            }
            OpCodes::And(x, y) => {
                self.regs.set(x, self.regs.get(x) & self.regs.get(y));
                PostAction::Next
            }
            OpCodes::Xor(x, y) => {
                self.regs.set(x, self.regs.get(x) ^ self.regs.get(y));
                PostAction::Next
            }
            OpCodes::Add(x, y) => {
                let (vx, vy) = (self.regs.get(x), self.regs.get(y));
                let sum = vx as u16 + vy as u16;
                self.regs.set_flag(sum > 0xFF);
                self.regs.set(x, sum as u8);
                PostAction::Next
            }
            OpCodes::Sub(x, y) => {
                let (vx, vy) = (self.regs.get(x), self.regs.get(y));
                self.regs.set_flag(vx > vy);
                self.regs.set(x, vx.wrapping_sub(vy));
                PostAction::Next
            }
            OpCodes::SubNeg(x, y) => {
                let (vx, vy) = (self.regs.get(x), self.regs.get(y));
                self.regs.set_flag(vy > vx);
                self.regs.set(x, vy.wrapping_sub(vx));
                PostAction::Next
            }
            OpCodes::ShiftRight(x, y) => {
                let source = if self.quirks.shift_reads_vy {
                    self.regs.get(y)
                } else {
                    self.regs.get(x)
                };
                self.regs.set_flag(source & 1 == 1);
                self.regs.set(x, source >> 1);
                PostAction::Next
            }
            OpCodes::ShiftLeft(x, y) => {
                let source = if self.quirks.shift_reads_vy {
                    self.regs.get(y)
                } else {
                    self.regs.get(x)
                };
                self.regs.set_flag(source >> 7 == 1);
                self.regs.set(x, source << 1);
                PostAction::Next
            }
            OpCodes::LoadIndex(addr) => {
                self.index.set(addr);
                PostAction::Next
            }
            OpCodes::JumpOffset(addr) => {
                PostAction::Jump(addr.wrapping_add(self.regs.get(0) as u16))
            }
            OpCodes::Random(x, kk) => {
                let value: u8 = self.rng.gen();
                self.regs.set(x, value & kk);
                PostAction::Next
            }
            OpCodes::Draw(x, y, n) => {
                let (vx, vy) = (self.regs.get(x), self.regs.get(y));
                let sprite = self.mem.read_slice(self.index.get(), n as usize)?;
                let collision = self.fb.draw(vx, vy, sprite);
                self.regs.set_flag(collision);
                PostAction::Next
            }
            OpCodes::SkipKeyPressed(x) => {
                let vx = self.regs.get(x);
                skip_if(self.key_pressed(vx))
            }
            OpCodes::SkipKeyNotPressed(x) => {
                let vx = self.regs.get(x);
                skip_if(!self.key_pressed(vx))
            }
            OpCodes::ReadDelay(x) => {
                self.regs.set(x, self.delay_timer.get());
                PostAction::Next
            }
            OpCodes::WaitKey(x) => match self.keypad.pop() {
                Some(key) => {
                    self.regs.set(x, key);
                    PostAction::Next
                }
                None => PostAction::Stall,
            },
            OpCodes::SetDelay(x) => {
                self.delay_timer.set(self.regs.get(x), now);
                PostAction::Next
            }
            OpCodes::SetSound(x) => {
                self.sound_timer.set(self.regs.get(x), now);
                PostAction::Next
            }
            OpCodes::AddIndex(x) => {
                // VF is untouched here
                self.index.add(self.regs.get(x));
                PostAction::Next
            }
            OpCodes::FontChar(x) => {
                let digit = self.regs.get(x) & 0xF;
                self.index.set(digit as Addr * 5);
                PostAction::Next
            }
            OpCodes::StoreBcd(x) => {
                let vx = self.regs.get(x);
                let i = self.index.get();
                self.mem.write_byte(i, vx / 100)?;
                self.mem.write_byte(i + 1, vx / 10 % 10)?;
                self.mem.write_byte(i + 2, vx % 10)?;
                PostAction::Next
            }
            OpCodes::StoreRegs(x) => {
                let i = self.index.get();
                for reg in 0..=x {
                    self.mem.write_byte(i + reg as Addr, self.regs.get(reg))?;
                }
                if self.quirks.store_bumps_index {
                    self.index.set(i + x as Addr + 1);
                }
                PostAction::Next
            }
            OpCodes::LoadRegs(x) => {
                let i = self.index.get();
                for reg in 0..=x {
                    let value = self.mem.read_byte(i + reg as Addr)?;
                    self.regs.set(reg, value);
                }
                if self.quirks.store_bumps_index {
                    self.index.set(i + x as Addr + 1);
                }
                PostAction::Next
            }
        };
        Ok(action)
    }

    fn key_pressed(&mut self, hex: u8) -> bool {
        if self.quirks.level_keys {
            self.keypad.is_held(hex)
        } else {
            self.keypad.drain_contains(hex)
        }
    }

    /// The plane the host should be displaying, row-major, one byte per
    /// pixel.
    pub fn pixels(&self) -> &[u8] {
        self.fb.pixels()
    }

    /// The front-end must emit a tone exactly while this is true.
    pub fn tone_on(&self) -> bool {
        self.sound_timer.active()
    }

    pub fn fault(&self) -> Option<Fault> {
        self.fault
    }

    /// Returns the machine to power-on state and reloads the retained
    /// program image. The font table survives in memory.
    pub fn reset(&mut self, now: Instant) {
        self.regs.reset();
        self.pc = ProgramCounter::new();
        self.index = IndexRegister::new();
        self.stack.reset();
        self.fb = FrameBuffer::new();
        self.keypad.clear();
        self.delay_timer = Timer::new(now);
        self.sound_timer = Timer::new(now);
        self.fault = None;
        if let Err(fault) = self.mem.reset(&self.program, PROGRAM_START) {
            self.fault = Some(fault);
        }
        info!("reset");
    }
}
