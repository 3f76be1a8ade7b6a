//! Core types for the VM
//!
//! This module defines the architectural constants, the static opcode table,
//! decoded instructions, operands, and the control signals used by the engine.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A raw machine word. Architectural values are 15-bit; raw memory words
/// may also hold register operands (32768..=32775).
pub type Word = u16;

/// Number of addressable words
pub const MEMORY_SIZE: usize = 0x8000;

/// Number of general purpose registers
pub const REGISTER_COUNT: usize = 8;

/// Raw operand value that names register 0
pub const REGISTER_BASE: Word = 0x8000;

/// Largest raw word that is a valid operand (register 7)
pub const MAX_OPERAND: Word = REGISTER_BASE + REGISTER_COUNT as Word - 1;

/// Mask applied to every arithmetic result
pub const WORD_MASK: Word = 0x7FFF;

/// Advance an address by one word, wrapping at the end of memory
pub fn next_address(address: Word) -> Word {
    address.wrapping_add(1) & WORD_MASK
}

/// The 22 opcodes of the instruction set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum Opcode {
    Halt = 0,
    Set = 1,
    Push = 2,
    Pop = 3,
    Eq = 4,
    Gt = 5,
    Jmp = 6,
    Jt = 7,
    Jf = 8,
    Add = 9,
    Mult = 10,
    Mod = 11,
    And = 12,
    Or = 13,
    Not = 14,
    Rmem = 15,
    Wmem = 16,
    Call = 17,
    Ret = 18,
    Out = 19,
    In = 20,
    Noop = 21,
}

impl Opcode {
    /// Static opcode table, indexed by opcode number
    pub const ALL: [Opcode; 22] = [
        Opcode::Halt,
        Opcode::Set,
        Opcode::Push,
        Opcode::Pop,
        Opcode::Eq,
        Opcode::Gt,
        Opcode::Jmp,
        Opcode::Jt,
        Opcode::Jf,
        Opcode::Add,
        Opcode::Mult,
        Opcode::Mod,
        Opcode::And,
        Opcode::Or,
        Opcode::Not,
        Opcode::Rmem,
        Opcode::Wmem,
        Opcode::Call,
        Opcode::Ret,
        Opcode::Out,
        Opcode::In,
        Opcode::Noop,
    ];

    /// Look up a raw word in the opcode table
    pub fn from_word(word: Word) -> Option<Self> {
        Self::ALL.get(word as usize).copied()
    }

    /// Opcode number
    pub fn code(self) -> Word {
        self as Word
    }

    /// Number of argument words that follow the opcode
    pub fn arity(self) -> usize {
        match self {
            Opcode::Halt | Opcode::Ret | Opcode::Noop => 0,
            Opcode::Push
            | Opcode::Pop
            | Opcode::Jmp
            | Opcode::Call
            | Opcode::Out
            | Opcode::In => 1,
            Opcode::Set | Opcode::Jt | Opcode::Jf | Opcode::Not | Opcode::Rmem | Opcode::Wmem => 2,
            Opcode::Eq
            | Opcode::Gt
            | Opcode::Add
            | Opcode::Mult
            | Opcode::Mod
            | Opcode::And
            | Opcode::Or => 3,
        }
    }

    /// Assembly mnemonic
    pub fn mnemonic(self) -> &'static str {
        match self {
            Opcode::Halt => "halt",
            Opcode::Set => "set",
            Opcode::Push => "push",
            Opcode::Pop => "pop",
            Opcode::Eq => "eq",
            Opcode::Gt => "gt",
            Opcode::Jmp => "jmp",
            Opcode::Jt => "jt",
            Opcode::Jf => "jf",
            Opcode::Add => "add",
            Opcode::Mult => "mult",
            Opcode::Mod => "mod",
            Opcode::And => "and",
            Opcode::Or => "or",
            Opcode::Not => "not",
            Opcode::Rmem => "rmem",
            Opcode::Wmem => "wmem",
            Opcode::Call => "call",
            Opcode::Ret => "ret",
            Opcode::Out => "out",
            Opcode::In => "in",
            Opcode::Noop => "noop",
        }
    }
}

impl TryFrom<Word> for Opcode {
    type Error = Word;

    fn try_from(word: Word) -> Result<Self, Self::Error> {
        Opcode::from_word(word).ok_or(word)
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic())
    }
}

/// A raw argument word interpreted through the operand rule
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operand {
    /// 0..=32767 denotes itself
    Literal(Word),

    /// 32768..=32775 denotes register `raw - 32768`
    Register(usize),
}

impl Operand {
    /// Classify a raw word, or `None` if it is not a valid operand
    pub fn decode(raw: Word) -> Option<Self> {
        match raw {
            0..=WORD_MASK => Some(Operand::Literal(raw)),
            REGISTER_BASE..=MAX_OPERAND => Some(Operand::Register((raw - REGISTER_BASE) as usize)),
            _ => None,
        }
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Literal(value) => write!(f, "{}", value),
            Operand::Register(index) => write!(f, "r{}", index),
        }
    }
}

/// A fetched instruction: opcode plus its raw, unresolved argument words
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instruction {
    pub opcode: Opcode,
    raw_args: [Word; 3],
}

impl Instruction {
    /// Build an instruction; `args` beyond the opcode's arity are ignored
    pub fn new(opcode: Opcode, args: &[Word]) -> Self {
        let mut raw_args = [0; 3];
        for (slot, arg) in raw_args.iter_mut().zip(args.iter().take(opcode.arity())) {
            *slot = *arg;
        }
        Self { opcode, raw_args }
    }

    /// The raw argument words
    pub fn args(&self) -> &[Word] {
        &self.raw_args[..self.opcode.arity()]
    }

    /// Length of the instruction in words, opcode included
    pub fn len(&self) -> usize {
        1 + self.opcode.arity()
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.opcode)?;
        for (i, raw) in self.args().iter().enumerate() {
            f.write_str(if i == 0 { " " } else { ", " })?;
            match Operand::decode(*raw) {
                Some(operand) => write!(f, "{}", operand)?,
                None => write!(f, "<{}?>", raw)?,
            }
        }
        Ok(())
    }
}

/// Result of a single step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepState {
    Running,
    Halted(HaltReason),
}

/// Why a run stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HaltReason {
    /// A `halt` instruction
    Instruction,

    /// `pop` or `ret` on an empty stack
    StackUnderflow,

    /// The interrupt flag was raised
    Cancelled,

    /// `in` found the input stream closed
    InputClosed,
}

impl fmt::Display for HaltReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            HaltReason::Instruction => "halt instruction",
            HaltReason::StackUnderflow => "stack underflow",
            HaltReason::Cancelled => "interrupted",
            HaltReason::InputClosed => "input closed",
        };
        f.write_str(text)
    }
}

/// A finished run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Halt {
    /// Address of the halting instruction. For a cancelled run this is
    /// where execution resumes.
    pub address: Word,
    pub reason: HaltReason,
}

/// How instruction execution reaches memory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WriteMode {
    /// Fetch, `rmem` and `wmem` use committed storage; the journal only
    /// holds out-of-band pokes until they are committed
    #[default]
    Direct,

    /// Fetch, `rmem` and `wmem` go through the journal so a run can be
    /// committed or rolled back as a whole
    Journaled,
}

impl WriteMode {
    pub fn from_str(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "journaled" | "journal" | "tx" => Self::Journaled,
            _ => Self::Direct,
        }
    }
}
