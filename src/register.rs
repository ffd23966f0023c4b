//! Register identifiers for both instruction sets. The `strum` names are the kernel macro
//! spellings used by the reproduction emitter.

use strum_macros::{Display as StrumDisplay, EnumString, IntoStaticStr};
use num_enum::{IntoPrimitive, TryFromPrimitive};

/// Source register tag of the wide load that marks the immediate as a map file descriptor.
pub const PSEUDO_MAP_FD: u8 = 1;

/// Register fields of the extended ISA are nibbles.
pub const MAX_REGISTER_FIELD: u8 = 0x0f;

/// General purpose registers of the extended ISA. `R10` is the read-only frame pointer.
#[derive(
StrumDisplay, IntoStaticStr, EnumString, TryFromPrimitive, IntoPrimitive,
Clone,        Copy,          Eq, PartialEq,  Debug,            Hash
)]
#[repr(u8)]
pub enum Register {
  #[strum(serialize = "BPF_REG_0")]  R0,
  #[strum(serialize = "BPF_REG_1")]  R1,
  #[strum(serialize = "BPF_REG_2")]  R2,
  #[strum(serialize = "BPF_REG_3")]  R3,
  #[strum(serialize = "BPF_REG_4")]  R4,
  #[strum(serialize = "BPF_REG_5")]  R5,
  #[strum(serialize = "BPF_REG_6")]  R6,
  #[strum(serialize = "BPF_REG_7")]  R7,
  #[strum(serialize = "BPF_REG_8")]  R8,
  #[strum(serialize = "BPF_REG_9")]  R9,
  #[strum(serialize = "BPF_REG_10")] R10,
}

impl Register {
  pub fn number(&self) -> u8 {
    Into::<u8>::into(*self)
  }
}

/// Registers of the word-oriented ISA: the accumulator and the index register.
#[derive(
StrumDisplay, IntoStaticStr, EnumString, TryFromPrimitive, IntoPrimitive,
Clone,        Copy,          Eq, PartialEq,  Debug,            Hash
)]
#[repr(u8)]
pub enum ClassicRegister {
  A,
  X,
}

impl ClassicRegister {
  pub fn number(&self) -> u8 {
    Into::<u8>::into(*self)
  }
}
