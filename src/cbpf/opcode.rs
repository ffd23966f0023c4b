/*!
  Opcode sub-fields of the word-oriented ISA. The low byte of the 16-bit code is

    arithmetic/jump: [operation:4][source:1][class:3]
    load/store:      [mode:3][size:2][class:3]
    return:          [unused:3][rval:2][class:3]

  Sub-field values are stored pre-shifted, as in `ebpf::opcode`.
*/

use std::convert::TryFrom;

use strum_macros::{Display as StrumDisplay, EnumString, IntoStaticStr};
use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::error::EncodingError;

pub const CLASS_MASK     : u16 = 0x07;
pub const SOURCE_MASK    : u16 = 0x08;
pub const OPERATION_MASK : u16 = 0xf0;
pub const SIZE_MASK      : u16 = 0x18;
pub const MODE_MASK      : u16 = 0xe0;

#[derive(
StrumDisplay, IntoStaticStr, EnumString, TryFromPrimitive, IntoPrimitive,
Clone,        Copy,          Eq, PartialEq,  Debug,            Hash
)]
#[repr(u8)]
pub enum InsClass {
  #[strum(serialize = "BPF_LD")]   Ld   = 0x00,
  #[strum(serialize = "BPF_LDX")]  Ldx  = 0x01,
  #[strum(serialize = "BPF_ST")]   St   = 0x02,
  #[strum(serialize = "BPF_STX")]  Stx  = 0x03,
  #[strum(serialize = "BPF_ALU")]  Alu  = 0x04,
  #[strum(serialize = "BPF_JMP")]  Jmp  = 0x05,
  #[strum(serialize = "BPF_RET")]  Ret  = 0x06,
  #[strum(serialize = "BPF_MISC")] Misc = 0x07,
}

#[derive(
StrumDisplay, IntoStaticStr, EnumString, TryFromPrimitive, IntoPrimitive,
Clone,        Copy,          Eq, PartialEq,  Debug,            Hash
)]
#[repr(u8)]
pub enum Source {
  #[strum(serialize = "BPF_K")] Immediate = 0x00,
  #[strum(serialize = "BPF_X")] Register  = 0x08,
}

#[derive(
StrumDisplay, IntoStaticStr, EnumString, TryFromPrimitive, IntoPrimitive,
Clone,        Copy,          Eq, PartialEq,  Debug,            Hash
)]
#[repr(u8)]
pub enum AluOperation {
  #[strum(serialize = "BPF_ADD")] Add = 0x00,
  #[strum(serialize = "BPF_SUB")] Sub = 0x10,
  #[strum(serialize = "BPF_MUL")] Mul = 0x20,
  #[strum(serialize = "BPF_DIV")] Div = 0x30,
  #[strum(serialize = "BPF_OR")]  Or  = 0x40,
  #[strum(serialize = "BPF_AND")] And = 0x50,
  #[strum(serialize = "BPF_LSH")] Lsh = 0x60,
  #[strum(serialize = "BPF_RSH")] Rsh = 0x70,
  #[strum(serialize = "BPF_NEG")] Neg = 0x80,
  #[strum(serialize = "BPF_MOD")] Mod = 0x90,
  #[strum(serialize = "BPF_XOR")] Xor = 0xa0,
}

#[derive(
StrumDisplay, IntoStaticStr, EnumString, TryFromPrimitive, IntoPrimitive,
Clone,        Copy,          Eq, PartialEq,  Debug,            Hash
)]
#[repr(u8)]
pub enum JmpOperation {
  #[strum(serialize = "BPF_JA")]   Ja   = 0x00,
  #[strum(serialize = "BPF_JEQ")]  Jeq  = 0x10,
  #[strum(serialize = "BPF_JGT")]  Jgt  = 0x20,
  #[strum(serialize = "BPF_JGE")]  Jge  = 0x30,
  #[strum(serialize = "BPF_JSET")] Jset = 0x40,
}

#[derive(
StrumDisplay, IntoStaticStr, EnumString, TryFromPrimitive, IntoPrimitive,
Clone,        Copy,          Eq, PartialEq,  Debug,            Hash
)]
#[repr(u8)]
pub enum Size {
  #[strum(serialize = "BPF_W")] W = 0x00,
  #[strum(serialize = "BPF_H")] H = 0x08,
  #[strum(serialize = "BPF_B")] B = 0x10,
}

#[derive(
StrumDisplay, IntoStaticStr, EnumString, TryFromPrimitive, IntoPrimitive,
Clone,        Copy,          Eq, PartialEq,  Debug,            Hash
)]
#[repr(u8)]
pub enum Mode {
  #[strum(serialize = "BPF_IMM")] Imm = 0x00,
  #[strum(serialize = "BPF_ABS")] Abs = 0x20,
  #[strum(serialize = "BPF_IND")] Ind = 0x40,
  #[strum(serialize = "BPF_MEM")] Mem = 0x60,
  #[strum(serialize = "BPF_LEN")] Len = 0x80,
  #[strum(serialize = "BPF_MSH")] Msh = 0xa0,
}

/// What a `BPF_RET` returns.
#[derive(
StrumDisplay, IntoStaticStr, EnumString, TryFromPrimitive, IntoPrimitive,
Clone,        Copy,          Eq, PartialEq,  Debug,            Hash
)]
#[repr(u8)]
pub enum RetValue {
  #[strum(serialize = "BPF_K")] Immediate   = 0x00,
  #[strum(serialize = "BPF_X")] Index       = 0x08,
  #[strum(serialize = "BPF_A")] Accumulator = 0x10,
}

#[derive(
StrumDisplay, IntoStaticStr, EnumString, TryFromPrimitive, IntoPrimitive,
Clone,        Copy,          Eq, PartialEq,  Debug,            Hash
)]
#[repr(u8)]
pub enum MiscOperation {
  #[strum(serialize = "BPF_TAX")] Tax = 0x00,
  #[strum(serialize = "BPF_TXA")] Txa = 0x80,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Opcode {
  Alu {
    operation : AluOperation,
    source    : Source
  },
  Jmp {
    operation : JmpOperation,
    source    : Source
  },
  /// `Ld`/`Ldx` loads and `St`/`Stx` stores share the mode/size layout.
  Memory {
    class : InsClass,
    mode  : Mode,
    size  : Size
  },
  Ret(RetValue),
  Misc(MiscOperation),
}

impl Opcode {

  pub fn class(&self) -> InsClass {
    match self {
      Opcode::Alu    { .. }        => InsClass::Alu,
      Opcode::Jmp    { .. }        => InsClass::Jmp,
      Opcode::Memory { class, .. } => *class,
      Opcode::Ret(_)               => InsClass::Ret,
      Opcode::Misc(_)              => InsClass::Misc
    }
  }

  /// Packs the sub-fields into the 16-bit code, rejecting combinations the kernel lacks.
  pub fn code(&self) -> Result<u16, EncodingError> {
    let code =
      match self {
        Opcode::Alu { operation, source } => {
          Into::<u8>::into(InsClass::Alu) | Into::<u8>::into(*source) | Into::<u8>::into(*operation)
        }

        Opcode::Jmp { operation, source } => {
          if *operation == JmpOperation::Ja && *source == Source::Register {
            return Err(EncodingError::UnrecognizedOpcode { class: InsClass::Jmp.into(), family: "BPF_JA | BPF_X" });
          }
          Into::<u8>::into(InsClass::Jmp) | Into::<u8>::into(*source) | Into::<u8>::into(*operation)
        }

        Opcode::Memory { class, mode, size } => {
          let valid =
            match (class, mode) {
              // Packet loads come in every width.
              (InsClass::Ld, Mode::Abs) | (InsClass::Ld, Mode::Ind) => true,
              (InsClass::Ld, Mode::Imm)
              | (InsClass::Ld, Mode::Mem)
              | (InsClass::Ld, Mode::Len)
              | (InsClass::Ldx, Mode::Imm)
              | (InsClass::Ldx, Mode::Mem)
              | (InsClass::Ldx, Mode::Len)
              | (InsClass::St, Mode::Imm)
              | (InsClass::Stx, Mode::Imm) => *size == Size::W,
              (InsClass::Ldx, Mode::Msh) => *size == Size::B,
              _ => false
            };
          if !valid {
            let family: &'static str = mode.into();
            return Err(EncodingError::UnrecognizedOpcode { class: Into::<u8>::into(*class), family });
          }
          Into::<u8>::into(*class) | Into::<u8>::into(*size) | Into::<u8>::into(*mode)
        }

        Opcode::Ret(value) => Into::<u8>::into(InsClass::Ret) | Into::<u8>::into(*value),

        Opcode::Misc(operation) => Into::<u8>::into(InsClass::Misc) | Into::<u8>::into(*operation),
      };

    Ok(code as u16)
  }

  pub fn decode(code: u16) -> Option<Opcode> {
    if code > 0xff {
      return None;
    }
    let class = InsClass::try_from((code & CLASS_MASK) as u8).ok()?;
    let operation_bits = (code & OPERATION_MASK) as u8;
    let source = Source::try_from((code & SOURCE_MASK) as u8).ok()?;

    let opcode =
      match class {
        InsClass::Alu => Opcode::Alu { operation: AluOperation::try_from(operation_bits).ok()?, source },
        InsClass::Jmp => Opcode::Jmp { operation: JmpOperation::try_from(operation_bits).ok()?, source },
        InsClass::Ret => Opcode::Ret(RetValue::try_from((code & !CLASS_MASK) as u8).ok()?),
        InsClass::Misc => Opcode::Misc(MiscOperation::try_from((code & !CLASS_MASK) as u8).ok()?),
        _ => {
          Opcode::Memory {
            class,
            mode : Mode::try_from((code & MODE_MASK) as u8).ok()?,
            size : Size::try_from((code & SIZE_MASK) as u8).ok()?
          }
        }
      };

    opcode.code().ok().map(|_| opcode)
  }
}


#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn jump_codes(){
    assert_eq!(Opcode::Jmp { operation: JmpOperation::Ja,  source: Source::Immediate }.code(), Ok(0x05));
    assert_eq!(Opcode::Jmp { operation: JmpOperation::Jeq, source: Source::Register  }.code(), Ok(0x1d));
    assert_eq!(Opcode::Jmp { operation: JmpOperation::Jset, source: Source::Immediate }.code(), Ok(0x45));
    assert!(Opcode::Jmp { operation: JmpOperation::Ja, source: Source::Register }.code().is_err());
  }

  #[test]
  fn load_store_codes(){
    let ld_abs_h = Opcode::Memory { class: InsClass::Ld, mode: Mode::Abs, size: Size::H };
    assert_eq!(ld_abs_h.code(), Ok(0x28));
    let ldx_msh = Opcode::Memory { class: InsClass::Ldx, mode: Mode::Msh, size: Size::B };
    assert_eq!(ldx_msh.code(), Ok(0xb1));
    let st = Opcode::Memory { class: InsClass::St, mode: Mode::Imm, size: Size::W };
    assert_eq!(st.code(), Ok(0x02));
    let bad = Opcode::Memory { class: InsClass::St, mode: Mode::Abs, size: Size::W };
    assert!(bad.code().is_err());
  }

  #[test]
  fn rejects_sizes_a_mode_lacks(){
    let rejected = [
      (InsClass::St,  Mode::Imm, Size::B),
      (InsClass::Stx, Mode::Imm, Size::H),
      (InsClass::Ldx, Mode::Msh, Size::W),
      (InsClass::Ld,  Mode::Len, Size::H),
      (InsClass::Ld,  Mode::Imm, Size::B),
      (InsClass::Ldx, Mode::Mem, Size::H),
    ];
    for (class, mode, size) in rejected.iter() {
      let opcode = Opcode::Memory { class: *class, mode: *mode, size: *size };
      assert!(opcode.code().is_err(), "{:?} was accepted", opcode);
    }
    assert_eq!(Opcode::decode(0x12), None);
    assert_eq!(Opcode::decode(0x30), Some(Opcode::Memory { class: InsClass::Ld, mode: Mode::Abs, size: Size::B }));
  }

  #[test]
  fn ret_and_misc_codes(){
    assert_eq!(Opcode::Ret(RetValue::Immediate).code(), Ok(0x06));
    assert_eq!(Opcode::Ret(RetValue::Accumulator).code(), Ok(0x16));
    assert_eq!(Opcode::Misc(MiscOperation::Txa).code(), Ok(0x87));
  }

  #[test]
  fn decode_inverts_code(){
    for code in 0u16..=0xff {
      if let Some(opcode) = Opcode::decode(code) {
        assert_eq!(opcode.code(), Ok(code), "code {:#04x}", code);
      }
    }
    assert_eq!(Opcode::decode(0x1d), Some(Opcode::Jmp { operation: JmpOperation::Jeq, source: Source::Register }));
    assert_eq!(Opcode::decode(0x100), None);
  }
}
