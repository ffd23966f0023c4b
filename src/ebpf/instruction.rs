//! The unencoded fields of one extended-ISA instruction, plus constructors that mirror the
//! kernel's instruction macros.

use std::fmt::{Display, Formatter};

use crate::register::{Register, PSEUDO_MAP_FD};
use super::opcode::{
  AluOperation, InsClass, JmpOperation, Mode, Opcode, Size, Source, helper_name
};

/// The second operand of an instruction: a register or a literal.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Operand {
  Register(Register),
  Immediate(i32),
}

impl From<Register> for Operand {
  fn from(register: Register) -> Self {
    Operand::Register(register)
  }
}

impl From<i32> for Operand {
  fn from(value: i32) -> Self {
    Operand::Immediate(value)
  }
}

impl Operand {
  pub fn source(&self) -> Source {
    match self {
      Operand::Register(_)  => Source::Register,
      Operand::Immediate(_) => Source::Immediate
    }
  }

  // (src register field, immediate field)
  fn fields(&self) -> (u8, i64) {
    match self {
      Operand::Register(register) => (register.number(), 0),
      Operand::Immediate(value)   => (0, *value as i64)
    }
  }
}

/**
  Holds the semantic fields of an instruction. `imm` is 64 bits wide only so that the
  map-load-by-descriptor form can carry its whole value; every other instruction must keep
  it within `i32`, which the encoder checks.
*/
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct Instruction {
  pub opcode : Opcode,
  pub dst    : Register,
  /// Raw nibble: a register number, or a pseudo tag such as `PSEUDO_MAP_FD`.
  pub src    : u8,
  pub offset : i16,
  pub imm    : i64,
}

impl Instruction {

  /// True for the two-word `BPF_LD | BPF_IMM | BPF_DW` form.
  pub fn is_wide(&self) -> bool {
    matches!(
      self.opcode,
      Opcode::Memory { class: InsClass::Ld, mode: Mode::Imm, size: Size::DW }
    )
  }

  /// True for the map-load-by-descriptor instruction specifically.
  pub fn is_map_load(&self) -> bool {
    self.is_wide() && self.src == PSEUDO_MAP_FD
  }

  /// Number of 64-bit words this instruction occupies once encoded.
  pub fn width(&self) -> u32 {
    match self.is_wide() {
      true  => 2,
      false => 1
    }
  }

  pub fn with_offset(self, offset: i16) -> Instruction {
    Instruction { offset, ..self }
  }

  fn src_register(&self) -> String {
    use std::convert::TryFrom;
    match Register::try_from(self.src) {
      Ok(register) => register.to_string(),
      Err(_)       => self.src.to_string()
    }
  }
}

// region Constructors

fn alu(class: InsClass, operation: AluOperation, dst: Register, operand: Operand) -> Instruction {
  let (src, imm) = operand.fields();
  Instruction {
    opcode: Opcode::Alu { class, operation, source: operand.source() },
    dst,
    src,
    offset: 0,
    imm
  }
}

pub fn alu64<T: Into<Operand>>(operation: AluOperation, dst: Register, operand: T) -> Instruction {
  alu(InsClass::Alu64, operation, dst, operand.into())
}

pub fn alu32<T: Into<Operand>>(operation: AluOperation, dst: Register, operand: T) -> Instruction {
  alu(InsClass::Alu, operation, dst, operand.into())
}

pub fn mov64<T: Into<Operand>>(dst: Register, operand: T) -> Instruction {
  alu64(AluOperation::Mov, dst, operand)
}

fn jmp(class: InsClass, operation: JmpOperation, dst: Register, operand: Operand, offset: i16)
  -> Instruction
{
  let (src, imm) = operand.fields();
  Instruction {
    opcode: Opcode::Jmp { class, operation, source: operand.source() },
    dst,
    src,
    offset,
    imm
  }
}

/// A 64-bit comparison of `dst` against `operand`, taken `offset` instructions ahead.
pub fn jmp64<T: Into<Operand>>(operation: JmpOperation, dst: Register, operand: T, offset: i16)
  -> Instruction
{
  jmp(InsClass::Jmp, operation, dst, operand.into(), offset)
}

pub fn jmp32<T: Into<Operand>>(operation: JmpOperation, dst: Register, operand: T, offset: i16)
  -> Instruction
{
  jmp(InsClass::Jmp32, operation, dst, operand.into(), offset)
}

pub fn exit() -> Instruction {
  jmp(InsClass::Jmp, JmpOperation::Exit, Register::R0, Operand::Immediate(0), 0)
}

pub fn call(function: i32) -> Instruction {
  jmp(InsClass::Jmp, JmpOperation::Call, Register::R0, Operand::Immediate(function), 0)
}

/// `*(size *)(dst + offset) = operand`; a register operand makes this `STX`, a literal `ST`.
pub fn st<T: Into<Operand>>(size: Size, dst: Register, operand: T, offset: i16) -> Instruction {
  let operand = operand.into();
  let class =
    match operand {
      Operand::Register(_)  => InsClass::Stx,
      Operand::Immediate(_) => InsClass::St
    };
  let (src, imm) = operand.fields();
  Instruction {
    opcode: Opcode::Memory { class, mode: Mode::Mem, size },
    dst,
    src,
    offset,
    imm
  }
}

pub fn st_dw<T: Into<Operand>>(dst: Register, operand: T, offset: i16) -> Instruction {
  st(Size::DW, dst, operand, offset)
}

pub fn st_w<T: Into<Operand>>(dst: Register, operand: T, offset: i16) -> Instruction {
  st(Size::W, dst, operand, offset)
}

pub fn st_h<T: Into<Operand>>(dst: Register, operand: T, offset: i16) -> Instruction {
  st(Size::H, dst, operand, offset)
}

pub fn st_b<T: Into<Operand>>(dst: Register, operand: T, offset: i16) -> Instruction {
  st(Size::B, dst, operand, offset)
}

/// `dst = *(size *)(src + offset)`
pub fn ld(size: Size, dst: Register, src: Register, offset: i16) -> Instruction {
  Instruction {
    opcode: Opcode::Memory { class: InsClass::Ldx, mode: Mode::Mem, size },
    dst,
    src: src.number(),
    offset,
    imm: 0
  }
}

pub fn ld_dw(dst: Register, src: Register, offset: i16) -> Instruction {
  ld(Size::DW, dst, src, offset)
}

pub fn ld_w(dst: Register, src: Register, offset: i16) -> Instruction {
  ld(Size::W, dst, src, offset)
}

pub fn ld_h(dst: Register, src: Register, offset: i16) -> Instruction {
  ld(Size::H, dst, src, offset)
}

pub fn ld_b(dst: Register, src: Register, offset: i16) -> Instruction {
  ld(Size::B, dst, src, offset)
}

/// Legacy packet access: `R0 = *(size *)(skb->data + imm)`.
pub fn ld_abs(size: Size, imm: i32) -> Instruction {
  Instruction {
    opcode: Opcode::Memory { class: InsClass::Ld, mode: Mode::Abs, size },
    dst: Register::R0,
    src: 0,
    offset: 0,
    imm: imm as i64
  }
}

/// Legacy packet access: `R0 = *(size *)(skb->data + src + imm)`.
pub fn ld_ind(size: Size, src: Register, imm: i32) -> Instruction {
  Instruction {
    opcode: Opcode::Memory { class: InsClass::Ld, mode: Mode::Ind, size },
    dst: Register::R0,
    src: src.number(),
    offset: 0,
    imm: imm as i64
  }
}

/// Loads the map referenced by file descriptor `fd` into `dst`. Encodes to two words.
pub fn ld_map_by_fd(dst: Register, fd: i64) -> Instruction {
  Instruction {
    opcode: Opcode::Memory { class: InsClass::Ld, mode: Mode::Imm, size: Size::DW },
    dst,
    src: PSEUDO_MAP_FD,
    offset: 0,
    imm: fd
  }
}

// endregion

/// Renders the instruction as the kernel macro that would reproduce it.
impl Display for Instruction {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    match self.opcode {

      Opcode::Jmp { operation: JmpOperation::Exit, .. } => {
        write!(f, "BPF_EXIT_INSN()")
      }

      Opcode::Jmp { operation: JmpOperation::Call, .. } => {
        write!(f, "BPF_CALL_FUNC({})", helper_name(self.imm as i32))
      }

      Opcode::Jmp { class, operation, source: Source::Immediate } => {
        write!(
          f,
          "BPF_JMP_IMM({}, /*dst=*/{}, /*imm=*/{}, /*off=*/{}, /*ins_class=*/{})",
          operation, self.dst, self.imm, self.offset, class
        )
      }

      Opcode::Jmp { class, operation, source: Source::Register } => {
        write!(
          f,
          "BPF_JMP_REG({}, /*dst=*/{}, /*src=*/{}, /*off=*/{}, /*ins_class=*/{})",
          operation, self.dst, self.src_register(), self.offset, class
        )
      }

      Opcode::Alu { class, operation, source } => {
        let width =
          match class {
            InsClass::Alu64 => "64",
            _               => "32"
          };
        match source {
          Source::Immediate => {
            write!(f, "BPF_ALU{}_IMM({}, {}, {})", width, operation, self.dst, self.imm)
          }
          Source::Register => {
            write!(f, "BPF_ALU{}_REG({}, {}, {})", width, operation, self.dst, self.src_register())
          }
        }
      }

      Opcode::Memory { class, mode, size } => {
        match (class, mode) {
          (InsClass::Ld, Mode::Imm) if self.is_map_load() => {
            write!(f, "BPF_LD_MAP_FD({}, {})", self.dst, self.imm)
          }
          (InsClass::Ld, Mode::Imm) => {
            write!(f, "BPF_LD_IMM64({}, {})", self.dst, self.imm)
          }
          (InsClass::Ld, Mode::Abs) => {
            write!(f, "BPF_LD_ABS({}, {})", size, self.imm)
          }
          (InsClass::Ld, _) => {
            write!(f, "BPF_LD_IND({}, {}, {})", size, self.src_register(), self.imm)
          }
          (InsClass::Ldx, _) => {
            write!(f, "BPF_LDX_MEM({}, {}, {}, {})", size, self.dst, self.src_register(), self.offset)
          }
          (InsClass::St, _) => {
            write!(f, "BPF_ST_MEM({}, {}, {}, {})", size, self.dst, self.offset, self.imm)
          }
          _ => {
            write!(f, "BPF_STX_MEM({}, {}, {}, {})", size, self.dst, self.src_register(), self.offset)
          }
        }
      }

    }
  }
}
