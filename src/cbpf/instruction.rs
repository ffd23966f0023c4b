//! One word-oriented instruction (the kernel's `struct sock_filter`) and its constructors.

use std::fmt::{Display, Formatter};

use crate::register::ClassicRegister;
use super::opcode::{
  AluOperation, InsClass, JmpOperation, MiscOperation, Mode, Opcode, RetValue, Size, Source
};

/// A comparand or ALU operand: the index register `X`, or a literal.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Operand {
  Register(ClassicRegister),
  Immediate(i32),
}

impl From<ClassicRegister> for Operand {
  fn from(register: ClassicRegister) -> Self {
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

  /// The `k` field. A register operand is carried as its register number.
  pub fn k(&self) -> i32 {
    match self {
      Operand::Register(register) => register.number() as i32,
      Operand::Immediate(value)   => *value
    }
  }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct Instruction {
  pub opcode : Opcode,
  /// Instructions skipped when a conditional jump is taken.
  pub jt     : u8,
  /// Instructions skipped when it is not.
  pub jf     : u8,
  pub k      : i32,
}

impl Instruction {
  fn statement(opcode: Opcode, k: i32) -> Instruction {
    Instruction { opcode, jt: 0, jf: 0, k }
  }
}

// region Jumps

/// Unconditional jump. The displacement is carried in `jt`; `k` stays zero.
pub fn jmp_ja(displacement: u8) -> Instruction {
  Instruction {
    opcode : Opcode::Jmp { operation: JmpOperation::Ja, source: Source::Immediate },
    jt     : displacement,
    jf     : 0,
    k      : 0
  }
}

pub fn jmp<T: Into<Operand>>(operation: JmpOperation, jt: u8, jf: u8, operand: T) -> Instruction {
  let operand = operand.into();
  Instruction {
    opcode : Opcode::Jmp { operation, source: operand.source() },
    jt,
    jf,
    k      : operand.k()
  }
}

pub fn jmp_eq<T: Into<Operand>>(jt: u8, jf: u8, operand: T) -> Instruction {
  jmp(JmpOperation::Jeq, jt, jf, operand)
}

pub fn jmp_gt<T: Into<Operand>>(jt: u8, jf: u8, operand: T) -> Instruction {
  jmp(JmpOperation::Jgt, jt, jf, operand)
}

pub fn jmp_ge<T: Into<Operand>>(jt: u8, jf: u8, operand: T) -> Instruction {
  jmp(JmpOperation::Jge, jt, jf, operand)
}

pub fn jmp_set<T: Into<Operand>>(jt: u8, jf: u8, operand: T) -> Instruction {
  jmp(JmpOperation::Jset, jt, jf, operand)
}

/**
  The guard pattern for this ISA: a comparison whose true path skips one instruction, followed
  by the `ret #0` its false path falls into. The `jt` byte of 1 is the guard's false-branch size.
*/
pub fn guard<T: Into<Operand>>(operation: JmpOperation, operand: T) -> [Instruction; 2] {
  [jmp(operation, 1, 0, operand), ret(RetValue::Immediate, 0)]
}

// endregion

// region Arithmetic, return, misc

pub fn alu<T: Into<Operand>>(operation: AluOperation, operand: T) -> Instruction {
  let operand = operand.into();
  Instruction::statement(Opcode::Alu { operation, source: operand.source() }, operand.k())
}

pub fn neg() -> Instruction {
  Instruction::statement(Opcode::Alu { operation: AluOperation::Neg, source: Source::Immediate }, 0)
}

pub fn ret(value: RetValue, k: i32) -> Instruction {
  Instruction::statement(Opcode::Ret(value), k)
}

pub fn tax() -> Instruction {
  Instruction::statement(Opcode::Misc(MiscOperation::Tax), 0)
}

pub fn txa() -> Instruction {
  Instruction::statement(Opcode::Misc(MiscOperation::Txa), 0)
}

// endregion

// region Loads and stores

fn memory(class: InsClass, mode: Mode, size: Size, k: i32) -> Instruction {
  Instruction::statement(Opcode::Memory { class, mode, size }, k)
}

/// `A = k`
pub fn ld_imm(k: i32) -> Instruction {
  memory(InsClass::Ld, Mode::Imm, Size::W, k)
}

/// `A = packet[k]`
pub fn ld_abs(size: Size, k: i32) -> Instruction {
  memory(InsClass::Ld, Mode::Abs, size, k)
}

/// `A = packet[X + k]`
pub fn ld_ind(size: Size, k: i32) -> Instruction {
  memory(InsClass::Ld, Mode::Ind, size, k)
}

/// `A = M[k]`
pub fn ld_mem(k: i32) -> Instruction {
  memory(InsClass::Ld, Mode::Mem, Size::W, k)
}

/// `A = packet length`
pub fn ld_len() -> Instruction {
  memory(InsClass::Ld, Mode::Len, Size::W, 0)
}

pub fn ldx_imm(k: i32) -> Instruction {
  memory(InsClass::Ldx, Mode::Imm, Size::W, k)
}

pub fn ldx_mem(k: i32) -> Instruction {
  memory(InsClass::Ldx, Mode::Mem, Size::W, k)
}

pub fn ldx_len() -> Instruction {
  memory(InsClass::Ldx, Mode::Len, Size::W, 0)
}

/// `X = 4 * (packet[k] & 0xf)`
pub fn ldx_msh(k: i32) -> Instruction {
  memory(InsClass::Ldx, Mode::Msh, Size::B, k)
}

/// `M[k] = A`
pub fn st(k: i32) -> Instruction {
  memory(InsClass::St, Mode::Imm, Size::W, k)
}

/// `M[k] = X`
pub fn stx(k: i32) -> Instruction {
  memory(InsClass::Stx, Mode::Imm, Size::W, k)
}

// endregion

/// Renders the kernel's `BPF_STMT`/`BPF_JUMP` macro.
impl Display for Instruction {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    match self.opcode {

      Opcode::Jmp { operation, source } => {
        write!(
          f,
          "BPF_JUMP(BPF_JMP | {} | {}, {}, {}, {})",
          operation, source, self.k, self.jt, self.jf
        )
      }

      Opcode::Alu { operation, source } => {
        write!(f, "BPF_STMT(BPF_ALU | {} | {}, {})", operation, source, self.k)
      }

      Opcode::Memory { class, mode, size } => {
        write!(f, "BPF_STMT({} | {} | {}, {})", class, size, mode, self.k)
      }

      Opcode::Ret(value) => write!(f, "BPF_STMT(BPF_RET | {}, {})", value, self.k),

      Opcode::Misc(operation) => write!(f, "BPF_STMT(BPF_MISC | {}, {})", operation, self.k),

    }
  }
}
