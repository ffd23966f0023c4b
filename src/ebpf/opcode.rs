/*!
  Opcode sub-fields of the extended ISA.

  The 8-bit opcode always carries the instruction class in its three low bits. The remaining
  five bits are laid out per family:

    arithmetic/jump: [operation:4][source:1][class:3]
    load/store:      [mode:3][size:2][class:3]

  Every sub-field enum stores its value already shifted into position, so an opcode is the
  bitwise or of its parts.
*/

use std::convert::TryFrom;
use std::fmt::{Display, Formatter};

use strum_macros::{Display as StrumDisplay, EnumString, IntoStaticStr};
use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::error::EncodingError;

pub const CLASS_MASK     : u8 = 0x07;
pub const SOURCE_MASK    : u8 = 0x08;
pub const OPERATION_MASK : u8 = 0xf0;
pub const SIZE_MASK      : u8 = 0x18;
pub const MODE_MASK      : u8 = 0xe0;

#[derive(
StrumDisplay, IntoStaticStr, EnumString, TryFromPrimitive, IntoPrimitive,
Clone,        Copy,          Eq, PartialEq,  Debug,            Hash
)]
#[repr(u8)]
pub enum InsClass {
  #[strum(serialize = "BPF_LD")]    Ld    = 0x00,
  #[strum(serialize = "BPF_LDX")]   Ldx   = 0x01,
  #[strum(serialize = "BPF_ST")]    St    = 0x02,
  #[strum(serialize = "BPF_STX")]   Stx   = 0x03,
  #[strum(serialize = "BPF_ALU")]   Alu   = 0x04,
  #[strum(serialize = "BPF_JMP")]   Jmp   = 0x05,
  #[strum(serialize = "BPF_JMP32")] Jmp32 = 0x06,
  #[strum(serialize = "BPF_ALU64")] Alu64 = 0x07,
}

impl InsClass {
  pub fn is_alu(&self) -> bool {
    matches!(self, InsClass::Alu | InsClass::Alu64)
  }

  pub fn is_jmp(&self) -> bool {
    matches!(self, InsClass::Jmp | InsClass::Jmp32)
  }
}

/// Whether the second operand comes from `imm` or from the source register.
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
  #[strum(serialize = "BPF_ADD")]  Add  = 0x00,
  #[strum(serialize = "BPF_SUB")]  Sub  = 0x10,
  #[strum(serialize = "BPF_MUL")]  Mul  = 0x20,
  #[strum(serialize = "BPF_DIV")]  Div  = 0x30,
  #[strum(serialize = "BPF_OR")]   Or   = 0x40,
  #[strum(serialize = "BPF_AND")]  And  = 0x50,
  #[strum(serialize = "BPF_LSH")]  Lsh  = 0x60,
  #[strum(serialize = "BPF_RSH")]  Rsh  = 0x70,
  #[strum(serialize = "BPF_NEG")]  Neg  = 0x80,
  #[strum(serialize = "BPF_MOD")]  Mod  = 0x90,
  #[strum(serialize = "BPF_XOR")]  Xor  = 0xa0,
  #[strum(serialize = "BPF_MOV")]  Mov  = 0xb0,
  #[strum(serialize = "BPF_ARSH")] Arsh = 0xc0,
  #[strum(serialize = "BPF_END")]  End  = 0xd0,
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
  #[strum(serialize = "BPF_JNE")]  Jne  = 0x50,
  #[strum(serialize = "BPF_JSGT")] Jsgt = 0x60,
  #[strum(serialize = "BPF_JSGE")] Jsge = 0x70,
  #[strum(serialize = "BPF_CALL")] Call = 0x80,
  #[strum(serialize = "BPF_EXIT")] Exit = 0x90,
  #[strum(serialize = "BPF_JLT")]  Jlt  = 0xa0,
  #[strum(serialize = "BPF_JLE")]  Jle  = 0xb0,
  #[strum(serialize = "BPF_JSLT")] Jslt = 0xc0,
  #[strum(serialize = "BPF_JSLE")] Jsle = 0xd0,
}

impl JmpOperation {
  /// Two-way comparisons, i.e. everything that owns a false branch in a program tree.
  pub fn is_conditional(&self) -> bool {
    !matches!(self, JmpOperation::Ja | JmpOperation::Call | JmpOperation::Exit)
  }
}

#[derive(
StrumDisplay, IntoStaticStr, EnumString, TryFromPrimitive, IntoPrimitive,
Clone,        Copy,          Eq, PartialEq,  Debug,            Hash
)]
#[repr(u8)]
pub enum Size {
  #[strum(serialize = "BPF_W")]  W  = 0x00,
  #[strum(serialize = "BPF_H")]  H  = 0x08,
  #[strum(serialize = "BPF_B")]  B  = 0x10,
  #[strum(serialize = "BPF_DW")] DW = 0x18,
}

#[derive(
StrumDisplay, IntoStaticStr, EnumString, TryFromPrimitive, IntoPrimitive,
Clone,        Copy,          Eq, PartialEq,  Debug,            Hash
)]
#[repr(u8)]
pub enum Mode {
  #[strum(serialize = "BPF_IMM")]    Imm    = 0x00,
  #[strum(serialize = "BPF_ABS")]    Abs    = 0x20,
  #[strum(serialize = "BPF_IND")]    Ind    = 0x40,
  #[strum(serialize = "BPF_MEM")]    Mem    = 0x60,
  #[strum(serialize = "BPF_ATOMIC")] Atomic = 0xc0,
}

/// Kernel helper functions reachable through `BPF_CALL`.
#[derive(
StrumDisplay, IntoStaticStr, EnumString, TryFromPrimitive, IntoPrimitive,
Clone,        Copy,          Eq, PartialEq,  Debug,            Hash
)]
#[repr(i32)]
pub enum HelperFunction {
  #[strum(serialize = "BPF_FUNC_map_lookup_elem")]       MapLookupElem      = 1,
  #[strum(serialize = "BPF_FUNC_map_update_elem")]       MapUpdateElem      = 2,
  #[strum(serialize = "BPF_FUNC_map_delete_elem")]       MapDeleteElem      = 3,
  #[strum(serialize = "BPF_FUNC_probe_read")]            ProbeRead          = 4,
  #[strum(serialize = "BPF_FUNC_ktime_get_ns")]          KtimeGetNs         = 5,
  #[strum(serialize = "BPF_FUNC_trace_printk")]          TracePrintk        = 6,
  #[strum(serialize = "BPF_FUNC_get_prandom_u32")]       GetPrandomU32      = 7,
  #[strum(serialize = "BPF_FUNC_get_smp_processor_id")]  GetSmpProcessorId  = 8,
  #[strum(serialize = "BPF_FUNC_skb_store_bytes")]       SkbStoreBytes      = 9,
  #[strum(serialize = "BPF_FUNC_l3_csum_replace")]       L3CsumReplace      = 10,
  #[strum(serialize = "BPF_FUNC_l4_csum_replace")]       L4CsumReplace      = 11,
  #[strum(serialize = "BPF_FUNC_tail_call")]             TailCall           = 12,
  #[strum(serialize = "BPF_FUNC_clone_redirect")]        CloneRedirect      = 13,
  #[strum(serialize = "BPF_FUNC_get_current_pid_tgid")]  GetCurrentPidTgid  = 14,
}

/// Formats a helper id by its kernel name when it is known.
pub fn helper_name(function: i32) -> String {
  match HelperFunction::try_from(function) {
    Ok(helper) => helper.to_string(),
    Err(_)     => function.to_string()
  }
}

/**
  A complete 8-bit opcode, split into its family-specific sub-fields. Not every combination
  is a real instruction; `code()` rejects the ones the kernel does not define.
*/
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Opcode {
  Alu {
    class     : InsClass,
    operation : AluOperation,
    source    : Source
  },
  Jmp {
    class     : InsClass,
    operation : JmpOperation,
    source    : Source
  },
  Memory {
    class : InsClass,
    mode  : Mode,
    size  : Size
  },
}

impl Opcode {

  pub fn class(&self) -> InsClass {
    match self {
      | Opcode::Alu    { class, .. }
      | Opcode::Jmp    { class, .. }
      | Opcode::Memory { class, .. } => *class
    }
  }

  /// The source bit, for the families that have one.
  pub fn source(&self) -> Option<Source> {
    match self {
      | Opcode::Alu { source, .. }
      | Opcode::Jmp { source, .. } => Some(*source),
      Opcode::Memory { .. }        => None
    }
  }

  /// Packs the sub-fields into the opcode byte, rejecting combinations the kernel lacks.
  pub fn code(&self) -> Result<u8, EncodingError> {
    let class = self.class();
    let family = self.family();

    let valid =
      match self {
        Opcode::Alu { .. } => class.is_alu(),

        Opcode::Jmp { class, operation, .. } => {
          match operation {
            // Calls and exits only exist in the 64-bit jump class.
            JmpOperation::Call | JmpOperation::Exit => *class == InsClass::Jmp,
            _                                       => class.is_jmp()
          }
        }

        Opcode::Memory { class, mode, size } => {
          match (class, mode) {
            // The only immediate load is the two-word 64-bit form.
            (InsClass::Ld, Mode::Imm)                 => *size == Size::DW,
            (InsClass::Ld, Mode::Abs)
            | (InsClass::Ld, Mode::Ind)               => *size != Size::DW,
            (InsClass::Ldx, Mode::Mem)
            | (InsClass::St, Mode::Mem)
            | (InsClass::Stx, Mode::Mem)              => true,
            (InsClass::Stx, Mode::Atomic)             => matches!(size, Size::W | Size::DW),
            _                                         => false
          }
        }
      };

    if !valid {
      return Err(EncodingError::UnrecognizedOpcode { class: class.into(), family });
    }

    let code =
      match self {
        Opcode::Alu { class, operation, source } => {
          Into::<u8>::into(*class) | Into::<u8>::into(*source) | Into::<u8>::into(*operation)
        }
        Opcode::Jmp { class, operation, source } => {
          Into::<u8>::into(*class) | Into::<u8>::into(*source) | Into::<u8>::into(*operation)
        }
        Opcode::Memory { class, mode, size } => {
          Into::<u8>::into(*class) | Into::<u8>::into(*size) | Into::<u8>::into(*mode)
        }
      };
    Ok(code)
  }

  /// Splits an opcode byte back into sub-fields. Returns `None` for unassigned bit patterns.
  pub fn decode(code: u8) -> Option<Opcode> {
    let class = InsClass::try_from(code & CLASS_MASK).ok()?;

    let opcode =
      if class.is_alu() {
        Opcode::Alu {
          class,
          operation : AluOperation::try_from(code & OPERATION_MASK).ok()?,
          source    : Source::try_from(code & SOURCE_MASK).ok()?
        }
      } else if class.is_jmp() {
        Opcode::Jmp {
          class,
          operation : JmpOperation::try_from(code & OPERATION_MASK).ok()?,
          source    : Source::try_from(code & SOURCE_MASK).ok()?
        }
      } else {
        Opcode::Memory {
          class,
          mode : Mode::try_from(code & MODE_MASK).ok()?,
          size : Size::try_from(code & SIZE_MASK).ok()?
        }
      };

    // Reject patterns that decode field-wise but name no real instruction.
    opcode.code().ok().map(|_| opcode)
  }

  fn family(&self) -> &'static str {
    match self {
      Opcode::Alu    { operation, .. } => operation.into(),
      Opcode::Jmp    { operation, .. } => operation.into(),
      Opcode::Memory { mode, .. }      => mode.into()
    }
  }
}

impl Display for Opcode {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    match self {
      Opcode::Alu { class, operation, source } => {
        write!(f, "{} | {} | {}", class, operation, source)
      }
      Opcode::Jmp { class, operation, source } => {
        write!(f, "{} | {} | {}", class, operation, source)
      }
      Opcode::Memory { class, mode, size } => {
        write!(f, "{} | {} | {}", class, mode, size)
      }
    }
  }
}
