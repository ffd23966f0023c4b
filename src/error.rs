//! Error kinds surfaced by the encoders, the builder, and the listing parser.

use thiserror::Error;

/// Failures of a single encode call. Nothing is ever silently truncated or defaulted.
#[derive(Debug, Error, Clone, Eq, PartialEq)]
pub enum EncodingError {
  #[error("unrecognized opcode: class {class:#04x} does not accept {family}")]
  UnrecognizedOpcode {
    class  : u8,
    family : &'static str
  },
  #[error("companion word requested for {0}, which is not a map-load-by-descriptor instruction")]
  NotWideInstruction(String),
  #[error("register number {0} does not fit in a 4-bit field")]
  RegisterOutOfRange(u8),
  #[error("immediate {0} does not fit in the 32-bit immediate field")]
  ImmediateOutOfRange(i64),
  #[error("false branch of {0} words does not fit in the jump displacement field")]
  DisplacementOutOfRange(u16),
}

#[derive(Debug, Error, Clone, Eq, PartialEq)]
pub enum BuildError {
  #[error("the generator strategy never produced a root operation")]
  EmptyProgram,
}

#[derive(Debug, Error, Clone, Eq, PartialEq)]
pub enum ListingError {
  #[error("line {line}: expected `[index]: hex`, found `{text}`")]
  Syntax {
    line : usize,
    text : String
  },
  #[error("line {line}: expected index {expected}, found {found}")]
  OutOfOrder {
    line     : usize,
    expected : usize,
    found    : usize
  },
}
