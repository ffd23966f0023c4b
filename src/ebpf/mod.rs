/*!
  The extended ISA: register-based, 64-bit instructions with signed relative jump offsets.

  `opcode`, `instruction` and `binary` are the bit-exact encoders; `operation` is the program
  tree built on top of them.
*/

mod binary;
mod instruction;
mod iter;
mod opcode;
mod operation;

pub use binary::{
  decode_wide, encode_instruction, encode_instructions, encode_wide_continuation,
  is_wide_instruction, try_decode_instruction, EncodedInstruction, TwoWords, Word
};
pub use instruction::{
  alu32, alu64, call, exit, jmp32, jmp64, ld, ld_abs, ld_b, ld_dw, ld_h, ld_ind, ld_map_by_fd,
  ld_w, mov64, st, st_b, st_dw, st_h, st_w, Instruction, Operand
};
pub use iter::OperationIter;
pub use opcode::{
  helper_name, AluOperation, HelperFunction, InsClass, JmpOperation, Mode, Opcode, Size, Source
};
pub use operation::{Branch, Exit, FalseBranch, Linear, Operation, Successor, TreeNode};
