/*!
  The word-oriented ISA: an accumulator, an index register, and byte-sized jump-true/jump-false
  displacements. Programs are flat; the tree model lives in `ebpf`.
*/

mod binary;
mod instruction;
mod opcode;

pub use binary::{encode_instruction, encode_program, try_decode_instruction};
pub use instruction::{
  alu, guard, jmp, jmp_eq, jmp_ge, jmp_gt, jmp_ja, jmp_set, ld_abs, ld_imm,
  ld_ind, ld_len, ld_mem, ldx_imm, ldx_len, ldx_mem, ldx_msh, neg, ret, st, stx, tax, txa,
  Instruction, Operand
};
pub use opcode::{
  AluOperation, InsClass, JmpOperation, MiscOperation, Mode, Opcode, RetValue, Size, Source
};
