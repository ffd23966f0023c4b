/*!
  Encoding and decoding of word-oriented instructions. An instruction is the kernel's
  `struct sock_filter` read as one little-endian word; only the low 64 bits are meaningful
  and the layout is

    [k:32][jf:8][jt:8][code:16]
*/

use crate::ebpf::Word;
use crate::error::EncodingError;
use super::instruction::Instruction;
use super::opcode::Opcode;

pub fn encode_instruction(instruction: &Instruction) -> Result<Word, EncodingError> {
  let code = instruction.opcode.code()?;
  Ok(
    ( code                    as Word)        |
    ((instruction.jt          as Word) << 16) |
    ((instruction.jf          as Word) << 24) |
    ((instruction.k as u32    as Word) << 32)
  )
}

/// Encodes a flat instruction list, stopping at the first failure.
pub fn encode_program<'a, I>(instructions: I) -> Result<Vec<Word>, EncodingError>
  where I: IntoIterator<Item = &'a Instruction>
{
  instructions.into_iter().map(encode_instruction).collect()
}

pub fn try_decode_instruction(word: Word) -> Option<Instruction> {
  let opcode = Opcode::decode((word & 0xFFFF) as u16)?;
  Some(Instruction {
    opcode,
    jt : ((word >> 16) & 0xFF) as u8,
    jf : ((word >> 24) & 0xFF) as u8,
    k  : (word >> 32) as u32 as i32
  })
}
