/*!
  This module is responsible for the encoding and decoding of extended-ISA instructions.

  Every instruction is one little-endian 64-bit word:

    [imm:32][offset:16][src:4][dst:4][opcode:8]

  The map-load-by-descriptor instruction is the one two-word form. Its first word carries the
  low half of the descriptor in `imm` and `PSEUDO_MAP_FD` in `src`; the second word has a zero
  opcode and carries the high half in its `imm`.
*/

use std::convert::TryFrom;

use crate::error::EncodingError;
use crate::register::{Register, MAX_REGISTER_FIELD};
use super::instruction::Instruction;
use super::opcode::Opcode;

// If you change this you must also change `encode_instruction` and `try_decode_instruction`.
pub type Word = u64;

/// The two consecutive words of a wide instruction.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct TwoWords {
  pub first  : Word,
  pub second : Word
}

/// An `Either` type for an encoded instruction, allowing the instruction to be
/// either one word or two.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum EncodedInstruction {
  Word(Word),
  Wide(TwoWords)
}

impl EncodedInstruction {
  pub fn len(&self) -> usize {
    match self {
      EncodedInstruction::Word(_) => 1,
      EncodedInstruction::Wide(_) => 2
    }
  }

  pub fn is_empty(&self) -> bool {
    false
  }

  pub fn push_to(&self, words: &mut Vec<Word>) {
    match self {
      EncodedInstruction::Word(word) => words.push(*word),
      EncodedInstruction::Wide(TwoWords { first, second }) => {
        words.push(*first);
        words.push(*second);
      }
    }
  }

  pub fn first(&self) -> Word {
    match self {
      EncodedInstruction::Word(word)             => *word,
      EncodedInstruction::Wide(TwoWords { first, .. }) => *first
    }
  }
}

fn pack(opcode: u8, dst: u8, src: u8, offset: i16, imm: i32) -> Word {
  ( opcode                  as Word)        |
  ((dst                     as Word) <<  8) |
  ((src                     as Word) << 12) |
  ((offset as u16           as Word) << 16) |
  ((imm    as u32           as Word) << 32)
}

fn check_src(src: u8) -> Result<u8, EncodingError> {
  match src > MAX_REGISTER_FIELD {
    true  => Err(EncodingError::RegisterOutOfRange(src)),
    false => Ok(src)
  }
}

/**
  Encodes the instruction into bytecode. Fails on opcode/class combinations the kernel does
  not define, on an out-of-range `src` nibble, and on immediates that do not fit the 32-bit
  field of a single-word instruction.
*/
pub fn encode_instruction(instruction: &Instruction) -> Result<EncodedInstruction, EncodingError> {
  let opcode = instruction.opcode.code()?;
  let dst = instruction.dst.number();
  let src = check_src(instruction.src)?;

  if instruction.is_wide() {
    // [opcode][dst][src][0][imm low] then [0][0][0][0][imm high]
    let value = instruction.imm as u64;
    let first = pack(opcode, dst, src, 0, value as u32 as i32);
    return Ok(EncodedInstruction::Wide(TwoWords { first, second: encode_wide_continuation(instruction)? }));
  }

  let imm =
    i32::try_from(instruction.imm)
      .map_err(|_| EncodingError::ImmediateOutOfRange(instruction.imm))?;

  Ok(EncodedInstruction::Word(pack(opcode, dst, src, instruction.offset, imm)))
}

/// The zero-opcode continuation word of a map-load-by-descriptor instruction.
pub fn encode_wide_continuation(instruction: &Instruction) -> Result<Word, EncodingError> {
  if !instruction.is_map_load() {
    return Err(EncodingError::NotWideInstruction(instruction.to_string()));
  }
  let high = ((instruction.imm as u64) >> 32) as u32 as i32;
  Ok(pack(0, 0, 0, 0, high))
}

/// Encodes a flat list of instructions, in order.
pub fn encode_instructions<'a, I>(instructions: I) -> Result<Vec<Word>, EncodingError>
  where I: IntoIterator<Item = &'a Instruction>
{
  let mut words = Vec::new();
  for instruction in instructions {
    encode_instruction(instruction)?.push_to(&mut words);
  }
  Ok(words)
}

/**
  Given the first word of an instruction, determines whether the entire instruction is two
  words. This is how to determine if a second word needs to be provided for decoding.

  Note that this function does not check the rest of the word.
*/
pub fn is_wide_instruction(word: Word) -> bool {
  (word & 0xFF) == 0x18
}

/// Splits a single word back into its fields. Wide instructions need `decode_wide`.
pub fn try_decode_instruction(word: Word) -> Option<Instruction> {
  let opcode = Opcode::decode((word & 0xFF) as u8)?;
  let dst = Register::try_from(((word >> 8) & 0x0F) as u8).ok()?;

  Some(
    Instruction {
      opcode,
      dst,
      src    : ((word >> 12) & 0x0F) as u8,
      offset : ((word >> 16) & 0xFFFF) as u16 as i16,
      imm    : (word >> 32) as u32 as i32 as i64
    }
  )
}

/// Reassembles a map-load-by-descriptor instruction from its two words. Other wide loads are
/// rejected, as the encoder rejects them.
pub fn decode_wide(words: TwoWords) -> Option<Instruction> {
  if !is_wide_instruction(words.first) || (words.second & 0xFFFF_FFFF) != 0 {
    return None;
  }
  let mut instruction = try_decode_instruction(words.first)?;
  if !instruction.is_map_load() {
    return None;
  }
  instruction.imm = ((words.second & 0xFFFF_FFFF_0000_0000) | (words.first >> 32)) as i64;
  Some(instruction)
}
