use std::convert::TryFrom;

use pretty_assertions::assert_eq;
use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::SeedableRng;

use bpftree::cbpf;
use bpftree::ebpf::{
  self, encode_instruction, ld_map_by_fd, mov64, st_b, st_dw, st_h, st_w, AluOperation,
  EncodedInstruction, InsClass, JmpOperation, Operation, TreeNode
};
use bpftree::listing::parse_listing;
use bpftree::register::{ClassicRegister, Register};
use bpftree::{GenerationState, GeneratorStrategy, Program, ProgramBuilder, RandomSource};

const ALU_OPERATIONS: [AluOperation; 8] = [
  AluOperation::Add, AluOperation::Sub, AluOperation::Mul, AluOperation::Div,
  AluOperation::Or,  AluOperation::And, AluOperation::Lsh, AluOperation::Xor,
];

const JMP_OPERATIONS: [JmpOperation; 6] = [
  JmpOperation::Jeq, JmpOperation::Jne, JmpOperation::Jgt,
  JmpOperation::Jge, JmpOperation::Jset, JmpOperation::Jslt,
];

/// Everything a generator might produce, with every false branch sized exactly.
struct Mixed {
  budget: usize,
}

impl GeneratorStrategy for Mixed {
  fn next_operation(&mut self, state: &mut GenerationState<'_>) -> Option<Operation> {
    if state.generated() >= self.budget {
      return None;
    }
    let random = state.random();
    let dst = Register::try_from(random.in_range(0, 10) as u8).unwrap();
    let value = random.in_range(-1000, 1000) as i32;
    let operation = match random.in_range(0, 5) {
      0 => Operation::guard(InsClass::Jmp, JMP_OPERATIONS[random.in_range(0, 6) as usize], dst, value),
      1 => Operation::jmp(InsClass::Jmp32, JMP_OPERATIONS[random.in_range(0, 6) as usize], dst, Register::R2),
      2 => Operation::new(ld_map_by_fd(dst, random.in_range(0, i64::max_value()))),
      3 => Operation::new(st_dw(Register::R10, dst, -8)),
      _ => Operation::new(ebpf::alu64(ALU_OPERATIONS[random.in_range(0, 8) as usize], dst, value)),
    };
    Some(operation)
  }

  fn false_branch(&mut self, state: &mut GenerationState<'_>) -> Option<(Operation, u16)> {
    let value = state.random().in_range(0, 4) as i32;
    Some((Operation::new(mov64(Register::R0, value)).then(Operation::exit()), 2))
  }
}

fn build(seed: u64, budget: usize) -> Program {
  let mut builder = ProgramBuilder::new(Mixed { budget }, StdRng::seed_from_u64(seed));
  builder.build();
  let _ = builder.attach_terminal(Operation::exit());
  builder.finalize().unwrap()
}

fn single(instruction: &ebpf::Instruction) -> u64 {
  match encode_instruction(instruction).unwrap() {
    EncodedInstruction::Word(word) => word,
    other => panic!("expected one word, got {:?}", other)
  }
}

// region Literal vectors

#[test]
fn store_vectors(){
  assert_eq!(single(&st_dw(Register::R9, Register::R0, -8)), 0xfff8097b);
  assert_eq!(single(&st_dw(Register::R9, 1337, -8)), 0x539fff8097a);
  assert_eq!(single(&st_w(Register::R9, Register::R0, -8)), 0xfff80963);
  assert_eq!(single(&st_h(Register::R9, 1337, -8)), 0x539fff8096a);
  assert_eq!(single(&st_b(Register::R9, Register::R0, -8)), 0xfff80973);
}

#[test]
fn classic_unconditional_jump(){
  let word = cbpf::encode_instruction(&cbpf::jmp_ja(1)).unwrap();
  assert_eq!(word & 0x07, 0x05);
  assert_eq!(word & 0x08, 0x00);
  assert_eq!(word & 0xf0, 0x00);
  assert_eq!((word >> 16) & 0xff, 1);
  assert_eq!((word >> 24) & 0xff, 0);
  assert_eq!(word >> 32, 0);
}

#[test]
fn map_load_high_bits(){
  let narrow = ebpf::encode_instruction(&ld_map_by_fd(Register::R9, 42)).unwrap();
  assert_eq!(narrow, EncodedInstruction::Wide(ebpf::TwoWords { first: 0x2a00001918, second: 0 }));

  let wide = ebpf::encode_instruction(&ld_map_by_fd(Register::R1, 0x1234_5678_9abc_def0)).unwrap();
  assert_eq!(wide, EncodedInstruction::Wide(ebpf::TwoWords { first: 0x9abc_def0_0000_1118, second: 0x1234_5678_0000_0000 }));
}

// endregion

#[test]
fn guard_slice_is_one_word_at_every_budget(){
  for budget in 0..20 {
    let program = {
      let guard = Operation::guard(InsClass::Jmp, JmpOperation::Jgt, Register::R3, 9);
      let mut builder = ProgramBuilder::with_root(Mixed { budget }, StdRng::seed_from_u64(budget as u64), guard);
      builder.build();
      builder.finalize().unwrap()
    };
    let words = program.encode().unwrap();
    assert_eq!((words[0] >> 16) & 0xffff, 1);
    assert_eq!(words[1], 0x95);
  }
}

#[test]
fn listing_round_trip_of_a_built_program(){
  let program = build(11, 30);
  let words = program.encode().unwrap();
  assert_eq!(parse_listing(&program.listing().unwrap()), Ok(words));
}

proptest! {

  #[test]
  fn alu_and_jump_bitfields(
    operation in 0usize..8,
    jump in 0usize..6,
    dst in 0u8..11,
    src in 0u8..11,
    imm in any::<i32>(),
    register_source in any::<bool>()
  ) {
    let dst = Register::try_from(dst).unwrap();
    let src = Register::try_from(src).unwrap();
    let operation = ALU_OPERATIONS[operation];
    let jump = JMP_OPERATIONS[jump];

    let (alu, jmp, source_bit, comparand) = match register_source {
      true  => (ebpf::alu32(operation, dst, src), ebpf::jmp64(jump, dst, src, 0), 0x08, 0u32),
      false => (ebpf::alu32(operation, dst, imm), ebpf::jmp64(jump, dst, imm, 0), 0x00, imm as u32),
    };

    let word = single(&alu);
    prop_assert_eq!(word & 0x07, Into::<u8>::into(InsClass::Alu) as u64);
    prop_assert_eq!(word & 0x08, source_bit);
    prop_assert_eq!(word & 0xf0, Into::<u8>::into(operation) as u64);

    let word = single(&jmp);
    prop_assert_eq!(word & 0x07, Into::<u8>::into(InsClass::Jmp) as u64);
    prop_assert_eq!(word & 0x08, source_bit);
    prop_assert_eq!(word & 0xf0, Into::<u8>::into(jump) as u64);
    prop_assert_eq!((word >> 32) as u32, comparand);
    prop_assert_eq!((word >> 8) & 0x0f, dst.number() as u64);
  }

  #[test]
  fn classic_jump_fields(jt in any::<u8>(), jf in any::<u8>(), k in any::<i32>(), register_source in any::<bool>()) {
    let instruction = match register_source {
      true  => cbpf::jmp_gt(jt, jf, ClassicRegister::X),
      false => cbpf::jmp_gt(jt, jf, k),
    };
    let word = cbpf::encode_instruction(&instruction).unwrap();
    prop_assert_eq!(word & 0x08, if register_source { 0x08 } else { 0 });
    prop_assert_eq!(((word >> 16) & 0xff) as u8, jt);
    prop_assert_eq!(((word >> 24) & 0xff) as u8, jf);
    prop_assert_eq!((word >> 32) as u32, if register_source { 1 } else { k as u32 });
    prop_assert_eq!(cbpf::try_decode_instruction(word), Some(instruction));
  }

  #[test]
  fn truncates_to_declared_size(size in 1u16..4, budget in 0usize..6, seed in any::<u64>()) {
    // The false subtree is a guard chain; only its first `size` words are laid out.
    let inner = Operation::guard(InsClass::Jmp, JmpOperation::Jeq, Register::R1, 0);
    let mut builder = ProgramBuilder::with_root(
      Mixed { budget },
      StdRng::seed_from_u64(seed),
      Operation::jmp(InsClass::Jmp, JmpOperation::Jne, Register::R1, Register::R2)
        .with_false_branch(inner, size)
        .then(Operation::exit())
    );
    builder.build();
    let program = builder.finalize().unwrap();

    let false_words = program.root().false_successor().unwrap().encode().unwrap();
    let words = program.encode().unwrap();
    let taken = std::cmp::min(size as usize, false_words.len());

    prop_assert_eq!(&words[1..1 + taken], &false_words[..taken]);
    prop_assert_eq!(words.len(), 1 + taken + 1);
    prop_assert_eq!((words[0] >> 16) & 0xffff, size as u64);
  }

  #[test]
  fn numbering_is_idempotent(seed in any::<u64>(), budget in 0usize..40) {
    let program = build(seed, budget);
    let first_total = program.assign_sequence_numbers(0);
    let first = program.sequence_numbers();
    let second_total = program.assign_sequence_numbers(0);
    prop_assert_eq!(first_total, second_total);
    prop_assert_eq!(first, program.sequence_numbers());
  }

  #[test]
  fn numbers_index_the_encoded_words(seed in any::<u64>(), budget in 0usize..40) {
    let program = build(seed, budget);
    let words = program.encode().unwrap();
    let total = program.assign_sequence_numbers(0);
    prop_assert_eq!(total as usize, words.len());

    for operation in &program {
      let expected = encode_instruction(&operation.instruction()).unwrap().first();
      prop_assert_eq!(words[operation.number() as usize], expected);
    }
  }
}
