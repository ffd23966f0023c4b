/*!
  Program tree nodes.

  A randomly generated program is a strict tree. Straight-line nodes own one successor; two-way
  jumps own a true successor and a false successor together with the number of words the false
  path contributes to the flattened program. Flattening lays a jump out as

    [jump][first `size` words of the false subtree][true subtree]

  so the jump's offset is the false-branch size: taken, it skips the false path.

  Slots start out `Open` and are filled by asking a `GeneratorStrategy` during expansion. A slot
  the strategy declines becomes `Sealed`, so expanding a finished tree again does nothing.
*/

mod numbering;
mod trace;

use std::cell::Cell;
use std::convert::TryFrom;

use tracing::warn;

use crate::error::EncodingError;
use crate::register::Register;
use crate::strategy::Expansion;
use super::binary::{encode_instruction, Word};
use super::instruction::{self, Instruction, Operand};
use super::opcode::{InsClass, JmpOperation, Opcode, Source};

/// The capability set every node of a program tree provides.
pub trait TreeNode {
  /// Appends this node and its successors to `words`, truncating the false path to its
  /// declared size.
  fn encode_into(&self, words: &mut Vec<Word>) -> Result<(), EncodingError>;

  fn encode(&self) -> Result<Vec<Word>, EncodingError> {
    let mut words = Vec::new();
    self.encode_into(&mut words)?;
    Ok(words)
  }

  /// Fills open slots from the strategy and descends into every populated one. Returns the
  /// number of nodes added.
  fn expand(&mut self, expansion: &mut Expansion<'_>) -> usize;

  /// Records `start` as this node's position and numbers the successors. Returns the number
  /// of words this node and its successors occupy.
  fn assign_sequence_numbers(&self, start: u32) -> u32;

  /// Hangs `node` on the last unfilled slot of the true-branch chain. Hands `node` back when the
  /// chain ends in an exit.
  fn attach_terminal(&mut self, node: Operation) -> Result<(), Operation>;

  /// Appends the reproduction text of this node and all its successors.
  fn trace_into(&self, lines: &mut Vec<String>);

  fn trace(&self) -> Vec<String> {
    let mut lines = Vec::new();
    self.trace_into(&mut lines);
    lines
  }
}

// region Slots

/// The single successor of a straight-line node, or the true successor of a jump.
#[derive(Debug)]
pub enum Successor {
  /// Will be filled by the strategy on the next expansion.
  Open,
  /// The strategy declined, or the slot was closed explicitly.
  Sealed,
  Filled(Box<Operation>),
}

impl Successor {

  pub fn get(&self) -> Option<&Operation> {
    match self {
      Successor::Filled(next) => Some(next),
      _                       => None
    }
  }

  fn encode_into(&self, words: &mut Vec<Word>) -> Result<(), EncodingError> {
    match self.get() {
      Some(next) => next.encode_into(words),
      None       => Ok(())
    }
  }

  pub(crate) fn expand(&mut self, expansion: &mut Expansion<'_>) -> usize {
    match self {

      Successor::Filled(next) => expansion.deeper(|e| next.expand(e)),

      Successor::Sealed => 0,

      Successor::Open => {
        match expansion.next_operation() {
          Some(operation) => {
            let mut next = Box::new(operation);
            let grown = 1 + expansion.deeper(|e| next.expand(e));
            *self = Successor::Filled(next);
            grown
          }
          None => {
            *self = Successor::Sealed;
            0
          }
        }
      }

    }
  }

  pub(crate) fn attach(&mut self, node: Operation) -> Result<(), Operation> {
    match self {
      Successor::Filled(next) => next.attach_terminal(node),
      _ => {
        *self = Successor::Filled(Box::new(node));
        Ok(())
      }
    }
  }

  fn seal(&mut self) {
    if let Successor::Open = self {
      *self = Successor::Sealed;
    }
  }
}

/// Where the not-taken path of a jump comes from.
#[derive(Debug)]
pub enum FalseBranch {
  /// Filled on expansion with a single exit of size 1.
  Guard,
  /// Filled on expansion from `GeneratorStrategy::false_branch`.
  Strategy,
  Sealed,
  Filled {
    operation : Box<Operation>,
    /// Words of `operation`'s encoding that belong to this path.
    size      : u16
  },
}

impl FalseBranch {
  pub fn get(&self) -> Option<(&Operation, u16)> {
    match self {
      FalseBranch::Filled { operation, size } => Some((operation, *size)),
      _                                       => None
    }
  }
}

// endregion

// region Nodes

/// A node with at most one successor: arithmetic, call, load, store.
#[derive(Debug)]
pub struct Linear {
  instruction : Instruction,
  number      : Cell<u32>,
  next        : Successor,
}

impl Linear {
  fn new(instruction: Instruction) -> Linear {
    Linear {
      instruction,
      number : Cell::new(0),
      next   : Successor::Open
    }
  }
}

/// A two-way jump.
#[derive(Debug)]
pub struct Branch {
  instruction  : Instruction,
  number       : Cell<u32>,
  true_branch  : Successor,
  false_branch : FalseBranch,
}

impl Branch {

  /// An unconditional jump has no not-taken path, so its false slot starts out sealed.
  fn new(instruction: Instruction, false_branch: FalseBranch) -> Branch {
    let false_branch =
      match instruction.opcode {
        Opcode::Jmp { operation, .. } if !operation.is_conditional() => FalseBranch::Sealed,
        _ => false_branch
      };
    Branch {
      instruction,
      number       : Cell::new(0),
      true_branch  : Successor::Open,
      false_branch
    }
  }

  pub fn false_branch_size(&self) -> u16 {
    self.false_branch.get().map_or(0, |(_, size)| size)
  }

  /// The offset shown in traces, saturated where encoding would fail.
  pub(super) fn shown_offset(&self) -> i16 {
    i16::try_from(self.false_branch_size()).unwrap_or(i16::MAX)
  }

  /// The jump instruction with its offset set to skip the false path.
  fn displaced(&self) -> Result<Instruction, EncodingError> {
    let size = self.false_branch_size();
    let offset = i16::try_from(size).map_err(|_| EncodingError::DisplacementOutOfRange(size))?;
    Ok(self.instruction.with_offset(offset))
  }

  fn encode_into(&self, words: &mut Vec<Word>) -> Result<(), EncodingError> {
    encode_instruction(&self.displaced()?)?.push_to(words);

    if let Some((operation, size)) = self.false_branch.get() {
      // Only the first `size` words belong to this path; anything the false subtree encodes
      // past that is reached through another jump.
      let mut false_words = Vec::new();
      operation.encode_into(&mut false_words)?;
      words.extend(false_words.into_iter().take(size as usize));
    }

    self.true_branch.encode_into(words)
  }

  fn expand(&mut self, expansion: &mut Expansion<'_>) -> usize {
    let mut grown = 0;

    let replacement =
      match &mut self.false_branch {

        FalseBranch::Filled { operation, .. } => {
          grown += expansion.deeper(|e| operation.expand(e));
          None
        }

        FalseBranch::Sealed => None,

        FalseBranch::Guard => {
          grown += 1;
          Some(FalseBranch::Filled { operation: Box::new(Operation::exit()), size: 1 })
        }

        FalseBranch::Strategy => {
          match expansion.false_branch() {
            Some((operation, size)) => {
              let mut operation = Box::new(operation);
              grown += 1 + expansion.deeper(|e| operation.expand(e));
              Some(FalseBranch::Filled { operation, size })
            }
            None => Some(FalseBranch::Sealed)
          }
        }

      };

    if let Some(false_branch) = replacement {
      self.false_branch = false_branch;
    }

    grown + self.true_branch.expand(expansion)
  }
}

/// Terminates the program. Has no successors.
#[derive(Debug, Default)]
pub struct Exit {
  number : Cell<u32>,
}

// endregion

/// A node of the program tree. Exclusively owns its successors.
#[derive(Debug)]
pub enum Operation {
  Alu(Linear),
  ImmJmp(Branch),
  RegJmp(Branch),
  Call(Linear),
  Exit(Exit),
  Load(Linear),
  Store(Linear),
}

impl Operation {

  // region Constructors

  /**
    Wraps an arbitrary instruction in the matching node kind. Conditional jumps get a false
    slot that defers to the strategy; use `Operation::guard` for one that exits.
  */
  pub fn new(instruction: Instruction) -> Operation {
    match instruction.opcode {
      Opcode::Jmp { operation: JmpOperation::Exit, .. } => Operation::exit(),
      Opcode::Jmp { operation: JmpOperation::Call, .. } => Operation::Call(Linear::new(instruction)),
      Opcode::Jmp { source: Source::Immediate, .. }     => {
        Operation::ImmJmp(Branch::new(instruction, FalseBranch::Strategy))
      }
      Opcode::Jmp { source: Source::Register, .. }      => {
        Operation::RegJmp(Branch::new(instruction, FalseBranch::Strategy))
      }
      Opcode::Alu { .. } => Operation::Alu(Linear::new(instruction)),
      Opcode::Memory { class: InsClass::Ld, .. }
      | Opcode::Memory { class: InsClass::Ldx, .. } => Operation::Load(Linear::new(instruction)),
      Opcode::Memory { .. } => Operation::Store(Linear::new(instruction)),
    }
  }

  pub fn exit() -> Operation {
    Operation::Exit(Exit::default())
  }

  pub fn call(function: i32) -> Operation {
    Operation::Call(Linear::new(instruction::call(function)))
  }

  /// A two-way jump whose false path is requested from the strategy.
  pub fn jmp<T: Into<Operand>>(class: InsClass, operation: JmpOperation, dst: Register, operand: T)
    -> Operation
  {
    Operation::branch(class, operation, dst, operand.into(), FalseBranch::Strategy)
  }

  /**
    A guard: a two-way jump whose false path is a single exit (one word) and whose true path
    is left to the strategy. A failing comparison ends the program instead of falling through
    into unrelated instructions.
  */
  pub fn guard<T: Into<Operand>>(class: InsClass, operation: JmpOperation, dst: Register, operand: T)
    -> Operation
  {
    Operation::branch(class, operation, dst, operand.into(), FalseBranch::Guard)
  }

  fn branch(
      class        : InsClass,
      operation    : JmpOperation,
      dst          : Register,
      operand      : Operand,
      false_branch : FalseBranch
    ) -> Operation
  {
    let instruction =
      match class {
        InsClass::Jmp32 => instruction::jmp32(operation, dst, operand, 0),
        _               => instruction::jmp64(operation, dst, operand, 0)
      };
    let branch = Branch::new(instruction, false_branch);
    match operand {
      Operand::Immediate(_) => Operation::ImmJmp(branch),
      Operand::Register(_)  => Operation::RegJmp(branch)
    }
  }

  /// Fixes the false path of a conditional jump. `size` is authoritative for truncation and
  /// displacement.
  pub fn with_false_branch(mut self, operation: Operation, size: u16) -> Operation {
    if !self.is_conditional_branch() {
      warn!(node = %self.instruction(), "only conditional jumps own a false branch; dropping it");
      return self;
    }
    if let Operation::ImmJmp(branch) | Operation::RegJmp(branch) = &mut self {
      branch.false_branch = FalseBranch::Filled { operation: Box::new(operation), size };
    }
    self
  }

  /// Appends `next` at the end of the true-branch chain, dropping it if the chain ends in an exit.
  pub fn then(mut self, next: Operation) -> Operation {
    if let Err(rejected) = self.attach_terminal(next) {
      warn!(node = %rejected.instruction(), "true-branch chain ends in an exit; dropping node");
    }
    self
  }

  /// Closes every open slot of this node (not of its successors).
  pub fn sealed(mut self) -> Operation {
    match &mut self {
      | Operation::Alu(linear)
      | Operation::Call(linear)
      | Operation::Load(linear)
      | Operation::Store(linear) => linear.next.seal(),

      | Operation::ImmJmp(branch)
      | Operation::RegJmp(branch) => {
        branch.true_branch.seal();
        if let FalseBranch::Guard | FalseBranch::Strategy = branch.false_branch {
          branch.false_branch = FalseBranch::Sealed;
        }
      }

      Operation::Exit(_) => {}
    }
    self
  }

  // endregion

  // region Accessors

  /// The node's own instruction, with a jump's offset set to its false-branch size. A size
  /// past `i16::MAX` shows as `i16::MAX`; encoding such a node fails.
  pub fn instruction(&self) -> Instruction {
    match self {
      | Operation::Alu(linear)
      | Operation::Call(linear)
      | Operation::Load(linear)
      | Operation::Store(linear) => linear.instruction,

      | Operation::ImmJmp(branch)
      | Operation::RegJmp(branch) => branch.instruction.with_offset(branch.shown_offset()),

      Operation::Exit(_) => instruction::exit()
    }
  }

  /// Words this node alone encodes to.
  pub fn width(&self) -> u32 {
    match self {
      | Operation::Alu(linear)
      | Operation::Call(linear)
      | Operation::Load(linear)
      | Operation::Store(linear) => linear.instruction.width(),
      _ => 1
    }
  }

  /// The position recorded by the last numbering pass.
  pub fn number(&self) -> u32 {
    self.number_cell().get()
  }

  pub fn is_branch(&self) -> bool {
    matches!(self, Operation::ImmJmp(_) | Operation::RegJmp(_))
  }

  /// A jump that compares, as opposed to `BPF_JA`.
  pub fn is_conditional_branch(&self) -> bool {
    match self.instruction().opcode {
      Opcode::Jmp { operation, .. } => self.is_branch() && operation.is_conditional(),
      _                             => false
    }
  }

  pub fn false_branch_size(&self) -> u16 {
    match self {
      | Operation::ImmJmp(branch)
      | Operation::RegJmp(branch) => branch.false_branch_size(),
      _ => 0
    }
  }

  /// The true successor of a jump, or the single successor of a straight-line node.
  pub fn true_successor(&self) -> Option<&Operation> {
    match self {
      | Operation::Alu(linear)
      | Operation::Call(linear)
      | Operation::Load(linear)
      | Operation::Store(linear) => linear.next.get(),

      | Operation::ImmJmp(branch)
      | Operation::RegJmp(branch) => branch.true_branch.get(),

      Operation::Exit(_) => None
    }
  }

  pub fn false_successor(&self) -> Option<&Operation> {
    match self {
      | Operation::ImmJmp(branch)
      | Operation::RegJmp(branch) => branch.false_branch.get().map(|(operation, _)| operation),
      _ => None
    }
  }

  fn number_cell(&self) -> &Cell<u32> {
    match self {
      | Operation::Alu(linear)
      | Operation::Call(linear)
      | Operation::Load(linear)
      | Operation::Store(linear) => &linear.number,

      | Operation::ImmJmp(branch)
      | Operation::RegJmp(branch) => &branch.number,

      Operation::Exit(exit) => &exit.number
    }
  }

  // endregion
}

impl From<Instruction> for Operation {
  fn from(instruction: Instruction) -> Self {
    Operation::new(instruction)
  }
}

impl TreeNode for Operation {

  fn encode_into(&self, words: &mut Vec<Word>) -> Result<(), EncodingError> {
    match self {
      | Operation::Alu(linear)
      | Operation::Call(linear)
      | Operation::Load(linear)
      | Operation::Store(linear) => {
        encode_instruction(&linear.instruction)?.push_to(words);
        linear.next.encode_into(words)
      }

      | Operation::ImmJmp(branch)
      | Operation::RegJmp(branch) => branch.encode_into(words),

      Operation::Exit(_) => {
        encode_instruction(&instruction::exit())?.push_to(words);
        Ok(())
      }
    }
  }

  fn expand(&mut self, expansion: &mut Expansion<'_>) -> usize {
    match self {
      | Operation::Alu(linear)
      | Operation::Call(linear)
      | Operation::Load(linear)
      | Operation::Store(linear) => linear.next.expand(expansion),

      | Operation::ImmJmp(branch)
      | Operation::RegJmp(branch) => branch.expand(expansion),

      Operation::Exit(_) => 0
    }
  }

  fn assign_sequence_numbers(&self, start: u32) -> u32 {
    match self {
      | Operation::Alu(linear)
      | Operation::Call(linear)
      | Operation::Load(linear)
      | Operation::Store(linear) => linear.assign_sequence_numbers(start),

      | Operation::ImmJmp(branch)
      | Operation::RegJmp(branch) => branch.assign_sequence_numbers(start),

      Operation::Exit(exit) => exit.assign_sequence_numbers(start)
    }
  }

  fn attach_terminal(&mut self, node: Operation) -> Result<(), Operation> {
    match self {
      | Operation::Alu(linear)
      | Operation::Call(linear)
      | Operation::Load(linear)
      | Operation::Store(linear) => linear.next.attach(node),

      | Operation::ImmJmp(branch)
      | Operation::RegJmp(branch) => branch.true_branch.attach(node),

      Operation::Exit(_) => Err(node)
    }
  }

  fn trace_into(&self, lines: &mut Vec<String>) {
    match self {
      | Operation::Alu(linear)
      | Operation::Call(linear)
      | Operation::Load(linear)
      | Operation::Store(linear) => linear.trace_into(lines),

      | Operation::ImmJmp(branch)
      | Operation::RegJmp(branch) => branch.trace_into(lines),

      Operation::Exit(_) => lines.push(instruction::exit().to_string())
    }
  }
}


#[cfg(test)]
mod tests {
  use super::*;
  use crate::ebpf::instruction::{mov64, alu64, st_dw, ld_map_by_fd};
  use crate::ebpf::opcode::AluOperation;
  use crate::register::Register::*;
  use crate::strategy::{GenerationState, GeneratorStrategy, RandomSource};
  use rand::rngs::StdRng;
  use rand::SeedableRng;

  /// Hands out `budget` register moves, then seals everything.
  struct Countdown {
    budget: usize,
  }

  impl GeneratorStrategy for Countdown {
    fn next_operation(&mut self, state: &mut GenerationState<'_>) -> Option<Operation> {
      if self.budget == 0 {
        return None;
      }
      self.budget -= 1;
      let value = state.random().in_range(0, 100) as i32;
      Some(Operation::new(mov64(R1, value)))
    }
  }

  fn expand_with(root: &mut Operation, budget: usize) -> usize {
    let mut strategy = Countdown { budget };
    let mut random = StdRng::seed_from_u64(1);
    let mut expansion = Expansion::new(&mut strategy, &mut random);
    root.expand(&mut expansion)
  }

  #[test]
  fn guard_false_branch_is_one_exit(){
    let mut guard = Operation::guard(InsClass::Jmp, JmpOperation::Jeq, R1, 5);
    let grown = expand_with(&mut guard, 3);

    // The exit plus three strategy nodes on the true path.
    assert_eq!(grown, 4);
    assert_eq!(guard.false_branch_size(), 1);

    let words = guard.encode().unwrap();
    assert_eq!(words.len(), 1 + 1 + 3);
    assert_eq!(words[0], 0x5_0001_0115);
    assert_eq!(words[1], 0x95);
  }

  #[test]
  fn expansion_is_idempotent(){
    let mut root = Operation::new(mov64(R0, 0));
    assert_eq!(expand_with(&mut root, 5), 5);
    let before = root.encode().unwrap();

    assert_eq!(expand_with(&mut root, 5), 0);
    assert_eq!(root.encode().unwrap(), before);
  }

  #[test]
  fn false_branch_is_truncated_to_declared_size(){
    // The false successor is itself a guard that encodes to three words once expanded,
    // but only its first two belong to the outer jump.
    let inner =
      Operation::guard(InsClass::Jmp, JmpOperation::Jgt, R2, 7)
        .then(Operation::exit());
    let mut outer =
      Operation::jmp(InsClass::Jmp, JmpOperation::Jne, R1, R3)
        .with_false_branch(inner, 2)
        .then(Operation::exit());
    expand_with(&mut outer, 0);

    let inner_words = outer.false_successor().unwrap().encode().unwrap();
    assert_eq!(inner_words.len(), 3);

    let words = outer.encode().unwrap();
    assert_eq!(words.len(), 1 + 2 + 1);
    assert_eq!(&words[1..3], &inner_words[..2]);
    // Offset field carries the declared size.
    assert_eq!((words[0] >> 16) & 0xFFFF, 2);
  }

  #[test]
  fn attach_terminal_follows_true_chain(){
    let mut root =
      Operation::new(mov64(R1, 1))
        .then(Operation::guard(InsClass::Jmp, JmpOperation::Jeq, R1, 1))
        .then(Operation::new(alu64(AluOperation::Add, R1, 2)));
    assert!(root.attach_terminal(Operation::exit()).is_ok());

    let rejected = root.attach_terminal(Operation::new(mov64(R2, 2)));
    assert!(rejected.is_err());

    let trace = root.trace();
    assert_eq!(trace.last().map(String::as_str), Some("BPF_EXIT_INSN()"));
  }

  #[test]
  fn with_false_branch_ignored_on_straight_line(){
    let node = Operation::new(st_dw(R10, R1, -8)).with_false_branch(Operation::exit(), 1);
    assert!(node.false_successor().is_none());
    assert_eq!(node.false_branch_size(), 0);
  }

  #[test]
  fn sealed_slots_are_not_expanded(){
    let mut root = Operation::guard(InsClass::Jmp32, JmpOperation::Jlt, R4, 9).sealed();
    assert_eq!(expand_with(&mut root, 10), 0);
    let words = root.encode().unwrap();
    assert_eq!(words.len(), 1);
    // No false successor, no displacement.
    assert_eq!((words[0] >> 16) & 0xffff, 0);
  }

  #[test]
  fn unconditional_jump_has_no_false_path(){
    let mut root = Operation::new(instruction::jmp64(JmpOperation::Ja, R0, 0, 0));
    assert!(root.is_branch());
    assert!(!root.is_conditional_branch());

    // The strategy supplies the true path only.
    assert_eq!(expand_with(&mut root, 2), 2);
    assert!(root.false_successor().is_none());

    let words = root.encode().unwrap();
    assert_eq!(words.len(), 3);
    assert_eq!(words[0], 0x05);

    let root = Operation::new(instruction::jmp64(JmpOperation::Ja, R0, 0, 0))
      .with_false_branch(Operation::exit(), 1);
    assert_eq!(root.false_branch_size(), 0);
  }

  #[test]
  fn wide_nodes_encode_two_words(){
    let root = Operation::new(ld_map_by_fd(R1, 42)).then(Operation::exit());
    assert_eq!(root.width(), 2);
    assert_eq!(root.encode().unwrap(), vec![0x2a00001118, 0, 0x95]);
  }

  #[test]
  fn oversized_false_branch_is_an_encoding_error(){
    let root =
      Operation::jmp(InsClass::Jmp, JmpOperation::Jeq, R1, 0)
        .with_false_branch(Operation::exit(), 40_000);
    assert_eq!(root.encode(), Err(EncodingError::DisplacementOutOfRange(40_000)));

    // Shown saturated rather than wrapped to a backward jump.
    assert_eq!(root.instruction().offset, i16::MAX);
    assert!(root.trace()[0].contains("/*off=*/32767"));
  }
}
