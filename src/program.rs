/*!
  Building a program tree and freezing it.

  A `ProgramBuilder` owns the root slot, the strategy and the random source. It drives
  expansion passes until one adds nothing; when to stop is entirely up to the strategy.
  `finalize` consumes the builder and yields a `Program`, which only offers read-only
  traversals: encoding, numbering, tracing and iteration.
*/

use tracing::debug;

use crate::ebpf::{Operation, OperationIter, Successor, TreeNode, Word};
use crate::error::{BuildError, EncodingError};
use crate::listing::format_listing;
use crate::strategy::{Expansion, GeneratorStrategy, RandomSource};

pub struct ProgramBuilder<S, R>
  where S: GeneratorStrategy,
        R: RandomSource
{
  strategy  : S,
  random    : R,
  root      : Successor,
  generated : usize, // Nodes produced by the strategy across all passes.
  passes    : usize,
}

impl<S, R> ProgramBuilder<S, R>
  where S: GeneratorStrategy,
        R: RandomSource
{

  /// A builder whose root is asked of the strategy on the first pass.
  pub fn new(strategy: S, random: R) -> ProgramBuilder<S, R> {
    ProgramBuilder {
      strategy,
      random,
      root      : Successor::Open,
      generated : 0,
      passes    : 0
    }
  }

  /// A builder over a partially pre-built tree. Populated slots are kept as they are.
  pub fn with_root(strategy: S, random: R, root: Operation) -> ProgramBuilder<S, R> {
    ProgramBuilder {
      root: Successor::Filled(Box::new(root)),
      ..ProgramBuilder::new(strategy, random)
    }
  }

  /// Runs one expansion pass and returns the number of nodes it added.
  pub fn expand(&mut self) -> usize {
    let mut expansion = Expansion::resume(&mut self.strategy, &mut self.random, self.generated);
    let grown = self.root.expand(&mut expansion);
    self.generated = expansion.generated();
    self.passes += 1;

    debug!(pass = self.passes, grown, generated = self.generated, "expansion pass");
    grown
  }

  /// Expands until a pass adds nothing. Returns the total number of nodes added.
  pub fn build(&mut self) -> usize {
    let mut total = 0;
    loop {
      match self.expand() {
        0     => break,
        grown => total += grown
      }
    }
    total
  }

  /// Splices `node` onto the end of the root's true-branch chain. Hands it back when that chain
  /// already ends in an exit.
  pub fn attach_terminal(&mut self, node: Operation) -> Result<(), Operation> {
    self.root.attach(node)
  }

  pub fn root(&self) -> Option<&Operation> {
    self.root.get()
  }

  pub fn generated(&self) -> usize {
    self.generated
  }

  pub fn finalize(self) -> Result<Program, BuildError> {
    match self.root {
      Successor::Filled(root) => {
        debug!(generated = self.generated, passes = self.passes, "program finalized");
        Ok(Program { root: *root })
      }
      _ => Err(BuildError::EmptyProgram)
    }
  }
}

/// A finished program tree. Nothing can be added to it.
#[derive(Debug)]
pub struct Program {
  root: Operation,
}

impl Program {

  pub fn root(&self) -> &Operation {
    &self.root
  }

  /// The flattened word sequence handed to the loader.
  pub fn encode(&self) -> Result<Vec<Word>, EncodingError> {
    let words = self.root.encode()?;
    debug!(words = words.len(), "program encoded");
    Ok(words)
  }

  /// Numbers every node from `start` and returns the program's length in words.
  pub fn assign_sequence_numbers(&self, start: u32) -> u32 {
    self.root.assign_sequence_numbers(start)
  }

  pub fn trace(&self) -> Vec<String> {
    self.root.trace()
  }

  pub fn iter(&self) -> OperationIter<'_> {
    OperationIter::new(&self.root)
  }

  /// The numbers recorded by the last numbering pass, in layout order.
  pub fn sequence_numbers(&self) -> Vec<u32> {
    self.iter().map(Operation::number).collect()
  }

  /// The encoded program as `[index]: hex` lines.
  pub fn listing(&self) -> Result<String, EncodingError> {
    Ok(format_listing(&self.encode()?))
  }
}

impl<'a> IntoIterator for &'a Program {
  type Item     = &'a Operation;
  type IntoIter = OperationIter<'a>;

  fn into_iter(self) -> Self::IntoIter {
    self.iter()
  }
}


#[cfg(test)]
mod tests {
  use super::*;
  use crate::ebpf::{alu64, mov64, AluOperation, InsClass, JmpOperation};
  use crate::register::Register::{self, *};
  use crate::strategy::GenerationState;
  use rand::rngs::StdRng;
  use rand::SeedableRng;

  /// Alternates guards and additions until the budget is spent.
  struct Alternating {
    budget: usize,
  }

  impl GeneratorStrategy for Alternating {
    fn next_operation(&mut self, state: &mut GenerationState<'_>) -> Option<Operation> {
      if state.generated() >= self.budget {
        return None;
      }
      let register = Register::R1;
      let value = state.random().in_range(0, 16) as i32;
      match state.generated() % 2 {
        0 => Some(Operation::guard(InsClass::Jmp, JmpOperation::Jne, register, value)),
        _ => Some(Operation::new(alu64(AluOperation::Add, register, value)))
      }
    }
  }

  struct Nothing;

  impl GeneratorStrategy for Nothing {
    fn next_operation(&mut self, _state: &mut GenerationState<'_>) -> Option<Operation> {
      None
    }
  }

  fn builder(budget: usize) -> ProgramBuilder<Alternating, StdRng> {
    ProgramBuilder::new(Alternating { budget }, StdRng::seed_from_u64(3))
  }

  #[test]
  fn build_stops_when_strategy_does(){
    let mut builder = builder(6);
    // Six strategy nodes plus an exit under each of the three guards.
    assert_eq!(builder.build(), 9);
    assert_eq!(builder.generated(), 6);
    assert_eq!(builder.expand(), 0);

    let program = builder.finalize().unwrap();
    assert_eq!(program.encode().unwrap().len(), 9);
    assert_eq!(program.assign_sequence_numbers(0), 9);
  }

  #[test]
  fn terminal_exit_closes_the_chain(){
    let mut builder = builder(4);
    builder.build();
    assert!(builder.attach_terminal(Operation::exit()).is_ok());
    assert!(builder.attach_terminal(Operation::exit()).is_err());

    let program = builder.finalize().unwrap();
    let words = program.encode().unwrap();
    assert_eq!(words.last(), Some(&0x95));
  }

  #[test]
  fn prebuilt_slots_are_kept(){
    let root = Operation::new(mov64(R0, 0)).then(Operation::exit());
    let mut builder = ProgramBuilder::with_root(Alternating { budget: 10 }, StdRng::seed_from_u64(3), root);
    assert_eq!(builder.build(), 0);
    assert_eq!(builder.finalize().unwrap().encode().unwrap(), vec![0xb7, 0x95]);
  }

  #[test]
  fn empty_program(){
    let mut builder = ProgramBuilder::new(Nothing, StdRng::seed_from_u64(0));
    assert_eq!(builder.build(), 0);
    assert!(builder.root().is_none());
    assert_eq!(builder.finalize().err(), Some(BuildError::EmptyProgram));
  }

  #[test]
  fn sequence_numbers_follow_iteration_order(){
    let mut builder = builder(4);
    builder.build();
    let program = builder.finalize().unwrap();
    program.assign_sequence_numbers(0);

    // guard, exit, add, guard, exit, add
    assert_eq!(program.sequence_numbers(), vec![0, 1, 2, 3, 4, 5]);
    assert_eq!(program.iter().count(), 6);
  }
}
