/*!
  The seams between the program tree and whatever decides what goes into it.

  A `GeneratorStrategy` is asked for "the next instruction" whenever expansion reaches an open
  successor slot, and for a false branch (with its exact encoded size) whenever a branch asks
  the strategy to fill its not-taken path. The strategy owns every termination decision:
  returning `None` seals the slot.

  A `RandomSource` supplies operands. Any `rand::RngCore` is one.
*/

use rand::{Rng, RngCore};
#[cfg(feature = "trace_generation")]
use tracing::trace;

use crate::ebpf::Operation;

pub trait RandomSource {
  /// A value in `low..high`, or `low` when the range is empty.
  fn in_range(&mut self, low: i64, high: i64) -> i64;

  /// True with probability `1/n`.
  fn one_in(&mut self, n: u32) -> bool {
    n <= 1 || self.in_range(0, n as i64) == 0
  }
}

impl<R: RngCore> RandomSource for R {
  fn in_range(&mut self, low: i64, high: i64) -> i64 {
    match low < high {
      true  => self.gen_range(low..high),
      false => low
    }
  }
}

/// What a strategy can see while it is being consulted.
pub struct GenerationState<'a> {
  random    : &'a mut dyn RandomSource,
  generated : usize,
  depth     : usize,
}

impl<'a> GenerationState<'a> {
  pub fn random(&mut self) -> &mut dyn RandomSource {
    &mut *self.random
  }

  /// Nodes the strategy has produced so far in this build.
  pub fn generated(&self) -> usize {
    self.generated
  }

  /// Number of ancestors of the slot being filled.
  pub fn depth(&self) -> usize {
    self.depth
  }
}

pub trait GeneratorStrategy {
  /// The operation for an open successor slot, or `None` to seal the slot.
  fn next_operation(&mut self, state: &mut GenerationState<'_>) -> Option<Operation>;

  /**
    The not-taken path of a branch whose false slot defers to the strategy, together with the
    number of words that path contributes. The size must equal the length of the first words
    the returned subtree encodes to; nothing downstream re-derives it.
  */
  fn false_branch(&mut self, state: &mut GenerationState<'_>) -> Option<(Operation, u16)> {
    let _ = state;
    None
  }
}

impl<S: GeneratorStrategy + ?Sized> GeneratorStrategy for &mut S {
  fn next_operation(&mut self, state: &mut GenerationState<'_>) -> Option<Operation> {
    (**self).next_operation(state)
  }

  fn false_branch(&mut self, state: &mut GenerationState<'_>) -> Option<(Operation, u16)> {
    (**self).false_branch(state)
  }
}

impl<S: GeneratorStrategy + ?Sized> GeneratorStrategy for Box<S> {
  fn next_operation(&mut self, state: &mut GenerationState<'_>) -> Option<Operation> {
    (**self).next_operation(state)
  }

  fn false_branch(&mut self, state: &mut GenerationState<'_>) -> Option<(Operation, u16)> {
    (**self).false_branch(state)
  }
}

/// One expansion pass: the strategy, the random source, and the walk's bookkeeping.
pub struct Expansion<'a> {
  strategy  : &'a mut dyn GeneratorStrategy,
  random    : &'a mut dyn RandomSource,
  generated : usize,
  depth     : usize,
}

impl<'a> Expansion<'a> {

  pub fn new(strategy: &'a mut dyn GeneratorStrategy, random: &'a mut dyn RandomSource) -> Expansion<'a> {
    Expansion {
      strategy,
      random,
      generated : 0,
      depth     : 0
    }
  }

  /// Continues counting from an earlier pass.
  pub fn resume(
      strategy  : &'a mut dyn GeneratorStrategy,
      random    : &'a mut dyn RandomSource,
      generated : usize
    ) -> Expansion<'a>
  {
    Expansion { generated, ..Expansion::new(strategy, random) }
  }

  pub fn generated(&self) -> usize {
    self.generated
  }

  pub(crate) fn next_operation(&mut self) -> Option<Operation> {
    let mut state = GenerationState {
      random    : &mut *self.random,
      generated : self.generated,
      depth     : self.depth
    };
    let next = self.strategy.next_operation(&mut state);
    if let Some(_operation) = &next {
      self.generated += 1;
      #[cfg(feature = "trace_generation")]
      trace!(depth = self.depth, node = %_operation.instruction(), "generated operation");
    }
    next
  }

  pub(crate) fn false_branch(&mut self) -> Option<(Operation, u16)> {
    let mut state = GenerationState {
      random    : &mut *self.random,
      generated : self.generated,
      depth     : self.depth
    };
    let branch = self.strategy.false_branch(&mut state);
    if let Some((_operation, _size)) = &branch {
      self.generated += 1;
      #[cfg(feature = "trace_generation")]
      trace!(depth = self.depth, size = *_size, node = %_operation.instruction(), "generated false branch");
    }
    branch
  }

  /// Runs `f` one level further down the tree.
  pub(crate) fn deeper<F>(&mut self, f: F) -> usize
    where F: FnOnce(&mut Expansion<'a>) -> usize
  {
    self.depth += 1;
    let grown = f(self);
    self.depth -= 1;
    grown
  }
}
