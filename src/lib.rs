/*!
  Randomized kernel packet-filter programs.

  A program for the extended ISA is grown as a tree of `ebpf::Operation` nodes by a
  `strategy::GeneratorStrategy`, frozen into a `program::Program`, and flattened into the exact
  word sequence the kernel loader accepts. The word-oriented ISA gets the same bit-exact
  encoders over flat instruction lists.
*/

#[macro_use] extern crate prettytable;
#[macro_use] extern crate lazy_static;

pub mod cbpf;
pub mod ebpf;
pub mod error;
pub mod listing;
pub mod program;
pub mod register;
pub mod strategy;

mod display;

pub use error::{BuildError, EncodingError, ListingError};
pub use program::{Program, ProgramBuilder};
pub use strategy::{GenerationState, GeneratorStrategy, RandomSource};
