/*!
  Grows one random extended-ISA program and prints it.

      bpftree [seed] [budget]

  `RUST_LOG=bpftree=trace` shows every node as it is generated.
*/

use std::convert::TryFrom;
use std::env;
use std::error::Error;

use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use bpftree::ebpf::{
  alu64, ld_dw, ld_map_by_fd, mov64, st_dw, AluOperation, HelperFunction, InsClass, JmpOperation,
  Operation
};
use bpftree::register::Register;
use bpftree::{GenerationState, GeneratorStrategy, ProgramBuilder, RandomSource};

const DEFAULT_SEED   : u64   = 0x5eed;
const DEFAULT_BUDGET : usize = 12;

const ALU_OPERATIONS: [AluOperation; 6] = [
  AluOperation::Add, AluOperation::Sub, AluOperation::Mul,
  AluOperation::Or,  AluOperation::And, AluOperation::Xor,
];

const JMP_OPERATIONS: [JmpOperation; 5] = [
  JmpOperation::Jeq, JmpOperation::Jne, JmpOperation::Jgt, JmpOperation::Jge, JmpOperation::Jset,
];

/// Spends a fixed budget of nodes. Initializes `R0`, then mixes arithmetic, stack traffic,
/// helper calls and guards over the first few registers.
struct Budgeted {
  budget: usize,
}

impl Budgeted {
  fn register(random: &mut dyn RandomSource) -> Register {
    Register::try_from(random.in_range(0, 6) as u8).unwrap_or(Register::R0)
  }

  fn pick<T: Copy>(random: &mut dyn RandomSource, choices: &[T]) -> T {
    choices[random.in_range(0, choices.len() as i64) as usize]
  }
}

impl GeneratorStrategy for Budgeted {
  fn next_operation(&mut self, state: &mut GenerationState<'_>) -> Option<Operation> {
    if state.generated() >= self.budget {
      return None;
    }
    if state.generated() == 0 {
      return Some(Operation::new(mov64(Register::R0, 0)));
    }

    let random = state.random();
    let dst = Budgeted::register(random);
    let value = random.in_range(-256, 256) as i32;

    let operation =
      match random.in_range(0, 8) {
        0 | 1 => {
          let class = Budgeted::pick(random, &[InsClass::Jmp, InsClass::Jmp32]);
          Operation::guard(class, Budgeted::pick(random, &JMP_OPERATIONS), dst, value)
        }
        2 => {
          let src = Budgeted::register(random);
          Operation::jmp(InsClass::Jmp, Budgeted::pick(random, &JMP_OPERATIONS), dst, src)
        }
        3 => Operation::new(st_dw(Register::R10, dst, -8 * random.in_range(1, 8) as i16)),
        4 => Operation::new(ld_dw(dst, Register::R10, -8)),
        5 => Operation::call(HelperFunction::KtimeGetNs.into()),
        6 if random.one_in(3) => Operation::new(ld_map_by_fd(Register::R1, random.in_range(3, 64))),
        _ => Operation::new(alu64(Budgeted::pick(random, &ALU_OPERATIONS), dst, value))
      };

    Some(operation)
  }

  // A register comparison that fails falls into `r0 = imm; exit`.
  fn false_branch(&mut self, state: &mut GenerationState<'_>) -> Option<(Operation, u16)> {
    let value = state.random().in_range(0, 2) as i32;
    Some((Operation::new(mov64(Register::R0, value)).then(Operation::exit()), 2))
  }
}

fn parse_arguments() -> Result<(u64, usize), Box<dyn Error>> {
  let mut arguments = env::args().skip(1);
  let seed = match arguments.next() {
    Some(text) => text.parse::<u64>()?,
    None       => DEFAULT_SEED
  };
  let budget = match arguments.next() {
    Some(text) => text.parse::<usize>()?,
    None       => DEFAULT_BUDGET
  };
  Ok((seed, budget))
}

fn run() -> Result<(), Box<dyn Error>> {
  let (seed, budget) = parse_arguments()?;
  info!(seed, budget, "generating program");

  #[cfg(feature = "trace_generation")]
  println!("Generation Tracing ENABLED");

  let mut builder = ProgramBuilder::new(Budgeted { budget }, StdRng::seed_from_u64(seed));
  builder.build();
  // Every path must end in an exit.
  if builder.attach_terminal(Operation::exit()).is_err() {
    info!("program already ends in an exit");
  }
  let program = builder.finalize()?;

  let length = program.assign_sequence_numbers(0);
  println!("{} words\n{}", length, program);
  println!("Listing:\n{}", program.listing()?);
  println!("Trace:");
  for line in program.trace() {
    println!("  {}", line);
  }

  Ok(())
}

fn main() {
  // RUST_LOG controls the level; warnings only when it is unset.
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(std::io::stderr)
    .with_target(false)
    .init();

  if let Err(e) = run() {
    error!("{}", e);
    std::process::exit(1);
  }
}
