//! Program-counter numbering of a tree. Only the per-node `Cell` is written, so the pass runs on
//! a frozen tree and gives identical results every time.

use super::{Branch, Exit, Linear, TreeNode};

impl Linear {
  pub(super) fn assign_sequence_numbers(&self, start: u32) -> u32 {
    self.number.set(start);
    let width = self.instruction.width();
    match self.next.get() {
      Some(next) => width + next.assign_sequence_numbers(start + width),
      None       => width
    }
  }
}

impl Branch {
  /**
    The false subtree is numbered for information only: its total is discarded and the counter
    advances by the declared false-branch size, which stays authoritative for the layout.
  */
  pub(super) fn assign_sequence_numbers(&self, start: u32) -> u32 {
    self.number.set(start);

    if let Some((operation, _)) = self.false_branch.get() {
      operation.assign_sequence_numbers(start + 1);
    }

    let size = self.false_branch_size() as u32;
    let counter = start + 1 + size;

    match self.true_branch.get() {
      Some(next) => 1 + size + next.assign_sequence_numbers(counter),
      None       => 1 + size
    }
  }
}

impl Exit {
  pub(super) fn assign_sequence_numbers(&self, start: u32) -> u32 {
    self.number.set(start);
    1
  }
}


#[cfg(test)]
mod tests {
  use crate::ebpf::instruction::{ld_map_by_fd, mov64};
  use crate::ebpf::opcode::{InsClass, JmpOperation};
  use crate::ebpf::operation::{Operation, TreeNode};
  use crate::register::Register::*;

  fn guarded_program() -> Operation {
    let guard =
      Operation::guard(InsClass::Jmp, JmpOperation::Jeq, R1, 0)
        .with_false_branch(Operation::exit(), 1)
        .then(Operation::new(mov64(R0, 1)))
        .then(Operation::exit());
    Operation::new(mov64(R1, 3)).then(guard)
  }

  #[test]
  fn numbers_follow_layout(){
    let root = guarded_program();
    let total = root.assign_sequence_numbers(0);
    assert_eq!(total, 5);

    let guard = root.true_successor().unwrap();
    assert_eq!(root.number(), 0);
    assert_eq!(guard.number(), 1);
    assert_eq!(guard.false_successor().unwrap().number(), 2);

    let mov = guard.true_successor().unwrap();
    assert_eq!(mov.number(), 3);
    assert_eq!(mov.true_successor().unwrap().number(), 4);
  }

  #[test]
  fn numbering_from_an_offset(){
    let root = guarded_program();
    assert_eq!(root.assign_sequence_numbers(10), 5);
    assert_eq!(root.number(), 10);
    assert_eq!(root.true_successor().unwrap().number(), 11);
  }

  #[test]
  fn wide_nodes_advance_by_two(){
    let root = Operation::new(ld_map_by_fd(R1, 7)).then(Operation::exit());
    assert_eq!(root.assign_sequence_numbers(0), 3);
    assert_eq!(root.true_successor().unwrap().number(), 2);
    assert_eq!(root.encode().unwrap().len(), 3);
  }

  #[test]
  fn renumbering_is_stable(){
    let root = guarded_program();
    let first = root.assign_sequence_numbers(0);
    let exit_number = root.true_successor().unwrap().false_successor().unwrap().number();
    assert_eq!(root.assign_sequence_numbers(0), first);
    assert_eq!(root.true_successor().unwrap().false_successor().unwrap().number(), exit_number);
  }
}
