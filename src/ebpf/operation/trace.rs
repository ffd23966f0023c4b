//! Reproduction text. Unlike encoding, the trace of a jump includes its whole false subtree:
//! it is diagnostic output and not sized to the flattened program.

use super::{Branch, Linear, TreeNode};

impl Linear {
  pub(super) fn trace_into(&self, lines: &mut Vec<String>) {
    lines.push(self.instruction.to_string());
    if let Some(next) = self.next.get() {
      next.trace_into(lines);
    }
  }
}

impl Branch {
  pub(super) fn trace_into(&self, lines: &mut Vec<String>) {
    let shown = self.instruction.with_offset(self.shown_offset());
    lines.push(shown.to_string());

    if let Some((operation, _)) = self.false_branch.get() {
      operation.trace_into(lines);
    }
    if let Some(next) = self.true_branch.get() {
      next.trace_into(lines);
    }
  }
}
