use super::operation::Operation;

/// Visits every node of a tree in layout order: a node, then its whole false subtree, then its
/// true subtree.
#[derive(Debug)]
pub struct OperationIter<'a> {
  pending: Vec<&'a Operation>, // A stack of nodes yet to be visited.
}

impl<'a> OperationIter<'a> {
  pub fn new(start: &'a Operation) -> OperationIter<'a> {
    OperationIter {
      pending: vec![start]
    }
  }
}

impl<'a> Iterator for OperationIter<'a> {
  type Item = &'a Operation;

  fn next(&mut self) -> Option<Self::Item> {
    let current = self.pending.pop()?;
    // Pushed in reverse so the false subtree is visited first.
    if let Some(next) = current.true_successor() {
      self.pending.push(next);
    }
    if let Some(next) = current.false_successor() {
      self.pending.push(next);
    }
    Some(current)
  }
}
