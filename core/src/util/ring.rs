use std::collections::VecDeque;

/// Append-only sequence that evicts the oldest entry once `capacity` is
/// exceeded, so an always-growing record (a position's hedge history) never
/// makes the persisted JSON document grow without bound.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct BoundedHistory<T> {
  capacity: usize,
  items: VecDeque<T>,
}

impl<T> BoundedHistory<T> {
  pub fn new(capacity: usize) -> Self {
    Self {
      capacity: capacity.max(1),
      items: VecDeque::with_capacity(capacity.min(256)),
    }
  }

  pub fn push(&mut self, item: T) {
    if self.items.len() >= self.capacity {
      self.items.pop_front();
    }
    self.items.push_back(item);
  }

  pub fn len(&self) -> usize {
    self.items.len()
  }

  pub fn is_empty(&self) -> bool {
    self.items.is_empty()
  }

  pub fn iter(&self) -> impl Iterator<Item = &T> {
    self.items.iter()
  }

  pub fn last(&self) -> Option<&T> {
    self.items.back()
  }
}

impl<T> Default for BoundedHistory<T> {
  fn default() -> Self {
    Self::new(200)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn evicts_oldest_past_capacity() {
    let mut h: BoundedHistory<u32> = BoundedHistory::new(3);
    h.push(1);
    h.push(2);
    h.push(3);
    h.push(4);
    let items: Vec<u32> = h.iter().copied().collect();
    assert_eq!(items, vec![2, 3, 4]);
  }
}
