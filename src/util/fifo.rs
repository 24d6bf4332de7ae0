//! FIFO implemented using VecDeque
use serde::{Deserialize, Serialize};
use std::collections::vec_deque::{IntoIter, Iter};
use std::collections::VecDeque;

/// First-in-first-out queue for cost-basis lots.
///
/// Disposals walk the queue from the front: whole lots are removed with
/// [`pop_front`], and a lot straddled by a disposal is decremented in place
/// through [`front_mut`].
///
/// [`pop_front`]: Fifo::pop_front
/// [`front_mut`]: Fifo::front_mut
#[derive(Clone, Debug, Deserialize, Serialize, Eq, PartialEq)]
pub struct Fifo<A> {
    deq: VecDeque<A>,
}

impl<A> Default for Fifo<A> {
    fn default() -> Self {
        Self {
            deq: VecDeque::new(),
        }
    }
}

impl<A> Fifo<A> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_back(&mut self, e: A) {
        self.deq.push_back(e);
    }

    pub fn pop_front(&mut self) -> Option<A> {
        self.deq.pop_front()
    }

    pub fn front(&self) -> Option<&A> {
        self.deq.front()
    }

    pub fn front_mut(&mut self) -> Option<&mut A> {
        self.deq.front_mut()
    }

    pub fn iter(&self) -> Iter<'_, A> {
        self.deq.iter()
    }

    pub fn len(&self) -> usize {
        self.deq.len()
    }

    pub fn is_empty(&self) -> bool {
        self.deq.is_empty()
    }
}

impl<A> FromIterator<A> for Fifo<A> {
    fn from_iter<T: IntoIterator<Item = A>>(iter: T) -> Self {
        Self {
            deq: VecDeque::from_iter(iter),
        }
    }
}

impl<A> IntoIterator for Fifo<A> {
    type Item = A;
    type IntoIter = IntoIter<Self::Item>;

    fn into_iter(self) -> Self::IntoIter {
        self.deq.into_iter()
    }
}

impl<A> Extend<A> for Fifo<A> {
    fn extend<T: IntoIterator<Item = A>>(&mut self, iter: T) {
        self.deq.extend(iter);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn consumes_in_insertion_order() {
        let mut fifo = Fifo::new();
        fifo.push_back(1);
        fifo.push_back(2);
        fifo.push_back(3);

        assert_eq!(fifo.pop_front(), Some(1));
        assert_eq!(fifo.pop_front(), Some(2));
        assert_eq!(fifo.pop_front(), Some(3));
        assert_eq!(fifo.pop_front(), None);
    }

    #[test]
    fn front_mut_decrements_in_place() {
        let mut fifo: Fifo<i32> = [10, 20].into_iter().collect();

        *fifo.front_mut().unwrap() -= 4;
        assert_eq!(fifo.front(), Some(&6));
        assert_eq!(fifo.len(), 2);
    }
}
