use std::collections::VecDeque;
use std::fmt;

use parking_lot::Mutex;

type EqFn<T> = Box<dyn Fn(&T, &T) -> bool + Send + Sync>;

/// First-in-first-out queue, safe for concurrent use.
///
/// Besides the usual push/pop it can remove an element from anywhere in the
/// queue, matched against a value with the queue's equality function.
/// Removal scans from the front, so it is O(n).
pub struct Fifo<T> {
    items: Mutex<VecDeque<T>>,
    eq: EqFn<T>,
}

impl<T: PartialEq + 'static> Fifo<T> {
    /// Creates a queue that matches elements with `==`.
    pub fn new() -> Self {
        Fifo::with_eq(|a: &T, b: &T| a == b)
    }
}

impl<T: PartialEq + 'static> Default for Fifo<T> {
    fn default() -> Self {
        Fifo::new()
    }
}

impl<T> Fifo<T> {
    /// Creates a queue that matches elements with `eq`, which must be an
    /// equivalence relation over the values stored.
    pub fn with_eq<F>(eq: F) -> Self
    where
        F: Fn(&T, &T) -> bool + Send + Sync + 'static,
    {
        Fifo {
            items: Mutex::new(VecDeque::new()),
            eq: Box::new(eq),
        }
    }

    pub fn push(&self, value: T) {
        self.items.lock().push_back(value);
    }

    pub fn pop(&self) -> Option<T> {
        self.items.lock().pop_front()
    }

    /// Returns a copy of the front element without removing it.
    pub fn peek(&self) -> Option<T>
    where
        T: Clone,
    {
        self.items.lock().front().cloned()
    }

    /// Removes the first element equal to `value`. Returns false if there is none.
    pub fn remove(&self, value: &T) -> bool {
        let mut items = self.items.lock();
        match items.iter().position(|item| (self.eq)(item, value)) {
            Some(idx) => items.remove(idx).is_some(),
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }
}

impl<T: fmt::Debug> fmt::Debug for Fifo<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_list().entries(self.items.lock().iter()).finish()
    }
}
