//! Lock-free intrusive stack, the building block for the wait-list buckets.

use std::ptr;
use std::sync::atomic::{AtomicPtr, Ordering};

struct Node<T> {
    value: T,
    next: *mut Node<T>,
}

/// A lock-free LIFO supporting concurrent `push` and an atomic
/// "steal the entire list" operation.
///
/// Nodes are single-use: allocated on push, freed when the stolen chain is
/// drained. Consumers only ever detach the whole list, so there is no
/// pop-one path and no ABA hazard from node reuse.
pub struct AtomicStack<T> {
    head: AtomicPtr<Node<T>>,
}

unsafe impl<T: Send> Send for AtomicStack<T> {}
unsafe impl<T: Send> Sync for AtomicStack<T> {}

impl<T> AtomicStack<T> {
    pub const fn new() -> Self {
        AtomicStack {
            head: AtomicPtr::new(ptr::null_mut()),
        }
    }

    /// Pushes a value. Safe to call from any number of threads, concurrently
    /// with other pushes and with `steal_all`.
    pub fn push(&self, value: T) {
        let node = Box::into_raw(Box::new(Node {
            value,
            next: ptr::null_mut(),
        }));

        let mut current = self.head.load(Ordering::Relaxed);
        loop {
            // Link node -> current head, then CAS head -> node.
            unsafe { (*node).next = current };
            match self.head.compare_exchange_weak(
                current,
                node,
                Ordering::Release,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(observed) => current = observed,
            }
        }
    }

    /// Atomically detaches the entire list, leaving the stack empty.
    /// The returned chain yields values in LIFO order.
    pub fn steal_all(&self) -> StolenChain<T> {
        let head = self.head.swap(ptr::null_mut(), Ordering::Acquire);
        StolenChain { next: head }
    }

    pub fn is_empty(&self) -> bool {
        self.head.load(Ordering::Acquire).is_null()
    }
}

impl<T> Default for AtomicStack<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Drop for AtomicStack<T> {
    fn drop(&mut self) {
        drop(self.steal_all());
    }
}

/// An exclusively owned chain of nodes detached from an [`AtomicStack`].
pub struct StolenChain<T> {
    next: *mut Node<T>,
}

unsafe impl<T: Send> Send for StolenChain<T> {}

impl<T> Iterator for StolenChain<T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        if self.next.is_null() {
            return None;
        }
        // SAFETY: the chain was detached by `steal_all`, so this iterator has
        // exclusive ownership of every node in it.
        let node = unsafe { Box::from_raw(self.next) };
        self.next = node.next;
        Some(node.value)
    }
}

impl<T> Drop for StolenChain<T> {
    fn drop(&mut self) {
        for _ in self.by_ref() {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn steal_yields_lifo_order() {
        let stack = AtomicStack::new();
        stack.push('a');
        stack.push('b');
        stack.push('c');

        let stolen: Vec<char> = stack.steal_all().collect();
        assert_eq!(stolen, vec!['c', 'b', 'a']);
        assert!(stack.is_empty());
    }

    #[test]
    fn steal_from_empty_stack() {
        let stack: AtomicStack<u32> = AtomicStack::new();
        assert_eq!(stack.steal_all().count(), 0);
    }

    #[test]
    fn push_after_steal_starts_fresh() {
        let stack = AtomicStack::new();
        stack.push(1);
        drop(stack.steal_all());
        stack.push(2);
        assert_eq!(stack.steal_all().collect::<Vec<_>>(), vec![2]);
    }

    #[test]
    fn concurrent_pushes_are_all_observed() {
        let stack = Arc::new(AtomicStack::new());
        let threads = 4;
        let per_thread = 1000;

        let handles: Vec<_> = (0..threads)
            .map(|t| {
                let stack = Arc::clone(&stack);
                thread::spawn(move || {
                    for i in 0..per_thread {
                        stack.push(t * per_thread + i);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let mut stolen: Vec<usize> = stack.steal_all().collect();
        stolen.sort_unstable();
        assert_eq!(stolen.len(), threads * per_thread);
        assert_eq!(stolen, (0..threads * per_thread).collect::<Vec<_>>());
    }

    #[test]
    fn dropping_an_undrained_chain_frees_nodes() {
        let stack = AtomicStack::new();
        for i in 0..16 {
            stack.push(Box::new(i));
        }
        let mut chain = stack.steal_all();
        let _first = chain.next();
        // Remaining nodes are freed by the chain's Drop.
    }
}
