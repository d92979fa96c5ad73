use crate::error::QueueError;

use std::collections::HashMap;
use std::hash::Hash;

/// Anything that can sit in a [`MutablePriorityQueue`]. The priority is always
/// read from the payload, never cached by the queue.
pub trait Prioritized {
    type Priority: Ord + Copy;

    fn priority(&self) -> Self::Priority;
}

#[derive(Debug, Clone)]
struct QueueNode<K, P> {
    key: K,
    payload: P,
    // Insertion order, used to break priority ties.
    seq: u64,
}

/// Binary min-heap addressed by an external key.
///
/// Payloads are owned by the queue and can only be mutated through
/// [`MutablePriorityQueue::update`], which restores heap order before
/// returning. Equal priorities pop in insertion order.
#[derive(Debug, Clone)]
pub struct MutablePriorityQueue<K, P> {
    heap: Vec<QueueNode<K, P>>,
    index: HashMap<K, usize>,
    next_seq: u64,
}

impl<K, P> Default for MutablePriorityQueue<K, P>
where
    K: Eq + Hash + Clone,
    P: Prioritized,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, P> MutablePriorityQueue<K, P>
where
    K: Eq + Hash + Clone,
    P: Prioritized,
{
    pub fn new() -> Self {
        MutablePriorityQueue {
            heap: Vec::new(),
            index: HashMap::new(),
            next_seq: 0,
        }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        MutablePriorityQueue {
            heap: Vec::with_capacity(capacity),
            index: HashMap::with_capacity(capacity),
            next_seq: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn contains(&self, key: &K) -> bool {
        self.index.contains_key(key)
    }

    pub fn get(&self, key: &K) -> Option<&P> {
        self.index.get(key).map(|&pos| &self.heap[pos].payload)
    }

    pub fn insert(&mut self, key: K, payload: P) -> Result<(), QueueError> {
        if self.index.contains_key(&key) {
            return Err(QueueError::DuplicateKey);
        }

        let pos = self.heap.len();
        self.index.insert(key.clone(), pos);
        self.heap.push(QueueNode {
            key,
            payload,
            seq: self.next_seq,
        });
        self.next_seq += 1;
        self.sift_up(pos);
        Ok(())
    }

    /// Mutates the payload stored under `key` and re-heapifies around it.
    ///
    /// The new priority may be lower or higher than the old one.
    pub fn update<F>(&mut self, key: &K, f: F) -> Result<(), QueueError>
    where
        F: FnOnce(&mut P),
    {
        let pos = *self.index.get(key).ok_or(QueueError::MissingKey)?;
        f(&mut self.heap[pos].payload);
        let pos = self.sift_up(pos);
        self.sift_down(pos);
        Ok(())
    }

    pub fn peek_min(&self) -> Result<(&K, &P), QueueError> {
        self.heap
            .first()
            .map(|node| (&node.key, &node.payload))
            .ok_or(QueueError::Empty)
    }

    pub fn pop_min(&mut self) -> Result<(K, P), QueueError> {
        if self.heap.is_empty() {
            return Err(QueueError::Empty);
        }
        let node = self.remove_at(0);
        Ok((node.key, node.payload))
    }

    pub fn remove(&mut self, key: &K) -> Option<P> {
        let pos = *self.index.get(key)?;
        Some(self.remove_at(pos).payload)
    }

    pub fn clear(&mut self) {
        self.heap.clear();
        self.index.clear();
    }

    fn remove_at(&mut self, pos: usize) -> QueueNode<K, P> {
        let last = self.heap.len() - 1;
        self.swap(pos, last);
        let Some(node) = self.heap.pop() else {
            unreachable!("remove_at called on an empty heap");
        };
        self.index.remove(&node.key);

        if pos < self.heap.len() {
            let pos = self.sift_up(pos);
            self.sift_down(pos);
        }
        node
    }

    // Strict "a before b", including the insertion order tie-break.
    fn precedes(&self, a: usize, b: usize) -> bool {
        let (a, b) = (&self.heap[a], &self.heap[b]);
        (a.payload.priority(), a.seq) < (b.payload.priority(), b.seq)
    }

    fn swap(&mut self, a: usize, b: usize) {
        if a == b {
            return;
        }
        self.heap.swap(a, b);
        self.index.insert(self.heap[a].key.clone(), a);
        self.index.insert(self.heap[b].key.clone(), b);
    }

    fn sift_up(&mut self, mut pos: usize) -> usize {
        while pos > 0 {
            let parent = (pos - 1) / 2;
            if !self.precedes(pos, parent) {
                break;
            }
            self.swap(pos, parent);
            pos = parent;
        }
        pos
    }

    fn sift_down(&mut self, mut pos: usize) -> usize {
        let len = self.heap.len();
        loop {
            let left = 2 * pos + 1;
            let right = left + 1;
            let mut smallest = pos;

            if left < len && self.precedes(left, smallest) {
                smallest = left;
            }
            if right < len && self.precedes(right, smallest) {
                smallest = right;
            }
            if smallest == pos {
                return pos;
            }
            self.swap(pos, smallest);
            pos = smallest;
        }
    }
}
