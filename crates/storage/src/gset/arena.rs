//! Index arena for interval nodes
//!
//! Interval nodes are never individually heap-allocated: each
//! [`GroupSet`](super::GroupSet) owns one arena and links nodes by index.
//! Removed nodes go onto a free list inside the same `Vec` and are reused
//! by later insertions, which bounds allocation churn under heavy
//! add/remove traffic and makes a dangling node impossible: "ownership"
//! of an interval is membership in the arena.

use grouplog_core::Gno;

/// One linked interval node. `start`/`end` are half-open GNO bounds.
#[derive(Debug, Clone, Copy)]
pub(super) struct Node {
    pub start: Gno,
    pub end: Gno,
    /// Next node in the same SIDNO's list (or next free slot when this
    /// node is on the free list)
    pub next: Option<u32>,
}

/// Arena of interval nodes with an intrusive free list.
#[derive(Debug, Default)]
pub(super) struct IntervalArena {
    nodes: Vec<Node>,
    free_head: Option<u32>,
}

impl IntervalArena {
    /// Take a node from the free list, or grow the arena by one.
    pub fn alloc(&mut self, start: Gno, end: Gno, next: Option<u32>) -> u32 {
        match self.free_head {
            Some(index) => {
                self.free_head = self.nodes[index as usize].next;
                self.nodes[index as usize] = Node { start, end, next };
                index
            }
            None => {
                self.nodes.push(Node { start, end, next });
                (self.nodes.len() - 1) as u32
            }
        }
    }

    /// Return a node to the free list.
    pub fn release(&mut self, index: u32) {
        self.nodes[index as usize].next = self.free_head;
        self.free_head = Some(index);
    }

    pub fn node(&self, index: u32) -> &Node {
        &self.nodes[index as usize]
    }

    pub fn node_mut(&mut self, index: u32) -> &mut Node {
        &mut self.nodes[index as usize]
    }

    /// Number of slots currently on the free list (test support).
    #[cfg(test)]
    pub fn free_count(&self) -> usize {
        let mut count = 0;
        let mut cur = self.free_head;
        while let Some(index) = cur {
            count += 1;
            cur = self.nodes[index as usize].next;
        }
        count
    }

    /// Total slots ever allocated (test support).
    #[cfg(test)]
    pub fn capacity(&self) -> usize {
        self.nodes.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alloc_reuses_released_slots() {
        let mut arena = IntervalArena::default();
        let a = arena.alloc(1, 2, None);
        let b = arena.alloc(3, 4, None);
        assert_ne!(a, b);
        assert_eq!(arena.capacity(), 2);

        arena.release(a);
        assert_eq!(arena.free_count(), 1);

        let c = arena.alloc(5, 6, None);
        assert_eq!(c, a);
        assert_eq!(arena.capacity(), 2);
        assert_eq!(arena.free_count(), 0);
        assert_eq!(arena.node(c).start, 5);
    }

    #[test]
    fn test_free_list_is_lifo() {
        let mut arena = IntervalArena::default();
        let a = arena.alloc(1, 2, None);
        let b = arena.alloc(3, 4, None);
        arena.release(a);
        arena.release(b);
        assert_eq!(arena.alloc(0, 1, None), b);
        assert_eq!(arena.alloc(0, 1, None), a);
    }
}
