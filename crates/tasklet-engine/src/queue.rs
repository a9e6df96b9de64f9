//! Intrusive FIFO of tasks
//!
//! The link lives inside [`Task`], so pushing allocates nothing and moving a
//! whole queue onto another is a relink of two pointers regardless of length.
//! A `TaskQueue` owns the tasks it holds; every operation that removes a task
//! hands back its `Box`, so a task can only ever be reachable from one queue.
//!
//! Not synchronized. The processor keeps its ready and staging queues on the
//! driving thread and wraps handoff queues in a lock.

use crate::task::{Task, TaskId};
use std::fmt;
use std::marker::PhantomData;
use std::mem;
use std::ptr::NonNull;

/// Singly linked FIFO of owned tasks with O(1) push, pop, rotate and append
pub struct TaskQueue {
    head: Option<NonNull<Task>>,
    tail: Option<NonNull<Task>>,
    len: usize,
}

// SAFETY: the queue exclusively owns every task reachable from `head`, and
// `Task` is `Send`. Moving the queue moves that ownership.
unsafe impl Send for TaskQueue {}

impl TaskQueue {
    /// Create an empty queue
    pub const fn new() -> Self {
        Self {
            head: None,
            tail: None,
            len: 0,
        }
    }

    /// Number of tasks in the queue
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the queue is empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    /// Append a task at the back
    pub fn push_back(&mut self, mut task: Box<Task>) {
        debug_assert!(task.next.is_none(), "task {:?} is still linked", task.id());
        task.next = None;
        let node = NonNull::from(Box::leak(task));

        match self.tail {
            // SAFETY: `tail` points at a task owned by this queue.
            Some(tail) => unsafe { (*tail.as_ptr()).next = Some(node) },
            None => self.head = Some(node),
        }
        self.tail = Some(node);
        self.len += 1;
    }

    /// Insert a task at the front
    pub fn push_front(&mut self, mut task: Box<Task>) {
        debug_assert!(task.next.is_none(), "task {:?} is still linked", task.id());
        task.next = self.head;
        let node = NonNull::from(Box::leak(task));

        if self.tail.is_none() {
            self.tail = Some(node);
        }
        self.head = Some(node);
        self.len += 1;
    }

    /// Remove and return the front task
    pub fn pop_front(&mut self) -> Option<Box<Task>> {
        self.head.map(|head| {
            // SAFETY: `head` was leaked from a `Box` in `push_*` and is owned
            // by this queue; it is unlinked before being returned.
            let mut task = unsafe { Box::from_raw(head.as_ptr()) };
            self.head = task.next.take();
            if self.head.is_none() {
                self.tail = None;
            }
            self.len -= 1;
            task
        })
    }

    /// Drop the front task. Returns false if the queue was empty.
    pub fn drop_front(&mut self) -> bool {
        self.pop_front().is_some()
    }

    /// Peek at the front task
    pub fn front(&self) -> Option<&Task> {
        // SAFETY: the node is owned by this queue and borrowed through `&self`.
        self.head.map(|head| unsafe { &*head.as_ptr() })
    }

    /// Peek at the front task mutably
    pub fn front_mut(&mut self) -> Option<&mut Task> {
        // SAFETY: the node is owned by this queue and borrowed through `&mut self`.
        self.head.map(|head| unsafe { &mut *head.as_ptr() })
    }

    /// Move the front task to the back without unboxing it
    pub fn rotate(&mut self) {
        if self.len < 2 {
            return;
        }
        if let (Some(head), Some(tail)) = (self.head, self.tail) {
            // SAFETY: both nodes are owned by this queue and distinct (len >= 2).
            unsafe {
                self.head = (*head.as_ptr()).next.take();
                (*tail.as_ptr()).next = Some(head);
            }
            self.tail = Some(head);
        }
    }

    /// Move every task of `other` to the back of this queue, leaving `other`
    /// empty. Constant time.
    pub fn append(&mut self, other: &mut TaskQueue) {
        let Some(other_head) = other.head.take() else {
            return;
        };
        match self.tail {
            // SAFETY: `tail` is owned by this queue; the chain starting at
            // `other_head` is taken over from `other`.
            Some(tail) => unsafe { (*tail.as_ptr()).next = Some(other_head) },
            None => self.head = Some(other_head),
        }
        self.tail = other.tail.take();
        self.len += mem::take(&mut other.len);
    }

    /// Take the whole queue, leaving this one empty
    pub fn take(&mut self) -> TaskQueue {
        mem::take(self)
    }

    /// Pop tasks from the front until the queue is empty
    pub fn drain(&mut self) -> impl Iterator<Item = Box<Task>> + '_ {
        std::iter::from_fn(move || self.pop_front())
    }

    /// Iterate front to back
    pub fn iter(&self) -> Iter<'_> {
        Iter {
            next: self.head,
            _queue: PhantomData,
        }
    }

    /// Whether a task with `id` is in the queue. Linear.
    pub fn contains(&self, id: TaskId) -> bool {
        self.iter().any(|task| task.id() == id)
    }

    /// Task ids front to back
    pub fn ids(&self) -> Vec<TaskId> {
        self.iter().map(Task::id).collect()
    }
}

impl Default for TaskQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for TaskQueue {
    fn drop(&mut self) {
        // Iterative, so long chains don't recurse through `Box` drops
        while self.pop_front().is_some() {}
    }
}

impl fmt::Debug for TaskQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter().map(Task::id)).finish()
    }
}

/// Borrowing iterator over a [`TaskQueue`]
pub struct Iter<'a> {
    next: Option<NonNull<Task>>,
    _queue: PhantomData<&'a TaskQueue>,
}

impl<'a> Iterator for Iter<'a> {
    type Item = &'a Task;

    fn next(&mut self) -> Option<&'a Task> {
        self.next.map(|node| {
            // SAFETY: the queue is borrowed for 'a, so the node stays alive.
            let task = unsafe { &*node.as_ptr() };
            self.next = task.next;
            task
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decision::Decision;
    use crate::processor::ProcessorId;
    use crate::task::Coroutine;
    use std::sync::Weak;

    struct Idle;

    impl Coroutine for Idle {
        fn step(&mut self) -> Decision {
            Decision::Continue
        }

        fn finished(&self) -> bool {
            false
        }
    }

    fn task() -> Box<Task> {
        Task::new(ProcessorId::new(), Weak::new(), Box::new(Idle))
    }

    fn queue_of(n: usize) -> (TaskQueue, Vec<TaskId>) {
        let mut queue = TaskQueue::new();
        let mut ids = Vec::new();
        for _ in 0..n {
            let t = task();
            ids.push(t.id());
            queue.push_back(t);
        }
        (queue, ids)
    }

    #[test]
    fn test_fifo_order() {
        let (mut queue, ids) = queue_of(3);
        assert_eq!(queue.len(), 3);
        assert_eq!(queue.front().map(Task::id), Some(ids[0]));

        let popped: Vec<_> = queue.drain().map(|t| t.id()).collect();
        assert_eq!(popped, ids);
        assert!(queue.is_empty());
        assert!(queue.pop_front().is_none());
    }

    #[test]
    fn test_push_after_empty() {
        let (mut queue, _) = queue_of(1);
        assert!(queue.drop_front());
        assert!(!queue.drop_front());

        // Tail must have been reset
        let t = task();
        let id = t.id();
        queue.push_back(t);
        assert_eq!(queue.ids(), vec![id]);
    }

    #[test]
    fn test_push_front() {
        let (mut queue, ids) = queue_of(2);
        let t = task();
        let first = t.id();
        queue.push_front(t);
        assert_eq!(queue.ids(), vec![first, ids[0], ids[1]]);

        let mut empty = TaskQueue::new();
        let t = task();
        let id = t.id();
        empty.push_front(t);
        let t = task();
        let last = t.id();
        empty.push_back(t);
        assert_eq!(empty.ids(), vec![id, last]);
    }

    #[test]
    fn test_rotate() {
        let (mut queue, ids) = queue_of(3);
        queue.rotate();
        assert_eq!(queue.ids(), vec![ids[1], ids[2], ids[0]]);
        queue.rotate();
        queue.rotate();
        assert_eq!(queue.ids(), ids);

        // Appending after a rotate must land behind the rotated task
        let t = task();
        let id = t.id();
        queue.rotate();
        queue.push_back(t);
        assert_eq!(queue.ids(), vec![ids[1], ids[2], ids[0], id]);
    }

    #[test]
    fn test_rotate_single_and_empty() {
        let mut empty = TaskQueue::new();
        empty.rotate();
        assert!(empty.is_empty());

        let (mut single, ids) = queue_of(1);
        single.rotate();
        assert_eq!(single.ids(), ids);
    }

    #[test]
    fn test_append() {
        let (mut a, a_ids) = queue_of(2);
        let (mut b, b_ids) = queue_of(3);

        a.append(&mut b);
        assert_eq!(a.len(), 5);
        assert!(b.is_empty());
        assert_eq!(b.len(), 0);

        let mut expected = a_ids.clone();
        expected.extend(b_ids.iter().copied());
        assert_eq!(a.ids(), expected);

        // Appending an empty queue is a no-op
        a.append(&mut b);
        assert_eq!(a.len(), 5);

        // Appending into an empty queue takes the whole chain
        let mut c = TaskQueue::new();
        c.append(&mut a);
        assert_eq!(c.ids(), expected);
        assert!(a.is_empty());

        // The moved-into queue keeps working at its tail
        let t = task();
        let id = t.id();
        c.push_back(t);
        assert_eq!(c.ids().last(), Some(&id));
    }

    #[test]
    fn test_take_and_contains() {
        let (mut queue, ids) = queue_of(2);
        assert!(queue.contains(ids[1]));

        let taken = queue.take();
        assert!(queue.is_empty());
        assert!(!queue.contains(ids[1]));
        assert_eq!(taken.ids(), ids);
    }

    #[test]
    fn test_drop_long_queue() {
        let (queue, _) = queue_of(100_000);
        drop(queue);
    }
}
