//! Cancellable deadlines and a trailing-edge coalescing queue.
//!
//! Nothing here reads the clock; callers pass `now` in.

use std::collections::HashSet;
use std::hash::Hash;
use std::time::{Duration, Instant};

/// A single pending deadline that can be pushed back or cancelled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScheduledTask {
    deadline: Option<Instant>,
}

impl ScheduledTask {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule_at(&mut self, deadline: Instant) {
        self.deadline = Some(deadline);
    }

    pub fn schedule_after(&mut self, now: Instant, delay: Duration) {
        self.schedule_at(now + delay);
    }

    pub fn cancel(&mut self) {
        self.deadline = None;
    }

    pub fn is_pending(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_due(&self, now: Instant) -> bool {
        self.deadline.is_some_and(|d| now >= d)
    }

    /// Consume the deadline if it has passed.
    pub fn fire(&mut self, now: Instant) -> bool {
        if self.is_due(now) {
            self.deadline = None;
            true
        } else {
            false
        }
    }
}

/// What a flushed queue asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Batch<T: Eq + Hash> {
    /// At least one unscoped item arrived.
    Full,
    Items(HashSet<T>),
}

/// Collects items and releases them together once `window` has passed
/// without new arrivals.
#[derive(Debug, Clone)]
pub struct CoalescingQueue<T: Eq + Hash> {
    window: Duration,
    pending: HashSet<T>,
    full: bool,
    task: ScheduledTask,
}

impl<T: Eq + Hash> CoalescingQueue<T> {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            pending: HashSet::new(),
            full: false,
            task: ScheduledTask::new(),
        }
    }

    /// Add an item; `None` widens the batch to everything.
    pub fn push(&mut self, now: Instant, item: Option<T>) {
        match item {
            Some(item) if !self.full => {
                self.pending.insert(item);
            }
            Some(_) => {}
            None => {
                self.full = true;
                self.pending.clear();
            }
        }
        self.task.schedule_after(now, self.window);
    }

    pub fn is_empty(&self) -> bool {
        !self.task.is_pending()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.task.deadline()
    }

    /// Release the batch if the window has closed.
    pub fn poll(&mut self, now: Instant) -> Option<Batch<T>> {
        if self.task.fire(now) {
            Some(self.take())
        } else {
            None
        }
    }

    /// Release whatever is pending, ignoring the window.
    pub fn flush(&mut self) -> Option<Batch<T>> {
        if self.task.is_pending() {
            self.task.cancel();
            Some(self.take())
        } else {
            None
        }
    }

    fn take(&mut self) -> Batch<T> {
        if std::mem::take(&mut self.full) {
            self.pending.clear();
            Batch::Full
        } else {
            Batch::Items(std::mem::take(&mut self.pending))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_fires_once() {
        let t0 = Instant::now();
        let mut task = ScheduledTask::new();
        task.schedule_after(t0, Duration::from_millis(100));
        assert!(!task.fire(t0 + Duration::from_millis(99)));
        assert!(task.fire(t0 + Duration::from_millis(100)));
        assert!(!task.fire(t0 + Duration::from_millis(200)));
    }

    #[test]
    fn cancelled_task_never_fires() {
        let t0 = Instant::now();
        let mut task = ScheduledTask::new();
        task.schedule_after(t0, Duration::from_millis(10));
        task.cancel();
        assert!(!task.fire(t0 + Duration::from_secs(1)));
    }

    #[test]
    fn every_push_extends_the_window() {
        let t0 = Instant::now();
        let window = Duration::from_millis(500);
        let mut q: CoalescingQueue<u32> = CoalescingQueue::new(window);
        q.push(t0, Some(1));
        q.push(t0 + Duration::from_millis(400), Some(2));
        assert_eq!(q.poll(t0 + Duration::from_millis(600)), None);
        let batch = q.poll(t0 + Duration::from_millis(900)).unwrap();
        assert_eq!(batch, Batch::Items([1, 2].into_iter().collect()));
        assert!(q.is_empty());
    }

    #[test]
    fn unscoped_item_widens_to_full() {
        let t0 = Instant::now();
        let mut q: CoalescingQueue<u32> = CoalescingQueue::new(Duration::from_millis(10));
        q.push(t0, Some(1));
        q.push(t0, None);
        q.push(t0, Some(2));
        assert_eq!(q.flush(), Some(Batch::Full));
        assert_eq!(q.flush(), None);
    }
}
