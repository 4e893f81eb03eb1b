//! A priority queue of scheduled events sorted by time.
//!
//! Defines a `Queue<T>` that stores items of type T sorted by `f64` time,
//! called 'plans'. Adding a plan is *O*(log(*n*)); peeking at the earliest
//! time is *O*(1).
//!
//! This queue backs the event-stream scheduling strategy, where every action
//! of an entity is pre-generated at initialization and consumed in time order
//! as the simulation clock reaches it.

use std::{cmp::Ordering, collections::BinaryHeap};

use crate::hashing::{HashMap, HashMapExt};

/// A priority queue that stores arbitrary data sorted by time
///
/// Items of type `T` are stored in order by `f64` time and called `Plan<T>`.
/// When plans are created they are sequentially assigned an id. If two plans
/// are scheduled for the same time then the plan that was added first (i.e.,
/// that has the lowest id) is placed earlier.
///
/// The time and plan id are stored in a binary heap of `Entry` objects. The
/// data payload of the event is stored in a hash map by plan id.
pub struct Queue<T> {
    queue: BinaryHeap<Entry>,
    data_map: HashMap<u64, T>,
    plan_counter: u64,
}

impl<T> Queue<T> {
    /// Create a new empty `Queue<T>`
    #[must_use]
    pub fn new() -> Queue<T> {
        Queue {
            queue: BinaryHeap::new(),
            data_map: HashMap::new(),
            plan_counter: 0,
        }
    }

    /// Add a plan to the queue at the specified time
    ///
    /// # Panics
    ///
    /// Panics if `time` is NaN or infinite.
    pub fn add_plan(&mut self, time: f64, data: T) {
        assert!(time.is_finite(), "Invalid time value");
        let id = self.plan_counter;
        self.queue.push(Entry { time, id });
        self.data_map.insert(id, data);
        self.plan_counter += 1;
    }

    /// The time of the earliest plan, if any.
    #[must_use]
    pub fn next_time(&self) -> Option<f64> {
        self.queue.peek().map(|entry| entry.time)
    }

    /// Retrieve the earliest plan if it is due at or before `time`
    pub fn pop_due(&mut self, time: f64) -> Option<Plan<T>> {
        match self.next_time() {
            Some(next) if next <= time => self.get_next_plan(),
            _ => None,
        }
    }

    /// Retrieve the earliest plan in the queue
    ///
    /// Returns the next plan if it exists or else `None` if the queue is empty
    pub fn get_next_plan(&mut self) -> Option<Plan<T>> {
        let entry = self.queue.pop()?;
        let data = self.data_map.remove(&entry.id)?;
        Some(Plan {
            time: entry.time,
            data,
        })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

impl<T> Default for Queue<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// A time and id object used to order plans in the `Queue<T>`
///
/// `Entry` objects are sorted in increasing order of time and then plan id
#[derive(PartialEq, Debug)]
struct Entry {
    time: f64,
    id: u64,
}

impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Entry objects are ordered in increasing order by time and then plan id.
/// `BinaryHeap` is a max-heap, so both comparisons are reversed.
impl Ord for Entry {
    fn cmp(&self, other: &Self) -> Ordering {
        match self.time.total_cmp(&other.time).reverse() {
            Ordering::Equal => self.id.cmp(&other.id).reverse(),
            time_ordering => time_ordering,
        }
    }
}

/// A plan that holds data of type `T` intended to be used at the specified time
pub struct Plan<T> {
    pub time: f64,
    pub data: T,
}

#[cfg(test)]
#[allow(clippy::float_cmp)]
mod tests {
    use super::Queue;

    #[test]
    fn empty_queue() {
        let mut plan_queue = Queue::<()>::new();
        assert!(plan_queue.get_next_plan().is_none());
        assert!(plan_queue.next_time().is_none());
        assert!(plan_queue.is_empty());
    }

    #[test]
    fn add_plans() {
        let mut plan_queue = Queue::new();
        plan_queue.add_plan(1.0, 1);
        plan_queue.add_plan(3.0, 3);
        plan_queue.add_plan(2.0, 2);
        assert_eq!(plan_queue.len(), 3);

        let next_plan = plan_queue.get_next_plan().unwrap();
        assert_eq!(next_plan.time, 1.0);
        assert_eq!(next_plan.data, 1);

        let next_plan = plan_queue.get_next_plan().unwrap();
        assert_eq!(next_plan.time, 2.0);
        assert_eq!(next_plan.data, 2);

        let next_plan = plan_queue.get_next_plan().unwrap();
        assert_eq!(next_plan.time, 3.0);
        assert_eq!(next_plan.data, 3);

        assert!(plan_queue.get_next_plan().is_none());
    }

    #[test]
    fn add_plans_at_same_time_keep_insertion_order() {
        let mut plan_queue = Queue::new();
        plan_queue.add_plan(1.0, 1);
        plan_queue.add_plan(1.0, 2);
        plan_queue.add_plan(0.5, 0);

        assert_eq!(plan_queue.get_next_plan().unwrap().data, 0);
        assert_eq!(plan_queue.get_next_plan().unwrap().data, 1);
        assert_eq!(plan_queue.get_next_plan().unwrap().data, 2);
    }

    #[test]
    fn pop_due_only_returns_reached_plans() {
        let mut plan_queue = Queue::new();
        plan_queue.add_plan(10.0, "a");
        plan_queue.add_plan(10.0, "b");
        plan_queue.add_plan(20.0, "c");

        assert!(plan_queue.pop_due(9.0).is_none());
        assert_eq!(plan_queue.next_time(), Some(10.0));
        assert_eq!(plan_queue.pop_due(10.0).unwrap().data, "a");
        assert_eq!(plan_queue.pop_due(10.0).unwrap().data, "b");
        assert!(plan_queue.pop_due(10.0).is_none());
        assert_eq!(plan_queue.next_time(), Some(20.0));
    }

    #[test]
    #[should_panic(expected = "Invalid time value")]
    fn nan_plan_time() {
        let mut plan_queue = Queue::new();
        plan_queue.add_plan(f64::NAN, ());
    }
}
