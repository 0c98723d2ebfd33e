use crate::simulation::id::serializable_type::StableTypeId;
use crate::simulation::id::Id;
use std::cmp::Ordering;
use std::collections::BinaryHeap;

pub trait EndTime {
    fn end_time(&self, now: u32) -> u32;
}

pub trait Identifiable<I: StableTypeId> {
    fn id(&self) -> &Id<I>;
}

struct Entry<T> {
    end_time: u32,
    order: usize,
    value: T,
}

impl<T> PartialEq<Self> for Entry<T> {
    fn eq(&self, other: &Self) -> bool {
        self.end_time == other.end_time && self.order == other.order
    }
}

impl<T> Eq for Entry<T> {}

impl<T> PartialOrd<Self> for Entry<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Entry<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        // reverse for min-heap, insertion order breaks ties so that values with the same
        // end time leave the queue in FIFO order.
        other
            .end_time
            .cmp(&self.end_time)
            .then_with(|| other.order.cmp(&self.order))
    }
}

/// Min-queue over the end time of its values. The end time is evaluated once, when a value is added.
pub struct TimeQueue<T>
where
    T: EndTime,
{
    q: BinaryHeap<Entry<T>>,
    counter: usize,
}

impl<T> Default for TimeQueue<T>
where
    T: EndTime,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> TimeQueue<T>
where
    T: EndTime,
{
    pub fn new() -> Self {
        TimeQueue {
            q: BinaryHeap::new(),
            counter: 0,
        }
    }

    pub fn add(&mut self, value: T, now: u32) {
        let end_time = value.end_time(now);
        let order = self.counter;
        self.counter += 1;
        self.q.push(Entry {
            end_time,
            order,
            value,
        });
    }

    /// Removes all values with an end time <= now.
    pub fn pop(&mut self, now: u32) -> Vec<T> {
        let mut result: Vec<T> = Vec::new();

        while let Some(entry_ref) = self.q.peek() {
            if entry_ref.end_time > now {
                break;
            }
            if let Some(entry) = self.q.pop() {
                result.push(entry.value);
            }
        }

        result
    }

    pub fn next_end_time(&self) -> Option<u32> {
        self.q.peek().map(|e| e.end_time)
    }

    pub fn len(&self) -> usize {
        self.q.len()
    }

    pub fn is_empty(&self) -> bool {
        self.q.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone)]
    struct Departure {
        agent: u32,
        at: u32,
    }

    impl EndTime for Departure {
        fn end_time(&self, _now: u32) -> u32 {
            self.at
        }
    }

    struct Delay(u32);

    impl EndTime for Delay {
        fn end_time(&self, now: u32) -> u32 {
            now + self.0
        }
    }

    #[test]
    fn same_end_time_is_fifo() {
        let mut queue = TimeQueue::new();
        queue.add(Departure { agent: 1, at: 10 }, 0);
        queue.add(Departure { agent: 2, at: 10 }, 0);
        queue.add(Departure { agent: 3, at: 10 }, 0);

        let agents: Vec<u32> = queue.pop(10).into_iter().map(|d| d.agent).collect();
        assert_eq!(vec![1, 2, 3], agents);
        assert!(queue.is_empty());
    }

    #[test]
    fn pops_only_due_values() {
        let mut queue = TimeQueue::new();
        queue.add(Departure { agent: 1, at: 15 }, 0);
        queue.add(Departure { agent: 2, at: 10 }, 0);
        queue.add(Departure { agent: 3, at: 20 }, 0);

        assert!(queue.pop(9).is_empty());
        assert_eq!(Some(10), queue.next_end_time());

        let agents: Vec<u32> = queue.pop(15).into_iter().map(|d| d.agent).collect();
        assert_eq!(vec![2, 1], agents);
        assert_eq!(1, queue.len());
    }

    #[test]
    fn end_time_relative_to_insertion() {
        let mut queue = TimeQueue::new();
        queue.add(Delay(5), 100);
        assert_eq!(Some(105), queue.next_end_time());
        assert!(queue.pop(104).is_empty());
        assert_eq!(1, queue.pop(105).len());
    }
}
