//! Bounded backlog for messages written while the peer is unreachable

use std::collections::VecDeque;

/// Which family a queued message belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutboundClass {
    Command,
    Event,
}

/// Bounded FIFO with drop-oldest eviction.
///
/// When full, the oldest queued event goes first. Commands are evicted only
/// when no events remain, and an incoming event never displaces a command.
/// The evicted item is handed back so its owner can fail any waiter on it.
#[derive(Debug)]
pub struct OutboundQueue<T> {
    items: VecDeque<(OutboundClass, T)>,
    capacity: usize,
    evicted_commands: u64,
    evicted_events: u64,
}

impl<T> OutboundQueue<T> {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            items: VecDeque::with_capacity(capacity),
            capacity,
            evicted_commands: 0,
            evicted_events: 0,
        }
    }

    /// Queue `item`, returning whatever had to be dropped to make room.
    pub fn push(&mut self, item: T, class: OutboundClass) -> Option<(OutboundClass, T)> {
        if self.items.len() < self.capacity {
            self.items.push_back((class, item));
            return None;
        }

        let victim = self
            .items
            .iter()
            .position(|(c, _)| *c == OutboundClass::Event);

        let evicted = match (victim, class) {
            (Some(index), _) => self.items.remove(index),
            // Queue is all commands: an event yields to them.
            (None, OutboundClass::Event) => {
                self.evicted_events += 1;
                return Some((class, item));
            }
            (None, OutboundClass::Command) => self.items.pop_front(),
        };

        match evicted.as_ref().map(|(c, _)| *c) {
            Some(OutboundClass::Event) => self.evicted_events += 1,
            Some(OutboundClass::Command) => self.evicted_commands += 1,
            None => {}
        }
        self.items.push_back((class, item));
        evicted
    }

    pub fn pop_front(&mut self) -> Option<T> {
        self.items.pop_front().map(|(_, item)| item)
    }

    /// Take everything, oldest first.
    pub fn drain(&mut self) -> Vec<T> {
        self.items.drain(..).map(|(_, item)| item).collect()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn evicted_commands(&self) -> u64 {
        self.evicted_commands
    }

    pub fn evicted_events(&self) -> u64 {
        self.evicted_events
    }
}
