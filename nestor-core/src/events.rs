use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

/// Requests raised by the PPU or the bus for the CPU to act on between
/// instructions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    Nmi,
    OamDma,
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct EventQueue {
    events: VecDeque<Event>,
}

impl EventQueue {
    pub fn new() -> Self { Self::default() }

    pub fn push(&mut self, event: Event) { self.events.push_back(event); }
    pub fn pop(&mut self) -> Option<Event> { self.events.pop_front() }

    pub fn clear(&mut self) { self.events.clear(); }

    pub fn is_empty(&self) -> bool { self.events.is_empty() }
    pub fn len(&self) -> usize { self.events.len() }
}


#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_events_drain_in_order() {
        let mut queue = EventQueue::new();
        queue.push(Event::OamDma);
        queue.push(Event::Nmi);
        queue.push(Event::OamDma);

        assert_eq!(queue.len(), 3);
        assert_eq!(queue.pop(), Some(Event::OamDma));
        assert_eq!(queue.pop(), Some(Event::Nmi));
        assert_eq!(queue.pop(), Some(Event::OamDma));
        assert_eq!(queue.pop(), None);
        assert!(queue.is_empty());
    }
}
