//! Input-event bus with explicit capture/bubble phases.
//!
//! Handlers are kept in one dispatch table ordered by phase, then priority
//! (higher first), then registration order. A handler that returns
//! [`Flow::Consumed`] stops the event from reaching anything after it.

use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Phase {
    Capture,
    Bubble,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Consumed,
}

/// A rendered element as the event source sees it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Target {
    pub tag_name: String,
    pub attributes: BTreeMap<String, String>,
}

impl Target {
    pub fn new(tag_name: impl Into<String>) -> Self {
        Self {
            tag_name: tag_name.into(),
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputEvent {
    Key { key: String },
    PointerOver { target: Target },
    Click { target: Target },
}

impl InputEvent {
    pub fn key(key: impl Into<String>) -> Self {
        InputEvent::Key { key: key.into() }
    }
}

type Handler<S> = Box<dyn FnMut(&mut S, &InputEvent) -> Flow>;

struct Slot<S> {
    phase: Phase,
    priority: i32,
    seq: usize,
    handler: Handler<S>,
}

/// Dispatch table of input handlers over shared state `S`.
pub struct EventBus<S> {
    slots: Vec<Slot<S>>,
    next_seq: usize,
}

impl<S> Default for EventBus<S> {
    fn default() -> Self {
        Self {
            slots: Vec::new(),
            next_seq: 0,
        }
    }
}

impl<S> EventBus<S> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on<F>(&mut self, phase: Phase, priority: i32, handler: F)
    where
        F: FnMut(&mut S, &InputEvent) -> Flow + 'static,
    {
        self.slots.push(Slot {
            phase,
            priority,
            seq: self.next_seq,
            handler: Box::new(handler),
        });
        self.next_seq += 1;
        self.slots.sort_by(|a, b| {
            a.phase
                .cmp(&b.phase)
                .then(b.priority.cmp(&a.priority))
                .then(a.seq.cmp(&b.seq))
        });
    }

    pub fn dispatch(&mut self, state: &mut S, event: &InputEvent) -> Flow {
        for slot in &mut self.slots {
            if (slot.handler)(state, event) == Flow::Consumed {
                return Flow::Consumed;
            }
        }
        Flow::Continue
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capture_runs_before_bubble_and_priority_orders() {
        let mut bus: EventBus<Vec<&'static str>> = EventBus::new();
        bus.on(Phase::Bubble, 10, |log, _| {
            log.push("bubble");
            Flow::Continue
        });
        bus.on(Phase::Capture, 0, |log, _| {
            log.push("capture-low");
            Flow::Continue
        });
        bus.on(Phase::Capture, 5, |log, _| {
            log.push("capture-high");
            Flow::Continue
        });

        let mut log = Vec::new();
        assert_eq!(bus.dispatch(&mut log, &InputEvent::key("a")), Flow::Continue);
        assert_eq!(log, vec!["capture-high", "capture-low", "bubble"]);
    }

    #[test]
    fn consumed_stops_dispatch() {
        let mut bus: EventBus<u32> = EventBus::new();
        bus.on(Phase::Capture, 0, |count, _| {
            *count += 1;
            Flow::Consumed
        });
        bus.on(Phase::Bubble, 0, |count, _| {
            *count += 100;
            Flow::Continue
        });

        let mut count = 0;
        assert_eq!(bus.dispatch(&mut count, &InputEvent::key("x")), Flow::Consumed);
        assert_eq!(count, 1);
    }
}
