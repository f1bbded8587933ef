//! Bounded inbound queues with priority-aware overflow.
//!
//! Consensus liveness depends most on reduction votes, then agreements,
//! then everything else. When the total bound is hit, the lowest-priority
//! class loses messages first; reductions are only dropped once nothing
//! else is left to shed.

use crate::metrics::metrics;
use sba_core::Event;
use std::collections::VecDeque;
use tracing::debug;

/// Default total bound across classes.
pub const DEFAULT_INBOUND_CAPACITY: usize = 5000;

/// Inbound event classes, highest priority first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Class {
    Reduction,
    Agreement,
    Other,
}

fn classify(event: &Event) -> Class {
    match event {
        Event::ReductionReceived { .. } => Class::Reduction,
        Event::AgreementReceived { .. } => Class::Agreement,
        _ => Class::Other,
    }
}

/// Per-class bounded buffers feeding the runner loop.
pub struct InboundQueues {
    reductions: VecDeque<Event>,
    agreements: VecDeque<Event>,
    other: VecDeque<Event>,
    capacity: usize,
}

impl InboundQueues {
    pub fn new(capacity: usize) -> Self {
        Self {
            reductions: VecDeque::new(),
            agreements: VecDeque::new(),
            other: VecDeque::new(),
            capacity,
        }
    }

    pub fn len(&self) -> usize {
        self.reductions.len() + self.agreements.len() + self.other.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Enqueue an event, shedding from the lowest-priority non-empty class
    /// when full. Returns false if the event itself was dropped.
    pub fn push(&mut self, event: Event) -> bool {
        if self.len() >= self.capacity {
            let class = classify(&event);
            let shed = if !self.other.is_empty() && class != Class::Other {
                self.other.pop_front()
            } else if !self.agreements.is_empty() && class == Class::Reduction {
                self.agreements.pop_front()
            } else {
                None
            };
            match shed {
                Some(dropped) => {
                    debug!(kind = dropped.type_name(), "inbound overflow, shedding");
                    metrics().inbound_dropped.inc();
                }
                None => {
                    debug!(kind = event.type_name(), "inbound overflow, dropping");
                    metrics().inbound_dropped.inc();
                    return false;
                }
            }
        }
        match classify(&event) {
            Class::Reduction => self.reductions.push_back(event),
            Class::Agreement => self.agreements.push_back(event),
            Class::Other => self.other.push_back(event),
        }
        true
    }

    /// Dequeue the next event, highest-priority class first; arrival order
    /// within a class.
    pub fn pop(&mut self) -> Option<Event> {
        self.reductions
            .pop_front()
            .or_else(|| self.agreements.pop_front())
            .or_else(|| self.other.pop_front())
    }
}
