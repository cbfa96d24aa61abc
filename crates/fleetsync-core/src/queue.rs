// ── Outbound message queue ──
//
// FIFO buffer for frames produced while the channel is not open. Flushed in
// insertion order on the next successful open. An optional bound drops the
// oldest entry first.

use std::collections::VecDeque;

use fleetsync_api::OutboundMessage;

#[derive(Debug, Default)]
pub(crate) struct OutboundQueue {
    messages: VecDeque<OutboundMessage>,
    capacity: Option<usize>,
}

impl OutboundQueue {
    pub(crate) fn new(capacity: Option<usize>) -> Self {
        Self {
            messages: VecDeque::new(),
            capacity,
        }
    }

    /// Append a message. Returns the message evicted to make room, if any.
    pub(crate) fn push(&mut self, msg: OutboundMessage) -> Option<OutboundMessage> {
        let dropped = match self.capacity {
            Some(0) => return Some(msg),
            Some(cap) if self.messages.len() >= cap => self.messages.pop_front(),
            _ => None,
        };
        self.messages.push_back(msg);
        dropped
    }

    /// Put previously drained messages back ahead of anything queued since,
    /// preserving their relative order. Entries beyond the bound are dropped
    /// from the front and returned.
    pub(crate) fn requeue_front(
        &mut self,
        msgs: Vec<OutboundMessage>,
    ) -> Vec<OutboundMessage> {
        for msg in msgs.into_iter().rev() {
            self.messages.push_front(msg);
        }

        let mut dropped = Vec::new();
        if let Some(cap) = self.capacity {
            while self.messages.len() > cap {
                if let Some(msg) = self.messages.pop_front() {
                    dropped.push(msg);
                }
            }
        }
        dropped
    }

    /// Remove everything, oldest first.
    pub(crate) fn drain(&mut self) -> Vec<OutboundMessage> {
        self.messages.drain(..).collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.messages.len()
    }
}
