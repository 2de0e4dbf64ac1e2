//! Inbound message queue shared between a node's server and its event loop.

use lamport_env::Message;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// A message taken off the inbox, with the depth it was observed at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboxEntry {
    /// The message as received
    pub message: Message,

    /// Depth of the queue just before this message was removed
    pub queue_length: usize,
}

/// Concurrency-safe FIFO of inbound messages.
///
/// Cloning yields another handle to the same queue: the serving side pushes
/// through one handle, the event loop pops through another.
#[derive(Debug, Clone, Default)]
pub struct Inbox {
    queue: Arc<Mutex<VecDeque<Message>>>,
}

impl Inbox {
    /// Creates an empty inbox.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<Message>> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Appends a message. Never blocks beyond the queue lock.
    ///
    /// Returns the depth after the push.
    pub fn push(&self, message: Message) -> usize {
        let mut queue = self.lock();
        queue.push_back(message);
        queue.len()
    }

    /// Removes the oldest message, or `None` if the inbox is empty.
    ///
    /// The reported `queue_length` is read under the same lock as the
    /// removal, so it is the backlog including the message being taken.
    pub fn try_pop(&self) -> Option<InboxEntry> {
        let mut queue = self.lock();
        let queue_length = queue.len();
        queue.pop_front().map(|message| InboxEntry { message, queue_length })
    }

    /// Current depth.
    pub fn size(&self) -> usize {
        self.lock().len()
    }

    /// Returns true if nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_fifo_order_and_depths() {
        let inbox = Inbox::new();
        assert_eq!(inbox.push(Message::new(1, "A")), 1);
        assert_eq!(inbox.push(Message::new(2, "B")), 2);
        assert_eq!(inbox.push(Message::new(3, "C")), 3);

        let first = inbox.try_pop().unwrap();
        assert_eq!(first.message, Message::new(1, "A"));
        assert_eq!(first.queue_length, 3);

        let second = inbox.try_pop().unwrap();
        assert_eq!(second.message.clock, 2);
        assert_eq!(second.queue_length, 2);

        assert_eq!(inbox.size(), 1);
    }

    #[test]
    fn test_empty_pop() {
        let inbox = Inbox::new();
        assert!(inbox.is_empty());
        assert!(inbox.try_pop().is_none());
    }

    #[test]
    fn test_clones_share_queue() {
        let server_side = Inbox::new();
        let loop_side = server_side.clone();

        server_side.push(Message::new(9, "B"));
        assert_eq!(loop_side.size(), 1);
        assert_eq!(loop_side.try_pop().unwrap().message.clock, 9);
        assert!(server_side.is_empty());
    }

    #[test]
    fn test_concurrent_pushes_are_all_kept() {
        let inbox = Inbox::new();
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let inbox = inbox.clone();
                thread::spawn(move || {
                    for i in 0..100 {
                        inbox.push(Message::new(t * 100 + i, "X"));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(inbox.size(), 800);
        let mut drained = 0;
        while inbox.try_pop().is_some() {
            drained += 1;
        }
        assert_eq!(drained, 800);
    }
}
