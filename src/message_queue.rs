//! A small fan-out queue carrying applied sync updates to observers.
//!
//! This is the seam a reactive binding layer attaches to. Late
//! subscribers start from the next update; the current mirror is always
//! available from the session directly, so there is no history to replay.

use std::sync::Mutex;

use crossbeam_channel::{unbounded, Receiver, Sender};

pub struct MessageQueue<T> {
    subscribers: Mutex<Vec<Sender<T>>>,
}

impl<T: Clone> MessageQueue<T> {
    pub fn new() -> MessageQueue<T> {
        MessageQueue {
            subscribers: Mutex::new(Vec::new()),
        }
    }

    /// Delivers `message` to every live subscriber. Subscribers whose
    /// receiver was dropped are pruned on the way through.
    pub fn push(&self, message: T) {
        let mut subscribers = self.subscribers.lock().unwrap();
        subscribers.retain(|subscriber| subscriber.send(message.clone()).is_ok());
    }

    pub fn subscribe(&self) -> Receiver<T> {
        let (sender, receiver) = unbounded();
        self.subscribers.lock().unwrap().push(sender);
        receiver
    }
}

impl<T: Clone> Default for MessageQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}
