//! Rendezvous between the dispatcher and endpoint readers.
//!
//! A plain FIFO with a notify primitive: the dispatcher pushes completed
//! responses, readers block on `pop_wait` until an item or cancellation
//! arrives. Cancellation never consumes an item, and no item is ever
//! delivered to more than one waiter.

use parking_lot::Mutex;
use std::collections::VecDeque;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use crate::net::types::Response;

#[derive(Default)]
pub struct ResponseQueue {
    items: Mutex<VecDeque<Response>>,
    notify: Notify,
}

impl ResponseQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, response: Response) {
        self.items.lock().push_back(response);
        self.notify.notify_waiters();
    }

    pub fn try_pop(&self) -> Option<Response> {
        self.items.lock().pop_front()
    }

    /// Block until a response is available or the token is cancelled.
    /// Returns `None` on cancellation.
    pub async fn pop_wait(&self, cancel: &CancellationToken) -> Option<Response> {
        loop {
            // register for a wakeup before checking the queue, otherwise a
            // push between the check and the wait would be missed
            let notified = self.notify.notified();
            if let Some(response) = self.try_pop() {
                return Some(response);
            }
            tokio::select! {
                _ = cancel.cancelled() => return None,
                _ = notified => {}
            }
        }
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }
}
