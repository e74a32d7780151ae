//! Fan-in correlator for scatter/gather queries.
//!
//! A shuttle is created expecting a fixed number of partial responses, one
//! per open-loop it was handed to. When the last response arrives the
//! completion closure fires exactly once, on whichever worker thread
//! delivered it, receiving the accumulated responses in arrival order. The
//! closure owns the reply handle it captured, so replying and freeing happen
//! by ownership transfer rather than an explicit release call.

use std::sync::{Arc, Mutex};

use tracing::error;

type Completion<T> = Box<dyn FnOnce(Vec<T>) + Send>;

struct Inner<T> {
    received: usize,
    responses: Vec<T>,
    on_complete: Option<Completion<T>>,
}

pub struct Shuttle<T> {
    expected: usize,
    inner: Mutex<Inner<T>>,
}

impl<T: Send> Shuttle<T> {
    /// Build a shuttle awaiting `expected` responses. `expected` must be at
    /// least one; a coordinator with zero partitions short-circuits before
    /// creating a shuttle.
    pub fn new(expected: usize, on_complete: impl FnOnce(Vec<T>) + Send + 'static) -> Arc<Self> {
        assert!(expected > 0, "shuttle must expect at least one response");
        Arc::new(Self {
            expected,
            inner: Mutex::new(Inner {
                received: 0,
                responses: Vec::with_capacity(expected),
                on_complete: Some(Box::new(on_complete)),
            }),
        })
    }

    /// The single-response variant used for person lookups.
    pub fn single(on_complete: impl FnOnce(Vec<T>) + Send + 'static) -> Arc<Self> {
        Self::new(1, on_complete)
    }

    pub fn expected(&self) -> usize {
        self.expected
    }

    /// Deliver one partial response. The caller that delivers the final
    /// response runs the completion closure, outside the shuttle lock.
    pub fn reply(&self, response: T) {
        let fire = {
            let mut inner = self.inner.lock().unwrap();
            if inner.on_complete.is_none() {
                // Precondition violation: a loop replied twice or after
                // completion. Drop the response rather than corrupt state.
                error!("shuttle received a response after completion");
                debug_assert!(false, "shuttle reply after completion");
                return;
            }
            inner.responses.push(response);
            inner.received += 1;
            if inner.received == self.expected {
                let callback = inner.on_complete.take();
                let responses = std::mem::take(&mut inner.responses);
                callback.map(|cb| (cb, responses))
            } else {
                None
            }
        };

        if let Some((callback, responses)) = fire {
            callback(responses);
        }
    }
}
