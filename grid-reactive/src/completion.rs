use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use tokio::sync::oneshot;

/// Sending half of a [`Completion`]. Dropping it without completing cancels the completion.
pub struct Completer<T> {
    sender: oneshot::Sender<T>,
}

impl<T> Completer<T> {
    pub fn complete(self, value: T) {
        // The receiver may have been dropped; nobody is waiting then.
        let _ = self.sender.send(value);
    }
}

/// Resolves once a deferred operation has been applied.
///
/// Await it from async code, or poll it with [`Completion::try_take`] after
/// pumping frames by hand.
pub struct Completion<T> {
    receiver: oneshot::Receiver<T>,
    // a value received by `is_canceled` before anyone took it
    value: Option<T>,
}

// Neither field is ever pinned in place.
impl<T> Unpin for Completion<T> {}

impl<T> std::fmt::Debug for Completion<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Completion")
            .field("received", &self.value.is_some())
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Canceled;

impl std::fmt::Display for Canceled {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("operation was dropped before completing")
    }
}

impl std::error::Error for Canceled {}

pub fn completion<T>() -> (Completer<T>, Completion<T>) {
    let (sender, receiver) = oneshot::channel();
    (
        Completer { sender },
        Completion {
            receiver,
            value: None,
        },
    )
}

impl<T> Completion<T> {
    /// A completion that has already resolved.
    pub fn ready(value: T) -> Self {
        let (completer, completion) = completion();
        completer.complete(value);
        completion
    }

    /// Takes the value if the operation has finished.
    pub fn try_take(&mut self) -> Option<T> {
        self.value.take().or_else(|| self.receiver.try_recv().ok())
    }

    /// True when the operation was dropped without a value. A value that has
    /// already arrived is kept for [`Completion::try_take`] or `.await`.
    pub fn is_canceled(&mut self) -> bool {
        if self.value.is_some() {
            return false;
        }
        match self.receiver.try_recv() {
            Ok(value) => {
                self.value = Some(value);
                false
            }
            Err(oneshot::error::TryRecvError::Empty) => false,
            Err(oneshot::error::TryRecvError::Closed) => true,
        }
    }
}

impl<T> Future for Completion<T> {
    type Output = Result<T, Canceled>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if let Some(value) = self.value.take() {
            return Poll::Ready(Ok(value));
        }
        Pin::new(&mut self.receiver).poll(cx).map_err(|_| Canceled)
    }
}

type FanInCallback = Box<dyn FnOnce() + Send>;

struct FanInState {
    arrived: usize,
    on_complete: Option<FanInCallback>,
}

/// Counts completions against an expected total and fires once when the total is reached.
#[derive(Clone)]
pub struct FanIn {
    total: usize,
    state: Arc<Mutex<FanInState>>,
}

impl FanIn {
    /// With a total of zero the callback fires immediately.
    pub fn new<F>(total: usize, on_complete: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        let fan_in = Self {
            total,
            state: Arc::new(Mutex::new(FanInState {
                arrived: 0,
                on_complete: Some(Box::new(on_complete)),
            })),
        };
        if total == 0 {
            fan_in.fire();
        }
        fan_in
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn arrived(&self) -> usize {
        self.state.lock().map(|state| state.arrived).unwrap_or(0)
    }

    /// Records one completion. Arrivals beyond the total are ignored.
    pub fn arrive(&self) {
        let reached = match self.state.lock() {
            Ok(mut state) if state.arrived < self.total => {
                state.arrived += 1;
                state.arrived == self.total
            }
            _ => false,
        };
        if reached {
            self.fire();
        }
    }

    fn fire(&self) {
        // Taken under the lock, run outside it.
        let callback = self
            .state
            .lock()
            .ok()
            .and_then(|mut state| state.on_complete.take());
        if let Some(callback) = callback {
            callback();
        }
    }
}
