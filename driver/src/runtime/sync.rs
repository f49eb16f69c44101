//! Blocking primitives for coroutines.
//!
//! Thin handles over `futures::channel`: a oneshot shared between readers for
//! [`SettableFuture`] and an unbounded mpsc for [`Channel`]. The channel types
//! wake the awaiting coroutine through whatever waker polled them, so they run
//! on the driver's own scheduler. Nothing here is thread-safe: a workflow
//! instance and everything it spawns live on one thread.

use std::cell::RefCell;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context as TaskContext, Poll};

use futures::FutureExt;
use futures::StreamExt;
use futures::channel::{mpsc, oneshot};
use futures::future::Shared;

use crate::core::errors::SyncError;

/// A value that is set once and read by any number of coroutines.
pub struct SettableFuture<T> {
    sender: Rc<RefCell<Option<oneshot::Sender<T>>>>,
    value: Shared<oneshot::Receiver<T>>,
}

impl<T: Clone> SettableFuture<T> {
    pub fn new() -> Self {
        let (sender, receiver) = oneshot::channel();
        Self {
            sender: Rc::new(RefCell::new(Some(sender))),
            value: receiver.shared(),
        }
    }

    /// Store `value` and wake every waiting coroutine.
    pub fn set(&self, value: T) -> Result<(), SyncError> {
        let sender = self
            .sender
            .borrow_mut()
            .take()
            .ok_or(SyncError::AlreadySet)?;
        // `self.value` keeps the receiver alive, so the send cannot be refused.
        sender.send(value).map_err(|_| SyncError::Closed)
    }

    /// Wait for the value.
    pub fn get(&self) -> Get<T> {
        Get {
            _sender: Rc::clone(&self.sender),
            value: self.value.clone(),
        }
    }
}

impl<T: Clone> Clone for SettableFuture<T> {
    fn clone(&self) -> Self {
        Self {
            sender: Rc::clone(&self.sender),
            value: self.value.clone(),
        }
    }
}

impl<T: Clone> Default for SettableFuture<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for SettableFuture<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SettableFuture")
            .field("set", &self.sender.borrow().is_none())
            .finish()
    }
}

/// Future returned by [`SettableFuture::get`].
pub struct Get<T> {
    // Held so the sender cannot be dropped unsent while a reader waits.
    _sender: Rc<RefCell<Option<oneshot::Sender<T>>>>,
    value: Shared<oneshot::Receiver<T>>,
}

impl<T: Clone> Future for Get<T> {
    type Output = T;

    fn poll(mut self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<T> {
        match self.value.poll_unpin(cx) {
            Poll::Ready(Ok(value)) => Poll::Ready(value),
            Poll::Ready(Err(oneshot::Canceled)) | Poll::Pending => Poll::Pending,
        }
    }
}

/// An unbounded FIFO channel between coroutines and the host.
///
/// Sends never block. One coroutine at a time may wait in
/// [`receive`](Channel::receive); it parks until a value is queued or the
/// channel is closed.
pub struct Channel<T> {
    sender: mpsc::UnboundedSender<T>,
    receiver: Rc<RefCell<mpsc::UnboundedReceiver<T>>>,
}

impl<T> Channel<T> {
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::unbounded();
        Self {
            sender,
            receiver: Rc::new(RefCell::new(receiver)),
        }
    }

    pub fn send(&self, value: T) -> Result<(), SyncError> {
        self.sender
            .unbounded_send(value)
            .map_err(|_| SyncError::Closed)
    }

    /// Stop accepting values. Queued values can still be received.
    pub fn close(&self) {
        self.sender.close_channel();
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    /// Take the next queued value without waiting.
    pub fn try_receive(&self) -> Option<T> {
        self.receiver.borrow_mut().try_next().ok().flatten()
    }

    /// Wait for the next value. `None` once the channel is closed and drained.
    pub fn receive(&self) -> Receive<T> {
        Receive {
            receiver: Rc::clone(&self.receiver),
        }
    }
}

impl<T> Clone for Channel<T> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
            receiver: Rc::clone(&self.receiver),
        }
    }
}

impl<T> Default for Channel<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for Channel<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Channel")
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Future returned by [`Channel::receive`].
pub struct Receive<T> {
    receiver: Rc<RefCell<mpsc::UnboundedReceiver<T>>>,
}

impl<T> Future for Receive<T> {
    type Output = Option<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<Option<T>> {
        self.receiver.borrow_mut().poll_next_unpin(cx)
    }
}
