//! Execution context handed to every coroutine.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::rc::{Rc, Weak};
use std::task::{Context as TaskContext, Poll};

use anyhow::Result;
use futures::FutureExt;

use crate::core::errors::SchedulerError;
use crate::core::payload::Payload;
use crate::runtime::scheduler::Spawner;
use crate::runtime::sync::Channel;

/// Handle through which workflow code observes and extends its execution.
///
/// Cheap to clone. A context obtained inside a coroutine is attached to the
/// scheduler running it; [`Context::background`] is not attached to any.
#[derive(Clone)]
pub struct Context {
    inner: Rc<ContextInner>,
}

struct ContextInner {
    coroutine: Option<String>,
    spawner: Weak<Spawner>,
    events: Option<Channel<Payload>>,
}

impl Context {
    /// Root context for a host.
    pub fn background() -> Self {
        Self {
            inner: Rc::new(ContextInner {
                coroutine: None,
                spawner: Weak::new(),
                events: None,
            }),
        }
    }

    /// Derive a context that carries `events` to the coroutines started from it.
    pub fn with_events(&self, events: Channel<Payload>) -> Self {
        Self {
            inner: Rc::new(ContextInner {
                coroutine: self.inner.coroutine.clone(),
                spawner: self.inner.spawner.clone(),
                events: Some(events),
            }),
        }
    }

    pub(crate) fn for_coroutine(&self, name: String, spawner: Weak<Spawner>) -> Self {
        Self {
            inner: Rc::new(ContextInner {
                coroutine: Some(name),
                spawner,
                events: self.inner.events.clone(),
            }),
        }
    }

    /// Name of the coroutine this context belongs to.
    pub fn coroutine_name(&self) -> Option<&str> {
        self.inner.coroutine.as_deref()
    }

    /// External events delivered to the workflow instance, if any.
    pub fn events(&self) -> Option<&Channel<Payload>> {
        self.inner.events.as_ref()
    }

    /// Start a child coroutine on the scheduler running this context.
    ///
    /// The child counts as running work until it returns, so the owning
    /// instance does not complete before its children do.
    pub fn go<F, Fut>(&self, body: F) -> Result<(), SchedulerError>
    where
        F: FnOnce(Context) -> Fut + 'static,
        Fut: Future<Output = Result<()>> + 'static,
    {
        let spawner = self.inner.spawner.upgrade().ok_or(SchedulerError::Detached)?;
        spawner.spawn(self, Box::new(move |ctx| body(ctx).boxed_local()));
        Ok(())
    }

    /// Give other ready coroutines a turn. Resumes within the same pass.
    pub fn yield_now(&self) -> YieldNow {
        YieldNow { yielded: false }
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("coroutine", &self.inner.coroutine)
            .field("attached", &(self.inner.spawner.strong_count() > 0))
            .field("events", &self.inner.events.is_some())
            .finish()
    }
}

/// Future returned by [`Context::yield_now`].
#[derive(Debug)]
pub struct YieldNow {
    yielded: bool,
}

impl Future for YieldNow {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<()> {
        if self.yielded {
            return Poll::Ready(());
        }
        self.yielded = true;
        cx.waker().wake_by_ref();
        Poll::Pending
    }
}
