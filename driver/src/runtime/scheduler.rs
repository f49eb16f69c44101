//! Cooperative scheduler: runs coroutines only when the host drives a pass.
//!
//! A coroutine is a boxed local future. Each one owns a waker that flags it
//! ready; blocking primitives wake it when there is something to observe. A
//! pass polls ready coroutines in registration order until none is ready, so
//! every coroutine either finishes or is parked on a primitive when the pass
//! returns.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::task::{Context as TaskContext, Poll, Wake, Waker};

use anyhow::{Context as _, Result};
use futures::future::LocalBoxFuture;
use tracing::{debug, instrument, warn};

use crate::core::errors::SchedulerError;
use crate::io::config::DriverConfig;
use crate::runtime::context::Context;

/// Body of a coroutine. Receives the context bound to the new coroutine.
pub type CoroutineBody = Box<dyn FnOnce(Context) -> LocalBoxFuture<'static, Result<()>>>;

/// Suspend/resume substrate consumed by the driver.
pub trait Scheduler {
    /// Register a unit of cooperative work. It first runs on the next pass.
    fn new_coroutine(&mut self, ctx: &Context, body: CoroutineBody);

    /// Run one scheduling pass. A coroutine body returning an error aborts the pass.
    fn execute(&mut self, ctx: &Context) -> Result<()>;

    /// Coroutines that have not finished, blocked ones included.
    fn running_coroutines(&self) -> usize;

    /// Tear down every coroutine without running it further.
    fn exit(&mut self, ctx: &Context);
}

struct ReadyFlag(AtomicBool);

impl ReadyFlag {
    fn new() -> Arc<Self> {
        Arc::new(Self(AtomicBool::new(true)))
    }

    fn is_set(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    fn clear(&self) {
        self.0.store(false, Ordering::Release);
    }
}

impl Wake for ReadyFlag {
    fn wake(self: Arc<Self>) {
        self.wake_by_ref();
    }

    fn wake_by_ref(self: &Arc<Self>) {
        self.0.store(true, Ordering::Release);
    }
}

struct Coroutine {
    name: String,
    future: LocalBoxFuture<'static, Result<()>>,
    ready: Arc<ReadyFlag>,
}

/// Coroutines registered but not yet adopted by the scheduler.
///
/// Contexts hold a weak handle to it so workflow code can spawn while a pass
/// is running.
pub(crate) struct Spawner {
    pending: RefCell<Vec<Coroutine>>,
    next_id: Cell<usize>,
}

impl Spawner {
    fn new() -> Rc<Self> {
        Rc::new(Self {
            pending: RefCell::new(Vec::new()),
            next_id: Cell::new(0),
        })
    }

    pub(crate) fn spawn(self: &Rc<Self>, parent: &Context, body: CoroutineBody) {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        let name = format!("coroutine-{id}");
        let ctx = parent.for_coroutine(name.clone(), Rc::downgrade(self));
        let future = body(ctx);
        debug!(coroutine = %name, "coroutine registered");
        self.pending.borrow_mut().push(Coroutine {
            name,
            future,
            ready: ReadyFlag::new(),
        });
    }

    fn take_pending(&self) -> Vec<Coroutine> {
        std::mem::take(&mut *self.pending.borrow_mut())
    }

    fn pending_len(&self) -> usize {
        self.pending.borrow().len()
    }
}

enum Polled {
    Pending,
    Finished(Result<()>),
    Panicked(String),
}

/// Single-threaded [`Scheduler`] with a per-pass poll budget.
pub struct CooperativeScheduler {
    coroutines: Vec<Coroutine>,
    spawner: Rc<Spawner>,
    max_polls_per_pass: usize,
}

impl CooperativeScheduler {
    pub fn new(max_polls_per_pass: usize) -> Self {
        Self {
            coroutines: Vec::new(),
            spawner: Spawner::new(),
            max_polls_per_pass,
        }
    }

    pub fn from_config(config: &DriverConfig) -> Self {
        Self::new(config.max_polls_per_pass)
    }

    fn adopt_pending(&mut self) {
        let pending = self.spawner.take_pending();
        self.coroutines.extend(pending);
    }

    fn poll_at(&mut self, index: usize) -> Polled {
        let coroutine = &mut self.coroutines[index];
        coroutine.ready.clear();
        let waker = Waker::from(Arc::clone(&coroutine.ready));
        let mut cx = TaskContext::from_waker(&waker);
        let future = &mut coroutine.future;
        match panic::catch_unwind(AssertUnwindSafe(|| future.as_mut().poll(&mut cx))) {
            Ok(Poll::Pending) => Polled::Pending,
            Ok(Poll::Ready(result)) => Polled::Finished(result),
            Err(payload) => Polled::Panicked(panic_message(payload.as_ref())),
        }
    }
}

impl Default for CooperativeScheduler {
    fn default() -> Self {
        Self::from_config(&DriverConfig::default())
    }
}

impl Scheduler for CooperativeScheduler {
    fn new_coroutine(&mut self, ctx: &Context, body: CoroutineBody) {
        self.spawner.spawn(ctx, body);
        self.adopt_pending();
    }

    #[instrument(skip_all, fields(coroutines = self.running_coroutines()))]
    fn execute(&mut self, _ctx: &Context) -> Result<()> {
        let mut polls = 0usize;
        loop {
            self.adopt_pending();
            let mut progressed = false;
            let mut index = 0;
            while index < self.coroutines.len() {
                if !self.coroutines[index].ready.is_set() {
                    index += 1;
                    continue;
                }
                if polls == self.max_polls_per_pass {
                    warn!(limit = self.max_polls_per_pass, "poll budget exhausted");
                    return Err(SchedulerError::PollBudgetExceeded {
                        limit: self.max_polls_per_pass,
                    }
                    .into());
                }
                polls += 1;
                progressed = true;

                match self.poll_at(index) {
                    Polled::Pending => index += 1,
                    Polled::Finished(result) => {
                        let coroutine = self.coroutines.remove(index);
                        debug!(coroutine = %coroutine.name, ok = result.is_ok(), "coroutine finished");
                        result.with_context(|| format!("coroutine {} failed", coroutine.name))?;
                    }
                    Polled::Panicked(message) => {
                        let coroutine = self.coroutines.remove(index);
                        warn!(coroutine = %coroutine.name, %message, "coroutine panicked");
                        return Err(SchedulerError::Panicked {
                            name: coroutine.name,
                            message,
                        }
                        .into());
                    }
                }
            }
            if !progressed {
                debug!(polls, remaining = self.running_coroutines(), "pass settled");
                return Ok(());
            }
        }
    }

    fn running_coroutines(&self) -> usize {
        self.coroutines.len() + self.spawner.pending_len()
    }

    fn exit(&mut self, _ctx: &Context) {
        let count = self.running_coroutines();
        if count > 0 {
            debug!(count, "tearing down coroutines");
        }
        drop(std::mem::take(&mut self.coroutines));
        // Destructors of dropped coroutines may register new ones.
        loop {
            let pending = self.spawner.take_pending();
            if pending.is_empty() {
                break;
            }
            drop(pending);
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        return (*message).to_string();
    }
    if let Some(message) = payload.downcast_ref::<String>() {
        return message.clone();
    }
    "non-string panic payload".to_string()
}

#[cfg(test)]
mod tests {
    use anyhow::anyhow;
    use futures::FutureExt;

    use super::*;
    use crate::runtime::sync::SettableFuture;

    fn body<F, Fut>(f: F) -> CoroutineBody
    where
        F: FnOnce(Context) -> Fut + 'static,
        Fut: Future<Output = Result<()>> + 'static,
    {
        Box::new(move |ctx| f(ctx).boxed_local())
    }

    #[test]
    fn runs_non_blocking_coroutine_to_completion() {
        let ctx = Context::background();
        let mut scheduler = CooperativeScheduler::default();
        let ran = Rc::new(Cell::new(false));
        let flag = Rc::clone(&ran);
        scheduler.new_coroutine(
            &ctx,
            body(move |_| async move {
                flag.set(true);
                Ok(())
            }),
        );
        assert_eq!(scheduler.running_coroutines(), 1);

        scheduler.execute(&ctx).expect("execute");
        assert!(ran.get());
        assert_eq!(scheduler.running_coroutines(), 0);
    }

    #[test]
    fn blocked_coroutine_resumes_after_external_set() {
        let ctx = Context::background();
        let mut scheduler = CooperativeScheduler::default();
        let signal = SettableFuture::<u32>::new();
        let seen = Rc::new(RefCell::new(Vec::new()));

        let (waiting, log) = (signal.clone(), Rc::clone(&seen));
        scheduler.new_coroutine(
            &ctx,
            body(move |_| async move {
                log.borrow_mut().push("before");
                let value = waiting.get().await;
                log.borrow_mut().push(if value == 7 { "after" } else { "wrong" });
                Ok(())
            }),
        );

        scheduler.execute(&ctx).expect("first pass");
        assert_eq!(scheduler.running_coroutines(), 1);
        scheduler.execute(&ctx).expect("idle pass");
        assert_eq!(*seen.borrow(), vec!["before"]);

        signal.set(7).expect("set");
        scheduler.execute(&ctx).expect("resume pass");
        assert_eq!(scheduler.running_coroutines(), 0);
        assert_eq!(*seen.borrow(), vec!["before", "after"]);
    }

    #[test]
    fn failing_body_aborts_the_pass_with_context() {
        let ctx = Context::background();
        let mut scheduler = CooperativeScheduler::default();
        scheduler.new_coroutine(&ctx, body(|_| async { Err(anyhow!("bad shape")) }));

        let err = scheduler.execute(&ctx).expect_err("body error");
        assert_eq!(format!("{err:#}"), "coroutine coroutine-0 failed: bad shape");
        assert_eq!(scheduler.running_coroutines(), 0);
    }

    #[test]
    fn panics_are_reported_as_scheduler_errors() {
        let ctx = Context::background();
        let mut scheduler = CooperativeScheduler::default();
        fn explode() -> Result<()> {
            panic!("workflow exploded");
        }
        scheduler.new_coroutine(&ctx, body(|_| async { explode() }));

        let err = scheduler.execute(&ctx).expect_err("panic");
        let panicked = err.downcast_ref::<SchedulerError>().expect("scheduler error");
        assert_eq!(
            panicked,
            &SchedulerError::Panicked {
                name: "coroutine-0".to_string(),
                message: "workflow exploded".to_string(),
            }
        );
        assert_eq!(scheduler.running_coroutines(), 0);
    }

    #[test]
    fn busy_coroutine_exhausts_the_poll_budget() {
        let ctx = Context::background();
        let mut scheduler = CooperativeScheduler::new(5);
        scheduler.new_coroutine(
            &ctx,
            body(|ctx| async move {
                for _ in 0..1_000 {
                    ctx.yield_now().await;
                }
                Ok(())
            }),
        );

        let err = scheduler.execute(&ctx).expect_err("livelock");
        assert_eq!(
            err.downcast_ref::<SchedulerError>(),
            Some(&SchedulerError::PollBudgetExceeded { limit: 5 })
        );
        assert_eq!(scheduler.running_coroutines(), 1);
    }

    #[test]
    fn spawned_coroutines_run_in_the_same_pass() {
        let ctx = Context::background();
        let mut scheduler = CooperativeScheduler::default();
        let order = Rc::new(RefCell::new(Vec::new()));

        let log = Rc::clone(&order);
        scheduler.new_coroutine(
            &ctx,
            body(move |ctx| async move {
                let child_log = Rc::clone(&log);
                ctx.go(move |ctx| async move {
                    child_log
                        .borrow_mut()
                        .push(ctx.coroutine_name().unwrap_or_default().to_string());
                    Ok(())
                })?;
                log.borrow_mut().push("parent".to_string());
                anyhow::Ok(())
            }),
        );

        scheduler.execute(&ctx).expect("execute");
        assert_eq!(*order.borrow(), vec!["parent", "coroutine-1"]);
        assert_eq!(scheduler.running_coroutines(), 0);
    }

    #[test]
    fn exit_drops_blocked_coroutines() {
        struct DropGuard(Rc<Cell<bool>>);
        impl Drop for DropGuard {
            fn drop(&mut self) {
                self.0.set(true);
            }
        }

        let ctx = Context::background();
        let mut scheduler = CooperativeScheduler::default();
        let never = SettableFuture::<()>::new();
        let dropped = Rc::new(Cell::new(false));
        let guard = DropGuard(Rc::clone(&dropped));
        scheduler.new_coroutine(
            &ctx,
            body(move |_| async move {
                let _guard = guard;
                never.get().await;
                Ok(())
            }),
        );
        scheduler.execute(&ctx).expect("execute");
        assert_eq!(scheduler.running_coroutines(), 1);

        scheduler.exit(&ctx);
        assert!(dropped.get());
        assert_eq!(scheduler.running_coroutines(), 0);

        scheduler.exit(&ctx);
        assert_eq!(scheduler.running_coroutines(), 0);
    }
}
