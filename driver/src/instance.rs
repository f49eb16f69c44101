//! Execution driver for a single workflow instance.
//!
//! The instance owns a scheduler and runs the workflow function as one
//! coroutine on it. `execute` registers that coroutine and drives the first
//! pass; each `continue_execution` drives one more pass after the host has
//! delivered whatever the workflow is blocked on. The function body runs once:
//! a resumed pass continues from the suspension point, it never replays.

use std::cell::{Cell, OnceCell};
use std::rc::Rc;

use anyhow::{Result, anyhow};
use futures::FutureExt;
use tracing::{debug, info, instrument, warn};

use crate::core::binder;
use crate::core::codec::Codec;
use crate::core::errors::{DriverError, ProtocolError, SchedulerError};
use crate::core::payload::Payload;
use crate::core::resolver::{self, WorkflowOutcome};
use crate::core::signature::WorkflowFn;
use crate::io::config::DriverConfig;
use crate::runtime::context::Context;
use crate::runtime::scheduler::{CooperativeScheduler, Scheduler};
use crate::runtime::sync::Channel;

/// Lifecycle phase of a [`WorkflowInstance`].
///
/// `completed()` stays the authoritative terminal signal; the phase adds
/// detail for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Not started, or the inputs failed to bind.
    Created,
    /// The workflow function is being polled.
    Running,
    /// The last pass ended with the workflow blocked.
    Suspended,
    /// An outcome has been committed.
    Finished,
    /// The coroutine ended without an outcome: protocol error, panic or close.
    Aborted,
}

/// Drives one workflow function from its first call to its outcome.
///
/// Not `Send`: an instance and its coroutines stay on the thread that
/// created them.
pub struct WorkflowInstance<S: Scheduler = CooperativeScheduler> {
    scheduler: S,
    target: Rc<dyn WorkflowFn>,
    codec: Rc<dyn Codec>,
    outcome: Rc<OnceCell<WorkflowOutcome>>,
    phase: Rc<Cell<Phase>>,
    events: Channel<Payload>,
    started: bool,
}

impl WorkflowInstance<CooperativeScheduler> {
    pub fn new(target: Rc<dyn WorkflowFn>, codec: Rc<dyn Codec>, config: &DriverConfig) -> Self {
        Self::with_scheduler(CooperativeScheduler::from_config(config), target, codec)
    }
}

impl<S: Scheduler> WorkflowInstance<S> {
    pub fn with_scheduler(scheduler: S, target: Rc<dyn WorkflowFn>, codec: Rc<dyn Codec>) -> Self {
        Self {
            scheduler,
            target,
            codec,
            outcome: Rc::new(OnceCell::new()),
            phase: Rc::new(Cell::new(Phase::Created)),
            events: Channel::new(),
            started: false,
        }
    }

    /// Start the workflow with `inputs` and run the first scheduling pass.
    ///
    /// Business errors are captured and exposed through [`error`](Self::error).
    /// Protocol errors and scheduler failures are returned. Calling this twice
    /// fails with [`DriverError::AlreadyStarted`].
    #[instrument(skip_all, fields(inputs = inputs.len()))]
    pub fn execute(&mut self, ctx: &Context, inputs: Vec<Payload>) -> Result<()> {
        if self.started {
            return Err(DriverError::AlreadyStarted.into());
        }
        self.started = true;

        let call = WorkflowCall {
            target: Rc::clone(&self.target),
            codec: Rc::clone(&self.codec),
            outcome: Rc::clone(&self.outcome),
            phase: Rc::clone(&self.phase),
            inputs,
        };
        let ctx = ctx.with_events(self.events.clone());
        self.scheduler
            .new_coroutine(&ctx, Box::new(move |ctx| call.run(ctx).boxed_local()));
        self.run_pass(&ctx)
    }

    /// Run one more scheduling pass. A no-op once the instance has completed.
    #[instrument(skip_all, fields(phase = ?self.phase.get()))]
    pub fn continue_execution(&mut self, ctx: &Context) -> Result<()> {
        if !self.started {
            return Err(DriverError::NotStarted.into());
        }
        if self.completed() {
            debug!("instance already completed");
            return Ok(());
        }
        if self.phase.get() == Phase::Suspended {
            self.phase.set(Phase::Running);
        }
        self.run_pass(ctx)
    }

    /// True while no coroutine of this instance is left to run.
    pub fn completed(&self) -> bool {
        self.scheduler.running_coroutines() == 0
    }

    pub fn result(&self) -> Option<&Payload> {
        self.outcome.get().and_then(WorkflowOutcome::result)
    }

    pub fn error(&self) -> Option<&anyhow::Error> {
        self.outcome.get().and_then(WorkflowOutcome::error)
    }

    pub fn phase(&self) -> Phase {
        self.phase.get()
    }

    /// Channel the host uses to deliver external events between passes.
    pub fn events(&self) -> &Channel<Payload> {
        &self.events
    }

    /// Tear down every coroutine. Idempotent; a committed outcome stays readable.
    pub fn close(&mut self, ctx: &Context) {
        let running = self.scheduler.running_coroutines();
        if running > 0 {
            info!(running, "closing suspended instance");
        }
        self.scheduler.exit(ctx);
        self.started = true;
        self.events.close();
        let live = matches!(self.phase.get(), Phase::Running | Phase::Suspended);
        if live && self.outcome.get().is_none() {
            self.phase.set(Phase::Aborted);
        }
    }

    fn run_pass(&mut self, ctx: &Context) -> Result<()> {
        let result = self.scheduler.execute(ctx);
        if let Err(err) = &result {
            warn!(error = %format!("{err:#}"), "scheduling pass failed");
        }
        self.settle(&result);
        result
    }

    /// A pass that stopped on the poll budget leaves the workflow resumable.
    fn settle(&self, result: &Result<()>) {
        if !matches!(self.phase.get(), Phase::Running | Phase::Suspended) {
            return;
        }
        let fatal = result.as_ref().err().is_some_and(|err| {
            err.downcast_ref::<ProtocolError>().is_some()
                || matches!(
                    err.downcast_ref::<SchedulerError>(),
                    Some(SchedulerError::Panicked { .. })
                )
        });
        let next = if fatal || self.scheduler.running_coroutines() == 0 {
            Phase::Aborted
        } else {
            Phase::Suspended
        };
        debug!(phase = ?next, "pass settled");
        self.phase.set(next);
    }
}

/// Body of the workflow coroutine: bind, invoke, resolve, commit.
struct WorkflowCall {
    target: Rc<dyn WorkflowFn>,
    codec: Rc<dyn Codec>,
    outcome: Rc<OnceCell<WorkflowOutcome>>,
    phase: Rc<Cell<Phase>>,
    inputs: Vec<Payload>,
}

impl WorkflowCall {
    async fn run(self, ctx: Context) -> Result<()> {
        let args = binder::bind(self.target.signature(), self.codec.as_ref(), &self.inputs)
            .inspect_err(|err| warn!(%err, "binding workflow inputs failed"))?;
        self.phase.set(Phase::Running);
        debug!(args = args.len(), "workflow invoked");

        let values = self.target.call(ctx, args)?.await;
        let outcome = resolver::resolve(self.codec.as_ref(), values)
            .inspect_err(|err| warn!(%err, "resolving workflow result failed"))?;
        info!(failed = outcome.error().is_some(), "workflow returned");
        if self.outcome.set(outcome).is_err() {
            return Err(anyhow!("workflow outcome committed twice"));
        }
        if self.phase.get() != Phase::Aborted {
            self.phase.set(Phase::Finished);
        }
        Ok(())
    }
}
