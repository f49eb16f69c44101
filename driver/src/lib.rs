//! Deterministic workflow execution driver.
//!
//! A workflow is an async function whose first parameter is a [`Context`].
//! A [`WorkflowInstance`] runs it on a cooperative scheduler across several
//! host calls: `execute` starts it, `continue_execution` resumes it after the
//! host has delivered whatever it is blocked on, and `result`/`error` expose
//! the committed outcome once `completed` reports true.
//!
//! - **[`core`]**: pure logic. Payloads, the codec boundary, signatures,
//!   argument binding and result resolution.
//! - **[`runtime`]**: the scheduler, contexts and blocking primitives.
//! - **[`io`]**: configuration on disk.
//!
//! [`Context`]: runtime::context::Context
//! [`WorkflowInstance`]: instance::WorkflowInstance

pub mod core;
pub mod demo;
pub mod exit_codes;
pub mod instance;
pub mod io;
pub mod logging;
pub mod registry;
pub mod runtime;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
