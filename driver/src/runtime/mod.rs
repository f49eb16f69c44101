//! Cooperative execution: the scheduler, the context handed to workflow code,
//! and the primitives coroutines block on.

pub mod context;
pub mod scheduler;
pub mod sync;
