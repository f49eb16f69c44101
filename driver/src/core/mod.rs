//! Deterministic logic of the driver: binding, resolution, and their types.
//!
//! Nothing here drives the scheduler or performs I/O. Every function takes its
//! collaborators (codec, signature) as arguments and is testable in isolation.

pub mod binder;
pub mod codec;
pub mod errors;
pub mod payload;
pub mod resolver;
pub mod signature;
