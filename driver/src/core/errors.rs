//! Error classes a host has to tell apart.
//!
//! A [`ProtocolError`] means the workflow function violates the invocation
//! contract: a defect in the function definition, never worth retrying. It is
//! surfaced from `execute`/`continue_execution` inside an `anyhow::Error`;
//! recover it with `err.downcast_ref::<ProtocolError>()`.
//!
//! Business errors are not represented here. They are whatever `anyhow::Error`
//! the workflow itself returned and are read back through
//! [`WorkflowInstance::error`](crate::instance::WorkflowInstance::error).

/// Conversion failure between native values and payloads.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("encode {type_name}")]
    Encode {
        type_name: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("decode payload")]
    Decode(#[source] serde_json::Error),
    #[error("payload of {size} bytes exceeds limit of {limit} bytes")]
    TooLarge { size: usize, limit: usize },
    #[error("{kind} cannot be encoded as a payload")]
    Unsupported { kind: &'static str },
}

/// The workflow function's shape violates the driver's invocation contract.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("workflow must accept context as first argument")]
    MissingContext,
    #[error("workflow parameter {position} is a context; only the first parameter may be")]
    UnexpectedContext { position: usize },
    #[error("workflow expects {expected} input(s) but {actual} were given")]
    ArgumentCount { expected: usize, actual: usize },
    #[error("converting workflow input for parameter {position} ({type_name})")]
    ConvertArgument {
        position: usize,
        type_name: &'static str,
        #[source]
        source: CodecError,
    },
    #[error("workflow parameter {position} was bound to a value that is not {type_name}")]
    ArgumentType {
        position: usize,
        type_name: &'static str,
    },
    #[error("workflow has to return either (error) or (result, error), got {count} value(s)")]
    ReturnArity { count: usize },
    #[error("converting workflow result")]
    ConvertResult(#[source] CodecError),
    #[error("workflow error result does not satisfy the error capability ({type_name})")]
    ErrorSlot { type_name: &'static str },
}

/// Misuse of the driver surface by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DriverError {
    #[error("workflow instance already started")]
    AlreadyStarted,
    #[error("workflow instance not started (call execute first)")]
    NotStarted,
}

/// Failure of the cooperative scheduler itself.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchedulerError {
    #[error("coroutine {name} panicked: {message}")]
    Panicked { name: String, message: String },
    #[error("scheduling pass exceeded {limit} polls")]
    PollBudgetExceeded { limit: usize },
    #[error("context is not attached to a running scheduler")]
    Detached,
}

/// Misuse of a blocking primitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SyncError {
    #[error("future already set")]
    AlreadySet,
    #[error("send on closed channel")]
    Closed,
}
