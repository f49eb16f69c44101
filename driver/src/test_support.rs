//! Test-only helpers: scripted workflow functions, a failing codec and payload
//! shorthands.

use std::any::Any;
use std::cell::Cell;
use std::rc::Rc;

use futures::FutureExt;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::core::codec::{Codec, Encodable};
use crate::core::errors::{CodecError, ProtocolError};
use crate::core::payload::Payload;
use crate::core::signature::{Invocation, Param, ReturnValue, Signature, WorkflowFn};
use crate::runtime::context::Context;

/// A dynamic [`WorkflowFn`] with a hand-written signature and scripted returns.
///
/// Lets tests declare shapes the typed adapters can never produce, such as a
/// missing context slot or three return values.
pub struct ScriptedWorkflow {
    signature: Signature,
    returns: Box<dyn Fn() -> Vec<ReturnValue>>,
    calls: Cell<usize>,
}

impl ScriptedWorkflow {
    pub fn new(params: Vec<Param>, returns: impl Fn() -> Vec<ReturnValue> + 'static) -> Rc<Self> {
        Rc::new(Self {
            signature: Signature::new(params),
            returns: Box::new(returns),
            calls: Cell::new(0),
        })
    }

    /// Number of times the driver invoked the function.
    pub fn calls(&self) -> usize {
        self.calls.get()
    }
}

impl WorkflowFn for ScriptedWorkflow {
    fn signature(&self) -> &Signature {
        &self.signature
    }

    fn call(&self, _ctx: Context, _args: Vec<Box<dyn Any>>) -> Result<Invocation, ProtocolError> {
        self.calls.set(self.calls.get() + 1);
        let values = (self.returns)();
        Ok(async move { values }.boxed_local())
    }
}

/// Codec that refuses every conversion.
#[derive(Debug, Default, Clone, Copy)]
pub struct FailingCodec;

impl Codec for FailingCodec {
    fn to(&self, _value: &dyn Encodable) -> Result<Payload, CodecError> {
        Err(CodecError::Unsupported {
            kind: "anything (failing codec)",
        })
    }

    fn from(&self, _payload: &Payload) -> Result<Value, CodecError> {
        Err(CodecError::Unsupported {
            kind: "anything (failing codec)",
        })
    }
}

/// Encode `value` as a JSON payload.
pub fn payload<T: Serialize + ?Sized>(value: &T) -> Payload {
    Payload::encode(value).expect("encode test payload")
}

/// Decode a JSON payload, panicking on malformed data.
pub fn decode<T: DeserializeOwned>(payload: &Payload) -> T {
    payload.decode().expect("decode test payload")
}
