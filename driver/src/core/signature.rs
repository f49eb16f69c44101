//! Signature binder: how the driver sees a workflow function.
//!
//! Rust has no runtime reflection, so a workflow function is described by a
//! [`WorkflowFn`]: a declared parameter list plus a boxed-argument call. Typed
//! async closures get a `WorkflowFn` through [`IntoWorkflow`]; hosts with a
//! dynamic function table can implement the trait by hand.

use std::any::Any;
use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::rc::Rc;

use futures::FutureExt;
use futures::future::LocalBoxFuture;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::core::codec::Encodable;
use crate::core::errors::ProtocolError;
use crate::runtime::context::Context;

/// Converts a native value into the declared parameter type, boxed.
pub type DecodeFn = fn(Value) -> Result<Box<dyn Any>, serde_json::Error>;

/// A pending workflow call. Resolves to the function's raw return values.
pub type Invocation = LocalBoxFuture<'static, Vec<ReturnValue>>;

/// One declared parameter of a workflow function.
#[derive(Debug, Clone)]
pub enum Param {
    /// Slot reserved for the execution context. Filled by the driver, never by inputs.
    Context,
    /// Slot filled from a decoded input.
    Value {
        type_name: &'static str,
        decode: DecodeFn,
    },
}

impl Param {
    pub fn value<T: DeserializeOwned + 'static>() -> Self {
        Param::Value {
            type_name: std::any::type_name::<T>(),
            decode: decode_boxed::<T>,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Param::Context => std::any::type_name::<Context>(),
            Param::Value { type_name, .. } => type_name,
        }
    }
}

fn decode_boxed<T: DeserializeOwned + 'static>(
    value: Value,
) -> Result<Box<dyn Any>, serde_json::Error> {
    let typed: T = serde_json::from_value(value)?;
    Ok(Box::new(typed))
}

/// Declared parameter list of a workflow function, in call order.
#[derive(Debug, Clone, Default)]
pub struct Signature {
    pub params: Vec<Param>,
}

impl Signature {
    pub fn new(params: Vec<Param>) -> Self {
        Self { params }
    }

    /// Whether the first parameter is the reserved context slot.
    pub fn reserves_context(&self) -> bool {
        matches!(self.params.first(), Some(Param::Context))
    }

    /// Number of parameters that are filled from inputs.
    pub fn input_arity(&self) -> usize {
        self.params.len().saturating_sub(usize::from(self.reserves_context()))
    }
}

/// One raw value returned by a workflow call.
pub enum ReturnValue {
    /// An absent value: nil in either slot.
    Nil,
    /// A payload-bearing value.
    Value(Box<dyn Encodable>),
    /// A value satisfying the error capability.
    Error(anyhow::Error),
}

impl ReturnValue {
    pub fn value<T: Serialize + 'static>(value: T) -> Self {
        ReturnValue::Value(Box::new(value))
    }

    pub fn error(err: impl Into<anyhow::Error>) -> Self {
        ReturnValue::Error(err.into())
    }
}

impl fmt::Debug for ReturnValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReturnValue::Nil => f.write_str("Nil"),
            ReturnValue::Value(value) => write!(f, "Value({})", value.type_name()),
            ReturnValue::Error(err) => write!(f, "Error({err})"),
        }
    }
}

/// A workflow function as the driver invokes it.
pub trait WorkflowFn {
    fn signature(&self) -> &Signature;

    /// Start the call. `args` holds one decoded value per non-context parameter,
    /// as produced by [`bind`](crate::core::binder::bind) for this signature.
    fn call(&self, ctx: Context, args: Vec<Box<dyn Any>>) -> Result<Invocation, ProtocolError>;
}

/// Return types a typed workflow may produce.
///
/// `Result<T, E>` is the `(value, error)` shape. `Result<(), E>` carries a unit
/// value, which encodes exactly like the absent result of the `(error)` shape.
pub trait WorkflowReturn {
    fn into_return_values(self) -> Vec<ReturnValue>;
}

impl<T, E> WorkflowReturn for Result<T, E>
where
    T: Serialize + 'static,
    E: Into<anyhow::Error>,
{
    fn into_return_values(self) -> Vec<ReturnValue> {
        match self {
            Ok(value) => vec![ReturnValue::value(value), ReturnValue::Nil],
            Err(err) => vec![ReturnValue::Nil, ReturnValue::error(err)],
        }
    }
}

/// Conversion of a typed async function into a [`WorkflowFn`].
///
/// `Args` is a marker tuple of the value parameter types; it only exists to keep
/// the per-arity implementations apart.
pub trait IntoWorkflow<Args> {
    fn into_workflow(self) -> Rc<dyn WorkflowFn>;
}

struct TypedWorkflow<F, Args> {
    func: F,
    signature: Signature,
    _args: PhantomData<fn(Args)>,
}

impl<F, Args> TypedWorkflow<F, Args> {
    fn new(func: F, params: Vec<Param>) -> Self {
        let mut all = Vec::with_capacity(params.len() + 1);
        all.push(Param::Context);
        all.extend(params);
        Self {
            func,
            signature: Signature::new(all),
            _args: PhantomData,
        }
    }

    fn check_arity(&self, args: &[Box<dyn Any>]) -> Result<(), ProtocolError> {
        let expected = self.signature.input_arity();
        if args.len() != expected {
            return Err(ProtocolError::ArgumentCount {
                expected,
                actual: args.len(),
            });
        }
        Ok(())
    }
}

fn take_arg<T: 'static>(
    args: &mut impl Iterator<Item = (usize, Box<dyn Any>)>,
) -> Result<T, ProtocolError> {
    let type_name = std::any::type_name::<T>();
    let (index, boxed) = args.next().ok_or(ProtocolError::ArgumentType {
        position: 0,
        type_name,
    })?;
    boxed
        .downcast::<T>()
        .map(|typed| *typed)
        .map_err(|_| ProtocolError::ArgumentType {
            // Position 0 is the context slot.
            position: index + 1,
            type_name,
        })
}

impl<F, Fut, R> IntoWorkflow<()> for F
where
    F: Fn(Context) -> Fut + 'static,
    Fut: Future<Output = R> + 'static,
    R: WorkflowReturn,
{
    fn into_workflow(self) -> Rc<dyn WorkflowFn> {
        Rc::new(TypedWorkflow::<F, ()>::new(self, Vec::new()))
    }
}

impl<F, Fut, R> WorkflowFn for TypedWorkflow<F, ()>
where
    F: Fn(Context) -> Fut + 'static,
    Fut: Future<Output = R> + 'static,
    R: WorkflowReturn,
{
    fn signature(&self) -> &Signature {
        &self.signature
    }

    fn call(&self, ctx: Context, args: Vec<Box<dyn Any>>) -> Result<Invocation, ProtocolError> {
        self.check_arity(&args)?;
        let fut = (self.func)(ctx);
        Ok(async move { fut.await.into_return_values() }.boxed_local())
    }
}

macro_rules! impl_into_workflow {
    ($($ty:ident $var:ident),+) => {
        impl<F, Fut, R, $($ty),+> IntoWorkflow<($($ty,)+)> for F
        where
            F: Fn(Context, $($ty),+) -> Fut + 'static,
            Fut: Future<Output = R> + 'static,
            R: WorkflowReturn,
            $($ty: DeserializeOwned + 'static,)+
        {
            fn into_workflow(self) -> Rc<dyn WorkflowFn> {
                Rc::new(TypedWorkflow::<F, ($($ty,)+)>::new(
                    self,
                    vec![$(Param::value::<$ty>()),+],
                ))
            }
        }

        impl<F, Fut, R, $($ty),+> WorkflowFn for TypedWorkflow<F, ($($ty,)+)>
        where
            F: Fn(Context, $($ty),+) -> Fut + 'static,
            Fut: Future<Output = R> + 'static,
            R: WorkflowReturn,
            $($ty: DeserializeOwned + 'static,)+
        {
            fn signature(&self) -> &Signature {
                &self.signature
            }

            fn call(
                &self,
                ctx: Context,
                args: Vec<Box<dyn Any>>,
            ) -> Result<Invocation, ProtocolError> {
                self.check_arity(&args)?;
                let mut args = args.into_iter().enumerate();
                $(let $var = take_arg::<$ty>(&mut args)?;)+
                let fut = (self.func)(ctx, $($var),+);
                Ok(async move { fut.await.into_return_values() }.boxed_local())
            }
        }
    };
}

impl_into_workflow!(A1 a1);
impl_into_workflow!(A1 a1, A2 a2);
impl_into_workflow!(A1 a1, A2 a2, A3 a3);
impl_into_workflow!(A1 a1, A2 a2, A3 a3, A4 a4);

#[cfg(test)]
mod tests {
    use futures::executor::block_on;

    use super::*;

    async fn add(_ctx: Context, a: i64, b: i64) -> anyhow::Result<i64> {
        Ok(a + b)
    }

    #[test]
    fn typed_adapter_declares_context_first() {
        let workflow = add.into_workflow();
        let signature = workflow.signature();
        assert!(signature.reserves_context());
        assert_eq!(signature.input_arity(), 2);
        assert_eq!(signature.params[1].type_name(), "i64");
    }

    #[test]
    fn typed_adapter_calls_with_boxed_arguments() {
        let workflow = add.into_workflow();
        let args: Vec<Box<dyn Any>> = vec![Box::new(2_i64), Box::new(3_i64)];
        let invocation = workflow
            .call(Context::background(), args)
            .expect("call");
        let values = block_on(invocation);
        assert_eq!(values.len(), 2);
        match &values[0] {
            ReturnValue::Value(value) => {
                assert_eq!(value.to_native().expect("native"), serde_json::json!(5));
            }
            other => panic!("unexpected return value: {other:?}"),
        }
        assert!(matches!(values[1], ReturnValue::Nil));
    }

    #[test]
    fn typed_adapter_rejects_mistyped_arguments() {
        let workflow = add.into_workflow();
        let args: Vec<Box<dyn Any>> = vec![Box::new(2_i64), Box::new("three")];
        let err = workflow
            .call(Context::background(), args)
            .err()
            .expect("mistyped");
        assert!(matches!(
            err,
            ProtocolError::ArgumentType { position: 2, .. }
        ));
    }

    #[test]
    fn err_result_fills_the_error_slot() {
        let values = Result::<u8, _>::Err(anyhow::anyhow!("nope")).into_return_values();
        assert!(matches!(values[0], ReturnValue::Nil));
        match &values[1] {
            ReturnValue::Error(err) => assert_eq!(err.to_string(), "nope"),
            other => panic!("unexpected return value: {other:?}"),
        }
    }
}
