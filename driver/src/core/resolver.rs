//! Result resolution: raw return values into a committed workflow outcome.

use serde_json::Value;

use crate::core::codec::Codec;
use crate::core::errors::{CodecError, ProtocolError};
use crate::core::payload::Payload;
use crate::core::signature::ReturnValue;

/// Return values folded by shape.
#[derive(Debug)]
pub enum Returned {
    /// Success without a payload: `(nil)`.
    Empty,
    /// Success with the encoded leading value: `(value, nil)`.
    Value(Payload),
    /// Business error: `(error)` or `(_, error)`.
    Error(anyhow::Error),
}

/// Final outcome of a workflow function. Exactly one of result or error.
#[derive(Debug)]
pub enum WorkflowOutcome {
    Returned(Payload),
    Failed(anyhow::Error),
}

impl WorkflowOutcome {
    pub fn result(&self) -> Option<&Payload> {
        match self {
            WorkflowOutcome::Returned(payload) => Some(payload),
            WorkflowOutcome::Failed(_) => None,
        }
    }

    pub fn error(&self) -> Option<&anyhow::Error> {
        match self {
            WorkflowOutcome::Returned(_) => None,
            WorkflowOutcome::Failed(err) => Some(err),
        }
    }
}

/// Validate the shape of `values`, `(error)` or `(value, error)`, and fold it.
///
/// The leading value of the two-value shape is encoded before the error slot
/// is inspected, so an unencodable value is a protocol error even when the
/// function also returned a business error.
pub fn fold(codec: &dyn Codec, values: Vec<ReturnValue>) -> Result<Returned, ProtocolError> {
    let count = values.len();
    let mut values = values.into_iter();
    let (leading, trailing) = match (values.next(), values.next(), values.next()) {
        (Some(trailing), None, None) => (None, trailing),
        (Some(leading), Some(trailing), None) => (Some(leading), trailing),
        _ => return Err(ProtocolError::ReturnArity { count }),
    };

    let encoded = leading
        .map(|value| encode_leading(codec, value))
        .transpose()
        .map_err(ProtocolError::ConvertResult)?;

    match trailing {
        ReturnValue::Nil => Ok(encoded.map_or(Returned::Empty, Returned::Value)),
        ReturnValue::Error(err) => Ok(Returned::Error(err)),
        ReturnValue::Value(value) => Err(ProtocolError::ErrorSlot {
            type_name: value.type_name(),
        }),
    }
}

fn encode_leading(codec: &dyn Codec, value: ReturnValue) -> Result<Payload, CodecError> {
    match value {
        ReturnValue::Nil => codec.to(&Value::Null),
        ReturnValue::Value(value) => codec.to(value.as_ref()),
        ReturnValue::Error(_) => Err(CodecError::Unsupported {
            kind: "an error value in the result slot",
        }),
    }
}

/// Fold `values` into the outcome to commit.
///
/// Encoding failures are protocol errors; the business error is passed through
/// untouched.
pub fn resolve(
    codec: &dyn Codec,
    values: Vec<ReturnValue>,
) -> Result<WorkflowOutcome, ProtocolError> {
    match fold(codec, values)? {
        Returned::Error(err) => Ok(WorkflowOutcome::Failed(err)),
        Returned::Value(payload) => Ok(WorkflowOutcome::Returned(payload)),
        Returned::Empty => codec
            .to(&Value::Null)
            .map(WorkflowOutcome::Returned)
            .map_err(ProtocolError::ConvertResult),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use anyhow::anyhow;

    use super::*;
    use crate::core::codec::JsonCodec;

    fn resolve_json(values: Vec<ReturnValue>) -> Result<WorkflowOutcome, ProtocolError> {
        resolve(&JsonCodec::default(), values)
    }

    #[test]
    fn error_only_shape_with_nil_yields_null_result() {
        let outcome = resolve_json(vec![ReturnValue::Nil]).expect("resolve");
        let result = outcome.result().expect("result");
        assert_eq!(result.decode::<Option<u32>>().expect("decode"), None);
        assert!(outcome.error().is_none());
    }

    #[test]
    fn value_and_nil_error_yields_encoded_value() {
        let outcome =
            resolve_json(vec![ReturnValue::value("done"), ReturnValue::Nil]).expect("resolve");
        let result = outcome.result().expect("result");
        assert_eq!(result.decode::<String>().expect("decode"), "done");
    }

    #[test]
    fn business_error_is_captured_without_result() {
        for values in [
            vec![ReturnValue::error(anyhow!("card declined"))],
            vec![ReturnValue::value(7), ReturnValue::error(anyhow!("card declined"))],
        ] {
            let outcome = resolve_json(values).expect("resolve");
            assert!(outcome.result().is_none());
            assert_eq!(outcome.error().expect("error").to_string(), "card declined");
        }
    }

    #[test]
    fn rejects_zero_and_three_return_values() {
        let err = resolve_json(Vec::new()).expect_err("zero");
        assert!(matches!(err, ProtocolError::ReturnArity { count: 0 }));

        let err = resolve_json(vec![ReturnValue::Nil, ReturnValue::Nil, ReturnValue::Nil])
            .expect_err("three");
        assert!(matches!(err, ProtocolError::ReturnArity { count: 3 }));
        assert!(err.to_string().contains("either (error) or (result, error)"));
    }

    #[test]
    fn trailing_value_does_not_satisfy_error_capability() {
        let err = resolve_json(vec![ReturnValue::value(1), ReturnValue::value("oops")])
            .expect_err("not an error");
        assert!(matches!(err, ProtocolError::ErrorSlot { type_name: "&str" }));
    }

    #[test]
    fn encoding_failure_is_a_protocol_error() {
        let outcome = resolve(
            &JsonCodec::new(2),
            vec![ReturnValue::value("too big"), ReturnValue::Nil],
        );
        let err = outcome.expect_err("too large");
        assert!(matches!(
            err,
            ProtocolError::ConvertResult(CodecError::TooLarge { .. })
        ));
    }

    #[test]
    fn unencodable_value_beside_business_error_is_a_protocol_error() {
        let mut map = HashMap::new();
        map.insert((1, 2), "tuple keys");
        let err = resolve_json(vec![
            ReturnValue::value(map),
            ReturnValue::error(anyhow!("card declined")),
        ])
        .expect_err("unencodable result");
        assert!(matches!(
            err,
            ProtocolError::ConvertResult(CodecError::Encode { .. })
        ));
    }

    #[test]
    fn nil_value_beside_nil_error_encodes_as_null() {
        let returned = fold(
            &JsonCodec::default(),
            vec![ReturnValue::Nil, ReturnValue::Nil],
        )
        .expect("fold");
        match returned {
            Returned::Value(payload) => assert_eq!(payload.as_bytes(), b"null"),
            other => panic!("unexpected fold: {other:?}"),
        }
    }

    #[test]
    fn leading_error_value_is_not_encodable() {
        let err = resolve_json(vec![ReturnValue::error(anyhow!("x")), ReturnValue::Nil])
            .expect_err("error in result slot");
        assert!(matches!(
            err,
            ProtocolError::ConvertResult(CodecError::Unsupported { .. })
        ));
    }
}
