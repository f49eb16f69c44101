//! Argument binding: payload inputs onto a workflow's declared parameters.

use std::any::Any;

use crate::core::codec::Codec;
use crate::core::errors::{CodecError, ProtocolError};
use crate::core::payload::Payload;
use crate::core::signature::{Param, Signature};

/// Decode `inputs` positionally against `signature`.
///
/// The first parameter must be the context slot; it is skipped here and filled
/// with the live context at call time. Returns one boxed value per remaining
/// parameter, in declaration order.
pub fn bind(
    signature: &Signature,
    codec: &dyn Codec,
    inputs: &[Payload],
) -> Result<Vec<Box<dyn Any>>, ProtocolError> {
    if !signature.reserves_context() {
        return Err(ProtocolError::MissingContext);
    }

    let expected = signature.input_arity();
    if inputs.len() != expected {
        return Err(ProtocolError::ArgumentCount {
            expected,
            actual: inputs.len(),
        });
    }

    let mut args = Vec::with_capacity(expected);
    // Position 0 is the context slot.
    for (index, (param, input)) in signature.params.iter().skip(1).zip(inputs).enumerate() {
        let position = index + 1;
        let Param::Value { type_name, decode } = *param else {
            return Err(ProtocolError::UnexpectedContext { position });
        };
        let convert_err = |source: CodecError| ProtocolError::ConvertArgument {
            position,
            type_name,
            source,
        };
        let native = codec.from(input).map_err(convert_err)?;
        let value = decode(native).map_err(|err| convert_err(CodecError::Decode(err)))?;
        args.push(value);
    }
    Ok(args)
}
