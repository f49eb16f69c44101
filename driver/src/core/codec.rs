//! Codec boundary between native values and payloads.
//!
//! The driver receives its codec at construction time; there is no process-wide
//! default. Native values are represented as [`serde_json::Value`] on the way in
//! and as anything [`Encodable`] on the way out.

use std::fmt;

use serde::Serialize;
use serde_json::Value;

use crate::core::errors::CodecError;
use crate::core::payload::Payload;
use crate::io::config::DriverConfig;

/// A native value that can be handed to a [`Codec`] without knowing its type.
pub trait Encodable {
    fn to_native(&self) -> Result<Value, serde_json::Error>;

    fn type_name(&self) -> &'static str;
}

impl<T: Serialize> Encodable for T {
    fn to_native(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(self)
    }

    fn type_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }
}

impl fmt::Debug for dyn Encodable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.type_name())
    }
}

/// Converts native values to payloads and back.
///
/// Implementations report every failure as a [`CodecError`] and must not panic.
pub trait Codec {
    /// Encode a native value into a payload.
    fn to(&self, value: &dyn Encodable) -> Result<Payload, CodecError>;

    /// Decode a payload into its native form. Typed conversion happens in the
    /// binder, against the declared parameter type.
    fn from(&self, payload: &Payload) -> Result<Value, CodecError>;
}

/// JSON codec with an upper bound on payload size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JsonCodec {
    max_payload_bytes: usize,
}

impl JsonCodec {
    pub fn new(max_payload_bytes: usize) -> Self {
        Self { max_payload_bytes }
    }

    pub fn from_config(config: &DriverConfig) -> Self {
        Self::new(config.max_payload_bytes)
    }

    fn check_size(&self, size: usize) -> Result<(), CodecError> {
        if size > self.max_payload_bytes {
            return Err(CodecError::TooLarge {
                size,
                limit: self.max_payload_bytes,
            });
        }
        Ok(())
    }
}

impl Default for JsonCodec {
    fn default() -> Self {
        Self::from_config(&DriverConfig::default())
    }
}

impl Codec for JsonCodec {
    fn to(&self, value: &dyn Encodable) -> Result<Payload, CodecError> {
        let encode_err = |source: serde_json::Error| CodecError::Encode {
            type_name: value.type_name(),
            source,
        };
        let native = value.to_native().map_err(encode_err)?;
        let bytes = serde_json::to_vec(&native).map_err(encode_err)?;
        self.check_size(bytes.len())?;
        Ok(Payload::from_bytes(bytes))
    }

    fn from(&self, payload: &Payload) -> Result<Value, CodecError> {
        self.check_size(payload.len())?;
        serde_json::from_slice(payload.as_bytes()).map_err(CodecError::Decode)
    }
}
