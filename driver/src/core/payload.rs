//! Transportable values that cross the codec boundary.

use std::fmt;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::core::errors::CodecError;

/// Opaque encoded value: a workflow input, a workflow result, or an event.
///
/// The driver never looks inside a payload; only a [`Codec`](crate::core::codec::Codec)
/// gives it meaning.
#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct Payload(Vec<u8>);

impl Payload {
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Encode `value` as JSON, the wire format of [`JsonCodec`](crate::core::codec::JsonCodec).
    ///
    /// Hosts use this to build workflow inputs and events without holding a codec.
    pub fn encode<T: Serialize + ?Sized>(value: &T) -> Result<Self, CodecError> {
        let bytes = serde_json::to_vec(value).map_err(|source| CodecError::Encode {
            type_name: std::any::type_name::<T>(),
            source,
        })?;
        Ok(Self(bytes))
    }

    /// Decode a JSON payload into `T`.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, CodecError> {
        serde_json::from_slice(&self.0).map_err(CodecError::Decode)
    }
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Payload({})", String::from_utf8_lossy(&self.0))
    }
}

impl fmt::Display for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&String::from_utf8_lossy(&self.0))
    }
}
