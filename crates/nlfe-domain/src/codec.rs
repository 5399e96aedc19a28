//! State serialization capability.
//!
//! Entities that may be checkpointed or shipped to another process encode
//! their state into an opaque byte buffer. The encoding is JSON, but callers
//! must treat the bytes as opaque. None of the solution stages call into this
//! module; it is driven by whoever owns persistence.

use crate::error::DomainResult;
use serde::Serialize;
use serde::de::DeserializeOwned;

/// Encode/decode the mutable state of an entity.
///
/// Only state is carried, never configuration: decoding into an entity that
/// was built with different parameters restores the history variables but
/// keeps the receiver's parameters.
pub trait StateCodec {
    fn encode_state(&self) -> DomainResult<Vec<u8>>;
    fn decode_state(&mut self, bytes: &[u8]) -> DomainResult<()>;
}

pub fn encode<T: Serialize>(value: &T) -> DomainResult<Vec<u8>> {
    Ok(serde_json::to_vec(value)?)
}

pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> DomainResult<T> {
    Ok(serde_json::from_slice(bytes)?)
}
