//! Pluggable serialization for every persisted artifact (StoreInfo, Handle,
//! node blobs, value blobs, log records).

use crate::error::Result;
use serde::{de::DeserializeOwned, Serialize};

/// A single pluggable encode/decode seam. The core never assumes a
/// specific wire format beyond round-trip correctness.
pub trait Marshaler: Send + Sync {
    /// Encode `value` to bytes.
    fn marshal<T: Serialize>(&self, value: &T) -> Result<Vec<u8>>;
    /// Decode bytes previously produced by [`Marshaler::marshal`].
    fn unmarshal<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T>;
}

/// Default marshaler: JSON, via `serde_json`.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonMarshaler;

impl Marshaler for JsonMarshaler {
    fn marshal<T: Serialize>(&self, value: &T) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(value)?)
    }

    fn unmarshal<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// Alternate marshaler: compact binary, via `bincode`. Demonstrates the
/// seam is real; useful for transaction-log payloads where size matters
/// more than human readability.
#[derive(Debug, Default, Clone, Copy)]
pub struct BincodeMarshaler;

impl Marshaler for BincodeMarshaler {
    fn marshal<T: Serialize>(&self, value: &T) -> Result<Vec<u8>> {
        Ok(bincode::serialize(value)?)
    }

    fn unmarshal<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T> {
        Ok(bincode::deserialize(bytes)?)
    }
}
