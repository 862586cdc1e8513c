//! Error taxonomy shared by every layer of the store.
//!
//! Transient failures (retryable I/O, lock contention, registry conflicts
//! that a caller-level retry loop may resolve) are distinguished from
//! permanent ones (read-only media, missing resources, malformed data) via
//! [`Error::is_transient`], so commit retry logic (see the `sop-concurrency`
//! crate) can dispatch on error *kind* rather than re-deriving the taxonomy
//! at every call site.

use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

/// The error taxonomy described by the store's transaction model.
#[derive(Debug, Error)]
pub enum Error {
    /// A write was attempted against a transaction opened `ForReading`, or
    /// against a store/backend mounted read-only.
    #[error("transaction or store is read-only")]
    ReadOnly,

    /// `add` (or `add_if_not_exist`) found an existing item with the same
    /// key in a store marked `IsUnique`.
    #[error("duplicate key")]
    DuplicateKey,

    /// The requested logical id, key, or resource does not exist.
    #[error("not found")]
    NotFound,

    /// Optimistic version recheck (phase 1 recheck A or phase 2 recheck B)
    /// found that a touched [`crate::handle::Handle`] had moved since it was
    /// read, or a concurrent transaction holds the same OOA lock and the
    /// version comparison determined this transaction lost the race.
    #[error("transaction conflict: {0}")]
    Conflict(String),

    /// Acquiring an OOA lock for one or more resources failed after bounded,
    /// jittered retry.
    #[error("lock contention on resource: {0}")]
    LockContention(String),

    /// An operation did not complete within its deadline. Wraps the
    /// underlying cause so callers can still inspect it.
    #[error("operation timed out: {0}")]
    Timeout(String),

    /// I/O failure from a [`crate::traits::BlobStore`], [`crate::traits::Registry`],
    /// or [`crate::traits::StoreRepository`] backend. `retryable` marks
    /// whether the failure is transient (e.g. a network blip) as opposed to
    /// permanent (e.g. permission denied).
    #[error("backend I/O error: {message}")]
    BackendIO {
        /// Human-readable description of the failure.
        message: String,
        /// Whether bounded retry is appropriate for this failure.
        retryable: bool,
    },

    /// A [`crate::marshal::Marshaler`] failed to encode or decode a payload.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// An operation was attempted against a store/backend configuration that
    /// cannot support it (e.g. a backend without atomic multi-key update
    /// asked to perform an all-or-nothing batch it cannot guarantee).
    #[error("incompatible operation: {0}")]
    Incompatible(String),

    /// A transaction log entry exists for a transaction whose outcome has
    /// not yet been determined; the recovery servicer must resolve it
    /// before the resource it touches can be used.
    #[error("recovery pending for transaction {0}")]
    RecoveryPending(uuid::Uuid),
}

impl Error {
    /// `true` for [`Error::Conflict`].
    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::Conflict(_))
    }

    /// `true` for [`Error::Timeout`].
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Timeout(_))
    }

    /// `true` when bounded, jittered retry (spec §9) is an appropriate
    /// response: retryable backend I/O, lock contention, or a transaction
    /// conflict (the caller may simply retry the whole transaction).
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::LockContention(_) | Error::Conflict(_) | Error::BackendIO { retryable: true, .. }
        )
    }
}

impl From<bincode::Error> for Error {
    fn from(e: bincode::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<rmp_serde::encode::Error> for Error {
    fn from(e: rmp_serde::encode::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<rmp_serde::decode::Error> for Error {
    fn from(e: rmp_serde::decode::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        let retryable = matches!(
            e.kind(),
            std::io::ErrorKind::Interrupted
                | std::io::ErrorKind::WouldBlock
                | std::io::ErrorKind::TimedOut
        );
        Error::BackendIO {
            message: e.to_string(),
            retryable,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflict_is_conflict_and_transient() {
        let e = Error::Conflict("handle moved".into());
        assert!(e.is_conflict());
        assert!(e.is_transient());
        assert!(!e.is_timeout());
    }

    #[test]
    fn timeout_is_timeout_not_transient() {
        let e = Error::Timeout("commit deadline exceeded".into());
        assert!(e.is_timeout());
        assert!(!e.is_conflict());
        assert!(!e.is_transient());
    }

    #[test]
    fn lock_contention_is_transient() {
        assert!(Error::LockContention("store:foo".into()).is_transient());
    }

    #[test]
    fn retryable_io_is_transient() {
        let e = Error::BackendIO {
            message: "connection reset".into(),
            retryable: true,
        };
        assert!(e.is_transient());
    }

    #[test]
    fn permanent_io_is_not_transient() {
        let e = Error::BackendIO {
            message: "permission denied".into(),
            retryable: false,
        };
        assert!(!e.is_transient());
    }

    #[test]
    fn not_found_is_permanent() {
        assert!(!Error::NotFound.is_transient());
        assert!(!Error::DuplicateKey.is_transient());
        assert!(!Error::ReadOnly.is_transient());
    }

    #[test]
    fn io_error_conversion_classifies_interrupted_as_retryable() {
        let io = std::io::Error::from(std::io::ErrorKind::Interrupted);
        let e: Error = io.into();
        assert!(e.is_transient());
    }

    #[test]
    fn io_error_conversion_classifies_not_found_as_permanent() {
        let io = std::io::Error::from(std::io::ErrorKind::NotFound);
        let e: Error = io.into();
        assert!(!e.is_transient());
    }
}
