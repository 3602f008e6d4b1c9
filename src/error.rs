//! Error types for the handles crate.

use thiserror::Error;

use crate::ffi::{RawHandle, ResultCode};
use crate::handle::ResourceKind;

/// Result type alias for handle operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for handle operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The wrapper is no longer live: it was disposed, finalized, or
    /// invalidated by the engine.
    #[error("{kind} {raw} is no longer valid")]
    InvalidResource {
        /// Kind of the stale resource.
        kind: ResourceKind,
        /// Reference the wrapper was bound to.
        raw: RawHandle,
    },

    /// A native call returned a non-success result code.
    #[error("{op} failed: {} (code {code})", crate::ffi::describe(*code))]
    Native {
        /// The native result code.
        code: ResultCode,
        /// Operation that failed.
        op: &'static str,
    },

    /// The native release faulted instead of returning a result code.
    #[error("release of {kind} {raw} faulted")]
    ReleaseFaulted {
        /// Kind of the resource being released.
        kind: ResourceKind,
        /// Reference being released.
        raw: RawHandle,
    },

    /// A live wrapper exists for the reference but under another kind or type.
    #[error("{raw} is registered as {registered}, requested as {requested}")]
    KindMismatch {
        /// Reference being looked up.
        raw: RawHandle,
        /// Kind of the registered wrapper.
        registered: ResourceKind,
        /// Kind of the request.
        requested: ResourceKind,
    },

    /// A callback carried a resource kind tag this crate does not know.
    #[error("unknown resource kind tag: {0}")]
    UnknownKind(i32),

    /// A callback carried an event tag this crate does not know.
    #[error("unknown engine event tag: {0}")]
    UnknownEvent(i32),

    /// A release table was built without a row for this kind.
    #[error("no release operations registered for {0}")]
    MissingReleaseOps(ResourceKind),
}

impl Error {
    /// Check if this is an invalid-resource error.
    pub fn is_invalid_resource(&self) -> bool {
        matches!(self, Error::InvalidResource { .. })
    }

    /// Check if this is a faulted release.
    pub fn is_release_fault(&self) -> bool {
        matches!(self, Error::ReleaseFaulted { .. })
    }

    /// The native result code, if this error came from a native call.
    pub fn native_code(&self) -> Option<ResultCode> {
        match self {
            Error::Native { code, .. } => Some(*code),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ffi::RESULT_ERR_INVALID_HANDLE;

    #[test]
    fn native_error_message_names_the_operation() {
        let err = Error::Native {
            code: RESULT_ERR_INVALID_HANDLE,
            op: "sound release",
        };
        assert_eq!(err.native_code(), Some(RESULT_ERR_INVALID_HANDLE));
        assert_eq!(
            err.to_string(),
            "sound release failed: invalid handle (code 30)"
        );
    }

    #[test]
    fn predicates() {
        let err = Error::InvalidResource {
            kind: ResourceKind::Channel,
            raw: RawHandle::from_raw(0x10),
        };
        assert!(err.is_invalid_resource());
        assert!(!err.is_release_fault());
        assert_eq!(err.native_code(), None);
        assert_eq!(err.to_string(), "channel 0x10 is no longer valid");
    }
}
