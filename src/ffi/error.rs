//! Result code conversion utilities for FFI.

use super::raw::{
    ResultCode, RESULT_ERR_CHANNEL_STOLEN, RESULT_ERR_INTERNAL, RESULT_ERR_INVALID_HANDLE,
    RESULT_ERR_INVALID_PARAM, RESULT_ERR_UNSUPPORTED, RESULT_OK,
};
use crate::error::Error;

/// Human-readable description of a result code.
pub fn describe(code: ResultCode) -> &'static str {
    match code {
        RESULT_OK => "ok",
        RESULT_ERR_CHANNEL_STOLEN => "channel stolen",
        RESULT_ERR_INTERNAL => "internal error",
        RESULT_ERR_INVALID_HANDLE => "invalid handle",
        RESULT_ERR_INVALID_PARAM => "invalid parameter",
        RESULT_ERR_UNSUPPORTED => "unsupported",
        _ => "unknown error",
    }
}

/// Check a result code and convert to Result.
pub fn check(code: ResultCode, op: &'static str) -> crate::Result<()> {
    if code == RESULT_OK {
        Ok(())
    } else {
        Err(Error::Native { code, op })
    }
}
