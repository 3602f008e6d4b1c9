//! FFI types shared with the native engine.
//!
//! This module contains the low-level values and function shapes that
//! cross the boundary. Users should prefer the safe wrappers in the parent
//! modules.

pub mod error;
pub mod raw;

pub use error::{check, describe};
pub use raw::*;
