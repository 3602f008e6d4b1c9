//! Native handle registry and lifecycle manager for audio engine bindings.
//!
//! A native audio engine hands out opaque references to the resources it
//! owns. This crate turns each reference into exactly one managed wrapper:
//! repeat lookups of the same reference return the same object, the
//! native release runs at most once, and the engine itself can invalidate
//! a wrapper from its own thread when it reclaims a resource.
//!
//! # Example
//!
//! ```no_run
//! use std::os::raw::c_void;
//! use handles::{
//!     InvalidationChannel, RawHandle, Registry, ReleaseOps, ReleaseTable, ResultCode, Sound,
//! };
//!
//! // Provided by the binding layer, forwarding to the engine's C API.
//! unsafe fn release(_raw: RawHandle) -> ResultCode { 0 }
//! unsafe fn get_user_data(_raw: RawHandle, _out: *mut *mut c_void) -> ResultCode { 0 }
//! unsafe fn set_user_data(_raw: RawHandle, _data: *mut c_void) -> ResultCode { 0 }
//!
//! fn main() -> handles::Result<()> {
//!     let ops = unsafe { ReleaseOps::new(release, get_user_data, set_user_data) };
//!     let registry = Registry::new(ReleaseTable::uniform(ops));
//!
//!     // Route the engine's callbacks into this registry
//!     let guard = InvalidationChannel::new(registry.clone()).install();
//!     let _callback = guard.callback();
//!
//!     // The same native reference always maps to the same wrapper
//!     let raw = RawHandle::from_raw(0x7f00_1000);
//!     let sound = registry.wrap::<Sound>(raw)?.expect("non-null reference");
//!     let again = registry.wrap::<Sound>(raw)?.expect("non-null reference");
//!     assert!(std::sync::Arc::ptr_eq(&sound, &again));
//!
//!     // Release once; every later access fails fast
//!     sound.dispose()?;
//!     assert!(sound.user_data().unwrap_err().is_invalid_resource());
//!
//!     Ok(())
//! }
//! ```
//!
//! # Threading
//!
//! Every type here is `Send + Sync`. The registry map sits behind a single
//! mutex that is never held while calling into the engine, and a wrapper
//! leaves the live state through one compare-and-set, so a dispose racing
//! an engine invalidation releases at most once.

pub mod error;
pub mod ffi;
pub mod handle;
pub mod invalidation;
pub mod registry;
pub mod release;
pub mod resources;
pub mod types;
pub mod wrapper;

// Re-export main types at the crate root
pub use error::{Error, Result};
pub use ffi::{EngineCallback, RawHandle, ResultCode};
pub use handle::{Handle, OwnedHandle, ResourceKind};
pub use invalidation::{engine_callback, CallbackGuard, InvalidationChannel};
pub use registry::{Registry, RegistryReport};
pub use release::{ReleaseOps, ReleaseOutcome, ReleaseTable, ReleaseTableBuilder};
pub use resources::{
    Channel, ChannelGroup, Dsp, DspConnection, Geometry, Reverb3D, Sound, SoundGroup, System,
    TypedResource,
};
pub use types::{EngineEvent, RegistryOptions};
pub use wrapper::{NativeObject, Wrapper, WrapperState};
