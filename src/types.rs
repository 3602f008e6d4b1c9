//! Type definitions and enums.

use std::os::raw::{c_int, c_void};

use crate::error::{Error, Result};
use crate::ffi;

/// Notification delivered by the engine for a resource it owns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineEvent {
    /// Playback reached its end; the voice returned to the pool.
    Ended,
    /// A higher-priority sound took the voice over.
    VoiceStolen,
    /// The voice moved between real and virtual playback.
    VirtualVoice {
        /// `true` when the voice became virtual.
        is_virtual: bool,
    },
    /// Playback crossed a sync point.
    SyncPoint {
        /// Index of the sync point within the sound.
        index: u32,
    },
    /// Occlusion is about to be computed for the voice.
    Occlusion,
}

impl EngineEvent {
    /// Decode an event from the callback's tag and auxiliary data.
    pub fn from_raw(tag: c_int, aux_data_1: *mut c_void, _aux_data_2: *mut c_void) -> Result<Self> {
        match tag {
            ffi::EVENT_END => Ok(EngineEvent::Ended),
            ffi::EVENT_VOICE_STOLEN => Ok(EngineEvent::VoiceStolen),
            ffi::EVENT_VIRTUAL_VOICE => Ok(EngineEvent::VirtualVoice {
                is_virtual: !aux_data_1.is_null(),
            }),
            ffi::EVENT_SYNC_POINT => Ok(EngineEvent::SyncPoint {
                index: aux_data_1 as usize as u32,
            }),
            ffi::EVENT_OCCLUSION => Ok(EngineEvent::Occlusion),
            other => Err(Error::UnknownEvent(other)),
        }
    }

    /// The callback tag for this event.
    pub fn tag(&self) -> c_int {
        match self {
            EngineEvent::Ended => ffi::EVENT_END,
            EngineEvent::VoiceStolen => ffi::EVENT_VOICE_STOLEN,
            EngineEvent::VirtualVoice { .. } => ffi::EVENT_VIRTUAL_VOICE,
            EngineEvent::SyncPoint { .. } => ffi::EVENT_SYNC_POINT,
            EngineEvent::Occlusion => ffi::EVENT_OCCLUSION,
        }
    }

    /// Whether the engine has taken the resource back.
    ///
    /// Invalidating events force the wrapper out of the live state without
    /// a release; the others are delivered as notifications only.
    pub fn invalidates(&self) -> bool {
        matches!(self, EngineEvent::Ended | EngineEvent::VoiceStolen)
    }
}

/// Options for creating a registry.
#[derive(Debug, Clone)]
pub struct RegistryOptions {
    /// Initial capacity of the identity map.
    pub capacity: usize,
    /// Release resources whose wrapper is dropped while still live.
    ///
    /// Turn off once the top-level engine object has been torn down: the
    /// engine frees its children with it.
    pub release_on_finalize: bool,
    /// Reject lookups that name a different kind than the live entry.
    pub strict_kinds: bool,
}

impl Default for RegistryOptions {
    fn default() -> Self {
        Self {
            capacity: 64,
            release_on_finalize: true,
            strict_kinds: true,
        }
    }
}
