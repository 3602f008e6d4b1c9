//! Resource kinds, handles and the move-only release owner.

use std::fmt;
use std::os::raw::c_int;

use crate::error::{Error, Result};
use crate::ffi::{self, RawHandle};
use crate::release::{ReleaseOps, ReleaseOutcome};

/// Category of native resource.
///
/// Closed set: every kind has exactly one row in the
/// [`ReleaseTable`](crate::ReleaseTable).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceKind {
    /// Top-level engine instance.
    System,
    /// Loaded sample or stream.
    Sound,
    /// Group of sounds sharing playback limits.
    SoundGroup,
    /// Transient playing voice. Owned by the engine's voice scheduler and
    /// never released by application code.
    Channel,
    /// Mixing bus.
    ChannelGroup,
    /// Processing unit.
    Dsp,
    /// Link between two processing units.
    DspConnection,
    /// Occlusion geometry.
    Geometry,
    /// Positional reverb zone.
    Reverb3D,
}

impl ResourceKind {
    /// Number of kinds.
    pub const COUNT: usize = 9;

    /// All kinds in table order.
    pub const ALL: [ResourceKind; Self::COUNT] = [
        ResourceKind::System,
        ResourceKind::Sound,
        ResourceKind::SoundGroup,
        ResourceKind::Channel,
        ResourceKind::ChannelGroup,
        ResourceKind::Dsp,
        ResourceKind::DspConnection,
        ResourceKind::Geometry,
        ResourceKind::Reverb3D,
    ];

    /// Row index in the release table.
    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Decode the kind tag carried by engine callbacks.
    pub fn from_tag(tag: c_int) -> Result<Self> {
        match tag {
            ffi::KIND_SYSTEM => Ok(ResourceKind::System),
            ffi::KIND_SOUND => Ok(ResourceKind::Sound),
            ffi::KIND_SOUND_GROUP => Ok(ResourceKind::SoundGroup),
            ffi::KIND_CHANNEL => Ok(ResourceKind::Channel),
            ffi::KIND_CHANNEL_GROUP => Ok(ResourceKind::ChannelGroup),
            ffi::KIND_DSP => Ok(ResourceKind::Dsp),
            ffi::KIND_DSP_CONNECTION => Ok(ResourceKind::DspConnection),
            ffi::KIND_GEOMETRY => Ok(ResourceKind::Geometry),
            ffi::KIND_REVERB_3D => Ok(ResourceKind::Reverb3D),
            other => Err(Error::UnknownKind(other)),
        }
    }

    /// The callback tag for this kind.
    pub const fn tag(self) -> c_int {
        match self {
            ResourceKind::System => ffi::KIND_SYSTEM,
            ResourceKind::Sound => ffi::KIND_SOUND,
            ResourceKind::SoundGroup => ffi::KIND_SOUND_GROUP,
            ResourceKind::Channel => ffi::KIND_CHANNEL,
            ResourceKind::ChannelGroup => ffi::KIND_CHANNEL_GROUP,
            ResourceKind::Dsp => ffi::KIND_DSP,
            ResourceKind::DspConnection => ffi::KIND_DSP_CONNECTION,
            ResourceKind::Geometry => ffi::KIND_GEOMETRY,
            ResourceKind::Reverb3D => ffi::KIND_REVERB_3D,
        }
    }

    /// Whether application code may release resources of this kind.
    pub const fn is_releasable(self) -> bool {
        !matches!(self, ResourceKind::Channel)
    }

    /// Lowercase display name.
    pub const fn name(self) -> &'static str {
        match self {
            ResourceKind::System => "system",
            ResourceKind::Sound => "sound",
            ResourceKind::SoundGroup => "sound group",
            ResourceKind::Channel => "channel",
            ResourceKind::ChannelGroup => "channel group",
            ResourceKind::Dsp => "dsp",
            ResourceKind::DspConnection => "dsp connection",
            ResourceKind::Geometry => "geometry",
            ResourceKind::Reverb3D => "reverb 3d",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A native reference tagged with its kind. Immutable once created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Handle {
    raw: RawHandle,
    kind: ResourceKind,
}

impl Handle {
    /// Tag a raw reference with its kind.
    #[inline]
    pub const fn new(raw: RawHandle, kind: ResourceKind) -> Self {
        Self { raw, kind }
    }

    /// The raw native reference.
    #[inline]
    pub const fn raw(&self) -> RawHandle {
        self.raw
    }

    /// The resource kind.
    #[inline]
    pub const fn kind(&self) -> ResourceKind {
        self.kind
    }

    /// Check whether the reference is the null sentinel.
    #[inline]
    pub const fn is_null(&self) -> bool {
        self.raw.is_null()
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind, self.raw)
    }
}

/// Exclusive right to release one native reference.
///
/// Move-only. Consumed by [`release`](Self::release) or
/// [`disarm`](Self::disarm); if dropped while still armed, the destructor
/// performs the release.
#[derive(Debug)]
pub struct OwnedHandle {
    handle: Handle,
    ops: Option<ReleaseOps>,
}

impl OwnedHandle {
    pub(crate) fn new(handle: Handle, ops: ReleaseOps) -> Self {
        Self {
            handle,
            ops: Some(ops),
        }
    }

    /// The owned handle.
    pub fn handle(&self) -> Handle {
        self.handle
    }

    /// Release the native resource now.
    ///
    /// A fault raised by the native release is returned as
    /// [`Error::ReleaseFaulted`] rather than unwinding.
    pub fn release(mut self) -> Result<()> {
        match self.ops.take() {
            Some(ops) => outcome_to_result(self.handle, ops.release(self.handle)),
            None => Ok(()),
        }
    }

    /// Give up the release right without calling the engine.
    ///
    /// Used when the engine has already reclaimed the resource itself.
    pub fn disarm(mut self) -> Handle {
        self.ops = None;
        self.handle
    }
}

impl Drop for OwnedHandle {
    fn drop(&mut self) {
        if let Some(ops) = self.ops.take() {
            if let Err(err) = outcome_to_result(self.handle, ops.release(self.handle)) {
                log::warn!("dropping {}: {}", self.handle, err);
            }
        }
    }
}

fn outcome_to_result(handle: Handle, outcome: ReleaseOutcome) -> Result<()> {
    match outcome {
        ReleaseOutcome::Released => Ok(()),
        ReleaseOutcome::Failed(code) => ffi::check(code, "release"),
        ReleaseOutcome::Faulted => Err(Error::ReleaseFaulted {
            kind: handle.kind(),
            raw: handle.raw(),
        }),
    }
}
