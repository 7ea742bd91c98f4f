//! Frame and variables reference encoding.
//!
//! A frame reference packs `(context, frame index)` as
//! `context * FRAME_STRIDE + index`; a variables reference packs
//! `(frame reference, scope)` as `frame * 10 + scope`.

use thiserror::Error;

/// One more than the deepest stack a frame reference can address.
pub const FRAME_STRIDE: u32 = 1000;
const SCOPE_STRIDE: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ReferenceError {
    #[error("stack frame {0} exceeds the maximum depth of {FRAME_STRIDE}")]
    StackTooDeep(u32),
    #[error("reference for context {0} does not fit in 32 bits")]
    Overflow(u32),
    #[error("bad variables reference {0}: unknown scope kind {1}")]
    BadKind(u32, u32),
}

/// Which variable listing a variables reference names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScopeKind {
    Local = 0,
    Monitor = 1,
}

impl ScopeKind {
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Local => "Local",
            Self::Monitor => "Monitor",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameRef {
    pub context_id: u32,
    pub frame_index: u32,
}

pub fn encode_frame(context_id: u32, frame_index: u32) -> Result<u32, ReferenceError> {
    if frame_index >= FRAME_STRIDE {
        return Err(ReferenceError::StackTooDeep(frame_index));
    }
    context_id
        .checked_mul(FRAME_STRIDE)
        .and_then(|base| base.checked_add(frame_index))
        .ok_or(ReferenceError::Overflow(context_id))
}

/// Always succeeds; callers check the context still exists.
#[must_use]
pub fn decode_frame(frame_id: u32) -> FrameRef {
    FrameRef {
        context_id: frame_id / FRAME_STRIDE,
        frame_index: frame_id % FRAME_STRIDE,
    }
}

pub fn encode_variables(frame_id: u32, kind: ScopeKind) -> Result<u32, ReferenceError> {
    frame_id
        .checked_mul(SCOPE_STRIDE)
        .and_then(|base| base.checked_add(kind as u32))
        .ok_or(ReferenceError::Overflow(decode_frame(frame_id).context_id))
}

pub fn decode_variables(reference: u32) -> Result<(u32, ScopeKind), ReferenceError> {
    let kind = match reference % SCOPE_STRIDE {
        0 => ScopeKind::Local,
        1 => ScopeKind::Monitor,
        other => return Err(ReferenceError::BadKind(reference, other)),
    };
    Ok((reference / SCOPE_STRIDE, kind))
}
