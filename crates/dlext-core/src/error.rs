//! Error types for the particle data bridge.
//!
//! One enum covers every failure a caller can observe, from capability
//! checks at request time through staleness of already-issued capsules.
//! None of these abort the engine step; the integration hook stores refresh
//! failures and replays them on the next sampling request.

use std::error::Error;
use std::fmt;

use crate::id::{Generation, Tag};
use crate::property::ParticleProperty;
use crate::space::ExecutionSpace;

/// Why a view or capsule is no longer backed by live engine memory.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StaleReason {
    /// The engine reallocated or reordered since the view was bound.
    GenerationMismatch {
        /// Generation the view was bound at.
        bound: Generation,
        /// Generation the engine reports now.
        current: Generation,
    },
    /// The hook refreshed its views after the capsule was issued.
    WindowAdvanced,
    /// The hook was torn down.
    TornDown,
}

impl fmt::Display for StaleReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::GenerationMismatch { bound, current } => {
                write!(f, "bound at generation {bound}, engine is at {current}")
            }
            Self::WindowAdvanced => write!(f, "views were refreshed after issue"),
            Self::TornDown => write!(f, "hook was torn down"),
        }
    }
}

/// Errors from binding, sampling and image-flag operations.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DlextError {
    /// The requested execution space is not available in this build or on
    /// this machine.
    UnsupportedExecutionSpace {
        /// The rejected space.
        space: ExecutionSpace,
    },
    /// An image offset does not fit in the per-axis field.
    ImageOffsetOverflow {
        /// Axis index, 0..3.
        axis: usize,
        /// The offending offset.
        value: i64,
    },
    /// The tag is not owned by this process.
    UnknownParticleTag {
        /// The missing tag.
        tag: Tag,
    },
    /// A storage index beyond the current particle count.
    UnknownParticleIndex {
        /// The requested index.
        index: usize,
        /// Current number of local particles.
        len: usize,
    },
    /// The same tag appeared twice in a rebuild.
    DuplicateParticleTag {
        /// The repeated tag.
        tag: Tag,
    },
    /// A negative tag appeared in a rebuild.
    InvalidParticleTag {
        /// The rejected tag.
        tag: Tag,
    },
    /// Access through a view or capsule whose memory may have moved.
    StaleView {
        /// Property the view was bound to.
        property: ParticleProperty,
        /// What invalidated it.
        reason: StaleReason,
    },
    /// Sampling outside an armed, registered phase.
    NotArmed {
        /// Which precondition failed.
        reason: &'static str,
    },
    /// A copy-mode transfer between spaces failed.
    CrossSpaceCopyFailed {
        /// Source space.
        from: ExecutionSpace,
        /// Destination space.
        to: ExecutionSpace,
        /// Backend-reported cause.
        reason: String,
    },
    /// The engine cannot provide this property in any space.
    PropertyUnavailable {
        /// The requested property.
        property: ParticleProperty,
        /// The requested space.
        space: ExecutionSpace,
    },
    /// The property was not enabled on the hook.
    PropertyNotEnabled {
        /// The requested property.
        property: ParticleProperty,
    },
    /// Engine arrays do not have the shape a property requires.
    IncompatibleLayout {
        /// The property being bound.
        property: ParticleProperty,
        /// Description of the mismatch.
        reason: String,
    },
    /// A second writable exposure of the same property in the same space.
    AccessConflict {
        /// The contended property.
        property: ParticleProperty,
        /// The contended space.
        space: ExecutionSpace,
    },
    /// A property name that does not match any known property.
    UnknownProperty {
        /// The unrecognized name.
        name: String,
    },
}

impl fmt::Display for DlextError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnsupportedExecutionSpace { space } => {
                write!(f, "execution space '{space}' is not supported")
            }
            Self::ImageOffsetOverflow { axis, value } => {
                write!(f, "image offset {value} on axis {axis} is out of range")
            }
            Self::UnknownParticleTag { tag } => write!(f, "unknown particle tag {tag}"),
            Self::UnknownParticleIndex { index, len } => {
                write!(f, "particle index {index} out of range (len {len})")
            }
            Self::DuplicateParticleTag { tag } => write!(f, "duplicate particle tag {tag}"),
            Self::InvalidParticleTag { tag } => write!(f, "invalid particle tag {tag}"),
            Self::StaleView { property, reason } => {
                write!(f, "stale view of '{property}': {reason}")
            }
            Self::NotArmed { reason } => write!(f, "sampling not armed: {reason}"),
            Self::CrossSpaceCopyFailed { from, to, reason } => {
                write!(f, "copy from {from} to {to} failed: {reason}")
            }
            Self::PropertyUnavailable { property, space } => {
                write!(f, "property '{property}' is unavailable ({space} requested)")
            }
            Self::PropertyNotEnabled { property } => {
                write!(f, "property '{property}' is not enabled")
            }
            Self::IncompatibleLayout { property, reason } => {
                write!(f, "incompatible layout for '{property}': {reason}")
            }
            Self::AccessConflict { property, space } => {
                write!(f, "'{property}' is already exposed read-write on {space}")
            }
            Self::UnknownProperty { name } => write!(f, "unknown property '{name}'"),
        }
    }
}

impl Error for DlextError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stale_view_message_names_property_and_cause() {
        let e = DlextError::StaleView {
            property: ParticleProperty::Positions,
            reason: StaleReason::GenerationMismatch {
                bound: Generation(1),
                current: Generation(3),
            },
        };
        assert_eq!(
            e.to_string(),
            "stale view of 'positions': bound at generation 1, engine is at 3"
        );
    }

    #[test]
    fn errors_are_std_errors() {
        fn takes(_: &dyn Error) {}
        takes(&DlextError::NotArmed {
            reason: "outside phase",
        });
    }
}
