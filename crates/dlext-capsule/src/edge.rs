//! `repr(i32)` enums and status codes for foreign callers.
//!
//! Internal code uses the closed Rust enums from `dlext-core`. These
//! mirrors exist for bindings that can only pass integers; every
//! conversion from an integer is checked.

use dlext_core::{AccessMode, DlextError, ExecutionSpace, ParticleProperty};

use crate::sampler::Ownership;

/// Status code returned across the interface edge.
///
/// `Ok` = 0, all errors are negative. Values are ABI-stable.
#[repr(i32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DlextStatus {
    /// Success.
    Ok = 0,
    /// Requested execution space is not available.
    UnsupportedExecutionSpace = -1,
    /// Image offset out of range.
    ImageOffsetOverflow = -2,
    /// Tag not owned locally.
    UnknownParticleTag = -3,
    /// View or capsule no longer backed by live memory.
    StaleView = -4,
    /// Sampling outside an armed phase.
    NotArmed = -5,
    /// Copy between spaces failed.
    CrossSpaceCopyFailed = -6,
    /// Storage index out of range.
    UnknownParticleIndex = -7,
    /// Repeated tag in a rebuild.
    DuplicateParticleTag = -8,
    /// Negative tag in a rebuild.
    InvalidParticleTag = -9,
    /// Engine cannot provide the property.
    PropertyUnavailable = -10,
    /// Property not enabled on the hook.
    PropertyNotEnabled = -11,
    /// Engine arrays have the wrong shape.
    IncompatibleLayout = -12,
    /// Property already exposed read-write in that space.
    AccessConflict = -13,
    /// Unrecognized property name.
    UnknownProperty = -14,
    /// An integer argument does not name a valid enum value.
    InvalidArgument = -15,
    /// Fix arguments failed validation.
    ConfigError = -16,
}

impl From<&DlextError> for DlextStatus {
    fn from(e: &DlextError) -> Self {
        match e {
            DlextError::UnsupportedExecutionSpace { .. } => Self::UnsupportedExecutionSpace,
            DlextError::ImageOffsetOverflow { .. } => Self::ImageOffsetOverflow,
            DlextError::UnknownParticleTag { .. } => Self::UnknownParticleTag,
            DlextError::UnknownParticleIndex { .. } => Self::UnknownParticleIndex,
            DlextError::DuplicateParticleTag { .. } => Self::DuplicateParticleTag,
            DlextError::InvalidParticleTag { .. } => Self::InvalidParticleTag,
            DlextError::StaleView { .. } => Self::StaleView,
            DlextError::NotArmed { .. } => Self::NotArmed,
            DlextError::CrossSpaceCopyFailed { .. } => Self::CrossSpaceCopyFailed,
            DlextError::PropertyUnavailable { .. } => Self::PropertyUnavailable,
            DlextError::PropertyNotEnabled { .. } => Self::PropertyNotEnabled,
            DlextError::IncompatibleLayout { .. } => Self::IncompatibleLayout,
            DlextError::AccessConflict { .. } => Self::AccessConflict,
            DlextError::UnknownProperty { .. } => Self::UnknownProperty,
        }
    }
}

impl<T> From<&Result<T, DlextError>> for DlextStatus {
    fn from(r: &Result<T, DlextError>) -> Self {
        match r {
            Ok(_) => Self::Ok,
            Err(e) => Self::from(e),
        }
    }
}

/// Execution space as an integer.
#[repr(i32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DlextExecutionSpace {
    /// Host memory.
    Host = 0,
    /// Accelerator memory.
    Device = 1,
}

/// Access mode as an integer.
#[repr(i32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DlextAccessMode {
    /// Read only.
    ReadOnly = 0,
    /// Read and write.
    ReadWrite = 1,
}

/// Capsule ownership as an integer.
#[repr(i32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DlextOwnership {
    /// Borrows engine memory.
    Borrow = 0,
    /// Owns a copy.
    Copy = 1,
}

/// Particle property as an integer.
#[repr(i32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DlextProperty {
    /// `positions`.
    Positions = 0,
    /// `velocities`.
    Velocities = 1,
    /// `forces`.
    Forces = 2,
    /// `masses`.
    Masses = 3,
    /// `types`.
    Types = 4,
    /// `tags`.
    Tags = 5,
    /// `images`.
    Images = 6,
    /// `net_forces`.
    NetForces = 7,
    /// `positions_types`.
    PositionsTypes = 8,
    /// `velocities_masses`.
    VelocitiesMasses = 9,
    /// `tags_map`.
    TagsMap = 10,
}

impl TryFrom<i32> for DlextExecutionSpace {
    type Error = DlextStatus;

    fn try_from(v: i32) -> Result<Self, Self::Error> {
        match v {
            0 => Ok(Self::Host),
            1 => Ok(Self::Device),
            _ => Err(DlextStatus::InvalidArgument),
        }
    }
}

impl TryFrom<i32> for DlextAccessMode {
    type Error = DlextStatus;

    fn try_from(v: i32) -> Result<Self, Self::Error> {
        match v {
            0 => Ok(Self::ReadOnly),
            1 => Ok(Self::ReadWrite),
            _ => Err(DlextStatus::InvalidArgument),
        }
    }
}

impl TryFrom<i32> for DlextProperty {
    type Error = DlextStatus;

    fn try_from(v: i32) -> Result<Self, Self::Error> {
        Ok(match v {
            0 => Self::Positions,
            1 => Self::Velocities,
            2 => Self::Forces,
            3 => Self::Masses,
            4 => Self::Types,
            5 => Self::Tags,
            6 => Self::Images,
            7 => Self::NetForces,
            8 => Self::PositionsTypes,
            9 => Self::VelocitiesMasses,
            10 => Self::TagsMap,
            _ => return Err(DlextStatus::InvalidArgument),
        })
    }
}

impl From<DlextExecutionSpace> for ExecutionSpace {
    fn from(v: DlextExecutionSpace) -> Self {
        match v {
            DlextExecutionSpace::Host => Self::Host,
            DlextExecutionSpace::Device => Self::Device,
        }
    }
}

impl From<ExecutionSpace> for DlextExecutionSpace {
    fn from(v: ExecutionSpace) -> Self {
        match v {
            ExecutionSpace::Host => Self::Host,
            ExecutionSpace::Device => Self::Device,
        }
    }
}

impl From<DlextAccessMode> for AccessMode {
    fn from(v: DlextAccessMode) -> Self {
        match v {
            DlextAccessMode::ReadOnly => Self::ReadOnly,
            DlextAccessMode::ReadWrite => Self::ReadWrite,
        }
    }
}

impl From<AccessMode> for DlextAccessMode {
    fn from(v: AccessMode) -> Self {
        match v {
            AccessMode::ReadOnly => Self::ReadOnly,
            AccessMode::ReadWrite => Self::ReadWrite,
        }
    }
}

impl From<Ownership> for DlextOwnership {
    fn from(v: Ownership) -> Self {
        match v {
            Ownership::Borrow => Self::Borrow,
            Ownership::Copy => Self::Copy,
        }
    }
}

impl From<DlextProperty> for ParticleProperty {
    fn from(v: DlextProperty) -> Self {
        match v {
            DlextProperty::Positions => Self::Positions,
            DlextProperty::Velocities => Self::Velocities,
            DlextProperty::Forces => Self::Forces,
            DlextProperty::Masses => Self::Masses,
            DlextProperty::Types => Self::Types,
            DlextProperty::Tags => Self::Tags,
            DlextProperty::Images => Self::Images,
            DlextProperty::NetForces => Self::NetForces,
            DlextProperty::PositionsTypes => Self::PositionsTypes,
            DlextProperty::VelocitiesMasses => Self::VelocitiesMasses,
            DlextProperty::TagsMap => Self::TagsMap,
        }
    }
}

impl From<ParticleProperty> for DlextProperty {
    fn from(v: ParticleProperty) -> Self {
        match v {
            ParticleProperty::Positions => Self::Positions,
            ParticleProperty::Velocities => Self::Velocities,
            ParticleProperty::Forces => Self::Forces,
            ParticleProperty::Masses => Self::Masses,
            ParticleProperty::Types => Self::Types,
            ParticleProperty::Tags => Self::Tags,
            ParticleProperty::Images => Self::Images,
            ParticleProperty::NetForces => Self::NetForces,
            ParticleProperty::PositionsTypes => Self::PositionsTypes,
            ParticleProperty::VelocitiesMasses => Self::VelocitiesMasses,
            ParticleProperty::TagsMap => Self::TagsMap,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dlext_core::{Generation, StaleReason, Tag};

    #[test]
    fn status_code_values_are_stable() {
        assert_eq!(DlextStatus::Ok as i32, 0);
        assert_eq!(DlextStatus::UnsupportedExecutionSpace as i32, -1);
        assert_eq!(DlextStatus::ImageOffsetOverflow as i32, -2);
        assert_eq!(DlextStatus::UnknownParticleTag as i32, -3);
        assert_eq!(DlextStatus::StaleView as i32, -4);
        assert_eq!(DlextStatus::NotArmed as i32, -5);
        assert_eq!(DlextStatus::CrossSpaceCopyFailed as i32, -6);
        assert_eq!(DlextStatus::UnknownParticleIndex as i32, -7);
        assert_eq!(DlextStatus::DuplicateParticleTag as i32, -8);
        assert_eq!(DlextStatus::InvalidParticleTag as i32, -9);
        assert_eq!(DlextStatus::PropertyUnavailable as i32, -10);
        assert_eq!(DlextStatus::PropertyNotEnabled as i32, -11);
        assert_eq!(DlextStatus::IncompatibleLayout as i32, -12);
        assert_eq!(DlextStatus::AccessConflict as i32, -13);
        assert_eq!(DlextStatus::UnknownProperty as i32, -14);
        assert_eq!(DlextStatus::InvalidArgument as i32, -15);
        assert_eq!(DlextStatus::ConfigError as i32, -16);
    }

    #[test]
    fn errors_map_to_statuses() {
        let stale = DlextError::StaleView {
            property: ParticleProperty::Tags,
            reason: StaleReason::GenerationMismatch {
                bound: Generation(1),
                current: Generation(2),
            },
        };
        assert_eq!(DlextStatus::from(&stale), DlextStatus::StaleView);
        assert_eq!(
            DlextStatus::from(&DlextError::UnknownParticleTag { tag: Tag(4) }),
            DlextStatus::UnknownParticleTag
        );
        let ok: Result<(), DlextError> = Ok(());
        assert_eq!(DlextStatus::from(&ok), DlextStatus::Ok);
    }

    #[test]
    fn property_codes_follow_declaration_order() {
        for p in ParticleProperty::ALL {
            let code = DlextProperty::from(p) as i32;
            assert_eq!(code as usize, p.index());
            let back = DlextProperty::try_from(code).unwrap();
            assert_eq!(ParticleProperty::from(back), p);
        }
        assert_eq!(DlextProperty::try_from(11), Err(DlextStatus::InvalidArgument));
    }

    #[test]
    fn space_and_mode_codes() {
        assert_eq!(
            ExecutionSpace::from(DlextExecutionSpace::try_from(1).unwrap()),
            ExecutionSpace::Device
        );
        assert_eq!(
            DlextExecutionSpace::try_from(-1),
            Err(DlextStatus::InvalidArgument)
        );
        assert_eq!(
            AccessMode::from(DlextAccessMode::try_from(1).unwrap()),
            AccessMode::ReadWrite
        );
        assert_eq!(DlextAccessMode::from(AccessMode::ReadOnly) as i32, 0);
        assert_eq!(DlextOwnership::from(Ownership::Copy) as i32, 1);
    }
}
