//! Named particle properties and the engine arrays behind them.

use std::fmt;
use std::str::FromStr;

use crate::error::DlextError;

/// Element type of an engine array.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ScalarType {
    /// 32-bit IEEE float.
    Float32,
    /// 64-bit IEEE float.
    Float64,
    /// Signed 32-bit integer.
    Int32,
    /// Signed 64-bit integer.
    Int64,
    /// Unsigned 32-bit integer.
    UInt32,
}

impl ScalarType {
    /// Element type of tag arrays for this build.
    #[cfg(not(feature = "bigbig"))]
    pub const TAG_INT: ScalarType = ScalarType::Int32;
    /// Element type of tag arrays for this build.
    #[cfg(feature = "bigbig")]
    pub const TAG_INT: ScalarType = ScalarType::Int64;

    /// Element type of image-flag arrays for this build.
    #[cfg(not(feature = "bigbig"))]
    pub const IMAGE_INT: ScalarType = ScalarType::Int32;
    /// Element type of image-flag arrays for this build.
    #[cfg(feature = "bigbig")]
    pub const IMAGE_INT: ScalarType = ScalarType::Int64;

    /// Width of one element in bytes.
    pub fn size_bytes(self) -> usize {
        match self {
            Self::Float32 | Self::Int32 | Self::UInt32 => 4,
            Self::Float64 | Self::Int64 => 8,
        }
    }

    /// Whether this is a floating-point type.
    pub fn is_float(self) -> bool {
        matches!(self, Self::Float32 | Self::Float64)
    }
}

impl fmt::Display for ScalarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Float32 => "f32",
            Self::Float64 => "f64",
            Self::Int32 => "i32",
            Self::Int64 => "i64",
            Self::UInt32 => "u32",
        };
        f.write_str(s)
    }
}

/// A raw per-particle (or per-type) array the engine owns.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ArrayKind {
    /// Wrapped coordinates, 3 components.
    Positions,
    /// Velocities, 3 components.
    Velocities,
    /// Forces, 3 components.
    Forces,
    /// Per-type mass table, `ntypes + 1` rows.
    TypeMasses,
    /// Integer type indices.
    Types,
    /// Persistent particle tags.
    Tags,
    /// Packed periodic image flags.
    Images,
    /// Type index stored as a float column next to positions.
    PackedTypes,
    /// Per-particle mass stored next to velocities.
    ParticleMasses,
    /// Per-particle energy stored next to forces.
    Energies,
}

impl ArrayKind {
    /// Every array kind, in declaration order.
    pub const ALL: [ArrayKind; 10] = [
        ArrayKind::Positions,
        ArrayKind::Velocities,
        ArrayKind::Forces,
        ArrayKind::TypeMasses,
        ArrayKind::Types,
        ArrayKind::Tags,
        ArrayKind::Images,
        ArrayKind::PackedTypes,
        ArrayKind::ParticleMasses,
        ArrayKind::Energies,
    ];

    /// Number of array kinds.
    pub const COUNT: usize = Self::ALL.len();

    /// Dense index, `0..COUNT`.
    pub fn index(self) -> usize {
        self as usize
    }

    /// Components per row.
    pub fn components(self) -> usize {
        match self {
            Self::Positions | Self::Velocities | Self::Forces => 3,
            _ => 1,
        }
    }

    /// Whether rows are indexed by particle type rather than particle.
    pub fn per_type(self) -> bool {
        matches!(self, Self::TypeMasses)
    }
}

impl fmt::Display for ArrayKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Positions => "x",
            Self::Velocities => "v",
            Self::Forces => "f",
            Self::TypeMasses => "mass",
            Self::Types => "type",
            Self::Tags => "tag",
            Self::Images => "image",
            Self::PackedTypes => "x_type",
            Self::ParticleMasses => "rmass",
            Self::Energies => "eatom",
        };
        f.write_str(s)
    }
}

/// Where a property's data comes from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PropertySource {
    /// A single engine array.
    Array(ArrayKind),
    /// Two engine arrays whose columns are interleaved row by row, the
    /// second immediately after the first.
    Interleaved(ArrayKind, ArrayKind),
    /// The bridge's own dense tag-to-index array.
    TagMap,
}

/// A logical array that can be exposed as a tensor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ParticleProperty {
    /// `[n, 3]` wrapped coordinates.
    Positions,
    /// `[n, 3]` velocities.
    Velocities,
    /// `[n, 3]` forces.
    Forces,
    /// `[ntypes + 1]` per-type masses.
    Masses,
    /// `[n]` type indices.
    Types,
    /// `[n]` particle tags.
    Tags,
    /// `[n]` packed image flags.
    Images,
    /// `[n, 4]` forces with per-particle energy.
    NetForces,
    /// `[n, 4]` positions with type as a fourth column.
    PositionsTypes,
    /// `[n, 4]` velocities with per-particle mass.
    VelocitiesMasses,
    /// `[max_tag + 1]` dense tag-to-index array.
    TagsMap,
}

impl ParticleProperty {
    /// Every property, in declaration order.
    pub const ALL: [ParticleProperty; 11] = [
        ParticleProperty::Positions,
        ParticleProperty::Velocities,
        ParticleProperty::Forces,
        ParticleProperty::Masses,
        ParticleProperty::Types,
        ParticleProperty::Tags,
        ParticleProperty::Images,
        ParticleProperty::NetForces,
        ParticleProperty::PositionsTypes,
        ParticleProperty::VelocitiesMasses,
        ParticleProperty::TagsMap,
    ];

    /// Number of properties.
    pub const COUNT: usize = Self::ALL.len();

    /// Dense index, `0..COUNT`.
    pub fn index(self) -> usize {
        self as usize
    }

    /// Canonical lowercase name.
    pub fn name(self) -> &'static str {
        match self {
            Self::Positions => "positions",
            Self::Velocities => "velocities",
            Self::Forces => "forces",
            Self::Masses => "masses",
            Self::Types => "types",
            Self::Tags => "tags",
            Self::Images => "images",
            Self::NetForces => "net_forces",
            Self::PositionsTypes => "positions_types",
            Self::VelocitiesMasses => "velocities_masses",
            Self::TagsMap => "tags_map",
        }
    }

    /// Where the data comes from.
    pub fn source(self) -> PropertySource {
        use ArrayKind as A;
        match self {
            Self::Positions => PropertySource::Array(A::Positions),
            Self::Velocities => PropertySource::Array(A::Velocities),
            Self::Forces => PropertySource::Array(A::Forces),
            Self::Masses => PropertySource::Array(A::TypeMasses),
            Self::Types => PropertySource::Array(A::Types),
            Self::Tags => PropertySource::Array(A::Tags),
            Self::Images => PropertySource::Array(A::Images),
            Self::NetForces => PropertySource::Interleaved(A::Forces, A::Energies),
            Self::PositionsTypes => PropertySource::Interleaved(A::Positions, A::PackedTypes),
            Self::VelocitiesMasses => {
                PropertySource::Interleaved(A::Velocities, A::ParticleMasses)
            }
            Self::TagsMap => PropertySource::TagMap,
        }
    }

    /// Width of the second tensor dimension; `1` means the tensor is 1-D.
    pub fn components(self) -> usize {
        match self.source() {
            PropertySource::Array(kind) => kind.components(),
            PropertySource::Interleaved(a, b) => a.components() + b.components(),
            PropertySource::TagMap => 1,
        }
    }

    /// Whether this property spans two engine arrays.
    pub fn is_composite(self) -> bool {
        matches!(self.source(), PropertySource::Interleaved(..))
    }

    /// Engine arrays that must be synchronized before exposing this
    /// property. Empty for the tag map, which lives in the bridge.
    pub fn arrays(self) -> &'static [ArrayKind] {
        use ArrayKind as A;
        match self {
            Self::Positions => &[A::Positions],
            Self::Velocities => &[A::Velocities],
            Self::Forces => &[A::Forces],
            Self::Masses => &[A::TypeMasses],
            Self::Types => &[A::Types],
            Self::Tags => &[A::Tags],
            Self::Images => &[A::Images],
            Self::NetForces => &[A::Forces, A::Energies],
            Self::PositionsTypes => &[A::Positions, A::PackedTypes],
            Self::VelocitiesMasses => &[A::Velocities, A::ParticleMasses],
            Self::TagsMap => &[],
        }
    }
}

impl fmt::Display for ParticleProperty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ParticleProperty {
    type Err = DlextError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|p| p.name() == s)
            .ok_or_else(|| DlextError::UnknownProperty { name: s.to_owned() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_parse_back() {
        for p in ParticleProperty::ALL {
            assert_eq!(p.name().parse::<ParticleProperty>(), Ok(p));
        }
    }

    #[test]
    fn unknown_name_is_rejected() {
        assert_eq!(
            "charges".parse::<ParticleProperty>(),
            Err(DlextError::UnknownProperty {
                name: "charges".into()
            })
        );
    }

    #[test]
    fn index_is_dense() {
        for (i, p) in ParticleProperty::ALL.into_iter().enumerate() {
            assert_eq!(p.index(), i);
        }
    }

    #[test]
    fn array_kind_index_is_dense() {
        for (i, k) in ArrayKind::ALL.into_iter().enumerate() {
            assert_eq!(k.index(), i);
        }
    }

    #[test]
    fn composites_are_four_wide() {
        for p in ParticleProperty::ALL {
            let expected = match p {
                ParticleProperty::Positions
                | ParticleProperty::Velocities
                | ParticleProperty::Forces => 3,
                ParticleProperty::NetForces
                | ParticleProperty::PositionsTypes
                | ParticleProperty::VelocitiesMasses => 4,
                _ => 1,
            };
            assert_eq!(p.components(), expected, "{p}");
            assert_eq!(p.is_composite(), expected == 4);
        }
    }

    #[test]
    fn sync_arrays_cover_sources() {
        for p in ParticleProperty::ALL {
            match p.source() {
                PropertySource::Array(a) => assert_eq!(p.arrays(), &[a]),
                PropertySource::Interleaved(a, b) => assert_eq!(p.arrays(), &[a, b]),
                PropertySource::TagMap => assert!(p.arrays().is_empty()),
            }
        }
    }

    #[test]
    fn scalar_sizes() {
        assert_eq!(ScalarType::Float64.size_bytes(), 8);
        assert_eq!(ScalarType::Float32.size_bytes(), 4);
        assert_eq!(
            ScalarType::TAG_INT.size_bytes(),
            std::mem::size_of::<crate::TagInt>()
        );
        assert_eq!(
            ScalarType::IMAGE_INT.size_bytes(),
            std::mem::size_of::<crate::ImageInt>()
        );
    }
}
