//! Strongly-typed identifiers and the engine's integer widths.

use std::fmt;

/// Integer type the engine uses for particle tags.
///
/// 32-bit by default, 64-bit with the `bigbig` feature.
#[cfg(not(feature = "bigbig"))]
pub type TagInt = i32;
/// Integer type the engine uses for particle tags.
#[cfg(feature = "bigbig")]
pub type TagInt = i64;

/// Integer type the engine packs periodic image flags into.
///
/// 32-bit by default, 64-bit with the `bigbig` feature.
#[cfg(not(feature = "bigbig"))]
pub type ImageInt = i32;
/// Integer type the engine packs periodic image flags into.
#[cfg(feature = "bigbig")]
pub type ImageInt = i64;

/// Persistent identity of a particle.
///
/// Tags survive domain migration and storage reordering; the local storage
/// slot of a particle does not. Tag `0` is reserved by the engine for
/// untagged systems but is still accepted as a key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Tag(pub TagInt);

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<TagInt> for Tag {
    fn from(v: TagInt) -> Self {
        Self(v)
    }
}

/// Engine allocation generation.
///
/// Incremented by the engine whenever it reallocates, resizes or reorders
/// any per-particle array. Views stamp the generation they were bound at
/// and compare it against the live value before every access.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Generation(pub u64);

impl Generation {
    /// The generation that follows this one.
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for Generation {
    fn from(v: u64) -> Self {
        Self(v)
    }
}

/// Engine timestep counter (LAMMPS `bigint ntimestep`).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimeStep(pub i64);

impl fmt::Display for TimeStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for TimeStep {
    fn from(v: i64) -> Self {
        Self(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generation_next_is_monotonic() {
        let g = Generation(7);
        assert_eq!(g.next(), Generation(8));
        assert!(g.next() > g);
    }

    #[test]
    fn tag_display_matches_inner() {
        assert_eq!(Tag(42).to_string(), "42");
        assert_eq!(Tag::from(3), Tag(3));
    }
}
