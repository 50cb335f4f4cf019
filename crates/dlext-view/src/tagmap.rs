//! Inverse index from persistent particle tag to current storage slot.
//!
//! The engine renumbers storage slots whenever particles migrate between
//! domains or get sorted for locality. [`TagIndexMap::rebuild`] is the only
//! mutator: it builds a complete replacement, validates it, and swaps it in
//! only on success, so a failed rebuild leaves the previous map intact.

use std::ffi::c_void;
use std::fmt;
use std::str::FromStr;

use dlext_core::{DlextError, ExecutionSpace, Generation, RawArray, ScalarType, Tag, TagInt};
use indexmap::IndexMap;

/// Storage strategy for the tag-to-index direction, after LAMMPS
/// `atom_modify map`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum MapStyle {
    /// Dense array of length `max_tag + 1`; absent tags hold `-1`.
    Array,
    /// Hash table keyed by tag.
    Hash,
    /// Array when the tag range is compact, hash otherwise.
    #[default]
    Auto,
}

/// Longest dense array a rebuild will allocate. Larger tag ranges are
/// stored in a hash even under [`MapStyle::Array`].
pub const MAX_DENSE_LEN: usize = 1 << 27;

impl MapStyle {
    /// Pick a concrete style for a tag set with `count` entries and
    /// largest tag `max_tag`.
    pub fn resolve(self, max_tag: usize, count: usize) -> MapStyle {
        let fits = max_tag < MAX_DENSE_LEN && count <= MAX_DENSE_LEN;
        match self {
            Self::Array | Self::Auto if !fits => Self::Hash,
            Self::Auto if max_tag < 4 * count + 1024 => Self::Array,
            Self::Auto => Self::Hash,
            concrete => concrete,
        }
    }
}

impl fmt::Display for MapStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Array => write!(f, "array"),
            Self::Hash => write!(f, "hash"),
            Self::Auto => write!(f, "yes"),
        }
    }
}

impl FromStr for MapStyle {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "array" => Ok(Self::Array),
            "hash" => Ok(Self::Hash),
            "yes" | "auto" => Ok(Self::Auto),
            other => Err(format!("unknown map style '{other}'")),
        }
    }
}

#[derive(Clone, Debug)]
enum Lookup {
    Dense(Vec<i32>),
    Hashed(IndexMap<Tag, usize>),
}

/// Bijection between the tags of locally owned particles and their
/// storage slots.
#[derive(Clone, Debug)]
pub struct TagIndexMap {
    style: MapStyle,
    lookup: Lookup,
    tags: Vec<Tag>,
    generation: Generation,
}

impl TagIndexMap {
    /// An empty map that will use `style` on every rebuild.
    pub fn new(style: MapStyle) -> Self {
        Self {
            style,
            lookup: Lookup::Dense(Vec::new()),
            tags: Vec::new(),
            generation: Generation::default(),
        }
    }

    /// Replace the map with one built from `tags`, where `tags[i]` is the
    /// tag of the particle in slot `i`.
    ///
    /// Fails on negative or repeated tags; the previous map is kept.
    pub fn rebuild(&mut self, tags: &[TagInt], generation: Generation) -> Result<(), DlextError> {
        let mut max_tag = 0usize;
        for &raw in tags {
            let tag = usize::try_from(raw)
                .map_err(|_| DlextError::InvalidParticleTag { tag: Tag(raw) })?;
            max_tag = max_tag.max(tag);
        }

        let style = self.style.resolve(max_tag, tags.len());
        if self.style == MapStyle::Array && style == MapStyle::Hash {
            tracing::debug!(max_tag, "tag range too wide for a dense map, using hash");
        }
        let lookup = match style {
            MapStyle::Hash => {
                let mut table = IndexMap::with_capacity(tags.len());
                for (i, &raw) in tags.iter().enumerate() {
                    let tag = Tag(raw);
                    if table.insert(tag, i).is_some() {
                        return Err(DlextError::DuplicateParticleTag { tag });
                    }
                }
                Lookup::Hashed(table)
            }
            _ => {
                let len = if tags.is_empty() { 0 } else { max_tag + 1 };
                let mut dense = vec![-1i32; len];
                for (i, &raw) in tags.iter().enumerate() {
                    // Both conversions are in range: `resolve` bounds the
                    // tag range and the particle count.
                    let (Ok(tag), Ok(index)) = (usize::try_from(raw), i32::try_from(i)) else {
                        return Err(DlextError::UnknownParticleIndex {
                            index: i,
                            len: tags.len(),
                        });
                    };
                    let slot = &mut dense[tag];
                    if *slot >= 0 {
                        return Err(DlextError::DuplicateParticleTag { tag: Tag(raw) });
                    }
                    *slot = index;
                }
                Lookup::Dense(dense)
            }
        };

        self.lookup = lookup;
        self.tags = tags.iter().map(|&t| Tag(t)).collect();
        self.generation = generation;
        tracing::debug!(
            particles = tags.len(),
            %generation,
            dense = self.is_dense(),
            "tag map rebuilt"
        );
        Ok(())
    }

    /// Storage slot of `tag`.
    pub fn index_of(&self, tag: Tag) -> Result<usize, DlextError> {
        let found = match &self.lookup {
            Lookup::Dense(dense) => usize::try_from(tag.0)
                .ok()
                .and_then(|t| dense.get(t))
                .and_then(|&i| usize::try_from(i).ok()),
            Lookup::Hashed(table) => table.get(&tag).copied(),
        };
        found.ok_or(DlextError::UnknownParticleTag { tag })
    }

    /// Tag of the particle in slot `index`.
    pub fn tag_of(&self, index: usize) -> Result<Tag, DlextError> {
        self.tags
            .get(index)
            .copied()
            .ok_or(DlextError::UnknownParticleIndex {
                index,
                len: self.tags.len(),
            })
    }

    /// Whether `tag` is owned locally.
    pub fn contains(&self, tag: Tag) -> bool {
        self.index_of(tag).is_ok()
    }

    /// Number of mapped particles.
    pub fn len(&self) -> usize {
        self.tags.len()
    }

    /// Whether the map is empty.
    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    /// Generation of the tag array this map was built from.
    pub fn generation(&self) -> Generation {
        self.generation
    }

    /// The configured style (possibly [`MapStyle::Auto`]).
    pub fn style(&self) -> MapStyle {
        self.style
    }

    /// Whether the current map is stored densely.
    pub fn is_dense(&self) -> bool {
        matches!(self.lookup, Lookup::Dense(_))
    }

    /// The dense tag-to-index array, if stored densely.
    pub fn dense(&self) -> Option<&[i32]> {
        match &self.lookup {
            Lookup::Dense(dense) => Some(dense),
            Lookup::Hashed(_) => None,
        }
    }

    /// Descriptor of the dense array for tensor export.
    ///
    /// The pointer is only valid until the next [`rebuild`](Self::rebuild).
    pub fn raw_array(&self) -> Option<RawArray> {
        self.dense().map(|dense| RawArray {
            ptr: dense.as_ptr() as *mut c_void,
            rows: dense.len(),
            components: 1,
            row_stride: 1,
            dtype: ScalarType::Int32,
            space: ExecutionSpace::Host,
        })
    }
}

impl Default for TagIndexMap {
    fn default() -> Self {
        Self::new(MapStyle::Auto)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn tags(raw: &[i64]) -> Vec<TagInt> {
        raw.iter().map(|&t| t as TagInt).collect()
    }

    fn built(style: MapStyle, raw: &[i64]) -> TagIndexMap {
        let mut map = TagIndexMap::new(style);
        map.rebuild(&tags(raw), Generation(1)).unwrap();
        map
    }

    #[test]
    fn small_sequence_both_directions() {
        for style in [MapStyle::Array, MapStyle::Hash, MapStyle::Auto] {
            let map = built(style, &[5, 2, 9]);
            assert_eq!(map.index_of(Tag(9)), Ok(2));
            assert_eq!(map.index_of(Tag(5)), Ok(0));
            assert_eq!(map.tag_of(0), Ok(Tag(5)));
            assert_eq!(map.tag_of(1), Ok(Tag(2)));
        }
    }

    #[test]
    fn unknown_tag_and_index() {
        let map = built(MapStyle::Array, &[5, 2, 9]);
        assert_eq!(
            map.index_of(Tag(3)),
            Err(DlextError::UnknownParticleTag { tag: Tag(3) })
        );
        assert_eq!(
            map.index_of(Tag(100)),
            Err(DlextError::UnknownParticleTag { tag: Tag(100) })
        );
        assert_eq!(
            map.tag_of(3),
            Err(DlextError::UnknownParticleIndex { index: 3, len: 3 })
        );
    }

    #[test]
    fn duplicate_tag_keeps_previous_map() {
        for style in [MapStyle::Array, MapStyle::Hash] {
            let mut map = built(style, &[1, 2, 3]);
            let err = map.rebuild(&tags(&[4, 7, 4]), Generation(2));
            assert_eq!(err, Err(DlextError::DuplicateParticleTag { tag: Tag(4) }));
            assert_eq!(map.generation(), Generation(1));
            assert_eq!(map.index_of(Tag(3)), Ok(2));
            assert!(!map.contains(Tag(7)));
        }
    }

    #[test]
    fn negative_tag_is_invalid() {
        let mut map = TagIndexMap::default();
        assert_eq!(
            map.rebuild(&tags(&[1, -4]), Generation(1)),
            Err(DlextError::InvalidParticleTag { tag: Tag(-4) })
        );
        assert!(map.is_empty());
    }

    #[test]
    fn auto_switches_to_hash_for_sparse_tags() {
        assert!(built(MapStyle::Auto, &[1, 2, 3]).is_dense());
        assert!(!built(MapStyle::Auto, &[1, 1_000_000]).is_dense());
        assert!(built(MapStyle::Array, &[1, 100_000]).is_dense());
        assert!(!built(MapStyle::Hash, &[1, 2]).is_dense());
    }

    #[test]
    fn huge_tag_range_falls_back_to_hash() {
        let huge = MAX_DENSE_LEN as i64;
        assert_eq!(MapStyle::Array.resolve(MAX_DENSE_LEN, 2), MapStyle::Hash);
        assert_eq!(MapStyle::Array.resolve(MAX_DENSE_LEN - 1, 2), MapStyle::Array);

        let map = built(MapStyle::Array, &[1, huge]);
        assert!(!map.is_dense());
        assert!(map.raw_array().is_none());
        assert_eq!(map.index_of(Tag(huge as TagInt)), Ok(1));

        let map = built(MapStyle::Array, &[3, i32::MAX as i64]);
        assert_eq!(map.index_of(Tag(i32::MAX as TagInt)), Ok(1));
    }

    #[test]
    fn dense_array_marks_absent_tags() {
        let map = built(MapStyle::Array, &[3, 1]);
        assert_eq!(map.dense(), Some(&[-1, 1, -1, 0][..]));
        let raw = map.raw_array().unwrap();
        assert_eq!(raw.rows, 4);
        assert_eq!(raw.dtype, ScalarType::Int32);
        assert_eq!(raw.space, ExecutionSpace::Host);
        assert!(built(MapStyle::Hash, &[3, 1]).raw_array().is_none());
    }

    #[test]
    fn empty_rebuild_clears() {
        let mut map = built(MapStyle::Array, &[1, 2]);
        map.rebuild(&[], Generation(5)).unwrap();
        assert!(map.is_empty());
        assert_eq!(map.dense(), Some(&[][..]));
        assert_eq!(map.generation(), Generation(5));
    }

    #[test]
    fn style_parses_lammps_keywords() {
        assert_eq!("array".parse(), Ok(MapStyle::Array));
        assert_eq!("hash".parse(), Ok(MapStyle::Hash));
        assert_eq!("yes".parse(), Ok(MapStyle::Auto));
        assert!("tree".parse::<MapStyle>().is_err());
    }

    fn unique_tags() -> impl Strategy<Value = Vec<i64>> {
        proptest::collection::hash_set(0i64..5000, 0..200)
            .prop_map(|set| set.into_iter().collect::<Vec<_>>())
            .prop_shuffle()
    }

    proptest! {
        #[test]
        fn index_of_inverts_tag_of(raw in unique_tags(), hash in any::<bool>()) {
            let style = if hash { MapStyle::Hash } else { MapStyle::Array };
            let map = built(style, &raw);
            prop_assert_eq!(map.len(), raw.len());
            for i in 0..map.len() {
                let tag = map.tag_of(i).unwrap();
                prop_assert_eq!(map.index_of(tag).unwrap(), i);
            }
        }

        #[test]
        fn rebuild_maps_only_new_tags(first in unique_tags(), second in unique_tags()) {
            let mut map = built(MapStyle::Auto, &first);
            map.rebuild(&tags(&second), Generation(2)).unwrap();
            let fresh = tags(&second);
            for i in 0..map.len() {
                prop_assert!(fresh.contains(&map.tag_of(i).unwrap().0));
            }
            for raw in tags(&first) {
                prop_assert_eq!(map.contains(Tag(raw)), fresh.contains(&raw));
            }
        }
    }
}
