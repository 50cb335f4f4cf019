//! Generation-checked handle over one property.

use std::ffi::c_void;

use dlext_core::{
    AccessMode, ArrayKind, DlextError, ExecutionSpace, Generation, ParticleEngine, ParticleProperty,
    PropertySource, StaleReason,
};

use crate::layout::TensorLayout;
use crate::tagmap::TagIndexMap;

/// One property bound to an execution space and access mode.
///
/// The view caches the engine's pointer, shape and strides as of its last
/// [`refresh`](Self::refresh) together with the engine generation at that
/// moment. Checked accessors fail with [`DlextError::StaleView`] once the
/// engine has moved past that generation; the view never refreshes itself
/// implicitly.
#[derive(Clone, Debug)]
pub struct View {
    property: ParticleProperty,
    space: ExecutionSpace,
    mode: AccessMode,
    layout: TensorLayout,
    generation: Generation,
}

impl View {
    /// Bind `property` in `space` for `mode` against the engine's current
    /// arrays.
    ///
    /// Fails with [`DlextError::UnsupportedExecutionSpace`] before touching
    /// any pointer if `space` is unavailable. When the engine keeps the
    /// array only in the other space, the view is bound there and reports
    /// it through [`resident`](Self::resident).
    pub fn bind(
        engine: &dyn ParticleEngine,
        tag_map: &TagIndexMap,
        property: ParticleProperty,
        space: ExecutionSpace,
        mode: AccessMode,
    ) -> Result<Self, DlextError> {
        space.require(engine.accelerator())?;
        let layout = resolve(engine, tag_map, property, space)?;
        Ok(Self {
            property,
            space,
            mode,
            layout,
            generation: engine.generation(),
        })
    }

    /// Re-read pointers and sizes from the engine and re-stamp the
    /// generation. On failure the view is left unchanged.
    ///
    /// The requested space is checked again, so a device view fails with
    /// [`DlextError::UnsupportedExecutionSpace`] once the accelerator is
    /// gone instead of rebinding to host memory.
    pub fn refresh(
        &mut self,
        engine: &dyn ParticleEngine,
        tag_map: &TagIndexMap,
    ) -> Result<(), DlextError> {
        self.space.require(engine.accelerator())?;
        self.layout = resolve(engine, tag_map, self.property, self.space)?;
        self.generation = engine.generation();
        Ok(())
    }

    /// Whether the engine is still at the generation this view was bound at.
    pub fn is_valid(&self, engine: &dyn ParticleEngine) -> bool {
        self.generation == engine.generation()
    }

    /// The layout, if still valid.
    pub fn layout(&self, engine: &dyn ParticleEngine) -> Result<&TensorLayout, DlextError> {
        let current = engine.generation();
        if self.generation != current {
            return Err(DlextError::StaleView {
                property: self.property,
                reason: StaleReason::GenerationMismatch {
                    bound: self.generation,
                    current,
                },
            });
        }
        Ok(&self.layout)
    }

    /// Base address, if still valid.
    pub fn base_address(&self, engine: &dyn ParticleEngine) -> Result<*mut c_void, DlextError> {
        self.layout(engine).map(|l| l.ptr)
    }

    /// Layout as of the last refresh, without a validity check.
    pub fn cached_layout(&self) -> &TensorLayout {
        &self.layout
    }

    /// Number of elements.
    pub fn element_count(&self) -> usize {
        self.layout.element_count()
    }

    /// Elements between consecutive rows.
    pub fn element_stride(&self) -> usize {
        self.layout.element_stride()
    }

    /// The bound property.
    pub fn property(&self) -> ParticleProperty {
        self.property
    }

    /// The requested space.
    pub fn space(&self) -> ExecutionSpace {
        self.space
    }

    /// Space the bound memory actually lives in.
    pub fn resident(&self) -> ExecutionSpace {
        self.layout.space
    }

    /// Whether the memory lives in the requested space.
    pub fn is_resident(&self) -> bool {
        self.layout.space == self.space
    }

    /// The access mode.
    pub fn mode(&self) -> AccessMode {
        self.mode
    }

    /// Generation stamp.
    pub fn generation(&self) -> Generation {
        self.generation
    }
}

fn resolve(
    engine: &dyn ParticleEngine,
    tag_map: &TagIndexMap,
    property: ParticleProperty,
    space: ExecutionSpace,
) -> Result<TensorLayout, DlextError> {
    let unavailable = DlextError::PropertyUnavailable { property, space };
    let rows = |per_type: bool| {
        if per_type {
            engine.type_count() + 1
        } else {
            engine.local_particle_count()
        }
    };

    // Requested space first, then the other one if the engine can serve it.
    let mut candidates = vec![space];
    if engine.supports(space.other()) {
        candidates.push(space.other());
    }

    match property.source() {
        PropertySource::TagMap => {
            // Host-resident regardless of the requested space.
            let raw = tag_map.raw_array().ok_or(unavailable)?;
            TensorLayout::from_array(property, ArrayKind::Tags, raw, raw.rows)
        }
        PropertySource::Array(kind) => {
            for at in candidates {
                if let Some(raw) = engine.array(kind, at) {
                    return TensorLayout::from_array(property, kind, raw, rows(kind.per_type()));
                }
            }
            Err(unavailable)
        }
        PropertySource::Interleaved(a, b) => {
            for at in candidates {
                if let (Some(first), Some(second)) = (engine.array(a, at), engine.array(b, at)) {
                    return TensorLayout::from_interleaved(
                        property,
                        (a, first),
                        (b, second),
                        rows(false),
                    );
                }
            }
            Err(unavailable)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dlext_core::Tag;
    use dlext_test_utils::MockEngine;

    fn map_for(engine: &MockEngine) -> TagIndexMap {
        let mut map = TagIndexMap::default();
        map.rebuild(engine.local_tags(), engine.generation()).unwrap();
        map
    }

    #[test]
    fn bind_stamps_current_generation() {
        let engine = MockEngine::new(4, 2);
        let map = map_for(&engine);
        let view = View::bind(
            &engine,
            &map,
            ParticleProperty::Positions,
            ExecutionSpace::Host,
            AccessMode::ReadOnly,
        )
        .unwrap();
        assert!(view.is_valid(&engine));
        assert_eq!(view.generation(), engine.generation());
        assert_eq!(view.element_count(), 12);
        assert!(view.is_resident());
    }

    #[test]
    fn reorder_invalidates_until_refresh() {
        let mut engine = MockEngine::new(6, 2);
        let mut map = map_for(&engine);
        let mut view = View::bind(
            &engine,
            &map,
            ParticleProperty::Velocities,
            ExecutionSpace::Host,
            AccessMode::ReadOnly,
        )
        .unwrap();

        engine.reorder(7);
        assert!(!view.is_valid(&engine));
        assert!(matches!(
            view.base_address(&engine),
            Err(DlextError::StaleView {
                property: ParticleProperty::Velocities,
                reason: StaleReason::GenerationMismatch { .. },
            })
        ));

        map.rebuild(engine.local_tags(), engine.generation()).unwrap();
        view.refresh(&engine, &map).unwrap();
        assert!(view.is_valid(&engine));
        assert!(view.base_address(&engine).is_ok());
    }

    #[test]
    fn device_without_accelerator_is_rejected() {
        let engine = MockEngine::new(3, 1);
        let map = map_for(&engine);
        let err = View::bind(
            &engine,
            &map,
            ParticleProperty::Forces,
            ExecutionSpace::Device,
            AccessMode::ReadOnly,
        )
        .unwrap_err();
        assert_eq!(
            err,
            DlextError::UnsupportedExecutionSpace {
                space: ExecutionSpace::Device
            }
        );
    }

    #[test]
    fn refresh_fails_once_accelerator_is_gone() {
        let mut engine = MockEngine::new(3, 1).with_device(0);
        let map = map_for(&engine);
        let mut view = View::bind(
            &engine,
            &map,
            ParticleProperty::Forces,
            ExecutionSpace::Device,
            AccessMode::ReadOnly,
        )
        .unwrap();
        let bound = view.generation();

        engine.remove_accelerator();
        assert_eq!(
            view.refresh(&engine, &map),
            Err(DlextError::UnsupportedExecutionSpace {
                space: ExecutionSpace::Device
            })
        );
        assert_eq!(view.generation(), bound);
        assert_eq!(view.resident(), ExecutionSpace::Device);
    }

    #[test]
    fn host_only_array_is_resident_on_host() {
        let engine = MockEngine::new(3, 1).with_device(0);
        let map = map_for(&engine);
        // The mock keeps the per-type mass table on the host only.
        let view = View::bind(
            &engine,
            &map,
            ParticleProperty::Masses,
            ExecutionSpace::Device,
            AccessMode::ReadOnly,
        )
        .unwrap();
        assert_eq!(view.resident(), ExecutionSpace::Host);
        assert!(!view.is_resident());
        assert_eq!(view.cached_layout().shape.as_slice(), &[2]);
    }

    #[test]
    fn composite_spans_four_columns() {
        let engine = MockEngine::new(5, 3);
        let map = map_for(&engine);
        let view = View::bind(
            &engine,
            &map,
            ParticleProperty::PositionsTypes,
            ExecutionSpace::Host,
            AccessMode::ReadOnly,
        )
        .unwrap();
        let layout = view.cached_layout();
        assert_eq!(layout.shape.as_slice(), &[5, 4]);
        assert_eq!(layout.strides.as_slice(), &[4, 1]);
        assert_eq!(view.element_stride(), 4);
    }

    #[test]
    fn tags_map_requires_dense_map() {
        let engine = MockEngine::new(3, 1);
        let mut map = TagIndexMap::new(crate::MapStyle::Hash);
        map.rebuild(engine.local_tags(), engine.generation()).unwrap();
        let err = View::bind(
            &engine,
            &map,
            ParticleProperty::TagsMap,
            ExecutionSpace::Host,
            AccessMode::ReadOnly,
        )
        .unwrap_err();
        assert!(matches!(err, DlextError::PropertyUnavailable { .. }));

        let map = map_for(&engine);
        let view = View::bind(
            &engine,
            &map,
            ParticleProperty::TagsMap,
            ExecutionSpace::Host,
            AccessMode::ReadOnly,
        )
        .unwrap();
        let max_tag = engine.tags().iter().map(|t| t.0 as usize).max().unwrap();
        assert_eq!(view.element_count(), max_tag + 1);
        assert_eq!(map.index_of(Tag(1)), Ok(0));
    }
}
