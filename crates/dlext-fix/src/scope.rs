//! What a callback sees while a phase is open.

use dlext_capsule::Sampler;
use dlext_core::{
    AccessMode, DlextError, ExecutionSpace, ParticleEngine, ParticleProperty, TimeStep,
};
use dlext_view::TagIndexMap;

use crate::fix::Exchange;
use crate::phase::Phase;

/// One sampling request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SampleRequest {
    /// Property to expose.
    pub property: ParticleProperty,
    /// Space the capsule's data must live in.
    pub space: ExecutionSpace,
    /// Requested access.
    pub mode: AccessMode,
    /// Always copy, even when the data could be borrowed.
    pub snapshot: bool,
}

impl SampleRequest {
    /// Read-only, zero-copy where possible.
    pub fn new(property: ParticleProperty, space: ExecutionSpace) -> Self {
        Self {
            property,
            space,
            mode: AccessMode::ReadOnly,
            snapshot: false,
        }
    }

    /// Request `mode` access.
    pub fn with_mode(mut self, mode: AccessMode) -> Self {
        self.mode = mode;
        self
    }

    /// Request read-write access.
    pub fn read_write(self) -> Self {
        self.with_mode(AccessMode::ReadWrite)
    }

    /// Request an owned copy.
    pub fn snapshot(mut self) -> Self {
        self.snapshot = true;
        self
    }
}

/// Sampling access during one open phase.
///
/// Capsules returned here borrowing engine memory stay valid until the
/// hook next refreshes or is torn down, not just until the scope ends.
pub struct SamplingScope<'a> {
    exchange: &'a mut Exchange,
    engine: &'a mut dyn ParticleEngine,
    phase: Phase,
}

impl<'a> SamplingScope<'a> {
    pub(crate) fn new(
        exchange: &'a mut Exchange,
        engine: &'a mut dyn ParticleEngine,
        phase: Phase,
    ) -> Self {
        Self {
            exchange,
            engine,
            phase,
        }
    }

    /// The engine's current timestep.
    pub fn timestep(&self) -> TimeStep {
        self.engine.timestep()
    }

    /// The open phase.
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Read access to the engine, e.g. for particle counts.
    pub fn engine(&self) -> &dyn ParticleEngine {
        &*self.engine
    }

    /// The tag map of the current window.
    pub fn tag_map(&self) -> &TagIndexMap {
        self.exchange.tag_map()
    }

    /// A read-only request for `property` in the hook's configured space.
    pub fn request(&self, property: ParticleProperty) -> SampleRequest {
        SampleRequest::new(property, self.exchange.config().space)
    }

    /// Issue a capsule for `request`.
    pub fn sample(&mut self, request: SampleRequest) -> Result<Sampler, DlextError> {
        self.exchange.sample(&mut *self.engine, request)
    }

    fn named(
        &mut self,
        property: ParticleProperty,
        space: ExecutionSpace,
        mode: AccessMode,
    ) -> Result<Sampler, DlextError> {
        self.sample(SampleRequest::new(property, space).with_mode(mode))
    }

    /// Coordinates, `(n, 3)`.
    pub fn positions(&mut self, space: ExecutionSpace, mode: AccessMode) -> Result<Sampler, DlextError> {
        self.named(ParticleProperty::Positions, space, mode)
    }

    /// Velocities, `(n, 3)`.
    pub fn velocities(&mut self, space: ExecutionSpace, mode: AccessMode) -> Result<Sampler, DlextError> {
        self.named(ParticleProperty::Velocities, space, mode)
    }

    /// Forces, `(n, 3)`.
    pub fn forces(&mut self, space: ExecutionSpace, mode: AccessMode) -> Result<Sampler, DlextError> {
        self.named(ParticleProperty::Forces, space, mode)
    }

    /// Per-type masses, `(ntypes + 1,)`; entry 0 is unused.
    pub fn masses(&mut self, space: ExecutionSpace, mode: AccessMode) -> Result<Sampler, DlextError> {
        self.named(ParticleProperty::Masses, space, mode)
    }

    /// Particle types, `(n,)`.
    pub fn types(&mut self, space: ExecutionSpace, mode: AccessMode) -> Result<Sampler, DlextError> {
        self.named(ParticleProperty::Types, space, mode)
    }

    /// Particle tags, `(n,)`.
    pub fn tags(&mut self, space: ExecutionSpace, mode: AccessMode) -> Result<Sampler, DlextError> {
        self.named(ParticleProperty::Tags, space, mode)
    }

    /// Packed image flags, `(n,)`.
    pub fn images(&mut self, space: ExecutionSpace, mode: AccessMode) -> Result<Sampler, DlextError> {
        self.named(ParticleProperty::Images, space, mode)
    }

    /// Forces with per-particle energy, `(n, 4)`.
    pub fn net_forces(&mut self, space: ExecutionSpace, mode: AccessMode) -> Result<Sampler, DlextError> {
        self.named(ParticleProperty::NetForces, space, mode)
    }

    /// Coordinates with packed type, `(n, 4)`.
    pub fn positions_types(
        &mut self,
        space: ExecutionSpace,
        mode: AccessMode,
    ) -> Result<Sampler, DlextError> {
        self.named(ParticleProperty::PositionsTypes, space, mode)
    }

    /// Velocities with per-particle mass, `(n, 4)`.
    pub fn velocities_masses(
        &mut self,
        space: ExecutionSpace,
        mode: AccessMode,
    ) -> Result<Sampler, DlextError> {
        self.named(ParticleProperty::VelocitiesMasses, space, mode)
    }

    /// Dense tag-to-index array, `(max_tag + 1,)`; host only.
    pub fn tags_map(&mut self, space: ExecutionSpace, mode: AccessMode) -> Result<Sampler, DlextError> {
        self.named(ParticleProperty::TagsMap, space, mode)
    }
}

impl Drop for SamplingScope<'_> {
    fn drop(&mut self) {
        self.exchange.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_builders() {
        let r = SampleRequest::new(ParticleProperty::Forces, ExecutionSpace::Host);
        assert_eq!(r.mode, AccessMode::ReadOnly);
        assert!(!r.snapshot);
        let r = r.read_write().snapshot();
        assert_eq!(r.mode, AccessMode::ReadWrite);
        assert!(r.snapshot);
    }
}
