//! The step-pipeline hook.
//!
//! [`FixDLExt`] is the LAMMPS `fix dlext` counterpart. It is registered with
//! the engine's [`StepPipeline`] at its configured phases; at each of them
//! the engine calls [`FixDLExt::on_phase`], which refreshes views if the
//! engine's arrays moved and then hands a [`SamplingScope`] to the user
//! callback.
//!
//! Lifecycle: `Uninitialized → Armed ⇄ Stale → TornDown`. A refresh failure
//! never aborts the engine step; it parks the hook in `Stale` and the error
//! is returned from the next sampling request.

use std::fmt;
use std::sync::Arc;

use dlext_capsule::Sampler;
use dlext_core::{
    AccessMode, ArrayKind, DlextError, ExecutionSpace, Generation, ParticleEngine,
    ParticleProperty, StepPipeline,
};
use dlext_view::{ExposureWindow, TagIndexMap, View};
use indexmap::map::Entry;
use indexmap::IndexMap;

use crate::config::{ConfigError, FixConfig};
use crate::metrics::ExchangeMetrics;
use crate::phase::Phase;
use crate::scope::{SampleRequest, SamplingScope};

/// User callback run once per registered phase.
pub type Callback = Box<dyn FnMut(&mut SamplingScope<'_>)>;

type ViewKey = (ParticleProperty, ExecutionSpace, AccessMode);

// ── HookState ─────────────────────────────────────────────────────

/// Lifecycle state of a [`FixDLExt`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HookState {
    /// Constructed, not yet registered with the pipeline.
    Uninitialized,
    /// Registered; samplers may be requested during registered phases.
    Armed,
    /// Registered, but the last refresh failed with the carried error.
    Stale(DlextError),
    /// Unregistered. Terminal.
    TornDown,
}

impl HookState {
    /// Short name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Uninitialized => "uninitialized",
            Self::Armed => "armed",
            Self::Stale(_) => "stale",
            Self::TornDown => "torn_down",
        }
    }

    /// Whether the hook is registered with a pipeline.
    pub fn is_attached(&self) -> bool {
        matches!(self, Self::Armed | Self::Stale(_))
    }
}

impl fmt::Display for HookState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stale(e) => write!(f, "stale ({e})"),
            other => f.write_str(other.name()),
        }
    }
}

// ── Exchange ──────────────────────────────────────────────────────

/// Everything a [`SamplingScope`] needs, split from the callback so both
/// can be borrowed at once.
pub(crate) struct Exchange {
    config: FixConfig,
    state: HookState,
    tag_map: TagIndexMap,
    views: IndexMap<ViewKey, View>,
    window: Arc<ExposureWindow>,
    synced: Option<Generation>,
    metrics: ExchangeMetrics,
    open: Option<Phase>,
}

impl Exchange {
    fn transition(&mut self, next: HookState) {
        if self.state != next {
            tracing::debug!(
                fix = %self.config.id,
                from = self.state.name(),
                to = next.name(),
                "hook state change"
            );
        }
        self.state = next;
    }

    /// Rebuild the tag map and re-bind every cached view if the engine
    /// generation moved, or retry if the last refresh failed.
    fn refresh_if_needed(&mut self, engine: &mut dyn ParticleEngine) {
        let current = engine.generation();
        if self.synced == Some(current) && self.state == HookState::Armed {
            return;
        }
        match self.refresh(engine) {
            Ok(()) => {
                self.synced = Some(current);
                self.metrics.refreshes += 1;
                self.transition(HookState::Armed);
            }
            Err(e) => {
                tracing::warn!(fix = %self.config.id, generation = %current, error = %e, "refresh failed");
                if self.state == HookState::Armed {
                    self.metrics.stale_transitions += 1;
                }
                self.transition(HookState::Stale(e));
            }
        }
    }

    fn refresh(&mut self, engine: &mut dyn ParticleEngine) -> Result<(), DlextError> {
        // Capsules from the previous window may point at moved memory, and
        // the rebuild below frees the old dense tag map. Invalidate them
        // before anything moves, whether or not the refresh succeeds.
        self.window.advance();
        engine.synchronize(ExecutionSpace::Host, &[ArrayKind::Tags]);
        let generation = engine.generation();
        self.tag_map.rebuild(engine.local_tags(), generation)?;
        for view in self.views.values_mut() {
            view.refresh(&*engine, &self.tag_map)?;
        }
        Ok(())
    }

    pub(crate) fn open(&mut self, engine: &mut dyn ParticleEngine, phase: Phase) -> Result<(), DlextError> {
        match self.state {
            HookState::Uninitialized => {
                return Err(DlextError::NotArmed {
                    reason: "hook is not attached",
                })
            }
            HookState::TornDown => {
                return Err(DlextError::NotArmed {
                    reason: "hook was torn down",
                })
            }
            HookState::Armed | HookState::Stale(_) => {}
        }
        if !self.config.phases.contains(phase) {
            return Err(DlextError::NotArmed {
                reason: "phase is not registered",
            });
        }
        self.refresh_if_needed(engine);
        self.open = Some(phase);
        Ok(())
    }

    pub(crate) fn close(&mut self) {
        self.open = None;
    }

    pub(crate) fn config(&self) -> &FixConfig {
        &self.config
    }

    pub(crate) fn tag_map(&self) -> &TagIndexMap {
        &self.tag_map
    }

    pub(crate) fn sample(
        &mut self,
        engine: &mut dyn ParticleEngine,
        request: SampleRequest,
    ) -> Result<Sampler, DlextError> {
        let result = self.try_sample(engine, request);
        match &result {
            Ok(sampler) => tracing::trace!(
                property = %request.property,
                space = %request.space,
                ownership = ?sampler.ownership(),
                "sampler issued"
            ),
            Err(e) => {
                self.metrics.rejected_requests += 1;
                tracing::debug!(property = %request.property, error = %e, "sample rejected");
            }
        }
        result
    }

    fn try_sample(
        &mut self,
        engine: &mut dyn ParticleEngine,
        request: SampleRequest,
    ) -> Result<Sampler, DlextError> {
        let SampleRequest {
            property,
            space,
            mode,
            snapshot,
        } = request;

        if let HookState::Stale(e) = &self.state {
            return Err(e.clone());
        }
        if self.open.is_none() {
            return Err(DlextError::NotArmed {
                reason: "no registered phase is open",
            });
        }
        if !self.config.properties.contains(&property) {
            return Err(DlextError::PropertyNotEnabled { property });
        }
        space.require(engine.accelerator())?;

        let view = match self.views.entry((property, space, mode)) {
            Entry::Occupied(e) => e.into_mut(),
            Entry::Vacant(e) => {
                e.insert(View::bind(&*engine, &self.tag_map, property, space, mode)?)
            }
        };

        // The tag map belongs to the hook; writers only ever get a copy.
        let copy = snapshot
            || !view.is_resident()
            || (property == ParticleProperty::TagsMap && mode.is_write());
        let lease = if mode.is_write() && !copy {
            Some(
                self.window
                    .try_lease(property, space)
                    .ok_or(DlextError::AccessConflict { property, space })?,
            )
        } else {
            None
        };

        let resident = view.resident();
        engine.synchronize(resident, property.arrays());

        let sampler = if copy {
            let sampler = Sampler::copy(view, &*engine)?;
            self.metrics.copy_samplers += 1;
            self.metrics.bytes_copied += view.cached_layout().packed_bytes() as u64;
            sampler
        } else {
            let sampler = Sampler::borrow(view, &*engine, &self.window, lease)?;
            if mode.is_write() {
                engine.mark_modified(resident, property.arrays());
            }
            self.metrics.borrow_samplers += 1;
            sampler
        };
        Ok(sampler)
    }
}

// ── FixDLExt ──────────────────────────────────────────────────────

/// Hook that exposes engine particle arrays to a user callback as DLPack
/// capsules.
pub struct FixDLExt {
    exchange: Exchange,
    callback: Option<Callback>,
}

impl FixDLExt {
    /// Validate `config` against `engine` and build an unattached hook.
    ///
    /// A device default space on an engine without an accelerator fails
    /// with [`ConfigError::Unsupported`]; there is no silent host fallback.
    pub fn new(config: FixConfig, engine: &dyn ParticleEngine) -> Result<Self, ConfigError> {
        config.validate()?;
        config
            .space
            .require(engine.accelerator())
            .map_err(ConfigError::Unsupported)?;
        Ok(Self {
            exchange: Exchange {
                tag_map: TagIndexMap::new(config.map_style),
                config,
                state: HookState::Uninitialized,
                views: IndexMap::new(),
                window: ExposureWindow::new(),
                synced: None,
                metrics: ExchangeMetrics::default(),
                open: None,
            },
            callback: None,
        })
    }

    /// Install the callback run at every registered phase, replacing any
    /// previous one.
    pub fn set_callback<F>(&mut self, callback: F)
    where
        F: FnMut(&mut SamplingScope<'_>) + 'static,
    {
        self.callback = Some(Box::new(callback));
    }

    /// Remove the callback. Phases still refresh views.
    pub fn clear_callback(&mut self) {
        self.callback = None;
    }

    /// Register with `pipeline` at the configured phases.
    ///
    /// Attaching an attached hook is a no-op; a torn-down hook cannot be
    /// re-attached.
    pub fn attach(&mut self, pipeline: &mut dyn StepPipeline) -> Result<(), DlextError> {
        match self.exchange.state {
            HookState::Uninitialized => {}
            HookState::Armed | HookState::Stale(_) => return Ok(()),
            HookState::TornDown => {
                return Err(DlextError::NotArmed {
                    reason: "hook was torn down",
                })
            }
        }
        let config = &self.exchange.config;
        pipeline.register_fix(&config.id, config.phases.bits());
        tracing::debug!(fix = %config.id, phases = %config.phases, space = %config.space, "attached");
        self.exchange.transition(HookState::Armed);
        Ok(())
    }

    /// Engine entry point for `phase`.
    ///
    /// Refreshes if needed and runs the callback. Phases the hook is not
    /// registered for, or calls before attach or after teardown, do
    /// nothing. Never fails: errors surface from sampling requests.
    pub fn on_phase(&mut self, engine: &mut dyn ParticleEngine, phase: Phase) {
        if let Err(e) = self.exchange.open(engine, phase) {
            tracing::trace!(fix = %self.exchange.config.id, %phase, error = %e, "phase skipped");
            return;
        }
        if let Some(callback) = self.callback.as_mut() {
            let mut scope = SamplingScope::new(&mut self.exchange, engine, phase);
            callback(&mut scope);
            drop(scope);
            self.exchange.metrics.callbacks += 1;
        }
        self.exchange.close();
    }

    /// Shorthand for [`on_phase`](Self::on_phase) at `post_force`, the
    /// historical default.
    pub fn post_force(&mut self, engine: &mut dyn ParticleEngine) {
        self.on_phase(engine, Phase::PostForce);
    }

    /// Open `phase` without going through the callback.
    ///
    /// Fails with [`DlextError::NotArmed`] before attach, after teardown,
    /// or for a phase the hook is not registered for. The phase closes when
    /// the scope is dropped.
    pub fn open_phase<'a>(
        &'a mut self,
        engine: &'a mut dyn ParticleEngine,
        phase: Phase,
    ) -> Result<SamplingScope<'a>, DlextError> {
        self.exchange.open(engine, phase)?;
        Ok(SamplingScope::new(&mut self.exchange, engine, phase))
    }

    /// Unregister from `pipeline`, invalidate every outstanding zero-copy
    /// capsule and drop cached views. Idempotent.
    pub fn teardown(&mut self, pipeline: &mut dyn StepPipeline) {
        if self.exchange.state == HookState::TornDown {
            return;
        }
        if self.exchange.state.is_attached() {
            pipeline.unregister_fix(&self.exchange.config.id);
        }
        self.exchange.window.close();
        self.exchange.views.clear();
        self.exchange.transition(HookState::TornDown);
        tracing::info!(
            fix = %self.exchange.config.id,
            refreshes = self.exchange.metrics.refreshes,
            samplers = self.exchange.metrics.samplers_issued(),
            "torn down"
        );
    }

    /// Fix ID.
    pub fn id(&self) -> &str {
        &self.exchange.config.id
    }

    /// The configuration.
    pub fn config(&self) -> &FixConfig {
        &self.exchange.config
    }

    /// Current lifecycle state.
    pub fn state(&self) -> &HookState {
        &self.exchange.state
    }

    /// Cumulative counters.
    pub fn metrics(&self) -> &ExchangeMetrics {
        &self.exchange.metrics
    }

    /// The tag map as of the last refresh.
    pub fn tag_map(&self) -> &TagIndexMap {
        &self.exchange.tag_map
    }

    /// Number of cached views.
    pub fn view_count(&self) -> usize {
        self.exchange.views.len()
    }
}

impl Drop for FixDLExt {
    fn drop(&mut self) {
        // Zero-copy capsules must not outlive the hook that vouches for them.
        self.exchange.window.close();
    }
}

impl fmt::Debug for FixDLExt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FixDLExt")
            .field("id", &self.exchange.config.id)
            .field("state", &self.exchange.state)
            .field("views", &self.exchange.views.len())
            .field("has_callback", &self.callback.is_some())
            .finish()
    }
}
