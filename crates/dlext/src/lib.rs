//! dlext: DLPack exchange of LAMMPS-style particle arrays.
//!
//! This is the top-level facade crate that re-exports the public API from
//! all dlext sub-crates. It lets Python machine-learning code (or any other
//! DLPack consumer) read and write an engine's per-particle arrays in place,
//! on the host or on the accelerator, while the engine keeps running.
//!
//! # Quick start
//!
//! ```rust
//! use dlext::prelude::*;
//! use dlext_test_utils::MockEngine;
//!
//! let mut engine = MockEngine::new(8, 2);
//! let config = FixConfig::from_args(&["dl", "all", "dlext", "space", "host"]).unwrap();
//! let mut fix = FixDLExt::new(config, &engine).unwrap();
//! fix.attach(&mut engine).unwrap();
//!
//! fix.set_callback(|scope| {
//!     let x = scope
//!         .positions(ExecutionSpace::Host, AccessMode::ReadOnly)
//!         .unwrap();
//!     assert_eq!(x.shape(), &[8, 3]);
//! });
//! fix.post_force(&mut engine);
//! assert_eq!(fix.metrics().borrow_samplers, 1);
//!
//! fix.teardown(&mut engine);
//! ```
//!
//! # Modules
//!
//! | Module | Sub-crate | Contents |
//! |--------|-----------|----------|
//! | [`types`] | `dlext-core` | IDs, properties, spaces, image codec, engine traits, errors |
//! | [`view`] | `dlext-view` | Tag maps, tensor layouts, views, exposure windows |
//! | [`capsule`] | `dlext-capsule` | DLPack structs, samplers, integer edge enums |
//! | [`fix`] | `dlext-fix` | The step-pipeline hook and its configuration |

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

/// Core vocabulary and the engine contract (`dlext-core`).
///
/// Implement [`types::ParticleEngine`] and [`types::StepPipeline`] to plug
/// an engine in. The image-flag codec lives in [`types::image`].
pub use dlext_core as types;

/// Tag maps, layouts and generation-checked views (`dlext-view`).
pub use dlext_view as view;

/// DLPack capsules (`dlext-capsule`).
///
/// [`capsule::Sampler`] is the exchanged object; [`capsule::DlextStatus`]
/// and friends are the integer mirrors for foreign callers.
pub use dlext_capsule as capsule;

/// The step-pipeline hook (`dlext-fix`).
pub use dlext_fix as fix;

/// Whether `engine` can serve requests in `space`.
pub fn supports(engine: &dyn types::ParticleEngine, space: types::ExecutionSpace) -> bool {
    engine.supports(space)
}

/// Common imports for typical dlext usage.
///
/// ```rust
/// use dlext::prelude::*;
/// ```
pub mod prelude {
    // Vocabulary
    pub use dlext_core::{
        AccessMode, ExecutionSpace, Generation, ParticleProperty, ScalarType, Tag, TimeStep,
    };

    // Engine contract
    pub use dlext_core::{ParticleEngine, StepPipeline};

    // Errors
    pub use dlext_core::{DlextError, StaleReason};

    // Views
    pub use dlext_view::{MapStyle, TagIndexMap};

    // Capsules
    pub use dlext_capsule::{DLManagedTensor, Ownership, Sampler};

    // Hook
    pub use dlext_fix::{
        ConfigError, ExchangeMetrics, FixConfig, FixDLExt, HookState, Phase, SampleRequest,
        SamplingScope,
    };
}

#[cfg(test)]
mod tests {
    use super::prelude::*;
    use dlext_test_utils::MockEngine;

    #[test]
    fn capability_query() {
        let host = MockEngine::new(1, 1);
        assert!(super::supports(&host, ExecutionSpace::Host));
        assert!(!super::supports(&host, ExecutionSpace::Device));
        let gpu = MockEngine::new(1, 1).with_device(0);
        assert!(super::supports(&gpu, ExecutionSpace::Device));
    }

    #[test]
    fn image_constants_are_reexported() {
        assert_eq!(crate::types::image::IMG_MASK, (1 << crate::types::image::IMG_BITS) - 1);
    }
}
