//! Step-pipeline hook that exposes engine particle arrays as DLPack
//! capsules.
//!
//! [`FixDLExt`] owns the tag map and the cached views for one fix instance.
//! The engine drives it synchronously through [`FixDLExt::on_phase`]; the
//! user callback receives a [`SamplingScope`] from which it requests
//! [`Sampler`](dlext_capsule::Sampler)s.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod config;
pub mod fix;
pub mod metrics;
pub mod phase;
pub mod scope;

pub use config::{ConfigError, FixConfig, FIX_STYLE};
pub use fix::{Callback, FixDLExt, HookState};
pub use metrics::ExchangeMetrics;
pub use phase::{Phase, PhaseMask};
pub use scope::{SampleRequest, SamplingScope};
