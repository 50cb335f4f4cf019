//! Benchmark profiles for the dlext exchange layer.
//!
//! - [`reference_engine`]: 10K particles in shuffled storage order
//! - [`stress_engine`]: 100K particles, same layout
//! - [`attached_fix`]: a hook registered at `post_force` over every property

#![forbid(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

use dlext_fix::{FixConfig, FixDLExt};
use dlext_test_utils::MockEngine;

/// Particle count of [`reference_engine`].
pub const REFERENCE_PARTICLES: usize = 10_000;

/// Particle count of [`stress_engine`].
pub const STRESS_PARTICLES: usize = 100_000;

/// 10K particles of 4 types, storage order shuffled by `seed`.
pub fn reference_engine(seed: u64) -> MockEngine {
    shuffled(REFERENCE_PARTICLES, seed)
}

/// 100K particles of 4 types, storage order shuffled by `seed`.
pub fn stress_engine(seed: u64) -> MockEngine {
    shuffled(STRESS_PARTICLES, seed)
}

fn shuffled(n: usize, seed: u64) -> MockEngine {
    let mut engine = MockEngine::new(n, 4);
    engine.reorder(seed);
    engine
}

/// Hook `bench` attached to `engine` with the default configuration.
///
/// Panics if the mock rejects the configuration, which it never does for
/// the host space.
pub fn attached_fix(engine: &mut MockEngine) -> FixDLExt {
    let mut fix = FixDLExt::new(FixConfig::new("bench"), engine).expect("host config is valid");
    fix.attach(engine).expect("fresh hook attaches");
    fix
}
