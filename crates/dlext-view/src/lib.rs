//! Generation-checked views over engine-owned particle arrays.
//!
//! A [`View`] binds one [`ParticleProperty`](dlext_core::ParticleProperty)
//! to an execution space and access mode and remembers the engine
//! generation it was bound at. Every access compares that stamp against the
//! live engine before handing out an address. The [`TagIndexMap`] inverts
//! the engine's tag array so consumers can find particles after the engine
//! reorders storage, and the [`ExposureWindow`] tracks which capsules issued
//! from these views are still backed by stable memory.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod layout;
pub mod tagmap;
pub mod view;
pub mod window;

pub use layout::TensorLayout;
pub use tagmap::{MapStyle, TagIndexMap, MAX_DENSE_LEN};
pub use view::View;
pub use window::{ExposureWindow, WindowStamp, WriteLease};
