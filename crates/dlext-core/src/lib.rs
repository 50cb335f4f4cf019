//! Core types and traits for zero-copy particle data exchange.
//!
//! This is the leaf crate with zero internal dependencies. It defines the
//! vocabulary shared by the rest of the workspace: particle identifiers,
//! execution spaces and access modes, the periodic image-flag codec, the
//! catalogue of exposable particle properties, the error type, and the
//! contract a simulation engine must fulfil ([`ParticleEngine`],
//! [`StepPipeline`]).

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod error;
pub mod id;
pub mod image;
pub mod property;
pub mod space;
pub mod traits;

pub use error::{DlextError, StaleReason};
pub use id::{Generation, ImageInt, Tag, TagInt, TimeStep};
pub use property::{ArrayKind, ParticleProperty, PropertySource, ScalarType};
pub use space::{AccessMode, Accelerator, AcceleratorKind, ExecutionSpace};
pub use traits::{OwnedBuffer, ParticleEngine, RawArray, StepPipeline, StridedExtent};
