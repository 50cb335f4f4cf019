//! DLPack capsules over engine-owned particle arrays.
//!
//! A [`Sampler`] wraps a [`View`](dlext_view::View) as a DLPack managed
//! tensor, either borrowing live engine memory or owning a packed copy.
//! This is the only dlext crate that may contain `unsafe` code; each use is
//! opted into per item and carries a `SAFETY` note.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![deny(unsafe_code)]

pub mod copy;
pub mod device;
pub mod edge;
pub mod ffi;
pub mod sampler;

pub use copy::{Element, HostBuffer};
pub use device::{dl_device, dl_dtype, scalar_type};
pub use edge::{DlextAccessMode, DlextExecutionSpace, DlextOwnership, DlextProperty, DlextStatus};
pub use ffi::{DLDataType, DLDevice, DLManagedTensor, DLTensor};
pub use sampler::{Ownership, Sampler};
