// Per-gufunc registry of compiled specializations
pub mod registry;

pub use registry::{SpecializationEntry, SpecializationRegistry};
