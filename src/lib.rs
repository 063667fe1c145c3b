//! Dynamic generalized universal functions with call-time specialization.
//!
//! A [`Gufunc`] wraps a kernel written against small fixed-rank core
//! operands, described by a dimension signature such as `(n,m),(m)->(n)`.
//! Calls broadcast the kernel over outer dimensions. Dynamic gufuncs
//! compile a specialization the first time they see a combination of
//! element types and reuse it afterwards.

pub mod cli;
pub mod codegen;
pub mod config;
pub mod errors;
pub mod gufunc;
pub mod logging;
pub mod runtime;
pub mod ufunc;

pub use gufunc_sig::{DimensionSignature, SignatureParseError, parse_signature};
pub use gufunc_types::{Array, Object, Scalar, ScalarType, Type, Value};

pub use config::{Identity, TargetOptions};
pub use errors::{GufuncError, Result};
pub use gufunc::{Gufunc, GufuncBuilder, GufuncState};
pub use runtime::jit::{
    CallSignature, JitEngine, KernelBody, KernelCompiler, KernelError, KernelLibrary,
};
pub use ufunc::{Kwargs, Ufunc};
