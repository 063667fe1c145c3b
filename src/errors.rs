use gufunc_sig::SignatureParseError;
use gufunc_types::{CastError, ScalarType, ShapeError, Type};
use thiserror::Error;

use crate::runtime::jit::{CompilationError, KernelError};

pub type Result<T, E = GufuncError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum GufuncError {
    #[error(transparent)]
    SignatureParse(#[from] SignatureParseError),

    #[error("{message}")]
    Arity {
        expected: usize,
        found: usize,
        message: String,
    },

    #[error("cannot call {function} with element-wise types ({}): no matching specialization", join_types(.types))]
    NoMatchingSpecialization {
        function: String,
        types: Vec<ScalarType>,
    },

    #[error(transparent)]
    Compilation(#[from] CompilationError),

    #[error("operand {position} of type {ty} has no numeric element type")]
    UnsupportedOperand { position: usize, ty: Type },

    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),

    #[error("output dimension '{dimension}' of {function} is not bound by any input")]
    MissingOutput { function: String, dimension: String },

    #[error(transparent)]
    Kernel(#[from] KernelError),

    #[error(transparent)]
    Cast(#[from] CastError),

    #[error(transparent)]
    Shape(#[from] ShapeError),

    #[error("cannot disable compilation of {function}: no specialization has been compiled")]
    FreezeWithoutSpecializations { function: String },

    #[error("kernel '{0}' is not registered in the kernel library")]
    UnknownKernel(String),

    #[error("a different kernel body is already registered as '{0}'")]
    KernelConflict(String),

    #[error("typing failed: {0}")]
    Typing(String),

    #[error("failed to (de)serialize gufunc state: {0}")]
    Serialization(String),
}

impl GufuncError {
    /// Dynamic gufuncs require the output operand to be passed explicitly.
    pub fn arity(function: &str, expected: usize, found: usize) -> Self {
        let message = format!(
            "Wrong number of arguments for function '{function}' (expected {expected}, got {found}). \
             Note that the pattern `out = gufunc(Arg1, Arg2, ..., ArgN)` is not allowed. \
             Use `gufunc(Arg1, Arg2, ..., ArgN, out)` instead."
        );
        GufuncError::Arity {
            expected,
            found,
            message,
        }
    }
}

fn join_types(types: &[ScalarType]) -> String {
    types
        .iter()
        .map(|ty| ty.name())
        .collect::<Vec<_>>()
        .join(", ")
}

impl From<serde_json::Error> for GufuncError {
    fn from(err: serde_json::Error) -> Self {
        GufuncError::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for GufuncError {
    fn from(err: serde_yaml::Error) -> Self {
        GufuncError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_matching_message_lists_element_types() {
        let err = GufuncError::NoMatchingSpecialization {
            function: "matvec".into(),
            types: vec![ScalarType::Float64, ScalarType::Int32],
        };
        assert_eq!(
            err.to_string(),
            format!(
                "cannot call matvec with element-wise types ({}, {}): no matching specialization",
                ScalarType::Float64.name(),
                ScalarType::Int32.name()
            )
        );
    }

    #[test]
    fn arity_message_points_at_explicit_output() {
        let err = GufuncError::arity("axpy", 3, 2);
        assert!(matches!(err, GufuncError::Arity { expected: 3, found: 2, .. }));
        assert!(err.to_string().contains("expected 3, got 2"));
    }
}
