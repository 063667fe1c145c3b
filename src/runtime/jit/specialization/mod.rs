// Call-time specialization of gufunc kernels
pub mod ewise;
pub mod key;
pub mod resolver;

pub use ewise::elementwise_types;
pub use key::ElementwiseKey;
pub use resolver::{Resolution, ResolutionKind, SpecializationResolver, synthesize_signature};

use std::fmt;

use gufunc_types::{ScalarType, Type};
use serde::{Deserialize, Serialize};

use crate::errors::Result;

/// Concrete operand types a kernel is compiled for.
///
/// The return type is always `none`: kernels write their output operand.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CallSignature {
    pub args: Vec<Type>,
    pub return_type: Type,
}

impl CallSignature {
    pub fn void(args: Vec<Type>) -> Self {
        Self {
            args,
            return_type: Type::None,
        }
    }

    pub fn elementwise_types(&self) -> Result<Vec<ScalarType>> {
        elementwise_types(&self.args)
    }
}

impl fmt::Display for CallSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let args = self
            .args
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ");
        write!(f, "{}({})", self.return_type, args)
    }
}
