//! Host type system for dynamic gufuncs.
//!
//! Scalars and arrays are the values that flow through a broadcasting
//! loop; [`Type`] is their static description. Arrays are shared
//! handles, so a clone aliases the same buffer.

mod array;
mod cast;
mod scalar;
mod types;
mod value;

pub use array::{Array, ShapeError};
pub use cast::{CastError, cast_value};
pub use scalar::{Scalar, ScalarKind, ScalarType};
pub use types::{ArrayType, Layout, Type, Typed, element_type, type_of};
pub use value::{Object, Value};
